// Global configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::fallback;
use crate::engine::types::{EncodeMode, QualityPreset};

const MAX_RECENT_FILES: usize = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub subtitle: SubtitleConfig,

    #[serde(default)]
    pub fallback: FallbackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Explicit ffmpeg binary path. Unset means resolve from PATH.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Encode mode used when the CLI does not specify one
    #[serde(default = "default_mode")]
    pub default_mode: EncodeMode,

    /// Quality tier used when the CLI does not specify one
    #[serde(default = "default_quality")]
    pub video_quality: QualityPreset,

    /// Default overwrite setting (whether to overwrite existing output files)
    #[serde(default)]
    pub overwrite: bool,

    /// Extra arguments appended to every built command, shell-style split
    #[serde(default)]
    pub extra_ffmpeg_args: String,

    /// Starting directory for input selection
    #[serde(default)]
    pub last_input_directory: Option<PathBuf>,

    /// Directory where outputs land when no explicit output path is given
    #[serde(default)]
    pub last_output_directory: Option<PathBuf>,

    /// Most recently processed inputs, newest first
    #[serde(default)]
    pub recent_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubtitleConfig {
    #[serde(default = "default_font_size")]
    pub font_size: u32,

    /// Color name or 6-digit RGB hex
    #[serde(default = "default_font_color")]
    pub font_color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FallbackConfig {
    /// Retry a failed GPU encode once on CPU when the log matches a signature
    #[serde(default = "default_true_config")]
    pub enabled: bool,

    /// Log substrings treated as GPU encoder initialization failures
    #[serde(default = "default_signatures")]
    pub signatures: Vec<String>,
}

fn default_mode() -> EncodeMode {
    EncodeMode::NvencCuda
}

fn default_quality() -> QualityPreset {
    QualityPreset::Medium
}

fn default_font_size() -> u32 {
    24
}

fn default_font_color() -> String {
    "white".to_string()
}

fn default_true_config() -> bool {
    true
}

fn default_signatures() -> Vec<String> {
    fallback::default_signatures()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            default_mode: default_mode(),
            video_quality: default_quality(),
            overwrite: false,
            extra_ffmpeg_args: String::new(),
            last_input_directory: None,
            last_output_directory: None,
            recent_files: Vec::new(),
        }
    }
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            font_color: default_font_color(),
        }
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            signatures: default_signatures(),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("ffclip")
        } else {
            // Linux, Windows, and others
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("ffclip")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from disk, or create default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            // Create default config and save it. Don't fail if we can't
            // (e.g., if the directory isn't writable).
            let config = Config::default();
            if let Err(e) = config.save() {
                eprintln!("Warning: Could not create default config file: {e}");
                eprintln!(
                    "Using built-in defaults. Run 'ffclip init-config' to create a config file."
                );
            }
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Check if config file exists
    pub fn exists() -> bool {
        Self::config_path().map(|p| p.exists()).unwrap_or(false)
    }

    /// Create a default config file if it doesn't exist
    pub fn ensure_default() -> Result<()> {
        if !Self::exists() {
            let config = Config::default();
            config.save()?;
        }
        Ok(())
    }

    /// Record a processed input: moved to the front, deduplicated,
    /// capped at the recent-files limit.
    pub fn add_recent_file(&mut self, path: &Path) {
        self.general.recent_files.retain(|p| p != path);
        self.general.recent_files.insert(0, path.to_path_buf());
        self.general.recent_files.truncate(MAX_RECENT_FILES);
    }
}
