use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

use ffclip::engine::{EncodeMode, QualityPreset, Timecode};

#[derive(Parser)]
#[command(name = "ffclip")]
#[command(about = "Trim videos and burn in subtitles via FFmpeg, with GPU encoding and CPU fallback", long_about = None)]
pub struct Cli {
    /// Path to the ffmpeg binary (overrides the configured path)
    #[arg(long, global = true, value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check if ffmpeg and ffprobe are installed
    CheckFfmpeg,

    /// Report hardware capabilities and the recommended encode mode
    Detect,

    /// Probe a video file for resolution, framerate, and duration
    Probe {
        /// Path to the video file
        file: PathBuf,
    },

    /// Cut a time range out of a video
    Trim {
        /// Input video file
        input: PathBuf,

        /// Range start (HH:MM:SS, fractional seconds allowed)
        #[arg(value_parser = Timecode::from_str)]
        start: Timecode,

        /// Range end (HH:MM:SS, must be after start)
        #[arg(value_parser = Timecode::from_str)]
        end: Timecode,

        /// Output file (defaults to <input>_trimmed.<ext> in the output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Copy streams without re-encoding (fast, cuts on keyframes)
        #[arg(long)]
        copy: bool,

        /// Encode mode: cpu, cuda, or amd (defaults from config)
        #[arg(short, long, value_parser = EncodeMode::from_str)]
        mode: Option<EncodeMode>,

        /// Quality tier: low, medium, or high (defaults from config)
        #[arg(short, long, value_parser = QualityPreset::from_str)]
        quality: Option<QualityPreset>,

        /// Overwrite the output file if it exists
        #[arg(long)]
        overwrite: bool,

        /// Print the ffmpeg command without running it
        #[arg(long)]
        dry_run: bool,

        /// Fail immediately instead of retrying on CPU when the GPU encoder breaks
        #[arg(long)]
        no_fallback: bool,
    },

    /// Burn a subtitle file into the video stream
    Burn {
        /// Input video file
        input: PathBuf,

        /// Subtitle file (.srt, .ass, .ssa, .vtt, .sub)
        subtitle: PathBuf,

        /// Output file (defaults to <input>_subtitled.<ext> in the output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Subtitle font size (defaults from config)
        #[arg(long)]
        font_size: Option<u32>,

        /// Subtitle color name or 6-digit hex (defaults from config)
        #[arg(long)]
        color: Option<String>,

        /// Subtitle position, ASS numpad alignment (1-9, 2 = bottom center)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=9))]
        alignment: Option<u8>,

        /// Encode mode: cpu, cuda, or amd (defaults from config)
        #[arg(short, long, value_parser = EncodeMode::from_str)]
        mode: Option<EncodeMode>,

        /// Quality tier: low, medium, or high (defaults from config)
        #[arg(short, long, value_parser = QualityPreset::from_str)]
        quality: Option<QualityPreset>,

        /// Overwrite the output file if it exists
        #[arg(long)]
        overwrite: bool,

        /// Print the ffmpeg command without running it
        #[arg(long)]
        dry_run: bool,

        /// Fail immediately instead of retrying on CPU when the GPU encoder breaks
        #[arg(long)]
        no_fallback: bool,
    },

    /// Show config status and location, or create default config if missing
    InitConfig,
}

pub fn parse() -> Cli {
    Cli::parse()
}
