// Input probing using ffprobe

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};

use super::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: Option<f64>,
}

/// Resolve the ffprobe binary to match the configured ffmpeg: a sibling
/// `ffprobe` next to an explicit ffmpeg path when present, otherwise
/// whatever `ffprobe` resolves to on PATH.
pub fn ffprobe_path(ffmpeg: &Path) -> PathBuf {
    let name = if cfg!(target_os = "windows") {
        "ffprobe.exe"
    } else {
        "ffprobe"
    };
    if let Some(dir) = ffmpeg.parent() {
        let sibling = dir.join(name);
        if !dir.as_os_str().is_empty() && sibling.is_file() {
            return sibling;
        }
    }
    PathBuf::from(name)
}

/// Probe input file metadata via ffprobe JSON output.
pub fn probe_input_info(ffmpeg: &Path, input_path: &Path) -> Result<InputInfo, EngineError> {
    let ffprobe = ffprobe_path(ffmpeg);
    let output = Command::new(&ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-select_streams",
            "v:0", // first video stream only
        ])
        .arg(input_path)
        .output()
        .map_err(|e| {
            if matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ) {
                EngineError::ToolNotFound {
                    path: ffprobe.clone(),
                    source: e,
                }
            } else {
                EngineError::Spawn {
                    program: ffprobe.clone(),
                    source: e,
                }
            }
        })?;

    if !output.status.success() {
        return Err(EngineError::Probe(format!(
            "ffprobe failed on '{}': {}",
            input_path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_input_info(&String::from_utf8_lossy(&output.stdout))
}

/// Extract stream and format fields from raw ffprobe JSON.
pub fn parse_input_info(json_str: &str) -> Result<InputInfo, EngineError> {
    let probe_err = |msg: &str| EngineError::Probe(msg.to_string());

    let json: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| EngineError::Probe(format!("unparsable ffprobe JSON: {e}")))?;

    let streams = json["streams"]
        .as_array()
        .ok_or_else(|| probe_err("no streams in ffprobe output"))?;
    let video_stream = streams
        .first()
        .ok_or_else(|| probe_err("no video stream found"))?;

    let width = video_stream["width"]
        .as_u64()
        .ok_or_else(|| probe_err("missing video width"))? as u32;
    let height = video_stream["height"]
        .as_u64()
        .ok_or_else(|| probe_err("missing video height"))? as u32;

    // r_frame_rate is the more accurate of the two
    let fps_str = video_stream["r_frame_rate"]
        .as_str()
        .or_else(|| video_stream["avg_frame_rate"].as_str())
        .ok_or_else(|| probe_err("missing video framerate"))?;
    let fps = parse_fraction(fps_str)
        .ok_or_else(|| EngineError::Probe(format!("unparsable framerate: {fps_str}")))?;

    let duration = json["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok());

    Ok(InputInfo {
        width,
        height,
        fps,
        duration,
    })
}

/// Parse a fraction string like "30000/1001" to f64
fn parse_fraction(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/')?;
    let numerator: f64 = num.parse().ok()?;
    let denominator: f64 = den.parse().ok()?;
    if denominator == 0.0 {
        return None;
    }
    Some(numerator / denominator)
}
