use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Video encoder selection for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodeMode {
    /// Software x264 encode.
    Cpu,
    /// NVIDIA NVENC with CUDA hardware decode.
    #[serde(rename = "cuda")]
    NvencCuda,
    /// AMD AMF encode.
    #[serde(rename = "amd")]
    AmdAmf,
}

impl EncodeMode {
    pub fn is_gpu(self) -> bool {
        !matches!(self, EncodeMode::Cpu)
    }

    /// The h264 encoder FFmpeg should use for this mode.
    pub fn encoder_name(self) -> &'static str {
        match self {
            EncodeMode::Cpu => "libx264",
            EncodeMode::NvencCuda => "h264_nvenc",
            EncodeMode::AmdAmf => "h264_amf",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EncodeMode::Cpu => "cpu",
            EncodeMode::NvencCuda => "cuda",
            EncodeMode::AmdAmf => "amd",
        }
    }
}

impl fmt::Display for EncodeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EncodeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(EncodeMode::Cpu),
            "cuda" | "nvenc" => Ok(EncodeMode::NvencCuda),
            "amd" | "amf" => Ok(EncodeMode::AmdAmf),
            other => Err(format!(
                "unknown encode mode '{other}' (expected cpu, cuda, or amd)"
            )),
        }
    }
}

/// Output quality tier. Maps to bitrate for GPU encoders and CRF for x264.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    Low,
    Medium,
    High,
}

impl QualityPreset {
    pub fn label(self) -> &'static str {
        match self {
            QualityPreset::Low => "low",
            QualityPreset::Medium => "medium",
            QualityPreset::High => "high",
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for QualityPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(QualityPreset::Low),
            "medium" => Ok(QualityPreset::Medium),
            "high" => Ok(QualityPreset::High),
            other => Err(format!(
                "unknown quality '{other}' (expected low, medium, or high)"
            )),
        }
    }
}

/// A point in the source timeline, stored as whole milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timecode {
    millis: u64,
}

impl Timecode {
    pub fn from_millis(millis: u64) -> Self {
        Timecode { millis }
    }

    pub fn as_secs_f64(self) -> f64 {
        self.millis as f64 / 1000.0
    }
}

impl fmt::Display for Timecode {
    /// Formats as `HH:MM:SS` or `HH:MM:SS.mmm` when sub-second.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_secs = self.millis / 1000;
        let ms = self.millis % 1000;
        let (h, m, s) = (total_secs / 3600, (total_secs / 60) % 60, total_secs % 60);
        if ms == 0 {
            write!(f, "{h:02}:{m:02}:{s:02}")
        } else {
            write!(f, "{h:02}:{m:02}:{s:02}.{ms:03}")
        }
    }
}

impl FromStr for Timecode {
    type Err = String;

    /// Accepts `HH:MM:SS`, `H:MM:SS`, `MM:SS`, and an optional fractional
    /// second suffix. Minutes and seconds must be below 60.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || format!("invalid timecode '{s}' (expected HH:MM:SS)");
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, Some(f)),
            None => (s, None),
        };

        let parts: Vec<&str> = whole.split(':').collect();
        let (h, m, sec): (u64, u64, u64) = match parts.as_slice() {
            [h, m, sec] => (
                h.parse().map_err(|_| bad())?,
                m.parse().map_err(|_| bad())?,
                sec.parse().map_err(|_| bad())?,
            ),
            [m, sec] => (0, m.parse().map_err(|_| bad())?, sec.parse().map_err(|_| bad())?),
            _ => return Err(bad()),
        };
        if m >= 60 || sec >= 60 {
            return Err(bad());
        }

        // hours come straight from user input, so the math must not wrap
        let mut millis = h
            .checked_mul(3600)
            .and_then(|t| t.checked_add(m * 60 + sec))
            .and_then(|t| t.checked_mul(1000))
            .ok_or_else(bad)?;
        if let Some(frac) = frac {
            if frac.is_empty() || frac.len() > 3 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return Err(bad());
            }
            let scale = 10u64.pow(3 - frac.len() as u32);
            millis = millis
                .checked_add(frac.parse::<u64>().map_err(|_| bad())? * scale)
                .ok_or_else(bad)?;
        }
        Ok(Timecode { millis })
    }
}

/// Styling applied when burning subtitles into the video stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleStyle {
    pub font_size: u32,
    /// Color name (white, black, red, ...) or 6-digit RGB hex.
    pub color: String,
    /// ASS numpad alignment (1-9, bottom-left to top-right). None keeps
    /// the subtitle file's own positioning.
    pub alignment: Option<u8>,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        SubtitleStyle {
            font_size: 24,
            color: "white".to_string(),
            alignment: None,
        }
    }
}

/// What the job should do to the input.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Trim {
        start: Timecode,
        end: Timecode,
        /// Copy streams without re-encoding. Fast and lossless, but cuts
        /// land on keyframe boundaries.
        stream_copy: bool,
    },
    SubtitleBurn {
        subtitle_path: PathBuf,
        style: SubtitleStyle,
    },
}

/// Everything needed to build and run one FFmpeg invocation.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub operation: Operation,
    pub mode: EncodeMode,
    pub quality: QualityPreset,
    pub overwrite: bool,
    /// Extra arguments appended verbatim before the output path,
    /// shell-style split.
    pub extra_args: Option<String>,
}

/// Terminal state of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    /// The GPU encoder failed to initialize and the CPU retry succeeded.
    FellBackToCpu,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct JobResult {
    pub outcome: JobOutcome,
    /// Captured FFmpeg stderr. For a fallback run this holds both attempts.
    pub log: String,
    /// The produced file, present only when the job succeeded.
    pub output: Option<PathBuf>,
}

impl JobResult {
    pub fn succeeded(&self) -> bool {
        matches!(
            self.outcome,
            JobOutcome::Success | JobOutcome::FellBackToCpu
        )
    }
}

/// Incremental parser for FFmpeg's stderr stats lines
/// (`frame= 120 fps= 30 ... time=00:00:05.00 bitrate=1677.7kbits/s speed=1.25x`).
#[derive(Debug, Default, Clone)]
pub struct StatsParser {
    pub frame: Option<u64>,
    pub fps: Option<f64>,
    pub time_secs: Option<f64>,
    pub bitrate_kbps: Option<f64>,
    pub speed: Option<f64>,
}

impl StatsParser {
    pub fn new() -> Self {
        StatsParser::default()
    }

    /// Consumes one stderr line, updating any stats fields it carries.
    /// Returns true if the line looked like a stats line.
    pub fn parse_line(&mut self, line: &str) -> bool {
        if !line.contains("time=") && !line.contains("frame=") {
            return false;
        }
        let mut matched = false;
        if let Some(v) = value_after(line, "frame=") {
            if let Ok(frame) = v.parse() {
                self.frame = Some(frame);
                matched = true;
            }
        }
        if let Some(v) = value_after(line, "fps=") {
            if let Ok(fps) = v.parse() {
                self.fps = Some(fps);
                matched = true;
            }
        }
        if let Some(v) = value_after(line, "time=") {
            if let Some(secs) = parse_clock(v) {
                self.time_secs = Some(secs);
                matched = true;
            }
        }
        if let Some(v) = value_after(line, "bitrate=") {
            if let Some(kbps) = v.strip_suffix("kbits/s").and_then(|n| n.parse().ok()) {
                self.bitrate_kbps = Some(kbps);
                matched = true;
            }
        }
        if let Some(v) = value_after(line, "speed=") {
            if let Some(speed) = v.strip_suffix('x').and_then(|n| n.parse().ok()) {
                self.speed = Some(speed);
                matched = true;
            }
        }
        matched
    }

    /// Progress percentage against a known duration, clamped to 100.
    pub fn progress_pct(&self, duration_secs: f64) -> Option<f64> {
        if duration_secs <= 0.0 {
            return None;
        }
        self.time_secs
            .map(|t| (t / duration_secs * 100.0).min(100.0))
    }
}

/// Extracts the whitespace-delimited token following `key` in a stats line,
/// tolerating FFmpeg's padding after the `=`.
fn value_after<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let idx = line.find(key)?;
    let rest = line[idx + key.len()..].trim_start();
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let token = &rest[..end];
    if token.is_empty() || token == "N/A" {
        None
    } else {
        Some(token)
    }
}

/// Parses FFmpeg's `HH:MM:SS.cc` clock value into seconds.
fn parse_clock(v: &str) -> Option<f64> {
    let mut parts = v.split(':');
    let h: f64 = parts.next()?.parse().ok()?;
    let m: f64 = parts.next()?.parse().ok()?;
    let s: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(h * 3600.0 + m * 60.0 + s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timecode_parses_full_form() {
        let tc: Timecode = "01:02:03".parse().unwrap();
        assert_eq!(tc.as_secs_f64(), 3723.0);
        assert_eq!(tc.to_string(), "01:02:03");
    }

    #[test]
    fn timecode_parses_fractional_and_short_forms() {
        let tc: Timecode = "00:00:05.5".parse().unwrap();
        assert_eq!(tc.as_secs_f64(), 5.5);
        assert_eq!(tc.to_string(), "00:00:05.500");

        let tc: Timecode = "1:30".parse().unwrap();
        assert_eq!(tc.as_secs_f64(), 90.0);
    }

    #[test]
    fn timecode_rejects_out_of_range_fields() {
        assert!("00:61:00".parse::<Timecode>().is_err());
        assert!("00:00:75".parse::<Timecode>().is_err());
        assert!("abc".parse::<Timecode>().is_err());
        assert!("00:00:01.1234".parse::<Timecode>().is_err());
    }

    #[test]
    fn timecode_rejects_hours_that_overflow() {
        assert!("100000000000000000:00:00".parse::<Timecode>().is_err());
        assert!("18446744073709551615:00:00".parse::<Timecode>().is_err());
        // the largest representable hour count still parses
        assert!("5124095576030:00:00".parse::<Timecode>().is_ok());
        assert!("5124095576031:00:00".parse::<Timecode>().is_err());
    }

    #[test]
    fn encode_mode_round_trips_through_str() {
        for mode in [EncodeMode::Cpu, EncodeMode::NvencCuda, EncodeMode::AmdAmf] {
            assert_eq!(mode.label().parse::<EncodeMode>().unwrap(), mode);
        }
        assert!("vulkan".parse::<EncodeMode>().is_err());
    }

    #[test]
    fn stats_parser_reads_a_typical_line() {
        let mut p = StatsParser::new();
        let matched = p.parse_line(
            "frame=  120 fps= 30 q=28.0 size=    1024KiB time=00:00:05.00 bitrate=1677.7kbits/s speed=1.25x",
        );
        assert!(matched);
        assert_eq!(p.frame, Some(120));
        assert_eq!(p.fps, Some(30.0));
        assert_eq!(p.time_secs, Some(5.0));
        assert_eq!(p.bitrate_kbps, Some(1677.7));
        assert_eq!(p.speed, Some(1.25));
    }

    #[test]
    fn stats_parser_tolerates_na_fields() {
        let mut p = StatsParser::new();
        p.parse_line("frame=    1 fps=0.0 q=0.0 size=       0KiB time=N/A bitrate=N/A speed=N/A");
        assert_eq!(p.frame, Some(1));
        assert_eq!(p.time_secs, None);
        assert_eq!(p.bitrate_kbps, None);
    }

    #[test]
    fn stats_parser_ignores_non_stats_lines() {
        let mut p = StatsParser::new();
        assert!(!p.parse_line("Stream #0:0: Video: h264 (High), yuv420p, 1920x1080"));
        assert_eq!(p.frame, None);
    }

    #[test]
    fn progress_pct_clamps() {
        let mut p = StatsParser::new();
        p.parse_line("frame= 1 time=00:00:12.00 speed=1x");
        assert_eq!(p.progress_pct(10.0), Some(100.0));
        assert_eq!(p.progress_pct(24.0), Some(50.0));
        assert_eq!(p.progress_pct(0.0), None);
    }
}
