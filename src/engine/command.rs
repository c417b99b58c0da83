//! FFmpeg argument construction.
//!
//! Everything here is pure: a `JobRequest` goes in, an ordered argument
//! vector comes out. No process is spawned and no filesystem access
//! happens, which keeps command shapes fully unit-testable.

use std::borrow::Cow;
use std::path::Path;

use super::error::BuildError;
use super::types::{EncodeMode, JobRequest, Operation, QualityPreset, SubtitleStyle};

/// Subtitle formats the burn filter accepts.
pub const SUPPORTED_SUBTITLE_EXTS: &[&str] = &["srt", "ass", "ssa", "vtt", "sub"];

/// Container formats offered by the file pickers.
pub const SUPPORTED_VIDEO_EXTS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "3gp",
];

/// Build the complete FFmpeg argument vector for a job.
///
/// Seek arguments go before `-i` so FFmpeg seeks on the input side:
/// `-ss` jumps near the start point instead of decoding up to it, and
/// an input-side `-to` stops demuxing at the absolute end time.
pub fn build_args(req: &JobRequest) -> Result<Vec<String>, BuildError> {
    validate(req)?;

    let mut args: Vec<String> = Vec::new();
    match &req.operation {
        Operation::Trim {
            start,
            end,
            stream_copy,
        } => {
            if *stream_copy {
                args.push("-ss".to_string());
                args.push(start.to_string());
                args.push("-to".to_string());
                args.push(end.to_string());
                args.push("-i".to_string());
                args.push(req.input.to_string_lossy().into_owned());
                args.extend(str_args(&["-c", "copy"]));
            } else {
                args.extend(hwaccel_args(req.mode, true));
                args.push("-ss".to_string());
                args.push(start.to_string());
                args.push("-to".to_string());
                args.push(end.to_string());
                args.push("-i".to_string());
                args.push(req.input.to_string_lossy().into_owned());
                args.push("-c:v".to_string());
                args.push(req.mode.encoder_name().to_string());
                args.extend(quality_args(req.mode, req.quality));
                args.extend(str_args(&["-c:a", "copy"]));
            }
        }
        Operation::SubtitleBurn {
            subtitle_path,
            style,
        } => {
            // The subtitles filter renders on system-memory frames, so
            // CUDA decode must not keep frames on the device here
            // (no -hwaccel_output_format cuda).
            args.extend(hwaccel_args(req.mode, false));
            args.push("-i".to_string());
            args.push(req.input.to_string_lossy().into_owned());
            args.push("-vf".to_string());
            args.push(subtitle_filter(subtitle_path, style));
            args.push("-c:v".to_string());
            args.push(req.mode.encoder_name().to_string());
            args.extend(quality_args(req.mode, req.quality));
            args.extend(str_args(&["-c:a", "copy"]));
        }
    }

    if let Some(extra) = req.extra_args.as_deref() {
        if !extra.trim().is_empty() {
            let split =
                shlex::split(extra).ok_or_else(|| BuildError::BadExtraArgs(extra.to_string()))?;
            args.extend(split);
        }
    }

    args.push(if req.overwrite { "-y" } else { "-n" }.to_string());
    args.push(req.output.to_string_lossy().into_owned());
    Ok(args)
}

fn validate(req: &JobRequest) -> Result<(), BuildError> {
    if req.output.file_name().is_none() {
        return Err(BuildError::BadOutputPath(req.output.clone()));
    }
    if req.output == req.input {
        return Err(BuildError::OutputIsInput(req.output.clone()));
    }
    match &req.operation {
        Operation::Trim { start, end, .. } => {
            if end <= start {
                return Err(BuildError::EndBeforeStart {
                    start: *start,
                    end: *end,
                });
            }
        }
        Operation::SubtitleBurn { subtitle_path, .. } => {
            let ext = subtitle_path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase());
            let supported = ext
                .as_deref()
                .is_some_and(|e| SUPPORTED_SUBTITLE_EXTS.contains(&e));
            if !supported {
                return Err(BuildError::UnsupportedSubtitleFormat(subtitle_path.clone()));
            }
        }
    }
    Ok(())
}

/// Hardware decode flags for the given mode. `gpu_frames` keeps decoded
/// frames in device memory, valid only when no CPU filter needs them.
pub fn hwaccel_args(mode: EncodeMode, gpu_frames: bool) -> Vec<String> {
    match mode {
        EncodeMode::Cpu => Vec::new(),
        EncodeMode::NvencCuda => {
            let mut args = str_args(&["-hwaccel", "cuda"]);
            if gpu_frames {
                args.extend(str_args(&["-hwaccel_output_format", "cuda"]));
            }
            args
        }
        EncodeMode::AmdAmf => {
            if cfg!(target_os = "windows") {
                str_args(&["-hwaccel", "d3d11va"])
            } else {
                str_args(&["-hwaccel", "opencl"])
            }
        }
    }
}

/// Rate-control flags per mode and tier. GPU encoders take a target
/// bitrate; x264 takes a CRF plus speed preset.
pub fn quality_args(mode: EncodeMode, quality: QualityPreset) -> Vec<String> {
    match mode {
        EncodeMode::NvencCuda => match quality {
            QualityPreset::Low => str_args(&["-preset", "fast", "-b:v", "3M"]),
            QualityPreset::Medium => str_args(&["-preset", "medium", "-b:v", "5M"]),
            QualityPreset::High => str_args(&["-preset", "slow", "-b:v", "8M"]),
        },
        EncodeMode::AmdAmf => match quality {
            QualityPreset::Low => str_args(&["-b:v", "3M"]),
            QualityPreset::Medium => str_args(&["-b:v", "5M"]),
            QualityPreset::High => str_args(&["-b:v", "8M"]),
        },
        EncodeMode::Cpu => match quality {
            QualityPreset::Low => str_args(&["-preset", "fast", "-crf", "28"]),
            QualityPreset::Medium => str_args(&["-preset", "medium", "-crf", "23"]),
            QualityPreset::High => str_args(&["-preset", "slow", "-crf", "18"]),
        },
    }
}

/// The `-vf` value for a subtitle burn.
pub fn subtitle_filter(subtitle_path: &Path, style: &SubtitleStyle) -> String {
    let normalized = subtitle_path.to_string_lossy().replace('\\', "/");
    let mut force_style = format!(
        "FontSize={},PrimaryColour=&H{}",
        style.font_size,
        color_to_hex(&style.color)
    );
    if let Some(alignment) = style.alignment {
        force_style.push_str(&format!(",Alignment={alignment}"));
    }
    format!(
        "subtitles={}:force_style='{}'",
        escape_filter_value(&normalized),
        force_style,
    )
}

/// Escape a value for embedding in a filtergraph string. The graph
/// parser treats `:` as an option separator, `,` and `;` as chain
/// separators, `[]` as link labels, and `'`/`\` as quoting.
pub fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' | '\'' | ':' | ',' | ';' | '[' | ']' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Map a color name to the hex value used in ASS `PrimaryColour`.
/// 6-digit hex input passes through; unknown names fall back to white.
pub fn color_to_hex(color: &str) -> String {
    let named = match color.to_ascii_lowercase().as_str() {
        "white" => Some("FFFFFF"),
        "black" => Some("000000"),
        "red" => Some("FF0000"),
        "green" => Some("00FF00"),
        "blue" => Some("0000FF"),
        "yellow" => Some("FFFF00"),
        "cyan" => Some("00FFFF"),
        "magenta" => Some("FF00FF"),
        _ => None,
    };
    if let Some(hex) = named {
        return hex.to_string();
    }
    let trimmed = color.strip_prefix('#').unwrap_or(color);
    if trimmed.len() == 6 && trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        trimmed.to_ascii_uppercase()
    } else {
        "FFFFFF".to_string()
    }
}

/// Render a full command line for display (dry runs, logs).
pub fn format_command(program: &Path, args: &[String]) -> String {
    let program = program.to_string_lossy();
    let mut parts: Vec<String> = Vec::with_capacity(args.len() + 1);
    parts.push(quote_arg(&program));
    parts.extend(args.iter().map(|a| quote_arg(a)));
    parts.join(" ")
}

fn quote_arg(arg: &str) -> String {
    shlex::try_quote(arg)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| arg.to_string())
}

fn str_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{JobRequest, Timecode};
    use std::path::PathBuf;

    fn trim_request(mode: EncodeMode, stream_copy: bool) -> JobRequest {
        JobRequest {
            input: PathBuf::from("/videos/in.mp4"),
            output: PathBuf::from("/videos/out.mp4"),
            operation: Operation::Trim {
                start: "00:00:10".parse::<Timecode>().unwrap(),
                end: "00:01:00".parse::<Timecode>().unwrap(),
                stream_copy,
            },
            mode,
            quality: QualityPreset::Medium,
            overwrite: true,
            extra_args: None,
        }
    }

    #[test]
    fn seek_args_precede_input() {
        let args = build_args(&trim_request(EncodeMode::Cpu, false)).unwrap();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let to = args.iter().position(|a| a == "-to").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < input);
        assert!(to < input);
        assert_eq!(args[ss + 1], "00:00:10");
        assert_eq!(args[to + 1], "00:01:00");
    }

    #[test]
    fn stream_copy_has_no_encoder_or_filter() {
        let args = build_args(&trim_request(EncodeMode::NvencCuda, true)).unwrap();
        assert!(args.contains(&"-c".to_string()));
        assert!(args.contains(&"copy".to_string()));
        assert!(!args.contains(&"-c:v".to_string()));
        assert!(!args.contains(&"-vf".to_string()));
        assert!(!args.contains(&"-hwaccel".to_string()));
    }

    #[test]
    fn cpu_mode_never_emits_gpu_tokens() {
        let args = build_args(&trim_request(EncodeMode::Cpu, false)).unwrap();
        for token in ["h264_nvenc", "h264_amf", "cuda", "opencl", "d3d11va"] {
            assert!(
                !args.iter().any(|a| a.contains(token)),
                "found GPU token {token:?} in {args:?}"
            );
        }
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"-crf".to_string()));
    }

    #[test]
    fn cuda_trim_keeps_frames_on_gpu() {
        let args = build_args(&trim_request(EncodeMode::NvencCuda, false)).unwrap();
        let hw = args.iter().position(|a| a == "-hwaccel").unwrap();
        assert_eq!(args[hw + 1], "cuda");
        assert!(args.contains(&"-hwaccel_output_format".to_string()));
        assert!(args.contains(&"h264_nvenc".to_string()));
        assert!(args.contains(&"-b:v".to_string()));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut req = trim_request(EncodeMode::Cpu, false);
        req.operation = Operation::Trim {
            start: "00:02:00".parse().unwrap(),
            end: "00:01:00".parse().unwrap(),
            stream_copy: false,
        };
        assert!(matches!(
            build_args(&req),
            Err(BuildError::EndBeforeStart { .. })
        ));

        // zero-length range is also invalid
        req.operation = Operation::Trim {
            start: "00:01:00".parse().unwrap(),
            end: "00:01:00".parse().unwrap(),
            stream_copy: false,
        };
        assert!(build_args(&req).is_err());
    }

    fn burn_request(subtitle: &str) -> JobRequest {
        JobRequest {
            input: PathBuf::from("/videos/in.mp4"),
            output: PathBuf::from("/videos/out.mp4"),
            operation: Operation::SubtitleBurn {
                subtitle_path: PathBuf::from(subtitle),
                style: SubtitleStyle {
                    font_size: 32,
                    color: "yellow".to_string(),
                    alignment: None,
                },
            },
            mode: EncodeMode::NvencCuda,
            quality: QualityPreset::High,
            overwrite: false,
            extra_args: None,
        }
    }

    #[test]
    fn burn_builds_subtitles_filter_with_style() {
        let args = build_args(&burn_request("/subs/movie.srt")).unwrap();
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        let filter = &args[vf + 1];
        assert!(filter.starts_with("subtitles="));
        assert!(filter.contains("FontSize=32"));
        assert!(filter.contains("PrimaryColour=&HFFFF00"));
        // burn decodes to system memory even in CUDA mode
        assert!(args.contains(&"-hwaccel".to_string()));
        assert!(!args.contains(&"-hwaccel_output_format".to_string()));
        assert!(args.contains(&"-n".to_string()));
    }

    #[test]
    fn burn_rejects_unknown_subtitle_format() {
        assert!(matches!(
            build_args(&burn_request("/subs/movie.txt")),
            Err(BuildError::UnsupportedSubtitleFormat(_))
        ));
        assert!(build_args(&burn_request("/subs/noext")).is_err());
        // extension check is case-insensitive
        assert!(build_args(&burn_request("/subs/movie.SRT")).is_ok());
    }

    #[test]
    fn filter_value_escaping_covers_reserved_chars() {
        assert_eq!(
            escape_filter_value("it's, a [test]: ok;"),
            "it\\'s\\, a \\[test\\]\\: ok\\;"
        );
        assert_eq!(escape_filter_value("plain/path.srt"), "plain/path.srt");
    }

    #[test]
    fn extra_args_are_shell_split() {
        let mut req = trim_request(EncodeMode::Cpu, false);
        req.extra_args = Some("-movflags +faststart".to_string());
        let args = build_args(&req).unwrap();
        let pos = args.iter().position(|a| a == "-movflags").unwrap();
        assert_eq!(args[pos + 1], "+faststart");
        // extra args sit before the output path
        assert!(pos < args.len() - 1);

        req.extra_args = Some("\"unclosed".to_string());
        assert!(matches!(
            build_args(&req),
            Err(BuildError::BadExtraArgs(_))
        ));
    }

    #[test]
    fn alignment_joins_the_force_style_block() {
        let style = SubtitleStyle {
            alignment: Some(2),
            ..SubtitleStyle::default()
        };
        let filter = subtitle_filter(Path::new("/subs/a.srt"), &style);
        assert!(filter.ends_with("force_style='FontSize=24,PrimaryColour=&HFFFFFF,Alignment=2'"));
    }

    #[test]
    fn color_table_matches_known_names() {
        assert_eq!(color_to_hex("white"), "FFFFFF");
        assert_eq!(color_to_hex("Red"), "FF0000");
        assert_eq!(color_to_hex("#1a2b3c"), "1A2B3C");
        assert_eq!(color_to_hex("not-a-color"), "FFFFFF");
    }

    #[test]
    fn same_input_output_is_rejected() {
        let mut req = trim_request(EncodeMode::Cpu, false);
        req.output = req.input.clone();
        assert!(matches!(
            build_args(&req),
            Err(BuildError::OutputIsInput(_))
        ));
    }

    #[test]
    fn format_command_quotes_spaces() {
        let rendered = format_command(
            Path::new("/usr/bin/ffmpeg"),
            &["-i".to_string(), "my file.mp4".to_string()],
        );
        assert_eq!(rendered, "/usr/bin/ffmpeg -i 'my file.mp4'");
    }
}
