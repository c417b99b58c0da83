use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use crate::cli::{Cli, Commands};
use ffclip::config::Config;
use ffclip::engine::worker::{JobWorker, WorkerMessage};
use ffclip::engine::{
    EncodeMode, JobOutcome, JobRequest, Operation, QualityPreset, SubtitleStyle, capability,
    command, probe,
};

pub fn run(cli: Cli) {
    let mut config = Config::load().unwrap_or_default();
    let ffmpeg = resolve_ffmpeg(&cli, &config);

    match cli.command {
        Commands::CheckFfmpeg => handle_check_ffmpeg(&ffmpeg),
        Commands::Detect => handle_detect(&ffmpeg),
        Commands::Probe { file } => handle_probe(&ffmpeg, &file),
        Commands::Trim {
            input,
            start,
            end,
            output,
            copy,
            mode,
            quality,
            overwrite,
            dry_run,
            no_fallback,
        } => {
            let operation = Operation::Trim {
                start,
                end,
                stream_copy: copy,
            };
            let output = output.unwrap_or_else(|| derived_output(&input, &config, "_trimmed"));
            let req = job_request(&config, input, output, operation, mode, quality, overwrite);
            // Output time in a trim counts from the cut start, so progress
            // is measured against the clip length, not the source length.
            let duration = Some((end.as_secs_f64() - start.as_secs_f64()).max(0.0));
            run_or_print(&ffmpeg, &mut config, req, duration, dry_run, no_fallback);
        }
        Commands::Burn {
            input,
            subtitle,
            output,
            font_size,
            color,
            alignment,
            mode,
            quality,
            overwrite,
            dry_run,
            no_fallback,
        } => {
            let style = SubtitleStyle {
                font_size: font_size.unwrap_or(config.subtitle.font_size),
                color: color.unwrap_or_else(|| config.subtitle.font_color.clone()),
                alignment,
            };
            let operation = Operation::SubtitleBurn {
                subtitle_path: subtitle,
                style,
            };
            let output = output.unwrap_or_else(|| derived_output(&input, &config, "_subtitled"));
            // a dry run must not touch ffprobe either
            let duration = if dry_run {
                None
            } else {
                probe::probe_input_info(&ffmpeg, &input)
                    .ok()
                    .and_then(|info| info.duration)
            };
            let req = job_request(&config, input, output, operation, mode, quality, overwrite);
            run_or_print(&ffmpeg, &mut config, req, duration, dry_run, no_fallback);
        }
        Commands::InitConfig => handle_init_config(),
    }
}

fn resolve_ffmpeg(cli: &Cli, config: &Config) -> PathBuf {
    cli.ffmpeg
        .clone()
        .or_else(|| config.general.ffmpeg_path.clone())
        .unwrap_or_else(capability::default_ffmpeg_path)
}

fn job_request(
    config: &Config,
    input: PathBuf,
    output: PathBuf,
    operation: Operation,
    mode: Option<EncodeMode>,
    quality: Option<QualityPreset>,
    overwrite: bool,
) -> JobRequest {
    let extra = config.general.extra_ffmpeg_args.trim();
    JobRequest {
        input,
        output,
        operation,
        mode: mode.unwrap_or(config.general.default_mode),
        quality: quality.unwrap_or(config.general.video_quality),
        overwrite: overwrite || config.general.overwrite,
        extra_args: if extra.is_empty() {
            None
        } else {
            Some(extra.to_string())
        },
    }
}

/// `<stem><suffix>.<ext>` in the configured output directory, falling
/// back to the input's directory.
fn derived_output(input: &Path, config: &Config, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mp4".to_string());
    let dir = config
        .general
        .last_output_directory
        .clone()
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    dir.join(format!("{stem}{suffix}.{ext}"))
}

fn run_or_print(
    ffmpeg: &Path,
    config: &mut Config,
    req: JobRequest,
    duration: Option<f64>,
    dry_run: bool,
    no_fallback: bool,
) {
    if dry_run {
        match command::build_args(&req) {
            Ok(args) => println!("{}", command::format_command(ffmpeg, &args)),
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        }
        return;
    }

    let signatures = if no_fallback || !config.fallback.enabled {
        Vec::new()
    } else {
        config.fallback.signatures.clone()
    };

    let input = req.input.clone();
    let worker = JobWorker::spawn(ffmpeg.to_path_buf(), req, signatures, duration);

    let mut result = None;
    for msg in worker.receiver() {
        match msg {
            WorkerMessage::Started => {}
            WorkerMessage::Progress {
                progress_pct,
                out_time_s,
                speed,
                ..
            } => {
                let pct = progress_pct
                    .map(|p| format!("{p:5.1}%"))
                    .unwrap_or_else(|| "  ...".to_string());
                let time = out_time_s
                    .map(|t| format!("{t:.1}s"))
                    .unwrap_or_else(|| "-".to_string());
                let speed = speed
                    .map(|s| format!("{s:.2}x"))
                    .unwrap_or_else(|| "-".to_string());
                print!("\rProgress: {pct} | time {time} | speed {speed}   ");
                let _ = std::io::stdout().flush();
            }
            WorkerMessage::LogLine(_) => {}
            WorkerMessage::Finished(r) => {
                result = Some(r);
                break;
            }
        }
    }
    worker.join();
    println!();

    match result {
        Some(Ok(job)) => {
            match job.outcome {
                JobOutcome::Success => {
                    if let Some(out) = &job.output {
                        println!("Done: {}", out.display());
                    }
                    remember_paths(config, &input, &job.output);
                }
                JobOutcome::FellBackToCpu => {
                    println!("GPU encoder failed to initialize; completed on CPU.");
                    if let Some(out) = &job.output {
                        println!("Done: {}", out.display());
                    }
                    remember_paths(config, &input, &job.output);
                }
                JobOutcome::Failed => {
                    eprintln!("Encoding failed. Last ffmpeg output:");
                    for line in last_lines(&job.log, 10) {
                        eprintln!("  {line}");
                    }
                    process::exit(1);
                }
                JobOutcome::Cancelled => {
                    eprintln!("Cancelled.");
                    process::exit(1);
                }
            }
        }
        Some(Err(e)) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
        None => {
            eprintln!("Error: worker exited without a result");
            process::exit(1);
        }
    }
}

fn last_lines(log: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = log.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].to_vec()
}

fn remember_paths(config: &mut Config, input: &Path, output: &Option<PathBuf>) {
    config.add_recent_file(input);
    if let Some(dir) = input.parent() {
        config.general.last_input_directory = Some(dir.to_path_buf());
    }
    if let Some(dir) = output.as_deref().and_then(Path::parent) {
        config.general.last_output_directory = Some(dir.to_path_buf());
    }
    if let Err(e) = config.save() {
        eprintln!("Warning: could not save config: {e:#}");
    }
}

fn handle_check_ffmpeg(ffmpeg: &Path) {
    match capability::probe(ffmpeg) {
        Ok(report) => {
            println!("ffmpeg found: {}", report.ffmpeg_version);
            match ffprobe_version(ffmpeg) {
                Ok(version) => {
                    println!("ffprobe found: {version}");
                }
                Err(e) => {
                    eprintln!("Error: {e:#}");
                    process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", anyhow::Error::from(e));
            process::exit(1);
        }
    }
}

fn ffprobe_version(ffmpeg: &Path) -> anyhow::Result<String> {
    use anyhow::Context;
    let ffprobe = probe::ffprobe_path(ffmpeg);
    let output = process::Command::new(&ffprobe)
        .arg("-version")
        .output()
        .with_context(|| format!("failed to run '{}'", ffprobe.display()))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().next().unwrap_or("");
    first
        .strip_prefix("ffprobe version ")
        .map(|v| v.split_whitespace().next().unwrap_or(v).to_string())
        .ok_or_else(|| anyhow::anyhow!("unrecognized `ffprobe -version` output"))
}

fn handle_detect(ffmpeg: &Path) {
    match capability::probe(ffmpeg) {
        Ok(report) => {
            println!("ffmpeg version: {}", report.ffmpeg_version);
            match (&report.vendor, &report.gpu_model) {
                (capability::GpuVendor::Unknown, _) => println!("GPU: none detected"),
                (vendor, Some(model)) => println!("GPU: {vendor:?} ({model})"),
                (vendor, None) => println!("GPU: {vendor:?}"),
            }
            println!("NVENC encoders: {}", yes_no(report.nvenc));
            println!("AMF encoders:   {}", yes_no(report.amf));
            println!("CUDA hwaccel:   {}", yes_no(report.hwaccel_cuda));
            println!("OpenCL hwaccel: {}", yes_no(report.hwaccel_opencl));
            let modes: Vec<&str> = report
                .supported_modes()
                .iter()
                .map(|m| m.label())
                .collect();
            println!("Supported modes: {}", modes.join(", "));
            println!("Recommended mode: {}", report.recommended_mode());
        }
        Err(e) => {
            eprintln!("Error: {:#}", anyhow::Error::from(e));
            process::exit(1);
        }
    }
}

fn yes_no(v: bool) -> &'static str {
    if v { "yes" } else { "no" }
}

fn handle_probe(ffmpeg: &Path, file: &Path) {
    match probe::probe_input_info(ffmpeg, file) {
        Ok(info) => {
            println!("Resolution: {}x{}", info.width, info.height);
            println!("Framerate:  {:.3} fps", info.fps);
            match info.duration {
                Some(d) => println!("Duration:   {:.2} seconds", d),
                None => println!("Duration:   unknown"),
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", anyhow::Error::from(e));
            process::exit(1);
        }
    }
}

fn handle_init_config() {
    match Config::load() {
        Ok(cfg) => {
            match Config::config_path() {
                Ok(path) => println!("Config loaded successfully from {}", path.display()),
                Err(e) => println!("Config loaded, but config path unknown: {e:#}"),
            }
            println!("{cfg:#?}");
        }
        Err(e) => {
            println!("Config missing or invalid: {e:#}");
            println!("Creating default config...");

            let cfg = Config::default();
            if let Err(err) = cfg.save() {
                eprintln!("Failed to save default config: {err:#}");
                process::exit(1);
            }
            match Config::config_path() {
                Ok(path) => println!("Default config saved to {}", path.display()),
                Err(e) => println!("Default config saved (path unknown): {e:#}"),
            }
        }
    }
}
