//! GPU failure classification and the one-shot CPU retry.
//!
//! A GPU encode that fails because the encoder could not initialize
//! (missing driver, no device, exhausted sessions) is retried exactly
//! once with the same request forced to CPU mode. Any other failure is
//! reported as-is; retrying would reproduce it.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use super::command;
use super::error::EngineError;
use super::runner::{self, CancelToken};
use super::types::{EncodeMode, JobOutcome, JobRequest, JobResult, StatsParser};

/// Log substrings that identify a GPU encoder initialization failure.
/// These are defaults; the config file can extend or replace them as
/// drivers grow new error strings.
pub const DEFAULT_FALLBACK_SIGNATURES: &[&str] = &[
    "Cannot load libnvidia-encode",
    "No NVENC capable devices found",
    "Failed to initialise NVENC",
    "OpenEncodeSessionEx failed",
    "Cannot load nvcuda.dll",
    "Cannot init CUDA",
    "Failed to create AMF context",
    "CreateComponent(AMFVideoEncoderVCE_AVC) failed",
    "AMF failed to initialise",
    "DLL amfrt64.dll failed to open",
];

pub fn default_signatures() -> Vec<String> {
    DEFAULT_FALLBACK_SIGNATURES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Returns the first signature found in `log`, if any.
pub fn match_encoder_init_failure<'a>(log: &str, signatures: &'a [String]) -> Option<&'a str> {
    signatures
        .iter()
        .map(String::as_str)
        .find(|sig| !sig.is_empty() && log.contains(sig))
}

/// Build and run a job, applying the fallback policy.
///
/// `on_line` receives every stderr line from every attempt, paired with
/// the running stats snapshot.
pub fn run_job(
    ffmpeg: &Path,
    req: &JobRequest,
    signatures: &[String],
    cancel: &CancelToken,
    on_line: &mut dyn FnMut(&str, &StatsParser),
) -> Result<JobResult, EngineError> {
    let args = command::build_args(req)?;
    let first = runner::run(ffmpeg, &args, cancel, on_line)?;

    if first.cancelled {
        // a pre-spawn cancel wrote nothing, leave the output path alone
        if first.spawned {
            remove_partial_output(&req.output);
        }
        return Ok(JobResult {
            outcome: JobOutcome::Cancelled,
            log: first.log,
            output: None,
        });
    }
    if first.success {
        return Ok(JobResult {
            outcome: JobOutcome::Success,
            log: first.log,
            output: Some(req.output.clone()),
        });
    }

    let matched = if req.mode.is_gpu() {
        match_encoder_init_failure(&first.log, signatures)
    } else {
        None
    };
    let Some(signature) = matched else {
        if req.mode.is_gpu() {
            warn!(
                mode = %req.mode,
                "encode failed without a recognized encoder-init signature, not retrying"
            );
        }
        return Ok(JobResult {
            outcome: JobOutcome::Failed,
            log: first.log,
            output: None,
        });
    };

    info!(signature, mode = %req.mode, "GPU encoder failed to initialize, retrying on CPU");
    remove_partial_output(&req.output);

    let cpu_req = JobRequest {
        mode: EncodeMode::Cpu,
        ..req.clone()
    };
    let cpu_args = command::build_args(&cpu_req)?;
    let second = runner::run(ffmpeg, &cpu_args, cancel, on_line)?;

    let mut log = first.log;
    log.push_str(&second.log);

    if second.cancelled {
        if second.spawned {
            remove_partial_output(&req.output);
        }
        return Ok(JobResult {
            outcome: JobOutcome::Cancelled,
            log,
            output: None,
        });
    }
    if second.success {
        return Ok(JobResult {
            outcome: JobOutcome::FellBackToCpu,
            log,
            output: Some(req.output.clone()),
        });
    }
    Ok(JobResult {
        outcome: JobOutcome::Failed,
        log,
        output: None,
    })
}

/// Removes a partial output file from an aborted attempt. A file left
/// by a plain failure is kept for inspection; this runs only on cancel
/// and before a fallback retry.
fn remove_partial_output(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "could not remove partial output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nvenc_init_failure_matches() {
        let sigs = default_signatures();
        let log = "[h264_nvenc @ 0x55] Cannot load libnvidia-encode.so.1\nConversion failed!";
        assert_eq!(
            match_encoder_init_failure(log, &sigs),
            Some("Cannot load libnvidia-encode")
        );

        let log = "[h264_nvenc @ 0x55] No NVENC capable devices found";
        assert!(match_encoder_init_failure(log, &sigs).is_some());
    }

    #[test]
    fn amf_init_failure_matches() {
        let sigs = default_signatures();
        let log = "[h264_amf @ 0x55] CreateComponent(AMFVideoEncoderVCE_AVC) failed with error 36";
        assert!(match_encoder_init_failure(log, &sigs).is_some());
    }

    #[test]
    fn unrelated_failure_does_not_match() {
        let sigs = default_signatures();
        let log = "av_interleaved_write_frame(): No space left on device";
        assert_eq!(match_encoder_init_failure(log, &sigs), None);
        assert_eq!(match_encoder_init_failure("", &sigs), None);
    }

    #[test]
    fn custom_signatures_extend_the_defaults() {
        let sigs = vec!["my custom driver exploded".to_string()];
        assert!(match_encoder_init_failure("oh no: my custom driver exploded", &sigs).is_some());
        assert!(match_encoder_init_failure("Cannot load libnvidia-encode", &sigs).is_none());
    }

    #[test]
    fn empty_signature_never_matches() {
        let sigs = vec![String::new()];
        assert_eq!(match_encoder_init_failure("anything", &sigs), None);
    }
}
