use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::types::Timecode;

/// Request validation failures caught before any process is spawned.
#[derive(Debug, Error, PartialEq)]
pub enum BuildError {
    #[error("end time {end} is not after start time {start}")]
    EndBeforeStart { start: Timecode, end: Timecode },

    #[error("unsupported subtitle format '{0}' (expected .srt, .ass, .ssa, .vtt, or .sub)")]
    UnsupportedSubtitleFormat(PathBuf),

    #[error("output path has no file name: {0}")]
    BadOutputPath(PathBuf),

    #[error("input and output refer to the same file: {0}")]
    OutputIsInput(PathBuf),

    #[error("could not parse extra ffmpeg arguments: {0}")]
    BadExtraArgs(String),
}

/// Operational failures from probing or running FFmpeg.
///
/// An encode that starts and then fails is not an `EngineError`; that is
/// reported through `JobOutcome::Failed` with the captured log.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("ffmpeg not found or not executable at '{path}'")]
    ToolNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("capability probe failed: {0}")]
    Probe(String),

    #[error("invalid job request")]
    Build(#[from] BuildError),

    #[error("failed to spawn '{program}'")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("i/o error while running ffmpeg")]
    Io(#[from] io::Error),
}
