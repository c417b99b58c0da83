// FFmpeg orchestration engine - independent of the CLI surface

pub mod capability;
pub mod command;
pub mod error;
pub mod fallback;
pub mod probe;
pub mod runner;
pub mod types;
pub mod worker;

pub use capability::{CapabilityReport, GpuVendor};
pub use error::{BuildError, EngineError};
pub use runner::CancelToken;
pub use types::{
    EncodeMode, JobOutcome, JobRequest, JobResult, Operation, QualityPreset, StatsParser,
    SubtitleStyle, Timecode,
};
