//! FFmpeg orchestration for trimming videos and burning in subtitles.
//!
//! The engine probes what the local FFmpeg build and GPU can do, builds
//! argument vectors for trim and subtitle-burn jobs, runs them with
//! streamed progress, and retries once on CPU when a GPU encoder fails
//! to initialize.

pub mod config;
pub mod engine;
