// Background job execution with progress reporting over a channel

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use tracing::debug;

use super::fallback;
use super::runner::CancelToken;
use super::types::{JobRequest, JobResult, StatsParser};

/// Message from the job thread to the caller
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// The FFmpeg process is being launched
    Started,

    /// Progress update parsed from a stats line
    Progress {
        progress_pct: Option<f64>,
        out_time_s: Option<f64>,
        fps: Option<f64>,
        speed: Option<f64>,
        bitrate_kbps: Option<f64>,
    },

    /// A non-stats stderr line
    LogLine(String),

    /// The job reached a terminal state. Errors are pre-formatted;
    /// encode failures arrive as `Ok(JobResult)` with a Failed outcome.
    Finished(Result<JobResult, String>),
}

/// A job running on a background thread.
pub struct JobWorker {
    handle: JoinHandle<()>,
    rx: Receiver<WorkerMessage>,
    cancel: CancelToken,
}

impl JobWorker {
    /// Spawn a thread that builds and runs `req` under the fallback
    /// policy, streaming `WorkerMessage`s as it goes. `duration_secs`
    /// (from a prior input probe) turns time offsets into percentages.
    pub fn spawn(
        ffmpeg: PathBuf,
        req: JobRequest,
        signatures: Vec<String>,
        duration_secs: Option<f64>,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        let thread_cancel = cancel.clone();

        let handle = thread::spawn(move || {
            let _ = tx.send(WorkerMessage::Started);
            debug!(input = %req.input.display(), "job worker started");

            let tx_progress = tx.clone();
            let mut on_line = move |line: &str, stats: &StatsParser| {
                if line.contains("time=") || line.contains("frame=") {
                    let _ = tx_progress.send(WorkerMessage::Progress {
                        progress_pct: duration_secs.and_then(|d| stats.progress_pct(d)),
                        out_time_s: stats.time_secs,
                        fps: stats.fps,
                        speed: stats.speed,
                        bitrate_kbps: stats.bitrate_kbps,
                    });
                } else {
                    let _ = tx_progress.send(WorkerMessage::LogLine(line.to_string()));
                }
            };

            let result = fallback::run_job(&ffmpeg, &req, &signatures, &thread_cancel, &mut on_line);
            let _ = tx.send(WorkerMessage::Finished(
                result.map_err(|e| format!("{:#}", anyhow::Error::from(e))),
            ));
        });

        JobWorker { handle, rx, cancel }
    }

    pub fn receiver(&self) -> &Receiver<WorkerMessage> {
        &self.rx
    }

    /// Request cancellation. The running FFmpeg process is killed and
    /// the job finishes with a cancelled outcome.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the job thread to exit.
    pub fn join(self) {
        let _ = self.handle.join();
    }
}
