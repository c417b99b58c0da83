//! FFmpeg process execution with incremental stderr streaming.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use super::error::EngineError;
use super::types::StatsParser;

/// Shared cancellation flag. Cloning hands out another handle to the
/// same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What one FFmpeg invocation produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub success: bool,
    pub cancelled: bool,
    /// False when cancellation landed before the process was started.
    pub spawned: bool,
    pub exit_code: Option<i32>,
    /// Complete captured stderr.
    pub log: String,
    /// Final stats snapshot.
    pub stats: StatsParser,
}

impl RunOutcome {
    /// Last `n` non-empty log lines, for compact error reporting.
    pub fn log_tail(&self, n: usize) -> String {
        let lines: Vec<&str> = self.log.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(n);
        lines[start..].join("\n")
    }
}

/// Runs `ffmpeg` with `args`, streaming stderr line by line to
/// `on_line` along with the running stats snapshot.
///
/// Cancellation is observed between stderr reads: the child is killed,
/// reaped, and the outcome marked cancelled. The caller owns cleanup of
/// any partial output file; on a plain failure it is left in place for
/// inspection.
///
/// FFmpeg terminates stats lines with `\r`, so splitting happens on
/// both `\r` and `\n`.
pub fn run(
    ffmpeg: &Path,
    args: &[String],
    cancel: &CancelToken,
    on_line: &mut dyn FnMut(&str, &StatsParser),
) -> Result<RunOutcome, EngineError> {
    if cancel.is_cancelled() {
        debug!("cancelled before spawn");
        return Ok(RunOutcome {
            success: false,
            cancelled: true,
            spawned: false,
            exit_code: None,
            log: String::new(),
            stats: StatsParser::new(),
        });
    }

    debug!(program = %ffmpeg.display(), ?args, "spawning ffmpeg");
    let mut child = Command::new(ffmpeg)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ) {
                EngineError::ToolNotFound {
                    path: ffmpeg.to_path_buf(),
                    source: e,
                }
            } else {
                EngineError::Spawn {
                    program: ffmpeg.to_path_buf(),
                    source: e,
                }
            }
        })?;

    // stderr was just set to piped, so it is present on the child
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("child process has no stderr handle"))?;

    let mut log = String::new();
    let mut stats = StatsParser::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];
    let mut was_cancelled = false;

    loop {
        if cancel.is_cancelled() {
            warn!("cancellation requested, killing ffmpeg");
            let _ = child.kill();
            was_cancelled = true;
            break;
        }
        let n = stderr.read(&mut buf)?;
        if n == 0 {
            break;
        }
        pending.extend_from_slice(&buf[..n]);
        drain_lines(&mut pending, &mut |line| {
            stats.parse_line(line);
            log.push_str(line);
            log.push('\n');
            on_line(line, &stats);
        });
    }

    if !pending.is_empty() {
        let line = String::from_utf8_lossy(&pending).into_owned();
        let line = line.trim_end();
        if !line.is_empty() {
            stats.parse_line(line);
            log.push_str(line);
            log.push('\n');
            on_line(line, &stats);
        }
    }

    let status = child.wait()?;
    debug!(?status, cancelled = was_cancelled, "ffmpeg exited");

    Ok(RunOutcome {
        success: status.success() && !was_cancelled,
        cancelled: was_cancelled,
        spawned: true,
        exit_code: status.code(),
        log,
        stats,
    })
}

/// Pops every complete `\n`- or `\r`-terminated line from `pending`,
/// leaving the unterminated remainder in place.
fn drain_lines(pending: &mut Vec<u8>, emit: &mut dyn FnMut(&str)) {
    let mut start = 0;
    for i in 0..pending.len() {
        let b = pending[i];
        if b == b'\n' || b == b'\r' {
            if i > start {
                let line = String::from_utf8_lossy(&pending[start..i]);
                emit(&line);
            }
            start = i + 1;
        }
    }
    pending.drain(..start);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(chunks: &[&[u8]]) -> Vec<String> {
        let mut pending = Vec::new();
        let mut lines = Vec::new();
        for chunk in chunks {
            pending.extend_from_slice(chunk);
            drain_lines(&mut pending, &mut |l| lines.push(l.to_string()));
        }
        if !pending.is_empty() {
            lines.push(String::from_utf8_lossy(&pending).into_owned());
        }
        lines
    }

    #[test]
    fn splits_carriage_return_stats_lines() {
        let lines = collect(&[b"frame=1 time=00:00:01.00\rframe=2 time=00:00:02.00\r"]);
        assert_eq!(
            lines,
            vec!["frame=1 time=00:00:01.00", "frame=2 time=00:00:02.00"]
        );
    }

    #[test]
    fn reassembles_lines_across_chunk_boundaries() {
        let lines = collect(&[b"Error: some", b"thing broke\npartial"]);
        assert_eq!(lines, vec!["Error: something broke", "partial"]);
    }

    #[test]
    fn skips_empty_crlf_pairs() {
        let lines = collect(&[b"a\r\nb\n"]);
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn cancel_token_is_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
