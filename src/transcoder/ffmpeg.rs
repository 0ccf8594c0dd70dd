//! ffmpeg-backed transcoder
//!
//! Spawns one ffmpeg process per job with `-progress pipe:1 -nostats`, so
//! encoding progress arrives as machine-readable `key=value` blocks on
//! stdout while stderr stays quiet except for real errors. Termination is a
//! kill; the resulting exit is reported through the event stream like any
//! other exit.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

use super::engine::{JobSpec, LaunchedJob, ProcessHandle, Transcoder};
use super::event::{ProcessEvent, ProgressStats};

/// Capacity of the per-process event channel
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Number of stderr lines kept for failure messages
const STDERR_TAIL_LINES: usize = 8;

/// Launches ffmpeg subprocesses
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: PathBuf,
}

impl FfmpegTranscoder {
    /// Create a transcoder using the given ffmpeg binary
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    fn build_args(&self, spec: &JobSpec) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-nostats",
            "-progress",
            "pipe:1",
            "-i",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        args.push(spec.input_url.clone());
        args.extend(spec.output_args.iter().cloned());
        args.push(spec.playlist_path.to_string_lossy().into_owned());
        args
    }
}

impl Transcoder for FfmpegTranscoder {
    fn launch(&self, spec: &JobSpec) -> Result<LaunchedJob> {
        let args = self.build_args(spec);

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(Error::JobLaunchFailure)?;

        let command = format!("{} {}", self.ffmpeg_path.display(), args.join(" "));

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let term = Arc::new(Notify::new());

        // Sent before the reader tasks exist, so it is always the first event.
        let _ = tx.try_send(ProcessEvent::Started { command });

        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                // kill_on_drop reaps the child when it goes out of scope here.
                return Err(Error::JobLaunchFailure(std::io::Error::other(
                    "ffmpeg stdio pipes missing after spawn",
                )));
            }
        };

        tokio::spawn(read_progress(stdout, tx.clone()));
        let stderr_task = tokio::spawn(read_stderr_tail(stderr));
        tokio::spawn(drive(child, Arc::clone(&term), tx, stderr_task));

        Ok(LaunchedJob {
            events: rx,
            handle: Box::new(FfmpegHandle { term }),
        })
    }
}

/// Termination handle for a spawned ffmpeg process
struct FfmpegHandle {
    term: Arc<Notify>,
}

impl ProcessHandle for FfmpegHandle {
    fn terminate(&mut self) {
        self.term.notify_one();
    }
}

/// Await process exit (or a termination request followed by exit) and emit
/// the terminal event.
async fn drive(
    mut child: Child,
    term: Arc<Notify>,
    tx: mpsc::Sender<ProcessEvent>,
    stderr_task: JoinHandle<String>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = term.notified() => {
            let _ = child.start_kill();
            child.wait().await
        }
    };

    let stderr_tail = stderr_task.await.unwrap_or_default();

    let event = match status {
        Ok(status) if status.success() => ProcessEvent::Finished,
        Ok(status) => {
            let message = if stderr_tail.is_empty() {
                format!("ffmpeg exited with {status}")
            } else {
                format!("ffmpeg exited with {status}: {stderr_tail}")
            };
            ProcessEvent::Failed { message }
        }
        Err(e) => ProcessEvent::Failed {
            message: format!("failed to await ffmpeg: {e}"),
        },
    };

    let _ = tx.send(event).await;
}

/// Parse `-progress` key=value blocks from stdout into progress events
async fn read_progress(stdout: ChildStdout, tx: mpsc::Sender<ProcessEvent>) {
    let mut lines = BufReader::new(stdout).lines();
    let mut stats = ProgressStats::default();

    while let Ok(Some(line)) = lines.next_line().await {
        if stats.apply_line(&line) {
            let snapshot = std::mem::take(&mut stats);
            if tx.send(ProcessEvent::Progress(snapshot)).await.is_err() {
                break;
            }
        }
    }
}

/// Collect the last few non-empty stderr lines for failure messages
async fn read_stderr_tail(stderr: ChildStderr) -> String {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    tail.into_iter().collect::<Vec<_>>().join(" | ")
}
