//! Transcode job implementation
//!
//! A job wraps one transcoding subprocess for one stream key. The subprocess
//! is driven by a spawned task that owns the event stream and the
//! termination handle; the job itself only exposes the published state, a
//! stop request, and a way to await the terminal state. Nested callbacks are
//! avoided on purpose: every transition goes through the state machine in
//! [`super::state`], which keeps stop idempotency independently testable.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use crate::error::Result;
use crate::registry::StreamKey;
use crate::transcoder::{JobSpec, LaunchedJob, ProcessEvent, Transcoder};

use super::state::JobState;

/// One supervised transcoding subprocess
pub struct TranscodeJob {
    key: StreamKey,
    input_url: String,
    playlist: std::path::PathBuf,
    state_rx: watch::Receiver<JobState>,
    stop_tx: watch::Sender<bool>,
    started_at: Instant,
}

impl TranscodeJob {
    /// Launch the subprocess and begin driving it
    ///
    /// Non-blocking: returns as soon as the process is spawned, with the job
    /// in `Starting`. At-most-one-job-per-key is the registry's guarantee,
    /// not this function's.
    pub fn start(
        key: StreamKey,
        spec: JobSpec,
        transcoder: &Arc<dyn Transcoder>,
    ) -> Result<Arc<Self>> {
        let input_url = spec.input_url.clone();
        let playlist = spec.playlist_path.clone();

        let launched = transcoder.launch(&spec)?;

        let (state_tx, state_rx) = watch::channel(JobState::Created);
        let (stop_tx, stop_rx) = watch::channel(false);

        state_tx.send_replace(JobState::Starting);
        tokio::spawn(drive(key.clone(), launched, state_tx, stop_rx));

        Ok(Arc::new(Self {
            key,
            input_url,
            playlist,
            state_rx,
            stop_tx,
            started_at: Instant::now(),
        }))
    }

    /// The stream key this job transcodes
    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Pull URL the subprocess reads from
    pub fn input_url(&self) -> &str {
        &self.input_url
    }

    /// Playlist path the subprocess writes to
    pub fn playlist(&self) -> &Path {
        &self.playlist
    }

    /// Current lifecycle state
    pub fn state(&self) -> JobState {
        *self.state_rx.borrow()
    }

    /// Time since the job was started
    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Request that the subprocess be stopped
    ///
    /// Idempotent and safe in any state; a no-op once the job is terminal.
    /// Returns immediately; await [`wait_terminal`](Self::wait_terminal) for
    /// the actual exit.
    pub fn stop(&self) {
        if self.state().is_terminal() {
            return;
        }
        self.stop_tx.send_replace(true);
    }

    /// Await the terminal state (`Stopped` or `Failed`)
    pub async fn wait_terminal(&self) -> JobState {
        let mut rx = self.state_rx.clone();
        let waited = rx
            .wait_for(|state| state.is_terminal())
            .await
            .map(|state| *state);
        match waited {
            Ok(state) => state,
            // Driver exited; the last published value is the terminal one.
            Err(_) => *rx.borrow(),
        }
    }
}

/// Drive one subprocess to its terminal state
///
/// Owns the event stream and the termination handle. The stop request is a
/// level, not an edge: however many times `stop()` was called, termination
/// is sent at most once, and every exit after a stop request lands in
/// `Stopped`.
async fn drive(
    key: StreamKey,
    mut launched: LaunchedJob,
    state: watch::Sender<JobState>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut termination_sent = false;

    loop {
        tokio::select! {
            changed = stop_rx.changed(), if !termination_sent => {
                // A dropped job handle counts as a stop request: the
                // subprocess must not outlive its owner.
                let requested = match changed {
                    Ok(()) => *stop_rx.borrow_and_update(),
                    Err(_) => true,
                };
                if requested {
                    state.send_replace(JobState::Stopping);
                    launched.handle.terminate();
                    termination_sent = true;
                    tracing::debug!(stream = %key, "Termination requested");
                }
            }
            event = launched.events.recv() => match event {
                Some(ProcessEvent::Started { command }) => {
                    tracing::info!(stream = %key, command = %command, "Transcoder spawned");
                    promote_to_running(&key, &state, termination_sent);
                }
                Some(ProcessEvent::Progress(stats)) => {
                    tracing::debug!(
                        stream = %key,
                        frame = ?stats.frame,
                        fps = ?stats.fps,
                        out_time = ?stats.out_time,
                        speed = ?stats.speed,
                        "Transcoding progress"
                    );
                    promote_to_running(&key, &state, termination_sent);
                }
                Some(ProcessEvent::Finished) => {
                    tracing::info!(stream = %key, "Transcoder finished");
                    state.send_replace(JobState::Stopped);
                    break;
                }
                Some(ProcessEvent::Failed { message }) => {
                    if termination_sent {
                        tracing::debug!(stream = %key, detail = %message, "Transcoder exited after termination");
                        state.send_replace(JobState::Stopped);
                    } else {
                        tracing::error!(stream = %key, error = %message, "Transcoding failed");
                        state.send_replace(JobState::Failed);
                    }
                    break;
                }
                None => {
                    if termination_sent {
                        state.send_replace(JobState::Stopped);
                    } else {
                        tracing::error!(stream = %key, "Transcoder event stream closed unexpectedly");
                        state.send_replace(JobState::Failed);
                    }
                    break;
                }
            }
        }
    }
}

fn promote_to_running(key: &StreamKey, state: &watch::Sender<JobState>, termination_sent: bool) {
    if termination_sent {
        return;
    }
    if *state.borrow() == JobState::Starting {
        state.send_replace(JobState::Running);
        tracing::info!(stream = %key, "Encoding began");
    }
}
