//! Transcoder capability interface
//!
//! The supervisor never talks to ffmpeg directly; it launches jobs through
//! this trait so the engine can be swapped or mocked in tests without
//! touching any lifecycle logic.

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::error::Result;

use super::event::ProcessEvent;

/// What to transcode and where the output goes
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Pull URL of the live stream to read from
    pub input_url: String,

    /// Output arguments, passed through opaquely (codec, quality, segmenting)
    pub output_args: Vec<String>,

    /// Path of the HLS playlist to write
    pub playlist_path: PathBuf,
}

/// A launched transcoding process
///
/// Events arrive on `events` until the process ends; the channel closes
/// after the terminal `Finished`/`Failed` event. `handle` requests
/// termination; actual exit is still observed through the events.
pub struct LaunchedJob {
    /// Event stream from the process
    pub events: mpsc::Receiver<ProcessEvent>,

    /// Termination handle
    pub handle: Box<dyn ProcessHandle>,
}

/// Handle for requesting termination of a launched process
pub trait ProcessHandle: Send {
    /// Request that the process be terminated
    ///
    /// Must be safe to call more than once; the exit itself is reported
    /// asynchronously via the event stream.
    fn terminate(&mut self);
}

/// A transcoding engine that can launch jobs
pub trait Transcoder: Send + Sync + 'static {
    /// Launch a transcoding process for the given spec
    ///
    /// Returns immediately once the process is spawned; readiness and exit
    /// are observed through the returned event stream.
    fn launch(&self, spec: &JobSpec) -> Result<LaunchedJob>;
}
