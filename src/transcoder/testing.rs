//! Channel-backed mock transcoder shared by job, supervisor, and bridge tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::error::{Error, Result};

use super::engine::{JobSpec, LaunchedJob, ProcessHandle, Transcoder};
use super::event::{ProcessEvent, ProgressStats};

/// Test double for [`Transcoder`]
///
/// Records every launch and hands the test a control for driving the fake
/// process's event stream. Termination behaves like a kill: the fake process
/// reports an abnormal exit.
#[derive(Default)]
pub(crate) struct MockTranscoder {
    launches: Mutex<Vec<MockProcess>>,
    fail_next_launch: AtomicBool,
    hang_on_terminate: AtomicBool,
}

impl MockTranscoder {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `launch` call fail with a spawn error
    pub(crate) fn fail_next_launch(&self) {
        self.fail_next_launch.store(true, Ordering::SeqCst);
    }

    /// Make launched processes record termination but never exit
    pub(crate) fn hang_on_terminate(&self) {
        self.hang_on_terminate.store(true, Ordering::SeqCst);
    }

    pub(crate) fn launch_count(&self) -> usize {
        self.launches.lock().unwrap().len()
    }

    /// Control for the most recent launch
    pub(crate) fn last(&self) -> MockProcess {
        self.launches
            .lock()
            .unwrap()
            .last()
            .expect("no launches recorded")
            .clone()
    }

    /// Control for the n-th launch (0-based)
    pub(crate) fn process(&self, index: usize) -> MockProcess {
        self.launches.lock().unwrap()[index].clone()
    }
}

impl Transcoder for MockTranscoder {
    fn launch(&self, spec: &JobSpec) -> Result<LaunchedJob> {
        if self.fail_next_launch.swap(false, Ordering::SeqCst) {
            return Err(Error::JobLaunchFailure(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "mock launch failure",
            )));
        }

        let (tx, rx) = mpsc::channel(16);
        let terminated = Arc::new(AtomicBool::new(false));

        let process = MockProcess {
            events: tx.clone(),
            terminated: Arc::clone(&terminated),
            spec: spec.clone(),
        };
        self.launches.lock().unwrap().push(process);

        Ok(LaunchedJob {
            events: rx,
            handle: Box::new(MockHandle {
                events: tx,
                terminated,
                hang: self.hang_on_terminate.load(Ordering::SeqCst),
            }),
        })
    }
}

/// Test-side control over one fake process
#[derive(Clone)]
pub(crate) struct MockProcess {
    events: mpsc::Sender<ProcessEvent>,
    terminated: Arc<AtomicBool>,
    pub(crate) spec: JobSpec,
}

impl MockProcess {
    pub(crate) async fn started(&self) {
        let _ = self
            .events
            .send(ProcessEvent::Started {
                command: "mock-transcoder".to_string(),
            })
            .await;
    }

    pub(crate) async fn progress(&self) {
        let _ = self
            .events
            .send(ProcessEvent::Progress(ProgressStats {
                frame: Some(1),
                ..ProgressStats::default()
            }))
            .await;
    }

    pub(crate) async fn finish(&self) {
        let _ = self.events.send(ProcessEvent::Finished).await;
    }

    pub(crate) async fn fail(&self, message: &str) {
        let _ = self
            .events
            .send(ProcessEvent::Failed {
                message: message.to_string(),
            })
            .await;
    }

    pub(crate) fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

struct MockHandle {
    events: mpsc::Sender<ProcessEvent>,
    terminated: Arc<AtomicBool>,
    hang: bool,
}

impl ProcessHandle for MockHandle {
    fn terminate(&mut self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.hang {
            return;
        }
        // A killed process exits abnormally.
        let _ = self.events.try_send(ProcessEvent::Failed {
            message: "terminated".to_string(),
        });
    }
}
