//! Event bridge between the protocol server and the supervisor
//!
//! The protocol server reports stream lifecycle notifications through a
//! cheaply clonable [`NotificationSender`]; a single long-lived dispatch
//! task, spawned once at bridge construction, translates them into
//! supervisor calls. Registering the listener exactly once is the point:
//! wiring a disconnect handler inside every connect handler accumulates
//! handlers across publishes and eventually fires stale ones.
//!
//! Dispatch is serialized per stream key, not globally: events for one key
//! run in arrival order, while distinct keys run on independent tasks. A
//! republished stream waiting out its old subprocess therefore never delays
//! another stream's connect or disconnect handling.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::registry::{JobSupervisor, StreamKey};

/// Stream lifecycle notification from the protocol server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLifecycleEvent {
    /// A client began publishing a stream
    PublishStart {
        /// Raw stream path as reported by the protocol server
        path: String,
    },
    /// A publishing client disconnected
    PublishEnd {
        /// Raw stream path as reported by the protocol server
        path: String,
    },
}

impl StreamLifecycleEvent {
    fn path(&self) -> &str {
        match self {
            StreamLifecycleEvent::PublishStart { path } => path,
            StreamLifecycleEvent::PublishEnd { path } => path,
        }
    }
}

/// Handle the protocol server uses to report notifications
#[derive(Clone)]
pub struct NotificationSender {
    tx: mpsc::Sender<StreamLifecycleEvent>,
}

impl NotificationSender {
    /// Report that a publish began on the given raw path
    pub async fn publish_start(&self, path: impl Into<String>) {
        self.send(StreamLifecycleEvent::PublishStart { path: path.into() })
            .await;
    }

    /// Report that the publish on the given raw path ended
    pub async fn publish_end(&self, path: impl Into<String>) {
        self.send(StreamLifecycleEvent::PublishEnd { path: path.into() })
            .await;
    }

    async fn send(&self, event: StreamLifecycleEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::warn!("Dropping stream notification: bridge is shut down");
        }
    }
}

/// Bridges protocol-server notifications into supervisor calls
pub struct EventBridge {
    sender: NotificationSender,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl EventBridge {
    /// Create the bridge and spawn its dispatch task
    ///
    /// Channel capacity comes from the supervisor's configuration.
    pub fn new(supervisor: Arc<JobSupervisor>) -> Self {
        let (tx, rx) = mpsc::channel(supervisor.config().event_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(dispatch(supervisor, rx, shutdown_rx));

        Self {
            sender: NotificationSender { tx },
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Get a sender for the protocol server to report notifications with
    pub fn sender(&self) -> NotificationSender {
        self.sender.clone()
    }

    /// Shut the bridge down
    ///
    /// Notifications already queued are still dispatched and in-flight
    /// supervisor calls are awaited; then the task exits, even while sender
    /// clones are still held elsewhere (anything they send afterwards is
    /// dropped with a warning). Jobs themselves are the supervisor's
    /// business; call [`JobSupervisor::shutdown_all`] for those.
    pub async fn close(self) {
        drop(self.sender);
        let _ = self.shutdown.send(());
        let _ = self.task.await;
    }
}

/// The single long-lived dispatch loop
async fn dispatch(
    supervisor: Arc<JobSupervisor>,
    mut rx: mpsc::Receiver<StreamLifecycleEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut dispatcher = KeyedDispatch {
        supervisor,
        in_flight: HashMap::new(),
    };

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => dispatcher.handle(event),
                None => break,
            },
            _ = &mut shutdown => {
                // Hand off what was already queued, then stop listening.
                while let Ok(event) = rx.try_recv() {
                    dispatcher.handle(event);
                }
                break;
            }
        }
    }

    dispatcher.drain().await;
    tracing::debug!("Bridge dispatch task exiting");
}

/// Runs supervisor calls serialized per stream key
///
/// Each event's call is chained behind the previous call for the same key,
/// preserving the protocol server's per-stream connect-before-disconnect
/// order. Distinct keys never wait on each other.
struct KeyedDispatch {
    supervisor: Arc<JobSupervisor>,
    in_flight: HashMap<StreamKey, JoinHandle<()>>,
}

impl KeyedDispatch {
    fn handle(&mut self, event: StreamLifecycleEvent) {
        let key = match StreamKey::from_path(event.path()) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(path = event.path(), error = %e, "Rejecting notification");
                return;
            }
        };

        self.in_flight.retain(|_, task| !task.is_finished());

        let previous = self.in_flight.remove(&key);
        let supervisor = Arc::clone(&self.supervisor);
        let task = tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            run(&supervisor, event).await;
        });
        self.in_flight.insert(key, task);
    }

    /// Await every in-flight supervisor call
    async fn drain(self) {
        for (_, task) in self.in_flight {
            let _ = task.await;
        }
    }
}

async fn run(supervisor: &Arc<JobSupervisor>, event: StreamLifecycleEvent) {
    match event {
        StreamLifecycleEvent::PublishStart { path } => {
            tracing::info!(path = %path, "Stream connected");
            if let Err(e) = supervisor.on_publish_start(&path).await {
                tracing::error!(path = %path, error = %e, "Publish rejected");
            }
        }
        StreamLifecycleEvent::PublishEnd { path } => {
            tracing::info!(path = %path, "Stream disconnected");
            supervisor.on_publish_end(&path).await;
        }
    }
}
