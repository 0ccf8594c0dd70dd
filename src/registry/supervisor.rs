//! Job supervisor implementation
//!
//! The single authority over the stream-key-to-job mapping. Publish-start
//! and publish-end notifications land here; everything else (output
//! directories, subprocess lifecycles) is delegated and only orchestrated.
//!
//! Locking: the map itself is behind a `RwLock` held only for short,
//! non-awaiting sections. Per-key work is serialized by a `Mutex` slot per
//! key, so operations on distinct keys never wait on each other, while
//! start/replace/cleanup for one key can never interleave. Slots are removed
//! from the map only while their lock is held, and every lookup revalidates
//! that the slot it locked is still the mapped one.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::config::Config;
use crate::error::Result;
use crate::job::{JobState, TranscodeJob};
use crate::output::OutputLayout;
use crate::transcoder::{FfmpegTranscoder, JobSpec, Transcoder};

use super::key::StreamKey;

/// Per-key registry slot
///
/// `generation` increments on every job insertion so that a stale monitor
/// task (watching a job that has since been replaced) cannot clean up its
/// successor.
#[derive(Default)]
struct JobSlot {
    job: Option<Arc<TranscodeJob>>,
    generation: u64,
}

type Slot = Arc<Mutex<JobSlot>>;

/// Supervises one transcode job per active stream
pub struct JobSupervisor {
    /// Map of stream key to job slot
    jobs: RwLock<HashMap<StreamKey, Slot>>,

    /// Output directory layout
    layout: OutputLayout,

    /// Transcoding engine used to launch jobs
    transcoder: Arc<dyn Transcoder>,

    /// Configuration
    config: Config,
}

impl JobSupervisor {
    /// Create a supervisor using the given transcoding engine
    pub fn new(config: Config, transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            layout: OutputLayout::new(&config.media_root),
            transcoder,
            config,
        }
    }

    /// Create a supervisor backed by the configured ffmpeg binary
    pub fn with_ffmpeg(config: Config) -> Self {
        let transcoder = Arc::new(FfmpegTranscoder::new(&config.ffmpeg_path));
        Self::new(config, transcoder)
    }

    /// Get the supervisor configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle a publish-start notification
    ///
    /// Resolves the key, prepares the output location and starts a new job.
    /// A key with a live job is a duplicate publish: the previous job is
    /// stopped and awaited before the replacement starts (last-publish-wins),
    /// so two jobs never write to one output location.
    pub async fn on_publish_start(self: &Arc<Self>, raw_path: &str) -> Result<()> {
        let key = StreamKey::from_path(raw_path)?;
        let (slot, mut guard) = self.lock_slot(&key).await;

        if let Some(old) = guard.job.take() {
            tracing::warn!(stream = %key, "Duplicate publish, stopping previous job");
            old.stop();
            old.wait_terminal().await;
        }

        let location = match self.layout.ensure(&key).await {
            Ok(location) => location,
            Err(e) => {
                tracing::error!(stream = %key, error = %e, "Cannot prepare output location");
                self.prune_locked(&key, &slot, &guard).await;
                return Err(e);
            }
        };

        let spec = JobSpec {
            input_url: self.config.pull_url(raw_path),
            output_args: self.config.encoding.to_output_args(),
            playlist_path: location.playlist.clone(),
        };

        let job = match TranscodeJob::start(key.clone(), spec, &self.transcoder) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(stream = %key, error = %e, "Failed to launch transcode job");
                self.prune_locked(&key, &slot, &guard).await;
                return Err(e);
            }
        };

        guard.generation += 1;
        guard.job = Some(Arc::clone(&job));

        tracing::info!(
            stream = %key,
            input = %job.input_url(),
            playlist = %location.playlist.display(),
            "Transcode job registered"
        );

        self.spawn_monitor(key, slot, guard.generation, job);
        Ok(())
    }

    /// Handle a publish-end notification
    ///
    /// A key with no tracked job is a no-op (the start may have failed
    /// upstream). Otherwise the job is asked to stop; its registry entry is
    /// removed by the monitor task once the job reaches a terminal state.
    pub async fn on_publish_end(&self, raw_path: &str) {
        let key = match StreamKey::from_path(raw_path) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(path = raw_path, error = %e, "Ignoring publish end");
                return;
            }
        };

        let Some((_slot, guard)) = self.find_slot(&key).await else {
            tracing::debug!(stream = %key, "Publish ended with no tracked job");
            return;
        };

        match guard.job.as_ref() {
            Some(job) => {
                tracing::info!(stream = %key, "Publish ended, stopping transcode job");
                job.stop();
            }
            None => tracing::debug!(stream = %key, "Publish ended while job cleanup in progress"),
        }
    }

    /// Stop every tracked job and await their termination
    ///
    /// Used at process teardown so no transcoding subprocess outlives the
    /// supervisor.
    pub async fn shutdown_all(&self) {
        let slots: Vec<(StreamKey, Slot)> = self
            .jobs
            .read()
            .await
            .iter()
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect();

        let mut stopping = Vec::new();
        for (key, slot) in slots {
            let mut guard = Arc::clone(&slot).lock_owned().await;
            if let Some(job) = guard.job.take() {
                job.stop();
                stopping.push(job);
            }
            self.prune_locked(&key, &slot, &guard).await;
        }

        for job in &stopping {
            job.wait_terminal().await;
        }

        tracing::info!(jobs = stopping.len(), "All transcode jobs stopped");
    }

    /// Whether a live job is tracked for the key
    pub async fn is_active(&self, key: &StreamKey) -> bool {
        match self.find_slot(key).await {
            Some((_slot, guard)) => guard.job.is_some(),
            None => false,
        }
    }

    /// Lifecycle state of the tracked job for the key, if any
    pub async fn job_state(&self, key: &StreamKey) -> Option<JobState> {
        let (_slot, guard) = self.find_slot(key).await?;
        guard.job.as_ref().map(|job| job.state())
    }

    /// Number of keys with a live job
    pub async fn active_count(&self) -> usize {
        let slots: Vec<Slot> = self.jobs.read().await.values().cloned().collect();

        let mut count = 0;
        for slot in slots {
            if slot.lock().await.job.is_some() {
                count += 1;
            }
        }
        count
    }

    /// Lock the slot for a key, creating it if absent
    ///
    /// The map lock is never held while waiting for a slot lock, and the
    /// slot is revalidated after locking in case it was pruned meanwhile.
    async fn lock_slot(&self, key: &StreamKey) -> (Slot, OwnedMutexGuard<JobSlot>) {
        loop {
            let slot = {
                let mut map = self.jobs.write().await;
                Arc::clone(map.entry(key.clone()).or_default())
            };
            let guard = Arc::clone(&slot).lock_owned().await;

            let map = self.jobs.read().await;
            if map.get(key).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                drop(map);
                return (slot, guard);
            }
            // Pruned while we waited for the lock; take a fresh slot.
        }
    }

    /// Lock the slot for a key if one is mapped
    async fn find_slot(&self, key: &StreamKey) -> Option<(Slot, OwnedMutexGuard<JobSlot>)> {
        loop {
            let slot = self.jobs.read().await.get(key).cloned()?;
            let guard = Arc::clone(&slot).lock_owned().await;

            let map = self.jobs.read().await;
            if map.get(key).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                drop(map);
                return Some((slot, guard));
            }
        }
    }

    /// Remove the key's map entry while its slot lock is held
    ///
    /// Holding the slot lock means nobody else can prune or replace the
    /// slot, so the pointer comparison is decisive.
    async fn prune_locked(&self, key: &StreamKey, slot: &Slot, guard: &OwnedMutexGuard<JobSlot>) {
        debug_assert!(guard.job.is_none());
        let mut map = self.jobs.write().await;
        if map.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            map.remove(key);
        }
    }

    /// Watch a job until it is terminal, then release its registry entry
    ///
    /// Covers both disconnect cleanup and runtime failure: either way the
    /// entry is gone afterwards, so a fresh publish on the key starts clean.
    fn spawn_monitor(
        self: &Arc<Self>,
        key: StreamKey,
        slot: Slot,
        generation: u64,
        job: Arc<TranscodeJob>,
    ) {
        let supervisor = Arc::clone(self);

        tokio::spawn(async move {
            let state = job.wait_terminal().await;

            let mut guard = Arc::clone(&slot).lock_owned().await;
            if guard.generation != generation {
                // A newer publish already replaced this job.
                return;
            }
            guard.job = None;
            supervisor.prune_locked(&key, &slot, &guard).await;

            match state {
                JobState::Failed => {
                    tracing::error!(
                        stream = %key,
                        uptime = ?job.uptime(),
                        "Transcode job failed, registry entry removed"
                    )
                }
                _ => tracing::info!(
                    stream = %key,
                    uptime = ?job.uptime(),
                    "Transcode job finished, registry entry removed"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use tokio_test::assert_ok;

    use super::*;
    use crate::error::Error;
    use crate::transcoder::testing::MockTranscoder;

    fn supervisor_with_mock(root: &Path) -> (Arc<JobSupervisor>, Arc<MockTranscoder>) {
        let mock = MockTranscoder::new();
        let config = Config::with_media_root(root);
        let supervisor = Arc::new(JobSupervisor::new(config, mock.clone()));
        (supervisor, mock)
    }

    fn key(raw: &str) -> StreamKey {
        StreamKey::from_path(raw).unwrap()
    }

    async fn wait_state(supervisor: &JobSupervisor, key: &StreamKey, wanted: JobState) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while supervisor.job_state(key).await != Some(wanted) {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("{key} never reached {wanted}"));
    }

    async fn wait_removed(supervisor: &JobSupervisor, key: &StreamKey) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while supervisor.is_active(key).await {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("{key} was never removed"));
    }

    #[tokio::test]
    async fn test_publish_then_disconnect() {
        let root = tempfile::tempdir().unwrap();
        let (supervisor, mock) = supervisor_with_mock(root.path());
        let cam1 = key("/live/cam1");

        assert_ok!(supervisor.on_publish_start("/live/cam1").await);
        assert!(supervisor.is_active(&cam1).await);
        assert!(root.path().join("cam1").is_dir());

        mock.last().started().await;
        wait_state(&supervisor, &cam1, JobState::Running).await;

        supervisor.on_publish_end("/live/cam1").await;
        wait_removed(&supervisor, &cam1).await;

        assert!(mock.last().was_terminated());
        assert_eq!(supervisor.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_job_spec_routing() {
        let root = tempfile::tempdir().unwrap();
        let (supervisor, mock) = supervisor_with_mock(root.path());

        supervisor.on_publish_start("/live/cam1").await.unwrap();

        let spec = mock.last().spec;
        assert_eq!(spec.input_url, "rtmp://127.0.0.1:1935/live/cam1");
        assert_eq!(spec.playlist_path, root.path().join("cam1").join("index.m3u8"));
        assert!(spec.output_args.contains(&"-hls_time".to_string()));
    }

    #[tokio::test]
    async fn test_duplicate_publish_replaces_job() {
        let root = tempfile::tempdir().unwrap();
        let (supervisor, mock) = supervisor_with_mock(root.path());
        let cam1 = key("/live/cam1");

        supervisor.on_publish_start("/live/cam1").await.unwrap();
        mock.last().started().await;
        wait_state(&supervisor, &cam1, JobState::Running).await;

        // Second publish on the same key: last-publish-wins.
        supervisor.on_publish_start("/live/cam1").await.unwrap();
        assert_eq!(mock.launch_count(), 2);
        assert!(mock.process(0).was_terminated());
        assert!(!mock.process(1).was_terminated());

        mock.process(1).started().await;
        wait_state(&supervisor, &cam1, JobState::Running).await;
        assert_eq!(supervisor.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_disconnect_without_job_is_noop() {
        let root = tempfile::tempdir().unwrap();
        let (supervisor, _mock) = supervisor_with_mock(root.path());

        supervisor.on_publish_end("/live/ghost").await;

        assert_eq!(supervisor.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_storage_failure_prevents_job_start() {
        // A plain file where the media root should be.
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("media");
        tokio::fs::write(&blocker, b"occupied").await.unwrap();

        let (supervisor, mock) = supervisor_with_mock(&blocker);

        let result = supervisor.on_publish_start("/live/camX").await;
        assert!(matches!(result, Err(Error::StorageUnavailable { .. })));
        assert_eq!(mock.launch_count(), 0);
        assert!(!supervisor.is_active(&key("/live/camX")).await);
    }

    #[tokio::test]
    async fn test_launch_failure_leaves_no_entry() {
        let root = tempfile::tempdir().unwrap();
        let (supervisor, mock) = supervisor_with_mock(root.path());
        let cam1 = key("/live/cam1");

        mock.fail_next_launch();
        let result = supervisor.on_publish_start("/live/cam1").await;
        assert!(matches!(result, Err(Error::JobLaunchFailure(_))));
        assert!(!supervisor.is_active(&cam1).await);

        // A later publish on the same key starts cleanly.
        supervisor.on_publish_start("/live/cam1").await.unwrap();
        assert!(supervisor.is_active(&cam1).await);
    }

    #[tokio::test]
    async fn test_runtime_failure_removes_entry() {
        let root = tempfile::tempdir().unwrap();
        let (supervisor, mock) = supervisor_with_mock(root.path());
        let cam1 = key("/live/cam1");

        supervisor.on_publish_start("/live/cam1").await.unwrap();
        mock.last().started().await;
        wait_state(&supervisor, &cam1, JobState::Running).await;

        mock.last().fail("encoder crashed").await;
        wait_removed(&supervisor, &cam1).await;

        // Fresh publish starts a fresh job; no automatic retry happened.
        assert_eq!(mock.launch_count(), 1);
        supervisor.on_publish_start("/live/cam1").await.unwrap();
        assert_eq!(mock.launch_count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_path_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let (supervisor, mock) = supervisor_with_mock(root.path());

        let result = supervisor.on_publish_start("///").await;
        assert!(matches!(result, Err(Error::InvalidStreamPath(_))));
        assert_eq!(mock.launch_count(), 0);
        assert_eq!(supervisor.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_independent_streams() {
        let root = tempfile::tempdir().unwrap();
        let (supervisor, mock) = supervisor_with_mock(root.path());
        let (a, b) = (key("/live/a"), key("/live/b"));

        supervisor.on_publish_start("/live/a").await.unwrap();
        supervisor.on_publish_start("/live/b").await.unwrap();
        assert_eq!(supervisor.active_count().await, 2);

        mock.process(0).started().await;
        mock.process(1).started().await;
        wait_state(&supervisor, &a, JobState::Running).await;
        wait_state(&supervisor, &b, JobState::Running).await;

        // Ending one stream leaves the other untouched.
        supervisor.on_publish_end("/live/a").await;
        wait_removed(&supervisor, &a).await;

        assert!(supervisor.is_active(&b).await);
        assert_eq!(supervisor.job_state(&b).await, Some(JobState::Running));
        assert!(!mock.process(1).was_terminated());
    }

    #[tokio::test]
    async fn test_shutdown_all() {
        let root = tempfile::tempdir().unwrap();
        let (supervisor, mock) = supervisor_with_mock(root.path());

        supervisor.on_publish_start("/live/a").await.unwrap();
        supervisor.on_publish_start("/live/b").await.unwrap();
        mock.process(0).started().await;
        mock.process(1).started().await;

        supervisor.shutdown_all().await;

        assert_eq!(supervisor.active_count().await, 0);
        assert!(mock.process(0).was_terminated());
        assert!(mock.process(1).was_terminated());
    }
}
