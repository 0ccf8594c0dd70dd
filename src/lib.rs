//! rtmp-hls: live-stream transcoding supervisor
//!
//! Watches publish-start / publish-end notifications from an RTMP-style
//! protocol server and keeps exactly one ffmpeg transcoding job alive per
//! active stream, writing an HLS playlist plus segments into a per-stream
//! directory. Jobs are terminated and their registry entries released when
//! the stream ends, fails, or is republished.
//!
//! # Architecture
//!
//! ```text
//!  protocol server ──► NotificationSender ──► EventBridge (one task)
//!                                                   │
//!                                                   ▼
//!                                            JobSupervisor
//!                                     StreamKey ──► TranscodeJob
//!                                          │             │
//!                                    OutputLayout   Transcoder (ffmpeg)
//!                                   media/<key>/    one subprocess/job
//!                                   index.m3u8 + segments
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rtmp_hls::{Config, EventBridge, JobSupervisor};
//!
//! # async fn example() {
//! let config = Config::with_media_root("./media");
//! let supervisor = Arc::new(JobSupervisor::with_ffmpeg(config));
//! let bridge = EventBridge::new(Arc::clone(&supervisor));
//!
//! // Hand this to the protocol server's lifecycle hooks.
//! let notifications = bridge.sender();
//! notifications.publish_start("/live/cam1").await;
//! // ... stream runs, segments appear under ./media/cam1/ ...
//! notifications.publish_end("/live/cam1").await;
//!
//! // At teardown: no orphaned ffmpeg processes.
//! supervisor.shutdown_all().await;
//! bridge.close().await;
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod job;
pub mod output;
pub mod registry;
pub mod transcoder;

pub use bridge::{EventBridge, NotificationSender, StreamLifecycleEvent};
pub use config::{Config, EncodingOptions};
pub use error::{Error, Result};
pub use job::{JobState, TranscodeJob};
pub use output::{OutputLayout, OutputLocation};
pub use registry::{JobSupervisor, StreamKey};
pub use transcoder::{
    FfmpegTranscoder, JobSpec, LaunchedJob, ProcessEvent, ProcessHandle, ProgressStats, Transcoder,
};
