//! Transcoding engine interface and ffmpeg implementation
//!
//! The engine is modeled as a capability: something that can `launch` a
//! process for a [`JobSpec`] and hand back an event stream plus a
//! termination handle. The supervisor and job layers depend only on the
//! trait, so the shipped [`FfmpegTranscoder`] can be replaced by a mock in
//! tests (or by another engine entirely) without touching lifecycle logic.

pub mod engine;
pub mod event;
pub mod ffmpeg;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{JobSpec, LaunchedJob, ProcessHandle, Transcoder};
pub use event::{ProcessEvent, ProgressStats};
pub use ffmpeg::FfmpegTranscoder;
