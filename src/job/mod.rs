//! Transcode job lifecycle
//!
//! One job per active stream key: a supervised subprocess with an explicit
//! state machine. Start is non-blocking; readiness and exit are observed
//! through transcoder events; stop is an idempotent request that always
//! converges to a terminal state.

pub mod state;
pub mod transcode;

pub use state::JobState;
pub use transcode::TranscodeJob;
