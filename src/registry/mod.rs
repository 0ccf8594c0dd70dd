//! Stream-to-job registry
//!
//! The registry maps each active stream key to its transcode job and is the
//! only shared mutable state in the crate.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<JobSupervisor>
//!                     ┌──────────────────────────┐
//!                     │ jobs: HashMap<StreamKey, │
//!                     │   JobSlot {              │
//!                     │     job, generation,     │
//!                     │   }                      │
//!                     │ >                        │
//!                     └────────────┬─────────────┘
//!                                  │
//!          ┌───────────────────────┼───────────────────────┐
//!          │                       │                       │
//!          ▼                       ▼                       ▼
//!   on_publish_start()      on_publish_end()        monitor task
//!   resolve key             resolve key             job.wait_terminal()
//!   ensure output dir       job.stop()              remove entry
//!   start + insert job
//! ```
//!
//! # Invariants
//!
//! At most one job per key at any instant; an entry exists exactly while a
//! job is starting, running, or stopping for that key. A duplicate publish
//! stops the old job before its replacement starts, so an output location is
//! never written by two jobs at once.

pub mod key;
pub mod supervisor;

pub use key::StreamKey;
pub use supervisor::JobSupervisor;
