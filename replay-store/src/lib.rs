//! Versioned blob store for finished matches (§4.5) and the per-room
//! recorder that accumulates the blob across a match's lifetime (§4.6).

pub mod recorder;
pub mod store;

pub use recorder::MatchRecorder;
pub use store::{ReplayMode, ReplayStore};
