//! Conquest Room Orchestrator (§4.11): drives the 10 Hz galaxy sim through
//! the [`sim_core::RoomLogic`] contract — seed derivation, persisted-state
//! overlay on init, reconnect-by-address, dirty-planet sync and autosave.

pub mod logic;
pub mod persistence;

pub use logic::{ConquestRoomDeps, ConquestRoomLogic};
