//! Combat Room Orchestrator (§4.10): drives the 30 Hz combat sim through
//! the [`sim_core::RoomLogic`] contract — join gating against the Ticket
//! Service, lobby/ready/match timers, throttled broadcast, and the replay
//! + settlement hooks on leave/dispose.

pub mod logic;

pub use logic::{CombatJoinContext, CombatRoomDeps, CombatRoomLogic};
