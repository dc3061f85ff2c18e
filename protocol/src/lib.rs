//! Wire types shared between the gateway, the room orchestrators and the
//! client. This crate has no I/O of its own — it only defines the framing
//! tags and the postcard-serializable payloads that travel across the
//! websocket.
//!
//! The framing keeps the relay server's original idea: every binary
//! websocket frame starts with a one-byte tag identifying what follows, so a
//! misbehaving peer can be rejected before the payload is even decoded.

pub mod combat;
pub mod conquest;
pub mod framing;

pub use combat::{CombatEvent, CombatInput, GameState, PlayerDelta, PlayerView, StateDelta};
pub use conquest::{ConquestEvent, ConquestInput, PlanetView, PlayerSummary, UnitsState};
pub use framing::*;
