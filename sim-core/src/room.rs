//! The generic room contract.
//!
//! This is the server-authoritative counterpart of the relay server's
//! `BackEndArchitecture<ServerRpcPayload, DeltaInformation, ViewState>`. The
//! relay server's trait described a client-hosted game backend whose
//! commands got relayed byte-for-byte to spectators; here the same shape
//! drives a tokio task that *is* the authority, so the vocabulary changes
//! from "backend commands to relay" to "room commands the gateway acts on"
//! but the event-driven lifecycle (arrival/departure/input/timer/tick) is
//! identical in spirit.

use std::time::Duration;

/// Commands a room emits for the gateway to act on. The gateway owns the
/// websocket sessions; the room never touches a socket directly.
pub enum RoomCommand<Event> {
    /// Broadcast a discrete event to every session in the room.
    Broadcast(Event),
    /// Send a discrete event to exactly one session.
    Unicast { session_id: u32, event: Event },
    /// Forcibly disconnect one session (room full, rule violation, ...).
    Kick { session_id: u32, reason: String },
    /// Tear the whole room down; every session is disconnected.
    Dispose,
}

/// The contract both the combat and the conquest orchestrator implement.
/// A gateway room task owns one `RoomLogic` instance and drives it from
/// three places: a fixed-rate tick, per-session input frames, and session
/// arrival/departure.
pub trait RoomLogic {
    type Input;
    type Event;
    type FullState: Clone;
    /// Anything resolved asynchronously before the room is allowed to see
    /// this join (ticket validation, stats, profile fetch, NFT bonus...).
    /// The gateway awaits those suspension points itself (§5: they must
    /// never block a tick) and hands the resolved value in here, so
    /// `session_joined` stays a plain synchronous call.
    type JoinContext;

    /// The wall-clock interval between [`RoomLogic::tick`] calls.
    fn tick_interval(&self) -> Duration;

    /// A session joined, with its pre-resolved [`RoomLogic::JoinContext`].
    /// Returns `Err` with a deny reason if the join should be refused (room
    /// locked, ticket check failed, ...); the gateway never creates a
    /// session for a denied join.
    fn session_joined(&mut self, session_id: u32, address: &str, context: Self::JoinContext) -> Result<(), String>;

    /// A session left, intentionally or by connection loss.
    fn session_left(&mut self, session_id: u32);

    /// A validated input frame from a session.
    fn apply_input(&mut self, session_id: u32, input: Self::Input);

    /// Advances the simulation by one fixed tick.
    fn tick(&mut self);

    /// The complete state for a freshly joined (or resynced) session.
    fn full_state(&self) -> Self::FullState;

    /// Drains and clears every command queued since the last drain.
    fn drain_commands(&mut self) -> Vec<RoomCommand<Self::Event>>;

    /// Whether the room should be disposed now (all conditions for
    /// disposal have fired). The gateway polls this after every tick and
    /// every input/join/leave.
    fn is_disposed(&self) -> bool;
}
