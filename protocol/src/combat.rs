//! Wire payloads for combat rooms (§4.8 / §6 of the room specification).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The weapon kinds, shared between fire inputs, hit reports and damage
/// accounting so a weapon tag round-trips identically end to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum WeaponKind {
    Arrow,
    Bullet,
    Heavy,
    Tnt,
    /// Non-projectile melee-range weapons that still need an acceptance
    /// window per §4.8's hit validation table.
    Mine,
    Spike,
}

/// Typed inputs a client may send once joined to a combat room.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum CombatInput {
    /// Continuous movement/orientation sample.
    Position {
        timestamp_ms: u64,
        x: f32,
        y: f32,
        vx: f32,
        vy: f32,
        orientation: f32,
    },
    /// A fire action for the named weapon, aimed at (or toward) a point.
    Fire {
        timestamp_ms: u64,
        weapon: WeaponKind,
        target_x: f32,
        target_y: f32,
    },
    /// A dash action (shares the 1s high-impact cooldown bucket).
    Dash { timestamp_ms: u64, dx: f32, dy: f32 },
    /// A client-reported hit; server recomputes damage and may reject it.
    Hit {
        timestamp_ms: u64,
        weapon: WeaponKind,
        target_player_id: u16,
        /// Client-proposed damage; always overwritten server-side.
        damage: u32,
        is_crit: bool,
    },
    /// A client "stats" packet used to sync opponent-visible HP/armor/paralysis.
    Stats {
        timestamp_ms: u64,
        hp: u32,
        armor: u32,
        max_hp: u32,
        max_armor: u32,
        paralyzed: bool,
    },
    Ready { ready: bool },
    Ping { t0: u64 },
}

/// Discrete, typed events broadcast (or targeted) from a combat room.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum CombatEvent {
    PlayerJoined { session_id: u16, address: String },
    PlayerLeft { session_id: u16 },
    MatchReady,
    MatchTimer { start_at_ms: u64, end_at_ms: u64, duration_ms: u64 },
    MatchEnd {
        reason: MatchEndReason,
        winner_sid: Option<u16>,
        players: Vec<u16>,
        replay_id: String,
    },
    MatchCancelled { reason: String, timeout_ms: u64 },
    LobbyTimeout { reason: String, timeout_ms: u64 },
    JoinDenied { reason: String },
    /// Server-authoritative rebroadcast of a validated hit, plus derived
    /// projectile-physics events the client should animate.
    Hit { shooter_sid: u16, target_sid: u16, weapon: WeaponKind, damage: u32, is_crit: bool },
    StoneBounce { projectile_id: u32, x: f32, y: f32 },
    StoneHit { projectile_id: u32, x: f32, y: f32 },
    TntStick { projectile_id: u32, target_sid: u16 },
    TntExplode { projectile_id: u32, x: f32, y: f32 },
    /// Throttled continuous position/stats stream (§4.8 "broadcast
    /// throttling"), carrying only the players whose state changed enough
    /// to cross a threshold or whose heartbeat elapsed.
    StateSync(StateDelta),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum MatchEndReason {
    Timeout,
    Hp,
    PlayerLeft,
}

/// Per-player slice of the full view state, broadcast on join/reset.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerView {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub orientation: f32,
    pub hp: u32,
    pub max_hp: u32,
    pub armor: u32,
    pub max_armor: u32,
    pub ready: bool,
    pub profile_picture: String,
    pub paralyzed: bool,
}

/// The complete authoritative combat state, sent in full on join/reset.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GameState {
    pub players: HashMap<u16, PlayerView>,
}

/// A change-by-change delta against the last [`GameState`] a client holds.
/// Every field is `Option`; `None` means "unchanged, do not touch".
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlayerDelta {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub vx: Option<f32>,
    pub vy: Option<f32>,
    pub orientation: Option<f32>,
    pub hp: Option<u32>,
    pub max_hp: Option<u32>,
    pub armor: Option<u32>,
    pub max_armor: Option<u32>,
    pub paralyzed: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StateDelta {
    pub players: HashMap<u16, PlayerDelta>,
}
