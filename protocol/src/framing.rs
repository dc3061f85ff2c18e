//! Frame tags and the join/handshake structures, carried over from the
//! relay server's handshake protocol but generalized from "which client acts
//! as host" to "which room kind and name do I want".

use serde::{Deserialize, Serialize};

/// The buffer size used for every internal mpsc/broadcast channel.
pub const CHANNEL_BUFFER_SIZE: usize = 256;

// Client -> Gateway, pre-handshake.

/// The first binary frame on a fresh websocket is always a postcard-encoded
/// [`JoinRequest`]. There is no tag byte in front of it — the handshake is a
/// one-shot exchange, not a tagged stream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JoinRequest {
    /// Which room kind to join.
    pub room_kind: RoomKind,
    /// The room's name. The same name always maps to the same room.
    pub room_name: String,
    /// The joining player's wallet address. Required for combat and conquest.
    pub address: String,
    /// An optional specific ticket token id to check ownership of (combat only).
    pub token_id: Option<u64>,
    /// Marks a "fun" room: no ticket gating, no settlement call on match end.
    pub fun_room: bool,
    /// Overrides the galaxy seed (conquest only). Absent means "derive from name".
    pub seed: Option<u64>,
}

/// The kind of room being joined. `Presence` and `Chat` are external
/// collaborators out of scope for this crate's room logic; they still need a
/// variant here so the Room Registry can count them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum RoomKind {
    Combat,
    Conquest,
    Presence,
    Chat,
}

/// Sent by the gateway once the handshake result is known, win or lose.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HandshakeResponse {
    pub result: HandshakeResult,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum HandshakeResult {
    /// Join accepted; carries the session id assigned to this connection.
    Joined { session_id: u32 },
    /// Join refused before a session was created (ticket check, full room, ...).
    Denied { reason: String },
}

// Gateway <-> Room, post-handshake. One tag byte precedes every frame.

/// Room sends the complete authoritative view state. Only sent once at join
/// and after an explicit reset.
pub const FRAME_STATE_FULL: u8 = 0;
/// Room sends a change-by-change delta against the last state the client has.
pub const FRAME_STATE_DELTA: u8 = 1;
/// Room sends a discrete, typed event (join/leave/match_end/...).
pub const FRAME_EVENT: u8 = 2;
/// Client sends a typed input (player_input, launch_attack, ...).
pub const FRAME_CLIENT_INPUT: u8 = 3;
/// Client sends a ping; carries an opaque client timestamp to be echoed back.
pub const FRAME_PING: u8 = 4;
/// Room replies to a ping.
pub const FRAME_PONG: u8 = 5;
/// Room reports a fatal protocol/authorization error and will close after.
pub const FRAME_ERROR: u8 = 6;
/// Room forcibly disconnects this session.
pub const FRAME_KICK: u8 = 7;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Ping {
    pub t0: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Pong {
    pub t0: u64,
    pub server_ts: u64,
}
