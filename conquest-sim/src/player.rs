//! Conquest player: a galaxy-room slot, owned by a wallet address and
//! (when online) bound to a session (§3 "Conquest Player").

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorPair(pub u8, pub u8);

pub struct ConquestPlayer {
    pub slot: u16,
    pub address: String,
    /// Empty (`None`) when the player is offline; reconnect re-binds this.
    pub session_id: Option<u32>,
    pub display_name: String,
    pub color: ColorPair,
    pub home_id: u32,
    pub alive: bool,
    pub is_ai: bool,
}

impl ConquestPlayer {
    pub fn new(slot: u16, address: String, display_name: String, color: ColorPair, home_id: u32, is_ai: bool) -> Self {
        Self { slot, address, session_id: None, display_name, color, home_id, alive: true, is_ai }
    }

    pub fn online(&self) -> bool {
        self.session_id.is_some()
    }
}
