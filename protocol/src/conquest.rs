//! Wire payloads for conquest rooms (§4.9 / §6 of the room specification).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum ConquestInput {
    LaunchAttack { from_id: u32, to_id: u32, percent: u8, blitz: bool },
    Build { planet_id: u32, slot: u8, building_type: BuildingType },
    ToggleGen { planet_id: u32 },
    Ability { ability_id: u32, target_planet_id: u32 },
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum BuildingType {
    Mine,
    Factory,
    Turret,
    ShieldGen,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub enum ConquestEvent {
    PlayerJoined { player_id: u16, address: String },
    PlayerOnline { player_id: u16 },
    PlayerOffline { player_id: u16 },
    PlayerLeft { player_id: u16 },
    Reconnected { player_id: u16 },
    RevealZone { x: f32, y: f32, radius: f32, permanent: bool },
    AttackLaunched { attack_id: u32, from_id: u32, to_id: u32, shooter_id: u16 },
    AttackDestroyed { attack_id: u32 },
    BattleStarted { planet_id: u32, attacker_id: u16 },
    BattleResolved { planet_id: u32, new_owner: Option<u16> },
    TurretFired { planet_id: u32, attack_id: u32 },
    AbilityUsed { player_id: u16, ability_id: u32 },
    AbilityResult { success: bool, message: Option<String> },
    ActiveAttacks { attacks: Vec<AttackView> },
    BuildResult { success: bool, message: Option<String> },
    /// Incremental sync of planets that changed since the last tick (or a
    /// periodic full sweep), instead of resending the whole galaxy.
    PlanetsSync { planets: Vec<PlanetView> },
    PlayersSync { players: Vec<PlayerSummary> },
    Error { message: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AttackView {
    pub id: u32,
    pub from_id: u32,
    pub to_id: u32,
    pub x: f32,
    pub y: f32,
    pub units: f32,
    pub shooter_id: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlanetView {
    pub id: u32,
    pub owner_id: Option<u16>,
    pub units: f32,
    pub max_units: f32,
    pub defense: f32,
    pub growth_rate: f32,
    pub stability: f32,
    pub connected: bool,
    pub generating: bool,
    pub has_shield: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerSummary {
    pub id: u16,
    pub address: String,
    pub name: String,
    pub alive: bool,
    pub online: bool,
    pub planet_count: u32,
    pub total_units: f32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UnitsState {
    pub planets: HashMap<u32, PlanetView>,
    pub players: HashMap<u16, PlayerSummary>,
}
