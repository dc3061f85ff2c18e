//! Process-wide gateway state: the Room Registry, the live room handles
//! (one inbox sender per room actor), and the shared service clients every
//! room orchestrator is built from.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::mpsc;

use chain_services::{NftBonusService, ProfileService, TicketService};
use combat_room::CombatJoinContext;
use protocol::{CombatEvent, CombatInput, ConquestEvent, ConquestInput, GameState, UnitsState};
use replay_store::ReplayStore;
use sim_core::{RoomActorMsg, RoomRegistry};

use crate::config::ServerConfig;

pub type CombatInbox = mpsc::Sender<RoomActorMsg<CombatInput, CombatEvent, GameState, CombatJoinContext>>;
/// The conquest room's `JoinContext` is `()` — a joining session carries no
/// pre-resolved state, since reconnect-by-address is decided entirely
/// inside `ConquestRoomLogic::session_joined` (§4.11).
pub type ConquestInbox = mpsc::Sender<RoomActorMsg<ConquestInput, ConquestEvent, UnitsState, ()>>;

/// One room actor's inbox, tagged by which orchestrator owns it.
pub enum RoomHandle {
    Combat(CombatInbox),
    Conquest(ConquestInbox),
}

pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub rooms: Mutex<HashMap<String, RoomHandle>>,
    pub ticket: Arc<TicketService>,
    pub nft: Arc<NftBonusService>,
    pub profile: Arc<ProfileService>,
    pub replay_store: Arc<ReplayStore>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn from_env() -> Self {
        Self {
            registry: Arc::new(RoomRegistry::new()),
            rooms: Mutex::new(HashMap::new()),
            ticket: Arc::new(TicketService::from_env()),
            nft: Arc::new(NftBonusService::from_env()),
            profile: Arc::new(ProfileService::from_env()),
            replay_store: Arc::new(ReplayStore::from_env()),
            config: ServerConfig::from_env(),
        }
    }
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}
