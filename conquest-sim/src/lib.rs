//! The 10 Hz authoritative conquest simulation core (§4.9).
//!
//! Like `combat-sim`, this crate is pure simulation: galaxy generation,
//! planet economy, attacks/battles/turrets and the AI loop all live here
//! with no socket or persistence concerns. The orchestrator crate
//! (`conquest-room`) drives it tick by tick, derives the seed, and owns
//! save/load.

pub mod attack;
pub mod galaxy;
pub mod planet;
pub mod player;
pub mod sim;

pub use attack::{Attack, Battle, ShipClass, TurretMissile};
pub use galaxy::{generate, pick_starting_planet};
pub use planet::{Planet, PlanetSize};
pub use player::{ColorPair, ConquestPlayer};
pub use sim::{ConquestSimEvent, Difficulty, GalaxyState, TICK_HZ, TICK_MS};
