//! Conquest planet: static geometry plus dynamic ownership/economy state
//! (§3 "Conquest Planet").

use serde::{Deserialize, Serialize};

use protocol::conquest::BuildingType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanetSize {
    Asteroid,
    Small,
    Medium,
    Large,
    Giant,
}

impl PlanetSize {
    /// Base radius in galaxy units, before any per-planet jitter applied at
    /// generation time.
    pub fn base_radius(self) -> f32 {
        match self {
            PlanetSize::Asteroid => 20.0,
            PlanetSize::Small => 35.0,
            PlanetSize::Medium => 55.0,
            PlanetSize::Large => 80.0,
            PlanetSize::Giant => 110.0,
        }
    }

    /// How many planets of this size the galaxy generator places, out of
    /// the fixed total of 900 (§4.2, §8 test case 4: `ASTEROID` count = 250).
    pub fn count_in_galaxy(self) -> u32 {
        match self {
            PlanetSize::Asteroid => 250,
            PlanetSize::Small => 300,
            PlanetSize::Medium => 200,
            PlanetSize::Large => 100,
            PlanetSize::Giant => 50,
        }
    }

    /// Moons stamped around each planet of this size (§4.2 "per-size moon counts").
    pub fn moon_count(self) -> u32 {
        match self {
            PlanetSize::Asteroid | PlanetSize::Small => 0,
            PlanetSize::Medium => 1,
            PlanetSize::Large => 2,
            PlanetSize::Giant => 3,
        }
    }

    /// How many deposit entries are drawn for a planet of this size (§4.2
    /// "take first K where K is size-tiered").
    pub fn deposit_count(self) -> usize {
        match self {
            PlanetSize::Asteroid => 1,
            PlanetSize::Small => 1,
            PlanetSize::Medium => 2,
            PlanetSize::Large => 3,
            PlanetSize::Giant => 4,
        }
    }

    pub fn max_units(self) -> f32 {
        match self {
            PlanetSize::Asteroid => 150.0,
            PlanetSize::Small => 400.0,
            PlanetSize::Medium => 900.0,
            PlanetSize::Large => 1800.0,
            PlanetSize::Giant => 3200.0,
        }
    }

    pub fn base_defense(self) -> f32 {
        match self {
            PlanetSize::Asteroid => 1.0,
            PlanetSize::Small => 1.2,
            PlanetSize::Medium => 1.5,
            PlanetSize::Large => 1.8,
            PlanetSize::Giant => 2.2,
        }
    }

    pub fn base_growth_rate(self) -> f32 {
        match self {
            PlanetSize::Asteroid => 0.6,
            PlanetSize::Small => 1.0,
            PlanetSize::Medium => 1.4,
            PlanetSize::Large => 1.8,
            PlanetSize::Giant => 2.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DepositType {
    Iron,
    Gold,
    Crystal,
    Platinum,
    Helium,
    Titanium,
}

pub const ALL_DEPOSIT_TYPES: [DepositType; 6] = [
    DepositType::Iron,
    DepositType::Gold,
    DepositType::Crystal,
    DepositType::Platinum,
    DepositType::Helium,
    DepositType::Titanium,
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Deposit {
    pub kind: DepositType,
    pub amount: u32,
}

/// Orbit parameters for a moon: circular orbit around `parent_id` at a fixed
/// radius and angular speed, phase tracked separately in dynamic state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrbitParams {
    pub radius: f32,
    pub angular_speed_rad_s: f32,
}

pub const NEUTRAL: Option<u16> = None;

#[derive(Debug, Serialize, Deserialize)]
pub struct Planet {
    pub id: u32,
    // Static geometry.
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub size: PlanetSize,
    pub is_moon: bool,
    pub parent_id: Option<u32>,
    pub orbit: Option<OrbitParams>,
    pub orbit_angle: f32,
    pub is_black_hole: bool,
    pub is_sun: bool,
    // Dynamic ownership / economy.
    pub owner_id: Option<u16>,
    pub units: f32,
    pub max_units: f32,
    pub defense: f32,
    pub growth_rate: f32,
    pub stability: f32,
    pub connected: bool,
    pub generating: bool,
    pub has_shield: bool,
    pub buildings: [Option<BuildingType>; 3],
    pub deposits: Vec<Deposit>,
    pub next_mine_time_ms: u64,
    pub next_turret_fire_time_ms: u64,
}

impl Planet {
    pub fn mine_count(&self) -> usize {
        self.buildings.iter().filter(|b| matches!(b, Some(BuildingType::Mine))).count()
    }

    pub fn factory_count(&self) -> usize {
        self.buildings.iter().filter(|b| matches!(b, Some(BuildingType::Factory))).count()
    }

    pub fn turret_count(&self) -> usize {
        self.buildings.iter().filter(|b| matches!(b, Some(BuildingType::Turret))).count()
    }

    pub fn has_shield_generator(&self) -> bool {
        self.buildings.iter().any(|b| matches!(b, Some(BuildingType::ShieldGen)))
    }

    /// Removes the first shield_gen building slot, consumed when a shield
    /// absorbs an attack (§4.9 step 4).
    pub fn remove_first_shield_gen(&mut self) {
        if let Some(slot) = self.buildings.iter().position(|b| matches!(b, Some(BuildingType::ShieldGen))) {
            self.buildings[slot] = None;
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.owner_id.is_none()
    }

    pub fn make_neutral(&mut self) {
        self.owner_id = None;
        self.generating = false;
        self.connected = false;
        self.has_shield = false;
    }
}
