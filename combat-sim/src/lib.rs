//! The 30 Hz authoritative combat simulation core (§4.8).
//!
//! This crate is pure simulation: it owns arena geometry, projectile
//! physics, the damage pipeline and hit/rate-limit validation, but it never
//! touches a socket or a clock of its own — the orchestrator crate
//! (`combat-room`) drives it tick by tick and feeds it wall-clock
//! timestamps from validated input frames.

pub mod arena;
pub mod damage;
pub mod hitbox;
pub mod player;
pub mod projectile;
pub mod validation;
pub mod vec2;

pub use arena::Arena;
pub use damage::{apply_damage, clamp_regen_proposal, DamageOutcome};
pub use player::CombatPlayer;
pub use projectile::{Projectile, ProjectileKind};
pub use validation::{acceptance_window_ms, RateLimiter};
pub use vec2::Vec2;

/// Fixed simulation rate. §4.8: "30 Hz (~33 ms)".
pub const TICK_HZ: u32 = 30;
pub const TICK_MS: u64 = 1000 / TICK_HZ as u64;
