//! Combat player state: position, stats, fuel, the per-weapon fire-timestamp
//! table hit validation reads from, and the rate-limit/throttle buckets
//! attached to a session (§3 "Combat Player").

use std::collections::HashMap;

use protocol::combat::WeaponKind;

use crate::validation::{RateLimiter, Throttle};
use crate::vec2::Vec2;

/// Stats derived either from the Ticket Service (on-chain enforcement) or
/// from defaults plus NFT bonuses (§4.4, §4.10).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatStats {
    pub max_hp: u32,
    pub max_armor: u32,
    pub dmg: f32,
    pub crit_chance: f32,
    pub accuracy: f32,
    pub max_fuel: f32,
}

impl Default for CombatStats {
    fn default() -> Self {
        Self { max_hp: 100, max_armor: 50, dmg: 20.0, crit_chance: 0.1, accuracy: 1.0, max_fuel: 100.0 }
    }
}

/// One connected combat player. Created on join, mutated only by the sim or
/// by validated input, destroyed on leave (§3 invariants).
pub struct CombatPlayer {
    pub session_id: u16,
    pub address: String,
    pub position: Vec2,
    pub velocity: Vec2,
    pub orientation: f32,
    pub hp: u32,
    pub armor: u32,
    pub stats: CombatStats,
    pub fuel: f32,
    pub ready: bool,
    pub profile_picture: String,
    /// NFT count snapshotted at join; immutable for the match (§9 open question).
    pub nft_count: u32,
    /// Server-only; never broadcast to clients (§3).
    pub ticket_token_id: Option<u64>,
    pub last_damage_at_ms: u64,
    pub last_armor_regen_at_ms: u64,
    pub last_fire_at_ms: HashMap<WeaponKind, u64>,
    pub paralyzed: bool,
    pub action_limiter: RateLimiter,
    pub stats_throttle: Throttle,
    pub hit_throttle: Throttle,
}

impl CombatPlayer {
    pub fn new(session_id: u16, address: String, stats: CombatStats, nft_count: u32, ticket_token_id: Option<u64>) -> Self {
        Self {
            session_id,
            address,
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            orientation: 0.0,
            hp: stats.max_hp,
            armor: stats.max_armor,
            stats,
            fuel: stats.max_fuel,
            ready: false,
            profile_picture: String::new(),
            nft_count,
            ticket_token_id,
            last_damage_at_ms: 0,
            last_armor_regen_at_ms: 0,
            last_fire_at_ms: HashMap::new(),
            paralyzed: false,
            action_limiter: RateLimiter::default(),
            stats_throttle: Throttle::default(),
            hit_throttle: Throttle::default(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Records a fire event for `weapon` at `timestamp_ms` so a later hit
    /// report can be validated against the acceptance window (§4.8).
    pub fn record_fire(&mut self, weapon: WeaponKind, timestamp_ms: u64) {
        self.last_fire_at_ms.insert(weapon, timestamp_ms);
    }

    /// True iff this player fired `weapon` within `window_ms` of `hit_at_ms`.
    pub fn has_matching_fire(&self, weapon: WeaponKind, hit_at_ms: u64, window_ms: u64) -> bool {
        match self.last_fire_at_ms.get(&weapon) {
            Some(&fired_at) => hit_at_ms >= fired_at && hit_at_ms - fired_at <= window_ms,
            None => false,
        }
    }

    /// armor-regen cap from the NFT bonus table (§4.4): >=1 NFT -> 2, else 1.
    pub fn max_regen_per_tick(&self) -> u32 {
        if self.nft_count >= 1 { 2 } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_player_is_at_full_hp_and_armor() {
        let p = CombatPlayer::new(1, "0xAA".into(), CombatStats::default(), 0, Some(1));
        assert_eq!(p.hp, p.stats.max_hp);
        assert_eq!(p.armor, p.stats.max_armor);
        assert!(p.is_alive());
    }

    #[test]
    fn matching_fire_within_window_validates() {
        let mut p = CombatPlayer::new(1, "0xAA".into(), CombatStats::default(), 0, None);
        p.record_fire(WeaponKind::Bullet, 1000);
        assert!(p.has_matching_fire(WeaponKind::Bullet, 1150, 3500));
        assert!(!p.has_matching_fire(WeaponKind::Bullet, 900, 3500));
        assert!(!p.has_matching_fire(WeaponKind::Arrow, 1150, 3500));
    }

    #[test]
    fn fire_outside_window_does_not_validate() {
        let mut p = CombatPlayer::new(1, "0xAA".into(), CombatStats::default(), 0, None);
        p.record_fire(WeaponKind::Bullet, 1000);
        assert!(!p.has_matching_fire(WeaponKind::Bullet, 10_000, 3500));
    }

    #[test]
    fn nft_bonus_raises_regen_cap() {
        let p0 = CombatPlayer::new(1, "a".into(), CombatStats::default(), 0, None);
        let p1 = CombatPlayer::new(1, "a".into(), CombatStats::default(), 1, None);
        assert_eq!(p0.max_regen_per_tick(), 1);
        assert_eq!(p1.max_regen_per_tick(), 2);
    }
}
