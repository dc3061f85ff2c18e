//! The damage pipeline: base weapon multiplier → variance roll → round and
//! clamp → absorb by armor first, remainder to HP (§4.8).

use crate::projectile::{base_damage_multiplier, ProjectileKind};

pub const MAX_DAMAGE: u32 = 300;
pub const VARIANCE_MIN: f64 = 0.5;
pub const VARIANCE_MAX: f64 = 1.0;

/// `base_damage_stat` is the shooter's `dmg` stat; `variance` must be drawn
/// from `[VARIANCE_MIN, VARIANCE_MAX)` by the caller (arena-scoped RNG in a
/// replay simulator, a crypto RNG live) — this function only applies it.
pub fn compute_damage(base_damage_stat: f32, kind: ProjectileKind, is_crit: bool, variance: f64) -> u32 {
    debug_assert!((VARIANCE_MIN..=VARIANCE_MAX).contains(&variance));
    let mult = base_damage_multiplier(kind, is_crit);
    let raw = base_damage_stat as f64 * mult as f64 * variance;
    (raw.round() as i64).clamp(0, MAX_DAMAGE as i64) as u32
}

pub struct DamageOutcome {
    pub new_hp: u32,
    pub new_armor: u32,
    pub damage_applied: u32,
}

/// Absorbs `damage` by armor first, remainder to HP. Both outputs are
/// clamped to their respective maxima.
pub fn apply_damage(hp: u32, max_hp: u32, armor: u32, max_armor: u32, damage: u32) -> DamageOutcome {
    let hp = hp.min(max_hp);
    let armor = armor.min(max_armor);
    let absorbed = damage.min(armor);
    let new_armor = armor - absorbed;
    let remainder = damage - absorbed;
    let new_hp = hp.saturating_sub(remainder);
    DamageOutcome { new_hp, new_armor, damage_applied: damage.min(hp + armor) }
}

/// Gates a client-proposed armor value against the regen rule (§4.8):
/// a proposal may only *raise* armor, by at most `max_regen_per_tick`, and
/// only when both `now - last_damage_at` and `now - last_armor_regen_at`
/// are at least `regen_interval_ms`. Any other proposal (lower, too soon,
/// or too large a jump) is dropped back to `current_armor`.
///
/// Returns the accepted armor value and whether a regen was actually
/// granted (callers use this to decide whether to bump `last_armor_regen_at`).
pub fn clamp_regen_proposal(
    current_armor: u32,
    max_armor: u32,
    proposed_armor: u32,
    max_regen_per_tick: u32,
    now_ms: u64,
    last_damage_at_ms: u64,
    last_armor_regen_at_ms: u64,
    regen_interval_ms: u64,
) -> (u32, bool) {
    if proposed_armor <= current_armor {
        return (proposed_armor.min(current_armor), false);
    }
    let damage_gate_ok = now_ms.saturating_sub(last_damage_at_ms) >= regen_interval_ms;
    let regen_gate_ok = now_ms.saturating_sub(last_armor_regen_at_ms) >= regen_interval_ms;
    if !damage_gate_ok || !regen_gate_ok {
        return (current_armor, false);
    }
    let allowed = current_armor.saturating_add(max_regen_per_tick).min(max_armor);
    (proposed_armor.min(allowed), true)
}

/// When on-chain stat enforcement is off, armor/HP may still only rise by a
/// small fixed "healthpack-sized" cap per packet, never an arbitrary jump.
pub const UNENFORCED_ARMOR_CAP: u32 = 5;
pub const UNENFORCED_HP_CAP: u32 = 5;

pub fn clamp_unenforced_rise(current: u32, max: u32, proposed: u32, cap: u32) -> u32 {
    if proposed <= current {
        proposed.min(current)
    } else {
        current.saturating_add(cap).min(max).min(proposed.min(max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damage_is_clamped_to_max() {
        let d = compute_damage(1000.0, ProjectileKind::Tnt, false, 1.0);
        assert_eq!(d, MAX_DAMAGE);
    }

    #[test]
    fn armor_absorbs_before_hp() {
        let outcome = apply_damage(100, 100, 20, 50, 15);
        assert_eq!(outcome.new_armor, 5);
        assert_eq!(outcome.new_hp, 100);
    }

    #[test]
    fn overflow_damage_spills_into_hp() {
        let outcome = apply_damage(100, 100, 10, 50, 30);
        assert_eq!(outcome.new_armor, 0);
        assert_eq!(outcome.new_hp, 80);
    }

    #[test]
    fn hp_never_goes_negative() {
        let outcome = apply_damage(5, 100, 0, 50, 50);
        assert_eq!(outcome.new_hp, 0);
    }

    #[test]
    fn regen_drops_when_damage_too_recent() {
        let (armor, granted) = clamp_regen_proposal(45, 100, 48, 1, 1000, 0, 0, 2000);
        assert_eq!(armor, 45);
        assert!(!granted);
    }

    #[test]
    fn regen_accepts_capped_increase_once_gates_clear() {
        let (armor, granted) = clamp_regen_proposal(45, 100, 47, 1, 3000, 0, 1000, 2000);
        assert_eq!(armor, 46);
        assert!(granted);
    }

    #[test]
    fn regen_never_lowers_armor() {
        let (armor, granted) = clamp_regen_proposal(45, 100, 10, 1, 10_000, 0, 0, 2000);
        assert_eq!(armor, 10);
        assert!(!granted);
    }

    #[test]
    fn unenforced_rise_is_capped() {
        let v = clamp_unenforced_rise(40, 100, 90, UNENFORCED_ARMOR_CAP);
        assert_eq!(v, 45);
    }
}
