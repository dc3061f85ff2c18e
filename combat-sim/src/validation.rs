//! Hit acceptance windows and the shared rate-limit/lockout bucket (§4.8).

use protocol::combat::WeaponKind;

/// The acceptance window (ms) a hit report of `weapon` must fall within,
/// measured from the shooter's matching fire event.
pub fn acceptance_window_ms(weapon: WeaponKind) -> u64 {
    match weapon {
        WeaponKind::Bullet => 3500,
        WeaponKind::Heavy => 5200,
        WeaponKind::Arrow => 3500,
        WeaponKind::Mine => 12_000,
        WeaponKind::Spike => 1_500,
        WeaponKind::Tnt => 8_000,
    }
}

/// High-impact actions (dash, click, bullet, arrow, heavy, mine, line, TNT)
/// share one 1 s cooldown bucket per session; firing again during the
/// cooldown triggers a 2 s lockout.
pub const HIGH_IMPACT_COOLDOWN_MS: u64 = 1_000;
pub const LOCKOUT_PENALTY_MS: u64 = 2_000;
pub const STATS_THROTTLE_MS: u64 = 180;
pub const HIT_THROTTLE_MS: u64 = 140;

#[derive(Debug, Default, Clone, Copy)]
pub struct RateLimiter {
    last_action_at_ms: Option<u64>,
    locked_out_until_ms: u64,
}

impl RateLimiter {
    /// Checks whether a high-impact action at `now_ms` is allowed. If the
    /// session is spamming during its own cooldown, extends the lockout.
    /// Returns `true` iff the action should be processed.
    pub fn try_high_impact_action(&mut self, now_ms: u64) -> bool {
        if now_ms < self.locked_out_until_ms {
            return false;
        }
        if let Some(last) = self.last_action_at_ms {
            if now_ms.saturating_sub(last) < HIGH_IMPACT_COOLDOWN_MS {
                self.locked_out_until_ms = now_ms + LOCKOUT_PENALTY_MS;
                return false;
            }
        }
        self.last_action_at_ms = Some(now_ms);
        true
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Throttle {
    last_at_ms: Option<u64>,
}

impl Throttle {
    pub fn allow(&mut self, now_ms: u64, interval_ms: u64) -> bool {
        if let Some(last) = self.last_at_ms {
            if now_ms.saturating_sub(last) < interval_ms {
                return false;
            }
        }
        self.last_at_ms = Some(now_ms);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_action_always_allowed() {
        let mut rl = RateLimiter::default();
        assert!(rl.try_high_impact_action(100));
    }

    #[test]
    fn spam_during_cooldown_triggers_lockout() {
        let mut rl = RateLimiter::default();
        assert!(rl.try_high_impact_action(0));
        assert!(!rl.try_high_impact_action(200));
        // Still locked out well past the original 1s cooldown.
        assert!(!rl.try_high_impact_action(1_500));
        // But clear after the 2s lockout from the violation at t=200.
        assert!(rl.try_high_impact_action(2_300));
    }

    #[test]
    fn action_after_cooldown_elapses_is_allowed() {
        let mut rl = RateLimiter::default();
        assert!(rl.try_high_impact_action(0));
        assert!(rl.try_high_impact_action(1_000));
    }

    #[test]
    fn throttle_drops_rapid_repeats() {
        let mut t = Throttle::default();
        assert!(t.allow(0, 180));
        assert!(!t.allow(100, 180));
        assert!(t.allow(200, 180));
    }

    #[test]
    fn acceptance_windows_match_table() {
        assert_eq!(acceptance_window_ms(WeaponKind::Spike), 1_500);
        assert_eq!(acceptance_window_ms(WeaponKind::Mine), 12_000);
    }
}
