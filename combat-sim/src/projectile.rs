//! Server-owned projectiles: arrows, bullets, heavy shells and TNT (§3, §4.8).

use crate::arena::Arena;
use crate::vec2::Vec2;
use protocol::combat::WeaponKind;

pub const GRAVITY: f32 = 900.0; // px/s^2, heavy-shell fall acceleration.
pub const TNT_FUSE_MS: u64 = 3_000;
pub const TNT_MAX_LIFETIME_MS: u64 = 8_000;
pub const TNT_FALL_SPEED: f32 = 260.0;
pub const ARROW_SPEED: f32 = 700.0;
pub const BULLET_SPEED: f32 = 1100.0;
pub const BULLET_BOUNCE_DAMPING: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectileKind {
    Arrow,
    Bullet,
    Heavy,
    Tnt,
}

impl From<WeaponKind> for ProjectileKind {
    fn from(value: WeaponKind) -> Self {
        match value {
            WeaponKind::Arrow => ProjectileKind::Arrow,
            WeaponKind::Bullet => ProjectileKind::Bullet,
            WeaponKind::Heavy => ProjectileKind::Heavy,
            WeaponKind::Tnt => ProjectileKind::Tnt,
            // Mine/spike are melee-range hit-validation-only weapons; they
            // never spawn a server-owned projectile.
            WeaponKind::Mine | WeaponKind::Spike => ProjectileKind::Bullet,
        }
    }
}

/// Base damage multiplier (before the [0.5, 1.0] variance roll) and whether
/// the weapon can crit at all, per the §4.8 weapon table.
pub fn base_damage_multiplier(kind: ProjectileKind, is_crit: bool) -> f32 {
    match (kind, is_crit) {
        (ProjectileKind::Arrow, false) => 2.0,
        (ProjectileKind::Arrow, true) => 3.0,
        (ProjectileKind::Bullet, false) => 0.5,
        (ProjectileKind::Bullet, true) => 1.0, // "crit x2" over the 0.5 base.
        (ProjectileKind::Heavy, false) => 2.0,
        (ProjectileKind::Heavy, true) => 3.0,
        (ProjectileKind::Tnt, _) => 2.5, // TNT cannot crit.
    }
}

pub struct Projectile {
    pub id: u32,
    pub kind: ProjectileKind,
    pub origin: Vec2,
    pub position: Vec2,
    pub velocity: Vec2,
    pub shooter_id: u16,
    pub bounces_left: u8,
    pub travel_left: f32,
    pub damage_enabled: bool,
    /// TNT only: the target it is stuck to and the fuse deadline (ms since
    /// spawn). `None` until it sticks.
    pub stuck: Option<(u16, u64)>,
    pub age_ms: u64,
    pub dead: bool,
}

impl Projectile {
    pub fn spawn_arrow(id: u32, shooter_id: u16, origin: Vec2, target: Vec2) -> Self {
        let dir = target.sub(origin).normalized();
        Self {
            id,
            kind: ProjectileKind::Arrow,
            origin,
            position: origin,
            velocity: dir.scale(ARROW_SPEED),
            shooter_id,
            bounces_left: 1,
            travel_left: 1400.0,
            damage_enabled: true,
            stuck: None,
            age_ms: 0,
            dead: false,
        }
    }

    pub fn spawn_bullet(id: u32, shooter_id: u16, origin: Vec2, velocity: Vec2) -> Self {
        Self {
            id,
            kind: ProjectileKind::Bullet,
            origin,
            position: origin,
            velocity,
            shooter_id,
            bounces_left: 3,
            travel_left: 2200.0,
            damage_enabled: true,
            stuck: None,
            age_ms: 0,
            dead: false,
        }
    }

    pub fn spawn_heavy(id: u32, shooter_id: u16, origin: Vec2, velocity: Vec2) -> Self {
        Self {
            id,
            kind: ProjectileKind::Heavy,
            origin,
            position: origin,
            velocity,
            shooter_id,
            bounces_left: 0,
            travel_left: 2600.0,
            damage_enabled: true,
            stuck: None,
            age_ms: 0,
            dead: false,
        }
    }

    pub fn spawn_tnt(id: u32, shooter_id: u16, origin: Vec2) -> Self {
        Self {
            id,
            kind: ProjectileKind::Tnt,
            origin,
            position: origin,
            velocity: Vec2::new(0.0, TNT_FALL_SPEED),
            shooter_id,
            bounces_left: 0,
            travel_left: f32::MAX,
            damage_enabled: true,
            stuck: None,
            age_ms: 0,
            dead: false,
        }
    }

    /// Advances the projectile by one tick. Returns `Some(true)` if it just
    /// bounced off the stone (for a `stone_bounce` event), `Some(false)` if
    /// it just died against the stone with no bounce budget left (for a
    /// `stone_hit` event), or `None` for an uneventful step.
    pub fn step(&mut self, arena: &Arena, dt_ms: u64) -> Option<bool> {
        if self.dead {
            return None;
        }
        self.age_ms += dt_ms;
        let dt = dt_ms as f32 / 1000.0;

        if self.kind == ProjectileKind::Heavy {
            self.velocity.y += GRAVITY * dt;
        }

        if self.kind == ProjectileKind::Tnt {
            if let Some((_, fuse_deadline)) = self.stuck {
                if self.age_ms >= fuse_deadline {
                    self.dead = true;
                }
                return None;
            }
            if self.age_ms >= TNT_MAX_LIFETIME_MS || self.position.y >= arena.height {
                self.dead = true;
                return None;
            }
        }

        let next = self.position.add(self.velocity.scale(dt));
        self.travel_left -= next.distance(self.position);

        if arena.point_in_stone(next) {
            if self.bounces_left > 0 {
                self.bounces_left -= 1;
                self.position = arena.push_out_of_stone(next);
                self.velocity = reflect_off_stone(self.velocity, arena, self.position);
                if self.kind == ProjectileKind::Bullet {
                    self.velocity = self.velocity.scale(BULLET_BOUNCE_DAMPING);
                }
                if self.kind == ProjectileKind::Arrow {
                    // Arrow becomes visual-only after its one bounce.
                    self.damage_enabled = false;
                    self.travel_left = self.travel_left.min(120.0);
                }
                return Some(true);
            } else {
                self.dead = true;
                return Some(false);
            }
        }

        self.position = next;

        if arena.out_of_bounds(self.position) || self.travel_left <= 0.0 {
            self.dead = true;
        }

        None
    }

    /// Sticks a TNT to `target`, starting its fuse from the current age.
    pub fn stick_tnt(&mut self, target: u16) {
        debug_assert_eq!(self.kind, ProjectileKind::Tnt);
        self.stuck = Some((target, self.age_ms + TNT_FUSE_MS));
    }
}

fn reflect_off_stone(velocity: Vec2, arena: &Arena, surface_point: Vec2) -> Vec2 {
    let normal = surface_point.sub(arena.stone_center).normalized();
    let normal = if normal == Vec2::ZERO { Vec2::new(1.0, 0.0) } else { normal };
    let d = velocity.dot(normal);
    velocity.sub(normal.scale(2.0 * d))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shooter_never_equals_itself_by_construction() {
        let p = Projectile::spawn_bullet(1, 7, Vec2::ZERO, Vec2::new(1.0, 0.0));
        assert_eq!(p.shooter_id, 7);
    }

    #[test]
    fn bullet_bounces_then_dies() {
        let arena = Arena::default();
        let mut p = Projectile::spawn_bullet(
            1,
            1,
            Vec2::new(arena.stone_center.x - 900.0, arena.stone_center.y),
            Vec2::new(BULLET_SPEED, 0.0),
        );
        let mut bounces = 0;
        for _ in 0..400 {
            if let Some(bounced) = p.step(&arena, 33) {
                if bounced {
                    bounces += 1;
                }
            }
            if p.dead {
                break;
            }
        }
        assert!(bounces <= 3);
        assert!(p.dead);
    }

    #[test]
    fn arrow_becomes_visual_only_after_bounce() {
        let arena = Arena::default();
        let mut p = Projectile::spawn_arrow(
            1,
            1,
            Vec2::new(arena.stone_center.x - 900.0, arena.stone_center.y),
            Vec2::new(arena.stone_center.x, arena.stone_center.y),
        );
        for _ in 0..200 {
            p.step(&arena, 33);
            if !p.damage_enabled {
                break;
            }
        }
        assert!(!p.damage_enabled || p.dead);
    }

    #[test]
    fn tnt_explodes_after_fuse() {
        let mut p = Projectile::spawn_tnt(1, 1, Vec2::new(100.0, 100.0));
        p.stick_tnt(2);
        let arena = Arena::default();
        for _ in 0..(TNT_FUSE_MS / 33 + 2) {
            p.step(&arena, 33);
        }
        assert!(p.dead);
    }

    #[test]
    fn tnt_without_stick_expires_at_max_lifetime() {
        let mut p = Projectile::spawn_tnt(1, 1, Vec2::new(100.0, 0.0));
        let arena = Arena::default();
        for _ in 0..(TNT_MAX_LIFETIME_MS / 33 + 2) {
            p.step(&arena, 33);
        }
        assert!(p.dead);
    }
}
