//! Arena geometry: bounds plus the central "stone" obstacle, modeled as a
//! compound of six circles in stone-local normalized coordinates (§4.8).
//! All collision against the stone resolves by pushing the probe point out
//! along whichever local circle penetrates deepest.

use crate::vec2::Vec2;

pub const ARENA_WIDTH: f32 = 2000.0;
pub const ARENA_HEIGHT: f32 = 1200.0;

/// The stone's overall radius; local circle offsets/radii below are
/// fractions of this.
pub const STONE_RADIUS: f32 = 180.0;

/// Six local circles (offset fraction of `STONE_RADIUS`, radius fraction of
/// `STONE_RADIUS`) approximating the stone's irregular silhouette as a
/// compound hitbox, per §3's "compound hitboxes" invariant.
const STONE_LOCAL_CIRCLES: [(f32, f32, f32); 6] = [
    (0.0, 0.0, 0.55),
    (0.35, 0.2, 0.32),
    (-0.35, 0.2, 0.32),
    (0.3, -0.35, 0.3),
    (-0.3, -0.35, 0.3),
    (0.0, 0.45, 0.28),
];

/// A small back-off used after a bisected dash lands inside the stone, so
/// the resolved position sits just outside the surface rather than exactly
/// on it (floating point safety margin).
const PUSH_EPSILON: f32 = 0.5;

/// Upper bound on push-out iterations: the compound has 6 circles, so a
/// handful of rounds is always enough to clear every one of them.
const PUSH_OUT_MAX_ITERATIONS: u32 = 8;

pub struct Arena {
    pub width: f32,
    pub height: f32,
    pub stone_center: Vec2,
}

impl Default for Arena {
    fn default() -> Self {
        Self {
            width: ARENA_WIDTH,
            height: ARENA_HEIGHT,
            stone_center: Vec2::new(ARENA_WIDTH / 2.0, ARENA_HEIGHT / 2.0),
        }
    }
}

/// One circle of the compound stone hitbox, in world space.
struct WorldCircle {
    center: Vec2,
    radius: f32,
}

impl Arena {
    fn stone_circles(&self) -> [WorldCircle; 6] {
        STONE_LOCAL_CIRCLES.map(|(dx, dy, r)| WorldCircle {
            center: self.stone_center.add(Vec2::new(dx, dy).scale(STONE_RADIUS)),
            radius: r * STONE_RADIUS,
        })
    }

    /// Returns the deepest-penetrating stone circle for `point`, if any,
    /// as `(circle_center, circle_radius, penetration_depth)`.
    fn deepest_penetration(&self, point: Vec2) -> Option<(Vec2, f32, f32)> {
        self.stone_circles()
            .iter()
            .filter_map(|c| {
                let dist = point.distance(c.center);
                let depth = c.radius - dist;
                (depth > 0.0).then_some((c.center, c.radius, depth))
            })
            .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap())
    }

    pub fn point_in_stone(&self, point: Vec2) -> bool {
        self.deepest_penetration(point).is_some()
    }

    /// Pushes `point` out of the stone along the deepest-penetrating
    /// circle's normal, if it is inside the stone at all. Repeats against
    /// the (possibly different) deepest-penetrating circle until the point
    /// clears the whole compound — pushing out of one local circle of the
    /// six-circle compound can still land inside a neighboring one. No-op
    /// if the point starts outside the stone.
    pub fn push_out_of_stone(&self, point: Vec2) -> Vec2 {
        let mut point = point;
        for _ in 0..PUSH_OUT_MAX_ITERATIONS {
            let Some((center, radius, _depth)) = self.deepest_penetration(point) else {
                return point;
            };
            let dir = point.sub(center).normalized();
            let dir = if dir == Vec2::ZERO { Vec2::new(1.0, 0.0) } else { dir };
            point = center.add(dir.scale(radius + PUSH_EPSILON));
        }
        point
    }

    /// Clamps a point to the arena bounds.
    pub fn clamp_to_bounds(&self, point: Vec2) -> Vec2 {
        Vec2::new(point.x.clamp(0.0, self.width), point.y.clamp(0.0, self.height))
    }

    pub fn out_of_bounds(&self, point: Vec2) -> bool {
        point.x < 0.0 || point.x > self.width || point.y < 0.0 || point.y > self.height
    }

    /// Resolves a dash from `from` to `to`: bisects the segment to find the
    /// first point of stone contact, backs off by `PUSH_EPSILON`, then
    /// push-outs the final position. If the straight line never touches the
    /// stone, `to` (clamped to bounds) is returned unchanged.
    pub fn resolve_dash(&self, from: Vec2, to: Vec2) -> Vec2 {
        if !self.point_in_stone(to) {
            return self.clamp_to_bounds(to);
        }

        // Binary search along [from, to] for the first t where we enter the stone.
        let mut lo = 0.0f32; // known clear (assuming `from` started clear)
        let mut hi = 1.0f32; // known blocked
        for _ in 0..24 {
            let mid = (lo + hi) / 2.0;
            let probe = from.lerp(to, mid);
            if self.point_in_stone(probe) {
                hi = mid;
            } else {
                lo = mid;
            }
        }

        let contact = from.lerp(to, lo);
        let back_off_dir = from.sub(to).normalized();
        let backed_off = contact.add(back_off_dir.scale(PUSH_EPSILON));
        let resolved = self.push_out_of_stone(backed_off);
        self.clamp_to_bounds(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_of_stone_is_inside() {
        let arena = Arena::default();
        assert!(arena.point_in_stone(arena.stone_center));
    }

    #[test]
    fn far_corner_is_outside() {
        let arena = Arena::default();
        assert!(!arena.point_in_stone(Vec2::new(5.0, 5.0)));
    }

    #[test]
    fn push_out_lands_outside() {
        let arena = Arena::default();
        let pushed = arena.push_out_of_stone(arena.stone_center);
        assert!(!arena.point_in_stone(pushed));
    }

    #[test]
    fn dash_through_stone_is_deflected() {
        let arena = Arena::default();
        let from = Vec2::new(arena.stone_center.x - STONE_RADIUS * 3.0, arena.stone_center.y);
        let to = Vec2::new(arena.stone_center.x + STONE_RADIUS * 3.0, arena.stone_center.y);
        let resolved = arena.resolve_dash(from, to);
        assert!(!arena.point_in_stone(resolved));
    }

    #[test]
    fn dash_clear_of_stone_is_unaffected() {
        let arena = Arena::default();
        let from = Vec2::new(5.0, 5.0);
        let to = Vec2::new(30.0, 5.0);
        assert_eq!(arena.resolve_dash(from, to), to);
    }

    #[test]
    fn bounds_clamp() {
        let arena = Arena::default();
        let clamped = arena.clamp_to_bounds(Vec2::new(-10.0, arena.height + 50.0));
        assert_eq!(clamped, Vec2::new(0.0, arena.height));
    }
}
