//! A player's hitbox is two circles offset vertically from their position
//! (top dome + lower body). A projectile hit tests against both (§4.8).

use crate::vec2::Vec2;

pub const DOME_OFFSET_Y: f32 = -18.0;
pub const DOME_RADIUS: f32 = 14.0;
pub const BODY_OFFSET_Y: f32 = 10.0;
pub const BODY_RADIUS: f32 = 16.0;

pub struct PlayerHitbox {
    pub position: Vec2,
}

impl PlayerHitbox {
    pub fn new(position: Vec2) -> Self {
        Self { position }
    }

    fn dome(&self) -> (Vec2, f32) {
        (self.position.add(Vec2::new(0.0, DOME_OFFSET_Y)), DOME_RADIUS)
    }

    fn body(&self) -> (Vec2, f32) {
        (self.position.add(Vec2::new(0.0, BODY_OFFSET_Y)), BODY_RADIUS)
    }

    /// True if `point` (with `point_radius`, e.g. a projectile's own
    /// radius) overlaps either circle of the hitbox.
    pub fn overlaps_point(&self, point: Vec2, point_radius: f32) -> bool {
        let (dome_center, dome_r) = self.dome();
        let (body_center, body_r) = self.body();
        point.distance(dome_center) <= dome_r + point_radius
            || point.distance(body_center) <= body_r + point_radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_point_overlaps_body() {
        let hb = PlayerHitbox::new(Vec2::new(100.0, 100.0));
        assert!(hb.overlaps_point(Vec2::new(100.0, 110.0), 1.0));
    }

    #[test]
    fn far_point_does_not_overlap() {
        let hb = PlayerHitbox::new(Vec2::new(100.0, 100.0));
        assert!(!hb.overlaps_point(Vec2::new(500.0, 500.0), 1.0));
    }

    #[test]
    fn dome_offset_is_above_body_offset() {
        assert!(DOME_OFFSET_Y < BODY_OFFSET_Y);
    }
}
