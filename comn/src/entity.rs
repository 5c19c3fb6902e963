use serde::{Deserialize, Serialize};

use crate::{geom, Point, Vector};

/// Distance kept between a body and the world edge when clamping.
pub const WORLD_MARGIN: f32 = 10.0;

/// Physical state shared by everything that moves: a position, a velocity
/// and a circular hitbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub pos: Point,
    pub vel: Vector,
    pub hitbox: f32,
}

impl Body {
    pub fn new(pos: Point, hitbox: f32) -> Self {
        debug_assert!(hitbox >= 0.0);

        Self {
            pos,
            vel: Vector::zeros(),
            hitbox,
        }
    }

    pub fn collided(&self, other: &Body) -> bool {
        self.collided_at(other, other.pos)
    }

    /// Collision test as if `other` were located at `pos`.
    pub fn collided_at(&self, other: &Body, pos: Point) -> bool {
        let min_dist = self.hitbox + other.hitbox;
        (self.pos - pos).norm_squared() <= min_dist * min_dist
    }

    pub fn in_world(&self, size: Vector) -> bool {
        geom::in_bound(self.pos.x, 0.0, size.x) && geom::in_bound(self.pos.y, 0.0, size.y)
    }

    pub fn bound_to_world(&mut self, size: Vector) {
        self.pos.x = geom::bound(self.pos.x, WORLD_MARGIN, size.x - WORLD_MARGIN);
        self.pos.y = geom::bound(self.pos.y, WORLD_MARGIN, size.y - WORLD_MARGIN);
    }
}
