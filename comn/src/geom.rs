use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::{Point, Vector};

/// Ray directions with a component smaller than this are treated as parallel
/// to the corresponding slab.
pub const RAY_EPSILON: f32 = 1e-6;

pub fn from_polar(magnitude: f32, angle: f32) -> Vector {
    Vector::new(magnitude * angle.cos(), magnitude * angle.sin())
}

pub fn angle(v: Vector) -> f32 {
    v.y.atan2(v.x)
}

pub fn distance(a: Point, b: Point) -> f32 {
    (a - b).norm()
}

pub fn normalize_or_zero(v: Vector) -> Vector {
    let norm = v.norm();
    if norm > 0.0 {
        v / norm
    } else {
        Vector::zeros()
    }
}

/// Maps an angle into [-PI, PI).
pub fn normalize_angle(angle: f32) -> f32 {
    angle - 2.0 * PI * ((angle + PI) / (2.0 * PI)).floor()
}

/// Signed shortest difference `alpha - beta`.
pub fn angle_dist(alpha: f32, beta: f32) -> f32 {
    (alpha - beta).sin().atan2((alpha - beta).cos())
}

/// Inclusive range check that tolerates swapped bounds.
pub fn in_bound(val: f32, min: f32, max: f32) -> bool {
    if min > max {
        val >= max && val <= min
    } else {
        val >= min && val <= max
    }
}

/// Clamps into an inclusive range that tolerates swapped bounds.
pub fn bound(val: f32, min: f32, max: f32) -> f32 {
    if min > max {
        val.max(max).min(min)
    } else {
        val.max(min).min(max)
    }
}

/// Pushes `val` back onto the boundary it crossed since `prev_val`.
pub fn reverse_bound(val: f32, prev_val: f32, min: f32, max: f32) -> f32 {
    if prev_val <= min && val > min {
        min
    } else if prev_val >= max && val < max {
        max
    } else {
        val
    }
}

/// True if moving from `prev_val` to `val` entered the range through one of
/// its boundaries.
pub fn reverse_bounce(val: f32, prev_val: f32, min: f32, max: f32) -> bool {
    (prev_val < min && val > min) || (prev_val > max && val < max)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AaRect {
    pub top_left: Point,
    pub size: Vector,
}

impl AaRect {
    pub fn new_top_left(top_left: Point, size: Vector) -> Self {
        Self { top_left, size }
    }

    pub fn new_center(center: Point, size: Vector) -> Self {
        Self {
            top_left: center - size / 2.0,
            size,
        }
    }

    pub fn center(&self) -> Point {
        self.top_left + self.size / 2.0
    }

    pub fn min(&self) -> Point {
        self.top_left
    }

    pub fn max(&self) -> Point {
        self.top_left + self.size
    }

    pub fn contains_point(&self, point: Point) -> bool {
        in_bound(point.x, self.top_left.x, self.top_left.x + self.size.x)
            && in_bound(point.y, self.top_left.y, self.top_left.y + self.size.y)
    }

    /// Grows the rectangle by `margin` on every side.
    pub fn inflate(&self, margin: f32) -> AaRect {
        AaRect {
            top_left: self.top_left - Vector::new(margin, margin),
            size: self.size + Vector::new(2.0 * margin, 2.0 * margin),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ray {
    pub origin: Point,
    pub dir: Vector,
}

impl Ray {
    /// Slab test against an axis-aligned box. Returns the entry and exit
    /// parameters along the ray, or `None` if the ray misses the box.
    /// Parameters may be negative if the box lies partly behind the origin.
    pub fn aa_rect_intersection(&self, rect: &AaRect) -> Option<(f32, f32)> {
        let min = rect.min();
        let max = rect.max();

        let (tx0, tx1) = Self::slab(self.origin.x, self.dir.x, min.x, max.x)?;
        let (ty0, ty1) = Self::slab(self.origin.y, self.dir.y, min.y, max.y)?;

        let t_min = tx0.max(ty0);
        let t_max = tx1.min(ty1);

        if t_min > t_max {
            None
        } else {
            Some((t_min, t_max))
        }
    }

    /// Like `aa_rect_intersection`, but only counts hits in front of the
    /// origin, with entry times clipped to zero.
    pub fn intersections(&self, rect: &AaRect) -> RayIntersections {
        RayIntersections(
            self.aa_rect_intersection(rect)
                .and_then(|(t1, t2)| Self::collect_times(t1, t2)),
        )
    }

    fn slab(origin: f32, dir: f32, min: f32, max: f32) -> Option<(f32, f32)> {
        if dir.abs() < RAY_EPSILON {
            // Parallel to the slab: either always inside or never.
            if origin >= min && origin <= max {
                Some((std::f32::NEG_INFINITY, std::f32::INFINITY))
            } else {
                None
            }
        } else {
            let inv = 1.0 / dir;
            let t0 = (min - origin) * inv;
            let t1 = (max - origin) * inv;
            Some((t0.min(t1), t0.max(t1)))
        }
    }

    fn collect_times(t1: f32, t2: f32) -> Option<(f32, f32)> {
        if t2 < 0.0 {
            None
        } else {
            Some((t1.max(0.0), t2))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayIntersections(pub Option<(f32, f32)>);

impl RayIntersections {
    pub fn first(&self) -> Option<f32> {
        self.0.map(|(t1, t2)| t1.min(t2))
    }

    pub fn is_hit(&self) -> bool {
        self.0.is_some()
    }
}
