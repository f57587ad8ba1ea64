use crate::math as m;

/// An axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct AABB {
    pub min: m::Vec2,
    pub max: m::Vec2,
}

impl AABB {
    #[inline]
    pub fn new(min: m::Vec2, max: m::Vec2) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn zero() -> Self {
        Self::new(m::Vec2::zero(), m::Vec2::zero())
    }

    /// The smallest box containing all the given points.
    /// Returns a zero-size box at the origin for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = m::Vec2>) -> Self {
        let mut points = points.into_iter();
        let Some(first) = points.next() else {
            return Self::zero();
        };
        points.fold(Self::new(first, first), |acc, p| Self {
            min: acc.min.min_by_component(p),
            max: acc.max.max_by_component(p),
        })
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    #[inline]
    pub fn center(&self) -> m::Vec2 {
        0.5 * (self.min + self.max)
    }

    /// Grow the box by the given amount in every direction.
    #[inline]
    pub fn padded(&self, amount: f64) -> Self {
        let pad = m::Vec2::new(amount, amount);
        Self {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    /// Extend the box in the direction of a displacement, leaving the opposite side in place.
    pub fn swept(&self, displacement: m::Vec2) -> Self {
        let mut ret = *self;
        if displacement.x < 0.0 {
            ret.min.x += displacement.x;
        } else {
            ret.max.x += displacement.x;
        }
        if displacement.y < 0.0 {
            ret.min.y += displacement.y;
        } else {
            ret.max.y += displacement.y;
        }
        ret
    }

    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min_by_component(other.min),
            max: self.max.max_by_component(other.max),
        }
    }

    pub fn intersection(&self, other: &Self) -> Option<Self> {
        if self.overlaps(other) {
            Some(Self {
                min: self.min.max_by_component(other.min),
                max: self.max.min_by_component(other.max),
            })
        } else {
            None
        }
    }

    /// Check for overlap. Touching boxes count as overlapping.
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
    }

    /// Check whether another box is entirely inside this one.
    #[inline]
    pub fn contains(&self, other: &Self) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }

    #[inline]
    pub fn contains_point(&self, point: m::Vec2) -> bool {
        self.min.x <= point.x
            && point.x <= self.max.x
            && self.min.y <= point.y
            && point.y <= self.max.y
    }
}

/// A ray segment from `start` to `start + dir * max_t`.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub start: m::Vec2,
    pub dir: m::Vec2,
}

impl Ray {
    /// Create a ray going from `p1` towards `p2`,
    /// parameterized so that `t = 1` is at `p2`.
    #[inline]
    pub fn between(p1: m::Vec2, p2: m::Vec2) -> Self {
        Self {
            start: p1,
            dir: p2 - p1,
        }
    }

    #[inline]
    pub fn point_at_t(&self, t: f64) -> m::Vec2 {
        self.start + t * self.dir
    }
}

/// Find the smallest non-negative `t` at which the ray enters the box, if it does at all.
/// A ray starting inside the box hits it at `t = 0`.
pub fn ray_aabb(ray: Ray, aabb: AABB) -> Option<f64> {
    let mut t_min = 0.0_f64;
    let mut t_max = f64::INFINITY;
    for (start, dir, min, max) in [
        (ray.start.x, ray.dir.x, aabb.min.x, aabb.max.x),
        (ray.start.y, ray.dir.y, aabb.min.y, aabb.max.y),
    ] {
        if dir.abs() < m::EPSILON {
            if start < min || start > max {
                return None;
            }
        } else {
            let inv_dir = 1.0 / dir;
            let (t1, t2) = ((min - start) * inv_dir, (max - start) * inv_dir);
            let (t1, t2) = if t1 < t2 { (t1, t2) } else { (t2, t1) };
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }
    }
    Some(t_min)
}
