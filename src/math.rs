//! Types, aliases and helper operations for doing math with `ultraviolet`.
use std::f64::consts::PI;
pub use ultraviolet as uv;

/// A Pose has a rotation and a translation, no scaling.
///
/// Bodies store their rotation as a plain angle and build a Pose on demand
/// whenever points need to be transformed between local and world space.
pub type Pose = uv::DIsometry2;
pub type Vec2 = uv::DVec2;
pub type Rotor2 = uv::DRotor2;

/// Lengths below this are treated as zero when normalizing.
pub const EPSILON: f64 = 1.0e-12;

/// An angle in either degrees or radians.
/// Default conversion from f64 is in degrees.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub enum Angle {
    Rad(f64),
    Deg(f64),
}
impl Angle {
    /// Get the angle as degrees.
    #[inline]
    pub fn deg(&self) -> f64 {
        match self {
            Angle::Rad(rad) => rad * 180.0 / PI,
            Angle::Deg(deg) => *deg,
        }
    }

    /// Get the angle as radians.
    #[inline]
    pub fn rad(&self) -> f64 {
        match self {
            Angle::Rad(rad) => *rad,
            Angle::Deg(deg) => deg * PI / 180.0,
        }
    }
}
impl Default for Angle {
    fn default() -> Self {
        Angle::Rad(0.0)
    }
}
impl From<Angle> for Rotor2 {
    #[inline]
    fn from(ang: Angle) -> Rotor2 {
        Rotor2::from_angle(ang.rad())
    }
}
impl From<Rotor2> for Angle {
    #[inline]
    fn from(rotor: Rotor2) -> Self {
        Angle::Rad(-rotor.bv.xy.atan2(rotor.s) * 2.0)
    }
}

/// A wrapper type to indicate a vector should always be normalized.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Unit<T>(T);

impl Unit<Vec2> {
    /// Normalize a vector. A zero vector stays zero instead of becoming NaN,
    /// so callers that can produce degenerate input should check for that.
    pub fn new_normalize(v: Vec2) -> Self {
        Unit(normalize_or_zero(v))
    }

    pub const fn new_unchecked(v: Vec2) -> Self {
        Unit(v)
    }

    pub fn unit_x() -> Self {
        Unit(Vec2::unit_x())
    }

    pub fn unit_y() -> Self {
        Unit(Vec2::unit_y())
    }

    #[inline]
    pub fn into_inner(self) -> Vec2 {
        self.0
    }
}

impl std::ops::Mul<Unit<Vec2>> for Rotor2 {
    type Output = Unit<Vec2>;

    fn mul(self, rhs: Unit<Vec2>) -> Self::Output {
        Unit(self * rhs.0)
    }
}

impl<T> std::ops::Deref for Unit<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> std::ops::Neg for Unit<T>
where
    T: std::ops::Neg,
{
    type Output = Unit<<T as std::ops::Neg>::Output>;

    fn neg(self) -> Self::Output {
        Unit(-self.0)
    }
}

/// A builder to create [`Pose`][self::Pose]s.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct PoseBuilder {
    position: [f64; 2],
    rotation: Angle,
}
impl PoseBuilder {
    pub fn new() -> Self {
        PoseBuilder {
            position: [0.0, 0.0],
            rotation: Angle::default(),
        }
    }
    #[inline]
    pub fn with_position(mut self, pos: impl Into<[f64; 2]>) -> Self {
        self.position = pos.into();
        self
    }
    #[inline]
    pub fn with_rotation(mut self, angle: Angle) -> Self {
        self.rotation = angle;
        self
    }
    #[inline]
    pub fn build(self) -> Pose {
        Pose::new(
            Vec2::new(self.position[0], self.position[1]),
            self.rotation.into(),
        )
    }
}
impl Default for PoseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
impl From<PoseBuilder> for Pose {
    fn from(b: PoseBuilder) -> Pose {
        b.build()
    }
}
impl From<Pose> for PoseBuilder {
    fn from(pose: Pose) -> Self {
        PoseBuilder::new()
            .with_position(pose.translation)
            .with_rotation(Angle::from(pose.rotation))
    }
}

/// Build a pose from a position and an angle in radians.
#[inline]
pub fn pose(position: Vec2, angle: f64) -> Pose {
    Pose::new(position, Rotor2::from_angle(angle))
}

// Vec2 utils

#[inline]
pub fn left_normal(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}
#[inline]
pub fn right_normal(v: Vec2) -> Vec2 {
    Vec2::new(v.y, -v.x)
}
#[inline]
pub fn unit_left_normal(u: Unit<Vec2>) -> Unit<Vec2> {
    Unit::new_unchecked(left_normal(*u))
}
#[inline]
pub fn unit_right_normal(u: Unit<Vec2>) -> Unit<Vec2> {
    Unit::new_unchecked(right_normal(*u))
}

/// The z component of the 3D cross product of two planar vectors.
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Cross product of a scalar (z-axis vector) and a planar vector.
/// This is how angular velocity turns into the linear velocity of an offset point.
#[inline]
pub fn cross_sv(s: f64, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// Normalize a vector, returning zero for vectors too short to have a direction.
#[inline]
pub fn normalize_or_zero(v: Vec2) -> Vec2 {
    let mag = v.mag();
    if mag < EPSILON {
        Vec2::zero()
    } else {
        v / mag
    }
}

/// Wrap an angle into the range `(-PI, PI]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// A column-major 2x2 matrix, used for the point constraints of joints.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mat22 {
    pub col1: Vec2,
    pub col2: Vec2,
}

impl Mat22 {
    #[inline]
    pub fn new(col1: Vec2, col2: Vec2) -> Self {
        Self { col1, col2 }
    }

    #[inline]
    pub fn zero() -> Self {
        Self::new(Vec2::zero(), Vec2::zero())
    }

    /// Inverse of the matrix, or zero if the matrix is singular.
    pub fn inversed(&self) -> Self {
        let (a, b, c, d) = (self.col1.x, self.col2.x, self.col1.y, self.col2.y);
        let det = a * d - b * c;
        if det.abs() < EPSILON {
            return Self::zero();
        }
        let inv_det = 1.0 / det;
        Self::new(
            Vec2::new(inv_det * d, -inv_det * c),
            Vec2::new(-inv_det * b, inv_det * a),
        )
    }

    /// Solve `self * x = rhs` for x. Singular matrices give a zero solution.
    #[inline]
    pub fn solve(&self, rhs: Vec2) -> Vec2 {
        self.inversed() * rhs
    }
}

impl std::ops::Mul<Vec2> for Mat22 {
    type Output = Vec2;

    #[inline]
    fn mul(self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.col1.x * v.x + self.col2.x * v.y,
            self.col1.y * v.x + self.col2.y * v.y,
        )
    }
}

impl std::ops::Add for Mat22 {
    type Output = Mat22;

    #[inline]
    fn add(self, rhs: Mat22) -> Mat22 {
        Mat22::new(self.col1 + rhs.col1, self.col2 + rhs.col2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotor_angle_roundtrip_and_direction() {
        let rot: Rotor2 = Angle::Deg(90.0).into();
        let v = rot * Vec2::unit_x();
        assert!((v.x).abs() < 1e-12 && (v.y - 1.0).abs() < 1e-12);
        assert!((Angle::from(rot).rad() - PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn zero_vectors_normalize_to_zero() {
        assert_eq!(normalize_or_zero(Vec2::zero()), Vec2::zero());
        assert_eq!(*Unit::new_normalize(Vec2::new(0.0, 1e-14)), Vec2::zero());
        let n = normalize_or_zero(Vec2::new(3.0, 4.0));
        assert!((n.mag() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn singular_matrix_solves_to_zero() {
        let m = Mat22::new(Vec2::new(1.0, 2.0), Vec2::new(2.0, 4.0));
        assert_eq!(m.solve(Vec2::new(1.0, 1.0)), Vec2::zero());

        let m = Mat22::new(Vec2::new(2.0, 0.0), Vec2::new(1.0, 3.0));
        let x = m.solve(Vec2::new(5.0, 6.0));
        let back = m * x;
        assert!((back.x - 5.0).abs() < 1e-12 && (back.y - 6.0).abs() < 1e-12);
    }

    #[test]
    fn angles_wrap_into_range() {
        assert!((wrap_angle(3.0 * PI) - PI).abs() < 1e-12);
        assert!((wrap_angle(-PI / 2.0 - 2.0 * PI) + PI / 2.0).abs() < 1e-12);
        assert_eq!(wrap_angle(0.25), 0.25);
    }
}
