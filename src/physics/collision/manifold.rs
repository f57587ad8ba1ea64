use crate::math as m;

/// A geometric feature of a shape that produced a contact point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    Vertex(u8),
    Face(u8),
}

impl Feature {
    #[inline]
    fn packed(self) -> u16 {
        match self {
            Feature::Vertex(i) => i as u16,
            Feature::Face(i) => 0x100 | i as u16,
        }
    }
}

/// Identifies which pair of features produced a manifold point,
/// so the same point can be recognized across steps even as the bodies move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContactId {
    pub feature_a: Feature,
    pub feature_b: Feature,
}

impl ContactId {
    pub const CIRCLES: ContactId = ContactId {
        feature_a: Feature::Vertex(0),
        feature_b: Feature::Vertex(0),
    };

    #[inline]
    pub fn new(feature_a: Feature, feature_b: Feature) -> Self {
        Self {
            feature_a,
            feature_b,
        }
    }

    /// The same contact seen from the other shape's point of view.
    #[inline]
    pub fn flipped(self) -> Self {
        Self::new(self.feature_b, self.feature_a)
    }

    /// A single number identifying the feature pair.
    #[inline]
    pub fn key(&self) -> u32 {
        (self.feature_a.packed() as u32) << 16 | self.feature_b.packed() as u32
    }
}

/// Which shape the manifold's local normal and local point are expressed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManifoldKind {
    /// Local point is the center of shape A's circle.
    Circles,
    /// Reference face is on shape A.
    FaceA,
    /// Reference face is on shape B.
    FaceB,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ManifoldPoint {
    /// World-space point halfway between the two surfaces.
    pub position: m::Vec2,
    /// The point on the incident shape in that shape's local space.
    pub local_point: m::Vec2,
    /// Signed distance between the surfaces along the normal, negative when penetrating.
    pub separation: f64,
    pub id: ContactId,
    /// Accumulated normal impulse, carried over between steps for warm starting.
    pub normal_impulse: f64,
    /// Accumulated friction impulse, carried over between steps for warm starting.
    pub tangent_impulse: f64,
}

impl ManifoldPoint {
    pub(crate) fn new(position: m::Vec2, local_point: m::Vec2, separation: f64, id: ContactId) -> Self {
        Self {
            position,
            local_point,
            separation,
            id,
            normal_impulse: 0.0,
            tangent_impulse: 0.0,
        }
    }
}

/// The contact points between two shapes and the normal they share.
#[derive(Clone, Debug, PartialEq)]
pub struct Manifold {
    pub kind: ManifoldKind,
    /// World-space normal pointing from shape A to shape B.
    pub normal: m::Unit<m::Vec2>,
    /// Normal in the local space of the reference shape.
    pub local_normal: m::Vec2,
    /// Point on the reference face in the local space of the reference shape.
    pub local_point: m::Vec2,
    points: [Option<ManifoldPoint>; 2],
}

impl Default for Manifold {
    fn default() -> Self {
        Self::empty()
    }
}

impl Manifold {
    pub fn empty() -> Self {
        Self {
            kind: ManifoldKind::Circles,
            normal: m::Unit::unit_x(),
            local_normal: m::Vec2::zero(),
            local_point: m::Vec2::zero(),
            points: [None, None],
        }
    }

    pub(crate) fn new(
        kind: ManifoldKind,
        normal: m::Unit<m::Vec2>,
        local_normal: m::Vec2,
        local_point: m::Vec2,
    ) -> Self {
        Self {
            kind,
            normal,
            local_normal,
            local_point,
            points: [None, None],
        }
    }

    /// Add a point. Anything past the second is ignored.
    pub(crate) fn push(&mut self, point: ManifoldPoint) {
        if let Some(slot) = self.points.iter_mut().find(|p| p.is_none()) {
            *slot = Some(point);
        }
    }

    #[inline]
    pub fn point_count(&self) -> usize {
        self.points.iter().flatten().count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points[0].is_none()
    }

    pub fn points(&self) -> impl Iterator<Item = &ManifoldPoint> {
        self.points.iter().flatten()
    }

    pub fn points_mut(&mut self) -> impl Iterator<Item = &mut ManifoldPoint> {
        self.points.iter_mut().flatten()
    }

    /// Deepest penetration of any point, or zero if nothing penetrates.
    pub fn max_penetration(&self) -> f64 {
        self.points()
            .map(|p| -p.separation)
            .fold(0.0, f64::max)
    }

    /// Copy accumulated impulses from an older manifold into points with matching ids.
    /// Points without a match start from zero.
    pub fn warm_start_from(&mut self, old: &Manifold) {
        for point in self.points_mut() {
            match old.points().find(|o| o.id.key() == point.id.key()) {
                Some(o) => {
                    point.normal_impulse = o.normal_impulse;
                    point.tangent_impulse = o.tangent_impulse;
                }
                None => {
                    point.normal_impulse = 0.0;
                    point.tangent_impulse = 0.0;
                }
            }
        }
    }

    /// Swap the roles of shapes A and B.
    pub(crate) fn flipped(mut self) -> Self {
        self.normal = -self.normal;
        self.kind = match self.kind {
            ManifoldKind::Circles => ManifoldKind::Circles,
            ManifoldKind::FaceA => ManifoldKind::FaceB,
            ManifoldKind::FaceB => ManifoldKind::FaceA,
        };
        for p in self.points_mut() {
            p.id = p.id.flipped();
        }
        self
    }
}

/// How a manifold point changed from one step to the next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointState {
    /// No point in this slot.
    Null,
    /// The point is new this step.
    Add,
    /// The point existed last step too.
    Persist,
    /// The point existed last step but not anymore.
    Remove,
}

/// Classify points of an old and a new manifold by their ids.
///
/// Returns the states of the old manifold's points (`Persist` or `Remove`)
/// and the new manifold's points (`Persist` or `Add`), padded with `Null`.
pub fn get_point_states(old: &Manifold, new: &Manifold) -> ([PointState; 2], [PointState; 2]) {
    let mut old_states = [PointState::Null; 2];
    let mut new_states = [PointState::Null; 2];

    for (state, point) in old_states.iter_mut().zip(old.points()) {
        *state = if new.points().any(|p| p.id.key() == point.id.key()) {
            PointState::Persist
        } else {
            PointState::Remove
        };
    }
    for (state, point) in new_states.iter_mut().zip(new.points()) {
        *state = if old.points().any(|p| p.id.key() == point.id.key()) {
            PointState::Persist
        } else {
            PointState::Add
        };
    }

    (old_states, new_states)
}
