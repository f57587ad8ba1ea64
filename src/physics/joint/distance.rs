use super::{world_anchors, JointTuning};
use crate::{
    math as m,
    physics::solver::{ConstraintRow, Jacobian, SolverBody, SolverStep},
};

/// Some distance joints only work in one direction,
/// to e.g. set a maximum distance while allowing shorter distances.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum DistanceLimit {
    /// Always keep the exact distance.
    Exact,
    /// Only pull the anchors together when they're too far apart, like a rope.
    Max,
    /// Only push the anchors apart when they're too close.
    Min,
}

/// Keeps two anchor points at a distance from each other.
#[derive(Clone, Debug)]
pub struct DistanceJoint {
    pub local_anchors: [m::Vec2; 2],
    pub length: f64,
    pub limit: DistanceLimit,
    row: ConstraintRow,
    active: bool,
}

impl DistanceJoint {
    pub(crate) fn new(local_anchors: [m::Vec2; 2], length: f64, limit: DistanceLimit) -> Self {
        Self {
            local_anchors,
            length: length.max(0.0),
            limit,
            row: ConstraintRow::default(),
            active: false,
        }
    }

    fn stretch(&self, bodies: &[SolverBody], pair: [usize; 2]) -> f64 {
        let (p, _) = world_anchors(&self.local_anchors, bodies, pair);
        (p[1] - p[0]).mag() - self.length
    }

    pub(crate) fn error(&self, bodies: &[SolverBody], pair: [usize; 2]) -> f64 {
        let c = self.stretch(bodies, pair);
        match self.limit {
            DistanceLimit::Exact => c.abs(),
            DistanceLimit::Max => c.max(0.0),
            DistanceLimit::Min => (-c).max(0.0),
        }
    }

    pub(crate) fn pre_step(
        &mut self,
        tuning: &JointTuning,
        step: &SolverStep,
        bodies: &mut [SolverBody],
        pair: [usize; 2],
    ) {
        let (p, r) = world_anchors(&self.local_anchors, bodies, pair);
        let d = p[1] - p[0];
        let dir = m::normalize_or_zero(d);
        let c = d.mag() - self.length;

        let (active, bounds) = match self.limit {
            DistanceLimit::Exact => (true, (f64::NEG_INFINITY, f64::INFINITY)),
            // negative impulses pull the anchors together
            DistanceLimit::Max => (c > 0.0, (f64::NEG_INFINITY, 0.0)),
            DistanceLimit::Min => (c < 0.0, (0.0, f64::INFINITY)),
        };
        // coincident anchors have no direction to push along
        self.active = active && dir != m::Vec2::zero();
        if !self.active {
            self.row.impulse = 0.0;
            return;
        }

        self.row.bounds = bounds;
        self.row.prepare(
            Jacobian::linear(dir, r[0], r[1]),
            bodies,
            pair,
            tuning.softness,
            tuning.bias(step.inv_dt, c),
        );
        self.row.warm_start(bodies, pair, step.warm_starting);
    }

    pub(crate) fn solve(&mut self, bodies: &mut [SolverBody], pair: [usize; 2]) {
        if self.active {
            self.row.solve(bodies, pair);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::joint::{
        tests::{body_at, simulate},
        JointBuilder,
    };
    use crate::physics::BodyKey;

    fn owner() -> BodyKey {
        let mut arena = thunderdome::Arena::new();
        BodyKey(arena.insert(()))
    }

    #[test]
    fn pendulum_keeps_its_length() {
        let mut joint = JointBuilder::new(owner()).build_distance(2.0, DistanceLimit::Exact);
        let mut bodies = [body_at(m::Vec2::new(2.0, 0.0), 0.0), SolverBody::ground()];
        bodies[0].velocity.linear = m::Vec2::new(0.0, -3.0);
        simulate(&mut joint, &mut bodies, 120);
        let dist = bodies[0].position.mag();
        assert!((dist - 2.0).abs() < 0.05, "distance drifted to {}", dist);
    }

    #[test]
    fn rope_only_pulls() {
        let mut joint = JointBuilder::new(owner()).build_distance(2.0, DistanceLimit::Max);
        let mut bodies = [body_at(m::Vec2::new(1.0, 0.0), 0.0), SolverBody::ground()];
        bodies[0].velocity.linear = m::Vec2::new(-1.0, 0.0);
        simulate(&mut joint, &mut bodies, 30);
        // slack rope does nothing
        assert_eq!(bodies[0].velocity.linear, m::Vec2::new(-1.0, 0.0));

        let mut bodies = [body_at(m::Vec2::new(1.9, 0.0), 0.0), SolverBody::ground()];
        bodies[0].velocity.linear = m::Vec2::new(3.0, 0.0);
        simulate(&mut joint, &mut bodies, 60);
        assert!(bodies[0].position.mag() < 2.0 + 0.05);
    }
}
