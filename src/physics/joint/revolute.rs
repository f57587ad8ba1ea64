use super::{world_anchors, JointTuning, PointConstraint};
use crate::{
    math as m,
    physics::solver::{SolverBody, SolverStep},
};

/// Pins two bodies together at an anchor point, letting them rotate freely around it.
#[derive(Clone, Debug)]
pub struct RevoluteJoint {
    pub local_anchors: [m::Vec2; 2],
    point: PointConstraint,
}

impl RevoluteJoint {
    pub(crate) fn new(local_anchors: [m::Vec2; 2]) -> Self {
        Self {
            local_anchors,
            point: PointConstraint::default(),
        }
    }

    /// The impulse applied to the second body during the last step.
    pub fn impulse(&self) -> m::Vec2 {
        self.point.impulse
    }

    pub(crate) fn error(&self, bodies: &[SolverBody], pair: [usize; 2]) -> f64 {
        let (p, _) = world_anchors(&self.local_anchors, bodies, pair);
        (p[1] - p[0]).mag()
    }

    pub(crate) fn pre_step(
        &mut self,
        tuning: &JointTuning,
        step: &SolverStep,
        bodies: &mut [SolverBody],
        pair: [usize; 2],
    ) {
        self.point
            .prepare(&self.local_anchors, tuning, step, bodies, pair, true);
        self.point.warm_start(bodies, pair, step.warm_starting);
    }

    pub(crate) fn solve(&mut self, bodies: &mut [SolverBody], pair: [usize; 2]) {
        self.point.solve(bodies, pair);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{
        joint::{
            tests::{body_at, simulate},
            JointBuilder,
        },
        BodyKey,
    };

    #[test]
    fn anchors_stay_together_while_spinning() {
        let mut arena = thunderdome::Arena::new();
        let (a, b) = (BodyKey(arena.insert(())), BodyKey(arena.insert(())));
        let mut joint = JointBuilder::new(a)
            .with_target(b)
            .with_anchor(m::Vec2::new(0.5, 0.0))
            .with_target_anchor(m::Vec2::new(-0.5, 0.0))
            .build_revolute();
        let mut bodies = [
            body_at(m::Vec2::new(0.0, 0.0), 0.0),
            body_at(m::Vec2::new(1.0, 0.0), 0.0),
        ];
        bodies[0].velocity.angular = 2.0;
        bodies[1].velocity.linear = m::Vec2::new(0.0, -1.0);
        simulate(&mut joint, &mut bodies, 120);

        let pair = [0, 1];
        assert!(joint.error(&bodies, pair) < 0.05);
        // momentum is conserved by internal impulses
        let momentum = bodies[0].velocity.linear + bodies[1].velocity.linear;
        assert!((momentum - m::Vec2::new(0.0, -1.0)).mag() < 1e-9);
        match &joint.kind {
            crate::physics::joint::JointKind::Revolute(r) => assert!(r.impulse().mag() > 0.0),
            _ => unreachable!(),
        }
    }
}
