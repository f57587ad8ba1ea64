use super::{limit_violation, JointTuning, LimitConstraint};
use crate::physics::solver::{Jacobian, SolverBody, SolverStep};

/// Keeps the angle of the owning body relative to the target within bounds.
#[derive(Clone, Debug)]
pub struct AngleLimitJoint {
    pub lower: f64,
    pub upper: f64,
    /// Relative angle considered zero.
    pub reference_angle: f64,
    limit: LimitConstraint,
}

impl AngleLimitJoint {
    pub(crate) fn new(lower: f64, upper: f64) -> Self {
        Self {
            lower: lower.min(upper),
            upper: lower.max(upper),
            reference_angle: 0.0,
            limit: LimitConstraint::default(),
        }
    }

    /// Angle of the owner relative to the target.
    fn angle(&self, bodies: &[SolverBody], pair: [usize; 2]) -> f64 {
        bodies[pair[0]].angle - bodies[pair[1]].angle - self.reference_angle
    }

    /// The angular impulse applied to the owning body during the last step.
    pub fn impulse(&self) -> f64 {
        self.limit.impulse()
    }

    pub(crate) fn error(&self, bodies: &[SolverBody], pair: [usize; 2]) -> f64 {
        limit_violation(self.angle(bodies, pair), (self.lower, self.upper))
    }

    pub(crate) fn pre_step(
        &mut self,
        tuning: &JointTuning,
        step: &SolverStep,
        bodies: &mut [SolverBody],
        pair: [usize; 2],
    ) {
        self.limit.prepare(
            Jacobian::angular(1.0, -1.0),
            self.angle(bodies, pair),
            (self.lower, self.upper),
            tuning,
            step,
            bodies,
            pair,
        );
        self.limit.warm_start(bodies, pair, step.warm_starting);
    }

    pub(crate) fn solve(&mut self, bodies: &mut [SolverBody], pair: [usize; 2]) {
        self.limit.solve(bodies, pair);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        math as m,
        physics::{
            joint::{
                tests::{body_at, simulate},
                JointBuilder, JointKind,
            },
            BodyKey,
        },
    };

    #[test]
    fn torque_cannot_push_past_the_limits() {
        let mut arena = thunderdome::Arena::new();
        let mut joint = JointBuilder::new(BodyKey(arena.insert(()))).build_angle_limit(0.5, -0.5);
        let slop = joint.tuning.slop;
        let mut bodies = [body_at(m::Vec2::zero(), 0.0), SolverBody::ground()];

        for _ in 0..120 {
            bodies[0].velocity.angular -= 1.0;
            simulate(&mut joint, &mut bodies, 1);
            assert!(bodies[0].angle >= -0.5 - slop, "angle = {}", bodies[0].angle);
        }
        assert!((bodies[0].angle + 0.5).abs() < slop);
        match &joint.kind {
            JointKind::AngleLimit(limit) => assert!(limit.impulse() > 0.0),
            _ => unreachable!(),
        }

        // turning the other way reaches the upper limit
        for _ in 0..120 {
            bodies[0].velocity.angular += 1.0;
            simulate(&mut joint, &mut bodies, 1);
            assert!(bodies[0].angle <= 0.5 + slop, "angle = {}", bodies[0].angle);
        }
        assert!((bodies[0].angle - 0.5).abs() < slop);
    }
}
