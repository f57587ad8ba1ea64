use super::{relative_angle, world_anchors, JointTuning, PointConstraint};
use crate::{
    math as m,
    physics::solver::{ConstraintRow, Jacobian, SolverBody, SolverStep},
};

/// Glues two bodies together at an anchor point and locks their relative rotation.
#[derive(Clone, Debug)]
pub struct WeldJoint {
    pub local_anchors: [m::Vec2; 2],
    /// Angle of the second body relative to the first that the joint maintains.
    /// Taken from the bodies when the joint enters the world if not set.
    pub reference_angle: Option<f64>,
    point: PointConstraint,
    angular: ConstraintRow,
}

impl WeldJoint {
    pub(crate) fn new(local_anchors: [m::Vec2; 2]) -> Self {
        Self {
            local_anchors,
            reference_angle: None,
            point: PointConstraint::default(),
            angular: ConstraintRow::default(),
        }
    }

    pub(crate) fn initialize(&mut self, bodies: &[SolverBody], pair: [usize; 2]) {
        if self.reference_angle.is_none() {
            self.reference_angle = Some(relative_angle(bodies, pair));
        }
    }

    fn angle_error(&self, bodies: &[SolverBody], pair: [usize; 2]) -> f64 {
        relative_angle(bodies, pair) - self.reference_angle.unwrap_or(0.0)
    }

    pub(crate) fn error(&self, bodies: &[SolverBody], pair: [usize; 2]) -> f64 {
        let (p, _) = world_anchors(&self.local_anchors, bodies, pair);
        (p[1] - p[0]).mag().max(self.angle_error(bodies, pair).abs())
    }

    pub(crate) fn pre_step(
        &mut self,
        tuning: &JointTuning,
        step: &SolverStep,
        bodies: &mut [SolverBody],
        pair: [usize; 2],
    ) {
        let angle_error = self.angle_error(bodies, pair);
        self.angular.prepare(
            Jacobian::angular(-1.0, 1.0),
            bodies,
            pair,
            tuning.softness,
            tuning.bias(step.inv_dt, angle_error),
        );
        self.point
            .prepare(&self.local_anchors, tuning, step, bodies, pair, true);

        self.angular.warm_start(bodies, pair, step.warm_starting);
        self.point.warm_start(bodies, pair, step.warm_starting);
    }

    pub(crate) fn solve(&mut self, bodies: &mut [SolverBody], pair: [usize; 2]) {
        self.angular.solve(bodies, pair);
        self.point.solve(bodies, pair);
    }
}
