use super::{JointTuning, PointConstraint};
use crate::{
    math as m,
    physics::solver::{ConstraintRow, Jacobian, SolverBody, SolverStep},
};

/// Top-down friction: resists relative linear and angular motion
/// with a limited force and torque.
#[derive(Clone, Debug)]
pub struct FrictionJoint {
    pub local_anchors: [m::Vec2; 2],
    pub max_force: f64,
    pub max_torque: f64,
    point: PointConstraint,
    angular: ConstraintRow,
    max_impulse: f64,
}

impl FrictionJoint {
    pub(crate) fn new(local_anchors: [m::Vec2; 2], max_force: f64, max_torque: f64) -> Self {
        Self {
            local_anchors,
            max_force: max_force.abs(),
            max_torque: max_torque.abs(),
            point: PointConstraint::default(),
            angular: ConstraintRow::default(),
            max_impulse: 0.0,
        }
    }

    pub(crate) fn pre_step(
        &mut self,
        tuning: &JointTuning,
        step: &SolverStep,
        bodies: &mut [SolverBody],
        pair: [usize; 2],
    ) {
        // friction has no position to restore
        self.point
            .prepare(&self.local_anchors, tuning, step, bodies, pair, false);
        self.max_impulse = self.max_force.abs() * step.dt;

        let max_angular = self.max_torque.abs() * step.dt;
        self.angular.bounds = (-max_angular, max_angular);
        self.angular
            .prepare(Jacobian::angular(-1.0, 1.0), bodies, pair, 0.0, 0.0);

        self.point.warm_start(bodies, pair, step.warm_starting);
        self.angular.warm_start(bodies, pair, step.warm_starting);
    }

    pub(crate) fn solve(&mut self, bodies: &mut [SolverBody], pair: [usize; 2]) {
        self.angular.solve(bodies, pair);
        self.point.solve_clamped(bodies, pair, self.max_impulse);
    }
}
