//! Adapting the simulated timestep to frame rate pressure.
//!
//! When frames keep taking much longer than the step they simulate,
//! the effective step is shrunk so the simulation degrades into slow motion
//! instead of taking ever larger, less stable steps. Once frames are back on time
//! the scale grows back to one.

/// Policy for [`PhysicsWorld::step_with_real_dt`][super::PhysicsWorld::step_with_real_dt].
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct TimestepScaling {
    pub enabled: bool,
    /// A frame is late when its real duration exceeds the step by this factor.
    pub pressure_ratio: f64,
    /// Scale multiplier applied after `sustain_frames` late frames in a row.
    pub shrink_factor: f64,
    /// Scale multiplier applied after `sustain_frames` on-time frames in a row.
    pub grow_factor: f64,
    /// The scale never goes below this.
    pub min_scale: f64,
    pub sustain_frames: u32,
}

impl Default for TimestepScaling {
    fn default() -> Self {
        Self {
            enabled: true,
            pressure_ratio: 1.5,
            shrink_factor: 0.9,
            grow_factor: 1.05,
            min_scale: 0.5,
            sustain_frames: 5,
        }
    }
}

impl TimestepScaling {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Running state of the policy.
#[derive(Clone, Copy, Debug)]
pub(crate) struct TimestepState {
    scale: f64,
    late_frames: u32,
    on_time_frames: u32,
}

impl Default for TimestepState {
    fn default() -> Self {
        Self {
            scale: 1.0,
            late_frames: 0,
            on_time_frames: 0,
        }
    }
}

impl TimestepState {
    #[inline]
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Feed one frame's timing to the policy and get the step to simulate.
    pub fn effective_dt(&mut self, policy: &TimestepScaling, dt: f64, real_dt: f64) -> f64 {
        if !policy.enabled || dt <= 0.0 {
            *self = Self::default();
            return dt;
        }

        if real_dt > dt * policy.pressure_ratio {
            self.late_frames += 1;
            self.on_time_frames = 0;
            if self.late_frames >= policy.sustain_frames {
                self.late_frames = 0;
                self.scale = (self.scale * policy.shrink_factor).max(policy.min_scale);
                log::debug!("frame rate pressure, timestep scale down to {}", self.scale);
            }
        } else if real_dt <= dt {
            self.on_time_frames += 1;
            self.late_frames = 0;
            if self.on_time_frames >= policy.sustain_frames && self.scale < 1.0 {
                self.on_time_frames = 0;
                self.scale = (self.scale * policy.grow_factor).min(1.0);
            }
        } else {
            // somewhat late frames keep the current scale
            self.late_frames = 0;
            self.on_time_frames = 0;
        }

        dt * self.scale
    }
}
