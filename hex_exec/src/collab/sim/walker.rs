//! Simulated gait generator

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use log::trace;
use nalgebra::Vector3;
use std::f64::consts::PI;
use util::maths::clamp;

use crate::{
    collab::{AccelLimits, GaitParams, ManualTipInput, Tuning, VelocityCommand, WalkState, Walker},
    model::{Leg, LegState, Model, NUM_LEGS},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A walker moving the tips on a flat stride, lifted by the step clearance during swing.
///
/// The walker decelerates for a fixed number of cycles after the velocity command goes to zero
/// before reporting that it has stopped.
#[derive(Debug, Clone)]
pub struct SimWalker {
    time_delta_s: f64,
    stop_ticks: u32,

    state: WalkState,
    gait: Option<GaitParams>,
    tuning: Tuning,
    limits: AccelLimits,

    velocity: VelocityCommand,

    /// Phase of the gait cycle, in `[0, 1)`.
    phase: f64,

    /// Cycles since the last non-zero command.
    ticks_since_zero: u32,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimWalker {
    pub fn new(time_delta_s: f64, stop_ticks: u32, tuning: Tuning) -> Self {
        Self {
            time_delta_s,
            stop_ticks,
            state: WalkState::Stopped,
            gait: None,
            tuning,
            limits: AccelLimits::default(),
            velocity: VelocityCommand::zero(),
            phase: 0.0,
            ticks_since_zero: 0,
        }
    }

    /// Stance tip position of a leg for the current tuning.
    fn stance_tip(&self, leg: &Leg) -> Vector3<f64> {
        let span = leg.default_tip_position_m - leg.mount_position_m;
        Vector3::new(
            leg.mount_position_m.x + span.x * self.tuning.leg_span_scale,
            leg.mount_position_m.y + span.y * self.tuning.leg_span_scale,
            -self.tuning.body_clearance,
        )
    }

    /// Swing fraction of the cycle and the phase offset of each leg.
    fn gait_timing(&self) -> (f64, [f64; NUM_LEGS]) {
        match self.gait {
            Some(ref g) if g.swing_phase + g.stance_phase > 0 => {
                let period = (g.swing_phase + g.stance_phase) as f64;
                let mut offsets = [0f64; NUM_LEGS];
                for (o, m) in offsets.iter_mut().zip(g.offset_multiplier.iter()) {
                    *o = ((g.phase_offset * m) as f64 / period).fract();
                }
                (g.swing_phase as f64 / period, offsets)
            }
            // Tripod until a gait is set
            _ => (0.5, [0.0, 0.5, 0.0, 0.5, 0.0, 0.5]),
        }
    }

    fn limit_rate(current: f64, target: f64, limit: Option<f64>, dt: f64) -> f64 {
        match limit {
            Some(a) => current + clamp(target - current, -a * dt, a * dt),
            None => target,
        }
    }
}

impl Walker for SimWalker {
    fn walk_state(&self) -> WalkState {
        self.state
    }

    fn body_height(&self) -> f64 {
        self.tuning.body_clearance
    }

    fn set_gait_params(&mut self, gait: &GaitParams) {
        self.gait = Some(gait.clone());
        self.phase = 0.0;
    }

    fn apply_tuning(&mut self, tuning: &Tuning) {
        self.tuning = *tuning;
    }

    fn set_accel_limits(&mut self, limits: AccelLimits) {
        self.limits = limits;
    }

    fn body_velocity(&self) -> VelocityCommand {
        self.velocity
    }

    fn update_walk(&mut self, cmd: &VelocityCommand, model: &mut Model) {
        let dt = self.time_delta_s;

        self.velocity.linear.x =
            Self::limit_rate(self.velocity.linear.x, cmd.linear.x, self.limits.linear, dt);
        self.velocity.linear.y =
            Self::limit_rate(self.velocity.linear.y, cmd.linear.y, self.limits.linear, dt);
        self.velocity.angular =
            Self::limit_rate(self.velocity.angular, cmd.angular, self.limits.angular, dt);

        if cmd.is_zero() {
            if self.state != WalkState::Stopped {
                self.ticks_since_zero += 1;
                if self.ticks_since_zero >= self.stop_ticks {
                    self.state = WalkState::Stopped;
                    self.velocity = VelocityCommand::zero();
                    self.phase = 0.0;
                    trace!("Walker stopped");
                } else {
                    self.state = WalkState::Stopping;
                }
            }
        } else {
            self.ticks_since_zero = 0;
            self.state = match self.state {
                WalkState::Stopped => WalkState::Starting,
                _ => WalkState::Moving,
            };
        }

        let step_frequency = self.tuning.step_frequency.max(1e-3);
        let (swing_fraction, offsets) = self.gait_timing();

        if self.state != WalkState::Stopped {
            self.phase = (self.phase + step_frequency * dt).fract();
        }

        for leg in model.legs_mut() {
            // Manual and transitioning legs are held where they are
            if leg.state != LegState::Walking {
                continue;
            }

            let stance = self.stance_tip(leg);

            if self.state == WalkState::Stopped || swing_fraction <= 0.0 {
                leg.walker_tip_position_m = stance;
                leg.walker_tip_velocity_ms = Vector3::zeros();
                leg.swinging = false;
                leg.swing_progress = 0.0;
                leg.stance_progress = 0.0;
                continue;
            }

            // Ground speed of the tip from the body's linear and angular velocity
            let tip_vel = Vector3::new(
                self.velocity.linear.x - self.velocity.angular * stance.y,
                self.velocity.linear.y + self.velocity.angular * stance.x,
                0.0,
            );
            let stride = tip_vel * (1.0 - swing_fraction) / step_frequency;
            let leg_phase = (self.phase + offsets[leg.id.index()]).fract();

            if leg_phase < swing_fraction {
                let p = leg_phase / swing_fraction;
                let mut tip = stance + stride * (p - 0.5);
                tip.z += self.tuning.step_clearance * (PI * p).sin();
                leg.walker_tip_position_m = tip;
                leg.walker_tip_velocity_ms = tip_vel * (1.0 - swing_fraction) / swing_fraction;
                leg.swinging = true;
                leg.swing_progress = p;
                leg.stance_progress = 0.0;
            } else {
                let p = (leg_phase - swing_fraction) / (1.0 - swing_fraction);
                leg.walker_tip_position_m = stance + stride * (0.5 - p);
                leg.walker_tip_velocity_ms = -tip_vel;
                leg.swinging = false;
                leg.swing_progress = 0.0;
                leg.stance_progress = p;
            }
        }
    }

    fn update_manual(&mut self, inputs: &[ManualTipInput], model: &mut Model) {
        for input in inputs {
            let leg = model.leg_mut(input.leg);
            if leg.state == LegState::Manual {
                leg.walker_tip_position_m += input.tip_velocity_ms * self.time_delta_s;
                leg.walker_tip_velocity_ms = input.tip_velocity_ms;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
