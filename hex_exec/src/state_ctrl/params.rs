//! Parameters structure for the state controller

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Internal
use super::{GaitDesignation, InitError};
use crate::{
    collab::{
        sim::{self, ImpedanceParams, PoseControllerParams, SimParams},
        AccelLimits, Collaborators, GaitParams, Tuning,
    },
    model::LegParams,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for the state controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Params {
    // ---- CONTROL ----
    /// Period of the control cycle.
    ///
    /// Units: seconds
    pub time_delta_s: f64,

    /// Use the pack/unpack and start up/shut down sequences. When false the hexapod goes straight
    /// from off to running, and must be off the ground to do so.
    pub start_up_sequence: bool,

    /// Only leave the waiting for user state once the operator has changed the requested state
    /// after the first request.
    pub wait_for_user_start: bool,

    pub impedance_control: bool,

    /// Vary the stiffness of the legs around a leg being lifted or lowered.
    pub dynamic_stiffness: bool,

    /// Drive the impedance controller from the joint efforts rather than the tip force sensors.
    pub use_joint_effort: bool,

    /// Log inverse kinematics failures.
    pub debug_ik: bool,

    /// Mounting rotation of the IMU, roll, pitch, yaw.
    ///
    /// Units: radians
    pub imu_rotation_offset_rpy_rad: [f64; 3],

    // ---- VELOCITY ----
    /// Use the configured cruise velocity rather than the velocity at the time cruise is engaged.
    pub force_cruise_velocity: bool,

    /// Units: meters/second
    pub linear_cruise_velocity_ms: [f64; 2],

    /// Units: radians/second
    pub angular_cruise_velocity_rads: f64,

    /// Initial linear acceleration limit, unconstrained if not given.
    ///
    /// Units: meters/second^2
    pub max_linear_acceleration_mss: Option<f64>,

    /// Initial angular acceleration limit, unconstrained if not given.
    ///
    /// Units: radians/second^2
    pub max_angular_acceleration_radss: Option<f64>,

    // ---- GAIT ----
    /// Name of the initial gait, a key of `gaits`.
    pub gait_type: String,

    /// Gait timing keyed by gait name (`tripod_gait`, `ripple_gait`, `wave_gait`, `amble_gait`).
    pub gaits: HashMap<String, GaitParams>,

    // ---- TUNING ----
    pub adjustable: AdjustableParamDefs,

    // ---- GEOMETRY ----
    /// Per leg parameters in leg id order.
    pub legs: Vec<LegParams>,

    // ---- COLLABORATORS ----
    pub pose_controller: PoseControllerParams,
    pub impedance: ImpedanceParams,
    pub sim: SimParams,
}

/// Definition of a runtime adjustable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustableParamDef {
    pub default: f64,
    pub min: f64,
    pub max: f64,

    /// Magnitude of one adjustment.
    pub step: f64,
}

/// Definitions of every runtime adjustable parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustableParamDefs {
    pub step_frequency: AdjustableParamDef,
    pub step_clearance: AdjustableParamDef,
    pub body_clearance: AdjustableParamDef,
    pub leg_span_scale: AdjustableParamDef,
    pub virtual_mass: AdjustableParamDef,
    pub virtual_stiffness: AdjustableParamDef,
    pub virtual_damping: AdjustableParamDef,
    pub force_gain: AdjustableParamDef,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Params {
    /// Check the parameters for values the controller cannot run with.
    pub fn validate(&self) -> Result<(), InitError> {
        if !(self.time_delta_s > 0.0) {
            return Err(InitError::InvalidParams(format!(
                "time_delta_s must be positive, found {}",
                self.time_delta_s
            )));
        }

        for (name, def) in self.adjustable.named().iter() {
            if !(def.min <= def.default && def.default <= def.max) {
                return Err(InitError::InvalidParams(format!(
                    "default of adjustable parameter {} ({}) is outside [{}, {}]",
                    name, def.default, def.min, def.max
                )));
            }
        }

        if self.adjustable.step_frequency.min <= 0.0 {
            return Err(InitError::InvalidParams(String::from(
                "step_frequency must stay positive",
            )));
        }

        if GaitDesignation::from_key(&self.gait_type).is_none()
            || !self.gaits.contains_key(&self.gait_type)
        {
            return Err(InitError::UnknownGait(self.gait_type.clone()));
        }

        Ok(())
    }

    /// Values of the adjustable parameters at start up.
    pub fn initial_tuning(&self) -> Tuning {
        let a = &self.adjustable;
        Tuning {
            step_frequency: a.step_frequency.default,
            step_clearance: a.step_clearance.default,
            body_clearance: a.body_clearance.default,
            leg_span_scale: a.leg_span_scale.default,
            virtual_mass: a.virtual_mass.default,
            virtual_stiffness: a.virtual_stiffness.default,
            virtual_damping: a.virtual_damping.default,
            force_gain: a.force_gain.default,
        }
    }

    /// Acceleration limits at start up.
    pub fn initial_accel_limits(&self) -> AccelLimits {
        AccelLimits {
            linear: self.max_linear_acceleration_mss,
            angular: self.max_angular_acceleration_radss,
        }
    }

    /// Build the simulated collaborators described by these parameters.
    pub fn sim_collaborators(&self) -> Collaborators {
        sim::collaborators(
            self.time_delta_s,
            &self.sim,
            &self.pose_controller,
            &self.impedance,
            &self.initial_tuning(),
        )
    }
}

impl AdjustableParamDefs {
    /// Each definition with its display name.
    pub(crate) fn named(&self) -> [(&'static str, &AdjustableParamDef); 8] {
        [
            ("step_frequency", &self.step_frequency),
            ("step_clearance", &self.step_clearance),
            ("body_clearance", &self.body_clearance),
            ("leg_span_scale", &self.leg_span_scale),
            ("virtual_mass", &self.virtual_mass),
            ("virtual_stiffness", &self.virtual_stiffness),
            ("virtual_damping", &self.virtual_damping),
            ("force_gain", &self.force_gain),
        ]
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::model::test::leg_params;

    fn def(default: f64, min: f64, max: f64, step: f64) -> AdjustableParamDef {
        AdjustableParamDef {
            default,
            min,
            max,
            step,
        }
    }

    /// Parameters with a cycle period and sequence durations that are exact in binary, so that
    /// sequences complete after a known number of cycles:
    ///
    /// - pack/unpack: 2 / step frequency = 1 s = 8 cycles
    /// - start up, shut down, direct startup: 4 cycles
    /// - new stance, leg manipulation: 2 cycles
    /// - walker stop: 2 cycles
    pub(crate) fn test_params() -> Params {
        let mut gaits = HashMap::new();
        gaits.insert(
            String::from("tripod_gait"),
            GaitParams {
                stance_phase: 2,
                swing_phase: 2,
                phase_offset: 2,
                offset_multiplier: [0, 1, 0, 1, 0, 1],
            },
        );
        gaits.insert(
            String::from("wave_gait"),
            GaitParams {
                stance_phase: 10,
                swing_phase: 2,
                phase_offset: 2,
                offset_multiplier: [2, 3, 4, 1, 0, 5],
            },
        );

        Params {
            time_delta_s: 0.125,
            start_up_sequence: true,
            wait_for_user_start: false,
            impedance_control: true,
            dynamic_stiffness: true,
            use_joint_effort: false,
            debug_ik: false,
            imu_rotation_offset_rpy_rad: [0.0, 0.0, 0.0],
            force_cruise_velocity: false,
            linear_cruise_velocity_ms: [0.1, 0.0],
            angular_cruise_velocity_rads: 0.0,
            max_linear_acceleration_mss: None,
            max_angular_acceleration_radss: None,
            gait_type: String::from("tripod_gait"),
            gaits,
            adjustable: AdjustableParamDefs {
                step_frequency: def(2.0, 0.5, 3.0, 0.5),
                step_clearance: def(0.05, 0.0, 0.1, 0.0125),
                body_clearance: def(0.1, 0.05, 0.15, 0.0125),
                leg_span_scale: def(1.0, 0.5, 1.5, 0.125),
                virtual_mass: def(10.0, 5.0, 20.0, 1.0),
                virtual_stiffness: def(10.0, 5.0, 20.0, 1.0),
                virtual_damping: def(0.75, 0.25, 1.0, 0.25),
                force_gain: def(0.001, 0.0, 0.01, 0.001),
            },
            legs: leg_params(),
            pose_controller: PoseControllerParams {
                imu_posing: false,
                manual_posing: true,
                rotation_pid_gains: [1.0, 0.0, 0.0],
                max_translation_m: [0.05, 0.05, 0.05],
                max_rotation_rad: [0.2, 0.2, 0.2],
            },
            impedance: ImpedanceParams {
                integrator_step_time_s: 0.125,
                load_stiffness_scaler: 5.0,
                swing_stiffness_scaler: 0.1,
            },
            sim: SimParams {
                link_lengths_m: [0.05, 0.1, 0.12],
                walker_stop_ticks: 2,
                start_up_duration_s: 0.5,
                shut_down_duration_s: 0.5,
                direct_startup_duration_s: 0.5,
                new_stance_duration_s: 0.25,
                leg_manipulation_duration_s: 0.25,
            },
        }
    }

    #[test]
    fn test_validate() {
        assert!(test_params().validate().is_ok());

        let mut p = test_params();
        p.time_delta_s = 0.0;
        assert!(matches!(p.validate(), Err(InitError::InvalidParams(_))));

        let mut p = test_params();
        p.adjustable.force_gain.default = 1.0;
        assert!(matches!(p.validate(), Err(InitError::InvalidParams(_))));

        let mut p = test_params();
        p.gait_type = String::from("ripple_gait");
        assert!(matches!(p.validate(), Err(InitError::UnknownGait(_))));

        let mut p = test_params();
        p.gait_type = String::from("moonwalk");
        assert!(matches!(p.validate(), Err(InitError::UnknownGait(_))));
    }

    #[test]
    fn test_initial_tuning() {
        let t = test_params().initial_tuning();
        assert_eq!(t.step_frequency, 2.0);
        assert_eq!(t.virtual_damping, 0.75);
    }

    #[test]
    fn test_shipped_params_parse() {
        let p: Params =
            util::params::from_toml_str(include_str!("../../../params/state_ctrl.toml")).unwrap();

        p.validate().unwrap();
        assert_eq!(p.legs.len(), crate::model::NUM_LEGS);
        assert_eq!(p.gaits.len(), 4);
        assert!(p.max_linear_acceleration_mss.is_some());
        assert!(p.max_angular_acceleration_radss.is_none());
    }
}
