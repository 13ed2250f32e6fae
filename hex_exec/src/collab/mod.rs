//! # Collaborators
//!
//! The state controller sequences four subsystems which it does not implement itself:
//!
//! - [`Walker`] - gait generation, produces walking tip positions from a body velocity.
//! - [`Poser`] - body pose compensation and the pack/unpack/startup/shutdown sequences.
//! - [`Impedance`] - compliance, produces a vertical tip offset per leg from the measured force.
//! - [`Kinematics`] - inverse kinematics from tip positions to joint demands.
//!
//! Multi-tick operations report their progress as a fraction in `[0, 1]` or as a boolean and are
//! polled once per cycle, they must never block.
//!
//! [`sim`] provides simple stand-ins used by the executable and the tests.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod sim;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{UnitQuaternion, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::model::{Leg, LegId, Model};

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Gait generation.
pub trait Walker {
    /// Current state of the walking cycle.
    fn walk_state(&self) -> WalkState;

    /// Height of the body above the ground in the current stance.
    ///
    /// Units: meters
    fn body_height(&self) -> f64;

    /// Replace the gait timing.
    fn set_gait_params(&mut self, gait: &GaitParams);

    /// Push the current values of the adjustable parameters.
    fn apply_tuning(&mut self, tuning: &Tuning);

    /// Set the acceleration limits, `None` meaning unconstrained.
    fn set_accel_limits(&mut self, limits: AccelLimits);

    /// Body velocity after acceleration limiting.
    fn body_velocity(&self) -> VelocityCommand;

    /// Advance the gait by one cycle and write the walker tip position of every walking leg.
    fn update_walk(&mut self, cmd: &VelocityCommand, model: &mut Model);

    /// Move the tips of manually controlled legs by the given tip velocities.
    fn update_manual(&mut self, inputs: &[ManualTipInput], model: &mut Model);
}

/// Body pose compensation and posing sequences.
pub trait Poser {
    /// Recompute the compensation pose for the given body height.
    fn update_current_pose(&mut self, body_height_m: f64, model: &Model);

    /// Move straight from the ground to the walking stance. Returns the completed fraction.
    fn direct_startup(&mut self, model: &mut Model) -> f64;

    /// Move the joints to their unpacked positions over `duration_s`. Returns true on completion.
    fn unpack_legs(&mut self, duration_s: f64, model: &mut Model) -> bool;

    /// Move the joints to their packed positions over `duration_s`. Returns true on completion.
    fn pack_legs(&mut self, duration_s: f64, model: &mut Model) -> bool;

    /// Stand up from the unpacked pose into the walking stance. Returns true on completion.
    fn start_up_sequence(&mut self, model: &mut Model) -> bool;

    /// Sit down from the walking stance into the unpacked pose. Returns true on completion.
    fn shut_down_sequence(&mut self, model: &mut Model) -> bool;

    /// Step the tips to the stance implied by the latest tuning. Returns the completed fraction.
    fn step_to_new_stance(&mut self, model: &mut Model) -> f64;

    /// Recompute the default body pose for the current loading pattern of the legs.
    fn calculate_default_pose(&mut self, model: &Model);

    /// Pose the body so that a leg can be lifted or lowered. Returns the completed fraction.
    fn pose_for_leg_manipulation(&mut self, model: &mut Model) -> f64;

    fn pose_reset_mode(&self) -> PoseResetMode;

    fn set_pose_reset_mode(&mut self, mode: PoseResetMode);

    /// Operator pose input, translation X/Y/Z and rotation roll/pitch/yaw, each in `[-1, 1]`.
    fn set_manual_pose_input(&mut self, translation: Vector3<f64>, rotation: Vector3<f64>);

    fn set_imu_data(&mut self, imu: ImuData);

    fn imu_data(&self) -> Option<&ImuData>;

    /// Apply the compensation pose to every walker tip position, writing the poser tip positions.
    fn update_stance(&mut self, model: &mut Model);

    fn current_pose(&self) -> Pose;

    fn rotation_error(&self) -> PoseError;

    fn translation_error(&self) -> PoseError;
}

/// Compliance control.
pub trait Impedance {
    /// (Re)initialise from the adjustable parameters.
    fn init(&mut self, tuning: &Tuning);

    /// Update the virtual stiffness of every leg from the walking cycle.
    fn update_walking_stiffness(&mut self, model: &mut Model);

    /// Update the stiffness around a leg being lifted or lowered, `progress` in `[0, 1]`.
    fn update_leg_stiffness(&mut self, leg: LegId, progress: f64, model: &mut Model);

    /// Update the vertical offset of a leg from its measured force (or joint efforts).
    fn update_impedance(&mut self, leg: LegId, use_joint_effort: bool, model: &mut Model);
}

/// Inverse kinematics.
pub trait Kinematics {
    /// Set the joint demands of the leg to reach its desired tip position.
    ///
    /// Returns false if the target had to be clamped to the leg's workspace or joint limits.
    fn apply_ik(&mut self, leg: &mut Leg, debug: bool) -> bool;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The collaborators driven by the state controller.
pub struct Collaborators {
    pub walker: Box<dyn Walker>,
    pub poser: Box<dyn Poser>,
    pub impedance: Box<dyn Impedance>,
    pub kinematics: Box<dyn Kinematics>,
}

/// A body velocity command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityCommand {
    /// Units: meters/second
    pub linear: Vector2<f64>,

    /// Units: radians/second
    pub angular: f64,
}

/// Tip velocity input for a manually controlled leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManualTipInput {
    pub leg: LegId,

    /// Units: meters/second
    pub tip_velocity_ms: Vector3<f64>,
}

/// Timing of a gait, in phase counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaitParams {
    pub stance_phase: u32,
    pub swing_phase: u32,
    pub phase_offset: u32,

    /// Per leg multiplier of `phase_offset`, in leg id order.
    pub offset_multiplier: [u32; crate::model::NUM_LEGS],
}

/// Current values of the adjustable parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tuning {
    pub step_frequency: f64,
    pub step_clearance: f64,
    pub body_clearance: f64,
    pub leg_span_scale: f64,
    pub virtual_mass: f64,
    pub virtual_stiffness: f64,
    pub virtual_damping: f64,
    pub force_gain: f64,
}

/// Acceleration limits, `None` is unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelLimits {
    /// Units: meters/second^2
    pub linear: Option<f64>,

    /// Units: radians/second^2
    pub angular: Option<f64>,
}

/// IMU sample in the body frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuData {
    pub orientation: UnitQuaternion<f64>,

    /// Units: meters/second^2
    pub linear_acceleration: Vector3<f64>,

    /// Units: radians/second
    pub angular_velocity: Vector3<f64>,
}

/// Pose of the body relative to its default stance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Units: meters
    pub position: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

/// Tracking error of one axis group of the pose controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PoseError {
    pub absement: Vector3<f64>,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalkState {
    Starting,
    Moving,
    Stopping,
    Stopped,
}

/// Which parts of the body pose are reset to the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoseResetMode {
    NoReset,
    ZAndYawReset,
    XAndYReset,
    PitchAndRollReset,
    AllReset,

    /// Reset everything at once. Used while a leg is moving between walking and manual control,
    /// during which operator reset requests are ignored.
    ImmediateAllReset,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl VelocityCommand {
    pub fn new(linear: Vector2<f64>, angular: f64) -> Self {
        Self { linear, angular }
    }

    pub fn zero() -> Self {
        Self::new(Vector2::zeros(), 0.0)
    }

    pub fn is_zero(&self) -> bool {
        self.linear == Vector2::zeros() && self.angular == 0.0
    }
}

impl Default for VelocityCommand {
    fn default() -> Self {
        Self::zero()
    }
}

impl PoseResetMode {
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            0 => Some(Self::NoReset),
            1 => Some(Self::ZAndYawReset),
            2 => Some(Self::XAndYReset),
            3 => Some(Self::PitchAndRollReset),
            4 => Some(Self::AllReset),
            5 => Some(Self::ImmediateAllReset),
            _ => None,
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }
}
