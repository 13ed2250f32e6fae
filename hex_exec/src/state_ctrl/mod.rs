//! # State controller
//!
//! The top level behavioural controller of the hexapod. Once per cycle it applies the inputs
//! received since the last cycle, steps the system state machine, and while running sequences the
//! walker, poser, impedance controller and kinematics to produce joint demands.
//!
//! Three "stop and modify" operations can be requested while running: changing the gait,
//! adjusting one of the tunable parameters and moving a leg between walking and manual control.
//! They only execute once the walker has come to a stop, so while one is pending the commanded
//! velocity is held at zero. Only one executes per cycle, in the order gait change, parameter
//! adjustment, leg toggle.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod context;
mod gait_switch;
mod input;
mod leg_toggle;
mod param_adjust;
mod params;
mod state;
mod system_state;
pub mod tm;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use context::*;
pub use gait_switch::*;
pub use input::*;
pub use leg_toggle::*;
pub use param_adjust::*;
pub use params::*;
pub use state::*;
pub use system_state::*;

use crate::model::ModelError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Maximum number of legs which may be manual (or moving into or out of manual) at once.
pub const MAX_MANUAL_LEGS: usize = 2;

/// Tolerance used to decide whether a joint is in its packed position.
///
/// Units: radians
pub const JOINT_PACKED_TOLERANCE_RAD: f64 = 0.01;

/// Raw reading of an unloaded tip force sensor.
pub const TIP_FORCE_OFFSET: f64 = 1255.0;

/// Largest tip force after the offset is removed.
pub const MAX_TIP_FORCE: f64 = 1000.0;

/// Number of input events which can be queued between two cycles before producers block.
pub const INPUT_QUEUE_DEPTH: usize = 256;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors returned by the cyclic processing of the state controller.
#[derive(Debug, thiserror::Error)]
pub enum StateCtrlError {
    #[error("Fatal state controller error: {0}")]
    Fatal(#[from] FatalError),
}

/// Conditions the controller cannot continue from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FatalError {
    #[error("Undefined system state transition from {from:?} to {to:?} was requested")]
    UndefinedTransition { from: SystemState, to: SystemState },

    #[error(
        "Hexapod is packed and cannot run the direct startup sequence, either unpack the hexapod \
         manually or enable start_up_sequence in the parameters"
    )]
    PackedWithoutStartup,
}

/// Errors which can occur while building the state controller.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("Could not load the state controller parameters: {0}")]
    ParamLoadError(#[from] util::params::LoadError),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Could not build the hexapod model: {0}")]
    ModelError(#[from] ModelError),

    #[error("Gait {0} is not in the gait table")]
    UnknownGait(String),
}
