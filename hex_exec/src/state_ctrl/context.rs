//! Orchestration context shared by the components of the state controller

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::info;
use serde::Serialize;

// Internal
use super::{
    GaitDesignation, GaitSwitch, InitError, LegSlots, LegTransition, ParamAdjust, Params,
    SystemStateMachine,
};
use crate::{
    collab::{Collaborators, VelocityCommand, WalkState},
    model::Model,
};
use util::logger::LogThrottle;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Everything the state controller knows, passed explicitly to each of its components.
///
/// The parameters, leg model and velocity inputs are owned here and nowhere else.
pub struct Context {
    pub(crate) params: Params,
    pub(crate) model: Model,
    pub(crate) collab: Collaborators,

    pub(crate) system: SystemStateMachine,

    pub(crate) slots: LegSlots,

    /// Leg currently moving between walking and manual control.
    pub(crate) leg_transition: Option<LegTransition>,

    /// Number of legs which have completed a move into manual control.
    pub(crate) manual_leg_count: usize,

    pub(crate) gait: GaitSwitch,
    pub(crate) param_adjust: ParamAdjust,

    pub(crate) velocity: Velocities,
    pub(crate) modes: OperatorModes,

    /// Number of legs whose IK target was out of reach in the last cycle.
    pub(crate) ik_failures: usize,

    stop_throttle: LogThrottle,
}

/// Velocity commands of the current cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Velocities {
    /// Latest operator input.
    pub live: VelocityCommand,

    /// Input latched when cruise control was engaged.
    pub cruise: VelocityCommand,

    /// Command handed to the walker this cycle.
    pub effective: VelocityCommand,
}

/// Operator modes which don't drive a sequence of their own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OperatorModes {
    pub cruise_control: bool,

    /// Advisory only, navigation itself is done elsewhere.
    pub auto_navigation: bool,

    /// Advisory only, posing input is filtered by the remote.
    pub posing_mode: PosingMode,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PosingMode {
    NoPosing,
    XYPosing,
    PitchRollPosing,
    ZYawPosing,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Context {
    /// Build the context, pushing the initial gait and tuning into the collaborators.
    pub fn new(params: Params, mut collab: Collaborators) -> Result<Self, InitError> {
        params.validate()?;

        let model = Model::new(&params.legs)?;

        let initial_gait = GaitDesignation::from_key(&params.gait_type)
            .ok_or_else(|| InitError::UnknownGait(params.gait_type.clone()))?;
        let gait_params = params
            .gaits
            .get(&params.gait_type)
            .ok_or_else(|| InitError::UnknownGait(params.gait_type.clone()))?;

        let param_adjust = ParamAdjust::new(&params.adjustable);
        let tuning = param_adjust.params().tuning();

        collab.walker.set_gait_params(gait_params);
        collab.walker.apply_tuning(&tuning);
        collab.walker.set_accel_limits(params.initial_accel_limits());
        collab.impedance.init(&tuning);

        info!("Initial gait: {}", params.gait_type);

        Ok(Self {
            params,
            model,
            collab,
            system: SystemStateMachine::new(),
            slots: LegSlots::default(),
            leg_transition: None,
            manual_leg_count: 0,
            gait: GaitSwitch::new(initial_gait),
            param_adjust,
            velocity: Velocities::default(),
            modes: OperatorModes::default(),
            ik_failures: 0,
            stop_throttle: LogThrottle::default(),
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn collab(&self) -> &Collaborators {
        &self.collab
    }

    pub fn system(&self) -> &SystemStateMachine {
        &self.system
    }

    pub fn slots(&self) -> &LegSlots {
        &self.slots
    }

    pub fn leg_transition(&self) -> Option<&LegTransition> {
        self.leg_transition.as_ref()
    }

    pub fn manual_leg_count(&self) -> usize {
        self.manual_leg_count
    }

    pub fn gait(&self) -> &GaitSwitch {
        &self.gait
    }

    pub fn param_adjust(&self) -> &ParamAdjust {
        &self.param_adjust
    }

    pub fn velocity(&self) -> &Velocities {
        &self.velocity
    }

    pub fn modes(&self) -> &OperatorModes {
        &self.modes
    }

    /// True if a gait change, parameter adjustment or leg toggle is waiting to run or running.
    pub fn stop_and_modify_pending(&self) -> bool {
        self.gait.pending()
            || self.param_adjust.pending().is_some()
            || self.slots.any_toggle_pending()
    }

    /// Check the walker has stopped before modifying the hexapod.
    ///
    /// If it hasn't, the velocity is forced to zero (the operator must send a new command to walk
    /// again afterwards) and false is returned, the caller retries next cycle.
    pub(crate) fn require_stationary(&mut self, action: &str) -> bool {
        if self.collab.walker.walk_state() == WalkState::Stopped {
            self.stop_throttle.reset();
            return true;
        }

        if self.stop_throttle.ready() {
            info!("Stopping hexapod to {}...", action);
        }
        self.velocity.live = VelocityCommand::zero();
        self.velocity.effective = VelocityCommand::zero();
        false
    }
}

impl Default for OperatorModes {
    fn default() -> Self {
        Self {
            cruise_control: false,
            auto_navigation: false,
            posing_mode: PosingMode::NoPosing,
        }
    }
}

impl PosingMode {
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            0 => Some(Self::NoPosing),
            1 => Some(Self::XYPosing),
            2 => Some(Self::PitchRollPosing),
            3 => Some(Self::ZYawPosing),
            _ => None,
        }
    }

    /// What the body responds to in this mode.
    pub fn description(self) -> &'static str {
        match self {
            Self::NoPosing => {
                "Body will not respond to manual posing input (except for reset commands)"
            }
            Self::XYPosing => "Body will only respond to x/y translational manual posing input",
            Self::PitchRollPosing => {
                "Body will only respond to pitch/roll rotational manual posing input"
            }
            Self::ZYawPosing => {
                "Body will only respond to z translational and yaw rotational manual posing input"
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
