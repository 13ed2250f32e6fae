//! Input handling
//!
//! Operator commands and sensor samples arrive from other threads through a bounded channel. At
//! the start of each cycle the controller drains the channel and applies every event in arrival
//! order, so an event never changes the state of the controller part way through a cycle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info, trace, warn};
use nalgebra::{Quaternion, UnitQuaternion, Vector2, Vector3};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use util::maths::clamp;

// Internal
use super::{
    Context, GaitDesignation, ParameterSelection, PosingMode, SlotId, SystemState,
    INPUT_QUEUE_DEPTH, MAX_TIP_FORCE, TIP_FORCE_OFFSET,
};
use crate::{
    collab::{ImuData, PoseResetMode, VelocityCommand},
    model::{LegId, LegState, NUM_LEGS},
};
use comms_if::{
    eqpt::{imu::ImuSample, joint::JointStates, tip_force::TipForces},
    tc::Tc,
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Producer side of the state controller's input queue.
///
/// Cheap to clone, one per producer thread.
#[derive(Debug, Clone)]
pub struct InputSender {
    sender: SyncSender<InputEvent>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Anything the state controller can receive.
#[derive(Debug, Clone)]
pub enum InputEvent {
    Tc(Tc),
    Imu(ImuSample),
    JointStates(JointStates),
    TipForces(TipForces),
}

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("The state controller input queue is full")]
    Full,

    #[error("The state controller has been dropped")]
    Disconnected,
}

/// System states in which an input is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Always,

    /// Anything but `WaitingForUser`.
    Initialised,

    RunningOnly,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl InputSender {
    /// Queue an event, blocking while the queue is full.
    pub fn send<E: Into<InputEvent>>(&self, event: E) -> Result<(), InputError> {
        self.sender
            .send(event.into())
            .map_err(|_| InputError::Disconnected)
    }

    /// Queue an event without blocking.
    pub fn try_send<E: Into<InputEvent>>(&self, event: E) -> Result<(), InputError> {
        self.sender.try_send(event.into()).map_err(|e| match e {
            TrySendError::Full(_) => InputError::Full,
            TrySendError::Disconnected(_) => InputError::Disconnected,
        })
    }
}

impl From<Tc> for InputEvent {
    fn from(tc: Tc) -> Self {
        Self::Tc(tc)
    }
}

impl From<ImuSample> for InputEvent {
    fn from(s: ImuSample) -> Self {
        Self::Imu(s)
    }
}

impl From<JointStates> for InputEvent {
    fn from(s: JointStates) -> Self {
        Self::JointStates(s)
    }
}

impl From<TipForces> for InputEvent {
    fn from(s: TipForces) -> Self {
        Self::TipForces(s)
    }
}

impl Guard {
    pub fn of(event: &InputEvent) -> Self {
        match event {
            InputEvent::Tc(tc) => match tc {
                Tc::BodyVelocity { .. }
                | Tc::PrimaryTipVelocity(_)
                | Tc::SecondaryTipVelocity(_)
                | Tc::SystemState(_) => Guard::Always,
                Tc::BodyPose { .. } | Tc::PoseResetMode(_) => Guard::Initialised,
                Tc::GaitSelection(_)
                | Tc::PosingMode(_)
                | Tc::CruiseControl(_)
                | Tc::AutoNavigation(_)
                | Tc::ParameterSelection(_)
                | Tc::ParameterAdjust(_)
                | Tc::PrimaryLegSelection(_)
                | Tc::SecondaryLegSelection(_)
                | Tc::PrimaryLegState(_)
                | Tc::SecondaryLegState(_) => Guard::RunningOnly,
            },
            InputEvent::Imu(_) | InputEvent::JointStates(_) | InputEvent::TipForces(_) => {
                Guard::Always
            }
        }
    }

    pub fn permits(self, state: SystemState) -> bool {
        match self {
            Guard::Always => true,
            Guard::Initialised => state != SystemState::WaitingForUser,
            Guard::RunningOnly => state == SystemState::Running,
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Create the input queue.
pub(crate) fn channel() -> (InputSender, Receiver<InputEvent>) {
    let (sender, receiver) = mpsc::sync_channel(INPUT_QUEUE_DEPTH);
    (InputSender { sender }, receiver)
}

/// Apply a single input event.
pub(crate) fn dispatch(ctx: &mut Context, event: InputEvent) {
    if !Guard::of(&event).permits(ctx.system.current()) {
        trace!("Ignoring input in {} state: {:?}", ctx.system.current(), event);
        return;
    }

    match event {
        InputEvent::Tc(tc) => dispatch_tc(ctx, tc),
        InputEvent::Imu(sample) => imu(ctx, &sample),
        InputEvent::JointStates(states) => joint_states(ctx, &states),
        InputEvent::TipForces(forces) => tip_forces(ctx, &forces),
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn dispatch_tc(ctx: &mut Context, tc: Tc) {
    match tc {
        Tc::BodyVelocity {
            linear_ms,
            angular_rads,
        } => {
            ctx.velocity.live =
                VelocityCommand::new(Vector2::new(linear_ms[0], linear_ms[1]), angular_rads);
        }
        Tc::PrimaryTipVelocity(v) => {
            ctx.slots.get_mut(SlotId::Primary).tip_velocity_ms = Vector3::from(v)
        }
        Tc::SecondaryTipVelocity(v) => {
            ctx.slots.get_mut(SlotId::Secondary).tip_velocity_ms = Vector3::from(v)
        }
        Tc::BodyPose { linear, angular } => ctx
            .collab
            .poser
            .set_manual_pose_input(Vector3::from(linear), Vector3::from(angular)),
        Tc::SystemState(code) => system_state(ctx, code),
        Tc::GaitSelection(code) => gait_selection(ctx, code),
        Tc::PosingMode(code) => posing_mode(ctx, code),
        Tc::CruiseControl(code) => cruise_control(ctx, code),
        Tc::AutoNavigation(code) => auto_navigation(ctx, code),
        Tc::ParameterSelection(code) => parameter_selection(ctx, code),
        Tc::ParameterAdjust(dir) => parameter_adjust(ctx, dir),
        Tc::PrimaryLegSelection(code) => leg_selection(ctx, SlotId::Primary, code),
        Tc::SecondaryLegSelection(code) => leg_selection(ctx, SlotId::Secondary, code),
        Tc::PrimaryLegState(code) => leg_state(ctx, SlotId::Primary, code),
        Tc::SecondaryLegState(code) => leg_state(ctx, SlotId::Secondary, code),
        Tc::PoseResetMode(code) => pose_reset(ctx, code),
    }
}

fn system_state(ctx: &mut Context, code: i8) {
    match SystemState::from_request_code(code) {
        Some(s) => ctx.system.request(s, ctx.params.start_up_sequence),
        None => warn!("Invalid system state request {}", code),
    }
}

fn gait_selection(ctx: &mut Context, code: i8) {
    match GaitDesignation::from_code(code) {
        Some(g) => {
            if ctx.gait.select(g) {
                debug!("Change to {} requested", g);
            }
        }
        None => warn!("Invalid gait selection {}", code),
    }
}

fn posing_mode(ctx: &mut Context, code: i8) {
    match PosingMode::from_code(code) {
        Some(mode) if mode != ctx.modes.posing_mode => {
            ctx.modes.posing_mode = mode;
            info!("{}", mode.description());
        }
        Some(_) => (),
        None => warn!("Invalid posing mode {}", code),
    }
}

/// Decode an on/off switch.
fn switch(code: i8) -> Option<bool> {
    match code {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    }
}

fn cruise_control(ctx: &mut Context, code: i8) {
    let on = match switch(code) {
        Some(on) => on,
        None => {
            warn!("Invalid cruise control mode {}", code);
            return;
        }
    };
    if on == ctx.modes.cruise_control {
        return;
    }

    ctx.modes.cruise_control = on;

    if on {
        ctx.velocity.cruise = if ctx.params.force_cruise_velocity {
            let l = ctx.params.linear_cruise_velocity_ms;
            VelocityCommand::new(
                Vector2::new(l[0], l[1]),
                ctx.params.angular_cruise_velocity_rads,
            )
        } else {
            ctx.velocity.live
        };
        let c = ctx.velocity.cruise;
        info!(
            "Cruise control ON - input velocity set to constant: linear(x: {}, y: {}), angular(z: {})",
            c.linear.x, c.linear.y, c.angular
        );
    } else {
        info!("Cruise control OFF - input velocity set by user");
    }
}

fn auto_navigation(ctx: &mut Context, code: i8) {
    let on = match switch(code) {
        Some(on) => on,
        None => {
            warn!("Invalid auto navigation mode {}", code);
            return;
        }
    };
    if on == ctx.modes.auto_navigation {
        return;
    }

    ctx.modes.auto_navigation = on;
    if on {
        info!("Auto navigation mode ON - user input velocity overridden");
    } else {
        info!("Auto navigation mode OFF - control returned to user input");
    }
}

fn parameter_selection(ctx: &mut Context, code: i8) {
    let selection = match ParameterSelection::from_code(code) {
        Some(s) => s,
        None => {
            warn!("Invalid parameter selection {}", code);
            return;
        }
    };

    if ctx.param_adjust.select(selection) {
        match selection {
            ParameterSelection::NoSelection => info!("No parameter currently selected"),
            s => info!("{} parameter currently selected", s),
        }
    }
}

fn parameter_adjust(ctx: &mut Context, dir: i8) {
    if !(-1..=1).contains(&dir) {
        warn!("Invalid parameter adjustment {}", dir);
        return;
    }

    if ctx.param_adjust.request(dir) {
        debug!(
            "Adjustment of {} parameter requested",
            ctx.param_adjust.selection()
        );
    }
}

fn leg_selection(ctx: &mut Context, slot_id: SlotId, code: i8) {
    let leg = match LegId::from_selection_code(code) {
        Ok(l) => l,
        Err(()) => {
            warn!("Invalid {} leg selection {}", slot_id, code);
            return;
        }
    };

    let slot = ctx.slots.get(slot_id);
    if leg == slot.leg {
        return;
    }
    if slot.toggle_pending {
        warn!(
            "Cannot change {} leg selection while its toggle is in progress",
            slot_id
        );
        return;
    }
    if leg.is_some() && leg == ctx.slots.get(slot_id.other()).leg {
        warn!(
            "Cannot select the same leg for both primary and secondary control"
        );
        return;
    }

    // The requested state follows the newly selected leg, so a toggle is detected as a change
    let requested = match leg {
        Some(l) if ctx.model.leg(l).state.is_manual_or_transitioning() => LegState::Manual,
        _ => LegState::Walking,
    };

    let slot = ctx.slots.get_mut(slot_id);
    slot.leg = leg;
    slot.requested = requested;

    match leg {
        Some(l) => info!(
            "{} ({}) selected for {} control",
            ctx.model.leg(l).name,
            l,
            slot_id
        ),
        None => info!("No leg currently selected for {} control", slot_id),
    }
}

fn leg_state(ctx: &mut Context, slot_id: SlotId, code: i8) {
    let state = match LegState::from_code(code) {
        Some(s @ LegState::Walking) | Some(s @ LegState::Manual) => s,
        _ => {
            warn!("Invalid {} leg state request {}", slot_id, code);
            return;
        }
    };

    let slot = ctx.slots.get(slot_id);
    if state == slot.requested {
        return;
    }
    if slot.leg.is_none() {
        warn!("No leg selected for {} control, cannot toggle", slot_id);
        return;
    }
    if slot.toggle_pending {
        warn!(
            "Cannot change the {} leg state request while its toggle is in progress",
            slot_id
        );
        return;
    }
    if ctx.slots.get(slot_id.other()).toggle_pending {
        warn!(
            "Cannot toggle the {} leg while the {} leg is transitioning",
            slot_id,
            slot_id.other()
        );
        return;
    }

    let slot = ctx.slots.get_mut(slot_id);
    slot.requested = state;
    slot.toggle_pending = true;
}

fn pose_reset(ctx: &mut Context, code: i8) {
    if ctx.collab.poser.pose_reset_mode() == PoseResetMode::ImmediateAllReset {
        debug!("Pose reset ignored while a leg is transitioning");
        return;
    }

    match PoseResetMode::from_code(code) {
        Some(mode) => ctx.collab.poser.set_pose_reset_mode(mode),
        None => warn!("Invalid pose reset mode {}", code),
    }
}

fn imu(ctx: &mut Context, sample: &ImuSample) {
    let r = ctx.params.imu_rotation_offset_rpy_rad;
    let offset = UnitQuaternion::from_euler_angles(r[0], r[1], r[2]);

    let q = sample.orientation_q;
    let raw = UnitQuaternion::from_quaternion(Quaternion::new(q[0], q[1], q[2], q[3]));

    ctx.collab.poser.set_imu_data(ImuData {
        orientation: offset * raw * offset.inverse(),
        linear_acceleration: offset * Vector3::from(sample.linear_accel_mss),
        angular_velocity: offset * Vector3::from(sample.angular_vel_rads),
    });
}

fn joint_states(ctx: &mut Context, states: &JointStates) {
    for (i, name) in states.names.iter().enumerate() {
        let position = match states.position_rad.get(i) {
            Some(p) => *p,
            None => {
                warn!("Joint state for {} has no position", name);
                continue;
            }
        };

        match ctx.model.joint_by_name_mut(name) {
            Some(joint) => {
                joint.current_position_rad = Some(position - joint.position_offset_rad);
                if let Some(v) = states.velocity_rads.get(i) {
                    joint.current_velocity_rads = *v;
                }
                if let Some(e) = states.effort.get(i) {
                    joint.current_effort = *e;
                }
            }
            None => warn!("Joint state received for unknown joint {}", name),
        }
    }

    if !ctx.model.joints_initialised() && ctx.model.all_joints_reported() {
        ctx.model.set_joints_initialised();
        info!("All joint positions received");
    }
}

fn tip_forces(ctx: &mut Context, forces: &TipForces) {
    let mut short = false;

    for leg in ctx.model.legs_mut() {
        match forces.raw_effort.get(2 * leg.id.index()) {
            Some(raw) => leg.tip_force = clamp(raw - TIP_FORCE_OFFSET, 0.0, MAX_TIP_FORCE),
            None => short = true,
        }
    }

    if short {
        warn!(
            "Tip force sample has {} readings, expected at least {}",
            forces.raw_effort.len(),
            2 * (NUM_LEGS - 1) + 1
        );
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
