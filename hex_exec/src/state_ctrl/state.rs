//! Main state controller state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::Serialize;
use std::sync::mpsc::Receiver;

// Internal
use super::{
    gait_switch, input, leg_toggle, param_adjust, system_state, tm::StateCtrlTm, Context,
    GaitDesignation, InitError, InputEvent, InputSender, LegTransition, Params,
    PendingAdjustment, Phase, SlotId, StateCtrlError, SystemState,
};
use crate::{
    collab::{Collaborators, VelocityCommand, WalkState},
    model::{LegId, LegState, NUM_LEGS},
};
use util::{module::State, session::Session};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The state controller.
///
/// Inputs are queued through an [`InputSender`] and applied at the start of the next cycle.
pub struct StateCtrl {
    ctx: Context,

    sender: InputSender,
    receiver: Receiver<InputEvent>,
}

/// Joint demands produced by one cycle, in model order.
///
/// Empty until every joint has reported its position.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutputData {
    pub names: Vec<String>,

    /// Demanded position including the joint's calibration offset.
    ///
    /// Units: radians
    pub position_rad: Vec<f64>,

    /// Units: radians/second
    pub velocity_rads: Vec<f64>,
}

/// Status report for state controller processing.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub system_state: SystemState,
    pub target_state: SystemState,

    /// True while the system state machine is moving towards the target.
    pub transition_armed: bool,
    pub phase: Phase,

    pub gait: GaitDesignation,
    pub gait_change_pending: bool,

    pub parameter_adjustment: Option<PendingAdjustment>,

    pub primary_toggle_pending: bool,
    pub secondary_toggle_pending: bool,
    pub leg_transition: Option<LegTransition>,

    pub leg_states: [LegState; NUM_LEGS],
    pub manual_leg_count: usize,

    pub effective_velocity: VelocityCommand,

    pub joints_initialised: bool,

    /// Number of legs whose tip position could not be reached this cycle.
    pub ik_failures: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl StateCtrl {
    /// Build the controller from its parameters and collaborators.
    pub fn new(params: Params, collab: Collaborators) -> Result<Self, InitError> {
        let ctx = Context::new(params, collab)?;
        let (sender, receiver) = input::channel();

        Ok(Self {
            ctx,
            sender,
            receiver,
        })
    }

    /// Get a sender for queuing inputs to the controller.
    pub fn input_sender(&self) -> InputSender {
        self.sender.clone()
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Telemetry snapshot of the controller.
    pub fn telemetry(&self) -> StateCtrlTm {
        StateCtrlTm::from_ctx(&self.ctx)
    }

    fn drain_inputs(&mut self) {
        for event in self.receiver.try_iter() {
            input::dispatch(&mut self.ctx, event);
        }
    }

    /// Update the body pose compensation and the impedance of the legs.
    fn update_pose_and_impedance(&mut self) {
        let ctx = &mut self.ctx;

        let body_height_m = ctx.collab.walker.body_height();
        ctx.collab
            .poser
            .update_current_pose(body_height_m, &ctx.model);

        if ctx.params.impedance_control {
            if ctx.collab.walker.walk_state() != WalkState::Stopped {
                ctx.collab.impedance.update_walking_stiffness(&mut ctx.model);
            }

            for id in LegId::all() {
                if ctx.model.leg(id).state == LegState::Walking {
                    ctx.collab.impedance.update_impedance(
                        id,
                        ctx.params.use_joint_effort,
                        &mut ctx.model,
                    );
                }
            }
        }
    }

    /// Sequence the stop and modify operations and the kinematic pipeline while running.
    fn running(&mut self) {
        let ctx = &mut self.ctx;

        ctx.velocity.effective = ctx.velocity.live;

        if ctx.gait.pending() {
            gait_switch::step(ctx);
        } else if ctx.param_adjust.pending().is_some() {
            param_adjust::step(ctx);
        } else if ctx.slots.any_toggle_pending() {
            leg_toggle::step(ctx);
        } else if ctx.modes.cruise_control {
            ctx.velocity.effective = ctx.velocity.cruise;
        }

        // Hold the tips while an operation is in progress on a stopped hexapod
        if ctx.stop_and_modify_pending() && ctx.collab.walker.walk_state() == WalkState::Stopped
        {
            return;
        }

        let manual_inputs = ctx.slots.manual_inputs(&ctx.model);

        ctx.collab
            .walker
            .update_walk(&ctx.velocity.effective, &mut ctx.model);
        ctx.collab
            .walker
            .update_manual(&manual_inputs, &mut ctx.model);
        ctx.collab.poser.update_stance(&mut ctx.model);

        let debug_ik = ctx.params.debug_ik;
        for leg in ctx.model.legs_mut() {
            let mut tip = leg.poser_tip_position_m;
            if leg.state != LegState::Manual {
                tip.z -= leg.delta_z_m;
            }
            leg.desired_tip_position_m = tip;

            if !ctx.collab.kinematics.apply_ik(leg, debug_ik) {
                ctx.ik_failures += 1;
            }
        }
    }

    /// Publish the desired joint positions, deriving the velocities from the last publication.
    fn joint_demands(&mut self) -> OutputData {
        let mut output = OutputData::default();

        if !self.ctx.model.joints_initialised() {
            return output;
        }

        let dt = self.ctx.params.time_delta_s;
        for joint in self.ctx.model.legs_mut().flat_map(|l| l.joints.iter_mut()) {
            output.names.push(joint.name.clone());
            output
                .position_rad
                .push(joint.desired_position_rad + joint.position_offset_rad);
            output
                .velocity_rads
                .push((joint.desired_position_rad - joint.prev_desired_position_rad) / dt);
            joint.prev_desired_position_rad = joint.desired_position_rad;
        }

        output
    }

    fn status_report(&self) -> StatusReport {
        let ctx = &self.ctx;

        let mut leg_states = [LegState::Walking; NUM_LEGS];
        for (s, leg) in leg_states.iter_mut().zip(ctx.model.legs()) {
            *s = leg.state;
        }

        StatusReport {
            system_state: ctx.system.current(),
            target_state: ctx.system.target(),
            transition_armed: ctx.system.armed(),
            phase: ctx.system.phase(),
            gait: ctx.gait.active(),
            gait_change_pending: ctx.gait.pending(),
            parameter_adjustment: ctx.param_adjust.pending().copied(),
            primary_toggle_pending: ctx.slots.get(SlotId::Primary).toggle_pending,
            secondary_toggle_pending: ctx.slots.get(SlotId::Secondary).toggle_pending,
            leg_transition: ctx.leg_transition,
            leg_states,
            manual_leg_count: ctx.manual_leg_count,
            effective_velocity: ctx.velocity.effective,
            joints_initialised: ctx.model.joints_initialised(),
            ik_failures: ctx.ik_failures,
        }
    }
}

impl State for StateCtrl {
    type InitData = &'static str;
    type InitError = InitError;

    type InputData = ();
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = StateCtrlError;

    /// Initialise the StateCtrl module from its parameter file, using the simulated collaborators.
    fn init(init_data: Self::InitData, session: &Session) -> Result<Self, Self::InitError> {
        let params: Params = util::params::load(init_data)?;
        let collab = params.sim_collaborators();

        session.save("state_ctrl/params.json", params.clone());

        Self::new(params, collab)
    }

    /// Perform one cycle of the controller.
    ///
    /// A fatal error leaves the controller unusable, the caller is expected to stop.
    fn proc(
        &mut self,
        _input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        self.ctx.ik_failures = 0;

        self.drain_inputs();
        self.ctx
            .system
            .initialise_if_due(self.ctx.params.wait_for_user_start);

        let current = self.ctx.system.current();
        if current != SystemState::WaitingForUser && current != SystemState::Unknown {
            self.update_pose_and_impedance();
        }

        if self.ctx.system.armed() {
            system_state::step(&mut self.ctx)?;
        } else if current == SystemState::Running {
            self.running();
        }

        Ok((self.joint_demands(), self.status_report()))
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::state_ctrl::{params::test::test_params, FatalError, ParameterSelection};
    use chrono::Utc;
    use comms_if::{eqpt::joint::JointStates, tc::Tc};

    fn state_ctrl(params: Params) -> StateCtrl {
        let collab = params.sim_collaborators();
        StateCtrl::new(params, collab).unwrap()
    }

    /// Report every joint at the same position, or at its packed position.
    fn report_joints(sc: &StateCtrl, position_rad: Option<f64>) {
        let joints: Vec<_> = sc.ctx.model.joints().collect();
        sc.input_sender()
            .send(JointStates {
                timestamp: Utc::now(),
                names: joints.iter().map(|j| j.name.clone()).collect(),
                position_rad: joints
                    .iter()
                    .map(|j| position_rad.unwrap_or(j.packed_position_rad))
                    .collect(),
                velocity_rads: vec![],
                effort: vec![],
            })
            .unwrap();
    }

    fn send(sc: &StateCtrl, tc: Tc) {
        sc.input_sender().send(tc).unwrap();
    }

    fn tick(sc: &mut StateCtrl) -> StatusReport {
        sc.proc(&()).unwrap().1
    }

    fn run_until(
        sc: &mut StateCtrl,
        max_cycles: usize,
        done: impl Fn(&StatusReport) -> bool,
    ) -> StatusReport {
        for _ in 0..max_cycles {
            let rpt = tick(sc);
            if done(&rpt) {
                return rpt;
            }
        }
        panic!("Condition not met within {} cycles", max_cycles);
    }

    /// A controller standing in the running state.
    fn running() -> StateCtrl {
        running_with(test_params())
    }

    fn running_with(params: Params) -> StateCtrl {
        let mut sc = state_ctrl(params);
        report_joints(&sc, Some(0.3));
        send(&sc, Tc::SystemState(3));
        run_until(&mut sc, 50, |r| {
            r.system_state == SystemState::Running && !r.transition_armed
        });
        sc
    }

    #[test]
    fn test_waits_for_first_request() {
        let mut sc = state_ctrl(test_params());
        report_joints(&sc, Some(0.3));

        for _ in 0..3 {
            let rpt = tick(&mut sc);
            assert_eq!(rpt.system_state, SystemState::WaitingForUser);
            assert!(rpt.joints_initialised);
        }
    }

    #[test]
    fn test_unknown_to_packed() {
        let mut sc = state_ctrl(test_params());
        report_joints(&sc, Some(0.3));
        send(&sc, Tc::SystemState(1));

        let rpt = tick(&mut sc);
        assert_eq!(rpt.system_state, SystemState::Packed);
        assert!(!rpt.transition_armed);
    }

    #[test]
    fn test_packed_without_startup_is_fatal() {
        let mut params = test_params();
        params.start_up_sequence = false;
        let mut sc = state_ctrl(params);
        report_joints(&sc, None);
        send(&sc, Tc::SystemState(3));

        match sc.proc(&()) {
            Err(StateCtrlError::Fatal(FatalError::PackedWithoutStartup)) => (),
            r => panic!("Expected a fatal error, got {:?}", r.map(|(_, s)| s)),
        }
    }

    #[test]
    fn test_direct_startup() {
        let mut params = test_params();
        params.start_up_sequence = false;
        let mut sc = state_ctrl(params);
        report_joints(&sc, Some(0.3));
        send(&sc, Tc::SystemState(3));

        // Unknown to off, then the direct startup sequence
        assert_eq!(tick(&mut sc).system_state, SystemState::Off);
        let rpt = run_until(&mut sc, 10, |r| r.system_state == SystemState::Running);
        assert!(!rpt.transition_armed);

        // Without the start up sequence, off is reached straight from running
        send(&sc, Tc::SystemState(1));
        assert_eq!(tick(&mut sc).system_state, SystemState::Off);
    }

    #[test]
    fn test_full_start_up_and_shut_down() {
        let mut sc = state_ctrl(test_params());
        report_joints(&sc, Some(0.3));
        send(&sc, Tc::SystemState(3));

        let mut visited = vec![];
        for _ in 0..30 {
            let rpt = tick(&mut sc);
            if visited.last() != Some(&rpt.system_state) {
                visited.push(rpt.system_state);
            }
        }
        assert_eq!(
            visited,
            vec![
                SystemState::Packed,
                SystemState::Ready,
                SystemState::Running
            ]
        );

        send(&sc, Tc::SystemState(0));
        let mut visited = vec![];
        for _ in 0..30 {
            let rpt = tick(&mut sc);
            if visited.last() != Some(&rpt.system_state) {
                visited.push(rpt.system_state);
            }
        }
        assert_eq!(
            visited,
            vec![
                SystemState::Running,
                SystemState::Ready,
                SystemState::Packed,
                SystemState::Off
            ]
        );
    }

    #[test]
    fn test_edge_completes_before_new_target() {
        let mut sc = state_ctrl(test_params());
        report_joints(&sc, Some(0.3));
        send(&sc, Tc::SystemState(3));

        // Unknown to packed, then part way through unpacking
        for _ in 0..3 {
            tick(&mut sc);
        }
        send(&sc, Tc::SystemState(1));
        let rpt = tick(&mut sc);
        assert_eq!(rpt.target_state, SystemState::Packed);
        assert!(matches!(rpt.phase, Phase::InFlight { .. }));

        // Unpack lands in ready, then packs back down
        let rpt = run_until(&mut sc, 30, |r| r.system_state != SystemState::Packed);
        assert_eq!(rpt.system_state, SystemState::Ready);
        let rpt = run_until(&mut sc, 30, |r| !r.transition_armed);
        assert_eq!(rpt.system_state, SystemState::Packed);
    }

    #[test]
    fn test_requesting_current_state_is_idle() {
        let mut sc = running();
        send(&sc, Tc::SystemState(3));
        let rpt = tick(&mut sc);
        assert!(!rpt.transition_armed);
        assert_eq!(rpt.system_state, SystemState::Running);
    }

    #[test]
    fn test_joint_demands() {
        let mut sc = state_ctrl(test_params());

        // Nothing is published before the joints report
        let (out, _) = sc.proc(&()).unwrap();
        assert!(out.names.is_empty());

        report_joints(&sc, Some(0.3));
        let (out, _) = sc.proc(&()).unwrap();
        assert_eq!(out.names.len(), 3 * NUM_LEGS);
        assert!(out.position_rad.iter().all(|p| (p - 0.3).abs() < 1e-12));
        assert!(out.velocity_rads.iter().all(|v| v.abs() < 1e-12));

        // Demanded velocity follows the packing sweep
        send(&sc, Tc::SystemState(1));
        tick(&mut sc);
        send(&sc, Tc::SystemState(2));
        let (out, _) = sc.proc(&()).unwrap();
        assert!(out.velocity_rads.iter().any(|v| v.abs() > 1e-6));
    }

    #[test]
    fn test_manual_leg_limit() {
        let mut sc = running();

        // Secondary leg into manual
        send(&sc, Tc::SecondaryLegSelection(3));
        send(&sc, Tc::SecondaryLegState(1));
        let rpt = run_until(&mut sc, 10, |r| !r.secondary_toggle_pending);
        assert_eq!(rpt.leg_states[3], LegState::Manual);
        assert_eq!(rpt.manual_leg_count, 1);

        // Another leg part way through a toggle
        sc.ctx.model.leg_mut(LegId::new(5).unwrap()).state = LegState::WalkingToManual;

        send(&sc, Tc::PrimaryLegSelection(0));
        send(&sc, Tc::PrimaryLegState(1));
        let rpt = tick(&mut sc);
        assert_eq!(rpt.leg_states[0], LegState::Walking);
        assert!(!rpt.primary_toggle_pending);
        assert!(!rpt.secondary_toggle_pending);
        assert_eq!(
            sc.ctx.slots.get(SlotId::Primary).requested,
            LegState::Walking
        );
        assert!(sc.ctx.model.count_manual_or_transitioning() <= 2);
    }

    #[test]
    fn test_manual_leg_follows_tip_velocity() {
        let mut sc = running();
        let leg = LegId::new(1).unwrap();

        send(&sc, Tc::PrimaryLegSelection(1));
        send(&sc, Tc::PrimaryLegState(1));
        run_until(&mut sc, 10, |r| r.leg_states[1] == LegState::Manual);

        let z_before = sc.ctx.model.leg(leg).walker_tip_position_m.z;
        send(&sc, Tc::PrimaryTipVelocity([0.0, 0.0, 0.08]));
        tick(&mut sc);
        tick(&mut sc);
        let z_after = sc.ctx.model.leg(leg).walker_tip_position_m.z;
        assert!((z_after - z_before - 0.02).abs() < 1e-9);

        // And back to walking
        send(&sc, Tc::PrimaryLegState(0));
        let rpt = run_until(&mut sc, 10, |r| r.leg_states[1] == LegState::Walking);
        assert_eq!(rpt.manual_leg_count, 0);
    }

    #[test]
    fn test_cruise_control() {
        let mut sc = running();

        send(
            &sc,
            Tc::BodyVelocity {
                linear_ms: [0.3, 0.0],
                angular_rads: 0.1,
            },
        );
        tick(&mut sc);
        send(&sc, Tc::CruiseControl(1));
        tick(&mut sc);

        send(
            &sc,
            Tc::BodyVelocity {
                linear_ms: [0.0, 0.0],
                angular_rads: 0.0,
            },
        );
        let rpt = tick(&mut sc);
        assert_eq!(rpt.effective_velocity.linear.x, 0.3);
        assert_eq!(rpt.effective_velocity.angular, 0.1);

        send(&sc, Tc::CruiseControl(0));
        let rpt = tick(&mut sc);
        assert!(rpt.effective_velocity.is_zero());
    }

    #[test]
    fn test_parameter_adjust_once() {
        let mut sc = running();
        send(&sc, Tc::ParameterSelection(1));
        tick(&mut sc);

        if let Some(p) = sc
            .ctx
            .param_adjust
            .params_mut()
            .get_mut(ParameterSelection::StepFrequency)
        {
            p.step = -0.5;
        }

        send(&sc, Tc::ParameterAdjust(1));
        send(&sc, Tc::ParameterAdjust(1));
        let rpt = tick(&mut sc);
        assert!(rpt.parameter_adjustment.is_some());

        let rpt = run_until(&mut sc, 10, |r| r.parameter_adjustment.is_none());
        assert!(!rpt.gait_change_pending);

        let sf = sc
            .ctx
            .param_adjust
            .params()
            .get(ParameterSelection::StepFrequency)
            .unwrap();
        assert_eq!(sf.current, 2.5);
        assert_eq!(sf.step, 0.5);
    }

    #[test]
    fn test_gait_change_waits_for_stop() {
        let mut sc = running();

        send(
            &sc,
            Tc::BodyVelocity {
                linear_ms: [0.1, 0.0],
                angular_rads: 0.0,
            },
        );
        tick(&mut sc);
        tick(&mut sc);
        assert_eq!(sc.ctx.collab.walker.walk_state(), WalkState::Moving);

        send(&sc, Tc::GaitSelection(2));
        let mut cycles = 0;
        loop {
            let stopped = sc.ctx.collab.walker.walk_state() == WalkState::Stopped;
            let rpt = tick(&mut sc);
            cycles += 1;

            if !rpt.gait_change_pending {
                // Only committed in a cycle which started with the walker stopped
                assert!(stopped);
                assert_eq!(rpt.gait, GaitDesignation::Wave);
                break;
            }
            assert_eq!(rpt.gait, GaitDesignation::Tripod);
            assert!(rpt.effective_velocity.is_zero());
            assert!(cycles < 10);
        }

        // The operator has to command a new velocity after the change
        assert!(sc.ctx.velocity.live.is_zero());
    }

    #[test]
    fn test_walking_moves_tips() {
        let mut sc = running();
        let leg = LegId::new(0).unwrap();
        let start = sc.ctx.model.leg(leg).desired_tip_position_m;

        send(
            &sc,
            Tc::BodyVelocity {
                linear_ms: [0.1, 0.0],
                angular_rads: 0.0,
            },
        );
        // The gait is periodic, so the tip may pass back through its start
        let mut moved = false;
        for _ in 0..3 {
            let rpt = tick(&mut sc);
            assert_eq!(rpt.ik_failures, 0);
            moved |= sc.ctx.model.leg(leg).desired_tip_position_m != start;
        }
        assert!(moved);
    }

    #[test]
    fn test_walking_stiffness_without_dynamic_stiffness() {
        let mut params = test_params();
        params.dynamic_stiffness = false;
        let mut sc = running_with(params);

        send(
            &sc,
            Tc::BodyVelocity {
                linear_ms: [0.1, 0.0],
                angular_rads: 0.0,
            },
        );
        for _ in 0..5 {
            tick(&mut sc);
        }

        assert_ne!(sc.ctx.collab.walker.walk_state(), WalkState::Stopped);
        let k = sc.ctx.param_adjust.params().tuning().virtual_stiffness;
        assert!(sc.ctx.model.legs().any(|l| l.virtual_stiffness == k));
    }

    #[test]
    fn test_leg_state_request_locked_while_toggling() {
        let mut sc = running();

        send(&sc, Tc::PrimaryLegSelection(1));
        send(&sc, Tc::PrimaryLegState(1));
        let rpt = tick(&mut sc);
        assert!(rpt.primary_toggle_pending);

        // Reversing mid transition is refused, the leg carries on into manual
        send(&sc, Tc::PrimaryLegState(0));
        let rpt = run_until(&mut sc, 10, |r| !r.primary_toggle_pending);
        assert_eq!(rpt.leg_states[1], LegState::Manual);
        assert_eq!(
            sc.ctx.slots.get(SlotId::Primary).requested,
            LegState::Manual
        );

        // A walking request afterwards brings it back
        send(&sc, Tc::PrimaryLegState(0));
        assert!(tick(&mut sc).primary_toggle_pending);
        let rpt = run_until(&mut sc, 10, |r| !r.primary_toggle_pending);
        assert_eq!(rpt.leg_states[1], LegState::Walking);
        assert_eq!(rpt.manual_leg_count, 0);
    }

    #[test]
    fn test_running_only_inputs_ignored_before_running() {
        let mut sc = state_ctrl(test_params());
        report_joints(&sc, Some(0.3));
        send(&sc, Tc::SystemState(1));
        send(&sc, Tc::GaitSelection(2));
        send(&sc, Tc::PrimaryLegSelection(0));

        let rpt = tick(&mut sc);
        assert!(!rpt.gait_change_pending);
        assert_eq!(sc.ctx.slots.get(SlotId::Primary).leg, None);
    }
}
