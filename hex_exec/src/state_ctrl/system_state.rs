//! System state machine
//!
//! The lifecycle of the hexapod: `Off`, `Packed` (legs folded), `Ready` (legs unfolded, body on
//! the ground) and `Running` (standing, able to walk). Moving between neighbouring states either
//! happens immediately or by running one of the poser's multi-cycle sequences, which is polled
//! once per cycle until it reports completion.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

// Internal
use super::{Context, FatalError, JOINT_PACKED_TOLERANCE_RAD};
use util::logger::LogThrottle;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Current and requested system state, and the transition between them.
#[derive(Debug, Clone)]
pub struct SystemStateMachine {
    current: SystemState,
    target: SystemState,

    /// Set when the operator changes the requested state while still waiting for the user.
    user_input_seen: bool,

    /// True while the machine must be stepped each cycle to reach the target.
    armed: bool,

    phase: Phase,

    throttle: LogThrottle,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemState {
    /// No state has been requested yet.
    WaitingForUser,

    /// The controller has started but doesn't yet know the pose of the legs.
    Unknown,

    Off,
    Packed,
    Ready,
    Running,
}

/// A multi-cycle edge of the state graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Edge {
    /// Off to running without the start up sequence.
    DirectStartup,

    /// Packed to ready.
    Unpack,

    /// Ready to packed.
    Pack,

    /// Ready to running.
    StartUp,

    /// Running to ready.
    ShutDown,
}

/// Progress of the machine along an edge.
///
/// Once an edge has begun it runs to completion even if the target changes in the meantime, the
/// new target is only looked at once the edge has landed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Phase {
    Idle,
    InFlight { edge: Edge, progress: f64 },
}

/// What the machine does to move from its current state towards the target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// Move to the given state within this cycle.
    Immediate(SystemState),

    /// Run the given edge's sequence.
    Sequence(Edge),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SystemState {
    /// Decode a requested state, only `Off`, `Packed`, `Ready` and `Running` can be requested.
    pub fn from_request_code(code: i8) -> Option<Self> {
        match code {
            0 => Some(Self::Off),
            1 => Some(Self::Packed),
            2 => Some(Self::Ready),
            3 => Some(Self::Running),
            _ => None,
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::WaitingForUser => "WAITING_FOR_USER",
            Self::Unknown => "UNKNOWN",
            Self::Off => "OFF",
            Self::Packed => "PACKED",
            Self::Ready => "READY",
            Self::Running => "RUNNING",
        };
        write!(f, "{}", s)
    }
}

impl Edge {
    pub fn from(self) -> SystemState {
        match self {
            Self::DirectStartup => SystemState::Off,
            Self::Unpack => SystemState::Packed,
            Self::Pack | Self::StartUp => SystemState::Ready,
            Self::ShutDown => SystemState::Running,
        }
    }

    pub fn to(self) -> SystemState {
        match self {
            Self::DirectStartup | Self::StartUp => SystemState::Running,
            Self::Unpack | Self::ShutDown => SystemState::Ready,
            Self::Pack => SystemState::Packed,
        }
    }
}

impl SystemStateMachine {
    pub fn new() -> Self {
        Self {
            current: SystemState::WaitingForUser,
            target: SystemState::WaitingForUser,
            user_input_seen: false,
            armed: false,
            phase: Phase::Idle,
            throttle: LogThrottle::default(),
        }
    }

    pub fn current(&self) -> SystemState {
        self.current
    }

    pub fn target(&self) -> SystemState {
        self.target
    }

    pub fn armed(&self) -> bool {
        self.armed
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn user_input_seen(&self) -> bool {
        self.user_input_seen
    }

    /// Handle a requested system state.
    pub fn request(&mut self, requested: SystemState, start_up_sequence: bool) {
        if self.target == SystemState::WaitingForUser {
            // First request, taken as the initial target
            self.target = requested;
        } else if self.current == SystemState::WaitingForUser {
            if requested != self.target {
                self.target = requested;
                self.user_input_seen = true;
            }
        } else {
            self.target = match requested {
                SystemState::Ready | SystemState::Packed if !start_up_sequence => SystemState::Off,
                s => s,
            };
        }

        if self.current != SystemState::WaitingForUser && self.target != self.current {
            self.armed = true;
        }
    }

    /// Leave `WaitingForUser` if a request has been seen (and, when `wait_for_user_start` is set,
    /// the operator has since changed it).
    ///
    /// Returns true if the controller was initialised.
    pub fn initialise_if_due(&mut self, wait_for_user_start: bool) -> bool {
        if self.current != SystemState::WaitingForUser || self.target == SystemState::WaitingForUser
        {
            return false;
        }
        if wait_for_user_start && !self.user_input_seen {
            return false;
        }

        self.current = SystemState::Unknown;
        self.armed = self.target != SystemState::Unknown;
        info!("Controller initialised, requested state is {}", self.target);
        true
    }

    /// Arrive in `state`, disarming if it is the target.
    fn land(&mut self, state: SystemState) {
        self.current = state;
        self.phase = Phase::Idle;
        self.throttle.reset();
        if self.current == self.target {
            self.armed = false;
        }
    }
}

impl Default for SystemStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Decide how to move from `current` towards `target`.
///
/// `all_packed` is only used when leaving `Unknown`.
pub fn resolve(
    current: SystemState,
    target: SystemState,
    start_up_sequence: bool,
    all_packed: bool,
) -> Result<Resolution, FatalError> {
    use self::SystemState::*;

    let undefined = Err(FatalError::UndefinedTransition {
        from: current,
        to: target,
    });

    match current {
        Unknown => match (all_packed, start_up_sequence) {
            (true, true) | (false, true) => Ok(Resolution::Immediate(Packed)),
            (false, false) => Ok(Resolution::Immediate(Off)),
            (true, false) => Err(FatalError::PackedWithoutStartup),
        },
        Off => match target {
            Running if !start_up_sequence => Ok(Resolution::Sequence(Edge::DirectStartup)),
            Packed | Ready | Running => Ok(Resolution::Immediate(Packed)),
            _ => undefined,
        },
        Packed => match target {
            Off => Ok(Resolution::Immediate(Off)),
            Ready | Running => Ok(Resolution::Sequence(Edge::Unpack)),
            _ => undefined,
        },
        Ready => match target {
            Packed | Off => Ok(Resolution::Sequence(Edge::Pack)),
            Running => Ok(Resolution::Sequence(Edge::StartUp)),
            _ => undefined,
        },
        Running => match target {
            Off if !start_up_sequence => Ok(Resolution::Immediate(Off)),
            Off | Packed | Ready => Ok(Resolution::Sequence(Edge::ShutDown)),
            _ => undefined,
        },
        WaitingForUser => undefined,
    }
}

/// Advance the system state machine by at most one edge.
pub(crate) fn step(ctx: &mut Context) -> Result<(), FatalError> {
    let edge = match ctx.system.phase {
        Phase::InFlight { edge, .. } => edge,
        Phase::Idle => {
            let (current, target) = (ctx.system.current, ctx.system.target);
            if current == target {
                ctx.system.armed = false;
                return Ok(());
            }

            let all_packed = ctx.model.all_joints_packed(JOINT_PACKED_TOLERANCE_RAD);
            match resolve(current, target, ctx.params.start_up_sequence, all_packed)? {
                Resolution::Immediate(next) => {
                    log_immediate(current, next, all_packed);
                    ctx.system.land(next);
                    return Ok(());
                }
                Resolution::Sequence(edge) => {
                    ctx.system.phase = Phase::InFlight {
                        edge,
                        progress: 0.0,
                    };
                    edge
                }
            }
        }
    };

    // Pack and unpack take two step periods
    let pack_duration_s = 2.0 / ctx.param_adjust.params().step_frequency();

    let poser = &mut ctx.collab.poser;
    let model = &mut ctx.model;
    if edge != Edge::DirectStartup && ctx.system.throttle.ready() {
        info!("Hexapod transitioning to {} state...", edge.to());
    }

    let (complete, progress) = match edge {
        Edge::DirectStartup => {
            let percent = whole_percent(poser.direct_startup(model));
            if ctx.system.throttle.ready() {
                info!(
                    "Hexapod transitioning directly to RUNNING state ({}%)...",
                    percent
                );
            }
            (percent == 100.0, percent / 100.0)
        }
        Edge::Unpack => with_progress(poser.unpack_legs(pack_duration_s, model)),
        Edge::Pack => with_progress(poser.pack_legs(pack_duration_s, model)),
        Edge::StartUp => with_progress(poser.start_up_sequence(model)),
        Edge::ShutDown => with_progress(poser.shut_down_sequence(model)),
    };

    if complete {
        ctx.system.land(edge.to());
        match edge {
            Edge::DirectStartup => info!("Direct startup sequence complete, ready to walk"),
            Edge::StartUp => info!(
                "State transition complete, hexapod is in RUNNING state, ready to walk"
            ),
            _ => info!(
                "State transition complete, hexapod is in {} state",
                edge.to()
            ),
        }
    } else {
        ctx.system.phase = Phase::InFlight { edge, progress };
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn with_progress(complete: bool) -> (bool, f64) {
    (complete, if complete { 1.0 } else { 0.0 })
}

/// Completed fraction as a truncated whole percentage.
fn whole_percent(fraction: f64) -> f64 {
    (fraction.min(1.0) * 100.0).floor()
}

fn log_immediate(from: SystemState, to: SystemState, all_packed: bool) {
    match (from, to) {
        (SystemState::Unknown, SystemState::Packed) if all_packed => {
            info!("Hexapod currently packed")
        }
        (SystemState::Unknown, SystemState::Packed) => warn!(
            "Hexapod state is unknown, future state transitions may be undesirable, ensure the \
             hexapod is off the ground before proceeding"
        ),
        (SystemState::Unknown, SystemState::Off) => warn!(
            "start_up_sequence is disabled, ensure the hexapod is off the ground before \
             transitioning system state"
        ),
        (SystemState::Off, SystemState::Packed) => info!("Controller running"),
        (_, SystemState::Off) => info!("Controller suspended"),
        _ => info!("Hexapod is in {} state", to),
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use super::SystemState::*;

    const ALL: [SystemState; 6] = [WaitingForUser, Unknown, Off, Packed, Ready, Running];

    #[test]
    fn test_request_codes() {
        assert_eq!(SystemState::from_request_code(0), Some(Off));
        assert_eq!(SystemState::from_request_code(3), Some(Running));
        assert_eq!(SystemState::from_request_code(4), None);
        assert_eq!(SystemState::from_request_code(-1), None);
    }

    #[test]
    fn test_whole_percent() {
        assert_eq!(whole_percent(0.0), 0.0);
        assert_eq!(whole_percent(0.5), 50.0);
        assert_eq!(whole_percent(0.995), 99.0);
        assert_eq!(whole_percent(0.9999), 99.0);
        assert_eq!(whole_percent(1.0), 100.0);
        assert_eq!(whole_percent(1.2), 100.0);
    }

    #[test]
    fn test_edges_join_neighbours() {
        for edge in [
            Edge::DirectStartup,
            Edge::Unpack,
            Edge::Pack,
            Edge::StartUp,
            Edge::ShutDown,
        ]
        .iter()
        {
            assert_ne!(edge.from(), edge.to());
        }
        assert_eq!(Edge::Unpack.to(), Ready);
        assert_eq!(Edge::ShutDown.from(), Running);
    }

    #[test]
    fn test_resolve_defined() {
        assert_eq!(
            resolve(Unknown, Running, true, true),
            Ok(Resolution::Immediate(Packed))
        );
        assert_eq!(
            resolve(Unknown, Running, true, false),
            Ok(Resolution::Immediate(Packed))
        );
        assert_eq!(
            resolve(Unknown, Running, false, false),
            Ok(Resolution::Immediate(Off))
        );
        assert_eq!(
            resolve(Unknown, Running, false, true),
            Err(FatalError::PackedWithoutStartup)
        );

        assert_eq!(
            resolve(Off, Running, false, false),
            Ok(Resolution::Sequence(Edge::DirectStartup))
        );
        assert_eq!(
            resolve(Off, Running, true, false),
            Ok(Resolution::Immediate(Packed))
        );
        assert_eq!(resolve(Off, Ready, true, false), Ok(Resolution::Immediate(Packed)));
        assert_eq!(resolve(Packed, Off, true, false), Ok(Resolution::Immediate(Off)));
        assert_eq!(
            resolve(Packed, Running, true, false),
            Ok(Resolution::Sequence(Edge::Unpack))
        );
        assert_eq!(
            resolve(Ready, Off, true, false),
            Ok(Resolution::Sequence(Edge::Pack))
        );
        assert_eq!(
            resolve(Ready, Running, true, false),
            Ok(Resolution::Sequence(Edge::StartUp))
        );
        assert_eq!(resolve(Running, Off, false, false), Ok(Resolution::Immediate(Off)));
        assert_eq!(
            resolve(Running, Off, true, false),
            Ok(Resolution::Sequence(Edge::ShutDown))
        );
        assert_eq!(
            resolve(Running, Packed, true, false),
            Ok(Resolution::Sequence(Edge::ShutDown))
        );
    }

    #[test]
    fn test_resolve_undefined() {
        let requestable = [Off, Packed, Ready, Running];

        for &from in ALL.iter() {
            for &to in ALL.iter() {
                if from == to || from == Unknown {
                    continue;
                }
                let defined = from != WaitingForUser && requestable.contains(&to);
                for &startup in [true, false].iter() {
                    let res = resolve(from, to, startup, false);
                    if defined {
                        assert!(res.is_ok(), "{:?} -> {:?} should be defined", from, to);
                    } else {
                        assert_eq!(
                            res,
                            Err(FatalError::UndefinedTransition { from, to }),
                            "{:?} -> {:?} should be undefined",
                            from,
                            to
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_request_rules() {
        let mut sm = SystemStateMachine::new();

        // First request seeds the target without arming
        sm.request(Packed, true);
        assert_eq!(sm.target(), Packed);
        assert!(!sm.armed());
        assert!(!sm.user_input_seen());

        // The same request again isn't user input
        sm.request(Packed, true);
        assert!(!sm.user_input_seen());

        sm.request(Running, true);
        assert_eq!(sm.target(), Running);
        assert!(sm.user_input_seen());
        assert!(!sm.armed());

        assert!(sm.initialise_if_due(true));
        assert_eq!(sm.current(), Unknown);
        assert!(sm.armed());
        assert!(!sm.initialise_if_due(true));
    }

    #[test]
    fn test_request_remapped_without_startup() {
        let mut sm = SystemStateMachine::new();
        sm.request(Running, false);
        assert!(sm.initialise_if_due(false));

        sm.request(Ready, false);
        assert_eq!(sm.target(), Off);
        sm.request(Packed, false);
        assert_eq!(sm.target(), Off);
        sm.request(Running, false);
        assert_eq!(sm.target(), Running);
    }

    #[test]
    fn test_wait_for_user_start() {
        let mut sm = SystemStateMachine::new();
        assert!(!sm.initialise_if_due(false));

        sm.request(Running, true);
        assert!(!sm.initialise_if_due(true));
        assert!(sm.initialise_if_due(false));
    }

    #[test]
    fn test_requesting_current_state_arms_nothing() {
        let mut sm = SystemStateMachine::new();
        sm.request(Packed, true);
        sm.initialise_if_due(false);
        sm.land(Packed);
        assert!(!sm.armed());

        sm.request(Packed, true);
        assert!(!sm.armed());
    }
}
