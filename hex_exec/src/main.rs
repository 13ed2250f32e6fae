//! Main hexapod executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise all modules
//!     - Main loop:
//!         - Telecommand acquisition (from a script if one is given)
//!         - State controller processing
//!         - Joint demand output
//!         - Telemetry
//!
//! # Modules
//!
//! All modules (e.g. `state_ctrl`) shall meet the following requirements:
//!     1. Provide a public struct implementing the `util::module::State` trait.
//!
//! # Simulation
//!
//! No servo or sensor drivers are attached, the simulated collaborators are used and the demanded
//! joint positions are echoed back to the controller as the measured joint states.

// ---------------------------------------------------------------------------
// USE MODULES FROM LIBRARY
// ---------------------------------------------------------------------------

use comms_if::eqpt::joint::JointStates;
use hex_lib::{
    data_store::DataStore,
    state_ctrl::{InputError, InputSender, StateCtrl},
};

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use chrono::Utc;
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{debug, error, info, warn};
use std::env;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use util::{
    logger::{logger_init, LevelFilter},
    module::State,
    script_interpreter::{PendingTcs, ScriptInterpreter},
    session::Session,
};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("hex_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Hexapod Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- INITIALISE TC SOURCE ----

    // Collect all arguments
    let args: Vec<String> = env::args().collect();

    debug!("CLI arguments: {:?}", args);

    // If we have a single argument use it as the script path
    let mut script = if args.len() == 2 {
        info!("Loading script from \"{}\"", &args[1]);

        let si = ScriptInterpreter::new(&args[1]).wrap_err("Failed to load script")?;

        info!(
            "Loaded script lasts {:.02} s and contains {} TCs\n",
            si.get_duration(),
            si.get_num_tcs()
        );

        Some(si)
    } else if args.len() == 1 {
        info!("No script provided, the controller will wait for a system state request\n");
        None
    } else {
        return Err(eyre!(
            "Expected either zero or one argument, found {}",
            args.len() - 1
        ));
    };

    // ---- INITIALISE DATASTORE ----

    info!("Initialising modules...");

    let mut ds = DataStore::default();

    // ---- INITIALISE MODULES ----

    let mut state_ctrl =
        StateCtrl::init("state_ctrl.toml", &session).wrap_err("Failed to initialise StateCtrl")?;
    info!("StateCtrl init complete");

    info!("Module initialisation complete\n");

    let cycle_period_s = state_ctrl.context().params().time_delta_s;
    let cycle_frequency_hz = 1.0 / cycle_period_s;

    let inputs = state_ctrl.input_sender();

    // The simulated hexapod starts out packed
    let joints: Vec<_> = state_ctrl.context().model().joints().collect();
    queue(
        &inputs,
        JointStates {
            timestamp: Utc::now(),
            names: joints.iter().map(|j| j.name.clone()).collect(),
            position_rad: joints
                .iter()
                .map(|j| j.packed_position_rad + j.position_offset_rad)
                .collect(),
            velocity_rads: vec![0.0; joints.len()],
            effort: vec![0.0; joints.len()],
        },
    )?;

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    loop {
        // Get cycle start time
        let cycle_start_instant = Instant::now();

        // Clear items that need wiping at the start of the cycle
        ds.cycle_start(cycle_frequency_hz);

        // ---- TELECOMMAND PROCESSING ----

        if let Some(ref mut si) = script {
            match si.get_pending_tcs() {
                PendingTcs::None => (),
                PendingTcs::Some(tc_vec) => {
                    for tc in tc_vec {
                        queue(&inputs, tc)?;
                    }
                }
                // Exit if end of script reached
                PendingTcs::EndOfScript => {
                    info!("End of TC script reached, stopping");
                    break;
                }
            }
        }

        // ---- CONTROL ALGORITHM PROCESSING ----

        match state_ctrl.proc(&()) {
            Ok((o, r)) => {
                ds.state_ctrl_output = o;
                ds.state_ctrl_status_rpt = Some(r);
            }
            Err(e) => {
                error!("StateCtrl processing failed: {}", e);
                session.exit();
                return Err(e).wrap_err("StateCtrl encountered a fatal error");
            }
        }

        // Echo the demands back as the measured joint states
        if !ds.state_ctrl_output.names.is_empty() {
            queue(
                &inputs,
                JointStates {
                    timestamp: Utc::now(),
                    names: ds.state_ctrl_output.names.clone(),
                    position_rad: ds.state_ctrl_output.position_rad.clone(),
                    velocity_rads: ds.state_ctrl_output.velocity_rads.clone(),
                    effort: vec![],
                },
            )?;
        }

        // ---- TELEMETRY ----

        if ds.is_1_hz_cycle {
            if let Some(ref rpt) = ds.state_ctrl_status_rpt {
                debug!(
                    "System state: {} (target {}), gait: {}, manual legs: {}",
                    rpt.system_state, rpt.target_state, rpt.gait, rpt.manual_leg_count
                );
                if rpt.ik_failures > 0 {
                    warn!("{} legs could not reach their tip positions", rpt.ik_failures);
                }
            }

            session.save(
                format!("state_ctrl/tm_{:08}.json", ds.num_cycles),
                state_ctrl.telemetry(),
            );
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match Duration::from_secs_f64(cycle_period_s).checked_sub(cycle_dur) {
            Some(d) => {
                ds.num_consec_cycle_overruns = 0;
                thread::sleep(d);
            }
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - cycle_period_s
                );
                ds.num_consec_cycle_overruns += 1;
            }
        }

        // Increment cycle counter
        ds.num_cycles += 1;
    }

    // ---- SHUTDOWN ----

    info!("End of execution");
    session.exit();

    Ok(())
}

/// Queue an input for the next cycle.
///
/// The controller runs on this thread, so a full queue is reported rather than waited on.
fn queue<E: Into<hex_lib::state_ctrl::InputEvent>>(
    inputs: &InputSender,
    event: E,
) -> Result<(), Report> {
    match inputs.try_send(event) {
        Ok(()) => Ok(()),
        Err(InputError::Full) => {
            warn!("StateCtrl input queue is full, input dropped");
            Ok(())
        }
        Err(e) => Err(e).wrap_err("Could not queue StateCtrl input"),
    }
}
