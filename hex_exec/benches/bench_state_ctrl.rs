//! # State Controller Benchmark

use chrono::Utc;
use comms_if::{eqpt::joint::JointStates, tc::Tc};
use criterion::{criterion_group, criterion_main, Criterion};

use hex_lib::state_ctrl::{Params, StateCtrl, SystemState};
use util::module::State;

fn state_ctrl_benchmark(c: &mut Criterion) {
    // ---- Build a walking controller ----

    let params: Params = util::params::from_toml_str(include_str!("../../params/state_ctrl.toml"))
        .expect("Shipped parameters are invalid");
    let collab = params.sim_collaborators();
    let mut state_ctrl = StateCtrl::new(params, collab).expect("Could not build StateCtrl");

    let inputs = state_ctrl.input_sender();
    let joints: Vec<_> = state_ctrl.context().model().joints().collect();
    inputs
        .send(JointStates {
            timestamp: Utc::now(),
            names: joints.iter().map(|j| j.name.clone()).collect(),
            position_rad: joints.iter().map(|j| j.packed_position_rad).collect(),
            velocity_rads: vec![],
            effort: vec![],
        })
        .unwrap();
    inputs.send(Tc::SystemState(3)).unwrap();

    // Unpack and stand up
    for _ in 0..1000 {
        let (_, rpt) = state_ctrl.proc(&()).unwrap();
        if rpt.system_state == SystemState::Running && !rpt.transition_armed {
            break;
        }
    }

    inputs
        .send(Tc::BodyVelocity {
            linear_ms: [0.1, 0.0],
            angular_rads: 0.05,
        })
        .unwrap();

    // ---- Benchmark a walking cycle ----

    c.bench_function("state_ctrl walking cycle", |b| {
        b.iter(|| state_ctrl.proc(&()).unwrap())
    });
}

criterion_group!(benches, state_ctrl_benchmark);
criterion_main!(benches);
