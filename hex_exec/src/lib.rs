//! # Hexapod library.
//!
//! This library allows other crates in the workspace (and the benchmarks) to access items defined
//! inside the hexapod executable crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Collaborators - the walker, poser, impedance and kinematics interfaces driven by the state
/// controller, along with simulated implementations
pub mod collab;

/// Global data store for the executable
pub mod data_store;

/// Leg model - the legs and joints of the hexapod
pub mod model;

/// State controller - top level behavioural controller turning operator commands and sensor
/// samples into joint demands
pub mod state_ctrl;
