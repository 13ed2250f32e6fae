//! Gait selection and switching

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

// Internal
use super::Context;
use crate::collab::AccelLimits;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Tracks the gait in use and any change requested by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GaitSwitch {
    active: GaitDesignation,
    selected: GaitDesignation,
    pending: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GaitDesignation {
    Tripod,
    Ripple,
    Wave,
    Amble,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl GaitDesignation {
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            0 => Some(Self::Tripod),
            1 => Some(Self::Ripple),
            2 => Some(Self::Wave),
            3 => Some(Self::Amble),
            _ => None,
        }
    }

    /// Key of the gait in the gait table.
    pub fn table_key(self) -> &'static str {
        match self {
            Self::Tripod => "tripod_gait",
            Self::Ripple => "ripple_gait",
            Self::Wave => "wave_gait",
            Self::Amble => "amble_gait",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "tripod_gait" => Some(Self::Tripod),
            "ripple_gait" => Some(Self::Ripple),
            "wave_gait" => Some(Self::Wave),
            "amble_gait" => Some(Self::Amble),
            _ => None,
        }
    }
}

impl fmt::Display for GaitDesignation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.table_key())
    }
}

impl GaitSwitch {
    pub fn new(initial: GaitDesignation) -> Self {
        Self {
            active: initial,
            selected: initial,
            pending: false,
        }
    }

    /// Gait the walker is currently using.
    pub fn active(&self) -> GaitDesignation {
        self.active
    }

    /// Gait most recently selected by the operator.
    pub fn selected(&self) -> GaitDesignation {
        self.selected
    }

    pub fn pending(&self) -> bool {
        self.pending
    }

    /// Select a gait, returning true if this requires a change.
    pub fn select(&mut self, gait: GaitDesignation) -> bool {
        if gait == self.selected {
            return false;
        }

        self.selected = gait;
        self.pending = true;
        true
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Switch to the selected gait once the walker has stopped.
pub(crate) fn step(ctx: &mut Context) {
    if !ctx.require_stationary("change gait") {
        return;
    }

    let selected = ctx.gait.selected;

    match ctx.params.gaits.get(selected.table_key()) {
        Some(gait) => {
            ctx.collab.walker.set_gait_params(gait);
            ctx.collab.walker.set_accel_limits(AccelLimits::default());
            ctx.gait.active = selected;
            info!("Now using {} mode", selected);
        }
        None => {
            warn!(
                "Gait {} is not in the gait table, continuing with {}",
                selected, ctx.gait.active
            );
            ctx.gait.selected = ctx.gait.active;
        }
    }

    ctx.gait.pending = false;
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
