//! # Hexapod model
//!
//! The model is an arena of the six legs of the hexapod, indexed by [`LegId`]. Everything else in
//! the controller refers to a leg by its id and borrows it from the model when needed, nothing
//! else owns a leg.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod leg;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use std::fmt;

// Internal
pub use leg::*;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// The number of legs on the hexapod.
pub const NUM_LEGS: usize = 6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Stable designation of a leg, 0 to 5.
///
/// The default names, in order, are AR, BR, CR, CL, BL, AL (front/middle/rear, right/left).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LegId(u8);

/// The legs of the hexapod.
#[derive(Debug, Clone)]
pub struct Model {
    legs: Vec<Leg>,

    /// Set once every joint has reported a position. Never cleared.
    joints_initialised: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Control state of a single leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegState {
    /// Leg is driven by the gait generator.
    Walking,

    /// Leg is driven directly by the operator's tip velocity.
    Manual,

    /// Body is being posed so the leg can be lifted out of the gait.
    WalkingToManual,

    /// Body is being posed so the leg can be returned to the gait.
    ManualToWalking,
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Expected parameters for {0} legs but found {1}")]
    WrongNumberOfLegs(usize, usize),

    #[error("Joint name {0} is used more than once")]
    DuplicateJointName(String),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LegId {
    /// Get the id for the given arena index, if it is a valid leg.
    pub fn new(index: usize) -> Option<Self> {
        if index < NUM_LEGS {
            Some(Self(index as u8))
        } else {
            None
        }
    }

    /// Decode a leg selection code, where -1 means no leg.
    ///
    /// Returns `Err(())` for codes which are neither a leg nor -1.
    pub fn from_selection_code(code: i8) -> Result<Option<Self>, ()> {
        match code {
            -1 => Ok(None),
            c if c >= 0 => Self::new(c as usize).map(Some).ok_or(()),
            _ => Err(()),
        }
    }

    /// Index of this leg in the model arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterate over all legs in id order.
    pub fn all() -> impl Iterator<Item = LegId> {
        (0..NUM_LEGS as u8).map(LegId)
    }
}

impl fmt::Display for LegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "leg {}", self.0)
    }
}

impl LegState {
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            0 => Some(Self::Walking),
            1 => Some(Self::Manual),
            2 => Some(Self::WalkingToManual),
            3 => Some(Self::ManualToWalking),
            _ => None,
        }
    }

    /// True for every state except `Walking`.
    pub fn is_manual_or_transitioning(self) -> bool {
        self != Self::Walking
    }

    pub fn is_transitioning(self) -> bool {
        matches!(self, Self::WalkingToManual | Self::ManualToWalking)
    }
}

impl Default for LegState {
    fn default() -> Self {
        Self::Walking
    }
}

impl Model {
    /// Build the model from the per-leg parameters, which must be given in leg id order.
    pub fn new(leg_params: &[LegParams]) -> Result<Self, ModelError> {
        if leg_params.len() != NUM_LEGS {
            return Err(ModelError::WrongNumberOfLegs(NUM_LEGS, leg_params.len()));
        }

        let legs: Vec<Leg> = LegId::all()
            .zip(leg_params.iter())
            .map(|(id, p)| Leg::new(id, p))
            .collect();

        // Joint states are matched by name, so names must be unique
        let mut names: Vec<&str> = legs
            .iter()
            .flat_map(|l| l.joints.iter().map(|j| j.name.as_str()))
            .collect();
        names.sort_unstable();
        for pair in names.windows(2) {
            if pair[0] == pair[1] {
                return Err(ModelError::DuplicateJointName(pair[0].to_string()));
            }
        }

        Ok(Self {
            legs,
            joints_initialised: false,
        })
    }

    pub fn leg(&self, id: LegId) -> &Leg {
        &self.legs[id.index()]
    }

    pub fn leg_mut(&mut self, id: LegId) -> &mut Leg {
        &mut self.legs[id.index()]
    }

    pub fn legs(&self) -> impl Iterator<Item = &Leg> {
        self.legs.iter()
    }

    pub fn legs_mut(&mut self) -> impl Iterator<Item = &mut Leg> {
        self.legs.iter_mut()
    }

    /// Iterate over every joint of every leg.
    pub fn joints(&self) -> impl Iterator<Item = &Joint> {
        self.legs.iter().flat_map(|l| l.joints.iter())
    }

    /// Find a joint by its name.
    pub fn joint_by_name_mut(&mut self, name: &str) -> Option<&mut Joint> {
        self.legs
            .iter_mut()
            .flat_map(|l| l.joints.iter_mut())
            .find(|j| j.name == name)
    }

    /// True if every joint has reported a position within `tolerance_rad` of its packed position.
    ///
    /// Joints which haven't reported a position yet count as not packed.
    pub fn all_joints_packed(&self, tolerance_rad: f64) -> bool {
        self.joints().all(|j| match j.current_position_rad {
            Some(p) => (p - j.packed_position_rad).abs() < tolerance_rad,
            None => false,
        })
    }

    /// True once every joint has reported a position at least once.
    pub fn all_joints_reported(&self) -> bool {
        self.joints().all(|j| j.current_position_rad.is_some())
    }

    pub fn joints_initialised(&self) -> bool {
        self.joints_initialised
    }

    /// Latch the joints initialised flag.
    ///
    /// Demands start from the measured positions so the first output doesn't command a jump.
    pub fn set_joints_initialised(&mut self) {
        if self.joints_initialised {
            return;
        }
        for joint in self.legs.iter_mut().flat_map(|l| l.joints.iter_mut()) {
            if let Some(p) = joint.current_position_rad {
                joint.desired_position_rad = p;
                joint.prev_desired_position_rad = p;
            }
        }
        self.joints_initialised = true;
    }

    /// Number of legs which are manual or moving into or out of manual control.
    pub fn count_manual_or_transitioning(&self) -> usize {
        self.legs
            .iter()
            .filter(|l| l.state.is_manual_or_transitioning())
            .count()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
