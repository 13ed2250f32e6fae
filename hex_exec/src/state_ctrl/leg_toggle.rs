//! Moving legs between walking and manual control
//!
//! The operator has two leg slots, primary and secondary, each of which can select one leg and
//! drive its tip when the leg is in manual control. A toggle moves the selected leg into or out of
//! manual control, posing the body over the remaining legs while it does so.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use nalgebra::Vector3;
use serde::Serialize;
use std::fmt;

// Internal
use super::{Context, MAX_MANUAL_LEGS};
use crate::{
    collab::{ManualTipInput, PoseResetMode},
    model::{LegId, LegState, Model},
};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// One operator leg slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegSlot {
    /// Selected leg, if any.
    pub leg: Option<LegId>,

    /// Leg state last requested through this slot.
    pub requested: LegState,

    pub toggle_pending: bool,

    /// Tip velocity input for the selected leg when manual.
    ///
    /// Units: meters/second
    pub tip_velocity_ms: Vector3<f64>,
}

/// The primary and secondary leg slots.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LegSlots {
    primary: LegSlot,
    secondary: LegSlot,
}

/// A leg moving between walking and manual control.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LegTransition {
    pub slot: SlotId,
    pub leg: LegId,
    pub target: LegState,
    pub progress: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SlotId {
    Primary,
    Secondary,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SlotId {
    pub fn other(self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

impl Default for LegSlot {
    fn default() -> Self {
        Self {
            leg: None,
            requested: LegState::Walking,
            toggle_pending: false,
            tip_velocity_ms: Vector3::zeros(),
        }
    }
}

impl LegSlots {
    pub fn get(&self, id: SlotId) -> &LegSlot {
        match id {
            SlotId::Primary => &self.primary,
            SlotId::Secondary => &self.secondary,
        }
    }

    pub fn get_mut(&mut self, id: SlotId) -> &mut LegSlot {
        match id {
            SlotId::Primary => &mut self.primary,
            SlotId::Secondary => &mut self.secondary,
        }
    }

    pub fn any_toggle_pending(&self) -> bool {
        self.primary.toggle_pending || self.secondary.toggle_pending
    }

    /// Slot whose toggle is serviced next, primary first.
    pub fn pending_slot(&self) -> Option<SlotId> {
        if self.primary.toggle_pending {
            Some(SlotId::Primary)
        } else if self.secondary.toggle_pending {
            Some(SlotId::Secondary)
        } else {
            None
        }
    }

    pub(crate) fn clear_toggles(&mut self) {
        self.primary.toggle_pending = false;
        self.secondary.toggle_pending = false;
    }

    /// Tip velocity inputs of the selected legs which are in manual control.
    pub fn manual_inputs(&self, model: &Model) -> Vec<ManualTipInput> {
        [&self.primary, &self.secondary]
            .iter()
            .filter_map(|slot| match slot.leg {
                Some(leg) if model.leg(leg).state == LegState::Manual => Some(ManualTipInput {
                    leg,
                    tip_velocity_ms: slot.tip_velocity_ms,
                }),
                _ => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Progress the pending leg toggle once the walker has stopped.
pub(crate) fn step(ctx: &mut Context) {
    if !ctx.require_stationary("transition leg state") {
        return;
    }

    let slot_id = match ctx.slots.pending_slot() {
        Some(s) => s,
        None => return,
    };

    let leg_id = match ctx.slots.get(slot_id).leg {
        Some(l) => l,
        None => {
            warn!("No leg selected for {} control, cannot toggle", slot_id);
            ctx.slots.get_mut(slot_id).toggle_pending = false;
            return;
        }
    };

    ctx.collab.poser.calculate_default_pose(&ctx.model);

    let leg_state = ctx.model.leg(leg_id).state;
    match leg_state {
        LegState::Walking => {
            if ctx.model.count_manual_or_transitioning() < MAX_MANUAL_LEGS {
                info!(
                    "{} ({}) transitioning to MANUAL state...",
                    ctx.model.leg(leg_id).name,
                    leg_id
                );
                ctx.model.leg_mut(leg_id).state = LegState::WalkingToManual;
                ctx.leg_transition = Some(LegTransition {
                    slot: slot_id,
                    leg: leg_id,
                    target: LegState::Manual,
                    progress: 0.0,
                });
            } else {
                warn!(
                    "Only allowed to have {} legs manually manipulated at one time",
                    MAX_MANUAL_LEGS
                );
                ctx.slots.clear_toggles();
                ctx.slots.get_mut(slot_id).requested = LegState::Walking;
            }
        }
        LegState::Manual => {
            info!(
                "{} ({}) transitioning to WALKING state...",
                ctx.model.leg(leg_id).name,
                leg_id
            );
            ctx.model.leg_mut(leg_id).state = LegState::ManualToWalking;
            ctx.leg_transition = Some(LegTransition {
                slot: slot_id,
                leg: leg_id,
                target: LegState::Walking,
                progress: 0.0,
            });
        }
        LegState::WalkingToManual | LegState::ManualToWalking => {
            ctx.collab
                .poser
                .set_pose_reset_mode(PoseResetMode::ImmediateAllReset);

            let progress = ctx.collab.poser.pose_for_leg_manipulation(&mut ctx.model);

            if ctx.params.dynamic_stiffness {
                ctx.collab
                    .impedance
                    .update_leg_stiffness(leg_id, progress, &mut ctx.model);
            }

            if let Some(t) = ctx.leg_transition.as_mut() {
                t.progress = progress;
            }

            if progress >= 1.0 {
                let new_state = if leg_state == LegState::WalkingToManual {
                    ctx.manual_leg_count += 1;
                    LegState::Manual
                } else {
                    ctx.manual_leg_count = ctx.manual_leg_count.saturating_sub(1);
                    LegState::Walking
                };

                let leg = ctx.model.leg_mut(leg_id);
                leg.state = new_state;
                info!("{} ({}) set to state {:?}", leg.name, leg_id, new_state);

                ctx.slots.clear_toggles();
                ctx.collab.poser.set_pose_reset_mode(PoseResetMode::NoReset);
                ctx.leg_transition = None;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::state_ctrl::context::test::test_context;

    fn request(ctx: &mut Context, slot: SlotId, leg: usize, state: LegState) {
        let s = ctx.slots.get_mut(slot);
        s.leg = LegId::new(leg);
        s.requested = state;
        s.toggle_pending = true;
    }

    #[test]
    fn test_pending_slot_order() {
        let mut slots = LegSlots::default();
        assert_eq!(slots.pending_slot(), None);

        slots.get_mut(SlotId::Secondary).toggle_pending = true;
        assert_eq!(slots.pending_slot(), Some(SlotId::Secondary));

        slots.get_mut(SlotId::Primary).toggle_pending = true;
        assert_eq!(slots.pending_slot(), Some(SlotId::Primary));

        slots.clear_toggles();
        assert!(!slots.any_toggle_pending());
    }

    #[test]
    fn test_toggle_to_manual_and_back() {
        let mut ctx = test_context();
        let leg = LegId::new(2).unwrap();
        request(&mut ctx, SlotId::Primary, 2, LegState::Manual);

        step(&mut ctx);
        assert_eq!(ctx.model.leg(leg).state, LegState::WalkingToManual);
        assert_eq!(ctx.leg_transition.unwrap().target, LegState::Manual);

        // Leg manipulation takes 2 cycles
        step(&mut ctx);
        assert_eq!(ctx.model.leg(leg).state, LegState::WalkingToManual);
        assert_eq!(
            ctx.collab.poser.pose_reset_mode(),
            PoseResetMode::ImmediateAllReset
        );
        step(&mut ctx);
        assert_eq!(ctx.model.leg(leg).state, LegState::Manual);
        assert_eq!(ctx.manual_leg_count, 1);
        assert!(!ctx.slots.any_toggle_pending());
        assert!(ctx.leg_transition.is_none());
        assert_eq!(ctx.collab.poser.pose_reset_mode(), PoseResetMode::NoReset);

        request(&mut ctx, SlotId::Primary, 2, LegState::Walking);
        for _ in 0..3 {
            step(&mut ctx);
        }
        assert_eq!(ctx.model.leg(leg).state, LegState::Walking);
        assert_eq!(ctx.manual_leg_count, 0);
    }

    #[test]
    fn test_manual_leg_limit() {
        let mut ctx = test_context();
        ctx.model.leg_mut(LegId::new(3).unwrap()).state = LegState::Manual;
        ctx.model.leg_mut(LegId::new(5).unwrap()).state = LegState::WalkingToManual;

        request(&mut ctx, SlotId::Primary, 0, LegState::Manual);
        ctx.slots.get_mut(SlotId::Secondary).toggle_pending = true;
        step(&mut ctx);

        assert_eq!(ctx.model.leg(LegId::new(0).unwrap()).state, LegState::Walking);
        assert!(!ctx.slots.any_toggle_pending());
        assert_eq!(ctx.slots.get(SlotId::Primary).requested, LegState::Walking);
        assert!(ctx.model.count_manual_or_transitioning() <= MAX_MANUAL_LEGS);
    }

    #[test]
    fn test_manual_inputs() {
        let mut ctx = test_context();
        ctx.model.leg_mut(LegId::new(1).unwrap()).state = LegState::Manual;

        let p = ctx.slots.get_mut(SlotId::Primary);
        p.leg = LegId::new(1);
        p.tip_velocity_ms = Vector3::new(0.0, 0.0, 0.1);
        ctx.slots.get_mut(SlotId::Secondary).leg = LegId::new(4);

        let inputs = ctx.slots.manual_inputs(&ctx.model);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].leg, LegId::new(1).unwrap());
        assert_eq!(inputs[0].tip_velocity_ms.z, 0.1);
    }
}
