//! Runtime adjustment of the tunable parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, info};
use serde::Serialize;
use std::fmt;
use util::maths::{clamp, sign};

// Internal
use super::{AdjustableParamDef, AdjustableParamDefs, Context};
use crate::collab::Tuning;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

const NUM_ADJUSTABLE_PARAMS: usize = 8;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A parameter the operator can step up or down while running.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustableParameter {
    pub name: &'static str,
    pub current: f64,
    pub default: f64,
    pub min: f64,
    pub max: f64,

    /// Signed size of the next adjustment.
    pub step: f64,
}

/// The full set of adjustable parameters, in selection order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdjustableParams {
    params: [AdjustableParameter; NUM_ADJUSTABLE_PARAMS],
}

/// An adjustment that has been requested but not yet completed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PendingAdjustment {
    pub parameter: ParameterSelection,
    pub phase: AdjustPhase,
}

/// Parameter selection and the adjustment in progress.
#[derive(Debug, Clone)]
pub struct ParamAdjust {
    params: AdjustableParams,
    selection: ParameterSelection,
    pending: Option<PendingAdjustment>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ParameterSelection {
    NoSelection,
    StepFrequency,
    StepClearance,
    BodyClearance,
    LegSpanScale,
    VirtualMass,
    VirtualStiffness,
    VirtualDamping,
    ForceGain,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum AdjustPhase {
    /// The new value has yet to be computed and pushed to the collaborators.
    Apply,

    /// Waiting for the tips to step into the stance of the new value.
    Settle { progress: f64 },
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ParameterSelection {
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            0 => Some(Self::NoSelection),
            1 => Some(Self::StepFrequency),
            2 => Some(Self::StepClearance),
            3 => Some(Self::BodyClearance),
            4 => Some(Self::LegSpanScale),
            5 => Some(Self::VirtualMass),
            6 => Some(Self::VirtualStiffness),
            7 => Some(Self::VirtualDamping),
            8 => Some(Self::ForceGain),
            _ => None,
        }
    }

    /// Index into the adjustable parameters, `None` for no selection.
    fn index(self) -> Option<usize> {
        match self {
            Self::NoSelection => None,
            Self::StepFrequency => Some(0),
            Self::StepClearance => Some(1),
            Self::BodyClearance => Some(2),
            Self::LegSpanScale => Some(3),
            Self::VirtualMass => Some(4),
            Self::VirtualStiffness => Some(5),
            Self::VirtualDamping => Some(6),
            Self::ForceGain => Some(7),
        }
    }
}

impl fmt::Display for ParameterSelection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::NoSelection => "no",
            Self::StepFrequency => "step_frequency",
            Self::StepClearance => "step_clearance",
            Self::BodyClearance => "body_clearance",
            Self::LegSpanScale => "leg_span_scale",
            Self::VirtualMass => "virtual_mass",
            Self::VirtualStiffness => "virtual_stiffness",
            Self::VirtualDamping => "virtual_damping",
            Self::ForceGain => "force_gain",
        };
        write!(f, "{}", name)
    }
}

impl AdjustableParameter {
    fn from_def(name: &'static str, def: &AdjustableParamDef) -> Self {
        Self {
            name,
            current: def.default,
            default: def.default,
            min: def.min,
            max: def.max,
            step: def.step,
        }
    }

    /// Apply one step, keeping the value within its limits.
    fn apply_step(&mut self) -> f64 {
        self.current = clamp(self.current + self.step, self.min, self.max);
        self.current
    }
}

impl AdjustableParams {
    pub fn new(defs: &AdjustableParamDefs) -> Self {
        let [sf, sc, bc, ls, vm, vs, vd, fg] = defs.named();
        Self {
            params: [
                AdjustableParameter::from_def(sf.0, sf.1),
                AdjustableParameter::from_def(sc.0, sc.1),
                AdjustableParameter::from_def(bc.0, bc.1),
                AdjustableParameter::from_def(ls.0, ls.1),
                AdjustableParameter::from_def(vm.0, vm.1),
                AdjustableParameter::from_def(vs.0, vs.1),
                AdjustableParameter::from_def(vd.0, vd.1),
                AdjustableParameter::from_def(fg.0, fg.1),
            ],
        }
    }

    pub fn get(&self, selection: ParameterSelection) -> Option<&AdjustableParameter> {
        selection.index().map(|i| &self.params[i])
    }

    pub(crate) fn get_mut(
        &mut self,
        selection: ParameterSelection,
    ) -> Option<&mut AdjustableParameter> {
        match selection.index() {
            Some(i) => Some(&mut self.params[i]),
            None => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AdjustableParameter> {
        self.params.iter()
    }

    /// Units: hertz
    pub fn step_frequency(&self) -> f64 {
        self.params[0].current
    }

    /// Current values for the collaborators.
    pub fn tuning(&self) -> Tuning {
        let p = &self.params;
        Tuning {
            step_frequency: p[0].current,
            step_clearance: p[1].current,
            body_clearance: p[2].current,
            leg_span_scale: p[3].current,
            virtual_mass: p[4].current,
            virtual_stiffness: p[5].current,
            virtual_damping: p[6].current,
            force_gain: p[7].current,
        }
    }
}

impl ParamAdjust {
    pub fn new(defs: &AdjustableParamDefs) -> Self {
        Self {
            params: AdjustableParams::new(defs),
            selection: ParameterSelection::NoSelection,
            pending: None,
        }
    }

    pub fn params(&self) -> &AdjustableParams {
        &self.params
    }

    pub(crate) fn params_mut(&mut self) -> &mut AdjustableParams {
        &mut self.params
    }

    pub fn selection(&self) -> ParameterSelection {
        self.selection
    }

    pub fn pending(&self) -> Option<&PendingAdjustment> {
        self.pending.as_ref()
    }

    /// Change the selected parameter, returning true if it changed.
    pub fn select(&mut self, selection: ParameterSelection) -> bool {
        if selection == self.selection {
            return false;
        }
        self.selection = selection;
        true
    }

    /// Request a step of the selected parameter in direction `dir`.
    ///
    /// Ignored (returning false) if `dir` is zero, nothing is selected or an adjustment is already
    /// in progress.
    pub fn request(&mut self, dir: i8) -> bool {
        if dir == 0 || self.pending.is_some() {
            return false;
        }

        let selection = self.selection;
        let param = match self.params.get_mut(selection) {
            Some(p) => p,
            None => return false,
        };

        if sign(param.step) != sign(dir as f64) {
            param.step = -param.step;
        }

        self.pending = Some(PendingAdjustment {
            parameter: selection,
            phase: AdjustPhase::Apply,
        });
        true
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Progress the pending adjustment once the walker has stopped.
pub(crate) fn step(ctx: &mut Context) {
    if !ctx.require_stationary("adjust parameters") {
        return;
    }

    let pending = match ctx.param_adjust.pending {
        Some(p) => p,
        None => return,
    };

    match pending.phase {
        AdjustPhase::Apply => {
            let param = match ctx.param_adjust.params_mut().get_mut(pending.parameter) {
                Some(p) => p,
                None => {
                    ctx.param_adjust.pending = None;
                    return;
                }
            };

            let value = param.apply_step();
            info!(
                "Attempting to adjust '{}' parameter to {:.4} (default: {}, min: {}, max: {})...",
                param.name, value, param.default, param.min, param.max
            );

            let tuning = ctx.param_adjust.params.tuning();
            ctx.collab.impedance.init(&tuning);
            ctx.collab.walker.apply_tuning(&tuning);

            ctx.param_adjust.pending = Some(PendingAdjustment {
                phase: AdjustPhase::Settle { progress: 0.0 },
                ..pending
            });
        }
        AdjustPhase::Settle { .. } => {
            let progress = ctx.collab.poser.step_to_new_stance(&mut ctx.model);

            if progress >= 1.0 {
                if let Some(p) = ctx.param_adjust.params.get(pending.parameter) {
                    info!("Parameter '{}' set to {:.4}", p.name, p.current);
                }
                ctx.param_adjust.pending = None;
            } else {
                debug!("Stepping to new stance ({:.0}%)", progress * 100.0);
                ctx.param_adjust.pending = Some(PendingAdjustment {
                    phase: AdjustPhase::Settle { progress },
                    ..pending
                });
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
    use crate::state_ctrl::{context::test::test_context, params::test::test_params};

    #[test]
    fn test_selection_codes() {
        assert_eq!(
            ParameterSelection::from_code(0),
            Some(ParameterSelection::NoSelection)
        );
        assert_eq!(
            ParameterSelection::from_code(8),
            Some(ParameterSelection::ForceGain)
        );
        assert_eq!(ParameterSelection::from_code(9), None);
    }

    #[test]
    fn test_params_from_defs() {
        let params = AdjustableParams::new(&test_params().adjustable);
        assert_eq!(params.iter().count(), NUM_ADJUSTABLE_PARAMS);
        assert!(params.get(ParameterSelection::NoSelection).is_none());

        let bc = params.get(ParameterSelection::BodyClearance).unwrap();
        assert_eq!(bc.name, "body_clearance");
        assert_eq!(bc.current, 0.1);

        assert_eq!(params.tuning(), test_params().initial_tuning());
    }

    #[test]
    fn test_request() {
        let mut pa = ParamAdjust::new(&test_params().adjustable);

        // Nothing selected
        assert!(!pa.request(1));

        pa.select(ParameterSelection::StepFrequency);
        assert!(!pa.request(0));

        assert!(pa.request(-1));
        assert_eq!(
            pa.params().get(ParameterSelection::StepFrequency).unwrap().step,
            -0.5
        );

        // Already pending
        assert!(!pa.request(1));
        assert_eq!(
            pa.pending().unwrap().parameter,
            ParameterSelection::StepFrequency
        );
    }

    #[test]
    fn test_adjust_and_settle() {
        let mut ctx = test_context();
        ctx.param_adjust.select(ParameterSelection::StepFrequency);
        assert!(ctx.param_adjust.request(1));

        step(&mut ctx);
        assert_eq!(ctx.param_adjust.params().step_frequency(), 2.5);
        assert!(matches!(
            ctx.param_adjust.pending().unwrap().phase,
            AdjustPhase::Settle { .. }
        ));

        // New stance takes 2 cycles
        step(&mut ctx);
        assert!(ctx.param_adjust.pending().is_some());
        step(&mut ctx);
        assert!(ctx.param_adjust.pending().is_none());
        assert_eq!(ctx.param_adjust.params().step_frequency(), 2.5);
    }

    #[test]
    fn test_adjust_clamps() {
        let mut ctx = test_context();
        ctx.param_adjust.select(ParameterSelection::VirtualDamping);

        for _ in 0..5 {
            assert!(ctx.param_adjust.request(1));
            while ctx.param_adjust.pending().is_some() {
                step(&mut ctx);
            }
        }

        let vd = ctx
            .param_adjust
            .params()
            .get(ParameterSelection::VirtualDamping)
            .unwrap();
        assert_eq!(vd.current, vd.max);
    }
}
