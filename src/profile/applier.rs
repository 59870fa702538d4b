//! Applies profile remaps and macro transducers between the input bus and
//! the target-side report synthesis.
use super::{Activation, MacroDef, MacroKind, Profile, Remap, SequenceStep, StepAction};
use crate::state::{Buttons, ControllerState};

#[derive(Debug, Clone)]
struct Segment {
    mask: u32,
    start_ms: u64,
    end_ms: u64,
}

/// One in-flight run of a sequence macro, compiled into a timeline of
/// button assertions relative to its start.
#[derive(Debug, Clone)]
struct SequenceRun {
    started_ms: u64,
    segments: Vec<Segment>,
    total_ms: u64,
}

impl SequenceRun {
    fn compile(steps: &[SequenceStep], started_ms: u64) -> Self {
        let mut t = 0;
        let mut segments = Vec::new();
        for step in steps {
            match step.action {
                StepAction::Press | StepAction::Hold => {
                    if let Some(button) = step.button {
                        segments.push(Segment {
                            mask: button.0,
                            start_ms: t,
                            end_ms: t + step.duration_ms,
                        });
                    }
                    t += step.duration_ms;
                }
                StepAction::Wait | StepAction::Release => {
                    t += step.duration_ms;
                }
            }
        }
        Self {
            started_ms,
            segments,
            total_ms: t,
        }
    }
}

#[derive(Debug, Default)]
struct MacroState {
    /// Edge-latched gate for on_press/on_release activation.
    gate_open: bool,
    /// Per-macro latch for toggle activation.
    activation_latch: bool,
    /// Whether the gate was open on the previous call, to anchor phase.
    gate_was_open: bool,
    /// When the gate last opened; rapid-fire phase is measured from here.
    gate_opened_ms: u64,
    /// Latched output bit for the toggle macro kind.
    toggle_latch: bool,
    runs: Vec<SequenceRun>,
}

/// Stateful profile applier. Remaps are pure; macros carry latches and
/// sequence queues across calls, advanced by the caller's clock.
pub struct Applier {
    profile: Profile,
    macros: Vec<MacroState>,
    prev_buttons: Buttons,
}

impl Applier {
    pub fn new(profile: Profile) -> Self {
        let macros = profile.macros.iter().map(|_| MacroState::default()).collect();
        Self {
            profile,
            macros,
            prev_buttons: Buttons::default(),
        }
    }

    /// Transform one input snapshot. `now_ms` advances macro time; calls
    /// are expected with monotonically non-decreasing timestamps.
    pub fn apply(&mut self, input: &ControllerState, now_ms: u64) -> ControllerState {
        let mut out = *input;
        out.buttons = apply_remaps(&self.profile.remaps, input.buttons);

        let prev = self.prev_buttons;
        self.prev_buttons = input.buttons;

        for (def, st) in self.profile.macros.iter().zip(self.macros.iter_mut()) {
            run_macro(def, st, input.buttons, prev, now_ms, &mut out.buttons);
        }

        out
    }
}

/// Substitute buttons according to the remap table. Conflicting writes to
/// the same target are resolved by profile order; a losing entry takes no
/// effect at all.
fn apply_remaps(remaps: &[Remap], input: Buttons) -> Buttons {
    if remaps.is_empty() {
        return input;
    }

    let mut written: u32 = 0;
    let mut value: u32 = 0;
    let mut consumed: u32 = 0;
    for remap in remaps {
        let source = remap.source.0;
        let target = remap.target.0;
        let pairs: &[(u32, u32)] = if remap.bidirectional {
            &[(source, target), (target, source)]
        } else {
            &[(source, target)]
        };
        for &(from, to) in pairs {
            if written & to != 0 {
                continue;
            }
            written |= to;
            consumed |= from;
            if input.0 & from != 0 {
                value |= to;
            }
        }
    }

    Buttons((input.0 & !consumed & !written) | value)
}

fn run_macro(
    def: &MacroDef,
    st: &mut MacroState,
    buttons: Buttons,
    prev: Buttons,
    now_ms: u64,
    out: &mut Buttons,
) {
    let held = buttons.contains(def.trigger.0);
    let was_held = prev.contains(def.trigger.0);
    let modifier_held = def.modifier.map_or(true, |m| buttons.contains(m.0));
    let rising = held && !was_held && modifier_held;
    let falling = !held && was_held && modifier_held;

    // Whether the activation predicate holds on this call. Turbo is
    // special-cased: its predicate is always "trigger held".
    let gate = if matches!(def.kind, MacroKind::Turbo { .. }) {
        held && modifier_held
    } else {
        match def.activation {
            Activation::OnHold => held && modifier_held,
            Activation::OnPress => {
                if rising {
                    st.gate_open = true;
                }
                if !held {
                    st.gate_open = false;
                }
                st.gate_open
            }
            Activation::OnRelease => {
                // The gate opens on a qualifying release and closes again
                // when the trigger is next pressed.
                if held && !was_held {
                    st.gate_open = false;
                }
                if falling {
                    st.gate_open = true;
                }
                st.gate_open
            }
            Activation::Toggle => {
                if rising {
                    st.activation_latch = !st.activation_latch;
                }
                st.activation_latch
            }
        }
    };

    if gate && !st.gate_was_open {
        st.gate_opened_ms = now_ms;
    }
    st.gate_was_open = gate;

    match &def.kind {
        MacroKind::RapidFire { target, rate } | MacroKind::Turbo { target, rate } => {
            if gate && *rate > 0.0 {
                let period = 1000.0 / rate;
                let phase = (now_ms - st.gate_opened_ms) as f64 % period;
                if phase < period / 2.0 {
                    out.0 |= target.0;
                }
            }
        }
        MacroKind::Toggle { target } => {
            let edge = match def.activation {
                Activation::OnRelease => falling,
                Activation::Toggle => rising && gate,
                _ => rising,
            };
            if edge {
                st.toggle_latch = !st.toggle_latch;
            }
            if st.toggle_latch {
                out.0 |= target.0;
            }
        }
        MacroKind::Sequence { steps } => {
            let edge = match def.activation {
                Activation::OnRelease => falling,
                Activation::Toggle => rising && gate,
                _ => rising,
            };
            if edge {
                st.runs.push(SequenceRun::compile(steps, now_ms));
            }
            st.runs
                .retain(|run| now_ms < run.started_ms + run.total_ms);
            for run in &st.runs {
                let elapsed = now_ms - run.started_ms;
                for segment in &run.segments {
                    if elapsed >= segment.start_ms && elapsed < segment.end_ms {
                        out.0 |= segment.mask;
                    }
                }
            }
        }
    }
}
