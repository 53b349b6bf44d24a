//! # Driver
//!
//! Runs either interpreter to completion behind the [`Semantics`] trait:
//! repeated `step` until the state is final, stuck, or the step budget
//! runs out. [`run_intercepting`] resolves external calls itself through
//! `at_external`/`after_external` instead of the interpreter's service.

use serde::{Deserialize, Serialize};

use crate::error::WfViolation;
use crate::frame_ir::{self, FrameSemantics, ReturnAddressOracle};
use crate::location_ir::{self, LocationSemantics};
use crate::machine::{ExternalCalls, ExternalFunction, ExternalOutcome, Mem, Trace, Val};
use crate::{Error, Result};

/// Entry/step/external/final interface shared by both interpreters
pub trait Semantics {
    type State: Clone + std::fmt::Debug;

    fn entry(&self, mem: Mem, fptr: Val, args: &[Val]) -> Result<Self::State>;

    fn step(&self, state: Self::State) -> Option<(Trace, Self::State)>;

    fn at_external(&self, state: &Self::State) -> Option<(ExternalFunction, Vec<Val>)>;

    fn after_external(&self, result: Option<Val>, state: Self::State, mem: Mem) -> Option<Self::State>;

    fn is_final(&self, state: &Self::State) -> Option<i32>;

    /// Integer result register of a state returned to the outermost caller,
    /// whatever its contents
    fn returned_value(&self, state: &Self::State) -> Option<Val>;

    fn mem<'s>(&self, state: &'s Self::State) -> &'s Mem;

    /// Well-formedness of a transition `before -> after`
    fn check_step(&self, before: &Self::State, after: &Self::State) -> std::result::Result<(), WfViolation>;
}

impl<'g, X: ExternalCalls> Semantics for LocationSemantics<'g, X> {
    type State = location_ir::State;

    fn entry(&self, mem: Mem, fptr: Val, args: &[Val]) -> Result<Self::State> {
        LocationSemantics::entry(self, mem, fptr, args)
    }

    fn step(&self, state: Self::State) -> Option<(Trace, Self::State)> {
        LocationSemantics::step(self, state)
    }

    fn at_external(&self, state: &Self::State) -> Option<(ExternalFunction, Vec<Val>)> {
        LocationSemantics::at_external(self, state)
    }

    fn after_external(&self, result: Option<Val>, state: Self::State, mem: Mem) -> Option<Self::State> {
        LocationSemantics::after_external(self, result, state, mem)
    }

    fn is_final(&self, state: &Self::State) -> Option<i32> {
        LocationSemantics::is_final(self, state)
    }

    fn returned_value(&self, state: &Self::State) -> Option<Val> {
        LocationSemantics::returned_value(self, state)
    }

    fn mem<'s>(&self, state: &'s Self::State) -> &'s Mem {
        state.mem()
    }

    fn check_step(&self, before: &Self::State, after: &Self::State) -> std::result::Result<(), WfViolation> {
        location_ir::wf::check_step(self.genv(), before, after)
    }
}

impl<'g, X: ExternalCalls, O: ReturnAddressOracle> Semantics for FrameSemantics<'g, X, O> {
    type State = frame_ir::State;

    fn entry(&self, mem: Mem, fptr: Val, args: &[Val]) -> Result<Self::State> {
        FrameSemantics::entry(self, mem, fptr, args)
    }

    fn step(&self, state: Self::State) -> Option<(Trace, Self::State)> {
        FrameSemantics::step(self, state)
    }

    fn at_external(&self, state: &Self::State) -> Option<(ExternalFunction, Vec<Val>)> {
        FrameSemantics::at_external(self, state)
    }

    fn after_external(&self, result: Option<Val>, state: Self::State, mem: Mem) -> Option<Self::State> {
        FrameSemantics::after_external(self, result, state, mem)
    }

    fn is_final(&self, state: &Self::State) -> Option<i32> {
        FrameSemantics::is_final(self, state)
    }

    fn returned_value(&self, state: &Self::State) -> Option<Val> {
        FrameSemantics::returned_value(self, state)
    }

    fn mem<'s>(&self, state: &'s Self::State) -> &'s Mem {
        state.mem()
    }

    fn check_step(&self, before: &Self::State, after: &Self::State) -> std::result::Result<(), WfViolation> {
        frame_ir::wf::check_step(self.genv(), self.oracle(), before, after)
    }
}

/// Driver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimOptions {
    /// Steps after which the run is abandoned
    pub max_steps: u64,
    /// Run the well-formedness checker on every transition
    pub check_invariants: bool,
    /// Keep the events of the run in the outcome
    pub collect_trace: bool,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            check_invariants: false,
            collect_trace: true,
        }
    }
}

impl SimOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_steps(mut self, limit: u64) -> Self {
        self.max_steps = limit;
        self
    }

    pub fn check_invariants(mut self, on: bool) -> Self {
        self.check_invariants = on;
        self
    }

    pub fn collect_trace(mut self, on: bool) -> Self {
        self.collect_trace = on;
        self
    }

    /// Parse options from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidOptions(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidOptions(e.to_string()))
    }
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Integer the program returned
    pub result: i32,
    /// Transitions taken
    pub steps: u64,
    /// Observable events, in order (empty when not collected)
    pub trace: Trace,
}

/// Runs `state` to a final state
pub fn run<S: Semantics>(sem: &S, state: S::State, options: &SimOptions) -> Result<Outcome> {
    drive(sem, state, options, None)
}

/// Handler resolving an intercepted external call
pub type ExternalHandler<'h> =
    dyn FnMut(&ExternalFunction, &[Val], Mem) -> Option<ExternalOutcome> + 'h;

/// Runs `state` to a final state, resolving every external function call
/// with `handler` rather than the interpreter's own service
pub fn run_intercepting<S: Semantics>(
    sem: &S,
    state: S::State,
    options: &SimOptions,
    handler: &mut ExternalHandler<'_>,
) -> Result<Outcome> {
    drive(sem, state, options, Some(handler))
}

fn drive<S: Semantics>(
    sem: &S,
    mut state: S::State,
    options: &SimOptions,
    mut handler: Option<&mut ExternalHandler<'_>>,
) -> Result<Outcome> {
    let mut steps = 0u64;
    let mut trace = Trace::new();
    loop {
        if let Some(result) = sem.is_final(&state) {
            tracing::debug!("program returned {} after {} step(s)", result, steps);
            return Ok(Outcome {
                result,
                steps,
                trace,
            });
        }
        if steps >= options.max_steps {
            tracing::warn!("step limit of {} reached", options.max_steps);
            return Err(Error::StepLimit {
                limit: options.max_steps,
            });
        }
        let before = options.check_invariants.then(|| state.clone());

        let next = match (handler.as_mut(), sem.at_external(&state)) {
            (Some(handler), Some((ef, args))) => {
                let mem = sem.mem(&state).clone();
                match handler(&ef, &args, mem) {
                    Some(out) => sem
                        .after_external(Some(out.result), state, out.mem)
                        .map(|s| (out.trace, s)),
                    None => None,
                }
            }
            _ => {
                let value = sem.returned_value(&state);
                match sem.step(state) {
                    Some(next) => Some(next),
                    None => {
                        return Err(match value {
                            Some(v) => Error::InvalidResult {
                                value: v.to_string(),
                            },
                            None => Error::Stuck { steps },
                        })
                    }
                }
            }
        };
        let Some((events, next)) = next else {
            return Err(Error::Stuck { steps });
        };
        steps += 1;

        if let Some(before) = before {
            sem.check_step(&before, &next)
                .map_err(|v| Error::InvariantViolation {
                    steps,
                    message: v.to_string(),
                })?;
        }
        if options.collect_trace {
            trace.extend(events);
        }
        state = next;
    }
}
