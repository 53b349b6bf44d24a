//! Well-formedness of Frame-IR states
//!
//! Same shape as the Location-IR checker. Each suspended caller must also
//! carry a return address into its own code that the oracle admits for
//! the call it is suspended in.

use super::program::FrameGenv;
use super::retaddr::ReturnAddressOracle;
use super::state::State;
use crate::error::WfViolation;
use crate::machine::{FunctionSig, Val};

type WfResult = std::result::Result<(), WfViolation>;

pub fn check_state<O: ReturnAddressOracle + ?Sized>(
    genv: &FrameGenv,
    oracle: &O,
    state: &State,
) -> WfResult {
    for (depth, frame) in state.stack().frames().iter().enumerate() {
        let f = genv
            .find_internal(frame.func)
            .ok_or(WfViolation::NotInternal { func: frame.func })?;
        if f.is_leaf() {
            return Err(WfViolation::LeafCaller {
                depth,
                func: frame.func,
            });
        }
        let resume = frame.resume;
        if resume > f.code.len() {
            return Err(WfViolation::ResumeOutsideBody {
                depth,
                func: frame.func,
                resume: resume.to_string(),
            });
        }
        if resume == 0 || !f.code[resume - 1].is_call() {
            return Err(WfViolation::ResumeNotAfterCall {
                depth,
                func: frame.func,
                resume: resume.to_string(),
            });
        }
        let admitted = match frame.ra {
            Val::Ptr(b, ofs) => b == frame.func && oracle.admits(frame.func, f, resume, ofs),
            _ => false,
        };
        if !admitted {
            return Err(WfViolation::ReturnAddressNotAdmitted {
                depth,
                func: frame.func,
                ra: frame.ra.to_string(),
            });
        }
    }
    match state {
        State::Running { func, pc, .. } => {
            let f = genv
                .find_internal(*func)
                .ok_or(WfViolation::NotInternal { func: *func })?;
            if *pc > f.code.len() {
                return Err(WfViolation::PointOutsideBody {
                    func: *func,
                    point: pc.to_string(),
                });
            }
            Ok(())
        }
        State::Calling { callee, .. } => {
            if genv.find_funct_ptr(*callee).is_none() {
                return Err(WfViolation::UnknownCallee { callee: *callee });
            }
            Ok(())
        }
        State::Returned { .. } => Ok(()),
    }
}

/// Checks the successor of a transition, and that the transition pushed or
/// popped at most one frame
pub fn check_step<O: ReturnAddressOracle + ?Sized>(
    genv: &FrameGenv,
    oracle: &O,
    before: &State,
    after: &State,
) -> WfResult {
    let (b, a) = (before.stack().len(), after.stack().len());
    if a.abs_diff(b) > 1 {
        return Err(WfViolation::StackShape {
            before: b,
            after: a,
        });
    }
    check_state(genv, oracle, after)
}
