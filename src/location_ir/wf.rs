//! Well-formedness of Location-IR states
//!
//! Every suspended caller is an internal function that contains a call,
//! and resumes right after one of its call instructions. The running
//! function's program point lies inside its body. These properties hold
//! at entry and every transition preserves them; the checker is meant for
//! tests and for drivers run with invariant checking on.

use super::program::LocGenv;
use super::state::{ProgramPoint, State};
use crate::error::WfViolation;
use crate::machine::FunctionSig;

type WfResult = std::result::Result<(), WfViolation>;

pub fn check_state(genv: &LocGenv, state: &State) -> WfResult {
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
        let (node, index) = frame.resume;
        let resume = || format!("node {} instr {}", node, index);
        let block = match f.block_at(node) {
            Some(b) if index <= b.len() => b,
            _ => {
                return Err(WfViolation::ResumeOutsideBody {
                    depth,
                    func: frame.func,
                    resume: resume(),
                })
            }
        };
        if index == 0 || !block[index - 1].is_call() {
            return Err(WfViolation::ResumeNotAfterCall {
                depth,
                func: frame.func,
                resume: resume(),
            });
        }
    }
    match state {
        State::Running { func, point, .. } => {
            let f = genv
                .find_internal(*func)
                .ok_or(WfViolation::NotInternal { func: *func })?;
            // Entering a missing block is a stuck step, not an escape
            if let ProgramPoint::InBlock(node, index) = point {
                if !f.block_at(*node).map_or(false, |b| *index <= b.len()) {
                    return Err(WfViolation::PointOutsideBody {
                        func: *func,
                        point: point.to_string(),
                    });
                }
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
pub fn check_step(genv: &LocGenv, before: &State, after: &State) -> WfResult {
    let (b, a) = (before.stack().len(), after.stack().len());
    if a.abs_diff(b) > 1 {
        return Err(WfViolation::StackShape {
            before: b,
            after: a,
        });
    }
    check_state(genv, after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conventions::{Callee, Locset};
    use crate::location_ir::state::{CallStack, StackFrame};
    use crate::location_ir::{LocFunction, LocInstr, LocProgram};
    use crate::machine::{BlockId, Mem, Operation, MReg, Signature, Val};

    fn program() -> LocProgram {
        let leaf = LocFunction::new(Signature::main(), 0, 1).block(
            1,
            vec![LocInstr::Op(Operation::IntConst(1), vec![], MReg::AX), LocInstr::Return],
        );
        let caller = LocFunction::new(Signature::main(), 0, 1).block(
            1,
            vec![
                LocInstr::Call(Signature::main(), Callee::Symbol("leaf".into())),
                LocInstr::Return,
            ],
        );
        LocProgram::new("main")
            .function("leaf", leaf)
            .function("main", caller)
    }

    fn returned_with(frame: StackFrame) -> State {
        let mut stack = CallStack::new();
        stack.push(frame);
        State::Returned {
            stack,
            locs: Locset::new(),
            mem: Mem::new(),
        }
    }

    #[test]
    fn test_frame_after_call_is_accepted() {
        let genv = LocGenv::new(&program()).unwrap();
        let s = returned_with(StackFrame {
            func: BlockId(2),
            sp: Val::Undef,
            locs: Locset::new(),
            resume: (1, 1),
        });
        assert_eq!(check_state(&genv, &s), Ok(()));
    }

    #[test]
    fn test_leaf_caller_is_rejected() {
        let genv = LocGenv::new(&program()).unwrap();
        let s = returned_with(StackFrame {
            func: BlockId(1),
            sp: Val::Undef,
            locs: Locset::new(),
            resume: (1, 1),
        });
        assert!(matches!(
            check_state(&genv, &s),
            Err(WfViolation::LeafCaller { depth: 0, .. })
        ));
    }

    #[test]
    fn test_resume_not_after_call_is_rejected() {
        let genv = LocGenv::new(&program()).unwrap();
        let s = returned_with(StackFrame {
            func: BlockId(2),
            sp: Val::Undef,
            locs: Locset::new(),
            resume: (1, 2),
        });
        assert!(matches!(
            check_state(&genv, &s),
            Err(WfViolation::ResumeNotAfterCall { .. })
        ));
        let s = returned_with(StackFrame {
            func: BlockId(2),
            sp: Val::Undef,
            locs: Locset::new(),
            resume: (9, 1),
        });
        assert!(matches!(
            check_state(&genv, &s),
            Err(WfViolation::ResumeOutsideBody { .. })
        ));
    }
}
