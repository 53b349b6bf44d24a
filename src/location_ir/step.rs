//! Location-IR transition relation
//!
//! [`LocationSemantics`] binds a global environment and an external-call
//! service. `step` consumes a state and yields the unique successor with
//! the events it emits, or `None` when the state is stuck.

use super::instruction::{LocInstr, Node};
use super::program::{LocFunction, LocGenv};
use super::state::{CallStack, ProgramPoint, StackFrame, State};
use crate::conventions::{
    call_regs, check_entry_arguments, destroyed_at_function_entry, destroyed_by_builtin,
    destroyed_by_cond, destroyed_by_getstack, destroyed_by_jumptable, destroyed_by_load,
    destroyed_by_op, destroyed_by_setstack, destroyed_by_store, eval_builtin_args,
    extcall_arguments, free_frame, loc_result, make_arguments, read_result, return_regs,
    undef_caller_save_regs, Callee, Loc, Locset,
};
use crate::machine::{
    eval_addressing, eval_condition, eval_operation, BlockId, ExternalCalls, ExternalFunction,
    FunDef, HostCalls, MReg, Mem, Signature, SymbolResolver, Trace, Val,
};
use crate::{Error, Result};

fn stuck<T>(reason: std::fmt::Arguments<'_>) -> Option<T> {
    tracing::debug!("location-ir state is stuck: {}", reason);
    None
}

fn running(
    stack: CallStack,
    func: BlockId,
    sp: Val,
    point: ProgramPoint,
    locs: Locset,
    mem: Mem,
) -> Option<(Trace, State)> {
    Some((
        Vec::new(),
        State::Running {
            stack,
            func,
            sp,
            point,
            locs,
            mem,
        },
    ))
}

/// Reference interpreter of the Location-IR
#[derive(Debug, Clone)]
pub struct LocationSemantics<'g, X = HostCalls> {
    genv: &'g LocGenv,
    externals: X,
}

impl<'g, X: ExternalCalls> LocationSemantics<'g, X> {
    pub fn new(genv: &'g LocGenv, externals: X) -> Self {
        Self { genv, externals }
    }

    pub fn genv(&self) -> &'g LocGenv {
        self.genv
    }

    /// Initial state: a call of `fptr` from the outermost pseudo-caller,
    /// whose location state holds `args` in the argument locations
    pub fn entry(&self, mem: Mem, fptr: Val, args: &[Val]) -> Result<State> {
        self.genv.check_memory(&mem)?;
        let (callee, fd) = self
            .genv
            .find_funct(fptr)
            .ok_or_else(|| Error::NotAFunction(fptr.to_string()))?;
        let name = self.genv.symbol_name(callee).unwrap_or_default();
        let sig = fd.sig();
        check_entry_arguments(name, &sig, args)?;
        let locs = make_arguments(&sig, args)?;
        tracing::debug!("entering {} with {} argument(s)", name, args.len());
        Ok(State::Calling {
            stack: CallStack::new(),
            callee,
            locs,
            mem,
        })
    }

    /// Initial state for the program's entry symbol
    pub fn entry_main(&self, mem: Mem, args: &[Val]) -> Result<State> {
        let fptr = self.genv.main_pointer().ok_or_else(|| Error::UndefinedSymbol {
            name: "main".to_string(),
        })?;
        self.entry(mem, fptr, args)
    }

    pub fn step(&self, state: State) -> Option<(Trace, State)> {
        match state {
            State::Running {
                stack,
                func,
                sp,
                point,
                locs,
                mem,
            } => {
                let Some(f) = self.genv.find_internal(func) else {
                    return stuck(format_args!("{} is not an internal function", func));
                };
                match point {
                    ProgramPoint::AtNode(n) => {
                        if f.block_at(n).is_none() {
                            return stuck(format_args!("{} has no block {}", func, n));
                        }
                        running(stack, func, sp, ProgramPoint::InBlock(n, 0), locs, mem)
                    }
                    ProgramPoint::InBlock(n, index) => {
                        self.exec(f, stack, func, sp, (n, index), locs, mem)
                    }
                }
            }
            State::Calling {
                stack,
                callee,
                locs,
                mem,
            } => match self.genv.find_funct_ptr(callee) {
                Some(FunDef::Internal(f)) => {
                    let mut mem = mem;
                    let Some(b) = mem.alloc(0, f.stacksize) else {
                        return stuck(format_args!("cannot allocate the frame of {}", callee));
                    };
                    let locs = call_regs(&locs).undef_regs(destroyed_at_function_entry());
                    tracing::debug!("call {} (frame {}, {} bytes)", callee, b, f.stacksize);
                    running(
                        stack,
                        callee,
                        Val::Ptr(b, 0),
                        ProgramPoint::AtNode(f.entrypoint),
                        locs,
                        mem,
                    )
                }
                Some(FunDef::External(ef)) => {
                    let sig = ef.sig();
                    let args = extcall_arguments(&locs, &sig);
                    let Some(out) = self.externals.call(ef, &args, mem) else {
                        return stuck(format_args!("external call {} failed", ef.name()));
                    };
                    tracing::debug!("external {} returned {}", ef.name(), out.result);
                    let locs = external_return(&sig, out.result, &locs);
                    Some((
                        out.trace,
                        State::Returned {
                            stack,
                            locs,
                            mem: out.mem,
                        },
                    ))
                }
                None => stuck(format_args!("{} holds no function", callee)),
            },
            State::Returned {
                mut stack,
                locs,
                mem,
            } => {
                let Some(frame) = stack.pop() else {
                    return stuck(format_args!("return with an empty call stack"));
                };
                tracing::debug!("return to {}", frame.func);
                let (n, index) = frame.resume;
                running(
                    stack,
                    frame.func,
                    frame.sp,
                    ProgramPoint::InBlock(n, index),
                    locs,
                    mem,
                )
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn exec(
        &self,
        f: &LocFunction,
        mut stack: CallStack,
        func: BlockId,
        sp: Val,
        (node, index): (Node, usize),
        locs: Locset,
        mut mem: Mem,
    ) -> Option<(Trace, State)> {
        let Some(instr) = f.block_at(node).and_then(|b| b.get(index)) else {
            return stuck(format_args!("{} node {} has no instruction {}", func, node, index));
        };
        tracing::trace!("{} {}:{}: {}", func, node, index, instr);
        let next = ProgramPoint::InBlock(node, index + 1);
        match instr {
            LocInstr::Op(op, args, dst) => {
                let Some(v) = eval_operation(self.genv, sp, op, &locs.read_regs(args), &mem) else {
                    return stuck(format_args!("cannot evaluate {:?}", op));
                };
                let mut locs = locs.undef_regs(destroyed_by_op(op));
                locs.set(Loc::Reg(*dst), v);
                running(stack, func, sp, next, locs, mem)
            }
            LocInstr::Load(chunk, addr, args, dst) => {
                let v = eval_addressing(self.genv, sp, addr, &locs.read_regs(args))
                    .and_then(|a| mem.loadv(*chunk, a));
                let Some(v) = v else {
                    return stuck(format_args!("load {:?} failed", chunk));
                };
                let mut locs = locs.undef_regs(destroyed_by_load(*chunk, addr));
                locs.set(Loc::Reg(*dst), v);
                running(stack, func, sp, next, locs, mem)
            }
            LocInstr::GetStack(kind, ofs, ty, dst) => {
                let slot = Loc::Slot(*kind, *ofs, *ty);
                if !slot.in_range() {
                    return stuck(format_args!("slot {} is out of range", slot));
                }
                let v = locs.get(slot);
                let mut locs = locs.undef_regs(destroyed_by_getstack(*kind));
                locs.set(Loc::Reg(*dst), v);
                running(stack, func, sp, next, locs, mem)
            }
            LocInstr::SetStack(src, kind, ofs, ty) => {
                let v = locs.reg(*src);
                let slot = Loc::Slot(*kind, *ofs, *ty);
                if !slot.in_range() {
                    return stuck(format_args!("slot {} is out of range", slot));
                }
                let mut locs = locs.undef_regs(destroyed_by_setstack(*ty));
                locs.set(slot, v);
                running(stack, func, sp, next, locs, mem)
            }
            LocInstr::Store(chunk, addr, args, src) => {
                let stored = eval_addressing(self.genv, sp, addr, &locs.read_regs(args))
                    .and_then(|a| mem.storev(*chunk, a, locs.reg(*src)));
                if stored.is_none() {
                    return stuck(format_args!("store {:?} failed", chunk));
                }
                let locs = locs.undef_regs(destroyed_by_store(*chunk, addr));
                running(stack, func, sp, next, locs, mem)
            }
            LocInstr::Call(sig, callee) => {
                let callee_block = self.find_function(callee, &locs, sig)?;
                stack.push(StackFrame {
                    func,
                    sp,
                    locs: locs.clone(),
                    resume: (node, index + 1),
                });
                Some((
                    Vec::new(),
                    State::Calling {
                        stack,
                        callee: callee_block,
                        locs,
                        mem,
                    },
                ))
            }
            LocInstr::TailCall(sig, callee) => {
                let locs = return_regs(&stack.parent_locset(), &locs);
                let callee_block = self.find_function(callee, &locs, sig)?;
                if free_frame(&mut mem, sp, f.stacksize).is_none() {
                    return stuck(format_args!("cannot free frame {}", sp));
                }
                Some((
                    Vec::new(),
                    State::Calling {
                        stack,
                        callee: callee_block,
                        locs,
                        mem,
                    },
                ))
            }
            LocInstr::Builtin(ef, args, res) => {
                let Some(vargs) = eval_builtin_args(self.genv, &|l: &Loc| locs.get(*l), sp, &mem, args)
                else {
                    return stuck(format_args!("cannot evaluate arguments of {}", ef.name()));
                };
                let Some(out) = self.externals.call(ef, &vargs, mem) else {
                    return stuck(format_args!("builtin {} failed", ef.name()));
                };
                let mut locs = locs.undef_regs(destroyed_by_builtin(ef));
                res.write(out.result, |r, v| locs.set(Loc::Reg(r), v));
                Some((
                    out.trace,
                    State::Running {
                        stack,
                        func,
                        sp,
                        point: next,
                        locs,
                        mem: out.mem,
                    },
                ))
            }
            LocInstr::Branch(target) => {
                running(stack, func, sp, ProgramPoint::AtNode(*target), locs, mem)
            }
            LocInstr::Cond(cond, args, ifso, ifnot) => {
                let Some(b) = eval_condition(cond, &locs.read_regs(args), &mem) else {
                    return stuck(format_args!("cannot decide {:?}", cond));
                };
                let target = if b { *ifso } else { *ifnot };
                let locs = locs.undef_regs(destroyed_by_cond(cond));
                running(stack, func, sp, ProgramPoint::AtNode(target), locs, mem)
            }
            LocInstr::JumpTable(r, table) => {
                let target = match locs.reg(*r) {
                    Val::Int(n) => table.get(n as u32 as usize).copied(),
                    _ => None,
                };
                let Some(target) = target else {
                    return stuck(format_args!("jump table index {} out of range", locs.reg(*r)));
                };
                let locs = locs.undef_regs(destroyed_by_jumptable());
                running(stack, func, sp, ProgramPoint::AtNode(target), locs, mem)
            }
            LocInstr::Return => {
                if free_frame(&mut mem, sp, f.stacksize).is_none() {
                    return stuck(format_args!("cannot free frame {}", sp));
                }
                let locs = return_regs(&stack.parent_locset(), &locs);
                Some((Vec::new(), State::Returned { stack, locs, mem }))
            }
        }
    }

    /// Resolves a callee and checks its signature against the call site's
    fn find_function(&self, callee: &Callee<MReg>, locs: &Locset, sig: &Signature) -> Option<BlockId> {
        let found = match callee {
            Callee::Reg(r) => self.genv.find_funct(locs.reg(*r)),
            Callee::Symbol(s) => self
                .genv
                .find_symbol(s)
                .and_then(|b| self.genv.find_funct_ptr(b).map(|fd| (b, fd))),
        };
        match found {
            Some((b, fd)) if fd.sig() == *sig => Some(b),
            Some((b, _)) => stuck(format_args!("signature mismatch calling {}", b)),
            None => stuck(format_args!("cannot resolve callee {}", callee)),
        }
    }

    /// The external call a `Calling` state is about to perform, with its
    /// arguments
    pub fn at_external(&self, state: &State) -> Option<(ExternalFunction, Vec<Val>)> {
        match state {
            State::Calling { callee, locs, .. } => match self.genv.find_funct_ptr(*callee)? {
                FunDef::External(ef) => Some((ef.clone(), extcall_arguments(locs, &ef.sig()))),
                FunDef::Internal(_) => None,
            },
            _ => None,
        }
    }

    /// Completes an intercepted external call with `result` and the memory
    /// the call left behind
    pub fn after_external(&self, result: Option<Val>, state: State, mem: Mem) -> Option<State> {
        let State::Calling {
            stack,
            callee,
            locs,
            ..
        } = state
        else {
            return None;
        };
        let FunDef::External(ef) = self.genv.find_funct_ptr(callee)? else {
            return None;
        };
        let locs = external_return(&ef.sig(), result?, &locs);
        Some(State::Returned { stack, locs, mem })
    }

    /// Program result of a final state
    /// Value the outermost call returned, once the stack is empty
    pub fn returned_value(&self, state: &State) -> Option<Val> {
        match state {
            State::Returned { stack, locs, .. } if stack.is_empty() => {
                Some(read_result(&Signature::main(), |r| locs.reg(r)))
            }
            _ => None,
        }
    }

    pub fn is_final(&self, state: &State) -> Option<i32> {
        match self.returned_value(state)? {
            Val::Int(n) => Some(n),
            _ => None,
        }
    }
}

fn external_return(sig: &Signature, result: Val, caller: &Locset) -> Locset {
    let mut locs = undef_caller_save_regs(caller);
    locs.set_pair(loc_result(sig), result);
    locs
}
