//! Frame-IR transition relation
//!
//! Stack slots are memory. Entering an internal function allocates its
//! frame and writes the header (caller's stack pointer in the link slot,
//! return address in the return-address slot); returns and tail calls read
//! both back and check them against the caller before freeing the frame.

use super::instruction::FrameInstr;
use super::program::{FrameFunction, FrameGenv};
use super::retaddr::{CodePositionOracle, ReturnAddressOracle};
use super::state::{CallStack, EntryFrame, StackFrame, State};
use crate::conventions::{
    check_entry_arguments, destroyed_at_function_entry, destroyed_by_builtin, destroyed_by_cond,
    destroyed_by_jumptable, destroyed_by_load, destroyed_by_op, destroyed_by_setstack,
    destroyed_by_store, eval_builtin_args, extcall_arguments_in_frame, free_frame, load_stack,
    loc_arguments, loc_result, read_result, size_arguments, slot_byte_offset, store_stack, Callee,
    Loc, Pair,
};
use crate::machine::{
    eval_addressing, eval_condition, eval_operation, BlockId, ExternalCalls, ExternalFunction,
    FunDef, HostCalls, MReg, Mem, Regset, Signature, SymbolResolver, Trace, Typ, Val,
};
use crate::{Error, Result};

/// Bytes of the entry framing block after the stack arguments: the null
/// link and the null return address of the outermost pseudo-caller
pub const ENTRY_HEADER_SIZE: i64 = 16;

fn stuck<T>(reason: std::fmt::Arguments<'_>) -> Option<T> {
    tracing::debug!("frame-ir state is stuck: {}", reason);
    None
}

fn running(
    stack: CallStack,
    func: BlockId,
    sp: Val,
    pc: usize,
    regs: Regset,
    mem: Mem,
) -> Option<(Trace, State)> {
    Some((
        Vec::new(),
        State::Running {
            stack,
            func,
            sp,
            pc,
            regs,
            mem,
        },
    ))
}

/// Reference interpreter of the Frame-IR
#[derive(Debug, Clone)]
pub struct FrameSemantics<'g, X = HostCalls, O = CodePositionOracle> {
    genv: &'g FrameGenv,
    externals: X,
    oracle: O,
}

impl<'g, X: ExternalCalls> FrameSemantics<'g, X, CodePositionOracle> {
    pub fn new(genv: &'g FrameGenv, externals: X) -> Self {
        Self::with_oracle(genv, externals, CodePositionOracle)
    }
}

impl<'g, X: ExternalCalls, O: ReturnAddressOracle> FrameSemantics<'g, X, O> {
    pub fn with_oracle(genv: &'g FrameGenv, externals: X, oracle: O) -> Self {
        Self {
            genv,
            externals,
            oracle,
        }
    }

    pub fn genv(&self) -> &'g FrameGenv {
        self.genv
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Initial state: a call of `fptr` from the outermost pseudo-caller.
    ///
    /// The pseudo-caller's frame is a fresh block holding the stack
    /// arguments at their outgoing offsets, followed by its own null link
    /// and null return address.
    pub fn entry(&self, mut mem: Mem, fptr: Val, args: &[Val]) -> Result<State> {
        self.genv.check_memory(&mem)?;
        let (callee, fd) = self
            .genv
            .find_funct(fptr)
            .ok_or_else(|| Error::NotAFunction(fptr.to_string()))?;
        let name = self.genv.symbol_name(callee).unwrap_or_default();
        let sig = fd.sig();
        check_entry_arguments(name, &sig, args)?;

        let header = slot_byte_offset(size_arguments(&sig));
        let block = mem
            .alloc(0, header + ENTRY_HEADER_SIZE)
            .ok_or_else(|| Error::memory("cannot allocate the entry frame"))?;
        let sp = Val::Ptr(block, 0);
        let mut regs = Regset::new();
        let mut place = |l: Loc, v: Val| -> Result<()> {
            match l {
                Loc::Reg(r) => regs.set(r, v),
                Loc::Slot(_, ofs, ty) => {
                    crate::conventions::calling::check_outgoing(ofs, ty)?;
                    store_stack(&mut mem, sp, ty, slot_byte_offset(ofs), v).ok_or_else(|| {
                        Error::memory(format!("cannot store argument at word {}", ofs))
                    })?;
                }
            }
            Ok(())
        };
        for (pair, v) in loc_arguments(&sig).into_iter().zip(args) {
            match pair {
                Pair::One(l) => place(l, *v)?,
                Pair::TwoLong(hi, lo) => {
                    place(hi, v.hiword())?;
                    place(lo, v.loword())?;
                }
            }
        }
        for ofs in [header, header + 8] {
            store_stack(&mut mem, sp, Typ::PTR, ofs, Val::NULL)
                .ok_or_else(|| Error::memory("cannot write the entry frame header"))?;
        }
        tracing::debug!("entering {} with {} argument(s)", name, args.len());
        Ok(State::Calling {
            stack: CallStack::new(EntryFrame { sp, ra: Val::NULL }),
            callee,
            regs,
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
                pc,
                regs,
                mem,
            } => {
                let Some(f) = self.genv.find_internal(func) else {
                    return stuck(format_args!("{} is not an internal function", func));
                };
                self.exec(f, stack, func, sp, pc, regs, mem)
            }
            State::Calling {
                stack,
                callee,
                regs,
                mut mem,
            } => match self.genv.find_funct_ptr(callee) {
                Some(FunDef::Internal(f)) => {
                    let Some(b) = mem.alloc(0, f.stacksize) else {
                        return stuck(format_args!("cannot allocate the frame of {}", callee));
                    };
                    let sp = Val::Ptr(b, 0);
                    let header = store_stack(&mut mem, sp, Typ::PTR, f.link_ofs, stack.parent_sp())
                        .and_then(|_| {
                            store_stack(&mut mem, sp, Typ::PTR, f.retaddr_ofs, stack.parent_ra())
                        });
                    if header.is_none() {
                        return stuck(format_args!("cannot write the frame header of {}", callee));
                    }
                    let regs = regs.undef_regs(destroyed_at_function_entry());
                    tracing::debug!("call {} (frame {}, {} bytes)", callee, b, f.stacksize);
                    running(stack, callee, sp, 0, regs, mem)
                }
                Some(FunDef::External(ef)) => {
                    let sig = ef.sig();
                    let Some(args) = extcall_arguments_in_frame(&regs, &mem, stack.parent_sp(), &sig)
                    else {
                        return stuck(format_args!("cannot read arguments of {}", ef.name()));
                    };
                    let Some(out) = self.externals.call(ef, &args, mem) else {
                        return stuck(format_args!("external call {} failed", ef.name()));
                    };
                    tracing::debug!("external {} returned {}", ef.name(), out.result);
                    let regs = external_return(&sig, out.result, regs);
                    Some((
                        out.trace,
                        State::Returned {
                            stack,
                            regs,
                            mem: out.mem,
                        },
                    ))
                }
                None => stuck(format_args!("{} holds no function", callee)),
            },
            State::Returned {
                mut stack,
                regs,
                mem,
            } => {
                let Some(frame) = stack.pop() else {
                    return stuck(format_args!("return with an empty call stack"));
                };
                tracing::debug!("return to {} at {}", frame.func, frame.resume);
                running(stack, frame.func, frame.sp, frame.resume, regs, mem)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn exec(
        &self,
        f: &FrameFunction,
        mut stack: CallStack,
        func: BlockId,
        sp: Val,
        pc: usize,
        mut regs: Regset,
        mut mem: Mem,
    ) -> Option<(Trace, State)> {
        let Some(instr) = f.code.get(pc) else {
            return stuck(format_args!("{} has no instruction {}", func, pc));
        };
        tracing::trace!("{} {}: {}", func, pc, instr);
        let next = pc + 1;
        match instr {
            FrameInstr::GetStack(ofs, ty, dst) => {
                let Some(v) = load_stack(&mem, sp, *ty, *ofs) else {
                    return stuck(format_args!("cannot read stack slot {}", ofs));
                };
                regs.set(*dst, v);
                running(stack, func, sp, next, regs, mem)
            }
            FrameInstr::SetStack(src, ofs, ty) => {
                if store_stack(&mut mem, sp, *ty, *ofs, regs.get(*src)).is_none() {
                    return stuck(format_args!("cannot write stack slot {}", ofs));
                }
                let regs = regs.undef_regs(destroyed_by_setstack(*ty));
                running(stack, func, sp, next, regs, mem)
            }
            FrameInstr::GetParam(ofs, ty, dst) => {
                let parent = stack.parent_sp();
                let v = match load_stack(&mem, sp, Typ::PTR, f.link_ofs) {
                    Some(link) if link == parent => load_stack(&mem, parent, *ty, *ofs),
                    _ => None,
                };
                let Some(v) = v else {
                    return stuck(format_args!("cannot read parameter at {}", ofs));
                };
                let mut regs = regs.undef_regs(&[MReg::TEMP_FOR_PARENT_FRAME]);
                regs.set(*dst, v);
                running(stack, func, sp, next, regs, mem)
            }
            FrameInstr::Op(op, args, dst) => {
                let Some(v) = eval_operation(self.genv, sp, op, &regs.read_all(args), &mem) else {
                    return stuck(format_args!("cannot evaluate {:?}", op));
                };
                let mut regs = regs.undef_regs(destroyed_by_op(op));
                regs.set(*dst, v);
                running(stack, func, sp, next, regs, mem)
            }
            FrameInstr::Load(chunk, addr, args, dst) => {
                let v = eval_addressing(self.genv, sp, addr, &regs.read_all(args))
                    .and_then(|a| mem.loadv(*chunk, a));
                let Some(v) = v else {
                    return stuck(format_args!("load {:?} failed", chunk));
                };
                let mut regs = regs.undef_regs(destroyed_by_load(*chunk, addr));
                regs.set(*dst, v);
                running(stack, func, sp, next, regs, mem)
            }
            FrameInstr::Store(chunk, addr, args, src) => {
                let stored = eval_addressing(self.genv, sp, addr, &regs.read_all(args))
                    .and_then(|a| mem.storev(*chunk, a, regs.get(*src)));
                if stored.is_none() {
                    return stuck(format_args!("store {:?} failed", chunk));
                }
                let regs = regs.undef_regs(destroyed_by_store(*chunk, addr));
                running(stack, func, sp, next, regs, mem)
            }
            FrameInstr::Call(_, callee) => {
                let callee_block = self.find_function_ptr(callee, &regs)?;
                let Some(ra) = self.oracle.choose(func, f, next) else {
                    return stuck(format_args!("no return address for {} at {}", func, next));
                };
                stack.push(StackFrame {
                    func,
                    sp,
                    ra: Val::Ptr(func, ra),
                    resume: next,
                });
                Some((
                    Vec::new(),
                    State::Calling {
                        stack,
                        callee: callee_block,
                        regs,
                        mem,
                    },
                ))
            }
            FrameInstr::TailCall(_, callee) => {
                let callee_block = self.find_function_ptr(callee, &regs)?;
                if self.release_frame(f, &stack, sp, &mut mem).is_none() {
                    return stuck(format_args!("frame header of {} is corrupted", func));
                }
                Some((
                    Vec::new(),
                    State::Calling {
                        stack,
                        callee: callee_block,
                        regs,
                        mem,
                    },
                ))
            }
            FrameInstr::Builtin(ef, args, res) => {
                let Some(vargs) =
                    eval_builtin_args(self.genv, &|r: &MReg| regs.get(*r), sp, &mem, args)
                else {
                    return stuck(format_args!("cannot evaluate arguments of {}", ef.name()));
                };
                let Some(out) = self.externals.call(ef, &vargs, mem) else {
                    return stuck(format_args!("builtin {} failed", ef.name()));
                };
                let mut regs = regs.undef_regs(destroyed_by_builtin(ef));
                res.write(out.result, |r, v| regs.set(r, v));
                Some((
                    out.trace,
                    State::Running {
                        stack,
                        func,
                        sp,
                        pc: next,
                        regs,
                        mem: out.mem,
                    },
                ))
            }
            FrameInstr::Label(_) => running(stack, func, sp, next, regs, mem),
            FrameInstr::Goto(lbl) => {
                let Some(target) = f.find_label(*lbl) else {
                    return stuck(format_args!("{} has no label {}", func, lbl));
                };
                running(stack, func, sp, target, regs, mem)
            }
            FrameInstr::Cond(cond, args, lbl) => {
                let Some(b) = eval_condition(cond, &regs.read_all(args), &mem) else {
                    return stuck(format_args!("cannot decide {:?}", cond));
                };
                let target = if b { f.find_label(*lbl) } else { Some(next) };
                let Some(target) = target else {
                    return stuck(format_args!("{} has no label {}", func, lbl));
                };
                let regs = regs.undef_regs(destroyed_by_cond(cond));
                running(stack, func, sp, target, regs, mem)
            }
            FrameInstr::JumpTable(r, table) => {
                let target = match regs.get(*r) {
                    Val::Int(n) => table
                        .get(n as u32 as usize)
                        .and_then(|lbl| f.find_label(*lbl)),
                    _ => None,
                };
                let Some(target) = target else {
                    return stuck(format_args!("jump table index {} out of range", regs.get(*r)));
                };
                let regs = regs.undef_regs(destroyed_by_jumptable());
                running(stack, func, sp, target, regs, mem)
            }
            FrameInstr::Return => {
                if self.release_frame(f, &stack, sp, &mut mem).is_none() {
                    return stuck(format_args!("frame header of {} is corrupted", func));
                }
                Some((Vec::new(), State::Returned { stack, regs, mem }))
            }
        }
    }

    /// Reads the header back, checks it against the caller and frees the
    /// frame
    fn release_frame(&self, f: &FrameFunction, stack: &CallStack, sp: Val, mem: &mut Mem) -> Option<()> {
        let link = load_stack(mem, sp, Typ::PTR, f.link_ofs)?;
        let ra = load_stack(mem, sp, Typ::PTR, f.retaddr_ofs)?;
        if link != stack.parent_sp() || ra != stack.parent_ra() {
            return None;
        }
        free_frame(mem, sp, f.stacksize)
    }

    fn find_function_ptr(&self, callee: &Callee<MReg>, regs: &Regset) -> Option<BlockId> {
        let found = match callee {
            Callee::Reg(r) => self.genv.find_funct(regs.get(*r)).map(|(b, _)| b),
            Callee::Symbol(s) => self
                .genv
                .find_symbol(s)
                .filter(|b| self.genv.find_funct_ptr(*b).is_some()),
        };
        if found.is_none() {
            return stuck(format_args!("cannot resolve callee {}", callee));
        }
        found
    }

    /// The external call a `Calling` state is about to perform, with its
    /// arguments
    pub fn at_external(&self, state: &State) -> Option<(ExternalFunction, Vec<Val>)> {
        match state {
            State::Calling {
                stack,
                callee,
                regs,
                mem,
            } => match self.genv.find_funct_ptr(*callee)? {
                FunDef::External(ef) => {
                    let args = extcall_arguments_in_frame(regs, mem, stack.parent_sp(), &ef.sig())?;
                    Some((ef.clone(), args))
                }
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
            regs,
            ..
        } = state
        else {
            return None;
        };
        let FunDef::External(ef) = self.genv.find_funct_ptr(callee)? else {
            return None;
        };
        let regs = external_return(&ef.sig(), result?, regs);
        Some(State::Returned { stack, regs, mem })
    }

    /// Program result of a final state
    /// Value the outermost call returned, once the stack is empty
    pub fn returned_value(&self, state: &State) -> Option<Val> {
        match state {
            State::Returned { stack, regs, .. } if stack.is_empty() => {
                Some(read_result(&Signature::main(), |r| regs.get(r)))
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

fn external_return(sig: &Signature, result: Val, regs: Regset) -> Regset {
    let mut regs = regs.undef_caller_save();
    match loc_result(sig) {
        Pair::One(r) => regs.set(r, result),
        Pair::TwoLong(hi, lo) => {
            regs.set(hi, result.hiword());
            regs.set(lo, result.loword());
        }
    }
    regs
}
