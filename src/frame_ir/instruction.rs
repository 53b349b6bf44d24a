//! Frame-IR instruction definitions

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::conventions::{BuiltinArg, BuiltinRes, Callee};
use crate::machine::{Addressing, Chunk, Condition, ExternalFunction, MReg, Operation, Signature, Typ};

/// Jump target inside a function's code
pub type Label = u32;

/// Frame-IR instruction. Stack offsets are bytes from the stack pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FrameInstr {
    /// `dst = [sp + ofs]`
    GetStack(i64, Typ, MReg),
    /// `[sp + ofs] = src`
    SetStack(MReg, i64, Typ),
    /// `dst = [parent_sp + ofs]`, the parent pointer read from the link slot
    GetParam(i64, Typ, MReg),
    Op(Operation, Vec<MReg>, MReg),
    Load(Chunk, Addressing, Vec<MReg>, MReg),
    Store(Chunk, Addressing, Vec<MReg>, MReg),
    Call(Signature, Callee<MReg>),
    TailCall(Signature, Callee<MReg>),
    Builtin(ExternalFunction, Vec<BuiltinArg<MReg>>, BuiltinRes<MReg>),
    Label(Label),
    Goto(Label),
    /// Jumps to the label when the condition holds, falls through otherwise
    Cond(Condition, Vec<MReg>, Label),
    JumpTable(MReg, Vec<Label>),
    Return,
}

impl FrameInstr {
    pub fn is_call(&self) -> bool {
        matches!(self, FrameInstr::Call(..))
    }
}

fn regs(rs: &[MReg]) -> String {
    rs.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for FrameInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameInstr::GetStack(ofs, ty, dst) => write!(f, "{} = {:?}[sp + {}]", dst, ty, ofs),
            FrameInstr::SetStack(src, ofs, ty) => write!(f, "{:?}[sp + {}] = {}", ty, ofs, src),
            FrameInstr::GetParam(ofs, ty, dst) => {
                write!(f, "{} = {:?}[parent + {}]", dst, ty, ofs)
            }
            FrameInstr::Op(op, args, dst) => write!(f, "{} = {:?}({})", dst, op, regs(args)),
            FrameInstr::Load(chunk, addr, args, dst) => {
                write!(f, "{} = {:?}[{:?}({})]", dst, chunk, addr, regs(args))
            }
            FrameInstr::Store(chunk, addr, args, src) => {
                write!(f, "{:?}[{:?}({})] = {}", chunk, addr, regs(args), src)
            }
            FrameInstr::Call(sig, callee) => write!(f, "call {} : {}", callee, sig),
            FrameInstr::TailCall(sig, callee) => write!(f, "tailcall {} : {}", callee, sig),
            FrameInstr::Builtin(ef, args, _) => {
                write!(f, "builtin {} ({} args)", ef.name(), args.len())
            }
            FrameInstr::Label(l) => write!(f, "{}:", l),
            FrameInstr::Goto(l) => write!(f, "goto {}", l),
            FrameInstr::Cond(cond, args, l) => write!(f, "if {:?}({}) goto {}", cond, regs(args), l),
            FrameInstr::JumpTable(r, table) => write!(f, "jumptable {} {:?}", r, table),
            FrameInstr::Return => write!(f, "return"),
        }
    }
}
