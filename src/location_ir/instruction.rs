//! Location-IR instruction definitions

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::conventions::{BuiltinArg, BuiltinRes, Callee, Loc, SlotKind};
use crate::machine::{Addressing, Chunk, Condition, ExternalFunction, MReg, Operation, Signature, Typ};

/// Label of a basic block in the control-flow graph
pub type Node = u32;

/// Location-IR instruction.
///
/// Operands of arithmetic and memory instructions are machine registers;
/// stack slots are reached only through `GetStack`/`SetStack`. Every block
/// ends with one of `Branch`, `Cond`, `JumpTable`, `TailCall` or `Return`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LocInstr {
    /// `dst = op(args)`
    Op(Operation, Vec<MReg>, MReg),
    /// `dst = [addr(args)]`
    Load(Chunk, Addressing, Vec<MReg>, MReg),
    /// Slot to register
    GetStack(SlotKind, i64, Typ, MReg),
    /// Register to slot
    SetStack(MReg, SlotKind, i64, Typ),
    /// `[addr(args)] = src`
    Store(Chunk, Addressing, Vec<MReg>, MReg),
    Call(Signature, Callee<MReg>),
    TailCall(Signature, Callee<MReg>),
    Builtin(ExternalFunction, Vec<BuiltinArg<Loc>>, BuiltinRes<MReg>),
    Branch(Node),
    /// Goes to the first node when the condition holds, to the second otherwise
    Cond(Condition, Vec<MReg>, Node, Node),
    /// Goes to the `n`-th node, `n` read as an unsigned int from the register
    JumpTable(MReg, Vec<Node>),
    Return,
}

impl LocInstr {
    pub fn is_call(&self) -> bool {
        matches!(self, LocInstr::Call(..))
    }

    /// Successor nodes of a block-ending instruction
    pub fn successors(&self) -> Vec<Node> {
        match self {
            LocInstr::Branch(n) => vec![*n],
            LocInstr::Cond(_, _, ifso, ifnot) => vec![*ifso, *ifnot],
            LocInstr::JumpTable(_, table) => table.clone(),
            _ => Vec::new(),
        }
    }
}

fn regs(rs: &[MReg]) -> String {
    rs.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for LocInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocInstr::Op(op, args, dst) => write!(f, "{} = {:?}({})", dst, op, regs(args)),
            LocInstr::Load(chunk, addr, args, dst) => {
                write!(f, "{} = {:?}[{:?}({})]", dst, chunk, addr, regs(args))
            }
            LocInstr::GetStack(kind, ofs, ty, dst) => {
                write!(f, "{} = {}", dst, Loc::Slot(*kind, *ofs, *ty))
            }
            LocInstr::SetStack(src, kind, ofs, ty) => {
                write!(f, "{} = {}", Loc::Slot(*kind, *ofs, *ty), src)
            }
            LocInstr::Store(chunk, addr, args, src) => {
                write!(f, "{:?}[{:?}({})] = {}", chunk, addr, regs(args), src)
            }
            LocInstr::Call(sig, callee) => write!(f, "call {} : {}", callee, sig),
            LocInstr::TailCall(sig, callee) => write!(f, "tailcall {} : {}", callee, sig),
            LocInstr::Builtin(ef, args, _) => write!(f, "builtin {} ({} args)", ef.name(), args.len()),
            LocInstr::Branch(n) => write!(f, "goto {}", n),
            LocInstr::Cond(cond, args, ifso, ifnot) => {
                write!(f, "if {:?}({}) goto {} else goto {}", cond, regs(args), ifso, ifnot)
            }
            LocInstr::JumpTable(r, table) => write!(f, "jumptable {} {:?}", r, table),
            LocInstr::Return => write!(f, "return"),
        }
    }
}
