//! Argument expressions and result descriptors of built-in calls
//!
//! Both IRs use the same shapes, parameterised by what a base location is:
//! a [`Loc`](super::Loc) in the Location-IR, a machine register in the
//! Frame-IR. Evaluation reads base locations through a closure.

use serde::{Deserialize, Serialize};

use crate::machine::{Chunk, Mem, MReg, SymbolResolver, Val};

/// Argument expression of a built-in call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BuiltinArg<L> {
    Base(L),
    Int(i32),
    Long(i64),
    Float(f64),
    Single(f32),
    /// Load from the current frame at a byte offset
    LoadStack(Chunk, i64),
    /// Address inside the current frame
    AddrStack(i64),
    LoadGlobal(Chunk, String, i64),
    AddrGlobal(String, i64),
    /// Long built from two 32-bit halves
    SplitLong(Box<BuiltinArg<L>>, Box<BuiltinArg<L>>),
    /// 64-bit pointer addition
    AddPtr(Box<BuiltinArg<L>>, Box<BuiltinArg<L>>),
}

/// Destination of a built-in's result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuiltinRes<L> {
    Base(L),
    None,
    /// High and low halves of a long result
    SplitLong(L, L),
}

impl BuiltinRes<MReg> {
    /// Writes `v` through the descriptor
    pub fn write(&self, v: Val, mut set: impl FnMut(MReg, Val)) {
        match self {
            BuiltinRes::Base(r) => set(*r, v),
            BuiltinRes::None => {}
            BuiltinRes::SplitLong(hi, lo) => {
                set(*hi, v.hiword());
                set(*lo, v.loword());
            }
        }
    }
}

/// Evaluates one argument expression; `None` when a load fails or a symbol
/// is unknown
pub fn eval_builtin_arg<L, R>(
    genv: &R,
    read: &impl Fn(&L) -> Val,
    sp: Val,
    mem: &Mem,
    arg: &BuiltinArg<L>,
) -> Option<Val>
where
    R: SymbolResolver + ?Sized,
{
    Some(match arg {
        BuiltinArg::Base(l) => read(l),
        BuiltinArg::Int(n) => Val::Int(*n),
        BuiltinArg::Long(n) => Val::Long(*n),
        BuiltinArg::Float(x) => Val::Float(*x),
        BuiltinArg::Single(x) => Val::Single(*x),
        BuiltinArg::LoadStack(chunk, ofs) => mem.loadv(*chunk, sp.offset_ptr(*ofs))?,
        BuiltinArg::AddrStack(ofs) => sp.offset_ptr(*ofs),
        BuiltinArg::LoadGlobal(chunk, sym, ofs) => {
            mem.loadv(*chunk, genv.symbol_address(sym, *ofs)?)?
        }
        BuiltinArg::AddrGlobal(sym, ofs) => genv.symbol_address(sym, *ofs)?,
        BuiltinArg::SplitLong(hi, lo) => Val::long_of_words(
            eval_builtin_arg(genv, read, sp, mem, hi)?,
            eval_builtin_arg(genv, read, sp, mem, lo)?,
        ),
        BuiltinArg::AddPtr(a, b) => eval_builtin_arg(genv, read, sp, mem, a)?
            .addl(eval_builtin_arg(genv, read, sp, mem, b)?),
    })
}

/// Evaluates an argument list
pub fn eval_builtin_args<L, R>(
    genv: &R,
    read: &impl Fn(&L) -> Val,
    sp: Val,
    mem: &Mem,
    args: &[BuiltinArg<L>],
) -> Option<Vec<Val>>
where
    R: SymbolResolver + ?Sized,
{
    args.iter()
        .map(|a| eval_builtin_arg(genv, read, sp, mem, a))
        .collect()
}
