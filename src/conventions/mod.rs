//! # Calling Conventions
//!
//! The policy both interpreters share: where arguments and results live,
//! how location states are transformed at call, return and external-call
//! boundaries, which registers each instruction clobbers, and how built-in
//! arguments are evaluated.
//!
//! ```text
//! conventions/
//! ├── locations.rs  # Loc, SlotKind, Pair, Locset
//! ├── calling.rs    # argument/result locations, call_regs, return_regs, marshaling
//! ├── destroyed.rs  # per-instruction clobber sets
//! └── builtins.rs   # BuiltinArg, BuiltinRes and their evaluation
//! ```

pub mod builtins;
pub mod calling;
pub mod destroyed;
pub mod locations;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use builtins::{eval_builtin_arg, eval_builtin_args, BuiltinArg, BuiltinRes};
pub use calling::{
    call_regs, check_entry_arguments, extcall_arguments, extcall_arguments_in_frame, free_frame,
    load_stack, loc_arguments, loc_result, make_arguments, read_result, return_regs,
    size_arguments, slot_byte_offset, store_stack, undef_caller_save_regs, ARG_AREA_OFFSET, MAX_OUTGOING_WORDS,
};
pub use destroyed::*;
pub use locations::{Loc, Locset, Pair, SlotKind};

/// Callee designator of a call or tail call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Callee<R> {
    /// Code pointer held in a register
    Reg(R),
    /// Direct reference to a global symbol
    Symbol(String),
}

impl<R: fmt::Display> fmt::Display for Callee<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callee::Reg(r) => write!(f, "*{}", r),
            Callee::Symbol(s) => write!(f, "\"{}\"", s),
        }
    }
}
