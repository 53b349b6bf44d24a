//! # Frame-IR
//!
//! The stack-concrete representation consumed by code emission: a flat
//! instruction list per function, explicit labels, and stack slots at
//! byte offsets from the stack pointer. Every frame is a memory block
//! whose header holds the caller's stack pointer (link slot) and the
//! return address, at offsets each function fixes.
//!
//! ```text
//! frame_ir/
//! ├── instruction.rs  # Label, FrameInstr
//! ├── program.rs      # FrameFunction, FrameProgram, FrameGenv
//! ├── retaddr.rs      # ReturnAddressOracle and the provided oracles
//! ├── state.rs        # State, StackFrame, EntryFrame, CallStack
//! ├── step.rs         # FrameSemantics: entry, step, external interface
//! └── wf.rs           # state well-formedness checker
//! ```

mod instruction;
mod program;
pub mod retaddr;
pub mod state;
mod step;
pub mod wf;

pub use instruction::{FrameInstr, Label};
pub use program::{FrameFunction, FrameGenv, FrameProgram};
pub use retaddr::{CodePositionOracle, ReturnAddressOracle, TableOracle};
pub use state::{CallStack, EntryFrame, StackFrame, State};
pub use step::{FrameSemantics, ENTRY_HEADER_SIZE};
