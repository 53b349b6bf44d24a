//! # Location-IR
//!
//! The register-allocated representation: a control-flow graph of basic
//! blocks per function, where machine registers and stack slots are
//! addressed uniformly as locations. Stack slots live in the location
//! state, not in memory; a function's frame in memory only hosts what its
//! code addresses explicitly.
//!
//! ```text
//! location_ir/
//! ├── instruction.rs  # Node, LocInstr
//! ├── program.rs      # LocFunction, LocProgram, LocGenv
//! ├── state.rs        # State, ProgramPoint, StackFrame, CallStack
//! ├── step.rs         # LocationSemantics: entry, step, external interface
//! └── wf.rs           # state well-formedness checker
//! ```

mod instruction;
mod program;
pub mod state;
mod step;
pub mod wf;

pub use instruction::{LocInstr, Node};
pub use program::{LocFunction, LocGenv, LocProgram};
pub use state::{CallStack, ProgramPoint, StackFrame, State};
pub use step::LocationSemantics;
