//! # Machine Model
//!
//! The services both interpreters are parameterised over, with reference
//! implementations good enough to run real programs:
//!
//! ```text
//! machine/
//! ├── value.rs     # Val, BlockId: the dynamic value domain
//! ├── types.rs     # Typ, Chunk, Signature, CallConv
//! ├── reg.rs       # MReg, Regset: machine registers and the register file
//! ├── memory.rs    # Mem: block-based memory service
//! ├── ops.rs       # Operation, Condition, Addressing and their evaluator
//! ├── external.rs  # ExternalFunction, Event, ExternalCalls, HostCalls
//! └── genv.rs      # Program, GlobalEnv (symbol resolver), initial memory
//! ```

pub mod external;
pub mod genv;
pub mod memory;
pub mod ops;
pub mod reg;
pub mod types;
pub mod value;

pub use external::{Event, ExternalCalls, ExternalFunction, ExternalOutcome, HostCalls, HostFn, Trace};
pub use genv::{FunDef, FunctionSig, GlobalDef, GlobalEnv, GlobalVar, InitData, Program, SymbolResolver};
pub use memory::{Mem, Memval, MAX_BLOCK_SIZE};
pub use ops::{eval_addressing, eval_condition, eval_operation, Addressing, Comparison, Condition, Operation};
pub use reg::{MReg, Regset, NUM_MREGS};
pub use types::{CallConv, Chunk, Signature, Typ};
pub use value::{BlockId, Val};
