//! # Backsim - Reference Interpreters for Compiler Back-End IRs
//!
//! Deterministic small-step interpreters for the two representations at the
//! end of a native-code compiler pipeline:
//!
//! - **Location-IR** - produced by register allocation. Each function is a
//!   control-flow graph of basic blocks; registers and stack slots are both
//!   *locations* held in one location state.
//! - **Frame-IR** - consumed by code emission. Each function is a flat
//!   instruction list with labels; stack slots are bytes in a memory block
//!   whose header holds the caller's stack pointer and the return address.
//!
//! Both expose the same interface (`entry`, `step`, `at_external`,
//! `after_external`, `is_final`) and share the calling-convention library,
//! so either can be plugged into the same [`driver`].
//!
//! ## Quick Start
//!
//! ```rust
//! use backsim::driver::{run, SimOptions};
//! use backsim::location_ir::{LocFunction, LocGenv, LocInstr, LocProgram, LocationSemantics};
//! use backsim::machine::{HostCalls, MReg, Operation, Signature};
//!
//! # fn main() -> backsim::Result<()> {
//! // main() { ax = 5; return }
//! let main = LocFunction::new(Signature::main(), 0, 1).block(
//!     1,
//!     vec![
//!         LocInstr::Op(Operation::IntConst(5), vec![], MReg::AX),
//!         LocInstr::Return,
//!     ],
//! );
//! let program = LocProgram::new("main").function("main", main);
//!
//! let genv = LocGenv::new(&program)?;
//! let sem = LocationSemantics::new(&genv, HostCalls::new());
//! let state = sem.entry_main(program.init_mem()?, &[])?;
//!
//! let outcome = run(&sem, state, &SimOptions::default())?;
//! assert_eq!(outcome.result, 5);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Program → GlobalEnv + initial Mem → entry → Calling ⇄ Running ⇄ Returned → is_final
//!                                               │
//!                                  ExternalCalls / at_external
//! ```
//!
//! ### Main Components
//!
//! - [`machine`] - values, memory, registers, operators, external calls,
//!   programs and the symbol resolver
//! - [`conventions`] - locations, location states, argument/result
//!   placement, the call/return/external transforms, clobber sets
//! - [`location_ir`] - Location-IR and [`LocationSemantics`]
//! - [`frame_ir`] - Frame-IR, [`FrameSemantics`] and the return-address
//!   oracle
//! - [`driver`] - [`Semantics`] trait, [`SimOptions`], `run`
//!
//! ## Error Handling
//!
//! Execution has a single failure mode: a stuck state, for which `step`
//! returns `None`. Building programs, entering them and driving them to
//! completion report [`Error`]s:
//!
//! ```rust
//! use backsim::location_ir::{LocFunction, LocGenv, LocProgram, LocationSemantics};
//! use backsim::machine::{HostCalls, Signature, Val};
//! use backsim::Error;
//!
//! let program = LocProgram::new("main").function("main", LocFunction::new(Signature::main(), 0, 1));
//! let genv = LocGenv::new(&program).unwrap();
//! let sem = LocationSemantics::new(&genv, HostCalls::new());
//!
//! match sem.entry_main(program.init_mem().unwrap(), &[Val::Int(1)]) {
//!     Err(Error::ArityMismatch { expected, got, .. }) => assert_eq!((expected, got), (0, 1)),
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```
//!
//! ## License
//!
//! Licensed under the [MIT License](https://opensource.org/licenses/MIT).

#![allow(clippy::large_enum_variant)] // States carry their memory by value

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod conventions;
pub mod driver;
pub mod error;
pub mod frame_ir;
pub mod location_ir;
pub mod machine;

// Re-export main types
pub use driver::{run, run_intercepting, Outcome, Semantics, SimOptions};
pub use error::{Error, Result, WfViolation};
pub use frame_ir::FrameSemantics;
pub use location_ir::LocationSemantics;
pub use machine::{BlockId, Mem, Val};
