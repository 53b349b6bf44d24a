//! Runs the same call chain on both interpreters and prints what happens
//! at every call boundary.
//!
//! ```text
//! cargo run --example call_chain
//! ```

use anyhow::{bail, Context, Result};
use backsim::conventions::{BuiltinArg, BuiltinRes, Callee, Loc, SlotKind};
use backsim::driver::{run, SimOptions};
use backsim::frame_ir::{self, FrameFunction, FrameGenv, FrameInstr, FrameProgram, FrameSemantics};
use backsim::location_ir::{self, LocFunction, LocGenv, LocInstr, LocProgram, LocationSemantics};
use backsim::machine::{Chunk, ExternalFunction, HostCalls, MReg, Operation, Signature, Typ, Val};

fn int_to_int() -> Signature {
    Signature::new(vec![Typ::Int], Some(Typ::Int))
}

fn host() -> HostCalls {
    HostCalls::new().with("double", |args| match args {
        [Val::Int(n)] => Some(Val::Int(n.wrapping_mul(2))),
        _ => None,
    })
}

fn double() -> ExternalFunction {
    ExternalFunction::External {
        name: "double".into(),
        sig: int_to_int(),
    }
}

fn checkpoint() -> ExternalFunction {
    ExternalFunction::Annot {
        text: "before tail call".into(),
        types: vec![Typ::Int],
    }
}

/// main(x) = twice(x + 1); twice(x) = tailcall double(x)
fn location_program() -> LocProgram {
    let twice = LocFunction::new(int_to_int(), 8, 1).block(
        1,
        vec![
            LocInstr::SetStack(MReg::DI, SlotKind::Local, 0, Typ::Int),
            LocInstr::Builtin(
                checkpoint(),
                vec![BuiltinArg::Base(Loc::Slot(SlotKind::Local, 0, Typ::Int))],
                BuiltinRes::None,
            ),
            LocInstr::TailCall(int_to_int(), Callee::Symbol("double".into())),
        ],
    );
    let main = LocFunction::new(int_to_int(), 0, 1).block(
        1,
        vec![
            LocInstr::Op(Operation::AddImm(1), vec![MReg::DI], MReg::DI),
            LocInstr::Call(int_to_int(), Callee::Symbol("twice".into())),
            LocInstr::Return,
        ],
    );
    LocProgram::new("main")
        .external("double", double())
        .function("twice", twice)
        .function("main", main)
}

fn frame_program() -> FrameProgram {
    let twice = FrameFunction::new(int_to_int(), 24, 0, 8).code(vec![
        FrameInstr::SetStack(MReg::DI, 16, Typ::Int),
        FrameInstr::Builtin(
            checkpoint(),
            vec![BuiltinArg::LoadStack(Chunk::Int32, 16)],
            BuiltinRes::None,
        ),
        FrameInstr::TailCall(int_to_int(), Callee::Symbol("double".into())),
    ]);
    let main = FrameFunction::with_header(int_to_int()).code(vec![
        FrameInstr::Op(Operation::AddImm(1), vec![MReg::DI], MReg::DI),
        FrameInstr::Call(int_to_int(), Callee::Symbol("twice".into())),
        FrameInstr::Return,
    ]);
    FrameProgram::new("main")
        .external("double", double())
        .function("twice", twice)
        .function("main", main)
}

fn trace_location(input: i32) -> Result<i32> {
    let program = location_program();
    let genv = LocGenv::new(&program)?;
    let sem = LocationSemantics::new(&genv, host());
    let mut state = sem.entry_main(program.init_mem()?, &[Val::Int(input)])?;
    let mut steps = 0;
    while sem.is_final(&state).is_none() {
        let (events, next) = sem
            .step(state)
            .with_context(|| format!("location-ir stuck after {} steps", steps))?;
        steps += 1;
        for event in &events {
            println!("  [{:>3}] event {}", steps, event);
        }
        match &next {
            location_ir::State::Calling { stack, callee, .. } => {
                println!("  [{:>3}] call {} at depth {}", steps, callee, stack.len())
            }
            location_ir::State::Returned { stack, locs, .. } => {
                println!("  [{:>3}] return {} to depth {}", steps, locs.reg(MReg::AX), stack.len())
            }
            location_ir::State::Running { .. } => {}
        }
        state = next;
    }
    sem.is_final(&state).context("no result")
}

fn trace_frame(input: i32) -> Result<i32> {
    let program = frame_program();
    let genv = FrameGenv::new(&program)?;
    let sem = FrameSemantics::new(&genv, host());
    let mut state = sem.entry_main(program.init_mem()?, &[Val::Int(input)])?;
    let mut steps = 0;
    while sem.is_final(&state).is_none() {
        let (events, next) = sem
            .step(state)
            .with_context(|| format!("frame-ir stuck after {} steps", steps))?;
        steps += 1;
        for event in &events {
            println!("  [{:>3}] event {}", steps, event);
        }
        match &next {
            frame_ir::State::Calling { stack, callee, .. } => {
                let ra = stack.parent_ra();
                println!("  [{:>3}] call {} at depth {}, ra {}", steps, callee, stack.len(), ra)
            }
            frame_ir::State::Returned { stack, regs, .. } => {
                println!("  [{:>3}] return {} to depth {}", steps, regs.get(MReg::AX), stack.len())
            }
            frame_ir::State::Running { .. } => {}
        }
        state = next;
    }
    sem.is_final(&state).context("no result")
}

fn main() -> Result<()> {
    println!("=== Call chain on both back-end IRs ===\n");

    let input = 20;
    println!("Location-IR:");
    let l = trace_location(input)?;
    println!("  => {}\n", l);

    println!("Frame-IR:");
    let f = trace_frame(input)?;
    println!("  => {}\n", f);

    if l != f {
        bail!("interpreters disagree: {} vs {}", l, f);
    }

    // The driver gives the same answer with every invariant checked
    let program = frame_program();
    let genv = FrameGenv::new(&program)?;
    let sem = FrameSemantics::new(&genv, host());
    let state = sem.entry_main(program.init_mem()?, &[Val::Int(input)])?;
    let outcome = run(&sem, state, &SimOptions::new().check_invariants(true))?;
    println!("Driver: {} in {} steps", outcome.result, outcome.steps);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
