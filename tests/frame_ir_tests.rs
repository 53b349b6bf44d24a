//! End-to-end tests for the Frame-IR interpreter
//!
//! Covers the frame header protocol, parameter access through the parent
//! frame, labels and branches, and return addresses from both oracles.

use backsim::conventions::{
    load_stack, slot_byte_offset, store_stack, BuiltinArg, BuiltinRes, Callee,
};
use backsim::driver::{run, SimOptions};
use backsim::frame_ir::{
    FrameFunction, FrameGenv, FrameInstr, FrameProgram, FrameSemantics, State, TableOracle,
};
use backsim::machine::{
    Chunk, Comparison, Condition, Event, ExternalFunction, HostCalls, MReg, Operation, Signature,
    SymbolResolver, Typ, Val,
};
use backsim::Error;

// ============================================================================
// Helpers
// ============================================================================

fn int_to_int() -> Signature {
    Signature::new(vec![Typ::Int], Some(Typ::Int))
}

fn seven_ints() -> Signature {
    Signature::new(vec![Typ::Int; 7], Some(Typ::Int))
}

fn host() -> HostCalls {
    HostCalls::new()
        .with("inc", |args| match args {
            [Val::Int(n)] => Some(Val::Int(n.wrapping_add(1))),
            _ => None,
        })
        .with("seventh", |args| args.get(6).copied())
}

fn run_main(program: &FrameProgram, args: &[Val]) -> backsim::Result<backsim::Outcome> {
    let genv = FrameGenv::new(program)?;
    let sem = FrameSemantics::new(&genv, host());
    let state = sem.entry_main(program.init_mem()?, args)?;
    run(&sem, state, &SimOptions::new().check_invariants(true))
}

/// b(x) = x + 1
fn increment() -> FrameFunction {
    FrameFunction::with_header(int_to_int()).code(vec![
        FrameInstr::Op(Operation::AddImm(1), vec![MReg::DI], MReg::AX),
        FrameInstr::Return,
    ])
}

/// main(x) { call b(x); return }
fn call_program() -> FrameProgram {
    let main = FrameFunction::with_header(int_to_int()).code(vec![
        FrameInstr::Call(int_to_int(), Callee::Symbol("b".into())),
        FrameInstr::Return,
    ]);
    FrameProgram::new("main")
        .function("b", increment())
        .function("main", main)
}

/// Caller that passes 1..=7, the last one on the stack. Its header sits
/// above the outgoing area.
fn stack_argument_caller(callee: &str) -> FrameFunction {
    let mut code: Vec<FrameInstr> = MReg::INT_PARAMS
        .iter()
        .zip(1..)
        .map(|(r, n)| FrameInstr::Op(Operation::IntConst(n), vec![], *r))
        .collect();
    code.extend([
        FrameInstr::Op(Operation::IntConst(7), vec![], MReg::BX),
        FrameInstr::SetStack(MReg::BX, slot_byte_offset(0), Typ::Int),
        FrameInstr::Call(seven_ints(), Callee::Symbol(callee.into())),
        FrameInstr::Return,
    ]);
    FrameFunction::new(Signature::main(), 24, 8, 16).code(code)
}

// ============================================================================
// Straight-line code and control flow
// ============================================================================

#[test]
fn test_constant_program_returns_five() {
    let main = FrameFunction::with_header(Signature::main()).code(vec![
        FrameInstr::Op(Operation::IntConst(5), vec![], MReg::AX),
        FrameInstr::Return,
    ]);
    let program = FrameProgram::new("main").function("main", main);
    let outcome = run_main(&program, &[]).unwrap();
    assert_eq!(outcome.result, 5);
    assert_eq!(outcome.steps, 3);
}

#[test]
fn test_loop_with_labels() {
    // sum(n) = n + (n - 1) + ... + 1
    let sum = FrameFunction::with_header(int_to_int()).code(vec![
        FrameInstr::Op(Operation::IntConst(0), vec![], MReg::AX),
        FrameInstr::Label(1),
        FrameInstr::Cond(Condition::CompImm(Comparison::Le, 0), vec![MReg::DI], 2),
        FrameInstr::Op(Operation::Add, vec![MReg::AX, MReg::DI], MReg::AX),
        FrameInstr::Op(Operation::AddImm(-1), vec![MReg::DI], MReg::DI),
        FrameInstr::Goto(1),
        FrameInstr::Label(2),
        FrameInstr::Return,
    ]);
    let program = FrameProgram::new("sum").function("sum", sum);
    assert_eq!(run_main(&program, &[Val::Int(10)]).unwrap().result, 55);
    assert_eq!(run_main(&program, &[Val::Int(-3)]).unwrap().result, 0);
}

#[test]
fn test_goto_to_missing_label_is_stuck() {
    let main = FrameFunction::with_header(Signature::main()).code(vec![FrameInstr::Goto(9)]);
    let program = FrameProgram::new("main").function("main", main);
    assert!(matches!(run_main(&program, &[]), Err(Error::Stuck { steps: 1 })));
}

#[test]
fn test_jump_table() {
    let program = |index: i32| {
        let main = FrameFunction::with_header(Signature::main()).code(vec![
            FrameInstr::Op(Operation::IntConst(index), vec![], MReg::BX),
            FrameInstr::JumpTable(MReg::BX, vec![10, 11]),
            FrameInstr::Label(10),
            FrameInstr::Op(Operation::IntConst(20), vec![], MReg::AX),
            FrameInstr::Return,
            FrameInstr::Label(11),
            FrameInstr::Op(Operation::IntConst(30), vec![], MReg::AX),
            FrameInstr::Return,
        ]);
        FrameProgram::new("main").function("main", main)
    };
    assert_eq!(run_main(&program(0), &[]).unwrap().result, 20);
    assert_eq!(run_main(&program(1), &[]).unwrap().result, 30);
    assert!(matches!(run_main(&program(2), &[]), Err(Error::Stuck { steps: 2 })));
}

// ============================================================================
// Frame header
// ============================================================================

#[test]
fn test_callee_header_links_to_caller() {
    let program = call_program();
    let genv = FrameGenv::new(&program).unwrap();
    let sem = FrameSemantics::new(&genv, host());
    let main = genv.find_symbol("main").unwrap();

    let mut state = sem.entry_main(program.init_mem().unwrap(), &[Val::Int(41)]).unwrap();
    // Calling main, the call, entering b
    for _ in 0..3 {
        state = sem.step(state).unwrap().1;
    }
    let State::Running { stack, sp, pc: 0, mem, .. } = &state else {
        panic!("expected b to be running, got {}", state.kind());
    };
    let caller = stack.top().unwrap();
    assert_eq!(caller.func, main);
    assert_eq!(caller.ra, Val::Ptr(main, 1));
    assert_eq!(load_stack(mem, *sp, Typ::PTR, 0), Some(caller.sp));
    assert_eq!(load_stack(mem, *sp, Typ::PTR, 8), Some(Val::Ptr(main, 1)));

    assert_eq!(run(&sem, state, &SimOptions::default()).unwrap().result, 42);
}

#[test]
fn test_overwritten_link_slot_is_stuck() {
    let main = FrameFunction::with_header(Signature::main()).code(vec![
        FrameInstr::Op(Operation::LongConst(0), vec![], MReg::AX),
        FrameInstr::SetStack(MReg::AX, 0, Typ::Long),
        FrameInstr::Return,
    ]);
    let program = FrameProgram::new("main").function("main", main);
    // The entry frame's link is the framing block, not null
    assert!(matches!(run_main(&program, &[]), Err(Error::Stuck { steps: 3 })));
}

const LINK_OFS: i64 = 0;
const RETADDR_OFS: i64 = 8;

/// main(x) { call a(x); return } where `a` stores a long at `ofs` of its
/// own frame before leaving through `exit`. Bytes 16..24 of that frame
/// lie outside the header.
fn storing_callee(ofs: i64, exit: FrameInstr) -> FrameProgram {
    let a = FrameFunction::new(int_to_int(), 24, LINK_OFS, RETADDR_OFS).code(vec![
        FrameInstr::Op(Operation::LongConst(1), vec![], MReg::AX),
        FrameInstr::SetStack(MReg::AX, ofs, Typ::Long),
        exit,
    ]);
    let main = FrameFunction::with_header(int_to_int()).code(vec![
        FrameInstr::Call(int_to_int(), Callee::Symbol("a".into())),
        FrameInstr::Return,
    ]);
    FrameProgram::new("main")
        .function("b", increment())
        .function("a", a)
        .function("main", main)
}

fn tail_call_b() -> FrameInstr {
    FrameInstr::TailCall(int_to_int(), Callee::Symbol("b".into()))
}

#[test]
fn test_overwritten_return_address_slot_is_stuck() {
    let program = storing_callee(RETADDR_OFS, FrameInstr::Return);
    // Entering main, the call, entering a, the constant, the store
    assert!(matches!(
        run_main(&program, &[Val::Int(1)]),
        Err(Error::Stuck { steps: 5 })
    ));
}

#[test]
fn test_header_is_checked_before_tail_call() {
    for ofs in [LINK_OFS, RETADDR_OFS] {
        let program = storing_callee(ofs, tail_call_b());
        assert!(matches!(
            run_main(&program, &[Val::Int(1)]),
            Err(Error::Stuck { steps: 5 })
        ));
    }
    // A store past the header leaves the tail call intact: b(1) = 2
    let intact = storing_callee(16, tail_call_b());
    assert_eq!(run_main(&intact, &[Val::Int(1)]).unwrap().result, 2);
}

#[test]
fn test_stack_access_near_offset_limit_is_stuck() {
    let main = FrameFunction::with_header(Signature::main()).code(vec![
        FrameInstr::GetStack(i64::MAX - 2, Typ::Int, MReg::AX),
        FrameInstr::Return,
    ]);
    let program = FrameProgram::new("main").function("main", main);
    assert!(matches!(run_main(&program, &[]), Err(Error::Stuck { steps: 1 })));
}

#[test]
fn test_frames_are_freed_on_return() {
    let program = call_program();
    let genv = FrameGenv::new(&program).unwrap();
    let sem = FrameSemantics::new(&genv, host());
    let mut state = sem.entry_main(program.init_mem().unwrap(), &[Val::Int(1)]).unwrap();
    let mut frames = Vec::new();
    while sem.is_final(&state).is_none() {
        if let State::Running { sp: Val::Ptr(b, 0), .. } = &state {
            frames.push(*b);
        }
        state = sem.step(state).unwrap().1;
    }
    assert!(!frames.is_empty());
    assert!(frames.iter().all(|b| !state.mem().is_live(*b)));
    let Val::Ptr(framing, 0) = state.stack().entry().sp else {
        panic!("entry frame has no stack pointer");
    };
    assert!(state.mem().is_live(framing));
}

#[test]
fn test_tail_call_releases_frame_before_callee() {
    let a = FrameFunction::with_header(int_to_int())
        .code(vec![FrameInstr::TailCall(int_to_int(), Callee::Symbol("b".into()))]);
    let program = FrameProgram::new("a")
        .function("b", increment())
        .function("a", a);
    let genv = FrameGenv::new(&program).unwrap();
    let sem = FrameSemantics::new(&genv, host());
    let mut state = sem.entry_main(program.init_mem().unwrap(), &[Val::Int(41)]).unwrap();
    state = sem.step(state).unwrap().1;
    let State::Running { sp: Val::Ptr(frame, 0), .. } = &state else {
        panic!("expected a to be running");
    };
    let frame = *frame;
    state = sem.step(state).unwrap().1;
    assert!(matches!(&state, State::Calling { stack, .. } if stack.is_empty()));
    assert!(!state.mem().is_live(frame));
    assert_eq!(run(&sem, state, &SimOptions::default()).unwrap().result, 42);
}

// ============================================================================
// Parameters
// ============================================================================

#[test]
fn test_get_param_reads_caller_outgoing_area() {
    let last = FrameFunction::with_header(seven_ints()).code(vec![
        FrameInstr::GetParam(slot_byte_offset(0), Typ::Int, MReg::AX),
        FrameInstr::Return,
    ]);
    let program = FrameProgram::new("main")
        .function("last", last)
        .function("main", stack_argument_caller("last"));
    assert_eq!(run_main(&program, &[]).unwrap().result, 7);
}

#[test]
fn test_entry_places_stack_arguments_in_framing_block() {
    let main = FrameFunction::with_header(seven_ints()).code(vec![
        FrameInstr::GetParam(slot_byte_offset(0), Typ::Int, MReg::AX),
        FrameInstr::Return,
    ]);
    let program = FrameProgram::new("main").function("main", main);
    let args: Vec<Val> = (1..=7).map(Val::Int).collect();
    assert_eq!(run_main(&program, &args).unwrap().result, 7);
}

#[test]
fn test_external_call_reads_stack_arguments() {
    let seventh = ExternalFunction::External {
        name: "seventh".into(),
        sig: seven_ints(),
    };
    let program = FrameProgram::new("main")
        .external("seventh", seventh)
        .function("main", stack_argument_caller("seventh"));
    let outcome = run_main(&program, &[]).unwrap();
    assert_eq!(outcome.result, 7);
    let [Event::Syscall { name, args, .. }] = outcome.trace.as_slice() else {
        panic!("expected one external event");
    };
    assert_eq!(name, "seventh");
    assert_eq!(args, &(1..=7).map(Val::Int).collect::<Vec<_>>());
}

#[test]
fn test_get_param_with_broken_link_is_stuck() {
    let main = FrameFunction::with_header(Signature::main()).code(vec![
        FrameInstr::Op(Operation::LongConst(8), vec![], MReg::BX),
        FrameInstr::SetStack(MReg::BX, 0, Typ::Long),
        FrameInstr::GetParam(0, Typ::Int, MReg::AX),
        FrameInstr::Return,
    ]);
    let program = FrameProgram::new("main").function("main", main);
    assert!(matches!(run_main(&program, &[]), Err(Error::Stuck { steps: 3 })));
}

// ============================================================================
// Return addresses
// ============================================================================

#[test]
fn test_table_oracle_return_address() {
    let program = call_program();
    let genv = FrameGenv::new(&program).unwrap();
    let main = genv.find_symbol("main").unwrap();
    let oracle = TableOracle::new().site(main, 1, 0x40);
    let sem = FrameSemantics::with_oracle(&genv, host(), oracle);

    let mut state = sem.entry_main(program.init_mem().unwrap(), &[Val::Int(1)]).unwrap();
    for _ in 0..2 {
        state = sem.step(state).unwrap().1;
    }
    assert_eq!(state.stack().top().unwrap().ra, Val::Ptr(main, 0x40));
    let opts = SimOptions::new().check_invariants(true);
    assert_eq!(run(&sem, state, &opts).unwrap().result, 2);
}

#[test]
fn test_call_site_missing_from_table_is_stuck() {
    let program = call_program();
    let genv = FrameGenv::new(&program).unwrap();
    let sem = FrameSemantics::with_oracle(&genv, host(), TableOracle::new());
    let state = sem.entry_main(program.init_mem().unwrap(), &[Val::Int(1)]).unwrap();
    assert!(matches!(
        run(&sem, state, &SimOptions::default()),
        Err(Error::Stuck { steps: 1 })
    ));
}

// ============================================================================
// Registers, built-ins and the external interface
// ============================================================================

#[test]
fn test_registers_are_shared_with_callee() {
    let clobber = FrameFunction::with_header(Signature::main()).code(vec![
        FrameInstr::Op(Operation::IntConst(100), vec![], MReg::BX),
        FrameInstr::Return,
    ]);
    let main = FrameFunction::with_header(Signature::main()).code(vec![
        FrameInstr::Op(Operation::IntConst(9), vec![], MReg::BX),
        FrameInstr::Call(Signature::main(), Callee::Symbol("clobber".into())),
        FrameInstr::Op(Operation::Move, vec![MReg::BX], MReg::AX),
        FrameInstr::Return,
    ]);
    let program = FrameProgram::new("main")
        .function("clobber", clobber)
        .function("main", main);
    assert_eq!(run_main(&program, &[]).unwrap().result, 100);
}

#[test]
fn test_builtin_reads_frame_memory() {
    let inc = ExternalFunction::Builtin {
        name: "inc".into(),
        sig: int_to_int(),
    };
    let main = FrameFunction::new(Signature::main(), 24, 8, 16).code(vec![
        FrameInstr::Op(Operation::IntConst(41), vec![], MReg::BX),
        FrameInstr::SetStack(MReg::BX, 0, Typ::Int),
        FrameInstr::Builtin(
            inc,
            vec![BuiltinArg::LoadStack(Chunk::Int32, 0)],
            BuiltinRes::Base(MReg::AX),
        ),
        FrameInstr::Return,
    ]);
    let program = FrameProgram::new("main").function("main", main);
    let outcome = run_main(&program, &[]).unwrap();
    assert_eq!(outcome.result, 42);
    assert!(outcome.trace.is_empty());
}

#[test]
fn test_after_external_resumes_caller() {
    let inc = ExternalFunction::External {
        name: "inc".into(),
        sig: int_to_int(),
    };
    let main = FrameFunction::with_header(Signature::main()).code(vec![
        FrameInstr::Op(Operation::IntConst(41), vec![], MReg::DI),
        FrameInstr::Call(int_to_int(), Callee::Symbol("inc".into())),
        FrameInstr::Return,
    ]);
    let program = FrameProgram::new("main")
        .external("inc", inc.clone())
        .function("main", main);
    let genv = FrameGenv::new(&program).unwrap();
    let sem = FrameSemantics::new(&genv, HostCalls::new());
    let mut state = sem.entry_main(program.init_mem().unwrap(), &[]).unwrap();
    while sem.at_external(&state).is_none() {
        state = sem.step(state).unwrap().1;
    }
    assert_eq!(sem.at_external(&state), Some((inc, vec![Val::Int(41)])));

    let mut mem = state.mem().clone();
    let scratch = mem.alloc(0, 8).unwrap();
    let resumed = sem.after_external(Some(Val::Int(7)), state, mem).unwrap();
    assert!(resumed.mem().is_live(scratch));
    assert_eq!(resumed.regs().get(MReg::AX), Val::Int(7));
    assert_eq!(run(&sem, resumed, &SimOptions::default()).unwrap().result, 7);
}

#[test]
fn test_entry_rejects_wrong_argument_types() {
    let program = call_program();
    let genv = FrameGenv::new(&program).unwrap();
    let sem = FrameSemantics::new(&genv, host());
    let mem = program.init_mem().unwrap();
    assert!(matches!(
        sem.entry_main(mem.clone(), &[Val::Long(1)]),
        Err(Error::ArgumentType { .. })
    ));
    let err = sem.entry_main(mem, &[]).unwrap_err();
    assert!(matches!(err, Error::ArityMismatch { expected: 1, got: 0, .. }));
    assert!(err.is_entry_error());
}

#[test]
fn test_framing_block_is_reused_by_store_stack() {
    // The stack-slot helpers address the entry frame like any other
    let program = call_program();
    let genv = FrameGenv::new(&program).unwrap();
    let sem = FrameSemantics::new(&genv, host());
    let state = sem.entry_main(program.init_mem().unwrap(), &[Val::Int(1)]).unwrap();
    let sp = state.stack().entry().sp;
    let mut mem = state.mem().clone();
    assert_eq!(store_stack(&mut mem, sp, Typ::Int, 4, Val::Int(3)), Some(()));
    assert_eq!(load_stack(&mem, sp, Typ::Int, 4), Some(Val::Int(3)));
    assert_eq!(store_stack(&mut mem, sp, Typ::Long, 16, Val::Int(3)), None);
}
