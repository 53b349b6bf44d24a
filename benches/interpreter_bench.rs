use backsim::conventions::Callee;
use backsim::driver::{run, SimOptions};
use backsim::frame_ir::{FrameFunction, FrameGenv, FrameInstr, FrameProgram, FrameSemantics};
use backsim::location_ir::{LocFunction, LocGenv, LocInstr, LocProgram, LocationSemantics};
use backsim::machine::{Comparison, Condition, HostCalls, MReg, Operation, Signature, Typ, Val};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn int_to_int() -> Signature {
    Signature::new(vec![Typ::Int], Some(Typ::Int))
}

/// main(n) { s = 0; while n > 0 { s += id(n); n -= 1 } }
fn location_loop() -> LocProgram {
    let id = LocFunction::new(int_to_int(), 0, 1).block(
        1,
        vec![
            LocInstr::Op(Operation::Move, vec![MReg::DI], MReg::AX),
            LocInstr::Return,
        ],
    );
    let main = LocFunction::new(int_to_int(), 0, 1)
        .block(
            1,
            vec![
                LocInstr::Op(Operation::Move, vec![MReg::DI], MReg::BX),
                LocInstr::Op(Operation::IntConst(0), vec![], MReg::R12),
                LocInstr::Branch(2),
            ],
        )
        .block(
            2,
            vec![LocInstr::Cond(
                Condition::CompImm(Comparison::Gt, 0),
                vec![MReg::BX],
                3,
                4,
            )],
        )
        .block(
            3,
            vec![
                LocInstr::Op(Operation::Move, vec![MReg::BX], MReg::DI),
                LocInstr::Call(int_to_int(), Callee::Symbol("id".into())),
                LocInstr::Op(Operation::Add, vec![MReg::R12, MReg::AX], MReg::R12),
                LocInstr::Op(Operation::AddImm(-1), vec![MReg::BX], MReg::BX),
                LocInstr::Branch(2),
            ],
        )
        .block(
            4,
            vec![
                LocInstr::Op(Operation::Move, vec![MReg::R12], MReg::AX),
                LocInstr::Return,
            ],
        );
    LocProgram::new("main")
        .function("id", id)
        .function("main", main)
}

fn frame_loop() -> FrameProgram {
    let id = FrameFunction::with_header(int_to_int()).code(vec![
        FrameInstr::Op(Operation::Move, vec![MReg::DI], MReg::AX),
        FrameInstr::Return,
    ]);
    let main = FrameFunction::with_header(int_to_int()).code(vec![
        FrameInstr::Op(Operation::Move, vec![MReg::DI], MReg::BX),
        FrameInstr::Op(Operation::IntConst(0), vec![], MReg::R12),
        FrameInstr::Label(1),
        FrameInstr::Cond(Condition::CompImm(Comparison::Le, 0), vec![MReg::BX], 2),
        FrameInstr::Op(Operation::Move, vec![MReg::BX], MReg::DI),
        FrameInstr::Call(int_to_int(), Callee::Symbol("id".into())),
        FrameInstr::Op(Operation::Add, vec![MReg::R12, MReg::AX], MReg::R12),
        FrameInstr::Op(Operation::AddImm(-1), vec![MReg::BX], MReg::BX),
        FrameInstr::Goto(1),
        FrameInstr::Label(2),
        FrameInstr::Op(Operation::Move, vec![MReg::R12], MReg::AX),
        FrameInstr::Return,
    ]);
    FrameProgram::new("main")
        .function("id", id)
        .function("main", main)
}

fn interpreter_benchmark(c: &mut Criterion) {
    let options = SimOptions::new().collect_trace(false);

    let lp = location_loop();
    let lgenv = LocGenv::new(&lp).unwrap();
    let lsem = LocationSemantics::new(&lgenv, HostCalls::new());
    let lmem = lp.init_mem().unwrap();
    c.bench_function("location-ir loop of 200 calls", |b| {
        b.iter(|| {
            let state = lsem.entry_main(lmem.clone(), &[Val::Int(black_box(200))]).unwrap();
            run(&lsem, state, &options).unwrap()
        })
    });

    let fp = frame_loop();
    let fgenv = FrameGenv::new(&fp).unwrap();
    let fsem = FrameSemantics::new(&fgenv, HostCalls::new());
    let fmem = fp.init_mem().unwrap();
    c.bench_function("frame-ir loop of 200 calls", |b| {
        b.iter(|| {
            let state = fsem.entry_main(fmem.clone(), &[Val::Int(black_box(200))]).unwrap();
            run(&fsem, state, &options).unwrap()
        })
    });

    let checked = options.clone().check_invariants(true);
    c.bench_function("location-ir loop with invariant checks", |b| {
        b.iter(|| {
            let state = lsem.entry_main(lmem.clone(), &[Val::Int(black_box(200))]).unwrap();
            run(&lsem, state, &checked).unwrap()
        })
    });
}

criterion_group!(benches, interpreter_benchmark);
criterion_main!(benches);
