//! Calling convention: argument and result locations, and the three
//! location-state transforms applied at call boundaries

use super::locations::{Loc, Locset, Pair, SlotKind};
use crate::machine::{Chunk, MReg, Mem, Regset, Signature, Typ, Val};
use crate::{Error, Result};

/// Bound on outgoing stack arguments, in words
pub const MAX_OUTGOING_WORDS: i64 = 4096;

/// Byte offset of the outgoing argument area from the stack pointer
pub const ARG_AREA_OFFSET: i64 = 0;

/// Byte offset of an outgoing (or incoming) argument slot
pub fn slot_byte_offset(ofs: i64) -> i64 {
    ARG_AREA_OFFSET + 4 * ofs
}

/// Argument locations of a signature.
///
/// Integer-like arguments take `DI SI DX CX R8 R9`, floats take `X0..X7`;
/// once a class runs out, arguments go to two-word outgoing slots in order.
pub fn loc_arguments(sig: &Signature) -> Vec<Pair<Loc>> {
    arguments_with_size(sig).0
}

/// Words of outgoing stack space the arguments need
pub fn size_arguments(sig: &Signature) -> i64 {
    arguments_with_size(sig).1
}

fn arguments_with_size(sig: &Signature) -> (Vec<Pair<Loc>>, i64) {
    let (mut ints, mut floats, mut ofs) = (0, 0, 0);
    let locs = sig
        .args
        .iter()
        .map(|&ty| {
            let reg = if ty.is_float() {
                floats += 1;
                MReg::FLOAT_PARAMS.get(floats - 1)
            } else {
                ints += 1;
                MReg::INT_PARAMS.get(ints - 1)
            };
            match reg {
                Some(r) => Pair::One(Loc::Reg(*r)),
                None => {
                    let l = Loc::Slot(SlotKind::Outgoing, ofs, ty);
                    ofs += 2;
                    Pair::One(l)
                }
            }
        })
        .collect();
    (locs, ofs)
}

/// Register holding the result of a signature
pub fn loc_result(sig: &Signature) -> Pair<MReg> {
    match sig.res {
        Some(Typ::Float) | Some(Typ::Single) => Pair::One(MReg::X0),
        _ => Pair::One(MReg::AX),
    }
}

/// Reads the result of `sig` back from its result registers
pub fn read_result(sig: &Signature, get: impl Fn(MReg) -> Val) -> Val {
    match loc_result(sig) {
        Pair::One(r) => get(r),
        Pair::TwoLong(hi, lo) => Val::long_of_words(get(hi), get(lo)),
    }
}

/// Entry transform: registers are kept, incoming slots see the caller's
/// outgoing slots, local and outgoing slots start undefined
pub fn call_regs(caller: &Locset) -> Locset {
    let mut ls = Locset::new();
    ls.set_regs(*caller.regs());
    for (l, v) in caller.slots() {
        if let Loc::Slot(SlotKind::Outgoing, ofs, ty) = l {
            ls.set(Loc::Slot(SlotKind::Incoming, ofs, ty), v);
        }
    }
    ls
}

/// Return transform: callee-saved registers come from the caller, the
/// other registers from the callee; outgoing slots become undefined and
/// the remaining slots are the caller's
pub fn return_regs(caller: &Locset, callee: &Locset) -> Locset {
    let mut ls = caller.clone();
    ls.retain_slots(|kind| kind != SlotKind::Outgoing);
    for r in MReg::ALL {
        if !r.is_callee_saved() {
            ls.set(Loc::Reg(r), callee.reg(r));
        }
    }
    ls
}

/// External-call transform: every caller-saved register becomes undefined
pub fn undef_caller_save_regs(ls: &Locset) -> Locset {
    let mut out = ls.clone();
    out.set_regs(ls.regs().undef_caller_save());
    out
}

/// Outgoing slot of an argument, checked against the area bound
pub(crate) fn check_outgoing(ofs: i64, ty: Typ) -> Result<()> {
    if ofs < 0 || ofs + ty.words() > MAX_OUTGOING_WORDS {
        return Err(Error::SlotOutOfBounds {
            ofs,
            limit: MAX_OUTGOING_WORDS,
        });
    }
    Ok(())
}

/// Location state of the outermost caller: `args` placed in the
/// argument locations of `sig`
pub fn make_arguments(sig: &Signature, args: &[Val]) -> Result<Locset> {
    let mut ls = Locset::new();
    for (pair, v) in loc_arguments(sig).into_iter().zip(args) {
        match pair {
            Pair::One(l) => {
                if let Loc::Slot(_, ofs, ty) = l {
                    check_outgoing(ofs, ty)?;
                }
                ls.set(l, *v);
            }
            Pair::TwoLong(hi, lo) => {
                ls.set(hi, v.hiword());
                ls.set(lo, v.loword());
            }
        }
    }
    Ok(ls)
}

/// Checks entry arguments against the signature of `function`
pub fn check_entry_arguments(function: &str, sig: &Signature, args: &[Val]) -> Result<()> {
    if args.len() != sig.args.len() {
        return Err(Error::ArityMismatch {
            function: function.to_string(),
            expected: sig.args.len(),
            got: args.len(),
        });
    }
    for (index, (v, ty)) in args.iter().zip(&sig.args).enumerate() {
        if !v.has_type(*ty) {
            return Err(Error::ArgumentType {
                function: function.to_string(),
                index,
                value: v.to_string(),
                expected: *ty,
            });
        }
    }
    Ok(())
}

/// Frees the frame `[0, size)` of the block `sp` points to
pub fn free_frame(mem: &mut Mem, sp: Val, size: i64) -> Option<()> {
    match sp {
        Val::Ptr(b, 0) => mem.free(b, 0, size),
        _ => None,
    }
}

/// Arguments of an external call, read from the caller's location state
/// (stack arguments sit in the caller's outgoing slots)
pub fn extcall_arguments(ls: &Locset, sig: &Signature) -> Vec<Val> {
    loc_arguments(sig)
        .into_iter()
        .map(|pair| ls.get_pair(pair))
        .collect()
}

/// `load_stack`: reads a value of type `ty` at `sp + ofs`
pub fn load_stack(mem: &Mem, sp: Val, ty: Typ, ofs: i64) -> Option<Val> {
    mem.loadv(Chunk::of_type(ty), sp.offset_ptr(ofs))
}

/// `store_stack`: writes `v` with type `ty` at `sp + ofs`
pub fn store_stack(mem: &mut Mem, sp: Val, ty: Typ, ofs: i64, v: Val) -> Option<()> {
    mem.storev(Chunk::of_type(ty), sp.offset_ptr(ofs), v)
}

/// Arguments of an external call in a frame-based state: registers from
/// `regs`, stack arguments from the caller's frame at `parent_sp`
pub fn extcall_arguments_in_frame(
    regs: &Regset,
    mem: &Mem,
    parent_sp: Val,
    sig: &Signature,
) -> Option<Vec<Val>> {
    let read = |l: Loc| match l {
        Loc::Reg(r) => Some(regs.get(r)),
        Loc::Slot(SlotKind::Outgoing, ofs, ty) => {
            load_stack(mem, parent_sp, ty, slot_byte_offset(ofs))
        }
        Loc::Slot(..) => None,
    };
    loc_arguments(sig)
        .into_iter()
        .map(|pair| match pair {
            Pair::One(l) => read(l),
            Pair::TwoLong(hi, lo) => Some(Val::long_of_words(read(hi)?, read(lo)?)),
        })
        .collect()
}
