//! Registers clobbered by instructions: a fixed policy per instruction kind

use super::locations::SlotKind;
use crate::machine::{Addressing, Chunk, Condition, ExternalFunction, MReg, Operation, Typ};

const NONE: &[MReg] = &[];

pub fn destroyed_by_op(op: &Operation) -> &'static [MReg] {
    match op {
        Operation::Div | Operation::DivU | Operation::Mod | Operation::ModU | Operation::DivL => {
            &[MReg::AX, MReg::DX]
        }
        Operation::Cmp(_) => &[MReg::AX, MReg::CX],
        _ => NONE,
    }
}

pub fn destroyed_by_load(_chunk: Chunk, _addr: &Addressing) -> &'static [MReg] {
    NONE
}

pub fn destroyed_by_store(_chunk: Chunk, _addr: &Addressing) -> &'static [MReg] {
    NONE
}

pub fn destroyed_by_cond(_cond: &Condition) -> &'static [MReg] {
    NONE
}

pub fn destroyed_by_jumptable() -> &'static [MReg] {
    &[MReg::AX, MReg::DX]
}

/// Reading an incoming slot goes through the parent frame's pointer
pub fn destroyed_by_getstack(kind: SlotKind) -> &'static [MReg] {
    match kind {
        SlotKind::Incoming => &[MReg::TEMP_FOR_PARENT_FRAME],
        _ => NONE,
    }
}

pub fn destroyed_by_setstack(_ty: Typ) -> &'static [MReg] {
    NONE
}

pub fn destroyed_by_builtin(ef: &ExternalFunction) -> &'static [MReg] {
    match ef {
        ExternalFunction::Memcpy { .. } => &[MReg::CX, MReg::SI, MReg::DI],
        _ => NONE,
    }
}

pub fn destroyed_at_function_entry() -> &'static [MReg] {
    &[MReg::R10]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Comparison;

    #[test]
    fn test_division_and_comparison_clobbers() {
        assert_eq!(destroyed_by_op(&Operation::Div), &[MReg::AX, MReg::DX]);
        assert_eq!(
            destroyed_by_op(&Operation::Cmp(Condition::Comp(Comparison::Eq))),
            &[MReg::AX, MReg::CX]
        );
        assert!(destroyed_by_op(&Operation::Add).is_empty());
    }

    #[test]
    fn test_getstack_clobbers_only_for_incoming() {
        assert_eq!(destroyed_by_getstack(SlotKind::Incoming), &[MReg::AX]);
        assert!(destroyed_by_getstack(SlotKind::Local).is_empty());
        assert!(destroyed_by_getstack(SlotKind::Outgoing).is_empty());
    }

    #[test]
    fn test_builtin_clobbers() {
        let memcpy = ExternalFunction::Memcpy { size: 8, align: 8 };
        assert_eq!(destroyed_by_builtin(&memcpy).len(), 3);
        assert!(destroyed_by_builtin(&ExternalFunction::Debug).is_empty());
    }
}
