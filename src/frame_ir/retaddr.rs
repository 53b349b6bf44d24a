//! Return-address choice
//!
//! A call pushes `Ptr(caller_block, ofs)` as its return address. Which
//! offset stands for a given call site is decided by code emission, so the
//! interpreter takes it from an injected oracle. The oracle must be a
//! function of the call site: the same function and resumption point always
//! give the same offset.

use std::collections::BTreeMap;

use super::program::FrameFunction;
use crate::machine::BlockId;

pub trait ReturnAddressOracle {
    /// Offset of the return address of a call in `f` (stored in block
    /// `func`) whose continuation starts at code index `resume`; `None`
    /// leaves the call stuck
    fn choose(&self, func: BlockId, f: &FrameFunction, resume: usize) -> Option<i64>;

    /// Whether `ofs` is a valid return address for that call site
    fn admits(&self, func: BlockId, f: &FrameFunction, resume: usize, ofs: i64) -> bool {
        self.choose(func, f, resume) == Some(ofs)
    }
}

impl<T: ReturnAddressOracle + ?Sized> ReturnAddressOracle for &T {
    fn choose(&self, func: BlockId, f: &FrameFunction, resume: usize) -> Option<i64> {
        (**self).choose(func, f, resume)
    }

    fn admits(&self, func: BlockId, f: &FrameFunction, resume: usize, ofs: i64) -> bool {
        (**self).admits(func, f, resume, ofs)
    }
}

/// The offset is the index of the instruction the call resumes at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodePositionOracle;

impl ReturnAddressOracle for CodePositionOracle {
    fn choose(&self, _func: BlockId, f: &FrameFunction, resume: usize) -> Option<i64> {
        (resume <= f.code.len()).then_some(resume as i64)
    }
}

/// Return addresses from a fixed table, one `(function, resume, offset)`
/// entry per call site, e.g. produced by an emitter. Call sites missing
/// from the table are stuck.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableOracle {
    sites: BTreeMap<(BlockId, usize), i64>,
}

impl TableOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn site(mut self, func: BlockId, resume: usize, ofs: i64) -> Self {
        self.sites.insert((func, resume), ofs);
        self
    }
}

impl ReturnAddressOracle for TableOracle {
    fn choose(&self, func: BlockId, _f: &FrameFunction, resume: usize) -> Option<i64> {
        self.sites.get(&(func, resume)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_ir::FrameInstr;
    use crate::machine::Signature;

    #[test]
    fn test_code_position_oracle() {
        let f = FrameFunction::with_header(Signature::main()).code(vec![FrameInstr::Return]);
        let b = BlockId(1);
        assert_eq!(CodePositionOracle.choose(b, &f, 1), Some(1));
        assert!(CodePositionOracle.admits(b, &f, 1, 1));
        assert!(!CodePositionOracle.admits(b, &f, 1, 0));
        assert_eq!(CodePositionOracle.choose(b, &f, 2), None);
    }

    #[test]
    fn test_table_oracle() {
        let f = FrameFunction::with_header(Signature::main());
        let oracle = TableOracle::new().site(BlockId(1), 3, 40);
        assert_eq!(oracle.choose(BlockId(1), &f, 3), Some(40));
        assert_eq!(oracle.choose(BlockId(1), &f, 4), None);
        assert_eq!(oracle.choose(BlockId(2), &f, 3), None);
    }
}
