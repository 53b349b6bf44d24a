//! Machine registers and the register file
//!
//! The register set models an x86-64-like target: fifteen integer registers
//! (the stack pointer is implicit in the states, never a register) and
//! sixteen SSE registers.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::value::Val;

/// Machine register
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MReg {
    // Integer registers
    AX,
    BX,
    CX,
    DX,
    SI,
    DI,
    BP,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    // Float registers
    X0,
    X1,
    X2,
    X3,
    X4,
    X5,
    X6,
    X7,
    X8,
    X9,
    X10,
    X11,
    X12,
    X13,
    X14,
    X15,
}

/// Number of machine registers
pub const NUM_MREGS: usize = 31;

impl MReg {
    /// Every register, in index order
    pub const ALL: [MReg; NUM_MREGS] = [
        MReg::AX,
        MReg::BX,
        MReg::CX,
        MReg::DX,
        MReg::SI,
        MReg::DI,
        MReg::BP,
        MReg::R8,
        MReg::R9,
        MReg::R10,
        MReg::R11,
        MReg::R12,
        MReg::R13,
        MReg::R14,
        MReg::R15,
        MReg::X0,
        MReg::X1,
        MReg::X2,
        MReg::X3,
        MReg::X4,
        MReg::X5,
        MReg::X6,
        MReg::X7,
        MReg::X8,
        MReg::X9,
        MReg::X10,
        MReg::X11,
        MReg::X12,
        MReg::X13,
        MReg::X14,
        MReg::X15,
    ];

    /// Registers preserved across calls
    pub const CALLEE_SAVED: [MReg; 6] = [MReg::BX, MReg::BP, MReg::R12, MReg::R13, MReg::R14, MReg::R15];

    /// Integer argument registers, in order
    pub const INT_PARAMS: [MReg; 6] = [MReg::DI, MReg::SI, MReg::DX, MReg::CX, MReg::R8, MReg::R9];

    /// Float argument registers, in order
    pub const FLOAT_PARAMS: [MReg; 8] = [
        MReg::X0,
        MReg::X1,
        MReg::X2,
        MReg::X3,
        MReg::X4,
        MReg::X5,
        MReg::X6,
        MReg::X7,
    ];

    /// Scratch register holding the caller's frame pointer while reading
    /// incoming parameters
    pub const TEMP_FOR_PARENT_FRAME: MReg = MReg::AX;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_callee_saved(self) -> bool {
        Self::CALLEE_SAVED.contains(&self)
    }

    pub fn is_float(self) -> bool {
        self >= MReg::X0
    }
}

impl fmt::Display for MReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format!("{:?}", self).to_lowercase())
    }
}

/// Total map from machine registers to values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Regset {
    vals: [Val; NUM_MREGS],
}

impl Regset {
    /// Every register `Undef`
    pub fn new() -> Self {
        Self {
            vals: [Val::Undef; NUM_MREGS],
        }
    }

    pub fn get(&self, r: MReg) -> Val {
        self.vals[r.index()]
    }

    pub fn set(&mut self, r: MReg, v: Val) {
        self.vals[r.index()] = v;
    }

    /// Functional update
    pub fn with(mut self, r: MReg, v: Val) -> Self {
        self.set(r, v);
        self
    }

    /// Reads a list of registers
    pub fn read_all(&self, regs: &[MReg]) -> Vec<Val> {
        regs.iter().map(|r| self.get(*r)).collect()
    }

    /// Sets every register of `regs` to `Undef`
    pub fn undef_regs(mut self, regs: &[MReg]) -> Self {
        for r in regs {
            self.set(*r, Val::Undef);
        }
        self
    }

    /// Clobbers everything but the callee-saved registers
    pub fn undef_caller_save(mut self) -> Self {
        for r in MReg::ALL {
            if !r.is_callee_saved() {
                self.set(r, Val::Undef);
            }
        }
        self
    }

    /// Iterates over `(register, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (MReg, Val)> + '_ {
        MReg::ALL.iter().map(move |r| (*r, self.get(*r)))
    }
}

impl Default for Regset {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_matches_table() {
        for (i, r) in MReg::ALL.iter().enumerate() {
            assert_eq!(r.index(), i);
        }
    }

    #[test]
    fn test_undef_caller_save_keeps_callee_saved() {
        let mut rs = Regset::new();
        rs.set(MReg::BX, Val::Int(1));
        rs.set(MReg::AX, Val::Int(2));
        rs.set(MReg::X3, Val::Float(1.0));
        let rs = rs.undef_caller_save();
        assert_eq!(rs.get(MReg::BX), Val::Int(1));
        assert_eq!(rs.get(MReg::AX), Val::Undef);
        assert_eq!(rs.get(MReg::X3), Val::Undef);
    }
}
