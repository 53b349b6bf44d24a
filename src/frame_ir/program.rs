//! Frame-IR functions: flat code plus the frame layout

use serde::{Deserialize, Serialize};

use super::instruction::{FrameInstr, Label};
use crate::machine::{FunctionSig, GlobalEnv, Program, Signature};

/// Function of the Frame-IR.
///
/// The frame is the block `[0, stacksize)` allocated at entry. The link
/// slot (caller's stack pointer) and the return-address slot are 8-byte
/// slots at `link_ofs` and `retaddr_ofs` inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameFunction {
    pub sig: Signature,
    pub code: Vec<FrameInstr>,
    pub stacksize: i64,
    pub link_ofs: i64,
    pub retaddr_ofs: i64,
}

impl FrameFunction {
    pub fn new(sig: Signature, stacksize: i64, link_ofs: i64, retaddr_ofs: i64) -> Self {
        Self {
            sig,
            code: Vec::new(),
            stacksize,
            link_ofs,
            retaddr_ofs,
        }
    }

    /// Frame holding only the header: link at 0, return address at 8
    pub fn with_header(sig: Signature) -> Self {
        Self::new(sig, 16, 0, 8)
    }

    pub fn code(mut self, code: Vec<FrameInstr>) -> Self {
        self.code = code;
        self
    }

    /// Position right after the first `Label(lbl)`
    pub fn find_label(&self, lbl: Label) -> Option<usize> {
        self.code
            .iter()
            .position(|i| *i == FrameInstr::Label(lbl))
            .map(|pos| pos + 1)
    }
}

impl FunctionSig for FrameFunction {
    fn sig(&self) -> &Signature {
        &self.sig
    }

    fn is_leaf(&self) -> bool {
        !self.code.iter().any(FrameInstr::is_call)
    }
}

pub type FrameProgram = Program<FrameFunction>;

pub type FrameGenv = GlobalEnv<FrameFunction>;
