//! Location-IR functions (control-flow graphs of basic blocks)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::instruction::{LocInstr, Node};
use crate::machine::{FunctionSig, GlobalEnv, Program, Signature};

/// Function of the Location-IR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocFunction {
    pub sig: Signature,
    /// Bytes of stack the function allocates at entry
    pub stacksize: i64,
    /// Basic blocks by label
    pub code: BTreeMap<Node, Vec<LocInstr>>,
    pub entrypoint: Node,
}

impl LocFunction {
    /// Function without blocks yet
    pub fn new(sig: Signature, stacksize: i64, entrypoint: Node) -> Self {
        Self {
            sig,
            stacksize,
            code: BTreeMap::new(),
            entrypoint,
        }
    }

    /// Adds (or replaces) the block labelled `node`
    pub fn block(mut self, node: Node, instrs: Vec<LocInstr>) -> Self {
        self.code.insert(node, instrs);
        self
    }

    pub fn block_at(&self, node: Node) -> Option<&[LocInstr]> {
        self.code.get(&node).map(Vec::as_slice)
    }
}

impl FunctionSig for LocFunction {
    fn sig(&self) -> &Signature {
        &self.sig
    }

    fn is_leaf(&self) -> bool {
        !self.code.values().flatten().any(LocInstr::is_call)
    }
}

/// Whole Location-IR program
pub type LocProgram = Program<LocFunction>;

/// Global environment of a Location-IR program
pub type LocGenv = GlobalEnv<LocFunction>;
