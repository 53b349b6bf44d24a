//! Location-IR execution states and the call stack

use std::fmt;

use super::instruction::Node;
use crate::conventions::Locset;
use crate::machine::{BlockId, Mem, Val};

/// Position inside the running function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramPoint {
    /// About to enter the block labelled `n`
    AtNode(Node),
    /// Executing the block labelled `n`, at instruction `index`
    InBlock(Node, usize),
}

impl fmt::Display for ProgramPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramPoint::AtNode(n) => write!(f, "node {}", n),
            ProgramPoint::InBlock(n, i) => write!(f, "node {} instr {}", n, i),
        }
    }
}

/// Suspended caller
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    pub func: BlockId,
    pub sp: Val,
    pub locs: Locset,
    /// Block and instruction index right after the call
    pub resume: (Node, usize),
}

/// Pending calls, innermost last
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallStack {
    frames: Vec<StackFrame>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: StackFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<StackFrame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&StackFrame> {
        self.frames.last()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Frames from the outermost caller inwards
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    /// Location state of the innermost caller. The outermost pseudo-caller
    /// has every location undefined.
    pub fn parent_locset(&self) -> Locset {
        self.top().map(|fr| fr.locs.clone()).unwrap_or_default()
    }
}

/// Location-IR execution state
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Running {
        stack: CallStack,
        func: BlockId,
        sp: Val,
        point: ProgramPoint,
        locs: Locset,
        mem: Mem,
    },
    /// About to enter `callee`; `locs` is the caller's location state
    Calling {
        stack: CallStack,
        callee: BlockId,
        locs: Locset,
        mem: Mem,
    },
    /// Returned to the caller on top of `stack`
    Returned {
        stack: CallStack,
        locs: Locset,
        mem: Mem,
    },
}

impl State {
    pub fn stack(&self) -> &CallStack {
        match self {
            State::Running { stack, .. }
            | State::Calling { stack, .. }
            | State::Returned { stack, .. } => stack,
        }
    }

    pub fn locs(&self) -> &Locset {
        match self {
            State::Running { locs, .. } | State::Calling { locs, .. } | State::Returned { locs, .. } => {
                locs
            }
        }
    }

    pub fn mem(&self) -> &Mem {
        match self {
            State::Running { mem, .. } | State::Calling { mem, .. } | State::Returned { mem, .. } => mem,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            State::Running { .. } => "running",
            State::Calling { .. } => "calling",
            State::Returned { .. } => "returned",
        }
    }
}
