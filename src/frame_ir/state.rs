//! Frame-IR execution states and the call stack

use crate::machine::{BlockId, Mem, Regset, Val};

/// Suspended caller
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    pub func: BlockId,
    pub sp: Val,
    /// Return address pushed by the call
    pub ra: Val,
    /// Code index right after the call
    pub resume: usize,
}

/// Stack pointer and return address of the outermost pseudo-caller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryFrame {
    pub sp: Val,
    pub ra: Val,
}

impl Default for EntryFrame {
    fn default() -> Self {
        Self {
            sp: Val::NULL,
            ra: Val::NULL,
        }
    }
}

/// Pending calls, innermost last, above the entry frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallStack {
    frames: Vec<StackFrame>,
    entry: EntryFrame,
}

impl CallStack {
    pub fn new(entry: EntryFrame) -> Self {
        Self {
            frames: Vec::new(),
            entry,
        }
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

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    pub fn entry(&self) -> EntryFrame {
        self.entry
    }

    /// Stack pointer of the innermost caller
    pub fn parent_sp(&self) -> Val {
        self.top().map_or(self.entry.sp, |fr| fr.sp)
    }

    /// Return address into the innermost caller
    pub fn parent_ra(&self) -> Val {
        self.top().map_or(self.entry.ra, |fr| fr.ra)
    }
}

/// Frame-IR execution state
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    /// Executing `code[pc..]` of `func`
    Running {
        stack: CallStack,
        func: BlockId,
        sp: Val,
        pc: usize,
        regs: Regset,
        mem: Mem,
    },
    Calling {
        stack: CallStack,
        callee: BlockId,
        regs: Regset,
        mem: Mem,
    },
    Returned {
        stack: CallStack,
        regs: Regset,
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

    pub fn regs(&self) -> &Regset {
        match self {
            State::Running { regs, .. } | State::Calling { regs, .. } | State::Returned { regs, .. } => {
                regs
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
