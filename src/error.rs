//! Error types for program construction, entry and driving
//!
//! Stepping itself never produces an error: a state without successor is
//! stuck and `step` returns `None`. Errors describe what goes wrong around
//! the interpreters (building the global environment, validating the
//! entry point, running a program to completion).

use thiserror::Error;

use crate::machine::{BlockId, Typ};

/// Simulator errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Program construction errors
    /// Two definitions share a name
    #[error("Duplicate definition of symbol: {name}")]
    DuplicateSymbol {
        /// Symbol name
        name: String,
    },

    /// Reference to a symbol the program does not define
    ///
    /// **Triggered by:** an initialiser `AddrOf(sym, ofs)` or an entry point
    /// naming an unknown symbol
    #[error("Undefined symbol: {name}")]
    UndefinedSymbol {
        /// Symbol name
        name: String,
    },

    /// The initial memory cannot be used to start a program
    ///
    /// **Triggered by:** dangling pointers stored in memory, function blocks
    /// the memory never allocated, misaligned initialisers
    #[error("Ill-formed initial memory: {0}")]
    IllFormedMemory(String),

    // Entry errors
    /// The entry value is not a pointer to a function
    #[error("Not a function: {0}")]
    NotAFunction(String),

    /// Wrong number of arguments for the entry function
    #[error("Signature mismatch for {function}: expected {expected} argument(s), got {got}")]
    ArityMismatch {
        /// Function name
        function: String,
        /// Arity of the signature
        expected: usize,
        /// Number of arguments supplied
        got: usize,
    },

    /// An argument does not fit its declared type
    #[error("Argument {index} of {function}: {value} does not have type {expected:?}")]
    ArgumentType {
        /// Function name
        function: String,
        /// Position of the argument
        index: usize,
        /// Rendered argument value
        value: String,
        /// Declared type
        expected: Typ,
    },

    /// A stack argument lands outside the outgoing area
    #[error("Stack argument at word {ofs} exceeds the outgoing area bound of {limit} words")]
    SlotOutOfBounds {
        /// Slot offset, in words
        ofs: i64,
        /// Convention bound, in words
        limit: i64,
    },

    // Driver errors
    /// No transition applies
    #[error("Execution stuck after {steps} step(s)")]
    Stuck {
        /// Steps executed before getting stuck
        steps: u64,
    },

    /// The program returned, but not an integer
    #[error("Program returned a non-integer result: {value}")]
    InvalidResult {
        /// Rendered result value
        value: String,
    },

    /// The configured step budget ran out
    #[error("Step limit of {limit} reached")]
    StepLimit {
        /// Configured limit
        limit: u64,
    },

    /// The well-formedness checker rejected a state
    #[error("Invariant violated after {steps} step(s): {message}")]
    InvariantViolation {
        /// Steps executed so far
        steps: u64,
        /// Checker diagnostic
        message: String,
    },

    /// Options could not be parsed
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

impl Error {
    /// Create an ill-formed memory error
    pub fn memory(msg: impl Into<String>) -> Self {
        Error::IllFormedMemory(msg.into())
    }

    /// Whether the error was raised before the first step
    pub fn is_entry_error(&self) -> bool {
        !matches!(
            self,
            Error::Stuck { .. }
                | Error::InvalidResult { .. }
                | Error::StepLimit { .. }
                | Error::InvariantViolation { .. }
        )
    }
}

/// Result type for simulator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Well-formedness violation found by a state checker
#[derive(Debug, Clone, PartialEq)]
pub enum WfViolation {
    /// A state or frame names a block that holds no internal function
    NotInternal {
        /// Block of the offending function
        func: BlockId,
    },

    /// A state calls a block that holds no function
    UnknownCallee {
        /// Block of the callee
        callee: BlockId,
    },

    /// A function without call instructions is suspended on the stack.
    LeafCaller {
        /// Stack depth (0 is the outermost frame)
        depth: usize,
        /// Block of the leaf function
        func: BlockId,
    },

    /// The current program point lies outside the function body
    PointOutsideBody {
        /// Block of the running function
        func: BlockId,
        /// Rendered program point
        point: String,
    },

    /// A frame resumes outside its function body
    ResumeOutsideBody {
        /// Stack depth
        depth: usize,
        /// Block of the suspended function
        func: BlockId,
        /// Rendered resumption point
        resume: String,
    },

    /// A frame resumes at a point not preceded by a call.
    ResumeNotAfterCall {
        /// Stack depth
        depth: usize,
        /// Block of the suspended function
        func: BlockId,
        /// Rendered resumption point
        resume: String,
    },

    /// A saved return address is not one the chooser admits
    ReturnAddressNotAdmitted {
        /// Stack depth
        depth: usize,
        /// Block of the suspended function
        func: BlockId,
        /// Rendered return address
        ra: String,
    },

    /// A transition changed the stack by more than one push or pop
    StackShape {
        /// Depth before the step
        before: usize,
        /// Depth after the step
        after: usize,
    },
}

impl std::fmt::Display for WfViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WfViolation::NotInternal { func } => {
                write!(f, "Block {} is not an internal function", func)
            }
            WfViolation::UnknownCallee { callee } => {
                write!(f, "Callee block {} holds no function", callee)
            }
            WfViolation::LeafCaller { depth, func } => {
                write!(f, "Leaf function {} suspended at depth {}", func, depth)
            }
            WfViolation::PointOutsideBody { func, point } => {
                write!(f, "Program point {} is outside the body of {}", point, func)
            }
            WfViolation::ResumeOutsideBody {
                depth,
                func,
                resume,
            } => {
                write!(
                    f,
                    "Frame {} of {} resumes outside its body at {}",
                    depth, func, resume
                )
            }
            WfViolation::ResumeNotAfterCall {
                depth,
                func,
                resume,
            } => {
                write!(
                    f,
                    "Frame {} of {} resumes at {}, which does not follow a call",
                    depth, func, resume
                )
            }
            WfViolation::ReturnAddressNotAdmitted { depth, func, ra } => {
                write!(
                    f,
                    "Frame {} of {} saved return address {} the chooser does not admit",
                    depth, func, ra
                )
            }
            WfViolation::StackShape { before, after } => {
                write!(f, "Stack depth went from {} to {} in one step", before, after)
            }
        }
    }
}

impl std::error::Error for WfViolation {}
