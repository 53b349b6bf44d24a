//! Value types, memory chunks and function signatures

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a location or of a function argument/result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Typ {
    /// 32-bit integer
    Int,
    /// 64-bit float
    Float,
    /// 64-bit integer (also pointers)
    Long,
    /// 32-bit float
    Single,
    /// Any 32-bit value
    Any32,
    /// Any 64-bit value
    Any64,
}

impl Typ {
    /// Pointer type on this target
    pub const PTR: Typ = Typ::Long;

    /// Size in bytes
    pub fn size(self) -> i64 {
        match self {
            Typ::Int | Typ::Single | Typ::Any32 => 4,
            Typ::Float | Typ::Long | Typ::Any64 => 8,
        }
    }

    /// Size in 4-byte stack words, the unit of slot offsets
    pub fn words(self) -> i64 {
        self.size() / 4
    }

    /// Whether values of this type travel in float registers
    pub fn is_float(self) -> bool {
        matches!(self, Typ::Float | Typ::Single)
    }
}

/// Width and signedness of a memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chunk {
    Int8Signed,
    Int8Unsigned,
    Int16Signed,
    Int16Unsigned,
    Int32,
    Int64,
    Float32,
    Float64,
    Any32,
    Any64,
}

impl Chunk {
    /// Number of bytes accessed
    pub fn size(self) -> i64 {
        match self {
            Chunk::Int8Signed | Chunk::Int8Unsigned => 1,
            Chunk::Int16Signed | Chunk::Int16Unsigned => 2,
            Chunk::Int32 | Chunk::Float32 | Chunk::Any32 => 4,
            Chunk::Int64 | Chunk::Float64 | Chunk::Any64 => 8,
        }
    }

    /// Required alignment of the accessed offset
    pub fn align(self) -> i64 {
        self.size()
    }

    /// Type of the value produced by a load of this chunk
    pub fn typ(self) -> Typ {
        match self {
            Chunk::Int8Signed
            | Chunk::Int8Unsigned
            | Chunk::Int16Signed
            | Chunk::Int16Unsigned
            | Chunk::Int32 => Typ::Int,
            Chunk::Int64 => Typ::Long,
            Chunk::Float32 => Typ::Single,
            Chunk::Float64 => Typ::Float,
            Chunk::Any32 => Typ::Any32,
            Chunk::Any64 => Typ::Any64,
        }
    }

    /// The chunk used to spill and reload a location of type `ty`
    pub fn of_type(ty: Typ) -> Chunk {
        match ty {
            Typ::Int => Chunk::Int32,
            Typ::Float => Chunk::Float64,
            Typ::Long => Chunk::Int64,
            Typ::Single => Chunk::Float32,
            Typ::Any32 => Chunk::Any32,
            Typ::Any64 => Chunk::Any64,
        }
    }
}

/// Calling-convention tag carried by signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub enum CallConv {
    #[default]
    Default,
    /// Variadic, with the given number of fixed arguments
    Vararg(usize),
}

/// Function signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    /// Argument types, in order
    pub args: Vec<Typ>,
    /// Result type, `None` for `void`
    pub res: Option<Typ>,
    /// Calling convention
    pub cc: CallConv,
}

impl Signature {
    pub fn new(args: Vec<Typ>, res: Option<Typ>) -> Self {
        Self {
            args,
            res,
            cc: CallConv::Default,
        }
    }

    /// `int f(void)`, the shape of the program entry point
    pub fn main() -> Self {
        Self::new(Vec::new(), Some(Typ::Int))
    }

    /// Checks that `args` has the right arity and that every value fits its type
    pub fn accepts(&self, args: &[super::Val]) -> bool {
        args.len() == self.args.len() && args.iter().zip(&self.args).all(|(v, ty)| v.has_type(*ty))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.args.iter().map(|t| format!("{:?}", t)).collect();
        match self.res {
            Some(res) => write!(f, "({}) -> {:?}", args.join(", "), res),
            None => write!(f, "({}) -> void", args.join(", ")),
        }
    }
}
