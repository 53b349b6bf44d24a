//! Runtime value domain shared by both interpreters
//!
//! Values are untyped at runtime: a register or a stack slot may hold any of
//! them. `Undef` is an ordinary value. Every operation accepts it and, with
//! the exception of comparisons (which get stuck), propagates it.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ops::Comparison;
use super::types::{Chunk, Typ};

/// Identifier of a memory block (global, stack frame, heap object or code)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Dynamic value
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Val {
    /// Unspecified bit pattern
    #[default]
    Undef,
    /// 32-bit integer
    Int(i32),
    /// 64-bit integer
    Long(i64),
    /// 64-bit float
    Float(f64),
    /// 32-bit float
    Single(f32),
    /// Pointer: block and byte offset inside it
    Ptr(BlockId, i64),
}

impl Val {
    /// The null pointer (pointers are 64 bits wide)
    pub const NULL: Val = Val::Long(0);

    /// Boolean encoded as an integer, the result of `Cmp` operations
    pub fn of_bool(b: bool) -> Val {
        Val::Int(b as i32)
    }

    /// Returns true unless the value is `Undef`
    pub fn is_defined(&self) -> bool {
        !matches!(self, Val::Undef)
    }

    /// Whether the value may live in a location of type `ty`
    pub fn has_type(&self, ty: Typ) -> bool {
        match (self, ty) {
            (Val::Undef, _) => true,
            (Val::Int(_), Typ::Int | Typ::Any32 | Typ::Any64) => true,
            (Val::Long(_), Typ::Long | Typ::Any64) => true,
            (Val::Float(_), Typ::Float | Typ::Any64) => true,
            (Val::Single(_), Typ::Single | Typ::Any32 | Typ::Any64) => true,
            (Val::Ptr(..), Typ::Long | Typ::Any64) => true,
            _ => false,
        }
    }

    /// Normalises a value to what a `chunk`-sized access would produce
    pub fn load_result(self, chunk: Chunk) -> Val {
        match (chunk, self) {
            (Chunk::Int8Signed, Val::Int(n)) => Val::Int(n as i8 as i32),
            (Chunk::Int8Unsigned, Val::Int(n)) => Val::Int(n as u8 as i32),
            (Chunk::Int16Signed, Val::Int(n)) => Val::Int(n as i16 as i32),
            (Chunk::Int16Unsigned, Val::Int(n)) => Val::Int(n as u16 as i32),
            (Chunk::Int32, v @ Val::Int(_)) => v,
            (Chunk::Int64, v @ (Val::Long(_) | Val::Ptr(..))) => v,
            (Chunk::Float32, v @ Val::Single(_)) => v,
            (Chunk::Float64, v @ Val::Float(_)) => v,
            (Chunk::Any32, v @ (Val::Int(_) | Val::Single(_))) => v,
            (Chunk::Any64, v) => v,
            _ => Val::Undef,
        }
    }

    /// Adds a byte offset to a pointer
    pub fn offset_ptr(self, delta: i64) -> Val {
        match self {
            Val::Ptr(b, ofs) => Val::Ptr(b, ofs.wrapping_add(delta)),
            _ => Val::Undef,
        }
    }

    // =========================================================================
    // 32-bit integer arithmetic
    // =========================================================================

    pub fn add(self, other: Val) -> Val {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => Val::Int(a.wrapping_add(b)),
            _ => Val::Undef,
        }
    }

    pub fn sub(self, other: Val) -> Val {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => Val::Int(a.wrapping_sub(b)),
            _ => Val::Undef,
        }
    }

    pub fn mul(self, other: Val) -> Val {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => Val::Int(a.wrapping_mul(b)),
            _ => Val::Undef,
        }
    }

    /// Signed division; `None` on division by zero or `MIN / -1`
    pub fn divs(self, other: Val) -> Option<Val> {
        match (self, other) {
            (Val::Int(_), Val::Int(0)) => None,
            (Val::Int(i32::MIN), Val::Int(-1)) => None,
            (Val::Int(a), Val::Int(b)) => Some(Val::Int(a / b)),
            _ => None,
        }
    }

    pub fn divu(self, other: Val) -> Option<Val> {
        match (self, other) {
            (Val::Int(_), Val::Int(0)) => None,
            (Val::Int(a), Val::Int(b)) => Some(Val::Int(((a as u32) / (b as u32)) as i32)),
            _ => None,
        }
    }

    pub fn mods(self, other: Val) -> Option<Val> {
        match (self, other) {
            (Val::Int(_), Val::Int(0)) => None,
            (Val::Int(i32::MIN), Val::Int(-1)) => None,
            (Val::Int(a), Val::Int(b)) => Some(Val::Int(a % b)),
            _ => None,
        }
    }

    pub fn modu(self, other: Val) -> Option<Val> {
        match (self, other) {
            (Val::Int(_), Val::Int(0)) => None,
            (Val::Int(a), Val::Int(b)) => Some(Val::Int(((a as u32) % (b as u32)) as i32)),
            _ => None,
        }
    }

    pub fn and(self, other: Val) -> Val {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => Val::Int(a & b),
            _ => Val::Undef,
        }
    }

    pub fn or(self, other: Val) -> Val {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => Val::Int(a | b),
            _ => Val::Undef,
        }
    }

    pub fn xor(self, other: Val) -> Val {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) => Val::Int(a ^ b),
            _ => Val::Undef,
        }
    }

    /// Shift left; amounts outside `0..32` give `Undef`
    pub fn shl(self, other: Val) -> Val {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) if (0..32).contains(&b) => Val::Int(a.wrapping_shl(b as u32)),
            _ => Val::Undef,
        }
    }

    /// Arithmetic shift right; amounts outside `0..32` give `Undef`
    pub fn shr(self, other: Val) -> Val {
        match (self, other) {
            (Val::Int(a), Val::Int(b)) if (0..32).contains(&b) => Val::Int(a >> b),
            _ => Val::Undef,
        }
    }

    pub fn neg(self) -> Val {
        match self {
            Val::Int(a) => Val::Int(a.wrapping_neg()),
            _ => Val::Undef,
        }
    }

    // =========================================================================
    // 64-bit integer and pointer arithmetic
    // =========================================================================

    pub fn addl(self, other: Val) -> Val {
        match (self, other) {
            (Val::Long(a), Val::Long(b)) => Val::Long(a.wrapping_add(b)),
            (Val::Ptr(blk, ofs), Val::Long(n)) | (Val::Long(n), Val::Ptr(blk, ofs)) => {
                Val::Ptr(blk, ofs.wrapping_add(n))
            }
            _ => Val::Undef,
        }
    }

    /// Subtraction; the difference of two pointers into the same block is a long
    pub fn subl(self, other: Val) -> Val {
        match (self, other) {
            (Val::Long(a), Val::Long(b)) => Val::Long(a.wrapping_sub(b)),
            (Val::Ptr(blk, ofs), Val::Long(n)) => Val::Ptr(blk, ofs.wrapping_sub(n)),
            (Val::Ptr(b1, o1), Val::Ptr(b2, o2)) if b1 == b2 => Val::Long(o1.wrapping_sub(o2)),
            _ => Val::Undef,
        }
    }

    pub fn mull(self, other: Val) -> Val {
        match (self, other) {
            (Val::Long(a), Val::Long(b)) => Val::Long(a.wrapping_mul(b)),
            _ => Val::Undef,
        }
    }

    pub fn divls(self, other: Val) -> Option<Val> {
        match (self, other) {
            (Val::Long(_), Val::Long(0)) => None,
            (Val::Long(i64::MIN), Val::Long(-1)) => None,
            (Val::Long(a), Val::Long(b)) => Some(Val::Long(a / b)),
            _ => None,
        }
    }

    pub fn negl(self) -> Val {
        match self {
            Val::Long(a) => Val::Long(a.wrapping_neg()),
            _ => Val::Undef,
        }
    }

    // =========================================================================
    // Floats
    // =========================================================================

    pub fn addf(self, other: Val) -> Val {
        match (self, other) {
            (Val::Float(a), Val::Float(b)) => Val::Float(a + b),
            _ => Val::Undef,
        }
    }

    pub fn subf(self, other: Val) -> Val {
        match (self, other) {
            (Val::Float(a), Val::Float(b)) => Val::Float(a - b),
            _ => Val::Undef,
        }
    }

    pub fn mulf(self, other: Val) -> Val {
        match (self, other) {
            (Val::Float(a), Val::Float(b)) => Val::Float(a * b),
            _ => Val::Undef,
        }
    }

    pub fn divf(self, other: Val) -> Val {
        match (self, other) {
            (Val::Float(a), Val::Float(b)) => Val::Float(a / b),
            _ => Val::Undef,
        }
    }

    pub fn negf(self) -> Val {
        match self {
            Val::Float(a) => Val::Float(-a),
            _ => Val::Undef,
        }
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    /// Sign-extends an int to a long
    pub fn long_of_int(self) -> Val {
        match self {
            Val::Int(n) => Val::Long(n as i64),
            _ => Val::Undef,
        }
    }

    /// Truncates a long to its low 32 bits
    pub fn int_of_long(self) -> Val {
        match self {
            Val::Long(n) => Val::Int(n as i32),
            _ => Val::Undef,
        }
    }

    pub fn float_of_int(self) -> Val {
        match self {
            Val::Int(n) => Val::Float(n as f64),
            _ => Val::Undef,
        }
    }

    /// Truncating float-to-int conversion; `None` when the result does not fit
    pub fn int_of_float(self) -> Option<Val> {
        match self {
            Val::Float(f) => {
                let t = f.trunc();
                if t.is_nan() || t < i32::MIN as f64 || t > i32::MAX as f64 {
                    None
                } else {
                    Some(Val::Int(t as i32))
                }
            }
            _ => None,
        }
    }

    /// High 32 bits of a long
    pub fn hiword(self) -> Val {
        match self {
            Val::Long(n) => Val::Int((n >> 32) as i32),
            _ => Val::Undef,
        }
    }

    /// Low 32 bits of a long
    pub fn loword(self) -> Val {
        match self {
            Val::Long(n) => Val::Int(n as i32),
            _ => Val::Undef,
        }
    }

    /// Rebuilds a long from its two halves
    pub fn long_of_words(hi: Val, lo: Val) -> Val {
        match (hi, lo) {
            (Val::Int(h), Val::Int(l)) => Val::Long(((h as i64) << 32) | (l as u32 as i64)),
            _ => Val::Undef,
        }
    }

    // =========================================================================
    // Comparisons
    // =========================================================================

    /// Signed 32-bit comparison
    pub fn cmp_bool(c: Comparison, a: Val, b: Val) -> Option<bool> {
        match (a, b) {
            (Val::Int(x), Val::Int(y)) => Some(c.eval(x, y)),
            _ => None,
        }
    }

    /// Unsigned 32-bit comparison
    pub fn cmpu_bool(c: Comparison, a: Val, b: Val) -> Option<bool> {
        match (a, b) {
            (Val::Int(x), Val::Int(y)) => Some(c.eval(x as u32, y as u32)),
            _ => None,
        }
    }

    /// Signed 64-bit comparison
    pub fn cmpl_bool(c: Comparison, a: Val, b: Val) -> Option<bool> {
        match (a, b) {
            (Val::Long(x), Val::Long(y)) => Some(c.eval(x, y)),
            _ => None,
        }
    }

    /// Unsigned 64-bit comparison, also defined on pointers.
    ///
    /// Pointers compare by offset inside one block; pointers into different
    /// blocks are only equal or different, and only when both are valid.
    /// Comparing a valid pointer against null is an (in)equality test.
    pub fn cmplu_bool(
        valid: impl Fn(BlockId, i64) -> bool,
        c: Comparison,
        a: Val,
        b: Val,
    ) -> Option<bool> {
        match (a, b) {
            (Val::Long(x), Val::Long(y)) => Some(c.eval(x as u64, y as u64)),
            (Val::Ptr(b1, o1), Val::Ptr(b2, o2)) => {
                if !valid(b1, o1) || !valid(b2, o2) {
                    return None;
                }
                if b1 == b2 {
                    Some(c.eval(o1 as u64, o2 as u64))
                } else {
                    c.eval_distinct()
                }
            }
            (Val::Ptr(blk, ofs), Val::Long(0)) | (Val::Long(0), Val::Ptr(blk, ofs)) => {
                if valid(blk, ofs) {
                    c.eval_distinct()
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Float comparison (unordered operands compare false, except `Ne`)
    pub fn cmpf_bool(c: Comparison, a: Val, b: Val) -> Option<bool> {
        match (a, b) {
            (Val::Float(x), Val::Float(y)) => Some(match c {
                Comparison::Eq => x == y,
                Comparison::Ne => x != y,
                Comparison::Lt => x < y,
                Comparison::Le => x <= y,
                Comparison::Gt => x > y,
                Comparison::Ge => x >= y,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Undef => write!(f, "undef"),
            Val::Int(n) => write!(f, "{}", n),
            Val::Long(n) => write!(f, "{}L", n),
            Val::Float(x) => write!(f, "{}", x),
            Val::Single(x) => write!(f, "{}f", x),
            Val::Ptr(b, ofs) => write!(f, "&{}+{}", b, ofs),
        }
    }
}
