//! Operators, conditions and addressing modes, with their reference evaluator
//!
//! Both IRs share these definitions. Evaluation never touches memory
//! contents; memory is only consulted to decide pointer validity in
//! comparisons.

use serde::{Deserialize, Serialize};

use super::genv::SymbolResolver;
use super::memory::Mem;
use super::value::Val;

/// Comparison relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn eval<T: PartialOrd>(self, a: T, b: T) -> bool {
        match self {
            Comparison::Eq => a == b,
            Comparison::Ne => a != b,
            Comparison::Lt => a < b,
            Comparison::Le => a <= b,
            Comparison::Gt => a > b,
            Comparison::Ge => a >= b,
        }
    }

    /// Result of comparing two values known to be different and unordered
    pub fn eval_distinct(self) -> Option<bool> {
        match self {
            Comparison::Eq => Some(false),
            Comparison::Ne => Some(true),
            _ => None,
        }
    }

    pub fn negate(self) -> Comparison {
        match self {
            Comparison::Eq => Comparison::Ne,
            Comparison::Ne => Comparison::Eq,
            Comparison::Lt => Comparison::Ge,
            Comparison::Le => Comparison::Gt,
            Comparison::Gt => Comparison::Le,
            Comparison::Ge => Comparison::Lt,
        }
    }
}

/// Condition tested by conditional branches and `Cmp`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    /// Signed int comparison of two arguments
    Comp(Comparison),
    /// Signed int comparison against an immediate
    CompImm(Comparison, i32),
    CompU(Comparison),
    CompUImm(Comparison, u32),
    CompL(Comparison),
    CompLImm(Comparison, i64),
    /// Unsigned long comparison, also valid on pointers
    CompLU(Comparison),
    CompF(Comparison),
    /// Negated float comparison (true when unordered)
    NotCompF(Comparison),
}

impl Condition {
    /// Number of arguments the condition consumes
    pub fn arity(&self) -> usize {
        match self {
            Condition::CompImm(..) | Condition::CompUImm(..) | Condition::CompLImm(..) => 1,
            _ => 2,
        }
    }
}

/// Addressing mode of loads, stores and `Lea`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Addressing {
    /// `arg0 + ofs`
    Indexed(i64),
    /// `arg0 + arg1 + ofs`
    Indexed2(i64),
    /// `&symbol + ofs`
    Global(String, i64),
    /// `sp + ofs`
    Instack(i64),
}

impl Addressing {
    pub fn arity(&self) -> usize {
        match self {
            Addressing::Indexed(_) => 1,
            Addressing::Indexed2(_) => 2,
            Addressing::Global(..) | Addressing::Instack(_) => 0,
        }
    }
}

/// Arithmetic and data-movement operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    Move,
    IntConst(i32),
    LongConst(i64),
    FloatConst(f64),
    SingleConst(f32),
    /// Address of a global symbol plus an offset
    AddrSymbol(String, i64),
    /// Address inside the current stack frame
    AddrStack(i64),
    /// Address computation without memory access
    Lea(Addressing),
    Add,
    AddImm(i32),
    Sub,
    Mul,
    Div,
    DivU,
    Mod,
    ModU,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Neg,
    AddL,
    AddLImm(i64),
    SubL,
    MulL,
    DivL,
    NegL,
    AddF,
    SubF,
    MulF,
    DivF,
    NegF,
    IntOfLong,
    LongOfInt,
    FloatOfInt,
    IntOfFloat,
    Cmp(Condition),
}

impl Operation {
    /// `Move` is the only operator the register allocator may coalesce
    pub fn is_move(&self) -> bool {
        matches!(self, Operation::Move)
    }
}

fn valid_in(mem: &Mem) -> impl Fn(super::BlockId, i64) -> bool + '_ {
    move |b, ofs| mem.valid_pointer(b, ofs)
}

/// Evaluates a condition; `None` when the arguments are not comparable
pub fn eval_condition(cond: &Condition, args: &[Val], mem: &Mem) -> Option<bool> {
    match (cond, args) {
        (Condition::Comp(c), [a, b]) => Val::cmp_bool(*c, *a, *b),
        (Condition::CompImm(c, n), [a]) => Val::cmp_bool(*c, *a, Val::Int(*n)),
        (Condition::CompU(c), [a, b]) => Val::cmpu_bool(*c, *a, *b),
        (Condition::CompUImm(c, n), [a]) => Val::cmpu_bool(*c, *a, Val::Int(*n as i32)),
        (Condition::CompL(c), [a, b]) => Val::cmpl_bool(*c, *a, *b),
        (Condition::CompLImm(c, n), [a]) => Val::cmpl_bool(*c, *a, Val::Long(*n)),
        (Condition::CompLU(c), [a, b]) => Val::cmplu_bool(valid_in(mem), *c, *a, *b),
        (Condition::CompF(c), [a, b]) => Val::cmpf_bool(*c, *a, *b),
        (Condition::NotCompF(c), [a, b]) => Val::cmpf_bool(*c, *a, *b).map(|r| !r),
        _ => None,
    }
}

/// Computes an address
pub fn eval_addressing<R>(genv: &R, sp: Val, addr: &Addressing, args: &[Val]) -> Option<Val>
where
    R: SymbolResolver + ?Sized,
{
    match (addr, args) {
        (Addressing::Indexed(ofs), [base]) => Some(base.addl(Val::Long(*ofs))),
        (Addressing::Indexed2(ofs), [base, index]) => {
            Some(base.addl(*index).addl(Val::Long(*ofs)))
        }
        (Addressing::Global(sym, ofs), []) => genv.symbol_address(sym, *ofs),
        (Addressing::Instack(ofs), []) => Some(sp.offset_ptr(*ofs)),
        _ => None,
    }
}

/// Evaluates an operator over argument values
pub fn eval_operation<R>(genv: &R, sp: Val, op: &Operation, args: &[Val], mem: &Mem) -> Option<Val>
where
    R: SymbolResolver + ?Sized,
{
    use Operation::*;
    match (op, args) {
        (Move, [a]) => Some(*a),
        (IntConst(n), []) => Some(Val::Int(*n)),
        (LongConst(n), []) => Some(Val::Long(*n)),
        (FloatConst(x), []) => Some(Val::Float(*x)),
        (SingleConst(x), []) => Some(Val::Single(*x)),
        (AddrSymbol(sym, ofs), []) => genv.symbol_address(sym, *ofs),
        (AddrStack(ofs), []) => Some(sp.offset_ptr(*ofs)),
        (Lea(addr), _) => eval_addressing(genv, sp, addr, args),
        (Add, [a, b]) => Some(a.add(*b)),
        (AddImm(n), [a]) => Some(a.add(Val::Int(*n))),
        (Sub, [a, b]) => Some(a.sub(*b)),
        (Mul, [a, b]) => Some(a.mul(*b)),
        (Div, [a, b]) => a.divs(*b),
        (DivU, [a, b]) => a.divu(*b),
        (Mod, [a, b]) => a.mods(*b),
        (ModU, [a, b]) => a.modu(*b),
        (And, [a, b]) => Some(a.and(*b)),
        (Or, [a, b]) => Some(a.or(*b)),
        (Xor, [a, b]) => Some(a.xor(*b)),
        (Shl, [a, b]) => Some(a.shl(*b)),
        (Shr, [a, b]) => Some(a.shr(*b)),
        (Neg, [a]) => Some(a.neg()),
        (AddL, [a, b]) => Some(a.addl(*b)),
        (AddLImm(n), [a]) => Some(a.addl(Val::Long(*n))),
        (SubL, [a, b]) => Some(a.subl(*b)),
        (MulL, [a, b]) => Some(a.mull(*b)),
        (DivL, [a, b]) => a.divls(*b),
        (NegL, [a]) => Some(a.negl()),
        (AddF, [a, b]) => Some(a.addf(*b)),
        (SubF, [a, b]) => Some(a.subf(*b)),
        (MulF, [a, b]) => Some(a.mulf(*b)),
        (DivF, [a, b]) => Some(a.divf(*b)),
        (NegF, [a]) => Some(a.negf()),
        (IntOfLong, [a]) => Some(a.int_of_long()),
        (LongOfInt, [a]) => Some(a.long_of_int()),
        (FloatOfInt, [a]) => Some(a.float_of_int()),
        (IntOfFloat, [a]) => a.int_of_float(),
        (Cmp(cond), _) => match eval_condition(cond, args, mem) {
            Some(b) => Some(Val::of_bool(b)),
            // An undecidable comparison yields an unspecified boolean
            None if args.len() == cond.arity() => Some(Val::Undef),
            None => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::BlockId;

    struct NoSymbols;

    impl SymbolResolver for NoSymbols {
        fn find_symbol(&self, name: &str) -> Option<BlockId> {
            (name == "g").then_some(BlockId(1))
        }
    }

    #[test]
    fn test_arity_is_checked() {
        let m = Mem::new();
        let sp = Val::Ptr(BlockId(2), 0);
        assert_eq!(eval_operation(&NoSymbols, sp, &Operation::Add, &[Val::Int(1)], &m), None);
        assert_eq!(
            eval_operation(&NoSymbols, sp, &Operation::Add, &[Val::Int(1), Val::Int(2)], &m),
            Some(Val::Int(3))
        );
    }

    #[test]
    fn test_division_by_zero_is_stuck() {
        let m = Mem::new();
        let args = [Val::Int(1), Val::Int(0)];
        assert_eq!(eval_operation(&NoSymbols, Val::Undef, &Operation::Div, &args, &m), None);
    }

    #[test]
    fn test_addressing() {
        let sp = Val::Ptr(BlockId(5), 0);
        assert_eq!(
            eval_addressing(&NoSymbols, sp, &Addressing::Instack(16), &[]),
            Some(Val::Ptr(BlockId(5), 16))
        );
        assert_eq!(
            eval_addressing(&NoSymbols, sp, &Addressing::Global("g".into(), 4), &[]),
            Some(Val::Ptr(BlockId(1), 4))
        );
        assert_eq!(eval_addressing(&NoSymbols, sp, &Addressing::Global("h".into(), 0), &[]), None);
        assert_eq!(
            eval_addressing(
                &NoSymbols,
                sp,
                &Addressing::Indexed2(1),
                &[Val::Ptr(BlockId(3), 2), Val::Long(4)]
            ),
            Some(Val::Ptr(BlockId(3), 7))
        );
    }

    #[test]
    fn test_conditions() {
        let m = Mem::new();
        let lt = Condition::CompImm(Comparison::Lt, 10);
        assert_eq!(eval_condition(&lt, &[Val::Int(3)], &m), Some(true));
        assert_eq!(eval_condition(&lt, &[Val::Undef], &m), None);
        let nan = Val::Float(f64::NAN);
        let ge = Condition::NotCompF(Comparison::Lt);
        assert_eq!(eval_condition(&ge, &[nan, Val::Float(1.0)], &m), Some(true));
        assert_eq!(
            eval_operation(&NoSymbols, Val::Undef, &Operation::Cmp(lt), &[Val::Undef], &m),
            Some(Val::Undef)
        );
    }
}
