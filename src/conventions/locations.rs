//! Locations and location states
//!
//! A location is either a machine register or a stack slot. Slots are
//! identified by their kind, an offset counted in 4-byte words and a type;
//! two slots of the same kind overlap when their word ranges intersect.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::machine::{Chunk, MReg, Regset, Typ, Val};

/// Role of a stack slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SlotKind {
    /// Spill slot of the current function
    Local,
    /// Parameter passed on the stack by the caller
    Incoming,
    /// Argument the current function passes on the stack to its callees
    Outgoing,
}

/// Register or stack slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Loc {
    Reg(MReg),
    Slot(SlotKind, i64, Typ),
}

impl Loc {
    /// Whether the location is addressable: a register, or a slot whose
    /// word range `[ofs, ofs + words)` does not overflow
    pub fn in_range(&self) -> bool {
        match self {
            Loc::Reg(_) => true,
            Loc::Slot(_, ofs, ty) => ofs.checked_add(ty.words()).is_some(),
        }
    }

    /// Whether two locations may share storage without being equal
    pub fn overlaps(&self, other: &Loc) -> bool {
        match (self, other) {
            (Loc::Reg(a), Loc::Reg(b)) => a == b,
            (Loc::Slot(k1, o1, t1), Loc::Slot(k2, o2, t2)) => {
                k1 == k2 && *o1 < o2.saturating_add(t2.words()) && *o2 < o1.saturating_add(t1.words())
            }
            _ => false,
        }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loc::Reg(r) => write!(f, "{}", r),
            Loc::Slot(kind, ofs, ty) => write!(f, "{:?}({}, {:?})", kind, ofs, ty),
        }
    }
}

/// One location, or two holding the high and low halves of a long
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pair<T> {
    One(T),
    TwoLong(T, T),
}

/// Location state: total map from locations to values.
///
/// Registers live in a [`Regset`]; slots are stored sparsely, keyed by
/// `(kind, offset)`. Absent slots and slots read at a different type than
/// they were written at are `Undef`. `Undef` slots are never stored, so
/// equality of two locsets is equality of the maps they denote.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Locset {
    regs: Regset,
    slots: BTreeMap<(SlotKind, i64), (Typ, Val)>,
}

impl Locset {
    /// Every location `Undef`
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, l: Loc) -> Val {
        match l {
            Loc::Reg(r) => self.regs.get(r),
            Loc::Slot(kind, ofs, ty) => match self.slots.get(&(kind, ofs)) {
                Some((t, v)) if *t == ty => *v,
                _ => Val::Undef,
            },
        }
    }

    pub fn reg(&self, r: MReg) -> Val {
        self.regs.get(r)
    }

    /// Writes `v` to `l`. Slot writes normalise the value to the slot type
    /// and invalidate every overlapping slot.
    pub fn set(&mut self, l: Loc, v: Val) {
        match l {
            Loc::Reg(r) => self.regs.set(r, v),
            Loc::Slot(kind, ofs, ty) => {
                let overlapping: Vec<(SlotKind, i64)> = self
                    .slots
                    .range((kind, ofs.saturating_sub(1))..(kind, ofs.saturating_add(ty.words())))
                    .filter(|((_, o), (t, _))| {
                        ofs < o.saturating_add(t.words()) && *o < ofs.saturating_add(ty.words())
                    })
                    .map(|(k, _)| *k)
                    .collect();
                for k in overlapping {
                    self.slots.remove(&k);
                }
                let v = v.load_result(Chunk::of_type(ty));
                if v.is_defined() {
                    self.slots.insert((kind, ofs), (ty, v));
                }
            }
        }
    }

    /// Functional update
    pub fn with(mut self, l: Loc, v: Val) -> Self {
        self.set(l, v);
        self
    }

    pub fn read_regs(&self, regs: &[MReg]) -> Vec<Val> {
        self.regs.read_all(regs)
    }

    /// Sets every register of `regs` to `Undef`
    pub fn undef_regs(mut self, regs: &[MReg]) -> Self {
        self.regs = self.regs.undef_regs(regs);
        self
    }

    pub fn get_pair(&self, p: Pair<Loc>) -> Val {
        match p {
            Pair::One(l) => self.get(l),
            Pair::TwoLong(hi, lo) => Val::long_of_words(self.get(hi), self.get(lo)),
        }
    }

    pub fn set_pair(&mut self, p: Pair<MReg>, v: Val) {
        match p {
            Pair::One(r) => self.set(Loc::Reg(r), v),
            Pair::TwoLong(hi, lo) => {
                self.set(Loc::Reg(hi), v.hiword());
                self.set(Loc::Reg(lo), v.loword());
            }
        }
    }

    pub fn regs(&self) -> &Regset {
        &self.regs
    }

    /// Defined slots, in `(kind, offset)` order
    pub fn slots(&self) -> impl Iterator<Item = (Loc, Val)> + '_ {
        self.slots
            .iter()
            .map(|((kind, ofs), (ty, v))| (Loc::Slot(*kind, *ofs, *ty), *v))
    }

    /// Keeps the registers, drops slots the predicate rejects
    pub(crate) fn retain_slots(&mut self, mut keep: impl FnMut(SlotKind) -> bool) {
        self.slots.retain(|(kind, _), _| keep(*kind));
    }

    pub(crate) fn set_regs(&mut self, regs: Regset) {
        self.regs = regs;
    }
}
