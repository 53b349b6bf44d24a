//! External calls: call descriptors, trace events and the host-call service
//!
//! External functions and built-ins are opaque to the interpreters. They
//! hand the descriptor, the argument values and the memory to an
//! [`ExternalCalls`] implementation and get back a trace, one result value
//! and the updated memory, or nothing (the state is then stuck).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::memory::Mem;
use super::types::{Chunk, Signature, Typ};
use super::value::Val;

/// Descriptor of an external function or built-in
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExternalFunction {
    /// Function defined outside the program, observable in the trace
    External { name: String, sig: Signature },
    /// Compiler intrinsic, not observable
    Builtin { name: String, sig: Signature },
    /// Heap allocation with a size header
    Malloc,
    /// Heap deallocation of a `Malloc`ed block
    Free,
    /// Block copy of `size` bytes between `align`-aligned addresses
    Memcpy { size: i64, align: i64 },
    /// Source annotation, observable in the trace
    Annot { text: String, types: Vec<Typ> },
    /// Debug information, no effect
    Debug,
}

impl ExternalFunction {
    pub fn sig(&self) -> Signature {
        match self {
            ExternalFunction::External { sig, .. } | ExternalFunction::Builtin { sig, .. } => {
                sig.clone()
            }
            ExternalFunction::Malloc => Signature::new(vec![Typ::PTR], Some(Typ::PTR)),
            ExternalFunction::Free => Signature::new(vec![Typ::PTR], None),
            ExternalFunction::Memcpy { .. } => Signature::new(vec![Typ::PTR, Typ::PTR], None),
            ExternalFunction::Annot { types, .. } => Signature::new(types.clone(), None),
            ExternalFunction::Debug => Signature::new(Vec::new(), None),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ExternalFunction::External { name, .. } | ExternalFunction::Builtin { name, .. } => name,
            ExternalFunction::Malloc => "malloc",
            ExternalFunction::Free => "free",
            ExternalFunction::Memcpy { .. } => "memcpy",
            ExternalFunction::Annot { .. } => "annot",
            ExternalFunction::Debug => "debug",
        }
    }
}

/// Observable event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// Call of an external function
    Syscall {
        name: String,
        args: Vec<Val>,
        result: Val,
    },
    /// Annotation reached
    Annot { text: String, args: Vec<Val> },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Syscall { name, args, result } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({}) = {}", name, args.join(", "), result)
            }
            Event::Annot { text, args } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "annot \"{}\" [{}]", text, args.join(", "))
            }
        }
    }
}

/// Events emitted by one step (empty for internal steps)
pub type Trace = Vec<Event>;

/// Result of an external call
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalOutcome {
    pub trace: Trace,
    pub result: Val,
    pub mem: Mem,
}

/// External-call service
pub trait ExternalCalls {
    /// Performs the call; `None` when the call cannot proceed
    fn call(&self, ef: &ExternalFunction, args: &[Val], mem: Mem) -> Option<ExternalOutcome>;
}

impl<T: ExternalCalls + ?Sized> ExternalCalls for &T {
    fn call(&self, ef: &ExternalFunction, args: &[Val], mem: Mem) -> Option<ExternalOutcome> {
        (**self).call(ef, args, mem)
    }
}

/// Host implementation of a named external function or built-in
pub type HostFn = Arc<dyn Fn(&[Val]) -> Option<Val> + Send + Sync>;

/// Reference external-call service: a registry of named host functions plus
/// the memory built-ins
#[derive(Clone, Default)]
pub struct HostCalls {
    functions: BTreeMap<String, HostFn>,
}

impl HostCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a host function under `name`
    pub fn register<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&[Val]) -> Option<Val> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(f));
    }

    /// Builder form of [`HostCalls::register`]
    pub fn with<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&[Val]) -> Option<Val> + Send + Sync + 'static,
    {
        self.register(name, f);
        self
    }

    fn host(&self, name: &str, sig: &Signature, args: &[Val]) -> Option<Val> {
        if !sig.accepts(args) {
            return None;
        }
        let f = self.functions.get(name)?;
        let result = f(args)?;
        match sig.res {
            Some(ty) if !result.has_type(ty) => None,
            Some(_) => Some(result),
            None => Some(Val::Undef),
        }
    }
}

impl fmt::Debug for HostCalls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCalls")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

const MALLOC_HEADER: i64 = 8;

fn malloc(args: &[Val], mut mem: Mem) -> Option<(Val, Mem)> {
    let size = match args {
        [Val::Long(n)] if *n >= 0 => *n,
        _ => return None,
    };
    let b = mem.alloc(-MALLOC_HEADER, size)?;
    mem.store(Chunk::Int64, b, -MALLOC_HEADER, Val::Long(size))?;
    Some((Val::Ptr(b, 0), mem))
}

fn free(args: &[Val], mut mem: Mem) -> Option<Mem> {
    match args {
        [Val::Long(0)] => Some(mem),
        [Val::Ptr(b, 0)] => match mem.load(Chunk::Int64, *b, -MALLOC_HEADER)? {
            Val::Long(size) if size >= 0 => {
                mem.free(*b, -MALLOC_HEADER, size)?;
                Some(mem)
            }
            _ => None,
        },
        _ => None,
    }
}

fn memcpy(size: i64, align: i64, args: &[Val], mut mem: Mem) -> Option<Mem> {
    let (db, dofs, sb, sofs) = match args {
        [Val::Ptr(db, dofs), Val::Ptr(sb, sofs)] => (*db, *dofs, *sb, *sofs),
        _ => return None,
    };
    if size < 0 || !matches!(align, 1 | 2 | 4 | 8) || (size > 0 && size % align != 0) {
        return None;
    }
    if dofs % align != 0 || sofs % align != 0 {
        return None;
    }
    let dend = dofs.checked_add(size)?;
    let send = sofs.checked_add(size)?;
    let disjoint = db != sb || dofs == sofs || dend <= sofs || send <= dofs;
    if !disjoint {
        return None;
    }
    let bytes = mem.load_bytes(sb, sofs, size)?;
    mem.store_bytes(db, dofs, &bytes)?;
    Some(mem)
}

impl ExternalCalls for HostCalls {
    fn call(&self, ef: &ExternalFunction, args: &[Val], mem: Mem) -> Option<ExternalOutcome> {
        let (trace, result, mem) = match ef {
            ExternalFunction::External { name, sig } => {
                let result = self.host(name, sig, args)?;
                let event = Event::Syscall {
                    name: name.clone(),
                    args: args.to_vec(),
                    result,
                };
                (vec![event], result, mem)
            }
            ExternalFunction::Builtin { name, sig } => (Vec::new(), self.host(name, sig, args)?, mem),
            ExternalFunction::Malloc => {
                let (p, mem) = malloc(args, mem)?;
                (Vec::new(), p, mem)
            }
            ExternalFunction::Free => (Vec::new(), Val::Undef, free(args, mem)?),
            ExternalFunction::Memcpy { size, align } => {
                (Vec::new(), Val::Undef, memcpy(*size, *align, args, mem)?)
            }
            ExternalFunction::Annot { text, types } => {
                if args.len() != types.len() {
                    return None;
                }
                let event = Event::Annot {
                    text: text.clone(),
                    args: args.to_vec(),
                };
                (vec![event], Val::Undef, mem)
            }
            ExternalFunction::Debug => (Vec::new(), Val::Undef, mem),
        };
        Some(ExternalOutcome { trace, result, mem })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::MAX_BLOCK_SIZE;

    fn inc_sig() -> Signature {
        Signature::new(vec![Typ::Int], Some(Typ::Int))
    }

    #[test]
    fn test_external_emits_event() {
        let host = HostCalls::new().with("inc", |args| match args {
            [Val::Int(n)] => Some(Val::Int(n + 1)),
            _ => None,
        });
        let ef = ExternalFunction::External {
            name: "inc".into(),
            sig: inc_sig(),
        };
        let out = host.call(&ef, &[Val::Int(41)], Mem::new()).unwrap();
        assert_eq!(out.result, Val::Int(42));
        assert_eq!(out.trace.len(), 1);
        assert_eq!(out.trace[0].to_string(), "inc(41) = 42");
    }

    #[test]
    fn test_unknown_or_ill_typed_call_fails() {
        let host = HostCalls::new().with("bad", |_| Some(Val::Float(1.0)));
        let unknown = ExternalFunction::External {
            name: "nope".into(),
            sig: inc_sig(),
        };
        assert!(host.call(&unknown, &[Val::Int(1)], Mem::new()).is_none());
        let bad = ExternalFunction::Builtin {
            name: "bad".into(),
            sig: inc_sig(),
        };
        assert!(host.call(&bad, &[Val::Int(1)], Mem::new()).is_none());
        assert!(host.call(&bad, &[Val::Long(1)], Mem::new()).is_none());
    }

    #[test]
    fn test_malloc_free() {
        let host = HostCalls::new();
        let out = host
            .call(&ExternalFunction::Malloc, &[Val::Long(16)], Mem::new())
            .unwrap();
        let p = out.result;
        let mut mem = out.mem;
        assert!(mem.storev(Chunk::Int64, p, Val::Long(3)).is_some());
        let out = host.call(&ExternalFunction::Free, &[p], mem).unwrap();
        assert!(out.mem.loadv(Chunk::Int64, p).is_none());
    }

    #[test]
    fn test_malloc_refuses_huge_sizes() {
        let host = HostCalls::new();
        for size in [i64::MAX, i64::MAX - MALLOC_HEADER, MAX_BLOCK_SIZE + 1] {
            assert!(host
                .call(&ExternalFunction::Malloc, &[Val::Long(size)], Mem::new())
                .is_none());
        }
    }

    #[test]
    fn test_memcpy_copies_pointers() {
        let mut mem = Mem::new();
        let src = mem.alloc(0, 16).unwrap();
        let dst = mem.alloc(0, 16).unwrap();
        mem.store(Chunk::Int64, src, 8, Val::Ptr(src, 0)).unwrap();
        let ef = ExternalFunction::Memcpy { size: 16, align: 8 };
        let out = HostCalls::new()
            .call(&ef, &[Val::Ptr(dst, 0), Val::Ptr(src, 0)], mem)
            .unwrap();
        assert_eq!(out.mem.load(Chunk::Int64, dst, 8), Some(Val::Ptr(src, 0)));
    }

    #[test]
    fn test_memcpy_past_offset_limit_fails() {
        let mut mem = Mem::new();
        let b = mem.alloc(0, 16).unwrap();
        let ef = ExternalFunction::Memcpy { size: 16, align: 8 };
        assert!(HostCalls::new()
            .call(&ef, &[Val::Ptr(b, i64::MAX - 7), Val::Ptr(b, 0)], mem)
            .is_none());
    }

    #[test]
    fn test_memcpy_rejects_overlap() {
        let mut mem = Mem::new();
        let b = mem.alloc(0, 16).unwrap();
        let ef = ExternalFunction::Memcpy { size: 8, align: 4 };
        assert!(HostCalls::new()
            .call(&ef, &[Val::Ptr(b, 4), Val::Ptr(b, 0)], mem)
            .is_none());
    }
}
