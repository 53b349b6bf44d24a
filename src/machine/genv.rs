//! Programs, the global environment (symbol resolver) and initial memory
//!
//! Every global definition owns one memory block. Block identifiers are
//! assigned in definition order starting at `b1`, both by
//! [`GlobalEnv::new`] and by [`Program::init_mem`], so that the resolver and
//! the initial memory agree without sharing state. Code pointers are
//! `Ptr(function_block, 0)`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::external::ExternalFunction;
use super::memory::Mem;
use super::types::{Chunk, Signature};
use super::value::{BlockId, Val};
use crate::{Error, Result};

/// Access to a function's signature, implemented by both IRs' functions
pub trait FunctionSig {
    fn sig(&self) -> &Signature;

    /// True when the body contains no call instruction
    fn is_leaf(&self) -> bool;
}

/// Function definition: a body in some IR, or an external function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FunDef<F> {
    Internal(F),
    External(ExternalFunction),
}

impl<F: FunctionSig> FunDef<F> {
    pub fn sig(&self) -> Signature {
        match self {
            FunDef::Internal(f) => f.sig().clone(),
            FunDef::External(ef) => ef.sig(),
        }
    }
}

/// Initialiser of a global variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InitData {
    Int8(i32),
    Int16(i32),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// `n` zero bytes
    Space(i64),
    /// Address of another global plus an offset
    AddrOf(String, i64),
}

impl InitData {
    pub fn size(&self) -> i64 {
        match self {
            InitData::Int8(_) => 1,
            InitData::Int16(_) => 2,
            InitData::Int32(_) | InitData::Float32(_) => 4,
            InitData::Int64(_) | InitData::Float64(_) | InitData::AddrOf(..) => 8,
            InitData::Space(n) => (*n).max(0),
        }
    }
}

/// Global variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalVar {
    pub init: Vec<InitData>,
}

impl GlobalVar {
    pub fn size(&self) -> i64 {
        self.init
            .iter()
            .fold(0i64, |acc, init| acc.saturating_add(init.size()))
    }
}

/// Global definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GlobalDef<F> {
    Function(FunDef<F>),
    Variable(GlobalVar),
}

/// A whole program: named definitions plus the entry symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program<F> {
    pub defs: Vec<(String, GlobalDef<F>)>,
    pub main: String,
}

impl<F> Program<F> {
    pub fn new(main: &str) -> Self {
        Self {
            defs: Vec::new(),
            main: main.to_string(),
        }
    }

    /// Adds an internal function
    pub fn function(mut self, name: &str, f: F) -> Self {
        self.defs
            .push((name.to_string(), GlobalDef::Function(FunDef::Internal(f))));
        self
    }

    /// Adds an external function
    pub fn external(mut self, name: &str, ef: ExternalFunction) -> Self {
        self.defs
            .push((name.to_string(), GlobalDef::Function(FunDef::External(ef))));
        self
    }

    /// Adds a global variable
    pub fn variable(mut self, name: &str, init: Vec<InitData>) -> Self {
        self.defs
            .push((name.to_string(), GlobalDef::Variable(GlobalVar { init })));
        self
    }

    fn symbol_table(&self) -> Result<BTreeMap<String, BlockId>> {
        let mut symbols = BTreeMap::new();
        for (i, (name, _)) in self.defs.iter().enumerate() {
            if symbols.insert(name.clone(), BlockId(i as u32 + 1)).is_some() {
                return Err(Error::DuplicateSymbol { name: name.clone() });
            }
        }
        Ok(symbols)
    }

    /// Builds the initial memory: one block per definition, in order
    pub fn init_mem(&self) -> Result<Mem> {
        let symbols = self.symbol_table()?;
        let mut mem = Mem::new();
        for (name, def) in &self.defs {
            match def {
                GlobalDef::Function(_) => {
                    mem.alloc(0, 1)
                        .ok_or_else(|| Error::memory(format!("cannot allocate {}", name)))?;
                }
                GlobalDef::Variable(var) => {
                    let b = mem
                        .alloc(0, var.size())
                        .ok_or_else(|| Error::memory(format!("cannot allocate {}", name)))?;
                    let mut ofs = 0;
                    for init in &var.init {
                        if let InitData::AddrOf(sym, _) = init {
                            if !symbols.contains_key(sym) {
                                return Err(Error::UndefinedSymbol { name: sym.clone() });
                            }
                        }
                        store_init(&mut mem, &symbols, b, ofs, init).ok_or_else(|| {
                            Error::memory(format!("cannot initialise {} at offset {}", name, ofs))
                        })?;
                        ofs += init.size();
                    }
                }
            }
        }
        Ok(mem)
    }
}

fn store_init(
    mem: &mut Mem,
    symbols: &BTreeMap<String, BlockId>,
    b: BlockId,
    ofs: i64,
    init: &InitData,
) -> Option<()> {
    match init {
        InitData::Int8(n) => mem.store(Chunk::Int8Unsigned, b, ofs, Val::Int(*n)),
        InitData::Int16(n) => mem.store(Chunk::Int16Unsigned, b, ofs, Val::Int(*n)),
        InitData::Int32(n) => mem.store(Chunk::Int32, b, ofs, Val::Int(*n)),
        InitData::Int64(n) => mem.store(Chunk::Int64, b, ofs, Val::Long(*n)),
        InitData::Float32(x) => mem.store(Chunk::Float32, b, ofs, Val::Single(*x)),
        InitData::Float64(x) => mem.store(Chunk::Float64, b, ofs, Val::Float(*x)),
        InitData::Space(n) => {
            let zeros = vec![super::memory::Memval::Byte(0); (*n).max(0) as usize];
            mem.store_bytes(b, ofs, &zeros)
        }
        InitData::AddrOf(sym, delta) => {
            let target = *symbols.get(sym)?;
            mem.store(Chunk::Int64, b, ofs, Val::Ptr(target, *delta))
        }
    }
}

/// Symbol resolver: `symbol -> block`
pub trait SymbolResolver {
    fn find_symbol(&self, name: &str) -> Option<BlockId>;

    /// `&symbol + ofs`
    fn symbol_address(&self, name: &str, ofs: i64) -> Option<Val> {
        self.find_symbol(name).map(|b| Val::Ptr(b, ofs))
    }
}

/// Immutable global environment of a program
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalEnv<F> {
    symbols: BTreeMap<String, BlockId>,
    names: BTreeMap<BlockId, String>,
    functions: BTreeMap<BlockId, FunDef<F>>,
    main: String,
}

impl<F: Clone> GlobalEnv<F> {
    pub fn new(program: &Program<F>) -> Result<Self> {
        let symbols = program.symbol_table()?;
        let mut names = BTreeMap::new();
        let mut functions = BTreeMap::new();
        for (name, def) in &program.defs {
            let b = symbols[name];
            names.insert(b, name.clone());
            if let GlobalDef::Function(fd) = def {
                functions.insert(b, fd.clone());
            }
        }
        Ok(Self {
            symbols,
            names,
            functions,
            main: program.main.clone(),
        })
    }
}

impl<F> GlobalEnv<F> {
    /// Function stored in block `b`
    pub fn find_funct_ptr(&self, b: BlockId) -> Option<&FunDef<F>> {
        self.functions.get(&b)
    }

    /// Function designated by a code pointer, which must have offset zero
    pub fn find_funct(&self, v: Val) -> Option<(BlockId, &FunDef<F>)> {
        match v {
            Val::Ptr(b, 0) => self.find_funct_ptr(b).map(|fd| (b, fd)),
            _ => None,
        }
    }

    /// Internal function stored in block `b`
    pub fn find_internal(&self, b: BlockId) -> Option<&F> {
        match self.find_funct_ptr(b)? {
            FunDef::Internal(f) => Some(f),
            FunDef::External(_) => None,
        }
    }

    pub fn symbol_name(&self, b: BlockId) -> Option<&str> {
        self.names.get(&b).map(String::as_str)
    }

    /// Code pointer of the entry symbol
    pub fn main_pointer(&self) -> Option<Val> {
        self.symbol_address(&self.main, 0)
    }

    /// Highest block the environment refers to
    pub fn last_block(&self) -> Option<BlockId> {
        self.names.keys().next_back().copied()
    }

    /// Checks the memory was built for this environment: every global block
    /// is allocated and no stored pointer dangles
    pub fn check_memory(&self, mem: &Mem) -> Result<()> {
        if let Some(last) = self.last_block() {
            if last >= mem.next_block() {
                return Err(Error::memory(format!("global block {} is not allocated", last)));
            }
        }
        if let Some((b, _)) = self.functions.iter().find(|(b, _)| !mem.is_live(**b)) {
            return Err(Error::memory(format!("code block {} is not live", b)));
        }
        if !mem.no_dangling() {
            return Err(Error::memory("memory holds a pointer to an unallocated block"));
        }
        Ok(())
    }
}

impl<F> SymbolResolver for GlobalEnv<F> {
    fn find_symbol(&self, name: &str) -> Option<BlockId> {
        self.symbols.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Body(Signature);

    impl FunctionSig for Body {
        fn sig(&self) -> &Signature {
            &self.0
        }

        fn is_leaf(&self) -> bool {
            true
        }
    }

    fn program() -> Program<Body> {
        Program::new("main")
            .variable(
                "table",
                vec![
                    InitData::Int32(7),
                    InitData::Space(4),
                    InitData::AddrOf("main".into(), 0),
                ],
            )
            .function("main", Body(Signature::main()))
    }

    #[test]
    fn test_blocks_follow_definition_order() {
        let p = program();
        let genv = GlobalEnv::new(&p).unwrap();
        assert_eq!(genv.find_symbol("table"), Some(BlockId(1)));
        assert_eq!(genv.find_symbol("main"), Some(BlockId(2)));
        assert!(genv.find_funct(Val::Ptr(BlockId(2), 0)).is_some());
        assert!(genv.find_funct(Val::Ptr(BlockId(2), 4)).is_none());
        assert!(genv.find_funct(Val::Ptr(BlockId(1), 0)).is_none());
        assert_eq!(genv.main_pointer(), Some(Val::Ptr(BlockId(2), 0)));
    }

    #[test]
    fn test_init_mem() {
        let p = program();
        let genv = GlobalEnv::new(&p).unwrap();
        let mem = p.init_mem().unwrap();
        assert!(genv.check_memory(&mem).is_ok());
        assert_eq!(mem.load(Chunk::Int32, BlockId(1), 0), Some(Val::Int(7)));
        assert_eq!(mem.load(Chunk::Int32, BlockId(1), 4), Some(Val::Int(0)));
        assert_eq!(mem.load(Chunk::Int64, BlockId(1), 8), Some(Val::Ptr(BlockId(2), 0)));
    }

    #[test]
    fn test_dangling_initialiser_is_rejected() {
        let p: Program<Body> =
            Program::new("main").variable("v", vec![InitData::AddrOf("ghost".into(), 0)]);
        assert_eq!(
            p.init_mem(),
            Err(Error::UndefinedSymbol {
                name: "ghost".into()
            })
        );
    }

    #[test]
    fn test_duplicate_symbol() {
        let p = Program::new("main")
            .function("main", Body(Signature::main()))
            .function("main", Body(Signature::main()));
        assert!(matches!(GlobalEnv::new(&p), Err(Error::DuplicateSymbol { .. })));
    }

    #[test]
    fn test_foreign_memory_is_rejected() {
        let p = program();
        let genv = GlobalEnv::new(&p).unwrap();
        assert!(genv.check_memory(&Mem::new()).is_err());
    }
}
