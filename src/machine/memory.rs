//! Block-based memory service
//!
//! Memory is a collection of independent blocks, each with its own bounds.
//! Blocks are never reused: `alloc` always returns a fresh identifier, and
//! a freed block stays in the map so that stale pointers into it are
//! detectable.
//!
//! ```text
//! block b3: lo=0                                  hi=16
//!           +----+----+----+----+----+----+ ... +----+
//!           | B  | B  | B  | B  | F0 | F1 | ... | F7 |   B = Byte, F = Fragment
//!           +----+----+----+----+----+----+ ... +----+
//! ```
//!
//! Bytes hold either a concrete byte, a fragment of an abstract value
//! (pointers are stored this way so that they survive a store/load round
//! trip), or `Undef`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::Chunk;
use super::value::{BlockId, Val};

/// Largest block `alloc` will hand out, in bytes
pub const MAX_BLOCK_SIZE: i64 = 1 << 24;

/// Contents of one byte of memory
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Memval {
    Undef,
    Byte(u8),
    /// Byte `index` of the `size`-byte encoding of an abstract value
    Fragment { val: Val, size: u8, index: u8 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Block {
    lo: i64,
    hi: i64,
    contents: Vec<Memval>,
    live: bool,
}

impl Block {
    fn covers(&self, ofs: i64, size: i64) -> bool {
        self.live
            && size >= 0
            && self.lo <= ofs
            && ofs.checked_add(size).map_or(false, |end| end <= self.hi)
    }

    fn slice(&self, ofs: i64, size: i64) -> &[Memval] {
        let start = (ofs - self.lo) as usize;
        &self.contents[start..start + size as usize]
    }
}

/// Memory state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mem {
    blocks: BTreeMap<BlockId, Block>,
    next: u32,
}

impl Mem {
    /// Empty memory; the first allocated block is `b1`
    pub fn new() -> Self {
        Self {
            blocks: BTreeMap::new(),
            next: 1,
        }
    }

    /// Identifier the next allocation will return
    pub fn next_block(&self) -> BlockId {
        BlockId(self.next)
    }

    /// Allocates a fresh block with bounds `[lo, hi)`, contents `Undef`.
    ///
    /// An inverted range gives an empty block. Returns `None` when the
    /// block would exceed [`MAX_BLOCK_SIZE`].
    pub fn alloc(&mut self, lo: i64, hi: i64) -> Option<BlockId> {
        let hi = hi.max(lo);
        let len = hi.checked_sub(lo).filter(|len| *len <= MAX_BLOCK_SIZE)?;
        let id = BlockId(self.next);
        self.next = self.next.checked_add(1)?;
        self.blocks.insert(
            id,
            Block {
                lo,
                hi,
                contents: vec![Memval::Undef; len as usize],
                live: true,
            },
        );
        Some(id)
    }

    /// Frees the whole block `b`; the range must match its bounds exactly
    pub fn free(&mut self, b: BlockId, lo: i64, hi: i64) -> Option<()> {
        let block = self.blocks.get_mut(&b)?;
        if !block.live || block.lo != lo || block.hi != hi.max(lo) {
            return None;
        }
        block.live = false;
        block.contents.clear();
        Some(())
    }

    pub fn is_live(&self, b: BlockId) -> bool {
        self.blocks.get(&b).map_or(false, |blk| blk.live)
    }

    /// Weak validity: the offset is inside the block or one past its end
    pub fn valid_pointer(&self, b: BlockId, ofs: i64) -> bool {
        self.blocks
            .get(&b)
            .map_or(false, |blk| blk.live && blk.lo <= ofs && ofs <= blk.hi)
    }

    fn accessible(&self, chunk: Chunk, b: BlockId, ofs: i64) -> Option<&Block> {
        let block = self.blocks.get(&b)?;
        (block.covers(ofs, chunk.size()) && ofs.rem_euclid(chunk.align()) == 0).then_some(block)
    }

    pub fn load(&self, chunk: Chunk, b: BlockId, ofs: i64) -> Option<Val> {
        let block = self.accessible(chunk, b, ofs)?;
        Some(decode(chunk, block.slice(ofs, chunk.size())))
    }

    pub fn store(&mut self, chunk: Chunk, b: BlockId, ofs: i64, v: Val) -> Option<()> {
        self.accessible(chunk, b, ofs)?;
        let bytes = encode(chunk, v);
        self.write_bytes(b, ofs, &bytes)
    }

    /// Load through a pointer value
    pub fn loadv(&self, chunk: Chunk, addr: Val) -> Option<Val> {
        match addr {
            Val::Ptr(b, ofs) => self.load(chunk, b, ofs),
            _ => None,
        }
    }

    /// Store through a pointer value
    pub fn storev(&mut self, chunk: Chunk, addr: Val, v: Val) -> Option<()> {
        match addr {
            Val::Ptr(b, ofs) => self.store(chunk, b, ofs, v),
            _ => None,
        }
    }

    /// Raw bytes, without alignment constraints
    pub fn load_bytes(&self, b: BlockId, ofs: i64, len: i64) -> Option<Vec<Memval>> {
        let block = self.blocks.get(&b)?;
        block.covers(ofs, len).then(|| block.slice(ofs, len).to_vec())
    }

    pub fn store_bytes(&mut self, b: BlockId, ofs: i64, bytes: &[Memval]) -> Option<()> {
        let block = self.blocks.get(&b)?;
        if !block.covers(ofs, bytes.len() as i64) {
            return None;
        }
        self.write_bytes(b, ofs, bytes)
    }

    fn write_bytes(&mut self, b: BlockId, ofs: i64, bytes: &[Memval]) -> Option<()> {
        let block = self.blocks.get_mut(&b)?;
        let start = (ofs - block.lo) as usize;
        block.contents[start..start + bytes.len()].copy_from_slice(bytes);
        Some(())
    }

    /// Every pointer stored in a live block refers to an already allocated block
    pub fn no_dangling(&self) -> bool {
        self.blocks.values().filter(|blk| blk.live).all(|blk| {
            blk.contents.iter().all(|mv| match mv {
                Memval::Fragment {
                    val: Val::Ptr(target, _),
                    ..
                } => target.0 < self.next,
                _ => true,
            })
        })
    }
}

impl Default for Mem {
    fn default() -> Self {
        Self::new()
    }
}

fn int_bytes(n: u64, size: i64) -> Vec<Memval> {
    (0..size).map(|i| Memval::Byte((n >> (8 * i)) as u8)).collect()
}

fn fragments(v: Val, size: i64) -> Vec<Memval> {
    (0..size)
        .map(|i| Memval::Fragment {
            val: v,
            size: size as u8,
            index: i as u8,
        })
        .collect()
}

fn encode(chunk: Chunk, v: Val) -> Vec<Memval> {
    let size = chunk.size();
    match (chunk, v) {
        (
            Chunk::Int8Signed
            | Chunk::Int8Unsigned
            | Chunk::Int16Signed
            | Chunk::Int16Unsigned
            | Chunk::Int32,
            Val::Int(n),
        ) => int_bytes(n as u32 as u64, size),
        (Chunk::Int64, Val::Long(n)) => int_bytes(n as u64, size),
        (Chunk::Int64, Val::Ptr(..)) => fragments(v, size),
        (Chunk::Float32, Val::Single(x)) => int_bytes(x.to_bits() as u64, size),
        (Chunk::Float64, Val::Float(x)) => int_bytes(x.to_bits(), size),
        (Chunk::Any32, Val::Int(_) | Val::Single(_)) => fragments(v, size),
        (Chunk::Any64, Val::Undef) => vec![Memval::Undef; size as usize],
        (Chunk::Any64, _) => fragments(v, size),
        _ => vec![Memval::Undef; size as usize],
    }
}

fn bytes_value(bytes: &[Memval]) -> Option<u64> {
    let mut n: u64 = 0;
    for (i, mv) in bytes.iter().enumerate() {
        match mv {
            Memval::Byte(b) => n |= (*b as u64) << (8 * i),
            _ => return None,
        }
    }
    Some(n)
}

fn fragment_value(bytes: &[Memval]) -> Option<Val> {
    let first = match bytes.first()? {
        Memval::Fragment { val, .. } => *val,
        _ => return None,
    };
    let whole = bytes.iter().enumerate().all(|(i, mv)| {
        matches!(mv, Memval::Fragment { val, size, index }
            if *val == first && *size as usize == bytes.len() && *index as usize == i)
    });
    whole.then_some(first)
}

fn decode(chunk: Chunk, bytes: &[Memval]) -> Val {
    if let Some(n) = bytes_value(bytes) {
        return match chunk {
            Chunk::Int8Signed => Val::Int(n as u8 as i8 as i32),
            Chunk::Int8Unsigned => Val::Int(n as u8 as i32),
            Chunk::Int16Signed => Val::Int(n as u16 as i16 as i32),
            Chunk::Int16Unsigned => Val::Int(n as u16 as i32),
            Chunk::Int32 => Val::Int(n as u32 as i32),
            Chunk::Int64 => Val::Long(n as i64),
            Chunk::Float32 => Val::Single(f32::from_bits(n as u32)),
            Chunk::Float64 => Val::Float(f64::from_bits(n)),
            Chunk::Any32 | Chunk::Any64 => Val::Undef,
        };
    }
    match (chunk, fragment_value(bytes)) {
        (Chunk::Int64, Some(v @ Val::Ptr(..))) => v,
        (Chunk::Any32, Some(v)) => v.load_result(Chunk::Any32),
        (Chunk::Any64, Some(v)) => v,
        _ => Val::Undef,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_returns_fresh_blocks() {
        let mut m = Mem::new();
        let a = m.alloc(0, 8).unwrap();
        let b = m.alloc(0, 8).unwrap();
        assert_ne!(a, b);
        assert_eq!(m.next_block(), BlockId(3));
    }

    #[test]
    fn test_store_load_integers() {
        let mut m = Mem::new();
        let b = m.alloc(0, 16).unwrap();
        m.store(Chunk::Int32, b, 4, Val::Int(-7)).unwrap();
        assert_eq!(m.load(Chunk::Int32, b, 4), Some(Val::Int(-7)));
        assert_eq!(m.load(Chunk::Int8Unsigned, b, 4), Some(Val::Int(0xf9)));
        assert_eq!(m.load(Chunk::Int8Signed, b, 4), Some(Val::Int(-7)));
        // Never written
        assert_eq!(m.load(Chunk::Int32, b, 8), Some(Val::Undef));
    }

    #[test]
    fn test_pointer_round_trip() {
        let mut m = Mem::new();
        let target = m.alloc(0, 4).unwrap();
        let b = m.alloc(0, 16).unwrap();
        let p = Val::Ptr(target, 2);
        m.store(Chunk::Int64, b, 8, p).unwrap();
        assert_eq!(m.load(Chunk::Int64, b, 8), Some(p));
        // Partially overwritten pointers are garbage
        m.store(Chunk::Int8Unsigned, b, 9, Val::Int(0)).unwrap();
        assert_eq!(m.load(Chunk::Int64, b, 8), Some(Val::Undef));
    }

    #[test]
    fn test_bounds_and_alignment() {
        let mut m = Mem::new();
        let b = m.alloc(0, 8).unwrap();
        assert!(m.store(Chunk::Int64, b, 4, Val::Long(1)).is_none());
        assert!(m.store(Chunk::Int32, b, 6, Val::Int(1)).is_none());
        assert!(m.store(Chunk::Int32, b, 2, Val::Int(1)).is_none());
        assert!(m.load(Chunk::Int64, b, 0).is_some());
    }

    #[test]
    fn test_accesses_near_offset_limits_fail() {
        let mut m = Mem::new();
        let b = m.alloc(0, 8).unwrap();
        assert!(m.load(Chunk::Int32, b, i64::MAX - 2).is_none());
        assert!(m.store(Chunk::Int64, b, i64::MAX - 7, Val::Long(1)).is_none());
        assert!(m.load_bytes(b, i64::MAX, 8).is_none());
        assert!(m.load_bytes(b, 4, -2).is_none());
    }

    #[test]
    fn test_oversized_alloc_fails() {
        let mut m = Mem::new();
        assert!(m.alloc(-8, i64::MAX).is_none());
        assert!(m.alloc(i64::MIN, 0).is_none());
        assert!(m.alloc(0, MAX_BLOCK_SIZE + 1).is_none());
        // Failed allocations consume no identifier
        assert_eq!(m.alloc(0, 8), Some(BlockId(1)));
    }

    #[test]
    fn test_free_invalidates() {
        let mut m = Mem::new();
        let b = m.alloc(0, 8).unwrap();
        assert!(m.free(b, 0, 4).is_none());
        m.free(b, 0, 8).unwrap();
        assert!(m.load(Chunk::Int32, b, 0).is_none());
        assert!(m.free(b, 0, 8).is_none());
        assert!(!m.valid_pointer(b, 0));
    }

    #[test]
    fn test_zero_sized_block() {
        let mut m = Mem::new();
        let b = m.alloc(0, 0).unwrap();
        assert!(m.load(Chunk::Int8Unsigned, b, 0).is_none());
        assert!(m.free(b, 0, 0).is_some());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut m = Mem::new();
        let b = m.alloc(0, 8).unwrap();
        let snapshot = m.clone();
        m.store(Chunk::Int32, b, 0, Val::Int(1)).unwrap();
        assert_eq!(snapshot.load(Chunk::Int32, b, 0), Some(Val::Undef));
    }

    #[test]
    fn test_no_dangling() {
        let mut m = Mem::new();
        let b = m.alloc(0, 8).unwrap();
        m.store(Chunk::Int64, b, 0, Val::Ptr(BlockId(1), 0)).unwrap();
        assert!(m.no_dangling());
        m.store(Chunk::Int64, b, 0, Val::Ptr(BlockId(9), 0)).unwrap();
        assert!(!m.no_dangling());
    }
}
