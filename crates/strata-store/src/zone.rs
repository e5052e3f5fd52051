//! First-fit block allocator living inside a flat byte buffer.
//!
//! Layout, all integers little-endian `u32`:
//!
//! ```text
//! 0   zone header  magic version head tail last lookup reserved[2]
//! 32  block        magic prev_offset inuse size | data[size]
//! ..  block        ...
//! ```
//!
//! Blocks tile `[head, tail)` exactly. Every reference is a byte offset so the
//! buffer can be replaced wholesale (file growth remaps it elsewhere).

use crate::backing::Backing;
use crate::error::{Result, StoreError};

pub const ZONE_MAGIC: u32 = 0x5A4F_4E45;
pub const ZONE_VERSION: u32 = 1;
pub const ZONE_HEADER_LEN: usize = 32;
pub const BLOCK_MAGIC: u32 = 0xB10C_B10C;
pub const BLOCK_HEADER_LEN: usize = 16;
/// Smallest data area a block is split down to.
pub const MIN_BLOCK_DATA: usize = 8;
/// Smallest backing that can hold a formatted zone.
pub const MIN_ZONE_LEN: usize = ZONE_HEADER_LEN + BLOCK_HEADER_LEN + MIN_BLOCK_DATA;

const H_MAGIC: usize = 0;
const H_VERSION: usize = 4;
const H_HEAD: usize = 8;
const H_TAIL: usize = 12;
const H_LAST: usize = 16;
const H_LOOKUP: usize = 20;

const B_MAGIC: usize = 0;
const B_PREV: usize = 4;
const B_INUSE: usize = 8;
const B_SIZE: usize = 12;

/// Offset of a block header inside its zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef(u32);

impl BlockRef {
    #[inline]
    pub fn offset(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn from_offset(offset: u32) -> Self {
        BlockRef(offset)
    }

    #[inline]
    fn at(self) -> usize {
        self.0 as usize
    }

    #[inline]
    fn data_at(self) -> usize {
        self.0 as usize + BLOCK_HEADER_LEN
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    pub block: BlockRef,
    pub size: usize,
    pub in_use: bool,
}

#[inline]
fn align8(n: usize) -> usize {
    (n.max(MIN_BLOCK_DATA) + 7) & !7
}

#[inline]
fn rd(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

#[inline]
fn wr(b: &mut [u8], at: usize, v: u32) {
    b[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

fn corrupt(msg: String) -> StoreError {
    StoreError::Corruption(msg)
}

pub struct Zone<B: Backing> {
    backing: B,
}

impl<B: Backing> Zone<B> {
    /// Writes a fresh header and a single free block spanning the whole backing.
    pub fn format(mut backing: B) -> Result<Self> {
        let len = backing.len();
        if len < MIN_ZONE_LEN || len > u32::MAX as usize {
            return Err(StoreError::CapacityExhausted(format!(
                "cannot format a zone in {len} bytes"
            )));
        }
        let b = backing.bytes_mut();
        b[..ZONE_HEADER_LEN].fill(0);
        wr(b, H_MAGIC, ZONE_MAGIC);
        wr(b, H_VERSION, ZONE_VERSION);
        wr(b, H_HEAD, ZONE_HEADER_LEN as u32);
        wr(b, H_TAIL, len as u32);
        wr(b, H_LAST, ZONE_HEADER_LEN as u32);
        wr(b, H_LOOKUP, 0);
        let mut zone = Zone { backing };
        zone.write_block(
            BlockRef(ZONE_HEADER_LEN as u32),
            0,
            false,
            len - ZONE_HEADER_LEN - BLOCK_HEADER_LEN,
        );
        Ok(zone)
    }

    /// Adopts an existing zone after validating its header and block list.
    pub fn open(backing: B) -> Result<Self> {
        let b = backing.bytes();
        if b.len() < MIN_ZONE_LEN {
            return Err(corrupt(format!("zone of {} bytes is too small", b.len())));
        }
        let magic = rd(b, H_MAGIC);
        if magic != ZONE_MAGIC {
            return Err(corrupt(format!("bad zone magic {magic:#010x}")));
        }
        let version = rd(b, H_VERSION);
        if version != ZONE_VERSION {
            return Err(corrupt(format!("unsupported zone version {version}")));
        }
        let zone = Zone { backing };
        zone.check()?;
        Ok(zone)
    }

    pub fn backing(&self) -> &B {
        &self.backing
    }

    pub fn backing_mut(&mut self) -> &mut B {
        &mut self.backing
    }

    pub fn into_backing(self) -> B {
        self.backing
    }

    #[inline]
    fn hdr(&self, at: usize) -> u32 {
        rd(self.backing.bytes(), at)
    }

    #[inline]
    fn set_hdr(&mut self, at: usize, v: u32) {
        wr(self.backing.bytes_mut(), at, v);
    }

    #[inline]
    fn head(&self) -> usize {
        self.hdr(H_HEAD) as usize
    }

    #[inline]
    pub fn tail(&self) -> usize {
        self.hdr(H_TAIL) as usize
    }

    #[inline]
    fn last(&self) -> usize {
        self.hdr(H_LAST) as usize
    }

    /// Root block recorded in the header (the region file's lookup table).
    pub fn lookup(&self) -> Option<BlockRef> {
        match self.hdr(H_LOOKUP) {
            0 => None,
            off => Some(BlockRef(off)),
        }
    }

    pub fn set_lookup(&mut self, block: Option<BlockRef>) {
        self.set_hdr(H_LOOKUP, block.map_or(0, BlockRef::offset));
    }

    #[inline]
    fn field(&self, block: BlockRef, f: usize) -> u32 {
        rd(self.backing.bytes(), block.at() + f)
    }

    #[inline]
    fn set_field(&mut self, block: BlockRef, f: usize, v: u32) {
        wr(self.backing.bytes_mut(), block.at() + f, v);
    }

    #[inline]
    fn size_of(&self, block: BlockRef) -> usize {
        self.field(block, B_SIZE) as usize
    }

    #[inline]
    fn in_use(&self, block: BlockRef) -> bool {
        self.field(block, B_INUSE) != 0
    }

    #[inline]
    fn next_of(&self, block: BlockRef) -> Option<BlockRef> {
        let next = block.data_at() + self.size_of(block);
        (next < self.tail()).then_some(BlockRef(next as u32))
    }

    #[inline]
    fn prev_of(&self, block: BlockRef) -> Option<BlockRef> {
        match self.field(block, B_PREV) {
            0 => None,
            off => Some(BlockRef(off)),
        }
    }

    fn write_block(&mut self, block: BlockRef, prev: u32, in_use: bool, size: usize) {
        self.set_field(block, B_MAGIC, BLOCK_MAGIC);
        self.set_field(block, B_PREV, prev);
        self.set_field(block, B_INUSE, in_use as u32);
        self.set_field(block, B_SIZE, size as u32);
    }

    // Re-links whatever follows `block` back to it, or records it as the last block.
    fn relink_after(&mut self, block: BlockRef) {
        match self.next_of(block) {
            Some(next) => self.set_field(next, B_PREV, block.offset()),
            None => self.set_hdr(H_LAST, block.offset()),
        }
    }

    /// Data capacity of `block`.
    pub fn capacity(&self, block: BlockRef) -> usize {
        self.size_of(block)
    }

    pub fn data(&self, block: BlockRef) -> &[u8] {
        let at = block.data_at();
        &self.backing.bytes()[at..at + self.size_of(block)]
    }

    pub fn data_mut(&mut self, block: BlockRef) -> &mut [u8] {
        let at = block.data_at();
        let size = self.size_of(block);
        &mut self.backing.bytes_mut()[at..at + size]
    }

    /// Absorbs the following block if it is free.
    fn merge_with_next(&mut self, block: BlockRef) {
        let Some(next) = self.next_of(block) else {
            return;
        };
        if self.in_use(next) {
            return;
        }
        let merged = self.size_of(block) + BLOCK_HEADER_LEN + self.size_of(next);
        self.set_field(next, B_MAGIC, 0);
        self.set_field(block, B_SIZE, merged as u32);
        self.relink_after(block);
    }

    /// Shrinks `block` to `need` bytes when the remainder can form a block of its own.
    fn split(&mut self, block: BlockRef, need: usize) {
        let size = self.size_of(block);
        if size < need + BLOCK_HEADER_LEN + MIN_BLOCK_DATA {
            return;
        }
        let rest = BlockRef((block.data_at() + need) as u32);
        self.set_field(block, B_SIZE, need as u32);
        self.write_block(
            rest,
            block.offset(),
            false,
            size - need - BLOCK_HEADER_LEN,
        );
        self.relink_after(rest);
        self.merge_with_next(rest);
    }

    /// First-fit allocation of at least `size` bytes. `None` when no free block fits.
    pub fn allocate(&mut self, size: usize) -> Option<BlockRef> {
        let need = align8(size);
        let mut cur = Some(BlockRef(self.head() as u32));
        while let Some(block) = cur {
            if !self.in_use(block) && self.size_of(block) >= need {
                self.split(block, need);
                self.set_field(block, B_INUSE, 1);
                return Some(block);
            }
            cur = self.next_of(block);
        }
        None
    }

    /// Resizes `block`, keeping the first `min(old, new)` bytes. Grows in place when
    /// the following block is free and large enough, otherwise moves. On `None` the
    /// original block is untouched.
    pub fn reallocate(&mut self, block: BlockRef, size: usize) -> Option<BlockRef> {
        let need = align8(size);
        let have = self.size_of(block);
        if need <= have {
            self.split(block, need);
            return Some(block);
        }
        if let Some(next) = self.next_of(block) {
            if !self.in_use(next) && have + BLOCK_HEADER_LEN + self.size_of(next) >= need {
                self.merge_with_next(block);
                self.split(block, need);
                return Some(block);
            }
        }
        let moved = self.allocate(size)?;
        let (src, dst) = (block.data_at(), moved.data_at());
        self.backing.bytes_mut().copy_within(src..src + have, dst);
        self.deallocate(block);
        Some(moved)
    }

    /// Frees `block`, coalescing with free neighbours.
    pub fn deallocate(&mut self, block: BlockRef) {
        debug_assert!(self.in_use(block), "double free of {block:?}");
        self.set_field(block, B_INUSE, 0);
        self.merge_with_next(block);
        if let Some(prev) = self.prev_of(block) {
            if !self.in_use(prev) {
                self.merge_with_next(prev);
            }
        }
    }

    /// Adds `[tail, new_len)` after the backing has grown to `new_len` bytes.
    fn extend_to(&mut self, new_len: usize) {
        let tail = self.tail();
        debug_assert!(new_len >= tail + BLOCK_HEADER_LEN + MIN_BLOCK_DATA);
        let last = BlockRef(self.last() as u32);
        let fresh = BlockRef(tail as u32);
        self.write_block(fresh, last.offset(), false, new_len - tail - BLOCK_HEADER_LEN);
        self.set_hdr(H_TAIL, new_len as u32);
        self.set_hdr(H_LAST, fresh.offset());
        if !self.in_use(last) {
            self.merge_with_next(last);
        }
    }

    pub fn blocks(&self) -> Vec<BlockInfo> {
        let mut out = Vec::new();
        let mut cur = Some(BlockRef(self.head() as u32));
        while let Some(block) = cur {
            out.push(BlockInfo {
                block,
                size: self.size_of(block),
                in_use: self.in_use(block),
            });
            cur = self.next_of(block);
        }
        out
    }

    pub fn bytes_in_use(&self) -> usize {
        self.blocks().iter().filter(|b| b.in_use).map(|b| b.size).sum()
    }

    /// Verifies that the block list is well formed and tiles `[head, tail)` exactly.
    pub fn check(&self) -> Result<()> {
        let len = self.backing.len();
        let head = self.head();
        let tail = self.tail();
        if head != ZONE_HEADER_LEN || tail > len || tail < MIN_ZONE_LEN {
            return Err(corrupt(format!(
                "zone bounds head={head} tail={tail} len={len}"
            )));
        }
        let mut at = head;
        let mut prev = 0u32;
        while at < tail {
            if at + BLOCK_HEADER_LEN > tail {
                return Err(corrupt(format!("block header at {at} crosses tail {tail}")));
            }
            let block = BlockRef(at as u32);
            let magic = self.field(block, B_MAGIC);
            if magic != BLOCK_MAGIC {
                return Err(corrupt(format!("bad block magic {magic:#010x} at {at}")));
            }
            if self.field(block, B_PREV) != prev {
                return Err(corrupt(format!("broken back link at {at}")));
            }
            let end = block.data_at() + self.size_of(block);
            if end > tail {
                return Err(corrupt(format!("block at {at} overruns tail {tail}")));
            }
            prev = block.offset();
            at = end;
        }
        if self.last() != prev as usize {
            return Err(corrupt(format!(
                "last block recorded at {} but list ends at {prev}",
                self.last()
            )));
        }
        if let Some(lookup) = self.lookup() {
            let ok = self.blocks().iter().any(|b| b.block == lookup && b.in_use);
            if !ok {
                return Err(corrupt(format!("lookup root {} is not a live block", lookup.0)));
            }
        }
        Ok(())
    }
}

/// A zone that doubles its backing until allocations fit.
pub struct GrowableZone<B: Backing> {
    zone: Zone<B>,
}

impl<B: Backing> GrowableZone<B> {
    pub fn new(zone: Zone<B>) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> &Zone<B> {
        &self.zone
    }

    pub fn zone_mut(&mut self) -> &mut Zone<B> {
        &mut self.zone
    }

    fn grow(&mut self) -> Result<()> {
        let len = self.zone.backing.len();
        let new_len = len.saturating_mul(2);
        if new_len > u32::MAX as usize {
            return Err(StoreError::CapacityExhausted(format!(
                "zone of {len} bytes cannot double within 32-bit offsets"
            )));
        }
        self.zone.backing.grow(new_len)?;
        self.zone.extend_to(new_len);
        Ok(())
    }

    pub fn allocate(&mut self, size: usize) -> Result<BlockRef> {
        loop {
            if let Some(block) = self.zone.allocate(size) {
                return Ok(block);
            }
            self.grow()?;
        }
    }

    pub fn reallocate(&mut self, block: BlockRef, size: usize) -> Result<BlockRef> {
        loop {
            if let Some(block) = self.zone.reallocate(block, size) {
                return Ok(block);
            }
            self.grow()?;
        }
    }

    pub fn deallocate(&mut self, block: BlockRef) {
        self.zone.deallocate(block);
    }

    pub fn data(&self, block: BlockRef) -> &[u8] {
        self.zone.data(block)
    }

    pub fn data_mut(&mut self, block: BlockRef) -> &mut [u8] {
        self.zone.data_mut(block)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.zone.backing.flush()
    }
}
