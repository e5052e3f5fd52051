use std::path::Path;

use crate::backing::{Backing, MappedFile};
use crate::error::{Result, StoreError};
use crate::zone::{BlockRef, GrowableZone, Zone};

/// Entries the lookup table starts with; it doubles when full.
pub const INITIAL_TABLE_CAPACITY: usize = 64;
/// Size a new region file starts at.
pub const INITIAL_FILE_LEN: usize = 64 * 1024;

const TABLE_HEADER: usize = 8;
const ENTRY_LEN: usize = 16;

#[inline]
fn rd32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

#[inline]
fn rd64(b: &[u8], at: usize) -> u64 {
    let mut x = [0u8; 8];
    x.copy_from_slice(&b[at..at + 8]);
    u64::from_le_bytes(x)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Entry {
    key: u64,
    block: BlockRef,
    len: u32,
}

fn table_bytes(capacity: usize) -> usize {
    TABLE_HEADER + capacity * ENTRY_LEN
}

fn read_entry(table: &[u8], i: usize) -> Entry {
    let at = TABLE_HEADER + i * ENTRY_LEN;
    Entry {
        key: rd64(table, at),
        block: BlockRef::from_offset(rd32(table, at + 8)),
        len: rd32(table, at + 12),
    }
}

/// Keyed blob store inside one zone.
///
/// The zone header's lookup root points at a table block
/// `{capacity u32, count u32, entries[{key u64, offset u32, len u32}]}` that is
/// scanned linearly. Each value lives in its own block, zero padded past `len`.
pub struct RegionFile<B: Backing> {
    zone: GrowableZone<B>,
    table: BlockRef,
}

impl RegionFile<MappedFile> {
    /// Opens the region file at `path`, formatting it when it is new.
    pub fn open_path(path: &Path) -> Result<Self> {
        let (file, fresh) = MappedFile::open(path, INITIAL_FILE_LEN)?;
        if fresh {
            log::info!(target: "store", "created region file {}", path.display());
            Self::create(file)
        } else {
            log::debug!(target: "store", "opened region file {}", path.display());
            Self::open(file)
        }
    }
}

impl<B: Backing> RegionFile<B> {
    /// Formats `backing` and writes an empty lookup table.
    pub fn create(backing: B) -> Result<Self> {
        let mut zone = GrowableZone::new(Zone::format(backing)?);
        let table = zone.allocate(table_bytes(INITIAL_TABLE_CAPACITY))?;
        let data = zone.data_mut(table);
        data.fill(0);
        data[0..4].copy_from_slice(&(INITIAL_TABLE_CAPACITY as u32).to_le_bytes());
        zone.zone_mut().set_lookup(Some(table));
        Ok(Self { zone, table })
    }

    /// Adopts an existing region file, validating the zone and its table.
    pub fn open(backing: B) -> Result<Self> {
        let zone = Zone::open(backing)?;
        let Some(table) = zone.lookup() else {
            return Err(StoreError::Corruption("region file has no lookup table".into()));
        };
        let data = zone.data(table);
        let capacity = rd32(data, 0) as usize;
        let count = rd32(data, 4) as usize;
        if count > capacity || table_bytes(capacity) > data.len() {
            return Err(StoreError::Corruption(format!(
                "lookup table claims {count}/{capacity} entries in {} bytes",
                data.len()
            )));
        }
        let blocks = zone.blocks();
        for i in 0..count {
            let e = read_entry(data, i);
            let live = blocks
                .binary_search_by_key(&e.block.offset(), |b| b.block.offset())
                .ok()
                .map(|at| blocks[at])
                .filter(|b| b.in_use && b.block != table && e.len as usize <= b.size);
            if live.is_none() {
                return Err(StoreError::Corruption(format!(
                    "lookup entry {i} (key {}) points at offset {} for {} bytes, which is not a live block",
                    e.key,
                    e.block.offset(),
                    e.len
                )));
            }
        }
        Ok(Self {
            zone: GrowableZone::new(zone),
            table,
        })
    }

    fn capacity(&self) -> usize {
        rd32(self.zone.data(self.table), 0) as usize
    }

    pub fn len(&self) -> usize {
        rd32(self.zone.data(self.table), 4) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, i: usize) -> Entry {
        read_entry(self.zone.data(self.table), i)
    }

    fn write_entry(&mut self, i: usize, e: Entry) {
        let d = self.zone.data_mut(self.table);
        let at = TABLE_HEADER + i * ENTRY_LEN;
        d[at..at + 8].copy_from_slice(&e.key.to_le_bytes());
        d[at + 8..at + 12].copy_from_slice(&e.block.offset().to_le_bytes());
        d[at + 12..at + 16].copy_from_slice(&e.len.to_le_bytes());
    }

    fn find(&self, key: u64) -> Option<(usize, Entry)> {
        (0..self.len())
            .map(|i| (i, self.entry(i)))
            .find(|(_, e)| e.key == key)
    }

    pub fn contains(&self, key: u64) -> bool {
        self.find(key).is_some()
    }

    pub fn keys(&self) -> Vec<u64> {
        (0..self.len()).map(|i| self.entry(i).key).collect()
    }

    pub fn load(&self, key: u64) -> Result<Option<Vec<u8>>> {
        let Some((_, e)) = self.find(key) else {
            return Ok(None);
        };
        let data = self.zone.data(e.block);
        let bytes = data.get(..e.len as usize).ok_or_else(|| {
            StoreError::Corruption(format!(
                "key {key} claims {} bytes in a block of {}",
                e.len,
                data.len()
            ))
        })?;
        Ok(Some(bytes.to_vec()))
    }

    /// Stores `bytes` under `key`, reusing and resizing the key's existing block.
    pub fn store(&mut self, key: u64, bytes: &[u8]) -> Result<()> {
        let len = u32::try_from(bytes.len()).map_err(|_| {
            StoreError::CapacityExhausted(format!("value of {} bytes", bytes.len()))
        })?;
        let (slot, block) = match self.find(key) {
            Some((i, e)) => (Some(i), self.zone.reallocate(e.block, bytes.len())?),
            None => (None, self.zone.allocate(bytes.len())?),
        };
        let data = self.zone.data_mut(block);
        data[..bytes.len()].copy_from_slice(bytes);
        data[bytes.len()..].fill(0);

        let entry = Entry { key, block, len };
        match slot {
            Some(i) => self.write_entry(i, entry),
            None => self.push_entry(entry)?,
        }
        Ok(())
    }

    fn push_entry(&mut self, entry: Entry) -> Result<()> {
        let count = self.len();
        let capacity = self.capacity();
        if count == capacity {
            let grown = capacity * 2;
            let table = self.zone.reallocate(self.table, table_bytes(grown))?;
            self.zone.zone_mut().set_lookup(Some(table));
            self.table = table;
            let d = self.zone.data_mut(table);
            d[0..4].copy_from_slice(&(grown as u32).to_le_bytes());
            d[table_bytes(capacity)..table_bytes(grown)].fill(0);
            log::debug!(target: "store", "lookup table grown to {grown} entries");
        }
        self.write_entry(count, entry);
        self.zone.data_mut(self.table)[4..8].copy_from_slice(&((count + 1) as u32).to_le_bytes());
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.zone.flush()
    }

    pub fn file_len(&self) -> usize {
        self.zone.zone().backing().len()
    }

    pub fn zone(&self) -> &Zone<B> {
        self.zone.zone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem() -> RegionFile<Vec<u8>> {
        RegionFile::create(vec![0u8; 4096]).unwrap()
    }

    #[test]
    fn store_and_load() {
        let mut r = mem();
        r.store(7, b"hello").unwrap();
        r.store(9, b"").unwrap();
        assert_eq!(r.load(7).unwrap().as_deref(), Some(&b"hello"[..]));
        assert_eq!(r.load(9).unwrap().as_deref(), Some(&b""[..]));
        assert_eq!(r.load(8).unwrap(), None);
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn overwrite_resizes_in_place_or_moves() {
        let mut r = mem();
        r.store(1, &[1u8; 40]).unwrap();
        r.store(2, &[2u8; 40]).unwrap();
        r.store(1, &[3u8; 300]).unwrap();
        r.store(2, &[4u8; 4]).unwrap();
        assert_eq!(r.load(1).unwrap().unwrap(), vec![3u8; 300]);
        assert_eq!(r.load(2).unwrap().unwrap(), vec![4u8; 4]);
        assert_eq!(r.len(), 2);
        r.zone().check().unwrap();
    }

    #[test]
    fn table_doubles_and_file_grows() {
        let mut r = mem();
        for k in 0..200u64 {
            r.store(k, &k.to_le_bytes()).unwrap();
        }
        assert_eq!(r.len(), 200);
        assert!(r.capacity() >= 200);
        assert!(r.file_len() > 4096);
        for k in 0..200u64 {
            assert_eq!(r.load(k).unwrap().unwrap(), k.to_le_bytes());
        }
        r.zone().check().unwrap();
    }

    #[test]
    fn reopen_keeps_contents() {
        let mut r = mem();
        r.store(42, b"persisted").unwrap();
        let bytes = r.zone.zone().backing().clone();
        let again = RegionFile::open(bytes).unwrap();
        assert_eq!(again.load(42).unwrap().as_deref(), Some(&b"persisted"[..]));
    }

    #[test]
    fn dangling_entry_offset_is_corruption() {
        let mut r = mem();
        r.store(7, b"hello").unwrap();
        r.store(8, b"world").unwrap();
        let table = r.table;
        let at = TABLE_HEADER + 8;
        r.zone.data_mut(table)[at..at + 4].copy_from_slice(&4000u32.to_le_bytes());
        let bytes = r.zone.zone().backing().clone();
        assert!(matches!(RegionFile::open(bytes), Err(StoreError::Corruption(_))));
    }

    #[test]
    fn oversized_entry_length_is_corruption() {
        let mut r = mem();
        r.store(7, b"hello").unwrap();
        let table = r.table;
        let at = TABLE_HEADER + 12;
        r.zone.data_mut(table)[at..at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        let bytes = r.zone.zone().backing().clone();
        assert!(matches!(RegionFile::open(bytes), Err(StoreError::Corruption(_))));
    }

    #[test]
    fn open_requires_lookup_table() {
        let zone = Zone::format(vec![0u8; 1024]).unwrap();
        let bytes = zone.into_backing();
        assert!(matches!(RegionFile::open(bytes), Err(StoreError::Corruption(_))));
    }
}
