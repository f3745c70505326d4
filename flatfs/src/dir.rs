use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::layout::{DIR_ENTRY_BYTES, MAX_FILES};

/// On-disk "no inode" sentinel. Never visible through the accessors.
const NO_INODE: u32 = u32::MAX;

/// Name field width; one byte more than the longest storable name, NUL
/// padded.
const NAME_FIELD: usize = 32;

/// One directory entry exactly as it sits in the directory block.
///
/// This structure __must not exceed 48 bytes.__
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy)]
pub struct DirEntry {
    /// Creation time, seconds since the epoch.
    created: i64,
    /// Index into the inode table, `NO_INODE` while the slot is empty.
    inode: u32,
    /// Non-zero while the entry names a live file.
    valid: u8,
    name: [u8; NAME_FIELD],
    _pad: [u8; 3],
}

const _: () = assert!(std::mem::size_of::<DirEntry>() == DIR_ENTRY_BYTES);

impl DirEntry {
    pub fn is_valid(&self) -> bool {
        self.valid != 0
    }

    /// The stored name, NUL padding stripped.
    pub fn name(&self) -> &str {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_FIELD);
        std::str::from_utf8(&self.name[..end]).unwrap_or("")
    }

    pub fn created(&self) -> i64 {
        self.created
    }

    pub fn inode(&self) -> Option<u32> {
        if self.is_valid() && self.inode != NO_INODE {
            Some(self.inode)
        } else {
            None
        }
    }

    /// Binds `name` to `inode` and marks the entry live. The name must
    /// already have passed the length check.
    pub fn fill(&mut self, name: &str, inode: u32, created: i64) {
        debug_assert!(name.len() < NAME_FIELD);
        self.name = [0; NAME_FIELD];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
        self.inode = inode;
        self.created = created;
        self.valid = 1;
    }

    pub fn clear(&mut self) {
        self.created = 0;
        self.inode = NO_INODE;
        self.valid = 0;
        self.name = [0; NAME_FIELD];
    }
}

/// The flat namespace: a fixed run of entries living in the directory block.
pub struct DirectoryTable {
    entries: Box<[DirEntry; MAX_FILES]>,
}

impl DirectoryTable {
    pub fn new() -> Self {
        let mut entries = <[DirEntry; MAX_FILES]>::new_box_zeroed();
        for e in entries.iter_mut() {
            e.clear();
        }
        Self { entries }
    }

    /// Reads the table back out of the directory block.
    pub fn parse(buf: &[u8]) -> Self {
        let mut table = Self::new();
        for (i, e) in table.entries.iter_mut().enumerate() {
            let off = i * DIR_ENTRY_BYTES;
            e.as_bytes_mut()
                .copy_from_slice(&buf[off..off + DIR_ENTRY_BYTES]);
        }
        table
    }

    /// Writes the table into the directory block buffer.
    pub fn serialize_into(&self, buf: &mut [u8]) {
        for (i, e) in self.entries.iter().enumerate() {
            let off = i * DIR_ENTRY_BYTES;
            buf[off..off + DIR_ENTRY_BYTES].copy_from_slice(e.as_bytes());
        }
    }

    /// Exact, case-sensitive lookup over the live entries.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.is_valid() && e.name() == name)
    }

    /// First-fit slot allocation: claims and returns the lowest invalid
    /// slot, or `None` when the directory is full.
    pub fn allocate(&mut self) -> Option<usize> {
        let slot = self.entries.iter().position(|e| !e.is_valid())?;
        self.entries[slot].valid = 1;
        Some(slot)
    }

    /// Retires a slot for reuse.
    pub fn release(&mut self, slot: usize) {
        self.entries[slot].clear();
    }

    pub fn entry(&self, slot: usize) -> &DirEntry {
        &self.entries[slot]
    }

    pub fn entry_mut(&mut self, slot: usize) -> &mut DirEntry {
        &mut self.entries[slot]
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter()
    }
}

impl Default for DirectoryTable {
    fn default() -> Self {
        Self::new()
    }
}
