use std::ops::Range;

use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::layout::BLOCK_SIZE;

/// Words in one block-sized bitmap.
const WORDS: usize = BLOCK_SIZE / 8;

#[derive(Debug, PartialEq, Eq)]
pub enum State {
    Free,
    Used,
}

/// A block-sized free map. One bit per resource, set means free, so a
/// zero-filled metadata block reads back as "nothing allocatable" until the
/// volume is formatted. The same type backs the free-block map (indexed by
/// absolute block number) and the free-inode map.
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone)]
pub struct Bitmap {
    words: [u64; WORDS],
}

impl Bitmap {
    /// A map with every resource marked used.
    pub fn new() -> Self {
        Self { words: [0; WORDS] }
    }

    /// Reads a map back out of a metadata block.
    pub fn parse(buf: &[u8]) -> Self {
        let mut map = Self::new();
        map.as_bytes_mut().copy_from_slice(&buf[..BLOCK_SIZE]);
        map
    }

    pub fn serialize(&self) -> &[u8] {
        self.as_bytes()
    }

    pub fn state(&self, i: usize) -> State {
        let word = self.words[i / 64];
        if (word >> (i % 64)) & 1 == 1 {
            State::Free
        } else {
            State::Used
        }
    }

    pub fn set_free(&mut self, i: usize) {
        self.words[i / 64] |= 1 << (i % 64);
    }

    pub fn set_used(&mut self, i: usize) {
        self.words[i / 64] &= !(1 << (i % 64));
    }

    /// First-fit scan: the lowest free index in `range`, if any. Callers pass
    /// the resource's live range so metadata blocks and out-of-capacity slots
    /// are never considered.
    pub fn first_free(&self, range: Range<usize>) -> Option<usize> {
        range.into_iter().find(|&i| self.state(i) == State::Free)
    }

    pub fn count_free(&self, range: Range<usize>) -> usize {
        range.into_iter().filter(|&i| self.state(i) == State::Free).count()
    }
}

impl Default for Bitmap {
    fn default() -> Self {
        Self::new()
    }
}
