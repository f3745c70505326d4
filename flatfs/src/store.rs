use std::fs::File;
use std::io::prelude::*;
use std::path::Path;

use log::debug;

use crate::layout::{BLOCK_COUNT, BLOCK_SIZE, IMAGE_BYTES};

/// The block number to access ranging from 0 (the first block) to n - 1 (the
/// last block) where n is number of blocks available.
pub type BlockNumber = usize;

/// The in-memory block arena: every block of the volume, metadata and data
/// alike, as one contiguous buffer. The whole arena moves to and from the
/// image file in a single shot; individual operations only ever touch memory.
#[derive(Debug)]
pub struct BlockStore {
    arena: Vec<u8>,
}

impl BlockStore {
    /// A zero-filled arena, the state `createfs` starts from.
    pub fn new() -> Self {
        Self {
            arena: vec![0; IMAGE_BYTES],
        }
    }

    /// Loads a whole image into a fresh arena. A missing file surfaces as
    /// the open error; no size or integrity validation happens beyond that,
    /// a short file simply leaves the tail of the arena zeroed.
    pub fn load<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut file = File::open(path)?;
        let mut arena = vec![0; IMAGE_BYTES];
        let mut filled = 0;
        while filled < IMAGE_BYTES {
            let n = file.read(&mut arena[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        debug!("loaded {} of {} image bytes", filled, IMAGE_BYTES);
        Ok(Self { arena })
    }

    /// Writes the whole arena back verbatim and syncs the file.
    pub fn persist<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(&self.arena)?;
        file.sync_all()?;
        Ok(())
    }

    /// One block as a byte slice. Out-of-range numbers are internal misuse
    /// and panic.
    pub fn block(&self, nr: BlockNumber) -> &[u8] {
        assert!(nr < BLOCK_COUNT, "block out of range");
        &self.arena[nr * BLOCK_SIZE..(nr + 1) * BLOCK_SIZE]
    }

    pub fn block_mut(&mut self, nr: BlockNumber) -> &mut [u8] {
        assert!(nr < BLOCK_COUNT, "block out of range");
        &mut self.arena[nr * BLOCK_SIZE..(nr + 1) * BLOCK_SIZE]
    }

    /// A contiguous run of blocks, for the metadata structures that straddle
    /// block boundaries.
    pub fn blocks(&self, start: BlockNumber, count: usize) -> &[u8] {
        assert!(start + count <= BLOCK_COUNT, "block run out of range");
        &self.arena[start * BLOCK_SIZE..(start + count) * BLOCK_SIZE]
    }

    pub fn blocks_mut(&mut self, start: BlockNumber, count: usize) -> &mut [u8] {
        assert!(start + count <= BLOCK_COUNT, "block run out of range");
        &mut self.arena[start * BLOCK_SIZE..(start + count) * BLOCK_SIZE]
    }
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::new()
    }
}
