//! A single-volume flat file system emulated over one fixed-size block
//! image. 4226 blocks of 8192 bytes; a flat 128-entry namespace; first-fit
//! bitmap allocation for blocks and inodes. The whole image loads into
//! memory on `open` and persists wholesale on `close`.
//!
//! # Layout
//! ================================================================================
//! | Directory | Bitmap (blocks) | Bitmap (inodes) | Inodes | Reserved | Data     |
//! | block 0   | block 1         | block 2         | 3..82  | ..132    | 132..4226|
//! ================================================================================

mod alloc;
mod dir;
mod fs;
pub mod layout;
mod node;
mod store;

pub use fs::{FileInfo, FlatFs, FsError};
pub use layout::{
    BLOCK_COUNT, BLOCK_SIZE, CAPACITY_BYTES, DATA_BLOCKS, DATA_START, MAX_FILES,
    MAX_FILE_BLOCKS, MAX_NAME_LEN,
};
