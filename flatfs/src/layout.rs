//! Fixed geometry of a flatfs image.
//!
//! An image is a flat binary file of exactly `BLOCK_COUNT * BLOCK_SIZE`
//! bytes. The low blocks hold metadata at known locations; everything from
//! `DATA_START` up is the data pool. Record layouts are native-endian, the
//! image is a single-host artifact.

/// Bytes per block.
pub const BLOCK_SIZE: usize = 8192;

/// Total blocks in the image, metadata included.
pub const BLOCK_COUNT: usize = 4226;

/// First data block. Blocks below this hold the directory table, the two
/// bitmaps, and the inode table; they never enter the free pool.
pub const DATA_START: usize = 132;

/// Directory and inode table capacity.
pub const MAX_FILES: usize = 128;

/// Longest storable file name, in bytes. The on-disk field is one byte
/// larger and NUL-padded.
pub const MAX_NAME_LEN: usize = 31;

/// Block references per inode, bounding a single file's size.
pub const MAX_FILE_BLOCKS: usize = 1250;

/// Data blocks held back from the usable capacity, permanently.
pub const HEADROOM_BLOCKS: usize = 8;

/// Blocks in the data pool.
pub const DATA_BLOCKS: usize = BLOCK_COUNT - DATA_START;

/// Usable capacity in bytes, headroom already subtracted. This is the figure
/// `df` reports on a fresh volume.
pub const CAPACITY_BYTES: u64 = ((DATA_BLOCKS - HEADROOM_BLOCKS) * BLOCK_SIZE) as u64;

/// Exact size of an image file.
pub const IMAGE_BYTES: usize = BLOCK_COUNT * BLOCK_SIZE;

/// Known metadata locations.
pub const DIR_BLOCK: usize = 0;
pub const BLOCK_MAP_BLOCK: usize = 1;
pub const INODE_MAP_BLOCK: usize = 2;
pub const INODE_TABLE_START: usize = 3;

/// On-disk record sizes. The structs in `dir` and `node` are asserted
/// against these.
pub const DIR_ENTRY_BYTES: usize = 48;
pub const INODE_BYTES: usize = 5008;

/// Blocks occupied by the inode table.
pub const INODE_TABLE_BLOCKS: usize =
    (MAX_FILES * INODE_BYTES + BLOCK_SIZE - 1) / BLOCK_SIZE;

// The directory table must fit in its single block, and the inode table must
// stay inside the metadata region.
const _: () = assert!(MAX_FILES * DIR_ENTRY_BYTES <= BLOCK_SIZE);
const _: () = assert!(INODE_TABLE_START + INODE_TABLE_BLOCKS <= DATA_START);
// One block-sized bitmap tracks every block in the image.
const _: () = assert!(BLOCK_COUNT <= BLOCK_SIZE * 8);
