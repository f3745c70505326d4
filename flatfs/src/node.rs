use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::layout::{INODE_BYTES, MAX_FILES, MAX_FILE_BLOCKS};

/// On-disk "no block" sentinel inside the reference array. The accessors
/// only ever hand out the populated prefix.
const NO_BLOCK: u32 = u32::MAX;

/// One inode exactly as it sits in the inode-table region.
///
/// This structure __must not exceed 5008 bytes.__
#[repr(C)]
#[derive(AsBytes, FromBytes, FromZeroes, Clone)]
pub struct Inode {
    /// The total size of the file in bytes.
    size: u32,
    /// The two file attributes are independent flags, not a packed field.
    hidden: u8,
    read_only: u8,
    _pad: [u8; 2],
    /// Ordered data-block references. The populated prefix is exactly
    /// `ceil(size / BLOCK_SIZE)` long, the rest stays at `NO_BLOCK`.
    blocks: [u32; MAX_FILE_BLOCKS],
}

const _: () = assert!(std::mem::size_of::<Inode>() == INODE_BYTES);

impl Inode {
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn set_size(&mut self, size: u32) {
        self.size = size;
    }

    pub fn hidden(&self) -> bool {
        self.hidden != 0
    }

    pub fn set_hidden(&mut self, on: bool) {
        self.hidden = on as u8;
    }

    pub fn read_only(&self) -> bool {
        self.read_only != 0
    }

    pub fn set_read_only(&mut self, on: bool) {
        self.read_only = on as u8;
    }

    /// The populated prefix of the reference array, in file order.
    pub fn block_refs(&self) -> impl Iterator<Item = u32> + '_ {
        self.blocks.iter().copied().take_while(|&b| b != NO_BLOCK)
    }

    pub fn block_count(&self) -> usize {
        self.block_refs().count()
    }

    /// Appends a reference at `pos`, the next unpopulated position.
    pub fn set_ref(&mut self, pos: usize, block: u32) {
        debug_assert!(pos == 0 || self.blocks[pos - 1] != NO_BLOCK);
        self.blocks[pos] = block;
    }

    /// Back to the empty state: zero size, both attributes off, every
    /// reference at the sentinel.
    pub fn clear(&mut self) {
        self.size = 0;
        self.hidden = 0;
        self.read_only = 0;
        self.blocks = [NO_BLOCK; MAX_FILE_BLOCKS];
    }
}

/// The fixed-capacity inode table, straddling several metadata blocks.
pub struct InodeTable {
    nodes: Box<[Inode; MAX_FILES]>,
}

impl InodeTable {
    pub fn new() -> Self {
        let mut nodes = <[Inode; MAX_FILES]>::new_box_zeroed();
        for n in nodes.iter_mut() {
            n.clear();
        }
        Self { nodes }
    }

    /// Reads the table back out of the inode-table region.
    pub fn parse(buf: &[u8]) -> Self {
        let mut table = Self::new();
        for (i, n) in table.nodes.iter_mut().enumerate() {
            let off = i * INODE_BYTES;
            n.as_bytes_mut().copy_from_slice(&buf[off..off + INODE_BYTES]);
        }
        table
    }

    /// Writes the table into the inode-table region buffer.
    pub fn serialize_into(&self, buf: &mut [u8]) {
        for (i, n) in self.nodes.iter().enumerate() {
            let off = i * INODE_BYTES;
            buf[off..off + INODE_BYTES].copy_from_slice(n.as_bytes());
        }
    }

    pub fn get(&self, i: usize) -> &Inode {
        &self.nodes[i]
    }

    pub fn get_mut(&mut self, i: usize) -> &mut Inode {
        &mut self.nodes[i]
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{BLOCK_SIZE, INODE_TABLE_BLOCKS};

    #[test]
    fn fresh_inode_is_empty() {
        let table = InodeTable::new();
        let node = table.get(0);
        assert_eq!(node.size(), 0);
        assert!(!node.hidden());
        assert!(!node.read_only());
        assert_eq!(node.block_count(), 0);
    }

    #[test]
    fn refs_come_back_in_append_order() {
        let mut table = InodeTable::new();
        let node = table.get_mut(3);
        node.set_ref(0, 140);
        node.set_ref(1, 132);
        node.set_ref(2, 999);

        let refs: Vec<u32> = node.block_refs().collect();
        assert_eq!(refs, vec![140, 132, 999]);
    }

    #[test]
    fn clear_resets_everything() {
        let mut table = InodeTable::new();
        let node = table.get_mut(0);
        node.set_size(10_000);
        node.set_hidden(true);
        node.set_read_only(true);
        node.set_ref(0, 132);
        node.clear();

        assert_eq!(node.size(), 0);
        assert!(!node.hidden());
        assert!(!node.read_only());
        assert_eq!(node.block_count(), 0);
    }

    #[test]
    fn attributes_toggle_independently() {
        let mut table = InodeTable::new();
        let node = table.get_mut(0);
        node.set_hidden(true);
        assert!(node.hidden() && !node.read_only());

        node.set_read_only(true);
        node.set_hidden(false);
        assert!(!node.hidden() && node.read_only());
    }

    #[test]
    fn survives_a_serialize_parse_cycle() {
        let mut table = InodeTable::new();
        let node = table.get_mut(5);
        node.set_size(8193);
        node.set_hidden(true);
        node.set_ref(0, 132);
        node.set_ref(1, 133);

        let mut region = vec![0u8; INODE_TABLE_BLOCKS * BLOCK_SIZE];
        table.serialize_into(&mut region);
        let read_back = InodeTable::parse(&region);

        let node = read_back.get(5);
        assert_eq!(node.size(), 8193);
        assert!(node.hidden());
        assert_eq!(node.block_refs().collect::<Vec<_>>(), vec![132, 133]);
    }
}
