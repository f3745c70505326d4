use std::fs::File;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};
use thiserror::Error;

use crate::alloc::Bitmap;
use crate::dir::DirectoryTable;
use crate::layout::{
    BLOCK_COUNT, BLOCK_MAP_BLOCK, BLOCK_SIZE, CAPACITY_BYTES, DATA_START, DIR_BLOCK,
    INODE_MAP_BLOCK, INODE_TABLE_BLOCKS, INODE_TABLE_START, MAX_FILES, MAX_FILE_BLOCKS,
    MAX_NAME_LEN,
};
use crate::node::InodeTable;
use crate::store::BlockStore;

#[derive(Error, Debug)]
pub enum FsError {
    #[error("file not found")]
    NotFound,
    #[error("file name too long")]
    NameTooLong,
    #[error("not enough disk space")]
    InsufficientSpace,
    #[error("file too big")]
    FileTooLarge,
    #[error("that file is marked read-only")]
    ReadOnlyViolation,
    #[error("a file with that name already exists")]
    AlreadyExists,
    #[error("no free directory entries or inodes")]
    DirectoryFull,
    #[error("unrecognized attribute: {0:?}")]
    UnrecognizedAttribute(String),
    #[error("unrecognized operation: {0:?}")]
    UnrecognizedOperation(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One row of a `list` report.
pub struct FileInfo {
    pub name: String,
    pub size: u32,
    /// Creation time, seconds since the epoch.
    pub created: i64,
}

/// A mounted volume: the block arena, the metadata tables, and the path the
/// whole thing persists back to on `close`. The only owner of any volume
/// state; operations mutate memory and touch the image file only through
/// `format`/`open`/`close`.
pub struct FlatFs {
    store: BlockStore,
    dir: DirectoryTable,
    inodes: InodeTable,
    block_map: Bitmap,
    inode_map: Bitmap,
    path: PathBuf,
}

impl FlatFs {
    /// `createfs`: writes a fresh empty image at `path`. The new image is
    /// not left bound; follow with [`FlatFs::open`] to use it.
    pub fn format<P: AsRef<Path>>(path: P) -> Result<(), FsError> {
        let mut fs = FlatFs {
            store: BlockStore::new(),
            dir: DirectoryTable::new(),
            inodes: InodeTable::new(),
            block_map: Bitmap::new(),
            inode_map: Bitmap::new(),
            path: path.as_ref().to_path_buf(),
        };
        // Only the data pool and the inode slots are allocatable; the
        // metadata blocks stay marked used forever.
        for nr in DATA_START..BLOCK_COUNT {
            fs.block_map.set_free(nr);
        }
        for i in 0..MAX_FILES {
            fs.inode_map.set_free(i);
        }
        fs.flush_tables();
        fs.store.persist(&fs.path)?;
        info!("formatted empty volume at {}", fs.path.display());
        Ok(())
    }

    /// `open`: loads a whole image and parses the metadata tables out of it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FsError> {
        let path = path.as_ref().to_path_buf();
        let store = BlockStore::load(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FsError::NotFound
            } else {
                FsError::Io(e)
            }
        })?;
        let dir = DirectoryTable::parse(store.block(DIR_BLOCK));
        let block_map = Bitmap::parse(store.block(BLOCK_MAP_BLOCK));
        let inode_map = Bitmap::parse(store.block(INODE_MAP_BLOCK));
        let inodes =
            InodeTable::parse(store.blocks(INODE_TABLE_START, INODE_TABLE_BLOCKS));
        info!("opened volume {}", path.display());
        Ok(FlatFs {
            store,
            dir,
            inodes,
            block_map,
            inode_map,
            path,
        })
    }

    /// `close`: persists the image back to its path and unbinds it.
    pub fn close(mut self) -> Result<(), FsError> {
        self.flush_tables();
        self.store.persist(&self.path)?;
        info!("closed volume {}", self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serializes every table into its metadata blocks.
    fn flush_tables(&mut self) {
        self.dir.serialize_into(self.store.block_mut(DIR_BLOCK));
        self.store
            .block_mut(BLOCK_MAP_BLOCK)
            .copy_from_slice(self.block_map.serialize());
        self.store
            .block_mut(INODE_MAP_BLOCK)
            .copy_from_slice(self.inode_map.serialize());
        self.inodes.serialize_into(
            self.store
                .blocks_mut(INODE_TABLE_START, INODE_TABLE_BLOCKS),
        );
    }

    /// `put`: imports an external file. The stored name is the source's
    /// final path component. Precondition failures leave the volume
    /// untouched, and so does any read failure mid-copy: every resource
    /// taken for the new file is released again before the error returns.
    pub fn put(&mut self, source: &Path) -> Result<(), FsError> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or(FsError::NotFound)?;
        if name.len() > MAX_NAME_LEN {
            return Err(FsError::NameTooLong);
        }
        let meta = std::fs::metadata(source).map_err(|_| FsError::NotFound)?;
        if self.dir.find(&name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let size = meta.len();
        if size > CAPACITY_BYTES - self.used_bytes() {
            return Err(FsError::InsufficientSpace);
        }
        if size > (MAX_FILE_BLOCKS * BLOCK_SIZE) as u64 {
            return Err(FsError::FileTooLarge);
        }

        let mut reader = File::open(source)?;

        let slot = self.dir.allocate().ok_or(FsError::DirectoryFull)?;
        let inode_idx = match self.inode_map.first_free(0..MAX_FILES) {
            Some(i) => i,
            None => {
                self.dir.release(slot);
                return Err(FsError::DirectoryFull);
            }
        };
        self.inode_map.set_used(inode_idx);

        self.dir
            .entry_mut(slot)
            .fill(&name, inode_idx as u32, now_epoch_secs());
        let inode = self.inodes.get_mut(inode_idx);
        inode.clear();
        inode.set_size(size as u32);

        // Chunked copy, driven by a remaining-bytes counter that drops by a
        // whole block per iteration. The final block is only written through
        // `size % BLOCK_SIZE`; its tail keeps whatever bytes it already
        // held, which `get` never exposes because it stops at `size`.
        let mut remaining = size as i64;
        let mut count = 0;
        while remaining > 0 {
            let nr = match self.block_map.first_free(DATA_START..BLOCK_COUNT) {
                Some(nr) => nr,
                None => {
                    self.rollback_put(slot, inode_idx);
                    return Err(FsError::InsufficientSpace);
                }
            };
            self.block_map.set_used(nr);
            self.inodes.get_mut(inode_idx).set_ref(count, nr as u32);

            let want = (remaining.min(BLOCK_SIZE as i64)) as usize;
            let chunk = &mut self.store.block_mut(nr)[..want];
            if let Err(e) = reader.read_exact(chunk) {
                // The source shrank under us; undo every allocation.
                self.rollback_put(slot, inode_idx);
                return Err(FsError::Io(e));
            }
            debug!("put {}: block {} holds {} bytes", name, nr, want);

            remaining -= BLOCK_SIZE as i64;
            count += 1;
        }

        info!("put {} ({} bytes in {} blocks)", name, size, count);
        Ok(())
    }

    /// Releases everything a failed `put` had taken.
    fn rollback_put(&mut self, slot: usize, inode_idx: usize) {
        let refs: Vec<u32> = self.inodes.get(inode_idx).block_refs().collect();
        for nr in refs {
            self.block_map.set_free(nr as usize);
        }
        self.inodes.get_mut(inode_idx).clear();
        self.inode_map.set_free(inode_idx);
        self.dir.release(slot);
    }

    /// `get`: exports a stored file into the working directory, as
    /// `new_name` when given.
    pub fn get(&self, name: &str, new_name: Option<&str>) -> Result<(), FsError> {
        let slot = self.dir.find(name).ok_or(FsError::NotFound)?;
        if let Some(n) = new_name {
            if n.len() > MAX_NAME_LEN {
                return Err(FsError::NameTooLong);
            }
        }
        let dest = new_name.unwrap_or(name);
        let mut out = File::create(dest)?;
        self.copy_out(slot, &mut out)?;
        info!("got {} as {}", name, dest);
        Ok(())
    }

    /// The stored bytes of `name`, exactly `size` of them.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>, FsError> {
        let slot = self.dir.find(name).ok_or(FsError::NotFound)?;
        let mut buf = Vec::new();
        self.copy_out(slot, &mut buf)?;
        Ok(buf)
    }

    /// Walks the block list writing full blocks until the last chunk, which
    /// stops at the recorded size. Stale bytes past the end of the final
    /// block never leave the arena.
    fn copy_out(&self, slot: usize, out: &mut impl Write) -> Result<(), FsError> {
        let inode_idx = self.dir.entry(slot).inode().ok_or(FsError::NotFound)? as usize;
        let inode = self.inodes.get(inode_idx);
        let mut remaining = inode.size() as usize;
        for nr in inode.block_refs() {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(BLOCK_SIZE);
            out.write_all(&self.store.block(nr as usize)[..take])?;
            remaining -= take;
        }
        Ok(())
    }

    /// `del`: removes a file and returns all of its resources to the free
    /// pools. Read-only files refuse, untouched.
    pub fn del(&mut self, name: &str) -> Result<(), FsError> {
        let slot = self.dir.find(name).ok_or(FsError::NotFound)?;
        let inode_idx = self.dir.entry(slot).inode().ok_or(FsError::NotFound)? as usize;
        if self.inodes.get(inode_idx).read_only() {
            return Err(FsError::ReadOnlyViolation);
        }

        let refs: Vec<u32> = self.inodes.get(inode_idx).block_refs().collect();
        for nr in &refs {
            self.block_map.set_free(*nr as usize);
        }
        self.inodes.get_mut(inode_idx).clear();
        self.inode_map.set_free(inode_idx);
        self.dir.release(slot);
        info!("deleted {} ({} blocks freed)", name, refs.len());
        Ok(())
    }

    /// `attrib`: toggles one of the two attribute flags. `op` is a sign
    /// (`+`/`-`) followed by a letter (`h`/`r`, either case). Setting an
    /// already-set flag is a no-op.
    pub fn attrib(&mut self, op: &str, name: &str) -> Result<(), FsError> {
        let slot = self.dir.find(name).ok_or(FsError::NotFound)?;
        let inode_idx = self.dir.entry(slot).inode().ok_or(FsError::NotFound)? as usize;

        let mut chars = op.chars();
        let on = match chars.next() {
            Some('+') => true,
            Some('-') => false,
            _ => return Err(FsError::UnrecognizedOperation(op.to_string())),
        };
        let letter = chars.next();
        if letter.is_none() || chars.next().is_some() {
            return Err(FsError::UnrecognizedAttribute(op.to_string()));
        }
        let inode = self.inodes.get_mut(inode_idx);
        match letter.map(|c| c.to_ascii_lowercase()) {
            Some('h') => inode.set_hidden(on),
            Some('r') => inode.set_read_only(on),
            _ => return Err(FsError::UnrecognizedAttribute(op.to_string())),
        }
        Ok(())
    }

    /// `list`: the visible view (`show_hidden` false) or the hidden view
    /// (`show_hidden` true). The two are disjoint.
    pub fn list(&self, show_hidden: bool) -> Vec<FileInfo> {
        self.dir
            .iter()
            .filter(|e| e.is_valid())
            .filter_map(|e| {
                let inode = self.inodes.get(e.inode()? as usize);
                if inode.hidden() != show_hidden {
                    return None;
                }
                Some(FileInfo {
                    name: e.name().to_string(),
                    size: inode.size(),
                    created: e.created(),
                })
            })
            .collect()
    }

    /// `df`: usable bytes left, against the headroom-adjusted capacity.
    pub fn free_bytes(&self) -> u64 {
        CAPACITY_BYTES - self.used_bytes()
    }

    /// Bytes held by every live file.
    fn used_bytes(&self) -> u64 {
        self.dir
            .iter()
            .filter(|e| e.is_valid())
            .filter_map(|e| e.inode())
            .map(|i| self.inodes.get(i as usize).size() as u64)
            .sum()
    }

    /// Free-map population of the data pool.
    pub fn free_data_blocks(&self) -> usize {
        self.block_map.count_free(DATA_START..BLOCK_COUNT)
    }

    /// Blocks referenced by live inodes, counted from the inode side so the
    /// figure can be checked against [`FlatFs::free_data_blocks`].
    pub fn used_data_blocks(&self) -> usize {
        self.dir
            .iter()
            .filter(|e| e.is_valid())
            .filter_map(|e| e.inode())
            .map(|i| self.inodes.get(i as usize).block_count())
            .sum()
    }
}

fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn fresh_volume(dir: &tempfile::TempDir) -> FlatFs {
        let image = dir.path().join("test.img");
        FlatFs::format(&image).unwrap();
        FlatFs::open(&image).unwrap()
    }

    fn source_file(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    #[test]
    fn format_writes_a_full_size_image() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("disk.img");
        FlatFs::format(&image).unwrap();
        assert_eq!(
            std::fs::metadata(&image).unwrap().len(),
            crate::layout::IMAGE_BYTES as u64
        );
    }

    #[test]
    fn opening_a_missing_image_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        match FlatFs::open(dir.path().join("absent.img")) {
            Err(FsError::NotFound) => (),
            _ => panic!("expected NotFound"),
        }
    }

    #[test]
    fn fresh_volume_reports_full_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let fs = fresh_volume(&dir);
        assert_eq!(fs.free_bytes(), CAPACITY_BYTES);
        assert_eq!(fs.free_data_blocks(), BLOCK_COUNT - DATA_START);
        assert_eq!(fs.used_data_blocks(), 0);
        assert!(fs.list(false).is_empty());
        assert!(fs.list(true).is_empty());
    }

    #[test]
    fn put_rejects_names_longer_than_31_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = fresh_volume(&dir);
        let long = source_file(&dir, &"n".repeat(32), b"x");
        match fs.put(&long) {
            Err(FsError::NameTooLong) => (),
            _ => panic!("expected NameTooLong"),
        }
    }

    #[test]
    fn put_rejects_missing_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = fresh_volume(&dir);
        match fs.put(&dir.path().join("nope.bin")) {
            Err(FsError::NotFound) => (),
            _ => panic!("expected NotFound"),
        }
    }

    #[test]
    fn put_rejects_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = fresh_volume(&dir);
        let src = source_file(&dir, "twice.bin", b"abc");
        fs.put(&src).unwrap();
        match fs.put(&src) {
            Err(FsError::AlreadyExists) => (),
            _ => panic!("expected AlreadyExists"),
        }
    }

    #[test]
    fn attrib_parses_sign_and_letter() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = fresh_volume(&dir);
        let src = source_file(&dir, "a.bin", b"abc");
        fs.put(&src).unwrap();

        fs.attrib("+h", "a.bin").unwrap();
        assert_eq!(fs.list(true).len(), 1);
        // Case-insensitive letter, idempotent set.
        fs.attrib("+H", "a.bin").unwrap();
        assert_eq!(fs.list(true).len(), 1);
        fs.attrib("-h", "a.bin").unwrap();
        assert_eq!(fs.list(false).len(), 1);

        match fs.attrib("*h", "a.bin") {
            Err(FsError::UnrecognizedOperation(_)) => (),
            _ => panic!("expected UnrecognizedOperation"),
        }
        match fs.attrib("+x", "a.bin") {
            Err(FsError::UnrecognizedAttribute(_)) => (),
            _ => panic!("expected UnrecognizedAttribute"),
        }
        match fs.attrib("+hh", "a.bin") {
            Err(FsError::UnrecognizedAttribute(_)) => (),
            _ => panic!("expected UnrecognizedAttribute"),
        }
        match fs.attrib("+h", "absent") {
            Err(FsError::NotFound) => (),
            _ => panic!("expected NotFound"),
        }
    }

    #[test]
    fn get_validates_the_new_name_length() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = fresh_volume(&dir);
        let src = source_file(&dir, "a.bin", b"abc");
        fs.put(&src).unwrap();

        match fs.get("a.bin", Some(&"n".repeat(32))) {
            Err(FsError::NameTooLong) => (),
            _ => panic!("expected NameTooLong"),
        }
        match fs.get("absent", None) {
            Err(FsError::NotFound) => (),
            _ => panic!("expected NotFound"),
        }
    }
}
