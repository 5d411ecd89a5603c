use crate::{Disk, Error, FileRecord, RecordLocation, Sector};
use alloc::{collections::BTreeMap, string::String, string::ToString, sync::Arc, vec::Vec};
use kernel::{
    fs::{Directory, File, FileBlockNumber, InodeNumber, RegularFile},
    sync::{
        atomic::{AtomicBool, AtomicU32},
        spinlock::SpinLock,
    },
};

/// The filesystem disk.
#[derive(Debug, Clone)]
pub struct FsDisk(usize);

impl Disk for FsDisk {
    fn read(&self, sector: Sector, buf: &mut [u8; 512]) -> Result<(), Error> {
        let dev = abyss::dev::get_bdev(self.0).ok_or(Error::DiskError)?;
        dev.read_bios(&mut Some((512 * sector.into_usize(), buf.as_mut())).into_iter())
            .map_err(|_| Error::DiskError)
    }
    fn write(&self, sector: Sector, buf: &[u8; 512]) -> Result<(), Error> {
        let dev = abyss::dev::get_bdev(self.0).ok_or(Error::DiskError)?;
        dev.write_bios(&mut Some((512 * sector.into_usize(), buf.as_ref())).into_iter())
            .map_err(|_| Error::DiskError)
    }
}

#[derive(Clone)]
pub struct FileSystem(Arc<super::SimpleFs<FsDisk>>);

impl FileSystem {
    pub fn load(slot_idx: usize) -> Result<Self, super::Error> {
        abyss::dev::get_bdev(slot_idx).ok_or(Error::DiskError)?;
        super::SimpleFs::load(FsDisk(slot_idx)).map(|o| FileSystem(Arc::new(o)))
    }
}

fn fs_err_to_kernel(e: Error) -> kernel::KernelError {
    match e {
        Error::DiskError => kernel::KernelError::IOError,
        Error::FsError => kernel::KernelError::FilesystemCorrupted("SimpleFS is in invalid state."),
    }
}

// Inode 1 is reserved for the root directory. Every other record (file or
// directory, root or nested) is assigned one lazily the first time it's
// looked up, keyed by the sector its `FileRecord` lives at so repeated
// lookups of the same entry agree on the same number.
static GLOBAL_SIMPLEFS_INO_COUNTER: AtomicU32 = AtomicU32::new(2);
static GLOBAL_SIMPLEFS_INO_TABLE: SpinLock<BTreeMap<Sector, InodeNumber>> =
    SpinLock::new(BTreeMap::new());

fn ino_for_sector(sector: Sector) -> InodeNumber {
    let mut ino_table = GLOBAL_SIMPLEFS_INO_TABLE.lock();
    let result = if let Some(ino) = ino_table.get(&sector) {
        *ino
    } else {
        let ino = InodeNumber::new(GLOBAL_SIMPLEFS_INO_COUNTER.fetch_add(1)).unwrap();
        ino_table.insert(sector, ino);
        ino
    };
    ino_table.unlock();
    result
}

/// A directory of simple fs: either the root, whose record lives in the
/// superblock and is always re-read from there (`loc` is `None`, `record` is
/// an unused placeholder), or a resolved subdirectory, whose record is
/// cached in `record` and lives at `loc` inside its parent.
pub struct SimpleDir {
    fs: FileSystem,
    record: SpinLock<FileRecord>,
    loc: Option<RecordLocation>,
    removed: AtomicBool,
}

impl SimpleDir {
    fn root(fs: FileSystem) -> Self {
        Self { fs, record: SpinLock::new(FileRecord::default()), loc: None, removed: AtomicBool::new(false) }
    }

    fn nested(fs: FileSystem, record: FileRecord, loc: RecordLocation) -> Self {
        Self { fs, record: SpinLock::new(record), loc: Some(loc), removed: AtomicBool::new(false) }
    }

    /// Runs `f` against the directory's own record, unlocking/persisting
    /// regardless of how `f` finishes. The root has no cached record (its
    /// source of truth is the superblock, which `fs-core` itself keeps in
    /// sync across growth); a subdirectory's cached `record` is held locked
    /// for the duration so concurrent opens of the same handle serialize. A
    /// `SpinLockGuard` panics on drop if it was never unlocked, so every
    /// early-return path inside `f` must go through here instead of juggling
    /// the guard itself.
    fn with_record<R>(&self, f: impl FnOnce(&mut FileRecord) -> R) -> R {
        match &self.loc {
            None => {
                let mut rec = self.fs.0.root_record();
                f(&mut rec)
            }
            Some(_) => {
                let mut guard = self.record.lock();
                let result = f(&mut guard);
                guard.unlock();
                result
            }
        }
    }

    fn snapshot(&self) -> FileRecord {
        self.with_record(|rec| *rec)
    }
}

impl kernel::fs::traits::FileSystem for FileSystem {
    fn root(&self) -> Option<Directory> {
        Some(Directory::new(SimpleDir::root(self.clone())))
    }
}

impl kernel::fs::traits::RegularFile for super::File<FsDisk> {
    fn ino(&self) -> InodeNumber {
        ino_for_sector(self.start_sector)
    }

    fn size(&self) -> usize {
        self.size
    }

    fn read(&self, fba: FileBlockNumber, buf: &mut [u8; 4096]) -> Result<bool, kernel::KernelError> {
        self.read(fba.0 * 4096, buf).map_err(fs_err_to_kernel).map(|size| size != 0)
    }

    fn write(
        &self,
        fba: FileBlockNumber,
        buf: &[u8; 4096],
        _min_size: usize,
    ) -> Result<(), kernel::KernelError> {
        self.write(fba.0 * 4096, buf).map_err(fs_err_to_kernel).map(|_| ())
    }

    fn writeback(&self) -> Result<(), kernel::KernelError> {
        Ok(())
    }
}

impl kernel::fs::traits::Directory for SimpleDir {
    fn ino(&self) -> InodeNumber {
        match &self.loc {
            None => InodeNumber::new(1).unwrap(),
            Some(loc) => ino_for_sector(loc.sector()),
        }
    }

    fn size(&self) -> usize {
        self.with_record(|rec| rec.size())
    }

    fn link_count(&self) -> usize {
        2
    }

    fn open_entry(&self, entry: &str) -> Result<File, kernel::KernelError> {
        let mut rec = self.snapshot();
        let (found, loc) = self.fs.0.open_in(&mut rec, entry).ok_or(kernel::KernelError::NoSuchEntry)?;
        if found.is_dir() {
            Ok(File::Directory(Directory::new(SimpleDir::nested(self.fs.clone(), found, loc))))
        } else {
            Ok(File::RegularFile(RegularFile::new(self.fs.0.file_handle_for(found, loc))))
        }
    }

    fn create_entry(&self, entry: &str, is_dir: bool) -> Result<File, kernel::KernelError> {
        let (rec, loc) = self
            .with_record(|dir| self.fs.0.create_in(dir, self.loc.as_ref(), entry, is_dir))
            .map_err(|e| match e {
                Error::FsError => kernel::KernelError::FileExist,
                Error::DiskError => kernel::KernelError::IOError,
            })?;
        if is_dir {
            Ok(File::Directory(Directory::new(SimpleDir::nested(self.fs.clone(), rec, loc))))
        } else {
            Ok(File::RegularFile(RegularFile::new(self.fs.0.file_handle_for(rec, loc))))
        }
    }

    fn unlink_entry(&self, entry: &str) -> Result<(), kernel::KernelError> {
        self.with_record(|dir| {
            let (mut rec, loc) =
                self.fs.0.open_in(dir, entry).ok_or(kernel::KernelError::NoSuchEntry)?;
            if rec.is_dir() {
                let mut nested = rec;
                if !self.fs.0.list_in(&mut nested).map_err(fs_err_to_kernel)?.is_empty() {
                    return Err(kernel::KernelError::DirectoryNotEmpty);
                }
            }
            self.fs
                .0
                .remove_in(&mut rec, &loc, dir, self.loc.as_ref())
                .map_err(fs_err_to_kernel)
        })
    }

    fn read_dir(&self) -> Result<Vec<(InodeNumber, String)>, kernel::KernelError> {
        let entries = self.with_record(|dir| self.fs.0.list_in(dir)).map_err(fs_err_to_kernel)?;
        Ok(entries
            .into_iter()
            .map(|(entry, loc)| (ino_for_sector(loc.sector()), entry.name().to_string()))
            .collect())
    }

    fn removed(&self) -> Result<&kernel::sync::atomic::AtomicBool, kernel::KernelError> {
        Ok(&self.removed)
    }
}
