//! # Pager with eager paging policy
//!
//! [`EagerPager`] is the [`Pager`] implementation used for plain `mmap`
//! calls: physical pages are allocated and mapped into the page table
//! immediately, regardless of whether they are subsequently accessed.
//!
//! Anonymous mappings are backed by zero-initialized memory; a file-backed
//! mapping goes through [`RegularFile::mmap`] to register the mapping
//! against the file. `EagerPager` does not provide write-back for
//! file-backed pages. [`LazyPager`](../../fork/lazy_pager/struct.LazyPager.html)
//! builds on the same [`Pager`] trait with demand paging instead, which is
//! what the copy-on-write fork path needs.
use crate::{page_table::PageTable, pager::Pager};
use alloc::collections::btree_map::BTreeMap;
use kernel::{
    KernelError,
    addressing::{PAGE_SIZE, Va},
    fs::{FileBlockNumber, RegularFile},
    mm::{Page, PageRef, page_table::{PteFlags, Permission}},
};

/// Represent a mapping of contiguous memory.
pub struct Mapping {
    /// Size of the area.
    mapping_size: usize,
    /// Permission of the area.
    perm: Permission,
}

/// [`EagerPager`] is a struct that implements the [`Pager`] trait.
/// It represents a pager strategy that is responsible for eager memory paging.
pub struct EagerPager {
    mappings: BTreeMap<Va, Mapping>,
}

impl Pager for EagerPager {
    /// Creates a new instance of [`EagerPager`].
    ///
    /// This constructor initializes an empty [`EagerPager`] struct.
    fn new() -> Self {
        Self {
            mappings: BTreeMap::new(),
        }
    }

    /// Memory map function (`mmap`) for eager paging.
    ///
    /// This function maps the given memory region into page table.
    /// Returns an address for the mapped area.
    fn mmap(
        &mut self,
        page_table: &mut PageTable,
        addr: Va,
        size: usize,
        prot: Permission,
        file: Option<&RegularFile>,
        offset: usize,
    ) -> Result<usize, KernelError> {
        if addr.page_down() != addr || addr.into_usize() == 0 {
            return Err(KernelError::InvalidArgument);
        }
        if size == 0 {
            return Err(KernelError::InvalidArgument);
        }
        let npages = size.div_ceil(PAGE_SIZE);

        // Reject overlap with any region the page table already maps.
        for i in 0..npages {
            let va = Va::new(addr.into_usize() + i * PAGE_SIZE)
                .ok_or(KernelError::InvalidArgument)?;
            if page_table.walk(va).is_ok() {
                return Err(KernelError::InvalidArgument);
            }
        }

        let perm = prot | Permission::USER;
        for i in 0..npages {
            let va = Va::new(addr.into_usize() + i * PAGE_SIZE).unwrap();
            let page = if let Some(f) = file {
                f.mmap(FileBlockNumber::from_offset(offset + i * PAGE_SIZE))?
            } else {
                Page::new()
            };
            page_table
                .map(va, page, perm)
                .map_err(|_| KernelError::InvalidArgument)?;
        }
        self.mappings.insert(
            addr,
            Mapping {
                mapping_size: npages * PAGE_SIZE,
                perm,
            },
        );
        Ok(npages * PAGE_SIZE)
    }

    /// Memory unmap function (`munmap`) for eager paging.
    ///
    /// This function would unmap a previously mapped memory region, releasing
    /// any associated resources.
    fn munmap(&mut self, page_table: &mut PageTable, addr: Va) -> Result<usize, KernelError> {
        let mapping = self
            .mappings
            .remove(&addr)
            .ok_or(KernelError::InvalidArgument)?;
        let npages = mapping.mapping_size / PAGE_SIZE;
        for i in 0..npages {
            let va = Va::new(addr.into_usize() + i * PAGE_SIZE).unwrap();
            page_table
                .unmap(va)
                .map_err(|_| KernelError::InvalidArgument)?;
        }
        Ok(mapping.mapping_size)
    }

    /// Find a mapped page at the given virtual address.
    ///
    /// This function searches for a memory page mapped at `addr` and, if found,
    /// returns a tuple of [`PageRef`] to the page and its corresponding
    /// [`Permission`] flags.
    fn get_user_page(
        &mut self,
        page_table: &mut PageTable,
        addr: Va,
    ) -> Option<(PageRef<'_>, Permission)> {
        let va = addr.page_down();
        let pte = page_table.walk(va).ok()?;
        let pa = pte.pa()?;
        let flags = pte.flags();
        let mut perm = Permission::READ;
        if flags.contains(PteFlags::RW) {
            perm |= Permission::WRITE;
        }
        if flags.contains(PteFlags::US) {
            perm |= Permission::USER;
        }
        if !flags.contains(PteFlags::XD) {
            perm |= Permission::EXECUTABLE;
        }
        Some((unsafe { PageRef::from_pa(pa) }, perm))
    }

    /// Checks whether access to the given virtual address is permitted.
    ///
    /// This function verifies that a virtual address `va` is part of a valid
    /// memory mapping and that the requested access type (read or write) is
    /// allowed by the page's protection flags.
    fn access_ok(&self, va: Va, is_write: bool) -> bool {
        let addr = va.into_usize();
        self.mappings.iter().any(|(start, mapping)| {
            let start = start.into_usize();
            addr >= start
                && addr < start + mapping.mapping_size
                && mapping.perm.contains(Permission::READ)
                && (!is_write || mapping.perm.contains(Permission::WRITE))
        })
    }
}
