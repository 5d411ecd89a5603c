//! The process model for the file-system server.
//!
//! Extends the base process with the filesystem-server syscall handlers.

use abi::file_struct::FileStruct;
use mm::mm_struct::MmStruct;
use fork::lazy_pager::LazyPager;

/// A thread state of project 5, which contains file and memory state.
#[repr(transparent)]
#[derive(Default)]
pub struct Thread(pub sched::Thread);

impl core::ops::Deref for Thread {
    type Target = sched::Thread;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl core::ops::DerefMut for Thread {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Thread {
    pub fn from_mm_struct(mm_struct: MmStruct<LazyPager>, tid: u64) -> Self {
        Self(sched::Thread::from_mm_struct(mm_struct, tid))
    }

    pub fn from_fs_mm_struct(
        file_struct: FileStruct,
        mm_struct: MmStruct<LazyPager>,
        tid: u64,
    ) -> Self {
        Self(sched::Thread::from_file_mm_struct(
            file_struct,
            mm_struct,
            tid,
        ))
    }
}
