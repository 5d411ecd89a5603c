//! # Multithreaded process
//!
//! A process here can run multiple concurrent threads, each with its own
//! execution context but sharing the same address space and resources. Each
//! thread maintains its own register state while sharing the process-wide
//! state.
//!
//! A single-threaded `Process` owns its own [`FileStruct`] and [`MmStruct`]
//! directly. Under the multi-threaded model, these components are **shared
//! across all threads** of a process — shared resources requiring proper
//! synchronization. To support shared and mutable
//! access, these resources are wrapped inside an `Arc<Mutex<_>>`.
//! - [`Arc`] provides shared ownership with reference counting.
//! - [`Mutex`] ensures exclusive access to mutable state.
//!
//! This allows multiple threads to safely access and modify shared structures
//! like file tables and virtual memory mappings.
//!
//! #### Thread Life Cycle
//!
//! KeOS supports a lightweight threading model within a single process,
//! enabling multiple threads to execute concurrently while sharing the same
//! address space. The life cycle of a thread is managed through four key system
//! calls:
//!
//! - [`thread_create`]: Creates a new thread within the same process, executing
//!   a given function on a user-supplied stack.
//! - [`thread_join`]: Waits for a specified thread to terminate and retrieves
//!   its return value.
//! - [`exit`]: Terminates the calling thread without affecting other threads in
//!   the same process.
//! - [`exit_group`]: Terminates all threads within the process simultaneously.
//!
//! When creating a new thread via [`thread_create`], the user must provide a
//! pointer to a valid, writable memory region that will serve as the new
//! thread’s stack. This approach mirrors Linux's `clone()` system call and
//! gives userspace full control over stack allocation and reuse. The kernel
//! validates that the provided stack lies within a properly mapped and writable
//! memory region to ensure memory safety.
//!
//! Threads can be terminated individually using the [`exit`] system call,
//! which affects only the calling thread. Other threads in the same process
//! continue executing. To coordinate with thread termination, a thread may
//! invoke [`thread_join`], which blocks until the target thread exits and
//! returns its result. This can be implemented using a [`Semaphore`]
//! initialized with zero permits, where the exiting thread signals completion
//! by releasing a permit.
//!
//! In contrast, [`exit_group`] is used when the entire process must be
//! terminated, bringing down all associated threads by calling
//! [`thread::kill_by_tid`]. This is necessary in scenarios such as a fatal
//! error in the main thread, unhandled signals, or explicit process termination
//! by the application. Unlike [`exit`], which only marks the calling thread for
//! termination, [`exit_group`] ensures that all threads in the process are
//! promptly and safely terminated, and that the process is cleaned up
//! consistently. This behavior aligns with the semantics of multi-threaded
//! processes in modern operating systems and prevents resource leaks or partial
//! process shutdowns.
//!
//! Together, these mechanisms provide a simple yet robust model for managing
//! thread life cycles in KeOS, balancing fine-grained control with process-wide
//! coordination.
//!
//! The resulting execution model, widely used in modern OSes, looks like:
//! ```text
//! +========= Process =========+
//! | Shared States:            |
//! |  - MmStruct               |
//! |  - FileStruct             |
//! |                           |
//! | Threads:                  |
//! |  +----- Thread 1 -----+   |
//! |  |  - Register State  |   |
//! |  |  - User Stack      |   |
//! |  +--------------------+   |
//! |           ...             |
//! |  +----- Thread N -----+   |
//! |  |  - Register State  |   |
//! |  |  - User Stack      |   |
//! |  +--------------------+   |
//! +===========================+
//! ```
//!
//! [`exit`]: Thread::exit
//! [`thread_create`]: Thread::thread_create
//! [`thread_join`]: Thread::thread_join
//! [`exit_group`]: Thread::exit_group
//! [`Arc`]: <https://doc.rust-lang.org/beta/alloc/sync/struct.Arc.html>
//! [`section`]: crate::round_robin
//! [`thread::kill_by_tid`]: kernel::thread::kill_by_tid
//! [`Mutex`]: crate::sync::Mutex
//! [`Semaphore`]: crate::sync::semaphore

use alloc::{boxed::Box, collections::btree_map::BTreeMap, string::String, sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicBool, Ordering};
use kernel::{
    KernelError,
    addressing::Pa,
    mm::page_table::Permission,
    syscall::{
        Registers,
        uaccess::{UserCString, UserPtrWO},
    },
    thread::{Current, ThreadBuilder},
};
use abi::{file_struct::FileStruct, syscall::SyscallAbi};
use mm::mm_struct::MmStruct;
use fork::lazy_pager::LazyPager;

use crate::sync::{mutex::Mutex, semaphore::Semaphore};

/// Per-thread state needed to let another thread `thread_join` this one: a
/// zero-permit semaphore that `exit`/`exit_group` signals once, plus the
/// exit code it carries.
struct JoinState {
    exit_code: kernel::sync::SpinLock<Option<i32>>,
    done: Semaphore<()>,
    /// Only the first `thread_join` on a given tid gets to consume the exit
    /// code; later callers observe `InvalidArgument`.
    taken: AtomicBool,
}

impl JoinState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            exit_code: kernel::sync::SpinLock::new(None),
            done: Semaphore::new(0, ()),
            taken: AtomicBool::new(false),
        })
    }
}

/// Table of every thread in the system still joinable, keyed by tid.
static JOIN_TABLE: Mutex<BTreeMap<u64, Arc<JoinState>>> = Mutex::new(BTreeMap::new());

fn register_joinable(tid: u64) {
    let mut table = JOIN_TABLE.lock();
    table.insert(tid, JoinState::new());
    table.unlock();
}

fn signal_exit(tid: u64, code: i32) {
    let table = JOIN_TABLE.lock();
    let state = table.get(&tid).cloned();
    table.unlock();
    if let Some(state) = state {
        let mut guard = state.exit_code.lock();
        *guard = Some(code);
        guard.unlock();
        state.done.signal();
    }
}

/// A thread state of project 4, which contains file and memory state.
pub struct Thread {
    pub tid: u64,
    pub page_table_pa: Pa,
    file_struct: Arc<Mutex<FileStruct>>,
    mm_struct: Arc<Mutex<MmStruct<LazyPager>>>,
    /// Every tid belonging to this thread's process, shared by all its
    /// threads so `exit_group` can reach siblings.
    siblings: Arc<Mutex<Vec<u64>>>,
}

impl Default for Thread {
    fn default() -> Self {
        Self::from_file_mm_struct(FileStruct::new(), MmStruct::new(), 0)
    }
}

impl Thread {
    /// Create a thread with given [`MmStruct`].
    pub fn from_mm_struct(mm_struct: MmStruct<LazyPager>, tid: u64) -> Self {
        Self::from_file_mm_struct(FileStruct::new(), mm_struct, tid)
    }

    /// Create a thread with given [`MmStruct`] and [`FileStruct`].
    ///
    /// This starts a brand new process: `file_struct` and `mm_struct` are
    /// wrapped in fresh `Arc<Mutex<_>>`es owned solely by `tid`, and
    /// `thread_create` shares clones of them (and of `page_table_pa`) with
    /// any further threads spawned in this process.
    pub fn from_file_mm_struct(
        file_struct: FileStruct,
        mm_struct: MmStruct<LazyPager>,
        tid: u64,
    ) -> Self {
        let page_table_pa = mm_struct.page_table.pa();
        register_joinable(tid);

        Self {
            tid,
            page_table_pa,
            file_struct: Arc::new(Mutex::new(file_struct)),
            mm_struct: Arc::new(Mutex::new(mm_struct)),
            siblings: Arc::new(Mutex::new(alloc::vec![tid])),
        }
    }

    /// Executes a closure with mutable access to the underlying file struct
    /// ([`FileStruct`]).
    ///
    /// This method provides a way to access and mutate the file struct
    /// associated with the current thread. It accepts a closure `f` that
    /// receives a mutable reference to the `FileStruct` and an
    /// additional argument of type `Args`.
    pub fn with_file_struct_mut<Args, R>(
        &self,
        f: impl FnOnce(&mut FileStruct, Args) -> R,
        args: Args,
    ) -> R {
        let mut guard = self.file_struct.lock();
        let r = f(&mut guard, args);
        guard.unlock();
        r
    }

    /// Executes a closure with mutable access to the underlying memory struct
    /// ([`MmStruct`]).
    ///
    /// This method provides a way to access and mutate the memory struct
    /// associated with the current thread. It accepts a closure `f` that
    /// receives a mutable reference to the `MmStruct<LazyPager>` and an
    /// additional argument of type `Args`.
    pub fn with_mm_struct_mut<Args, R>(
        &self,
        f: impl FnOnce(&mut MmStruct<LazyPager>, Args) -> R,
        args: Args,
    ) -> R {
        let mut guard = self.mm_struct.lock();
        let r = f(&mut guard, args);
        guard.unlock();
        r
    }

    /// Looks up `va` in this thread's address space, for IPC page transfer.
    pub fn ipc_lookup(&self, va: kernel::addressing::Va) -> Option<(Pa, Permission)> {
        let guard = self.mm_struct.lock();
        let pte = guard.page_table.walk(va).ok()?;
        let pa = pte.pa();
        let flags = pte.flags();
        guard.unlock();
        let pa = pa?;
        let mut perm = Permission::READ;
        if flags.contains(kernel::mm::page_table::PteFlags::RW) {
            perm |= Permission::WRITE;
        }
        if flags.contains(kernel::mm::page_table::PteFlags::US) {
            perm |= Permission::USER;
        }
        if !flags.contains(kernel::mm::page_table::PteFlags::XD) {
            perm |= Permission::EXECUTABLE;
        }
        Some((pa, perm))
    }

    /// Installs `pa` at `va` with `perm` in this thread's address space, for
    /// IPC page transfer. Bumps the page's refcount since the sender keeps
    /// its own mapping.
    pub fn ipc_install(
        &mut self,
        va: kernel::addressing::Va,
        pa: Pa,
        perm: Permission,
    ) -> Result<(), KernelError> {
        let page = unsafe { kernel::mm::PageRef::from_pa(pa) }.into_page();
        let mut guard = self.mm_struct.lock();
        let r = guard
            .page_table
            .map(va, page, perm)
            .map_err(|_| KernelError::InvalidArgument);
        guard.unlock();
        r
    }

    /// Executes a closure with mutable access to the underlying file struct
    /// ([`FileStruct`]) and memory struct ([`MmStruct`]).
    ///
    /// This method provides a way to access and mutate the file struct
    /// associated with the current thread. It accepts a closure `f` that
    /// receives a mutable reference to the `FileStruct` and an
    /// additional argument of type `Args`.
    pub fn with_file_mm_struct_mut<Args, R>(
        &self,
        f: impl FnOnce(&mut FileStruct, &mut MmStruct<LazyPager>, Args) -> R,
        args: Args,
    ) -> R {
        self.with_mm_struct_mut(
            |mm, args| self.with_file_struct_mut(|fs, args| f(fs, mm, args), args),
            args,
        )
    }

    /// Exit the current thread.
    ///
    /// This function terminates the calling thread, returning the provided
    /// exit code to any thread that `join`s on it.
    ///
    /// # Syscall API
    /// ```c
    /// void exit(int status);
    /// ```
    /// - `status`: The exit code returned to a joining thread.
    ///
    /// # Behavior
    /// - Wakes up any thread waiting via `thread_join`.
    /// - Cleans up thread-local resources.
    pub fn exit(&self, abi: &SyscallAbi) -> Result<usize, KernelError> {
        let code = abi.arg1 as i32;
        signal_exit(self.tid, code);
        Current::exit(code)
    }

    /// Create a new thread in the current process.
    ///
    /// This function creates a new thread that begins execution at the given
    /// entry point with the specified argument.
    ///
    /// # Syscall API
    /// ```c
    /// int thread_create(char *name, void *stack, void *(*start_routine)(void *), void *arg);
    /// ```
    /// - `name`: Name of the thread.
    /// - `stack`: Stack of the thread.
    /// - `start_routine`: Pointer to the function to be executed by the thread.
    /// - `arg`: Argument to be passed to the thread function.
    ///
    /// # Behavior
    /// - The new thread shares the same address space as the calling thread.
    /// - The stack for the new thread is allocated automatically.
    pub fn thread_create(&self, abi: &SyscallAbi) -> Result<usize, KernelError> {
        let name: String = UserCString::new(abi.arg1).read()?;
        let stack = abi.arg2;
        let start_routine = abi.arg3;
        let arg = abi.arg4;

        let mut regs = Registers::new();
        *regs.rip() = start_routine;
        *regs.rsp() = stack;
        regs.gprs.rdi = arg;

        let builder = ThreadBuilder::new(name);
        let tid = builder.get_tid();
        register_joinable(tid);

        let mut siblings = self.siblings.lock();
        siblings.push(tid);
        siblings.unlock();

        let task: Box<Thread> = Box::new(Thread {
            tid,
            page_table_pa: self.page_table_pa,
            file_struct: Arc::clone(&self.file_struct),
            mm_struct: Arc::clone(&self.mm_struct),
            siblings: Arc::clone(&self.siblings),
        });

        builder.attach_task(task).spawn(move || regs.launch());
        Ok(tid as usize)
    }

    /// Wait for a thread to finish.
    ///
    /// This function blocks the calling thread until the specified thread
    /// terminates, and retrieves its exit code.
    ///
    /// Note that only a single call can receives the exit code of the dying
    /// thread. If multiple `thread_join` is called on the same thread,
    /// return values of others than the first one are InvalidArgument
    /// error.
    ///
    /// # Syscall API
    /// ```c
    /// int thread_join(int thread_id, int *retval);
    /// ```
    /// - `thread_id`: ID of the thread to join.
    /// - `retval`: Pointer to store the thread's exit code (optional).
    ///
    /// # Behavior
    /// - If the target thread has already exited, returns immediately with the
    ///   proper exit code.
    /// - If `retval` is non-null, the exit code of the target thread is stored.
    pub fn thread_join(&self, abi: &SyscallAbi) -> Result<usize, KernelError> {
        let tid = abi.arg1 as u64;

        let table = JOIN_TABLE.lock();
        let state = table.get(&tid).cloned();
        table.unlock();
        let state = state.ok_or(KernelError::InvalidArgument)?;

        if state.taken.swap(true, Ordering::SeqCst) {
            return Err(KernelError::InvalidArgument);
        }

        let _permit = state.done.wait();
        let guard = state.exit_code.lock();
        let code = guard.unwrap_or(0);
        guard.unlock();
        drop(_permit);

        let mut table = JOIN_TABLE.lock();
        table.remove(&tid);
        table.unlock();

        if abi.arg2 != 0 {
            UserPtrWO::<i32>::new(abi.arg2).put(code)?;
        }
        Ok(0)
    }

    /// Exit a process.
    ///
    /// This function terminates all the threads in the current process,
    /// including the current caller thread. The exit code is provided as
    /// the first argument (`arg1`) of the system call.
    ///
    /// # Syscall API
    /// ```c
    /// int exit_group(int status);
    /// ```
    /// - `status`: The thread's exit code.
    ///
    /// # Notes
    /// - This function does not return in normal execution, as it terminates
    ///   the process.
    /// - If an error occurs, it returns a `KernelError`
    pub fn exit_group(&self, abi: &SyscallAbi) -> Result<usize, KernelError> {
        let code = abi.arg1 as i32;

        let siblings = self.siblings.lock();
        let tids = siblings.clone();
        siblings.unlock();

        for tid in tids {
            if tid != self.tid {
                let _ = kernel::thread::kill_by_tid(tid, code);
            }
        }
        signal_exit(self.tid, code);
        Current::exit(code)
    }
}
