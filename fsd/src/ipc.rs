//! IPC syscalls: thin wrappers around `kernel::ipc`'s rendezvous primitive.

use kernel::{
    KernelError,
    addressing::Va,
    ipc,
    mm::page_table::Permission,
    syscall::uaccess::UserPtrWO,
};
use abi::syscall::SyscallAbi;

/// Blocks until another thread sends to the caller.
///
/// # Syscall API
/// ```c
/// int64_t ipc_recv(void *dstva, uint64_t *from_out);
/// ```
/// - `dstva`: address to receive a transferred page at, or `0` for none.
/// - `from_out`: if non-null, filled with the sender's thread id.
///
/// Returns the sent value.
pub fn ipc_recv(abi: &SyscallAbi) -> Result<usize, KernelError> {
    let dstva = Va::new(abi.arg1);
    let (from, value) = ipc::recv(dstva);
    if abi.arg2 != 0 {
        UserPtrWO::<u64>::new(abi.arg2).put(from)?;
    }
    Ok(value as usize)
}

/// Attempts to deliver a value, and optionally a page, to `target`.
///
/// # Syscall API
/// ```c
/// int ipc_can_send(int target, uint64_t value, void *srcva, int perm);
/// ```
/// - `target`: thread id of the receiver, which must already be parked in
///   `ipc_recv`.
/// - `value`: the word delivered to the receiver.
/// - `srcva`: the caller's own page to offer, or `0` to send no page.
/// - `perm`: permission bits requested for the receiver's mapping, ignored
///   when `srcva` is `0`.
///
/// Fails immediately with `IpcNotRecv` rather than blocking if `target` is
/// not currently parked in `ipc_recv`.
pub fn ipc_can_send(abi: &SyscallAbi) -> Result<usize, KernelError> {
    let target = abi.arg1 as u64;
    let value = abi.arg2 as u64;
    let page = if abi.arg3 != 0 {
        let va = Va::new(abi.arg3).ok_or(KernelError::InvalidArgument)?;
        let perm = Permission::from_bits_truncate(abi.arg4);
        Some((va, perm))
    } else {
        None
    };
    ipc::send(target, value, page)?;
    Ok(0)
}
