//! Synchronous rendezvous messaging between threads, with optional transfer
//! of a single mapped page.
//!
//! A receiver calls [`recv`] and parks itself, arming `recving` and (if it
//! wants a page) recording the virtual address the page should land at. A
//! sender calls [`send`] with a target id; if the target is not currently
//! parked in `recv`, the send fails immediately rather than queuing. This
//! mirrors a classic JOS-style `ipc_recv`/`ipc_send` pair: the receiver's
//! [`Thread`] carries the rendezvous state directly (see
//! [`crate::thread::IpcState`]) so a sender only ever needs the target's id to
//! find it.

use crate::{
    KernelError,
    addressing::Va,
    mm::page_table::{PageTableRoot, Permission},
    spinlock::SpinLock,
    thread::{Current, ParkHandle, with_current},
};
use alloc::collections::btree_map::BTreeMap;
use core::sync::atomic::Ordering;

/// First virtual address reserved for the kernel. No syscall argument may
/// reference a virtual address at or above this line.
pub const UTOP: usize = PageTableRoot::KBASE << 39;

/// Threads currently parked inside [`recv`], keyed by thread id.
///
/// Holding an entry here *is* what `recving == true` means to the rest of
/// the kernel: a sender removes the entry and observes the armed receiver
/// atomically, so a racing send either finds nothing (and fails) or finds
/// exactly one receiver to wake.
static RECEIVERS: SpinLock<BTreeMap<u64, ParkHandle>> = SpinLock::new(BTreeMap::new());

/// Block the calling thread until another thread [`send`]s to it.
///
/// `dstva` is where a transferred page, if the sender offers one, will be
/// installed. A `dstva` at or above [`UTOP`] is accepted but never used for a
/// page transfer, matching the "fails silently" contract on an out-of-range
/// destination: the rendezvous itself still happens, it just never carries a
/// page.
///
/// Returns `(from, value)` once a sender has woken this thread.
pub fn recv(dstva: Option<Va>) -> (u64, u64) {
    let dstva = dstva.filter(|va| va.into_usize() < UTOP);
    let tid = Current::get_tid();

    with_current(|th| {
        th.ipc.recving.store(true, Ordering::SeqCst);
        let mut g = th.ipc.dstva.lock();
        *g = dstva;
        g.unlock();
    });

    Current::park_with(|handle| {
        let mut receivers = RECEIVERS.lock();
        receivers.insert(tid, handle);
        receivers.unlock();
    });

    with_current(|th| {
        (
            th.ipc.from.load(Ordering::SeqCst),
            th.ipc.value.load(Ordering::SeqCst),
        )
    })
}

/// Put a parked receiver back, used to unwind a `send` that fails after
/// having already removed the receiver from [`RECEIVERS`].
fn requeue(target: u64, handle: ParkHandle) {
    let mut receivers = RECEIVERS.lock();
    receivers.insert(target, handle);
    receivers.unlock();
}

/// Attempt to deliver `value`, and optionally a page, to `target`.
///
/// Never blocks: if `target` is not currently parked in [`recv`], this fails
/// immediately with [`KernelError::IpcNotRecv`] instead of queuing the
/// message, so a racing sender must retry.
///
/// `page`, if given, is `(srcva, perm)`: the sender's own virtual address
/// being offered, and the permission bits requested for the receiver's
/// mapping. The physical page is looked up in the sender's own address space
/// via [`crate::task::Task::ipc_lookup`] and installed into the receiver's via
/// [`crate::task::Task::ipc_install`] at the receiver's previously recorded
/// `dstva`; if the receiver did not ask for a page (recorded no `dstva`), the
/// offer is silently dropped and only `value` is delivered.
///
/// Requesting `WRITE` on a page the sender itself cannot write is rejected
/// with [`KernelError::InvalidAccess`] rather than silently downgrading the
/// permission: a sender cannot hand out more access than it has.
pub fn send(target: u64, value: u64, page: Option<(Va, Permission)>) -> Result<(), KernelError> {
    let mut receivers = RECEIVERS.lock();
    let Some(mut handle) = receivers.remove(&target) else {
        receivers.unlock();
        return Err(KernelError::IpcNotRecv);
    };
    receivers.unlock();

    let dstva = {
        let g = handle.th.ipc.dstva.lock();
        let v = *g;
        g.unlock();
        v
    };

    if let (Some((srcva, perm)), Some(dstva)) = (page, dstva) {
        let sender_mapping =
            with_current(|th| th.task.as_ref().and_then(|task| task.ipc_lookup(srcva)));
        let Some((pa, src_perm)) = sender_mapping else {
            requeue(target, handle);
            return Err(KernelError::InvalidAccess);
        };
        if perm.contains(Permission::WRITE) && !src_perm.contains(Permission::WRITE) {
            requeue(target, handle);
            return Err(KernelError::InvalidAccess);
        }
        let perm = perm | Permission::READ;
        let install = handle
            .th
            .task
            .as_mut()
            .map(|task| task.ipc_install(dstva, pa, perm))
            .unwrap_or(Err(KernelError::NotSupportedOperation));
        if let Err(e) = install {
            requeue(target, handle);
            return Err(e);
        }
        let mut g = handle.th.ipc.perm.lock();
        *g = Some(perm);
        g.unlock();
    }

    handle.th.ipc.from.store(Current::get_tid(), Ordering::SeqCst);
    handle.th.ipc.value.store(value, Ordering::SeqCst);
    handle.th.ipc.recving.store(false, Ordering::SeqCst);
    handle.unpark();
    Ok(())
}

/// Drop a thread's pending `recv` registration, if any, without waking it.
///
/// Called when a thread exits while parked in `recv` so that a sender racing
/// against the exit observes [`KernelError::IpcNotRecv`] instead of handing
/// a message to a thread that will never read it.
pub fn abandon(tid: u64) {
    let mut receivers = RECEIVERS.lock();
    receivers.remove(&tid);
    receivers.unlock();
}
