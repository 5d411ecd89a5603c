//! Low-level synchronization primitives shared by every kernel subsystem.
//!
//! [`SpinLock`] is the base primitive; everything else in the kernel that
//! sleeps (see [`crate::thread::Current::park_with`]) is built on top of it by
//! higher layers such as [`sched::sync`](../../sched/sync/index.html).

pub mod atomic;
pub mod rwlock;
pub mod spinlock;

pub use rwlock::RwLock;
pub use spinlock::{SpinLock, SpinLockGuard, WouldBlock};
