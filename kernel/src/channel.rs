//! Byte-oriented, blocking, single-producer/multi-consumer channel.
//!
//! This backs `pipe(2)`-style IPC: a [`Sender`] pushes bytes into a bounded
//! ring buffer, and a [`Receiver`] pulls them out. Both ends block the
//! calling thread (via [`Current::park_with`]) rather than spin, and wake the
//! other side's waiters on every successful push or pop.

use crate::{
    KernelError,
    spinlock::SpinLock,
    thread::{Current, ParkHandle},
};
use alloc::{collections::VecDeque, sync::Arc};

/// Capacity of the ring buffer backing a channel, in bytes.
const CAPACITY: usize = 4096;

struct Inner {
    buf: VecDeque<u8>,
    senders: usize,
    receivers: usize,
    read_waiters: VecDeque<ParkHandle>,
    write_waiters: VecDeque<ParkHandle>,
}

struct Shared {
    inner: SpinLock<Inner>,
}

/// The sending half of a byte channel.
///
/// Cloning a [`Sender`] increments the shared reference count; writes block
/// while the buffer is full and wake any parked reader once data lands.
pub struct Sender<T> {
    shared: Arc<Shared>,
    _p: core::marker::PhantomData<T>,
}

/// The receiving half of a byte channel.
///
/// Reads block while the buffer is empty and a sender is still alive; once
/// every [`Sender`] has been dropped, a read on an empty buffer returns `Ok(0)`
/// to signal end-of-stream.
pub struct Receiver<T> {
    shared: Arc<Shared>,
    _p: core::marker::PhantomData<T>,
}

/// Create a new connected `(Sender, Receiver)` pair.
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared {
        inner: SpinLock::new(Inner {
            buf: VecDeque::with_capacity(CAPACITY),
            senders: 1,
            receivers: 1,
            read_waiters: VecDeque::new(),
            write_waiters: VecDeque::new(),
        }),
    });
    (
        Sender {
            shared: shared.clone(),
            _p: core::marker::PhantomData,
        },
        Receiver {
            shared,
            _p: core::marker::PhantomData,
        },
    )
}

impl Clone for Sender<u8> {
    fn clone(&self) -> Self {
        let mut inner = self.shared.inner.lock();
        inner.senders += 1;
        inner.unlock();
        Self {
            shared: self.shared.clone(),
            _p: core::marker::PhantomData,
        }
    }
}

impl Drop for Sender<u8> {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock();
        inner.senders -= 1;
        if inner.senders == 0 {
            while let Some(w) = inner.read_waiters.pop_front() {
                w.unpark();
            }
        }
        inner.unlock();
    }
}

impl Drop for Receiver<u8> {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock();
        inner.receivers -= 1;
        if inner.receivers == 0 {
            while let Some(w) = inner.write_waiters.pop_front() {
                w.unpark();
            }
        }
        inner.unlock();
    }
}

impl Sender<u8> {
    /// Write `data` into the channel, blocking while the buffer is full.
    ///
    /// Returns [`KernelError::BrokenPipe`] once every [`Receiver`] has gone
    /// away.
    pub fn write(&self, data: &[u8]) -> Result<usize, KernelError> {
        let mut written = 0;
        while written < data.len() {
            let mut inner = self.shared.inner.lock();
            if inner.receivers == 0 {
                inner.unlock();
                return if written == 0 {
                    Err(KernelError::BrokenPipe)
                } else {
                    Ok(written)
                };
            }
            if inner.buf.len() >= CAPACITY {
                Current::park_with(|handle| inner.write_waiters.push_back(handle));
                continue;
            }
            while written < data.len() && inner.buf.len() < CAPACITY {
                inner.buf.push_back(data[written]);
                written += 1;
            }
            while let Some(w) = inner.read_waiters.pop_front() {
                w.unpark();
            }
            inner.unlock();
        }
        Ok(written)
    }
}

impl Receiver<u8> {
    /// Read up to `buf.len()` bytes, blocking while the buffer is empty and a
    /// sender is still connected.
    ///
    /// Returns `Ok(0)` once the buffer is drained and every [`Sender`] has
    /// been dropped.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, KernelError> {
        loop {
            let mut inner = self.shared.inner.lock();
            if !inner.buf.is_empty() {
                let mut n = 0;
                while n < buf.len() {
                    let Some(b) = inner.buf.pop_front() else {
                        break;
                    };
                    buf[n] = b;
                    n += 1;
                }
                while let Some(w) = inner.write_waiters.pop_front() {
                    w.unpark();
                }
                inner.unlock();
                return Ok(n);
            }
            if inner.senders == 0 {
                inner.unlock();
                return Ok(0);
            }
            Current::park_with(|handle| inner.read_waiters.push_back(handle));
        }
    }
}
