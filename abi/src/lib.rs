//! # System call ABI
//!
//! User applications and the kernel run at the same privilege level here:
//! the system does not yet enforce memory isolation between user and kernel
//! address spaces (that separation is layered on top by [`mm`] and
//! [`fork`]). This crate builds the system-call handling that the rest of
//! the system's privilege separation is layered on top of: argument
//! marshalling ([`SyscallAbi`]) and the per-process file-descriptor table
//! ([`file_struct::FileStruct`]).
//!
//! - [`System Call Infrastructure`]: extract arguments from system call
//!   requests in a structured manner.
//! - [`File System Calls`]: system calls for file operations.
//!
//! [`mm`]: ../mm
//! [`fork`]: ../fork
//! [`System Call Infrastructure`]: syscall
//! [`File System Calls`]: file_struct

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]
#![no_std]
#![no_main]

extern crate alloc;
#[allow(unused_imports)]
#[macro_use]
extern crate kernel;

pub mod file_struct;
pub mod process;
pub mod syscall;

use kernel::{KernelError, syscall::Registers, task::Task};
use syscall::SyscallAbi;

pub use process::Process;

/// Represents the system call numbers handled by this syscall table.
///
/// Each variant corresponds to a specific system call that can be invoked
/// using the system call interface. The numeric values align with the
/// syscall table in the operating system.
#[repr(usize)]
pub enum SyscallNumber {
    /// Opens a file and returns a file descriptor.
    Open = 1,
    /// Reads data from a file descriptor.
    Read = 2,
    /// Writes data to a file descriptor.
    Write = 3,
    /// Moves the file offset of an open file.
    Seek = 4,
    /// Retrieves the current file offset.
    Tell = 5,
    /// Closes an open file descriptor.
    Close = 6,
    /// Create an interprocess communication channel.
    Pipe = 7,
}

impl TryFrom<usize> for SyscallNumber {
    type Error = KernelError;
    fn try_from(no: usize) -> Result<SyscallNumber, Self::Error> {
        match no {
            1 => Ok(SyscallNumber::Open),
            2 => Ok(SyscallNumber::Read),
            3 => Ok(SyscallNumber::Write),
            4 => Ok(SyscallNumber::Seek),
            5 => Ok(SyscallNumber::Tell),
            6 => Ok(SyscallNumber::Close),
            7 => Ok(SyscallNumber::Pipe),
            _ => Err(KernelError::NoSuchSyscall),
        }
    }
}

impl Task for Process {
    /// Handles a system call request from a user program.
    ///
    /// This function is the entry point for system call handling. It retrieves
    /// the system call ABI from the provided [`Registers`] structure, which
    /// includes the system call number and its arguments. Based on the
    /// system call number (`sysno`), it looks up the appropriate handler
    /// function in a predefined list. If a handler is found, it is invoked
    /// with the ABI, otherwise, an error ([`KernelError::NoSuchSyscall`]) is
    /// returned.
    ///
    /// After the handler function processes the system call, the return value
    /// (either a success or error) is set back into the CPU registers via
    /// the `set_return_value` method. The return value is stored in the `%rax`
    /// register as per the x86-64 system call convention.
    ///
    /// # Parameters
    ///
    /// - `regs`: A mutable reference to the [`Registers`] struct, which
    ///   contains the current state of the CPU registers. This structure will
    ///   be used to retrieve the system call number and its arguments, and also
    ///   to set the return value.
    ///
    /// # Functionality
    ///
    /// The function processes the system call as follows:
    /// 1. Extracts the system call number and arguments using the
    ///    [`SyscallAbi::from_registers`].
    /// 2. Looks up the corresponding handler function from a predefined list of
    ///    system calls. The handler function is selected based on the system
    ///    call number (`sysno`).
    /// 3. If a handler is found, it is executed with the ABI as an argument. If
    ///    no handler is found, the function returns a
    ///    [`KernelError::NoSuchSyscall`] error.
    ///
    /// The result of the system call handler (either success or error) is then
    /// returned via the [`SyscallAbi::set_return_value`] method, which
    /// modifies the CPU registers accordingly.
    fn syscall(&mut self, regs: &mut Registers) {
        // Dispatch table; handlers below do the real work.
        let abi = SyscallAbi::from_registers(regs); // Extract ABI from the registers.
        // Lookup the system call handler function based on the system call number.
        let return_val = SyscallNumber::try_from(abi.sysno).and_then(|no| match no {
            SyscallNumber::Open => self.file_struct.open(&abi),
            SyscallNumber::Read => self.file_struct.read(&abi),
            SyscallNumber::Write => self.file_struct.write(&abi),
            SyscallNumber::Seek => self.file_struct.seek(&abi),
            SyscallNumber::Tell => self.file_struct.tell(&abi),
            SyscallNumber::Close => self.file_struct.close(&abi),
            SyscallNumber::Pipe => self.file_struct.pipe(&abi),
        });
        // Set the return value of the system call (success or error) back into the
        // registers.
        abi.set_return_value(return_val);
    }
}
