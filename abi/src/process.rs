//! The base process model.
//!
//! Bundles a process's file and (later) memory state.

use crate::file_struct::FileStruct;

/// A process state of project 1, which contains file state.
#[derive(Default)]
pub struct Process {
    pub file_struct: FileStruct,
}
