//! Core traits and types for 1100/2200-family emulation.
//!
//! This crate has no opinion on instruction semantics. It defines the
//! seams the instruction processor is built against: the word-addressed
//! storage interface, the operator console surface, and the observability
//! trait used to inspect architectural state without disturbing it.

mod console;
mod observable;
mod storage;

pub use console::{ConsoleError, OperatorConsole, StopDetail, StopReason};
pub use observable::{Observable, Value};
pub use storage::{FlatStorage, StorageError, StorageUnit, Upi, Word36};
