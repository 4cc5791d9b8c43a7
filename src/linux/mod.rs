//! Linux kernel structure traversals.
//!
//! These modules speak the vocabulary of the imaged kernel: task lists,
//! file-descriptor tables, and per-namespace socket lists. They contain
//! no layout knowledge of their own; every offset comes from the
//! profile, every byte from the address space.

pub mod files;
pub mod net;
pub mod tasks;

pub use files::{open_files, resolve_path, OpenFile};
pub use net::{CorrelationFailure, SocketCorrelator, SocketOwner, SocketSource};
pub use tasks::{tasks, Task};
