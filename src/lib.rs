//! vestige: memory-image forensics correlation core.
//!
//! Given a raw memory image and a profile (symbol addresses, type
//! sizes, field offsets for one kernel build), this crate overlays
//! typed views onto raw bytes and walks kernel-maintained linked
//! structures to answer correlation questions, the canonical one
//! being: which process owns this network socket?
//!
//! The pieces compose bottom-up: an address space ([`space`]) serves
//! bounded byte reads, a profile plus an overlay ([`core`]) turn
//! addresses into typed field access, the generic walker ([`walk`])
//! follows intrusive kernel lists with corruption guards, and the
//! Linux traversals ([`linux`]) build process, open-file, and
//! socket-ownership enumeration on top. Everything is lazy and
//! read-only; rendering and argument handling belong to callers.

/// Core data types: profile, typed overlay, snapshot.
pub mod core;
pub mod error;
pub mod linux;
pub mod logging;
pub mod space;
pub mod walk;

pub use crate::core::{Object, ObjectType, Profile, ProfileBuilder, Snapshot};
pub use crate::error::{Result, VestigeError};
