//! Core data types for vestige memory-image analysis.
//!
//! This module contains the fundamental types the rest of the system is
//! built from: the profile (symbol/type/field metadata), the typed
//! overlay that projects profile types onto raw image bytes, and the
//! snapshot that binds a profile to an address space for one run.

pub mod object;
pub mod profile;
pub mod snapshot;

pub use object::{Object, ObjectType};
pub use profile::{FieldDescriptor, FieldKind, Profile, ProfileBuilder, TypeDescriptor};
pub use snapshot::Snapshot;
