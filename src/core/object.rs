//! Typed overlays over raw image bytes.
//!
//! An [`Object`] is a lazily computed, non-owning view: an address, a
//! declared type, and borrowed handles to the address space and
//! profile. Field access resolves a profile offset and produces another
//! overlay; nothing is read until a scalar value is actually wanted, and
//! nothing is ever copied out of the image ahead of time. Two overlays
//! over the same address and type are equal regardless of how they were
//! reached.
//!
//! Error shape follows the crate taxonomy: an unknown type or field is
//! a fatal configuration error surfaced as `Err`, while a read that
//! falls outside the backed image is recoverable and surfaces as
//! `None`.

use crate::core::profile::{FieldKind, Profile};
use crate::error::{Result, VestigeError};
use crate::space::AddressSpace;
use std::fmt;
use tracing::trace;

/// Upper bound on a followed C-string read, in bytes.
const MAX_CSTRING: u64 = 4096;

/// The declared type of an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType<'a> {
    /// A structure declared in the profile's type table.
    Struct(&'a str),
    /// An unsigned integer scalar of the given byte width.
    Scalar { size: u8 },
    /// An inline character array of the given byte length.
    Chars { size: u64 },
    /// A pointer, optionally typed with its target.
    Pointer { target: Option<&'a str> },
}

impl fmt::Display for ObjectType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectType::Struct(name) => write!(f, "{}", name),
            ObjectType::Scalar { size } => write!(f, "u{}", u32::from(*size) * 8),
            ObjectType::Chars { size } => write!(f, "char[{}]", size),
            ObjectType::Pointer { target: Some(t) } => write!(f, "*{}", t),
            ObjectType::Pointer { target: None } => write!(f, "*void"),
        }
    }
}

/// A typed, read-only view of a region of the memory image.
pub struct Object<'a> {
    address: u64,
    ty: ObjectType<'a>,
    space: &'a dyn AddressSpace,
    profile: &'a Profile,
}

impl Clone for Object<'_> {
    fn clone(&self) -> Self {
        *self
    }
}

impl Copy for Object<'_> {}

impl PartialEq for Object<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address && self.ty == other.ty
    }
}

impl Eq for Object<'_> {}

impl fmt::Debug for Object<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("address", &format_args!("{:#x}", self.address))
            .field("type", &format_args!("{}", self.ty))
            .finish()
    }
}

impl fmt::Display for Object<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} at {:#x}>", self.ty, self.address)
    }
}

impl<'a> Object<'a> {
    /// Overlay a named structure type at `address`.
    ///
    /// The type name must be declared in the profile; anything else is
    /// a configuration error.
    pub fn new(
        space: &'a dyn AddressSpace,
        profile: &'a Profile,
        type_name: &str,
        address: u64,
    ) -> Result<Self> {
        let key = profile.type_key(type_name)?;
        Ok(Self {
            address,
            ty: ObjectType::Struct(key),
            space,
            profile,
        })
    }

    /// Overlay an already-resolved type at `address`. Used by traversal
    /// code that validated the type once up front.
    pub(crate) fn from_parts(
        space: &'a dyn AddressSpace,
        profile: &'a Profile,
        ty: ObjectType<'a>,
        address: u64,
    ) -> Self {
        Self {
            address,
            ty,
            space,
            profile,
        }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn object_type(&self) -> ObjectType<'a> {
        self.ty
    }

    /// The structure type name, for struct overlays.
    pub fn type_name(&self) -> Option<&'a str> {
        match self.ty {
            ObjectType::Struct(name) => Some(name),
            _ => None,
        }
    }

    /// Whether the overlay points at backed, non-null data.
    pub fn is_valid(&self) -> bool {
        self.address != 0 && self.space.is_valid(self.address)
    }

    /// Overlay a field of this structure.
    ///
    /// The new overlay sits at `address + offset(type, name)` and is
    /// typed by the field's declared kind. Calling this on a non-struct
    /// overlay, or naming an unknown field, is a configuration error.
    pub fn field(&self, name: &str) -> Result<Object<'a>> {
        let ObjectType::Struct(type_name) = self.ty else {
            return Err(VestigeError::NotAStruct(self.ty.to_string()));
        };
        let descriptor = self.profile.field(type_name, name)?;
        let ty = match &descriptor.kind {
            FieldKind::Scalar { size } => ObjectType::Scalar { size: *size },
            FieldKind::Chars { size } => ObjectType::Chars { size: *size },
            FieldKind::Pointer { target } => ObjectType::Pointer {
                target: target.as_deref(),
            },
            FieldKind::Struct { name } => ObjectType::Struct(name.as_str()),
        };
        Ok(Object {
            address: self.address.wrapping_add(descriptor.offset),
            ty,
            space: self.space,
            profile: self.profile,
        })
    }

    /// Read this overlay's scalar value.
    ///
    /// Scalars decode at their declared width, pointers at the
    /// profile's pointer width. Returns `None` for struct and char
    /// views, and for reads outside the backed image.
    pub fn value(&self) -> Option<u64> {
        let size = match self.ty {
            ObjectType::Scalar { size } => size,
            ObjectType::Pointer { .. } => self.profile.pointer_size(),
            ObjectType::Struct(_) | ObjectType::Chars { .. } => return None,
        };
        let value = self
            .space
            .read_uint(self.address, size, self.profile.byte_order());
        if value.is_none() {
            trace!(address = self.address, "scalar read outside backed image");
        }
        value
    }

    /// Follow a typed pointer, producing an overlay of its target type
    /// at the pointed-to address.
    ///
    /// Returns `None` when the overlay is not a typed pointer, the
    /// pointer is null, or the pointer bytes are not backed.
    pub fn dereference(&self) -> Option<Object<'a>> {
        let ObjectType::Pointer {
            target: Some(target),
        } = self.ty
        else {
            return None;
        };
        let address = self.value()?;
        if address == 0 {
            return None;
        }
        Some(Object {
            address,
            ty: ObjectType::Struct(target),
            space: self.space,
            profile: self.profile,
        })
    }

    /// Read a string out of the overlay.
    ///
    /// Char views read their inline bytes; pointer views follow the
    /// pointer and read a NUL-terminated string at its target, bounded
    /// at four kilobytes. Either way the result is truncated at the
    /// first NUL and decoded lossily.
    pub fn read_string(&self) -> Option<String> {
        let data = match self.ty {
            ObjectType::Chars { size } => self.space.read_exact(self.address, size)?,
            ObjectType::Pointer { .. } => {
                let target = self.value()?;
                if target == 0 {
                    return None;
                }
                self.space.read(target, MAX_CSTRING)?
            }
            _ => return None,
        };
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        Some(String::from_utf8_lossy(&data[..end]).into_owned())
    }

    /// Reinterpret the same address as another declared structure type.
    pub fn cast(&self, type_name: &str) -> Result<Object<'a>> {
        Object::new(self.space, self.profile, type_name, self.address)
    }

    /// Size in bytes this overlay covers.
    pub fn size(&self) -> Result<u64> {
        match self.ty {
            ObjectType::Struct(name) => self.profile.type_size(name),
            ObjectType::Scalar { size } => Ok(u64::from(size)),
            ObjectType::Chars { size } => Ok(size),
            ObjectType::Pointer { .. } => Ok(u64::from(self.profile.pointer_size())),
        }
    }

    pub(crate) fn space(&self) -> &'a dyn AddressSpace {
        self.space
    }

    pub(crate) fn profile(&self) -> &'a Profile {
        self.profile
    }
}
