//! Symbol and type metadata for one target kernel build.
//!
//! A [`Profile`] maps symbol names to addresses, type names to sizes,
//! and (type, field) pairs to byte offsets and declared field kinds.
//! It is constructed once per analysis run, validated for internal
//! consistency, and read-only thereafter. Lookups are total for any
//! field the core traverses: a missing entry is a configuration error
//! surfaced immediately, never a silently wrong offset.
//!
//! Profiles round-trip through JSON so they can be produced by an
//! external profile builder and loaded here:
//!
//! ```json
//! {
//!   "pointer_size": 8,
//!   "byte_order": "little",
//!   "symbols": { "net_namespace_list": 1095216660480 },
//!   "types": {
//!     "list_head": {
//!       "size": 16,
//!       "fields": {
//!         "next": { "offset": 0, "kind": { "pointer": { "target": "list_head" } } },
//!         "prev": { "offset": 8, "kind": { "pointer": { "target": "list_head" } } }
//!       }
//!     }
//!   }
//! }
//! ```

use crate::error::{Result, VestigeError};
use crate::space::ByteOrder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The declared kind of a structure field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// An unsigned integer scalar of the given byte width.
    Scalar { size: u8 },
    /// An inline, fixed-size character array (e.g. `task_struct.comm`).
    Chars { size: u64 },
    /// A pointer, optionally to a value of the named type. Pointers
    /// without a target can still be read as addresses and followed as
    /// C strings, but not dereferenced into an overlay.
    Pointer { target: Option<String> },
    /// An embedded structure of the named type.
    Struct { name: String },
}

impl FieldKind {
    pub fn scalar(size: u8) -> Self {
        FieldKind::Scalar { size }
    }

    pub fn chars(size: u64) -> Self {
        FieldKind::Chars { size }
    }

    pub fn pointer_to(target: &str) -> Self {
        FieldKind::Pointer {
            target: Some(target.to_string()),
        }
    }

    pub fn raw_pointer() -> Self {
        FieldKind::Pointer { target: None }
    }

    pub fn embed(name: &str) -> Self {
        FieldKind::Struct {
            name: name.to_string(),
        }
    }
}

/// Offset and kind of one field within its containing type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub offset: u64,
    pub kind: FieldKind,
}

/// Size and field table of one structure type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub size: u64,
    pub fields: HashMap<String, FieldDescriptor>,
}

/// Static metadata for one target platform/kernel build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pointer_size: u8,
    #[serde(default)]
    byte_order: ByteOrder,
    symbols: HashMap<String, u64>,
    types: HashMap<String, TypeDescriptor>,
}

impl Profile {
    /// Start building a profile for a target with the given pointer
    /// width in bytes (4 or 8).
    pub fn builder(pointer_size: u8) -> ProfileBuilder {
        ProfileBuilder {
            profile: Profile {
                pointer_size,
                byte_order: ByteOrder::default(),
                symbols: HashMap::new(),
                types: HashMap::new(),
            },
        }
    }

    /// Load a profile from its JSON encoding, validating consistency.
    pub fn from_json(json: &str) -> Result<Self> {
        let profile: Profile =
            serde_json::from_str(json).map_err(|e| VestigeError::Profile(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| VestigeError::Profile(e.to_string()))
    }

    /// Pointer width in bytes for the imaged kernel.
    pub fn pointer_size(&self) -> u8 {
        self.pointer_size
    }

    /// Byte order of the imaged kernel.
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Address of a symbol; missing symbols are a configuration error.
    pub fn symbol(&self, name: &str) -> Result<u64> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| VestigeError::SymbolUnresolved(name.to_string()))
    }

    /// Address of a symbol, or `None` when absent. Used for layout
    /// probing, where absence selects a strategy rather than failing.
    pub fn try_symbol(&self, name: &str) -> Option<u64> {
        self.symbols.get(name).copied()
    }

    pub fn has_symbol(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    /// Size in bytes of a named type.
    pub fn type_size(&self, name: &str) -> Result<u64> {
        Ok(self.type_descriptor(name)?.size)
    }

    /// Descriptor of a (type, field) pair.
    pub fn field(&self, type_name: &str, field: &str) -> Result<&FieldDescriptor> {
        self.type_descriptor(type_name)?
            .fields
            .get(field)
            .ok_or_else(|| VestigeError::UnknownField {
                type_name: type_name.to_string(),
                field: field.to_string(),
            })
    }

    /// Byte offset of a field within its containing type.
    pub fn offset(&self, type_name: &str, field: &str) -> Result<u64> {
        Ok(self.field(type_name, field)?.offset)
    }

    /// The profile-owned spelling of a type name. Overlays borrow this
    /// so they carry no owned strings.
    pub fn type_key(&self, name: &str) -> Result<&str> {
        self.types
            .get_key_value(name)
            .map(|(k, _)| k.as_str())
            .ok_or_else(|| VestigeError::UnknownType(name.to_string()))
    }

    /// Offset at which `embedded` is declared inside `type_name`, when
    /// the field table records the embedding. Falls back to 0, the
    /// kernel convention for common headers placed at the start of the
    /// embedding structure.
    pub fn embedded_offset(&self, type_name: &str, embedded: &str) -> Result<u64> {
        let descriptor = self.type_descriptor(type_name)?;
        Ok(descriptor
            .fields
            .values()
            .find_map(|fd| match &fd.kind {
                FieldKind::Struct { name } if name == embedded => Some(fd.offset),
                _ => None,
            })
            .unwrap_or(0))
    }

    fn type_descriptor(&self, name: &str) -> Result<&TypeDescriptor> {
        self.types
            .get(name)
            .ok_or_else(|| VestigeError::UnknownType(name.to_string()))
    }

    /// Check internal consistency: pointer width is sane and every type
    /// name referenced by a field is declared. Traversal code relies on
    /// this so that a validated profile never produces a dangling type
    /// name mid-walk.
    fn validate(&self) -> Result<()> {
        if !matches!(self.pointer_size, 4 | 8) {
            return Err(VestigeError::Profile(format!(
                "pointer_size must be 4 or 8, got {}",
                self.pointer_size
            )));
        }
        for (type_name, desc) in &self.types {
            for (field, fd) in &desc.fields {
                let referenced = match &fd.kind {
                    FieldKind::Pointer {
                        target: Some(target),
                    } => Some(target),
                    FieldKind::Struct { name } => Some(name),
                    _ => None,
                };
                if let Some(referenced) = referenced {
                    if !self.types.contains_key(referenced) {
                        return Err(VestigeError::Profile(format!(
                            "{}.{} references undeclared type {}",
                            type_name, field, referenced
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Builder for [`Profile`]; `finish` validates and freezes the result.
pub struct ProfileBuilder {
    profile: Profile,
}

impl ProfileBuilder {
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.profile.byte_order = order;
        self
    }

    pub fn symbol(mut self, name: &str, address: u64) -> Self {
        self.profile.symbols.insert(name.to_string(), address);
        self
    }

    /// Declare a structure type with its size and field table. Fields
    /// are (name, offset, kind) triples.
    pub fn struct_type<'f>(
        mut self,
        name: &str,
        size: u64,
        fields: impl IntoIterator<Item = (&'f str, u64, FieldKind)>,
    ) -> Self {
        let fields = fields
            .into_iter()
            .map(|(f, offset, kind)| (f.to_string(), FieldDescriptor { offset, kind }))
            .collect();
        self.profile
            .types
            .insert(name.to_string(), TypeDescriptor { size, fields });
        self
    }

    /// Validate and freeze the profile.
    pub fn finish(self) -> Result<Profile> {
        self.profile.validate()?;
        Ok(self.profile)
    }
}
