//! A snapshot binds an address space to a profile for one analysis run.
//!
//! Both halves are constructed once, shared read-only, and borrowed by
//! every overlay and traversal for the run's duration.

use crate::core::object::Object;
use crate::core::profile::Profile;
use crate::error::Result;
use crate::space::AddressSpace;

/// The (address space, profile) pair every traversal borrows.
#[derive(Clone, Copy)]
pub struct Snapshot<'a> {
    space: &'a dyn AddressSpace,
    profile: &'a Profile,
}

impl<'a> Snapshot<'a> {
    pub fn new(space: &'a dyn AddressSpace, profile: &'a Profile) -> Self {
        Self { space, profile }
    }

    pub fn space(&self) -> &'a dyn AddressSpace {
        self.space
    }

    pub fn profile(&self) -> &'a Profile {
        self.profile
    }

    /// Overlay a named structure type at a raw address.
    pub fn object(&self, type_name: &str, address: u64) -> Result<Object<'a>> {
        Object::new(self.space, self.profile, type_name, address)
    }

    /// Overlay a named structure type at a symbol's address.
    pub fn object_at_symbol(&self, type_name: &str, symbol: &str) -> Result<Object<'a>> {
        let address = self.profile.symbol(symbol)?;
        self.object(type_name, address)
    }

    /// Read a pointer-width value at `addr` using the profile's layout.
    pub fn read_pointer(&self, addr: u64) -> Option<u64> {
        self.space
            .read_uint(addr, self.profile.pointer_size(), self.profile.byte_order())
    }
}
