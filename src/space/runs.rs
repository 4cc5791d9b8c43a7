//! Run-based address translation.
//!
//! A [`RunSpace`] layers a virtual address layout over any base space
//! through a sorted list of runs, each mapping a contiguous virtual
//! range onto a contiguous range of the base. This is how captures that
//! describe memory as (start, offset, length) extents are consumed
//! without rewriting the image.

use crate::space::AddressSpace;
use bytes::Bytes;

/// One contiguous mapping from a virtual range onto the base space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    /// First virtual address covered by this run.
    pub virtual_start: u64,
    /// Address in the base space the run begins at.
    pub base_offset: u64,
    /// Length of the run in bytes.
    pub length: u64,
}

impl Run {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.virtual_start && addr - self.virtual_start < self.length
    }
}

/// A virtual address space assembled from runs over a base space.
///
/// Reads never cross a run boundary: a read that starts inside a run is
/// truncated at the run's end, which the caller observes as a partial
/// result exactly like reaching the end of a flat image.
#[derive(Debug, Clone)]
pub struct RunSpace<S> {
    base: S,
    runs: Vec<Run>,
}

impl<S: AddressSpace> RunSpace<S> {
    /// Build a run space; runs are sorted by virtual start address.
    pub fn new(base: S, mut runs: Vec<Run>) -> Self {
        runs.sort_by_key(|r| r.virtual_start);
        Self { base, runs }
    }

    /// Translate a virtual address to an address in the base space,
    /// along with the bytes remaining in the containing run.
    pub fn translate(&self, addr: u64) -> Option<(u64, u64)> {
        let run = self.runs.iter().find(|r| r.contains(addr))?;
        let into = addr - run.virtual_start;
        Some((run.base_offset + into, run.length - into))
    }

    /// The base space this run space reads through.
    pub fn base(&self) -> &S {
        &self.base
    }
}

impl<S: AddressSpace> AddressSpace for RunSpace<S> {
    fn read(&self, addr: u64, len: u64) -> Option<Bytes> {
        let (base_addr, remaining) = self.translate(addr)?;
        self.base.read(base_addr, std::cmp::min(len, remaining))
    }

    fn runs(&self) -> Vec<(u64, u64)> {
        self.runs.iter().map(|r| (r.virtual_start, r.length)).collect()
    }
}
