//! Address spaces: byte-addressable read interfaces over a memory image.
//!
//! An address space answers three questions: what bytes live at an
//! address, whether an address is backed by valid data at all, and which
//! contiguous runs of the image are available. Every typed overlay read
//! goes through one of these at use time; nothing is copied up front.
//!
//! Reads are deliberately forgiving at the edges: a read that starts in
//! backed data but runs off the end returns the available prefix, and a
//! read that starts in unbacked territory returns `None`. Callers that
//! need a full-width value use [`AddressSpace::read_exact`], and callers
//! that want page-style semantics use [`AddressSpace::zread`].

pub mod image;
pub mod runs;

use bytes::Bytes;

pub use image::{FileImage, ImageLimits};
pub use runs::{Run, RunSpace};

/// Byte order used when decoding scalar values out of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// A read-only, byte-addressable view of a memory image.
///
/// Implementations are snapshots: the backing data does not change for
/// the duration of an analysis run, so `&self` reads need no locking.
pub trait AddressSpace {
    /// Read up to `len` bytes at `addr`.
    ///
    /// Returns the backed bytes starting at `addr`, which may be fewer
    /// than requested when the backed range ends early, or `None` when
    /// `addr` itself is not backed.
    fn read(&self, addr: u64, len: u64) -> Option<Bytes>;

    /// Contiguous runs of backed addresses, as (start, length) pairs.
    fn runs(&self) -> Vec<(u64, u64)>;

    /// Whether `addr` is backed by valid data.
    fn is_valid(&self, addr: u64) -> bool {
        self.read(addr, 1).is_some_and(|b| !b.is_empty())
    }

    /// Read exactly `len` bytes at `addr`, or `None` if the full range
    /// is not backed.
    fn read_exact(&self, addr: u64, len: u64) -> Option<Bytes> {
        self.read(addr, len).filter(|b| b.len() as u64 == len)
    }

    /// Read `len` bytes at `addr`, zero-padding whatever is not backed.
    ///
    /// Always returns exactly `len` bytes.
    fn zread(&self, addr: u64, len: u64) -> Bytes {
        let mut out = vec![0u8; len as usize];
        if let Some(data) = self.read(addr, len) {
            out[..data.len()].copy_from_slice(&data);
        }
        Bytes::from(out)
    }

    /// Decode an unsigned integer of `size` bytes (1, 2, 4, or 8) at
    /// `addr`, or `None` if the range is not fully backed.
    fn read_uint(&self, addr: u64, size: u8, order: ByteOrder) -> Option<u64> {
        debug_assert!(matches!(size, 1 | 2 | 4 | 8));
        let data = self.read_exact(addr, u64::from(size))?;
        let mut raw = [0u8; 8];
        match order {
            ByteOrder::Little => raw[..data.len()].copy_from_slice(&data),
            ByteOrder::Big => raw[8 - data.len()..].copy_from_slice(&data),
        }
        Some(match order {
            ByteOrder::Little => u64::from_le_bytes(raw),
            ByteOrder::Big => u64::from_be_bytes(raw),
        })
    }
}

/// An in-memory address space over a byte buffer.
///
/// The workhorse for synthetic images in tests, and for callers that
/// already hold the image fully buffered. The buffer can be mounted at
/// a non-zero base address, in which case reads below the base are
/// unbacked.
#[derive(Debug, Clone)]
pub struct BufferSpace {
    data: Bytes,
    base: u64,
}

impl BufferSpace {
    /// Wrap a buffer mounted at address 0.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self::with_base(data, 0)
    }

    /// Wrap a buffer mounted at `base`.
    pub fn with_base(data: impl Into<Bytes>, base: u64) -> Self {
        Self {
            data: data.into(),
            base,
        }
    }

    /// Total number of backed bytes.
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The address the buffer is mounted at.
    pub fn base(&self) -> u64 {
        self.base
    }
}

impl AddressSpace for BufferSpace {
    fn read(&self, addr: u64, len: u64) -> Option<Bytes> {
        let offset = addr.checked_sub(self.base)?;
        if offset >= self.data.len() as u64 {
            return None;
        }
        let start = offset as usize;
        let end = std::cmp::min(start.saturating_add(len as usize), self.data.len());
        Some(self.data.slice(start..end))
    }

    fn runs(&self) -> Vec<(u64, u64)> {
        if self.data.is_empty() {
            Vec::new()
        } else {
            vec![(self.base, self.data.len() as u64)]
        }
    }
}

impl<T: AddressSpace + ?Sized> AddressSpace for &T {
    fn read(&self, addr: u64, len: u64) -> Option<Bytes> {
        (**self).read(addr, len)
    }

    fn runs(&self) -> Vec<(u64, u64)> {
        (**self).runs()
    }

    fn is_valid(&self, addr: u64) -> bool {
        (**self).is_valid(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_read_in_bounds() {
        let space = BufferSpace::new(&b"hello world"[..]);
        let data = space.read(6, 5).unwrap();
        assert_eq!(&data[..], b"world");
    }

    #[test]
    fn test_buffer_read_partial_at_end() {
        let space = BufferSpace::new(&b"hello"[..]);
        let data = space.read(3, 10).unwrap();
        assert_eq!(&data[..], b"lo");
        assert!(space.read_exact(3, 10).is_none());
    }

    #[test]
    fn test_buffer_read_past_end() {
        let space = BufferSpace::new(&b"hello"[..]);
        assert!(space.read(5, 1).is_none());
        assert!(!space.is_valid(5));
        assert!(space.is_valid(4));
    }

    #[test]
    fn test_buffer_with_base() {
        let space = BufferSpace::with_base(&b"abcd"[..], 0x1000);
        assert!(space.read(0, 4).is_none());
        assert!(!space.is_valid(0xfff));
        let data = space.read(0x1001, 2).unwrap();
        assert_eq!(&data[..], b"bc");
        assert_eq!(space.runs(), vec![(0x1000, 4)]);
    }

    #[test]
    fn test_zread_pads_with_zeros() {
        let space = BufferSpace::new(&b"ab"[..]);
        let data = space.zread(1, 4);
        assert_eq!(&data[..], &[b'b', 0, 0, 0]);

        // Fully unbacked read is all zeros.
        let data = space.zread(100, 3);
        assert_eq!(&data[..], &[0, 0, 0]);
    }

    #[test]
    fn test_read_uint_little_and_big() {
        let space = BufferSpace::new(vec![0x78, 0x56, 0x34, 0x12, 0, 0, 0, 0]);
        assert_eq!(space.read_uint(0, 4, ByteOrder::Little), Some(0x1234_5678));
        assert_eq!(space.read_uint(0, 4, ByteOrder::Big), Some(0x7856_3412));
        assert_eq!(space.read_uint(0, 8, ByteOrder::Little), Some(0x1234_5678));
        assert_eq!(space.read_uint(0, 2, ByteOrder::Little), Some(0x5678));
        assert_eq!(space.read_uint(0, 1, ByteOrder::Little), Some(0x78));
    }

    #[test]
    fn test_read_uint_unbacked() {
        let space = BufferSpace::new(vec![1, 2, 3]);
        // Not enough bytes for a full u32.
        assert_eq!(space.read_uint(0, 4, ByteOrder::Little), None);
        assert_eq!(space.read_uint(10, 4, ByteOrder::Little), None);
    }
}
