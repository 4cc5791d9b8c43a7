//! Memory-mapped image files.
//!
//! A [`FileImage`] maps a raw memory image read-only and exposes it as
//! an [`AddressSpace`] where addresses are file offsets. The map is
//! acquired once at open time and released when the image is dropped,
//! regardless of how the analysis run ends.

use crate::error::{Result, VestigeError};
use crate::space::AddressSpace;
use bytes::Bytes;
use memmap2::Mmap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Open-time resource limits for image files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLimits {
    /// The absolute maximum image size that can be opened.
    pub max_file_size: u64,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            // Large enough for full RAM captures of ordinary machines.
            max_file_size: 64 * 1024 * 1024 * 1024,
        }
    }
}

/// A read-only, memory-mapped image file.
pub struct FileImage {
    path: PathBuf,
    // None when the file size is zero; memmap cannot map empty files.
    mmap: Option<Mmap>,
    file_size: u64,
}

impl FileImage {
    /// Open an image file with default limits.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_limits(path, ImageLimits::default())
    }

    /// Open an image file, failing if it exceeds `limits.max_file_size`.
    pub fn open_with_limits<P: AsRef<Path>>(path: P, limits: ImageLimits) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        debug!(
            path = %path.display(),
            size = file_size,
            limit = limits.max_file_size,
            "opening image file"
        );

        if file_size > limits.max_file_size {
            warn!(
                path = %path.display(),
                size = file_size,
                limit = limits.max_file_size,
                "image file is too large"
            );
            return Err(VestigeError::ImageTooLarge {
                limit: limits.max_file_size,
                found: file_size,
            });
        }

        // For zero-length files, do not attempt to mmap (unsupported);
        // the image is simply never valid at any address.
        let mmap = if file_size == 0 {
            None
        } else {
            // Safety: the file is backed by a real file on disk and we
            // only request a read-only map.
            Some(unsafe { Mmap::map(&file)? })
        };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            file_size,
        })
    }

    /// Total size of the underlying file in bytes.
    pub fn size(&self) -> u64 {
        self.file_size
    }

    /// Path the image was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AddressSpace for FileImage {
    fn read(&self, addr: u64, len: u64) -> Option<Bytes> {
        let map = self.mmap.as_ref()?;
        if addr >= map.len() as u64 {
            return None;
        }
        let start = addr as usize;
        let end = std::cmp::min(start.saturating_add(len as usize), map.len());
        Some(Bytes::copy_from_slice(&map[start..end]))
    }

    fn runs(&self) -> Vec<(u64, u64)> {
        if self.file_size == 0 {
            Vec::new()
        } else {
            vec![(0, self.file_size)]
        }
    }
}
