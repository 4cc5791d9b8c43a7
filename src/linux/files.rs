//! Open-file enumeration.
//!
//! For each process, the kernel keeps descriptors in an array of slots
//! hanging off `task_struct.files -> files_struct.fdt -> fdtable`. This
//! walk is its own traversal, not an intrusive list: slots are indexed,
//! and a null slot is simply a closed descriptor.
//!
//! Each open file resolves a display path by climbing its dentry chain.
//! Resolution degrades per entry: one broken chain yields a pathless
//! row rather than stopping discovery of everything else.

use crate::core::object::{Object, ObjectType};
use crate::core::profile::{FieldKind, Profile};
use crate::core::Snapshot;
use crate::error::{Result, VestigeError};
use crate::linux::tasks::{tasks, Task};
use crate::space::{AddressSpace, ByteOrder};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Hard cap on descriptor slots scanned per task. A corrupted
/// `max_fds` must not turn one task into an unbounded scan.
const MAX_FD_SLOTS: u64 = 65536;

/// Maximum dentry-chain depth followed during path resolution.
const MAX_PATH_DEPTH: usize = 128;

/// One open descriptor: the owning task, the `file` overlay, the
/// descriptor number, and the resolved display path when the dentry
/// chain was intact.
#[derive(Debug, Clone)]
pub struct OpenFile<'a> {
    pub task: Task<'a>,
    pub file: Object<'a>,
    pub fd: u64,
    pub path: Option<String>,
}

impl<'a> Task<'a> {
    /// Walk this task's file-descriptor table.
    ///
    /// An unreadable table yields an empty walk; only profile
    /// mismatches are errors.
    pub fn open_files(&self) -> Result<FdTableWalk<'a>> {
        FdTableWalk::new(*self)
    }
}

/// Lazy walk over one task's descriptor slots.
pub struct FdTableWalk<'a> {
    task: Task<'a>,
    space: &'a dyn AddressSpace,
    profile: &'a Profile,
    file_type: &'a str,
    array: u64,
    max_fds: u64,
    index: u64,
    pointer_size: u8,
    byte_order: ByteOrder,
}

impl<'a> FdTableWalk<'a> {
    fn new(task: Task<'a>) -> Result<Self> {
        let object = task.object();
        let space = object.space();
        let profile = object.profile();
        let file_type = profile.type_key("file")?;

        let mut array = 0;
        let mut max_fds = 0;
        if let Some(files) = object.field("files")?.dereference() {
            if let Some(fdt) = files.field("fdt")?.dereference() {
                array = fdt.field("fd")?.value().unwrap_or(0);
                max_fds = fdt.field("max_fds")?.value().unwrap_or(0);
            }
        }
        if array == 0 {
            debug!(task = object.address(), "no readable fd table");
            max_fds = 0;
        }
        if max_fds > MAX_FD_SLOTS {
            warn!(
                task = object.address(),
                max_fds, "fd table size clamped to {MAX_FD_SLOTS}"
            );
            max_fds = MAX_FD_SLOTS;
        }

        Ok(Self {
            task,
            space,
            profile,
            file_type,
            array,
            max_fds,
            index: 0,
            pointer_size: profile.pointer_size(),
            byte_order: profile.byte_order(),
        })
    }
}

impl<'a> Iterator for FdTableWalk<'a> {
    type Item = OpenFile<'a>;

    fn next(&mut self) -> Option<OpenFile<'a>> {
        while self.index < self.max_fds {
            let fd = self.index;
            self.index += 1;

            let slot = self.array + fd * u64::from(self.pointer_size);
            let Some(ptr) = self.space.read_uint(slot, self.pointer_size, self.byte_order)
            else {
                debug!(
                    task = self.task.address(),
                    slot, "fd array unreadable; stopping table walk"
                );
                self.index = self.max_fds;
                return None;
            };
            if ptr == 0 {
                continue;
            }

            let file = Object::from_parts(
                self.space,
                self.profile,
                ObjectType::Struct(self.file_type),
                ptr,
            );
            let path = resolve_path(&file);
            return Some(OpenFile {
                task: self.task,
                file,
                fd,
                path,
            });
        }
        None
    }
}

/// Enumerate every open descriptor of every process on the image.
///
/// Profile entries for the whole walk (fd table fields and the dentry
/// chain) are validated up front; after that, per-task and per-entry
/// failures degrade locally and never abort the enumeration.
pub fn open_files<'a>(snap: &Snapshot<'a>) -> Result<impl Iterator<Item = OpenFile<'a>> + 'a> {
    validate_fd_walk(snap.profile())?;
    Ok(tasks(snap)?
        .filter_map(|task| task.open_files().ok())
        .flatten())
}

/// Resolve a display path for an open file by climbing its dentry
/// chain to the self-parented root.
///
/// Pseudo-files whose whole identity is a single `kind:[tag]` name
/// (sockfs, pipefs, anonymous inodes) come back verbatim; regular
/// chains join under `/`. Any unreadable link in the chain degrades to
/// `None`.
pub fn resolve_path(file: &Object<'_>) -> Option<String> {
    let mut dentry = file.field("dentry").ok()?.dereference()?;
    let mut components: Vec<String> = Vec::new();
    let mut seen = HashSet::new();

    loop {
        if components.len() >= MAX_PATH_DEPTH || !seen.insert(dentry.address()) {
            debug!(dentry = dentry.address(), "dentry chain does not reach a root");
            return None;
        }
        let name = dentry.field("d_name").ok()?.field("name").ok()?.read_string()?;
        let parent = dentry.field("d_parent").ok()?.dereference()?;
        if parent == dentry {
            // Reached the root; its own name is the mount point, not a
            // path component.
            return Some(match components.len() {
                0 => {
                    if name.is_empty() || name == "/" {
                        "/".to_string()
                    } else {
                        name
                    }
                }
                1 if components[0].contains(":[") => components.pop()?,
                _ => {
                    components.reverse();
                    format!("/{}", components.join("/"))
                }
            });
        }
        components.push(name);
        dentry = parent;
    }
}

fn validate_fd_walk(profile: &Profile) -> Result<()> {
    profile.field("task_struct", "files")?;
    profile.field("files_struct", "fdt")?;
    profile.field("fdtable", "fd")?;
    profile.field("fdtable", "max_fds")?;
    profile.field("file", "dentry")?;
    profile.field("dentry", "d_parent")?;

    // d_name embeds a name-carrying type; resolve it rather than
    // hard-coding its spelling.
    match &profile.field("dentry", "d_name")?.kind {
        FieldKind::Struct { name } => {
            profile.field(name, "name")?;
        }
        other => {
            return Err(VestigeError::Profile(format!(
                "dentry.d_name must embed a name type, found {:?}",
                other
            )))
        }
    }
    Ok(())
}
