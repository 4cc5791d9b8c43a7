//! Socket-to-process correlation.
//!
//! The kernel never stores "which process owns this socket" in the
//! socket itself; the association lives in each process's descriptor
//! table. This module recovers it: walk every network namespace's
//! socket list, recover each socket's backing inode, and join the
//! inode against a cache built from the open-file enumeration.
//!
//! The inode recovery leans on an allocation convention rather than the
//! profile's field table: the kernel allocates `struct socket` and its
//! backing inode together (`struct socket_alloc`), so the inode sits at
//! a fixed offset equal to the platform's `socket` size. Profiles for
//! new platforms must confirm that layout holds before use.

use crate::core::{Object, Snapshot};
use crate::core::profile::{FieldKind, Profile};
use crate::error::{Result, VestigeError};
use crate::linux::files::open_files;
use crate::walk::{self, hlist_of_type, list_of_type};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Symbol naming the list of network namespaces (modern kernels).
pub const NET_NAMESPACE_LIST: &str = "net_namespace_list";

/// Symbol naming the single global packet-socket list (legacy kernels
/// predating network namespaces).
pub const PACKET_SKLIST: &str = "packet_sklist";

/// Where socket enumeration starts, decided once per run by symbol
/// presence so both layouts stay independently testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketSource {
    /// Walk every namespace on `net_namespace_list`, then each
    /// namespace's socket list.
    Namespaces { head: u64 },
    /// Walk the single global socket list at `packet_sklist`.
    LegacyGlobal { head: u64 },
}

impl SocketSource {
    /// Probe the profile, preferring the legacy symbol when present:
    /// a kernel that exports `packet_sklist` has no namespace list to
    /// walk.
    pub fn detect(profile: &Profile) -> Result<Self> {
        if let Some(head) = profile.try_symbol(PACKET_SKLIST) {
            debug!(head, "legacy single-namespace layout detected");
            return Ok(SocketSource::LegacyGlobal { head });
        }
        let head = profile.symbol(NET_NAMESPACE_LIST)?;
        Ok(SocketSource::Namespaces { head })
    }
}

/// One resolved correlation row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SocketOwner {
    /// Owning process display name (`task_struct.comm`).
    pub process: String,
    pub pid: u64,
    /// Descriptor number within the owning process.
    pub fd: u64,
    /// Backing inode number, the join key.
    pub inode: u64,
}

impl fmt::Display for SocketOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<16} {:>6} {:>5} {:>18}",
            self.process, self.pid, self.fd, self.inode
        )
    }
}

/// A correlation run that stopped on a fatal error after producing
/// some rows. The rows remain valid and are surfaced as diagnostic
/// context alongside the cause.
#[derive(Debug, Error)]
#[error("socket correlation aborted after {} resolved rows: {source}", .rows.len())]
pub struct CorrelationFailure {
    pub rows: Vec<SocketOwner>,
    pub source: VestigeError,
}

struct CacheEntry {
    process: String,
    pid: u64,
    fd: u64,
}

/// The socket-to-process correlator for one snapshot.
///
/// Strictly forward within a run: namespace discovery, socket
/// enumeration, a single lazy cache build, then the join. No step is
/// retried, and nothing persists across runs.
pub struct SocketCorrelator<'a> {
    snap: Snapshot<'a>,
    source: SocketSource,
    cache: OnceCell<HashMap<u64, CacheEntry>>,
}

impl<'a> SocketCorrelator<'a> {
    /// Bind a correlator to a snapshot, selecting the socket source.
    pub fn new(snap: Snapshot<'a>) -> Result<Self> {
        let source = SocketSource::detect(snap.profile())?;
        Ok(Self {
            snap,
            source,
            cache: OnceCell::new(),
        })
    }

    /// The strategy this run walks sockets with.
    pub fn source(&self) -> SocketSource {
        self.source
    }

    /// Lazily enumerate every live socket as a `sock` overlay, in
    /// namespace order then socket-list order.
    pub fn sockets(&self) -> Result<Box<dyn Iterator<Item = Object<'a>> + 'a>> {
        let snap = self.snap;
        let profile = snap.profile();

        // Validate everything the per-socket pipeline will touch, so
        // configuration errors cannot be lost inside lazy stages.
        profile.field("sock", "sk_socket")?;
        profile.type_size("socket")?;
        profile.field("inode", "i_ino")?;

        match self.source {
            SocketSource::LegacyGlobal { head } => {
                // Legacy profiles have no namespace types; the symbol
                // names a bare global hlist head.
                let head = snap.object("hlist_head", head)?;
                Ok(Box::new(hlist_of_type(
                    &head,
                    "sock",
                    "sock_common",
                    "skc_node",
                )?))
            }
            SocketSource::Namespaces { head } => {
                let head = snap.object("list_head", head)?;
                profile.field("net", "packet")?;
                let head_type = sklist_head_type(profile)?;
                walk::plan(profile, head_type, "sock", "sock_common", "skc_node")?;

                let namespaces = list_of_type(&head, "net", "list")?;
                Ok(Box::new(namespaces.flat_map(move |net| {
                    let sockets = net
                        .field("packet")
                        .and_then(|packet| packet.field("sklist"))
                        .and_then(|sklist| {
                            hlist_of_type(&sklist, "sock", "sock_common", "skc_node")
                        });
                    // Unreachable config errors only: validated above.
                    sockets.ok().into_iter().flatten()
                })))
            }
        }
    }

    /// Recover a socket's backing inode overlay.
    ///
    /// The inode is laid out immediately after `struct socket` in the
    /// kernel's allocation; see the module docs for the convention.
    /// Sockets without a readable `socket` back-pointer (orphaned or
    /// partially paged out) come back as `None`.
    pub fn socket_inode(&self, sock: &Object<'a>) -> Result<Option<Object<'a>>> {
        let Some(socket) = sock.field("sk_socket")?.dereference() else {
            return Ok(None);
        };
        let inode_addr = socket
            .address()
            .wrapping_add(self.snap.profile().type_size("socket")?);
        Ok(Some(self.snap.object("inode", inode_addr)?))
    }

    /// Lazily yield one row per socket, fused after the first fatal
    /// error. Sockets without a backing inode are skipped with a
    /// warning; a backing inode missing from the descriptor cache is
    /// the distinct fatal miss.
    pub fn owners(&self) -> Result<impl Iterator<Item = Result<SocketOwner>> + '_> {
        let sockets = self.sockets()?;
        let mut failed = false;
        Ok(sockets.filter_map(move |sock| {
            if failed {
                return None;
            }
            match self.resolve_owner(&sock) {
                Ok(Some(row)) => Some(Ok(row)),
                Ok(None) => None,
                Err(source) => {
                    failed = true;
                    Some(Err(source))
                }
            }
        }))
    }

    /// Run the correlation to completion.
    ///
    /// On a fatal error the rows resolved before the failure ride
    /// along in [`CorrelationFailure`].
    pub fn run(&self) -> std::result::Result<Vec<SocketOwner>, CorrelationFailure> {
        let owners = self.owners().map_err(|source| CorrelationFailure {
            rows: Vec::new(),
            source,
        })?;

        let mut rows = Vec::new();
        for owner in owners {
            match owner {
                Ok(row) => rows.push(row),
                Err(source) => return Err(CorrelationFailure { rows, source }),
            }
        }
        Ok(rows)
    }

    fn resolve_owner(&self, sock: &Object<'a>) -> Result<Option<SocketOwner>> {
        let Some(inode) = self.socket_inode(sock)? else {
            warn!(sock = sock.address(), "socket without backing inode, skipped");
            return Ok(None);
        };
        let Some(ino) = inode.field("i_ino")?.value() else {
            warn!(
                sock = sock.address(),
                inode = inode.address(),
                "inode number unreadable, socket skipped"
            );
            return Ok(None);
        };

        let cache = self.descriptor_cache()?;
        let entry = cache
            .get(&ino)
            .ok_or(VestigeError::InodeNotFound { inode: ino })?;
        Ok(Some(SocketOwner {
            process: entry.process.clone(),
            pid: entry.pid,
            fd: entry.fd,
            inode: ino,
        }))
    }

    /// The inode -> (process, fd) cache, built once on first need and
    /// read-only for the rest of the run.
    fn descriptor_cache(&self) -> Result<&HashMap<u64, CacheEntry>> {
        self.cache.get_or_try_init(|| self.build_cache())
    }

    fn build_cache(&self) -> Result<HashMap<u64, CacheEntry>> {
        let mut cache = HashMap::new();
        for open in open_files(&self.snap)? {
            let Some(path) = &open.path else { continue };
            if !path.contains("socket:[") {
                continue;
            }
            let Some(ino) = file_inode(&open.file) else {
                debug!(
                    file = open.file.address(),
                    "socket file without readable inode, not cached"
                );
                continue;
            };
            cache.insert(
                ino,
                CacheEntry {
                    process: open.task.display_name(),
                    pid: open.task.pid().unwrap_or(0),
                    fd: open.fd,
                },
            );
        }
        debug!(entries = cache.len(), "descriptor cache built");
        Ok(cache)
    }
}

/// Inode number behind an open file, via `dentry.d_inode.i_ino`.
fn file_inode(file: &Object<'_>) -> Option<u64> {
    file.field("dentry")
        .ok()?
        .dereference()?
        .field("d_inode")
        .ok()?
        .dereference()?
        .field("i_ino")
        .ok()?
        .value()
}

/// The head type of a namespace's socket list, as declared by
/// `netns_packet.sklist`.
fn sklist_head_type(profile: &Profile) -> Result<&str> {
    match &profile.field("netns_packet", "sklist")?.kind {
        FieldKind::Struct { name } => Ok(name.as_str()),
        other => Err(VestigeError::Profile(format!(
            "netns_packet.sklist must embed a list head type, found {:?}",
            other
        ))),
    }
}
