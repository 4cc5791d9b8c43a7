//! Shared fixtures for integration tests.
//!
//! Builds synthetic memory images laid out like a small Linux capture:
//! a task list off `init_task`, per-task fd tables, sockfs-style dentry
//! chains, and per-namespace (or legacy global) packet socket lists.
//! All offsets here line up with the profile from [`linux_profile`].

use vestige::core::profile::FieldKind;
use vestige::Profile;

/// Address both socket-list head symbols resolve to in these images.
pub const LIST_HEAD_SYMBOL_ADDR: u64 = 0x40;

const INIT_TASK_ADDR: u64 = 0x1000;

/// Little-endian image assembler.
pub struct ImageBuilder {
    data: Vec<u8>,
}

impl ImageBuilder {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
        }
    }

    pub fn u64(&mut self, at: u64, value: u64) -> &mut Self {
        self.data[at as usize..at as usize + 8].copy_from_slice(&value.to_le_bytes());
        self
    }

    pub fn u32(&mut self, at: u64, value: u32) -> &mut Self {
        self.data[at as usize..at as usize + 4].copy_from_slice(&value.to_le_bytes());
        self
    }

    pub fn cstr(&mut self, at: u64, value: &str) -> &mut Self {
        let at = at as usize;
        self.data[at..at + value.len()].copy_from_slice(value.as_bytes());
        self.data[at + value.len()] = 0;
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// The type table shared by every fixture, with the given symbols.
pub fn linux_profile(symbols: &[(&str, u64)]) -> Profile {
    let mut builder = Profile::builder(8);
    for (name, addr) in symbols {
        builder = builder.symbol(name, *addr);
    }
    builder
        .struct_type(
            "list_head",
            16,
            [
                ("next", 0, FieldKind::pointer_to("list_head")),
                ("prev", 8, FieldKind::pointer_to("list_head")),
            ],
        )
        .struct_type("hlist_head", 8, [("first", 0, FieldKind::raw_pointer())])
        .struct_type(
            "hlist_node",
            16,
            [
                ("next", 0, FieldKind::raw_pointer()),
                ("pprev", 8, FieldKind::raw_pointer()),
            ],
        )
        .struct_type(
            "net",
            0x40,
            [
                ("list", 0x00, FieldKind::embed("list_head")),
                ("packet", 0x20, FieldKind::embed("netns_packet")),
            ],
        )
        .struct_type(
            "netns_packet",
            0x10,
            [("sklist", 0x00, FieldKind::embed("hlist_head"))],
        )
        .struct_type(
            "sock_common",
            0x20,
            [("skc_node", 0x08, FieldKind::embed("hlist_node"))],
        )
        .struct_type(
            "sock",
            0x40,
            [
                ("__sk_common", 0x00, FieldKind::embed("sock_common")),
                ("sk_socket", 0x30, FieldKind::pointer_to("socket")),
            ],
        )
        .struct_type("socket", 0x18, [("state", 0x00, FieldKind::scalar(4))])
        .struct_type("inode", 0x10, [("i_ino", 0x08, FieldKind::scalar(8))])
        .struct_type(
            "task_struct",
            0x80,
            [
                ("tasks", 0x10, FieldKind::embed("list_head")),
                ("pid", 0x28, FieldKind::scalar(4)),
                ("comm", 0x30, FieldKind::chars(16)),
                ("files", 0x48, FieldKind::pointer_to("files_struct")),
            ],
        )
        .struct_type(
            "files_struct",
            0x20,
            [("fdt", 0x08, FieldKind::pointer_to("fdtable"))],
        )
        .struct_type(
            "fdtable",
            0x18,
            [
                ("max_fds", 0x00, FieldKind::scalar(4)),
                ("fd", 0x08, FieldKind::raw_pointer()),
            ],
        )
        .struct_type(
            "file",
            0x20,
            [("dentry", 0x08, FieldKind::pointer_to("dentry"))],
        )
        .struct_type(
            "dentry",
            0x28,
            [
                ("d_parent", 0x00, FieldKind::pointer_to("dentry")),
                ("d_name", 0x08, FieldKind::embed("qstr")),
                ("d_inode", 0x18, FieldKind::pointer_to("inode")),
            ],
        )
        .struct_type("qstr", 0x10, [("name", 0x08, FieldKind::raw_pointer())])
        .finish()
        .expect("fixture profile is consistent")
}

fn task(img: &mut ImageBuilder, base: u64, pid: u32, comm: &str, next_node: u64, files: u64) {
    img.u64(base + 0x10, next_node);
    img.u32(base + 0x28, pid);
    img.cstr(base + 0x30, comm);
    if files != 0 {
        img.u64(base + 0x48, files);
    }
}

fn fd_table(img: &mut ImageBuilder, files_struct: u64, fdtable: u64, array: u64, max_fds: u32) {
    img.u64(files_struct + 0x08, fdtable);
    img.u32(fdtable, max_fds);
    img.u64(fdtable + 0x08, array);
}

fn dentry(img: &mut ImageBuilder, at: u64, parent: u64, name_at: u64, name: &str, inode: u64) {
    img.u64(at, parent);
    img.u64(at + 0x10, name_at); // d_name.name
    img.cstr(name_at, name);
    if inode != 0 {
        img.u64(at + 0x18, inode);
    }
}

/// Three packet sockets owned by two processes:
///
/// | socket | namespace | inode | owner   | pid | fd |
/// |--------|-----------|-------|---------|-----|----|
/// | A      | net0      | 101   | nginx   | 100 | 3  |
/// | B      | net0      | 202   | nginx   | 100 | 5  |
/// | C      | net1      | 303   | tcpdump | 200 | 1  |
///
/// With `legacy` the same three sockets sit on one global list at the
/// `packet_sklist` symbol instead of per-namespace lists.
pub fn build_world(legacy: bool) -> (Profile, Vec<u8>) {
    build(legacy, true)
}

/// Same world, but socket B's descriptor never made it into any fd
/// table: its inode 202 has no open-file entry.
pub fn build_world_missing_descriptor() -> (Profile, Vec<u8>) {
    build(false, false)
}

/// Namespace layout with two namespaces and zero sockets.
pub fn build_empty_world() -> (Profile, Vec<u8>) {
    let profile = linux_profile(&[
        ("init_task", INIT_TASK_ADDR),
        ("net_namespace_list", LIST_HEAD_SYMBOL_ADDR),
    ]);
    let mut img = ImageBuilder::new(0x8000);
    img.u64(LIST_HEAD_SYMBOL_ADDR, 0x2000);
    img.u64(0x2000, 0x2100);
    img.u64(0x2100, LIST_HEAD_SYMBOL_ADDR);
    // Both sklist.first pointers stay null.
    task(&mut img, INIT_TASK_ADDR, 0, "swapper", 0x1010, 0);
    (profile, img.into_bytes())
}

fn build(legacy: bool, with_socket_b_descriptor: bool) -> (Profile, Vec<u8>) {
    let head_symbol = if legacy {
        "packet_sklist"
    } else {
        "net_namespace_list"
    };
    let profile = linux_profile(&[
        ("init_task", INIT_TASK_ADDR),
        (head_symbol, LIST_HEAD_SYMBOL_ADDR),
    ]);

    let mut img = ImageBuilder::new(0x8000);

    // Socket lists: socks at 0x3000/0x3100/0x3200, nodes at +0x08.
    if legacy {
        img.u64(LIST_HEAD_SYMBOL_ADDR, 0x3008);
        img.u64(0x3008, 0x3108);
        img.u64(0x3108, 0x3208);
        img.u64(0x3208, 0);
    } else {
        // Two namespaces at 0x2000 and 0x2100, circularly linked.
        img.u64(LIST_HEAD_SYMBOL_ADDR, 0x2000);
        img.u64(0x2000, 0x2100);
        img.u64(0x2100, LIST_HEAD_SYMBOL_ADDR);
        // net0 owns sockets A and B, net1 owns C.
        img.u64(0x2000 + 0x20, 0x3008);
        img.u64(0x3008, 0x3108);
        img.u64(0x3108, 0);
        img.u64(0x2100 + 0x20, 0x3208);
        img.u64(0x3208, 0);
    }

    // Each sock's socket back-pointer; the backing inode sits right
    // after the 0x18-byte socket structure.
    img.u64(0x3000 + 0x30, 0x4000);
    img.u64(0x3100 + 0x30, 0x4100);
    img.u64(0x3200 + 0x30, 0x4200);
    img.u64(0x4018 + 0x08, 101);
    img.u64(0x4118 + 0x08, 202);
    img.u64(0x4218 + 0x08, 303);

    // Task list: init -> nginx -> tcpdump -> init.
    task(&mut img, INIT_TASK_ADDR, 0, "swapper", 0x1110, 0);
    task(&mut img, 0x1100, 100, "nginx", 0x1210, 0x5000);
    task(&mut img, 0x1200, 200, "tcpdump", 0x1010, 0x5200);

    // nginx: fd 3 -> socket A, fd 5 -> socket B.
    fd_table(&mut img, 0x5000, 0x5040, 0x5080, 8);
    img.u64(0x5080 + 3 * 8, 0x6000);
    if with_socket_b_descriptor {
        img.u64(0x5080 + 5 * 8, 0x6100);
    }
    // tcpdump: fd 0 -> a regular file, fd 1 -> socket C.
    fd_table(&mut img, 0x5200, 0x5240, 0x5280, 4);
    img.u64(0x5280, 0x6300);
    img.u64(0x5280 + 8, 0x6200);

    // file -> dentry wiring.
    img.u64(0x6000 + 0x08, 0x7000);
    img.u64(0x6100 + 0x08, 0x7100);
    img.u64(0x6200 + 0x08, 0x7200);
    img.u64(0x6300 + 0x08, 0x7300);

    // Sockfs dentries carry the synthetic name and the backing inode;
    // 0x7400 is the self-parented pseudo-filesystem root.
    dentry(&mut img, 0x7000, 0x7400, 0x7800, "socket:[101]", 0x4018);
    dentry(&mut img, 0x7100, 0x7400, 0x7820, "socket:[202]", 0x4118);
    dentry(&mut img, 0x7200, 0x7400, 0x7840, "socket:[303]", 0x4218);
    dentry(&mut img, 0x7300, 0x7400, 0x7860, "null", 0);
    dentry(&mut img, 0x7400, 0x7400, 0x7870, "/", 0);

    (profile, img.into_bytes())
}
