//! End-to-end correlation over synthetic memory images.

mod common;

use common::{build_empty_world, build_world, build_world_missing_descriptor, LIST_HEAD_SYMBOL_ADDR};
use std::io::Write;
use vestige::linux::{SocketCorrelator, SocketOwner, SocketSource};
use vestige::space::{BufferSpace, FileImage};
use vestige::{Snapshot, VestigeError};

fn expected_rows() -> Vec<SocketOwner> {
    vec![
        SocketOwner {
            process: "nginx".to_string(),
            pid: 100,
            fd: 3,
            inode: 101,
        },
        SocketOwner {
            process: "nginx".to_string(),
            pid: 100,
            fd: 5,
            inode: 202,
        },
        SocketOwner {
            process: "tcpdump".to_string(),
            pid: 200,
            fd: 1,
            inode: 303,
        },
    ]
}

#[test]
fn namespace_walk_resolves_every_socket() {
    let (profile, image) = build_world(false);
    let space = BufferSpace::new(image);
    let snap = Snapshot::new(&space, &profile);

    let correlator = SocketCorrelator::new(snap).unwrap();
    assert_eq!(
        correlator.source(),
        SocketSource::Namespaces {
            head: LIST_HEAD_SYMBOL_ADDR
        }
    );

    let rows = correlator.run().unwrap();
    assert_eq!(rows, expected_rows());
}

#[test]
fn legacy_and_namespace_paths_agree() {
    let (ns_profile, ns_image) = build_world(false);
    let (legacy_profile, legacy_image) = build_world(true);

    let ns_space = BufferSpace::new(ns_image);
    let legacy_space = BufferSpace::new(legacy_image);

    let ns = SocketCorrelator::new(Snapshot::new(&ns_space, &ns_profile)).unwrap();
    let legacy = SocketCorrelator::new(Snapshot::new(&legacy_space, &legacy_profile)).unwrap();

    assert_eq!(
        legacy.source(),
        SocketSource::LegacyGlobal {
            head: LIST_HEAD_SYMBOL_ADDR
        }
    );
    assert_eq!(ns.run().unwrap(), legacy.run().unwrap());
}

#[test]
fn missing_descriptor_is_distinct_fatal_with_partial_rows() {
    let (profile, image) = build_world_missing_descriptor();
    let space = BufferSpace::new(image);
    let snap = Snapshot::new(&space, &profile);

    let failure = SocketCorrelator::new(snap).unwrap().run().unwrap_err();

    // The miss names the offending inode...
    assert!(matches!(
        failure.source,
        VestigeError::InodeNotFound { inode: 202 }
    ));
    // ...and the row resolved before the miss survives.
    assert_eq!(failure.rows, expected_rows()[..1].to_vec());
    assert!(failure.to_string().contains("202"));
}

#[test]
fn no_sockets_is_an_empty_result_not_an_error() {
    let (profile, image) = build_empty_world();
    let space = BufferSpace::new(image);
    let snap = Snapshot::new(&space, &profile);

    let rows = SocketCorrelator::new(snap).unwrap().run().unwrap();
    assert!(rows.is_empty());
}

#[test]
fn owners_is_lazy_and_stops_on_demand() {
    // Consuming one row must not touch the rest of the socket list;
    // in particular it works on the image where socket B would be a
    // fatal miss.
    let (profile, image) = build_world_missing_descriptor();
    let space = BufferSpace::new(image);
    let snap = Snapshot::new(&space, &profile);

    let correlator = SocketCorrelator::new(snap).unwrap();
    let first: Vec<_> = correlator.owners().unwrap().take(1).collect();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].as_ref().unwrap().inode, 101);
}

#[test]
fn open_file_enumeration_yields_unique_descriptors() {
    let (profile, image) = build_world(false);
    let space = BufferSpace::new(image);
    let snap = Snapshot::new(&space, &profile);

    let mut per_task: std::collections::HashMap<u64, Vec<u64>> = std::collections::HashMap::new();
    for open in vestige::linux::open_files(&snap).unwrap() {
        per_task
            .entry(open.task.address())
            .or_default()
            .push(open.fd);
    }

    // nginx has fds {3, 5}, tcpdump has {0, 1}; no duplicates within a
    // task.
    assert_eq!(per_task.len(), 2);
    for fds in per_task.values() {
        let mut sorted = fds.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(&sorted, fds);
    }
}

#[test]
fn unresolved_head_symbol_is_a_configuration_error() {
    let (profile, image) = {
        let profile = common::linux_profile(&[("init_task", 0x1000)]);
        (profile, vec![0u8; 0x2000])
    };
    let space = BufferSpace::new(image);
    let snap = Snapshot::new(&space, &profile);

    match SocketCorrelator::new(snap) {
        Err(VestigeError::SymbolUnresolved(symbol)) => {
            assert_eq!(symbol, "net_namespace_list");
        }
        other => panic!("expected unresolved symbol, got {:?}", other.err()),
    }
}

#[test]
fn correlates_from_a_file_backed_image() -> anyhow::Result<()> {
    let (profile, image) = build_world(false);
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(&image)?;

    let mapped = FileImage::open(file.path())?;
    let snap = Snapshot::new(&mapped, &profile);
    let rows = SocketCorrelator::new(snap)?.run()?;
    assert_eq!(rows, expected_rows());
    Ok(())
}
