// Copyright (c) 2026 Tributary
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]
#![allow(dead_code)]

//! Shared test support: in-memory duplex pipes, a populated registry and
//! tree builders.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io::{Error as IoError, ErrorKind, Read, Result as IoResult, Write};
use tributary::core::merkle::hashing::hash_tree;
use tributary::core::merkle::{MerkleTree, NodeId};
use tributary::core::ser::basic::RawBytes;
use tributary::core::ser::{ClassId, ConstructableRegistry, InternalClass};

/// Class id used for every internal test node.
pub const INTERNAL_CLASS: ClassId = ClassId(0xA);

/// Registry with the test classes registered.
pub fn registry() -> ConstructableRegistry {
    let reg = ConstructableRegistry::new();
    reg.register_value(RawBytes::CLASS_ID, RawBytes::construct)
        .unwrap();
    reg.register_internal(
        INTERNAL_CLASS,
        InternalClass {
            version: 1,
            minimum_supported_version: 1,
            child_bounds: |_| (0, 64),
        },
    )
    .unwrap();
    reg
}

/// Read half of an in-memory pipe. EOF once every writer is gone.
pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    current: Vec<u8>,
    pos: usize,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        if self.pos >= self.current.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = (self.current.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Write half of an in-memory pipe.
pub struct PipeWriter {
    tx: Sender<Vec<u8>>,
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.tx
            .send(data.to_vec())
            .map_err(|_| IoError::new(ErrorKind::BrokenPipe, "pipe closed"))?;
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = unbounded();
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            current: Vec::new(),
            pos: 0,
        },
    )
}

/// A bidirectional in-memory link: each side gets (reader, writer).
pub fn duplex() -> ((PipeReader, PipeWriter), (PipeReader, PipeWriter)) {
    let (a_to_b_w, a_to_b_r) = pipe();
    let (b_to_a_w, b_to_a_r) = pipe();
    ((b_to_a_r, a_to_b_w), (a_to_b_r, b_to_a_w))
}

/// A leaf carrying the given bytes.
pub fn leaf(tree: &mut MerkleTree, bytes: &[u8]) -> NodeId {
    tree.create_leaf(Box::new(RawBytes::new(bytes.to_vec())))
}

/// Builds and hashes:
/// ```text
///          root
///         /    \
///     inner     c
///     /   \
///    a     b
/// ```
pub fn sample_tree(a: &[u8], b: &[u8], c: &[u8]) -> MerkleTree {
    let mut tree = MerkleTree::new();
    let root = tree.create_internal(INTERNAL_CLASS, 1, 2);
    let inner = tree.create_internal(INTERNAL_CLASS, 1, 2);
    let la = leaf(&mut tree, a);
    let lb = leaf(&mut tree, b);
    let lc = leaf(&mut tree, c);
    tree.set_root(Some(root)).unwrap();
    tree.set_child(root, 0, Some(inner)).unwrap();
    tree.set_child(root, 1, Some(lc)).unwrap();
    tree.set_child(inner, 0, Some(la)).unwrap();
    tree.set_child(inner, 1, Some(lb)).unwrap();
    hash_tree(&mut tree).unwrap();
    tree
}

/// Structural, route and digest equality, node by node in pre-order.
pub fn assert_trees_equal(a: &MerkleTree, b: &MerkleTree) {
    use tributary::core::merkle::iterators::TraversalOrder;
    let av: Vec<_> = a.iter(TraversalOrder::PreOrder).collect();
    let bv: Vec<_> = b.iter(TraversalOrder::PreOrder).collect();
    assert_eq!(av.len(), bv.len(), "node counts differ");
    for (x, y) in av.iter().zip(bv.iter()) {
        let nx = a.node(*x).unwrap();
        let ny = b.node(*y).unwrap();
        assert_eq!(nx.class_id(), ny.class_id());
        assert_eq!(nx.version(), ny.version());
        assert_eq!(nx.route(), ny.route(), "routes differ");
        assert_eq!(nx.children().len(), ny.children().len());
        assert_eq!(nx.hash(), ny.hash(), "digests differ at {}", nx.route());
    }
}
