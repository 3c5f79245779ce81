//! Inode management for key <-> inode mapping and node lifetime
//!
//! The kernel addresses entries by inode number while the tree works with
//! keys. A key keeps its inode number while the kernel references it.
//! Resolved nodes are held here only for that long: each successful
//! lookup adds a reference and `forget` releases the node and its number.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::tree::Node;

/// Root directory inode (always 1 in FUSE)
pub const ROOT_INODE: u64 = 1;

/// A resolved node and the kernel's reference count on it
struct NodeSlot {
    node: Node,
    lookups: u64,
}

/// Manages inode numbering and the nodes the kernel currently holds
pub struct InodeTable {
    inode_to_key: DashMap<u64, String>,
    key_to_inode: DashMap<String, u64>,
    nodes: DashMap<u64, NodeSlot>,
    next_inode: AtomicU64,
}

impl InodeTable {
    /// Create a new inode table with the root node registered
    pub fn new() -> Self {
        let table = Self {
            inode_to_key: DashMap::new(),
            key_to_inode: DashMap::new(),
            nodes: DashMap::new(),
            next_inode: AtomicU64::new(ROOT_INODE + 1),
        };

        table.inode_to_key.insert(ROOT_INODE, String::new());
        table.key_to_inode.insert(String::new(), ROOT_INODE);
        table.nodes.insert(
            ROOT_INODE,
            NodeSlot {
                node: Node::Root,
                lookups: 1,
            },
        );

        table
    }

    /// Inode number for a key, allocating one on first sight
    fn inode_for(&self, key: &str) -> u64 {
        if let Some(inode) = self.key_to_inode.get(key) {
            return *inode;
        }

        match self.key_to_inode.entry(key.to_string()) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                let inode = self.next_inode.fetch_add(1, Ordering::SeqCst);
                self.inode_to_key.insert(inode, key.to_string());
                v.insert(inode);
                inode
            }
        }
    }

    /// Inode number for a key if one was ever allocated
    pub fn get_inode(&self, key: &str) -> Option<u64> {
        self.key_to_inode.get(key).map(|i| *i)
    }

    /// Inode number to report for a directory entry.
    ///
    /// Keys the kernel already holds keep their number. Anything else gets
    /// an unrecorded number, so listing a large directory stores nothing;
    /// the kernel learns the real number from the lookup that follows.
    pub fn listing_inode(&self, key: &str) -> u64 {
        self.get_inode(key)
            .unwrap_or_else(|| self.next_inode.fetch_add(1, Ordering::SeqCst))
    }

    /// Record a successful lookup of `node` and return its inode.
    ///
    /// A fresh resolution replaces any node previously stored for the same
    /// key, so the kernel always sees the latest classification and size.
    pub fn remember(&self, node: Node) -> u64 {
        let inode = self.inode_for(node.key());
        match self.nodes.entry(inode) {
            Entry::Occupied(mut o) => {
                let slot = o.get_mut();
                if inode != ROOT_INODE {
                    slot.node = node;
                }
                slot.lookups += 1;
            }
            Entry::Vacant(v) => {
                v.insert(NodeSlot { node, lookups: 1 });
            }
        }
        inode
    }

    /// The node currently held for an inode
    pub fn get_node(&self, inode: u64) -> Option<Node> {
        self.nodes.get(&inode).map(|slot| slot.node.clone())
    }

    /// Drop `nlookup` kernel references. At zero the node and its inode
    /// number are released. The root is never released.
    pub fn forget(&self, inode: u64, nlookup: u64) {
        if inode == ROOT_INODE {
            return;
        }
        if let Entry::Occupied(mut o) = self.nodes.entry(inode) {
            let slot = o.get_mut();
            slot.lookups = slot.lookups.saturating_sub(nlookup);
            if slot.lookups == 0 {
                o.remove();
                if let Some((_, key)) = self.inode_to_key.remove(&inode) {
                    self.key_to_inode.remove_if(&key, |_, i| *i == inode);
                }
            }
        }
    }

    /// Number of nodes currently held, including the root
    pub fn live_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of keys with an inode number, including the root
    pub fn numbered_keys(&self) -> usize {
        self.key_to_inode.len()
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
