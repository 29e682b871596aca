//! Inode ↔ path ↔ node mapping for the FUSE adapter
//!
//! FUSE identifies everything by 64-bit inode numbers. Paths get a stable
//! inode the first time they are seen; the node for an inode is whatever the
//! most recent lookup or create produced for that path. Nodes are counted per
//! reply handed to the kernel and dropped once the kernel forgets them all.

use std::collections::HashMap;

use crate::node::Node;
use crate::remote::clean_path;

#[derive(Debug)]
pub struct InodeTable {
    path_to_inode: HashMap<String, u64>,
    inode_to_path: HashMap<u64, String>,
    nodes: HashMap<u64, Node>,
    /// Outstanding kernel references per inode
    lookups: HashMap<u64, u64>,
    /// Starts at 2, 1 is root
    next_inode: u64,
}

impl InodeTable {
    /// Root inode number (always 1 in FUSE)
    pub const ROOT_INODE: u64 = 1;

    pub fn new(root: Node) -> Self {
        let mut table = Self {
            path_to_inode: HashMap::new(),
            inode_to_path: HashMap::new(),
            nodes: HashMap::new(),
            lookups: HashMap::new(),
            next_inode: 2,
        };

        table.path_to_inode.insert("/".to_string(), Self::ROOT_INODE);
        table.inode_to_path.insert(Self::ROOT_INODE, "/".to_string());
        table.nodes.insert(Self::ROOT_INODE, root);

        table
    }

    /// Get or allocate the inode for a path.
    pub fn get_or_create(&mut self, path: &str) -> u64 {
        let normalized = clean_path(path);

        if let Some(&inode) = self.path_to_inode.get(&normalized) {
            return inode;
        }

        let inode = self.next_inode;
        self.next_inode += 1;
        self.path_to_inode.insert(normalized.clone(), inode);
        self.inode_to_path.insert(inode, normalized);
        inode
    }

    /// Record `node` as the current node for its path and return its inode.
    /// Counts as one kernel reference.
    pub fn insert(&mut self, node: Node) -> u64 {
        let inode = self.get_or_create(node.path());
        self.nodes.insert(inode, node);
        *self.lookups.entry(inode).or_insert(0) += 1;
        inode
    }

    /// Release `nlookup` kernel references. Returns true when the inode was
    /// dropped. The root is never dropped.
    pub fn forget(&mut self, inode: u64, nlookup: u64) -> bool {
        if inode == Self::ROOT_INODE {
            return false;
        }
        let Some(count) = self.lookups.get_mut(&inode) else {
            return false;
        };
        *count = count.saturating_sub(nlookup);
        if *count > 0 {
            return false;
        }

        self.lookups.remove(&inode);
        self.nodes.remove(&inode);
        if let Some(path) = self.inode_to_path.remove(&inode) {
            self.path_to_inode.remove(&path);
        }
        true
    }

    pub fn lookup_count(&self, inode: u64) -> u64 {
        self.lookups.get(&inode).copied().unwrap_or(0)
    }

    pub fn node(&self, inode: u64) -> Option<&Node> {
        self.nodes.get(&inode)
    }

    pub fn get_inode(&self, path: &str) -> Option<u64> {
        self.path_to_inode.get(&clean_path(path)).copied()
    }

    pub fn get_path(&self, inode: u64) -> Option<&str> {
        self.inode_to_path.get(&inode).map(String::as_str)
    }

    /// Drop the mapping and cached node for a path that no longer exists.
    pub fn remove_by_path(&mut self, path: &str) -> Option<u64> {
        let normalized = clean_path(path);
        let inode = self.path_to_inode.remove(&normalized)?;
        self.inode_to_path.remove(&inode);
        self.nodes.remove(&inode);
        self.lookups.remove(&inode);
        Some(inode)
    }
}
