//! Inode to path mapping for the FUSE filesystem
//!
//! FUSE identifies files by inode, the grid store by filename.

use std::collections::HashMap;

/// Bidirectional mapping between inodes and absolute paths
#[derive(Debug)]
pub struct InodeTable {
    path_to_inode: HashMap<String, u64>,
    inode_to_path: HashMap<u64, String>,
    next_inode: u64,
}

impl InodeTable {
    pub const ROOT_INODE: u64 = 1;

    /// Create a new inode table with the root directory at inode 1
    pub fn new() -> Self {
        let mut table = Self {
            path_to_inode: HashMap::new(),
            inode_to_path: HashMap::new(),
            next_inode: Self::ROOT_INODE + 1,
        };
        table.path_to_inode.insert("/".to_string(), Self::ROOT_INODE);
        table.inode_to_path.insert(Self::ROOT_INODE, "/".to_string());
        table
    }

    /// Get inode for a path, creating one if it doesn't exist
    pub fn get_or_create(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.path_to_inode.get(path) {
            return ino;
        }

        let ino = self.next_inode;
        self.next_inode += 1;
        self.path_to_inode.insert(path.to_string(), ino);
        self.inode_to_path.insert(ino, path.to_string());
        ino
    }

    pub fn get_inode(&self, path: &str) -> Option<u64> {
        self.path_to_inode.get(path).copied()
    }

    pub fn get_path(&self, inode: u64) -> Option<&str> {
        self.inode_to_path.get(&inode).map(String::as_str)
    }

    /// Drop the mapping of a deleted path
    pub fn remove_by_path(&mut self, path: &str) {
        if let Some(ino) = self.path_to_inode.remove(path) {
            self.inode_to_path.remove(&ino);
        }
    }

    /// Absolute path of `name` inside directory `parent`
    pub fn child_path(parent: &str, name: &str) -> String {
        if parent == "/" {
            format!("/{}", name)
        } else {
            format!("{}/{}", parent, name)
        }
    }

    /// Parent directory of an absolute path; the root is its own parent
    pub fn parent_path(path: &str) -> String {
        match path.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(idx) => path[..idx].to_string(),
        }
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_is_inode_one() {
        let table = InodeTable::new();
        assert_eq!(table.get_inode("/"), Some(InodeTable::ROOT_INODE));
        assert_eq!(table.get_path(1), Some("/"));
    }

    #[test]
    fn test_get_or_create_is_stable() {
        let mut table = InodeTable::new();
        let a = table.get_or_create("/a");
        let b = table.get_or_create("/a/b");
        assert_ne!(a, b);
        assert_eq!(table.get_or_create("/a"), a);
        assert_eq!(table.get_path(b), Some("/a/b"));

        table.remove_by_path("/a/b");
        assert_eq!(table.get_inode("/a/b"), None);
        assert_eq!(table.get_path(b), None);
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(InodeTable::child_path("/", "a"), "/a");
        assert_eq!(InodeTable::child_path("/a", "b"), "/a/b");
        assert_eq!(InodeTable::parent_path("/a/b"), "/a");
        assert_eq!(InodeTable::parent_path("/a"), "/");
        assert_eq!(InodeTable::parent_path("/"), "/");
    }
}
