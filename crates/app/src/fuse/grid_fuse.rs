//! FUSE filesystem over a grid store
//!
//! Implements the fuser::Filesystem trait. Every open file is a
//! [`GridFile`]; directories are implied by `/`-separated filenames.

use std::collections::{BTreeMap, HashMap};
use std::ffi::OsStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use grid_store::{GridFileRecord, GridStore};
use parking_lot::RwLock;
use tokio::runtime::Handle;

use crate::config::CacheConfig;
use crate::file::{FileError, GridFile, UpdateListener};
use crate::fuse::cache::MetadataCache;
use crate::fuse::inode_table::InodeTable;

/// Mount-wide settings for [`GridFuse`]
#[derive(Debug, Clone)]
pub struct GridFuseConfig {
    /// Chunk size for files written through the mount
    pub chunk_size: u64,
    pub read_only: bool,
    pub cache: CacheConfig,
}

/// What a path resolves to
#[derive(Debug, Clone)]
enum Node {
    File(GridFileRecord),
    Dir,
}

/// FUSE filesystem for a grid store
pub struct GridFuse {
    /// Tokio runtime handle for async operations
    rt: Handle,
    store: Arc<dyn GridStore>,
    inodes: RwLock<InodeTable>,
    /// Open files: file handle → file
    handles: RwLock<HashMap<u64, GridFile>>,
    cache: Arc<MetadataCache>,
    chunk_size: u64,
    read_only: bool,
    next_fh: AtomicU64,
}

impl GridFuse {
    /// Default TTL for FUSE attributes
    const ATTR_TTL: Duration = Duration::from_secs(1);

    /// Block size for FUSE
    const BLOCK_SIZE: u32 = 512;

    pub fn new(rt: Handle, store: Arc<dyn GridStore>, config: GridFuseConfig) -> Self {
        Self {
            rt,
            store,
            inodes: RwLock::new(InodeTable::new()),
            handles: RwLock::new(HashMap::new()),
            cache: Arc::new(MetadataCache::new(&config.cache)),
            chunk_size: config.chunk_size,
            read_only: config.read_only,
            next_fh: AtomicU64::new(1),
        }
    }

    fn next_handle(&self) -> u64 {
        self.next_fh.fetch_add(1, Ordering::SeqCst)
    }

    fn listener(&self) -> Arc<dyn UpdateListener> {
        self.cache.clone()
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.inodes.read().get_path(ino).map(str::to_string)
    }

    fn make_attr(ino: u64, node: &Node) -> FileAttr {
        let (kind, size, mtime, perm) = match node {
            Node::Dir => (FileType::Directory, 0, UNIX_EPOCH, 0o755),
            Node::File(record) => {
                let mtime =
                    UNIX_EPOCH + Duration::from_millis(u64::try_from(record.upload_date).unwrap_or(0));
                (FileType::RegularFile, record.length, mtime, 0o644)
            }
        };

        FileAttr {
            ino,
            size,
            blocks: size.div_ceil(Self::BLOCK_SIZE as u64),
            atime: mtime,
            mtime,
            ctime: mtime,
            crtime: mtime,
            kind,
            perm,
            nlink: 1,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            rdev: 0,
            blksize: Self::BLOCK_SIZE,
            flags: 0,
        }
    }

    /// Resolve a path to a file record or an implied directory.
    fn resolve(&self, path: &str) -> Result<Option<Node>, FileError> {
        if path == "/" {
            return Ok(Some(Node::Dir));
        }
        if let Some(record) = self.cache.get(path) {
            return Ok(Some(Node::File(record)));
        }

        if let Some(record) = self.rt.block_on(self.store.find_file(path))? {
            self.cache.put(path, record.clone());
            return Ok(Some(Node::File(record)));
        }

        let prefix = format!("{}/", path);
        let files = self.rt.block_on(self.store.list_files())?;
        if files.iter().any(|f| f.filename.starts_with(&prefix)) {
            return Ok(Some(Node::Dir));
        }
        Ok(None)
    }

    /// Children of directory `path`: name → file record, or `None` for a subdirectory.
    fn list_dir(&self, path: &str) -> Result<BTreeMap<String, Option<GridFileRecord>>, FileError> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };

        let mut children = BTreeMap::new();
        for record in self.rt.block_on(self.store.list_files())? {
            let Some(rest) = record.filename.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) if !dir.is_empty() => {
                    children.entry(dir.to_string()).or_insert(None);
                }
                Some(_) => {}
                None if !rest.is_empty() => {
                    self.cache.put(&record.filename, record.clone());
                    children.insert(rest.to_string(), Some(record));
                }
                None => {}
            }
        }
        Ok(children)
    }

    fn lookup_child(&self, parent: u64, name: &OsStr) -> Result<String, libc::c_int> {
        let name = name.to_str().ok_or(libc::EINVAL)?;
        let parent_path = self.path_of(parent).ok_or(libc::ENOENT)?;
        Ok(InodeTable::child_path(&parent_path, name))
    }

    fn reply_error(path: &str, op: &str, e: &FileError) -> libc::c_int {
        match e {
            FileError::NonPrefixWrite { .. } | FileError::NotFound(_) => {
                tracing::warn!(path, op, error = %e, "FUSE request rejected");
            }
            _ => tracing::error!(path, op, error = %e, "FUSE request failed"),
        }
        e.errno()
    }

    /// Apply a size change requested through setattr.
    fn handle_truncate(&self, path: &str, size: u64, fh: Option<u64>) -> Result<(), libc::c_int> {
        let record = match self.resolve(path) {
            Ok(Some(Node::File(record))) => record,
            Ok(Some(Node::Dir)) => return Err(libc::EISDIR),
            Ok(None) => return Err(libc::ENOENT),
            Err(e) => return Err(Self::reply_error(path, "truncate", &e)),
        };

        if size == record.length {
            return Ok(());
        }
        if size != 0 {
            // Chunks are immutable; only a whole-file reset is expressible
            tracing::warn!(path, size, "truncate to non-zero size not supported");
            return Err(libc::ENOTSUP);
        }

        let mut handles = self.handles.write();
        let result = match fh.and_then(|fh| handles.get_mut(&fh)) {
            Some(file) => self.rt.block_on(file.truncate()),
            None => {
                let mut file =
                    GridFile::open_read(path, self.store.clone()).with_listener(self.listener());
                self.rt.block_on(file.truncate())
            }
        };
        result.map_err(|e| Self::reply_error(path, "truncate", &e))
    }
}

impl Filesystem for GridFuse {
    fn init(
        &mut self,
        _req: &Request<'_>,
        _config: &mut fuser::KernelConfig,
    ) -> Result<(), libc::c_int> {
        tracing::info!(
            read_only = self.read_only,
            chunk_size = self.chunk_size,
            "FUSE filesystem initialized"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        let open = self.handles.write().drain().count();
        self.cache.invalidate_all();
        tracing::info!(open_handles = open, "FUSE filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let path = match self.lookup_child(parent, name) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        match self.resolve(&path) {
            Ok(Some(node)) => {
                let ino = self.inodes.write().get_or_create(&path);
                reply.entry(&Self::ATTR_TTL, &Self::make_attr(ino, &node), 0);
            }
            Ok(None) => reply.error(libc::ENOENT),
            Err(e) => reply.error(Self::reply_error(&path, "lookup", &e)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.resolve(&path) {
            Ok(Some(node)) => reply.attr(&Self::ATTR_TTL, &Self::make_attr(ino, &node)),
            Ok(None) => reply.error(libc::ENOENT),
            Err(e) => reply.error(Self::reply_error(&path, "getattr", &e)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        if let Some(new_size) = size {
            if self.read_only {
                reply.error(libc::EROFS);
                return;
            }
            if let Err(e) = self.handle_truncate(&path, new_size, fh) {
                reply.error(e);
                return;
            }
        }

        // Timestamps come from the store's upload date; other changes are ignored
        match self.resolve(&path) {
            Ok(Some(node)) => reply.attr(&Self::ATTR_TTL, &Self::make_attr(ino, &node)),
            Ok(None) => reply.error(libc::ENOENT),
            Err(e) => reply.error(Self::reply_error(&path, "setattr", &e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let children = match self.list_dir(&path) {
            Ok(c) => c,
            Err(e) => {
                reply.error(Self::reply_error(&path, "readdir", &e));
                return;
            }
        };

        let mut entries: Vec<(u64, FileType, String)> = Vec::with_capacity(children.len() + 2);
        entries.push((ino, FileType::Directory, ".".to_string()));
        let parent_ino = if ino == InodeTable::ROOT_INODE {
            ino
        } else {
            self.inodes
                .write()
                .get_or_create(&InodeTable::parent_path(&path))
        };
        entries.push((parent_ino, FileType::Directory, "..".to_string()));

        {
            let mut inodes = self.inodes.write();
            for (name, record) in children {
                let child_ino = inodes.get_or_create(&InodeTable::child_path(&path, &name));
                let kind = match record {
                    Some(_) => FileType::RegularFile,
                    None => FileType::Directory,
                };
                entries.push((child_ino, kind, name));
            }
        }

        for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            if reply.add(ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.resolve(&path) {
            Ok(Some(Node::File(_))) => {}
            Ok(Some(Node::Dir)) => {
                reply.error(libc::EISDIR);
                return;
            }
            Ok(None) => {
                reply.error(libc::ENOENT);
                return;
            }
            Err(e) => {
                reply.error(Self::reply_error(&path, "open", &e));
                return;
            }
        }

        let writable = (flags & libc::O_ACCMODE) != libc::O_RDONLY;
        if writable && self.read_only {
            reply.error(libc::EROFS);
            return;
        }

        let file = if writable {
            GridFile::open_write(path.as_str(), self.store.clone(), self.chunk_size)
        } else {
            GridFile::open_read(path.as_str(), self.store.clone())
        }
        .with_listener(self.listener());

        let fh = self.next_handle();
        tracing::debug!(path = %path, fh, writable, "opened file");
        self.handles.write().insert(fh, file);
        reply.opened(fh, 0);
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        if self.read_only {
            reply.error(libc::EROFS);
            return;
        }

        let path = match self.lookup_child(parent, name) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        // Commit an empty version right away so the name exists for lookups
        let mut file = GridFile::open_write(path.as_str(), self.store.clone(), self.chunk_size)
            .with_listener(self.listener());
        if let Err(e) = self.rt.block_on(file.store()) {
            reply.error(Self::reply_error(&path, "create", &e));
            return;
        }

        let node = match self.resolve(&path) {
            Ok(Some(node)) => node,
            Ok(None) => {
                reply.error(libc::EIO);
                return;
            }
            Err(e) => {
                reply.error(Self::reply_error(&path, "create", &e));
                return;
            }
        };

        let ino = self.inodes.write().get_or_create(&path);
        let fh = self.next_handle();
        self.handles.write().insert(fh, file);
        reply.created(&Self::ATTR_TTL, &Self::make_attr(ino, &node), 0, fh, flags as u32);
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let handles = self.handles.read();
        let Some(file) = handles.get(&fh) else {
            reply.error(libc::EBADF);
            return;
        };
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };

        let mut buf = vec![0u8; size as usize];
        match self.rt.block_on(file.read(&mut buf, offset)) {
            Ok(n) => reply.data(&buf[..n]),
            Err(e) => reply.error(Self::reply_error(file.path(), "read", &e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        if self.read_only {
            reply.error(libc::EROFS);
            return;
        }

        let mut handles = self.handles.write();
        let Some(file) = handles.get_mut(&fh) else {
            reply.error(libc::EBADF);
            return;
        };
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };

        match file.write(data, offset) {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(Self::reply_error(file.path(), "write", &e)),
        }
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        let mut handles = self.handles.write();
        let Some(file) = handles.get_mut(&fh) else {
            reply.error(libc::EBADF);
            return;
        };

        if !file.is_dirty() {
            reply.ok();
            return;
        }

        match self.rt.block_on(file.store()) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(Self::reply_error(file.path(), "flush", &e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        // Dropping the handle unmaps any staging memory
        if let Some(file) = self.handles.write().remove(&fh) {
            tracing::debug!(path = file.path(), fh, "released file");
        }
        reply.ok();
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        if self.read_only {
            reply.error(libc::EROFS);
            return;
        }

        let path = match self.lookup_child(parent, name) {
            Ok(p) => p,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        match self.rt.block_on(self.store.remove_file(&path)) {
            Ok(true) => {
                self.inodes.write().remove_by_path(&path);
                self.cache.invalidate(&path);
                reply.ok();
            }
            Ok(false) => reply.error(libc::ENOENT),
            Err(e) => reply.error(Self::reply_error(&path, "unlink", &FileError::from(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_store::GridFs;

    fn setup(files: &[(&str, &str)]) -> (tokio::runtime::Runtime, GridFuse) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let store = rt.block_on(async {
            let store = GridFs::new_ephemeral(4).await.unwrap();
            for (name, data) in files {
                store
                    .store_file(name, data.as_bytes(), "text/plain")
                    .await
                    .unwrap();
            }
            store
        });
        let fs = GridFuse::new(
            rt.handle().clone(),
            Arc::new(store),
            GridFuseConfig {
                chunk_size: 4,
                read_only: false,
                cache: CacheConfig::default(),
            },
        );
        (rt, fs)
    }

    #[test]
    fn test_resolve_files_and_implied_dirs() {
        let (_rt, fs) = setup(&[("/a.txt", "abc"), ("/docs/b.txt", "b"), ("/docs/deep/c", "")]);

        assert!(matches!(fs.resolve("/"), Ok(Some(Node::Dir))));
        assert!(matches!(fs.resolve("/a.txt"), Ok(Some(Node::File(r))) if r.length == 3));
        assert!(matches!(fs.resolve("/docs"), Ok(Some(Node::Dir))));
        assert!(matches!(fs.resolve("/docs/deep"), Ok(Some(Node::Dir))));
        assert!(matches!(fs.resolve("/doc"), Ok(None)));
        assert!(matches!(fs.resolve("/missing"), Ok(None)));
    }

    #[test]
    fn test_list_dir() {
        let (_rt, fs) = setup(&[("/a.txt", "abc"), ("/docs/b.txt", "b"), ("/docs/deep/c", "")]);

        let root = fs.list_dir("/").unwrap();
        let names: Vec<_> = root.keys().cloned().collect();
        assert_eq!(names, vec!["a.txt".to_string(), "docs".to_string()]);
        assert!(root["a.txt"].is_some());
        assert!(root["docs"].is_none());

        let docs = fs.list_dir("/docs").unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs["b.txt"].is_some());
        assert!(docs["deep"].is_none());
    }

    #[test]
    fn test_handle_truncate_rules() {
        let (rt, fs) = setup(&[("/a.txt", "abcdefg"), ("/docs/b", "b")]);

        assert_eq!(fs.handle_truncate("/a.txt", 3, None), Err(libc::ENOTSUP));
        assert_eq!(fs.handle_truncate("/a.txt", 7, None), Ok(()));
        assert_eq!(fs.handle_truncate("/docs", 0, None), Err(libc::EISDIR));
        assert_eq!(fs.handle_truncate("/nope", 0, None), Err(libc::ENOENT));

        assert_eq!(fs.handle_truncate("/a.txt", 0, None), Ok(()));
        let record = rt.block_on(fs.store.find_file("/a.txt")).unwrap().unwrap();
        assert_eq!(record.length, 0);
        // The listener dropped the stale cached record
        assert!(matches!(fs.resolve("/a.txt"), Ok(Some(Node::File(r))) if r.length == 0));
    }

    #[test]
    fn test_handle_truncate_through_open_handle() {
        let (_rt, fs) = setup(&[("/a.txt", "abcdefg")]);

        let file = GridFile::open_read("/a.txt", fs.store.clone()).with_listener(fs.listener());
        fs.handles.write().insert(7, file);

        assert_eq!(fs.handle_truncate("/a.txt", 0, Some(7)), Ok(()));
        let handles = fs.handles.read();
        let length = fs.rt.block_on(handles[&7].logical_length()).unwrap();
        assert_eq!(length, 0);
    }

    #[test]
    fn test_make_attr() {
        let record = GridFileRecord {
            id: grid_store::FileId::new(),
            filename: "/a".to_string(),
            length: 1025,
            chunk_size: 4,
            content_type: "text/plain".to_string(),
            upload_date: 1_500,
        };
        let attr = GridFuse::make_attr(9, &Node::File(record));
        assert_eq!(attr.ino, 9);
        assert_eq!(attr.size, 1025);
        assert_eq!(attr.blocks, 3);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.mtime, UNIX_EPOCH + Duration::from_millis(1_500));

        let attr = GridFuse::make_attr(1, &Node::Dir);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.perm, 0o755);
    }

    #[test]
    fn test_destroy_drops_handles_and_cached_metadata() {
        let (_rt, mut fs) = setup(&[("/a.txt", "abc")]);
        assert!(matches!(fs.resolve("/a.txt"), Ok(Some(Node::File(_)))));
        assert!(fs.cache.get("/a.txt").is_some());
        fs.handles
            .write()
            .insert(3, GridFile::open_read("/a.txt", fs.store.clone()));

        fs.destroy();
        assert!(fs.handles.read().is_empty());
        assert!(fs.cache.get("/a.txt").is_none());
    }
}
