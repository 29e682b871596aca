use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;

use super::inode_table::InodeTable;
use crate::node::{
    Attributes, CbfsRoot, CreateFlags, DirNode, FileNode, FsError, FsResult, Node, NodeKind,
};
use crate::remote::{join_path, split_path};

/// How long the kernel may cache attributes and entries.
const TTL: Duration = Duration::from_secs(1);

/// Map a node failure onto the errno the kernel sees.
pub fn errno(err: &FsError) -> c_int {
    match err {
        FsError::NotFound { .. } => libc::ENOENT,
        FsError::NotPermitted { .. } => libc::EPERM,
        FsError::TooLarge { .. } => libc::EFBIG,
        FsError::InvalidName { .. } => libc::EINVAL,
        FsError::Remote { .. }
        | FsError::Unsupported { .. }
        | FsError::Vanished { .. }
        | FsError::NotAFile { .. } => libc::EIO,
    }
}

fn fail(op: &str, err: FsError) -> c_int {
    if err.is_not_found() {
        tracing::debug!("{}: {}", op, err);
    } else {
        tracing::warn!("{}: {}", op, err);
    }
    errno(&err)
}

fn name_str(name: &OsStr) -> Result<&str, c_int> {
    name.to_str().ok_or(libc::EINVAL)
}

/// FUSE filesystem over the cbfs node tree.
pub struct CbfsFs {
    inodes: InodeTable,
    uid: u32,
    gid: u32,
}

impl CbfsFs {
    /// Fetch the root directory and build the adapter around it.
    pub fn new(root: &CbfsRoot) -> FsResult<Self> {
        let dir = root.root()?;
        Ok(Self {
            inodes: InodeTable::new(Node::Dir(dir)),
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        })
    }

    fn node(&self, ino: u64) -> Result<Node, c_int> {
        self.inodes.node(ino).cloned().ok_or(libc::ENOENT)
    }

    fn dir(&self, ino: u64) -> Result<Arc<DirNode>, c_int> {
        match self.node(ino)? {
            Node::Dir(d) => Ok(d),
            Node::File(_) => Err(libc::ENOTDIR),
        }
    }

    fn file(&self, ino: u64) -> Result<Arc<FileNode>, c_int> {
        match self.node(ino)? {
            Node::File(f) => Ok(f),
            Node::Dir(_) => Err(libc::EISDIR),
        }
    }

    fn to_file_attr(&self, ino: u64, attr: &Attributes) -> FileAttr {
        let kind = match attr.kind {
            NodeKind::File => FileType::RegularFile,
            NodeKind::Directory => FileType::Directory,
        };

        FileAttr {
            ino,
            size: attr.size,
            blocks: attr.size.div_ceil(512),
            atime: attr.mtime,
            mtime: attr.mtime,
            ctime: attr.mtime,
            crtime: UNIX_EPOCH,
            kind,
            perm: attr.perm,
            nlink: if kind == FileType::Directory { 2 } else { 1 },
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }

    /// Register a freshly resolved node and describe it to the kernel.
    fn entry(&mut self, node: Node) -> FsResult<FileAttr> {
        let attr = node.attributes()?;
        let ino = self.inodes.insert(node);
        Ok(self.to_file_attr(ino, &attr))
    }

    fn do_lookup(&mut self, parent: u64, name: &OsStr) -> Result<FileAttr, c_int> {
        let name = name_str(name)?;
        let dir = self.dir(parent)?;
        let node = dir.lookup(name).map_err(|e| fail("lookup", e))?;
        self.entry(node).map_err(|e| fail("lookup", e))
    }

    fn do_getattr(&self, ino: u64) -> Result<FileAttr, c_int> {
        let attr = self
            .node(ino)?
            .attributes()
            .map_err(|e| fail("getattr", e))?;
        Ok(self.to_file_attr(ino, &attr))
    }

    fn do_readdir(&mut self, ino: u64) -> Result<Vec<(u64, FileType, String)>, c_int> {
        let dir = self.dir(ino)?;
        let listed = dir.enumerate().map_err(|e| fail("readdir", e))?;

        let (parent, _) = split_path(dir.path());
        let parent_ino = self.inodes.get_or_create(&parent);
        let mut entries = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_ino, FileType::Directory, "..".to_string()),
        ];
        for entry in listed {
            let child = self.inodes.get_or_create(&join_path(dir.path(), &entry.name));
            let kind = match entry.kind {
                NodeKind::File => FileType::RegularFile,
                NodeKind::Directory => FileType::Directory,
            };
            entries.push((child, kind, entry.name));
        }
        Ok(entries)
    }

    fn do_create(&mut self, parent: u64, name: &OsStr, flags: i32) -> Result<FileAttr, c_int> {
        let name = name_str(name)?;
        let dir = self.dir(parent)?;
        let flags = CreateFlags {
            exclusive: flags & libc::O_EXCL != 0,
            truncate: flags & libc::O_TRUNC != 0,
        };
        let file = dir.create(name, flags).map_err(|e| fail("create", e))?;
        self.entry(Node::File(file)).map_err(|e| fail("create", e))
    }

    fn do_remove(&mut self, op: &str, parent: u64, name: &OsStr) -> Result<(), c_int> {
        let name = name_str(name)?;
        let dir = self.dir(parent)?;
        dir.remove(name).map_err(|e| fail(op, e))?;
        self.inodes.remove_by_path(&join_path(dir.path(), name));
        Ok(())
    }

    fn do_rename(
        &mut self,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
    ) -> Result<(), c_int> {
        let (name, newname) = (name_str(name)?, name_str(newname)?);
        let src = self.dir(parent)?;
        let dest = self.dir(newparent)?;

        src.rename(name, newname, &dest).map_err(|e| fail("rename", e))?;

        self.inodes.remove_by_path(&join_path(src.path(), name));
        self.inodes.remove_by_path(&join_path(dest.path(), newname));
        Ok(())
    }

    fn do_setattr(&mut self, ino: u64, size: Option<u64>) -> Result<FileAttr, c_int> {
        if let Some(size) = size {
            self.file(ino)?
                .set_size(size)
                .map_err(|e| fail("setattr", e))?;
        }
        self.do_getattr(ino)
    }

    fn do_read(&self, ino: u64, offset: i64, size: u32) -> Result<Vec<u8>, c_int> {
        let offset = usize::try_from(offset).map_err(|_| libc::EINVAL)?;
        let content = self.file(ino)?.read().map_err(|e| fail("read", e))?;

        if offset >= content.len() {
            return Ok(Vec::new());
        }
        let end = offset.saturating_add(size as usize).min(content.len());
        Ok(content[offset..end].to_vec())
    }

    fn do_write(&self, ino: u64, offset: i64, data: &[u8]) -> Result<u32, c_int> {
        let offset = usize::try_from(offset).map_err(|_| libc::EINVAL)?;
        let written = self
            .file(ino)?
            .write(offset, data)
            .map_err(|e| fail("write", e))?;
        Ok(written as u32)
    }
}

impl Filesystem for CbfsFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.do_lookup(parent, name) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        if self.inodes.forget(ino, nlookup) {
            tracing::trace!("forget({}) => dropped", ino);
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.do_getattr(ino) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e),
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
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        match self.do_setattr(ino, size) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(e) => reply.error(e),
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
        let entries = match self.do_readdir(ino) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        for (i, (e_ino, kind, name)) in entries.iter().enumerate().skip(offset as usize) {
            if reply.add(*e_ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.file(ino) {
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(e),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.do_read(ino, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.do_write(ino, offset, data) {
            Ok(n) => reply.written(n),
            Err(e) => reply.error(e),
        }
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
        match self.do_create(parent, name, flags) {
            Ok(attr) => reply.created(&TTL, &attr, 0, 0, 0),
            Err(e) => reply.error(e),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self.do_remove("unlink", parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self.do_remove("rmdir", parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        match self.do_rename(parent, name, newparent, newname) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        match self.file(ino).and_then(|f| f.flush().map_err(|e| fail("flush", e))) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }

    fn fsync(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _datasync: bool,
        reply: ReplyEmpty,
    ) {
        match self.file(ino).and_then(|f| f.sync().map_err(|e| fail("fsync", e))) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e),
        }
    }
}
