use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::error::{FsError, FsResult};
use super::file::FileNode;
use super::freshness::Freshness;
use super::{Attributes, Context, Node, NodeKind};
use crate::remote::{clean_path, join_path, DirEntry, DirectoryListing, FileEntry};

/// Flags carried by a create request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateFlags {
    /// Fail if something already exists at the path (`O_EXCL`)
    pub exclusive: bool,
    /// Start from empty content even if the file exists (`O_TRUNC`)
    pub truncate: bool,
}

/// One name from a directory enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub kind: NodeKind,
}

#[derive(Debug)]
struct DirState {
    files: BTreeMap<String, FileEntry>,
    dirs: BTreeMap<String, DirEntry>,
    aggregate_size: u64,
    freshness: Freshness,
}

impl DirState {
    fn from_listing(listing: DirectoryListing) -> Self {
        let aggregate_size = listing.aggregate_size();
        Self {
            files: listing.files,
            dirs: listing.dirs,
            aggregate_size,
            freshness: Freshness::now(),
        }
    }
}

/// A directory on the remote store with its last fetched listing.
#[derive(Debug)]
pub struct DirNode {
    ctx: Arc<Context>,
    path: String,
    state: Mutex<DirState>,
}

impl DirNode {
    /// Fetch the listing for `path` and build a node from it.
    pub fn fetch(ctx: &Arc<Context>, path: &str) -> FsResult<Self> {
        let path = clean_path(path);
        let state = Self::load(ctx, &path)?;
        Ok(Self {
            ctx: ctx.clone(),
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn load(ctx: &Context, path: &str) -> FsResult<DirState> {
        ctx.remote()
            .fetch_listing(path)
            .map(DirState::from_listing)
            .map_err(|e| FsError::remote("list", path, e))
    }

    /// Lock the cached state, refetching it first if it is stale.
    fn fresh_state(&self) -> FsResult<MutexGuard<'_, DirState>> {
        let mut state = self.state.lock();
        if state.freshness.is_stale(self.ctx.settings().stale_after) {
            *state = Self::load(&self.ctx, &self.path)?;
        }
        Ok(state)
    }

    fn invalidate(&self) {
        self.state.lock().freshness.invalidate();
    }

    pub fn attributes(&self) -> FsResult<Attributes> {
        let state = self.fresh_state()?;
        Ok(Attributes {
            kind: NodeKind::Directory,
            perm: 0o755,
            size: state.aggregate_size,
            mtime: state.freshness.fetched_wall(),
        })
    }

    /// Resolve `name` against a freshly fetched listing.
    pub fn lookup(&self, name: &str) -> FsResult<Node> {
        self.invalidate();
        let (is_file, is_dir) = {
            let state = self.fresh_state()?;
            (state.files.contains_key(name), state.dirs.contains_key(name))
        };
        let path = join_path(&self.path, name);

        if is_file {
            return match self.ctx.remote().fetch_blob(&path) {
                Ok(blob) => Ok(Node::File(Arc::new(FileNode::new(
                    self.ctx.clone(),
                    path,
                    blob.data,
                    blob.modified,
                )))),
                // Listed but gone by the time we asked for it.
                Err(e) if e.is_not_found() => {
                    tracing::warn!("lookup({:?}) => {}", path, e);
                    Err(FsError::not_found(&path))
                }
                Err(e) => Err(FsError::remote("lookup", &path, e)),
            };
        }
        if is_dir {
            return DirNode::fetch(&self.ctx, &path).map(|d| Node::Dir(Arc::new(d)));
        }
        Err(FsError::not_found(&path))
    }

    /// Names of every subdirectory and file. The next access refetches.
    pub fn enumerate(&self) -> FsResult<Vec<Entry>> {
        let mut state = self.fresh_state()?;

        let dirs = state.dirs.keys().map(|name| Entry {
            name: name.clone(),
            kind: NodeKind::Directory,
        });
        let files = state.files.keys().map(|name| Entry {
            name: name.clone(),
            kind: NodeKind::File,
        });
        let entries = dirs.chain(files).collect();

        state.freshness.invalidate();
        Ok(entries)
    }

    /// Path of a direct child. Names that would resolve elsewhere are refused.
    fn child_path(&self, op: &'static str, name: &str) -> FsResult<String> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            tracing::warn!("{}({:?}) => invalid name {:?}", op, self.path, name);
            return Err(FsError::InvalidName {
                op,
                name: name.to_string(),
            });
        }
        Ok(join_path(&self.path, name))
    }

    pub fn create(&self, name: &str, flags: CreateFlags) -> FsResult<Arc<FileNode>> {
        self.ctx.ensure_writable("create")?;
        let path = self.child_path("create", name)?;

        if !flags.exclusive && !flags.truncate {
            match self.lookup(name) {
                Ok(Node::File(existing)) => return Ok(existing),
                Ok(Node::Dir(_)) => {
                    return Err(FsError::NotAFile {
                        op: "create",
                        path,
                    })
                }
                Err(_) => {}
            }
        }

        self.ctx
            .remote()
            .put_blob(&path, Vec::new(), flags.exclusive)
            .map_err(|e| FsError::remote("create", &path, e))?;

        self.invalidate();
        Ok(Arc::new(FileNode::empty(self.ctx.clone(), path)))
    }

    pub fn remove(&self, name: &str) -> FsResult<()> {
        self.ctx.ensure_writable("remove")?;
        let path = self.child_path("remove", name)?;

        self.ctx
            .remote()
            .delete_blob(&path)
            .map_err(|e| FsError::remote("remove", &path, e))?;

        self.invalidate();
        Ok(())
    }

    /// Move a file by copying it to `dest/new_name` and deleting the
    /// source. A failure after the copy leaves both in place.
    pub fn rename(&self, old_name: &str, new_name: &str, dest: &DirNode) -> FsResult<()> {
        self.ctx.ensure_writable("rename")?;
        self.child_path("rename", old_name)?;
        dest.child_path("rename", new_name)?;
        if self.path == dest.path && old_name == new_name {
            return Ok(());
        }

        drop(self.fresh_state()?);

        match self.lookup(old_name)? {
            Node::File(file) => {
                let target = dest.create(new_name, CreateFlags::default())?;
                let content = file.read()?;
                target.write_all(content.to_vec())?;
                self.remove(old_name)
            }
            Node::Dir(dir) => {
                tracing::warn!("rename({:?}) => directories cannot be renamed", dir.path());
                Err(FsError::Unsupported {
                    op: "rename",
                    path: dir.path().to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::context;
    use crate::remote::memory::{Call, MemoryRemote};

    fn store() -> Arc<MemoryRemote> {
        Arc::new(
            MemoryRemote::new()
                .with_file("/a/x.txt", b"hello")
                .with_file("/a/y.txt", b"world!!")
                .with_file("/a/sub/z.bin", &[0u8; 100])
                .with_file("/a/sub/deeper/w", &[1u8; 20]),
        )
    }

    #[test]
    fn test_aggregate_size_after_refresh() {
        let remote = store();
        let ctx = context(&remote, false);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();

        let attr = dir.attributes().unwrap();
        assert_eq!(attr.kind, NodeKind::Directory);
        assert_eq!(attr.perm, 0o755);
        assert_eq!(attr.size, 5 + 7 + 120);
    }

    #[test]
    fn test_attributes_refresh_only_when_stale() {
        let remote = store();
        let ctx = context(&remote, false);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();
        remote.clear_calls();

        dir.attributes().unwrap();
        assert_eq!(remote.list_count(), 0);

        remote.insert("/a/new.txt", b"123");
        dir.invalidate();
        assert_eq!(dir.attributes().unwrap().size, 5 + 7 + 120 + 3);
        assert_eq!(remote.list_count(), 1);
    }

    #[test]
    fn test_empty_listing_is_empty_directory() {
        let remote = Arc::new(MemoryRemote::new());
        let ctx = context(&remote, false);
        let dir = DirNode::fetch(&ctx, "/nothing/here/").unwrap();

        assert_eq!(dir.path(), "/nothing/here");
        assert_eq!(dir.attributes().unwrap().size, 0);
        assert!(dir.enumerate().unwrap().is_empty());
    }

    #[test]
    fn test_lookup_file() {
        let remote = store();
        let ctx = context(&remote, false);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();
        remote.clear_calls();

        let Node::File(file) = dir.lookup("x.txt").unwrap() else {
            panic!("expected a file");
        };
        assert_eq!(file.path(), "/a/x.txt");
        assert_eq!(file.attributes().size, 5);
        assert_eq!(file.read().unwrap().as_slice(), b"hello");
        assert_eq!(
            remote.calls(),
            vec![Call::List("/a".into()), Call::Get("/a/x.txt".into())]
        );
    }

    #[test]
    fn test_lookup_always_refreshes() {
        let remote = store();
        let ctx = context(&remote, false);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();
        remote.clear_calls();

        dir.lookup("y.txt").unwrap();
        dir.lookup("y.txt").unwrap();
        assert_eq!(remote.list_count(), 2);
    }

    #[test]
    fn test_lookup_directory() {
        let remote = store();
        let ctx = context(&remote, false);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();

        let Node::Dir(sub) = dir.lookup("sub").unwrap() else {
            panic!("expected a directory");
        };
        assert_eq!(sub.path(), "/a/sub");
        assert_eq!(sub.attributes().unwrap().size, 120);
    }

    #[test]
    fn test_lookup_missing() {
        let remote = store();
        let ctx = context(&remote, false);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();

        let err = dir.lookup("nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_lookup_listed_but_unretrievable_is_not_found() {
        let remote = store();
        remote.insert_ghost("/a/ghost", 42);
        let ctx = context(&remote, false);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();

        assert_eq!(dir.attributes().unwrap().size, 5 + 7 + 120 + 42);
        assert!(dir.lookup("ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn test_lookup_refresh_failure_is_io() {
        let remote = store();
        let ctx = context(&remote, false);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();
        remote.set_offline(true);

        let err = dir.lookup("x.txt").unwrap_err();
        assert!(matches!(err, FsError::Remote { op: "list", .. }));
    }

    #[test]
    fn test_enumerate_lists_dirs_then_files() {
        let remote = store();
        let ctx = context(&remote, false);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();

        let entries = dir.enumerate().unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["sub", "x.txt", "y.txt"]);
        assert_eq!(entries[0].kind, NodeKind::Directory);
        assert_eq!(entries[1].kind, NodeKind::File);
    }

    #[test]
    fn test_enumerate_twice_refreshes_once() {
        let remote = store();
        let ctx = context(&remote, false);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();
        remote.clear_calls();

        dir.enumerate().unwrap();
        assert_eq!(remote.list_count(), 0);
        dir.enumerate().unwrap();
        assert_eq!(remote.list_count(), 1);
    }

    #[test]
    fn test_write_ops_disabled_make_no_calls() {
        let remote = store();
        let ctx = context(&remote, false);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();
        let other = DirNode::fetch(&ctx, "/a/sub").unwrap();
        remote.clear_calls();

        assert!(dir
            .create("n.txt", CreateFlags::default())
            .unwrap_err()
            .is_not_permitted());
        assert!(dir.remove("x.txt").unwrap_err().is_not_permitted());
        assert!(dir
            .rename("x.txt", "moved.txt", &other)
            .unwrap_err()
            .is_not_permitted());
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn test_names_outside_the_directory_are_refused() {
        let remote = store();
        let ctx = context(&remote, true);
        let dir = DirNode::fetch(&ctx, "/a/sub").unwrap();
        let parent = DirNode::fetch(&ctx, "/a").unwrap();
        remote.clear_calls();

        for name in ["..", ".", "", "deeper/w"] {
            let err = dir.remove(name).unwrap_err();
            assert!(matches!(err, FsError::InvalidName { op: "remove", .. }));
            let err = dir.create(name, CreateFlags::default()).unwrap_err();
            assert!(matches!(err, FsError::InvalidName { op: "create", .. }));
        }
        let err = parent.rename("x.txt", "..", &dir).unwrap_err();
        assert!(matches!(err, FsError::InvalidName { op: "rename", .. }));

        assert!(remote.calls().is_empty());
        assert_eq!(remote.content("/a/x.txt").unwrap(), b"hello");
    }

    #[test]
    fn test_create_new_file() {
        let remote = store();
        let ctx = context(&remote, true);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();

        let file = dir
            .create(
                "new.txt",
                CreateFlags {
                    exclusive: false,
                    truncate: true,
                },
            )
            .unwrap();
        assert_eq!(file.path(), "/a/new.txt");
        assert_eq!(file.attributes().size, 0);
        assert_eq!(remote.content("/a/new.txt"), Some(Vec::new()));

        // The directory refetches and sees the new file.
        remote.clear_calls();
        let names: Vec<_> = dir.enumerate().unwrap().into_iter().map(|e| e.name).collect();
        assert!(names.contains(&"new.txt".to_string()));
        assert_eq!(remote.list_count(), 1);
    }

    #[test]
    fn test_create_without_truncate_reuses_existing() {
        let remote = store();
        let ctx = context(&remote, true);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();
        remote.clear_calls();

        let file = dir.create("x.txt", CreateFlags::default()).unwrap();
        assert_eq!(file.read().unwrap().as_slice(), b"hello");
        assert!(!remote.calls().iter().any(|c| matches!(c, Call::Put { .. })));
        assert_eq!(remote.content("/a/x.txt").unwrap(), b"hello");
    }

    #[test]
    fn test_create_exclusive_on_existing_fails_without_touching_cache() {
        let remote = store();
        let ctx = context(&remote, true);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();
        remote.clear_calls();

        let err = dir
            .create(
                "x.txt",
                CreateFlags {
                    exclusive: true,
                    truncate: false,
                },
            )
            .unwrap_err();
        assert!(matches!(err, FsError::Remote { op: "create", .. }));
        assert_eq!(remote.content("/a/x.txt").unwrap(), b"hello");

        // Still fresh: no refetch was forced.
        dir.attributes().unwrap();
        assert_eq!(remote.list_count(), 0);
    }

    #[test]
    fn test_remove() {
        let remote = store();
        let ctx = context(&remote, true);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();

        dir.remove("x.txt").unwrap();
        assert_eq!(remote.content("/a/x.txt"), None);
        assert!(dir.lookup("x.txt").unwrap_err().is_not_found());
    }

    #[test]
    fn test_remove_missing_is_io() {
        let remote = store();
        let ctx = context(&remote, true);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();

        let err = dir.remove("absent").unwrap_err();
        assert!(matches!(err, FsError::Remote { op: "remove", .. }));
    }

    #[test]
    fn test_rename_file_across_directories() {
        let remote = store();
        let ctx = context(&remote, true);
        let src = DirNode::fetch(&ctx, "/a").unwrap();
        let dest = DirNode::fetch(&ctx, "/a/sub").unwrap();

        src.rename("x.txt", "moved.txt", &dest).unwrap();

        let Node::File(moved) = dest.lookup("moved.txt").unwrap() else {
            panic!("expected a file");
        };
        assert_eq!(moved.read().unwrap().as_slice(), b"hello");
        assert!(src.lookup("x.txt").unwrap_err().is_not_found());
    }

    #[test]
    fn test_rename_within_directory() {
        let remote = store();
        let ctx = context(&remote, true);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();

        dir.rename("y.txt", "z.txt", &dir).unwrap();
        assert_eq!(remote.content("/a/z.txt").unwrap(), b"world!!");
        assert_eq!(remote.content("/a/y.txt"), None);
    }

    #[test]
    fn test_rename_onto_itself_is_noop() {
        let remote = store();
        let ctx = context(&remote, true);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();
        remote.clear_calls();

        dir.rename("x.txt", "x.txt", &dir).unwrap();
        assert_eq!(remote.content("/a/x.txt").unwrap(), b"hello");
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn test_rename_directory_is_unsupported() {
        let remote = store();
        let ctx = context(&remote, true);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();
        remote.clear_calls();

        let err = dir.rename("sub", "sub2", &dir).unwrap_err();
        assert!(matches!(err, FsError::Unsupported { op: "rename", .. }));
        assert!(!remote
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Put { .. } | Call::Delete(_))));
    }

    #[test]
    fn test_rename_missing_source_is_not_found() {
        let remote = store();
        let ctx = context(&remote, true);
        let dir = DirNode::fetch(&ctx, "/a").unwrap();

        assert!(dir.rename("absent", "b", &dir).unwrap_err().is_not_found());
    }
}
