// src/enumerate.rs
//
// Local tree enumeration for uploads. Walks a root directory and yields one
// `UploadItem` per regular file, keyed by its forward-slash relative path.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use crate::error::{SyncError, SyncResult};
use crate::types::{ArtifactKey, UploadItem};

/// A validated upload root. Every call to [`PathEnumerator::iter`] starts a
/// fresh walk, so the sequence can be replayed.
#[derive(Debug, Clone)]
pub struct PathEnumerator {
    root: PathBuf,
    prefix: Option<String>,
}

impl PathEnumerator {
    /// Fails with `InvalidPath` if `root` does not exist.
    pub fn new(root: impl AsRef<Path>, prefix: Option<&str>) -> SyncResult<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            return Err(SyncError::InvalidPath(root));
        }
        Ok(Self { root, prefix: prefix.map(str::to_string) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn iter(&self) -> FileWalk<'_> {
        FileWalk { enumerator: self, pending_dirs: vec![self.root.clone()], current: None, started: false }
    }

    /// Convenience: drain the walk, failing on the first unreadable entry.
    pub fn collect_items(&self) -> SyncResult<Vec<UploadItem>> {
        self.iter().collect()
    }

    fn item_for(&self, path: PathBuf) -> UploadItem {
        let key = if path == self.root {
            // root is a single file
            let name = path.file_name().map(PathBuf::from).unwrap_or_default();
            ArtifactKey::from_relative_path(self.prefix.as_deref(), &name)
        } else {
            let relative = path.strip_prefix(&self.root).unwrap_or(&path);
            ArtifactKey::from_relative_path(self.prefix.as_deref(), relative)
        };
        UploadItem { local_path: path, key }
    }
}

impl<'a> IntoIterator for &'a PathEnumerator {
    type Item = SyncResult<UploadItem>;
    type IntoIter = FileWalk<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy depth-first walk over an explicit stack of pending directories.
pub struct FileWalk<'a> {
    enumerator: &'a PathEnumerator,
    pending_dirs: Vec<PathBuf>,
    current: Option<fs::ReadDir>,
    started: bool,
}

impl Iterator for FileWalk<'_> {
    type Item = SyncResult<UploadItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            let root = &self.enumerator.root;
            if root.is_file() {
                self.pending_dirs.clear();
                return Some(Ok(self.enumerator.item_for(root.clone())));
            }
        }

        loop {
            if let Some(entries) = self.current.as_mut() {
                match entries.next() {
                    Some(Ok(entry)) => {
                        let path = entry.path();
                        let file_type = match entry.file_type() {
                            Ok(ft) => ft,
                            Err(e) => return Some(Err(e.into())),
                        };
                        if file_type.is_dir() {
                            self.pending_dirs.push(path);
                            continue;
                        }
                        if file_type.is_symlink() {
                            // never descend through a link; only file targets are yielded
                            match fs::metadata(&path) {
                                Ok(md) if md.is_dir() => {
                                    debug!("not following directory link {:?}", path);
                                    continue;
                                }
                                Ok(md) if !md.is_file() => continue,
                                Ok(_) => {}
                                Err(e) => {
                                    // yielded anyway so the upload reports it
                                    warn!("unresolvable link {:?}: {}", path, e);
                                }
                            }
                        } else if !file_type.is_file() {
                            continue;
                        }
                        trace!("enumerated {:?}", path);
                        return Some(Ok(self.enumerator.item_for(path)));
                    }
                    Some(Err(e)) => return Some(Err(e.into())),
                    None => self.current = None,
                }
            }

            let dir = self.pending_dirs.pop()?;
            match fs::read_dir(&dir) {
                Ok(rd) => self.current = Some(rd),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
