// src/download.rs
//
// Recursive download walker: mirrors a remote artifact tree into a local
// directory. Sequential by construction; an explicit worklist replaces
// recursion so deep trees cannot exhaust the stack.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::http::HttpTransfer;
use crate::object_store::ArtifactStore;
use crate::progress::ProgressCallback;
use crate::types::{ArtifactEntry, Namespace};

/// A pending file fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadItem {
    pub entry: ArtifactEntry,
    pub destination: PathBuf,
}

/// Counters for a completed walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub files: usize,
    pub folders: usize,
    pub bytes: u64,
}

/// Remote folder still to be listed, paired with its local mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingFolder {
    remote: Option<String>,
    local: PathBuf,
}

/// Local name for an entry. Only the final path component is trusted, so a
/// hostile `file_name` cannot climb out of `dir`.
fn local_child(dir: &Path, entry: &ArtifactEntry) -> SyncResult<PathBuf> {
    let name = Path::new(&entry.file_name)
        .file_name()
        .ok_or_else(|| SyncError::Decode(format!("unusable file name {:?} for {}", entry.file_name, entry.key)))?;
    Ok(dir.join(name))
}

/// Split one listing into sub-folders to visit and files to fetch.
fn plan_listing(entries: Vec<ArtifactEntry>, dir: &Path) -> SyncResult<(Vec<PendingFolder>, Vec<DownloadItem>)> {
    let mut folders = Vec::new();
    let mut files = Vec::new();
    for entry in entries {
        let local = local_child(dir, &entry)?;
        if entry.is_folder() {
            folders.push(PendingFolder { remote: Some(entry.key.to_string()), local });
        } else {
            files.push(DownloadItem { entry, destination: local });
        }
    }
    Ok((folders, files))
}

/// Mirror `ns` (from `start_path`, or the root) into `local_root`. Any
/// listing or fetch failure aborts the walk.
pub async fn download_tree<S>(
    store: &S,
    transfer: &HttpTransfer,
    ns: &Namespace,
    start_path: Option<&str>,
    local_root: &Path,
    progress_callback: Option<&ProgressCallback>,
) -> SyncResult<DownloadStats>
where
    S: ArtifactStore + ?Sized,
{
    info!("Starting download of {}:{} to {:?}", ns, start_path.unwrap_or("/"), local_root);

    let mut stats = DownloadStats::default();
    let mut worklist = vec![PendingFolder {
        remote: start_path.map(str::to_string),
        local: local_root.to_path_buf(),
    }];

    while let Some(folder) = worklist.pop() {
        fs::create_dir_all(&folder.local).await?;
        stats.folders += 1;

        let entries = store.list_entries(ns, folder.remote.as_deref()).await?;
        debug!("{} entries under {}:{}", entries.len(), ns, folder.remote.as_deref().unwrap_or("/"));
        let (sub_folders, files) = plan_listing(entries, &folder.local)?;

        for item in files {
            let url = store.get_download_url(ns, &item.entry.key).await?;
            let bytes = transfer.download_to_file(&url, &item.destination).await?;
            debug!("downloaded {} -> {:?}", item.entry.key, item.destination);
            stats.files += 1;
            stats.bytes += bytes;
            if let Some(progress) = progress_callback {
                progress.file_completed(bytes);
            }
        }

        // reversed so folders are visited in listing order
        worklist.extend(sub_folders.into_iter().rev());
    }

    info!(
        "Finished download of {} file(s), {} bytes to {:?}",
        stats.files, stats.bytes, local_root
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryType;

    fn entry(key: &str, name: &str, kind: EntryType) -> ArtifactEntry {
        ArtifactEntry { key: key.into(), kind, file_name: name.into(), size: None, last_modified: None }
    }

    #[test]
    fn listing_splits_files_and_folders() {
        let dir = Path::new("/tmp/out");
        let (folders, files) = plan_listing(
            vec![
                entry("a", "a", EntryType::Folder),
                entry("e.txt", "e.txt", EntryType::File),
                entry("z", "z", EntryType::Folder),
            ],
            dir,
        )
        .unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].remote.as_deref(), Some("a"));
        assert_eq!(folders[0].local, dir.join("a"));
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].destination, dir.join("e.txt"));
    }

    #[test]
    fn file_names_cannot_escape() {
        let dir = Path::new("/tmp/out");
        let nested = entry("x/y.txt", "x/y.txt", EntryType::File);
        assert_eq!(local_child(dir, &nested).unwrap(), dir.join("y.txt"));
        assert!(local_child(dir, &entry("up", "..", EntryType::Folder)).is_err());
        assert!(local_child(dir, &entry("empty", "", EntryType::File)).is_err());
    }
}
