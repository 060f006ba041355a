// src/archive.rs
//
// Bulk archive fetcher for simulation artifacts. Each category is fetched as
// one tar.gz, written to `<folder>.tar.gz`, unpacked under
// `<folder>/<category>/`, and the archive file removed again. Categories are
// independent: a failure in one is reported and the next one still runs.

use flate2::read::GzDecoder;
use futures::StreamExt;
use std::ffi::OsString;
use std::fmt;
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::constants::{ARCHIVE_SUFFIX, SIMULATION_STATUS_FILE};
use crate::error::{SyncError, SyncResult};
use crate::object_store::{ArtifactStore, ByteStream};
use crate::types::{ArtifactCategory, Namespace, Simulation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryStatus {
    Saved { path: PathBuf, files: usize },
    /// The body was cut off or absent: the category has nothing yet.
    NoFiles,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryOutcome {
    pub category: ArtifactCategory,
    pub status: CategoryStatus,
}

impl CategoryOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self.status, CategoryStatus::Saved { .. })
    }
}

impl fmt::Display for CategoryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            CategoryStatus::Saved { path, .. } => {
                write!(f, "Saved {} files to {}", self.category, path.display())
            }
            CategoryStatus::NoFiles => write!(f, "No {} files found", self.category),
            CategoryStatus::Failed { .. } => write!(f, "Failed to read {}", self.category),
        }
    }
}

/// `<folder>.tar.gz`, next to the extraction folder.
pub fn archive_path_for(folder: &Path) -> PathBuf {
    let mut name: OsString = folder.as_os_str().to_owned();
    name.push(ARCHIVE_SUFFIX);
    PathBuf::from(name)
}

/// Write the stream to `dest`. On any error the partial file is removed.
async fn persist_stream(mut stream: ByteStream, dest: &Path) -> SyncResult<u64> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let result = async {
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok::<u64, SyncError>(written)
    }
    .await;

    if result.is_err() {
        remove_quietly(dest).await;
    }
    result
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("removed {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("failed to remove {:?}: {}", path, e),
    }
}

/// Relative output path for an archive member, or `None` if it must be
/// skipped. A leading `<category>/` directory is stripped so archives rooted
/// either way land in the same place.
fn member_path(raw: &Path, category: ArtifactCategory) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for comp in raw.components() {
        match comp {
            Component::Normal(seg) => parts.push(seg),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.first().is_some_and(|first| *first == category.as_str()) {
        parts.remove(0);
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.iter().collect())
}

/// Unpack a gzip tar into `dest`. Returns the number of regular files
/// written.
pub fn extract_archive(archive: &Path, dest: &Path, category: ArtifactCategory) -> SyncResult<usize> {
    let corrupt = |e: std::io::Error| SyncError::ArchiveCorrupt(format!("{}: {}", archive.display(), e));

    std::fs::create_dir_all(dest)?;
    let file = File::open(archive)?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));

    let mut files = 0usize;
    for entry in tar.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        let raw = entry.path().map_err(corrupt)?.into_owned();
        let Some(rel) = member_path(&raw, category) else {
            debug!("skipping archive member {:?}", raw);
            continue;
        };
        let target = dest.join(&rel);

        let kind = entry.header().entry_type();
        if kind.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if !kind.is_file() {
            debug!("skipping non-file member {:?}", raw);
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        entry.unpack(&target).map_err(corrupt)?;
        files += 1;
    }
    Ok(files)
}

/// Fetch one category. Never returns an error: every failure mode is folded
/// into the outcome, and the intermediate archive is always cleaned up.
pub async fn fetch_category<S>(
    store: &S,
    ns: &Namespace,
    simulation_id: &str,
    category: ArtifactCategory,
    folder: &Path,
) -> CategoryOutcome
where
    S: ArtifactStore + ?Sized,
{
    let archive = archive_path_for(folder);
    let status = fetch_category_inner(store, ns, simulation_id, category, folder, &archive).await;
    remove_quietly(&archive).await;

    let outcome = CategoryOutcome { category, status };
    match &outcome.status {
        CategoryStatus::Saved { files, .. } => info!("{} ({} files)", outcome, files),
        CategoryStatus::NoFiles => info!("{}", outcome),
        CategoryStatus::Failed { reason } => warn!("{}: {}", outcome, reason),
    }
    outcome
}

async fn fetch_category_inner<S>(
    store: &S,
    ns: &Namespace,
    simulation_id: &str,
    category: ArtifactCategory,
    folder: &Path,
    archive: &Path,
) -> CategoryStatus
where
    S: ArtifactStore + ?Sized,
{
    let stream = match store.get_bulk_archive_stream(ns, simulation_id, category).await {
        Ok(s) => s,
        Err(SyncError::StreamInterrupted(_)) | Err(SyncError::NotFound(_)) => return CategoryStatus::NoFiles,
        Err(e) => return CategoryStatus::Failed { reason: e.to_string() },
    };

    match persist_stream(stream, archive).await {
        Ok(0) => return CategoryStatus::NoFiles,
        Ok(bytes) => debug!("persisted {} bytes of {} to {:?}", bytes, category, archive),
        Err(e) if e.is_stream_interrupted() => {
            debug!("{} archive: {}", category, e);
            return CategoryStatus::NoFiles;
        }
        Err(e) => return CategoryStatus::Failed { reason: e.to_string() },
    }

    let dest = folder.join(category.as_str());
    let archive_owned = archive.to_path_buf();
    let dest_owned = dest.clone();
    let extracted =
        tokio::task::spawn_blocking(move || extract_archive(&archive_owned, &dest_owned, category)).await;

    match extracted {
        Ok(Ok(files)) => CategoryStatus::Saved { path: dest, files },
        Ok(Err(e)) => CategoryStatus::Failed { reason: e.to_string() },
        Err(join_err) => CategoryStatus::Failed { reason: join_err.to_string() },
    }
}

/// Fetch each category in turn into `folder`.
pub async fn fetch_categories<S>(
    store: &S,
    ns: &Namespace,
    simulation_id: &str,
    categories: &[ArtifactCategory],
    folder: &Path,
) -> Vec<CategoryOutcome>
where
    S: ArtifactStore + ?Sized,
{
    let mut outcomes = Vec::with_capacity(categories.len());
    for category in categories {
        outcomes.push(fetch_category(store, ns, simulation_id, *category, folder).await);
    }
    outcomes
}

/// Write the simulation's status document as `<folder>/simulation.yml`.
pub async fn write_simulation_status(folder: &Path, simulation: &Simulation) -> SyncResult<PathBuf> {
    let yaml = serde_yaml::to_string(simulation).map_err(|e| SyncError::Decode(e.to_string()))?;
    tokio::fs::create_dir_all(folder).await?;
    let path = folder.join(SIMULATION_STATUS_FILE);
    tokio::fs::write(&path, yaml).await?;
    Ok(path)
}
