// src/upload.rs
//
// Folder upload pipeline: local files -> presigned tickets -> multipart POST,
// with up to `workers` items in flight. Every item yields exactly one
// `UploadOutcome`; a bad item never aborts its siblings.

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::constants::{default_upload_workers, UPLOAD_SUCCESS_STATUS};
use crate::enumerate::PathEnumerator;
use crate::error::{SyncError, SyncResult};
use crate::http::HttpTransfer;
use crate::object_store::ArtifactStore;
use crate::progress::ProgressCallback;
use crate::types::{ArtifactKey, Namespace, UploadItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadStatus {
    /// The presigned POST answered 204.
    Uploaded,
    /// The POST completed with any other status.
    NotConfirmed { status: u16 },
    /// The item never reached a POST status. `kind` keeps the error class.
    Failed { kind: FailureKind, reason: String },
}

/// Class of the error behind an `UploadStatus::Failed`. [`UploadOutcome::error`]
/// maps it back to the matching `SyncError` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Store { status: u16 },
    NotFound,
    Auth,
    Io(std::io::ErrorKind),
    Transport,
    Decode,
    /// The worker task panicked or was cancelled.
    Task,
}

impl FailureKind {
    pub fn of(err: &SyncError) -> Self {
        match err {
            SyncError::Store { status, .. } => FailureKind::Store { status: *status },
            SyncError::TransferNotConfirmed { status, .. } => FailureKind::Store { status: *status },
            SyncError::NotFound(_) => FailureKind::NotFound,
            SyncError::Auth(_) => FailureKind::Auth,
            SyncError::Io(e) => FailureKind::Io(e.kind()),
            SyncError::InvalidPath(_) => FailureKind::Io(std::io::ErrorKind::NotFound),
            SyncError::AlreadyExists(_) => FailureKind::Io(std::io::ErrorKind::AlreadyExists),
            SyncError::Http(_) | SyncError::StreamInterrupted(_) | SyncError::Transport(_) => FailureKind::Transport,
            SyncError::Decode(_) | SyncError::ArchiveCorrupt(_) => FailureKind::Decode,
            SyncError::Task(_) => FailureKind::Task,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub key: ArtifactKey,
    pub local_path: PathBuf,
    pub bytes: u64,
    pub status: UploadStatus,
}

impl UploadOutcome {
    fn failed(item: &UploadItem, kind: FailureKind, reason: impl fmt::Display) -> Self {
        Self {
            key: item.key.clone(),
            local_path: item.local_path.clone(),
            bytes: 0,
            status: UploadStatus::Failed { kind, reason: reason.to_string() },
        }
    }

    fn from_error(item: &UploadItem, err: SyncError) -> Self {
        Self::failed(item, FailureKind::of(&err), err)
    }

    pub fn is_uploaded(&self) -> bool {
        self.status == UploadStatus::Uploaded
    }

    /// The error equivalent of a negative outcome.
    pub fn error(&self) -> Option<SyncError> {
        match &self.status {
            UploadStatus::Uploaded => None,
            UploadStatus::NotConfirmed { status } => {
                Some(SyncError::TransferNotConfirmed { key: self.key.to_string(), status: *status })
            }
            UploadStatus::Failed { kind, reason } => {
                let message = format!("{}: {}", self.key, reason);
                Some(match *kind {
                    FailureKind::Store { status } => SyncError::Store { status, message },
                    FailureKind::NotFound => SyncError::NotFound(message),
                    FailureKind::Auth => SyncError::Auth(message),
                    FailureKind::Io(io_kind) => SyncError::Io(std::io::Error::new(io_kind, message)),
                    FailureKind::Transport => SyncError::Transport(message),
                    FailureKind::Decode => SyncError::Decode(message),
                    FailureKind::Task => SyncError::Task(message),
                })
            }
        }
    }
}

impl fmt::Display for UploadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            UploadStatus::Uploaded => write!(f, "Uploaded {}", self.key),
            UploadStatus::NotConfirmed { status } => {
                write!(f, "Not confirmed {} (status {})", self.key, status)
            }
            UploadStatus::Failed { reason, .. } => write!(f, "Failed {}: {}", self.key, reason),
        }
    }
}

/// All outcomes of one pipeline run, in completion order.
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    pub outcomes: Vec<UploadOutcome>,
}

impl UploadReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn uploaded(&self) -> impl Iterator<Item = &UploadOutcome> {
        self.outcomes.iter().filter(|o| o.is_uploaded())
    }

    pub fn failures(&self) -> impl Iterator<Item = &UploadOutcome> {
        self.outcomes.iter().filter(|o| !o.is_uploaded())
    }

    pub fn all_confirmed(&self) -> bool {
        self.outcomes.iter().all(UploadOutcome::is_uploaded)
    }

    pub fn total_bytes(&self) -> u64 {
        self.uploaded().map(|o| o.bytes).sum()
    }

    /// Outcomes sorted by key, for display.
    pub fn sorted(&self) -> Vec<&UploadOutcome> {
        let mut v: Vec<_> = self.outcomes.iter().collect();
        v.sort_by(|a, b| a.key.cmp(&b.key));
        v
    }
}

#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Fixed worker count for the whole run.
    pub workers: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self { workers: default_upload_workers() }
    }
}

/// Upload one item: ticket, then POST. Never returns an error; the outcome
/// carries it.
async fn upload_one<S>(store: &S, transfer: &HttpTransfer, ns: &Namespace, item: &UploadItem) -> UploadOutcome
where
    S: ArtifactStore + ?Sized,
{
    let ticket = match store.create_upload_ticket(ns, &item.key).await {
        Ok(t) => t,
        Err(e) => return UploadOutcome::from_error(item, e),
    };

    let file_name = item
        .local_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| item.key.to_string());

    match transfer.post_form(&ticket, &item.local_path, &file_name).await {
        Ok((status, bytes)) => {
            let status = if status.as_u16() == UPLOAD_SUCCESS_STATUS {
                UploadStatus::Uploaded
            } else {
                UploadStatus::NotConfirmed { status: status.as_u16() }
            };
            UploadOutcome { key: item.key.clone(), local_path: item.local_path.clone(), bytes, status }
        }
        Err(e) => UploadOutcome::from_error(item, e),
    }
}

/// Upload `items` into `ns` with at most `workers` concurrent transfers.
pub async fn upload_items<S, I>(
    store: Arc<S>,
    transfer: &HttpTransfer,
    ns: &Namespace,
    items: I,
    workers: usize,
    progress_callback: Option<Arc<ProgressCallback>>,
) -> UploadReport
where
    S: ArtifactStore + ?Sized + 'static,
    I: IntoIterator<Item = UploadItem>,
{
    let items: Vec<UploadItem> = items.into_iter().collect();
    if items.is_empty() {
        return UploadReport::default();
    }

    // Cap the number of concurrent tasks to the number of items
    let effective_jobs = workers.max(1).min(items.len());
    info!("Starting upload of {} file(s) to {} (workers={})", items.len(), ns, effective_jobs);
    debug!("upload_items debug: requested_workers={}", workers);

    let sem = Arc::new(Semaphore::new(effective_jobs));
    let mut futs = FuturesUnordered::new();

    for item in items {
        let sem = sem.clone();
        let store = store.clone();
        let transfer = transfer.clone();
        let ns = ns.clone();
        let progress = progress_callback.clone();
        let task_item = item.clone();

        let handle = tokio::spawn(async move {
            let _permit = match sem.acquire_owned().await {
                Ok(p) => p,
                Err(e) => return UploadOutcome::failed(&task_item, FailureKind::Task, e),
            };
            debug!("starting upload of {:?} -> {}:{}", task_item.local_path, ns, task_item.key);
            let outcome = upload_one(store.as_ref(), &transfer, &ns, &task_item).await;

            if let Some(ref progress) = progress {
                progress.file_completed(outcome.bytes);
            }
            outcome
        });

        futs.push(async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => UploadOutcome::failed(&item, FailureKind::Task, join_err),
            }
        });
    }

    let mut report = UploadReport::default();
    while let Some(outcome) = futs.next().await {
        match &outcome.status {
            UploadStatus::Uploaded => info!("{}", outcome),
            UploadStatus::NotConfirmed { .. } => warn!("{}", outcome),
            UploadStatus::Failed { .. } => error!("{}", outcome),
        }
        report.outcomes.push(outcome);
    }

    info!(
        "Finished upload to {}: {} of {} confirmed",
        ns,
        report.uploaded().count(),
        report.len()
    );
    report
}

/// Enumerate `enumerator`'s tree and upload every file. Enumeration errors
/// abort before any transfer starts.
pub async fn upload_folder<S>(
    store: Arc<S>,
    transfer: &HttpTransfer,
    ns: &Namespace,
    enumerator: &PathEnumerator,
    options: &UploadOptions,
    progress_callback: Option<Arc<ProgressCallback>>,
) -> SyncResult<UploadReport>
where
    S: ArtifactStore + ?Sized + 'static,
{
    let items = enumerator.collect_items()?;
    Ok(upload_items(store, transfer, ns, items, options.workers, progress_callback).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(key: &str, status: UploadStatus) -> UploadOutcome {
        UploadOutcome { key: key.into(), local_path: PathBuf::from(key), bytes: 4, status }
    }

    #[test]
    fn report_partitions_outcomes() {
        let report = UploadReport {
            outcomes: vec![
                outcome("b.txt", UploadStatus::Uploaded),
                outcome("a.txt", UploadStatus::NotConfirmed { status: 403 }),
                outcome("c.txt", UploadStatus::Failed { kind: FailureKind::Transport, reason: "boom".into() }),
            ],
        };
        assert_eq!(report.uploaded().count(), 1);
        assert_eq!(report.failures().count(), 2);
        assert!(!report.all_confirmed());
        assert_eq!(report.total_bytes(), 4);
        let keys: Vec<_> = report.sorted().iter().map(|o| o.key.to_string()).collect();
        assert_eq!(keys, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn outcome_rendering_and_errors() {
        let ok = outcome("a.txt", UploadStatus::Uploaded);
        let nc = outcome("b.txt", UploadStatus::NotConfirmed { status: 500 });
        assert_eq!(ok.to_string(), "Uploaded a.txt");
        assert_eq!(nc.to_string(), "Not confirmed b.txt (status 500)");
        assert!(ok.error().is_none());
        assert!(matches!(nc.error(), Some(SyncError::TransferNotConfirmed { status: 500, .. })));
    }

    #[test]
    fn failures_keep_their_error_kind() {
        let io = SyncError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone.txt"));
        let item = UploadItem { local_path: PathBuf::from("gone.txt"), key: "gone.txt".into() };
        let missing = UploadOutcome::from_error(&item, io);
        assert_eq!(
            missing.status,
            UploadStatus::Failed { kind: FailureKind::Io(std::io::ErrorKind::NotFound), reason: "gone.txt".into() }
        );
        match missing.error() {
            Some(SyncError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("expected Io, got {other:?}"),
        }

        let rejected = UploadOutcome::from_error(&item, SyncError::Store { status: 409, message: "taken".into() });
        assert!(matches!(rejected.error(), Some(SyncError::Store { status: 409, .. })));

        let denied = UploadOutcome::from_error(&item, SyncError::Auth("expired".into()));
        assert!(matches!(denied.error(), Some(SyncError::Auth(_))));
        assert_eq!(denied.to_string(), "Failed gone.txt: authentication failed: expired");
    }

    #[test]
    fn default_worker_count_is_positive() {
        assert!(UploadOptions::default().workers >= 1);
    }
}
