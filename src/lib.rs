// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root for the Pollination sync engine: a typed client for the
// Pollination API plus the folder upload, tree download and simulation
// archive pipelines the `pollination` CLI is built on.

pub mod constants;
pub mod error;
pub mod types;
pub mod config;
pub mod auth;
pub mod http;
pub mod object_store;
pub mod pollination_client;
pub mod enumerate;
pub mod progress;
pub mod upload;
pub mod download;
pub mod archive;
pub mod registry;

pub use archive::{fetch_categories, fetch_category, CategoryOutcome, CategoryStatus};
pub use config::{ApiKey, Config};
pub use download::{download_tree, DownloadStats};
pub use enumerate::PathEnumerator;
pub use error::{SyncError, SyncResult};
pub use http::{HttpClientConfig, HttpTransfer};
pub use object_store::{ArtifactStore, ByteStream};
pub use pollination_client::{Ensured, PollinationClient};
pub use registry::{LocalPackage, Package, RepositoryKind};
pub use types::{ArtifactCategory, ArtifactEntry, ArtifactKey, Namespace, UploadItem, UploadTicket};
pub use upload::{upload_folder, upload_items, FailureKind, UploadOptions, UploadOutcome, UploadReport, UploadStatus};
