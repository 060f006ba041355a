// src/http/transfer.rs
//
// Direct transfers against presigned URLs. These requests never carry the
// API bearer token.

use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, StatusCode};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, trace};

use crate::constants::UPLOAD_FILE_FIELD;
use crate::error::{SyncError, SyncResult};
use crate::object_store::ByteStream;
use crate::types::UploadTicket;

/// Thin wrapper over a reqwest client for presigned uploads and downloads.
#[derive(Debug, Clone)]
pub struct HttpTransfer {
    client: reqwest::Client,
}

impl HttpTransfer {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// POST `path` as a multipart form to the ticket's URL, ticket fields
    /// first and the file part last. Returns the raw status; judging it is
    /// up to the caller.
    pub async fn post_form(
        &self,
        ticket: &UploadTicket,
        path: &Path,
        file_name: &str,
    ) -> SyncResult<(StatusCode, u64)> {
        let file = fs::File::open(path).await?;
        let len = file.metadata().await?.len();

        let mut form = Form::new();
        for (name, value) in &ticket.form_fields {
            form = form.text(name.clone(), value.clone());
        }
        let body = Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, len).file_name(file_name.to_string());
        form = form.part(UPLOAD_FILE_FIELD, part);

        trace!("POST {} ({} bytes)", ticket.upload_url, len);
        let response = self.client.post(&ticket.upload_url).multipart(form).send().await?;
        Ok((response.status(), len))
    }

    /// GET `url` and stream the body into `dest`, creating parent
    /// directories if missing. Returns the number of bytes written.
    pub async fn download_to_file(&self, url: &str, dest: &Path) -> SyncResult<u64> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::Store { status: status.as_u16(), message });
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        debug!("GET {} -> {:?} ({} bytes)", url, dest, written);
        Ok(written)
    }

    /// GET `url` as a byte stream. Failures while reading the body surface
    /// as `StreamInterrupted` items.
    pub async fn get_stream(&self, url: &str) -> SyncResult<ByteStream> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::Store { status: status.as_u16(), message });
        }
        let stream = response
            .bytes_stream()
            .map(|item| item.map_err(|e| SyncError::StreamInterrupted(e.to_string())));
        Ok(Box::pin(stream))
    }
}
