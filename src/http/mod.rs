// src/http/mod.rs
//
// HTTP transport: client construction and presigned-URL transfers

pub mod client;
pub mod transfer;

pub use client::HttpClientConfig;
pub use transfer::HttpTransfer;
