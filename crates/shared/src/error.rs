//! Error taxonomy for the pipeline stages.
//!
//! Only [`SyncReadError`] escapes its stage. Every other error is logged and
//! recovered inside the unit of work it belongs to.

use std::time::Duration;

use thiserror::Error;

/// A whole source page could not be rendered or parsed
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to render {url}: {reason}")]
    Render { url: String, reason: String },
    #[error("rendering {url} did not finish within {timeout:?}")]
    Timeout { url: String, timeout: Duration },
    #[error("no listing table found at {url}")]
    MissingTable { url: String },
}

/// A single listing row was malformed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowParseError {
    #[error("row has no link anchor")]
    MissingAnchor,
    #[error("row link has no href")]
    MissingHref,
    #[error("row link has an empty href")]
    EmptyHref,
    #[error("row href {href:?} is not a valid URL: {reason}")]
    InvalidHref { href: String, reason: String },
}

/// The judge could not be reached or gave nothing usable
#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("judge call failed: {0}")]
    Transport(String),
}

/// Listing existing store keys failed. Dedup is unsafe without them.
#[derive(Debug, Error)]
#[error("failed to read existing records (page {page}): {reason}")]
pub struct SyncReadError {
    pub page: usize,
    pub reason: String,
}

/// One write batch was rejected
#[derive(Debug, Clone, Error)]
#[error("batch {batch} ({records} records) failed: {reason}")]
pub struct SyncWriteError {
    pub batch: usize,
    pub records: usize,
    pub reason: String,
}
