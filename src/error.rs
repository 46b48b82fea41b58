//! Error types shared by the scan engine, the lookup helpers and the link service.

use std::time::Duration;
use thiserror::Error;

/// Request-level scan failures. Per-port failures never surface here; they are `Closed` verdicts.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("scan aborted")]
    Aborted,

    #[error("scan exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("internal scan failure: {0}")]
    Internal(String),
}

pub type ScanResult<T> = Result<T, ScanError>;

/// Failures of the DNS, WHOIS and geolocation pass-through lookups.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The upstream service answered but rejected the query.
    #[error("{0}")]
    Rejected(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type LookupResult<T> = Result<T, LookupError>;

/// Failures of the short-link service.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("{0}")]
    InvalidUrl(String),

    #[error("link not found")]
    NotFound,

    /// A generated code is already taken; the caller retries with a fresh one.
    #[error("short code already in use: {0}")]
    CodeTaken(String),
}

pub type LinkResult<T> = Result<T, LinkError>;
