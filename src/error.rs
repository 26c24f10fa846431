//! Error kinds surfaced by route-check
//!
//! Every fatal condition is a distinct variant so callers can tell a broken
//! looking glass apart from a broken intent file. None of these are ever
//! converted into an empty result.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error returned by the route-check pipeline
#[derive(Debug, Error)]
pub enum RouteCheckError {
    /// No snapshot could be fetched and there is no cached copy to fall back on
    #[error("no looking-glass snapshot available for AS{asn} (nothing cached at {}): {source}", .path.display())]
    SnapshotUnavailable {
        asn: u32,
        path: PathBuf,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    IntentLoad(#[from] IntentLoadError),

    /// The snapshot file could not be written or removed
    #[error("snapshot cache {}: {message}", .path.display())]
    Cache { path: PathBuf, message: String },
}

/// Failure while querying the looking glass
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("looking glass {endpoint} timed out: {message}")]
    Timeout { endpoint: String, message: String },

    #[error("connection to looking glass {endpoint} failed: {source}")]
    Io {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("looking glass {endpoint} is unreachable: {message}")]
    Unreachable { endpoint: String, message: String },

    #[error("looking glass {endpoint} returned HTTP status {status}")]
    HttpStatus { endpoint: String, status: u16 },

    #[error("looking glass {endpoint} rejected the session: {message}")]
    Session { endpoint: String, message: String },
}

impl FetchError {
    /// Wrap an I/O error, classifying read/connect timeouts as [`FetchError::Timeout`]
    pub fn from_io(endpoint: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => FetchError::Timeout {
                endpoint: endpoint.to_string(),
                message: err.to_string(),
            },
            _ => FetchError::Io {
                endpoint: endpoint.to_string(),
                source: err,
            },
        }
    }

    /// Whether a second attempt has a reasonable chance of succeeding
    ///
    /// Timeouts and dropped connections are transient. Unresolvable hosts,
    /// refused connections, HTTP error statuses and refused logins are not.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } => true,
            FetchError::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::Interrupted
            ),
            FetchError::Unreachable { .. }
            | FetchError::HttpStatus { .. }
            | FetchError::Session { .. } => false,
        }
    }
}

/// The looking-glass output contained no usable route entries
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "no usable route entries in {lines} non-blank lines of looking-glass output \
     ({skipped} malformed entries skipped); the output format may have changed"
)]
pub struct ParseError {
    pub lines: usize,
    pub skipped: usize,
}

/// The intent file is missing or does not describe a valid intent
#[derive(Debug, Error)]
pub enum IntentLoadError {
    #[error("intent file {} could not be read: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("intent file {} is not a prefix-to-ASN-list mapping: {message}", .path.display())]
    Malformed { path: PathBuf, message: String },

    #[error("intent file {}: {prefix:?} is not a valid CIDR prefix: {message}", .path.display())]
    InvalidPrefix {
        path: PathBuf,
        prefix: String,
        message: String,
    },

    #[error("intent file {}: upstreams for {prefix} are invalid: {message}", .path.display())]
    InvalidUpstreams {
        path: PathBuf,
        prefix: String,
        message: String,
    },

    #[error("intent file {}: {first:?} and {second:?} both normalize to the same prefix", .path.display())]
    DuplicatePrefix {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("intent file {} declares no prefixes", .path.display())]
    Empty { path: PathBuf },
}
