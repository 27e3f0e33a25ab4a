//! Error types for geoip-mmdb.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for geoip-mmdb operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Label not present in the prefix source
    #[error("entry {0} not found")]
    NotFound(String),

    /// A prefix or value cannot be represented in the output database
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failure while building the database for a single label
    #[error("failed to add entry {label}: {source}")]
    Entry {
        label: String,
        #[source]
        source: Box<Error>,
    },

    /// IO error tied to a path
    #[error("IO error at {}: {source}", path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid CIDR pattern
    #[error("invalid CIDR pattern: {0}")]
    InvalidCidrPattern(String),

    /// GeoIP database error
    #[error("GeoIP error: {0}")]
    GeoIp(String),

    /// Download error
    #[error("download error: {0}")]
    Download(String),
}

impl Error {
    /// Attach a path to an IO error.
    pub fn at_path(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Path {
            path: path.into(),
            source,
        }
    }

    /// Attach the label whose build failed.
    ///
    /// An error already carrying the same label is returned unchanged.
    pub fn for_entry(label: impl Into<String>, source: Error) -> Self {
        let label = label.into();
        match source {
            Error::Entry { label: ref inner, .. } if *inner == label => source,
            source => Error::Entry {
                label,
                source: Box::new(source),
            },
        }
    }
}

/// Result type alias for geoip-mmdb operations.
pub type Result<T> = std::result::Result<T, Error>;
