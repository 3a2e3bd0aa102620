use thiserror::Error;

/// Errors raised by a geospatial source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Connection reset, timeout or similar; worth retrying.
    #[error("transient network fault: {0}")]
    Transient(String),

    #[error("upstream returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("upstream rejected the request: {0}")]
    Upstream(String),

    #[error("could not decode upstream response: {0}")]
    Decode(String),

    #[error("source is not configured: {0}")]
    Setup(String),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient(_))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum VersionTableError {
    #[error("version table is empty")]
    Empty,

    #[error("window {start}-{end} ends before it starts")]
    Inverted { start: i32, end: i32 },

    #[error("window {first_start}-{first_end} overlaps window {second_start}-{second_end}")]
    Overlap {
        first_start: i32,
        first_end: i32,
        second_start: i32,
        second_end: i32,
    },
}

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("location csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("location list is empty")]
    Empty,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cache encoding: {0}")]
    Json(#[from] serde_json::Error),
}
