use thiserror::Error;

/// Failure reported by the transport layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("request cancelled")]
    Cancelled,

    #[error("DNS lookup failed")]
    Dns,

    #[error("server not found")]
    ServerNotFound,

    #[error("internet connection appears to be offline")]
    InternetDown,

    #[error("request timed out")]
    TimedOut,

    #[error("bad response")]
    BadResponse,

    #[error("HTTP {status}")]
    Http { status: u16, body: String },

    #[error("unknown network error")]
    Unknown,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    #[error("entry not found")]
    EntryNotFound,

    #[error("duplicate entry: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Unknown(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed document: {0}")]
    Unknown(String),
}

/// Failure talking to the remote sync backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend network error: {0}")]
    Network(NetworkError),

    #[error("unknown backend error")]
    Unknown,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TethysError {
    #[error("network error for {url}: {error}")]
    Network { url: String, error: NetworkError },

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("feed parsing error: {0}")]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("operation not supported")]
    NotSupported,

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("unknown error")]
    Unknown,
}

impl TethysError {
    pub fn network(url: impl Into<String>, error: NetworkError) -> Self {
        TethysError::Network {
            url: url.into(),
            error,
        }
    }
}

impl From<rusqlite::Error> for TethysError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => {
                TethysError::Database(DatabaseError::EntryNotFound)
            }
            other => TethysError::Database(DatabaseError::Unknown(other.to_string())),
        }
    }
}

impl From<std::io::Error> for TethysError {
    fn from(e: std::io::Error) -> Self {
        TethysError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for TethysError {
    fn from(e: serde_json::Error) -> Self {
        TethysError::Database(DatabaseError::Unknown(e.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, TethysError>;
