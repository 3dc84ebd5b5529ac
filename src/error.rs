#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metrics collection failed: {0}")]
    Collection(String),

    #[error("persistence failed: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn collection<S: Into<String>>(msg: S) -> Self {
        Error::Collection(msg.into())
    }

    pub(crate) fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// True when the error came from the metrics source rather than the store.
    pub fn is_collection(&self) -> bool {
        matches!(self, Error::Collection(_))
    }

    /// True when the error came from the persistence layer.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Error::Persistence(_) | Error::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
