//! Error kinds raised by the analysis pipeline

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Content of a single file could not be read; degrades that operation only
    #[error("unanalyzable file {path:?}: {source}")]
    Unanalyzable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed sequence: {0}")]
    MalformedSequence(String),

    #[error("not restorable: {0}")]
    NotRestorable(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error maps to a client-side failure at the transport boundary
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::MalformedSequence(_) | Error::NotRestorable(_))
    }
}
