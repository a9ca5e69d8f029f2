use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Key generation failed: {0}")]
    KeyGen(String),

    #[error("Malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("No hosts to sign: at least one domain or IP address is required")]
    NoHosts,

    #[error("Invalid certificate lifetime: {0}")]
    InvalidLifetime(String),

    #[error("Failed to create CA certificate: {0}")]
    CaCreation(#[source] Box<Error>),

    #[error("Trust store error: {0}")]
    TrustStore(String),

    #[error("No trust store adapter for platform: {0}")]
    UnsupportedPlatform(String),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Crypto error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the caller can continue past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::TrustStore(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
