use std::io;

use thiserror::Error;

/// Errors that can arise in the crypto layer (identity, digests and the DTLS engine).
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Some error from OpenSSL layer (used for DTLS).
    #[error("{0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    /// Digest algorithm name not recognized, e.g. `sha-257`.
    #[error("unknown digest algorithm: {0}")]
    UnknownDigest(String),

    /// Other IO errors.
    #[error("{0}")]
    Io(#[from] io::Error),
}
