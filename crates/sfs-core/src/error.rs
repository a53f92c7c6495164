use thiserror::Error;

pub type SfsResult<T> = Result<T, SfsError>;

#[derive(Debug, Error)]
pub enum SfsError {
    /// The persisted database is shorter than the smallest possible
    /// envelope. Signals an incomplete write, not corruption.
    #[error("database file is truncated")]
    TruncatedDatabase,

    /// AEAD verification failed: wrong key or tampered/corrupt ciphertext.
    #[error("database authentication failed (wrong key or corrupted data)")]
    AuthenticationFailed,

    /// The decrypted database payload could not be decoded.
    #[error("database payload error: {0}")]
    Database(String),

    /// A path or chunk address is absent from the tree or reverse index.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed input: bad hex, wrong-length hash, short key file.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
