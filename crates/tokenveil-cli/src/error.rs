//! CLI error types.

use std::{io, path::PathBuf};

use thiserror::Error;
use tokenveil_core::TokenError;
use tokenveil_crypto::EntropyError;

/// Errors that end a `tokenveil` invocation.
#[derive(Debug, Error)]
pub enum CliError {
    /// Reading or writing a file failed.
    #[error("{}: {source}", path.display())]
    File {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Reading stdin or writing stdout failed.
    #[error("stdio: {0}")]
    Stdio(#[from] io::Error),

    /// The engine refused the operation.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// `--entropy-hex` was not valid hex.
    #[error("invalid entropy hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// The operating system could not supply entropy.
    #[error(transparent)]
    Entropy(#[from] EntropyError),
}

impl CliError {
    pub(crate) fn file(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::File { path, source }
    }
}
