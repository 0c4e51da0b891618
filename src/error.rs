//! Error taxonomy for the accounting engine
//!
//! Every failure inside the engine maps to one [`UsageError`] variant. The
//! facade decides which of them reach a caller: validation errors are
//! returned from the strict entry points, persistence errors are logged and
//! counted, corrupt records are skipped during reads.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UsageError {
    /// Caller-supplied input was rejected
    #[error("validation error: {0}")]
    Validation(String),

    /// Storage write or read failed
    #[error("persistence error at {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single stored entry could not be decoded
    #[error("corrupt record at line {line}: {reason}")]
    CorruptRecord { line: usize, reason: String },

    /// Decimal arithmetic left the representable range
    #[error("cost computation overflowed for model {model}")]
    Overflow { model: String },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl UsageError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable tag, used in structured error fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Persistence { .. } => "persistence",
            Self::CorruptRecord { .. } => "corrupt_record",
            Self::Overflow { .. } => "overflow",
            Self::Encode(_) => "encode",
        }
    }

    pub fn is_corrupt_record(&self) -> bool {
        matches!(self, Self::CorruptRecord { .. })
    }
}

pub type Result<T> = std::result::Result<T, UsageError>;
