//! Error types for depgraph-ir.
//!
//! Non-fatal analysis trouble (incompatible function pointers, missing
//! node mappings, empty reaching definitions) is logged and absorbed
//! inside the owning subsystem; only genuinely unrecoverable conditions
//! surface as `DepgraphError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DepgraphError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The input module cannot be analysed at all.
    #[error("malformed module: {0}")]
    MalformedModule(String),

    /// Invalid option combination or value.
    #[error("configuration error: {0}")]
    Config(String),

    /// An analysis could not produce a result.
    #[error("analysis error: {0}")]
    Analysis(String),

    /// The sliced module failed post-slice verification.
    #[error("verification failed: {0}")]
    Verification(String),
}

impl DepgraphError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        DepgraphError::MalformedModule(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        DepgraphError::Config(msg.into())
    }

    pub fn analysis(msg: impl Into<String>) -> Self {
        DepgraphError::Analysis(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DepgraphError>;
