//! Error types for cluster queries.

/// Ways a single cluster query can fail.
///
/// A `ProbeError` never escapes the probe facade; each failed query
/// degrades its snapshot field to the pessimistic value instead.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("rpc transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed rpc response: {0}")]
    Malformed(String),

    #[error("query cancelled")]
    Cancelled,
}
