//! Typed error surface for the store.
//!
//! A single opaque error string can't tell a caller "the node doesn't exist" apart from "the
//! backend is unreachable", so this gives each distinct failure kind its own `thiserror` variant.

use thiserror::Error;

/// Errors raised by the graph store and its collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid construction parameters (unknown setup mode, missing session/keyspace, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Propagated from the backend driver (insert/query failure, connection error, ...).
    #[error("backend error: {0}")]
    Backend(String),

    /// A requested id has no corresponding row.
    #[error("no node with ID '{0}'")]
    Integrity(String),

    /// An embedding did not have the dimension the store was configured with.
    #[error("shape error: expected embedding of dimension {expected}, got {actual}")]
    Shape { expected: usize, actual: usize },

    /// Malformed input that the core refuses to accept (e.g. an unrecognized link direction read
    /// back from storage).
    #[error("input error: {0}")]
    Input(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
