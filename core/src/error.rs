//! Error types for the store, the staging cache and the engine.

use crate::ids::{ObjId, ShadowId};
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for engine operations.
pub type GlossaResult<T> = Result<T, GlossaError>;

/// Errors raised by a `LinguisticStore`. All of them are recoverable from the
/// engine's point of view: the caller may retry or abandon.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object with this id.
    #[error("object {0} not found")]
    NotFound(ObjId),

    /// The object exists but is not of the requested kind.
    #[error("object {id} is a {found}, expected {expected}")]
    WrongKind {
        id: ObjId,
        expected: &'static str,
        found: &'static str,
    },

    /// Writes are currently refused.
    #[error("store is read-only")]
    ReadOnly,

    /// Error from the redb backend.
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    /// Record (de)serialization error.
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

macro_rules! redb_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(e: $ty) -> Self {
                    StoreError::Redb(e.into())
                }
            }
        )*
    };
}

redb_error_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

/// Misuse of the staging cache API.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StagingError {
    #[error("unknown shadow object {0}")]
    UnknownShadow(ShadowId),

    #[error("shadow object {id} has no field {field}")]
    FieldMismatch { id: ShadowId, field: &'static str },

    #[error("no morph slot at index {0}")]
    NoSlot(usize),
}

/// Errors surfaced to the caller of the engine.
#[derive(Debug, Error)]
pub enum GlossaError {
    /// The persisted store failed; the staging cache was left as it was.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    /// An edit or commit was requested while another one is running on this thread.
    #[error("re-entrant edit rejected")]
    Reentrant,

    /// A state that should be impossible.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Report an invariant violation: panics in debug builds, logs in release.
#[macro_export]
macro_rules! invariant {
    ($cond:expr, $($arg:tt)+) => {{
        let ok: bool = $cond;
        if !ok {
            debug_assert!(ok, $($arg)+);
            $crate::__tracing::error!($($arg)+);
        }
        ok
    }};
}
