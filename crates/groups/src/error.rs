use corral_store::StoreError;
use thiserror::Error;

/// A group record that failed validation.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum InvalidGroup {
    /// The id is empty after trimming, or not safe as a key-path segment.
    #[error("group id is empty or not usable in a key path")]
    Id,

    /// The name is empty after trimming.
    #[error("group name is empty")]
    Name,
}

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error<SE>
where
    SE: StoreError,
{
    /// The record failed validation; nothing was written.
    #[error(transparent)]
    Invalid(#[from] InvalidGroup),

    /// A stored value is not a well-formed group record.
    #[error("group[{key}] is not a well-formed record")]
    Decode {
        /// The storage key of the offending record.
        key: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The record could not be serialized for storage.
    #[error("group {id} failed to encode")]
    Encode {
        /// The group id.
        id: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A conditional write lost a revision race; re-read and retry.
    #[error("revision conflict for group {id}")]
    Conflict {
        /// The group id.
        id: String,
    },

    /// The group does not exist.
    #[error("group {id} not found")]
    NotFound {
        /// The group id.
        id: String,
    },

    /// Error passed through from the underlying store.
    #[error(transparent)]
    Store(SE),
}
