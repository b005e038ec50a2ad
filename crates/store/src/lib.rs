//! Boundary trait for the revisioned key-value store backing the group
//! registry.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::error::Error as StdError;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

/// Marker trait for errors returned by store implementations.
///
/// An implementation's error covers transport and backend failure only.
/// Revision conflicts and missing keys are reported as data ([`PutOutcome`],
/// the `bool` returned by delete) so callers can branch on them without
/// inspecting backend-specific error types.
pub trait StoreError: Debug + StdError + Send + Sync + 'static {}

/// A stored value together with the revision it was read at.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    /// The stored bytes.
    pub value: Bytes,

    /// The revision the store assigned to the current value of the key.
    pub revision: u64,
}

/// Outcome of a conditional put.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PutOutcome {
    /// The write was accepted; the key is now at this revision.
    Written(u64),

    /// The key's revision did not match the expected one. Nothing was
    /// written; the caller re-reads and retries.
    Conflict,
}

/// The kind of change a watch subscription reports.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventKind {
    /// A key was created or overwritten.
    Put,

    /// A key was deleted.
    Delete,
}

/// A single change under a watched prefix.
#[derive(Clone, Debug)]
pub struct Event {
    /// The full key the change applies to.
    pub key: String,

    /// Whether the key was written or deleted.
    pub kind: EventKind,

    /// The new value for [`EventKind::Put`]; `None` for delete tombstones.
    pub value: Option<Bytes>,

    /// The revision the store assigned to this change.
    pub revision: u64,
}

/// A trait representing a revisioned key-value store with asynchronous
/// operations.
///
/// # Required Methods
/// - `async fn get(&self, key) -> Result<Option<Entry>, Self::Error>`: point read; absence is `None`, not an error.
/// - `async fn get_prefix(&self, prefix) -> Result<Vec<(String, Bytes)>, Self::Error>`: key-ordered range read; empty when nothing matches.
/// - `async fn put(&self, key, value, expected_revision) -> Result<PutOutcome, Self::Error>`: compare-and-swap on revision.
/// - `async fn delete(&self, key) -> Result<bool, Self::Error>`: removes a key; `false` when it was absent.
/// - `async fn watch(&self, prefix) -> Result<Self::Watch, Self::Error>`: live change feed under a prefix.
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    /// The error type returned when the backend is unavailable.
    type Error: StoreError;

    /// The change feed returned by `watch`. Infinite and lazy; dropping it
    /// cancels the subscription.
    type Watch: Stream<Item = Result<Event, Self::Error>> + Send + Unpin;

    /// Retrieves the value and revision currently stored under a key.
    async fn get<K: Into<String> + Send>(&self, key: K) -> Result<Option<Entry>, Self::Error>;

    /// Retrieves all key-value pairs under a prefix, ordered by key.
    async fn get_prefix<K: Into<String> + Send>(
        &self,
        prefix: K,
    ) -> Result<Vec<(String, Bytes)>, Self::Error>;

    /// Writes a value if the key's current revision matches
    /// `expected_revision`.
    ///
    /// An `expected_revision` of zero writes unconditionally (creating the
    /// key or replacing whatever is there); any other value is a strict
    /// compare-and-swap against the revision returned by a prior read.
    async fn put<K: Into<String> + Send>(
        &self,
        key: K,
        value: Bytes,
        expected_revision: u64,
    ) -> Result<PutOutcome, Self::Error>;

    /// Deletes a key, reporting whether it existed.
    async fn delete<K: Into<String> + Send>(&self, key: K) -> Result<bool, Self::Error>;

    /// Subscribes to changes for keys under `prefix`.
    ///
    /// Events arrive in the store's per-key modification order. Each call
    /// establishes a fresh subscription with no replay of earlier changes.
    async fn watch<K: Into<String> + Send>(&self, prefix: K) -> Result<Self::Watch, Self::Error>;
}
