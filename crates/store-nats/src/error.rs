use corral_store::StoreError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// Failed to create or open the KV bucket.
    #[error("failed to create kv bucket: {0}")]
    CreateKeyValue(async_nats::jetstream::context::CreateKeyValueErrorKind),

    /// Failed to delete a key.
    #[error("failed to delete key: {0}")]
    Delete(async_nats::jetstream::kv::DeleteErrorKind),

    /// Failed to read an entry.
    #[error("failed to read entry: {0}")]
    Entry(async_nats::jetstream::kv::EntryErrorKind),

    /// Failed to list keys.
    #[error("failed to list keys: {0}")]
    Keys(async_nats::jetstream::kv::WatchErrorKind),

    /// Failed to write a value unconditionally.
    #[error("failed to put value: {0}")]
    Put(async_nats::jetstream::kv::PutErrorKind),

    /// A conditional write failed for a reason other than a lost revision
    /// race.
    #[error("failed to update value: {0}")]
    Update(async_nats::jetstream::kv::UpdateErrorKind),

    /// Failed to establish a watch subscription.
    #[error("failed to watch bucket: {0}")]
    Watch(async_nats::jetstream::kv::WatchErrorKind),

    /// A watch subscription failed mid-stream.
    #[error("watch stream failed: {0}")]
    Watcher(async_nats::jetstream::kv::WatcherErrorKind),
}

impl StoreError for Error {}
