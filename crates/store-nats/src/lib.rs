//! Implementation of revisioned key-value storage using NATS JetStream with
//! HA replication.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use async_nats::Client;
use async_nats::jetstream;
use async_nats::jetstream::Context as JetStreamContext;
use async_nats::jetstream::kv::{Config, Operation, Store as KvStore};
use async_trait::async_trait;
use bytes::Bytes;
use corral_store::{Entry, Event, EventKind, PutOutcome, Store};
use futures::StreamExt;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use tracing::debug;

/// Options for configuring a `NatsStore`.
pub struct NatsStoreOptions {
    /// The NATS client to use.
    pub client: Client,

    /// The bucket backing the store.
    pub bucket: String,

    /// Number of replicas for the KV store. Should be set to at least 3 in
    /// production for HA.
    pub num_replicas: usize,

    /// Whether to persist the store to disk.
    pub persist: bool,
}

/// Revisioned KV store using NATS JetStream.
///
/// JetStream assigns each key a monotonically increasing revision on write,
/// which backs the conditional-put contract directly.
#[derive(Clone, Debug)]
pub struct NatsStore {
    bucket: String,
    jetstream_context: JetStreamContext,
    num_replicas: usize,
    persist: bool,
}

impl NatsStore {
    /// Creates a new `NatsStore` with the specified options. The bucket is
    /// created or opened lazily on first operation.
    #[must_use]
    pub fn new(
        NatsStoreOptions {
            client,
            bucket,
            num_replicas,
            persist,
        }: NatsStoreOptions,
    ) -> Self {
        let jetstream_context = jetstream::new(client);

        Self {
            bucket,
            jetstream_context,
            num_replicas,
            persist,
        }
    }

    async fn get_kv_store(&self) -> Result<KvStore, Error> {
        let config = Config {
            bucket: self.bucket.clone(),
            num_replicas: self.num_replicas,
            storage: if self.persist {
                jetstream::stream::StorageType::File
            } else {
                jetstream::stream::StorageType::Memory
            },
            ..Default::default()
        };

        self.jetstream_context
            .create_key_value(config)
            .await
            .map_err(|e| Error::CreateKeyValue(e.kind()))
    }
}

#[async_trait]
impl Store for NatsStore {
    type Error = Error;
    type Watch = BoxStream<'static, Result<Event, Error>>;

    async fn get<K: Into<String> + Send>(&self, key: K) -> Result<Option<Entry>, Self::Error> {
        let kv_store = self.get_kv_store().await?;

        match kv_store
            .entry(key.into())
            .await
            .map_err(|e| Error::Entry(e.kind()))?
        {
            // Delete and purge markers linger as the latest entry for a key;
            // both read as absent.
            Some(entry) if entry.operation == Operation::Put => Ok(Some(Entry {
                value: entry.value,
                revision: entry.revision,
            })),
            _ => Ok(None),
        }
    }

    async fn get_prefix<K: Into<String> + Send>(
        &self,
        prefix: K,
    ) -> Result<Vec<(String, Bytes)>, Self::Error> {
        let prefix = prefix.into();
        let kv_store = self.get_kv_store().await?;

        let mut keys = kv_store
            .keys()
            .await
            .map_err(|e| Error::Keys(e.kind()))?
            .try_collect::<Vec<String>>()
            .await
            .map_err(|e| Error::Watcher(e.kind()))?;
        keys.retain(|key| key.starts_with(&prefix));
        keys.sort();

        let mut pairs = Vec::with_capacity(keys.len());
        for key in keys {
            // A key may vanish between the listing and the read.
            if let Some(value) = kv_store
                .get(&key)
                .await
                .map_err(|e| Error::Entry(e.kind()))?
            {
                pairs.push((key, value));
            }
        }

        Ok(pairs)
    }

    async fn put<K: Into<String> + Send>(
        &self,
        key: K,
        value: Bytes,
        expected_revision: u64,
    ) -> Result<PutOutcome, Self::Error> {
        let key = key.into();
        let kv_store = self.get_kv_store().await?;

        if expected_revision == 0 {
            let revision = kv_store
                .put(&key, value)
                .await
                .map_err(|e| Error::Put(e.kind()))?;
            return Ok(PutOutcome::Written(revision));
        }

        match kv_store.update(&key, value, expected_revision).await {
            Ok(revision) => Ok(PutOutcome::Written(revision)),
            Err(err) => {
                // The client folds a rejected compare-and-swap and transport
                // failures into the same error. Re-read the entry to tell
                // the two apart: if the key still sits at the expected
                // revision, the update itself failed.
                let current = kv_store
                    .entry(&key)
                    .await
                    .map_err(|e| Error::Entry(e.kind()))?;
                match current {
                    Some(entry)
                        if entry.operation == Operation::Put
                            && entry.revision == expected_revision =>
                    {
                        Err(Error::Update(err.kind()))
                    }
                    _ => {
                        debug!(bucket = %self.bucket, key = %key, expected_revision, "conditional put lost a revision race");
                        Ok(PutOutcome::Conflict)
                    }
                }
            }
        }
    }

    async fn delete<K: Into<String> + Send>(&self, key: K) -> Result<bool, Self::Error> {
        let key = key.into();
        let kv_store = self.get_kv_store().await?;

        match kv_store
            .entry(&key)
            .await
            .map_err(|e| Error::Entry(e.kind()))?
        {
            Some(entry) if entry.operation == Operation::Put => {
                kv_store
                    .delete(&key)
                    .await
                    .map_err(|e| Error::Delete(e.kind()))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn watch<K: Into<String> + Send>(&self, prefix: K) -> Result<Self::Watch, Self::Error> {
        let prefix = prefix.into();
        let kv_store = self.get_kv_store().await?;

        debug!(bucket = %self.bucket, prefix = %prefix, "establishing watch");

        // KV subject wildcards split on '.', which arbitrary key suffixes do
        // not respect, so watch the whole bucket and filter client-side.
        let watch = kv_store
            .watch_all()
            .await
            .map_err(|e| Error::Watch(e.kind()))?;

        let stream = watch.filter_map(move |item| {
            let mapped = match item {
                Ok(entry) if entry.key.starts_with(&prefix) => {
                    let kind = match entry.operation {
                        Operation::Put => EventKind::Put,
                        Operation::Delete | Operation::Purge => EventKind::Delete,
                    };
                    Some(Ok(Event {
                        key: entry.key,
                        kind,
                        value: (kind == EventKind::Put).then_some(entry.value),
                        revision: entry.revision,
                    }))
                }
                Ok(_) => None,
                Err(err) => Some(Err(Error::Watcher(err.kind()))),
            };
            futures::future::ready(mapped)
        });

        Ok(stream.boxed())
    }
}
