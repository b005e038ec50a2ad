//! Group registry: named sets of worker nodes persisted in a shared
//! distributed KV store and observed through a live change feed.
//!
//! Jobs target a group id instead of enumerating node ids. The registry is a
//! thin consistency layer over an injected [`Store`] handle: records are
//! validated before every write, writes are protected by the store's
//! revision compare-and-swap, and changes are observable as a decoded
//! stream. It owns no locking of its own; concurrent writers race on
//! revisions and the loser re-reads.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod group;
mod watch;

pub use error::{Error, InvalidGroup};
pub use group::Group;
pub use watch::{GroupChange, GroupWatch};

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use corral_store::{PutOutcome, Store};
use tracing::warn;

/// A group together with the store revision it was read at.
///
/// Carry `revision` into [`GroupManagement::put`] to update the group
/// without clobbering concurrent writers.
#[derive(Clone, Debug)]
pub struct GroupEntry {
    /// The decoded record.
    pub group: Group,

    /// Revision of the stored value this snapshot was read from.
    pub revision: u64,
}

/// Options for creating a `GroupManager`.
pub struct GroupManagerConfig<S>
where
    S: Store,
{
    /// The shared store handle, constructed once at process start.
    pub store: S,

    /// Key-path namespace all group records live under, e.g. `groups/`.
    pub prefix: String,
}

/// Trait for managing groups.
#[async_trait]
pub trait GroupManagement
where
    Self: Clone + Send + Sync + 'static,
{
    /// The store backing the registry.
    type Store: Store;

    /// Gets a group by id, along with the revision it was read at.
    ///
    /// An empty id reads as absent without touching the store.
    async fn get(
        &self,
        id: &str,
    ) -> Result<Option<GroupEntry>, Error<<Self::Store as Store>::Error>>;

    /// All groups keyed by id; with a filter, only those whose membership
    /// includes `node_id`.
    ///
    /// Records that fail to decode are skipped with a warning so one
    /// malformed value cannot hide the rest of the registry.
    async fn list(
        &self,
        node_id: Option<&str>,
    ) -> Result<HashMap<String, Group>, Error<<Self::Store as Store>::Error>>;

    /// Validates and writes a group at `expected_revision`, returning the
    /// new revision.
    ///
    /// Zero writes unconditionally; any other value must match the revision
    /// from the caller's last read or the write fails with
    /// [`Error::Conflict`] and nothing changes.
    async fn put(
        &self,
        group: Group,
        expected_revision: u64,
    ) -> Result<u64, Error<<Self::Store as Store>::Error>>;

    /// Deletes a group by id. Deleting an absent group is a caller error,
    /// reported as [`Error::NotFound`].
    async fn delete(&self, id: &str) -> Result<(), Error<<Self::Store as Store>::Error>>;

    /// Subscribes to changes under the group namespace.
    async fn watch(&self) -> Result<GroupWatch<Self::Store>, Error<<Self::Store as Store>::Error>>;

    /// The storage key for a group id.
    fn key_for(&self, id: &str) -> String;
}

/// Store-backed group registry.
#[derive(Clone, Debug)]
pub struct GroupManager<S>
where
    S: Store,
{
    store: S,
    prefix: String,
}

impl<S> GroupManager<S>
where
    S: Store,
{
    /// Creates a new `GroupManager` with the specified options.
    pub fn new(GroupManagerConfig { store, prefix }: GroupManagerConfig<S>) -> Self {
        Self { store, prefix }
    }
}

#[async_trait]
impl<S> GroupManagement for GroupManager<S>
where
    S: Store,
{
    type Store = S;

    async fn get(&self, id: &str) -> Result<Option<GroupEntry>, Error<S::Error>> {
        if id.is_empty() {
            return Ok(None);
        }

        let key = self.key_for(id);
        match self.store.get(key.clone()).await.map_err(Error::Store)? {
            Some(entry) => {
                let group =
                    Group::try_from(entry.value).map_err(|source| Error::Decode { key, source })?;
                Ok(Some(GroupEntry {
                    group,
                    revision: entry.revision,
                }))
            }
            None => Ok(None),
        }
    }

    async fn list(&self, node_id: Option<&str>) -> Result<HashMap<String, Group>, Error<S::Error>> {
        let pairs = self
            .store
            .get_prefix(self.prefix.clone())
            .await
            .map_err(Error::Store)?;

        let mut groups = HashMap::with_capacity(pairs.len());
        for (key, value) in pairs {
            let group = match Group::try_from(value) {
                Ok(group) => group,
                Err(err) => {
                    warn!(key = %key, error = %err, "skipping undecodable group record");
                    continue;
                }
            };
            if node_id.map_or(true, |nid| group.includes_node(nid)) {
                groups.insert(group.id.clone(), group);
            }
        }

        Ok(groups)
    }

    async fn put(&self, mut group: Group, expected_revision: u64) -> Result<u64, Error<S::Error>> {
        group.validate()?;

        let key = self.key_for(&group.id);
        let bytes: Bytes = group.clone().try_into().map_err(|source| Error::Encode {
            id: group.id.clone(),
            source,
        })?;

        match self
            .store
            .put(key, bytes, expected_revision)
            .await
            .map_err(Error::Store)?
        {
            PutOutcome::Written(revision) => Ok(revision),
            PutOutcome::Conflict => Err(Error::Conflict { id: group.id }),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), Error<S::Error>> {
        let deleted = self
            .store
            .delete(self.key_for(id))
            .await
            .map_err(Error::Store)?;

        if deleted {
            Ok(())
        } else {
            Err(Error::NotFound { id: id.to_string() })
        }
    }

    async fn watch(&self) -> Result<GroupWatch<S>, Error<S::Error>> {
        let inner = self
            .store
            .watch(self.prefix.clone())
            .await
            .map_err(Error::Store)?;

        Ok(GroupWatch {
            prefix: self.prefix.clone(),
            inner,
        })
    }

    fn key_for(&self, id: &str) -> String {
        format!("{}{}", self.prefix, id)
    }
}
