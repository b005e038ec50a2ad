//! In-memory (single node) implementation of revisioned key-value storage
//! for local development and tests.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use corral_store::{Entry, Event, EventKind, PutOutcome, Store};
use futures::channel::mpsc;
use tokio::sync::Mutex;

/// In-memory revisioned key-value store.
///
/// Clones share state, so a clone handed to another task observes the same
/// keys and revisions. Revisions count up from one per store, never per key.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    map: HashMap<String, Entry>,
    revision: u64,
    watchers: Vec<Watcher>,
}

#[derive(Debug)]
struct Watcher {
    prefix: String,
    sender: mpsc::UnboundedSender<Result<Event, Error>>,
}

impl State {
    // Called with the state lock held, so watchers observe changes in the
    // same order they were applied. Watchers whose receiver is gone are
    // dropped here.
    fn notify(&mut self, event: &Event) {
        self.watchers.retain(|watcher| {
            if event.key.starts_with(&watcher.prefix) {
                watcher.sender.unbounded_send(Ok(event.clone())).is_ok()
            } else {
                !watcher.sender.is_closed()
            }
        });
    }
}

impl MemoryStore {
    /// Creates a new `MemoryStore`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Error = Error;
    type Watch = mpsc::UnboundedReceiver<Result<Event, Error>>;

    async fn get<K: Into<String> + Send>(&self, key: K) -> Result<Option<Entry>, Self::Error> {
        let state = self.state.lock().await;
        Ok(state.map.get(&key.into()).cloned())
    }

    async fn get_prefix<K: Into<String> + Send>(
        &self,
        prefix: K,
    ) -> Result<Vec<(String, Bytes)>, Self::Error> {
        let prefix = prefix.into();
        let state = self.state.lock().await;
        let mut pairs = state
            .map
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect::<Vec<_>>();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(pairs)
    }

    async fn put<K: Into<String> + Send>(
        &self,
        key: K,
        value: Bytes,
        expected_revision: u64,
    ) -> Result<PutOutcome, Self::Error> {
        let key = key.into();
        let mut state = self.state.lock().await;

        if expected_revision != 0
            && state.map.get(&key).map(|entry| entry.revision) != Some(expected_revision)
        {
            return Ok(PutOutcome::Conflict);
        }

        state.revision += 1;
        let revision = state.revision;
        state.map.insert(
            key.clone(),
            Entry {
                value: value.clone(),
                revision,
            },
        );
        state.notify(&Event {
            key,
            kind: EventKind::Put,
            value: Some(value),
            revision,
        });

        Ok(PutOutcome::Written(revision))
    }

    async fn delete<K: Into<String> + Send>(&self, key: K) -> Result<bool, Self::Error> {
        let key = key.into();
        let mut state = self.state.lock().await;

        if state.map.remove(&key).is_none() {
            return Ok(false);
        }

        state.revision += 1;
        let revision = state.revision;
        state.notify(&Event {
            key,
            kind: EventKind::Delete,
            value: None,
            revision,
        });

        Ok(true)
    }

    async fn watch<K: Into<String> + Send>(&self, prefix: K) -> Result<Self::Watch, Self::Error> {
        let (sender, receiver) = mpsc::unbounded();
        self.state.lock().await.watchers.push(Watcher {
            prefix: prefix.into(),
            sender,
        });
        Ok(receiver)
    }
}
