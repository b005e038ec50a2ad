use std::pin::Pin;
use std::task::{Context, Poll};

use corral_store::{Event, EventKind, Store};
use futures::Stream;

use crate::error::Error;
use crate::group::Group;

/// A change observed on the group namespace.
#[derive(Clone, Debug)]
pub enum GroupChange {
    /// A group was created or updated.
    Put {
        /// The group id (the key with the namespace prefix stripped).
        id: String,

        /// The new value.
        group: Group,

        /// The revision the store assigned to this write.
        revision: u64,
    },

    /// A group was deleted.
    Delete {
        /// The group id.
        id: String,
    },
}

/// Live feed of group changes decoded from the store's watch events.
///
/// Infinite and lazy; dropping it cancels the underlying subscription. An
/// undecodable value surfaces as an `Err` item and the feed continues, since
/// a feed consumer has no batch remainder to fall back on.
pub struct GroupWatch<S>
where
    S: Store,
{
    pub(crate) prefix: String,
    pub(crate) inner: S::Watch,
}

impl<S> GroupWatch<S>
where
    S: Store,
{
    fn decode(&self, event: Event) -> Result<GroupChange, Error<S::Error>> {
        let id = event
            .key
            .strip_prefix(&self.prefix)
            .unwrap_or(&event.key)
            .to_string();

        match event.kind {
            EventKind::Delete => Ok(GroupChange::Delete { id }),
            EventKind::Put => {
                match Group::try_from(event.value.unwrap_or_default()) {
                    Ok(group) => Ok(GroupChange::Put {
                        id,
                        group,
                        revision: event.revision,
                    }),
                    Err(source) => Err(Error::Decode {
                        key: event.key,
                        source,
                    }),
                }
            }
        }
    }
}

impl<S> Stream for GroupWatch<S>
where
    S: Store,
{
    type Item = Result<GroupChange, Error<S::Error>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(event))) => Poll::Ready(Some(this.decode(event))),
            Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(Error::Store(err)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
