use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::InvalidGroup;

/// A named set of worker nodes, letting jobs target a group id instead of
/// enumerating node ids.
///
/// Stored as one KV pair at `<namespace prefix><id>`, value encoded as a
/// flat JSON object with fields `id`, `name` and `nids`.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Group {
    /// Unique identifier; doubles as the storage key suffix.
    pub id: String,

    /// Human-readable label.
    pub name: String,

    /// Ordered node membership. Duplicates are kept as given.
    #[serde(rename = "nids")]
    pub node_ids: Vec<String>,
}

impl Group {
    /// Trims `id` and `name` in place and checks the record is storable.
    ///
    /// Keys are built by bare concatenation, so this is the only line of
    /// defense against ids that would escape the group namespace.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidGroup::Id`] if the trimmed id is empty or unsafe as
    /// a key-path segment, [`InvalidGroup::Name`] if the trimmed name is
    /// empty.
    pub fn validate(&mut self) -> Result<(), InvalidGroup> {
        self.id = self.id.trim().to_string();
        if !is_safe_key_segment(&self.id) {
            return Err(InvalidGroup::Id);
        }

        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(InvalidGroup::Name);
        }

        Ok(())
    }

    /// Whether `node_id` is a member of this group, by exact match in
    /// sequence order.
    #[must_use]
    pub fn includes_node(&self, node_id: &str) -> bool {
        self.node_ids.iter().any(|nid| nid == node_id)
    }
}

fn is_safe_key_segment(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
}

impl TryFrom<Bytes> for Group {
    type Error = serde_json::Error;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        serde_json::from_slice(&bytes)
    }
}

impl TryInto<Bytes> for Group {
    type Error = serde_json::Error;

    fn try_into(self) -> Result<Bytes, Self::Error> {
        serde_json::to_vec(&self).map(Bytes::from)
    }
}
