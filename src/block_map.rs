use crate::HashMap;
use crate::trace::{SampleKind, TraceTable};
use crate::tracing;
use std::borrow::Borrow;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Opaque basic block identifier, as written by the instrumentation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct BlockId(String);

impl BlockId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for BlockId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BlockId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Dense position of a block inside every BBV and count stamp vector
pub type BlockIndex = usize;

/// Bijection between [`BlockId`]s and dense [`BlockIndex`]es.
///
/// Indices are handed out in the order blocks first appear in `bb_id` rows and
/// are never reassigned, so the map's length is the dimensionality of every vector
/// aggregated against it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockMap {
    indices: HashMap<BlockId, BlockIndex>,
    ids: Vec<BlockId>,
}

impl BlockMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan the `bb_id` rows of `table`, numbering each new block id on first sight
    #[must_use]
    pub fn from_table(table: &TraceTable) -> Self {
        let _span = tracing::span!(tracing::Level::DEBUG, "BlockMap::from_table").entered();
        let mut map = Self::new();
        for row in table.rows_of_kind(&SampleKind::BlockIds) {
            for (_, id) in row.present_values() {
                map.insert(id);
            }
        }
        tracing::event!(tracing::Level::DEBUG, blocks = map.len(), "block map built");
        map
    }

    /// Index of `id`, assigning the next free index if it is new
    pub fn insert(&mut self, id: &str) -> BlockIndex {
        if let Some(&index) = self.indices.get(id) {
            return index;
        }
        let index = self.ids.len();
        self.ids.push(BlockId::new(id));
        self.indices.insert(BlockId::new(id), index);
        index
    }

    #[must_use]
    pub fn index_of(&self, id: &str) -> Option<BlockIndex> {
        self.indices.get(id).copied()
    }

    #[must_use]
    pub fn block_id(&self, index: BlockIndex) -> Option<&BlockId> {
        self.ids.get(index)
    }

    /// Index → id, the inverse of the map
    #[must_use]
    pub fn inverse(&self) -> &[BlockId] {
        &self.ids
    }

    /// Number of distinct blocks, i.e. the vector dimensionality
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// `(id, index)` pairs in index order
    pub fn iter(&self) -> impl Iterator<Item = (&BlockId, BlockIndex)> {
        self.ids.iter().enumerate().map(|(index, id)| (id, index))
    }
}

impl<'a> FromIterator<&'a str> for BlockMap {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        let mut map = Self::new();
        for id in iter {
            map.insert(id);
        }
        map
    }
}
