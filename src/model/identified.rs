//! Identity-keyed ordered collection of records.

use crate::storage::record::Record;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::ops::Deref;

/// Records in fetch order with lookup by identity.
///
/// Equality compares the ordered elements only, so two fetches of the same
/// rows compare equal regardless of how they were built. Records without an
/// identity are kept in order but are not addressable by [`get`](Self::get).
#[derive(Debug, Clone)]
pub struct IdentifiedVec<T> {
    items: Vec<T>,
    index: HashMap<i64, usize>,
}

impl<T: Record> IdentifiedVec<T> {
    /// Build from records in their fetch order.
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        let index = items
            .iter()
            .enumerate()
            .filter_map(|(pos, item)| item.id().map(|id| (id, pos)))
            .collect();
        Self { items, index }
    }

    /// Look up a record by identity.
    #[must_use]
    pub fn get(&self, id: i64) -> Option<&T> {
        self.index.get(&id).map(|&pos| &self.items[pos])
    }

    #[must_use]
    pub fn contains_id(&self, id: i64) -> bool {
        self.index.contains_key(&id)
    }

    /// Identities in order.
    #[must_use]
    pub fn ids(&self) -> Vec<i64> {
        self.items.iter().filter_map(|item| item.id()).collect()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T> Default for IdentifiedVec<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> Deref for IdentifiedVec<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl<T: PartialEq> PartialEq for IdentifiedVec<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: Eq> Eq for IdentifiedVec<T> {}

impl<T: Record> FromIterator<T> for IdentifiedVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a, T> IntoIterator for &'a IdentifiedVec<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Serialize> Serialize for IdentifiedVec<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}
