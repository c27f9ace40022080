use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use super::StoreError;

/// Document selector for [`Collection::find`].
#[derive(Debug, Clone, Copy)]
pub enum Filter<'a> {
    All,
    /// Top-level field equals the given value.
    Eq(&'a str, &'a Value),
}

#[derive(Debug, Clone)]
pub(super) struct StoredDocument {
    pub(super) seq: u64,
    pub(super) doc: Value,
}

#[derive(Debug, Default)]
pub(super) struct CollectionState {
    pub(super) docs: HashMap<String, StoredDocument>,
    pub(super) next_seq: u64,
    /// field -> indexed value -> document id
    unique: HashMap<String, HashMap<String, String>>,
    /// field -> indexed value -> ids of every document holding it
    lookup: HashMap<String, HashMap<String, BTreeSet<String>>>,
}

impl CollectionState {
    fn index_lookup(&mut self, id: &str, doc: &Value) {
        for (field, index) in &mut self.lookup {
            if let Some(key) = index_key(doc, field) {
                index.entry(key).or_default().insert(id.to_string());
            }
        }
    }
}

/// A named set of JSON documents keyed by id.
///
/// Each call takes the collection lock once, so a single call is atomic with respect
/// to every other call on the same collection. Nothing spans two calls. Writes check
/// that the store is open while holding the lock, so none lands after a close.
#[derive(Debug)]
pub struct Collection {
    name: String,
    open: Arc<AtomicBool>,
    state: RwLock<CollectionState>,
}

impl Collection {
    pub(super) fn new(name: String, open: Arc<AtomicBool>, state: CollectionState) -> Self {
        Self {
            name,
            open,
            state: RwLock::new(state),
        }
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.open.load(AtomicOrdering::Acquire) {
            Ok(())
        } else {
            Err(StoreError::Closed)
        }
    }

    fn duplicate(&self, field: &str, value: String) -> StoreError {
        StoreError::DuplicateKey {
            collection: self.name.clone(),
            field: field.to_string(),
            value,
        }
    }

    /// Declares `field` unique across the collection. Existing documents are indexed
    /// immediately; if they already collide the index is not created.
    pub fn ensure_unique_index(&self, field: &str) -> Result<(), StoreError> {
        let mut state = self.state.write();
        self.check_open()?;
        if state.unique.contains_key(field) {
            return Ok(());
        }
        let mut index = HashMap::with_capacity(state.docs.len());
        for (id, stored) in &state.docs {
            if let Some(key) = index_key(&stored.doc, field) {
                if index.insert(key.clone(), id.clone()).is_some() {
                    return Err(self.duplicate(field, key));
                }
            }
        }
        state.unique.insert(field.to_string(), index);
        Ok(())
    }

    /// Indexes `field` for [`Filter::Eq`] lookups. Values need not be unique.
    pub fn ensure_index(&self, field: &str) -> Result<(), StoreError> {
        let mut state = self.state.write();
        self.check_open()?;
        if state.lookup.contains_key(field) {
            return Ok(());
        }
        let mut index: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (id, stored) in &state.docs {
            if let Some(key) = index_key(&stored.doc, field) {
                index.entry(key).or_default().insert(id.clone());
            }
        }
        state.lookup.insert(field.to_string(), index);
        Ok(())
    }

    /// Inserts a new document. Fails with [`StoreError::DuplicateKey`] when the id or
    /// any uniquely indexed field is already taken; in that case nothing is written.
    pub fn insert_one<T: Serialize>(&self, id: &str, document: &T) -> Result<(), StoreError> {
        let doc = self.encode(document)?;

        let mut state = self.state.write();
        self.check_open()?;
        if state.docs.contains_key(id) {
            return Err(self.duplicate("_id", id.to_string()));
        }
        let mut keys = Vec::with_capacity(state.unique.len());
        for (field, index) in &state.unique {
            if let Some(key) = index_key(&doc, field) {
                if index.contains_key(&key) {
                    return Err(self.duplicate(field, key));
                }
                keys.push((field.clone(), key));
            }
        }
        for (field, key) in keys {
            if let Some(index) = state.unique.get_mut(&field) {
                index.insert(key, id.to_string());
            }
        }
        state.index_lookup(id, &doc);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.docs.insert(id.to_string(), StoredDocument { seq, doc });
        Ok(())
    }

    pub fn find_one<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>, StoreError> {
        self.check_open()?;
        let doc = match self.state.read().docs.get(id) {
            Some(stored) => stored.doc.clone(),
            None => return Ok(None),
        };
        self.decode(doc).map(Some)
    }

    /// Returns every matching document, newest first by `sort_field` with insertion
    /// order as the tiebreak.
    pub fn find<T: DeserializeOwned>(
        &self,
        filter: Filter<'_>,
        sort_field: &str,
    ) -> Result<Vec<T>, StoreError> {
        self.check_open()?;
        let mut matched: Vec<StoredDocument> = {
            let state = self.state.read();
            let indexed = match filter {
                Filter::Eq(field, value) => state
                    .lookup
                    .get(field)
                    .map(|index| value_key(value).and_then(|key| index.get(&key))),
                Filter::All => None,
            };
            let matches = |stored: &&StoredDocument| match filter {
                Filter::All => true,
                Filter::Eq(field, value) => stored.doc.get(field) == Some(value),
            };
            match indexed {
                Some(ids) => ids
                    .into_iter()
                    .flatten()
                    .filter_map(|id| state.docs.get(id))
                    .filter(matches)
                    .cloned()
                    .collect(),
                None => state.docs.values().filter(matches).cloned().collect(),
            }
        };
        matched.sort_by(|a, b| {
            compare_field(&b.doc, &a.doc, sort_field).then_with(|| b.seq.cmp(&a.seq))
        });
        matched
            .into_iter()
            .map(|stored| self.decode(stored.doc))
            .collect()
    }

    /// Applies `update` to the stored document in place. Returns `false` when no
    /// document has that id. The whole read-modify-write happens under the write lock.
    pub fn update_one<F>(&self, id: &str, update: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&mut serde_json::Map<String, Value>),
    {
        let mut guard = self.state.write();
        self.check_open()?;
        let state = &mut *guard;
        let Some(stored) = state.docs.get_mut(id) else {
            return Ok(false);
        };

        let mut updated = stored.doc.clone();
        if let Value::Object(fields) = &mut updated {
            update(fields);
        }

        let mut moved = Vec::new();
        for (field, index) in &state.unique {
            let before = index_key(&stored.doc, field);
            let after = index_key(&updated, field);
            if before == after {
                continue;
            }
            if let Some(key) = &after {
                if index.get(key).is_some_and(|owner| owner != id) {
                    return Err(self.duplicate(field, key.clone()));
                }
            }
            moved.push((field.clone(), before, after));
        }
        for (field, before, after) in moved {
            if let Some(index) = state.unique.get_mut(&field) {
                if let Some(key) = before {
                    index.remove(&key);
                }
                if let Some(key) = after {
                    index.insert(key, id.to_string());
                }
            }
        }
        for (field, index) in &mut state.lookup {
            let before = index_key(&stored.doc, field);
            let after = index_key(&updated, field);
            if before == after {
                continue;
            }
            if let Some(key) = before {
                if let Some(ids) = index.get_mut(&key) {
                    ids.remove(id);
                    if ids.is_empty() {
                        index.remove(&key);
                    }
                }
            }
            if let Some(key) = after {
                index.entry(key).or_default().insert(id.to_string());
            }
        }
        stored.doc = updated;
        Ok(true)
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        self.check_open()?;
        Ok(self.state.read().docs.len())
    }

    pub(super) fn snapshot(&self) -> Vec<(String, StoredDocument)> {
        let state = self.state.read();
        let mut docs: Vec<_> = state
            .docs
            .iter()
            .map(|(id, stored)| (id.clone(), stored.clone()))
            .collect();
        docs.sort_by_key(|(_, stored)| stored.seq);
        docs
    }

    fn encode<T: Serialize>(&self, document: &T) -> Result<Value, StoreError> {
        serde_json::to_value(document).map_err(|source| StoreError::Encode {
            collection: self.name.clone(),
            source,
        })
    }

    fn decode<T: DeserializeOwned>(&self, doc: Value) -> Result<T, StoreError> {
        serde_json::from_value(doc).map_err(|source| StoreError::Decode {
            collection: self.name.clone(),
            source,
        })
    }
}

pub(super) fn restore_state(docs: Vec<(String, StoredDocument)>) -> CollectionState {
    let next_seq = docs.iter().map(|(_, d)| d.seq + 1).max().unwrap_or(0);
    CollectionState {
        docs: docs.into_iter().collect(),
        next_seq,
        unique: HashMap::new(),
        lookup: HashMap::new(),
    }
}

fn index_key(doc: &Value, field: &str) -> Option<String> {
    value_key(doc.get(field)?)
}

fn value_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Orders two documents by a field. RFC 3339 timestamps compare chronologically
/// (their textual form does not, because of variable fractional digits).
fn compare_field(a: &Value, b: &Value, field: &str) -> Ordering {
    match (a.get(field), b.get(field)) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => {
            match (
                chrono::DateTime::parse_from_rfc3339(x),
                chrono::DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            }
        }
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}
