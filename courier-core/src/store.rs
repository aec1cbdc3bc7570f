//! Keyed record storage shared by the correlation store and the listener registry
//!
//! Records are grouped by [`MessageType`] into insertion-ordered sequences and
//! looked up with optional scope / request id filters. A sequence that becomes
//! empty drops its key, so the map only ever holds active types.

use crate::message::MessageType;
use crate::utils::non_blank;
use std::collections::HashMap;

/// Identity of a stored record, unique within one store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(u64);

/// A record that can live in a [`DataStore`]
pub trait Record {
    /// Channel partition tag of the record
    fn scope(&self) -> Option<&str>;

    /// Correlation id of the record, if any
    fn request_id(&self) -> Option<&str> {
        None
    }

    /// Structural equality used by [`DataStore::remove_record`]
    fn same_as(&self, other: &Self) -> bool;

    /// Normalize fields before insertion (blank strings become absent)
    fn normalize(&mut self) {}
}

/// How a record without a scope reacts to a scope filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeMatch {
    /// Unscoped records only match when no scope filter is given
    #[default]
    Exact,
    /// Unscoped records match every scope filter
    UnscopedIsWildcard,
}

/// Lookup filters; blank fields apply no filtering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub scope: Option<String>,
    pub request_id: Option<String>,
}

impl FindOptions {
    /// Filter on scope only
    pub fn scope(scope: Option<&str>) -> Self {
        Self {
            scope: scope.map(ToString::to_string),
            request_id: None,
        }
    }

    /// Set the request id filter
    pub fn with_request_id(mut self, request_id: Option<&str>) -> Self {
        self.request_id = request_id.map(ToString::to_string);
        self
    }
}

struct Entry<T> {
    id: RecordId,
    record: T,
}

/// Map from message type to an ordered sequence of records
pub struct DataStore<T> {
    map: HashMap<MessageType, Vec<Entry<T>>>,
    next_id: u64,
    scope_match: ScopeMatch,
}

impl<T: Record> DataStore<T> {
    /// Create an empty store with exact scope matching
    pub fn new() -> Self {
        Self::with_scope_match(ScopeMatch::Exact)
    }

    /// Create an empty store with the given scope policy
    pub fn with_scope_match(scope_match: ScopeMatch) -> Self {
        Self {
            map: HashMap::new(),
            next_id: 0,
            scope_match,
        }
    }

    /// Append a record to the sequence of `message_type`
    pub fn add(&mut self, message_type: MessageType, mut record: T) -> RecordId {
        record.normalize();
        self.next_id += 1;
        let id = RecordId(self.next_id);
        self.map
            .entry(message_type)
            .or_default()
            .push(Entry { id, record });
        id
    }

    fn matches(&self, record: &T, scope: Option<&str>, request_id: Option<&str>) -> bool {
        if let Some(scope) = scope {
            match record.scope() {
                Some(own) if own == scope => {}
                None if self.scope_match == ScopeMatch::UnscopedIsWildcard => {}
                _ => return false,
            }
        }
        if let Some(request_id) = request_id {
            if record.request_id() != Some(request_id) {
                return false;
            }
        }
        true
    }

    fn position(&self, message_type: &MessageType, options: &FindOptions) -> Option<usize> {
        let scope = non_blank(options.scope.clone());
        let request_id = non_blank(options.request_id.clone());
        self.map.get(message_type)?.iter().position(|entry| {
            self.matches(&entry.record, scope.as_deref(), request_id.as_deref())
        })
    }

    /// Matching records of `message_type`, in insertion order
    pub fn get(&self, message_type: &MessageType, options: &FindOptions) -> Vec<(RecordId, &T)> {
        let scope = non_blank(options.scope.clone());
        let request_id = non_blank(options.request_id.clone());
        match self.map.get(message_type) {
            Some(entries) => entries
                .iter()
                .filter(|entry| {
                    self.matches(&entry.record, scope.as_deref(), request_id.as_deref())
                })
                .map(|entry| (entry.id, &entry.record))
                .collect(),
            None => Vec::new(),
        }
    }

    /// First matching record
    pub fn get_one(&self, message_type: &MessageType, options: &FindOptions) -> Option<(RecordId, &T)> {
        let index = self.position(message_type, options)?;
        self.map
            .get(message_type)
            .and_then(|entries| entries.get(index))
            .map(|entry| (entry.id, &entry.record))
    }

    /// Whether any record matches
    pub fn has(&self, message_type: &MessageType, options: &FindOptions) -> bool {
        self.position(message_type, options).is_some()
    }

    /// Whether a sequence exists for `message_type`
    pub fn has_type(&self, message_type: &MessageType) -> bool {
        self.map.contains_key(message_type)
    }

    fn remove_at(&mut self, message_type: &MessageType, index: usize) -> Option<T> {
        let entries = self.map.get_mut(message_type)?;
        let entry = entries.remove(index);
        if entries.is_empty() {
            self.map.remove(message_type);
        }
        Some(entry.record)
    }

    /// Remove a record by identity
    pub fn remove(&mut self, message_type: &MessageType, id: RecordId) -> Option<T> {
        let index = self
            .map
            .get(message_type)?
            .iter()
            .position(|entry| entry.id == id)?;
        self.remove_at(message_type, index)
    }

    /// Remove the first record structurally equal to `record`
    pub fn remove_record(&mut self, message_type: &MessageType, record: &T) -> Option<T> {
        let index = self
            .map
            .get(message_type)?
            .iter()
            .position(|entry| entry.record.same_as(record))?;
        self.remove_at(message_type, index)
    }

    /// Remove and return the first matching record
    pub fn remove_one_by_options(
        &mut self,
        message_type: &MessageType,
        options: &FindOptions,
    ) -> Option<T> {
        let index = self.position(message_type, options)?;
        self.remove_at(message_type, index)
    }

    /// Drop the whole sequence of `message_type`
    pub fn remove_by_type(&mut self, message_type: &MessageType) -> Vec<T> {
        self.map
            .remove(message_type)
            .map(|entries| entries.into_iter().map(|entry| entry.record).collect())
            .unwrap_or_default()
    }

    /// Iterate over every record with its type
    pub fn iter(&self) -> impl Iterator<Item = (&MessageType, RecordId, &T)> {
        self.map.iter().flat_map(|(message_type, entries)| {
            entries
                .iter()
                .map(move |entry| (message_type, entry.id, &entry.record))
        })
    }

    /// Total number of records
    pub fn len(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    /// Whether the store holds no record
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of message types with at least one record
    pub fn type_count(&self) -> usize {
        self.map.len()
    }

    /// Remove and return every record; ids keep increasing afterwards
    pub fn drain(&mut self) -> Vec<T> {
        std::mem::take(&mut self.map)
            .into_values()
            .flat_map(|entries| entries.into_iter().map(|entry| entry.record))
            .collect()
    }

    /// Drop every record
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl<T: Record> Default for DataStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
