//! Abstract entity stores and the in-memory implementation.
//!
//! The engines only ever see the narrow `EntityStore` surface (get / filter /
//! create / update), so a database-backed store is a drop-in replacement.
//! `MemStore` keeps rows in a `parking_lot::RwLock<HashMap>`; iteration order
//! is unspecified, callers that care about order sort the results.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use parking_lot::RwLock;

use crate::model::{Delivery, Participant, Profile, Rule, Test, TrackedEvent, Variant};

/// Row types expose their store key
pub trait Keyed {
    fn key(&self) -> String;
}

impl Keyed for Test {
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Keyed for Variant {
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Keyed for Rule {
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Keyed for Delivery {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Keyed for Profile {
    fn key(&self) -> String {
        self.user_id.clone()
    }
}

impl Keyed for TrackedEvent {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Keyed for Participant {
    fn key(&self) -> String {
        Participant::key_for(&self.test_id, &self.user_id)
    }
}

/// Narrow store surface the engines are written against
pub trait EntityStore<T: Clone>: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<T>>;

    /// All rows matching `pred`, optionally capped. Unordered.
    fn filter(&self, pred: &dyn Fn(&T) -> bool, limit: Option<usize>) -> Result<Vec<T>>;

    /// Insert a new row; duplicate keys are an error
    fn create(&self, record: T) -> Result<T>;

    /// Apply `patch` to the row under `key`, returning the updated row
    fn update(&self, key: &str, patch: &dyn Fn(&mut T)) -> Result<Option<T>>;
}

/// Result of an atomic create-if-absent
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Participant),
    /// A concurrent writer (or an earlier call) won; this is their row
    Existing(Participant),
}

/// Participant store contract: assignment must be able to insert atomically
/// keyed on (test_id, user_id) and learn who won a racing write.
pub trait ParticipantStore: EntityStore<Participant> {
    fn create_if_absent(&self, record: Participant) -> Result<CreateOutcome>;
}

/// In-memory store, the default backing for all entities
pub struct MemStore<T> {
    rows: RwLock<HashMap<String, T>>,
}

impl<T> MemStore<T> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> Default for MemStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Keyed + Clone + Send + Sync> EntityStore<T> for MemStore<T> {
    fn get(&self, key: &str) -> Result<Option<T>> {
        Ok(self.rows.read().get(key).cloned())
    }

    fn filter(&self, pred: &dyn Fn(&T) -> bool, limit: Option<usize>) -> Result<Vec<T>> {
        let rows = self.rows.read();
        let iter = rows.values().filter(|r| pred(r)).cloned();
        Ok(match limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        })
    }

    fn create(&self, record: T) -> Result<T> {
        let key = record.key();
        let mut rows = self.rows.write();
        if rows.contains_key(&key) {
            return Err(anyhow!("duplicate key: {key}"));
        }
        rows.insert(key, record.clone());
        Ok(record)
    }

    fn update(&self, key: &str, patch: &dyn Fn(&mut T)) -> Result<Option<T>> {
        let mut rows = self.rows.write();
        match rows.get_mut(key) {
            Some(row) => {
                patch(row);
                Ok(Some(row.clone()))
            }
            None => Ok(None),
        }
    }
}

impl ParticipantStore for MemStore<Participant> {
    fn create_if_absent(&self, record: Participant) -> Result<CreateOutcome> {
        let key = record.key();
        let mut rows = self.rows.write();
        match rows.get(&key) {
            // The winner's row is returned untouched; the losing write
            // becomes a no-op.
            Some(existing) => Ok(CreateOutcome::Existing(existing.clone())),
            None => {
                rows.insert(key, record.clone());
                Ok(CreateOutcome::Created(record))
            }
        }
    }
}
