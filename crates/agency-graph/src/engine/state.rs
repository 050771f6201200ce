//! Versioned shared state threaded through every node invocation
//!
//! Nodes never mutate a [`StateContainer`]. They return a [`Delta`] and the
//! executor merges all deltas of a step at once, producing exactly one new
//! version and one history entry.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::StructuralError;
use super::node::NodeName;

/// Field-wise changes returned by a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delta(BTreeMap<String, Value>);

impl Delta {
    /// Create an empty delta
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field (builder style)
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Set a field; the last write to a field within one delta wins
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    /// Value written to a field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Names of written fields, sorted
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Delta {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Which fields a node wrote in a merged step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRecord {
    pub node: NodeName,
    pub fields: Vec<String>,
}

/// One merged step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Version produced by this merge
    pub version: u64,
    pub step: usize,
    /// Writers in merge order. Empty for external merges (e.g. a resume payload).
    pub writers: Vec<WriteRecord>,
    /// Combined delta of the step
    pub delta: Delta,
}

/// Versioned record of named fields plus an append-only merge history
///
/// Invariant: `history().len() as u64 == version()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateContainer {
    fields: BTreeMap<String, Value>,
    version: u64,
    history: Vec<HistoryEntry>,
}

impl StateContainer {
    /// Create version 0 from a seed field map
    pub fn new(seed: BTreeMap<String, Value>) -> Self {
        Self {
            fields: seed,
            version: 0,
            history: Vec::new(),
        }
    }

    /// Create version 0 from `(field, value)` pairs
    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::new(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// All fields, including those set to null
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Field value; `null` counts as absent
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn get_u64(&self, field: &str) -> Option<u64> {
        self.get(field).and_then(Value::as_u64)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    /// Deserialize a field into a typed value
    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> Option<T> {
        self.get(field)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// How many merged steps wrote this field
    pub fn times_written(&self, field: &str) -> usize {
        self.history
            .iter()
            .filter(|entry| entry.delta.get(field).is_some())
            .count()
    }

    /// The node that most recently wrote this field
    pub fn last_writer(&self, field: &str) -> Option<&NodeName> {
        self.history.iter().rev().find_map(|entry| {
            entry
                .writers
                .iter()
                .find(|w| w.fields.iter().any(|f| f == field))
                .map(|w| &w.node)
        })
    }

    /// Step of the latest merge, 0 for a fresh container
    pub fn last_step(&self) -> usize {
        self.history.last().map(|e| e.step).unwrap_or(0)
    }

    /// Merge a single delta with no node attribution
    pub fn merge(&self, delta: Delta) -> Self {
        self.apply(self.last_step(), Vec::new(), delta)
    }

    /// Merge every delta of one step, in the given order
    ///
    /// Fails with a merge conflict if two writers touch the same field.
    /// Always produces exactly one new version, even when every delta is empty.
    pub fn merge_step(
        &self,
        step: usize,
        deltas: &[(NodeName, Delta)],
    ) -> Result<Self, StructuralError> {
        let mut owners: BTreeMap<&str, &NodeName> = BTreeMap::new();
        let mut combined = Delta::new();
        let mut writers = Vec::with_capacity(deltas.len());

        for (node, delta) in deltas {
            for (field, value) in delta.iter() {
                if let Some(previous) = owners.insert(field.as_str(), node) {
                    return Err(StructuralError::MergeConflict {
                        field: field.clone(),
                        writers: vec![previous.clone(), node.clone()],
                    });
                }
                combined.set(field.clone(), value.clone());
            }
            writers.push(WriteRecord {
                node: node.clone(),
                fields: delta.fields().map(str::to_string).collect(),
            });
        }

        Ok(self.apply(step, writers, combined))
    }

    fn apply(&self, step: usize, writers: Vec<WriteRecord>, delta: Delta) -> Self {
        let mut next = self.clone();
        for (field, value) in delta.iter() {
            next.fields.insert(field.clone(), value.clone());
        }
        next.version += 1;
        next.history.push(HistoryEntry {
            version: next.version,
            step,
            writers,
            delta,
        });
        next
    }
}
