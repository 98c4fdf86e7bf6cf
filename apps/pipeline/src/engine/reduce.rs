#![allow(dead_code)]

//! Result Reducer: merges per-batch partial results into one deterministic aggregate.
//!
//! Merge rules by category kind:
//! - counter: values summed per key
//! - set: concatenated, deduplicated, first-seen order kept
//! - nested: merged recursively with the same rules
//!
//! After merging, every counter is ordered by descending value. The sort is
//! stable, so ties keep the order in which keys were first seen.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::errors::ReduceError;

// ────────────────────────────────────────────────────────────────────────────
// Data model
// ────────────────────────────────────────────────────────────────────────────

/// A frequency table with deterministic key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counter {
    entries: Vec<(String, i64)>,
}

impl Counter {
    /// Builds a counter, summing repeated keys into their first position.
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, i64)>,
        K: Into<String>,
    {
        let mut entries: Vec<(String, i64)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for (key, count) in pairs {
            let key = key.into();
            match index.get(&key) {
                Some(&i) => entries[i].1 = entries[i].1.saturating_add(count),
                None => {
                    index.insert(key.clone(), entries.len());
                    entries.push((key, count));
                }
            }
        }
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, count)| *count)
    }

    pub fn entries(&self) -> &[(String, i64)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Value of one category in a partial or aggregate result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    Counter(Counter),
    Set(Vec<String>),
    Nested(PartialResult),
}

impl Category {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Category::Counter(_) => "counter",
            Category::Set(_) => "set",
            Category::Nested(_) => "nested mapping",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Category::Counter(counter) => Value::Object(
                counter
                    .entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(*v)))
                    .collect(),
            ),
            Category::Set(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            Category::Nested(nested) => nested.to_json(),
        }
    }
}

/// Structured output of one batch or chunk: category name → value.
/// Category order is the order of first insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialResult {
    categories: Vec<(String, Category)>,
}

/// The reducer's output has the same shape as its inputs.
pub type AggregateResult = PartialResult;

impl PartialResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a category, replacing any existing value under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: Category) {
        let name = name.into();
        match self.categories.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.categories.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: Category) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Category)> {
        self.categories.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .categories
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Value::Object(map)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Reduction
// ────────────────────────────────────────────────────────────────────────────

/// Merges partial results in sequence order into a single aggregate.
///
/// Fails only when two partials disagree on the kind of the same category,
/// which is an aggregation-level (stage-fatal) error.
pub fn reduce<I>(partials: I) -> Result<AggregateResult, ReduceError>
where
    I: IntoIterator<Item = PartialResult>,
{
    let mut acc = Accumulator::default();
    for partial in partials {
        acc.absorb(partial, "")?;
    }
    Ok(acc.finish())
}

#[derive(Default)]
struct Accumulator {
    slots: Vec<(String, Slot)>,
    index: HashMap<String, usize>,
}

enum Slot {
    Counter {
        entries: Vec<(String, i64)>,
        index: HashMap<String, usize>,
    },
    Set {
        items: Vec<String>,
        seen: HashSet<String>,
    },
    Nested(Box<Accumulator>),
}

impl Slot {
    fn empty_like(category: &Category) -> Self {
        match category {
            Category::Counter(_) => Slot::Counter {
                entries: Vec::new(),
                index: HashMap::new(),
            },
            Category::Set(_) => Slot::Set {
                items: Vec::new(),
                seen: HashSet::new(),
            },
            Category::Nested(_) => Slot::Nested(Box::default()),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Slot::Counter { .. } => "counter",
            Slot::Set { .. } => "set",
            Slot::Nested(_) => "nested mapping",
        }
    }
}

impl Accumulator {
    fn absorb(&mut self, partial: PartialResult, prefix: &str) -> Result<(), ReduceError> {
        for (name, category) in partial.categories {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };

            let slot_index = match self.index.get(&name) {
                Some(&i) => i,
                None => {
                    self.index.insert(name.clone(), self.slots.len());
                    self.slots.push((name, Slot::empty_like(&category)));
                    self.slots.len() - 1
                }
            };
            let slot = &mut self.slots[slot_index].1;

            match (slot, category) {
                (Slot::Counter { entries, index }, Category::Counter(counter)) => {
                    for (key, count) in counter.entries {
                        match index.get(&key) {
                            Some(&i) => entries[i].1 = entries[i].1.saturating_add(count),
                            None => {
                                index.insert(key.clone(), entries.len());
                                entries.push((key, count));
                            }
                        }
                    }
                }
                (Slot::Set { items, seen }, Category::Set(incoming)) => {
                    for item in incoming {
                        if seen.insert(item.clone()) {
                            items.push(item);
                        }
                    }
                }
                (Slot::Nested(inner), Category::Nested(nested)) => {
                    inner.absorb(nested, &path)?;
                }
                (slot, category) => {
                    return Err(ReduceError::KindMismatch {
                        category: path,
                        existing: slot.kind_name(),
                        incoming: category.kind_name(),
                    });
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> AggregateResult {
        let categories = self
            .slots
            .into_iter()
            .map(|(name, slot)| {
                let category = match slot {
                    Slot::Counter { mut entries, .. } => {
                        // Stable sort: equal counts stay in first-seen order.
                        entries.sort_by(|a, b| b.1.cmp(&a.1));
                        Category::Counter(Counter { entries })
                    }
                    Slot::Set { items, .. } => Category::Set(items),
                    Slot::Nested(inner) => Category::Nested(inner.finish()),
                };
                (name, category)
            })
            .collect();
        PartialResult { categories }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
