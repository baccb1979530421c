//! Published poll results and the last-known-good cache.
//!
//! A [`Snapshot`] is keyed twice: every value is reachable by descriptor
//! name and by the decimal string of its register address. Consumers rely
//! on both forms, so they are kept as one contract rather than an accident
//! of storage. When two descriptors share an address (one per bank), the
//! address key holds whichever was written last in table order.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::descriptor::RegisterDescriptor;
use crate::value::Reading;

/// Immutable result of one poll cycle.
#[derive(Debug, Clone)]
pub struct Snapshot {
    by_name: BTreeMap<String, Reading>,
    by_address: BTreeMap<String, Reading>,
    taken_at: DateTime<Utc>,
    cycle: u64,
}

impl Snapshot {
    /// Look up by name or by address string, name first.
    pub fn get(&self, key: &str) -> Option<Reading> {
        self.by_name
            .get(key)
            .or_else(|| self.by_address.get(key))
            .copied()
    }

    pub fn by_name(&self, name: &str) -> Option<Reading> {
        self.by_name.get(name).copied()
    }

    pub fn by_address(&self, address: u16) -> Option<Reading> {
        self.by_address.get(&address.to_string()).copied()
    }

    /// Number of descriptors with a value.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Values keyed by descriptor name, sorted by name.
    pub fn iter_names(&self) -> impl Iterator<Item = (&str, Reading)> {
        self.by_name.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// All entries under both key forms.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Reading)> {
        self.by_name
            .iter()
            .chain(self.by_address.iter())
            .map(|(k, v)| (k.as_str(), *v))
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Sequence number of the cycle that produced this snapshot.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Flat JSON object with both key forms.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries()
                .map(|(k, v)| {
                    let value = match v {
                        Reading::Int(i) => serde_json::Value::from(i),
                        Reading::Float(f) => serde_json::Value::from(f),
                    };
                    (k.to_string(), value)
                })
                .collect(),
        )
    }
}

/// Values only: two snapshots of an unchanged device compare equal even
/// though their timestamps and cycle numbers differ.
impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.by_name == other.by_name && self.by_address == other.by_address
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.by_name.len() + self.by_address.len()))?;
        for (key, value) in self.entries() {
            map.serialize_entry(key, &value)?;
        }
        map.end()
    }
}

/// Accumulates one cycle's values, writing both key forms per insert.
#[derive(Debug, Default)]
pub(crate) struct SnapshotBuilder {
    by_name: BTreeMap<String, Reading>,
    by_address: BTreeMap<String, Reading>,
}

impl SnapshotBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, descriptor: &RegisterDescriptor, value: Reading) {
        self.by_name.insert(descriptor.name.clone(), value);
        self.by_address.insert(descriptor.address_key(), value);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub(crate) fn build(self, cycle: u64, taken_at: DateTime<Utc>) -> Snapshot {
        Snapshot {
            by_name: self.by_name,
            by_address: self.by_address,
            taken_at,
            cycle,
        }
    }
}

/// Most recent decoded value per descriptor name.
///
/// Written only by the polling loop, and only through a committed
/// [`CacheStage`]: a cycle that is dropped half-way leaves the cache as it
/// was.
#[derive(Debug, Default)]
pub(crate) struct LastGoodCache {
    values: HashMap<String, Reading>,
}

/// Cache updates collected during one cycle.
#[derive(Debug, Default)]
pub(crate) struct CacheStage {
    updates: Vec<(String, Reading)>,
}

impl CacheStage {
    pub(crate) fn record(&mut self, name: &str, value: Reading) {
        self.updates.push((name.to_string(), value));
    }
}

impl LastGoodCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, name: &str) -> Option<Reading> {
        self.values.get(name).copied()
    }

    pub(crate) fn stage(&self) -> CacheStage {
        CacheStage::default()
    }

    pub(crate) fn commit(&mut self, stage: CacheStage) {
        self.values.extend(stage.updates);
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }
}
