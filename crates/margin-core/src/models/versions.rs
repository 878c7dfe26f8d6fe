//! Per-device version counters

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Map of device id to a monotonically increasing edit counter.
///
/// A lightweight vector clock: merging takes the per-device maximum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionVector(BTreeMap<String, u64>);

impl VersionVector {
    /// Counter recorded for `device_id` (0 when absent).
    pub fn get(&self, device_id: &str) -> u64 {
        self.0.get(device_id).copied().unwrap_or(0)
    }

    /// Bump the counter for `device_id` and return the new value.
    pub fn increment(&mut self, device_id: &str) -> u64 {
        let counter = self.0.entry(device_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Per-device maximum of both vectors.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut merged = self.0.clone();
        for (device, &counter) in &other.0 {
            let entry = merged.entry(device.clone()).or_insert(0);
            *entry = (*entry).max(counter);
        }
        Self(merged)
    }

    /// Whether `self` has seen every edit of `other` plus at least one more.
    pub fn dominates(&self, other: &Self) -> bool {
        let covers = other.iter().all(|(device, counter)| self.get(device) >= counter);
        covers && self.iter().any(|(device, counter)| counter > other.get(device))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(device, counter)| (device.as_str(), *counter))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(&str, u64); N]> for VersionVector {
    fn from(entries: [(&str, u64); N]) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(device, counter)| (device.to_string(), counter))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_starts_at_one() {
        let mut versions = VersionVector::default();
        assert_eq!(versions.increment("laptop"), 1);
        assert_eq!(versions.increment("laptop"), 2);
        assert_eq!(versions.get("phone"), 0);
    }

    #[test]
    fn dominance_requires_strictly_newer_edits() {
        let newer = VersionVector::from([("phone", 2), ("laptop", 1)]);
        let older = VersionVector::from([("phone", 1), ("laptop", 1)]);
        let concurrent = VersionVector::from([("phone", 1), ("laptop", 2)]);
        assert!(newer.dominates(&older));
        assert!(!older.dominates(&newer));
        assert!(!newer.dominates(&newer.clone()));
        assert!(!newer.dominates(&concurrent));
        assert!(!concurrent.dominates(&newer));
    }

    #[test]
    fn merged_takes_per_device_maximum() {
        let local = VersionVector::from([("deviceA", 2)]);
        let remote = VersionVector::from([("deviceA", 1), ("deviceB", 3)]);
        let merged = local.merged(&remote);
        assert_eq!(merged.get("deviceA"), 2);
        assert_eq!(merged.get("deviceB"), 3);
    }

    #[test]
    fn serializes_as_plain_object() {
        let versions = VersionVector::from([("deviceA", 2)]);
        assert_eq!(serde_json::to_string(&versions).unwrap(), r#"{"deviceA":2}"#);
    }
}
