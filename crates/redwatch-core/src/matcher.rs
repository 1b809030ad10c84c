//! Embedding comparison and the first-match naming rule.

use crate::store::EncodingStore;
use crate::types::{Embedding, UNKNOWN_NAME};

/// One flag per `known` entry: `true` when `distance(entry, probe)` is at
/// most `tolerance`.
pub fn compare_faces<D>(known: &[Embedding], probe: &Embedding, tolerance: f32, distance: D) -> Vec<bool>
where
    D: Fn(&Embedding, &Embedding) -> f32,
{
    known.iter().map(|k| distance(k, probe) <= tolerance).collect()
}

/// The store entry a probe resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub name: String,
    pub index: Option<usize>,
}

/// Resolve a name from per-entry match flags.
///
/// First match wins: the earliest flagged entry in store order is chosen even
/// when a later entry is closer. No flagged entry yields [`UNKNOWN_NAME`].
pub fn first_match(store: &EncodingStore, flags: &[bool]) -> Resolved {
    match flags.iter().take(store.len()).position(|&m| m) {
        Some(index) => Resolved {
            name: store.names()[index].clone(),
            index: Some(index),
        },
        None => Resolved {
            name: UNKNOWN_NAME.to_string(),
            index: None,
        },
    }
}
