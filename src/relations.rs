//! Relation normalization: turns the relation lists of a source record into
//! literal-level `(subject, predicate, object)` triples with canonical predicate names.

use crate::models::{Linkage, WordEntry};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Source relation field names and the canonical predicate stored for each.
pub const RELATION_FIELDS: &[(&str, &str)] = &[
    ("synonyms", "synonym"),
    ("antonyms", "antonym"),
    ("hypernyms", "hypernym"),
    ("hyponyms", "hyponym"),
    ("meronyms", "meronym"),
    ("holonyms", "holonym"),
    ("troponyms", "troponym"),
    ("coordinate_terms", "coordinate_term"),
    ("derived", "derived"),
    ("related", "related"),
];

/// A relation between two word literals, before literals are resolved to store keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTriple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
    /// Textual sense hint of the target, kept as an attribute only.
    pub sense_qualifier: Option<String>,
    pub topics: Option<String>,
    pub taxonomic: Option<String>,
}

/// Literal-level triples of a whole run, deduplicated on `(subject, predicate, object)`.
///
/// The first occurrence of a triple keeps its attributes. Iteration is in sorted key order so that
/// resolution produces the same edges regardless of how the input was batched.
#[derive(Debug, Clone, Default)]
pub struct RawTripleSet {
    triples: BTreeMap<(String, String, String), RawTriple>,
}

impl RawTripleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a triple; returns `false` if it was already present.
    pub fn insert(&mut self, triple: RawTriple) -> bool {
        let key = (
            triple.subject.clone(),
            triple.predicate.clone(),
            triple.object.clone(),
        );
        if self.triples.contains_key(&key) {
            return false;
        }
        self.triples.insert(key, triple);
        true
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RawTriple> {
        self.triples.values()
    }
}

impl IntoIterator for RawTripleSet {
    type Item = RawTriple;
    type IntoIter = std::collections::btree_map::IntoValues<(String, String, String), RawTriple>;

    fn into_iter(self) -> Self::IntoIter {
        self.triples.into_values()
    }
}

/// Output of [`extract_triples`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedRelations {
    pub triples: Vec<RawTriple>,
    /// Relation field names with no entry in [`RELATION_FIELDS`]; they were passed through as-is.
    pub unmapped: Vec<String>,
}

/// Looks up the canonical predicate for a relation name, accepting names that are already canonical.
pub fn canonical_predicate(name: &str) -> Option<&'static str> {
    RELATION_FIELDS
        .iter()
        .find(|(field, canonical)| *field == name || *canonical == name)
        .map(|(_, canonical)| *canonical)
}

/// Canonical predicate for `name`; unmapped names pass through unchanged.
pub fn canonicalize(name: &str) -> String {
    canonical_predicate(name)
        .map(str::to_string)
        .unwrap_or_else(|| name.to_string())
}

/// Whether a record field holds a relation list.
pub fn is_relation_field(name: &str) -> bool {
    canonical_predicate(name).is_some() || name.ends_with("nyms")
}

/// Flattens the entry-level and per-sense relation lists of `entry` into triples whose subject is
/// `subject`. Pure: nothing is logged or written here.
pub fn extract_triples(subject: &str, entry: &WordEntry) -> NormalizedRelations {
    let mut out = NormalizedRelations::default();
    collect_from_fields(subject, &entry.extra, &mut out);
    for sense in &entry.senses {
        collect_from_fields(subject, &sense.extra, &mut out);
    }
    out
}

fn collect_from_fields(subject: &str, fields: &Map<String, Value>, out: &mut NormalizedRelations) {
    for (field, value) in fields {
        if !is_relation_field(field) {
            continue;
        }
        let Some(items) = value.as_array() else {
            continue;
        };
        let predicate = match canonical_predicate(field) {
            Some(canonical) => canonical.to_string(),
            None => {
                if !out.unmapped.iter().any(|u| u == field) {
                    out.unmapped.push(field.clone());
                }
                field.clone()
            }
        };
        for item in items {
            let Ok(linkage) = Linkage::deserialize(item) else {
                continue;
            };
            let object = linkage.word.trim();
            if object.is_empty() {
                continue;
            }
            out.triples.push(RawTriple {
                subject: subject.to_string(),
                predicate: predicate.clone(),
                object: object.to_string(),
                sense_qualifier: linkage.sense.filter(|s| !s.trim().is_empty()),
                topics: if linkage.topics.is_empty() {
                    None
                } else {
                    Some(linkage.topics.join(","))
                },
                taxonomic: linkage.taxonomic,
            });
        }
    }
}
