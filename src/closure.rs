//! Restricts a run's words and triples to a closed subgraph: every kept word has a definition
//! and takes part in at least one relation, and every kept relation joins two defined words.

use crate::relations::{RawTriple, RawTripleSet};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct ClosureOutcome {
    /// Literals whose word rows stay in the store.
    pub keep: HashSet<String>,
    /// Triples between kept literals, in the set's sorted order.
    pub triples: Vec<RawTriple>,
    /// Triples dropped because an endpoint has no definition.
    pub dropped_triples: usize,
}

impl ClosureOutcome {
    pub fn keeps(&self, literal: &str) -> bool {
        self.keep.contains(literal)
    }
}

/// Single pass over the triple set.
///
/// A triple survives when both its literals are defined. The kept literals are exactly the
/// endpoints of the surviving triples, so a defined word with no resolvable relation is dropped
/// along with any edge that dangles to an undefined word.
pub fn apply<'a>(
    defined: impl IntoIterator<Item = &'a str>,
    triples: RawTripleSet,
) -> ClosureOutcome {
    let defined: HashSet<&str> = defined.into_iter().collect();
    let mut outcome = ClosureOutcome::default();

    for triple in triples {
        // Both ends, not either: a word kept for a dangling edge would end up with no relation.
        if defined.contains(triple.subject.as_str()) && defined.contains(triple.object.as_str()) {
            if !outcome.keep.contains(&triple.subject) {
                outcome.keep.insert(triple.subject.clone());
            }
            if !outcome.keep.contains(&triple.object) {
                outcome.keep.insert(triple.object.clone());
            }
            outcome.triples.push(triple);
        } else {
            outcome.dropped_triples += 1;
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(s: &str, p: &str, o: &str) -> RawTriple {
        RawTriple {
            subject: s.to_string(),
            predicate: p.to_string(),
            object: o.to_string(),
            sense_qualifier: None,
            topics: None,
            taxonomic: None,
        }
    }

    fn set(triples: &[(&str, &str, &str)]) -> RawTripleSet {
        let mut set = RawTripleSet::new();
        for (s, p, o) in triples {
            set.insert(triple(s, p, o));
        }
        set
    }

    #[test]
    fn test_keeps_words_in_both_sets() {
        let outcome = apply(
            ["cat", "kitty"],
            set(&[("cat", "synonym", "kitty")]),
        );
        assert!(outcome.keeps("cat"));
        assert!(outcome.keeps("kitty"));
        assert_eq!(outcome.triples.len(), 1);
        assert_eq!(outcome.dropped_triples, 0);
    }

    #[test]
    fn test_drops_dangling_edges_and_isolated_words() {
        let outcome = apply(
            ["cat", "kitty", "dog", "lonely"],
            set(&[
                ("cat", "synonym", "kitty"),
                ("dog", "hypernym", "canine"), // canine is undefined
                ("puppy", "hypernym", "dog"),  // puppy is undefined
            ]),
        );
        assert_eq!(outcome.triples.len(), 1);
        assert_eq!(outcome.dropped_triples, 2);
        assert!(!outcome.keeps("dog"));
        assert!(!outcome.keeps("lonely"));
        assert!(!outcome.keeps("canine"));
        assert_eq!(outcome.keep.len(), 2);
    }

    #[test]
    fn test_self_relation_keeps_word() {
        let outcome = apply(["echo"], set(&[("echo", "related", "echo")]));
        assert!(outcome.keeps("echo"));
        assert_eq!(outcome.keep.len(), 1);
    }
}
