//! Depth-bounded relationship traversal over the stored word graph.
//!
//! Edges are followed in both directions. The frontier expands one level per step, so a word is
//! visited at the smallest depth it is reachable at and no node is expanded twice.

use crate::db;
use crate::error::{Result, WikiliteError};
use crate::models::Triple;
use log::debug;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Every relation on a path of at most `max_depth` hops from `start`, ordered by relation id.
///
/// When `allowed` is `Some` and non-empty only relations with one of those predicates are
/// followed and returned. An unknown `start` yields an empty list.
pub fn bounded_relations(
    conn: &Connection,
    start: i64,
    max_depth: u32,
    allowed: Option<&[String]>,
) -> Result<Vec<Triple>> {
    if max_depth == 0 {
        return Err(WikiliteError::InvalidArgument(
            "max depth must be at least 1".to_string(),
        ));
    }
    let exists = conn
        .query_row(
            "SELECT 1 FROM words WHERE id = ?1",
            params![start],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !exists {
        debug!("Traversal start {} is not a stored word", start);
        return Ok(Vec::new());
    }

    let allowed: Option<BTreeSet<&str>> = allowed
        .filter(|preds| !preds.is_empty())
        .map(|preds| preds.iter().map(String::as_str).collect());

    let mut visited = BTreeSet::from([start]);
    let mut edges: BTreeMap<i64, Triple> = BTreeMap::new();
    let mut queue = VecDeque::from([(start, 0u32)]);

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        for triple in db::fetch_incident_relations(conn, node)? {
            if let Some(allowed) = &allowed {
                if !allowed.contains(triple.predicate.as_str()) {
                    continue;
                }
            }
            let next = triple.opposite(node);
            edges.entry(triple.id).or_insert(triple);
            if visited.insert(next) {
                queue.push_back((next, depth + 1));
            }
        }
    }

    debug!(
        "Traversal from {} (depth {}) visited {} words, {} relations",
        start,
        max_depth,
        visited.len(),
        edges.len()
    );
    Ok(edges.into_values().collect())
}
