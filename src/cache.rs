//! In-memory identity tables for one import run.
//!
//! Dimension names (categories, topics, tags) map to their row id so repeated names share a row.
//! Word literals map to every word row carrying that literal, which is what relation triples are
//! resolved against once the words are stored.

use crate::db;
use crate::error::Result;
use crate::parse::{NewWord, WordKey};
use log::debug;
use rusqlite::{Connection, params};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Category,
    Topic,
    Tag,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::Category, Dimension::Topic, Dimension::Tag];

    pub fn table(self) -> &'static str {
        match self {
            Dimension::Category => "categories",
            Dimension::Topic => "topics",
            Dimension::Tag => "tags",
        }
    }
}

/// Name and literal lookup tables scoped to one import run.
///
/// Entries created while a flush is open are journaled; `rollback` forgets them so the cache never
/// points at rows of a transaction that did not commit.
#[derive(Debug, Default)]
pub struct IdentityCache {
    dimensions: HashMap<Dimension, HashMap<String, i64>>,
    words: HashMap<String, Vec<i64>>,
    word_keys: HashSet<WordKey>,
    journal: Vec<JournalEntry>,
}

#[derive(Debug)]
enum JournalEntry {
    Dimension(Dimension, String),
    Word(String),
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a cache holding every dimension and word row already present in the store.
    pub fn preload(conn: &Connection) -> Result<Self> {
        let mut cache = Self::new();
        for dim in Dimension::ALL {
            let entries = db::load_dimension(conn, dim.table())?;
            debug!("Preloaded {} {}", entries.len(), dim.table());
            cache.dimensions.entry(dim).or_default().extend(entries);
        }
        let words = db::load_word_keys(conn)?;
        debug!("Preloaded {} words", words.len());
        for (id, literal, pos, lang_code, etymology_number) in words {
            cache
                .word_keys
                .insert((literal.clone(), pos, lang_code, etymology_number));
            cache.words.entry(literal).or_default().push(id);
        }
        Ok(cache)
    }

    /// Returns the id for a dimension name, inserting a new row through `conn` on first sight.
    /// Blank names resolve to `None`.
    pub fn resolve_dimension(
        &mut self,
        conn: &Connection,
        dim: Dimension,
        name: &str,
    ) -> Result<Option<i64>> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        if let Some(id) = self.dimensions.get(&dim).and_then(|m| m.get(name)) {
            return Ok(Some(*id));
        }
        let mut stmt =
            conn.prepare_cached(&format!("INSERT INTO {} (name) VALUES (?1)", dim.table()))?;
        stmt.execute(params![name])?;
        let id = conn.last_insert_rowid();
        self.dimensions
            .entry(dim)
            .or_default()
            .insert(name.to_string(), id);
        self.journal.push(JournalEntry::Dimension(dim, name.to_string()));
        Ok(Some(id))
    }

    pub fn dimension_id(&self, dim: Dimension, name: &str) -> Option<i64> {
        self.dimensions.get(&dim)?.get(name.trim()).copied()
    }

    /// Records that `key` is taken. Returns `false` if a word with the same identity exists already.
    pub fn claim_word_key(&mut self, key: WordKey) -> bool {
        self.word_keys.insert(key)
    }

    /// Inserts a word row through `conn` and files its key under the word's literal.
    pub fn register_word(&mut self, conn: &Connection, word: &NewWord) -> Result<i64> {
        let mut stmt = conn.prepare_cached(
            "INSERT INTO words (literal, literal_lower, part_of_speech, language, language_code, etymology_text, etymology_number)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        stmt.execute(params![
            word.literal,
            word.literal.to_lowercase(),
            word.part_of_speech,
            word.language,
            word.language_code,
            word.etymology_text,
            word.etymology_number,
        ])?;
        let id = conn.last_insert_rowid();
        self.remember_word(&word.literal, id);
        Ok(id)
    }

    fn remember_word(&mut self, literal: &str, id: i64) {
        self.words.entry(literal.to_string()).or_default().push(id);
        self.journal.push(JournalEntry::Word(literal.to_string()));
    }

    /// All word rows sharing `literal`, in insertion order.
    pub fn lookup_all(&self, literal: &str) -> &[i64] {
        self.words.get(literal).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Literals with at least one stored word row.
    pub fn literals(&self) -> impl Iterator<Item = &str> {
        self.words.keys().map(String::as_str)
    }

    pub fn word_count(&self) -> usize {
        self.words.values().map(Vec::len).sum()
    }

    /// Drops every literal not accepted by `keep` and returns the ids of the removed word rows.
    pub fn retain_literals(&mut self, mut keep: impl FnMut(&str) -> bool) -> Vec<i64> {
        let mut removed = Vec::new();
        self.words.retain(|literal, ids| {
            if keep(literal) {
                true
            } else {
                removed.extend(ids.iter().copied());
                false
            }
        });
        removed.sort_unstable();
        removed
    }

    /// Marks everything created since the last commit/rollback as durable.
    pub fn commit(&mut self) {
        self.journal.clear();
    }

    /// Forgets everything created since the last commit/rollback.
    pub fn rollback(&mut self) {
        for entry in self.journal.drain(..).rev() {
            match entry {
                JournalEntry::Dimension(dim, name) => {
                    if let Some(map) = self.dimensions.get_mut(&dim) {
                        map.remove(&name);
                    }
                }
                JournalEntry::Word(literal) => {
                    if let Some(ids) = self.words.get_mut(&literal) {
                        ids.pop();
                        if ids.is_empty() {
                            self.words.remove(&literal);
                        }
                    }
                }
            }
        }
    }
}
