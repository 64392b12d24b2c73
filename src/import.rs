//! Batch import pipeline.
//!
//! Records are validated and buffered as pending words, senses, examples and forms. Every
//! `batch_size` accepted records the buffers are written in one transaction: words first, then
//! the rows that reference them by the keys SQLite just assigned. Relation triples are collected
//! at the literal level for the whole run and only linked in `finalize`, after the closure filter
//! has decided which words stay.

use crate::cache::{Dimension, IdentityCache};
use crate::closure::{self, ClosureOutcome};
use crate::db;
use crate::error::{Result, WikiliteError};
use crate::models::WordEntry;
use crate::parse::{self, NewExample, NewForm, NewSense, NewTranslation, NewWord};
use crate::progress::{ProgressCallback, ProgressUpdate, report};
use crate::relations::{RawTriple, RawTripleSet};
use log::{debug, info, warn};
use rusqlite::{Connection, Transaction, params};
use serde::Serialize;
use std::collections::HashSet;
use std::io::BufRead;
use std::time::Instant;

pub const DEFAULT_BATCH_SIZE: usize = 50_000;
pub const DEFAULT_FANOUT_WARN_THRESHOLD: usize = 64;

const STAGE_RECORDS: &str = "Importing records";
const STAGE_PRUNE: &str = "Applying closure filter";
const STAGE_LINK: &str = "Linking relations";

/// Options for an import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Accepted records per flush transaction; also the edge count per linking transaction.
    pub batch_size: usize,
    /// Drop an existing complete store at the target path instead of failing.
    pub force: bool,
    /// Homonym fan-out (subject rows x object rows) above which a triple is logged as a warning
    /// and counted in `ImportReport::fanout_warnings`.
    pub fanout_warn_threshold: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        ImportOptions {
            batch_size: DEFAULT_BATCH_SIZE,
            force: false,
            fanout_warn_threshold: DEFAULT_FANOUT_WARN_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Idle,
    Streaming,
    Flushing,
    Done,
    /// A flush failed or was cancelled; the importer accepts no more work.
    Failed,
}

/// Counters for one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Records accepted into the pipeline.
    pub processed: u64,
    pub skipped_malformed: u64,
    pub skipped_invalid: u64,
    pub skipped_duplicate: u64,
    pub flushes: u64,
    pub words_inserted: u64,
    pub senses_inserted: u64,
    pub examples_inserted: u64,
    pub translations_inserted: u64,
    pub forms_inserted: u64,
    /// Word rows removed by the closure filter.
    pub words_pruned: u64,
    pub relations_inserted: u64,
    /// Literal-level triples with an undefined endpoint.
    pub triples_dropped: u64,
    /// Triples whose homonym fan-out exceeded the warning threshold.
    pub fanout_warnings: u64,
}

impl ImportReport {
    pub fn skipped(&self) -> u64 {
        self.skipped_malformed + self.skipped_invalid + self.skipped_duplicate
    }
}

/// Rows waiting for the next flush. Children point at their parent by buffer index; the index is
/// swapped for the stored key during the flush.
#[derive(Debug, Default)]
struct PendingBuffers {
    words: Vec<NewWord>,
    senses: Vec<(usize, NewSense)>,
    examples: Vec<(usize, NewExample)>,
    translations: Vec<(usize, NewTranslation)>,
    forms: Vec<(usize, NewForm)>,
}

impl PendingBuffers {
    fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    fn clear(&mut self) {
        self.words.clear();
        self.senses.clear();
        self.examples.clear();
        self.translations.clear();
        self.forms.clear();
    }
}

#[derive(Debug, Default)]
struct FlushCounts {
    words: u64,
    senses: u64,
    examples: u64,
    translations: u64,
    forms: u64,
}

#[derive(Debug, Default)]
struct EdgeCounts {
    inserted: u64,
    fanout_warnings: u64,
}

/// Single-writer importer bound to one store connection.
pub struct Importer<'c> {
    conn: &'c mut Connection,
    options: ImportOptions,
    cache: IdentityCache,
    state: ImportState,
    pending: PendingBuffers,
    triples: RawTripleSet,
    report: ImportReport,
    warned_predicates: HashSet<String>,
    progress: Option<ProgressCallback>,
    started: Instant,
}

impl<'c> Importer<'c> {
    /// Creates an importer, preloading identity tables from whatever the store already holds.
    pub fn new(
        conn: &'c mut Connection,
        options: ImportOptions,
        progress: Option<ProgressCallback>,
    ) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(WikiliteError::InvalidArgument(
                "batch size must be at least 1".to_string(),
            ));
        }
        let cache = IdentityCache::preload(conn)?;
        Ok(Importer {
            conn,
            options,
            cache,
            state: ImportState::Idle,
            pending: PendingBuffers::default(),
            triples: RawTripleSet::new(),
            report: ImportReport::default(),
            warned_predicates: HashSet::new(),
            progress,
            started: Instant::now(),
        })
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn report(&self) -> &ImportReport {
        &self.report
    }

    /// Streams every line of `reader` through [`Importer::import_line`].
    pub fn import_reader<R: BufRead>(&mut self, mut reader: R) -> Result<()> {
        let mut buf = Vec::new();
        let mut line_no: u64 = 0;
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_no += 1;
            match std::str::from_utf8(&buf) {
                Ok(line) => self.import_line(line)?,
                Err(e) => {
                    warn!("Line {} is not valid UTF-8: {}", line_no, e);
                    self.report.skipped_malformed += 1;
                }
            }
        }
        Ok(())
    }

    /// Parses one source line and imports it. Blank lines are ignored; undecodable lines are
    /// counted as malformed and skipped.
    pub fn import_line(&mut self, line: &str) -> Result<()> {
        self.ensure_accepting()?;
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        match parse::parse_record(line) {
            Ok(entry) => self.import_record(&entry),
            Err(e) => {
                debug!("Skipping line: {}", e);
                self.report.skipped_malformed += 1;
                Ok(())
            }
        }
    }

    /// Normalizes one record into the pending buffers, flushing when a batch is full.
    pub fn import_record(&mut self, entry: &WordEntry) -> Result<()> {
        self.ensure_accepting()?;
        self.state = ImportState::Streaming;

        let record = match parse::validate(entry) {
            Ok(record) => record,
            Err(WikiliteError::MalformedRecord(msg)) => {
                debug!("Skipping malformed record: {}", msg);
                self.report.skipped_malformed += 1;
                return Ok(());
            }
            Err(WikiliteError::InvalidRecord(msg)) => {
                debug!("Skipping invalid record: {}", msg);
                self.report.skipped_invalid += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if !self.cache.claim_word_key(record.word.key()) {
            debug!(
                "Skipping duplicate word: {} ({}, {}, etymology {})",
                record.word.literal,
                record.word.part_of_speech,
                record.word.language_code,
                record.word.etymology_number
            );
            self.report.skipped_duplicate += 1;
            return Ok(());
        }

        for name in &record.relations.unmapped {
            if self.warned_predicates.insert(name.clone()) {
                warn!(
                    "Relation field '{}' has no canonical predicate; storing it unchanged",
                    name
                );
            }
        }
        for triple in record.relations.triples {
            self.triples.insert(triple);
        }

        let word_idx = self.pending.words.len();
        self.pending.words.push(record.word);
        for mut sense in record.senses {
            let sense_idx = self.pending.senses.len();
            for example in std::mem::take(&mut sense.examples) {
                self.pending.examples.push((sense_idx, example));
            }
            for translation in std::mem::take(&mut sense.translations) {
                self.pending.translations.push((sense_idx, translation));
            }
            self.pending.senses.push((word_idx, sense));
        }
        for form in record.forms {
            self.pending.forms.push((word_idx, form));
        }

        self.report.processed += 1;
        if self.report.processed % self.options.batch_size as u64 == 0 {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes all pending rows in one transaction. On failure nothing of this batch is kept and
    /// the importer stops accepting work.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_accepting()?;
        if self.pending.is_empty() {
            return Ok(());
        }
        self.state = ImportState::Flushing;
        debug!("Flushing {} pending words...", self.pending.words.len());

        let counts = match self.write_batch() {
            Ok(counts) => counts,
            Err(e) => {
                self.cache.rollback();
                self.pending.clear();
                self.state = ImportState::Failed;
                return Err(e);
            }
        };
        self.cache.commit();
        self.pending.clear();

        self.report.flushes += 1;
        self.report.words_inserted += counts.words;
        self.report.senses_inserted += counts.senses;
        self.report.examples_inserted += counts.examples;
        self.report.translations_inserted += counts.translations;
        self.report.forms_inserted += counts.forms;
        info!(
            "Flushed batch {}: {} words, {} senses, {} examples, {} translations, {} forms ({} records so far)",
            self.report.flushes,
            counts.words,
            counts.senses,
            counts.examples,
            counts.translations,
            counts.forms,
            self.report.processed
        );
        self.state = ImportState::Streaming;
        Ok(())
    }

    // Uncommitted unless every step, including the progress check, succeeds.
    fn write_batch(&mut self) -> Result<FlushCounts> {
        let tx = self.conn.transaction()?;
        let counts = write_pending(&tx, &mut self.cache, &self.pending)?;
        let keep_going = report(
            &mut self.progress,
            ProgressUpdate::new(STAGE_RECORDS, self.report.processed, None).with_message(format!(
                "{} records, {} skipped",
                self.report.processed,
                self.report.skipped()
            )),
        );
        if !keep_going {
            return Err(WikiliteError::Cancelled);
        }
        tx.commit()?;
        Ok(counts)
    }

    /// Flushes what is left, applies the closure filter and links the surviving triples.
    /// Must be called exactly once at the end of the stream.
    pub fn finalize(&mut self) -> Result<ImportReport> {
        self.ensure_accepting()?;
        self.flush()?;

        let triples = std::mem::take(&mut self.triples);
        let raw_count = triples.len();
        let outcome = closure::apply(self.cache.literals(), triples);
        self.report.triples_dropped = outcome.dropped_triples as u64;
        info!(
            "Closure filter: {} of {} triples kept, {} literals kept",
            outcome.triples.len(),
            raw_count,
            outcome.keep.len()
        );

        if let Err(e) = self.complete(&outcome) {
            self.state = ImportState::Failed;
            return Err(e);
        }

        self.state = ImportState::Done;
        info!(
            "Import complete in {:.2?}: {} records, {} skipped, {} words kept, {} relations",
            self.started.elapsed(),
            self.report.processed,
            self.report.skipped(),
            self.report.words_inserted - self.report.words_pruned,
            self.report.relations_inserted
        );
        Ok(self.report.clone())
    }

    fn complete(&mut self, outcome: &ClosureOutcome) -> Result<()> {
        self.prune_words(|literal| outcome.keeps(literal))?;
        self.link_triples(&outcome.triples)?;
        db::set_metadata(self.conn, db::META_IMPORT_COMPLETE, "1")
    }

    fn ensure_accepting(&self) -> Result<()> {
        match self.state {
            ImportState::Done => Err(WikiliteError::ImportFinalized),
            ImportState::Failed => Err(WikiliteError::Internal(
                "importer cannot continue after a failed flush".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Deletes word rows (and, by cascade, their senses, examples and forms) outside the closure.
    fn prune_words(&mut self, keep: impl FnMut(&str) -> bool) -> Result<()> {
        let removed = self.cache.retain_literals(keep);
        info!("Pruning {} words outside the closure...", removed.len());
        let total = removed.len() as u64;
        let mut done: u64 = 0;

        for chunk in removed.chunks(self.options.batch_size) {
            let tx = self.conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached("DELETE FROM words WHERE id = ?1")?;
                for id in chunk {
                    stmt.execute(params![id])?;
                }
            }
            done += chunk.len() as u64;
            if !report(
                &mut self.progress,
                ProgressUpdate::new(STAGE_PRUNE, done, Some(total)),
            ) {
                return Err(WikiliteError::Cancelled);
            }
            tx.commit()?;
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM categories WHERE id NOT IN
                (SELECT category_id FROM word_categories UNION SELECT category_id FROM sense_categories)",
            [],
        )?;
        tx.execute(
            "DELETE FROM topics WHERE id NOT IN
                (SELECT topic_id FROM word_topics UNION SELECT topic_id FROM sense_topics)",
            [],
        )?;
        tx.execute(
            "DELETE FROM tags WHERE id NOT IN
                (SELECT tag_id FROM sense_tags UNION SELECT tag_id FROM form_tags
                 UNION SELECT tag_id FROM translation_tags)",
            [],
        )?;
        tx.commit()?;

        self.report.words_pruned = total;
        Ok(())
    }

    /// Resolves literal triples to every combination of matching word rows and inserts the edges.
    fn link_triples(&mut self, triples: &[RawTriple]) -> Result<()> {
        info!("Linking {} triples...", triples.len());
        let total = triples.len() as u64;
        let mut inserted: u64 = 0;

        for (chunk_no, chunk) in triples.chunks(self.options.batch_size).enumerate() {
            let tx = self.conn.transaction()?;
            let edges = insert_edges(
                &tx,
                &self.cache,
                chunk,
                self.options.fanout_warn_threshold,
            )?;
            inserted += edges.inserted;
            self.report.fanout_warnings += edges.fanout_warnings;
            let done = ((chunk_no * self.options.batch_size) + chunk.len()) as u64;
            if !report(
                &mut self.progress,
                ProgressUpdate::new(STAGE_LINK, done, Some(total))
                    .with_message(format!("{} edges", inserted)),
            ) {
                return Err(WikiliteError::Cancelled);
            }
            tx.commit()?;
        }
        self.report.relations_inserted = inserted;
        Ok(())
    }
}

fn write_pending(
    tx: &Transaction,
    cache: &mut IdentityCache,
    pending: &PendingBuffers,
) -> Result<FlushCounts> {
    let mut sense_stmt = tx.prepare_cached(
        "INSERT INTO senses (word_id, definition, raw_gloss, alt_of, form_of) VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    let mut example_stmt = tx.prepare_cached(
        "INSERT INTO examples (sense_id, text, translation, reference, roman, note, kind)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    let mut translation_stmt = tx.prepare_cached(
        "INSERT INTO translations (sense_id, language, code, word, alt, roman, note, sense_note, taxonomic)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    let mut form_stmt = tx.prepare_cached(
        "INSERT INTO forms (word_id, form, ipa, romanization) VALUES (?1, ?2, ?3, ?4)",
    )?;
    let mut word_category_stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO word_categories (word_id, category_id) VALUES (?1, ?2)",
    )?;
    let mut word_topic_stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO word_topics (word_id, topic_id) VALUES (?1, ?2)",
    )?;
    let mut sense_tag_stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO sense_tags (sense_id, tag_id) VALUES (?1, ?2)",
    )?;
    let mut sense_category_stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO sense_categories (sense_id, category_id) VALUES (?1, ?2)",
    )?;
    let mut sense_topic_stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO sense_topics (sense_id, topic_id) VALUES (?1, ?2)",
    )?;
    let mut form_tag_stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO form_tags (form_id, tag_id) VALUES (?1, ?2)",
    )?;
    let mut translation_tag_stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO translation_tags (translation_id, tag_id) VALUES (?1, ?2)",
    )?;

    let mut counts = FlushCounts::default();

    // Phase 1: words, which assigns the keys everything else hangs off.
    let mut word_ids = Vec::with_capacity(pending.words.len());
    for word in &pending.words {
        let word_id = cache.register_word(tx, word)?;
        for name in &word.categories {
            if let Some(id) = cache.resolve_dimension(tx, Dimension::Category, name)? {
                word_category_stmt.execute(params![word_id, id])?;
            }
        }
        for name in &word.topics {
            if let Some(id) = cache.resolve_dimension(tx, Dimension::Topic, name)? {
                word_topic_stmt.execute(params![word_id, id])?;
            }
        }
        word_ids.push(word_id);
        counts.words += 1;
    }

    // Phase 2: senses and forms, keyed by their word.
    let mut sense_ids = Vec::with_capacity(pending.senses.len());
    for (word_idx, sense) in &pending.senses {
        sense_stmt.execute(params![
            word_ids[*word_idx],
            sense.definition,
            sense.raw_gloss,
            sense.alt_of,
            sense.form_of
        ])?;
        let sense_id = tx.last_insert_rowid();
        for name in &sense.tags {
            if let Some(id) = cache.resolve_dimension(tx, Dimension::Tag, name)? {
                sense_tag_stmt.execute(params![sense_id, id])?;
            }
        }
        for name in &sense.categories {
            if let Some(id) = cache.resolve_dimension(tx, Dimension::Category, name)? {
                sense_category_stmt.execute(params![sense_id, id])?;
            }
        }
        for name in &sense.topics {
            if let Some(id) = cache.resolve_dimension(tx, Dimension::Topic, name)? {
                sense_topic_stmt.execute(params![sense_id, id])?;
            }
        }
        sense_ids.push(sense_id);
        counts.senses += 1;
    }

    for (word_idx, form) in &pending.forms {
        form_stmt.execute(params![
            word_ids[*word_idx],
            form.form,
            form.ipa,
            form.romanization
        ])?;
        let form_id = tx.last_insert_rowid();
        for name in &form.tags {
            if let Some(id) = cache.resolve_dimension(tx, Dimension::Tag, name)? {
                form_tag_stmt.execute(params![form_id, id])?;
            }
        }
        counts.forms += 1;
    }

    // Phase 3: examples and translations, keyed by their sense.
    for (sense_idx, example) in &pending.examples {
        example_stmt.execute(params![
            sense_ids[*sense_idx],
            example.text,
            example.translation,
            example.reference,
            example.roman,
            example.note,
            example.kind
        ])?;
        counts.examples += 1;
    }

    for (sense_idx, translation) in &pending.translations {
        translation_stmt.execute(params![
            sense_ids[*sense_idx],
            translation.language,
            translation.code,
            translation.word,
            translation.alt,
            translation.roman,
            translation.note,
            translation.sense_note,
            translation.taxonomic
        ])?;
        let translation_id = tx.last_insert_rowid();
        for name in &translation.tags {
            if let Some(id) = cache.resolve_dimension(tx, Dimension::Tag, name)? {
                translation_tag_stmt.execute(params![translation_id, id])?;
            }
        }
        counts.translations += 1;
    }

    Ok(counts)
}

fn insert_edges(
    tx: &Transaction,
    cache: &IdentityCache,
    triples: &[RawTriple],
    fanout_warn_threshold: usize,
) -> Result<EdgeCounts> {
    let mut stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO relations (subject_id, predicate, object_id, sense_qualifier, topics, taxonomic_name)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut counts = EdgeCounts::default();
    for triple in triples {
        let subjects = cache.lookup_all(&triple.subject);
        let objects = cache.lookup_all(&triple.object);
        let fanout = subjects.len() * objects.len();
        if fanout > fanout_warn_threshold {
            counts.fanout_warnings += 1;
            warn!(
                "Triple ({}, {}, {}) fans out to {} edges across homonyms",
                triple.subject, triple.predicate, triple.object, fanout
            );
        }
        for subject_id in subjects {
            for object_id in objects {
                counts.inserted += stmt.execute(params![
                    subject_id,
                    triple.predicate,
                    object_id,
                    triple.sense_qualifier,
                    triple.topics,
                    triple.taxonomic,
                ])? as u64;
            }
        }
    }
    Ok(counts)
}
