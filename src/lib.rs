// Declare modules
pub mod cache;
pub mod closure;
pub mod data;
pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod parse;
pub mod progress;
pub mod relations;
pub mod traverse;

// Re-export key types for easier use
pub use error::{Result, WikiliteError};
pub use import::{ImportOptions, ImportReport, ImportState, Importer};
pub use models::{Example, Form, Sense, StoreStats, Translation, Triple, Word, WordEntry};
pub use progress::{ProgressCallback, ProgressUpdate};

use log::{debug, info, warn};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Options for loading a store built from a source dump.
#[derive(Debug, Default, Clone)]
pub struct LoadOptions {
    /// Optional path to a specific store file to use or create.
    /// If None, the store is cached under the source's fingerprint.
    pub db_path: Option<PathBuf>,
    pub import: ImportOptions,
}

/// Query handle over one imported store.
#[derive(Clone)] // Clone is cheap due to Arc<Mutex<...>>
pub struct WikiLite {
    conn: Arc<Mutex<Connection>>,
    db_file_path: Arc<PathBuf>,
}

// Opens/creates the store connection with the pragmas every caller relies on.
fn open_db_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
    )?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "cache_size", "-64000")?; // 64MB
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    // Cascading deletes from words depend on this.
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.set_prepared_statement_cache_capacity(32);

    Ok(conn)
}

/// What an existing file at a store path turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StoreStatus {
    /// A finished import, with the fingerprint of the source it was built from.
    Complete(Option<String>),
    /// One of ours that never finished, or an empty database.
    Incomplete,
    /// Some other SQLite database.
    Foreign,
}

// Reads an existing store file without modifying it. A file that is not SQLite at all
// surfaces as a database error.
fn inspect_store(path: &Path) -> Result<StoreStatus> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    if db::is_empty_database(&conn)? {
        return Ok(StoreStatus::Incomplete);
    }
    if !db::is_wikilite_store(&conn)? {
        return Ok(StoreStatus::Foreign);
    }
    if db::is_import_complete(&conn)? {
        Ok(StoreStatus::Complete(db::get_metadata(
            &conn,
            db::META_SOURCE_FINGERPRINT,
        )?))
    } else {
        Ok(StoreStatus::Incomplete)
    }
}

impl WikiLite {
    /// Opens an existing, completely imported store for queries.
    pub fn open(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            return Err(WikiliteError::StoreIncomplete(db_path.to_path_buf()));
        }
        let conn = open_db_connection(db_path)?;
        if !db::is_import_complete(&conn).unwrap_or(false) {
            return Err(WikiliteError::StoreIncomplete(db_path.to_path_buf()));
        }
        info!("Opened store {:?}", db_path);
        Ok(WikiLite {
            conn: Arc::new(Mutex::new(conn)),
            db_file_path: Arc::new(db_path.to_path_buf()),
        })
    }

    /// Builds a new store at `db_path` from `source`.
    ///
    /// Fails with `StoreExists` when a complete store is already there, unless `options.force` is
    /// set, in which case the old store is dropped first. An incomplete store is always replaced.
    /// A database that is not one of ours is never touched: that is `ForeignDatabase`, force or
    /// not. If the import fails or is cancelled the partially written store file is removed.
    pub fn import(
        source: &Path,
        db_path: &Path,
        options: ImportOptions,
        progress: Option<ProgressCallback>,
    ) -> Result<(Self, ImportReport)> {
        if db_path.exists() {
            match inspect_store(db_path)? {
                StoreStatus::Foreign => {
                    return Err(WikiliteError::ForeignDatabase(db_path.to_path_buf()));
                }
                StoreStatus::Complete(_) if !options.force => {
                    return Err(WikiliteError::StoreExists(db_path.to_path_buf()));
                }
                StoreStatus::Complete(_) => {
                    info!("Force requested. Dropping existing store {:?}", db_path)
                }
                StoreStatus::Incomplete => warn!("Replacing incomplete store {:?}", db_path),
            }
            data::remove_store_files(db_path)?;
        }

        let fingerprint = data::fingerprint(source)?;
        let reader = data::open_source(source)?;
        info!(
            "Importing {:?} (fingerprint {}) into {:?} with batch size {}",
            source, fingerprint, db_path, options.batch_size
        );

        // Declared before the connection so the connection is closed before the files go.
        let cleanup = scopeguard::guard(db_path.to_path_buf(), |path| {
            warn!("Import did not finish; removing partial store {:?}", path);
            if let Err(e) = data::remove_store_files(&path) {
                warn!("Failed to remove partial store {:?}: {}", path, e);
            }
        });

        let mut conn = open_db_connection(db_path)?;
        db::initialize_database(&mut conn)?;
        db::set_metadata(&conn, db::META_SOURCE_FINGERPRINT, &fingerprint)?;

        let report = {
            let mut importer = Importer::new(&mut conn, options, progress)?;
            importer.import_reader(reader)?;
            importer.finalize()?
        };

        let db_path = scopeguard::ScopeGuard::into_inner(cleanup);
        Ok((
            WikiLite {
                conn: Arc::new(Mutex::new(conn)),
                db_file_path: Arc::new(db_path),
            },
            report,
        ))
    }

    /// Loads the store for `source` using default options (fingerprint-cached path).
    pub async fn load(source: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_options(source, LoadOptions::default(), None).await
    }

    /// Loads the store for `source`, importing it first when no matching complete store exists.
    ///
    /// A store is reused when it is complete and was built from a source with the same
    /// fingerprint. In the fingerprint cache a stale store is rebuilt; at an explicit `db_path` a
    /// complete store from another source is `StoreExists` unless `force` is set. The import runs
    /// on a blocking worker thread.
    pub async fn load_with_options(
        source: impl AsRef<Path>,
        options: LoadOptions,
        progress: Option<ProgressCallback>,
    ) -> Result<Self> {
        let source = source.as_ref().to_path_buf();
        let fingerprint = data::fingerprint(&source)?;
        let (db_path, cached) = match options.db_path {
            Some(path) => {
                info!("Using provided database path: {:?}", path);
                (path, false)
            }
            None => (data::default_db_path(&fingerprint)?, true),
        };

        let mut import_options = options.import;
        if !import_options.force && db_path.exists() {
            match inspect_store(&db_path)? {
                StoreStatus::Complete(Some(stored)) if stored == fingerprint => {
                    info!("Using existing store {:?}", db_path);
                    return Self::open(&db_path);
                }
                StoreStatus::Complete(stored) if cached => {
                    info!(
                        "Cached store {:?} was built from a different source ({:?}); rebuilding",
                        db_path, stored
                    );
                    import_options.force = true;
                }
                StoreStatus::Complete(stored) => warn!(
                    "Store {:?} was built from a different source ({:?})",
                    db_path, stored
                ),
                StoreStatus::Incomplete => info!("Store {:?} is incomplete; rebuilding", db_path),
                StoreStatus::Foreign => {
                    return Err(WikiliteError::ForeignDatabase(db_path));
                }
            }
        }

        let (wikilite, report) = tokio::task::spawn_blocking(move || {
            Self::import(&source, &db_path, import_options, progress)
        })
        .await??;
        debug!("Import report: {:?}", report);
        Ok(wikilite)
    }

    /// Gets the default store path for a source, derived from its fingerprint.
    pub fn get_default_db_path(source: &Path) -> Result<PathBuf> {
        data::default_db_path(&data::fingerprint(source)?)
    }

    /// Deletes a store file and its `-wal`/`-shm` companions. A missing store is not an error;
    /// a database that is not a wikilite store is refused.
    pub fn clear_database(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            if inspect_store(db_path)? == StoreStatus::Foreign {
                return Err(WikiliteError::ForeignDatabase(db_path.to_path_buf()));
            }
            data::remove_store_files(db_path)?;
            info!("Successfully deleted database file: {:?}", db_path);
        } else {
            info!("Database file not found, nothing to clear: {:?}", db_path);
        }
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_file_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| WikiliteError::Internal("Mutex poisoned".to_string()))
    }

    // --- Query Methods ---

    /// Words whose literal contains `term`, case-insensitively, at most `limit` of them.
    pub fn search_words(&self, term: &str, limit: usize) -> Result<Vec<Word>> {
        debug!("search_words: term='{}', limit={}", term, limit);
        let conn = self.lock()?;
        let pattern = format!("%{}%", escape_like(&term.to_lowercase()));
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM words WHERE literal_lower LIKE ?1 ESCAPE '\\'
             ORDER BY literal_lower, id LIMIT ?2",
            db::WORD_COLUMNS
        ))?;
        let rows = stmt.query_map(params![pattern, limit as i64], db::row_to_word)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(WikiliteError::from)
    }

    /// Every word row whose literal equals `literal`, ignoring case.
    pub fn lookup(&self, literal: &str) -> Result<Vec<Word>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM words WHERE literal_lower = ?1 ORDER BY id",
            db::WORD_COLUMNS
        ))?;
        let rows = stmt.query_map(params![literal.to_lowercase()], db::row_to_word)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(WikiliteError::from)
    }

    pub fn get_word(&self, word_id: i64) -> Result<Word> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM words WHERE id = ?1", db::WORD_COLUMNS),
            params![word_id],
            db::row_to_word,
        )
        .optional()?
        .ok_or(WikiliteError::WordNotFound(word_id))
    }

    /// Senses of a word with their tags, categories and topics.
    pub fn get_senses(&self, word_id: i64) -> Result<Vec<Sense>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, word_id, definition, raw_gloss, alt_of, form_of
             FROM senses WHERE word_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![word_id], |row| {
            Ok(Sense {
                id: row.get("id")?,
                word_id: row.get("word_id")?,
                definition: row.get("definition")?,
                raw_gloss: row.get("raw_gloss")?,
                tags: Vec::new(),
                categories: Vec::new(),
                topics: Vec::new(),
                alt_of: row.get("alt_of")?,
                form_of: row.get("form_of")?,
            })
        })?;
        let mut senses = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        for sense in &mut senses {
            sense.tags = fetch_names(
                &conn,
                "SELECT t.name FROM sense_tags st JOIN tags t ON t.id = st.tag_id
                 WHERE st.sense_id = ?1 ORDER BY t.name",
                sense.id,
            )?;
            sense.categories = fetch_names(
                &conn,
                "SELECT c.name FROM sense_categories sc JOIN categories c ON c.id = sc.category_id
                 WHERE sc.sense_id = ?1 ORDER BY c.name",
                sense.id,
            )?;
            sense.topics = fetch_names(
                &conn,
                "SELECT t.name FROM sense_topics st JOIN topics t ON t.id = st.topic_id
                 WHERE st.sense_id = ?1 ORDER BY t.name",
                sense.id,
            )?;
        }
        Ok(senses)
    }

    /// Examples of all senses of a word, in insertion order.
    pub fn get_examples(&self, word_id: i64) -> Result<Vec<Example>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT e.id, e.sense_id, e.text, e.translation, e.reference, e.roman, e.note, e.kind
             FROM examples e JOIN senses s ON s.id = e.sense_id
             WHERE s.word_id = ?1 ORDER BY e.id",
        )?;
        let rows = stmt.query_map(params![word_id], |row| {
            Ok(Example {
                id: row.get("id")?,
                sense_id: row.get("sense_id")?,
                text: row.get("text")?,
                translation: row.get("translation")?,
                reference: row.get("reference")?,
                roman: row.get("roman")?,
                note: row.get("note")?,
                kind: row.get("kind")?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(WikiliteError::from)
    }

    /// Translations of all senses of a word, grouped by sense in insertion order.
    pub fn get_translations(&self, word_id: i64) -> Result<Vec<Translation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT t.id, t.sense_id, t.language, t.code, t.word, t.alt, t.roman, t.note,
                    t.sense_note, t.taxonomic
             FROM translations t JOIN senses s ON s.id = t.sense_id
             WHERE s.word_id = ?1 ORDER BY t.sense_id, t.id",
        )?;
        let rows = stmt.query_map(params![word_id], |row| {
            Ok(Translation {
                id: row.get("id")?,
                sense_id: row.get("sense_id")?,
                language: row.get("language")?,
                code: row.get("code")?,
                word: row.get("word")?,
                alt: row.get("alt")?,
                roman: row.get("roman")?,
                note: row.get("note")?,
                sense_note: row.get("sense_note")?,
                tags: Vec::new(),
                taxonomic: row.get("taxonomic")?,
            })
        })?;
        let mut translations = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        for translation in &mut translations {
            translation.tags = fetch_names(
                &conn,
                "SELECT t.name FROM translation_tags tt JOIN tags t ON t.id = tt.tag_id
                 WHERE tt.translation_id = ?1 ORDER BY t.name",
                translation.id,
            )?;
        }
        Ok(translations)
    }

    pub fn get_forms(&self, word_id: i64) -> Result<Vec<Form>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, word_id, form, ipa, romanization FROM forms WHERE word_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![word_id], |row| {
            Ok(Form {
                id: row.get("id")?,
                word_id: row.get("word_id")?,
                form: row.get("form")?,
                tags: Vec::new(),
                ipa: row.get("ipa")?,
                romanization: row.get("romanization")?,
            })
        })?;
        let mut forms = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        for form in &mut forms {
            form.tags = fetch_names(
                &conn,
                "SELECT t.name FROM form_tags ft JOIN tags t ON t.id = ft.tag_id
                 WHERE ft.form_id = ?1 ORDER BY t.name",
                form.id,
            )?;
        }
        Ok(forms)
    }

    /// Direct relations of a word: `(as subject, as object)`, each ordered by relation id.
    pub fn get_relations(&self, word_id: i64) -> Result<(Vec<Triple>, Vec<Triple>)> {
        let conn = self.lock()?;
        let fetch = |column: &str| -> Result<Vec<Triple>> {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM relations WHERE {} = ?1 ORDER BY id",
                db::RELATION_COLUMNS,
                column
            ))?;
            let rows = stmt.query_map(params![word_id], db::row_to_triple)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(WikiliteError::from)
        };
        Ok((fetch("subject_id")?, fetch("object_id")?))
    }

    /// Relations within `max_depth` hops of a word, optionally restricted to some predicates.
    /// See [`traverse::bounded_relations`].
    pub fn get_relations_bounded(
        &self,
        word_id: i64,
        max_depth: u32,
        predicates: Option<&[String]>,
    ) -> Result<Vec<Triple>> {
        let conn = self.lock()?;
        traverse::bounded_relations(&conn, word_id, max_depth, predicates)
    }

    /// Distinct predicate names present in the store, sorted.
    pub fn predicates(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare_cached("SELECT DISTINCT predicate FROM relations ORDER BY predicate")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(WikiliteError::from)
    }

    /// A random word, or `None` for an empty store.
    pub fn random_word(&self) -> Result<Option<Word>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM words ORDER BY RANDOM() LIMIT 1",
                db::WORD_COLUMNS
            ),
            [],
            db::row_to_word,
        )
        .optional()
        .map_err(WikiliteError::from)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;
        let count = |table: &str| -> Result<u64> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
            Ok(n as u64)
        };
        Ok(StoreStats {
            words: count("words")?,
            senses: count("senses")?,
            examples: count("examples")?,
            translations: count("translations")?,
            forms: count("forms")?,
            relations: count("relations")?,
            categories: count("categories")?,
            topics: count("topics")?,
            tags: count("tags")?,
        })
    }
}

fn fetch_names(conn: &Connection, sql: &str, id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let rows = stmt.query_map(params![id], |row| row.get(0))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(WikiliteError::from)
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
