use crate::error::{Result, WikiliteError};
use crate::models::{Triple, Word};
use log::{debug, info, warn};
use rusqlite::{Connection, OptionalExtension, Row, params};

// --- Schema Definition ---

const SCHEMA_VERSION: u32 = 1;

pub const META_SCHEMA_VERSION: &str = "schema_version";
pub const META_SOURCE_FINGERPRINT: &str = "source_fingerprint";
pub const META_IMPORT_COMPLETE: &str = "import_complete";

const CREATE_METADATA_TABLE: &str = "
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);";

const CREATE_WORDS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS words (
    id INTEGER PRIMARY KEY,
    literal TEXT NOT NULL,
    literal_lower TEXT NOT NULL, -- For case-insensitive search
    part_of_speech TEXT NOT NULL,
    language TEXT NOT NULL,
    language_code TEXT NOT NULL,
    etymology_text TEXT,
    etymology_number INTEGER NOT NULL DEFAULT 0,
    UNIQUE (literal, part_of_speech, language_code, etymology_number)
);";

const CREATE_SENSES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS senses (
    id INTEGER PRIMARY KEY,
    word_id INTEGER NOT NULL,
    definition TEXT NOT NULL,
    raw_gloss TEXT,
    alt_of TEXT, -- JSON
    form_of TEXT, -- JSON
    FOREIGN KEY (word_id) REFERENCES words(id) ON DELETE CASCADE
);";

const CREATE_EXAMPLES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS examples (
    id INTEGER PRIMARY KEY,
    sense_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    translation TEXT,
    reference TEXT,
    roman TEXT,
    note TEXT,
    kind TEXT, -- 'example' or 'quotation'
    FOREIGN KEY (sense_id) REFERENCES senses(id) ON DELETE CASCADE
);";

const CREATE_TRANSLATIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS translations (
    id INTEGER PRIMARY KEY,
    sense_id INTEGER NOT NULL,
    language TEXT NOT NULL,
    code TEXT NOT NULL,
    word TEXT NOT NULL,
    alt TEXT,
    roman TEXT,
    note TEXT,
    sense_note TEXT,
    taxonomic TEXT,
    FOREIGN KEY (sense_id) REFERENCES senses(id) ON DELETE CASCADE
);";

const CREATE_FORMS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS forms (
    id INTEGER PRIMARY KEY,
    word_id INTEGER NOT NULL,
    form TEXT NOT NULL,
    ipa TEXT,
    romanization TEXT,
    FOREIGN KEY (word_id) REFERENCES words(id) ON DELETE CASCADE
);";

const CREATE_RELATIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS relations (
    id INTEGER PRIMARY KEY,
    subject_id INTEGER NOT NULL,
    predicate TEXT NOT NULL, -- Canonical singular name (e.g., 'synonym')
    object_id INTEGER NOT NULL,
    sense_qualifier TEXT,
    topics TEXT,
    taxonomic_name TEXT,
    UNIQUE (subject_id, predicate, object_id),
    FOREIGN KEY (subject_id) REFERENCES words(id) ON DELETE CASCADE,
    FOREIGN KEY (object_id) REFERENCES words(id) ON DELETE CASCADE
);";

const CREATE_CATEGORIES_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS categories (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE);";
const CREATE_TOPICS_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS topics (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE);";
const CREATE_TAGS_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS tags (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE);";

// --- Association Tables ---

const CREATE_WORD_CATEGORIES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS word_categories (
    word_id INTEGER NOT NULL REFERENCES words(id) ON DELETE CASCADE,
    category_id INTEGER NOT NULL REFERENCES categories(id),
    PRIMARY KEY (word_id, category_id)
);";

const CREATE_WORD_TOPICS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS word_topics (
    word_id INTEGER NOT NULL REFERENCES words(id) ON DELETE CASCADE,
    topic_id INTEGER NOT NULL REFERENCES topics(id),
    PRIMARY KEY (word_id, topic_id)
);";

const CREATE_SENSE_TAGS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS sense_tags (
    sense_id INTEGER NOT NULL REFERENCES senses(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id),
    PRIMARY KEY (sense_id, tag_id)
);";

const CREATE_SENSE_CATEGORIES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS sense_categories (
    sense_id INTEGER NOT NULL REFERENCES senses(id) ON DELETE CASCADE,
    category_id INTEGER NOT NULL REFERENCES categories(id),
    PRIMARY KEY (sense_id, category_id)
);";

const CREATE_SENSE_TOPICS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS sense_topics (
    sense_id INTEGER NOT NULL REFERENCES senses(id) ON DELETE CASCADE,
    topic_id INTEGER NOT NULL REFERENCES topics(id),
    PRIMARY KEY (sense_id, topic_id)
);";

const CREATE_FORM_TAGS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS form_tags (
    form_id INTEGER NOT NULL REFERENCES forms(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id),
    PRIMARY KEY (form_id, tag_id)
);";

const CREATE_TRANSLATION_TAGS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS translation_tags (
    translation_id INTEGER NOT NULL REFERENCES translations(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id),
    PRIMARY KEY (translation_id, tag_id)
);";

// --- Indices ---

const CREATE_INDICES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_word_literal ON words (literal);",
    "CREATE INDEX IF NOT EXISTS idx_word_literal_lower ON words (literal_lower);",
    "CREATE INDEX IF NOT EXISTS idx_sense_word ON senses (word_id);",
    "CREATE INDEX IF NOT EXISTS idx_example_sense ON examples (sense_id);",
    "CREATE INDEX IF NOT EXISTS idx_translation_sense ON translations (sense_id);",
    "CREATE INDEX IF NOT EXISTS idx_form_word ON forms (word_id);",
    "CREATE INDEX IF NOT EXISTS idx_relation_subject ON relations (subject_id, predicate);",
    "CREATE INDEX IF NOT EXISTS idx_relation_object ON relations (object_id, predicate);",
    "CREATE INDEX IF NOT EXISTS idx_relation_predicate ON relations (predicate);",
];

// --- Initialization Function ---

/// Creates all necessary tables and indices in the database if they don't exist.
/// Also checks and sets the schema version.
pub fn initialize_database(conn: &mut Connection) -> Result<()> {
    info!(
        "Initializing database schema (version {})...",
        SCHEMA_VERSION
    );
    let tx = conn.transaction()?;

    for ddl in [
        CREATE_METADATA_TABLE,
        CREATE_WORDS_TABLE,
        CREATE_SENSES_TABLE,
        CREATE_EXAMPLES_TABLE,
        CREATE_TRANSLATIONS_TABLE,
        CREATE_FORMS_TABLE,
        CREATE_RELATIONS_TABLE,
        CREATE_CATEGORIES_TABLE,
        CREATE_TOPICS_TABLE,
        CREATE_TAGS_TABLE,
        CREATE_WORD_CATEGORIES_TABLE,
        CREATE_WORD_TOPICS_TABLE,
        CREATE_SENSE_TAGS_TABLE,
        CREATE_SENSE_CATEGORIES_TABLE,
        CREATE_SENSE_TOPICS_TABLE,
        CREATE_FORM_TAGS_TABLE,
        CREATE_TRANSLATION_TAGS_TABLE,
    ] {
        tx.execute(ddl, [])?;
    }
    for ddl in CREATE_INDICES {
        tx.execute(ddl, [])?;
    }

    // Check schema version
    let existing_version_str = get_metadata(&tx, META_SCHEMA_VERSION)?;
    match existing_version_str {
        Some(v_str) => {
            let existing_version: u32 = v_str.parse().map_err(|e| {
                WikiliteError::Internal(format!(
                    "Failed to parse existing schema version '{}': {}",
                    v_str, e
                ))
            })?;
            match existing_version.cmp(&SCHEMA_VERSION) {
                std::cmp::Ordering::Equal => {
                    debug!(
                        "Database schema version ({}) matches expected version.",
                        existing_version
                    );
                }
                _ => {
                    warn!(
                        "Database schema version ({}) differs from expected ({}). Rebuild the store.",
                        existing_version, SCHEMA_VERSION
                    );
                }
            }
        }
        None => {
            set_metadata(&tx, META_SCHEMA_VERSION, &SCHEMA_VERSION.to_string())?;
            info!("Set initial schema version in metadata table.");
        }
    }

    tx.commit()?;
    info!("Database schema initialization complete.");
    Ok(())
}

// --- Metadata ---

pub fn get_metadata(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM metadata WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .map_err(WikiliteError::from)
}

pub fn set_metadata(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

/// Whether `conn` holds a store of ours: a `metadata` table carrying a schema version.
/// Any other SQLite database is foreign and must not be touched.
pub fn is_wikilite_store(conn: &Connection) -> Result<bool> {
    let has_metadata = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'metadata'",
            [],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(has_metadata && get_metadata(conn, META_SCHEMA_VERSION)?.is_some())
}

/// Whether the database has no schema objects at all, as left by a creation that never got
/// as far as writing the schema.
pub fn is_empty_database(conn: &Connection) -> Result<bool> {
    let objects: i64 = conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0))?;
    Ok(objects == 0)
}

/// Whether a finished import has been recorded in this store.
pub fn is_import_complete(conn: &Connection) -> Result<bool> {
    Ok(get_metadata(conn, META_IMPORT_COMPLETE)?.as_deref() == Some("1"))
}

// --- Preload Queries ---

/// All `(name, id)` pairs of a dimension table (`categories`, `topics` or `tags`).
pub fn load_dimension(conn: &Connection, table: &str) -> Result<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(&format!("SELECT name, id FROM {} ORDER BY id", table))?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(WikiliteError::from)
}

/// Every stored word row as `(id, literal, part_of_speech, language_code, etymology_number)`.
pub fn load_word_keys(conn: &Connection) -> Result<Vec<(i64, String, String, String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT id, literal, part_of_speech, language_code, etymology_number FROM words ORDER BY id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    })?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(WikiliteError::from)
}

// --- Row Mapping Helpers ---

pub const WORD_COLUMNS: &str =
    "id, literal, part_of_speech, language, language_code, etymology_text, etymology_number";

pub const RELATION_COLUMNS: &str =
    "id, subject_id, predicate, object_id, sense_qualifier, topics, taxonomic_name";

pub fn row_to_word(row: &Row) -> std::result::Result<Word, rusqlite::Error> {
    Ok(Word {
        id: row.get("id")?,
        literal: row.get("literal")?,
        part_of_speech: row.get("part_of_speech")?,
        language: row.get("language")?,
        language_code: row.get("language_code")?,
        etymology_text: row.get("etymology_text")?,
        etymology_number: row.get("etymology_number")?,
    })
}

pub fn row_to_triple(row: &Row) -> std::result::Result<Triple, rusqlite::Error> {
    Ok(Triple {
        id: row.get("id")?,
        subject_id: row.get("subject_id")?,
        predicate: row.get("predicate")?,
        object_id: row.get("object_id")?,
        sense_qualifier: row.get("sense_qualifier")?,
        topics: row.get("topics")?,
        taxonomic_name: row.get("taxonomic_name")?,
    })
}

/// Relations touching `word_id` as subject or object, in ascending id order.
pub fn fetch_incident_relations(conn: &Connection, word_id: i64) -> Result<Vec<Triple>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM relations WHERE subject_id = ?1
         UNION
         SELECT {} FROM relations WHERE object_id = ?1
         ORDER BY id",
        RELATION_COLUMNS, RELATION_COLUMNS
    ))?;
    let rows = stmt.query_map(params![word_id], row_to_triple)?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(WikiliteError::from)
}
