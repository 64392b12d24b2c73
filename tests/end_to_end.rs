use flate2::Compression;
use flate2::write::GzEncoder;
use rusqlite::Connection;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;
use wikilite_rs::{ImportOptions, WikiLite};

const CAT_KITTY: &str = r#"{"word":"cat","lang":"en","lang_code":"en","pos":"noun","senses":[{"glosses":["a small domesticated feline"]}],"synonyms":[{"word":"kitty"}]}
{"word":"kitty","lang":"en","lang_code":"en","pos":"noun","senses":[{"glosses":["informal name for cat"]}]}
"#;

const MIXED: &str = r#"{"word":"bank","lang":"English","lang_code":"en","pos":"noun","etymology_number":1,"senses":[{"glosses":["edge of a river"],"examples":[{"text":"a grassy bank"}]}],"related":[{"word":"river"},{"word":"shore"}]}
{"word":"bank","lang":"English","lang_code":"en","pos":"noun","etymology_number":2,"senses":[{"glosses":["financial institution"],"categories":[{"name":"Finance"}]}],"synonyms":[{"word":"lender"}]}
{"word":"river","lang":"English","lang_code":"en","pos":"noun","senses":[{"glosses":["a flowing body of water"],"hypernyms":[{"word":"stream"}]}]}
{"word":"stream","lang":"English","lang_code":"en","pos":"noun","senses":[{"glosses":["a small river"]},{"glosses":["a small river"],"examples":[{"text":"the stream froze"}]}],"antonyms":[{"word":"pond"}]}
{"word":"stream","lang":"English","lang_code":"en","pos":"verb","senses":[{"glosses":["to flow"]}],"coordinate_terms":[{"word":"river"}]}
{"word":"lender","lang":"English","lang_code":"en","pos":"noun","senses":[{"raw_glosses":["(finance) one who lends"]}],"forms":[{"form":"lenders","tags":["plural"]}]}
{"word":"island","lang":"English","lang_code":"en","pos":"noun","senses":[{"glosses":["land surrounded by water"]}]}
{"word":"river","lang":"English","lang_code":"en","pos":"noun","senses":[{"glosses":["duplicate entry"]}]}
{"word":"","lang":"English","lang_code":"en","senses":[{"glosses":["nameless"]}]}
{"word":"ghost","lang":"English","lang_code":"en","senses":[]}
{broken
"#;

fn write_source(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn import(source: &Path, db_path: &Path, batch_size: usize) -> WikiLite {
    let options = ImportOptions {
        batch_size,
        ..Default::default()
    };
    WikiLite::import(source, db_path, options, None).unwrap().0
}

fn sorted_rows(conn: &Connection, sql: &str) -> Vec<String> {
    let mut stmt = conn.prepare(sql).unwrap();
    let mut rows: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    rows.sort();
    rows
}

const WORD_ROWS: &str = "SELECT literal || '|' || part_of_speech || '|' || language_code || '|' || etymology_number FROM words";
const SENSE_ROWS: &str = "SELECT w.literal || '|' || w.part_of_speech || '|' || w.etymology_number || '|' || s.definition
     FROM senses s JOIN words w ON w.id = s.word_id";
const EXAMPLE_ROWS: &str = "SELECT s.definition || '|' || e.text
     FROM examples e JOIN senses s ON s.id = e.sense_id";
const RELATION_ROWS: &str = "SELECT ws.literal || '/' || ws.part_of_speech || '/' || ws.etymology_number
        || ' -' || r.predicate || '-> '
        || wo.literal || '/' || wo.part_of_speech || '/' || wo.etymology_number
     FROM relations r
     JOIN words ws ON ws.id = r.subject_id
     JOIN words wo ON wo.id = r.object_id";

#[test]
fn cat_and_kitty_import_to_one_synonym() {
    let dir = tempdir().unwrap();
    let source = write_source(dir.path(), "cats.jsonl", CAT_KITTY);
    let (wl, report) = WikiLite::import(
        &source,
        &dir.path().join("cats.db"),
        ImportOptions::default(),
        None,
    )
    .unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped(), 0);

    let stats = wl.stats().unwrap();
    assert_eq!(stats.words, 2);
    assert_eq!(stats.senses, 2);
    assert_eq!(stats.relations, 1);

    let cat = &wl.lookup("cat").unwrap()[0];
    let kitty = &wl.lookup("kitty").unwrap()[0];
    let (outgoing, incoming) = wl.get_relations(cat.id).unwrap();
    assert!(incoming.is_empty());
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].predicate, "synonym");
    assert_eq!(outgoing[0].subject_id, cat.id);
    assert_eq!(outgoing[0].object_id, kitty.id);
    assert_eq!(wl.predicates().unwrap(), vec!["synonym".to_string()]);
}

#[test]
fn batch_size_does_not_change_the_store() {
    let dir = tempdir().unwrap();
    let source = write_source(dir.path(), "mixed.jsonl", MIXED);
    let small = import(&source, &dir.path().join("small.db"), 1);
    let large = import(&source, &dir.path().join("large.db"), 100_000);
    drop(small);
    drop(large);

    let a = Connection::open(dir.path().join("small.db")).unwrap();
    let b = Connection::open(dir.path().join("large.db")).unwrap();
    for sql in [WORD_ROWS, SENSE_ROWS, EXAMPLE_ROWS, RELATION_ROWS] {
        assert_eq!(sorted_rows(&a, sql), sorted_rows(&b, sql), "{}", sql);
    }
    assert!(!sorted_rows(&a, RELATION_ROWS).is_empty());
}

#[test]
fn closure_leaves_no_dangling_or_isolated_words() {
    let dir = tempdir().unwrap();
    let source = write_source(dir.path(), "mixed.jsonl", MIXED);
    let db_path = dir.path().join("mixed.db");
    let wl = import(&source, &db_path, 3);

    // Undefined targets (shore, pond) and the unrelated island are gone.
    for literal in ["shore", "pond", "island"] {
        assert!(wl.lookup(literal).unwrap().is_empty(), "{}", literal);
    }
    drop(wl);

    let conn = Connection::open(&db_path).unwrap();
    let dangling: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM relations r
             WHERE NOT EXISTS (SELECT 1 FROM words WHERE id = r.subject_id)
                OR NOT EXISTS (SELECT 1 FROM words WHERE id = r.object_id)",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(dangling, 0);

    let without_sense: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM words w WHERE NOT EXISTS (SELECT 1 FROM senses WHERE word_id = w.id)",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(without_sense, 0);

    let without_relation: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM words w WHERE NOT EXISTS
                (SELECT 1 FROM relations WHERE subject_id = w.id OR object_id = w.id)",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(without_relation, 0);
}

#[test]
fn homonyms_fan_out_and_skips_are_counted() {
    let dir = tempdir().unwrap();
    let source = write_source(dir.path(), "mixed.jsonl", MIXED);
    let (wl, report) = WikiLite::import(
        &source,
        &dir.path().join("mixed.db"),
        ImportOptions::default(),
        None,
    )
    .unwrap();

    assert_eq!(report.processed, 7);
    assert_eq!(report.skipped_duplicate, 1);
    assert_eq!(report.skipped_malformed, 2); // blank word, broken JSON
    assert_eq!(report.skipped_invalid, 1); // no senses

    // Every stream row is a hypernym target of river.
    let river = &wl.lookup("river").unwrap()[0];
    let (outgoing, incoming) = wl.get_relations(river.id).unwrap();
    assert_eq!(outgoing.len(), 2);
    assert!(outgoing.iter().all(|t| t.predicate == "hypernym"));
    // Both bank rows -related-> river, both stream rows -coordinate_term-> river.
    assert_eq!(incoming.len(), 4);

    // Duplicate senses of "stream" (noun) merged; the example survives.
    let stream_noun = wl
        .lookup("stream")
        .unwrap()
        .into_iter()
        .find(|w| w.part_of_speech == "noun")
        .unwrap();
    assert_eq!(wl.get_senses(stream_noun.id).unwrap().len(), 1);
    assert_eq!(wl.get_examples(stream_noun.id).unwrap().len(), 1);

    let lender = &wl.lookup("lender").unwrap()[0];
    assert_eq!(
        wl.get_senses(lender.id).unwrap()[0].definition,
        "(finance) one who lends"
    );
    assert_eq!(wl.get_forms(lender.id).unwrap()[0].form, "lenders");
}

#[test]
fn traversal_is_deterministic_over_imported_store() {
    let dir = tempdir().unwrap();
    let source = write_source(dir.path(), "mixed.jsonl", MIXED);
    let wl = import(&source, &dir.path().join("mixed.db"), 2);
    let bank = &wl.lookup("bank").unwrap()[0];

    let first = wl.get_relations_bounded(bank.id, 3, None).unwrap();
    let second = wl.get_relations_bounded(bank.id, 3, None).unwrap();
    assert_eq!(first, second);
    assert!(first.windows(2).all(|w| w[0].id < w[1].id));

    let related_only = vec!["related".to_string()];
    let filtered = wl
        .get_relations_bounded(bank.id, 3, Some(related_only.as_slice()))
        .unwrap();
    assert!(!filtered.is_empty());
    assert!(filtered.iter().all(|t| t.predicate == "related"));
}

#[test]
fn gzip_source_imports_like_plain() {
    let dir = tempdir().unwrap();
    let plain = write_source(dir.path(), "cats.jsonl", CAT_KITTY);
    let gz = dir.path().join("cats.jsonl.gz");
    let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
    encoder.write_all(CAT_KITTY.as_bytes()).unwrap();
    encoder.finish().unwrap();

    let a = import(&plain, &dir.path().join("plain.db"), 10);
    let b = import(&gz, &dir.path().join("gz.db"), 10);
    assert_eq!(a.stats().unwrap(), b.stats().unwrap());
}
