use proptest::prelude::*;
use rusqlite::Connection;
use serde_json::json;
use std::collections::BTreeSet;
use wikilite_rs::closure;
use wikilite_rs::db;
use wikilite_rs::relations::{RELATION_FIELDS, RawTriple, RawTripleSet, canonicalize};
use wikilite_rs::{ImportOptions, Importer};

const VOCABULARY: &[&str] = &["ash", "birch", "cedar", "elm", "fir", "oak", "pine", "yew"];
const PARTS_OF_SPEECH: &[&str] = &["noun", "verb"];

fn literal() -> impl Strategy<Value = String> {
    proptest::sample::select(VOCABULARY).prop_map(str::to_string)
}

fn relation_field() -> impl Strategy<Value = String> {
    prop_oneof![
        proptest::sample::select(RELATION_FIELDS).prop_map(|(field, _)| field.to_string()),
        Just("paronyms".to_string()),
    ]
}

fn predicate_name() -> impl Strategy<Value = String> {
    prop_oneof![
        relation_field(),
        proptest::string::string_regex("[a-z_]{1,12}").unwrap(),
    ]
}

fn raw_triple() -> impl Strategy<Value = RawTriple> {
    (literal(), relation_field(), literal()).prop_map(|(subject, field, object)| RawTriple {
        subject,
        predicate: canonicalize(&field),
        object,
        sense_qualifier: None,
        topics: None,
        taxonomic: None,
    })
}

/// One source line: a headword with a part of speech, a gloss and some relation lists.
fn record() -> impl Strategy<Value = String> {
    (
        literal(),
        proptest::sample::select(PARTS_OF_SPEECH),
        0i64..2,
        proptest::collection::vec((relation_field(), literal()), 0..4),
    )
        .prop_map(|(word, pos, etymology, relations)| {
            let mut entry = json!({
                "word": word,
                "lang": "English",
                "lang_code": "en",
                "pos": pos,
                "etymology_number": etymology,
                "senses": [{"glosses": [format!("{} ({})", word, pos)]}],
            });
            for (field, target) in relations {
                let list = entry
                    .as_object_mut()
                    .unwrap()
                    .entry(field)
                    .or_insert_with(|| json!([]));
                list.as_array_mut().unwrap().push(json!({ "word": target }));
            }
            entry.to_string()
        })
}

fn import_lines(lines: &[String], batch_size: usize) -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::initialize_database(&mut conn).unwrap();
    {
        let options = ImportOptions {
            batch_size,
            ..Default::default()
        };
        let mut importer = Importer::new(&mut conn, options, None).unwrap();
        for line in lines {
            importer.import_line(line).unwrap();
        }
        importer.finalize().unwrap();
    }
    conn
}

fn relation_rows(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare(
            "SELECT ws.literal || '/' || ws.part_of_speech || '/' || ws.etymology_number
                || ' ' || r.predicate || ' '
                || wo.literal || '/' || wo.part_of_speech || '/' || wo.etymology_number
             FROM relations r
             JOIN words ws ON ws.id = r.subject_id
             JOIN words wo ON wo.id = r.object_id",
        )
        .unwrap();
    let mut rows: Vec<String> = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    rows.sort();
    rows
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn canonicalize_is_idempotent(name in predicate_name()) {
        let once = canonicalize(&name);
        prop_assert_eq!(canonicalize(&once), once);
    }

    #[test]
    fn closure_keeps_only_defined_connected_words(
        defined in proptest::collection::btree_set(literal(), 0..VOCABULARY.len()),
        triples in proptest::collection::vec(raw_triple(), 0..24),
    ) {
        let mut set = RawTripleSet::new();
        for t in triples {
            set.insert(t);
        }
        let total = set.len();
        let outcome = closure::apply(defined.iter().map(String::as_str), set);

        prop_assert_eq!(outcome.triples.len() + outcome.dropped_triples, total);
        let mut endpoints = BTreeSet::new();
        for t in &outcome.triples {
            prop_assert!(defined.contains(&t.subject));
            prop_assert!(defined.contains(&t.object));
            endpoints.insert(t.subject.clone());
            endpoints.insert(t.object.clone());
        }
        let kept: BTreeSet<String> = outcome.keep.iter().cloned().collect();
        prop_assert_eq!(kept, endpoints);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn imported_store_is_closed(lines in proptest::collection::vec(record(), 0..16)) {
        let conn = import_lines(&lines, 4);
        prop_assert_eq!(count(&conn,
            "SELECT COUNT(*) FROM relations r
             WHERE NOT EXISTS (SELECT 1 FROM words WHERE id = r.subject_id)
                OR NOT EXISTS (SELECT 1 FROM words WHERE id = r.object_id)"), 0);
        prop_assert_eq!(count(&conn,
            "SELECT COUNT(*) FROM words w WHERE NOT EXISTS
                (SELECT 1 FROM senses WHERE word_id = w.id)"), 0);
        prop_assert_eq!(count(&conn,
            "SELECT COUNT(*) FROM words w WHERE NOT EXISTS
                (SELECT 1 FROM relations WHERE subject_id = w.id OR object_id = w.id)"), 0);
    }

    #[test]
    fn batch_size_never_changes_relations(
        lines in proptest::collection::vec(record(), 0..16),
        batch_size in 1usize..6,
    ) {
        let batched = import_lines(&lines, batch_size);
        let whole = import_lines(&lines, 100_000);
        prop_assert_eq!(relation_rows(&batched), relation_rows(&whole));
        prop_assert_eq!(
            count(&batched, "SELECT COUNT(*) FROM senses"),
            count(&whole, "SELECT COUNT(*) FROM senses")
        );
    }
}
