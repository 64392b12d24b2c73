use crate::error::{Result, WikiliteError};
use crate::models::{TranslationData, WordEntry};
use crate::relations::{NormalizedRelations, extract_triples};
use log::trace;

/// Part of speech stored when a record carries none.
pub const UNKNOWN_POS: &str = "unknown";

/// A source record that passed validation, reduced to what the store keeps.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub word: NewWord,
    pub senses: Vec<NewSense>,
    pub forms: Vec<NewForm>,
    pub relations: NormalizedRelations,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewWord {
    pub literal: String,
    pub part_of_speech: String,
    pub language: String,
    pub language_code: String,
    pub etymology_text: Option<String>,
    pub etymology_number: i64,
    pub categories: Vec<String>,
    pub topics: Vec<String>,
}

/// Identity of a word row: literal, part of speech, language code, etymology number.
pub type WordKey = (String, String, String, i64);

impl NewWord {
    pub fn key(&self) -> WordKey {
        (
            self.literal.clone(),
            self.part_of_speech.clone(),
            self.language_code.clone(),
            self.etymology_number,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSense {
    pub definition: String,
    pub raw_gloss: Option<String>,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub topics: Vec<String>,
    pub alt_of: Option<String>,
    pub form_of: Option<String>,
    pub examples: Vec<NewExample>,
    pub translations: Vec<NewTranslation>,
}

impl NewSense {
    /// Folds a sense with the same definition into this one.
    fn absorb(&mut self, other: NewSense) {
        union_names(&mut self.tags, other.tags);
        union_names(&mut self.categories, other.categories);
        union_names(&mut self.topics, other.topics);
        if self.alt_of.is_none() {
            self.alt_of = other.alt_of;
        }
        if self.form_of.is_none() {
            self.form_of = other.form_of;
        }
        self.examples.extend(other.examples);
        self.translations.extend(other.translations);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExample {
    pub text: String,
    pub translation: Option<String>,
    pub reference: Option<String>,
    pub roman: Option<String>,
    pub note: Option<String>,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTranslation {
    pub language: String,
    pub code: String,
    pub word: String,
    pub alt: Option<String>,
    pub roman: Option<String>,
    pub note: Option<String>,
    pub sense_note: Option<String>,
    pub tags: Vec<String>,
    pub taxonomic: Option<String>,
}

impl NewTranslation {
    /// `None` when the entry names no target word.
    fn from_source(data: &TranslationData) -> Option<Self> {
        let word = data.word.as_deref().map(str::trim).filter(|w| !w.is_empty())?;
        Some(NewTranslation {
            language: data.lang.as_deref().unwrap_or_default().trim().to_string(),
            code: data.code.as_deref().unwrap_or_default().trim().to_string(),
            word: word.to_string(),
            alt: data.alt.clone(),
            roman: data.roman.clone(),
            note: data.note.clone(),
            sense_note: data.sense.clone(),
            tags: clean_names(data.tags.iter().map(String::as_str)),
            taxonomic: data.taxonomic.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewForm {
    pub form: String,
    pub tags: Vec<String>,
    pub ipa: Option<String>,
    pub romanization: Option<String>,
}

/// Decodes one JSON line into a source record.
pub fn parse_record(line: &str) -> Result<WordEntry> {
    serde_json::from_str(line).map_err(|e| WikiliteError::MalformedRecord(e.to_string()))
}

/// Checks required fields and extracts senses, forms and relations.
///
/// Senses without any gloss text are dropped; senses repeating an earlier definition of the same
/// record are merged into it, keeping the union of their labels. A record left without senses is
/// invalid.
pub fn validate(entry: &WordEntry) -> Result<ValidatedRecord> {
    let literal = required(&entry.word, "word")?;
    let language = required(&entry.lang, "lang")?;
    let language_code = required(&entry.lang_code, "lang_code")?;

    let mut senses: Vec<NewSense> = Vec::with_capacity(entry.senses.len());
    for sense in &entry.senses {
        let Some(definition) = sense.definition() else {
            trace!("Dropping sense without gloss for word: {}", literal);
            continue;
        };
        let examples = sense
            .examples
            .iter()
            .filter_map(|ex| {
                let text = ex.text.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
                Some(NewExample {
                    text: text.to_string(),
                    translation: ex.english.clone().or_else(|| ex.translation.clone()),
                    reference: ex.reference.clone(),
                    roman: ex.roman.clone(),
                    note: ex.note.clone(),
                    kind: ex.kind.clone(),
                })
            })
            .collect::<Vec<_>>();

        let new_sense = NewSense {
            raw_gloss: sense.raw_gloss(),
            tags: clean_names(sense.tags.iter().map(String::as_str)),
            categories: clean_names(sense.categories.iter().map(|c| c.name())),
            topics: clean_names(sense.topics.iter().map(String::as_str)),
            alt_of: json_text(sense.alt_of.as_ref()),
            form_of: json_text(sense.form_of.as_ref()),
            examples,
            translations: sense
                .translations
                .iter()
                .filter_map(NewTranslation::from_source)
                .collect(),
            definition,
        };
        match senses.iter_mut().find(|s| s.definition == new_sense.definition) {
            Some(existing) => existing.absorb(new_sense),
            None => senses.push(new_sense),
        }
    }

    if senses.is_empty() {
        return Err(WikiliteError::InvalidRecord(format!(
            "no usable sense for word: {}",
            literal
        )));
    }

    let forms = entry
        .forms
        .iter()
        .filter_map(|f| {
            let form = f.form.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
            Some(NewForm {
                form: form.to_string(),
                tags: clean_names(f.tags.iter().map(String::as_str)),
                ipa: f.ipa.clone(),
                romanization: f.roman.clone(),
            })
        })
        .collect();

    let relations = extract_triples(&literal, entry);

    Ok(ValidatedRecord {
        word: NewWord {
            part_of_speech: entry
                .pos
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .unwrap_or(UNKNOWN_POS)
                .to_string(),
            language,
            language_code,
            etymology_text: entry.etymology_text.clone(),
            etymology_number: entry.etymology_number.unwrap_or(0),
            categories: clean_names(entry.categories.iter().map(|c| c.name())),
            topics: clean_names(entry.topics.iter().map(String::as_str)),
            literal,
        },
        senses,
        forms,
        relations,
    })
}

fn required(field: &Option<String>, name: &str) -> Result<String> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| WikiliteError::MalformedRecord(format!("missing required field '{}'", name)))
}

// Null and empty lists are treated as absent.
fn json_text(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::Null => None,
        serde_json::Value::Array(items) if items.is_empty() => None,
        other => Some(other.to_string()),
    }
}

fn union_names(names: &mut Vec<String>, more: Vec<String>) {
    for name in more {
        if !names.contains(&name) {
            names.push(name);
        }
    }
}

// Trimmed, non-empty, first occurrence only.
fn clean_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names.map(str::trim).filter(|n| !n.is_empty()) {
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAT: &str = r#"{"word":"cat","lang":"English","lang_code":"en","pos":"noun",
        "categories":[{"name":"Felids"},"Pets","Pets"],
        "forms":[{"form":"cats","tags":["plural"]},{"form":""}],
        "senses":[
            {"glosses":["a small domesticated feline"],"tags":["countable"],
             "examples":[{"text":"The cat sat.","english":"Le chat"},{"text":"  "}]},
            {"glosses":["a small domesticated feline"],"examples":[{"text":"A cat purred.","ref":"Book"}]},
            {"tags":["no-gloss"]}
        ],
        "synonyms":[{"word":"kitty"}]}"#;

    #[test]
    fn test_validate_full_record() {
        let entry = parse_record(CAT).unwrap();
        let rec = validate(&entry).unwrap();
        assert_eq!(rec.word.literal, "cat");
        assert_eq!(rec.word.part_of_speech, "noun");
        assert_eq!(rec.word.etymology_number, 0);
        assert_eq!(rec.word.categories, vec!["Felids", "Pets"]);

        // Duplicate definition merged, gloss-less sense dropped.
        assert_eq!(rec.senses.len(), 1);
        let sense = &rec.senses[0];
        assert_eq!(sense.tags, vec!["countable"]);
        assert_eq!(sense.examples.len(), 2);
        assert_eq!(sense.examples[0].translation.as_deref(), Some("Le chat"));
        assert_eq!(sense.examples[1].reference.as_deref(), Some("Book"));

        assert_eq!(rec.forms.len(), 1);
        assert_eq!(rec.forms[0].tags, vec!["plural"]);
        assert_eq!(rec.relations.triples.len(), 1);
    }

    #[test]
    fn test_merged_senses_keep_all_labels() {
        let entry = parse_record(
            r#"{"word":"run","lang":"English","lang_code":"en","pos":"verb","senses":[
                {"glosses":["to move fast"],"tags":["intransitive"],"topics":["sports"],
                 "translations":[{"word":"courir","lang":"French","code":"fr"}]},
                {"glosses":["to move fast"],"tags":["intransitive","informal"],
                 "categories":["Motion"],"topics":["athletics"],
                 "translations":[{"word":"laufen","lang":"German","code":"de","sense":"move"},{"lang":"Dutch"}]}
            ]}"#,
        )
        .unwrap();
        let rec = validate(&entry).unwrap();
        assert_eq!(rec.senses.len(), 1);
        let sense = &rec.senses[0];
        assert_eq!(sense.tags, vec!["intransitive", "informal"]);
        assert_eq!(sense.categories, vec!["Motion"]);
        assert_eq!(sense.topics, vec!["sports", "athletics"]);
        // The Dutch entry names no word and is dropped.
        let words: Vec<&str> = sense.translations.iter().map(|t| t.word.as_str()).collect();
        assert_eq!(words, vec!["courir", "laufen"]);
        assert_eq!(sense.translations[1].sense_note.as_deref(), Some("move"));
    }

    #[test]
    fn test_example_and_form_of_fields() {
        let entry = parse_record(
            r#"{"word":"ran","lang":"English","lang_code":"en","pos":"verb","senses":[
                {"glosses":["simple past of run"],"form_of":[{"word":"run"}],"alt_of":[],
                 "examples":[{"text":"He ran.","type":"example","note":"past","roman":"hi ran"}]}
            ]}"#,
        )
        .unwrap();
        let sense = &validate(&entry).unwrap().senses[0];
        assert_eq!(sense.form_of.as_deref(), Some(r#"[{"word":"run"}]"#));
        assert_eq!(sense.alt_of, None);
        let example = &sense.examples[0];
        assert_eq!(example.kind.as_deref(), Some("example"));
        assert_eq!(example.note.as_deref(), Some("past"));
        assert_eq!(example.roman.as_deref(), Some("hi ran"));
    }

    #[test]
    fn test_malformed_line() {
        assert!(matches!(
            parse_record("{not json"),
            Err(WikiliteError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_missing_required_field() {
        let entry = parse_record(r#"{"word":"cat","lang_code":"en","senses":[{"glosses":["x"]}]}"#)
            .unwrap();
        assert!(matches!(
            validate(&entry),
            Err(WikiliteError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_record_without_gloss_is_invalid() {
        let entry =
            parse_record(r#"{"word":"cat","lang":"English","lang_code":"en","senses":[{"tags":["x"]}]}"#)
                .unwrap();
        assert!(matches!(validate(&entry), Err(WikiliteError::InvalidRecord(_))));
    }

    #[test]
    fn test_missing_pos_defaults_to_unknown() {
        let entry =
            parse_record(r#"{"word":"cat","lang":"English","lang_code":"en","senses":[{"glosses":["x"]}]}"#)
                .unwrap();
        let rec = validate(&entry).unwrap();
        assert_eq!(rec.word.part_of_speech, UNKNOWN_POS);
        assert_eq!(rec.word.key(), ("cat".into(), "unknown".into(), "en".into(), 0));
    }
}
