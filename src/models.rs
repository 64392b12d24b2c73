use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// --- Source Records ---

/// One line of a wiktextract-style dump: a headword with its senses, forms and relation lists.
///
/// Required fields are kept optional here so a record missing them can be reported as invalid
/// instead of failing JSON decoding outright.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct WordEntry {
    #[serde(default)]
    pub word: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub lang_code: Option<String>,
    #[serde(default)]
    pub pos: Option<String>,
    #[serde(default)]
    pub etymology_text: Option<String>,
    #[serde(default)]
    pub etymology_number: Option<i64>,
    #[serde(default)]
    pub senses: Vec<WordSense>,
    #[serde(default)]
    pub forms: Vec<FormData>,
    #[serde(default)]
    pub categories: Vec<CategoryRef>,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Every other top-level field. Relation lists ("synonyms", "hypernyms", ...) are picked out
    /// of here by the relation normalizer.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct WordSense {
    #[serde(default)]
    pub glosses: Vec<String>,
    #[serde(default)]
    pub raw_glosses: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<CategoryRef>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub examples: Vec<ExampleData>,
    #[serde(default)]
    pub translations: Vec<TranslationData>,
    /// Words this sense is an alternative spelling of, kept as the raw JSON list.
    #[serde(default)]
    pub alt_of: Option<Value>,
    /// Lemmas this sense is an inflection of, kept as the raw JSON list.
    #[serde(default)]
    pub form_of: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WordSense {
    /// Definition text of the sense: cleaned glosses, falling back to raw glosses.
    pub fn definition(&self) -> Option<String> {
        let glosses = if self.glosses.iter().any(|g| !g.trim().is_empty()) {
            &self.glosses
        } else {
            &self.raw_glosses
        };
        let parts: Vec<&str> = glosses
            .iter()
            .map(|g| g.trim())
            .filter(|g| !g.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" | "))
        }
    }

    pub fn raw_gloss(&self) -> Option<String> {
        if self.raw_glosses.is_empty() {
            None
        } else {
            Some(self.raw_glosses.join(" | "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ExampleData {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub english: Option<String>,
    #[serde(default)]
    pub translation: Option<String>,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub roman: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    /// "example" or "quotation".
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// A translation of one sense into another language.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct TranslationData {
    #[serde(default)]
    pub word: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
    #[serde(default)]
    pub roman: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    /// Which meaning of the headword the translation is for, as free text.
    #[serde(default)]
    pub sense: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub taxonomic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct FormData {
    #[serde(default)]
    pub form: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub ipa: Option<String>,
    #[serde(default)]
    pub roman: Option<String>,
}

/// Categories appear either as plain strings or as objects carrying a `name`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CategoryRef {
    Plain(String),
    Named { name: String },
}

impl CategoryRef {
    pub fn name(&self) -> &str {
        match self {
            CategoryRef::Plain(name) => name,
            CategoryRef::Named { name } => name,
        }
    }
}

/// One element of a relation list, e.g. `{"word": "kitty", "sense": "informal"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Linkage {
    pub word: String,
    #[serde(default)]
    pub sense: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub taxonomic: Option<String>,
}

// --- Store Rows ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Word {
    pub id: i64,
    pub literal: String,
    pub part_of_speech: String,
    pub language: String,
    pub language_code: String,
    pub etymology_text: Option<String>,
    pub etymology_number: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sense {
    pub id: i64,
    pub word_id: i64,
    pub definition: String,
    pub raw_gloss: Option<String>,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub topics: Vec<String>,
    /// JSON text as found in the source.
    pub alt_of: Option<String>,
    pub form_of: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Example {
    pub id: i64,
    pub sense_id: i64,
    pub text: String,
    pub translation: Option<String>,
    pub reference: Option<String>,
    pub roman: Option<String>,
    pub note: Option<String>,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Translation {
    pub id: i64,
    pub sense_id: i64,
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Form {
    pub id: i64,
    pub word_id: i64,
    pub form: String,
    pub tags: Vec<String>,
    pub ipa: Option<String>,
    pub romanization: Option<String>,
}

/// A directed `(subject, predicate, object)` edge between two word rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Triple {
    pub id: i64,
    pub subject_id: i64,
    pub predicate: String,
    pub object_id: i64,
    pub sense_qualifier: Option<String>,
    pub topics: Option<String>,
    pub taxonomic_name: Option<String>,
}

impl Triple {
    /// The endpoint across the edge from `node`.
    pub fn opposite(&self, node: i64) -> i64 {
        if self.subject_id == node {
            self.object_id
        } else {
            self.subject_id
        }
    }
}

/// Row counts of a store, as reported by `WikiLite::stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub words: u64,
    pub senses: u64,
    pub examples: u64,
    pub translations: u64,
    pub forms: u64,
    pub relations: u64,
    pub categories: u64,
    pub topics: u64,
    pub tags: u64,
}

// Implement Display for Triple for easier printing
impl std::fmt::Display for Triple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {} -[{}]-> {}",
            self.id, self.subject_id, self.predicate, self.object_id
        )
    }
}
