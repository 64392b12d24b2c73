//! Command-line interface for the wikilite lexical store.
//!
//! Imports wiktextract JSONL dumps into a SQLite store and queries words, definitions and the
//! relation graph built from them.

use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{LevelFilter, debug, error, info};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wikilite_rs::{
    ImportOptions, ImportReport, LoadOptions, Triple, WikiLite, Word,
    error::{Result, WikiliteError},
    import::DEFAULT_BATCH_SIZE,
    progress::{ProgressCallback, ProgressUpdate},
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Wiktextract lexical store CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a store file (optional; defaults to the cache path derived from the source)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Source JSONL dump; its cached store is used, importing it first if needed
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Rebuild the store even if a complete one exists
    #[arg(long, global = true, default_value_t = false)]
    force: bool,

    /// Records per import transaction
    #[arg(long, global = true, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Set verbosity level (use -v, -vv, or -vvv for increasing verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Import a JSONL dump into a store
    Import {
        /// The dump to import (plain or gzip-compressed)
        #[arg(value_name = "SOURCE")]
        file: PathBuf,
    },
    /// Search words containing a substring
    Search {
        term: String,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Show senses, examples, forms and direct relations of a word
    Define { word: String },
    /// Show the relation graph around a word
    Related {
        word: String,
        /// Maximum number of hops from the word
        #[arg(long, default_value_t = 1)]
        depth: u32,
        /// Only follow these predicates (repeatable)
        #[arg(long = "predicate")]
        predicates: Vec<String>,
    },
    /// Show a random word
    Random,
    /// Show row counts of the store
    Stats,
    /// Delete the store file
    ClearDb,
}

/// Sets up logging based on verbosity level.
fn setup_logging(verbose: u8) {
    let log_level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter(None, log_level)
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();
}

/// Creates a progress callback drawing one bar per import stage.
fn create_progress_callback(
    multi_progress: MultiProgress,
    progress_bars: Arc<Mutex<HashMap<&'static str, ProgressBar>>>,
) -> ProgressCallback {
    Box::new(move |update: ProgressUpdate| {
        let Ok(mut bars) = progress_bars.lock() else {
            return true;
        };

        let pb = bars
            .entry(update.stage)
            .or_insert_with(|| {
                let pb = multi_progress.add(ProgressBar::new(update.total.unwrap_or(0)));
                let style_template = if update.total.is_some() {
                    "{prefix:>24.cyan.bold} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>9}/{len:9} ({percent}%) {msg}"
                } else {
                    "{prefix:>24.cyan.bold} [{elapsed_precise}] {spinner} {pos} {msg}"
                };
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template(style_template)
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("##-"),
                );
                pb.set_prefix(update.stage);
                pb.enable_steady_tick(Duration::from_millis(100));
                pb
            });

        pb.set_position(update.done);
        let finished = update.is_finished();
        if let Some(msg) = update.message {
            pb.set_message(msg);
        }
        if finished {
            pb.finish_and_clear();
        }
        true
    })
}

fn fail(context: &str, e: &WikiliteError) -> ! {
    error!("{}: {}", context, e);
    eprintln!("{}", format!("Error: {}: {}", context, e).red());
    std::process::exit(1);
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let import_options = ImportOptions {
        batch_size: cli.batch_size,
        force: cli.force,
        ..Default::default()
    };

    let multi_progress = MultiProgress::new();
    let progress_bars = Arc::new(Mutex::new(HashMap::<&'static str, ProgressBar>::new()));
    let callback = create_progress_callback(multi_progress.clone(), progress_bars.clone());
    let finish_bars = || {
        if let Ok(bars) = progress_bars.lock() {
            for pb in bars.values() {
                pb.finish_and_clear();
            }
        }
        std::io::stdout().flush().ok();
    };

    match cli.command {
        Commands::Import { file: source } => {
            let db_path = match cli.db_path {
                Some(path) => path,
                None => WikiLite::get_default_db_path(&source)
                    .unwrap_or_else(|e| fail("Cannot resolve store path", &e)),
            };
            let started = Instant::now();
            let result = tokio::task::spawn_blocking(move || {
                WikiLite::import(&source, &db_path, import_options, Some(callback))
            })
            .await
            .map_err(WikiliteError::from)
            .and_then(|r| r);
            finish_bars();
            match result {
                Ok((wl, report)) => print_report(&wl, &report, started),
                Err(e) => fail("Import failed", &e),
            }
        }
        Commands::ClearDb => {
            info!("Clearing database...");
            let db_path = match (cli.db_path, cli.source) {
                (Some(path), _) => path,
                (None, Some(source)) => WikiLite::get_default_db_path(&source)
                    .unwrap_or_else(|e| fail("Cannot resolve store path", &e)),
                (None, None) => fail(
                    "Nothing to clear",
                    &WikiliteError::InvalidArgument("pass --db-path or --source".to_string()),
                ),
            };
            match WikiLite::clear_database(&db_path) {
                Ok(()) => println!("{}", "Database cleared successfully.".green()),
                Err(e) => fail("Failed to clear database", &e),
            }
        }
        command => {
            let wl = match open_store(cli.source, cli.db_path, import_options, callback).await {
                Ok(wl) => wl,
                Err(e) => {
                    finish_bars();
                    fail("Failed to load store", &e)
                }
            };
            finish_bars();
            drop(multi_progress);

            let outcome = match command {
                Commands::Search { term, limit } => handle_search(&wl, &term, limit),
                Commands::Define { word } => handle_define(&wl, &word),
                Commands::Related {
                    word,
                    depth,
                    predicates,
                } => handle_related(&wl, &word, depth, &predicates),
                Commands::Random => handle_random(&wl),
                Commands::Stats => handle_stats(&wl),
                Commands::Import { .. } | Commands::ClearDb => Ok(()),
            };
            if let Err(e) = outcome {
                fail("Command failed", &e);
            }
        }
    }

    Ok(())
}

/// Resolves the store a query command runs against.
async fn open_store(
    source: Option<PathBuf>,
    db_path: Option<PathBuf>,
    import: ImportOptions,
    callback: ProgressCallback,
) -> Result<WikiLite> {
    match (source, db_path) {
        (Some(source), db_path) => {
            info!("Loading store for {:?}...", source);
            WikiLite::load_with_options(&source, LoadOptions { db_path, import }, Some(callback))
                .await
        }
        (None, Some(db_path)) => WikiLite::open(&db_path),
        (None, None) => Err(WikiliteError::InvalidArgument(
            "pass --source or --db-path".to_string(),
        )),
    }
}

fn print_report(wl: &WikiLite, report: &ImportReport, started: Instant) {
    println!(
        "{} {} in {:.1?}",
        "Imported".green().bold(),
        wl.db_path().display(),
        started.elapsed()
    );
    println!(
        "  records: {} processed, {} skipped ({} malformed, {} invalid, {} duplicate)",
        report.processed,
        report.skipped(),
        report.skipped_malformed,
        report.skipped_invalid,
        report.skipped_duplicate
    );
    println!(
        "  words: {} kept, {} pruned; senses: {}; examples: {}; translations: {}; forms: {}",
        report.words_inserted - report.words_pruned,
        report.words_pruned,
        report.senses_inserted,
        report.examples_inserted,
        report.translations_inserted,
        report.forms_inserted
    );
    println!(
        "  relations: {} ({} triples dropped, {} with large homonym fan-out)",
        report.relations_inserted, report.triples_dropped, report.fanout_warnings
    );
}

fn word_label(word: &Word) -> String {
    format!("{} ({}, {})", word.literal, word.part_of_speech, word.language_code)
}

fn handle_search(wl: &WikiLite, term: &str, limit: usize) -> Result<()> {
    let words = wl.search_words(term, limit)?;
    if words.is_empty() {
        println!("No words matching '{}'.", term.yellow());
        return Ok(());
    }
    for word in words {
        println!(
            "{:>8}  {} ~ {}",
            word.id.to_string().dimmed(),
            word.literal.bold().cyan(),
            word.part_of_speech.italic()
        );
    }
    Ok(())
}

fn handle_define(wl: &WikiLite, literal: &str) -> Result<()> {
    let words = wl.lookup(literal)?;
    if words.is_empty() {
        println!("No definitions found for '{}'.", literal.yellow());
        return Ok(());
    }

    for word in words {
        println!(
            "\n{} ~ {} [{}]",
            word.literal.bold().cyan(),
            word.part_of_speech.italic(),
            word.language
        );
        if let Some(etymology) = &word.etymology_text {
            println!("  {}", etymology.trim().dimmed());
        }

        let forms = wl.get_forms(word.id)?;
        if !forms.is_empty() {
            let rendered: Vec<String> = forms
                .iter()
                .map(|f| {
                    if f.tags.is_empty() {
                        f.form.clone()
                    } else {
                        format!("{} [{}]", f.form, f.tags.join(", "))
                    }
                })
                .collect();
            println!("  Forms: {}", rendered.join("; ").green());
        }

        let examples = wl.get_examples(word.id)?;
        let translations = wl.get_translations(word.id)?;
        for (n, sense) in wl.get_senses(word.id)?.iter().enumerate() {
            print!("  {}: {}", (n + 1).to_string().bold(), sense.definition);
            if !sense.tags.is_empty() {
                print!(" {}", format!("({})", sense.tags.join(", ")).dimmed());
            }
            println!();
            for example in examples.iter().filter(|e| e.sense_id == sense.id) {
                println!("        {}", example.text.trim().italic());
            }
            let rendered: Vec<String> = translations
                .iter()
                .filter(|t| t.sense_id == sense.id)
                .map(|t| format!("{}: {}", t.code, t.word))
                .collect();
            if !rendered.is_empty() {
                println!("        {}", rendered.join("; ").blue());
            }
        }

        let (outgoing, incoming) = wl.get_relations(word.id)?;
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for triple in outgoing.iter().chain(incoming.iter()) {
            let other = wl.get_word(triple.opposite(word.id))?;
            let label = if triple.subject_id == word.id {
                triple.predicate.clone()
            } else {
                format!("{} (of)", triple.predicate)
            };
            grouped.entry(label).or_default().push(other.literal);
        }
        for (predicate, mut literals) in grouped {
            literals.sort();
            literals.dedup();
            println!(
                "        {}: {}",
                predicate.magenta(),
                literals.join(", ").green()
            );
        }
    }
    println!();
    Ok(())
}

fn handle_related(wl: &WikiLite, literal: &str, depth: u32, predicates: &[String]) -> Result<()> {
    let words = wl.lookup(literal)?;
    if words.is_empty() {
        println!("No word '{}' in the store.", literal.yellow());
        return Ok(());
    }

    let mut labels: HashMap<i64, String> = HashMap::new();
    for word in words {
        let start = Instant::now();
        let triples: Vec<Triple> = wl.get_relations_bounded(word.id, depth, Some(predicates))?;
        debug!(
            "Traversal from {} took {:?} ({} relations)",
            word.id,
            start.elapsed(),
            triples.len()
        );

        println!("\n{} (depth {})", word_label(&word).bold().cyan(), depth);
        if triples.is_empty() {
            println!("  {}", "no relations".dimmed());
            continue;
        }
        for triple in triples {
            for id in [triple.subject_id, triple.object_id] {
                if !labels.contains_key(&id) {
                    labels.insert(id, wl.get_word(id)?.literal);
                }
            }
            println!(
                "  {} {} {}",
                labels[&triple.subject_id],
                format!("-[{}]->", triple.predicate).magenta(),
                labels[&triple.object_id].green()
            );
        }
    }
    Ok(())
}

fn handle_random(wl: &WikiLite) -> Result<()> {
    info!("Getting random word...");
    match wl.random_word()? {
        Some(word) => println!(
            "Random word: {} ({})",
            word.literal.bold().cyan(),
            word.part_of_speech.italic()
        ),
        None => eprintln!("{}", "The store holds no words.".red()),
    }
    Ok(())
}

fn handle_stats(wl: &WikiLite) -> Result<()> {
    let stats = wl.stats()?;
    println!("{}", wl.db_path().display().to_string().bold());
    for (label, count) in [
        ("words", stats.words),
        ("senses", stats.senses),
        ("examples", stats.examples),
        ("translations", stats.translations),
        ("forms", stats.forms),
        ("relations", stats.relations),
        ("categories", stats.categories),
        ("topics", stats.topics),
        ("tags", stats.tags),
    ] {
        println!("  {:<14}{}", label, count.to_string().green());
    }
    let predicates = wl.predicates()?;
    if !predicates.is_empty() {
        println!("  {:<14}{}", "predicates", predicates.join(", "));
    }
    Ok(())
}
