//! glossa command-line front end
//!
//! Usage:
//!   glossa segment "institution-al-ly" --word institutionally
//!   glossa commit --db data/lexicon.redb --word dogs --breaks "dog -s" --gloss dog.PL

use anyhow::Context;
use clap::{Parser, Subcommand};
use glossa::{
    FormClassifier, GlossaConfig, ObjId, Record, RecordStore, SandboxSession, Segmenter, WsId,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "glossa")]
#[command(about = "Segment morpheme lines and commit word analyses")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split a morpheme line and classify each morph
    Segment {
        /// The morpheme line as typed
        text: String,

        /// The word being analysed (defaults to TEXT without spaces)
        #[arg(short, long)]
        word: Option<String>,

        /// Cursor position in TEXT, in chars (defaults to the end)
        #[arg(long)]
        cursor: Option<usize>,

        #[arg(long)]
        json: bool,
    },
    /// Analyse a word and write the analysis to a store
    Commit {
        /// redb store, created if missing
        #[arg(long)]
        db: PathBuf,

        #[arg(short, long)]
        word: String,

        /// Morpheme line, e.g. "dog -s"
        #[arg(short, long)]
        breaks: String,

        /// Word gloss in the first gloss writing system
        #[arg(short, long)]
        gloss: Option<String>,

        /// Part of speech name, created if missing
        #[arg(long)]
        category: Option<String>,
    },
}

#[derive(Serialize)]
struct MorphReport {
    text: String,
    prefix: String,
    bare: String,
    suffix: String,
    morph_type: &'static str,
    warning: Option<String>,
}

#[derive(Serialize)]
struct SegmentReport {
    line: String,
    cursor: usize,
    converged: bool,
    morphs: Vec<MorphReport>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => GlossaConfig::load_toml(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {}", path.display(), e))?,
        None => GlossaConfig::default(),
    };

    match cli.command {
        Command::Segment {
            text,
            word,
            cursor,
            json,
        } => segment(&config, &text, word, cursor, json),
        Command::Commit {
            db,
            word,
            breaks,
            gloss,
            category,
        } => commit(config, &db, &word, &breaks, gloss, category),
    }
}

fn segment(
    config: &GlossaConfig,
    text: &str,
    word: Option<String>,
    cursor: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let markers = config.marker_table();
    let word = word.unwrap_or_else(|| text.split_whitespace().collect());
    let cursor = cursor.unwrap_or_else(|| text.chars().count());
    let segmentation =
        Segmenter::new(&markers, config.phrase_separator_width).segment(text, &word, cursor);
    let classifier = FormClassifier::new(&markers);

    let report = SegmentReport {
        line: segmentation.render(),
        cursor: segmentation.cursor,
        converged: segmentation.converged,
        morphs: segmentation
            .morphs
            .iter()
            .map(|m| {
                let (c, warning) = classifier.classify(&m.text);
                MorphReport {
                    text: m.text.clone(),
                    prefix: c.prefix,
                    bare: c.bare,
                    suffix: c.suffix,
                    morph_type: c.morph_type.name(),
                    warning: warning.map(|w| w.to_string()),
                }
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("{}", report.line);
    for (i, m) in report.morphs.iter().enumerate() {
        print!("  {}. {:<16} {:<12} {}", i + 1, m.text, m.morph_type, m.bare);
        match &m.warning {
            Some(w) => println!("  ({})", w),
            None => println!(),
        }
    }
    if !report.converged {
        println!("warning: marker repair did not converge");
    }
    Ok(())
}

fn commit(
    config: GlossaConfig,
    db: &Path,
    word: &str,
    breaks: &str,
    gloss: Option<String>,
    category: Option<String>,
) -> anyhow::Result<()> {
    let store = RecordStore::new_redb(db)
        .with_context(|| format!("Failed to open store {}", db.display()))?;
    let vern = config.base().vernacular_ws;
    let gloss_ws = config.base().gloss_ws.first().copied();

    let category = match category {
        Some(name) => Some(find_or_create_pos(&store, &name, gloss_ws.unwrap_or(vern))?),
        None => None,
    };

    let mut session = SandboxSession::for_text(&store, config, word)?;
    let outcome = session.on_morpheme_text_edited(breaks, breaks.chars().count())?;
    for warning in &outcome.warnings {
        eprintln!("warning: {}", warning);
    }
    if let (Some(text), Some(ws)) = (gloss.as_deref(), gloss_ws) {
        session.set_word_gloss(ws, text)?;
    }
    if category.is_some() {
        session.set_word_category(category)?;
    }

    let result = session.commit()?;
    println!("{} -> {}", session.morph_break_text(), result);
    Ok(())
}

fn find_or_create_pos(store: &RecordStore, name: &str, ws: WsId) -> anyhow::Result<ObjId> {
    let existing = store.snapshot()?.into_iter().find_map(|(id, rec)| match rec {
        Record::PartOfSpeech(p) if p.name.get(ws) == name || p.abbreviation.get(ws) == name => {
            Some(id)
        }
        _ => None,
    });
    match existing {
        Some(id) => Ok(id),
        None => Ok(store.create_part_of_speech(name, name, ws)?),
    }
}
