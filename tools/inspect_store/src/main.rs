//! List the records of a redb-backed glossa store
//!
//! Usage:
//!   cargo run -p inspect_store -- data/lexicon.redb
//!   cargo run -p inspect_store -- data/lexicon.redb --kind analysis --json

use clap::Parser;
use glossa_core::{LinguisticStore, Record, RecordStore, WsId};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "inspect_store")]
#[command(about = "List the records of a glossa store")]
struct Args {
    /// Path to the redb store
    path: PathBuf,

    /// Only show records of this kind (wordform, analysis, "morph bundle", gloss, ...)
    #[arg(short, long)]
    kind: Option<String>,

    /// Writing system used for display names
    #[arg(long, default_value_t = 1)]
    ws: u32,

    /// Print records as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if !args.path.exists() {
        anyhow::bail!("No store at {}", args.path.display());
    }
    let store = RecordStore::new_redb(&args.path)?;
    store.set_read_only(true);

    let records: Vec<_> = store
        .snapshot()?
        .into_iter()
        .filter(|(_, rec)| args.kind.as_deref().map_or(true, |k| rec.kind() == k))
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!("Opened store: {:?} ({} records)", args.path, records.len());
    let ws = WsId(args.ws);
    for (id, rec) in &records {
        let name = store.display_name(*id, ws).unwrap_or_default();
        println!("  {:>6}  {:<14} {:<20} {}", id.to_string(), rec.kind(), name, summary(rec));
    }
    Ok(())
}

fn summary(rec: &Record) -> String {
    match rec {
        Record::Wordform(w) => format!("analyses={}", w.analyses.len()),
        Record::Analysis(a) => format!(
            "owner={} bundles={} glosses={} {:?}",
            a.owner,
            a.bundles.len(),
            a.glosses.len(),
            a.evaluation
        ),
        Record::MorphBundle(b) => format!(
            "owner={} morph={:?} sense={:?} msa={:?}",
            b.owner, b.morph, b.sense, b.msa
        ),
        Record::Gloss(g) => format!("owner={} referrers={}", g.owner, g.referrers),
        Record::Entry(e) => format!("allomorphs={} senses={}", e.allomorphs.len(), e.senses.len()),
        Record::Allomorph(a) => format!("owner={} {}", a.owner, a.morph_type.name()),
        Record::Sense(s) => format!("owner={} msa={:?}", s.owner, s.msa),
        Record::Msa(m) => format!("owner={} pos={:?}", m.owner, m.part_of_speech),
        Record::PartOfSpeech(_) => String::new(),
    }
}
