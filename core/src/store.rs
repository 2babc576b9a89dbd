//! Persisted store interface and a reference implementation.
//!
//! The engine only ever talks to `LinguisticStore`. `RecordStore` is a small,
//! correctness-first implementation of it with two backends:
//! - `InMemory`: a thread-safe map, used by tests and short-lived tools.
//! - `Redb`: records bincode-encoded in a redb table keyed by id.
//!
//! Every trait call is its own unit of work; nothing groups several calls into
//! one transaction, so other readers may observe intermediate states (for
//! example an analysis that does not have its bundles yet).

use crate::error::{StoreError, StoreResult};
use crate::ids::{ObjId, WsId};
use crate::model::{
    Allomorph, Analysis, Entry, Evaluation, Gloss, MorphBundle, MorphType, Msa, MultiString,
    PartOfSpeech, Record, Sense, Wordform,
};
use crate::utils::normalize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tracing::{debug, warn};

macro_rules! typed_getter {
    ($(#[$meta:meta])* $name:ident, $variant:ident, $ty:ty, $kind:expr) => {
        $(#[$meta])*
        fn $name(&self, id: ObjId) -> StoreResult<$ty> {
            match self.record(id)? {
                Record::$variant(r) => Ok(r),
                other => Err(StoreError::WrongKind {
                    id,
                    expected: $kind,
                    found: other.kind(),
                }),
            }
        }
    };
}

/// Operations the engine needs from the shared linguistic database.
///
/// All methods take `&self`: the store is shared between editing sessions and
/// implementations are expected to synchronize internally.
pub trait LinguisticStore {
    /// True if `id` names an existing object.
    fn is_valid(&self, id: ObjId) -> bool;

    fn record(&self, id: ObjId) -> StoreResult<Record>;

    fn find_wordform(&self, text: &str, ws: WsId) -> StoreResult<Option<ObjId>>;
    fn create_wordform(&self, text: &str, ws: WsId) -> StoreResult<ObjId>;
    /// Drop the cached re-evaluation checksum of a wordform.
    fn clear_checksum(&self, wordform: ObjId) -> StoreResult<()>;

    fn create_analysis(&self, wordform: ObjId) -> StoreResult<ObjId>;
    fn set_category(&self, analysis: ObjId, category: Option<ObjId>) -> StoreResult<()>;

    /// Create a bundle at `index` in the analysis' bundle sequence.
    fn create_bundle(&self, analysis: ObjId, index: usize) -> StoreResult<ObjId>;
    fn set_morph(&self, bundle: ObjId, morph: Option<ObjId>) -> StoreResult<()>;
    fn set_sense(&self, bundle: ObjId, sense: Option<ObjId>) -> StoreResult<()>;
    fn set_msa(&self, bundle: ObjId, msa: Option<ObjId>) -> StoreResult<()>;
    fn set_literal_form(&self, bundle: ObjId, ws: WsId, text: &str) -> StoreResult<()>;

    fn create_gloss(&self, analysis: ObjId) -> StoreResult<ObjId>;
    fn set_gloss_text(&self, gloss: ObjId, ws: WsId, text: &str) -> StoreResult<()>;
    /// Re-own a gloss under another analysis.
    fn move_gloss(&self, gloss: ObjId, analysis: ObjId) -> StoreResult<()>;

    /// Allomorphs whose form in `ws` equals `text` and whose morph type is in
    /// `filter` (an empty filter accepts every type).
    fn find_allomorphs(
        &self,
        text: &str,
        ws: WsId,
        filter: &[MorphType],
    ) -> StoreResult<Vec<ObjId>>;
    fn create_entry(&self, citation: &str, ws: WsId) -> StoreResult<ObjId>;
    fn create_allomorph(
        &self,
        entry: ObjId,
        text: &str,
        ws: WsId,
        morph_type: MorphType,
    ) -> StoreResult<ObjId>;
    fn create_sense(&self, entry: ObjId) -> StoreResult<ObjId>;
    fn set_sense_gloss(&self, sense: ObjId, ws: WsId, text: &str) -> StoreResult<()>;
    fn create_msa(&self, entry: ObjId, part_of_speech: Option<ObjId>) -> StoreResult<ObjId>;
    fn set_sense_msa(&self, sense: ObjId, msa: Option<ObjId>) -> StoreResult<()>;

    typed_getter!(wordform, Wordform, Wordform, "wordform");
    typed_getter!(analysis, Analysis, Analysis, "analysis");
    typed_getter!(bundle, MorphBundle, MorphBundle, "morph bundle");
    typed_getter!(gloss, Gloss, Gloss, "gloss");
    typed_getter!(entry, Entry, Entry, "entry");
    typed_getter!(allomorph, Allomorph, Allomorph, "allomorph");
    typed_getter!(sense, Sense, Sense, "sense");
    typed_getter!(msa, Msa, Msa, "msa");
    typed_getter!(part_of_speech, PartOfSpeech, PartOfSpeech, "part of speech");

    fn get_analyses(&self, wordform: ObjId) -> StoreResult<Vec<ObjId>> {
        Ok(self.wordform(wordform)?.analyses)
    }

    fn get_bundles(&self, analysis: ObjId) -> StoreResult<Vec<ObjId>> {
        Ok(self.analysis(analysis)?.bundles)
    }

    fn get_glosses(&self, analysis: ObjId) -> StoreResult<Vec<ObjId>> {
        Ok(self.analysis(analysis)?.glosses)
    }

    fn senses_of(&self, entry: ObjId) -> StoreResult<Vec<ObjId>> {
        Ok(self.entry(entry)?.senses)
    }

    fn is_human_evaluated(&self, analysis: ObjId) -> StoreResult<bool> {
        Ok(self.analysis(analysis)?.evaluation.is_human())
    }

    fn gloss_referrer_count(&self, gloss: ObjId) -> StoreResult<usize> {
        Ok(self.gloss(gloss)?.referrers as usize)
    }

    /// Short human-readable label for an object in `ws`.
    fn display_name(&self, id: ObjId, ws: WsId) -> StoreResult<String> {
        let name = match self.record(id)? {
            Record::Wordform(w) => w.form.get(ws).to_string(),
            Record::Gloss(g) => g.text.get(ws).to_string(),
            Record::Allomorph(a) => a.form.get(ws).to_string(),
            Record::Sense(s) => s.gloss.get(ws).to_string(),
            Record::PartOfSpeech(p) => {
                let abbr = p.abbreviation.get(ws);
                if abbr.is_empty() {
                    p.name.get(ws).to_string()
                } else {
                    abbr.to_string()
                }
            }
            Record::Msa(m) => match m.part_of_speech {
                Some(pos) if self.is_valid(pos) => self.display_name(pos, ws)?,
                _ => String::new(),
            },
            Record::Entry(e) => {
                let citation = e.citation.get(ws);
                if !citation.is_empty() {
                    citation.to_string()
                } else if let Some(first) = e.allomorphs.first() {
                    self.display_name(*first, ws)?
                } else {
                    String::new()
                }
            }
            Record::Analysis(_) | Record::MorphBundle(_) => String::new(),
        };
        Ok(name)
    }
}

/// In-memory record table.
#[derive(Debug, Default)]
struct MemoryTable {
    inner: RwLock<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    records: BTreeMap<ObjId, Record>,
    last_id: u32,
}

impl MemoryTable {
    fn get(&self, id: ObjId) -> Option<Record> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.records.get(&id).cloned()
    }

    fn insert_new(&self, record: Record) -> ObjId {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.last_id += 1;
        let id = ObjId(inner.last_id);
        inner.records.insert(id, record);
        id
    }

    fn update<F>(&self, id: ObjId, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Record) -> StoreResult<()>,
    {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let record = inner.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        f(record)
    }

    fn remove(&self, id: ObjId) -> Option<Record> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.records.remove(&id)
    }

    fn scan(&self) -> Vec<(ObjId, Record)> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .records
            .iter()
            .map(|(id, r)| (*id, r.clone()))
            .collect()
    }
}

/// Redb-backed record table.
///
/// Records are stored as bincode blobs under their numeric id; the next id to
/// hand out lives in a small metadata table.
struct RedbTable {
    db: redb::Database,
    path: PathBuf,
}

impl std::fmt::Debug for RedbTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbTable").field("path", &self.path).finish()
    }
}

impl RedbTable {
    const RECORDS: redb::TableDefinition<'static, u32, &'static [u8]> =
        redb::TableDefinition::new("records");
    const META: redb::TableDefinition<'static, &'static str, u32> =
        redb::TableDefinition::new("meta");
    const LAST_ID: &'static str = "last_id";

    fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = redb::Database::create(path.as_ref())?;
        // Make sure both tables exist so read transactions can open them.
        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(Self::RECORDS)?;
            write_txn.open_table(Self::META)?;
        }
        write_txn.commit()?;
        debug!(path = %path.as_ref().display(), "store: opened redb database");
        Ok(Self {
            db,
            path: path.as_ref().to_path_buf(),
        })
    }

    fn get(&self, id: ObjId) -> StoreResult<Option<Record>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(Self::RECORDS)?;
        match table.get(id.0)? {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes.value())?)),
            None => Ok(None),
        }
    }

    fn insert_new(&self, record: &Record) -> StoreResult<ObjId> {
        use redb::ReadableTable;
        let bytes = bincode::serialize(record)?;
        let write_txn = self.db.begin_write()?;
        let id = {
            let mut meta = write_txn.open_table(Self::META)?;
            let last = meta.get(Self::LAST_ID)?.map(|v| v.value()).unwrap_or(0);
            let id = last + 1;
            meta.insert(Self::LAST_ID, id)?;
            let mut table = write_txn.open_table(Self::RECORDS)?;
            table.insert(id, bytes.as_slice())?;
            id
        };
        write_txn.commit()?;
        Ok(ObjId(id))
    }

    fn update<F>(&self, id: ObjId, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Record) -> StoreResult<()>,
    {
        use redb::ReadableTable;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(Self::RECORDS)?;
            let current = table.get(id.0)?.map(|v| v.value().to_vec());
            let Some(current) = current else {
                return Err(StoreError::NotFound(id));
            };
            let mut record: Record = bincode::deserialize(&current)?;
            f(&mut record)?;
            let bytes = bincode::serialize(&record)?;
            table.insert(id.0, bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn remove(&self, id: ObjId) -> StoreResult<Option<Record>> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(Self::RECORDS)?;
            let removed = table.remove(id.0)?.map(|v| v.value().to_vec());
            removed
        };
        write_txn.commit()?;
        match removed {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan(&self) -> StoreResult<Vec<(ObjId, Record)>> {
        use redb::ReadableTable;
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(Self::RECORDS)?;
        let mut out = Vec::new();
        for item in table.iter()? {
            let (k, v) = item?;
            out.push((ObjId(k.value()), bincode::deserialize(v.value())?));
        }
        Ok(out)
    }
}

#[derive(Debug)]
enum Backend {
    InMemory(MemoryTable),
    Redb(RedbTable),
}

impl Backend {
    fn get(&self, id: ObjId) -> StoreResult<Option<Record>> {
        match self {
            Backend::InMemory(m) => Ok(m.get(id)),
            Backend::Redb(r) => r.get(id),
        }
    }

    fn insert_new(&self, record: Record) -> StoreResult<ObjId> {
        match self {
            Backend::InMemory(m) => Ok(m.insert_new(record)),
            Backend::Redb(r) => r.insert_new(&record),
        }
    }

    fn update<F>(&self, id: ObjId, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Record) -> StoreResult<()>,
    {
        match self {
            Backend::InMemory(m) => m.update(id, f),
            Backend::Redb(r) => r.update(id, f),
        }
    }

    fn remove(&self, id: ObjId) -> StoreResult<Option<Record>> {
        match self {
            Backend::InMemory(m) => Ok(m.remove(id)),
            Backend::Redb(r) => r.remove(id),
        }
    }

    fn scan(&self) -> StoreResult<Vec<(ObjId, Record)>> {
        match self {
            Backend::InMemory(m) => Ok(m.scan()),
            Backend::Redb(r) => r.scan(),
        }
    }
}

/// Reference `LinguisticStore` over an in-memory or redb backend.
#[derive(Debug)]
pub struct RecordStore {
    backend: Backend,
    read_only: AtomicBool,
}

impl RecordStore {
    /// An empty in-memory store.
    pub fn new_in_memory() -> Self {
        Self {
            backend: Backend::InMemory(MemoryTable::default()),
            read_only: AtomicBool::new(false),
        }
    }

    /// Create or open a redb-backed store at `path`.
    pub fn new_redb<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Ok(Self {
            backend: Backend::Redb(RedbTable::open(path)?),
            read_only: AtomicBool::new(false),
        })
    }

    /// Path of the database file, if redb-backed.
    pub fn path(&self) -> Option<&Path> {
        match &self.backend {
            Backend::InMemory(_) => None,
            Backend::Redb(r) => Some(&r.path),
        }
    }

    /// Refuse (or accept again) all writes. Refused writes fail with
    /// `StoreError::ReadOnly`.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    /// All records in id order.
    pub fn snapshot(&self) -> StoreResult<Vec<(ObjId, Record)>> {
        self.backend.scan()
    }

    pub fn create_part_of_speech(&self, name: &str, abbreviation: &str, ws: WsId) -> StoreResult<ObjId> {
        self.insert(Record::PartOfSpeech(PartOfSpeech {
            name: MultiString::from_text(ws, name),
            abbreviation: MultiString::from_text(ws, abbreviation),
        }))
    }

    pub fn set_evaluation(&self, analysis: ObjId, evaluation: Evaluation) -> StoreResult<()> {
        self.edit(analysis, "analysis", |rec| match rec {
            Record::Analysis(a) => {
                a.evaluation = evaluation;
                true
            }
            _ => false,
        })
    }

    /// Store the parser re-evaluation checksum of a wordform.
    pub fn set_checksum(&self, wordform: ObjId, checksum: Option<u32>) -> StoreResult<()> {
        self.edit(wordform, "wordform", |rec| match rec {
            Record::Wordform(w) => {
                w.checksum = checksum;
                true
            }
            _ => false,
        })
    }

    /// Record one more text occurrence pointing at `gloss`.
    pub fn add_gloss_referrer(&self, gloss: ObjId) -> StoreResult<()> {
        self.edit(gloss, "gloss", |rec| match rec {
            Record::Gloss(g) => {
                g.referrers = g.referrers.saturating_add(1);
                true
            }
            _ => false,
        })
    }

    /// Delete an object together with everything it owns, and unlink it from
    /// its owner. References held elsewhere (bundle -> sense, ...) are left
    /// dangling, exactly as a concurrent deletion by another client would.
    pub fn delete(&self, id: ObjId) -> StoreResult<()> {
        self.check_writable()?;
        let Some(record) = self.backend.remove(id)? else {
            return Err(StoreError::NotFound(id));
        };
        for child in owned_children(&record) {
            if self.backend.get(child)?.is_some() {
                self.delete(child)?;
            }
        }
        if let Some(owner) = record.owner() {
            match self.backend.update(owner, |rec| {
                unlink_child(rec, id);
                Ok(())
            }) {
                Ok(()) | Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        debug!(id = %id, kind = record.kind(), "store: deleted record");
        Ok(())
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.is_read_only() {
            Err(StoreError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn insert(&self, record: Record) -> StoreResult<ObjId> {
        self.check_writable()?;
        self.backend.insert_new(record)
    }

    /// Apply `f` to a record; `f` returns false if the record has the wrong kind.
    fn edit<F>(&self, id: ObjId, expected: &'static str, f: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Record) -> bool,
    {
        self.check_writable()?;
        self.backend.update(id, |rec| {
            let found = rec.kind();
            if f(rec) {
                Ok(())
            } else {
                Err(StoreError::WrongKind {
                    id,
                    expected,
                    found,
                })
            }
        })
    }

    fn edit_bundle<F: FnOnce(&mut MorphBundle)>(&self, id: ObjId, f: F) -> StoreResult<()> {
        self.edit(id, "morph bundle", |rec| match rec {
            Record::MorphBundle(b) => {
                f(b);
                true
            }
            _ => false,
        })
    }
}

fn owned_children(record: &Record) -> Vec<ObjId> {
    match record {
        Record::Wordform(w) => w.analyses.clone(),
        Record::Analysis(a) => a.bundles.iter().chain(&a.glosses).copied().collect(),
        Record::Entry(e) => e.allomorphs.iter().chain(&e.senses).copied().collect(),
        _ => Vec::new(),
    }
}

fn unlink_child(owner: &mut Record, child: ObjId) {
    match owner {
        Record::Wordform(w) => w.analyses.retain(|c| *c != child),
        Record::Analysis(a) => {
            a.bundles.retain(|c| *c != child);
            a.glosses.retain(|c| *c != child);
        }
        Record::Entry(e) => {
            e.allomorphs.retain(|c| *c != child);
            e.senses.retain(|c| *c != child);
        }
        _ => {}
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new_in_memory()
    }
}

impl LinguisticStore for RecordStore {
    fn is_valid(&self, id: ObjId) -> bool {
        match self.backend.get(id) {
            Ok(found) => found.is_some(),
            Err(e) => {
                warn!(id = %id, error = %e, "store: validity check failed, treating id as invalid");
                false
            }
        }
    }

    fn record(&self, id: ObjId) -> StoreResult<Record> {
        self.backend.get(id)?.ok_or(StoreError::NotFound(id))
    }

    fn find_wordform(&self, text: &str, ws: WsId) -> StoreResult<Option<ObjId>> {
        let wanted = normalize(text);
        Ok(self.backend.scan()?.into_iter().find_map(|(id, rec)| match rec {
            Record::Wordform(w) if normalize(w.form.get(ws)) == wanted => Some(id),
            _ => None,
        }))
    }

    fn create_wordform(&self, text: &str, ws: WsId) -> StoreResult<ObjId> {
        self.insert(Record::Wordform(Wordform {
            form: MultiString::from_text(ws, normalize(text)),
            analyses: Vec::new(),
            checksum: None,
        }))
    }

    fn clear_checksum(&self, wordform: ObjId) -> StoreResult<()> {
        self.edit(wordform, "wordform", |rec| match rec {
            Record::Wordform(w) => {
                w.checksum = None;
                true
            }
            _ => false,
        })
    }

    fn create_analysis(&self, wordform: ObjId) -> StoreResult<ObjId> {
        // Validate the owner before creating anything.
        self.wordform(wordform)?;
        let id = self.insert(Record::Analysis(Analysis {
            owner: wordform,
            category: None,
            bundles: Vec::new(),
            glosses: Vec::new(),
            evaluation: Evaluation::Unevaluated,
        }))?;
        self.edit(wordform, "wordform", |rec| match rec {
            Record::Wordform(w) => {
                w.analyses.push(id);
                true
            }
            _ => false,
        })?;
        Ok(id)
    }

    fn set_category(&self, analysis: ObjId, category: Option<ObjId>) -> StoreResult<()> {
        self.edit(analysis, "analysis", |rec| match rec {
            Record::Analysis(a) => {
                a.category = category;
                true
            }
            _ => false,
        })
    }

    fn create_bundle(&self, analysis: ObjId, index: usize) -> StoreResult<ObjId> {
        self.analysis(analysis)?;
        let id = self.insert(Record::MorphBundle(MorphBundle {
            owner: analysis,
            morph: None,
            sense: None,
            msa: None,
            form: MultiString::new(),
        }))?;
        self.edit(analysis, "analysis", |rec| match rec {
            Record::Analysis(a) => {
                let at = index.min(a.bundles.len());
                a.bundles.insert(at, id);
                true
            }
            _ => false,
        })?;
        Ok(id)
    }

    fn set_morph(&self, bundle: ObjId, morph: Option<ObjId>) -> StoreResult<()> {
        self.edit_bundle(bundle, |b| b.morph = morph)
    }

    fn set_sense(&self, bundle: ObjId, sense: Option<ObjId>) -> StoreResult<()> {
        self.edit_bundle(bundle, |b| b.sense = sense)
    }

    fn set_msa(&self, bundle: ObjId, msa: Option<ObjId>) -> StoreResult<()> {
        self.edit_bundle(bundle, |b| b.msa = msa)
    }

    fn set_literal_form(&self, bundle: ObjId, ws: WsId, text: &str) -> StoreResult<()> {
        self.edit_bundle(bundle, |b| b.form.set(ws, text))
    }

    fn create_gloss(&self, analysis: ObjId) -> StoreResult<ObjId> {
        self.analysis(analysis)?;
        let id = self.insert(Record::Gloss(Gloss {
            owner: analysis,
            text: MultiString::new(),
            referrers: 0,
        }))?;
        self.edit(analysis, "analysis", |rec| match rec {
            Record::Analysis(a) => {
                a.glosses.push(id);
                true
            }
            _ => false,
        })?;
        Ok(id)
    }

    fn set_gloss_text(&self, gloss: ObjId, ws: WsId, text: &str) -> StoreResult<()> {
        self.edit(gloss, "gloss", |rec| match rec {
            Record::Gloss(g) => {
                g.text.set(ws, text);
                true
            }
            _ => false,
        })
    }

    fn move_gloss(&self, gloss: ObjId, analysis: ObjId) -> StoreResult<()> {
        let old_owner = self.gloss(gloss)?.owner;
        if old_owner == analysis {
            return Ok(());
        }
        self.analysis(analysis)?;
        match self.edit(old_owner, "analysis", |rec| {
            unlink_child(rec, gloss);
            matches!(rec, Record::Analysis(_))
        }) {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.edit(analysis, "analysis", |rec| match rec {
            Record::Analysis(a) => {
                a.glosses.push(gloss);
                true
            }
            _ => false,
        })?;
        self.edit(gloss, "gloss", |rec| match rec {
            Record::Gloss(g) => {
                g.owner = analysis;
                true
            }
            _ => false,
        })
    }

    fn find_allomorphs(
        &self,
        text: &str,
        ws: WsId,
        filter: &[MorphType],
    ) -> StoreResult<Vec<ObjId>> {
        let wanted = normalize(text);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .backend
            .scan()?
            .into_iter()
            .filter_map(|(id, rec)| match rec {
                Record::Allomorph(a)
                    if normalize(a.form.get(ws)) == wanted
                        && (filter.is_empty() || filter.contains(&a.morph_type)) =>
                {
                    Some(id)
                }
                _ => None,
            })
            .collect())
    }

    fn create_entry(&self, citation: &str, ws: WsId) -> StoreResult<ObjId> {
        self.insert(Record::Entry(Entry {
            citation: MultiString::from_text(ws, citation),
            allomorphs: Vec::new(),
            senses: Vec::new(),
        }))
    }

    fn create_allomorph(
        &self,
        entry: ObjId,
        text: &str,
        ws: WsId,
        morph_type: MorphType,
    ) -> StoreResult<ObjId> {
        self.entry(entry)?;
        let id = self.insert(Record::Allomorph(Allomorph {
            owner: entry,
            form: MultiString::from_text(ws, normalize(text)),
            morph_type,
        }))?;
        self.edit(entry, "entry", |rec| match rec {
            Record::Entry(e) => {
                e.allomorphs.push(id);
                true
            }
            _ => false,
        })?;
        Ok(id)
    }

    fn create_sense(&self, entry: ObjId) -> StoreResult<ObjId> {
        self.entry(entry)?;
        let id = self.insert(Record::Sense(Sense {
            owner: entry,
            gloss: MultiString::new(),
            msa: None,
        }))?;
        self.edit(entry, "entry", |rec| match rec {
            Record::Entry(e) => {
                e.senses.push(id);
                true
            }
            _ => false,
        })?;
        Ok(id)
    }

    fn set_sense_gloss(&self, sense: ObjId, ws: WsId, text: &str) -> StoreResult<()> {
        self.edit(sense, "sense", |rec| match rec {
            Record::Sense(s) => {
                s.gloss.set(ws, text);
                true
            }
            _ => false,
        })
    }

    fn create_msa(&self, entry: ObjId, part_of_speech: Option<ObjId>) -> StoreResult<ObjId> {
        self.entry(entry)?;
        self.insert(Record::Msa(Msa {
            owner: entry,
            part_of_speech,
        }))
    }

    fn set_sense_msa(&self, sense: ObjId, msa: Option<ObjId>) -> StoreResult<()> {
        self.edit(sense, "sense", |rec| match rec {
            Record::Sense(s) => {
                s.msa = msa;
                true
            }
            _ => false,
        })
    }
}
