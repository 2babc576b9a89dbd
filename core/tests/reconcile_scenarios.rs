//! Commit scenarios for the reconciler against the in-memory and redb stores.
//!
//! Each test stages a word the way a front end would (merge + user choices)
//! and checks which persisted records the commit finds, fills in or creates.

use glossa_core::{
    AnalysisRef, Config, Evaluation, Field, GlossaError, LinguisticStore, MorphInput, MorphType,
    MultiString, ObjId, Reconciler, Record, RecordStore, StagingCache, StoreError, StoreResult,
    WsId,
};
use std::cell::Cell;

const VERN: WsId = WsId(1);
const EN: WsId = WsId(2);

fn config() -> Config {
    Config {
        vernacular_ws: VERN,
        gloss_ws: vec![EN],
        ..Config::default()
    }
}

fn suffix(bare: &str) -> MorphInput {
    MorphInput {
        prefix: "-".into(),
        bare: bare.into(),
        suffix: String::new(),
        morph_type: MorphType::Suffix,
    }
}

fn staged(word: &str, inputs: &[MorphInput]) -> StagingCache {
    let mut cache = StagingCache::new(VERN, word);
    cache.merge(inputs, |_| Ok(None)).unwrap();
    cache
}

fn link_sense(cache: &mut StagingCache, index: usize, sense: ObjId) {
    let slot = cache.morphs()[index];
    cache
        .attach(slot, Field::Sense, Some((sense, MultiString::new())), false)
        .unwrap();
}

fn commit(store: &RecordStore, cache: &mut StagingCache) -> AnalysisRef {
    let cfg = config();
    Reconciler::new(store, &cfg).commit(cache).unwrap()
}

fn analysis_of(store: &RecordStore, result: AnalysisRef) -> ObjId {
    match result {
        AnalysisRef::Analysis(id) => id,
        AnalysisRef::Gloss(id) => store.gloss(id).unwrap().owner,
        AnalysisRef::Wordform(id) => panic!("expected an analysis, got wordform {id}"),
    }
}

#[test]
fn test_unmarked_word_round_trips_as_one_literal_bundle() {
    let store = RecordStore::new_in_memory();
    let mut cache = staged("dogs", &[MorphInput::stem("dogs")]);
    cache.set_word_gloss(EN, "dogs").unwrap();

    let an = analysis_of(&store, commit(&store, &mut cache));
    let bundles = store.get_bundles(an).unwrap();
    assert_eq!(bundles.len(), 1);
    let bundle = store.bundle(bundles[0]).unwrap();
    assert_eq!(bundle.morph, None);
    assert_eq!(bundle.form.get(VERN), "dogs");
}

#[test]
fn test_unsegmented_word_without_enrichment_stays_a_wordform() {
    let store = RecordStore::new_in_memory();
    let mut cache = staged("dogs", &[MorphInput::stem("dogs")]);
    let result = commit(&store, &mut cache);
    assert!(matches!(result, AnalysisRef::Wordform(_)));
    assert!(store.get_analyses(result.id()).unwrap().is_empty());
}

#[test]
fn test_committing_twice_returns_same_analysis() {
    let store = RecordStore::new_in_memory();
    let mut cache = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);

    let first = commit(&store, &mut cache);
    let second = commit(&store, &mut cache);
    assert_eq!(first, second);
    let wf = store.find_wordform("dogs", VERN).unwrap().unwrap();
    assert_eq!(store.get_analyses(wf).unwrap().len(), 1);
    assert!(!cache.is_dirty());
}

#[test]
fn test_fresh_staging_finds_existing_analysis() {
    let store = RecordStore::new_in_memory();
    let mut first = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    let mut second = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    assert_eq!(commit(&store, &mut first), commit(&store, &mut second));
}

#[test]
fn test_partial_match_is_filled_in() {
    let store = RecordStore::new_in_memory();
    let entry = store.create_entry("dog", VERN).unwrap();
    let sense = store.create_sense(entry).unwrap();

    let mut plain = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    let existing = analysis_of(&store, commit(&store, &mut plain));
    let wf = store.analysis(existing).unwrap().owner;
    store.set_checksum(wf, Some(0xbeef)).unwrap();

    let mut enriched = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    link_sense(&mut enriched, 0, sense);
    let reused = analysis_of(&store, commit(&store, &mut enriched));

    assert_eq!(reused, existing);
    let first = store.get_bundles(existing).unwrap()[0];
    assert_eq!(store.bundle(first).unwrap().sense, Some(sense));
    assert_eq!(store.wordform(wf).unwrap().checksum, None);
}

#[test]
fn test_exact_match_keeps_checksum() {
    let store = RecordStore::new_in_memory();
    let mut first = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    let an = analysis_of(&store, commit(&store, &mut first));
    let wf = store.analysis(an).unwrap().owner;
    store.set_checksum(wf, Some(0xbeef)).unwrap();

    let mut again = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    assert_eq!(analysis_of(&store, commit(&store, &mut again)), an);
    assert_eq!(store.wordform(wf).unwrap().checksum, Some(0xbeef));
}

#[test]
fn test_partial_match_fills_in_unset_morph() {
    let store = RecordStore::new_in_memory();
    let mut plain = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    let existing = analysis_of(&store, commit(&store, &mut plain));
    let first = store.get_bundles(existing).unwrap()[0];
    assert_eq!(store.bundle(first).unwrap().morph, None);

    let entry = store.create_entry("dog", VERN).unwrap();
    let allomorph = store.create_allomorph(entry, "dog", VERN, MorphType::Stem).unwrap();
    let mut linked = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    let form = linked.morph(linked.morphs()[0]).unwrap().form;
    linked.map_to_real(form, allomorph).unwrap();

    assert_eq!(analysis_of(&store, commit(&store, &mut linked)), existing);
    assert_eq!(store.bundle(first).unwrap().morph, Some(allomorph));
    let wf = store.analysis(existing).unwrap().owner;
    assert_eq!(store.get_analyses(wf).unwrap().len(), 1);
}

#[test]
fn test_partial_match_requires_same_msa() {
    let store = RecordStore::new_in_memory();
    let noun = store.create_part_of_speech("noun", "n", EN).unwrap();
    let verb = store.create_part_of_speech("verb", "v", EN).unwrap();
    let entry = store.create_entry("dog", VERN).unwrap();
    let noun_msa = store.create_msa(entry, Some(noun)).unwrap();
    let verb_msa = store.create_msa(entry, Some(verb)).unwrap();

    let mut as_noun = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    let slot = as_noun.morphs()[0];
    as_noun
        .attach(slot, Field::Msa, Some((noun_msa, MultiString::new())), false)
        .unwrap();
    let existing = analysis_of(&store, commit(&store, &mut as_noun));

    // Same slots, sense now set, but a different msa: not a partial match.
    let sense = store.create_sense(entry).unwrap();
    let mut as_verb = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    let slot = as_verb.morphs()[0];
    as_verb
        .attach(slot, Field::Msa, Some((verb_msa, MultiString::new())), false)
        .unwrap();
    link_sense(&mut as_verb, 0, sense);
    let created = analysis_of(&store, commit(&store, &mut as_verb));

    assert_ne!(created, existing);
    let first = store.bundle(store.get_bundles(existing).unwrap()[0]).unwrap();
    assert_eq!(first.msa, Some(noun_msa));
    assert_eq!(first.sense, None);
}

#[test]
fn test_partial_match_rejects_different_sense() {
    let store = RecordStore::new_in_memory();
    let entry = store.create_entry("dog", VERN).unwrap();
    let animal = store.create_sense(entry).unwrap();
    let follow = store.create_sense(entry).unwrap();

    let mut first = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    link_sense(&mut first, 0, animal);
    let existing = analysis_of(&store, commit(&store, &mut first));

    let mut second = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    link_sense(&mut second, 0, follow);
    let created = analysis_of(&store, commit(&store, &mut second));

    assert_ne!(created, existing);
    let bundle = store.get_bundles(existing).unwrap()[0];
    assert_eq!(store.bundle(bundle).unwrap().sense, Some(animal));
}

#[test]
fn test_blank_gloss_on_analysis_is_reused() {
    let store = RecordStore::new_in_memory();
    let mut first = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    let an = analysis_of(&store, commit(&store, &mut first));
    let blank = store.create_gloss(an).unwrap();

    let mut second = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    assert_eq!(commit(&store, &mut second), AnalysisRef::Gloss(blank));
    assert_eq!(store.get_glosses(an).unwrap(), vec![blank]);
    assert!(store.gloss(blank).unwrap().text.is_blank_in(&[EN]));
}

#[test]
fn test_human_evaluated_partial_match_is_not_mutated() {
    let store = RecordStore::new_in_memory();
    let entry = store.create_entry("dog", VERN).unwrap();
    let sense = store.create_sense(entry).unwrap();

    let mut plain = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    let approved = analysis_of(&store, commit(&store, &mut plain));
    store.set_evaluation(approved, Evaluation::HumanApproved).unwrap();

    let mut enriched = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    link_sense(&mut enriched, 0, sense);
    let created = analysis_of(&store, commit(&store, &mut enriched));

    assert_ne!(created, approved);
    for bundle in store.get_bundles(approved).unwrap() {
        assert_eq!(store.bundle(bundle).unwrap().sense, None);
    }
    let wf = store.analysis(approved).unwrap().owner;
    assert_eq!(store.get_analyses(wf).unwrap().len(), 2);
}

#[test]
fn test_human_evaluated_exact_match_is_reused() {
    let store = RecordStore::new_in_memory();
    let mut first = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    let approved = analysis_of(&store, commit(&store, &mut first));
    store.set_evaluation(approved, Evaluation::HumanApproved).unwrap();

    let mut again = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    assert_eq!(analysis_of(&store, commit(&store, &mut again)), approved);
}

#[test]
fn test_new_gloss_created_with_staged_text() {
    let store = RecordStore::new_in_memory();
    let mut cache = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    cache.set_word_gloss(EN, "dog.SG").unwrap();

    let result = commit(&store, &mut cache);
    let AnalysisRef::Gloss(gloss) = result else {
        panic!("expected a gloss, got {result}");
    };
    let an = store.gloss(gloss).unwrap().owner;
    assert_eq!(store.get_glosses(an).unwrap(), vec![gloss]);
    assert_eq!(store.gloss(gloss).unwrap().text.get(EN), "dog.SG");
    assert_eq!(cache.real_id_of(cache.word().gloss), Some(gloss));
}

#[test]
fn test_matching_gloss_is_reused() {
    let store = RecordStore::new_in_memory();
    let mut first = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    first.set_word_gloss(EN, "dog.PL").unwrap();
    let gloss = commit(&store, &mut first);

    let mut second = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    second.set_word_gloss(EN, "dog.PL").unwrap();
    assert_eq!(commit(&store, &mut second), gloss);
    let an = analysis_of(&store, gloss);
    assert_eq!(store.get_glosses(an).unwrap().len(), 1);
}

#[test]
fn test_single_referrer_gloss_moves_to_new_analysis() {
    let store = RecordStore::new_in_memory();
    let mut cache = staged("dogs", &[MorphInput::stem("dogs")]);
    cache.set_word_gloss(EN, "dogs").unwrap();
    let AnalysisRef::Gloss(gloss) = commit(&store, &mut cache) else {
        panic!("expected a gloss");
    };
    store.add_gloss_referrer(gloss).unwrap();
    let old_analysis = store.gloss(gloss).unwrap().owner;

    // Re-segment the same occurrence and change its gloss.
    cache.merge(&[MorphInput::stem("dog"), suffix("s")], |_| Ok(None)).unwrap();
    cache.set_word_gloss(EN, "dog.PL").unwrap();
    let result = commit(&store, &mut cache);

    assert_eq!(result, AnalysisRef::Gloss(gloss));
    let moved = store.gloss(gloss).unwrap();
    assert_ne!(moved.owner, old_analysis);
    assert_eq!(moved.text.get(EN), "dog.PL");
    assert!(store.get_glosses(old_analysis).unwrap().is_empty());
}

#[test]
fn test_shared_gloss_is_not_rewritten() {
    let store = RecordStore::new_in_memory();
    let mut cache = staged("dogs", &[MorphInput::stem("dogs")]);
    cache.set_word_gloss(EN, "dogs").unwrap();
    let AnalysisRef::Gloss(gloss) = commit(&store, &mut cache) else {
        panic!("expected a gloss");
    };
    store.add_gloss_referrer(gloss).unwrap();
    store.add_gloss_referrer(gloss).unwrap();

    cache.merge(&[MorphInput::stem("dog"), suffix("s")], |_| Ok(None)).unwrap();
    cache.set_word_gloss(EN, "dog.PL").unwrap();
    let AnalysisRef::Gloss(created) = commit(&store, &mut cache) else {
        panic!("expected a gloss");
    };
    assert_ne!(created, gloss);
    assert_eq!(store.gloss(gloss).unwrap().text.get(EN), "dogs");
}

#[test]
fn test_stale_sense_is_treated_as_unset() {
    let store = RecordStore::new_in_memory();
    let entry = store.create_entry("dog", VERN).unwrap();
    let sense = store.create_sense(entry).unwrap();
    let mut cache = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    link_sense(&mut cache, 0, sense);

    store.delete(sense).unwrap();
    let an = analysis_of(&store, commit(&store, &mut cache));

    let first = store.get_bundles(an).unwrap()[0];
    assert_eq!(store.bundle(first).unwrap().sense, None);
}

#[test]
fn test_store_failure_leaves_staging_untouched() {
    let store = RecordStore::new_in_memory();
    let mut cache = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    cache.set_word_gloss(EN, "dog.PL").unwrap();
    let slots = cache.morphs().to_vec();

    store.set_read_only(true);
    let cfg = config();
    let err = Reconciler::new(&store, &cfg).commit(&mut cache).unwrap_err();
    assert!(matches!(err, GlossaError::Store(StoreError::ReadOnly)));
    assert_eq!(cache.morphs(), &slots[..]);
    assert_eq!(cache.real_id_of(cache.root()), None);
    assert!(cache.is_dirty());

    store.set_read_only(false);
    assert!(matches!(commit(&store, &mut cache), AnalysisRef::Gloss(_)));
}

#[test]
fn test_category_is_propagated() {
    let store = RecordStore::new_in_memory();
    let noun = store.create_part_of_speech("noun", "n", EN).unwrap();
    let mut cache = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    let root = cache.root();
    cache
        .attach(root, Field::Category, Some((noun, MultiString::new())), false)
        .unwrap();

    let an = analysis_of(&store, commit(&store, &mut cache));
    assert_eq!(store.analysis(an).unwrap().category, Some(noun));
}

#[test]
fn test_add_to_lexicon_creates_entry_and_sense() {
    let store = RecordStore::new_in_memory();
    let cfg = Config {
        add_to_lexicon: true,
        ..config()
    };
    let mut cache = staged("dog", &[MorphInput::stem("dog")]);
    cache.set_word_gloss(EN, "dog").unwrap();
    let result = Reconciler::new(&store, &cfg).commit(&mut cache).unwrap();

    let an = analysis_of(&store, result);
    let bundle = store.bundle(store.get_bundles(an).unwrap()[0]).unwrap();
    let allomorph = store.allomorph(bundle.morph.unwrap()).unwrap();
    assert_eq!(allomorph.form.get(VERN), "dog");
    let sense = store.sense(bundle.sense.unwrap()).unwrap();
    assert_eq!(sense.gloss.get(EN), "dog");
    assert_eq!(sense.owner, allomorph.owner);

    // A second occurrence selects the sense instead of creating another.
    let mut again = staged("dog", &[MorphInput::stem("dog")]);
    again.set_word_gloss(EN, "dog").unwrap();
    let second = Reconciler::new(&store, &cfg).commit(&mut again).unwrap();
    assert_eq!(analysis_of(&store, second), an);
    assert_eq!(store.senses_of(allomorph.owner).unwrap().len(), 1);
}

#[test]
fn test_redb_store_persists_commit() {
    let path = std::env::temp_dir().join(format!("glossa_reconcile_{}.redb", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let gloss = {
        let store = RecordStore::new_redb(&path).unwrap();
        let mut cache = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
        cache.set_word_gloss(EN, "dog.PL").unwrap();
        commit(&store, &mut cache)
    };

    let store = RecordStore::new_redb(&path).unwrap();
    let an = analysis_of(&store, gloss);
    assert_eq!(store.get_bundles(an).unwrap().len(), 2);
    let mut cache = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    cache.set_word_gloss(EN, "dog.PL").unwrap();
    assert_eq!(commit(&store, &mut cache), gloss);

    drop(store);
    let _ = std::fs::remove_file(&path);
}

/// Store that decides human evaluation on its own instead of reading the
/// analysis record.
struct VettingStore {
    inner: RecordStore,
    vetted: Cell<Option<ObjId>>,
}

impl LinguisticStore for VettingStore {
    fn is_valid(&self, id: ObjId) -> bool {
        self.inner.is_valid(id)
    }
    fn record(&self, id: ObjId) -> StoreResult<Record> {
        self.inner.record(id)
    }
    fn find_wordform(&self, text: &str, ws: WsId) -> StoreResult<Option<ObjId>> {
        self.inner.find_wordform(text, ws)
    }
    fn create_wordform(&self, text: &str, ws: WsId) -> StoreResult<ObjId> {
        self.inner.create_wordform(text, ws)
    }
    fn clear_checksum(&self, wordform: ObjId) -> StoreResult<()> {
        self.inner.clear_checksum(wordform)
    }
    fn create_analysis(&self, wordform: ObjId) -> StoreResult<ObjId> {
        self.inner.create_analysis(wordform)
    }
    fn set_category(&self, analysis: ObjId, category: Option<ObjId>) -> StoreResult<()> {
        self.inner.set_category(analysis, category)
    }
    fn create_bundle(&self, analysis: ObjId, index: usize) -> StoreResult<ObjId> {
        self.inner.create_bundle(analysis, index)
    }
    fn set_morph(&self, bundle: ObjId, morph: Option<ObjId>) -> StoreResult<()> {
        self.inner.set_morph(bundle, morph)
    }
    fn set_sense(&self, bundle: ObjId, sense: Option<ObjId>) -> StoreResult<()> {
        self.inner.set_sense(bundle, sense)
    }
    fn set_msa(&self, bundle: ObjId, msa: Option<ObjId>) -> StoreResult<()> {
        self.inner.set_msa(bundle, msa)
    }
    fn set_literal_form(&self, bundle: ObjId, ws: WsId, text: &str) -> StoreResult<()> {
        self.inner.set_literal_form(bundle, ws, text)
    }
    fn create_gloss(&self, analysis: ObjId) -> StoreResult<ObjId> {
        self.inner.create_gloss(analysis)
    }
    fn set_gloss_text(&self, gloss: ObjId, ws: WsId, text: &str) -> StoreResult<()> {
        self.inner.set_gloss_text(gloss, ws, text)
    }
    fn move_gloss(&self, gloss: ObjId, analysis: ObjId) -> StoreResult<()> {
        self.inner.move_gloss(gloss, analysis)
    }
    fn find_allomorphs(
        &self,
        text: &str,
        ws: WsId,
        filter: &[MorphType],
    ) -> StoreResult<Vec<ObjId>> {
        self.inner.find_allomorphs(text, ws, filter)
    }
    fn create_entry(&self, citation: &str, ws: WsId) -> StoreResult<ObjId> {
        self.inner.create_entry(citation, ws)
    }
    fn create_allomorph(
        &self,
        entry: ObjId,
        text: &str,
        ws: WsId,
        morph_type: MorphType,
    ) -> StoreResult<ObjId> {
        self.inner.create_allomorph(entry, text, ws, morph_type)
    }
    fn create_sense(&self, entry: ObjId) -> StoreResult<ObjId> {
        self.inner.create_sense(entry)
    }
    fn set_sense_gloss(&self, sense: ObjId, ws: WsId, text: &str) -> StoreResult<()> {
        self.inner.set_sense_gloss(sense, ws, text)
    }
    fn create_msa(&self, entry: ObjId, part_of_speech: Option<ObjId>) -> StoreResult<ObjId> {
        self.inner.create_msa(entry, part_of_speech)
    }
    fn set_sense_msa(&self, sense: ObjId, msa: Option<ObjId>) -> StoreResult<()> {
        self.inner.set_sense_msa(sense, msa)
    }

    fn is_human_evaluated(&self, analysis: ObjId) -> StoreResult<bool> {
        Ok(self.vetted.get() == Some(analysis))
    }
}

#[test]
fn test_store_reported_evaluation_blocks_partial_reuse() {
    let store = VettingStore {
        inner: RecordStore::new_in_memory(),
        vetted: Cell::new(None),
    };
    let cfg = config();
    let entry = store.create_entry("dog", VERN).unwrap();
    let sense = store.create_sense(entry).unwrap();

    let mut plain = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    let vetted = match Reconciler::new(&store, &cfg).commit(&mut plain).unwrap() {
        AnalysisRef::Analysis(id) => id,
        other => panic!("expected an analysis, got {other}"),
    };
    // The record itself still says unevaluated.
    assert_eq!(store.analysis(vetted).unwrap().evaluation, Evaluation::Unevaluated);
    store.vetted.set(Some(vetted));

    let mut enriched = staged("dogs", &[MorphInput::stem("dog"), suffix("s")]);
    link_sense(&mut enriched, 0, sense);
    let result = Reconciler::new(&store, &cfg).commit(&mut enriched).unwrap();

    assert_ne!(result.id(), vetted);
    for bundle in store.get_bundles(vetted).unwrap() {
        assert_eq!(store.bundle(bundle).unwrap().sense, None);
    }
}
