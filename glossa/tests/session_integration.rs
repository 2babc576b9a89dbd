//! End-to-end editing sessions against the in-memory store.

use glossa::{
    AnalysisRef, GlossaConfig, GlossaError, LinguisticStore, MorphType, RecordStore,
    SandboxSession, WsId,
};
use std::cell::RefCell;

const VERN: WsId = WsId(1);
const EN: WsId = WsId(2);

fn config() -> GlossaConfig {
    let mut config = GlossaConfig::default();
    config.base.vernacular_ws = VERN;
    config.base.gloss_ws = vec![EN];
    config
}

#[test]
fn test_merging_earlier_morphs_preserves_later_links() {
    let store = RecordStore::new_in_memory();
    let entry = store.create_entry("ly", VERN).unwrap();
    let allomorph = store.create_allomorph(entry, "ly", VERN, MorphType::Suffix).unwrap();
    let sense = store.create_sense(entry).unwrap();

    let mut session = SandboxSession::for_text(&store, config(), "institutionally").unwrap();
    session.on_morpheme_text_edited("institution -al -ly", 0).unwrap();
    session.choose_morph(2, allomorph, Some(sense)).unwrap();
    let slot = session.staging().morphs()[2];

    session.on_morpheme_text_edited("institutional -ly", 0).unwrap();
    let staging = session.staging();
    assert_eq!(staging.morphs().len(), 2);
    assert_eq!(staging.morphs()[1], slot);
    let m = staging.morph(slot).unwrap();
    assert_eq!(staging.link_real(m.entry), Some(entry));
    assert_eq!(staging.link_real(m.sense), Some(sense));
    assert!(!m.sense.is_guess());
}

#[test]
fn test_edit_guesses_unique_lexicon_matches() {
    let store = RecordStore::new_in_memory();
    let dog = store.create_entry("dog", VERN).unwrap();
    store.create_allomorph(dog, "dog", VERN, MorphType::Stem).unwrap();
    let s = store.create_entry("s", VERN).unwrap();
    store.create_allomorph(s, "s", VERN, MorphType::Suffix).unwrap();
    let plural = store.create_sense(s).unwrap();

    let mut session = SandboxSession::for_text(&store, config(), "dogs").unwrap();
    let outcome = session.on_morpheme_text_edited("dog-s", 5).unwrap();
    assert_eq!(outcome.text, "dog -s");
    assert_eq!(outcome.cursor, 6);

    let staging = session.staging();
    let last = staging.morph(staging.morphs()[1]).unwrap();
    assert!(last.entry.is_guess());
    assert_eq!(staging.link_real(last.entry), Some(s));
    assert_eq!(staging.link_real(last.sense), Some(plural));

    let result = session.commit().unwrap();
    let AnalysisRef::Analysis(an) = result else {
        panic!("expected an analysis, got {result}");
    };
    let bundles = store.get_bundles(an).unwrap();
    assert_eq!(store.bundle(bundles[1]).unwrap().sense, Some(plural));
    let staging = session.staging();
    let last = staging.morph(staging.morphs()[1]).unwrap();
    assert!(!last.entry.is_guess());
    assert!(!session.is_dirty());
}

#[test]
fn test_commit_then_reload_from_gloss() {
    let store = RecordStore::new_in_memory();
    let mut session = SandboxSession::for_text(&store, config(), "dogs").unwrap();
    session.on_morpheme_text_edited("dog-s", 5).unwrap();
    session.set_word_gloss(EN, "dog.PL").unwrap();
    let first = session.commit().unwrap();
    assert_eq!(session.commit().unwrap(), first);
    session.discard();

    let AnalysisRef::Gloss(gloss) = first else {
        panic!("expected a gloss, got {first}");
    };
    let mut reloaded = SandboxSession::load(&store, config(), gloss).unwrap();
    assert_eq!(reloaded.morph_break_text(), "dog -s");
    assert_eq!(reloaded.staging().word_gloss().get(EN), "dog.PL");
    assert!(!reloaded.is_dirty());
    assert_eq!(reloaded.commit().unwrap(), first);
}

#[test]
fn test_wordform_load_marks_links_as_guesses() {
    let store = RecordStore::new_in_memory();
    let entry = store.create_entry("dog", VERN).unwrap();
    let allomorph = store.create_allomorph(entry, "dog", VERN, MorphType::Stem).unwrap();
    let sense = store.create_sense(entry).unwrap();

    let mut session = SandboxSession::for_text(&store, config(), "dogs").unwrap();
    session.on_morpheme_text_edited("dog -s", 0).unwrap();
    session.choose_morph(0, allomorph, Some(sense)).unwrap();
    session.commit().unwrap();

    let wf = store.find_wordform("dogs", VERN).unwrap().unwrap();
    let loaded = SandboxSession::load(&store, config(), wf).unwrap();
    let staging = loaded.staging();
    let first = staging.morph(staging.morphs()[0]).unwrap();
    assert!(first.sense.is_guess());
    assert_eq!(staging.link_real(first.sense), Some(sense));
    assert_eq!(loaded.morph_break_text(), "dog -s");
}

#[test]
fn test_failed_commit_keeps_session_state() {
    let store = RecordStore::new_in_memory();
    let mut session = SandboxSession::for_text(&store, config(), "dogs").unwrap();
    session.on_morpheme_text_edited("dog -s", 0).unwrap();
    session.set_word_gloss(EN, "dog.PL").unwrap();

    store.set_read_only(true);
    assert!(matches!(session.commit(), Err(GlossaError::Store(_))));
    assert_eq!(session.morph_break_text(), "dog -s");
    assert!(session.is_dirty());
    assert_eq!(session.staging().real_id_of(session.staging().root()), None);

    store.set_read_only(false);
    assert!(matches!(session.commit(), Ok(AnalysisRef::Gloss(_))));
}

#[test]
fn test_rebuild_hook_cannot_reenter() {
    let store = RecordStore::new_in_memory();
    let other = RefCell::new(SandboxSession::for_text(&store, config(), "cats").unwrap());
    let nested = RefCell::new(Vec::new());

    let mut session = SandboxSession::for_text(&store, config(), "dogs").unwrap();
    session.set_rebuild_hook(|_| {
        let mut other = other.borrow_mut();
        nested
            .borrow_mut()
            .push(matches!(other.on_morpheme_text_edited("cat -s", 0), Err(GlossaError::Reentrant)));
        nested
            .borrow_mut()
            .push(matches!(other.commit(), Err(GlossaError::Reentrant)));
    });

    session.on_morpheme_text_edited("dog -s", 0).unwrap();
    session.commit().unwrap();
    assert_eq!(*nested.borrow(), vec![true, true, true, true]);
    drop(session);

    // Outside the hook the other session works normally.
    let outcome = other.borrow_mut().on_morpheme_text_edited("cat -s", 0).unwrap();
    assert_eq!(outcome.text, "cat -s");
}

#[test]
fn test_loading_a_lexicon_record_is_rejected() {
    let store = RecordStore::new_in_memory();
    let entry = store.create_entry("dog", VERN).unwrap();
    assert!(SandboxSession::load(&store, config(), entry).is_err());
}
