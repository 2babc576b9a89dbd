//! Editing session for the analysis of one word occurrence.
//!
//! `SandboxSession` owns the staging cache and wires the pieces together:
//! the loader fills the cache from the store, each edit of the morpheme line
//! goes through the segmenter, the form classifier and the slot merge, and
//! `commit` hands the cache to the reconciler. Nothing reaches the store
//! before `commit`; dropping the session abandons the edit.
//!
//! Edits and commits are not re-entrant. A commit usually triggers a display
//! rebuild, and a rebuild must not start another segmentation pass on the same
//! thread, so both entry points hold a thread-local guard while they run.

use crate::classify::{ClassifyWarning, FormClassifier};
use crate::config::GlossaConfig;
use crate::loader::{display_names, name_ws, Loader};
use crate::markers::MarkerTable;
use crate::segmenter::Segmenter;
use glossa_core::{
    AnalysisRef, CacheStats, Field, FieldValue, GlossaError, GlossaResult, LinguisticStore,
    MorphGuesser, ObjId, Reconciler, StagingCache, StagingError, WsId,
};
use std::cell::Cell;
use tracing::{debug, info};

thread_local! {
    static EDIT_IN_PROGRESS: Cell<bool> = const { Cell::new(false) };
}

/// Held while an edit or commit runs on this thread.
struct EditGuard;

impl EditGuard {
    fn acquire() -> GlossaResult<Self> {
        EDIT_IN_PROGRESS.with(|busy| {
            if busy.replace(true) {
                Err(GlossaError::Reentrant)
            } else {
                Ok(EditGuard)
            }
        })
    }
}

impl Drop for EditGuard {
    fn drop(&mut self) {
        EDIT_IN_PROGRESS.with(|busy| busy.set(false));
    }
}

/// Result of one morpheme-line edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    /// The repaired morpheme line.
    pub text: String,
    /// Cursor position in `text`, in chars.
    pub cursor: usize,
    /// Segments that fell back to a plain stem.
    pub warnings: Vec<ClassifyWarning>,
    pub converged: bool,
}

type RebuildHook<'s> = Box<dyn FnMut(&StagingCache) + 's>;

pub struct SandboxSession<'s, S: LinguisticStore + ?Sized> {
    store: &'s S,
    config: GlossaConfig,
    markers: MarkerTable,
    guesser: MorphGuesser,
    staging: StagingCache,
    rebuild_hook: Option<RebuildHook<'s>>,
}

impl<'s, S: LinguisticStore + ?Sized> SandboxSession<'s, S> {
    /// Start a session on a wordform, analysis or gloss.
    pub fn load(store: &'s S, config: GlossaConfig, id: ObjId) -> GlossaResult<Self> {
        Self::open(store, config, |loader| loader.load(id))
    }

    /// Start a session on a word by its text. The wordform is created only
    /// when the session commits.
    pub fn for_text(store: &'s S, config: GlossaConfig, text: &str) -> GlossaResult<Self> {
        Self::open(store, config, |loader| loader.load_text(text))
    }

    fn open<F>(store: &'s S, config: GlossaConfig, load: F) -> GlossaResult<Self>
    where
        F: FnOnce(&Loader<'_, S>) -> GlossaResult<StagingCache>,
    {
        let markers = config.marker_table();
        let guesser = MorphGuesser::new(config.base());
        let staging = load(&Loader::new(store, config.base(), &markers, &guesser))?;
        debug!(word = %staging.word_text(), "session: opened");
        Ok(Self {
            store,
            config,
            markers,
            guesser,
            staging,
            rebuild_hook: None,
        })
    }

    pub fn staging(&self) -> &StagingCache {
        &self.staging
    }

    pub fn config(&self) -> &GlossaConfig {
        &self.config
    }

    pub fn is_dirty(&self) -> bool {
        self.staging.is_dirty()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.guesser.cache_stats()
    }

    /// Called with the staging cache after every successful edit and commit,
    /// while the edit guard is still held.
    pub fn set_rebuild_hook<F>(&mut self, hook: F)
    where
        F: FnMut(&StagingCache) + 's,
    {
        self.rebuild_hook = Some(Box::new(hook));
    }

    fn rebuild(&mut self) {
        if let Some(hook) = self.rebuild_hook.as_mut() {
            hook(&self.staging);
        }
    }

    /// Re-segment the morpheme line after the user typed into it.
    ///
    /// `cursor` is a char offset into `raw`. If the lexicon lookup fails the
    /// staging cache is left as it was.
    pub fn on_morpheme_text_edited(&mut self, raw: &str, cursor: usize) -> GlossaResult<EditOutcome> {
        let _guard = EditGuard::acquire()?;

        let segmenter = Segmenter::new(&self.markers, self.config.phrase_separator_width);
        let segmentation = segmenter.segment(raw, self.staging.word_text(), cursor);
        let mut warnings = Vec::new();
        if !segmentation.converged {
            warnings.push(ClassifyWarning::NotConverged {
                text: raw.to_string(),
            });
        }

        let classifier = FormClassifier::new(&self.markers);
        let inputs: Vec<_> = segmentation
            .morphs
            .iter()
            .map(|m| {
                let (classified, warning) = classifier.classify(&m.text);
                warnings.extend(warning);
                classified.into_input()
            })
            .collect();

        let store = self.store;
        let guesser = &self.guesser;
        self.staging
            .merge(&inputs, |input| Ok(guesser.guess(store, input)?))?;
        debug!(raw, slots = inputs.len(), warnings = warnings.len(), "session: morpheme line edited");

        self.rebuild();
        Ok(EditOutcome {
            text: segmentation.render(),
            cursor: segmentation.cursor,
            warnings,
            converged: segmentation.converged,
        })
    }

    /// Write the staged analysis to the store.
    ///
    /// On failure the session is exactly as it was before the call.
    pub fn commit(&mut self) -> GlossaResult<AnalysisRef> {
        let _guard = EditGuard::acquire()?;
        let result = Reconciler::new(self.store, self.config.base()).commit(&mut self.staging)?;
        self.guesser.clear_cache();
        info!(result = %result, word = %self.staging.word_text(), "session: committed");
        self.rebuild();
        Ok(result)
    }

    /// Abandon the edit. The store was never written.
    pub fn discard(self) {
        debug!(word = %self.staging.word_text(), dirty = self.staging.is_dirty(), "session: discarded");
    }

    /// Undo every change since the session was loaded or last committed.
    pub fn revert(&mut self) {
        self.staging.revert();
    }

    pub fn set_word_gloss(&mut self, ws: WsId, text: &str) -> GlossaResult<()> {
        self.staging.set_word_gloss(ws, text)?;
        Ok(())
    }

    /// Set or clear the word category (a part of speech).
    pub fn set_word_category(&mut self, category: Option<ObjId>) -> GlossaResult<()> {
        let target = match category {
            Some(pos) => {
                self.store.part_of_speech(pos)?;
                Some((pos, display_names(self.store, pos, &name_ws(self.config.base()))?))
            }
            None => None,
        };
        let root = self.staging.root();
        self.staging.attach(root, Field::Category, target, false)?;
        Ok(())
    }

    /// Link slot `index` to a lexicon choice. The slot takes the allomorph's
    /// form and morph type; the links are confirmed. Without a sense, the
    /// entry's sense and msa links are cleared.
    pub fn choose_morph(
        &mut self,
        index: usize,
        allomorph: ObjId,
        sense: Option<ObjId>,
    ) -> GlossaResult<()> {
        let slot = *self
            .staging
            .morphs()
            .get(index)
            .ok_or(StagingError::NoSlot(index))?;

        let vern = self.config.base().vernacular_ws;
        let wss = name_ws(self.config.base());
        let allo = self.store.allomorph(allomorph)?;
        let entry_name = display_names(self.store, allo.owner, &[vern])?;
        let (sense_target, msa_target) = match sense {
            Some(s) => {
                let record = self.store.sense(s)?;
                let msa = match record.msa.filter(|m| self.store.is_valid(*m)) {
                    Some(m) => Some((m, display_names(self.store, m, &wss)?)),
                    None => None,
                };
                (Some((s, display_names(self.store, s, &wss)?)), msa)
            }
            None => (None, None),
        };

        let (lead, trail) = self.markers.markers_for(allo.morph_type);
        let form = self.staging.morph(slot)?.form;
        let mut name = match self.staging.get(form, Field::Name)? {
            FieldValue::Text(t) => t,
            _ => Default::default(),
        };
        name.set(vern, allo.form.get(vern));
        self.staging.set(form, Field::Name, FieldValue::Text(name))?;
        self.staging.set(slot, Field::MorphType, FieldValue::MorphType(allo.morph_type))?;
        self.staging.set(slot, Field::Prefix, FieldValue::Str(lead.to_string()))?;
        self.staging.set(slot, Field::Suffix, FieldValue::Str(trail.to_string()))?;
        self.staging.map_to_real(form, allomorph)?;
        self.staging.attach(slot, Field::Entry, Some((allo.owner, entry_name)), false)?;
        self.staging.attach(slot, Field::Sense, sense_target, false)?;
        self.staging.attach(slot, Field::Msa, msa_target, false)?;
        debug!(index, allomorph = %allomorph, "session: morph chosen");
        Ok(())
    }

    /// The morpheme line for the current slots, markers included.
    pub fn morph_break_text(&self) -> String {
        let width = Segmenter::new(&self.markers, self.config.phrase_separator_width)
            .separator_width(self.staging.word_text());
        let separator = " ".repeat(width);
        self.staging
            .morphs()
            .iter()
            .filter_map(|m| self.staging.literal_text(*m).ok())
            .collect::<Vec<_>>()
            .join(&separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glossa_core::{MorphType, RecordStore};

    const VERN: WsId = WsId(1);

    #[test]
    fn edit_splits_and_renders() {
        let store = RecordStore::new_in_memory();
        let mut session =
            SandboxSession::for_text(&store, GlossaConfig::default(), "institutionally").unwrap();
        let out = session.on_morpheme_text_edited("institution-al-ly", 17).unwrap();
        assert_eq!(out.text, "institution -al -ly");
        assert_eq!(out.cursor, 19);
        assert!(out.warnings.is_empty());
        assert_eq!(session.staging().morphs().len(), 3);
        assert_eq!(session.morph_break_text(), "institution -al -ly");
        assert!(session.is_dirty());
    }

    #[test]
    fn guard_rejects_nesting() {
        let outer = EditGuard::acquire().unwrap();
        assert!(matches!(EditGuard::acquire(), Err(GlossaError::Reentrant)));
        drop(outer);
        assert!(EditGuard::acquire().is_ok());
    }

    #[test]
    fn choose_morph_confirms_links() {
        let store = RecordStore::new_in_memory();
        let e = store.create_entry("al", VERN).unwrap();
        let allo = store.create_allomorph(e, "al", VERN, MorphType::Suffix).unwrap();
        let sense = store.create_sense(e).unwrap();
        let mut session = SandboxSession::for_text(&store, GlossaConfig::default(), "dogal").unwrap();
        session.on_morpheme_text_edited("dog al", 0).unwrap();
        session.choose_morph(1, allo, Some(sense)).unwrap();

        let staging = session.staging();
        let m = staging.morph(staging.morphs()[1]).unwrap();
        assert_eq!(m.morph_type, MorphType::Suffix);
        assert!(!m.entry.is_guess());
        assert_eq!(staging.link_real(m.sense), Some(sense));
        assert_eq!(session.morph_break_text(), "dog -al");
        assert!(session.choose_morph(5, allo, None).is_err());
    }

    #[test]
    fn revert_restores_loaded_state() {
        let store = RecordStore::new_in_memory();
        let mut session = SandboxSession::for_text(&store, GlossaConfig::default(), "dogs").unwrap();
        session.on_morpheme_text_edited("dog -s", 0).unwrap();
        session.revert();
        assert_eq!(session.morph_break_text(), "dogs");
        assert!(!session.is_dirty());
    }
}
