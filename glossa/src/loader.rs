//! Populate a staging cache from the persisted store.
//!
//! Loading a wordform picks its first human-approved analysis (else its first
//! analysis) and marks every copied link as a guess. Loading an analysis or a
//! gloss copies links as confirmed. A wordform with no analyses, or a word the
//! store does not know yet, becomes a single slot holding the whole word,
//! pre-filled by the default lexicon lookup.

use crate::classify::FormClassifier;
use crate::markers::MarkerTable;
use glossa_core::{
    Config, Evaluation, Field, GlossaResult, LinguisticStore, MorphGuesser, MorphInput,
    MultiString, ObjId, Record, StagingCache, StoreError, WsId,
};
use tracing::debug;

/// Writing systems link display names are shown in: the gloss line's, or the
/// vernacular when there is none.
pub(crate) fn name_ws(config: &Config) -> Vec<WsId> {
    if config.gloss_ws.is_empty() {
        vec![config.vernacular_ws]
    } else {
        config.gloss_ws.clone()
    }
}

pub(crate) fn display_names<S: LinguisticStore + ?Sized>(
    store: &S,
    id: ObjId,
    wss: &[WsId],
) -> GlossaResult<MultiString> {
    let mut out = MultiString::new();
    for ws in wss {
        out.set(*ws, store.display_name(id, *ws)?);
    }
    Ok(out)
}

pub struct Loader<'a, S: LinguisticStore + ?Sized> {
    store: &'a S,
    config: &'a Config,
    markers: &'a MarkerTable,
    guesser: &'a MorphGuesser,
}

impl<'a, S: LinguisticStore + ?Sized> Loader<'a, S> {
    pub fn new(
        store: &'a S,
        config: &'a Config,
        markers: &'a MarkerTable,
        guesser: &'a MorphGuesser,
    ) -> Self {
        Self {
            store,
            config,
            markers,
            guesser,
        }
    }

    fn vern(&self) -> WsId {
        self.config.vernacular_ws
    }

    fn live(&self, id: Option<ObjId>) -> Option<ObjId> {
        id.filter(|id| self.store.is_valid(*id))
    }

    fn names(&self, id: ObjId, wss: &[WsId]) -> GlossaResult<MultiString> {
        display_names(self.store, id, wss)
    }

    /// Load from a wordform, analysis or gloss id.
    pub fn load(&self, id: ObjId) -> GlossaResult<StagingCache> {
        let mut cache = match self.store.record(id)? {
            Record::Wordform(w) => {
                let mut chosen = None;
                for an in w.analyses.iter().copied().filter(|a| self.store.is_valid(*a)) {
                    if self.store.analysis(an)?.evaluation == Evaluation::HumanApproved {
                        chosen = Some(an);
                        break;
                    }
                    chosen.get_or_insert(an);
                }
                match chosen {
                    Some(an) => self.from_analysis(id, an, true)?,
                    None => self.unanalysed(Some(id), w.form.get(self.vern()))?,
                }
            }
            Record::Analysis(a) => self.from_analysis(a.owner, id, false)?,
            Record::Gloss(g) => {
                let analysis = self.store.analysis(g.owner)?;
                let mut cache = self.from_analysis(analysis.owner, g.owner, false)?;
                for ws in &self.config.gloss_ws {
                    cache.set_word_gloss(*ws, g.text.get(*ws))?;
                }
                let shadow = cache.word().gloss;
                cache.map_to_real(shadow, id)?;
                cache
            }
            other => {
                return Err(StoreError::WrongKind {
                    id,
                    expected: "wordform, analysis or gloss",
                    found: other.kind(),
                }
                .into())
            }
        };
        cache.baseline();
        debug!(id = %id, slots = cache.morphs().len(), "load: staging ready");
        Ok(cache)
    }

    /// Load a word by its text, whether or not the store knows it.
    pub fn load_text(&self, text: &str) -> GlossaResult<StagingCache> {
        match self.store.find_wordform(text, self.vern())? {
            Some(wordform) => self.load(wordform),
            None => {
                let mut cache = self.unanalysed(None, text)?;
                cache.baseline();
                Ok(cache)
            }
        }
    }

    fn unanalysed(&self, wordform: Option<ObjId>, text: &str) -> GlossaResult<StagingCache> {
        let mut cache = StagingCache::new(self.vern(), text);
        if let Some(wf) = wordform {
            let root = cache.root();
            cache.map_to_real(root, wf)?;
        }
        let (classified, _) = FormClassifier::new(self.markers).classify(text);
        cache.merge(&[classified.into_input()], |input| {
            Ok(self.guesser.guess(self.store, input)?)
        })?;
        Ok(cache)
    }

    fn from_analysis(
        &self,
        wordform: ObjId,
        analysis: ObjId,
        guess: bool,
    ) -> GlossaResult<StagingCache> {
        let text = self.store.wordform(wordform)?.form.get(self.vern()).to_string();
        let record = self.store.analysis(analysis)?;
        let mut cache = StagingCache::new(self.vern(), &text);
        let root = cache.root();
        cache.map_to_real(root, wordform)?;

        let wss = name_ws(self.config);
        if let Some(pos) = self.live(record.category) {
            cache.attach(root, Field::Category, Some((pos, self.names(pos, &wss)?)), guess)?;
        }

        let classifier = FormClassifier::new(self.markers);
        let mut inputs = Vec::new();
        let mut bundles = Vec::new();
        for id in record.bundles.iter().copied().filter(|b| self.store.is_valid(*b)) {
            let bundle = self.store.bundle(id)?;
            let allomorph = self
                .live(bundle.morph)
                .filter(|a| self.store.allomorph(*a).is_ok());
            let input = match allomorph {
                Some(a) => {
                    let record = self.store.allomorph(a)?;
                    let (lead, trail) = self.markers.markers_for(record.morph_type);
                    MorphInput {
                        prefix: lead.to_string(),
                        bare: record.form.get(self.vern()).to_string(),
                        suffix: trail.to_string(),
                        morph_type: record.morph_type,
                    }
                }
                None => classifier.classify(bundle.form.get(self.vern())).0.into_input(),
            };
            inputs.push(input);
            bundles.push((id, bundle, allomorph));
        }
        if inputs.is_empty() {
            inputs.push(classifier.classify(&text).0.into_input());
        }
        cache.merge(&inputs, |_| Ok(None))?;

        let slots = cache.morphs().to_vec();
        for (slot, (id, bundle, allomorph)) in slots.into_iter().zip(bundles) {
            cache.map_to_real(slot, id)?;
            let sense = self.live(bundle.sense);
            let entry = match (allomorph, sense) {
                (Some(a), _) => {
                    let form = cache.morph(slot)?.form;
                    cache.map_to_real(form, a)?;
                    Some(self.store.allomorph(a)?.owner)
                }
                (None, Some(s)) => Some(self.store.sense(s)?.owner),
                (None, None) => None,
            };
            if let Some(entry) = self.live(entry) {
                let names = self.names(entry, &[self.vern()])?;
                cache.attach(slot, Field::Entry, Some((entry, names)), guess)?;
            }
            if let Some(sense) = sense {
                cache.attach(slot, Field::Sense, Some((sense, self.names(sense, &wss)?)), guess)?;
            }
            if let Some(msa) = self.live(bundle.msa) {
                cache.attach(slot, Field::Msa, Some((msa, self.names(msa, &wss)?)), guess)?;
            }
        }
        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glossa_core::{MorphType, RecordStore};

    const VERN: WsId = WsId(1);
    const EN: WsId = WsId(2);

    fn config() -> Config {
        Config {
            vernacular_ws: VERN,
            gloss_ws: vec![EN],
            ..Config::default()
        }
    }

    #[test]
    fn unknown_word_gets_single_guessed_slot() {
        let store = RecordStore::new_in_memory();
        let e = store.create_entry("dog", VERN).unwrap();
        store.create_allomorph(e, "dog", VERN, MorphType::Stem).unwrap();
        let cfg = config();
        let markers = MarkerTable::default();
        let guesser = MorphGuesser::new(&cfg);
        let cache = Loader::new(&store, &cfg, &markers, &guesser)
            .load_text("dog")
            .unwrap();
        assert_eq!(cache.morphs().len(), 1);
        let m = cache.morph(cache.morphs()[0]).unwrap();
        assert!(m.entry.is_guess());
        assert_eq!(cache.link_real(m.entry), Some(e));
        assert!(!cache.is_dirty());
        assert_eq!(cache.real_id_of(cache.root()), None);
    }

    #[test]
    fn analysis_loads_confirmed_links_and_markers() {
        let store = RecordStore::new_in_memory();
        let e = store.create_entry("s", VERN).unwrap();
        let allo = store.create_allomorph(e, "s", VERN, MorphType::Suffix).unwrap();
        let wf = store.create_wordform("dogs", VERN).unwrap();
        let an = store.create_analysis(wf).unwrap();
        let b0 = store.create_bundle(an, 0).unwrap();
        store.set_literal_form(b0, VERN, "dog").unwrap();
        let b1 = store.create_bundle(an, 1).unwrap();
        store.set_morph(b1, Some(allo)).unwrap();

        let cfg = config();
        let markers = MarkerTable::default();
        let guesser = MorphGuesser::new(&cfg);
        let cache = Loader::new(&store, &cfg, &markers, &guesser).load(an).unwrap();
        let slots = cache.morphs().to_vec();
        assert_eq!(cache.literal_text(slots[0]).unwrap(), "dog");
        assert_eq!(cache.literal_text(slots[1]).unwrap(), "-s");
        let m = cache.morph(slots[1]).unwrap();
        assert_eq!(cache.link_real(m.entry), Some(e));
        assert!(!m.entry.is_guess());
        assert_eq!(cache.real_id_of(slots[1]), Some(b1));
        assert_eq!(cache.real_id_of(cache.root()), Some(wf));
    }

    #[test]
    fn wordform_prefers_approved_analysis_as_guess() {
        let store = RecordStore::new_in_memory();
        let wf = store.create_wordform("dogs", VERN).unwrap();
        let first = store.create_analysis(wf).unwrap();
        let b = store.create_bundle(first, 0).unwrap();
        store.set_literal_form(b, VERN, "dogs").unwrap();
        let approved = store.create_analysis(wf).unwrap();
        for (i, part) in ["dog", "-s"].iter().enumerate() {
            let b = store.create_bundle(approved, i).unwrap();
            store.set_literal_form(b, VERN, part).unwrap();
        }
        store.set_evaluation(approved, Evaluation::HumanApproved).unwrap();

        let cfg = config();
        let markers = MarkerTable::default();
        let guesser = MorphGuesser::new(&cfg);
        let cache = Loader::new(&store, &cfg, &markers, &guesser).load(wf).unwrap();
        assert_eq!(cache.morphs().len(), 2);
    }

    #[test]
    fn gloss_load_sets_previous_selection() {
        let store = RecordStore::new_in_memory();
        let wf = store.create_wordform("dogs", VERN).unwrap();
        let an = store.create_analysis(wf).unwrap();
        let b = store.create_bundle(an, 0).unwrap();
        store.set_literal_form(b, VERN, "dogs").unwrap();
        let g = store.create_gloss(an).unwrap();
        store.set_gloss_text(g, EN, "dogs").unwrap();

        let cfg = config();
        let markers = MarkerTable::default();
        let guesser = MorphGuesser::new(&cfg);
        let cache = Loader::new(&store, &cfg, &markers, &guesser).load(g).unwrap();
        assert_eq!(cache.word_gloss().get(EN), "dogs");
        assert_eq!(cache.real_id_of(cache.word().gloss), Some(g));
    }

    #[test]
    fn other_records_are_rejected() {
        let store = RecordStore::new_in_memory();
        let e = store.create_entry("dog", VERN).unwrap();
        let cfg = config();
        let markers = MarkerTable::default();
        let guesser = MorphGuesser::new(&cfg);
        assert!(Loader::new(&store, &cfg, &markers, &guesser).load(e).is_err());
    }
}
