//! Commit of a staging cache into the persisted store.
//!
//! The reconciler walks a fixed sequence of steps and never backtracks:
//! 1. resolve (find or create) the wordform;
//! 2. stop at the wordform if nothing was segmented or enriched;
//! 3. optionally select or create a lexicon sense for a monomorphemic word;
//! 4. reuse an analysis that matches the staged slots exactly;
//! 5. else reuse one that matches partially and fill in its gaps, unless a
//!    human has evaluated it;
//! 6. else create a new analysis with its bundles;
//! 7. resolve the word gloss.
//!
//! Every real id read from staging or from the store is re-validated before
//! use; an id that no longer names an object counts as unset. The commit works
//! on a copy of the staging cache, so a store failure leaves the caller's cache
//! exactly as it was.

use crate::error::{GlossaError, GlossaResult};
use crate::ids::{ObjId, ShadowId, WsId};
use crate::model::{MorphBundle, MorphType, MultiString};
use crate::staging::{Field, MorphInput, StagingCache};
use crate::store::LinguisticStore;
use crate::utils::normalize;
use crate::Config;
use tracing::{debug, info};

/// What the caller should now treat as the analysis of the occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisRef {
    Wordform(ObjId),
    Analysis(ObjId),
    Gloss(ObjId),
}

impl AnalysisRef {
    pub fn id(self) -> ObjId {
        match self {
            AnalysisRef::Wordform(id) | AnalysisRef::Analysis(id) | AnalysisRef::Gloss(id) => id,
        }
    }

    pub fn kind(self) -> &'static str {
        match self {
            AnalysisRef::Wordform(_) => "wordform",
            AnalysisRef::Analysis(_) => "analysis",
            AnalysisRef::Gloss(_) => "gloss",
        }
    }
}

impl std::fmt::Display for AnalysisRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

/// A staged slot with every real reference validated.
#[derive(Debug, Clone)]
struct StagedSlot {
    shadow: ShadowId,
    morph: Option<ObjId>,
    sense: Option<ObjId>,
    msa: Option<ObjId>,
    bare: String,
    literal: String,
    morph_type: MorphType,
}

pub struct Reconciler<'a, S: LinguisticStore + ?Sized> {
    store: &'a S,
    config: &'a Config,
}

impl<'a, S: LinguisticStore + ?Sized> Reconciler<'a, S> {
    pub fn new(store: &'a S, config: &'a Config) -> Self {
        Self { store, config }
    }

    /// Commit `staging`. On success the cache is updated with the real ids it
    /// now corresponds to, its guesses become confirmed and it is re-baselined.
    /// On failure it is left untouched.
    pub fn commit(&self, staging: &mut StagingCache) -> GlossaResult<AnalysisRef> {
        let mut work = staging.clone();
        let result = self.run(&mut work)?;
        work.confirm_all();
        work.baseline();
        *staging = work;
        info!(result = %result, "commit: done");
        Ok(result)
    }

    fn ws(&self) -> WsId {
        self.config.vernacular_ws
    }

    /// `id` if it still names an object.
    fn live(&self, id: Option<ObjId>) -> Option<ObjId> {
        match id {
            Some(id) if self.store.is_valid(id) => Some(id),
            Some(id) => {
                debug!(id = %id, "commit: stale reference treated as unset");
                None
            }
            None => None,
        }
    }

    /// Real id behind a shadow object, dropping the mapping if it went stale.
    fn live_shadow(&self, work: &mut StagingCache, shadow: Option<ShadowId>) -> Option<ObjId> {
        let shadow = shadow?;
        let real = work.real_id_of(shadow);
        let live = self.live(real);
        if real.is_some() && live.is_none() {
            work.unmap(shadow);
        }
        live
    }

    fn run(&self, work: &mut StagingCache) -> GlossaResult<AnalysisRef> {
        if work.morphs().is_empty() {
            let text = work.word_text().to_string();
            work.merge(&[MorphInput::stem(text)], |_| Ok(None))?;
        }

        let wordform = self.resolve_wordform(work)?;
        let category_shadow = work.word().category.target();
        let category = self.live_shadow(work, category_shadow);

        if self.is_empty(work, category)? {
            info!(wordform = %wordform, "commit: nothing segmented, keeping wordform");
            return Ok(AnalysisRef::Wordform(wordform));
        }

        if self.config.add_to_lexicon && work.morphs().len() == 1 {
            self.add_to_lexicon(work, category)?;
        }

        let slots = self.staged_slots(work)?;
        let analysis = match self.find_exact(wordform, category, &slots)? {
            Some(an) => {
                debug!(analysis = %an, "commit: exact match");
                an
            }
            None => match self.find_partial(wordform, category, &slots)? {
                Some(an) => {
                    debug!(analysis = %an, "commit: partial match, filling in");
                    self.fill_in(wordform, an, category, &slots)?;
                    an
                }
                None => self.create_analysis(wordform, category, &slots)?,
            },
        };

        // Map slots onto the bundles they now correspond to.
        let bundles = self.live_bundles(analysis)?;
        if crate::invariant!(
            bundles.len() == slots.len(),
            "analysis {} has {} bundles for {} staged slots",
            analysis,
            bundles.len(),
            slots.len()
        ) {
            for (slot, bundle) in slots.iter().zip(&bundles) {
                work.map_to_real(slot.shadow, bundle.0)?;
            }
        }

        match self.resolve_gloss(work, analysis)? {
            Some(gloss) => Ok(AnalysisRef::Gloss(gloss)),
            None => Ok(AnalysisRef::Analysis(analysis)),
        }
    }

    fn resolve_wordform(&self, work: &mut StagingCache) -> GlossaResult<ObjId> {
        let root = work.root();
        let mapped = self.live_shadow(work, Some(root));
        let mapped = match mapped {
            Some(id) if self.store.wordform(id).is_ok() => Some(id),
            _ => None,
        };
        let wordform = match mapped {
            Some(id) => id,
            None => {
                let text = work.word_text().to_string();
                match self.store.find_wordform(&text, self.ws())? {
                    Some(id) => id,
                    None => {
                        let id = self.store.create_wordform(&text, self.ws())?;
                        info!(wordform = %id, text = %text, "commit: created wordform");
                        id
                    }
                }
            }
        };
        work.map_to_real(root, wordform)?;
        Ok(wordform)
    }

    /// A single unlinked, unmarked slot spelling the whole word, with no
    /// category and no gloss, is not an analysis.
    fn is_empty(&self, work: &mut StagingCache, category: Option<ObjId>) -> GlossaResult<bool> {
        if work.morphs().len() != 1 || category.is_some() {
            return Ok(false);
        }
        if !work.word_gloss().is_blank_in(&self.config.gloss_ws) {
            return Ok(false);
        }
        let slot = work.morphs()[0];
        let m = work.morph(slot)?.clone();
        if !m.prefix.is_empty() || !m.suffix.is_empty() {
            return Ok(false);
        }
        let linked = [Some(m.form), m.entry.target(), m.sense.target(), m.msa.target()]
            .into_iter()
            .any(|shadow| self.live_shadow(work, shadow).is_some());
        if linked {
            return Ok(false);
        }
        let bare = work.bare_text(slot)?;
        Ok(bare.trim().is_empty() || normalize(bare) == normalize(work.word_text()))
    }

    fn staged_slots(&self, work: &mut StagingCache) -> GlossaResult<Vec<StagedSlot>> {
        let ids = work.morphs().to_vec();
        let mut slots = Vec::with_capacity(ids.len());
        for shadow in ids {
            let m = work.morph(shadow)?.clone();
            let morph = self.live_shadow(work, Some(m.form));
            let sense = self.live_shadow(work, m.sense.target());
            let msa = self.live_shadow(work, m.msa.target());
            slots.push(StagedSlot {
                shadow,
                morph,
                sense,
                msa,
                bare: work.bare_text(shadow)?.to_string(),
                literal: work.literal_text(shadow)?,
                morph_type: m.morph_type,
            });
        }
        Ok(slots)
    }

    fn live_bundles(&self, analysis: ObjId) -> GlossaResult<Vec<(ObjId, MorphBundle)>> {
        let mut out = Vec::new();
        for id in self.store.get_bundles(analysis)? {
            if self.store.is_valid(id) {
                out.push((id, self.store.bundle(id)?));
            }
        }
        Ok(out)
    }

    fn live_analyses(&self, wordform: ObjId) -> GlossaResult<Vec<ObjId>> {
        Ok(self
            .store
            .get_analyses(wordform)?
            .into_iter()
            .filter(|id| self.store.is_valid(*id))
            .collect())
    }

    fn literal_of(&self, bundle: &MorphBundle) -> String {
        normalize(bundle.form.get(self.ws()))
    }

    fn slot_matches_exactly(&self, slot: &StagedSlot, bundle: &MorphBundle) -> bool {
        let morph = self.live(bundle.morph);
        self.live(bundle.msa) == slot.msa
            && self.live(bundle.sense) == slot.sense
            && morph == slot.morph
            && (slot.morph.is_some() || self.literal_of(bundle) == normalize(&slot.literal))
    }

    /// Msa must match; sense may be unset on the candidate; the form must be
    /// the same morph, or the same literal text on a candidate with no morph.
    fn slot_matches_partially(&self, slot: &StagedSlot, bundle: &MorphBundle) -> bool {
        let sense = self.live(bundle.sense);
        let form_ok = match self.live(bundle.morph) {
            Some(morph) => slot.morph == Some(morph),
            None => self.literal_of(bundle) == normalize(&slot.literal),
        };
        self.live(bundle.msa) == slot.msa && (sense.is_none() || sense == slot.sense) && form_ok
    }

    fn find_exact(
        &self,
        wordform: ObjId,
        category: Option<ObjId>,
        slots: &[StagedSlot],
    ) -> GlossaResult<Option<ObjId>> {
        for an in self.live_analyses(wordform)? {
            let analysis = self.store.analysis(an)?;
            if self.live(analysis.category) != category {
                continue;
            }
            let bundles = self.live_bundles(an)?;
            if bundles.len() == slots.len()
                && slots
                    .iter()
                    .zip(&bundles)
                    .all(|(s, (_, b))| self.slot_matches_exactly(s, b))
            {
                return Ok(Some(an));
            }
        }
        Ok(None)
    }

    fn find_partial(
        &self,
        wordform: ObjId,
        category: Option<ObjId>,
        slots: &[StagedSlot],
    ) -> GlossaResult<Option<ObjId>> {
        for an in self.live_analyses(wordform)? {
            let analysis = self.store.analysis(an)?;
            let candidate_category = self.live(analysis.category);
            if candidate_category.is_some() && candidate_category != category {
                continue;
            }
            let bundles = self.live_bundles(an)?;
            if bundles.len() != slots.len()
                || !slots
                    .iter()
                    .zip(&bundles)
                    .all(|(s, (_, b))| self.slot_matches_partially(s, b))
            {
                continue;
            }
            if self.store.is_human_evaluated(an)? {
                debug!(analysis = %an, "commit: partial match is human-evaluated, not reusing");
                continue;
            }
            return Ok(Some(an));
        }
        Ok(None)
    }

    fn fill_in(
        &self,
        wordform: ObjId,
        analysis: ObjId,
        category: Option<ObjId>,
        slots: &[StagedSlot],
    ) -> GlossaResult<()> {
        let current = self.store.analysis(analysis)?;
        if self.live(current.category).is_none() && category.is_some() {
            self.store.set_category(analysis, category)?;
        }
        for (slot, (id, bundle)) in slots.iter().zip(self.live_bundles(analysis)?) {
            if self.live(bundle.sense).is_none() && slot.sense.is_some() {
                self.store.set_sense(id, slot.sense)?;
            }
            if self.live(bundle.morph).is_none() && slot.morph.is_some() {
                self.store.set_morph(id, slot.morph)?;
            }
        }
        self.store.clear_checksum(wordform)?;
        Ok(())
    }

    fn create_analysis(
        &self,
        wordform: ObjId,
        category: Option<ObjId>,
        slots: &[StagedSlot],
    ) -> GlossaResult<ObjId> {
        let analysis = self.store.create_analysis(wordform)?;
        for (index, slot) in slots.iter().enumerate() {
            let bundle = self.store.create_bundle(analysis, index)?;
            match slot.morph {
                Some(morph) => self.store.set_morph(bundle, Some(morph))?,
                None => {
                    for ws in self.config.literal_form_ws() {
                        self.store.set_literal_form(bundle, ws, &slot.literal)?;
                    }
                }
            }
            if slot.sense.is_some() {
                self.store.set_sense(bundle, slot.sense)?;
            }
            if slot.msa.is_some() {
                self.store.set_msa(bundle, slot.msa)?;
            }
        }
        if category.is_some() {
            self.store.set_category(analysis, category)?;
        }
        info!(analysis = %analysis, bundles = slots.len(), "commit: created analysis");
        Ok(analysis)
    }

    fn resolve_gloss(&self, work: &mut StagingCache, analysis: ObjId) -> GlossaResult<Option<ObjId>> {
        if !self.config.show_gloss_line {
            return Ok(None);
        }
        let wss = &self.config.gloss_ws;
        let staged = work.word_gloss();
        let shadow = work.word().gloss;
        let previous = self
            .live_shadow(work, Some(shadow))
            .filter(|id| self.store.gloss(*id).is_ok());
        let owned: Vec<ObjId> = self
            .store
            .get_glosses(analysis)?
            .into_iter()
            .filter(|id| self.store.is_valid(*id))
            .collect();

        if owned.is_empty() && previous.is_none() && staged.is_blank_in(wss) {
            return Ok(None);
        }

        let mut resolved = None;
        if let Some(prev) = previous {
            if self.store.gloss(prev)?.owner == analysis {
                resolved = Some(prev);
            }
        }
        if resolved.is_none() {
            for id in &owned {
                let text = self.store.gloss(*id)?.text;
                if text.alternatives_equal(&staged, wss)
                    || (text.is_blank_in(wss) && staged.is_blank_in(wss))
                {
                    resolved = Some(*id);
                    break;
                }
            }
        }
        if resolved.is_none() {
            if let Some(prev) = previous {
                if self.store.gloss_referrer_count(prev)? == 1 {
                    debug!(gloss = %prev, "commit: rewriting single-use gloss in place");
                    self.store.move_gloss(prev, analysis)?;
                    resolved = Some(prev);
                }
            }
        }
        let gloss = match resolved {
            Some(id) => id,
            None => {
                let id = self.store.create_gloss(analysis)?;
                info!(gloss = %id, analysis = %analysis, "commit: created gloss");
                id
            }
        };
        for ws in wss {
            self.store.set_gloss_text(gloss, *ws, staged.get(*ws))?;
        }
        work.map_to_real(shadow, gloss)?;
        Ok(Some(gloss))
    }

    /// Select or create a lexicon sense for the single slot from the staged
    /// word gloss and category.
    fn add_to_lexicon(&self, work: &mut StagingCache, category: Option<ObjId>) -> GlossaResult<()> {
        let staged_gloss = work.word_gloss();
        let wss = &self.config.gloss_ws;
        let slot = self
            .staged_slots(work)?
            .into_iter()
            .next()
            .ok_or_else(|| GlossaError::Invariant("no slot to add to the lexicon".into()))?;
        if slot.sense.is_some() || staged_gloss.is_blank_in(wss) || slot.bare.trim().is_empty() {
            return Ok(());
        }

        let hits = self.store.find_allomorphs(
            &slot.bare,
            self.ws(),
            slot.morph_type.compatible_types(),
        )?;
        let mut candidates: Vec<(ObjId, ObjId)> = Vec::new();
        for allomorph in hits {
            if !self.store.is_valid(allomorph) {
                continue;
            }
            let entry = self.store.allomorph(allomorph)?.owner;
            if self.store.is_valid(entry) && !candidates.iter().any(|(e, _)| *e == entry) {
                candidates.push((entry, allomorph));
            }
        }

        // An existing sense with the same gloss and category.
        for (entry, allomorph) in &candidates {
            for sense in self.store.senses_of(*entry)? {
                if !self.store.is_valid(sense) {
                    continue;
                }
                let record = self.store.sense(sense)?;
                if record.gloss.alternatives_equal(&staged_gloss, wss)
                    && self.msa_category(record.msa)? == category
                {
                    debug!(sense = %sense, "commit: selected existing sense");
                    let msa = self.live(record.msa);
                    return self.link_slot(work, &slot, *entry, *allomorph, sense, msa);
                }
            }
        }

        let (entry, allomorph) = match self.best_entry(&candidates, category)? {
            Some(found) => found,
            None => {
                let entry = self.store.create_entry(&slot.bare, self.ws())?;
                let allomorph = self.store.create_allomorph(
                    entry,
                    &slot.bare,
                    self.ws(),
                    slot.morph_type,
                )?;
                info!(entry = %entry, text = %slot.bare, "commit: created lexicon entry");
                (entry, allomorph)
            }
        };
        let sense = self.store.create_sense(entry)?;
        for ws in wss {
            self.store.set_sense_gloss(sense, *ws, staged_gloss.get(*ws))?;
        }
        let msa = self.store.create_msa(entry, category)?;
        self.store.set_sense_msa(sense, Some(msa))?;
        info!(entry = %entry, sense = %sense, "commit: created sense");
        self.link_slot(work, &slot, entry, allomorph, sense, Some(msa))
    }

    fn msa_category(&self, msa: Option<ObjId>) -> GlossaResult<Option<ObjId>> {
        match self.live(msa) {
            Some(msa) => Ok(self.live(self.store.msa(msa)?.part_of_speech)),
            None => Ok(None),
        }
    }

    /// Prefer a candidate entry that already has a sense in `category`.
    fn best_entry(
        &self,
        candidates: &[(ObjId, ObjId)],
        category: Option<ObjId>,
    ) -> GlossaResult<Option<(ObjId, ObjId)>> {
        if category.is_some() {
            for (entry, allomorph) in candidates {
                for sense in self.store.senses_of(*entry)? {
                    if self.store.is_valid(sense)
                        && self.msa_category(self.store.sense(sense)?.msa)? == category
                    {
                        return Ok(Some((*entry, *allomorph)));
                    }
                }
            }
        }
        Ok(candidates.first().copied())
    }

    fn link_slot(
        &self,
        work: &mut StagingCache,
        slot: &StagedSlot,
        entry: ObjId,
        allomorph: ObjId,
        sense: ObjId,
        msa: Option<ObjId>,
    ) -> GlossaResult<()> {
        let form = work.morph(slot.shadow)?.form;
        work.map_to_real(form, allomorph)?;
        let name = |id: ObjId, ws: &[WsId]| -> GlossaResult<MultiString> {
            let mut out = MultiString::new();
            for ws in ws {
                out.set(*ws, self.store.display_name(id, *ws)?);
            }
            Ok(out)
        };
        let vern = [self.ws()];
        work.attach(slot.shadow, Field::Entry, Some((entry, name(entry, &vern)?)), false)?;
        work.attach(
            slot.shadow,
            Field::Sense,
            Some((sense, name(sense, &self.config.gloss_ws)?)),
            false,
        )?;
        let msa = match msa {
            Some(m) => Some((m, name(m, &self.config.gloss_ws)?)),
            None => None,
        };
        work.attach(slot.shadow, Field::Msa, msa, false)?;
        Ok(())
    }
}
