//! Staging cache: the shadow graph of the occurrence being edited.
//!
//! One `SbWord` roots the graph and lists its `SbMorph` slots in order. Every
//! reference a slot (or the word) holds to a persisted object goes through an
//! `SbNamedObj`, which carries only a display name; the identity map links
//! shadow ids to real ids. Links record whether their target was guessed by
//! the machine or chosen by the user.
//!
//! Nothing here touches the persisted store. Multi-step mutations (`merge`)
//! run on a copy of the graph and only replace it when they succeed.

use crate::error::{GlossaResult, StagingError};
use crate::ids::{ObjId, ShadowId, WsId};
use crate::lexicon::MorphGuess;
use crate::model::{MorphType, MultiString};
use crate::utils::nfc;
use ahash::AHashMap;
use tracing::debug;

/// Reference from a shadow field to a named shadow object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Link {
    #[default]
    Absent,
    /// Filled in by a lookup or a load; not yet chosen by the user.
    Guessed(ShadowId),
    /// Chosen or accepted by the user.
    Confirmed(ShadowId),
}

impl Link {
    pub fn target(self) -> Option<ShadowId> {
        match self {
            Link::Absent => None,
            Link::Guessed(id) | Link::Confirmed(id) => Some(id),
        }
    }

    pub fn is_guess(self) -> bool {
        matches!(self, Link::Guessed(_))
    }

    pub fn is_absent(self) -> bool {
        matches!(self, Link::Absent)
    }

    fn with_guess(self, guess: bool) -> Link {
        match (self.target(), guess) {
            (None, _) => Link::Absent,
            (Some(id), true) => Link::Guessed(id),
            (Some(id), false) => Link::Confirmed(id),
        }
    }
}

/// Root of the shadow graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SbWord {
    /// Raw wordform text per writing system.
    pub form: MultiString,
    /// Word-level category (part of speech).
    pub category: Link,
    /// Named object holding the staged word gloss; mapped to the previously
    /// selected gloss, if any.
    pub gloss: ShadowId,
    pub morphs: Vec<ShadowId>,
}

/// One morpheme slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SbMorph {
    pub owner: ShadowId,
    pub prefix: String,
    pub suffix: String,
    pub morph_type: MorphType,
    /// Named object holding the bare text; mapped to the allomorph, if linked.
    pub form: ShadowId,
    pub entry: Link,
    pub sense: Link,
    pub msa: Link,
}

/// Shadow stand-in for a referenced persisted record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SbNamedObj {
    pub owner: ShadowId,
    pub name: MultiString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ShadowObj {
    Morph(SbMorph),
    Named(SbNamedObj),
}

/// Kinds of object `StagingCache::create` can add. The word itself exists
/// once per cache and is created with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowKind {
    Morph,
    Named,
}

/// Addressable fields of shadow objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Word: raw text (`Text`). Morph: bare-text named object (`Id`).
    Form,
    Category,
    Gloss,
    Morphs,
    Prefix,
    Suffix,
    MorphType,
    Entry,
    Sense,
    Msa,
    Name,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Form => "form",
            Field::Category => "category",
            Field::Gloss => "gloss",
            Field::Morphs => "morphs",
            Field::Prefix => "prefix",
            Field::Suffix => "suffix",
            Field::MorphType => "morph type",
            Field::Entry => "entry",
            Field::Sense => "sense",
            Field::Msa => "msa",
            Field::Name => "name",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(MultiString),
    Str(String),
    Link(Link),
    Id(ShadowId),
    Ids(Vec<ShadowId>),
    MorphType(MorphType),
}

/// One classified segment handed to `StagingCache::merge`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MorphInput {
    pub prefix: String,
    pub bare: String,
    pub suffix: String,
    pub morph_type: MorphType,
}

impl MorphInput {
    pub fn stem<T: Into<String>>(bare: T) -> Self {
        Self {
            prefix: String::new(),
            bare: bare.into(),
            suffix: String::new(),
            morph_type: MorphType::Stem,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Graph {
    root: ShadowId,
    word: SbWord,
    objects: AHashMap<ShadowId, ShadowObj>,
    real: AHashMap<ShadowId, ObjId>,
}

/// The shadow graph plus its identity map, dirty flag and baseline.
#[derive(Debug, Clone)]
pub struct StagingCache {
    ws: WsId,
    graph: Graph,
    baseline: Graph,
    dirty: bool,
}

fn mismatch(id: ShadowId, field: Field) -> StagingError {
    StagingError::FieldMismatch {
        id,
        field: field.name(),
    }
}

impl Graph {
    fn new(form: MultiString) -> Self {
        let root = ShadowId::fresh();
        let gloss = ShadowId::fresh();
        let mut objects = AHashMap::new();
        objects.insert(
            gloss,
            ShadowObj::Named(SbNamedObj {
                owner: root,
                name: MultiString::new(),
            }),
        );
        Self {
            root,
            word: SbWord {
                form,
                category: Link::Absent,
                gloss,
                morphs: Vec::new(),
            },
            objects,
            real: AHashMap::new(),
        }
    }

    fn word(&self) -> &SbWord {
        &self.word
    }

    fn word_mut(&mut self) -> &mut SbWord {
        &mut self.word
    }

    fn contains(&self, id: ShadowId) -> bool {
        id == self.root || self.objects.contains_key(&id)
    }

    fn morph(&self, id: ShadowId) -> Result<&SbMorph, StagingError> {
        match self.objects.get(&id) {
            Some(ShadowObj::Morph(m)) => Ok(m),
            Some(_) => Err(mismatch(id, Field::Prefix)),
            None => Err(StagingError::UnknownShadow(id)),
        }
    }

    fn morph_mut(&mut self, id: ShadowId) -> Result<&mut SbMorph, StagingError> {
        match self.objects.get_mut(&id) {
            Some(ShadowObj::Morph(m)) => Ok(m),
            Some(_) => Err(mismatch(id, Field::Prefix)),
            None => Err(StagingError::UnknownShadow(id)),
        }
    }

    fn named(&self, id: ShadowId) -> Result<&SbNamedObj, StagingError> {
        match self.objects.get(&id) {
            Some(ShadowObj::Named(n)) => Ok(n),
            Some(_) => Err(mismatch(id, Field::Name)),
            None => Err(StagingError::UnknownShadow(id)),
        }
    }

    fn named_mut(&mut self, id: ShadowId) -> Result<&mut SbNamedObj, StagingError> {
        match self.objects.get_mut(&id) {
            Some(ShadowObj::Named(n)) => Ok(n),
            Some(_) => Err(mismatch(id, Field::Name)),
            None => Err(StagingError::UnknownShadow(id)),
        }
    }

    fn add_named(&mut self, owner: ShadowId, name: MultiString) -> ShadowId {
        let id = ShadowId::fresh();
        self.objects
            .insert(id, ShadowObj::Named(SbNamedObj { owner, name }));
        id
    }

    fn add_morph(&mut self, index: usize, input: &MorphInput, ws: WsId) -> ShadowId {
        let id = ShadowId::fresh();
        let form = self.add_named(id, MultiString::from_text(ws, input.bare.clone()));
        self.objects.insert(
            id,
            ShadowObj::Morph(SbMorph {
                owner: self.root,
                prefix: input.prefix.clone(),
                suffix: input.suffix.clone(),
                morph_type: input.morph_type,
                form,
                entry: Link::Absent,
                sense: Link::Absent,
                msa: Link::Absent,
            }),
        );
        let root = self.root;
        let morphs = &mut self.word_mut().morphs;
        let at = index.min(morphs.len());
        morphs.insert(at, id);
        debug!(morph = %id, word = %root, index = at, "staging: created slot");
        id
    }

    /// Drop a named object if nothing but its old owner referenced it.
    fn drop_named(&mut self, id: ShadowId) {
        self.objects.remove(&id);
        self.real.remove(&id);
    }

    fn remove_morph(&mut self, id: ShadowId) -> Result<(), StagingError> {
        let m = self.morph(id)?.clone();
        self.drop_named(m.form);
        for link in [m.entry, m.sense, m.msa] {
            if let Some(target) = link.target() {
                self.drop_named(target);
            }
        }
        self.objects.remove(&id);
        self.real.remove(&id);
        self.word_mut().morphs.retain(|x| *x != id);
        Ok(())
    }

    fn link_slot(&mut self, id: ShadowId, field: Field) -> Result<&mut Link, StagingError> {
        if id == self.root {
            return match field {
                Field::Category => Ok(&mut self.word.category),
                _ => Err(mismatch(id, field)),
            };
        }
        match (self.objects.get_mut(&id), field) {
            (Some(ShadowObj::Morph(m)), Field::Entry) => Ok(&mut m.entry),
            (Some(ShadowObj::Morph(m)), Field::Sense) => Ok(&mut m.sense),
            (Some(ShadowObj::Morph(m)), Field::Msa) => Ok(&mut m.msa),
            (Some(_), _) => Err(mismatch(id, field)),
            (None, _) => Err(StagingError::UnknownShadow(id)),
        }
    }

    /// Point `field` of `owner` at a fresh named object mapped to `target`.
    fn attach(
        &mut self,
        owner: ShadowId,
        field: Field,
        target: Option<(ObjId, MultiString)>,
        guess: bool,
    ) -> Result<(), StagingError> {
        let old = *self.link_slot(owner, field)?;
        let new = match target {
            Some((real, name)) => {
                let named = self.add_named(owner, name);
                self.real.insert(named, real);
                Link::Confirmed(named).with_guess(guess)
            }
            None => Link::Absent,
        };
        *self.link_slot(owner, field)? = new;
        if let Some(old) = old.target() {
            self.drop_named(old);
        }
        Ok(())
    }

    fn clear_links(&mut self, morph: ShadowId) -> Result<(), StagingError> {
        for field in [Field::Entry, Field::Sense, Field::Msa] {
            self.attach(morph, field, None, false)?;
        }
        let form = self.morph(morph)?.form;
        self.real.remove(&form);
        Ok(())
    }

    fn apply_guess(&mut self, morph: ShadowId, guess: &MorphGuess) -> Result<(), StagingError> {
        let form = self.morph(morph)?.form;
        self.real.insert(form, guess.allomorph);
        self.attach(
            morph,
            Field::Entry,
            Some((guess.entry, guess.entry_name.clone())),
            true,
        )?;
        self.attach(
            morph,
            Field::Sense,
            guess.sense.map(|s| (s, guess.sense_name.clone())),
            true,
        )?;
        self.attach(
            morph,
            Field::Msa,
            guess.msa.map(|m| (m, guess.msa_name.clone())),
            true,
        )
    }
}

impl StagingCache {
    /// Empty cache for a word with raw text `form` in writing system `ws`.
    pub fn new(ws: WsId, form: &str) -> Self {
        let graph = Graph::new(MultiString::from_text(ws, nfc(form)));
        Self {
            ws,
            baseline: graph.clone(),
            graph,
            dirty: false,
        }
    }

    /// Writing system bare morph text is kept in.
    pub fn ws(&self) -> WsId {
        self.ws
    }

    pub fn root(&self) -> ShadowId {
        self.graph.root
    }

    pub fn word(&self) -> &SbWord {
        self.graph.word()
    }

    pub fn morphs(&self) -> &[ShadowId] {
        &self.graph.word().morphs
    }

    pub fn morph(&self, id: ShadowId) -> Result<&SbMorph, StagingError> {
        self.graph.morph(id)
    }

    pub fn named(&self, id: ShadowId) -> Result<&SbNamedObj, StagingError> {
        self.graph.named(id)
    }

    /// Raw word text in the cache's writing system.
    pub fn word_text(&self) -> &str {
        self.graph.word().form.get(self.ws)
    }

    /// Staged word gloss.
    pub fn word_gloss(&self) -> MultiString {
        self.graph
            .named(self.graph.word().gloss)
            .map(|n| n.name.clone())
            .unwrap_or_default()
    }

    /// Bare text of a slot.
    pub fn bare_text(&self, morph: ShadowId) -> Result<&str, StagingError> {
        let form = self.graph.morph(morph)?.form;
        Ok(self.graph.named(form)?.name.get(self.ws))
    }

    /// Prefix marker, bare text and suffix marker of a slot, concatenated.
    pub fn literal_text(&self, morph: ShadowId) -> Result<String, StagingError> {
        let m = self.graph.morph(morph)?;
        let bare = self.bare_text(morph)?;
        Ok(format!("{}{}{}", m.prefix, bare, m.suffix))
    }

    /// Real id behind a link, if it is mapped.
    pub fn link_real(&self, link: Link) -> Option<ObjId> {
        link.target().and_then(|id| self.real_id_of(id))
    }

    pub fn create(
        &mut self,
        kind: ShadowKind,
        owner: ShadowId,
        slot: usize,
    ) -> Result<ShadowId, StagingError> {
        let id = match kind {
            ShadowKind::Morph => {
                if owner != self.graph.root {
                    return Err(mismatch(owner, Field::Morphs));
                }
                self.graph.add_morph(slot, &MorphInput::stem(""), self.ws)
            }
            ShadowKind::Named => {
                if !self.graph.contains(owner) {
                    return Err(StagingError::UnknownShadow(owner));
                }
                self.graph.add_named(owner, MultiString::new())
            }
        };
        self.dirty = true;
        Ok(id)
    }

    /// Remove a morph slot and the named objects it owns.
    pub fn delete(&mut self, morph: ShadowId) -> Result<(), StagingError> {
        self.graph.remove_morph(morph)?;
        self.dirty = true;
        Ok(())
    }

    pub fn get(&self, id: ShadowId, field: Field) -> Result<FieldValue, StagingError> {
        if id == self.graph.root {
            let w = self.graph.word();
            return match field {
                Field::Form => Ok(FieldValue::Text(w.form.clone())),
                Field::Category => Ok(FieldValue::Link(w.category)),
                Field::Gloss => Ok(FieldValue::Id(w.gloss)),
                Field::Morphs => Ok(FieldValue::Ids(w.morphs.clone())),
                _ => Err(mismatch(id, field)),
            };
        }
        let obj = self
            .graph
            .objects
            .get(&id)
            .ok_or(StagingError::UnknownShadow(id))?;
        let value = match (obj, field) {
            (ShadowObj::Morph(m), Field::Prefix) => FieldValue::Str(m.prefix.clone()),
            (ShadowObj::Morph(m), Field::Suffix) => FieldValue::Str(m.suffix.clone()),
            (ShadowObj::Morph(m), Field::MorphType) => FieldValue::MorphType(m.morph_type),
            (ShadowObj::Morph(m), Field::Form) => FieldValue::Id(m.form),
            (ShadowObj::Morph(m), Field::Entry) => FieldValue::Link(m.entry),
            (ShadowObj::Morph(m), Field::Sense) => FieldValue::Link(m.sense),
            (ShadowObj::Morph(m), Field::Msa) => FieldValue::Link(m.msa),
            (ShadowObj::Named(n), Field::Name) => FieldValue::Text(n.name.clone()),
            _ => return Err(mismatch(id, field)),
        };
        Ok(value)
    }

    pub fn set(&mut self, id: ShadowId, field: Field, value: FieldValue) -> Result<(), StagingError> {
        if let FieldValue::Link(link) = &value {
            if let Some(target) = link.target() {
                self.graph.named(target)?;
            }
        }
        if id == self.graph.root {
            let w = self.graph.word_mut();
            match (field, value) {
                (Field::Form, FieldValue::Text(t)) => w.form = t,
                (Field::Category, FieldValue::Link(l)) => w.category = l,
                _ => return Err(mismatch(id, field)),
            }
            self.dirty = true;
            return Ok(());
        }
        let obj = self
            .graph
            .objects
            .get_mut(&id)
            .ok_or(StagingError::UnknownShadow(id))?;
        match (obj, field, value) {
            (ShadowObj::Morph(m), Field::Prefix, FieldValue::Str(s)) => m.prefix = s,
            (ShadowObj::Morph(m), Field::Suffix, FieldValue::Str(s)) => m.suffix = s,
            (ShadowObj::Morph(m), Field::MorphType, FieldValue::MorphType(t)) => m.morph_type = t,
            (ShadowObj::Morph(m), Field::Entry, FieldValue::Link(l)) => m.entry = l,
            (ShadowObj::Morph(m), Field::Sense, FieldValue::Link(l)) => m.sense = l,
            (ShadowObj::Morph(m), Field::Msa, FieldValue::Link(l)) => m.msa = l,
            (ShadowObj::Named(n), Field::Name, FieldValue::Text(t)) => n.name = t,
            _ => return Err(mismatch(id, field)),
        }
        self.dirty = true;
        Ok(())
    }

    /// Set the staged word gloss in one writing system.
    pub fn set_word_gloss(&mut self, ws: WsId, text: &str) -> Result<(), StagingError> {
        let gloss = self.graph.word().gloss;
        self.graph.named_mut(gloss)?.name.set(ws, text);
        self.dirty = true;
        Ok(())
    }

    /// Point a link field (word category, morph entry/sense/msa) at a real
    /// object, or clear it with `None`.
    pub fn attach(
        &mut self,
        owner: ShadowId,
        field: Field,
        target: Option<(ObjId, MultiString)>,
        guess: bool,
    ) -> Result<(), StagingError> {
        self.graph.attach(owner, field, target, guess)?;
        self.dirty = true;
        Ok(())
    }

    pub fn map_to_real(&mut self, id: ShadowId, real: ObjId) -> Result<(), StagingError> {
        if !self.graph.contains(id) {
            return Err(StagingError::UnknownShadow(id));
        }
        self.graph.real.insert(id, real);
        self.dirty = true;
        Ok(())
    }

    pub fn unmap(&mut self, id: ShadowId) {
        if self.graph.real.remove(&id).is_some() {
            self.dirty = true;
        }
    }

    pub fn real_id_of(&self, id: ShadowId) -> Option<ObjId> {
        self.graph.real.get(&id).copied()
    }

    /// Rewrite every link pointing at `id` as guessed or confirmed.
    pub fn mark_guess(&mut self, id: ShadowId, guess: bool) {
        let mut links = vec![&mut self.graph.word.category];
        for obj in self.graph.objects.values_mut() {
            if let ShadowObj::Morph(m) = obj {
                links.extend([&mut m.entry, &mut m.sense, &mut m.msa]);
            }
        }
        let mut changed = false;
        for link in links {
            if link.target() == Some(id) && link.is_guess() != guess {
                *link = link.with_guess(guess);
                changed = true;
            }
        }
        self.dirty |= changed;
    }

    /// Turn every guessed link into a confirmed one.
    pub fn confirm_all(&mut self) {
        let guessed: Vec<ShadowId> = self
            .links()
            .into_iter()
            .filter(|l| l.is_guess())
            .filter_map(Link::target)
            .collect();
        for id in guessed {
            self.mark_guess(id, false);
        }
    }

    fn links(&self) -> Vec<Link> {
        let mut out = vec![self.graph.word().category];
        for id in &self.graph.word().morphs {
            if let Ok(m) = self.graph.morph(*id) {
                out.extend([m.entry, m.sense, m.msa]);
            }
        }
        out
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Make the current state the point `revert` returns to.
    pub fn baseline(&mut self) {
        self.baseline = self.graph.clone();
        self.dirty = false;
    }

    /// Throw away everything since the last `baseline`.
    pub fn revert(&mut self) {
        self.graph = self.baseline.clone();
        self.dirty = false;
    }

    /// Replace the morph slots with `inputs`, keeping the links of slots whose
    /// bare text survived.
    ///
    /// Slot `i` is kept when its bare text equals input `i`. Otherwise up to
    /// (old count - new count) further old slots are searched for the text; on
    /// a hit the skipped slots are deleted and the hit is adopted. On a miss
    /// slot `i` is reused with its links cleared, and `lookup` may fill them in
    /// as guesses. Old slots left over at the end are deleted. An empty input
    /// list leaves a single empty placeholder slot.
    ///
    /// If `lookup` fails the cache is left exactly as it was.
    pub fn merge<F>(&mut self, inputs: &[MorphInput], mut lookup: F) -> GlossaResult<()>
    where
        F: FnMut(&MorphInput) -> GlossaResult<Option<MorphGuess>>,
    {
        let placeholder = [MorphInput::stem("")];
        let inputs = if inputs.is_empty() {
            &placeholder[..]
        } else {
            inputs
        };

        let mut work = self.graph.clone();
        let old = work.word().morphs.clone();
        let mut budget = old.len().saturating_sub(inputs.len());
        let mut j = 0;
        let ws = self.ws;

        let bare_of = |g: &Graph, id: ShadowId| -> Result<String, StagingError> {
            let form = g.morph(id)?.form;
            Ok(g.named(form)?.name.get(ws).to_string())
        };

        for (i, input) in inputs.iter().enumerate() {
            let bare = nfc(&input.bare);
            let slot = if j < old.len() && bare_of(&work, old[j])? == bare {
                debug!(index = i, text = %bare, "merge: kept slot");
                let id = old[j];
                j += 1;
                id
            } else {
                let mut hit = None;
                for k in 1..=budget {
                    if j + k < old.len() && bare_of(&work, old[j + k])? == bare {
                        hit = Some(k);
                        break;
                    }
                }
                match hit {
                    Some(k) => {
                        for skipped in &old[j..j + k] {
                            work.remove_morph(*skipped)?;
                        }
                        debug!(index = i, skipped = k, text = %bare, "merge: adopted later slot");
                        budget -= k;
                        let id = old[j + k];
                        j += k + 1;
                        id
                    }
                    None => {
                        let id = if j < old.len() {
                            let id = old[j];
                            j += 1;
                            work.clear_links(id)?;
                            let form = work.morph(id)?.form;
                            work.named_mut(form)?.name.set(ws, bare.clone());
                            id
                        } else {
                            work.add_morph(i, input, ws)
                        };
                        if !bare.trim().is_empty() {
                            if let Some(guess) = lookup(input)? {
                                debug!(index = i, text = %bare, entry = %guess.entry, "merge: guessed links");
                                work.apply_guess(id, &guess)?;
                            }
                        }
                        id
                    }
                }
            };
            let m = work.morph_mut(slot)?;
            m.prefix = input.prefix.clone();
            m.suffix = input.suffix.clone();
            m.morph_type = input.morph_type;
            // Keep the slot list in input order.
            let morphs = &mut work.word_mut().morphs;
            if let Some(pos) = morphs.iter().position(|x| *x == slot) {
                if pos != i {
                    morphs.remove(pos);
                    morphs.insert(i.min(morphs.len()), slot);
                }
            }
        }

        for leftover in &old[j.min(old.len())..] {
            if work.objects.contains_key(leftover) {
                work.remove_morph(*leftover)?;
            }
        }
        let morphs = &work.word().morphs;
        crate::invariant!(
            morphs.len() == inputs.len(),
            "merge produced {} slots for {} inputs",
            morphs.len(),
            inputs.len()
        );

        self.graph = work;
        self.dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WS: WsId = WsId(1);

    fn inputs(parts: &[&str]) -> Vec<MorphInput> {
        parts.iter().map(|p| MorphInput::stem(*p)).collect()
    }

    fn no_lookup(_: &MorphInput) -> GlossaResult<Option<MorphGuess>> {
        Ok(None)
    }

    fn bare_list(cache: &StagingCache) -> Vec<String> {
        cache
            .morphs()
            .iter()
            .map(|m| cache.bare_text(*m).unwrap().to_string())
            .collect()
    }

    #[test]
    fn new_cache_is_clean() {
        let cache = StagingCache::new(WS, "dogs");
        assert!(!cache.is_dirty());
        assert_eq!(cache.word_text(), "dogs");
        assert!(cache.morphs().is_empty());
        assert!(cache.word_gloss().is_blank());
    }

    #[test]
    fn create_get_set() {
        let mut cache = StagingCache::new(WS, "dogs");
        let root = cache.root();
        let m = cache.create(ShadowKind::Morph, root, 0).unwrap();
        assert!(cache.is_dirty());
        cache
            .set(m, Field::Prefix, FieldValue::Str("-".into()))
            .unwrap();
        assert_eq!(cache.get(m, Field::Prefix).unwrap(), FieldValue::Str("-".into()));
        assert_eq!(
            cache.get(root, Field::Morphs).unwrap(),
            FieldValue::Ids(vec![m])
        );
        assert!(matches!(
            cache.set(m, Field::Name, FieldValue::Str("x".into())),
            Err(StagingError::FieldMismatch { .. })
        ));
        let bogus = ShadowId::fresh();
        assert_eq!(
            cache.get(bogus, Field::Name),
            Err(StagingError::UnknownShadow(bogus))
        );
    }

    #[test]
    fn identity_map_and_guess_flags() {
        let mut cache = StagingCache::new(WS, "dogs");
        cache.merge(&inputs(&["dog", "s"]), no_lookup).unwrap();
        let m = cache.morphs()[0];
        cache
            .attach(m, Field::Entry, Some((ObjId(7), MultiString::from_text(WS, "dog"))), true)
            .unwrap();
        let link = cache.morph(m).unwrap().entry;
        assert!(link.is_guess());
        assert_eq!(cache.link_real(link), Some(ObjId(7)));

        let target = link.target().unwrap();
        cache.mark_guess(target, false);
        assert_eq!(cache.morph(m).unwrap().entry, Link::Confirmed(target));
    }

    #[test]
    fn baseline_and_revert() {
        let mut cache = StagingCache::new(WS, "dogs");
        cache.merge(&inputs(&["dogs"]), no_lookup).unwrap();
        cache.baseline();
        assert!(!cache.is_dirty());
        cache.merge(&inputs(&["dog", "s"]), no_lookup).unwrap();
        cache.set_word_gloss(WsId(2), "dog.PL").unwrap();
        assert!(cache.is_dirty());
        cache.revert();
        assert!(!cache.is_dirty());
        assert_eq!(bare_list(&cache), vec!["dogs"]);
        assert!(cache.word_gloss().is_blank());
    }

    #[test]
    fn merge_keeps_links_on_unchanged_slots() {
        let mut cache = StagingCache::new(WS, "dogs");
        cache.merge(&inputs(&["dog", "s"]), no_lookup).unwrap();
        let s = cache.morphs()[1];
        cache
            .attach(s, Field::Sense, Some((ObjId(9), MultiString::from_text(WS, "PL"))), false)
            .unwrap();
        cache.merge(&inputs(&["do", "s"]), no_lookup).unwrap();
        assert_eq!(cache.morphs()[1], s);
        assert_eq!(cache.link_real(cache.morph(s).unwrap().sense), Some(ObjId(9)));
    }

    #[test]
    fn merge_adopts_later_slot_after_join() {
        let mut cache = StagingCache::new(WS, "unkindness");
        cache.merge(&inputs(&["un", "kind", "ness"]), no_lookup).unwrap();
        let ness = cache.morphs()[2];
        cache
            .attach(ness, Field::Entry, Some((ObjId(3), MultiString::from_text(WS, "ness"))), false)
            .unwrap();
        cache.merge(&inputs(&["unkind", "ness"]), no_lookup).unwrap();
        assert_eq!(bare_list(&cache), vec!["unkind", "ness"]);
        assert_eq!(cache.morphs()[1], ness);
        assert_eq!(
            cache.link_real(cache.morph(ness).unwrap().entry),
            Some(ObjId(3))
        );
    }

    #[test]
    fn merge_clears_links_on_changed_slot() {
        let mut cache = StagingCache::new(WS, "dogs");
        cache.merge(&inputs(&["dogs"]), no_lookup).unwrap();
        let m = cache.morphs()[0];
        cache
            .attach(m, Field::Entry, Some((ObjId(3), MultiString::from_text(WS, "dogs"))), false)
            .unwrap();
        cache.merge(&inputs(&["dog", "s"]), no_lookup).unwrap();
        assert_eq!(cache.morphs()[0], m);
        assert!(cache.morph(m).unwrap().entry.is_absent());
    }

    #[test]
    fn merge_failure_leaves_cache_untouched() {
        let mut cache = StagingCache::new(WS, "dogs");
        cache.merge(&inputs(&["dogs"]), no_lookup).unwrap();
        cache.baseline();
        let before = bare_list(&cache);
        let result = cache.merge(&inputs(&["dog", "s"]), |_| {
            Err(crate::error::GlossaError::Store(crate::error::StoreError::ReadOnly))
        });
        assert!(result.is_err());
        assert_eq!(bare_list(&cache), before);
        assert!(!cache.is_dirty());
    }

    #[test]
    fn merge_empty_input_leaves_placeholder() {
        let mut cache = StagingCache::new(WS, "dogs");
        cache.merge(&inputs(&["dog", "s"]), no_lookup).unwrap();
        cache.merge(&[], no_lookup).unwrap();
        assert_eq!(bare_list(&cache), vec![""]);
    }

    #[test]
    fn merge_applies_guesses_to_new_slots() {
        let mut cache = StagingCache::new(WS, "dogs");
        cache
            .merge(&inputs(&["dog"]), |input| {
                Ok(Some(MorphGuess {
                    allomorph: ObjId(1),
                    entry: ObjId(2),
                    sense: Some(ObjId(3)),
                    msa: None,
                    entry_name: MultiString::from_text(WS, input.bare.clone()),
                    sense_name: MultiString::new(),
                    msa_name: MultiString::new(),
                }))
            })
            .unwrap();
        let m = cache.morph(cache.morphs()[0]).unwrap().clone();
        assert!(m.entry.is_guess());
        assert_eq!(cache.link_real(m.entry), Some(ObjId(2)));
        assert_eq!(cache.link_real(m.sense), Some(ObjId(3)));
        assert!(m.msa.is_absent());
        assert_eq!(cache.real_id_of(m.form), Some(ObjId(1)));
    }
}
