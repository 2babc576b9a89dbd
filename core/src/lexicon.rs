//! Default lexicon lookup for new morpheme slots.
//!
//! When a slot's text changes the engine asks the lexicon whether the bare
//! text names exactly one known allomorph of a compatible morph type. If it
//! does, the slot is pre-filled with that allomorph's entry, the entry's first
//! sense and the sense's MSA, all marked as guesses.
//!
//! Lookups are cached per (text, morph type). Cached ids are re-validated on
//! every hit since other sessions may delete records at any time; the cache is
//! cleared after each commit.

use crate::error::StoreResult;
use crate::ids::{ObjId, WsId};
use crate::model::{MorphType, MultiString};
use crate::staging::MorphInput;
use crate::store::LinguisticStore;
use crate::utils::normalize;
use crate::Config;
use std::cell::RefCell;
use std::num::NonZeroUsize;
use tracing::{debug, trace};

/// A strong lexicon match for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MorphGuess {
    pub allomorph: ObjId,
    pub entry: ObjId,
    pub sense: Option<ObjId>,
    pub msa: Option<ObjId>,
    pub entry_name: MultiString,
    pub sense_name: MultiString,
    pub msa_name: MultiString,
}

impl MorphGuess {
    fn ids(&self) -> impl Iterator<Item = ObjId> + '_ {
        [Some(self.allomorph), Some(self.entry), self.sense, self.msa]
            .into_iter()
            .flatten()
    }
}

/// Cache hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

impl CacheStats {
    /// Hit rate as a percentage, or None before the first lookup.
    pub fn hit_rate(&self) -> Option<f32> {
        let total = self.hits + self.misses;
        if total == 0 {
            None
        } else {
            Some((self.hits as f32 / total as f32) * 100.0)
        }
    }
}

type CacheKey = (String, MorphType);

pub struct MorphGuesser {
    vernacular_ws: WsId,
    name_ws: Vec<WsId>,
    case_insensitive: bool,
    cache: RefCell<lru::LruCache<CacheKey, Option<MorphGuess>>>,
    cache_hits: RefCell<usize>,
    cache_misses: RefCell<usize>,
}

impl std::fmt::Debug for MorphGuesser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MorphGuesser")
            .field("vernacular_ws", &self.vernacular_ws)
            .field("case_insensitive", &self.case_insensitive)
            .field("cache_size", &self.cache_size())
            .finish()
    }
}

impl MorphGuesser {
    pub fn new(config: &Config) -> Self {
        let capacity = NonZeroUsize::new(config.max_cache_size).unwrap_or(NonZeroUsize::MIN);
        let name_ws = if config.gloss_ws.is_empty() {
            vec![config.vernacular_ws]
        } else {
            config.gloss_ws.clone()
        };
        Self {
            vernacular_ws: config.vernacular_ws,
            name_ws,
            case_insensitive: config.case_insensitive_lookup,
            cache: RefCell::new(lru::LruCache::new(capacity)),
            cache_hits: RefCell::new(0),
            cache_misses: RefCell::new(0),
        }
    }

    /// Look up the slot's bare text. `Ok(None)` means no single strong match.
    pub fn guess<S: LinguisticStore + ?Sized>(
        &self,
        store: &S,
        input: &MorphInput,
    ) -> StoreResult<Option<MorphGuess>> {
        let text = normalize(&input.bare);
        if text.is_empty() {
            return Ok(None);
        }
        let key = (text.clone(), input.morph_type);

        let cached = self.cache.borrow_mut().get(&key).cloned();
        if let Some(cached) = cached {
            let still_valid = match &cached {
                Some(g) => g.ids().all(|id| store.is_valid(id)),
                None => true,
            };
            if still_valid {
                *self.cache_hits.borrow_mut() += 1;
                return Ok(cached);
            }
            debug!(text = %text, "lexicon: cached guess went stale");
            self.cache.borrow_mut().pop(&key);
        }
        *self.cache_misses.borrow_mut() += 1;

        let result = self.lookup(store, &text, input.morph_type)?;
        self.cache.borrow_mut().put(key, result.clone());
        Ok(result)
    }

    fn lookup<S: LinguisticStore + ?Sized>(
        &self,
        store: &S,
        text: &str,
        morph_type: MorphType,
    ) -> StoreResult<Option<MorphGuess>> {
        let filter = morph_type.compatible_types();
        let mut hits = store.find_allomorphs(text, self.vernacular_ws, filter)?;
        if hits.is_empty() && self.case_insensitive {
            let lower = text.to_lowercase();
            if lower != text {
                trace!(text, "lexicon: retrying lower-cased");
                hits = store.find_allomorphs(&lower, self.vernacular_ws, filter)?;
            }
        }
        if hits.len() != 1 {
            trace!(text, hits = hits.len(), "lexicon: no single strong match");
            return Ok(None);
        }
        let allomorph = hits[0];
        let entry = store.allomorph(allomorph)?.owner;
        let sense = store
            .senses_of(entry)?
            .into_iter()
            .find(|s| store.is_valid(*s));
        let msa = match sense {
            Some(s) => store.sense(s)?.msa.filter(|m| store.is_valid(*m)),
            None => None,
        };

        let entry_name = MultiString::from_text(
            self.vernacular_ws,
            store.display_name(entry, self.vernacular_ws)?,
        );
        let sense_name = self.names(store, sense)?;
        let msa_name = self.names(store, msa)?;
        debug!(text, entry = %entry, "lexicon: strong match");
        Ok(Some(MorphGuess {
            allomorph,
            entry,
            sense,
            msa,
            entry_name,
            sense_name,
            msa_name,
        }))
    }

    fn names<S: LinguisticStore + ?Sized>(
        &self,
        store: &S,
        id: Option<ObjId>,
    ) -> StoreResult<MultiString> {
        let mut names = MultiString::new();
        if let Some(id) = id {
            for ws in &self.name_ws {
                names.set(*ws, store.display_name(id, *ws)?);
            }
        }
        Ok(names)
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: *self.cache_hits.borrow(),
            misses: *self.cache_misses.borrow(),
        }
    }

    pub fn cache_size(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache.borrow().cap().get()
    }

    /// Clear the cache and its counters.
    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
        *self.cache_hits.borrow_mut() = 0;
        *self.cache_misses.borrow_mut() = 0;
    }
}
