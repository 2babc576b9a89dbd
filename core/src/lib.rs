//! glossa-core
//!
//! Staging model, persisted-store interface and analysis reconciliation shared
//! by glossa front ends.
//!
//! An edit session copies the analysis of one word occurrence into a small
//! shadow graph (`StagingCache`), lets the front end rewrite its morpheme slots
//! freely, and finally hands it to the `Reconciler`, which finds or creates the
//! minimal set of persisted records matching the staged state.
//!
//! Public API:
//! - `LinguisticStore` - Operations needed from the shared database
//! - `RecordStore` - Reference store (in-memory or redb)
//! - `StagingCache` - Shadow graph of the occurrence being edited
//! - `MorphGuesser` - Default lexicon lookup for new morpheme slots
//! - `Reconciler` - Commit of a staging cache into the store
//! - `Config` - Writing systems and feature flags
use serde::{Deserialize, Serialize};

pub mod ids;
pub use ids::{ObjId, ShadowId, WsId};

pub mod model;
pub use model::{
    Allomorph, Analysis, Entry, Evaluation, Gloss, MorphBundle, MorphType, Msa, MultiString,
    PartOfSpeech, Record, Sense, Wordform,
};

pub mod error;
pub use error::{GlossaError, GlossaResult, StagingError, StoreError, StoreResult};

pub mod store;
pub use store::{LinguisticStore, RecordStore};

pub mod staging;
pub use staging::{Field, FieldValue, Link, MorphInput, ShadowKind, StagingCache};

pub mod lexicon;
pub use lexicon::{CacheStats, MorphGuess, MorphGuesser};

pub mod reconcile;
pub use reconcile::{AnalysisRef, Reconciler};

#[doc(hidden)]
pub use tracing as __tracing;

/// Configuration shared by every front end.
///
/// Writing systems are plain ids; the store decides what they mean.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Writing system the words and morphemes are typed in.
    pub vernacular_ws: WsId,
    /// Additional writing systems shown on the morpheme line. Literal bundle
    /// forms are written in these too.
    pub morph_ws: Vec<WsId>,
    /// Writing systems shown on the word-gloss line.
    pub gloss_ws: Vec<WsId>,
    /// Whether the word-gloss line is displayed (and therefore committed).
    pub show_gloss_line: bool,
    /// Create or select lexicon entries for monomorphemic words on commit.
    pub add_to_lexicon: bool,
    /// Retry morph lookups lower-cased when the exact form has no hit.
    pub case_insensitive_lookup: bool,
    /// Maximum number of entries in the morph lookup cache.
    pub max_cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vernacular_ws: WsId(1),
            morph_ws: Vec::new(),
            gloss_ws: vec![WsId(2)],
            show_gloss_line: true,
            add_to_lexicon: false,
            case_insensitive_lookup: true,
            max_cache_size: 1000,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<std::path::Path>>(
        path: P,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize configuration to TOML string.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Writing systems a literal bundle form is written in: the vernacular
    /// first, then the extra morpheme-line ones.
    pub fn literal_form_ws(&self) -> Vec<WsId> {
        let mut out = vec![self.vernacular_ws];
        for ws in &self.morph_ws {
            if !out.contains(ws) {
                out.push(*ws);
            }
        }
        out
    }
}

/// Utility helpers.
pub mod utils {
    use unicode_normalization::UnicodeNormalization;

    /// Normalize input strings (NFC) and trim whitespace.
    pub fn normalize(s: &str) -> String {
        s.nfc().collect::<String>().trim().to_string()
    }

    /// NFC without trimming; keeps the whitespace layout of morph text.
    pub fn nfc(s: &str) -> String {
        s.nfc().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_toml_roundtrip() {
        let mut cfg = Config::default();
        cfg.morph_ws = vec![WsId(3)];
        cfg.add_to_lexicon = true;
        let text = cfg.to_toml_string().unwrap();
        let back = Config::from_toml_str(&text).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn config_missing_fields_use_defaults() {
        let cfg = Config::from_toml_str("add_to_lexicon = true\n").unwrap();
        assert!(cfg.add_to_lexicon);
        assert_eq!(cfg.vernacular_ws, WsId(1));
        assert_eq!(cfg.max_cache_size, 1000);
    }

    #[test]
    fn literal_form_ws_puts_vernacular_first() {
        let cfg = Config {
            morph_ws: vec![WsId(5), WsId(1)],
            ..Config::default()
        };
        assert_eq!(cfg.literal_form_ws(), vec![WsId(1), WsId(5)]);
    }

    #[test]
    fn normalize_composes_and_trims() {
        assert_eq!(utils::normalize(" e\u{301} "), "\u{e9}");
        assert_eq!(utils::nfc("e\u{301} "), "\u{e9} ");
    }
}
