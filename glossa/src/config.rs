//! Front-end configuration that extends the base `Config` from core.
//!
//! This configuration includes:
//! - All generic options from `glossa_core::Config` (flattened via serde)
//! - Marker-table overrides
//! - The separator width used for multi-word phrases
//!
//! # Example
//!
//! ```rust
//! use glossa::GlossaConfig;
//!
//! let config = GlossaConfig::from_toml_str(
//!     "phrase_separator_width = 3\n\n[[markers]]\nmorph_type = \"enclitic\"\nleading = \"==\"\n",
//! )
//! .unwrap();
//! assert_eq!(config.phrase_separator_width, 3);
//! assert_eq!(config.marker_table().markers_for(glossa_core::MorphType::Enclitic), ("==", ""));
//! ```
use crate::markers::{MarkerSpec, MarkerTable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GlossaConfig {
    /// Base configuration fields (writing systems, lookup and commit options)
    #[serde(flatten)]
    pub base: glossa_core::Config,

    /// Entries replacing the default markers of the morph types they name.
    pub markers: Vec<MarkerSpec>,

    /// Separator width when the word being analysed is a multi-word phrase.
    pub phrase_separator_width: usize,
}

impl Default for GlossaConfig {
    fn default() -> Self {
        Self {
            base: glossa_core::Config::default(),
            markers: Vec::new(),
            phrase_separator_width: 2,
        }
    }
}

impl GlossaConfig {
    /// Convert this config into the base config.
    pub fn into_base(self) -> glossa_core::Config {
        self.base
    }

    pub fn base(&self) -> &glossa_core::Config {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut glossa_core::Config {
        &mut self.base
    }

    /// The default marker table with this config's overrides applied.
    pub fn marker_table(&self) -> MarkerTable {
        MarkerTable::with_overrides(&self.markers)
    }

    pub fn load_toml<P: AsRef<std::path::Path>>(
        path: P,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save_toml<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glossa_core::WsId;

    #[test]
    fn flattened_base_fields() {
        let cfg = GlossaConfig::from_toml_str("add_to_lexicon = true\ngloss_ws = [4]\n").unwrap();
        assert!(cfg.base.add_to_lexicon);
        assert_eq!(cfg.base.gloss_ws, vec![WsId(4)]);
        assert_eq!(cfg.phrase_separator_width, 2);
    }

    #[test]
    fn toml_roundtrip() {
        let mut cfg = GlossaConfig::default();
        cfg.markers.push(MarkerSpec {
            morph_type: "suffix".into(),
            leading: "+".into(),
            trailing: String::new(),
            priority: 0,
        });
        let text = cfg.to_toml_string().unwrap();
        assert_eq!(GlossaConfig::from_toml_str(&text).unwrap(), cfg);
    }
}
