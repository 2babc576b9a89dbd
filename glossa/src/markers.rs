// glossa/src/markers.rs
//
// Morph-type boundary markers.
//
// Linguists type affixes with conventional punctuation attached: "-al" is a
// suffix, "re-" a prefix, "=ne" an enclitic. The marker table maps every morph
// type to the leading and trailing marker strings that identify it. The
// segmenter splits on these markers, and the form classifier strips them again
// to recover the bare form and morph type.

use glossa_core::MorphType;
use once_cell::sync::Lazy;
use phf::phf_map;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default markers: morph type name => (leading, trailing, priority).
/// A lower priority value wins when two entries match equally well.
static DEFAULT_MARKERS: phf::Map<&'static str, (&'static str, &'static str, u8)> = phf_map! {
    "stem" => ("", "", 0),
    "root" => ("", "", 1),
    "bound root" => ("*", "", 0),
    "bound stem" => ("*", "", 1),
    "prefix" => ("", "-", 0),
    "suffix" => ("-", "", 0),
    "infix" => ("-", "-", 0),
    "proclitic" => ("", "=", 0),
    "enclitic" => ("=", "", 0),
    "simulfix" => ("=", "=", 0),
    "suprafix" => ("~", "~", 0),
    "prefixing interfix" => ("", "_", 0),
    "suffixing interfix" => ("_", "", 0),
    "infixing interfix" => ("_", "_", 0),
    "clitic" => ("", "", 2),
    "particle" => ("", "", 3),
    "phrase" => ("", "", 4),
};

static DEFAULT_TABLE: Lazy<MarkerTable> = Lazy::new(|| {
    let entries = MorphType::ALL
        .iter()
        .filter_map(|t| {
            DEFAULT_MARKERS
                .get(t.name())
                .map(|(leading, trailing, priority)| MarkerEntry {
                    morph_type: *t,
                    leading: (*leading).to_string(),
                    trailing: (*trailing).to_string(),
                    priority: *priority,
                })
        })
        .collect();
    MarkerTable::from_entries(entries)
});

/// Serializable marker override, as written in config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerSpec {
    pub morph_type: String,
    #[serde(default)]
    pub leading: String,
    #[serde(default)]
    pub trailing: String,
    #[serde(default)]
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerEntry {
    pub morph_type: MorphType,
    pub leading: String,
    pub trailing: String,
    pub priority: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerTable {
    entries: Vec<MarkerEntry>,
    /// Distinct non-empty markers, longest first.
    break_markers: Vec<String>,
}

impl Default for MarkerTable {
    fn default() -> Self {
        DEFAULT_TABLE.clone()
    }
}

impl MarkerTable {
    pub fn from_entries(entries: Vec<MarkerEntry>) -> Self {
        let mut break_markers: Vec<String> = Vec::new();
        for e in &entries {
            for m in [&e.leading, &e.trailing] {
                if !m.is_empty() && !break_markers.contains(m) {
                    break_markers.push(m.clone());
                }
            }
        }
        break_markers.sort_by(|a, b| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });
        Self {
            entries,
            break_markers,
        }
    }

    /// The default table with `overrides` replacing the entries of the morph
    /// types they name. Overrides naming an unknown morph type are skipped.
    pub fn with_overrides(overrides: &[MarkerSpec]) -> Self {
        let mut entries = DEFAULT_TABLE.entries.clone();
        for spec in overrides {
            let Some(morph_type) = MorphType::from_name(&spec.morph_type) else {
                warn!(morph_type = %spec.morph_type, "markers: unknown morph type in override, skipped");
                continue;
            };
            let entry = MarkerEntry {
                morph_type,
                leading: spec.leading.clone(),
                trailing: spec.trailing.clone(),
                priority: spec.priority,
            };
            match entries.iter_mut().find(|e| e.morph_type == morph_type) {
                Some(existing) => *existing = entry,
                None => entries.push(entry),
            }
        }
        Self::from_entries(entries)
    }

    pub fn entries(&self) -> &[MarkerEntry] {
        &self.entries
    }

    pub fn entry(&self, morph_type: MorphType) -> Option<&MarkerEntry> {
        self.entries.iter().find(|e| e.morph_type == morph_type)
    }

    /// Leading and trailing markers for a morph type ("" when unknown).
    pub fn markers_for(&self, morph_type: MorphType) -> (&str, &str) {
        match self.entry(morph_type) {
            Some(e) => (&e.leading, &e.trailing),
            None => ("", ""),
        }
    }

    /// Every distinct non-empty marker, longest first.
    pub fn break_markers(&self) -> &[String] {
        &self.break_markers
    }

    /// Length in chars of the longest marker starting at `chars[at..]`.
    pub fn marker_at(&self, chars: &[char], at: usize) -> Option<usize> {
        self.break_markers.iter().find_map(|m| {
            let len = m.chars().count();
            let fits = at + len <= chars.len() && m.chars().zip(&chars[at..]).all(|(a, b)| a == *b);
            fits.then_some(len)
        })
    }

    pub fn starts_with_marker(&self, text: &str) -> bool {
        self.break_markers.iter().any(|m| text.starts_with(m.as_str()))
    }

    pub fn ends_with_marker(&self, text: &str) -> bool {
        self.break_markers.iter().any(|m| text.ends_with(m.as_str()))
    }
}
