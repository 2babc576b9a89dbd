//! Form classifier: recover the morph type and bare form of a segment.

use crate::markers::MarkerTable;
use glossa_core::utils::normalize;
use glossa_core::{MorphInput, MorphType};
use serde::Serialize;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub bare: String,
    pub morph_type: MorphType,
    pub prefix: String,
    pub suffix: String,
}

impl Classification {
    fn fallback(text: &str) -> Self {
        Self {
            bare: normalize(text),
            morph_type: MorphType::Stem,
            prefix: String::new(),
            suffix: String::new(),
        }
    }

    pub fn into_input(self) -> MorphInput {
        MorphInput {
            prefix: self.prefix,
            bare: self.bare,
            suffix: self.suffix,
            morph_type: self.morph_type,
        }
    }
}

/// Why a segment fell back to a plain stem. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ClassifyWarning {
    /// Several morph types match equally well.
    Ambiguous {
        text: String,
        candidates: Vec<MorphType>,
    },
    /// Markers remain on the form after stripping the best match.
    UnresolvedMarkers { text: String },
    /// Segment repair hit its iteration limit.
    NotConverged { text: String },
}

impl fmt::Display for ClassifyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifyWarning::Ambiguous { text, candidates } => {
                let names: Vec<&str> = candidates.iter().map(|t| t.name()).collect();
                write!(f, "'{}' is ambiguous between {}", text, names.join(", "))
            }
            ClassifyWarning::UnresolvedMarkers { text } => {
                write!(f, "'{}' has markers that match no morph type", text)
            }
            ClassifyWarning::NotConverged { text } => {
                write!(f, "could not separate the markers in '{}'", text)
            }
        }
    }
}

pub struct FormClassifier<'a> {
    markers: &'a MarkerTable,
}

impl<'a> FormClassifier<'a> {
    pub fn new(markers: &'a MarkerTable) -> Self {
        Self { markers }
    }

    /// Strip the longest matching leading and trailing markers from `text`.
    ///
    /// Among entries whose markers fit and leave a non-empty form, the one
    /// stripping the most characters wins, then the lowest priority value.
    /// A remaining tie, or markers left over on the form, falls back to a
    /// stem with the whole text as its form and returns a warning.
    pub fn classify(&self, text: &str) -> (Classification, Option<ClassifyWarning>) {
        let text = text.trim();
        if text.is_empty() {
            return (Classification::fallback(""), None);
        }

        let mut best: Vec<(usize, u8, MorphType, &str, &str)> = Vec::new();
        for e in self.markers.entries() {
            let (lead, trail) = (e.leading.as_str(), e.trailing.as_str());
            if !text.starts_with(lead) || !text.ends_with(trail) {
                continue;
            }
            if text.len() < lead.len() + trail.len() {
                continue;
            }
            let bare = &text[lead.len()..text.len() - trail.len()];
            if bare.trim().is_empty() {
                continue;
            }
            let score = lead.chars().count() + trail.chars().count();
            let candidate = (score, e.priority, e.morph_type, lead, trail);
            match best.first().map(|c| (c.0, c.1)) {
                Some(current) if current == (score, e.priority) => best.push(candidate),
                Some((s, p)) if s > score || (s == score && p < e.priority) => {}
                _ => {
                    best.clear();
                    best.push(candidate);
                }
            }
        }

        let (_, _, morph_type, lead, trail) = match best.as_slice() {
            [] => {
                let warning = ClassifyWarning::UnresolvedMarkers {
                    text: text.to_string(),
                };
                warn!(%warning, "classify: falling back to stem");
                return (Classification::fallback(text), Some(warning));
            }
            [only] => *only,
            many => {
                let warning = ClassifyWarning::Ambiguous {
                    text: text.to_string(),
                    candidates: many.iter().map(|c| c.2).collect(),
                };
                warn!(%warning, "classify: falling back to stem");
                return (Classification::fallback(text), Some(warning));
            }
        };

        let bare = &text[lead.len()..text.len() - trail.len()];
        if self.markers.starts_with_marker(bare) || self.markers.ends_with_marker(bare) {
            let warning = ClassifyWarning::UnresolvedMarkers {
                text: text.to_string(),
            };
            warn!(%warning, "classify: falling back to stem");
            return (Classification::fallback(text), Some(warning));
        }

        let bare = normalize(bare);
        let morph_type = if morph_type == MorphType::Stem && bare.contains(char::is_whitespace) {
            MorphType::Phrase
        } else {
            morph_type
        };
        (
            Classification {
                bare,
                morph_type,
                prefix: lead.to_string(),
                suffix: trail.to_string(),
            },
            None,
        )
    }
}
