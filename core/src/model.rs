//! Persisted record model.
//!
//! These are the shapes the store hands back to the engine. Ownership is
//! expressed by id: a Wordform lists its Analyses, an Analysis lists its
//! MorphBundles (in morpheme order) and Glosses, an Entry lists its
//! Allomorphs and Senses.

use crate::ids::{ObjId, WsId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Text with one alternative per writing system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiString(BTreeMap<WsId, String>);

impl MultiString {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build a multistring holding a single alternative.
    pub fn from_text<T: Into<String>>(ws: WsId, text: T) -> Self {
        let mut ms = Self::new();
        ms.set(ws, text);
        ms
    }

    /// Get the alternative for `ws`; missing alternatives read as "".
    pub fn get(&self, ws: WsId) -> &str {
        self.0.get(&ws).map(String::as_str).unwrap_or("")
    }

    /// Set the alternative for `ws`. Setting "" removes it.
    pub fn set<T: Into<String>>(&mut self, ws: WsId, text: T) {
        let text = text.into();
        if text.is_empty() {
            self.0.remove(&ws);
        } else {
            self.0.insert(ws, text);
        }
    }

    /// True if every alternative is empty after trimming.
    pub fn is_blank(&self) -> bool {
        self.0.values().all(|s| s.trim().is_empty())
    }

    /// True if the alternatives in `wss` are all blank.
    pub fn is_blank_in(&self, wss: &[WsId]) -> bool {
        wss.iter().all(|ws| self.get(*ws).trim().is_empty())
    }

    /// Compare the alternatives for `wss`, treating missing as "".
    pub fn alternatives_equal(&self, other: &MultiString, wss: &[WsId]) -> bool {
        wss.iter().all(|ws| self.get(*ws) == other.get(*ws))
    }

    pub fn iter(&self) -> impl Iterator<Item = (WsId, &str)> {
        self.0.iter().map(|(ws, s)| (*ws, s.as_str()))
    }
}

/// Kind of morpheme an allomorph or staged slot represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MorphType {
    Stem,
    Root,
    BoundStem,
    BoundRoot,
    Prefix,
    Suffix,
    Infix,
    Proclitic,
    Enclitic,
    Clitic,
    Particle,
    Phrase,
    Simulfix,
    Suprafix,
    PrefixingInterfix,
    SuffixingInterfix,
    InfixingInterfix,
}

impl MorphType {
    pub const ALL: [MorphType; 17] = [
        MorphType::Stem,
        MorphType::Root,
        MorphType::BoundStem,
        MorphType::BoundRoot,
        MorphType::Prefix,
        MorphType::Suffix,
        MorphType::Infix,
        MorphType::Proclitic,
        MorphType::Enclitic,
        MorphType::Clitic,
        MorphType::Particle,
        MorphType::Phrase,
        MorphType::Simulfix,
        MorphType::Suprafix,
        MorphType::PrefixingInterfix,
        MorphType::SuffixingInterfix,
        MorphType::InfixingInterfix,
    ];

    /// Stable lowercase name, used as the key of marker tables and config files.
    pub fn name(self) -> &'static str {
        match self {
            MorphType::Stem => "stem",
            MorphType::Root => "root",
            MorphType::BoundStem => "bound stem",
            MorphType::BoundRoot => "bound root",
            MorphType::Prefix => "prefix",
            MorphType::Suffix => "suffix",
            MorphType::Infix => "infix",
            MorphType::Proclitic => "proclitic",
            MorphType::Enclitic => "enclitic",
            MorphType::Clitic => "clitic",
            MorphType::Particle => "particle",
            MorphType::Phrase => "phrase",
            MorphType::Simulfix => "simulfix",
            MorphType::Suprafix => "suprafix",
            MorphType::PrefixingInterfix => "prefixing interfix",
            MorphType::SuffixingInterfix => "suffixing interfix",
            MorphType::InfixingInterfix => "infixing interfix",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name().eq_ignore_ascii_case(name))
    }

    /// True for the free-standing kinds (no affixal attachment).
    pub fn is_stem_like(self) -> bool {
        matches!(
            self,
            MorphType::Stem
                | MorphType::Root
                | MorphType::BoundStem
                | MorphType::BoundRoot
                | MorphType::Clitic
                | MorphType::Particle
                | MorphType::Phrase
        )
    }

    /// Morph types an allomorph may carry to count as a lookup hit for a
    /// segment classified as `self`.
    pub fn compatible_types(self) -> &'static [MorphType] {
        use MorphType::*;
        match self {
            Stem | Root | BoundStem | BoundRoot | Clitic | Particle | Phrase => {
                &[Stem, Root, BoundStem, BoundRoot, Clitic, Particle, Phrase]
            }
            Prefix | PrefixingInterfix => &[Prefix, PrefixingInterfix],
            Suffix | SuffixingInterfix => &[Suffix, SuffixingInterfix],
            Infix | InfixingInterfix => &[Infix, InfixingInterfix],
            Proclitic => &[Proclitic, Clitic],
            Enclitic => &[Enclitic, Clitic],
            Simulfix => &[Simulfix],
            Suprafix => &[Suprafix],
        }
    }
}

/// Whether a human has judged an analysis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evaluation {
    #[default]
    Unevaluated,
    HumanApproved,
    HumanDisapproved,
}

impl Evaluation {
    pub fn is_human(self) -> bool {
        !matches!(self, Evaluation::Unevaluated)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wordform {
    pub form: MultiString,
    pub analyses: Vec<ObjId>,
    /// Cached parser re-evaluation checksum; cleared when an analysis changes.
    pub checksum: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub owner: ObjId,
    pub category: Option<ObjId>,
    pub bundles: Vec<ObjId>,
    pub glosses: Vec<ObjId>,
    pub evaluation: Evaluation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MorphBundle {
    pub owner: ObjId,
    pub morph: Option<ObjId>,
    pub sense: Option<ObjId>,
    pub msa: Option<ObjId>,
    /// Literal form, only meaningful while `morph` is unset.
    pub form: MultiString,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gloss {
    pub owner: ObjId,
    pub text: MultiString,
    /// Number of text occurrences that currently point at this gloss.
    pub referrers: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub citation: MultiString,
    pub allomorphs: Vec<ObjId>,
    pub senses: Vec<ObjId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allomorph {
    pub owner: ObjId,
    pub form: MultiString,
    pub morph_type: MorphType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sense {
    pub owner: ObjId,
    pub gloss: MultiString,
    pub msa: Option<ObjId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Msa {
    pub owner: ObjId,
    pub part_of_speech: Option<ObjId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartOfSpeech {
    pub name: MultiString,
    pub abbreviation: MultiString,
}

/// Any persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    Wordform(Wordform),
    Analysis(Analysis),
    MorphBundle(MorphBundle),
    Gloss(Gloss),
    Entry(Entry),
    Allomorph(Allomorph),
    Sense(Sense),
    Msa(Msa),
    PartOfSpeech(PartOfSpeech),
}

impl Record {
    pub fn kind(&self) -> &'static str {
        match self {
            Record::Wordform(_) => "wordform",
            Record::Analysis(_) => "analysis",
            Record::MorphBundle(_) => "morph bundle",
            Record::Gloss(_) => "gloss",
            Record::Entry(_) => "entry",
            Record::Allomorph(_) => "allomorph",
            Record::Sense(_) => "sense",
            Record::Msa(_) => "msa",
            Record::PartOfSpeech(_) => "part of speech",
        }
    }

    /// Owning object, if the record is owned.
    pub fn owner(&self) -> Option<ObjId> {
        match self {
            Record::Analysis(a) => Some(a.owner),
            Record::MorphBundle(b) => Some(b.owner),
            Record::Gloss(g) => Some(g.owner),
            Record::Allomorph(a) => Some(a.owner),
            Record::Sense(s) => Some(s.owner),
            Record::Msa(m) => Some(m.owner),
            Record::Wordform(_) | Record::Entry(_) | Record::PartOfSpeech(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EN: WsId = WsId(1);
    const FR: WsId = WsId(2);

    #[test]
    fn multistring_missing_reads_empty() {
        let ms = MultiString::from_text(EN, "dog");
        assert_eq!(ms.get(EN), "dog");
        assert_eq!(ms.get(FR), "");
    }

    #[test]
    fn multistring_set_empty_removes() {
        let mut ms = MultiString::from_text(EN, "dog");
        ms.set(EN, "");
        assert!(ms.is_blank());
        assert_eq!(ms.iter().count(), 0);
    }

    #[test]
    fn multistring_alternatives_equal_only_checks_listed() {
        let mut a = MultiString::from_text(EN, "dog");
        a.set(FR, "chien");
        let b = MultiString::from_text(EN, "dog");
        assert!(a.alternatives_equal(&b, &[EN]));
        assert!(!a.alternatives_equal(&b, &[EN, FR]));
    }

    #[test]
    fn morph_type_names_roundtrip() {
        for t in MorphType::ALL {
            assert_eq!(MorphType::from_name(t.name()), Some(t));
        }
        assert_eq!(MorphType::from_name("Bound Root"), Some(MorphType::BoundRoot));
        assert_eq!(MorphType::from_name("nonsense"), None);
    }

    #[test]
    fn suffix_is_not_compatible_with_prefix() {
        assert!(MorphType::Suffix.compatible_types().contains(&MorphType::Suffix));
        assert!(!MorphType::Suffix.compatible_types().contains(&MorphType::Prefix));
        assert!(MorphType::Stem.compatible_types().contains(&MorphType::Root));
    }
}
