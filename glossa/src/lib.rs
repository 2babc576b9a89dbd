//! glossa crate root
//!
//! Morpheme-break editing on top of `glossa-core`: the marker table, the form
//! classifier and segmenter that turn a typed morpheme line into classified
//! slots, and `SandboxSession`, which loads an occurrence into a staging cache,
//! applies edits and commits the result.
//!
//! Public API exported here:
//! - `MarkerTable` from `markers`
//! - `FormClassifier` and `ClassifyWarning` from `classify`
//! - `Segmenter` and `Segmentation` from `segmenter`
//! - `SandboxSession` and `EditOutcome` from `session`
//! - `GlossaConfig` from `config`

pub mod classify;
pub mod config;
pub mod loader;
pub mod markers;
pub mod segmenter;
pub mod session;

pub use classify::{Classification, ClassifyWarning, FormClassifier};
pub use config::GlossaConfig;
pub use loader::Loader;
pub use markers::{MarkerEntry, MarkerSpec, MarkerTable};
pub use segmenter::{SegmentedMorph, Segmentation, Segmenter};
pub use session::{EditOutcome, SandboxSession};

// Core types callers need alongside a session.
pub use glossa_core::{
    AnalysisRef, Config, Evaluation, GlossaError, GlossaResult, LinguisticStore, MorphType,
    ObjId, Record, RecordStore, StagingCache, WsId,
};
