//! Training data pipeline for a vocal/instrument separation model.
//!
//! Raw mixture / instrument / vocal recordings are paired into triples,
//! turned into cached spectrograms by an external codec, and served as
//! random augmented crops for training or as fixed on-disk patches for
//! validation.

pub mod array;
pub mod augment;
pub mod cache;
pub mod codec;
pub mod error;
pub mod filelist;
pub mod manifest;
pub mod patch;
pub mod provider;
pub mod training;
pub mod types;
pub mod validation;

pub use error::{DatasetError, DatasetResult};
pub use provider::{worker_rng, SampleProvider};
pub use types::{AudioTriple, Sample, SampleMode, SpecTriple, TrainingSetEntry};
