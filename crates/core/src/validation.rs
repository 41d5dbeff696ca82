//! Replays materialized validation patches.

use std::path::PathBuf;

use rand::rngs::StdRng;

use crate::error::DatasetResult;
use crate::patch::load_patch;
use crate::provider::{check_index, SampleProvider};
use crate::types::{Sample, SampleMode};

/// Fixed validation samples, one per patch file. No randomness.
#[derive(Debug, Clone)]
pub struct ValidationSampleProvider {
    patches: Vec<PathBuf>,
    mode: SampleMode,
}

impl ValidationSampleProvider {
    pub fn new(patches: Vec<PathBuf>, mode: SampleMode) -> Self {
        Self { patches, mode }
    }

    pub fn patches(&self) -> &[PathBuf] {
        &self.patches
    }
}

impl SampleProvider for ValidationSampleProvider {
    fn len(&self) -> usize {
        self.patches.len()
    }

    fn get(&self, index: usize, _rng: &mut StdRng) -> DatasetResult<Sample> {
        check_index(index, self.patches.len())?;
        load_patch(&self.patches[index])?.into_sample(self.mode)
    }
}
