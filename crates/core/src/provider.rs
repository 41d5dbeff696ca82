//! Indexed sample sources shared by training and validation.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{DatasetError, DatasetResult};
use crate::types::Sample;

/// Random-access source of `(input, target)` samples.
///
/// Providers are immutable once built; randomness comes only from the
/// generator the caller passes in, so several workers can share one
/// provider as long as each owns its generator.
pub trait SampleProvider: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Produce sample `index`. Deterministic providers ignore `rng`.
    fn get(&self, index: usize, rng: &mut StdRng) -> DatasetResult<Sample>;
}

/// Check `index` against `len`.
pub(crate) fn check_index(index: usize, len: usize) -> DatasetResult<()> {
    if index < len {
        Ok(())
    } else {
        Err(DatasetError::IndexOutOfRange { index, len })
    }
}

/// Deterministic generator for data-loading worker `worker`.
///
/// Distinct workers under the same seed get decorrelated streams.
pub fn worker_rng(seed: u64, worker: usize) -> StdRng {
    // splitmix64 finalizer
    let mut z = seed.wrapping_add((worker as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    StdRng::seed_from_u64(z ^ (z >> 31))
}
