//! Spectrogram augmentation: vocal-bleed suppression, channel swap,
//! instrument-only override and mixup.
//!
//! Every transform is a pure function of its inputs and the caller's
//! generator; nothing here holds state between samples.

use ndarray::{s, Array3, ErrorKind, ShapeError, Zip};
use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, DatasetResult};
use crate::types::SpecTriple;

/// Probability of swapping left/right channels.
pub const CHANNEL_SWAP_PROBABILITY: f64 = 0.5;

/// Probability of turning a sample into an instrument-only example.
pub const INSTRUMENT_ONLY_PROBABILITY: f64 = 0.01;

/// Augmentation hyperparameters for the training provider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AugmentConfig {
    /// Probability of applying vocal-bleed suppression to the instrument
    pub reduction_rate: f64,
    /// Strength of the suppression
    pub reduction_weight: f32,
    /// Probability of blending with a second random sample
    pub mixup_rate: f64,
    /// Beta(alpha, alpha) shape for the mixup weight
    pub mixup_alpha: f64,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            reduction_rate: 0.0,
            reduction_weight: 0.2,
            mixup_rate: 0.0,
            mixup_alpha: 1.0,
        }
    }
}

impl AugmentConfig {
    pub fn validate(&self) -> DatasetResult<()> {
        for (name, p) in [
            ("reduction_rate", self.reduction_rate),
            ("mixup_rate", self.mixup_rate),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(DatasetError::Configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, p
                )));
            }
        }
        if !(self.reduction_weight >= 0.0) {
            return Err(DatasetError::Configuration(format!(
                "reduction_weight must be non-negative, got {}",
                self.reduction_weight
            )));
        }
        if self.mixup_rate > 0.0 && !(self.mixup_alpha > 0.0) {
            return Err(DatasetError::Configuration(format!(
                "mixup_alpha must be positive, got {}",
                self.mixup_alpha
            )));
        }
        Ok(())
    }
}

/// Remove residual vocal energy bleeding into an instrument track.
///
/// The residual is `max(|mixture| - |instrument|, 0)`; the instrument
/// magnitude is reduced by `weight * residual`, floored at zero, and the
/// instrument phase is kept.
pub fn reduce_vocal_bleed(
    mixture: &Array3<Complex32>,
    instrument: &Array3<Complex32>,
    weight: f32,
) -> Array3<Complex32> {
    Zip::from(mixture)
        .and(instrument)
        .map_collect(|x, y| {
            let y_mag = y.norm();
            let residual = (x.norm() - y_mag).max(0.0);
            let suppressed = (y_mag - weight * residual).max(0.0);
            Complex32::from_polar(suppressed, y.arg())
        })
}

/// Reverse the channel axis (stereo swap). Applying it twice is a no-op.
pub fn flip_channels(a: &Array3<Complex32>) -> Array3<Complex32> {
    a.slice(s![..;-1, .., ..]).to_owned()
}

/// Apply the per-sample stochastic augmentation, in order:
/// vocal-bleed suppression, channel swap, instrument-only override.
pub fn augment(mut triple: SpecTriple, config: &AugmentConfig, rng: &mut StdRng) -> SpecTriple {
    if rng.gen::<f64>() < config.reduction_rate {
        triple.instrument =
            reduce_vocal_bleed(&triple.mixture, &triple.instrument, config.reduction_weight);
    }

    if rng.gen::<f64>() < CHANNEL_SWAP_PROBABILITY {
        triple.mixture = flip_channels(&triple.mixture);
        triple.instrument = flip_channels(&triple.instrument);
        triple.vocal = flip_channels(&triple.vocal);
    }

    if rng.gen::<f64>() < INSTRUMENT_ONLY_PROBABILITY {
        triple.mixture = triple.instrument.clone();
        triple.vocal = Array3::zeros(triple.instrument.raw_dim());
    }

    triple
}

/// Draw a mixup weight from Beta(alpha, alpha).
pub fn mixup_lambda(alpha: f64, rng: &mut StdRng) -> DatasetResult<f32> {
    let beta = Beta::new(alpha, alpha).map_err(|e| {
        DatasetError::Configuration(format!("invalid mixup alpha {}: {}", alpha, e))
    })?;
    Ok(beta.sample(rng) as f32)
}

/// Blend in place: `primary = lambda * primary + (1 - lambda) * secondary`.
pub fn blend(primary: &mut SpecTriple, secondary: &SpecTriple, lambda: f32) -> DatasetResult<()> {
    let pairs = [
        (&mut primary.mixture, &secondary.mixture),
        (&mut primary.instrument, &secondary.instrument),
        (&mut primary.vocal, &secondary.vocal),
    ];
    if pairs.iter().any(|(a, b)| a.shape() != b.shape()) {
        return Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into());
    }
    for (a, b) in pairs {
        Zip::from(a).and(b).for_each(|x, &y| {
            *x = *x * lambda + y * (1.0 - lambda);
        });
    }
    Ok(())
}
