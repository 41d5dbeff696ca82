use std::path::PathBuf;

use ndarray::{concatenate, Array3, Axis};
use num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::error::DatasetResult;

/// Time-aligned mixture / instrument / vocal source files.
///
/// Serialized as a 3-element JSON array so explicit file lists stay
/// compatible with plain `[[mix, inst, vocal], ...]` manifests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[PathBuf; 3]", into = "[PathBuf; 3]")]
pub struct AudioTriple {
    pub mixture: PathBuf,
    pub instrument: PathBuf,
    pub vocal: PathBuf,
}

impl AudioTriple {
    pub fn new(
        mixture: impl Into<PathBuf>,
        instrument: impl Into<PathBuf>,
        vocal: impl Into<PathBuf>,
    ) -> Self {
        Self {
            mixture: mixture.into(),
            instrument: instrument.into(),
            vocal: vocal.into(),
        }
    }

    /// Mixture file stem, used to name validation patches.
    pub fn basename(&self) -> String {
        self.mixture
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "input".to_string())
    }
}

impl From<[PathBuf; 3]> for AudioTriple {
    fn from([mixture, instrument, vocal]: [PathBuf; 3]) -> Self {
        Self {
            mixture,
            instrument,
            vocal,
        }
    }
}

impl From<AudioTriple> for [PathBuf; 3] {
    fn from(t: AudioTriple) -> Self {
        [t.mixture, t.instrument, t.vocal]
    }
}

/// One training example: cache paths plus its normalization coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSetEntry {
    pub mixture: PathBuf,
    pub instrument: PathBuf,
    pub vocal: PathBuf,
    /// Peak magnitude across all three spectrograms (> 0)
    pub coefficient: f32,
}

/// Mixture / instrument / vocal spectrograms, each `[channels, bins, frames]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecTriple {
    pub mixture: Array3<Complex32>,
    pub instrument: Array3<Complex32>,
    pub vocal: Array3<Complex32>,
}

impl SpecTriple {
    /// Number of time frames.
    pub fn width(&self) -> usize {
        self.mixture.shape()[2]
    }

    /// Maximum absolute value across all three tensors.
    pub fn peak(&self) -> f32 {
        [&self.mixture, &self.instrument, &self.vocal]
            .iter()
            .flat_map(|a| a.iter())
            .fold(0.0f32, |acc, c| acc.max(c.norm()))
    }

    /// Divide all three tensors by `coefficient`.
    pub fn normalize(&mut self, coefficient: f32) {
        for a in [&mut self.mixture, &mut self.instrument, &mut self.vocal] {
            a.mapv_inplace(|c| c / coefficient);
        }
    }

    /// Convert into the model-facing sample representation.
    pub fn into_sample(self, mode: SampleMode) -> DatasetResult<Sample> {
        let target = concatenate(Axis(0), &[self.instrument.view(), self.vocal.view()])?;
        Ok(match mode {
            SampleMode::Complex => Sample::Complex {
                input: self.mixture,
                target,
            },
            SampleMode::Magnitude => Sample::Magnitude {
                input: self.mixture.mapv(|c| c.norm()),
                target: target.mapv(|c| c.norm()),
            },
        })
    }
}

/// Representation handed to the training loop, fixed per dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleMode {
    /// Complex mixture in, complex instrument+vocal out
    Complex,
    /// Magnitudes only
    #[default]
    Magnitude,
}

/// One `(input, target)` pair; target stacks instrument then vocal channels.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Complex {
        input: Array3<Complex32>,
        target: Array3<Complex32>,
    },
    Magnitude {
        input: Array3<f32>,
        target: Array3<f32>,
    },
}

impl Sample {
    pub fn input_shape(&self) -> &[usize] {
        match self {
            Sample::Complex { input, .. } => input.shape(),
            Sample::Magnitude { input, .. } => input.shape(),
        }
    }

    pub fn target_shape(&self) -> &[usize] {
        match self {
            Sample::Complex { target, .. } => target.shape(),
            Sample::Magnitude { target, .. } => target.shape(),
        }
    }

    /// Peak magnitude of the input tensor.
    pub fn input_peak(&self) -> f32 {
        match self {
            Sample::Complex { input, .. } => input.iter().fold(0.0f32, |m, c| m.max(c.norm())),
            Sample::Magnitude { input, .. } => input.iter().fold(0.0f32, |m, v| m.max(v.abs())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(shape: (usize, usize, usize), v: Complex32) -> Array3<Complex32> {
        Array3::from_elem(shape, v)
    }

    #[test]
    fn test_triple_serializes_as_array() {
        let t = AudioTriple::new("m/a.wav", "i/a.wav", "v/a.wav");
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, r#"["m/a.wav","i/a.wav","v/a.wav"]"#);
        let back: AudioTriple = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_basename() {
        let t = AudioTriple::new("/data/mixtures/song_01.flac", "x", "y");
        assert_eq!(t.basename(), "song_01");
    }

    #[test]
    fn test_peak_and_normalize() {
        let mut triple = SpecTriple {
            mixture: filled((2, 3, 4), Complex32::new(3.0, 4.0)),
            instrument: filled((2, 3, 4), Complex32::new(1.0, 0.0)),
            vocal: filled((2, 3, 4), Complex32::new(0.0, -2.0)),
        };
        assert!((triple.peak() - 5.0).abs() < 1e-6);
        triple.normalize(5.0);
        assert!((triple.peak() - 1.0).abs() < 1e-6);
        assert!((triple.vocal[[0, 0, 0]].im + 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_into_sample_complex() {
        let triple = SpecTriple {
            mixture: filled((2, 3, 4), Complex32::new(1.0, 1.0)),
            instrument: filled((2, 3, 4), Complex32::new(1.0, 0.0)),
            vocal: filled((2, 3, 4), Complex32::new(0.0, 1.0)),
        };
        let sample = triple.into_sample(SampleMode::Complex).unwrap();
        assert_eq!(sample.input_shape(), &[2, 3, 4]);
        assert_eq!(sample.target_shape(), &[4, 3, 4]);
        match sample {
            Sample::Complex { target, .. } => {
                assert_eq!(target[[1, 0, 0]], Complex32::new(1.0, 0.0));
                assert_eq!(target[[2, 0, 0]], Complex32::new(0.0, 1.0));
            }
            Sample::Magnitude { .. } => panic!("expected complex sample"),
        }
    }

    #[test]
    fn test_into_sample_magnitude() {
        let triple = SpecTriple {
            mixture: filled((1, 2, 2), Complex32::new(3.0, 4.0)),
            instrument: filled((1, 2, 2), Complex32::new(0.0, 2.0)),
            vocal: filled((1, 2, 2), Complex32::new(-1.0, 0.0)),
        };
        match triple.into_sample(SampleMode::Magnitude).unwrap() {
            Sample::Magnitude { input, target } => {
                assert!(input.iter().all(|v| (v - 5.0).abs() < 1e-6));
                assert_eq!(target.shape(), &[2, 2, 2]);
                assert!((target[[0, 0, 0]] - 2.0).abs() < 1e-6);
                assert!((target[[1, 0, 0]] - 1.0).abs() < 1e-6);
            }
            Sample::Complex { .. } => panic!("expected magnitude sample"),
        }
    }

    #[test]
    fn test_sample_mode_serde() {
        assert_eq!(serde_json::to_string(&SampleMode::Complex).unwrap(), "\"complex\"");
        assert_eq!(SampleMode::default(), SampleMode::Magnitude);
    }
}
