//! Persisted outcome of one dataset preparation run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::atomic_write;
use crate::codec::StftParams;
use crate::error::{DatasetError, DatasetResult};
use crate::filelist::SplitMode;
use crate::types::{AudioTriple, TrainingSetEntry};

/// Hyperparameters that produced a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepareParams {
    pub sample_rate: u32,
    pub hop_length: usize,
    pub n_fft: usize,
    /// Validation patch width in frames
    pub crop_size: usize,
    pub offset: usize,
    pub split_mode: SplitMode,
    pub val_rate: f64,
    pub seed: u64,
}

impl Default for PrepareParams {
    fn default() -> Self {
        let stft = StftParams::default();
        Self {
            sample_rate: stft.sample_rate,
            hop_length: stft.hop_length,
            n_fft: stft.n_fft,
            crop_size: 256,
            offset: 0,
            split_mode: SplitMode::default(),
            val_rate: 0.2,
            seed: 2019,
        }
    }
}

impl PrepareParams {
    pub fn stft(&self) -> StftParams {
        StftParams {
            sample_rate: self.sample_rate,
            hop_length: self.hop_length,
            n_fft: self.n_fft,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub params: PrepareParams,
    pub training: Vec<TrainingSetEntry>,
    /// Validation patch files in tile order
    pub validation: Vec<PathBuf>,
    /// Source triples the validation patches were cut from
    pub validation_files: Vec<AudioTriple>,
}

impl DatasetManifest {
    /// Write as pretty JSON, atomically.
    pub fn save(&self, path: &Path) -> DatasetResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        atomic_write(path, json.as_bytes())
    }

    pub fn load(path: &Path) -> DatasetResult<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DatasetError::not_found(path),
            _ => DatasetError::Io(e),
        })?;
        Ok(serde_json::from_str(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest() -> DatasetManifest {
        DatasetManifest {
            params: PrepareParams {
                split_mode: SplitMode::Subdirs,
                offset: 32,
                ..Default::default()
            },
            training: vec![TrainingSetEntry {
                mixture: "cache/a.npy".into(),
                instrument: "cache/b.npy".into(),
                vocal: "cache/c.npy".into(),
                coefficient: 12.5,
            }],
            validation: vec!["patches/v_p0.npz".into(), "patches/v_p1.npz".into()],
            validation_files: vec![AudioTriple::new("m/v.wav", "i/v.wav", "p/v.wav")],
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("manifest.json");
        let manifest = sample_manifest();
        manifest.save(&path).unwrap();
        assert_eq!(DatasetManifest::load(&path).unwrap(), manifest);
    }

    #[test]
    fn test_json_layout() {
        let value = serde_json::to_value(sample_manifest()).unwrap();
        assert_eq!(value["params"]["split_mode"], "subdirs");
        assert_eq!(value["training"][0]["coefficient"], 12.5);
        assert_eq!(value["validation_files"][0][2], "p/v.wav");
    }

    #[test]
    fn test_load_missing() {
        assert!(matches!(
            DatasetManifest::load(Path::new("/no/such/manifest.json")).unwrap_err(),
            DatasetError::NotFound { .. }
        ));
    }

    #[test]
    fn test_stft_params_roundtrip() {
        let params = PrepareParams::default();
        assert_eq!(params.stft(), StftParams::default());
    }
}
