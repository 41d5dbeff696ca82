//! Spectrogram codec interface and normalization coefficient.
//!
//! The STFT itself lives outside this crate. A codec turns an
//! [`AudioTriple`] into three complex spectrograms plus the paths of their
//! on-disk caches. Caches are stored time-major (`[frames, channels, bins]`)
//! so that one row of the cache file is one time frame and a crop is a
//! contiguous row range.

use std::path::{Path, PathBuf};

use ndarray::{Array3, ArrayD, Ix3};
use num_complex::Complex32;
use serde::{Deserialize, Serialize};

use crate::array::{npy, ChunkedArrayStore, NpyStore};
use crate::error::{DatasetError, DatasetResult};
use crate::types::{AudioTriple, SpecTriple};

/// STFT hyperparameters that key the spectrogram cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StftParams {
    pub sample_rate: u32,
    pub hop_length: usize,
    pub n_fft: usize,
}

impl Default for StftParams {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            hop_length: 1024,
            n_fft: 2048,
        }
    }
}

impl StftParams {
    /// Cache subdirectory name, e.g. `sr44100_hl1024_nf2048`.
    pub fn cache_suffix(&self) -> String {
        format!("sr{}_hl{}_nf{}", self.sample_rate, self.hop_length, self.n_fft)
    }
}

/// Spectrograms for one triple together with their cache files.
#[derive(Debug, Clone)]
pub struct CachedTriple {
    pub spec: SpecTriple,
    pub mixture_cache: PathBuf,
    pub instrument_cache: PathBuf,
    pub vocal_cache: PathBuf,
}

/// External STFT collaborator.
pub trait SpectrogramCodec: Send + Sync {
    /// Backend name for display.
    fn name(&self) -> &str;

    /// Load (computing and caching first if needed) the spectrograms of
    /// `triple`, each shaped `[channels, bins, frames]`.
    fn cache_or_load(&self, triple: &AudioTriple, params: &StftParams)
        -> DatasetResult<CachedTriple>;
}

/// Peak magnitude across mixture, instrument and vocal.
///
/// Fails for an all-zero triple since dividing by the result must bound
/// the peak to exactly 1.0.
pub fn coefficient(spec: &SpecTriple, source: &Path) -> DatasetResult<f32> {
    let peak = spec.peak();
    if peak > 0.0 && peak.is_finite() {
        Ok(peak)
    } else {
        Err(DatasetError::Silent {
            path: source.to_path_buf(),
        })
    }
}

/// Convert time-major rows `[frames, channels, bins]` to `[channels, bins, frames]`.
pub fn frames_to_spec(rows: ArrayD<Complex32>, path: &Path) -> DatasetResult<Array3<Complex32>> {
    let rows = rows.into_dimensionality::<Ix3>().map_err(|_| {
        DatasetError::format(path, "cached spectrogram must have 3 dimensions")
    })?;
    Ok(rows.permuted_axes([1, 2, 0]).as_standard_layout().into_owned())
}

/// Write `spec` (`[channels, bins, frames]`) as a time-major cache file.
pub fn store_cache(path: &Path, spec: &Array3<Complex32>) -> DatasetResult<()> {
    let rows = spec
        .view()
        .permuted_axes([2, 0, 1])
        .as_standard_layout()
        .into_owned()
        .into_dyn();
    npy::write_npy(path, &rows)
}

/// Codec over caches produced ahead of time by an external STFT step.
///
/// Cache for `<dir>/<stem>.<ext>` is `<dir>/cache/<suffix>/<stem>.npy`.
/// A missing cache is reported as not found instead of being computed.
#[derive(Debug, Clone, Default)]
pub struct PrecomputedCodec {
    store: NpyStore,
}

impl PrecomputedCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache path for one source audio file.
    pub fn cache_path(source: &Path, params: &StftParams) -> PathBuf {
        let dir = source.parent().unwrap_or_else(|| Path::new("."));
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "input".to_string());
        dir.join("cache")
            .join(params.cache_suffix())
            .join(format!("{}.npy", stem))
    }

    fn load(&self, source: &Path, params: &StftParams) -> DatasetResult<(Array3<Complex32>, PathBuf)> {
        if !source.exists() {
            return Err(DatasetError::not_found(source));
        }
        let cache = Self::cache_path(source, params);
        let rows = self.store.read_all(&cache)?;
        Ok((frames_to_spec(rows, &cache)?, cache))
    }
}

impl SpectrogramCodec for PrecomputedCodec {
    fn name(&self) -> &str {
        "precomputed"
    }

    fn cache_or_load(&self, triple: &AudioTriple, params: &StftParams) -> DatasetResult<CachedTriple> {
        let (mixture, mixture_cache) = self.load(&triple.mixture, params)?;
        let (instrument, instrument_cache) = self.load(&triple.instrument, params)?;
        let (vocal, vocal_cache) = self.load(&triple.vocal, params)?;

        if mixture.shape() != instrument.shape() || mixture.shape() != vocal.shape() {
            return Err(DatasetError::format(
                &mixture_cache,
                format!(
                    "spectrogram shapes differ: mixture {:?}, instrument {:?}, vocal {:?}",
                    mixture.shape(),
                    instrument.shape(),
                    vocal.shape()
                ),
            ));
        }
        log::debug!(
            "Loaded cached spectrograms for {} ({:?})",
            triple.mixture.display(),
            mixture.shape()
        );

        Ok(CachedTriple {
            spec: SpecTriple {
                mixture,
                instrument,
                vocal,
            },
            mixture_cache,
            instrument_cache,
            vocal_cache,
        })
    }
}
