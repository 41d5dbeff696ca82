//! Training set construction and the random-crop training provider.

use std::path::Path;

use ndarray::Array3;
use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::Rng;

use crate::array::{ChunkedArrayStore, NpyStore};
use crate::augment::{augment, blend, mixup_lambda, AugmentConfig};
use crate::codec::{coefficient, frames_to_spec, SpectrogramCodec, StftParams};
use crate::error::{DatasetError, DatasetResult};
use crate::provider::{check_index, SampleProvider};
use crate::types::{AudioTriple, Sample, SampleMode, SpecTriple, TrainingSetEntry};

/// Run the codec over `filelist`, recording cache paths and coefficients.
pub fn make_training_set(
    filelist: &[AudioTriple],
    codec: &dyn SpectrogramCodec,
    params: &StftParams,
) -> DatasetResult<Vec<TrainingSetEntry>> {
    let mut entries = Vec::with_capacity(filelist.len());
    for (i, triple) in filelist.iter().enumerate() {
        log::info!(
            "Training set [{}/{}]: {}",
            i + 1,
            filelist.len(),
            triple.mixture.display()
        );
        let cached = codec.cache_or_load(triple, params)?;
        let coefficient = coefficient(&cached.spec, &triple.mixture)?;
        entries.push(TrainingSetEntry {
            mixture: cached.mixture_cache,
            instrument: cached.instrument_cache,
            vocal: cached.vocal_cache,
            coefficient,
        });
    }
    Ok(entries)
}

/// Random crops of cached spectrograms with on-the-fly augmentation.
///
/// Only the cropped rows of each cache file are read.
pub struct TrainingSampleProvider<S: ChunkedArrayStore = NpyStore> {
    entries: Vec<TrainingSetEntry>,
    crop_size: usize,
    augment: AugmentConfig,
    mode: SampleMode,
    store: S,
}

impl TrainingSampleProvider<NpyStore> {
    pub fn new(
        entries: Vec<TrainingSetEntry>,
        crop_size: usize,
        augment: AugmentConfig,
        mode: SampleMode,
    ) -> DatasetResult<Self> {
        Self::with_store(NpyStore, entries, crop_size, augment, mode)
    }
}

impl<S: ChunkedArrayStore> TrainingSampleProvider<S> {
    pub fn with_store(
        store: S,
        entries: Vec<TrainingSetEntry>,
        crop_size: usize,
        augment: AugmentConfig,
        mode: SampleMode,
    ) -> DatasetResult<Self> {
        if crop_size == 0 {
            return Err(DatasetError::Configuration(
                "training crop size must be positive".to_string(),
            ));
        }
        augment.validate()?;
        Ok(Self {
            entries,
            crop_size,
            augment,
            mode,
            store,
        })
    }

    pub fn entries(&self) -> &[TrainingSetEntry] {
        &self.entries
    }

    pub fn crop_size(&self) -> usize {
        self.crop_size
    }

    fn read_window(&self, path: &Path, start: usize) -> DatasetResult<Array3<Complex32>> {
        let rows = self.store.read_rows(path, start, self.crop_size)?;
        frames_to_spec(rows, path)
    }

    /// Crop, normalize and augment one entry.
    fn load_augmented(&self, entry: &TrainingSetEntry, rng: &mut StdRng) -> DatasetResult<SpecTriple> {
        let shape = self.store.shape_of(&entry.mixture)?;
        let rows = shape
            .first()
            .copied()
            .ok_or_else(|| DatasetError::format(&entry.mixture, "cached spectrogram is a scalar"))?;
        if rows < self.crop_size {
            return Err(DatasetError::CropOutOfRange {
                path: entry.mixture.clone(),
                rows,
                start: 0,
                count: self.crop_size,
            });
        }

        let start = rng.gen_range(0..=rows - self.crop_size);
        log::debug!(
            "Crop {}..{} of {}",
            start,
            start + self.crop_size,
            entry.mixture.display()
        );
        let mut triple = SpecTriple {
            mixture: self.read_window(&entry.mixture, start)?,
            instrument: self.read_window(&entry.instrument, start)?,
            vocal: self.read_window(&entry.vocal, start)?,
        };
        triple.normalize(entry.coefficient);
        Ok(augment(triple, &self.augment, rng))
    }
}

impl<S: ChunkedArrayStore> SampleProvider for TrainingSampleProvider<S> {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, index: usize, rng: &mut StdRng) -> DatasetResult<Sample> {
        check_index(index, self.entries.len())?;
        let mut triple = self.load_augmented(&self.entries[index], rng)?;

        if rng.gen::<f64>() < self.augment.mixup_rate {
            let other = rng.gen_range(0..self.entries.len());
            let secondary = self.load_augmented(&self.entries[other], rng)?;
            let lambda = mixup_lambda(self.augment.mixup_alpha, rng)?;
            blend(&mut triple, &secondary, lambda)?;
        }

        triple.into_sample(self.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::write_source_triple;
    use crate::codec::PrecomputedCodec;
    use ndarray::{s, ArrayD};
    use rand::SeedableRng;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// NpyStore that records every row window it serves.
    #[derive(Default)]
    struct RecordingStore {
        windows: Mutex<Vec<(PathBuf, usize, usize)>>,
    }

    impl ChunkedArrayStore for RecordingStore {
        fn shape_of(&self, path: &Path) -> DatasetResult<Vec<usize>> {
            NpyStore.shape_of(path)
        }

        fn read_rows(&self, path: &Path, start: usize, count: usize) -> DatasetResult<ArrayD<Complex32>> {
            self.windows.lock().unwrap().push((path.to_path_buf(), start, count));
            NpyStore.read_rows(path, start, count)
        }

        fn read_all(&self, _path: &Path) -> DatasetResult<ArrayD<Complex32>> {
            panic!("training provider must not read whole files");
        }
    }

    fn fixture(frames: &[usize]) -> (tempfile::TempDir, Vec<AudioTriple>, Vec<TrainingSetEntry>) {
        let dir = tempfile::tempdir().unwrap();
        let params = StftParams::default();
        let triples: Vec<_> = frames
            .iter()
            .enumerate()
            .map(|(i, &t)| write_source_triple(dir.path(), "", &format!("song{}", i), (2, 6, t), &params))
            .collect();
        let entries = make_training_set(&triples, &PrecomputedCodec::new(), &params).unwrap();
        (dir, triples, entries)
    }

    #[test]
    fn test_make_training_set_records_caches() {
        let (_dir, triples, entries) = fixture(&[30, 40]);
        assert_eq!(entries.len(), 2);
        let params = StftParams::default();
        assert_eq!(entries[1].vocal, PrecomputedCodec::cache_path(&triples[1].vocal, &params));
        let full = PrecomputedCodec::new().cache_or_load(&triples[0], &params).unwrap();
        assert_eq!(entries[0].coefficient, full.spec.peak());
    }

    #[test]
    fn test_crop_matches_normalized_window() {
        let (_dir, triples, entries) = fixture(&[50]);
        let full = PrecomputedCodec::new()
            .cache_or_load(&triples[0], &StftParams::default())
            .unwrap()
            .spec;
        let coef = entries[0].coefficient;
        let provider = TrainingSampleProvider::with_store(
            RecordingStore::default(),
            entries,
            16,
            AugmentConfig::default(),
            SampleMode::Complex,
        )
        .unwrap();

        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let sample = provider.get(0, &mut rng).unwrap();
            let (path, start, count) = provider.store.windows.lock().unwrap().last().cloned().unwrap();
            assert_eq!(path, provider.entries()[0].vocal);
            assert_eq!(count, 16);
            assert!(start + count <= 50);

            let expected = full.mixture.slice(s![.., .., start..start + 16]).mapv(|c| c / coef);
            let Sample::Complex { input, target } = sample else {
                panic!("expected complex sample");
            };
            assert_eq!(target.shape(), &[4, 6, 16]);
            let flipped = expected.slice(s![..;-1, .., ..]).to_owned();
            let instrument_only = target.slice(s![..2, .., ..]).to_owned();
            assert!(input == expected || input == flipped || input == instrument_only);
        }
    }

    #[test]
    fn test_crop_start_covers_both_edges() {
        let (_dir, _triples, entries) = fixture(&[20]);
        let provider = TrainingSampleProvider::with_store(
            RecordingStore::default(),
            entries,
            18,
            AugmentConfig::default(),
            SampleMode::Magnitude,
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..60 {
            provider.get(0, &mut rng).unwrap();
        }
        let starts: Vec<usize> = provider.store.windows.lock().unwrap().iter().map(|w| w.1).collect();
        assert!(starts.iter().all(|&s| s <= 2));
        assert!(starts.contains(&0));
        assert!(starts.contains(&2));
    }

    #[test]
    fn test_magnitude_samples_are_bounded() {
        let (_dir, _triples, entries) = fixture(&[40, 33, 64]);
        let config = AugmentConfig {
            reduction_rate: 0.5,
            mixup_rate: 1.0,
            mixup_alpha: 0.4,
            ..Default::default()
        };
        let provider = TrainingSampleProvider::new(entries, 32, config, SampleMode::Magnitude).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        for i in 0..provider.len() {
            let sample = provider.get(i, &mut rng).unwrap();
            assert_eq!(sample.input_shape(), &[2, 6, 32]);
            assert_eq!(sample.target_shape(), &[4, 6, 32]);
            assert!(sample.input_peak() <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn test_mixup_blends_two_crops() {
        let (_dir, triples, entries) = fixture(&[64]);
        let full = PrecomputedCodec::new()
            .cache_or_load(&triples[0], &StftParams::default())
            .unwrap()
            .spec;
        let coef = entries[0].coefficient;
        let config = AugmentConfig {
            mixup_rate: 1.0,
            mixup_alpha: 0.4,
            ..Default::default()
        };
        let provider = TrainingSampleProvider::with_store(
            RecordingStore::default(),
            entries,
            8,
            config,
            SampleMode::Complex,
        )
        .unwrap();
        let window = |start: usize| {
            let mut t = SpecTriple {
                mixture: full.mixture.slice(s![.., .., start..start + 8]).to_owned(),
                instrument: full.instrument.slice(s![.., .., start..start + 8]).to_owned(),
                vocal: full.vocal.slice(s![.., .., start..start + 8]).to_owned(),
            };
            t.normalize(coef);
            t
        };

        let mut differs_from_primary = false;
        for seed in 0..10 {
            let sample = provider.get(0, &mut StdRng::seed_from_u64(seed)).unwrap();

            let windows: Vec<usize> = provider.store.windows.lock().unwrap().drain(..).map(|w| w.1).collect();
            assert_eq!(windows.len(), 6, "two crops of three tensors each");

            // Same draws in the same order as the provider
            let mut replay = StdRng::seed_from_u64(seed);
            let first = replay.gen_range(0..=64 - 8);
            let primary = augment(window(first), &config, &mut replay);
            assert!(replay.gen::<f64>() < config.mixup_rate);
            assert_eq!(replay.gen_range(0..1usize), 0);
            let second = replay.gen_range(0..=64 - 8);
            let secondary = augment(window(second), &config, &mut replay);
            let lambda = mixup_lambda(config.mixup_alpha, &mut replay).unwrap();
            assert_eq!(windows, vec![first, first, first, second, second, second]);

            let unmixed = primary.clone().into_sample(SampleMode::Complex).unwrap();
            let mut expected = primary;
            blend(&mut expected, &secondary, lambda).unwrap();
            assert_eq!(sample, expected.into_sample(SampleMode::Complex).unwrap());
            differs_from_primary |= sample != unmixed;
        }
        assert!(differs_from_primary);
    }

    #[test]
    fn test_same_seed_same_sample() {
        let (_dir, _triples, entries) = fixture(&[40, 48]);
        let config = AugmentConfig {
            mixup_rate: 0.5,
            ..Default::default()
        };
        let provider = TrainingSampleProvider::new(entries, 8, config, SampleMode::Complex).unwrap();
        let a = provider.get(1, &mut StdRng::seed_from_u64(99)).unwrap();
        let b = provider.get(1, &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_crop_larger_than_cache() {
        let (_dir, _triples, entries) = fixture(&[10]);
        let provider =
            TrainingSampleProvider::new(entries, 16, AugmentConfig::default(), SampleMode::Magnitude).unwrap();
        let err = provider.get(0, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, DatasetError::CropOutOfRange { rows: 10, count: 16, .. }));
    }

    #[test]
    fn test_index_out_of_range() {
        let (_dir, _triples, entries) = fixture(&[20]);
        let provider =
            TrainingSampleProvider::new(entries, 8, AugmentConfig::default(), SampleMode::Magnitude).unwrap();
        assert!(matches!(
            provider.get(1, &mut StdRng::seed_from_u64(0)).unwrap_err(),
            DatasetError::IndexOutOfRange { index: 1, len: 1 }
        ));
    }

    #[test]
    fn test_construction_validates() {
        assert!(matches!(
            TrainingSampleProvider::new(Vec::new(), 0, AugmentConfig::default(), SampleMode::Magnitude),
            Err(DatasetError::Configuration(_))
        ));
        let bad = AugmentConfig {
            reduction_rate: -0.1,
            ..Default::default()
        };
        assert!(TrainingSampleProvider::new(Vec::new(), 8, bad, SampleMode::Magnitude).is_err());
    }
}
