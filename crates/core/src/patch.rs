//! Validation patch materialization.
//!
//! Each validation triple is normalized, zero-padded along time and cut
//! into fixed-width tiles. Tiles are stored as `.npz` archives holding
//! `X.npy` (mixture), `y.npy` (instrument) and `v.npy` (vocal) inside a
//! directory named after the hyperparameters, so a second run with the
//! same settings finds every patch already on disk.

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use ndarray::{s, Array3, ArrayView3, Ix3};
use num_complex::Complex32;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::array::npy;
use crate::cache::atomic_write_with;
use crate::codec::{coefficient, SpectrogramCodec, StftParams};
use crate::error::{DatasetError, DatasetResult};
use crate::types::{AudioTriple, SpecTriple};

const MIXTURE_MEMBER: &str = "X.npy";
const INSTRUMENT_MEMBER: &str = "y.npy";
const VOCAL_MEMBER: &str = "v.npy";

/// Time-axis padding for tiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Padding {
    pub left: usize,
    pub right: usize,
    /// Tiling stride: the part of each tile not trimmed as margin
    pub roi_size: usize,
}

/// Compute padding so `width` frames tile into windows of `crop_size`.
///
/// `roi_size = crop_size - 2 * offset` and `right = roi_size - width % roi_size + offset`.
/// When the offset leaves no room (`roi_size <= 0`) tiles are not trimmed
/// at all: `roi_size = crop_size` and the offset is dropped.
pub fn make_padding(width: usize, crop_size: usize, offset: usize) -> Padding {
    let (roi_size, offset) = match crop_size.checked_sub(2 * offset) {
        Some(roi) if roi > 0 => (roi, offset),
        _ => (crop_size, 0),
    };
    Padding {
        left: offset,
        right: roi_size - width % roi_size + offset,
        roi_size,
    }
}

/// Number of tiles needed to cover `width` frames.
pub fn tile_count(width: usize, roi_size: usize) -> usize {
    width.div_ceil(roi_size)
}

/// Zero-pad the time (last) axis.
pub fn pad_time(a: &Array3<Complex32>, left: usize, right: usize) -> Array3<Complex32> {
    let (c, f, t) = a.dim();
    let mut padded = Array3::zeros((c, f, left + t + right));
    padded.slice_mut(s![.., .., left..left + t]).assign(a);
    padded
}

/// Cache directory name for a set of patch hyperparameters.
pub fn patch_dir_name(crop_size: usize, params: &StftParams, offset: usize) -> String {
    format!(
        "cs{}_sr{}_hl{}_nf{}_of{}",
        crop_size, params.sample_rate, params.hop_length, params.n_fft, offset
    )
}

/// Atomically write one patch archive.
pub fn write_patch<'a>(
    path: &Path,
    mixture: ArrayView3<'a, Complex32>,
    instrument: ArrayView3<'a, Complex32>,
    vocal: ArrayView3<'a, Complex32>,
) -> DatasetResult<()> {
    atomic_write_with(path, |w| {
        let mut zip = ZipWriter::new(w);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(true);
        for (name, array) in [
            (MIXTURE_MEMBER, mixture),
            (INSTRUMENT_MEMBER, instrument),
            (VOCAL_MEMBER, vocal),
        ] {
            zip.start_file(name, options)?;
            npy::write_array(&mut zip, &array)?;
        }
        zip.finish()?;
        Ok(())
    })
}

fn read_member<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    path: &Path,
) -> DatasetResult<Array3<Complex32>> {
    let mut member = archive.by_name(name).map_err(|e| match e {
        zip::result::ZipError::FileNotFound => {
            DatasetError::format(path, format!("archive has no member '{}'", name))
        }
        e => DatasetError::Zip(e),
    })?;
    npy::read_array(&mut member, path)?
        .into_dimensionality::<Ix3>()
        .map_err(|_| DatasetError::format(path, format!("member '{}' is not 3-dimensional", name)))
}

/// Load a patch written by [`write_patch`] (or `numpy.savez`).
pub fn load_patch(path: &Path) -> DatasetResult<SpecTriple> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DatasetError::not_found(path),
        _ => DatasetError::Io(e),
    })?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    Ok(SpecTriple {
        mixture: read_member(&mut archive, MIXTURE_MEMBER, path)?,
        instrument: read_member(&mut archive, INSTRUMENT_MEMBER, path)?,
        vocal: read_member(&mut archive, VOCAL_MEMBER, path)?,
    })
}

/// Builds the fixed validation set as patch files on disk.
#[derive(Debug, Clone)]
pub struct PatchMaterializer {
    root: PathBuf,
    crop_size: usize,
    offset: usize,
    params: StftParams,
}

impl PatchMaterializer {
    pub fn new(
        root: impl Into<PathBuf>,
        crop_size: usize,
        offset: usize,
        params: StftParams,
    ) -> DatasetResult<Self> {
        if crop_size == 0 {
            return Err(DatasetError::Configuration(
                "validation crop size must be positive".to_string(),
            ));
        }
        Ok(Self {
            root: root.into(),
            crop_size,
            offset,
            params,
        })
    }

    /// Directory holding every patch for these hyperparameters.
    pub fn patch_dir(&self) -> PathBuf {
        self.root
            .join(patch_dir_name(self.crop_size, &self.params, self.offset))
    }

    pub fn patch_path(&self, basename: &str, index: usize) -> PathBuf {
        self.patch_dir().join(format!("{}_p{}.npz", basename, index))
    }

    /// Materialize every triple; returns all patch paths in order.
    pub fn make_validation_set(
        &self,
        filelist: &[AudioTriple],
        codec: &dyn SpectrogramCodec,
    ) -> DatasetResult<Vec<PathBuf>> {
        std::fs::create_dir_all(self.patch_dir())?;
        let mut patches = Vec::new();
        for (i, triple) in filelist.iter().enumerate() {
            log::info!(
                "Validation patches [{}/{}]: {}",
                i + 1,
                filelist.len(),
                triple.mixture.display()
            );
            patches.extend(self.materialize(triple, codec)?);
        }
        log::info!(
            "Validation set: {} patches in {}",
            patches.len(),
            self.patch_dir().display()
        );
        Ok(patches)
    }

    /// Tile one triple, writing only patches that do not exist yet.
    pub fn materialize(
        &self,
        triple: &AudioTriple,
        codec: &dyn SpectrogramCodec,
    ) -> DatasetResult<Vec<PathBuf>> {
        let basename = triple.basename();
        let cached = codec.cache_or_load(triple, &self.params)?;
        let coef = coefficient(&cached.spec, &triple.mixture)?;
        let mut spec = cached.spec;
        spec.normalize(coef);

        let width = spec.width();
        let padding = make_padding(width, self.crop_size, self.offset);
        let count = tile_count(width, padding.roi_size);
        let padded = SpecTriple {
            mixture: pad_time(&spec.mixture, padding.left, padding.right),
            instrument: pad_time(&spec.instrument, padding.left, padding.right),
            vocal: pad_time(&spec.vocal, padding.left, padding.right),
        };

        let mut paths = Vec::with_capacity(count);
        for j in 0..count {
            let path = self.patch_path(&basename, j);
            if path.exists() {
                log::debug!("Patch exists, skipping: {}", path.display());
            } else {
                let start = j * padding.roi_size;
                let window = s![.., .., start..start + self.crop_size];
                write_patch(
                    &path,
                    padded.mixture.slice(window),
                    padded.instrument.slice(window),
                    padded.vocal.slice(window),
                )?;
                log::debug!("Wrote patch {}", path.display());
            }
            paths.push(path);
        }
        Ok(paths)
    }
}
