//! Pair raw audio files across directories and split train/validation.
//!
//! Pairing is positional over sorted filenames: the i-th mixture goes with
//! the i-th instrument and i-th vocal. Nothing checks that paired files
//! actually belong together; use an explicit file list when directory
//! contents may drift.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::cache::atomic_write;
use crate::error::{DatasetError, DatasetResult};
use crate::types::AudioTriple;

/// Audio container extensions accepted as dataset inputs.
pub const INPUT_EXTENSIONS: &[&str] = &["wav", "m4a", "mp3", "mp4", "flac"];

const MIXTURES: &str = "mixtures";
const INSTRUMENTS: &str = "instruments";
const VOCALS: &str = "pseudo_vocals";

/// How the dataset directory is divided into training and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// Shuffle one pool and hold out a fraction (or an explicit list)
    #[default]
    Random,
    /// Separate `training/` and `validation/` trees
    Subdirs,
}

impl FromStr for SplitMode {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(SplitMode::Random),
            "subdirs" => Ok(SplitMode::Subdirs),
            other => Err(DatasetError::Configuration(format!(
                "unknown split mode '{}' (expected 'random' or 'subdirs')",
                other
            ))),
        }
    }
}

impl std::fmt::Display for SplitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitMode::Random => write!(f, "random"),
            SplitMode::Subdirs => write!(f, "subdirs"),
        }
    }
}

/// Result of a train/validation split.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Split {
    pub training: Vec<AudioTriple>,
    pub validation: Vec<AudioTriple>,
}

/// Sorted list of accepted audio files directly inside `dir`.
pub fn list_audio_files(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DatasetError::not_found(dir));
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let accepted = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| INPUT_EXTENSIONS.contains(&e))
            .unwrap_or(false);
        if accepted && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Pair mixture, instrument and vocal files by sorted position.
pub fn make_triples(mix_dir: &Path, inst_dir: &Path, vocal_dir: &Path) -> DatasetResult<Vec<AudioTriple>> {
    let mixtures = list_audio_files(mix_dir)?;
    let instruments = list_audio_files(inst_dir)?;
    let vocals = list_audio_files(vocal_dir)?;

    if mixtures.len() != instruments.len() || mixtures.len() != vocals.len() {
        log::warn!(
            "File counts differ ({} mixtures, {} instruments, {} vocals); extra files are ignored",
            mixtures.len(),
            instruments.len(),
            vocals.len()
        );
    }

    Ok(mixtures
        .into_iter()
        .zip(instruments)
        .zip(vocals)
        .map(|((m, i), v)| AudioTriple::new(m, i, v))
        .collect())
}

/// Pair mixture and instrument files by sorted position (no vocal track).
pub fn make_pairs(mix_dir: &Path, inst_dir: &Path) -> DatasetResult<Vec<(PathBuf, PathBuf)>> {
    let mixtures = list_audio_files(mix_dir)?;
    let instruments = list_audio_files(inst_dir)?;
    if mixtures.len() != instruments.len() {
        log::warn!(
            "File counts differ ({} mixtures, {} instruments); extra files are ignored",
            mixtures.len(),
            instruments.len()
        );
    }
    Ok(mixtures.into_iter().zip(instruments).collect())
}

fn triples_in(root: &Path) -> DatasetResult<Vec<AudioTriple>> {
    make_triples(&root.join(MIXTURES), &root.join(INSTRUMENTS), &root.join(VOCALS))
}

/// Split `dataset_dir` into training and validation triples.
///
/// In `Random` mode an empty `val_filelist` holds out the last
/// `floor(n * val_rate)` shuffled triples; a non-empty one is used as the
/// validation set verbatim and removed from training by exact equality.
/// `Subdirs` mode rejects a non-empty `val_filelist` before touching disk.
pub fn train_val_split(
    dataset_dir: &Path,
    mode: SplitMode,
    val_rate: f64,
    val_filelist: &[AudioTriple],
    rng: &mut StdRng,
) -> DatasetResult<Split> {
    if !(0.0..=1.0).contains(&val_rate) {
        return Err(DatasetError::Configuration(format!(
            "validation rate must be within [0, 1], got {}",
            val_rate
        )));
    }

    match mode {
        SplitMode::Random => {
            let mut triples = triples_in(dataset_dir)?;
            triples.shuffle(rng);

            if val_filelist.is_empty() {
                let val_size = (triples.len() as f64 * val_rate) as usize;
                let validation = triples.split_off(triples.len() - val_size);
                Ok(Split {
                    training: triples,
                    validation,
                })
            } else {
                let training = triples
                    .into_iter()
                    .filter(|t| !val_filelist.contains(t))
                    .collect();
                Ok(Split {
                    training,
                    validation: val_filelist.to_vec(),
                })
            }
        }
        SplitMode::Subdirs => {
            if !val_filelist.is_empty() {
                return Err(DatasetError::Configuration(
                    "an explicit validation file list cannot be combined with subdirs split mode"
                        .to_string(),
                ));
            }
            Ok(Split {
                training: triples_in(&dataset_dir.join("training"))?,
                validation: triples_in(&dataset_dir.join("validation"))?,
            })
        }
    }
}

/// All mixture/instrument pairs in `dataset_dir`, ignoring vocals.
///
/// In `Subdirs` mode training pairs come first, then validation pairs.
pub fn raw_data_split(dataset_dir: &Path, mode: SplitMode) -> DatasetResult<Vec<(PathBuf, PathBuf)>> {
    match mode {
        SplitMode::Random => make_pairs(&dataset_dir.join(MIXTURES), &dataset_dir.join(INSTRUMENTS)),
        SplitMode::Subdirs => {
            let mut pairs = Vec::new();
            for sub in ["training", "validation"] {
                let root = dataset_dir.join(sub);
                pairs.extend(make_pairs(&root.join(MIXTURES), &root.join(INSTRUMENTS))?);
            }
            Ok(pairs)
        }
    }
}

/// Read an explicit `[[mixture, instrument, vocal], ...]` JSON file list.
pub fn load_filelist(path: &Path) -> DatasetResult<Vec<AudioTriple>> {
    let data = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DatasetError::not_found(path),
        _ => DatasetError::Io(e),
    })?;
    Ok(serde_json::from_str(&data)?)
}

/// Write a file list in the format read by [`load_filelist`].
pub fn save_filelist(path: &Path, triples: &[AudioTriple]) -> DatasetResult<()> {
    let json = serde_json::to_string_pretty(triples)?;
    atomic_write(path, json.as_bytes())
}
