//! Splitset CLI: prepare separation training data and inspect samples.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;

use splitset_core::augment::AugmentConfig;
use splitset_core::cache::cache_dir;
use splitset_core::codec::PrecomputedCodec;
use splitset_core::filelist::{load_filelist, save_filelist, train_val_split, SplitMode};
use splitset_core::manifest::{DatasetManifest, PrepareParams};
use splitset_core::patch::PatchMaterializer;
use splitset_core::training::{make_training_set, TrainingSampleProvider};
use splitset_core::validation::ValidationSampleProvider;
use splitset_core::{worker_rng, Sample, SampleMode, SampleProvider};

// ─── Top-level CLI ───────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "splitset",
    about = "Training data preparation for vocal/instrument separation",
    version,
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Split a dataset, index training caches and cut validation patches
    Prepare(PrepareArgs),
    /// Draw samples from a prepared manifest
    Inspect(InspectArgs),
}

// ─── Prepare ─────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct PrepareArgs {
    /// Dataset root containing mixtures/, instruments/, pseudo_vocals/
    dataset_dir: PathBuf,

    /// How to choose validation triples: random or subdirs
    #[arg(long, default_value = "random")]
    split_mode: SplitMode,

    /// Fraction of triples held out for validation (random mode)
    #[arg(long, default_value_t = 0.2)]
    val_rate: f64,

    /// JSON list of [mixture, instrument, vocal] triples to validate on
    #[arg(long)]
    val_filelist: Option<PathBuf>,

    /// Sample rate
    #[arg(long, default_value_t = 44100)]
    sr: u32,

    /// STFT hop length
    #[arg(long, default_value_t = 1024)]
    hop_length: usize,

    /// FFT size
    #[arg(long, default_value_t = 2048)]
    n_fft: usize,

    /// Validation patch width in frames
    #[arg(long, default_value_t = 256)]
    val_cropsize: usize,

    /// Margin trimmed from each side of a validation patch
    #[arg(long, default_value_t = 0)]
    offset: usize,

    /// Where validation patches are written (default: cache dir)
    #[arg(long)]
    patch_root: Option<PathBuf>,

    /// RNG seed for the random split
    #[arg(long, default_value_t = 2019)]
    seed: u64,

    /// Manifest output path
    #[arg(long, default_value = "manifest.json")]
    output: PathBuf,

    /// Show verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

// ─── Inspect ─────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(about = "Fetch training and validation samples and report their shapes")]
struct InspectArgs {
    /// Manifest written by `prepare`
    manifest: PathBuf,

    /// Training crop width in frames
    #[arg(long, default_value_t = 256)]
    cropsize: usize,

    /// Probability of vocal-bleed suppression
    #[arg(long, default_value_t = 0.0)]
    reduction_rate: f64,

    /// Strength of vocal-bleed suppression
    #[arg(long, default_value_t = 0.2)]
    reduction_weight: f32,

    /// Probability of mixup
    #[arg(long, default_value_t = 0.0)]
    mixup_rate: f64,

    /// Beta distribution shape for mixup
    #[arg(long, default_value_t = 1.0)]
    mixup_alpha: f64,

    /// Emit complex samples instead of magnitudes
    #[arg(long, default_value_t = false)]
    complex: bool,

    /// Number of training samples to draw
    #[arg(long, default_value_t = 8)]
    count: usize,

    /// Number of loader threads
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// RNG seed for reproducible output
    #[arg(long)]
    seed: Option<u64>,

    /// Show verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

// ─── Main ────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    // Init logging
    let log_level = match &cli.command {
        Command::Prepare(a) if a.verbose => "debug",
        Command::Inspect(a) if a.verbose => "debug",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Command::Prepare(args) => run_prepare(args),
        Command::Inspect(args) => run_inspect(args),
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

// ─── Prepare runner ──────────────────────────────────────────────

fn run_prepare(args: PrepareArgs) -> Result<()> {
    if !args.dataset_dir.is_dir() {
        bail!("Dataset directory not found: {}", args.dataset_dir.display());
    }
    let split_mode = args.split_mode;
    let params = PrepareParams {
        sample_rate: args.sr,
        hop_length: args.hop_length,
        n_fft: args.n_fft,
        crop_size: args.val_cropsize,
        offset: args.offset,
        split_mode,
        val_rate: args.val_rate,
        seed: args.seed,
    };
    let stft = params.stft();

    let val_filelist = match &args.val_filelist {
        Some(path) => load_filelist(path)
            .with_context(|| format!("Failed to read validation file list {}", path.display()))?,
        None => Vec::new(),
    };

    let mut rng = StdRng::seed_from_u64(args.seed);
    let split = train_val_split(&args.dataset_dir, split_mode, args.val_rate, &val_filelist, &mut rng)
        .context("Train/validation split failed")?;
    log::info!(
        "Split ({}): {} training, {} validation triples",
        split_mode,
        split.training.len(),
        split.validation.len()
    );

    let codec = PrecomputedCodec::new();
    let training = make_training_set(&split.training, &codec, &stft)
        .context("Building training set failed")?;

    let patch_root = args.patch_root.clone().unwrap_or_else(cache_dir);
    let materializer = PatchMaterializer::new(&patch_root, args.val_cropsize, args.offset, stft)?;
    let validation = materializer
        .make_validation_set(&split.validation, &codec)
        .context("Building validation set failed")?;

    let manifest = DatasetManifest {
        params,
        training,
        validation,
        validation_files: split.validation,
    };
    manifest
        .save(&args.output)
        .with_context(|| format!("Failed to write manifest {}", args.output.display()))?;
    log::info!("Wrote {}", args.output.display());

    let filelist_path = sibling(&args.output, "val_filelist.json");
    save_filelist(&filelist_path, &manifest.validation_files)
        .with_context(|| format!("Failed to write {}", filelist_path.display()))?;
    log::info!("Wrote {}", filelist_path.display());

    Ok(())
}

/// Path of `name` in the same directory as `path`.
fn sibling(path: &Path, name: &str) -> PathBuf {
    match path.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

// ─── Inspect runner ──────────────────────────────────────────────

fn run_inspect(args: InspectArgs) -> Result<()> {
    let manifest = DatasetManifest::load(&args.manifest)
        .with_context(|| format!("Failed to read manifest {}", args.manifest.display()))?;
    log::info!("Parameters: {}", serde_json::to_string(&manifest.params)?);

    let mode = if args.complex {
        SampleMode::Complex
    } else {
        SampleMode::Magnitude
    };
    let augment = AugmentConfig {
        reduction_rate: args.reduction_rate,
        reduction_weight: args.reduction_weight,
        mixup_rate: args.mixup_rate,
        mixup_alpha: args.mixup_alpha,
    };
    let training = TrainingSampleProvider::new(manifest.training, args.cropsize, augment, mode)?;
    let validation = ValidationSampleProvider::new(manifest.validation, mode);
    log::info!(
        "Training: {} entries, validation: {} patches",
        training.len(),
        validation.len()
    );

    let seed = args.seed.unwrap_or_else(rand::random);
    let workers = args.workers.max(1);

    if training.is_empty() {
        log::warn!("No training entries, skipping training samples");
    } else {
        std::thread::scope(|scope| -> Result<()> {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let training = &training;
                    scope.spawn(move || -> Result<()> {
                        let mut rng = worker_rng(seed, worker);
                        for i in (worker..args.count).step_by(workers) {
                            let index = i % training.len();
                            let sample = training
                                .get(index, &mut rng)
                                .with_context(|| format!("Training sample {} failed", index))?;
                            log::info!("[worker {}] training #{}: {}", worker, index, describe(&sample));
                        }
                        Ok(())
                    })
                })
                .collect();
            for handle in handles {
                handle.join().map_err(|_| anyhow!("Loader thread panicked"))??;
            }
            Ok(())
        })?;
    }

    let mut rng = worker_rng(seed, workers);
    for index in 0..validation.len().min(args.count) {
        let sample = validation
            .get(index, &mut rng)
            .with_context(|| format!("Validation patch {} failed", validation.patches()[index].display()))?;
        log::info!("validation #{}: {}", index, describe(&sample));
    }

    Ok(())
}

fn describe(sample: &Sample) -> String {
    format!(
        "input {:?}, target {:?}, peak {:.4}",
        sample.input_shape(),
        sample.target_shape(),
        sample.input_peak()
    )
}
