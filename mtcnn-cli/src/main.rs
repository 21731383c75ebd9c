mod walker;

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rand::{SeedableRng, rngs::StdRng};

use mtcnn_core::{DetectorConfig, MtcnnDetector, OnnxStages};
use mtcnn_utils::{config::AppSettings, init_logging, load_dataset};

use walker::AlignOptions;

/// Align a labeled face dataset into fixed-size thumbnails.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AlignArgs {
    /// Directory with unaligned class subdirectories.
    input_dir: PathBuf,

    /// Directory that receives aligned face thumbnails, one PNG per input.
    output_dir: PathBuf,

    /// Thumbnail size (height and width) in pixels.
    #[arg(long, alias = "image_size", default_value_t = 182)]
    image_size: u32,

    /// Margin around the detected box in pixels, split across both sides.
    #[arg(long, default_value_t = 12)]
    margin: u32,

    /// Directory containing det1.onnx, det2.onnx and det3.onnx.
    #[arg(long, alias = "model_dir")]
    model_dir: Option<PathBuf>,

    /// Optional settings JSON (defaults to built-in detection parameters).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for the per-run shuffle of classes and images.
    #[arg(long)]
    seed: Option<u64>,

    /// Override the minimum detectable face size in pixels.
    #[arg(long, alias = "min_face_size")]
    min_face_size: Option<u32>,

    /// Override the pyramid downscale factor.
    #[arg(long, alias = "scale_factor")]
    scale_factor: Option<f32>,
}

fn main() -> Result<()> {
    init_logging(log::LevelFilter::Info)?;
    let args = AlignArgs::parse();

    let mut settings = load_settings(args.config.as_ref())?;
    apply_cli_overrides(&mut settings, &args);

    // Nothing can be produced without the output tree; this is the one
    // filesystem failure that aborts the run.
    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!(
            "failed to create output directory {}",
            args.output_dir.display()
        )
    })?;

    let model_dir = args
        .model_dir
        .clone()
        .unwrap_or_else(|| settings.model_dir_or("models"));
    info!("Loading cascade networks from {}", model_dir.display());
    let stages = OnnxStages::load(&model_dir)?;
    let detector = MtcnnDetector::new(stages, DetectorConfig::from(&settings.detection));

    let mut classes = load_dataset(&args.input_dir)?;
    info!(
        "Found {} class(es) under {}",
        classes.len(),
        args.input_dir.display()
    );

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let options = AlignOptions {
        image_size: args.image_size,
        margin: args.margin,
    };

    let counters = walker::align_dataset(
        &detector,
        &mut classes,
        &args.output_dir,
        &options,
        &mut rng,
    )?;

    if counters.failed > 0 || counters.no_face > 0 {
        info!(
            "{} image(s) failed to decode or detect, {} had no detectable face",
            counters.failed, counters.no_face
        );
    }
    println!("Total number of images: {}", counters.total);
    println!(
        "Number of successfully aligned images: {}",
        counters.aligned
    );
    println!("Number of pre-aligned images: {}", counters.prealigned);

    Ok(())
}

fn load_settings(config_path: Option<&PathBuf>) -> Result<AppSettings> {
    if let Some(path) = config_path {
        AppSettings::load_from_path(path)
    } else {
        Ok(AppSettings::default())
    }
}

fn apply_cli_overrides(settings: &mut AppSettings, args: &AlignArgs) {
    if let Some(min_face_size) = args.min_face_size {
        settings.detection.min_face_size = min_face_size;
    }
    if let Some(scale_factor) = args.scale_factor {
        settings.detection.scale_factor = scale_factor;
    }
}
