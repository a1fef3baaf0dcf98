//! stereo-recon CLI: checkerboard detection, stereo calibration and dense
//! reconstruction.

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn, LevelFilter};
use std::path::PathBuf;
use stereo_recon::calib::{CalibrationSource, MonoCalibrationRecord};
use stereo_recon::chessboard::{
    detect_batch, write_corner_csv, BatchDetection, CameraSide, ChessboardDetector, CornerRecord,
};
use stereo_recon::cloud::PointCloudFormat;
use stereo_recon::core::PatternSpec;
use stereo_recon::disparity::{BlockCost, MatcherKind};
use stereo_recon::{
    calibrate_stereo, io, load_json, reconstruct, resize_image, rig_from_source, write_outputs,
    CalibrateConfig, ReconstructConfig, ResizeSpec,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "stereo-recon")]
#[command(about = "Calibrate a stereo camera pair and reconstruct 3D point clouds")]
#[command(version)]
struct Cli {
    /// Log verbosity.
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Emit structured JSON logs.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the checkerboard in a directory of images.
    Detect(DetectArgs),

    /// Calibrate a stereo pair from matching left/right image directories.
    Calibrate(CalibrateArgs),

    /// Rectify, match and reproject one stereo pair.
    Reconstruct(ReconstructArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct PatternArgs {
    /// JSON CalibrateConfig; the flags below override its pattern.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Interior corner rows.
    #[arg(long)]
    rows: Option<usize>,

    /// Interior corners per row.
    #[arg(long)]
    cols: Option<usize>,

    /// Square edge length; sets the unit of the solved baseline.
    #[arg(long)]
    square_size: Option<f64>,

    /// Resample every image by this factor first.
    #[arg(long)]
    scale: Option<f64>,
}

impl PatternArgs {
    fn resolve(&self) -> CliResult<CalibrateConfig> {
        let mut config = match &self.config {
            Some(path) => load_json::<CalibrateConfig>(path)?,
            None => {
                let (Some(rows), Some(cols)) = (self.rows, self.cols) else {
                    return Err("pass --rows and --cols, or a --config with the pattern".into());
                };
                CalibrateConfig::for_pattern(PatternSpec::new(
                    rows,
                    cols,
                    self.square_size.unwrap_or(1.0),
                )?)
            }
        };
        let pattern = &mut config.chessboard.pattern;
        pattern.rows = self.rows.unwrap_or(pattern.rows);
        pattern.cols = self.cols.unwrap_or(pattern.cols);
        pattern.square_size = self.square_size.unwrap_or(pattern.square_size);
        pattern.validate()?;
        if let Some(s) = self.scale {
            config.resize = Some(ResizeSpec::Scale(s));
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Args)]
struct DetectArgs {
    /// Directory with the input images.
    #[arg(long)]
    images: PathBuf,

    /// Output directory for corners.csv and the overlays.
    #[arg(long)]
    out: PathBuf,

    /// Camera name written to the CSV.
    #[arg(long, value_enum, default_value_t = SideArg::Left)]
    side: SideArg,

    #[command(flatten)]
    pattern: PatternArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SideArg {
    Left,
    Right,
}

impl From<SideArg> for CameraSide {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Left => CameraSide::Left,
            SideArg::Right => CameraSide::Right,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct CalibrateArgs {
    /// Directory with the left images.
    #[arg(long)]
    left: PathBuf,

    /// Directory with the right images, paired with --left by sorted name.
    #[arg(long)]
    right: PathBuf,

    /// Path of the calibration record to write.
    #[arg(long)]
    out: PathBuf,

    /// Trusted left camera (mono calibration record); needs --right-intrinsics.
    #[arg(long, requires = "right_intrinsics")]
    left_intrinsics: Option<PathBuf>,

    /// Trusted right camera (mono calibration record); needs --left-intrinsics.
    #[arg(long, requires = "left_intrinsics")]
    right_intrinsics: Option<PathBuf>,

    /// Rectification alpha in [0, 1].
    #[arg(long)]
    alpha: Option<f64>,

    /// Also write the detected corners of both cameras as CSV.
    #[arg(long)]
    corners_csv: Option<PathBuf>,

    #[command(flatten)]
    pattern: PatternArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MatcherArg {
    Sgbm,
    Bm,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Ply,
    Obj,
}

#[derive(Debug, Clone, Args)]
struct ReconstructArgs {
    /// Left image.
    #[arg(long)]
    left: PathBuf,

    /// Right image.
    #[arg(long)]
    right: PathBuf,

    /// Calibration record of the rig that took the pair.
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Output directory.
    #[arg(long)]
    out: PathBuf,

    /// JSON ReconstructConfig; explicit flags take precedence.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    matcher: Option<MatcherArg>,

    /// Quality level selecting the matching window.
    #[arg(long)]
    quality: Option<u32>,

    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Keep only points at or beyond this depth.
    #[arg(long, requires = "max_depth")]
    min_depth: Option<f32>,

    /// Keep only points at or before this depth.
    #[arg(long, requires = "min_depth")]
    max_depth: Option<f32>,

    /// Write the point cloud without colors.
    #[arg(long)]
    no_color: bool,

    /// Resample both images by this factor first; must match the calibration.
    #[arg(long)]
    scale: Option<f64>,
}

impl ReconstructArgs {
    fn resolve(&self) -> CliResult<ReconstructConfig> {
        let mut config = match &self.config {
            Some(path) => load_json::<ReconstructConfig>(path)?,
            None => ReconstructConfig::default(),
        };
        if let Some(m) = self.matcher {
            config.matcher = match m {
                MatcherArg::Sgbm => MatcherKind::SemiGlobal,
                MatcherArg::Bm => MatcherKind::BlockMatching,
            };
            config.block_cost = BlockCost::Sad;
        }
        if let Some(q) = self.quality {
            config.quality = q;
        }
        if let Some(f) = self.format {
            config.cloud.format = match f {
                FormatArg::Ply => PointCloudFormat::Ply,
                FormatArg::Obj => PointCloudFormat::Obj,
            };
        }
        if let (Some(min), Some(max)) = (self.min_depth, self.max_depth) {
            config.cloud.depth_range = Some((min, max));
        }
        if self.no_color {
            config.colorize = false;
        }
        if let Some(s) = self.scale {
            config.resize = Some(ResizeSpec::Scale(s));
        }
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    let outcome = match cli.command {
        Commands::Detect(args) => run_detect(&args),
        Commands::Calibrate(args) => run_calibrate(&args),
        Commands::Reconstruct(args) => run_reconstruct(&args),
    };
    if let Err(err) = outcome {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) {
    let config = stereo_recon::core::LogConfig::new(cli.log_level.filter());
    stereo_recon::core::init_tracing(cli.json_logs, config);
    log::set_max_level(cli.log_level.filter().max(config.dependency_level));
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) {
    let _ = stereo_recon::core::init_with_level(cli.log_level.filter());
}

// ── detect ─────────────────────────────────────────────────────────────

fn run_detect(args: &DetectArgs) -> CliResult<()> {
    let config = args.pattern.resolve()?;
    let paths = io::list_images(&args.images)?;
    if paths.is_empty() {
        return Err(format!("no images in {}", args.images.display()).into());
    }
    let mut indices = Vec::with_capacity(paths.len());
    let mut images = Vec::with_capacity(paths.len());
    for (i, img) in io::load_images(&paths).into_iter().enumerate() {
        if let Some(img) = img {
            indices.push(i);
            images.push(resize_image(&img, config.resize.as_ref())?);
        }
    }
    let unreadable = paths.len() - images.len();

    let detector = ChessboardDetector::new(config.chessboard.clone())?;
    let readable = detect_batch(&detector, &images);
    let readable_paths: Vec<PathBuf> = indices.iter().map(|&i| paths[i].clone()).collect();
    let overlays = io::write_overlays(
        &images,
        &readable_paths,
        &readable,
        args.out.join("overlays"),
    )?;
    let batch = scatter_detections(readable, &indices, paths.len());

    let side = CameraSide::from(args.side);
    let records: Vec<CornerRecord> = batch
        .results
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.as_ref().map(|c| (i, c)))
        .flat_map(|(i, c)| CornerRecord::from_corners(i, side, c))
        .collect();
    let csv = args.out.join("corners.csv");
    std::fs::create_dir_all(&args.out)?;
    write_corner_csv(&csv, &records)?;
    info!("{} overlays, corners in {}", overlays, csv.display());

    println!(
        "pattern found in {}/{} images ({} unusable, {} unreadable)",
        batch.found,
        paths.len(),
        batch.errors.len(),
        unreadable
    );
    Ok(())
}

/// Re-index a batch run over the readable subset onto all `total` inputs.
fn scatter_detections(readable: BatchDetection, indices: &[usize], total: usize) -> BatchDetection {
    let mut results = vec![None; total];
    for (&i, corners) in indices.iter().zip(readable.results) {
        results[i] = corners;
    }
    BatchDetection {
        results,
        found: readable.found,
        failed: readable.failed,
        errors: readable
            .errors
            .into_iter()
            .map(|(k, reason)| (indices[k], reason))
            .collect(),
    }
}

// ── calibrate ──────────────────────────────────────────────────────────

fn run_calibrate(args: &CalibrateArgs) -> CliResult<()> {
    let mut config = args.pattern.resolve()?;
    if let Some(alpha) = args.alpha {
        config.alpha = alpha;
    }
    let left_paths = io::list_images(&args.left)?;
    let right_paths = io::list_images(&args.right)?;
    if left_paths.len() != right_paths.len() {
        return Err(format!(
            "{} left images but {} right images",
            left_paths.len(),
            right_paths.len()
        )
        .into());
    }

    let source = match (&args.left_intrinsics, &args.right_intrinsics) {
        (Some(l), Some(r)) => CalibrationSource::TrustedIntrinsics {
            left: MonoCalibrationRecord::load(l)?.camera()?,
            right: MonoCalibrationRecord::load(r)?.camera()?,
        },
        _ => CalibrationSource::Solved,
    };
    let (left, right): (Vec<_>, Vec<_>) = io::load_images(&left_paths)
        .into_iter()
        .zip(io::load_images(&right_paths))
        .filter_map(|(l, r)| Some((l?, r?)))
        .unzip();
    if left.len() < left_paths.len() {
        warn!(
            "dropped {} pairs with an unreadable image",
            left_paths.len() - left.len()
        );
    }
    let outcome = calibrate_stereo(Some(&source), &left, &right, &config)?;
    outcome.rig.save(&args.out)?;

    if let Some(csv) = &args.corners_csv {
        write_corner_csv(csv, &CornerRecord::from_stereo(&outcome.detections))?;
    }
    println!(
        "{} of {} pairs used; rms {:.4} px; baseline {:.6}",
        outcome.detections.usable.len(),
        left_paths.len(),
        outcome.rig.reprojection_error(),
        outcome.rig.baseline()
    );
    Ok(())
}

// ── reconstruct ────────────────────────────────────────────────────────

fn run_reconstruct(args: &ReconstructArgs) -> CliResult<()> {
    let config = args.resolve()?;
    let source = args.calibration.clone().map(CalibrationSource::TrustedRecord);
    let rig = rig_from_source(source.as_ref())?;

    let left = io::load_image(&args.left)?;
    let right = io::load_image(&args.right)?;
    let result = reconstruct(&rig, &left, &right, &config)?;
    let files = write_outputs(&result, &args.out, &config.outputs, &config.cloud)?;

    println!(
        "{} of {} pixels matched; {} points",
        result.disparity.valid_count(),
        result.disparity.width * result.disparity.height,
        result.cloud.finite_count()
    );
    for file in files {
        println!("  {}", file.display());
    }
    Ok(())
}
