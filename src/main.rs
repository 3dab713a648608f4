use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use serde_json::{json, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use visual_diff_core::compare::{
    check_mismatch, parse_engine_chain, CompareController, CompareEngine, CompletionOutcome,
    IgnoreLevel, Tolerances,
};
use visual_diff_core::config::{
    download_file_name, minimal_overrides, show_config, DiffConfig, DiffResult, UiState,
};
use visual_diff_core::engine::{round_to, PixelCompareEngine};
use visual_diff_core::geometry::{Rect, ScaleTransform};
use visual_diff_core::regions::Region;
use visual_diff_core::session::Session;

#[derive(Parser, Debug)]
#[command(
    name = "visual-diff",
    version,
    about = "Visual-regression diff session core: compare screenshot pairs, export minimal override configs, rebase baselines"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare a baseline/latest pair with the configured engine chain
    Compare(CompareArgs),
    /// Print the minimal override config for a session
    #[command(name = "show-config")]
    ShowConfig(ShowConfigArgs),
    /// Accept the latest image as the new baseline and print the minimal config
    Rebase(RebaseArgs),
}

#[derive(Args, Debug)]
struct CompareArgs {
    /// Baseline image path
    #[arg(long)]
    baseline: PathBuf,
    /// Latest image path
    #[arg(long)]
    latest: PathBuf,
    /// Comparison options JSON (ignore, tolerances, ignoredBoxes, ignoreAreasColoredWith, engine, failureThreshold)
    #[arg(long)]
    options: Option<PathBuf>,
    /// Default options JSON (engine, failureThreshold, allowScaling)
    #[arg(long)]
    defaults: Option<PathBuf>,
    /// Rendered diff image output path
    #[arg(long)]
    diff_out: Option<PathBuf>,
    /// Result JSON output path
    #[arg(long)]
    json_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ShowConfigArgs {
    /// Diff result JSON (baseline, latest, engine, thresholds)
    #[arg(long)]
    result: PathBuf,
    /// Original comparison options JSON
    #[arg(long)]
    options: Option<PathBuf>,
    /// Live UI state JSON (ignore, tolerances, ignoredBoxes); defaults to the original options
    #[arg(long)]
    state: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RebaseArgs {
    /// Baseline image path to overwrite
    #[arg(long)]
    baseline: PathBuf,
    /// Latest image path accepted as the new baseline
    #[arg(long)]
    latest: PathBuf,
    /// Original comparison options JSON
    #[arg(long)]
    options: Option<PathBuf>,
    /// Diff result JSON; synthesized from the options when omitted
    #[arg(long)]
    result: Option<PathBuf>,
    /// Print the config without copying the baseline
    #[arg(long)]
    dry_run: bool,
}

/// Per-comparison options: the session config plus the engine selection keys
/// that ride along in the same JSON object.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CompareOptions {
    engine: Option<String>,
    failure_threshold: Option<f64>,
    #[serde(flatten)]
    config: DiffConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CompareDefaults {
    engine: Option<String>,
    failure_threshold: Option<f64>,
    allow_scaling: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CliUiState {
    ignore: Option<String>,
    tolerances: Option<Tolerances>,
    ignored_boxes: Vec<Rect>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Compare(args) => command_compare(args),
        Commands::ShowConfig(args) => command_show_config(args),
        Commands::Rebase(args) => command_rebase(args),
    }
}

fn command_compare(args: CompareArgs) -> Result<()> {
    if !args.baseline.exists() {
        bail!("baseline not found: {}", args.baseline.display());
    }
    if !args.latest.exists() {
        bail!("latest not found: {}", args.latest.display());
    }

    let options: CompareOptions = load_json_or_default(args.options.as_deref())?;
    let defaults: CompareDefaults = load_json_or_default(args.defaults.as_deref())?;

    let default_engine = defaults.engine.unwrap_or_else(|| "resemble".to_string());
    let engine_config = options.engine.unwrap_or_else(|| default_engine.clone());
    let default_failure_threshold = defaults.failure_threshold.unwrap_or(0.0);
    let failure_threshold = options
        .failure_threshold
        .unwrap_or(default_failure_threshold);

    let result = DiffResult {
        baseline: args.baseline.display().to_string(),
        latest: args.latest.display().to_string(),
        engine: engine_config,
        default_engine,
        failure_threshold,
        default_failure_threshold,
        ssim_mismatch_percentage: None,
    };

    let (width, height) = image::image_dimensions(&args.baseline).with_context(|| {
        format!(
            "failed to read baseline dimensions: {}",
            args.baseline.display()
        )
    })?;
    // Nothing is rendered on screen here, so display space equals natural
    // space and the transform is just the readiness gate.
    let transform =
        ScaleTransform::from_layout(width as f64, height as f64, width as f64, height as f64)?;

    let mut session = Session::new(transform, &options.config.ignored_boxes);
    let mut controller = CompareController::new(&result, &options.config)?;

    let chain = parse_engine_chain(&result.engine, result.failure_threshold);
    let mut engine = PixelCompareEngine::new().allow_scaling(defaults.allow_scaling);
    if let Some(path) = &args.diff_out {
        engine = engine.with_diff_output(path);
    }

    let mut mismatch = 100.0_f64;
    let mut diff_image: Option<String> = None;
    let mut engines_run = 0;
    for name in &chain.engines {
        let completion = match name.as_str() {
            "resemble" => engine.repaint(&controller.request_repaint(session.regions()))?,
            other => {
                tracing::error!(engine = other, "skipping unsupported image comparison engine");
                continue;
            }
        };
        engines_run += 1;
        if completion.mismatch_percentage <= mismatch {
            mismatch = completion.mismatch_percentage;
            diff_image = completion.image.clone();
        }
        if let CompletionOutcome::Applied { first_paint: true } =
            controller.apply_completion(&completion)
        {
            session.restore_regions();
        }
        if mismatch < chain.stop_when_mismatch_is_less_than {
            break;
        }
    }
    session.record_mismatch(mismatch);

    let verdict = check_mismatch(mismatch, result.failure_threshold);
    let payload = json!({
        "baseline": abs_path(&args.baseline).display().to_string(),
        "latest": abs_path(&args.latest).display().to_string(),
        "engine": result.engine,
        "defaultEngine": result.default_engine,
        "failureThreshold": result.failure_threshold,
        "defaultFailureThreshold": result.default_failure_threshold,
        "enginesRun": engines_run,
        "mismatchPercentage": round_to(mismatch, 2),
        "isMismatch": verdict.is_mismatch,
        "error": verdict.error,
        "diffImage": diff_image,
        "ignoredBoxes": session.regions().len(),
        "download": download_file_name(&result.latest),
        "completedAt": Utc::now().to_rfc3339(),
    });

    if let Some(path) = &args.json_out {
        write_json_pretty(path, &payload)?;
    }
    println!("{}", serde_json::to_string(&payload)?);
    Ok(())
}

fn command_show_config(args: ShowConfigArgs) -> Result<()> {
    let result: DiffResult = read_json(&args.result)?;
    let options: CompareOptions = load_json_or_default(args.options.as_deref())?;
    let config = options.config;

    let state: CliUiState = match args.state.as_deref() {
        Some(path) => read_json(path)?,
        None => CliUiState {
            ignore: config.ignore.clone(),
            tolerances: config.tolerances,
            ignored_boxes: config.ignored_boxes.clone(),
        },
    };

    let ignore = match &state.ignore {
        Some(raw) => IgnoreLevel::parse(raw)?,
        None => IgnoreLevel::Less,
    };
    let regions = regions_from_rects(&state.ignored_boxes);
    let ui = UiState {
        ignore,
        tolerances: state.tolerances.unwrap_or_default(),
        regions: &regions,
    };
    let overrides = minimal_overrides(&result, &config, &ui)?;
    println!("{}", show_config(&overrides, None)?);
    Ok(())
}

fn command_rebase(args: RebaseArgs) -> Result<()> {
    if !args.latest.exists() {
        bail!("latest not found: {}", args.latest.display());
    }

    let options: CompareOptions = load_json_or_default(args.options.as_deref())?;
    let config = options.config;
    let result: DiffResult = match args.result.as_deref() {
        Some(path) => read_json(path)?,
        None => DiffResult {
            baseline: args.baseline.display().to_string(),
            latest: args.latest.display().to_string(),
            engine: options
                .engine
                .clone()
                .unwrap_or_else(|| "resemble".to_string()),
            default_engine: "resemble".to_string(),
            failure_threshold: options.failure_threshold.unwrap_or(0.0),
            default_failure_threshold: 0.0,
            ssim_mismatch_percentage: None,
        },
    };

    let ignore = match &config.ignore {
        Some(raw) => IgnoreLevel::parse(raw)?,
        None => IgnoreLevel::Less,
    };
    let regions = regions_from_rects(&config.ignored_boxes);
    let ui = UiState {
        ignore,
        tolerances: config.tolerances.unwrap_or_default(),
        regions: &regions,
    };
    let overrides = minimal_overrides(&result, &config, &ui)?;

    if !args.dry_run {
        copy_file(&args.latest, &args.baseline)?;
    }

    let payload = json!({
        "baseline": abs_path(&args.baseline).display().to_string(),
        "rebased": !args.dry_run,
        "download": download_file_name(&result.latest),
        "config": serde_json::to_value(&overrides)?,
        "completedAt": Utc::now().to_rfc3339(),
    });
    println!("{}", serde_json::to_string(&payload)?);
    Ok(())
}

fn regions_from_rects(rects: &[Rect]) -> Vec<Region> {
    rects
        .iter()
        .enumerate()
        .map(|(i, r)| Region {
            id: i as u64,
            left: r.left,
            top: r.top,
            right: r.right,
            bottom: r.bottom,
        })
        .collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read JSON: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON: {}", path.display()))
}

fn load_json_or_default<T: serde::de::DeserializeOwned + Default>(
    path: Option<&Path>,
) -> Result<T> {
    match path {
        Some(path) => read_json(path),
        None => Ok(T::default()),
    }
}

fn write_json_pretty(path: &Path, value: &Value) -> Result<()> {
    ensure_parent_dir(path)?;
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).with_context(|| format!("failed to write JSON: {}", path.display()))?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory: {}", parent.display())
            })?;
        }
    }
    Ok(())
}

fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    ensure_parent_dir(dst)?;
    fs::copy(src, dst)
        .with_context(|| format!("failed to copy {} -> {}", src.display(), dst.display()))?;
    Ok(())
}

fn abs_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};
    use tempfile::tempdir;

    fn save_solid(path: &Path, width: u32, height: u32, color: [u8; 4]) {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        DynamicImage::ImageRgba8(img).save(path).unwrap();
    }

    #[test]
    fn writes_json_pretty() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a").join("b.json");
        write_json_pretty(&target, &json!({"ok": true})).unwrap();
        assert!(target.exists());
    }

    #[test]
    fn compare_options_parse_engine_and_config_together() {
        let raw = r#"{
            "engine": "resemble|ssim",
            "failureThreshold": 2.5,
            "ignore": "colors",
            "ignoredBoxes": [{"left": 0, "top": 0, "right": 10, "bottom": 10}]
        }"#;
        let options: CompareOptions = serde_json::from_str(raw).unwrap();
        assert_eq!(options.engine.as_deref(), Some("resemble|ssim"));
        assert_eq!(options.failure_threshold, Some(2.5));
        assert_eq!(options.config.ignore.as_deref(), Some("colors"));
        assert_eq!(options.config.ignored_boxes.len(), 1);
    }

    #[test]
    fn regions_from_rects_assigns_sequential_ids() {
        let rects = [
            Rect::new(0.0, 0.0, 10.0, 10.0).unwrap(),
            Rect::new(20.0, 20.0, 40.0, 40.0).unwrap(),
        ];
        let regions = regions_from_rects(&rects);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].id, 0);
        assert_eq!(regions[1].id, 1);
    }

    #[test]
    fn compare_command_reports_matching_pair() {
        let dir = tempdir().unwrap();
        let baseline = dir.path().join("baseline.png");
        let latest = dir.path().join("latest.png");
        let json_out = dir.path().join("report").join("result.json");
        save_solid(&baseline, 16, 16, [10, 20, 30, 255]);
        save_solid(&latest, 16, 16, [10, 20, 30, 255]);

        command_compare(CompareArgs {
            baseline: baseline.clone(),
            latest,
            options: None,
            defaults: None,
            diff_out: None,
            json_out: Some(json_out.clone()),
        })
        .unwrap();

        let report: Value = serde_json::from_str(&fs::read_to_string(&json_out).unwrap()).unwrap();
        assert_eq!(report["mismatchPercentage"], 0.0);
        assert_eq!(report["isMismatch"], false);
        assert_eq!(report["engine"], "resemble");
        assert_eq!(report["download"], "latest.png");
    }

    #[test]
    fn rebase_copies_latest_over_baseline() {
        let dir = tempdir().unwrap();
        let baseline = dir.path().join("baseline.png");
        let latest = dir.path().join("latest.png");
        save_solid(&baseline, 8, 8, [0, 0, 0, 255]);
        save_solid(&latest, 8, 8, [255, 255, 255, 255]);

        command_rebase(RebaseArgs {
            baseline: baseline.clone(),
            latest: latest.clone(),
            options: None,
            result: None,
            dry_run: false,
        })
        .unwrap();

        assert_eq!(fs::read(&baseline).unwrap(), fs::read(&latest).unwrap());
    }
}
