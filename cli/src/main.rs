//! `ccdcal` command line
//!
//! ```text
//! ccdcal summary raw/ --keywords IMAGETYP,EXPTIME,FILTER
//! ccdcal calibrate --raw raw/ --masters reduced/ --output reduced/ --preset cryogenic
//! ccdcal nearest --exposure 310 --candidates 100,300
//! ```

use anyhow::{Context, Result};
use ccdcal_pipeline::{
    find_nearest_dark_exposure, run_calibration, CalibrationRecipe, ImageFileCollection,
    RecipePreset, RunConfig, DEFAULT_DARK_TOLERANCE,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(author, version, about = "CCD image calibration")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print one row per FITS file with selected header keywords
    Summary {
        /// Directory to scan
        dir: PathBuf,
        /// Comma-separated header keywords
        #[arg(long, value_delimiter = ',', default_values = ["IMAGETYP", "EXPTIME", "FILTER", "COMBINED"])]
        keywords: Vec<String>,
    },
    /// Calibrate every science frame in a directory
    Calibrate(CalibrateArgs),
    /// Find the dark exposure time nearest to an image exposure time
    Nearest {
        #[arg(long)]
        exposure: f64,
        /// Comma-separated dark exposure times
        #[arg(long, value_delimiter = ',', required = true)]
        candidates: Vec<f64>,
        #[command(flatten)]
        tolerance: ToleranceArgs,
    },
}

#[derive(Debug, Args)]
struct CalibrateArgs {
    /// Directory of raw science frames
    #[arg(long)]
    raw: PathBuf,
    /// Directory of combined bias, dark and flat frames
    #[arg(long)]
    masters: PathBuf,
    /// Directory for calibrated frames
    #[arg(long)]
    output: PathBuf,
    /// Built-in recipe: cryogenic or thermoelectric
    #[arg(long, value_parser = parse_preset, conflicts_with = "recipe", required_unless_present = "recipe")]
    preset: Option<RecipePreset>,
    /// Recipe JSON file
    #[arg(long)]
    recipe: Option<PathBuf>,
    #[command(flatten)]
    tolerance: ToleranceArgs,
    /// Write a before/after PNG next to each calibrated frame
    #[arg(long)]
    preview: bool,
    /// Write the run report as JSON to this file instead of stdout
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ToleranceArgs {
    /// Largest accepted exposure difference in seconds
    #[arg(long, value_parser = parse_tolerance, conflicts_with = "no_tolerance")]
    tolerance: Option<f64>,
    /// Accept the nearest dark however far its exposure is
    #[arg(long)]
    no_tolerance: bool,
}

impl ToleranceArgs {
    /// `None` leaves the configured tolerance alone
    fn resolve(&self) -> Option<Option<f64>> {
        if self.no_tolerance {
            Some(None)
        } else {
            self.tolerance.map(Some)
        }
    }
}

fn parse_preset(s: &str) -> Result<RecipePreset, String> {
    s.parse().map_err(|e: ccdcal_pipeline::PipelineError| e.to_string())
}

fn parse_tolerance(s: &str) -> Result<f64, String> {
    let tolerance: f64 = s.trim().parse().map_err(|e| format!("{}", e))?;
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(format!("must be a non-negative number of seconds, got {}", s));
    }
    Ok(tolerance)
}

fn init_logging() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .init();
}

fn summary(dir: PathBuf, keywords: &[String]) -> Result<()> {
    let collection = ImageFileCollection::open(&dir)
        .with_context(|| format!("Failed to scan {}", dir.display()))?;
    let keys: Vec<&str> = keywords.iter().map(String::as_str).collect();

    let mut rows = vec![std::iter::once("file").chain(keys.iter().copied()).map(str::to_string).collect::<Vec<_>>()];
    rows.extend(collection.summary(&keys));

    let columns = rows.first().map(Vec::len).unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|c| rows.iter().map(|r| r[c].len()).max().unwrap_or(0))
        .collect();
    for row in &rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect();
        println!("{}", line.join("  ").trim_end());
    }
    Ok(())
}

fn calibrate(args: CalibrateArgs) -> Result<()> {
    let mut recipe = match (&args.recipe, args.preset) {
        (Some(path), _) => CalibrationRecipe::from_json_file(path)
            .with_context(|| format!("Failed to load recipe {}", path.display()))?,
        (None, Some(preset)) => CalibrationRecipe::preset(preset),
        (None, None) => anyhow::bail!("either --preset or --recipe is required"),
    };
    if let Some(tolerance) = args.tolerance.resolve() {
        recipe.dark.tolerance = tolerance;
    }

    let config = RunConfig {
        raw_dir: args.raw,
        masters_dir: args.masters,
        output_dir: args.output,
        recipe,
        write_previews: args.preview,
    };

    let progress = |percent: f64, message: String| {
        tracing::debug!("[{:>5.1}%] {}", percent, message);
    };
    let report = run_calibration(&config, Some(&progress)).context("Calibration failed")?;

    let json = serde_json::to_string_pretty(&report)?;
    match args.report {
        Some(path) => std::fs::write(&path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}

fn nearest(exposure: f64, candidates: &[f64], tolerance: &ToleranceArgs) -> Result<()> {
    let tolerance = tolerance.resolve().unwrap_or(Some(DEFAULT_DARK_TOLERANCE));
    let closest = find_nearest_dark_exposure(exposure, candidates.iter().copied(), tolerance)?;
    println!("{}", closest);
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Summary { dir, keywords } => summary(dir, &keywords),
        Command::Calibrate(args) => calibrate(args),
        Command::Nearest {
            exposure,
            candidates,
            tolerance,
        } => nearest(exposure, &candidates, &tolerance),
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    if let Err(err) = run(cli) {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_calibrate_requires_preset_or_recipe() {
        let parsed = Cli::try_parse_from(["ccdcal", "calibrate", "--raw", "r", "--masters", "m", "--output", "o"]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from([
            "ccdcal", "calibrate", "--raw", "r", "--masters", "m", "--output", "o", "--preset", "cryogenic",
            "--no-tolerance",
        ])
        .unwrap();
        match parsed.command {
            Command::Calibrate(args) => {
                assert_eq!(args.preset, Some(RecipePreset::Cryogenic));
                assert_eq!(args.tolerance.resolve(), Some(None));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_tolerance_flags_conflict() {
        let parsed = Cli::try_parse_from([
            "ccdcal", "nearest", "--exposure", "310", "--candidates", "100,300", "--tolerance", "1", "--no-tolerance",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_tolerance_must_be_finite_and_non_negative() {
        for bad in ["--tolerance=-1", "--tolerance=nan", "--tolerance=inf"] {
            let parsed = Cli::try_parse_from(["ccdcal", "nearest", "--exposure", "310", "--candidates", "300", bad]);
            assert!(parsed.is_err(), "{bad} was accepted");
        }

        let parsed = Cli::try_parse_from(["ccdcal", "nearest", "--exposure", "310", "--candidates", "300", "--tolerance", "10"])
            .unwrap();
        match parsed.command {
            Command::Nearest { tolerance, .. } => assert_eq!(tolerance.resolve(), Some(Some(10.0))),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_nearest_parses_candidates() {
        let parsed = Cli::try_parse_from(["ccdcal", "nearest", "--exposure", "300.2", "--candidates", "100,300"]).unwrap();
        match parsed.command {
            Command::Nearest { exposure, candidates, tolerance } => {
                assert_eq!(exposure, 300.2);
                assert_eq!(candidates, vec![100.0, 300.0]);
                assert_eq!(tolerance.resolve(), None);
                assert!(nearest(exposure, &candidates, &tolerance).is_ok());
                assert!(nearest(310.0, &candidates, &tolerance).is_err());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
