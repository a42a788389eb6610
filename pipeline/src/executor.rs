//! Calibration run
//!
//! Scans the raw and combined-frame directories, builds the calibration
//! library, then calibrates every science frame in file order:
//! 1. Subtract overscan (if the recipe has a region)
//! 2. Trim (if the recipe has a section)
//! 3. Subtract the combined bias (if requested)
//! 4. Subtract the combined dark nearest in exposure time
//! 5. Divide by the combined flat for the frame's filter
//! 6. Write the result under the original file name

use ccdcal_imaging::{
    flat_correct, preview, subtract_bias, subtract_dark, subtract_overscan, trim_image, CcdFrame,
    ReduceError,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::collection::{HeaderFilter, ImageFileCollection};
use crate::error::{PipelineError, Result};
use crate::library::CalibrationLibrary;
use crate::recipe::CalibrationRecipe;

/// Directories and recipe for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Raw science frames
    pub raw_dir: PathBuf,
    /// Combined bias, dark and flat frames
    pub masters_dir: PathBuf,
    /// Calibrated frames are written here
    pub output_dir: PathBuf,
    pub recipe: CalibrationRecipe,
    /// Also write `<stem>_comparison.png` for each frame
    pub write_previews: bool,
}

/// Outcome for one calibrated frame
#[derive(Debug, Clone, Serialize)]
pub struct CalibratedFrame {
    pub file_name: String,
    pub exposure: f64,
    pub dark_exposure: f64,
    pub filter: String,
    pub output: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub recipe: String,
    pub frames: Vec<CalibratedFrame>,
}

/// Run a full calibration.
///
/// Stops at the first frame that cannot be calibrated; frames already
/// written stay on disk.
pub fn run_calibration(
    config: &RunConfig,
    progress_callback: Option<&(dyn Fn(f64, String) + Send + Sync)>,
) -> Result<RunReport> {
    let recipe = &config.recipe;
    recipe.validate()?;

    if let Some(cb) = progress_callback {
        cb(0.0, "Scanning image collections".to_string());
    }

    let raw = ImageFileCollection::open(&config.raw_dir)?;
    let masters = ImageFileCollection::open(&config.masters_dir)?;
    let library = CalibrationLibrary::from_collection(&masters, recipe)?;

    let science_filter = HeaderFilter::new().text(&recipe.keywords.image_type, &recipe.image_types.science);
    let science_files = raw.files_filtered(&science_filter);

    tracing::info!(
        "Calibrating {} '{}' frames from {} with recipe '{}'",
        science_files.len(),
        recipe.image_types.science,
        raw.location().display(),
        recipe.name
    );
    if science_files.is_empty() {
        tracing::warn!("No science frames found in {}", raw.location().display());
    }

    std::fs::create_dir_all(&config.output_dir).map_err(|source| PipelineError::Io {
        path: config.output_dir.clone(),
        source,
    })?;

    let total = science_files.len();
    let mut frames = Vec::with_capacity(total);
    for (index, file_name) in science_files.iter().enumerate() {
        if let Some(cb) = progress_callback {
            cb(
                index as f64 / total as f64 * 100.0,
                format!("Calibrating {} ({}/{})", file_name, index + 1, total),
            );
        }

        let path = raw.path_of(file_name);
        let light = CcdFrame::read(&path).map_err(|source| PipelineError::Fits { path, source })?;
        let outcome = calibrate_frame(&light, file_name, &library, config)?;

        tracing::info!(
            "{}: exposure {}s, dark {}s, filter {} -> {}",
            outcome.file_name,
            outcome.exposure,
            outcome.dark_exposure,
            outcome.filter,
            outcome.output.display()
        );
        frames.push(outcome);
    }

    if let Some(cb) = progress_callback {
        cb(100.0, format!("Calibrated {} frames", frames.len()));
    }

    Ok(RunReport {
        recipe: recipe.name.clone(),
        frames,
    })
}

/// Apply the recipe to one frame, write it, and describe what was done
pub fn calibrate_frame(
    light: &CcdFrame,
    file_name: &str,
    library: &CalibrationLibrary,
    config: &RunConfig,
) -> Result<CalibratedFrame> {
    let recipe = &config.recipe;
    let keywords = &recipe.keywords;
    let reduce_err = |source: ReduceError| PipelineError::Reduce {
        file_name: file_name.to_string(),
        source,
    };
    let missing = |keyword: &str| PipelineError::MissingKeyword {
        file_name: file_name.to_string(),
        keyword: keyword.to_string(),
    };

    let exposure = light
        .exposure(&keywords.exposure)
        .ok_or_else(|| missing(&keywords.exposure))?;
    let filter = light
        .header
        .get(&keywords.filter)
        .map(|v| v.to_string())
        .ok_or_else(|| missing(&keywords.filter))?;

    let mut reduced = match &recipe.overscan {
        Some(overscan) => subtract_overscan(light, &overscan.region, overscan.stat).map_err(reduce_err)?,
        None => light.clone(),
    };

    if let Some(section) = &recipe.trim {
        reduced = trim_image(&reduced, section).map_err(reduce_err)?;
    }

    if recipe.subtract_bias {
        reduced = subtract_bias(&reduced, library.bias()?).map_err(reduce_err)?;
    }

    let (dark_exposure, dark) = library
        .dark_for(exposure, recipe.dark.tolerance)
        .map_err(|e| match e {
            PipelineError::Match(source) => PipelineError::DarkMatch {
                file_name: file_name.to_string(),
                source,
            },
            other => other,
        })?;
    reduced = subtract_dark(&reduced, dark, &keywords.exposure, recipe.dark.scale).map_err(reduce_err)?;

    let flat = library.flat_for(&filter)?;
    reduced = flat_correct(&reduced, flat, recipe.flat.min_value).map_err(reduce_err)?;

    let output = config.output_dir.join(file_name);
    reduced.write(&output).map_err(|source| PipelineError::Fits {
        path: output.clone(),
        source,
    })?;

    let preview = if config.write_previews {
        let preview_path = comparison_path(&config.output_dir, file_name);
        preview::save_comparison(&preview_path, light, &reduced).map_err(|e| PipelineError::Preview {
            path: preview_path.clone(),
            message: e.to_string(),
        })?;
        Some(preview_path)
    } else {
        None
    };

    Ok(CalibratedFrame {
        file_name: file_name.to_string(),
        exposure,
        dark_exposure,
        filter,
        output,
        preview,
    })
}

fn comparison_path(output_dir: &Path, file_name: &str) -> PathBuf {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    output_dir.join(format!("{}_comparison.png", stem))
}
