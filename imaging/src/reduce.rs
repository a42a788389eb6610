//! Frame-level reduction arithmetic
//!
//! Each operation consumes a frame by reference and returns a new, corrected
//! frame. The output header is a copy of the input header with a `HISTORY`
//! card appended that records the step.

use crate::section::{Section, SectionError};
use crate::CcdFrame;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ReduceError {
    #[error("{operation}: calibration frame is {found:?} but the image is {expected:?} (width, height)")]
    ShapeMismatch {
        operation: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error(transparent)]
    Section(#[from] SectionError),

    #[error("{operation}: {which} frame has no usable exposure time in keyword {keyword}")]
    MissingExposure {
        operation: &'static str,
        which: &'static str,
        keyword: String,
    },

    #[error("flat_correct: flat mean {mean} cannot be used for normalization")]
    DegenerateFlat { mean: f64 },
}

/// Statistic used to collapse each overscan line to one value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverscanStat {
    #[default]
    Median,
    Mean,
}

impl OverscanStat {
    fn apply(&self, values: &mut [f64]) -> f64 {
        match self {
            OverscanStat::Mean => values.iter().sum::<f64>() / values.len() as f64,
            OverscanStat::Median => median(values),
        }
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn check_shape(operation: &'static str, image: &CcdFrame, other: &CcdFrame) -> Result<(), ReduceError> {
    if image.shape() != other.shape() {
        return Err(ReduceError::ShapeMismatch {
            operation,
            expected: image.shape(),
            found: other.shape(),
        });
    }
    Ok(())
}

/// Subtract the bias level measured in an overscan region.
///
/// A region taller than it is wide yields one level per row; otherwise one
/// level per column. The level is subtracted from the whole line, overscan
/// included.
pub fn subtract_overscan(
    frame: &CcdFrame,
    overscan: &Section,
    stat: OverscanStat,
) -> Result<CcdFrame, ReduceError> {
    let region = overscan.resolve(frame.width, frame.height)?;
    let per_row = region.height() >= region.width();

    let mut out = frame.clone();
    if per_row {
        let mut line = Vec::with_capacity(region.width());
        for y in region.rows.clone() {
            line.clear();
            line.extend_from_slice(&frame.row(y)[region.cols.clone()]);
            let level = stat.apply(&mut line);
            for value in &mut out.data[y * frame.width..(y + 1) * frame.width] {
                *value -= level;
            }
        }
    } else {
        let mut line = Vec::with_capacity(region.height());
        for x in region.cols.clone() {
            line.clear();
            line.extend(region.rows.clone().map(|y| frame.get(x, y)));
            let level = stat.apply(&mut line);
            for y in 0..frame.height {
                out.data[y * frame.width + x] -= level;
            }
        }
    }

    tracing::debug!(
        "Subtracted overscan {} ({:?}, {})",
        overscan,
        stat,
        if per_row { "per row" } else { "per column" }
    );
    out.header.add_history(format!(
        "subtract_overscan: overscan={} stat={:?}",
        overscan, stat
    ));
    Ok(out)
}

/// Crop a frame to `section`
pub fn trim_image(frame: &CcdFrame, section: &Section) -> Result<CcdFrame, ReduceError> {
    let region = section.resolve(frame.width, frame.height)?;

    let mut data = Vec::with_capacity(region.width() * region.height());
    for y in region.rows.clone() {
        data.extend_from_slice(&frame.row(y)[region.cols.clone()]);
    }

    let mut header = frame.header.clone();
    header.add_history(format!("trim_image: section={}", section));
    Ok(CcdFrame {
        width: region.width(),
        height: region.height(),
        data,
        header,
    })
}

/// Subtract a combined bias frame
pub fn subtract_bias(frame: &CcdFrame, bias: &CcdFrame) -> Result<CcdFrame, ReduceError> {
    check_shape("subtract_bias", frame, bias)?;

    let mut out = frame.clone();
    for (value, b) in out.data.iter_mut().zip(&bias.data) {
        *value -= b;
    }
    out.header.add_history("subtract_bias: combined bias subtracted");
    Ok(out)
}

/// Subtract a combined dark frame.
///
/// With `scale`, the dark is multiplied by the ratio of the image exposure to
/// the dark exposure (both read from `exposure_keyword`) before subtraction.
pub fn subtract_dark(
    frame: &CcdFrame,
    dark: &CcdFrame,
    exposure_keyword: &str,
    scale: bool,
) -> Result<CcdFrame, ReduceError> {
    check_shape("subtract_dark", frame, dark)?;

    let missing = |which| ReduceError::MissingExposure {
        operation: "subtract_dark",
        which,
        keyword: exposure_keyword.to_string(),
    };

    let factor = if scale {
        let image_exposure = frame
            .exposure(exposure_keyword)
            .filter(|e| e.is_finite())
            .ok_or_else(|| missing("image"))?;
        let dark_exposure = dark
            .exposure(exposure_keyword)
            .filter(|e| e.is_finite() && *e > 0.0)
            .ok_or_else(|| missing("dark"))?;
        image_exposure / dark_exposure
    } else {
        1.0
    };

    let mut out = frame.clone();
    for (value, d) in out.data.iter_mut().zip(&dark.data) {
        *value -= d * factor;
    }

    let dark_exposure = dark.exposure(exposure_keyword);
    out.header.add_history(match dark_exposure {
        Some(exposure) => format!("subtract_dark: dark exposure={} scale={:.6}", exposure, factor),
        None => format!("subtract_dark: scale={:.6}", factor),
    });
    Ok(out)
}

/// Divide by a flat normalized to its mean.
///
/// Flat values below `min_value` are raised to it before normalization.
pub fn flat_correct(
    frame: &CcdFrame,
    flat: &CcdFrame,
    min_value: Option<f64>,
) -> Result<CcdFrame, ReduceError> {
    check_shape("flat_correct", frame, flat)?;

    let flat_data: Vec<f64> = match min_value {
        Some(min) => flat.data.iter().map(|&v| v.max(min)).collect(),
        None => flat.data.clone(),
    };
    let mean = flat_data.iter().sum::<f64>() / flat_data.len() as f64;
    if !mean.is_finite() || mean == 0.0 {
        return Err(ReduceError::DegenerateFlat { mean });
    }

    let mut out = frame.clone();
    for (value, f) in out.data.iter_mut().zip(&flat_data) {
        *value /= f / mean;
    }
    out.header.add_history(format!("flat_correct: flat normalized by mean {:.6}", mean));
    Ok(out)
}
