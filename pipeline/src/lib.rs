//! CCD calibration workflows
//!
//! Selects combined calibration frames from an image collection, matches
//! each science frame to the dark nearest in exposure time and to the flat
//! of its filter, and runs the per-camera recipe over every science frame.

pub mod collection;
pub mod error;
pub mod executor;
pub mod library;
pub mod matching;
pub mod recipe;

pub use collection::{Criterion, HeaderFilter, ImageFileCollection};
pub use error::{PipelineError, Result};
pub use executor::{calibrate_frame, run_calibration, CalibratedFrame, RunConfig, RunReport};
pub use library::CalibrationLibrary;
pub use matching::{find_nearest_dark_exposure, nearest_dark_for_frame, MatchError, DEFAULT_DARK_TOLERANCE};
pub use recipe::{CalibrationRecipe, DarkConfig, FlatConfig, HeaderKeywords, ImageTypes, OverscanConfig, RecipePreset};

#[cfg(test)]
pub(crate) mod test_support {
    use ccdcal_imaging::{CcdFrame, FitsValue};
    use std::path::Path;

    /// Write a constant-valued frame; header values are typed the way a
    /// FITS card would parse them
    pub fn write_frame(dir: &Path, name: &str, width: usize, height: usize, value: f64, keywords: &[(&str, &str)]) {
        let mut frame = CcdFrame::filled(width, height, value);
        for (key, raw) in keywords {
            let typed = match *raw {
                "T" => FitsValue::Boolean(true),
                "F" => FitsValue::Boolean(false),
                _ => raw
                    .parse::<i64>()
                    .map(FitsValue::Integer)
                    .or_else(|_| raw.parse::<f64>().map(FitsValue::Float))
                    .unwrap_or_else(|_| FitsValue::String(raw.to_string())),
            };
            frame.header.set(key, typed);
        }
        frame.write(&dir.join(name)).unwrap();
    }
}
