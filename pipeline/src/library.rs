//! Lookup tables of combined calibration frames

use ccdcal_imaging::CcdFrame;
use std::collections::HashMap;

use crate::collection::{HeaderFilter, ImageFileCollection};
use crate::error::{PipelineError, Result};
use crate::matching::{find_nearest_dark_exposure, MatchError};
use crate::recipe::CalibrationRecipe;

/// Combined darks by exposure time, combined flats by filter, and an
/// optional combined bias
#[derive(Debug, Clone, Default)]
pub struct CalibrationLibrary {
    darks: Vec<(f64, CcdFrame)>,
    flats: HashMap<String, CcdFrame>,
    bias: Option<CcdFrame>,
}

impl CalibrationLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect the combined frames a recipe needs from a collection
    pub fn from_collection(masters: &ImageFileCollection, recipe: &CalibrationRecipe) -> Result<Self> {
        let keywords = &recipe.keywords;
        let combined = |image_type: &str| {
            HeaderFilter::new()
                .text(&keywords.image_type, image_type)
                .flag(&keywords.combined, true)
        };

        let mut library = Self::new();

        for (frame, file_name) in masters.frames(&combined(&recipe.image_types.dark))? {
            let exposure = frame.exposure(&keywords.exposure).ok_or_else(|| PipelineError::MissingKeyword {
                file_name: file_name.clone(),
                keyword: keywords.exposure.clone(),
            })?;
            tracing::debug!("Combined dark {} at {}s", file_name, exposure);
            library.insert_dark(exposure, frame);
        }

        for (frame, file_name) in masters.frames(&combined(&recipe.image_types.flat))? {
            let filter = frame
                .header
                .get(&keywords.filter)
                .map(|v| v.to_string())
                .ok_or_else(|| PipelineError::MissingKeyword {
                    file_name: file_name.clone(),
                    keyword: keywords.filter.clone(),
                })?;
            tracing::debug!("Combined flat {} for filter {}", file_name, filter);
            library.insert_flat(&filter, frame);
        }

        if recipe.subtract_bias {
            let mut biases = masters.frames(&combined(&recipe.image_types.bias))?;
            if biases.len() > 1 {
                tracing::warn!(
                    "Found {} combined bias frames, using {}",
                    biases.len(),
                    biases[0].1
                );
            }
            if !biases.is_empty() {
                library.bias = Some(biases.swap_remove(0).0);
            }
        }

        tracing::info!(
            "Calibration library: darks at {:?}s, flats for {:?}, bias {}",
            library.dark_exposures().collect::<Vec<_>>(),
            library.filters(),
            if library.bias.is_some() { "present" } else { "absent" }
        );
        Ok(library)
    }

    /// Add a dark; an existing dark with the same exposure is replaced
    pub fn insert_dark(&mut self, exposure: f64, frame: CcdFrame) {
        match self.darks.iter_mut().find(|(e, _)| *e == exposure) {
            Some(slot) => slot.1 = frame,
            None => self.darks.push((exposure, frame)),
        }
    }

    /// Add a flat; an existing flat for the same filter is replaced
    pub fn insert_flat(&mut self, filter: &str, frame: CcdFrame) {
        self.flats.insert(filter.trim().to_string(), frame);
    }

    pub fn dark_exposures(&self) -> impl Iterator<Item = f64> + '_ {
        self.darks.iter().map(|(exposure, _)| *exposure)
    }

    /// Filter names with a flat, sorted
    pub fn filters(&self) -> Vec<&str> {
        let mut filters: Vec<&str> = self.flats.keys().map(String::as_str).collect();
        filters.sort_unstable();
        filters
    }

    /// Dark whose exposure is nearest to `exposure`, within `tolerance`
    pub fn dark_for(&self, exposure: f64, tolerance: Option<f64>) -> Result<(f64, &CcdFrame)> {
        let closest = find_nearest_dark_exposure(exposure, self.dark_exposures(), tolerance)?;
        self.darks
            .iter()
            .find(|(e, _)| *e == closest)
            .map(|(e, frame)| (*e, frame))
            .ok_or(PipelineError::Match(MatchError::NoCandidates { exposure }))
    }

    pub fn flat_for(&self, filter: &str) -> Result<&CcdFrame> {
        self.flats.get(filter.trim()).ok_or_else(|| PipelineError::MissingFlat {
            filter: filter.to_string(),
        })
    }

    pub fn bias(&self) -> Result<&CcdFrame> {
        self.bias.as_ref().ok_or(PipelineError::MissingBias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_frame;

    fn frame(value: f64) -> CcdFrame {
        CcdFrame::filled(2, 2, value)
    }

    #[test]
    fn test_dark_lookup_with_tolerance() {
        let mut library = CalibrationLibrary::new();
        library.insert_dark(100.0, frame(1.0));
        library.insert_dark(300.0, frame(3.0));

        let (exposure, dark) = library.dark_for(300.2, Some(0.5)).unwrap();
        assert_eq!(exposure, 300.0);
        assert_eq!(dark.data[0], 3.0);

        let err = library.dark_for(310.0, Some(0.5)).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Match(MatchError::ToleranceExceeded { closest, exposure })
                if closest == 300.0 && exposure == 310.0
        ));
    }

    #[test]
    fn test_duplicate_exposure_replaces() {
        let mut library = CalibrationLibrary::new();
        library.insert_dark(60.0, frame(1.0));
        library.insert_dark(60.0, frame(2.0));
        assert_eq!(library.dark_exposures().count(), 1);
        assert_eq!(library.dark_for(60.0, None).unwrap().1.data[0], 2.0);
    }

    #[test]
    fn test_flat_lookup() {
        let mut library = CalibrationLibrary::new();
        library.insert_flat("R ", frame(1.0));
        assert!(library.flat_for("R").is_ok());
        assert!(matches!(
            library.flat_for("V"),
            Err(PipelineError::MissingFlat { filter }) if filter == "V"
        ));
        // Filter names are case-sensitive
        assert!(matches!(
            library.flat_for("r"),
            Err(PipelineError::MissingFlat { filter }) if filter == "r"
        ));
        assert!(matches!(library.bias(), Err(PipelineError::MissingBias)));
    }

    #[test]
    fn test_from_collection_uses_combined_frames_only() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        write_frame(p, "dark_30.fits", 2, 2, 3.0, &[("IMAGETYP", "Dark"), ("EXPTIME", "30"), ("COMBINED", "T")]);
        write_frame(p, "dark_90.fits", 2, 2, 9.0, &[("IMAGETYP", "Dark"), ("EXPTIME", "90"), ("COMBINED", "T")]);
        write_frame(p, "dark_single.fits", 2, 2, 99.0, &[("IMAGETYP", "Dark"), ("EXPTIME", "45")]);
        write_frame(p, "flat_b.fits", 2, 2, 1.0, &[("IMAGETYP", "Flat"), ("FILTER", "B"), ("COMBINED", "T")]);
        write_frame(p, "flat_v.fits", 2, 2, 1.0, &[("IMAGETYP", "Flat"), ("FILTER", "V"), ("COMBINED", "T")]);
        write_frame(p, "bias.fits", 2, 2, 7.0, &[("IMAGETYP", "Bias"), ("COMBINED", "T")]);

        let masters = ImageFileCollection::open(p).unwrap();
        let mut recipe = CalibrationRecipe::thermoelectric();
        let library = CalibrationLibrary::from_collection(&masters, &recipe).unwrap();

        assert_eq!(library.dark_exposures().collect::<Vec<_>>(), vec![30.0, 90.0]);
        assert_eq!(library.filters(), vec!["B", "V"]);
        assert!(library.bias().is_err());

        recipe.subtract_bias = true;
        let library = CalibrationLibrary::from_collection(&masters, &recipe).unwrap();
        assert_eq!(library.bias().unwrap().data[0], 7.0);
    }

    #[test]
    fn test_flat_without_filter_keyword_fails() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), "flat.fits", 2, 2, 1.0, &[("IMAGETYP", "flat"), ("COMBINED", "T")]);
        let masters = ImageFileCollection::open(dir.path()).unwrap();
        let err = CalibrationLibrary::from_collection(&masters, &CalibrationRecipe::default()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingKeyword { keyword, .. } if keyword == "FILTER"));
    }
}
