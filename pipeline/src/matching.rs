//! Nearest-exposure dark matching

use ccdcal_imaging::CcdFrame;

/// Largest exposure difference, in seconds, accepted between an image and
/// its dark unless the caller says otherwise
pub const DEFAULT_DARK_TOLERANCE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MatchError {
    #[error("Closest dark exposure time is {closest} for image of exposure time {exposure}")]
    ToleranceExceeded { closest: f64, exposure: f64 },

    #[error("No dark exposure times available to match image of exposure time {exposure}")]
    NoCandidates { exposure: f64 },

    #[error("Image exposure time {0} is not a finite number")]
    InvalidExposure(f64),

    #[error("Image has no exposure time in keyword {0}")]
    MissingExposure(String),
}

/// Find the candidate exposure closest to `exposure`.
///
/// The first minimum in iteration order wins a tie. Non-finite candidates
/// are skipped. When `tolerance` is `Some`, a closest difference strictly
/// greater than it is an error; `None` accepts any distance.
pub fn find_nearest_dark_exposure<I>(
    exposure: f64,
    candidates: I,
    tolerance: Option<f64>,
) -> Result<f64, MatchError>
where
    I: IntoIterator<Item = f64>,
{
    if !exposure.is_finite() {
        return Err(MatchError::InvalidExposure(exposure));
    }

    let mut best: Option<(f64, f64)> = None;
    for candidate in candidates.into_iter().filter(|c| c.is_finite()) {
        let diff = (candidate - exposure).abs();
        match best {
            Some((_, best_diff)) if diff >= best_diff => {}
            _ => best = Some((candidate, diff)),
        }
    }

    let (closest, diff) = best.ok_or(MatchError::NoCandidates { exposure })?;

    if let Some(tolerance) = tolerance {
        if diff > tolerance {
            return Err(MatchError::ToleranceExceeded { closest, exposure });
        }
    }

    Ok(closest)
}

/// Match a frame by the exposure time stored in its header
pub fn nearest_dark_for_frame<I>(
    frame: &CcdFrame,
    exposure_keyword: &str,
    candidates: I,
    tolerance: Option<f64>,
) -> Result<f64, MatchError>
where
    I: IntoIterator<Item = f64>,
{
    let exposure = frame
        .exposure(exposure_keyword)
        .ok_or_else(|| MatchError::MissingExposure(exposure_keyword.to_string()))?;
    find_nearest_dark_exposure(exposure, candidates, tolerance)
}
