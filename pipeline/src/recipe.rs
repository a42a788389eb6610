//! Per-camera calibration recipes
//!
//! A recipe lists which calibration steps a camera needs and how each one is
//! configured. Recipes load from JSON; any field left out takes the value
//! from [`CalibrationRecipe::default`].

use ccdcal_imaging::{OverscanStat, Section, StandardKeywords};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{PipelineError, Result};
use crate::matching::DEFAULT_DARK_TOLERANCE;

/// Header keyword names the workflow reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderKeywords {
    pub image_type: String,
    pub exposure: String,
    pub filter: String,
    pub combined: String,
}

impl Default for HeaderKeywords {
    fn default() -> Self {
        Self {
            image_type: StandardKeywords::IMAGETYP.to_string(),
            exposure: StandardKeywords::EXPTIME.to_string(),
            filter: StandardKeywords::FILTER.to_string(),
            combined: StandardKeywords::COMBINED.to_string(),
        }
    }
}

/// Image type values identifying each kind of frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageTypes {
    pub science: String,
    pub bias: String,
    pub dark: String,
    pub flat: String,
}

impl Default for ImageTypes {
    fn default() -> Self {
        Self {
            science: "light".to_string(),
            bias: "bias".to_string(),
            dark: "dark".to_string(),
            flat: "flat".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverscanConfig {
    pub region: Section,
    #[serde(default)]
    pub stat: OverscanStat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DarkConfig {
    /// Largest accepted exposure difference in seconds; `null` disables the check
    pub tolerance: Option<f64>,
    /// Scale the dark by the image/dark exposure ratio
    pub scale: bool,
}

impl Default for DarkConfig {
    fn default() -> Self {
        Self {
            tolerance: Some(DEFAULT_DARK_TOLERANCE),
            scale: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatConfig {
    /// Flat values below this are raised to it before normalization
    pub min_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationRecipe {
    pub name: String,
    pub keywords: HeaderKeywords,
    pub image_types: ImageTypes,
    pub overscan: Option<OverscanConfig>,
    pub trim: Option<Section>,
    pub subtract_bias: bool,
    pub dark: DarkConfig,
    pub flat: FlatConfig,
}

impl Default for CalibrationRecipe {
    fn default() -> Self {
        Self {
            name: "custom".to_string(),
            keywords: HeaderKeywords::default(),
            image_types: ImageTypes::default(),
            overscan: None,
            trim: None,
            subtract_bias: false,
            dark: DarkConfig::default(),
            flat: FlatConfig::default(),
        }
    }
}

/// Built-in recipes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipePreset {
    /// Cryogenically-cooled camera with an overscan region right of the
    /// 2048 light-sensitive columns
    Cryogenic,
    /// Thermoelectrically-cooled camera without overscan; darks carry the bias
    Thermoelectric,
}

impl FromStr for RecipePreset {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cryogenic" | "cryo" => Ok(RecipePreset::Cryogenic),
            "thermoelectric" | "te" => Ok(RecipePreset::Thermoelectric),
            other => Err(PipelineError::Recipe(format!(
                "unknown preset '{}', expected cryogenic or thermoelectric",
                other
            ))),
        }
    }
}

impl CalibrationRecipe {
    pub fn preset(preset: RecipePreset) -> Self {
        match preset {
            RecipePreset::Cryogenic => Self::cryogenic(),
            RecipePreset::Thermoelectric => Self::thermoelectric(),
        }
    }

    pub fn cryogenic() -> Self {
        Self {
            name: "cryogenic".to_string(),
            image_types: ImageTypes {
                science: "object".to_string(),
                ..ImageTypes::default()
            },
            overscan: Some(OverscanConfig {
                region: Section::columns_from(2055),
                stat: OverscanStat::Median,
            }),
            trim: Some(Section::columns_until(2048)),
            ..Self::default()
        }
    }

    pub fn thermoelectric() -> Self {
        Self {
            name: "thermoelectric".to_string(),
            ..Self::default()
        }
    }

    /// Load a recipe from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let recipe: Self = serde_json::from_str(&text)
            .map_err(|e| PipelineError::Recipe(format!("{}: {}", path.display(), e)))?;
        recipe.validate()?;
        Ok(recipe)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(tolerance) = self.dark.tolerance {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(PipelineError::Recipe(format!(
                    "dark tolerance must be a non-negative number, got {}",
                    tolerance
                )));
            }
        }
        if let Some(min_value) = self.flat.min_value {
            if !min_value.is_finite() {
                return Err(PipelineError::Recipe("flat min_value must be finite".to_string()));
            }
        }
        let keywords = [
            &self.keywords.image_type,
            &self.keywords.exposure,
            &self.keywords.filter,
            &self.keywords.combined,
        ];
        if keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(PipelineError::Recipe("header keyword names cannot be empty".to_string()));
        }
        Ok(())
    }
}
