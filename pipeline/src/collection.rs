//! Directory-backed image collection
//!
//! Indexes the FITS files of one directory by their primary headers so
//! calibration frames and science frames can be selected by keyword.

use ccdcal_imaging::{read_fits_header, CcdFrame, FitsHeader, FitsValue};
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

const FITS_EXTENSIONS: [&str; 3] = ["fit", "fits", "fts"];

/// One test applied to a header keyword
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// Rendered value equals the text, ignoring case and surrounding blanks
    Text(String),
    /// Numeric value equals the number
    Number(f64),
    /// Boolean value equals the flag
    Flag(bool),
    /// Keyword is present with any value
    Present,
}

impl Criterion {
    fn matches(&self, value: Option<&FitsValue>) -> bool {
        match (self, value) {
            (Criterion::Present, value) => value.is_some(),
            (_, None) => false,
            (Criterion::Text(text), Some(value)) => {
                value.to_string().trim().eq_ignore_ascii_case(text.trim())
            }
            (Criterion::Number(number), Some(value)) => value.as_f64() == Some(*number),
            (Criterion::Flag(flag), Some(value)) => value.as_bool() == Some(*flag),
        }
    }
}

/// Conjunction of keyword criteria
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderFilter {
    criteria: Vec<(String, Criterion)>,
}

impl HeaderFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, keyword: &str, value: &str) -> Self {
        self.criteria.push((keyword.to_string(), Criterion::Text(value.to_string())));
        self
    }

    pub fn number(mut self, keyword: &str, value: f64) -> Self {
        self.criteria.push((keyword.to_string(), Criterion::Number(value)));
        self
    }

    pub fn flag(mut self, keyword: &str, value: bool) -> Self {
        self.criteria.push((keyword.to_string(), Criterion::Flag(value)));
        self
    }

    pub fn present(mut self, keyword: &str) -> Self {
        self.criteria.push((keyword.to_string(), Criterion::Present));
        self
    }

    pub fn matches(&self, header: &FitsHeader) -> bool {
        self.criteria
            .iter()
            .all(|(keyword, criterion)| criterion.matches(header.get(keyword)))
    }
}

/// Header of one file in the collection
#[derive(Debug, Clone)]
pub struct CollectionEntry {
    pub file_name: String,
    pub header: FitsHeader,
}

/// FITS files of a directory, indexed by header
#[derive(Debug, Clone)]
pub struct ImageFileCollection {
    location: PathBuf,
    entries: Vec<CollectionEntry>,
}

fn is_fits_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FITS_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

impl ImageFileCollection {
    /// Scan `location` and read the header of every FITS file in it.
    ///
    /// Subdirectories are not searched. A header that cannot be read fails
    /// the whole scan.
    pub fn open(location: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let location = location.into();
        let read_dir = std::fs::read_dir(&location).map_err(|source| PipelineError::Io {
            path: location.clone(),
            source,
        })?;

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|source| PipelineError::Io {
                path: location.clone(),
                source,
            })?;
            let path = dir_entry.path();
            if !path.is_file() || !is_fits_file(&path) {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                tracing::warn!("Skipping file with non UTF-8 name: {}", path.display());
                continue;
            };
            let header = read_fits_header(&path).map_err(|source| PipelineError::Fits {
                path: path.clone(),
                source,
            })?;
            entries.push(CollectionEntry { file_name, header });
        }
        entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        tracing::info!("Indexed {} FITS files in {}", entries.len(), location.display());
        Ok(Self { location, entries })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn entries(&self) -> &[CollectionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path_of(&self, file_name: &str) -> PathBuf {
        self.location.join(file_name)
    }

    /// Names of files whose headers pass `filter`
    pub fn files_filtered(&self, filter: &HeaderFilter) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| filter.matches(&entry.header))
            .map(|entry| entry.file_name.clone())
            .collect()
    }

    /// Load every file whose header passes `filter`, paired with its name
    pub fn frames(&self, filter: &HeaderFilter) -> Result<Vec<(CcdFrame, String)>, PipelineError> {
        self.files_filtered(filter)
            .into_iter()
            .map(|file_name| {
                let path = self.path_of(&file_name);
                let frame = CcdFrame::read(&path).map_err(|source| PipelineError::Fits { path, source })?;
                Ok((frame, file_name))
            })
            .collect()
    }

    /// Values of `keyword` across the collection, in file order.
    ///
    /// Files without the keyword are skipped; `unique` keeps the first
    /// occurrence of each value.
    pub fn values(&self, keyword: &str, unique: bool) -> Vec<String> {
        let mut values: Vec<String> = Vec::new();
        for entry in &self.entries {
            if let Some(value) = entry.header.get(keyword) {
                let rendered = value.to_string();
                if !unique || !values.contains(&rendered) {
                    values.push(rendered);
                }
            }
        }
        values
    }

    /// One row per file: the file name followed by each keyword's value,
    /// empty where the keyword is missing
    pub fn summary(&self, keywords: &[&str]) -> Vec<Vec<String>> {
        self.entries
            .iter()
            .map(|entry| {
                std::iter::once(entry.file_name.clone())
                    .chain(keywords.iter().map(|keyword| {
                        entry
                            .header
                            .get(keyword)
                            .map(|v| v.to_string())
                            .unwrap_or_default()
                    }))
                    .collect()
            })
            .collect()
    }
}
