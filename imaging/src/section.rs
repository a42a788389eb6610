//! Rectangular pixel regions
//!
//! A section is written the way array slices are written in most reduction
//! notebooks: `"[rows, cols]"`, each axis `start:stop`, zero-based and
//! half-open, with either end optional. `"[:, 2055:]"` selects every row of
//! the columns from 2055 to the right edge.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SectionError {
    #[error("Malformed section '{0}': expected \"[rows, cols]\" with start:stop on each axis")]
    Malformed(String),
    #[error("Section {section} is outside a {width}x{height} image")]
    OutOfBounds {
        section: Section,
        width: usize,
        height: usize,
    },
    #[error("Section {0} selects no pixels")]
    Empty(Section),
}

/// One axis of a section; `None` ends mean "from the start" / "to the end"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisSlice {
    pub start: Option<usize>,
    pub stop: Option<usize>,
}

impl AxisSlice {
    pub fn new(start: Option<usize>, stop: Option<usize>) -> Self {
        Self { start, stop }
    }

    pub fn full() -> Self {
        Self::default()
    }

    /// Concrete range against an axis of length `len`
    fn resolve(&self, len: usize) -> Option<Range<usize>> {
        let start = self.start.unwrap_or(0);
        let stop = self.stop.unwrap_or(len);
        if start > stop || stop > len {
            return None;
        }
        Some(start..stop)
    }
}

impl fmt::Display for AxisSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(start) = self.start {
            write!(f, "{}", start)?;
        }
        write!(f, ":")?;
        if let Some(stop) = self.stop {
            write!(f, "{}", stop)?;
        }
        Ok(())
    }
}

impl FromStr for AxisSlice {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bound = |part: &str| -> Result<Option<usize>, ()> {
            let part = part.trim();
            if part.is_empty() {
                Ok(None)
            } else {
                part.parse().map(Some).map_err(|_| ())
            }
        };
        match s.split_once(':') {
            Some((start, stop)) => Ok(Self::new(bound(start)?, bound(stop)?)),
            None => Err(()),
        }
    }
}

/// A rectangular region, rows first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Section {
    pub rows: AxisSlice,
    pub cols: AxisSlice,
}

/// Resolved section bounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

impl Region {
    pub fn width(&self) -> usize {
        self.cols.len()
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }
}

impl Section {
    pub fn new(rows: AxisSlice, cols: AxisSlice) -> Self {
        Self { rows, cols }
    }

    /// Every row, columns `start..`
    pub fn columns_from(start: usize) -> Self {
        Self::new(AxisSlice::full(), AxisSlice::new(Some(start), None))
    }

    /// Every row, columns `..stop`
    pub fn columns_until(stop: usize) -> Self {
        Self::new(AxisSlice::full(), AxisSlice::new(None, Some(stop)))
    }

    /// Resolve against an image of the given size
    pub fn resolve(&self, width: usize, height: usize) -> Result<Region, SectionError> {
        let out_of_bounds = || SectionError::OutOfBounds {
            section: *self,
            width,
            height,
        };
        let rows = self.rows.resolve(height).ok_or_else(out_of_bounds)?;
        let cols = self.cols.resolve(width).ok_or_else(out_of_bounds)?;
        if rows.is_empty() || cols.is_empty() {
            return Err(SectionError::Empty(*self));
        }
        Ok(Region { rows, cols })
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.rows, self.cols)
    }
}

impl FromStr for Section {
    type Err = SectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || SectionError::Malformed(s.to_string());
        let inner = s
            .trim()
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(malformed)?;
        let (rows, cols) = inner.split_once(',').ok_or_else(malformed)?;
        Ok(Self {
            rows: rows.parse().map_err(|_| malformed())?,
            cols: cols.parse().map_err(|_| malformed())?,
        })
    }
}

impl TryFrom<String> for Section {
    type Error = SectionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Section> for String {
    fn from(section: Section) -> Self {
        section.to_string()
    }
}
