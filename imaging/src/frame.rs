//! Floating-point CCD frame with its header

use crate::fits::{self, FitsError, FitsHeader};
use crate::ImageData;
use std::path::Path;

/// A single-plane image held as `f64` samples, row-major, with its header.
///
/// All calibration arithmetic happens on this type; it is written back to
/// disk as a 64-bit float FITS image.
#[derive(Debug, Clone)]
pub struct CcdFrame {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
    pub header: FitsHeader,
}

impl CcdFrame {
    /// Build a frame; `data.len()` must equal `width * height`
    pub fn new(width: usize, height: usize, data: Vec<f64>, header: FitsHeader) -> Result<Self, FitsError> {
        if data.len() != width * height {
            return Err(FitsError::InvalidFormat(format!(
                "{} samples do not fill a {}x{} frame",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
            header,
        })
    }

    /// Frame filled with a constant value
    pub fn filled(width: usize, height: usize, value: f64) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
            header: FitsHeader::new(),
        }
    }

    pub fn from_image(image: &ImageData, header: FitsHeader) -> Result<Self, FitsError> {
        if image.channels != 1 {
            return Err(FitsError::InvalidFormat(format!(
                "expected a single image plane, found {}",
                image.channels
            )));
        }
        Self::new(image.width as usize, image.height as usize, image.to_f64_vec(), header)
    }

    /// Read the primary image of a FITS file
    pub fn read(path: &Path) -> Result<Self, FitsError> {
        let (image, header) = fits::read_fits(path)?;
        Self::from_image(&image, header)
    }

    /// Write as a 64-bit float FITS image
    pub fn write(&self, path: &Path) -> Result<(), FitsError> {
        let image = ImageData::from_f64(self.width as u32, self.height as u32, 1, &self.data);
        fits::write_fits(path, &image, &self.header)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    pub fn row(&self, y: usize) -> &[f64] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f64>() / self.data.len() as f64
    }

    /// Exposure time from the given header keyword
    pub fn exposure(&self, keyword: &str) -> Option<f64> {
        self.header.get_float(keyword)
    }
}
