//! CCD imaging primitives
//!
//! FITS file I/O, raw pixel buffers, the floating-point `CcdFrame` used for
//! calibration arithmetic, and side-by-side comparison rendering.

pub mod fits;
pub mod frame;
pub mod preview;
pub mod reduce;
pub mod section;

pub use fits::{
    read_fits, read_fits_header, write_fits, FitsError, FitsHeader, FitsValue, StandardKeywords,
};
pub use frame::CcdFrame;
pub use reduce::{
    flat_correct, subtract_bias, subtract_dark, subtract_overscan, trim_image, OverscanStat,
    ReduceError,
};
pub use section::{Section, SectionError};

/// Pixel storage type of a raw image buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    U8,
    U16,
    F32,
    F64,
}

impl PixelType {
    /// Size of one sample in bytes
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelType::U8 => 1,
            PixelType::U16 => 2,
            PixelType::F32 => 4,
            PixelType::F64 => 8,
        }
    }
}

/// Raw image buffer as stored on disk.
///
/// Samples are kept little-endian in `data`; the FITS layer converts to and
/// from big-endian on the way in and out.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub pixel_type: PixelType,
    pub data: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32, channels: u32, pixel_type: PixelType) -> Self {
        let size = width as usize * height as usize * channels as usize * pixel_type.bytes_per_pixel();
        Self {
            width,
            height,
            channels,
            pixel_type,
            data: vec![0u8; size],
        }
    }

    pub fn from_u16(width: u32, height: u32, channels: u32, pixels: &[u16]) -> Self {
        Self {
            width,
            height,
            channels,
            pixel_type: PixelType::U16,
            data: pixels.iter().flat_map(|p| p.to_le_bytes()).collect(),
        }
    }

    pub fn from_f64(width: u32, height: u32, channels: u32, pixels: &[f64]) -> Self {
        Self {
            width,
            height,
            channels,
            pixel_type: PixelType::F64,
            data: pixels.iter().flat_map(|p| p.to_le_bytes()).collect(),
        }
    }

    /// Number of samples in the buffer
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    /// Decode every sample to `f64`
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match self.pixel_type {
            PixelType::U8 => self.data.iter().map(|&v| v as f64).collect(),
            PixelType::U16 => self
                .data
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]) as f64)
                .collect(),
            PixelType::F32 => self
                .data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
                .collect(),
            PixelType::F64 => self
                .data
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect(),
        }
    }
}
