//! Before/after comparison images
//!
//! Renders a raw frame and its calibrated counterpart side by side as an
//! 8-bit PNG. Each half is stretched independently between its own low and
//! high percentiles so both are readable even though calibration changes the
//! pixel scale.

use crate::CcdFrame;
use image::{GrayImage, Luma};
use std::path::Path;

const LOW_PERCENTILE: f64 = 1.0;
const HIGH_PERCENTILE: f64 = 99.5;
const GAP: u32 = 8;

/// Value at percentile `p` (0-100) of the finite samples, nearest rank
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

/// Stretch limits for a frame
pub fn stretch_limits(frame: &CcdFrame) -> (f64, f64) {
    let mut finite: Vec<f64> = frame.data.iter().copied().filter(|v| v.is_finite()).collect();
    finite.sort_by(|a, b| a.total_cmp(b));
    (percentile(&finite, LOW_PERCENTILE), percentile(&finite, HIGH_PERCENTILE))
}

fn draw_stretched(canvas: &mut GrayImage, frame: &CcdFrame, x_offset: u32, y_offset: u32) {
    let (low, high) = stretch_limits(frame);
    let range = if high > low { high - low } else { 1.0 };

    for y in 0..frame.height {
        for x in 0..frame.width {
            let value = frame.get(x, y);
            let level = if value.is_finite() {
                ((value - low) / range * 255.0).clamp(0.0, 255.0) as u8
            } else {
                0
            };
            // FITS row 0 is the bottom of the image
            let py = y_offset + (frame.height - 1 - y) as u32;
            canvas.put_pixel(x_offset + x as u32, py, Luma([level]));
        }
    }
}

/// Place `before` on the left and `after` on the right
pub fn render_comparison(before: &CcdFrame, after: &CcdFrame) -> GrayImage {
    let width = before.width as u32 + GAP + after.width as u32;
    let height = before.height.max(after.height) as u32;
    let mut canvas = GrayImage::from_pixel(width, height, Luma([0]));

    draw_stretched(&mut canvas, before, 0, height - before.height as u32);
    draw_stretched(&mut canvas, after, before.width as u32 + GAP, height - after.height as u32);
    canvas
}

/// Render and save a comparison image; the format follows the extension
pub fn save_comparison(path: &Path, before: &CcdFrame, after: &CcdFrame) -> Result<(), image::ImageError> {
    render_comparison(before, after).save(path)?;
    tracing::debug!("Wrote comparison image {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_layout_with_trimmed_after() {
        let before = CcdFrame::filled(10, 6, 100.0);
        let after = CcdFrame::filled(8, 6, 1.0);
        let image = render_comparison(&before, &after);
        assert_eq!(image.dimensions(), (10 + GAP + 8, 6));
    }

    #[test]
    fn test_stretch_maps_extremes() {
        let data: Vec<f64> = (0..200).map(f64::from).collect();
        let frame = CcdFrame::new(20, 10, data, Default::default()).unwrap();
        let (low, high) = stretch_limits(&frame);
        assert_eq!(low, 2.0);
        assert_eq!(high, 198.0);

        let image = render_comparison(&frame, &frame);
        // Bottom-left sample (row 0, col 0) is below the low limit
        assert_eq!(image.get_pixel(0, 9)[0], 0);
        // Top-right sample of the left half is above the high limit
        assert_eq!(image.get_pixel(19, 0)[0], 255);
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmp.png");
        let frame = CcdFrame::filled(4, 4, 5.0);
        save_comparison(&path, &frame, &frame).unwrap();
        assert!(path.exists());
    }
}
