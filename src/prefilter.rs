// src/prefilter.rs - Morphological smoothing of stained sections

use image::{Rgb, Rgb32FImage, RgbImage};
use imageproc::filter::separable_filter_equal;
use log::debug;

use crate::morphology::{gray_closing, gray_opening, StructuringElement};

/// Parameters of the colour pre-filter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrefilterParams {
    /// Octagon radius of the closing that removes thin dark cell walls
    pub closing_radius: u32,
    /// Octagon radius of the opening that removes small bright spots
    pub opening_radius: u32,
    /// Gaussian smoothing; 0 disables it
    pub smoothing_sigma: f32,
}

impl Default for PrefilterParams {
    fn default() -> Self {
        Self {
            closing_radius: 6,
            opening_radius: 12,
            smoothing_sigma: 4.0,
        }
    }
}

/// Smooth a stained section before segmentation.
///
/// Each channel goes through a grey-level closing, then an opening, both with
/// octagonal elements, then a Gaussian blur.
pub fn prefilter(image: &RgbImage, params: &PrefilterParams) -> RgbImage {
    debug!(
        "Pre-filtering {}x{} image (closing {}, opening {}, sigma {})",
        image.width(),
        image.height(),
        params.closing_radius,
        params.opening_radius,
        params.smoothing_sigma
    );

    let mut filtered = image.clone();
    if params.closing_radius > 0 {
        filtered = gray_closing(&filtered, &StructuringElement::octagon(params.closing_radius));
    }
    if params.opening_radius > 0 {
        filtered = gray_opening(&filtered, &StructuringElement::octagon(params.opening_radius));
    }
    if params.smoothing_sigma > 0.0 {
        filtered = gaussian_blur(&filtered, params.smoothing_sigma);
    }
    filtered
}

/// Sampled Gaussian truncated at three sigma, weights summing to one
fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().max(1.0) as i32;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|x| (-((x * x) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|w| *w /= sum);
    kernel
}

/// Mean-preserving Gaussian blur of each channel.
///
/// Filtering runs on `f32` samples and rounds once at the end, so flat
/// areas keep their exact value.
fn gaussian_blur(image: &RgbImage, sigma: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    let samples = Rgb32FImage::from_fn(width, height, |x, y| {
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        Rgb([r as f32, g as f32, b as f32])
    });

    let blurred = separable_filter_equal(&samples, &gaussian_kernel(sigma));

    RgbImage::from_fn(width, height, |x, y| {
        let Rgb(channels) = *blurred.get_pixel(x, y);
        Rgb(channels.map(|c| c.round().clamp(0.0, 255.0) as u8))
    })
}
