// src/color.rs - Per-pixel colour features, hue as a fraction of a turn

use image::{DynamicImage, Rgb, RgbImage};

use crate::errors::{Result, StemTissueError};
use crate::image_utils::FloatImage;

/// Converts a byte triplet to (hue, saturation, value), as fractions.
///
/// Achromatic pixels get a hue and saturation of exactly zero.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let cmax = r.max(g).max(b);
    let cmin = r.min(g).min(b);

    let value = cmax as f32 / 255.0;
    let saturation = if cmax != 0 {
        (cmax - cmin) as f32 / cmax as f32
    } else {
        0.0
    };

    let hue = if cmax == cmin {
        0.0
    } else {
        chromatic_hue(r, g, b, cmax, cmin)
    };

    (hue, saturation, value)
}

/// Converts a byte triplet to (hue, saturation, lightness), as fractions.
pub fn rgb_to_hsl(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let cmax = r.max(g).max(b);
    let cmin = r.min(g).min(b);

    let maxi = cmax as f32 / 255.0;
    let mini = cmin as f32 / 255.0;
    let lightness = (maxi + mini) / 2.0;

    if cmax == cmin {
        return (0.0, 0.0, lightness);
    }

    let delta = maxi - mini;
    let saturation = if lightness < 0.5 {
        delta / (maxi + mini)
    } else {
        delta / (2.0 - maxi - mini)
    };

    (chromatic_hue(r, g, b, cmax, cmin), saturation, lightness)
}

/// Hue of a chromatic pixel (cmax > cmin), wrapped into [0, 1)
fn chromatic_hue(r: u8, g: u8, b: u8, cmax: u8, cmin: u8) -> f32 {
    let span = (cmax - cmin) as f32;
    let red_c = (cmax - r) as f32 / span;
    let green_c = (cmax - g) as f32 / span;
    let blue_c = (cmax - b) as f32 / span;

    let mut hue = if r == cmax {
        blue_c - green_c
    } else if g == cmax {
        2.0 + red_c - blue_c
    } else {
        4.0 + green_c - red_c
    };
    hue /= 6.0;

    if hue < 0.0 {
        hue += 1.0;
    }
    if hue >= 1.0 {
        hue -= 1.0;
    }
    hue
}

/// Luma of a byte triplet, normalised to [0, 1]
#[inline]
pub fn luma_of(pixel: &Rgb<u8>) -> f32 {
    let weighted = pixel[0] as f32 * 0.299 + pixel[1] as f32 * 0.587 + pixel[2] as f32 * 0.114;
    (weighted / 255.0).min(1.0)
}

fn map_pixels<F>(image: &RgbImage, f: F) -> FloatImage
where
    F: Fn(&Rgb<u8>) -> f32,
{
    let (width, height) = image.dimensions();
    FloatImage::from_fn(width, height, |x, y| image::Luma([f(image.get_pixel(x, y))]))
}

/// Hue raster (HSV/HSB convention)
pub fn hue(image: &RgbImage) -> FloatImage {
    map_pixels(image, |p| rgb_to_hsv(p[0], p[1], p[2]).0)
}

/// Saturation raster (HSV/HSB convention)
pub fn saturation(image: &RgbImage) -> FloatImage {
    map_pixels(image, |p| rgb_to_hsv(p[0], p[1], p[2]).1)
}

/// Brightness (HSV value) raster
pub fn brightness(image: &RgbImage) -> FloatImage {
    map_pixels(image, |p| rgb_to_hsv(p[0], p[1], p[2]).2)
}

/// Luma raster, weighted sum of the RGB components
pub fn luma(image: &RgbImage) -> FloatImage {
    map_pixels(image, luma_of)
}

/// Lightness raster (HSL convention)
pub fn lightness(image: &RgbImage) -> FloatImage {
    map_pixels(image, |p| rgb_to_hsl(p[0], p[1], p[2]).2)
}

/// Saturation raster (HSL convention)
pub fn hsl_saturation(image: &RgbImage) -> FloatImage {
    map_pixels(image, |p| rgb_to_hsl(p[0], p[1], p[2]).1)
}

/// The scalar fields consumed by the segmentation stages
pub struct ColorFeatures {
    pub hue: FloatImage,
    pub brightness: FloatImage,
    pub luma: FloatImage,
}

impl ColorFeatures {
    /// Extract hue, brightness and luma in a single pass over the image
    pub fn extract(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let mut hue = FloatImage::new(width, height);
        let mut brightness = FloatImage::new(width, height);
        let mut luma = FloatImage::new(width, height);

        for (x, y, pixel) in image.enumerate_pixels() {
            let (h, _, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
            hue.put_pixel(x, y, image::Luma([h]));
            brightness.put_pixel(x, y, image::Luma([v]));
            luma.put_pixel(x, y, image::Luma([luma_of(pixel)]));
        }

        Self { hue, brightness, luma }
    }
}

/// Three-channel colour spaces an RGB image can be split into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Hsv,
    Hsl,
}

impl ColorSpace {
    pub fn channel_names(&self) -> [&'static str; 3] {
        match self {
            ColorSpace::Hsv => ["Hue", "Saturation", "Value"],
            ColorSpace::Hsl => ["Hue", "Saturation", "Luminance"],
        }
    }

    pub fn convert_pixel(&self, pixel: &Rgb<u8>) -> (f32, f32, f32) {
        match self {
            ColorSpace::Hsv => rgb_to_hsv(pixel[0], pixel[1], pixel[2]),
            ColorSpace::Hsl => rgb_to_hsl(pixel[0], pixel[1], pixel[2]),
        }
    }

    /// Split an image into one raster per channel of this colour space
    pub fn convert(&self, image: &RgbImage) -> [FloatImage; 3] {
        let (width, height) = image.dimensions();
        let mut channels = [
            FloatImage::new(width, height),
            FloatImage::new(width, height),
            FloatImage::new(width, height),
        ];
        for (x, y, pixel) in image.enumerate_pixels() {
            let (c0, c1, c2) = self.convert_pixel(pixel);
            channels[0].put_pixel(x, y, image::Luma([c0]));
            channels[1].put_pixel(x, y, image::Luma([c1]));
            channels[2].put_pixel(x, y, image::Luma([c2]));
        }
        channels
    }
}

/// Accept only colour images; grayscale inputs are a type mismatch
pub fn require_color(image: &DynamicImage) -> Result<RgbImage> {
    match image {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_) => Err(StemTissueError::TypeMismatch(
            "requires a colour image, got a grayscale one".to_string(),
        )),
        other => Ok(other.to_rgb8()),
    }
}
