use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

use crate::errors::{Result, StemTissueError};

/// Scalar field or distance map, one `f32` per pixel
pub type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Binary mask coded 0 (background) / 255 (foreground)
pub type BinaryMask = GrayImage;

/// Integer label raster, 0 = unassigned
pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Value written for foreground pixels of a binary mask
pub const FOREGROUND: u8 = 255;

/// Check if a mask pixel is foreground
#[inline]
pub fn is_foreground(pixel: &Luma<u8>) -> bool {
    pixel[0] > 0
}

/// Check if a point is inside the image bounds
#[inline]
pub fn in_bounds(x: i32, y: i32, width: u32, height: u32) -> bool {
    x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height
}

/// Fail with `SizeMismatch` unless both rasters have the same dimensions
pub fn ensure_same_size(expected: (u32, u32), found: (u32, u32)) -> Result<()> {
    if expected != found {
        return Err(StemTissueError::SizeMismatch { expected, found });
    }
    Ok(())
}

/// Number of foreground pixels in a mask
pub fn count_foreground(mask: &BinaryMask) -> u64 {
    mask.pixels().filter(|p| is_foreground(p)).count() as u64
}

/// Resize an image to the specified dimensions
pub fn resize_image(
    image: &RgbImage,
    dimensions: [u32; 2],
) -> RgbImage {
    let (width, height) = (dimensions[0], dimensions[1]);
    image::imageops::resize(
        image,
        width,
        height,
        image::imageops::FilterType::Triangle,
    )
}

#[inline]
fn is_black(pixel: &Rgb<u8>) -> bool {
    pixel[0] == 0 && pixel[1] == 0 && pixel[2] == 0
}

/// Crop the pure black margins that scanners sometimes leave around a slide.
///
/// The border width is measured along the middle row (left/right margins)
/// and the middle column (top/bottom margins). An entirely black image is
/// returned unchanged.
pub fn remove_black_border(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let y_mid = height / 2;
    let x_mid = width / 2;

    let x_min = (0..width).find(|&x| !is_black(image.get_pixel(x, y_mid)));
    let x_max = (0..width).rev().find(|&x| !is_black(image.get_pixel(x, y_mid)));
    let y_min = (0..height).find(|&y| !is_black(image.get_pixel(x_mid, y)));
    let y_max = (0..height).rev().find(|&y| !is_black(image.get_pixel(x_mid, y)));

    match (x_min, x_max, y_min, y_max) {
        (Some(x0), Some(x1), Some(y0), Some(y1)) => {
            image::imageops::crop_imm(image, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image()
        }
        _ => image.clone(),
    }
}

/// Convert a label image with small label values to an 8-bit image for saving
pub fn labels_to_gray(labels: &LabelImage) -> GrayImage {
    let (width, height) = labels.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        Luma([labels.get_pixel(x, y)[0].min(u8::MAX as u32) as u8])
    })
}

/// Convert a label image to 16 bits, used for distance classes that may exceed 255
pub fn labels_to_gray16(labels: &LabelImage) -> ImageBuffer<Luma<u16>, Vec<u16>> {
    let (width, height) = labels.dimensions();
    ImageBuffer::from_fn(width, height, |x, y| {
        Luma([labels.get_pixel(x, y)[0].min(u16::MAX as u32) as u16])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn black_border_is_cropped() {
        let image = RgbImage::from_fn(10, 8, |x, y| {
            if (2..8).contains(&x) && (1..6).contains(&y) {
                Rgb([200, 100, 50])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let cropped = remove_black_border(&image);
        assert_eq!(cropped.dimensions(), (6, 5));
        assert_eq!(*cropped.get_pixel(0, 0), Rgb([200, 100, 50]));
    }

    #[test]
    fn all_black_image_is_left_alone() {
        let image = RgbImage::new(4, 4);
        assert_eq!(remove_black_border(&image).dimensions(), (4, 4));
    }

    #[test]
    fn size_check_reports_both_dimensions() {
        assert!(ensure_same_size((3, 4), (3, 4)).is_ok());
        match ensure_same_size((3, 4), (4, 3)) {
            Err(StemTissueError::SizeMismatch { expected, found }) => {
                assert_eq!(expected, (3, 4));
                assert_eq!(found, (4, 3));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
