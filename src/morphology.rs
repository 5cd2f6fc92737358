use image::{ImageBuffer, Pixel};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::image_utils::{in_bounds, BinaryMask};

/// Shape of a flat structuring element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrelShape {
    Disk,
    Octagon,
    Square,
}

/// Flat structuring element centred on the origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuringElement {
    pub shape: StrelShape,
    pub radius: u32,
}

impl StructuringElement {
    pub fn new(shape: StrelShape, radius: u32) -> Self {
        Self { shape, radius }
    }

    pub fn disk(radius: u32) -> Self {
        Self::new(StrelShape::Disk, radius)
    }

    pub fn octagon(radius: u32) -> Self {
        Self::new(StrelShape::Octagon, radius)
    }

    pub fn square(radius: u32) -> Self {
        Self::new(StrelShape::Square, radius)
    }

    /// Disk fitting a given diameter in pixels, used for bubble removal
    pub fn disk_from_diameter(diameter: u32) -> Self {
        Self::disk(diameter.saturating_sub(1) / 2)
    }

    /// Relative offsets covered by the element
    pub fn offsets(&self) -> Vec<(i32, i32)> {
        let r = self.radius as i32;
        // r^2 + 1 makes the radius-1 disk a full 3x3 square
        let disk_limit = r * r + 1;
        let octagon_limit = (self.radius as f64 * std::f64::consts::SQRT_2).round() as i32;

        let mut offsets = Vec::new();
        for dy in -r..=r {
            for dx in -r..=r {
                let inside = match self.shape {
                    StrelShape::Square => true,
                    StrelShape::Disk => dx * dx + dy * dy <= disk_limit,
                    StrelShape::Octagon => dx.abs() + dy.abs() <= octagon_limit,
                };
                if inside {
                    offsets.push((dx, dy));
                }
            }
        }
        offsets
    }
}

#[derive(Clone, Copy)]
enum RankOp {
    Min,
    Max,
}

/// Min or max filter over the element, channel by channel.
///
/// Neighbours falling outside the image are ignored, so an image that is
/// entirely foreground is left unchanged by any opening or closing.
fn rank_filter<P>(
    image: &ImageBuffer<P, Vec<u8>>,
    strel: &StructuringElement,
    op: RankOp,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + Send + Sync,
{
    let (width, height) = image.dimensions();
    let channels = P::CHANNEL_COUNT as usize;
    let offsets = strel.offsets();
    let row_len = width as usize * channels;

    let mut data = vec![0u8; row_len * height as usize];
    if row_len == 0 {
        return ImageBuffer::from_raw(width, height, data).unwrap_or_else(|| ImageBuffer::new(width, height));
    }

    data.par_chunks_mut(row_len)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                let mut acc = [match op {
                    RankOp::Min => u8::MAX,
                    RankOp::Max => u8::MIN,
                }; 4];

                for &(dx, dy) in &offsets {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if !in_bounds(nx, ny, width, height) {
                        continue;
                    }
                    let neighbour = image.get_pixel(nx as u32, ny as u32).channels();
                    for c in 0..channels {
                        acc[c] = match op {
                            RankOp::Min => acc[c].min(neighbour[c]),
                            RankOp::Max => acc[c].max(neighbour[c]),
                        };
                    }
                }

                let start = x as usize * channels;
                row[start..start + channels].copy_from_slice(&acc[..channels]);
            }
        });

    ImageBuffer::from_raw(width, height, data).unwrap_or_else(|| ImageBuffer::new(width, height))
}

/// Grey-level erosion (minimum over the element), per channel
pub fn erode<P>(image: &ImageBuffer<P, Vec<u8>>, strel: &StructuringElement) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + Send + Sync,
{
    rank_filter(image, strel, RankOp::Min)
}

/// Grey-level dilation (maximum over the element), per channel
pub fn dilate<P>(image: &ImageBuffer<P, Vec<u8>>, strel: &StructuringElement) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + Send + Sync,
{
    rank_filter(image, strel, RankOp::Max)
}

/// Morphological opening (erosion followed by dilation)
pub fn gray_opening<P>(image: &ImageBuffer<P, Vec<u8>>, strel: &StructuringElement) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + Send + Sync,
{
    dilate(&erode(image, strel), strel)
}

/// Morphological closing (dilation followed by erosion)
pub fn gray_closing<P>(image: &ImageBuffer<P, Vec<u8>>, strel: &StructuringElement) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + Send + Sync,
{
    erode(&dilate(image, strel), strel)
}

/// Binary opening; removes foreground structures thinner than the element
pub fn binary_opening(mask: &BinaryMask, strel: &StructuringElement) -> BinaryMask {
    gray_opening(mask, strel)
}

/// Binary closing; fills background gaps thinner than the element
pub fn binary_closing(mask: &BinaryMask, strel: &StructuringElement) -> BinaryMask {
    gray_closing(mask, strel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_utils::{count_foreground, FOREGROUND};
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn element_sizes() {
        assert_eq!(StructuringElement::square(2).offsets().len(), 25);
        assert_eq!(StructuringElement::disk(1).offsets().len(), 9);
        assert_eq!(StructuringElement::disk(0).offsets(), vec![(0, 0)]);
        // radius 2 disk: 5x5 square minus its four corners
        assert_eq!(StructuringElement::disk(2).offsets().len(), 21);
        // radius 3 octagon: 7x7 square minus three pixels per corner
        assert_eq!(StructuringElement::octagon(3).offsets().len(), 37);
        assert_eq!(StructuringElement::disk_from_diameter(10).radius, 4);
    }

    #[test]
    fn opening_removes_thin_line_and_keeps_block() {
        let mask = BinaryMask::from_fn(12, 12, |x, y| {
            let block = (1..8).contains(&x) && (1..8).contains(&y);
            let line = y == 10;
            Luma([if block || line { FOREGROUND } else { 0 }])
        });
        let opened = binary_opening(&mask, &StructuringElement::square(1));
        assert_eq!(count_foreground(&opened), 49);
        assert_eq!(opened.get_pixel(5, 10)[0], 0);
    }

    #[test]
    fn full_image_is_stable_under_opening() {
        let mask = BinaryMask::from_pixel(6, 4, Luma([FOREGROUND]));
        let opened = binary_opening(&mask, &StructuringElement::disk(3));
        assert_eq!(opened, mask);
    }

    #[test]
    fn closing_fills_single_pixel_gap() {
        let mut mask = BinaryMask::from_pixel(7, 7, Luma([FOREGROUND]));
        mask.put_pixel(3, 3, Luma([0]));
        let closed = binary_closing(&mask, &StructuringElement::square(1));
        assert_eq!(count_foreground(&closed), 49);
    }

    #[test]
    fn color_erosion_works_per_channel() {
        let mut image = RgbImage::from_pixel(3, 3, Rgb([100, 150, 200]));
        image.put_pixel(1, 1, Rgb([10, 250, 200]));
        let eroded = erode(&image, &StructuringElement::square(1));
        assert_eq!(*eroded.get_pixel(0, 0), Rgb([10, 150, 200]));
        let dilated = dilate(&image, &StructuringElement::square(1));
        assert_eq!(*dilated.get_pixel(2, 2), Rgb([100, 250, 200]));
    }
}
