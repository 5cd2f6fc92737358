// src/binary.rs - Binary mask primitives on 0/255 masks

use image::{ImageBuffer, Luma, Pixel, Primitive};
use imageproc::region_labelling::{connected_components, Connectivity as LabelConnectivity};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::image_utils::{ensure_same_size, is_foreground, BinaryMask, FloatImage, LabelImage, FOREGROUND};

/// Pixel adjacency used when grouping foreground pixels into components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum Connectivity {
    #[default]
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "8")]
    Eight,
}

impl Connectivity {
    fn to_imageproc(self) -> LabelConnectivity {
        match self {
            Connectivity::Four => LabelConnectivity::Four,
            Connectivity::Eight => LabelConnectivity::Eight,
        }
    }
}

/// Boolean operators for combining two masks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    And,
    Or,
    Xor,
}

#[inline]
fn mask_value(foreground: bool) -> Luma<u8> {
    Luma([if foreground { FOREGROUND } else { 0 }])
}

/// Foreground where `low <= value <= high`
pub fn threshold(field: &FloatImage, low: f32, high: f32) -> BinaryMask {
    let (width, height) = field.dimensions();
    BinaryMask::from_fn(width, height, |x, y| {
        let value = field.get_pixel(x, y)[0];
        mask_value(value >= low && value <= high)
    })
}

/// Pixel-wise boolean combination of two same-size masks
pub fn combine(a: &BinaryMask, b: &BinaryMask, op: BooleanOp) -> Result<BinaryMask> {
    ensure_same_size(a.dimensions(), b.dimensions())?;
    let (width, height) = a.dimensions();
    Ok(BinaryMask::from_fn(width, height, |x, y| {
        let pa = is_foreground(a.get_pixel(x, y));
        let pb = is_foreground(b.get_pixel(x, y));
        mask_value(match op {
            BooleanOp::And => pa && pb,
            BooleanOp::Or => pa || pb,
            BooleanOp::Xor => pa ^ pb,
        })
    }))
}

/// Complement of a mask
pub fn not(mask: &BinaryMask) -> BinaryMask {
    let (width, height) = mask.dimensions();
    BinaryMask::from_fn(width, height, |x, y| mask_value(!is_foreground(mask.get_pixel(x, y))))
}

/// Sets to zero every pixel of `image` that lies outside `mask`.
///
/// Works for masks, colour images and scalar fields alike. The target is
/// modified in place.
pub fn constrain_to_mask<P>(image: &mut ImageBuffer<P, Vec<P::Subpixel>>, mask: &BinaryMask) -> Result<()>
where
    P: Pixel,
{
    ensure_same_size(mask.dimensions(), image.dimensions())?;
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if !is_foreground(mask.get_pixel(x, y)) {
            for channel in pixel.channels_mut() {
                *channel = <P::Subpixel as Primitive>::DEFAULT_MIN_VALUE;
            }
        }
    }
    Ok(())
}

/// Label the connected foreground components of a mask.
///
/// Returns the label image (0 = background, 1..=count in raster-scan order of
/// first appearance) and the number of components.
pub fn label_components(mask: &BinaryMask, connectivity: Connectivity) -> (LabelImage, u32) {
    let labels = connected_components(mask, connectivity.to_imageproc(), Luma([0u8]));
    let count = labels.pixels().map(|p| p[0]).max().unwrap_or(0);
    (labels, count)
}

/// Number of pixels of each component, indexed by label (index 0 unused)
pub fn component_sizes(labels: &LabelImage, count: u32) -> Vec<u64> {
    let mut sizes = vec![0u64; count as usize + 1];
    for pixel in labels.pixels() {
        let label = pixel[0] as usize;
        if label > 0 && label < sizes.len() {
            sizes[label] += 1;
        }
    }
    sizes
}

/// Number of connected foreground components
pub fn count_components(mask: &BinaryMask, connectivity: Connectivity) -> u32 {
    label_components(mask, connectivity).1
}

fn mask_from_labels<F>(labels: &LabelImage, keep: F) -> BinaryMask
where
    F: Fn(u32) -> bool,
{
    let (width, height) = labels.dimensions();
    BinaryMask::from_fn(width, height, |x, y| {
        let label = labels.get_pixel(x, y)[0];
        mask_value(label > 0 && keep(label))
    })
}

/// Label of the largest component; exact ties keep the first label and warn
fn largest_label(sizes: &[u64]) -> Option<u32> {
    let mut best: Option<(u32, u64)> = None;
    let mut tied = false;
    for (label, &size) in sizes.iter().enumerate().skip(1) {
        match best {
            Some((_, best_size)) if size > best_size => {
                best = Some((label as u32, size));
                tied = false;
            }
            Some((_, best_size)) if size == best_size => tied = true,
            None if size > 0 => best = Some((label as u32, size)),
            _ => {}
        }
    }
    if tied {
        if let Some((label, size)) = best {
            warn!(
                "Several components share the largest size ({} pixels); keeping the first one (label {})",
                size, label
            );
        }
    }
    best.map(|(label, _)| label)
}

/// Keep only the largest connected component. An empty mask stays empty.
pub fn keep_largest_region(mask: &BinaryMask, connectivity: Connectivity) -> BinaryMask {
    let (labels, count) = label_components(mask, connectivity);
    match largest_label(&component_sizes(&labels, count)) {
        Some(largest) => mask_from_labels(&labels, |label| label == largest),
        None => BinaryMask::new(mask.width(), mask.height()),
    }
}

/// Remove the largest connected component, keeping all the others
pub fn remove_largest_region(mask: &BinaryMask, connectivity: Connectivity) -> BinaryMask {
    let (labels, count) = label_components(mask, connectivity);
    match largest_label(&component_sizes(&labels, count)) {
        Some(largest) => mask_from_labels(&labels, |label| label != largest),
        None => mask.clone(),
    }
}

/// Remove the connected components with fewer than `min_pixels` pixels
pub fn area_opening(mask: &BinaryMask, min_pixels: u64, connectivity: Connectivity) -> BinaryMask {
    let (labels, count) = label_components(mask, connectivity);
    let sizes = component_sizes(&labels, count);
    mask_from_labels(&labels, |label| sizes[label as usize] >= min_pixels)
}

/// Fill the background regions that do not touch the image border.
///
/// Background is grouped with 4-connectivity, so a hole that only touches the
/// outside through a diagonal is still filled.
pub fn fill_holes(mask: &BinaryMask) -> BinaryMask {
    let (width, height) = mask.dimensions();
    let background = not(mask);
    let (labels, count) = label_components(&background, Connectivity::Four);

    let mut touches_border = vec![false; count as usize + 1];
    for (x, y, pixel) in labels.enumerate_pixels() {
        if x == 0 || y == 0 || x + 1 == width || y + 1 == height {
            touches_border[pixel[0] as usize] = true;
        }
    }

    BinaryMask::from_fn(width, height, |x, y| {
        let label = labels.get_pixel(x, y)[0] as usize;
        mask_value(label == 0 || !touches_border[label])
    })
}

/// Morphological reconstruction by dilation of `seed` under `bound`.
///
/// For binary images this keeps every component of `bound` that contains at
/// least one seed pixel; seed pixels outside `bound` are ignored.
pub fn reconstruct_by_dilation(
    seed: &BinaryMask,
    bound: &BinaryMask,
    connectivity: Connectivity,
) -> Result<BinaryMask> {
    ensure_same_size(bound.dimensions(), seed.dimensions())?;
    let (labels, count) = label_components(bound, connectivity);

    let mut reached = vec![false; count as usize + 1];
    for (x, y, pixel) in labels.enumerate_pixels() {
        let label = pixel[0] as usize;
        if label > 0 && is_foreground(seed.get_pixel(x, y)) {
            reached[label] = true;
        }
    }

    Ok(mask_from_labels(&labels, |label| reached[label as usize]))
}
