use image::{Luma, RgbImage};
use log::{debug, warn};
use serde::Serialize;

use crate::binary::{count_components, Connectivity};
use crate::errors::{Result, StemTissueError};
use crate::image_utils::{ensure_same_size, BinaryMask, LabelImage, FOREGROUND};
use crate::labels::TissueClass;
use crate::profile::{mean_values_by_region, ProfileTarget};
use crate::table::RegionTable;

/// Column names of a summary row, in output order
pub const SUMMARY_COLUMNS: [&str; 18] = [
    "LignifiedFraction",
    "NonLignifiedFraction",
    "RindFraction",
    "BundleFraction",
    "BundleNumber",
    "BundleDensity",
    "LignifiedMeanRed",
    "LignifiedMeanGreen",
    "LignifiedMeanBlue",
    "NonLignifiedMeanRed",
    "NonLignifiedMeanGreen",
    "NonLignifiedMeanBlue",
    "RindMeanRed",
    "RindMeanGreen",
    "RindMeanBlue",
    "BundleMeanRed",
    "BundleMeanGreen",
    "BundleMeanBlue",
];

/// Area fractions, bundle statistics and mean colours of one section
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSummary {
    pub stem_pixel_count: u64,
    /// Stem area in physical units (pixel count times resolution squared)
    pub stem_area: f64,
    pub lignified_fraction: f64,
    pub non_lignified_fraction: f64,
    pub rind_fraction: f64,
    pub bundle_fraction: f64,
    pub bundle_count: u32,
    /// Bundles per unit of stem area
    pub bundle_density: f64,
    /// Mean RGB of each tissue, in `TissueClass::ALL` order
    pub mean_colors: [[f64; 3]; 4],
}

impl RegionSummary {
    /// Row recorded for an image whose segmentation failed
    pub fn degenerate() -> Self {
        Self {
            stem_pixel_count: 0,
            stem_area: f64::NAN,
            lignified_fraction: f64::NAN,
            non_lignified_fraction: f64::NAN,
            rind_fraction: f64::NAN,
            bundle_fraction: f64::NAN,
            bundle_count: 0,
            bundle_density: f64::NAN,
            mean_colors: [[f64::NAN; 3]; 4],
        }
    }

    pub fn fractions(&self) -> [f64; 4] {
        [
            self.lignified_fraction,
            self.non_lignified_fraction,
            self.rind_fraction,
            self.bundle_fraction,
        ]
    }

    /// Values matching `SUMMARY_COLUMNS`
    pub fn values(&self) -> Vec<f64> {
        let bundle_count = if self.stem_pixel_count == 0 {
            f64::NAN
        } else {
            self.bundle_count as f64
        };
        let mut values = self.fractions().to_vec();
        values.push(bundle_count);
        values.push(self.bundle_density);
        values.extend(self.mean_colors.iter().flatten());
        values
    }
}

/// Mask of the pixels carrying one label
fn label_mask(labels: &LabelImage, label: u32) -> BinaryMask {
    let (width, height) = labels.dimensions();
    BinaryMask::from_fn(width, height, |x, y| {
        Luma([if labels.get_pixel(x, y)[0] == label { FOREGROUND } else { 0 }])
    })
}

/// Mean colour of each tissue class, one row per tissue in fixed order
pub fn tissue_color_table(color: &RgbImage, labels: &LabelImage) -> Result<RegionTable> {
    let by_label = mean_values_by_region(ProfileTarget::Color(color), labels, TissueClass::ALL.len() as u32)?;
    let mut table = RegionTable::new(by_label.columns.clone());
    for (class, row) in TissueClass::ALL.iter().zip(by_label.rows) {
        table.push_row(class.name(), row.values)?;
    }
    Ok(table)
}

/// Quantify a tissue label image.
///
/// `resolution` is the size of a pixel in physical units. Fails with
/// `EmptySegmentation` when no pixel carries a tissue label.
pub fn quantify_regions(
    color: &RgbImage,
    labels: &LabelImage,
    resolution: f64,
    connectivity: Connectivity,
) -> Result<RegionSummary> {
    if !(resolution > 0.0) {
        return Err(StemTissueError::InvalidParameter(format!(
            "resolution must be > 0, got {}",
            resolution
        )));
    }
    ensure_same_size(labels.dimensions(), color.dimensions())?;

    let mut counts = [0u64; 5];
    let mut unknown = 0u64;
    for pixel in labels.pixels() {
        match pixel[0] {
            label @ 0..=4 => counts[label as usize] += 1,
            _ => unknown += 1,
        }
    }
    if unknown > 0 {
        warn!("{} pixels carry an unknown label and were not counted", unknown);
    }

    let stem_pixel_count: u64 = counts[1..].iter().sum();
    if stem_pixel_count == 0 {
        return Err(StemTissueError::EmptySegmentation(
            "label image contains no tissue pixel".to_string(),
        ));
    }
    let fraction = |class: TissueClass| counts[class.label() as usize] as f64 / stem_pixel_count as f64;

    let bundles = label_mask(labels, TissueClass::Bundle.label());
    let bundle_count = count_components(&bundles, connectivity);

    let stem_area = stem_pixel_count as f64 * resolution * resolution;
    let bundle_density = bundle_count as f64 / stem_area;

    let colors = tissue_color_table(color, labels)?;
    let mut mean_colors = [[f64::NAN; 3]; 4];
    for (means, row) in mean_colors.iter_mut().zip(&colors.rows) {
        means.copy_from_slice(&row.values);
    }

    debug!(
        "Stem: {} pixels, {} bundles, density {:.6}",
        stem_pixel_count, bundle_count, bundle_density
    );

    Ok(RegionSummary {
        stem_pixel_count,
        stem_area,
        lignified_fraction: fraction(TissueClass::Lignified),
        non_lignified_fraction: fraction(TissueClass::NonLignified),
        rind_fraction: fraction(TissueClass::Rind),
        bundle_fraction: fraction(TissueClass::Bundle),
        bundle_count,
        bundle_density,
        mean_colors,
    })
}
