// src/segmentation.rs - Stem and tissue-region segmentation

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::binary::{
    area_opening, combine, constrain_to_mask, fill_holes, keep_largest_region, not,
    reconstruct_by_dilation, threshold, BooleanOp, Connectivity,
};
use crate::color::ColorFeatures;
use crate::errors::{Result, StemTissueError};
use crate::image_utils::{count_foreground, ensure_same_size, BinaryMask};
use crate::morphology::{binary_opening, StructuringElement};

/// Parameters of stem segmentation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StemParams {
    /// Maximum luma (0-255 scale) of stem pixels
    pub stem_threshold: u8,
    /// Luma above which a pixel seeds an over-exposed hole
    pub hole_threshold_high: f32,
    /// Luma above which a hole may grow
    pub hole_threshold_low: f32,
    /// Diameter of the disk used to erase small bubbles on the stem boundary
    pub bubbles_diameter: u32,
    pub connectivity: Connectivity,
}

impl Default for StemParams {
    fn default() -> Self {
        Self {
            stem_threshold: 200,
            hole_threshold_high: 0.99,
            hole_threshold_low: 0.97,
            bubbles_diameter: 10,
            connectivity: Connectivity::Four,
        }
    }
}

/// Result of stem segmentation
#[derive(Debug, Clone)]
pub struct StemSegmentation {
    /// Stem pixels, holes excluded
    pub stem: BinaryMask,
    /// Over-exposed holes found inside the image
    pub holes: BinaryMask,
}

/// Segment the stem from the luma of a (pre-filtered) section
pub fn segment_stem(features: &ColorFeatures, params: &StemParams) -> Result<StemSegmentation> {
    info!("Segmenting stem");
    let luma = &features.luma;

    let mut stem = threshold(luma, 0.0, params.stem_threshold as f32 / 255.0);
    stem = fill_holes(&stem);

    let strel = StructuringElement::disk_from_diameter(params.bubbles_diameter);
    if strel.radius > 0 {
        stem = binary_opening(&stem, &strel);
    }
    stem = keep_largest_region(&stem, params.connectivity);

    if count_foreground(&stem) == 0 {
        return Err(StemTissueError::EmptySegmentation(
            "no stem pixel below the luma threshold".to_string(),
        ));
    }

    debug!("Detecting holes");
    let seeds = threshold(luma, params.hole_threshold_high, 1.0);
    let growth = threshold(luma, params.hole_threshold_low, 1.0);
    let holes = reconstruct_by_dilation(&seeds, &growth, params.connectivity)?;
    let stem = combine(&stem, &not(&holes), BooleanOp::And)?;

    if count_foreground(&stem) == 0 {
        return Err(StemTissueError::EmptySegmentation(
            "stem is entirely covered by holes".to_string(),
        ));
    }

    debug!("Stem area: {} pixels", count_foreground(&stem));
    Ok(StemSegmentation { stem, holes })
}

/// How the rind is separated from the other dark regions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RindExtractionPolicy {
    /// The rind is the largest dark component
    LargestComponent,
    /// The rind gathers every dark component of at least `max_bundle_size` pixels
    AreaOpening { max_bundle_size: u64 },
}

impl Default for RindExtractionPolicy {
    fn default() -> Self {
        RindExtractionPolicy::AreaOpening { max_bundle_size: 6000 }
    }
}

impl RindExtractionPolicy {
    pub fn extract(&self, dark: &BinaryMask, connectivity: Connectivity) -> BinaryMask {
        match *self {
            RindExtractionPolicy::LargestComponent => keep_largest_region(dark, connectivity),
            RindExtractionPolicy::AreaOpening { max_bundle_size } => {
                area_opening(dark, max_bundle_size, connectivity)
            }
        }
    }
}

/// Parameters of tissue-region segmentation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionParams {
    /// Maximum brightness (0-255 scale) of rind and bundle pixels
    pub dark_threshold: u8,
    /// Minimum hue (0-255 scale) of lignified pixels
    pub red_threshold: u8,
    /// Bundles smaller than this many pixels are discarded
    pub bundles_min_size: u64,
    pub rind_policy: RindExtractionPolicy,
    pub connectivity: Connectivity,
}

impl Default for RegionParams {
    fn default() -> Self {
        Self {
            dark_threshold: 130,
            red_threshold: 170,
            bundles_min_size: 100,
            rind_policy: RindExtractionPolicy::default(),
            connectivity: Connectivity::Four,
        }
    }
}

/// Binary masks of every tissue
#[derive(Debug, Clone)]
pub struct TissueMasks {
    /// Stem mask, with the rind merged back in
    pub stem: BinaryMask,
    pub dark: BinaryMask,
    pub rind: BinaryMask,
    pub bundles: BinaryMask,
    /// Lignified tissue
    pub red: BinaryMask,
    /// Non-lignified tissue
    pub blue: BinaryMask,
}

/// Split a segmented stem into rind, bundles, lignified and non-lignified tissue.
///
/// Returns `SizeMismatch` if the stem mask and the feature rasters differ in
/// size.
pub fn segment_regions(
    features: &ColorFeatures,
    stem: &BinaryMask,
    params: &RegionParams,
) -> Result<TissueMasks> {
    info!("Segmenting stem regions");
    ensure_same_size(features.hue.dimensions(), stem.dimensions())?;
    ensure_same_size(features.brightness.dimensions(), stem.dimensions())?;

    debug!("Extracting dark regions");
    let mut dark = threshold(&features.brightness, 0.0, params.dark_threshold as f32 / 255.0);
    constrain_to_mask(&mut dark, stem)?;

    debug!("Extracting rind");
    let rind = params.rind_policy.extract(&dark, params.connectivity);
    let stem = combine(stem, &rind, BooleanOp::Or)?;

    debug!("Extracting bundles");
    let bundles = combine(&dark, &rind, BooleanOp::Xor)?;
    let bundles = fill_holes(&bundles);
    let bundles = area_opening(&bundles, params.bundles_min_size, params.connectivity);

    debug!("Extracting lignified tissue");
    let red = threshold(&features.hue, params.red_threshold as f32 / 255.0, 1.0);
    // dark tissue keeps its rind or bundle class whatever its hue
    let red = combine(&red, &not(&rind), BooleanOp::And)?;
    let mut red = combine(&red, &not(&bundles), BooleanOp::And)?;
    constrain_to_mask(&mut red, &stem)?;

    // second pass against the stem updated with the rind
    constrain_to_mask(&mut dark, &stem)?;

    debug!("Extracting non-lignified tissue");
    let blue = combine(&not(&red), &not(&rind), BooleanOp::And)?;
    let mut blue = combine(&blue, &not(&bundles), BooleanOp::And)?;
    constrain_to_mask(&mut blue, &stem)?;

    Ok(TissueMasks {
        stem,
        dark,
        rind,
        bundles,
        red,
        blue,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_utils::FOREGROUND;
    use image::{Luma, Rgb, RgbImage};

    fn red_blue_halves() -> RgbImage {
        RgbImage::from_fn(20, 20, |_, y| {
            if y < 10 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        })
    }

    /// Light section with a dark ring of width 2 and one dark 4x4 bundle
    fn ringed_section() -> RgbImage {
        RgbImage::from_fn(30, 30, |x, y| {
            let on_ring = (2..28).contains(&x)
                && (2..28).contains(&y)
                && !((4..26).contains(&x) && (4..26).contains(&y));
            let bundle = (12..16).contains(&x) && (12..16).contains(&y);
            let inside = (2..28).contains(&x) && (2..28).contains(&y);
            if on_ring || bundle {
                Rgb([40, 30, 60])
            } else if inside {
                Rgb([90, 120, 190])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    /// No bubble removal, so the square corners survive
    fn sharp_corners() -> StemParams {
        StemParams {
            bubbles_diameter: 1,
            ..StemParams::default()
        }
    }

    #[test]
    fn all_white_image_has_no_stem() {
        let image = RgbImage::from_pixel(10, 10, Rgb([255, 255, 255]));
        let features = ColorFeatures::extract(&image);
        let result = segment_stem(&features, &StemParams::default());
        assert!(matches!(result, Err(StemTissueError::EmptySegmentation(_))));
    }

    #[test]
    fn saturated_spot_becomes_a_hole() {
        let image = RgbImage::from_fn(20, 20, |x, y| {
            if (8..11).contains(&x) && (8..11).contains(&y) {
                Rgb([255, 255, 255])
            } else {
                Rgb([120, 60, 140])
            }
        });
        let features = ColorFeatures::extract(&image);
        let segmentation = segment_stem(&features, &sharp_corners()).unwrap();
        assert_eq!(count_foreground(&segmentation.holes), 9);
        assert_eq!(count_foreground(&segmentation.stem), 400 - 9);
        assert_eq!(segmentation.stem.get_pixel(9, 9)[0], 0);
    }

    #[test]
    fn hue_halves_split_into_red_and_blue() {
        let image = red_blue_halves();
        let features = ColorFeatures::extract(&image);
        let stem = segment_stem(&features, &StemParams::default()).unwrap().stem;
        assert_eq!(count_foreground(&stem), 400);

        let masks = segment_regions(&features, &stem, &RegionParams::default()).unwrap();
        assert_eq!(count_foreground(&masks.dark), 0);
        assert_eq!(count_foreground(&masks.red), 200);
        assert_eq!(count_foreground(&masks.blue), 200);
        // pure blue has a hue of 2/3, above the 170/255 threshold
        assert_eq!(masks.red.get_pixel(0, 15)[0], FOREGROUND);
        assert_eq!(masks.blue.get_pixel(0, 5)[0], FOREGROUND);
    }

    #[test]
    fn largest_component_policy_separates_ring_from_bundle() {
        let image = ringed_section();
        let features = ColorFeatures::extract(&image);
        let stem = segment_stem(&features, &sharp_corners()).unwrap().stem;
        assert_eq!(count_foreground(&stem), 26 * 26);

        let params = RegionParams {
            bundles_min_size: 10,
            rind_policy: RindExtractionPolicy::LargestComponent,
            ..RegionParams::default()
        };
        let masks = segment_regions(&features, &stem, &params).unwrap();
        assert_eq!(count_foreground(&masks.rind), 26 * 26 - 22 * 22);
        assert_eq!(count_foreground(&masks.bundles), 16);
        assert_eq!(masks.bundles.get_pixel(13, 13)[0], FOREGROUND);
        assert_eq!(masks.blue.get_pixel(13, 13)[0], 0);
        assert_eq!(masks.blue.get_pixel(6, 6)[0], FOREGROUND);
        // the ring is purple enough to pass the hue threshold but stays rind
        assert_eq!(masks.red.get_pixel(2, 2)[0], 0);
        assert_eq!(count_foreground(&masks.red), 0);
    }

    #[test]
    fn area_opening_policy_matches_on_large_ring() {
        let image = ringed_section();
        let features = ColorFeatures::extract(&image);
        let stem = segment_stem(&features, &sharp_corners()).unwrap().stem;
        assert_eq!(count_foreground(&stem), 26 * 26);

        let params = RegionParams {
            bundles_min_size: 10,
            rind_policy: RindExtractionPolicy::AreaOpening { max_bundle_size: 50 },
            ..RegionParams::default()
        };
        let masks = segment_regions(&features, &stem, &params).unwrap();
        assert_eq!(count_foreground(&masks.rind), 26 * 26 - 22 * 22);
        assert_eq!(count_foreground(&masks.bundles), 16);

        // with a huge cutoff nothing qualifies as rind and the ring ends up with the bundles
        let params = RegionParams {
            rind_policy: RindExtractionPolicy::AreaOpening { max_bundle_size: 100_000 },
            ..params
        };
        let masks = segment_regions(&features, &stem, &params).unwrap();
        assert_eq!(count_foreground(&masks.rind), 0);
        assert!(count_foreground(&masks.bundles) > 16);
    }

    #[test]
    fn mismatched_stem_is_rejected() {
        let image = red_blue_halves();
        let features = ColorFeatures::extract(&image);
        let stem = BinaryMask::from_pixel(10, 10, Luma([FOREGROUND]));
        assert!(matches!(
            segment_regions(&features, &stem, &RegionParams::default()),
            Err(StemTissueError::SizeMismatch { .. })
        ));
    }
}
