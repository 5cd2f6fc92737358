// src/profile.rs - Radial distance classes and per-class means

use image::{Luma, RgbImage};
use log::{debug, warn};

use crate::distance::{distance_map, DistanceMetric};
use crate::errors::{Result, StemTissueError};
use crate::image_utils::{ensure_same_size, is_foreground, BinaryMask, FloatImage, LabelImage};
use crate::table::RegionTable;

pub const MEAN_GRAY: &str = "Mean_Gray";
pub const MEAN_RED: &str = "Mean_Red";
pub const MEAN_GREEN: &str = "Mean_Green";
pub const MEAN_BLUE: &str = "Mean_Blue";
pub const LIGNIFICATION: &str = "Lignification";

/// Image whose values are averaged over regions
#[derive(Debug, Clone, Copy)]
pub enum ProfileTarget<'a> {
    Gray(&'a FloatImage),
    Color(&'a RgbImage),
}

impl<'a> ProfileTarget<'a> {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ProfileTarget::Gray(image) => image.dimensions(),
            ProfileTarget::Color(image) => image.dimensions(),
        }
    }

    pub fn column_names(&self) -> &'static [&'static str] {
        match self {
            ProfileTarget::Gray(_) => &[MEAN_GRAY],
            ProfileTarget::Color(_) => &[MEAN_RED, MEAN_GREEN, MEAN_BLUE],
        }
    }

    fn channel_count(&self) -> usize {
        self.column_names().len()
    }

    #[inline]
    fn accumulate(&self, x: u32, y: u32, sums: &mut [f64]) {
        match self {
            ProfileTarget::Gray(image) => sums[0] += image.get_pixel(x, y)[0] as f64,
            ProfileTarget::Color(image) => {
                let pixel = image.get_pixel(x, y);
                for c in 0..3 {
                    sums[c] += pixel[c] as f64;
                }
            }
        }
    }
}

/// Bin a distance map into `n` classes of equal width.
///
/// A pixel at distance d gets class `ceil(min(d, max) / (max / n))`, at most
/// `n`; pixels at distance 0 get class 0. Returns the class image and the
/// maximum distance.
pub fn distance_classes(distances: &FloatImage, n: u32) -> Result<(LabelImage, f32)> {
    if n == 0 {
        return Err(StemTissueError::InvalidParameter(
            "the number of distance classes must be > 0".to_string(),
        ));
    }

    let max_distance = distances.pixels().map(|p| p[0]).fold(0.0f32, f32::max);
    if max_distance <= 0.0 {
        return Err(StemTissueError::EmptySegmentation(
            "distance map has no foreground pixel".to_string(),
        ));
    }

    let max = max_distance as f64;
    let class_width = max / n as f64;
    let (width, height) = distances.dimensions();
    let classes = LabelImage::from_fn(width, height, |x, y| {
        let d = (distances.get_pixel(x, y)[0] as f64).min(max);
        let class = (d / class_width).ceil().max(0.0) as u32;
        Luma([class.min(n)])
    });

    Ok((classes, max_distance))
}

/// Mean of the target over every region `1..=n` of a region image.
///
/// Produces one row per region, labelled by its index, in ascending order.
/// Regions without pixels get NaN means.
pub fn mean_values_by_region(target: ProfileTarget<'_>, regions: &LabelImage, n: u32) -> Result<RegionTable> {
    ensure_same_size(regions.dimensions(), target.dimensions())?;

    let channels = target.channel_count();
    let mut sums = vec![0.0f64; (n as usize + 1) * channels];
    let mut counts = vec![0u64; n as usize + 1];
    let mut outside = 0u64;

    for (x, y, pixel) in regions.enumerate_pixels() {
        let region = pixel[0];
        if region == 0 {
            continue;
        }
        if region > n {
            outside += 1;
            continue;
        }
        let start = region as usize * channels;
        target.accumulate(x, y, &mut sums[start..start + channels]);
        counts[region as usize] += 1;
    }
    if outside > 0 {
        warn!("{} pixels have a region index above {} and were ignored", outside, n);
    }

    let mut table = RegionTable::new(target.column_names().iter().copied());
    for region in 1..=n as usize {
        let count = counts[region];
        let values = (0..channels)
            .map(|c| {
                if count == 0 {
                    f64::NAN
                } else {
                    sums[region * channels + c] / count as f64
                }
            })
            .collect();
        table.push_row(region.to_string(), values)?;
    }
    Ok(table)
}

/// Classes and per-class means of a radial profile
#[derive(Debug, Clone)]
pub struct RadialProfile {
    pub classes: LabelImage,
    pub max_distance: f32,
    pub table: RegionTable,
}

/// Profile of a target image along the distance to the mask boundary.
///
/// Pixels of `holes` are left out of every class.
pub fn radial_profile(
    mask: &BinaryMask,
    holes: Option<&BinaryMask>,
    target: ProfileTarget<'_>,
    n: u32,
    metric: DistanceMetric,
) -> Result<RadialProfile> {
    if n == 0 {
        return Err(StemTissueError::InvalidParameter(
            "the number of distance classes must be > 0".to_string(),
        ));
    }
    ensure_same_size(mask.dimensions(), target.dimensions())?;
    if let Some(holes) = holes {
        ensure_same_size(mask.dimensions(), holes.dimensions())?;
    }

    debug!("Computing {} radial classes with {:?} distance", n, metric);
    let distances = distance_map(mask, metric);
    let (mut classes, max_distance) = distance_classes(&distances, n)?;

    if let Some(holes) = holes {
        for (x, y, pixel) in classes.enumerate_pixels_mut() {
            if is_foreground(holes.get_pixel(x, y)) {
                pixel[0] = 0;
            }
        }
    }

    let table = mean_values_by_region(target, &classes, n)?;
    Ok(RadialProfile {
        classes,
        max_distance,
        table,
    })
}

/// Add the `Lignification` column, the ratio of mean red to mean blue.
///
/// Rows with a zero or undefined blue mean get NaN.
pub fn add_lignification_ratio(table: &mut RegionTable) -> Result<()> {
    let red = table.column_index(MEAN_RED);
    let blue = table.column_index(MEAN_BLUE);
    let (Some(red), Some(blue)) = (red, blue) else {
        return Err(StemTissueError::InvalidParameter(
            "lignification needs Mean_Red and Mean_Blue columns".to_string(),
        ));
    };

    table.add_column(LIGNIFICATION, |row| {
        let blue_mean = row.values[blue];
        if blue_mean == 0.0 || blue_mean.is_nan() {
            f64::NAN
        } else {
            row.values[red] / blue_mean
        }
    });
    Ok(())
}

/// Mean colour of the pixels inside a mask, NaN when the mask is empty
pub fn mean_color_in_mask(image: &RgbImage, mask: &BinaryMask) -> Result<[f64; 3]> {
    ensure_same_size(mask.dimensions(), image.dimensions())?;
    let mut sums = [0.0f64; 3];
    let mut count = 0u64;
    for (x, y, pixel) in image.enumerate_pixels() {
        if is_foreground(mask.get_pixel(x, y)) {
            for c in 0..3 {
                sums[c] += pixel[c] as f64;
            }
            count += 1;
        }
    }
    if count == 0 {
        return Ok([f64::NAN; 3]);
    }
    Ok(sums.map(|s| s / count as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_utils::FOREGROUND;
    use assert_approx_eq::assert_approx_eq;
    use image::Rgb;

    /// 5x5 square centred in a 7x7 image
    fn centred_square() -> BinaryMask {
        BinaryMask::from_fn(7, 7, |x, y| {
            Luma([if (1..6).contains(&x) && (1..6).contains(&y) { FOREGROUND } else { 0 }])
        })
    }

    #[test]
    fn square_splits_into_two_shells() {
        let mask = centred_square();
        let distances = distance_map(&mask, DistanceMetric::Chessboard);
        // target value is ten times the distance to the boundary
        let target = FloatImage::from_fn(7, 7, |x, y| Luma([10.0 * distances.get_pixel(x, y)[0]]));

        let profile = radial_profile(&mask, None, ProfileTarget::Gray(&target), 2, DistanceMetric::Chessboard).unwrap();
        assert_approx_eq!(profile.max_distance, 3.0);
        assert_eq!(profile.table.len(), 2);
        assert_eq!(profile.table.rows[0].label, "1");

        let means = profile.table.column(MEAN_GRAY).unwrap();
        assert_approx_eq!(means[0], 10.0);
        assert_approx_eq!(means[1], 190.0 / 9.0);

        let in_class = |c: u32| profile.classes.pixels().filter(|p| p[0] == c).count();
        assert_eq!(in_class(0), 49 - 25);
        assert_eq!(in_class(1), 16);
        assert_eq!(in_class(2), 9);
    }

    #[test]
    fn classes_grow_with_distance() {
        let mask = BinaryMask::from_pixel(21, 15, Luma([FOREGROUND]));
        let distances = distance_map(&mask, DistanceMetric::Exact);
        let (classes, _) = distance_classes(&distances, 5).unwrap();

        let mut pairs: Vec<(f32, u32)> = distances
            .pixels()
            .zip(classes.pixels())
            .map(|(d, c)| (d[0], c[0]))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        for window in pairs.windows(2) {
            assert!(window[0].1 <= window[1].1);
        }
        assert_eq!(pairs.last().map(|p| p.1), Some(5));
        assert!(pairs.iter().all(|p| p.1 >= 1));
    }

    #[test]
    fn empty_classes_give_nan_rows() {
        let mask = centred_square();
        let target = FloatImage::from_pixel(7, 7, Luma([1.0]));
        let profile = radial_profile(&mask, None, ProfileTarget::Gray(&target), 6, DistanceMetric::Chessboard).unwrap();
        let means = profile.table.column(MEAN_GRAY).unwrap();
        assert_eq!(means.len(), 6);
        // distances 1, 2, 3 with width 0.5 land in classes 2, 4, 6
        assert!(means[0].is_nan());
        assert_approx_eq!(means[1], 1.0);
        assert!(means[2].is_nan());
        assert_approx_eq!(means[5], 1.0);
    }

    #[test]
    fn hole_pixels_are_left_out() {
        let mask = centred_square();
        let holes = BinaryMask::from_fn(7, 7, |x, y| Luma([if x == 3 && y == 3 { FOREGROUND } else { 0 }]));
        let target = RgbImage::from_pixel(7, 7, Rgb([30, 60, 90]));

        let profile = radial_profile(&mask, Some(&holes), ProfileTarget::Color(&target), 2, DistanceMetric::Chessboard).unwrap();
        assert_eq!(profile.classes.get_pixel(3, 3)[0], 0);
        assert_eq!(profile.classes.get_pixel(2, 3)[0], 2);
        assert_eq!(profile.table.columns, vec![MEAN_RED, MEAN_GREEN, MEAN_BLUE]);
        assert_approx_eq!(profile.table.value(1, MEAN_BLUE).unwrap(), 90.0);
    }

    #[test]
    fn invalid_inputs_are_reported() {
        let empty = BinaryMask::new(4, 4);
        let target = FloatImage::new(4, 4);
        assert!(matches!(
            radial_profile(&empty, None, ProfileTarget::Gray(&target), 3, DistanceMetric::default()),
            Err(StemTissueError::EmptySegmentation(_))
        ));

        let mask = BinaryMask::from_pixel(4, 4, Luma([FOREGROUND]));
        assert!(matches!(
            radial_profile(&mask, None, ProfileTarget::Gray(&target), 0, DistanceMetric::default()),
            Err(StemTissueError::InvalidParameter(_))
        ));

        let small = FloatImage::new(3, 4);
        assert!(matches!(
            radial_profile(&mask, None, ProfileTarget::Gray(&small), 3, DistanceMetric::default()),
            Err(StemTissueError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn lignification_ratio_handles_zero_blue() {
        let mut table = RegionTable::new([MEAN_RED, MEAN_GREEN, MEAN_BLUE]);
        table.push_row("1", vec![100.0, 0.0, 50.0]).unwrap();
        table.push_row("2", vec![100.0, 0.0, 0.0]).unwrap();
        table.push_row("3", vec![f64::NAN, f64::NAN, f64::NAN]).unwrap();
        add_lignification_ratio(&mut table).unwrap();

        let ratio = table.column(LIGNIFICATION).unwrap();
        assert_approx_eq!(ratio[0], 2.0);
        assert!(ratio[1].is_nan());
        assert!(ratio[2].is_nan());

        let mut gray = RegionTable::new([MEAN_GRAY]);
        assert!(add_lignification_ratio(&mut gray).is_err());
    }

    #[test]
    fn mean_color_inside_mask() {
        let image = RgbImage::from_fn(4, 1, |x, _| Rgb([(x * 10) as u8, 0, 255]));
        let mask = BinaryMask::from_fn(4, 1, |x, _| Luma([if x >= 2 { FOREGROUND } else { 0 }]));
        let mean = mean_color_in_mask(&image, &mask).unwrap();
        assert_approx_eq!(mean[0], 25.0);
        assert_approx_eq!(mean[2], 255.0);

        let none = mean_color_in_mask(&image, &BinaryMask::new(4, 1)).unwrap();
        assert!(none[0].is_nan());
    }
}
