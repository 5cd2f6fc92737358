use std::path::{Path, PathBuf};

use image::RgbImage;
use log::{debug, info, warn};
use serde::Serialize;

use crate::binary::fill_holes;
use crate::color::ColorFeatures;
use crate::config::{Config, DEBUG_DIR, PROFILES_DIR, REPORTS_DIR, TISSUES_DIR};
use crate::errors::Result;
use crate::image_io::{save_png, InputImage};
use crate::image_utils::{labels_to_gray, labels_to_gray16, remove_black_border, resize_image, LabelImage};
use crate::labels::{colorize_labels, compose_labels, tissue_layers};
use crate::output::{write_json_report, write_region_table_csv};
use crate::prefilter::prefilter;
use crate::profile::{add_lignification_ratio, radial_profile, ProfileTarget, RadialProfile};
use crate::quantify::{quantify_regions, tissue_color_table, RegionSummary, SUMMARY_COLUMNS};
use crate::segmentation::{segment_regions, segment_stem, StemSegmentation, TissueMasks};
use crate::table::{RegionTable, SummaryTable};

/// Everything computed for one section
pub struct StemAnalysis {
    /// Input after border removal and resizing; colour statistics are read here
    pub image: RgbImage,
    /// Pre-filtered image the masks were segmented from
    pub filtered: RgbImage,
    pub segmentation: StemSegmentation,
    pub masks: TissueMasks,
    pub labels: LabelImage,
    pub labels_rgb: RgbImage,
    pub summary: RegionSummary,
    /// Radial colour profile with its lignification column
    pub profile: RadialProfile,
    /// Mean colour of each tissue
    pub tissue_colors: RegionTable,
}

/// Crop and resize the input as configured
fn prepare_image(image: &RgbImage, config: &Config) -> RgbImage {
    let mut prepared = if config.remove_black_border {
        remove_black_border(image)
    } else {
        image.clone()
    };
    if let Some(dimensions) = config.resize_dimensions {
        prepared = resize_image(&prepared, dimensions);
    }
    prepared
}

/// Classify the tissues of a section and compute its profiles and statistics
pub fn analyze_stem(image: &RgbImage, config: &Config) -> Result<StemAnalysis> {
    config.validate()?;

    let image = prepare_image(image, config);
    let filtered = if config.prefilter_enabled {
        prefilter(&image, &config.prefilter_params())
    } else {
        image.clone()
    };

    let features = ColorFeatures::extract(&filtered);
    let segmentation = segment_stem(&features, &config.stem_params())?;
    let masks = segment_regions(&features, &segmentation.stem, &config.region_params())?;

    info!("Compositing labels");
    let labels = compose_labels(&tissue_layers(&masks))?;
    let labels_rgb = colorize_labels(&labels, &config.label_palette)?;

    let summary = quantify_regions(&image, &labels, config.resolution, config.connectivity)?;

    info!("Computing radial profile with {} regions", config.region_count);
    let mut profile = if config.profile_exclude_holes {
        let reference = fill_holes(&masks.stem);
        radial_profile(
            &reference,
            Some(&segmentation.holes),
            ProfileTarget::Color(&image),
            config.region_count,
            config.distance_metric,
        )?
    } else {
        radial_profile(
            &masks.stem,
            None,
            ProfileTarget::Color(&image),
            config.region_count,
            config.distance_metric,
        )?
    };
    add_lignification_ratio(&mut profile.table)?;

    let tissue_colors = tissue_color_table(&image, &labels)?;

    Ok(StemAnalysis {
        image,
        filtered,
        segmentation,
        masks,
        labels,
        labels_rgb,
        summary,
        profile,
        tissue_colors,
    })
}

/// JSON report written next to the tables of each image
#[derive(Debug, Serialize)]
pub struct ImageReport<'a> {
    pub image: &'a str,
    pub source: PathBuf,
    pub width: u32,
    pub height: u32,
    pub region_count: u32,
    pub max_distance: f32,
    pub summary: &'a RegionSummary,
}

fn save_debug_images(analysis: &StemAnalysis, debug_dir: &Path, filename: &str) -> Result<()> {
    let masks = [
        ("stem", &analysis.segmentation.stem),
        ("holes", &analysis.segmentation.holes),
        ("stem-with-rind", &analysis.masks.stem),
        ("dark", &analysis.masks.dark),
        ("rind", &analysis.masks.rind),
        ("bundles", &analysis.masks.bundles),
        ("red", &analysis.masks.red),
        ("blue", &analysis.masks.blue),
    ];
    for (name, mask) in masks {
        save_png(mask, debug_dir.join(format!("{}-{}.png", filename, name)))?;
    }
    save_png(&analysis.filtered, debug_dir.join(format!("{}-filtered.png", filename)))?;
    save_png(
        &labels_to_gray16(&analysis.profile.classes),
        debug_dir.join(format!("{}-classes.png", filename)),
    )?;
    debug!("Saved debug images for {}", filename);
    Ok(())
}

/// Write the label images, tables and report of an analysed image
pub fn write_outputs(analysis: &StemAnalysis, config: &Config, path: &Path, filename: &str, debug: bool) -> Result<()> {
    let base = PathBuf::from(&config.output_base_dir);

    save_png(&labels_to_gray(&analysis.labels), base.join(format!("{}-regions.png", filename)))?;
    save_png(&analysis.labels_rgb, base.join(format!("{}-regionsRGB.png", filename)))?;

    write_region_table_csv(&analysis.profile.table, base.join(PROFILES_DIR).join(format!("{}.csv", filename)))?;
    write_region_table_csv(&analysis.tissue_colors, base.join(TISSUES_DIR).join(format!("{}.csv", filename)))?;

    let report = ImageReport {
        image: filename,
        source: path.to_path_buf(),
        width: analysis.labels.width(),
        height: analysis.labels.height(),
        region_count: config.region_count,
        max_distance: analysis.profile.max_distance,
        summary: &analysis.summary,
    };
    write_json_report(&report, base.join(REPORTS_DIR).join(format!("{}.json", filename)))?;

    if debug || config.save_debug_masks {
        save_debug_images(analysis, &base.join(DEBUG_DIR), filename)?;
    }
    Ok(())
}

/// Empty batch summary with the standard columns
pub fn new_summary_table() -> SummaryTable {
    SummaryTable::new(SUMMARY_COLUMNS)
}

/// Process a single image and append its row to the batch summary.
///
/// An empty segmentation is not fatal: the image gets a NaN row and the
/// batch carries on.
pub fn process_image(input_image: InputImage, config: &Config, summary: &SummaryTable, debug: bool) -> Result<()> {
    let InputImage { image, path, filename } = input_image;
    info!("Processing {}", path.display());

    match analyze_stem(&image, config) {
        Ok(analysis) => {
            write_outputs(&analysis, config, &path, &filename, debug)?;
            summary.append(filename.as_str(), analysis.summary.values())?;
            info!(
                "{}: lignified {:.3}, non-lignified {:.3}, rind {:.3}, bundles {:.3} ({} bundles)",
                filename,
                analysis.summary.lignified_fraction,
                analysis.summary.non_lignified_fraction,
                analysis.summary.rind_fraction,
                analysis.summary.bundle_fraction,
                analysis.summary.bundle_count
            );
            Ok(())
        }
        Err(e) if e.is_recoverable() => {
            warn!("{}: {}; recording an undefined row", filename, e);
            summary.append(filename.as_str(), RegionSummary::degenerate().values())?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}
