// src/lib.rs - Library interface for stem tissue analysis

pub mod binary;
pub mod color;
pub mod config;
pub mod distance;
pub mod errors;
pub mod image_io;
pub mod image_utils;
pub mod labels;
pub mod morphology;
pub mod output;
pub mod pipeline;
pub mod prefilter;
pub mod profile;
pub mod quantify;
pub mod segmentation;
pub mod table;

// Re-export commonly used types and functions
pub use config::Config;
pub use errors::{Result, StemTissueError};
pub use image_io::{get_image_files_in_dir, load_image, save_png, InputImage};
pub use image_utils::{BinaryMask, FloatImage, LabelImage};
pub use pipeline::{analyze_stem, new_summary_table, process_image, StemAnalysis};

pub use color::{ColorFeatures, ColorSpace};
pub use distance::{distance_map, DistanceMetric};
pub use labels::{colorize_labels, compose_labels, labels_from_colors, LabelLayer, LabelPalette, TissueClass};
pub use profile::{
    add_lignification_ratio, distance_classes, mean_color_in_mask, mean_values_by_region, radial_profile,
    ProfileTarget, RadialProfile,
};
pub use quantify::{quantify_regions, RegionSummary, SUMMARY_COLUMNS};
pub use segmentation::{
    segment_regions, segment_stem, RegionParams, RindExtractionPolicy, StemParams, StemSegmentation, TissueMasks,
};
pub use table::{RegionTable, SummaryTable};
