use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::binary::Connectivity;
use crate::distance::DistanceMetric;
use crate::errors::{Result, StemTissueError};
use crate::labels::LabelPalette;
use crate::prefilter::PrefilterParams;
use crate::segmentation::{RegionParams, RindExtractionPolicy, StemParams};

/// Sub-directories of the output directory
pub const PROFILES_DIR: &str = "Profiles";
pub const TISSUES_DIR: &str = "Tissues";
pub const REPORTS_DIR: &str = "Reports";
pub const DEBUG_DIR: &str = "debug";

/// Configuration of a stem tissue analysis run
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_input_path")]
    pub input_path: String,
    #[serde(default = "default_output_base_dir")]
    pub output_base_dir: String,
    #[serde(default)]
    pub resize_dimensions: Option<[u32; 2]>,
    #[serde(default = "default_true")]
    pub use_parallel: bool,
    /// Crop pure black scanner margins before processing
    #[serde(default)]
    pub remove_black_border: bool,
    /// Write every intermediate mask under `debug/`
    #[serde(default)]
    pub save_debug_masks: bool,

    // Pre-filtering
    #[serde(default = "default_true")]
    pub prefilter_enabled: bool,
    #[serde(default = "default_closing_radius")]
    pub closing_radius: u32,
    #[serde(default = "default_opening_radius")]
    pub opening_radius: u32,
    #[serde(default = "default_smoothing_sigma")]
    pub smoothing_sigma: f32,

    // Stem segmentation
    #[serde(default = "default_stem_threshold")]
    pub stem_threshold: u8,
    #[serde(default = "default_hole_threshold_high")]
    pub hole_threshold_high: f32,
    #[serde(default = "default_hole_threshold_low")]
    pub hole_threshold_low: f32,
    #[serde(default = "default_bubbles_diameter_px")]
    pub bubbles_diameter_px: u32,

    // Tissue regions
    #[serde(default = "default_dark_region_threshold")]
    pub dark_region_threshold: u8,
    #[serde(default = "default_red_region_threshold")]
    pub red_region_threshold: u8,
    #[serde(default = "default_bundles_min_size")]
    pub bundles_min_size: u64,
    #[serde(default)]
    pub rind_policy: RindExtractionPolicy,
    #[serde(default)]
    pub connectivity: Connectivity,

    // Radial profiles
    #[serde(default = "default_region_count")]
    pub region_count: u32,
    #[serde(default)]
    pub distance_metric: DistanceMetric,
    #[serde(default = "default_true")]
    pub profile_exclude_holes: bool,

    /// Pixel size in physical units
    #[serde(default = "default_resolution")]
    pub resolution: f64,

    #[serde(default)]
    pub label_palette: LabelPalette,
}

fn default_input_path() -> String {
    "./input".to_string()
}

fn default_output_base_dir() -> String {
    "./output".to_string()
}

fn default_true() -> bool {
    true
}

fn default_closing_radius() -> u32 {
    6
}

fn default_opening_radius() -> u32 {
    12
}

fn default_smoothing_sigma() -> f32 {
    4.0
}

fn default_stem_threshold() -> u8 {
    200
}

fn default_hole_threshold_high() -> f32 {
    0.99
}

fn default_hole_threshold_low() -> f32 {
    0.97
}

fn default_bubbles_diameter_px() -> u32 {
    10
}

fn default_dark_region_threshold() -> u8 {
    130
}

fn default_red_region_threshold() -> u8 {
    170
}

fn default_bundles_min_size() -> u64 {
    100
}

fn default_region_count() -> u32 {
    100
}

fn default_resolution() -> f64 {
    1.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: default_input_path(),
            output_base_dir: default_output_base_dir(),
            resize_dimensions: None,
            use_parallel: true,
            remove_black_border: false,
            save_debug_masks: false,
            prefilter_enabled: true,
            closing_radius: default_closing_radius(),
            opening_radius: default_opening_radius(),
            smoothing_sigma: default_smoothing_sigma(),
            stem_threshold: default_stem_threshold(),
            hole_threshold_high: default_hole_threshold_high(),
            hole_threshold_low: default_hole_threshold_low(),
            bubbles_diameter_px: default_bubbles_diameter_px(),
            dark_region_threshold: default_dark_region_threshold(),
            red_region_threshold: default_red_region_threshold(),
            bundles_min_size: default_bundles_min_size(),
            rind_policy: RindExtractionPolicy::default(),
            connectivity: Connectivity::default(),
            region_count: default_region_count(),
            distance_metric: DistanceMetric::default(),
            profile_exclude_holes: true,
            resolution: default_resolution(),
            label_palette: LabelPalette::default(),
        }
    }
}

fn invalid(message: impl Into<String>) -> StemTissueError {
    StemTissueError::InvalidParameter(message.into())
}

impl Config {
    /// Load configuration from a TOML file; missing keys take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            StemTissueError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|source| StemTissueError::ConfigLoad {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Check every processing parameter, before any image is touched
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("hole_threshold_high", self.hole_threshold_high),
            ("hole_threshold_low", self.hole_threshold_low),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{} must be within [0, 1], got {}", name, value)));
            }
        }
        if self.hole_threshold_low > self.hole_threshold_high {
            return Err(invalid("hole_threshold_low must not exceed hole_threshold_high"));
        }

        if !(self.smoothing_sigma >= 0.0) {
            return Err(invalid("smoothing_sigma must be >= 0"));
        }

        if self.region_count == 0 {
            return Err(invalid("region_count must be > 0"));
        }

        if !(self.resolution > 0.0) || !self.resolution.is_finite() {
            return Err(invalid(format!("resolution must be > 0, got {}", self.resolution)));
        }

        if let Some([width, height]) = self.resize_dimensions {
            if width == 0 || height == 0 {
                return Err(invalid("resize_dimensions must be > 0"));
            }
        }

        if let RindExtractionPolicy::AreaOpening { max_bundle_size: 0 } = self.rind_policy {
            return Err(invalid("max_bundle_size must be > 0"));
        }

        self.label_palette.validate(5)?;

        Ok(())
    }

    /// Fail with `InvalidPath` unless the input file or directory exists
    pub fn validate_input_path(&self) -> Result<()> {
        let input_path = PathBuf::from(&self.input_path);
        if !input_path.exists() {
            return Err(StemTissueError::InvalidPath(input_path));
        }
        Ok(())
    }

    /// Create the output directory tree
    pub fn prepare_output_dirs(&self) -> Result<()> {
        let base = Path::new(&self.output_base_dir);
        fs::create_dir_all(base)?;
        for dir in [PROFILES_DIR, TISSUES_DIR, REPORTS_DIR] {
            fs::create_dir_all(base.join(dir))?;
        }
        if self.save_debug_masks {
            fs::create_dir_all(base.join(DEBUG_DIR))?;
        }
        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StemTissueError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content)?;

        Ok(())
    }

    pub fn prefilter_params(&self) -> PrefilterParams {
        PrefilterParams {
            closing_radius: self.closing_radius,
            opening_radius: self.opening_radius,
            smoothing_sigma: self.smoothing_sigma,
        }
    }

    pub fn stem_params(&self) -> StemParams {
        StemParams {
            stem_threshold: self.stem_threshold,
            hole_threshold_high: self.hole_threshold_high,
            hole_threshold_low: self.hole_threshold_low,
            bubbles_diameter: self.bubbles_diameter_px,
            connectivity: self.connectivity,
        }
    }

    pub fn region_params(&self) -> RegionParams {
        RegionParams {
            dark_threshold: self.dark_region_threshold,
            red_threshold: self.red_region_threshold,
            bundles_min_size: self.bundles_min_size,
            rind_policy: self.rind_policy,
            connectivity: self.connectivity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stem_params(), StemParams::default());
        assert_eq!(config.region_params(), RegionParams::default());
        assert_eq!(config.prefilter_params(), PrefilterParams::default());
    }

    #[test]
    fn partial_toml_takes_defaults() {
        let config: Config = toml::from_str(
            r#"
            input_path = "slides"
            region_count = 20
            connectivity = "8"
            distance_metric = "borgefors"
            rind_policy = { kind = "largest_component" }
            "#,
        )
        .unwrap();
        assert_eq!(config.input_path, "slides");
        assert_eq!(config.region_count, 20);
        assert_eq!(config.connectivity, Connectivity::Eight);
        assert_eq!(config.distance_metric, DistanceMetric::Borgefors);
        assert_eq!(config.rind_policy, RindExtractionPolicy::LargestComponent);
        assert_eq!(config.stem_threshold, 200);
        assert_eq!(config.label_palette, LabelPalette::default());
    }

    #[test]
    fn toml_round_trip_keeps_values() {
        let config = Config {
            resize_dimensions: Some([640, 480]),
            rind_policy: RindExtractionPolicy::AreaOpening { max_bundle_size: 4000 },
            ..Config::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let cases = [
            Config { region_count: 0, ..Config::default() },
            Config { resolution: 0.0, ..Config::default() },
            Config { resolution: -2.0, ..Config::default() },
            Config { hole_threshold_low: 1.0, hole_threshold_high: 0.5, ..Config::default() },
            Config { hole_threshold_high: 1.5, ..Config::default() },
            Config { smoothing_sigma: -1.0, ..Config::default() },
            Config { resize_dimensions: Some([0, 10]), ..Config::default() },
            Config { label_palette: LabelPalette(vec![[0, 0, 0]]), ..Config::default() },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(StemTissueError::InvalidParameter(_))),
                "accepted {:?}",
                config
            );
        }
    }

    #[test]
    fn sample_config_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml");
        let config = Config::from_file(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn malformed_file_reports_its_path() {
        let dir = std::env::temp_dir().join("stem_tissue_config_test");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.toml");
        fs::write(&path, "region_count = \"many\"").unwrap();

        match Config::from_file(&path) {
            Err(StemTissueError::ConfigLoad { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
