// src/labels.rs - Tissue label composition and colour mapping

use image::{Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StemTissueError};
use crate::image_utils::{ensure_same_size, is_foreground, BinaryMask, LabelImage, FOREGROUND};
use crate::segmentation::TissueMasks;

/// Tissue classes of the label image, in compositing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TissueClass {
    Lignified = 1,
    NonLignified = 2,
    Rind = 3,
    Bundle = 4,
}

impl TissueClass {
    pub const ALL: [TissueClass; 4] = [
        TissueClass::Lignified,
        TissueClass::NonLignified,
        TissueClass::Rind,
        TissueClass::Bundle,
    ];

    pub fn label(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            TissueClass::Lignified => "Lignified",
            TissueClass::NonLignified => "NonLignified",
            TissueClass::Rind => "Rind",
            TissueClass::Bundle => "Bundle",
        }
    }

    pub fn from_label(label: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.label() == label)
    }
}

/// One mask of the compositing list with the label it writes
#[derive(Debug, Clone, Copy)]
pub struct LabelLayer<'a> {
    pub mask: &'a BinaryMask,
    pub label: u32,
}

impl<'a> LabelLayer<'a> {
    pub fn new(mask: &'a BinaryMask, label: u32) -> Self {
        Self { mask, label }
    }
}

/// Layers of the tissue masks in their fixed priority order
pub fn tissue_layers(masks: &TissueMasks) -> [LabelLayer<'_>; 4] {
    [
        LabelLayer::new(&masks.red, TissueClass::Lignified.label()),
        LabelLayer::new(&masks.blue, TissueClass::NonLignified.label()),
        LabelLayer::new(&masks.rind, TissueClass::Rind.label()),
        LabelLayer::new(&masks.bundles, TissueClass::Bundle.label()),
    ]
}

/// Merge an ordered list of masks into a label image.
///
/// Each pixel takes the label of the first layer in which it is foreground,
/// and 0 when it is foreground in none. All masks must have the same size.
pub fn compose_labels(layers: &[LabelLayer<'_>]) -> Result<LabelImage> {
    let Some(first) = layers.first() else {
        return Err(StemTissueError::InvalidParameter(
            "at least one mask is needed to build a label image".to_string(),
        ));
    };
    let (width, height) = first.mask.dimensions();
    for layer in layers {
        ensure_same_size((width, height), layer.mask.dimensions())?;
    }

    Ok(LabelImage::from_fn(width, height, |x, y| {
        let label = layers
            .iter()
            .find(|layer| is_foreground(layer.mask.get_pixel(x, y)))
            .map_or(0, |layer| layer.label);
        Luma([label])
    }))
}

/// Split a label image into one mask per label 1..=count
pub fn layers_from_labels(labels: &LabelImage, count: u32) -> Vec<BinaryMask> {
    let (width, height) = labels.dimensions();
    (1..=count)
        .map(|label| {
            BinaryMask::from_fn(width, height, |x, y| {
                Luma([if labels.get_pixel(x, y)[0] == label { FOREGROUND } else { 0 }])
            })
        })
        .collect()
}

/// Display colour of every label, starting with the background
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct LabelPalette(pub Vec<[u8; 3]>);

impl Default for LabelPalette {
    fn default() -> Self {
        LabelPalette(vec![
            [255, 255, 255], // background
            [255, 0, 255],   // lignified
            [0, 127, 255],   // non-lignified
            [0, 0, 0],       // rind
            [255, 255, 0],   // bundles
        ])
    }
}

impl LabelPalette {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn color(&self, label: u32) -> Option<Rgb<u8>> {
        self.0.get(label as usize).map(|&c| Rgb(c))
    }

    /// Label of the first palette entry with the given colour
    pub fn label_of(&self, color: &Rgb<u8>) -> Option<u32> {
        self.0.iter().position(|c| *c == color.0).map(|i| i as u32)
    }

    /// Fails unless the palette has as many distinct colours as labels
    pub fn validate(&self, label_count: usize) -> Result<()> {
        if self.0.len() < label_count {
            return Err(StemTissueError::InvalidParameter(format!(
                "label palette has {} colours, {} needed",
                self.0.len(),
                label_count
            )));
        }
        for (i, color) in self.0.iter().enumerate() {
            if self.0[..i].contains(color) {
                return Err(StemTissueError::InvalidParameter(format!(
                    "label palette repeats colour {:?}",
                    color
                )));
            }
        }
        Ok(())
    }
}

/// Map every label to its palette colour
pub fn colorize_labels(labels: &LabelImage, palette: &LabelPalette) -> Result<RgbImage> {
    let (width, height) = labels.dimensions();
    let mut rgb = RgbImage::new(width, height);
    for (x, y, pixel) in labels.enumerate_pixels() {
        let color = palette.color(pixel[0]).ok_or_else(|| {
            StemTissueError::InvalidParameter(format!("no palette colour for label {}", pixel[0]))
        })?;
        rgb.put_pixel(x, y, color);
    }
    Ok(rgb)
}

/// Inverse of `colorize_labels`; colours missing from the palette are an error
pub fn labels_from_colors(rgb: &RgbImage, palette: &LabelPalette) -> Result<LabelImage> {
    let (width, height) = rgb.dimensions();
    let mut labels = LabelImage::new(width, height);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let label = palette.label_of(pixel).ok_or_else(|| {
            StemTissueError::InvalidParameter(format!("colour {:?} is not in the label palette", pixel.0))
        })?;
        labels.put_pixel(x, y, Luma([label]));
    }
    Ok(labels)
}
