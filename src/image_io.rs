use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};
use log::debug;

use crate::color::require_color;
use crate::errors::{Result, StemTissueError};

/// Extensions of the micrographs picked up when scanning a directory
const IMAGE_EXTENSIONS: [&str; 6] = ["png", "tif", "tiff", "jpg", "jpeg", "bmp"];

/// A section image with its origin
pub struct InputImage {
    pub image: RgbImage,
    pub path: PathBuf,
    /// File name without extension, used to name every output
    pub filename: String,
}

impl InputImage {
    /// Name the outputs after the path below `input_root`
    pub fn relative_to(mut self, input_root: &Path) -> Self {
        if let Some(label) = relative_label(&self.path, input_root) {
            self.filename = label;
        }
        self
    }
}

/// `a/b/x.png` below `root` becomes `a_b_x`; `None` outside `root`
pub fn relative_label(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Vec<&str> = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("_"))
    }
}

/// Get all image files from a directory (recursively), sorted by path
pub fn get_image_files_in_dir<P: AsRef<Path>>(dir_path: P) -> Result<Vec<PathBuf>> {
    let dir_path = dir_path.as_ref();

    if !dir_path.exists() {
        return Err(StemTissueError::InvalidPath(dir_path.to_path_buf()));
    }

    if !dir_path.is_dir() {
        return Err(StemTissueError::Config(format!(
            "{} is not a directory",
            dir_path.display()
        )));
    }

    let mut files = Vec::new();
    find_image_files_recursive(dir_path, &mut files)?;
    files.sort();

    debug!("Found {} images in {}", files.len(), dir_path.display());
    Ok(files)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn find_image_files_recursive(dir_path: &Path, result: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir_path)? {
        let path = entry?.path();

        if path.is_dir() {
            find_image_files_recursive(&path, result)?;
        } else if path.is_file() && is_image_file(&path) {
            result.push(path);
        }
    }

    Ok(())
}

/// Load a colour image; grayscale files are rejected with `TypeMismatch`
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<InputImage> {
    let path = path.as_ref();

    let filename = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| StemTissueError::InvalidPath(path.to_path_buf()))?
        .to_string();

    let image = require_color(&image::open(path)?)?;

    Ok(InputImage {
        image,
        path: path.to_path_buf(),
        filename,
    })
}

/// Save any 8 or 16-bit image as PNG, creating the parent directory
pub fn save_png<P, Q>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>, path: Q) -> Result<()>
where
    P: image::PixelWithColorType,
    [P::Subpixel]: image::EncodableLayout,
    Q: AsRef<Path>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    image.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
