// src/distance.rs - Distance maps of binary masks

use image::Luma;
use serde::{Deserialize, Serialize};

use crate::image_utils::{is_foreground, BinaryMask, FloatImage};

/// Metric used to compute a distance map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Chamfer weights (1, 1)
    Chessboard,
    /// Chamfer weights (1, 2)
    CityBlock,
    /// Chamfer weights (3, 4)
    Borgefors,
    /// Chamfer weights (5, 7, 11), including knight moves
    #[default]
    ChessKnight,
    /// Euclidean distance, computed exactly
    Exact,
}

impl DistanceMetric {
    /// Raw chamfer weights for orthogonal, diagonal and knight moves
    fn chamfer_weights(&self) -> Option<&'static [f32]> {
        match self {
            DistanceMetric::Chessboard => Some(&[1.0, 1.0]),
            DistanceMetric::CityBlock => Some(&[1.0, 2.0]),
            DistanceMetric::Borgefors => Some(&[3.0, 4.0]),
            DistanceMetric::ChessKnight => Some(&[5.0, 7.0, 11.0]),
            DistanceMetric::Exact => None,
        }
    }
}

/// Compute the distance map of a mask with the given metric.
///
/// Background pixels get 0. The area outside the raster counts as
/// background, so a mask touching the border gets distance 1 along it.
pub fn distance_map(mask: &BinaryMask, metric: DistanceMetric) -> FloatImage {
    match metric.chamfer_weights() {
        Some(weights) => chamfer_distance(mask, weights),
        None => euclidean_distance(mask),
    }
}

/// Mask copied into a buffer with `pad` background pixels on every side
struct Padded {
    data: Vec<f32>,
    stride: usize,
    pad: usize,
}

impl Padded {
    fn new(mask: &BinaryMask, pad: usize, foreground_value: f32) -> Self {
        let (width, height) = mask.dimensions();
        let stride = width as usize + 2 * pad;
        let rows = height as usize + 2 * pad;
        let mut data = vec![0.0f32; stride * rows];
        for (x, y, pixel) in mask.enumerate_pixels() {
            if is_foreground(pixel) {
                data[(y as usize + pad) * stride + x as usize + pad] = foreground_value;
            }
        }
        Self { data, stride, pad }
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize + self.pad) * self.stride + x as usize + self.pad
    }

    fn into_image(self, width: u32, height: u32, transform: impl Fn(f32) -> f32) -> FloatImage {
        FloatImage::from_fn(width, height, |x, y| Luma([transform(self.data[self.index(x, y)])]))
    }
}

/// Two-pass chamfer distance, normalised so that an orthogonal step costs 1
fn chamfer_distance(mask: &BinaryMask, weights: &[f32]) -> FloatImage {
    let (width, height) = mask.dimensions();
    let unit = weights[0];
    let orthogonal = 1.0;
    let diagonal = weights[1] / unit;
    let knight = weights.get(2).map(|w| w / unit);

    // Neighbours already visited by a raster-order scan
    let mut forward: Vec<(isize, isize, f32)> = vec![
        (-1, -1, diagonal),
        (0, -1, orthogonal),
        (1, -1, diagonal),
        (-1, 0, orthogonal),
    ];
    if let Some(k) = knight {
        forward.extend([(-1, -2, k), (1, -2, k), (-2, -1, k), (2, -1, k)]);
    }
    let backward: Vec<(isize, isize, f32)> = forward.iter().map(|&(dx, dy, w)| (-dx, -dy, w)).collect();

    let pad = if knight.is_some() { 2 } else { 1 };
    let mut padded = Padded::new(mask, pad, f32::MAX);

    for y in 0..height {
        for x in 0..width {
            let index = padded.index(x, y);
            relax(&mut padded.data, padded.stride, index, &forward);
        }
    }
    for y in (0..height).rev() {
        for x in (0..width).rev() {
            let index = padded.index(x, y);
            relax(&mut padded.data, padded.stride, index, &backward);
        }
    }

    padded.into_image(width, height, |d| d)
}

/// Lower a foreground value to the cheapest path through its neighbours
#[inline]
fn relax(data: &mut [f32], stride: usize, index: usize, offsets: &[(isize, isize, f32)]) {
    let mut best = data[index];
    if best == 0.0 {
        return;
    }
    for &(dx, dy, w) in offsets {
        let neighbour = (index as isize + dy * stride as isize + dx) as usize;
        let candidate = data[neighbour] + w;
        if candidate < best {
            best = candidate;
        }
    }
    data[index] = best;
}

const EDT_INF: f64 = 1e20;

/// One-dimensional squared distance transform of a sampled function
/// (lower envelope of parabolas).
fn squared_distance_1d(f: &[f64], d: &mut [f64], v: &mut [usize], z: &mut [f64]) {
    let n = f.len();
    if n == 0 {
        return;
    }
    let intersect = |q: usize, p: usize| {
        ((f[q] + (q * q) as f64) - (f[p] + (p * p) as f64)) / (2.0 * q as f64 - 2.0 * p as f64)
    };

    let mut k = 0usize;
    v[0] = 0;
    z[0] = -EDT_INF;
    z[1] = EDT_INF;
    for q in 1..n {
        let mut s = intersect(q, v[k]);
        while s <= z[k] {
            k -= 1;
            s = intersect(q, v[k]);
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = EDT_INF;
    }

    k = 0;
    for (q, out) in d.iter_mut().enumerate().take(n) {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let p = v[k];
        let diff = q as f64 - p as f64;
        *out = diff * diff + f[p];
    }
}

/// Exact Euclidean distance map, separable over columns then rows
fn euclidean_distance(mask: &BinaryMask) -> FloatImage {
    let (width, height) = mask.dimensions();
    let pad = 1usize;
    let cols = width as usize + 2 * pad;
    let rows = height as usize + 2 * pad;

    let mut grid = vec![0.0f64; cols * rows];
    for (x, y, pixel) in mask.enumerate_pixels() {
        if is_foreground(pixel) {
            grid[(y as usize + pad) * cols + x as usize + pad] = EDT_INF;
        }
    }

    let longest = cols.max(rows);
    let mut f = vec![0.0f64; longest];
    let mut d = vec![0.0f64; longest];
    let mut v = vec![0usize; longest];
    let mut z = vec![0.0f64; longest + 1];

    for x in 0..cols {
        for y in 0..rows {
            f[y] = grid[y * cols + x];
        }
        squared_distance_1d(&f[..rows], &mut d[..rows], &mut v, &mut z);
        for y in 0..rows {
            grid[y * cols + x] = d[y];
        }
    }

    for y in 0..rows {
        let row = &mut grid[y * cols..(y + 1) * cols];
        f[..cols].copy_from_slice(row);
        squared_distance_1d(&f[..cols], &mut d[..cols], &mut v, &mut z);
        row.copy_from_slice(&d[..cols]);
    }

    FloatImage::from_fn(width, height, |x, y| {
        let squared = grid[(y as usize + pad) * cols + x as usize + pad];
        Luma([squared.sqrt() as f32])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_utils::FOREGROUND;
    use assert_approx_eq::assert_approx_eq;

    fn square_mask(size: u32, margin: u32) -> BinaryMask {
        BinaryMask::from_fn(size, size, |x, y| {
            let inside = x >= margin && y >= margin && x < size - margin && y < size - margin;
            Luma([if inside { FOREGROUND } else { 0 }])
        })
    }

    #[test]
    fn background_is_zero_for_every_metric() {
        let mask = square_mask(9, 2);
        for metric in [
            DistanceMetric::Chessboard,
            DistanceMetric::CityBlock,
            DistanceMetric::Borgefors,
            DistanceMetric::ChessKnight,
            DistanceMetric::Exact,
        ] {
            let dist = distance_map(&mask, metric);
            assert_eq!(dist.get_pixel(0, 0)[0], 0.0);
            assert_eq!(dist.get_pixel(1, 4)[0], 0.0);
            assert_approx_eq!(dist.get_pixel(2, 4)[0], 1.0);
            assert_approx_eq!(dist.get_pixel(4, 4)[0], 3.0);
        }
    }

    #[test]
    fn image_border_counts_as_background() {
        let mask = BinaryMask::from_pixel(5, 5, Luma([FOREGROUND]));
        let dist = distance_map(&mask, DistanceMetric::Exact);
        assert_approx_eq!(dist.get_pixel(0, 0)[0], 1.0);
        assert_approx_eq!(dist.get_pixel(2, 2)[0], 3.0);

        let dist = distance_map(&mask, DistanceMetric::ChessKnight);
        assert_approx_eq!(dist.get_pixel(4, 2)[0], 1.0);
        assert_approx_eq!(dist.get_pixel(2, 2)[0], 3.0);
    }

    #[test]
    fn diagonal_steps_follow_normalised_weights() {
        // single background pixel in the corner of an otherwise full mask
        // padded away from the border
        let mut mask = BinaryMask::from_pixel(20, 20, Luma([FOREGROUND]));
        mask.put_pixel(5, 5, Luma([0]));

        let city = distance_map(&mask, DistanceMetric::CityBlock);
        assert_approx_eq!(city.get_pixel(6, 6)[0], 2.0);

        let chess = distance_map(&mask, DistanceMetric::Chessboard);
        assert_approx_eq!(chess.get_pixel(6, 6)[0], 1.0);

        let borgefors = distance_map(&mask, DistanceMetric::Borgefors);
        assert_approx_eq!(borgefors.get_pixel(6, 6)[0], 4.0 / 3.0);

        let knight = distance_map(&mask, DistanceMetric::ChessKnight);
        assert_approx_eq!(knight.get_pixel(6, 6)[0], 1.4);
        assert_approx_eq!(knight.get_pixel(7, 6)[0], 2.2);

        let exact = distance_map(&mask, DistanceMetric::Exact);
        assert_approx_eq!(exact.get_pixel(7, 6)[0], 5.0f32.sqrt());
    }

    #[test]
    fn empty_mask_gives_zero_map() {
        let mask = BinaryMask::new(4, 3);
        let dist = distance_map(&mask, DistanceMetric::default());
        assert!(dist.pixels().all(|p| p[0] == 0.0));
    }
}
