// ============================================================
// Layer 6 — Image Grids
// ============================================================
// Turns a flat NCHW batch of floats into one tiled RGB image,
// the way sample and reconstruction artifacts are written.
//
// Values are min-max normalised over the whole batch before
// quantising, so the grid is viewable whatever range the
// decoder produced. Single-channel batches are shown as gray.

use anyhow::Result;
use image::{ImageBuffer, Rgb, RgbImage};

/// Shape of a flat NCHW buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchShape {
    pub n: usize,
    pub c: usize,
    pub h: usize,
    pub w: usize,
}

impl BatchShape {
    pub fn from_dims([n, c, h, w]: [usize; 4]) -> Self {
        Self { n, c, h, w }
    }

    fn len(&self) -> usize {
        self.n * self.c * self.h * self.w
    }
}

pub fn make_grid(values: &[f32], shape: BatchShape, nrow: usize, padding: usize) -> Result<RgbImage> {
    let BatchShape { n, c, h, w } = shape;
    if values.len() != shape.len() {
        anyhow::bail!(
            "Grid expected {} values for shape {n}x{c}x{h}x{w}, got {}",
            shape.len(),
            values.len()
        );
    }
    if !matches!(c, 1 | 3) {
        anyhow::bail!("Grid supports 1 or 3 channels, got {c}");
    }
    if n == 0 || nrow == 0 {
        anyhow::bail!("Grid needs at least one image and one column");
    }

    let (lo, hi) = finite_range(values);
    let scale    = (hi - lo).max(1e-6);
    let to_u8    = |v: f32| {
        if v.is_finite() {
            (((v - lo) / scale).clamp(0.0, 1.0) * 255.0).round() as u8
        } else {
            0
        }
    };

    let cols = nrow.min(n);
    let rows = n.div_ceil(cols);
    let grid_w = cols * (w + padding) + padding;
    let grid_h = rows * (h + padding) + padding;
    let mut grid: RgbImage = ImageBuffer::new(grid_w as u32, grid_h as u32);

    let plane = h * w;
    for idx in 0..n {
        let base = idx * c * plane;
        let x0   = (idx % cols) * (w + padding) + padding;
        let y0   = (idx / cols) * (h + padding) + padding;
        for y in 0..h {
            for x in 0..w {
                let p = y * w + x;
                let rgb = if c == 3 {
                    [
                        to_u8(values[base + p]),
                        to_u8(values[base + plane + p]),
                        to_u8(values[base + 2 * plane + p]),
                    ]
                } else {
                    let g = to_u8(values[base + p]);
                    [g, g, g]
                };
                grid.put_pixel((x0 + x) as u32, (y0 + y) as u32, Rgb(rgb));
            }
        }
    }
    Ok(grid)
}

fn finite_range(values: &[f32]) -> (f32, f32) {
    let mut lo = f32::INFINITY;
    let mut hi = f32::NEG_INFINITY;
    for v in values.iter().copied().filter(|v| v.is_finite()) {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if lo > hi { (0.0, 1.0) } else { (lo, hi) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_dimensions() {
        let shape = BatchShape { n: 5, c: 3, h: 4, w: 6 };
        let grid  = make_grid(&vec![0.5; shape.len()], shape, 2, 2).unwrap();
        // 2 columns, 3 rows
        assert_eq!(grid.width(), (2 * (6 + 2) + 2) as u32);
        assert_eq!(grid.height(), (3 * (4 + 2) + 2) as u32);
    }

    #[test]
    fn test_values_are_min_max_normalised() {
        let shape = BatchShape { n: 1, c: 1, h: 1, w: 2 };
        let grid  = make_grid(&[-1.0, 1.0], shape, 12, 0).unwrap();
        assert_eq!(grid.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(grid.get_pixel(1, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_rejects_mismatched_buffer() {
        let shape = BatchShape { n: 2, c: 3, h: 2, w: 2 };
        assert!(make_grid(&[0.0; 5], shape, 2, 0).is_err());
    }
}
