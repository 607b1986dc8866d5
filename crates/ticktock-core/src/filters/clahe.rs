//! Contrast-limited adaptive histogram equalization.
//!
//! The image is split into a grid of tiles. Each tile gets its own clipped
//! histogram and equalization table; output pixels blend the tables of the
//! four nearest tile centers bilinearly so tile seams do not show.

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::consts::{INTENSITY_LEVELS, PARALLEL_PIXEL_THRESHOLD};
use crate::frame::Frame;

use super::levels::quantize;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaheParams {
    /// Histogram clip limit, relative to a flat histogram.
    pub clip_limit: f32,
    /// Number of tiles along each axis.
    pub grid_size: usize,
}

impl Default for ClaheParams {
    fn default() -> Self {
        Self {
            clip_limit: 3.0,
            grid_size: 8,
        }
    }
}

type Lut = [f32; INTENSITY_LEVELS];

pub fn clahe(frame: &Frame, params: &ClaheParams) -> Frame {
    let (h, w) = frame.data.dim();
    if h == 0 || w == 0 {
        return frame.clone();
    }

    let tiles_y = params.grid_size.clamp(1, h);
    let tiles_x = params.grid_size.clamp(1, w);
    let tile_h = h.div_ceil(tiles_y);
    let tile_w = w.div_ceil(tiles_x);

    let levels = frame.data.mapv(quantize);

    let mut luts: Vec<Lut> = Vec::with_capacity(tiles_y * tiles_x);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let r0 = (ty * tile_h).min(h);
            let r1 = ((ty + 1) * tile_h).min(h);
            let c0 = (tx * tile_w).min(w);
            let c1 = ((tx + 1) * tile_w).min(w);
            luts.push(tile_lut(&levels, r0, r1, c0, c1, params.clip_limit));
        }
    }

    let lut = |ty: usize, tx: usize, level: usize| -> f32 { luts[ty * tiles_x + tx][level] };

    let map_pixel = |row: usize, col: usize| -> f32 {
        let level = levels[[row, col]];

        // Position relative to tile centers
        let gy = (row as f32 + 0.5) / tile_h as f32 - 0.5;
        let gx = (col as f32 + 0.5) / tile_w as f32 - 0.5;
        let ty0 = gy.floor().clamp(0.0, (tiles_y - 1) as f32) as usize;
        let tx0 = gx.floor().clamp(0.0, (tiles_x - 1) as f32) as usize;
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let fy = (gy - ty0 as f32).clamp(0.0, 1.0);
        let fx = (gx - tx0 as f32).clamp(0.0, 1.0);

        let top = lut(ty0, tx0, level) * (1.0 - fx) + lut(ty0, tx1, level) * fx;
        let bottom = lut(ty1, tx0, level) * (1.0 - fx) + lut(ty1, tx1, level) * fx;
        (top * (1.0 - fy) + bottom * fy).clamp(0.0, 1.0)
    };

    let mut data = Array2::<f32>::zeros((h, w));
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        Zip::indexed(&mut data).par_for_each(|(row, col), out| *out = map_pixel(row, col));
    } else {
        Zip::indexed(&mut data).for_each(|(row, col), out| *out = map_pixel(row, col));
    }

    Frame::new(data, frame.original_bit_depth)
}

/// Clipped-histogram equalization table for one tile.
fn tile_lut(
    levels: &Array2<usize>,
    r0: usize,
    r1: usize,
    c0: usize,
    c1: usize,
    clip_limit: f32,
) -> Lut {
    let mut lut = [0.0f32; INTENSITY_LEVELS];
    let area = (r1 - r0) * (c1 - c0);
    if area == 0 {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as f32 / 255.0;
        }
        return lut;
    }

    let mut hist = [0usize; INTENSITY_LEVELS];
    for row in r0..r1 {
        for col in c0..c1 {
            hist[levels[[row, col]]] += 1;
        }
    }

    if clip_limit > 0.0 {
        let limit = ((clip_limit * area as f32 / INTENSITY_LEVELS as f32) as usize).max(1);
        let mut excess = 0usize;
        for bin in hist.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }

        // Spread the clipped mass evenly, then the remainder one bin at a time
        let batch = excess / INTENSITY_LEVELS;
        let residual = excess % INTENSITY_LEVELS;
        for bin in hist.iter_mut() {
            *bin += batch;
        }
        if residual > 0 {
            let step = (INTENSITY_LEVELS / residual).max(1);
            for bin in hist.iter_mut().step_by(step).take(residual) {
                *bin += 1;
            }
        }
    }

    let scale = 1.0 / area as f32;
    let mut cdf = 0usize;
    for (v, &count) in lut.iter_mut().zip(hist.iter()) {
        cdf += count;
        *v = (cdf as f32 * scale).min(1.0);
    }
    lut
}
