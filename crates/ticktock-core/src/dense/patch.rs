//! CPU dense matcher: normalized cross-correlation of a regular grid of
//! reference patches, searched coarse-to-fine in the target canvas.

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{DEFAULT_DENSE_CANVAS, EPSILON};
use crate::error::{Result, TickTockError};
use crate::filters::resize::resize_array;

use super::{ComputeContext, DenseMatch, DenseMatcher};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchCorrelationParams {
    pub canvas_size: usize,
    /// Spacing of reference grid points, canvas pixels.
    pub grid_step: usize,
    pub patch_radius: usize,
    /// Largest displacement searched, canvas pixels.
    pub search_radius: usize,
    /// Downscale of the coarse search level.
    pub coarse_factor: usize,
    /// Patches flatter than this standard deviation are not matched.
    pub min_std: f32,
}

impl PatchCorrelationParams {
    /// Smallest canvas with at least one grid point inside the search margin.
    pub fn min_canvas_size(&self) -> usize {
        2 * self.margin() + 1
    }

    fn margin(&self) -> usize {
        self.patch_radius.max(self.coarse_factor.max(1) * 2) + 1
    }
}

impl Default for PatchCorrelationParams {
    fn default() -> Self {
        Self {
            canvas_size: DEFAULT_DENSE_CANVAS,
            grid_step: 16,
            patch_radius: 8,
            search_radius: 48,
            coarse_factor: 4,
            min_std: 0.02,
        }
    }
}

pub struct PatchCorrelationMatcher {
    params: PatchCorrelationParams,
    context: ComputeContext,
}

impl PatchCorrelationMatcher {
    pub fn new(params: PatchCorrelationParams, context: ComputeContext) -> Self {
        Self { params, context }
    }

    fn match_point(
        &self,
        reference: &Array2<f32>,
        target: &Array2<f32>,
        coarse_ref: &Array2<f32>,
        coarse_tgt: &Array2<f32>,
        row: usize,
        col: usize,
    ) -> Option<DenseMatch> {
        let f = self.params.coarse_factor.max(1);
        let radius = self.params.patch_radius;
        let coarse_radius = (radius / f).max(2);
        let coarse_search = (self.params.search_radius / f).max(1) as isize;

        let fine_template = normalized_patch(reference, row, col, radius, self.params.min_std)?;
        let coarse_template =
            normalized_patch(coarse_ref, row / f, col / f, coarse_radius, self.params.min_std)?;

        // Coarse search: best and best outside its immediate neighborhood
        let (cr, cc) = ((row / f) as isize, (col / f) as isize);
        let mut scores = Vec::new();
        for dy in -coarse_search..=coarse_search {
            for dx in -coarse_search..=coarse_search {
                let (r, c) = (cr + dy, cc + dx);
                if let Some(score) = ncc_at(&coarse_template, coarse_tgt, r, c, coarse_radius) {
                    scores.push((r, c, score));
                }
            }
        }
        let &(br, bc, best) = scores.iter().max_by(|a, b| a.2.total_cmp(&b.2))?;
        let second = scores
            .iter()
            .filter(|s| (s.0 - br).abs() > 1 || (s.1 - bc).abs() > 1)
            .map(|s| s.2)
            .fold(f32::NEG_INFINITY, f32::max);
        if best <= 0.0 {
            return None;
        }
        let distinct = if second.is_finite() {
            ((best - second) / (1.0 - second).max(EPSILON)).clamp(0.0, 1.0)
        } else {
            1.0
        };

        // Fine refinement around the coarse peak
        let (fr, fc) = (br * f as isize, bc * f as isize);
        let reach = f as isize;
        let mut fine_best: Option<(isize, isize, f32)> = None;
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let (r, c) = (fr + dy, fc + dx);
                if let Some(score) = ncc_at(&fine_template, target, r, c, radius) {
                    let better = match fine_best {
                        None => true,
                        Some(b) => score > b.2,
                    };
                    if better {
                        fine_best = Some((r, c, score));
                    }
                }
            }
        }
        let (tr, tc, score) = fine_best?;

        Some(DenseMatch {
            reference: (col as f32, row as f32),
            target: (tc as f32, tr as f32),
            confidence: score.max(0.0) * distinct,
        })
    }
}

impl DenseMatcher for PatchCorrelationMatcher {
    fn name(&self) -> &str {
        "patch-correlation"
    }

    fn context(&self) -> &ComputeContext {
        &self.context
    }

    fn canvas_size(&self) -> usize {
        self.params.canvas_size
    }

    fn match_pair(&self, reference: &Array2<f32>, target: &Array2<f32>) -> Result<Vec<DenseMatch>> {
        let size = self.params.canvas_size;
        if reference.dim() != (size, size) || target.dim() != (size, size) {
            return Err(TickTockError::Pipeline(format!(
                "dense matcher expects {size}x{size} canvases, got {:?} and {:?}",
                reference.dim(),
                target.dim()
            )));
        }

        if size < self.params.min_canvas_size() {
            return Err(TickTockError::Pipeline(format!(
                "dense canvas of {size} pixels is smaller than the {} pixel minimum",
                self.params.min_canvas_size()
            )));
        }

        let f = self.params.coarse_factor.max(1);
        let coarse_size = (size / f).max(1);
        let coarse_ref = resize_array(reference, coarse_size, coarse_size);
        let coarse_tgt = resize_array(target, coarse_size, coarse_size);

        let step = self.params.grid_step.max(1);
        let margin = self.params.margin();
        let grid: Vec<(usize, usize)> = (margin..size.saturating_sub(margin))
            .step_by(step)
            .flat_map(|r| {
                (margin..size.saturating_sub(margin))
                    .step_by(step)
                    .map(move |c| (r, c))
            })
            .collect();

        let matches: Vec<DenseMatch> = grid
            .par_iter()
            .filter_map(|&(r, c)| {
                self.match_point(reference, target, &coarse_ref, &coarse_tgt, r, c)
            })
            .collect();

        debug!(
            grid = grid.len(),
            matches = matches.len(),
            device = %self.context.device,
            "Patch correlation matching"
        );
        Ok(matches)
    }
}

/// Zero-mean, unit-norm patch values, or `None` if the patch leaves the
/// image or is too flat.
fn normalized_patch(
    img: &Array2<f32>,
    row: usize,
    col: usize,
    radius: usize,
    min_std: f32,
) -> Option<Vec<f32>> {
    let (h, w) = img.dim();
    if row < radius || col < radius || row + radius >= h || col + radius >= w {
        return None;
    }
    let mut values = Vec::with_capacity((2 * radius + 1).pow(2));
    for r in row - radius..=row + radius {
        for c in col - radius..=col + radius {
            values.push(img[[r, c]]);
        }
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let mut norm = 0.0f32;
    for v in values.iter_mut() {
        *v -= mean;
        norm += *v * *v;
    }
    if (norm / n).sqrt() < min_std {
        return None;
    }
    let norm = norm.sqrt();
    for v in values.iter_mut() {
        *v /= norm;
    }
    Some(values)
}

/// NCC between a normalized template and the image patch centered at (row, col).
fn ncc_at(
    template: &[f32],
    img: &Array2<f32>,
    row: isize,
    col: isize,
    radius: usize,
) -> Option<f32> {
    let (h, w) = img.dim();
    let rad = radius as isize;
    if row < rad || col < rad || row + rad >= h as isize || col + rad >= w as isize {
        return None;
    }
    let (row, col) = (row as usize, col as usize);

    let mut sum = 0.0f32;
    let mut sum_sq = 0.0f32;
    let mut dot = 0.0f32;
    let mut i = 0;
    for r in row - radius..=row + radius {
        for c in col - radius..=col + radius {
            let v = img[[r, c]];
            sum += v;
            sum_sq += v * v;
            dot += template[i] * v;
            i += 1;
        }
    }
    let n = template.len() as f32;
    let var = sum_sq - sum * sum / n;
    if var <= EPSILON {
        return Some(0.0);
    }
    // Template is zero-mean, so the image mean drops out of the dot product
    Some(dot / var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ncc_of_patch_with_itself_is_one() {
        let img = Array2::from_shape_fn((21, 21), |(r, c)| ((r * 7 + c * 13) % 11) as f32 / 10.0);
        let t = normalized_patch(&img, 10, 10, 4, 0.01).unwrap();
        let score = ncc_at(&t, &img, 10, 10, 4).unwrap();
        assert!((score - 1.0).abs() < 1e-4, "score={score}");
    }

    #[test]
    fn rejects_wrong_canvas_size() {
        let m =
            PatchCorrelationMatcher::new(PatchCorrelationParams::default(), ComputeContext::cpu());
        let a = Array2::<f32>::zeros((10, 10));
        assert!(m.match_pair(&a, &a).is_err());
    }
}
