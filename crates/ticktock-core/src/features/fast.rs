//! FAST-9 segment-test corners.

use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Bresenham circle of radius 3, clockwise from the top, as (dx, dy).
pub const CIRCLE: [(isize, isize); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Contiguous arc length required for a corner.
pub const ARC_LENGTH: usize = 9;

/// Radius of the segment-test circle.
pub const CIRCLE_RADIUS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FastCorner {
    pub row: usize,
    pub col: usize,
    pub score: f32,
}

/// Largest threshold at which (row, col) still passes the segment test.
///
/// The caller guarantees the circle lies inside the image.
pub fn corner_score(img: &Array2<f32>, row: usize, col: usize) -> f32 {
    let p = img[[row, col]];
    let mut ring = [0.0f32; 16];
    for (v, &(dx, dy)) in ring.iter_mut().zip(CIRCLE.iter()) {
        *v = img[[(row as isize + dy) as usize, (col as isize + dx) as usize]] - p;
    }

    let mut best = 0.0f32;
    for start in 0..16 {
        let mut bright = f32::INFINITY;
        let mut dark = f32::INFINITY;
        for i in 0..ARC_LENGTH {
            let d = ring[(start + i) % 16];
            bright = bright.min(d);
            dark = dark.min(-d);
        }
        best = best.max(bright).max(dark);
    }
    best
}

/// Cheap rejection: any 9-arc covers at least two of the four compass
/// points, so at least two must clear the threshold in the same direction.
#[inline]
fn passes_compass_test(img: &Array2<f32>, row: usize, col: usize, threshold: f32) -> bool {
    let p = img[[row, col]];
    let mut brighter = 0;
    let mut darker = 0;
    for &(dx, dy) in [CIRCLE[0], CIRCLE[4], CIRCLE[8], CIRCLE[12]].iter() {
        let v = img[[(row as isize + dy) as usize, (col as isize + dx) as usize]];
        if v > p + threshold {
            brighter += 1;
        } else if v < p - threshold {
            darker += 1;
        }
    }
    brighter >= 2 || darker >= 2
}

/// Detect FAST-9 corners at least `border` pixels from the image edge,
/// with 3x3 non-maximum suppression on the corner score.
pub fn detect(img: &Array2<f32>, threshold: f32, border: usize) -> Vec<FastCorner> {
    let (h, w) = img.dim();
    let border = border.max(CIRCLE_RADIUS);
    if h <= 2 * border || w <= 2 * border {
        return Vec::new();
    }

    let score_row = |row: usize| -> Vec<f32> {
        let mut scores = vec![0.0f32; w];
        if row < border || row >= h - border {
            return scores;
        }
        for (col, s) in scores.iter_mut().enumerate().take(w - border).skip(border) {
            if passes_compass_test(img, row, col, threshold) {
                let score = corner_score(img, row, col);
                if score > threshold {
                    *s = score;
                }
            }
        }
        scores
    };

    let rows: Vec<Vec<f32>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(score_row).collect()
    } else {
        (0..h).map(score_row).collect()
    };

    let mut corners = Vec::new();
    for row in border..h - border {
        for col in border..w - border {
            let s = rows[row][col];
            if s <= 0.0 {
                continue;
            }
            // Ties go to the first pixel in raster order
            let is_max = rows[row - 1][col - 1] < s
                && rows[row - 1][col] < s
                && rows[row - 1][col + 1] < s
                && rows[row][col - 1] < s
                && rows[row][col + 1] <= s
                && rows[row + 1][col - 1] <= s
                && rows[row + 1][col] <= s
                && rows[row + 1][col + 1] <= s;
            if is_max {
                corners.push(FastCorner { row, col, score: s });
            }
        }
    }
    corners
}

/// Harris corner measure det(M) - k tr(M)^2 over a `block` x `block` window
/// of Sobel gradients. The window plus one pixel must lie inside the image.
pub fn harris_response(img: &Array2<f32>, row: usize, col: usize, block: usize, k: f32) -> f32 {
    let half = (block / 2) as isize;
    let mut sxx = 0.0f32;
    let mut syy = 0.0f32;
    let mut sxy = 0.0f32;
    let at = |r: isize, c: isize| img[[r as usize, c as usize]];

    for dy in -half..=half {
        for dx in -half..=half {
            let r = row as isize + dy;
            let c = col as isize + dx;
            let gx = (at(r - 1, c + 1) + 2.0 * at(r, c + 1) + at(r + 1, c + 1))
                - (at(r - 1, c - 1) + 2.0 * at(r, c - 1) + at(r + 1, c - 1));
            let gy = (at(r + 1, c - 1) + 2.0 * at(r + 1, c) + at(r + 1, c + 1))
                - (at(r - 1, c - 1) + 2.0 * at(r - 1, c) + at(r - 1, c + 1));
            sxx += gx * gx;
            syy += gy * gy;
            sxy += gx * gy;
        }
    }

    sxx * syy - sxy * sxy - k * (sxx + syy) * (sxx + syy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_image_has_no_corners() {
        let img = Array2::<f32>::from_elem((32, 32), 0.5);
        assert!(detect(&img, 0.05, 3).is_empty());
    }

    #[test]
    fn texture_in_border_rows_is_ignored() {
        let img = Array2::from_shape_fn((24, 24), |(r, c)| ((r * 7 + c * 13) % 5) as f32 / 4.0);
        for corner in detect(&img, 0.05, 3) {
            assert!(corner.row >= 3 && corner.row < 21, "corner in border: {corner:?}");
            assert!(corner.col >= 3 && corner.col < 21, "corner in border: {corner:?}");
        }
    }

    #[test]
    fn bright_square_corner_is_detected() {
        let mut img = Array2::<f32>::zeros((40, 40));
        for r in 20..40 {
            for c in 20..40 {
                img[[r, c]] = 1.0;
            }
        }
        let corners = detect(&img, 0.2, 4);
        assert!(
            corners
                .iter()
                .any(|c| (c.row as isize - 20).abs() <= 2 && (c.col as isize - 20).abs() <= 2),
            "corners: {corners:?}"
        );
    }
}
