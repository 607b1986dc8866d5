use std::fmt;

use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};

/// Projective map from target pixel coordinates to reference pixel
/// coordinates, normalized so that the bottom-right element is 1.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    /// Wrap a matrix, rescaling it so `h[(2, 2)] == 1`.
    ///
    /// Returns `None` when the bottom-right element is numerically zero.
    pub fn new(h: Matrix3<f64>) -> Option<Self> {
        normalize_homography(h).map(|h| Self { h })
    }

    pub fn identity() -> Self {
        Self {
            h: Matrix3::identity(),
        }
    }

    /// Pure translation: (x, y) -> (x + tx, y + ty).
    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            h: Matrix3::new(1.0, 0.0, tx, 0.0, 1.0, ty, 0.0, 0.0, 1.0),
        }
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Option<Self> {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    /// Map a point. `None` if it lands on the line at infinity.
    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let v = self.h * Vector3::new(x, y, 1.0);
        let w = v[2];
        if w.abs() < 1e-12 {
            return None;
        }
        Some((v[0] / w, v[1] / w))
    }

    #[inline]
    pub fn apply_point(&self, p: &Point2<f64>) -> Option<Point2<f64>> {
        self.apply(p.x, p.y).map(|(x, y)| Point2::new(x, y))
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().and_then(Self::new)
    }

    /// Ratio of largest to smallest singular value. Infinite if singular.
    pub fn condition_number(&self) -> f64 {
        condition_number(&self.h)
    }

    /// Condition number measured after Hartley normalization of both point
    /// sets, so that it reflects the geometry of the fit rather than the
    /// pixel scale of the translation terms.
    pub fn normalized_condition_number(&self, src: &[Point2<f64>], dst: &[Point2<f64>]) -> f64 {
        let (Some((_, t_src)), Some((_, t_dst))) = (normalize_points(src), normalize_points(dst))
        else {
            return f64::INFINITY;
        };
        let Some(t_src_inv) = t_src.try_inverse() else {
            return f64::INFINITY;
        };
        condition_number(&(t_dst * self.h * t_src_inv))
    }

    /// Euclidean distance between the mapped source point and `dst`.
    #[inline]
    pub fn reprojection_error(&self, src: &Point2<f64>, dst: &Point2<f64>) -> f64 {
        match self.apply_point(src) {
            Some(p) => (p - dst).norm(),
            None => f64::INFINITY,
        }
    }

    /// Translation components (h13, h23).
    pub fn translation_part(&self) -> (f64, f64) {
        (self.h[(0, 2)], self.h[(1, 2)])
    }
}

impl Default for Homography {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Display for Homography {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..3 {
            writeln!(
                f,
                "[{:>12.6} {:>12.6} {:>12.6}]",
                self.h[(r, 0)],
                self.h[(r, 1)],
                self.h[(r, 2)]
            )?;
        }
        Ok(())
    }
}

fn condition_number(m: &Matrix3<f64>) -> f64 {
    let sv = m.singular_values();
    let max = sv.max();
    let min = sv.min();
    if min <= f64::EPSILON * max.max(1.0) {
        f64::INFINITY
    } else {
        max / min
    }
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

/// Translate to the centroid and scale so the mean distance is sqrt(2).
fn normalize_points(pts: &[Point2<f64>]) -> Option<(Vec<Point2<f64>>, Matrix3<f64>)> {
    if pts.is_empty() {
        return None;
    }
    let n = pts.len() as f64;
    let (sx, sy) = pts
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let cx = sx / n;
    let cy = sy / n;

    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let t = hartley_normalization(cx, cy, mean_dist);
    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x, p.y, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    Some((out, t))
}

fn normalize_homography(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    if s.abs() < 1e-12 || !h.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(h / s)
}

fn denormalize_homography(
    hn: Matrix3<f64>,
    t_src: Matrix3<f64>,
    t_dst: Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    let t_dst_inv = t_dst.try_inverse()?;
    Some(t_dst_inv * hn * t_src)
}

/// Fit `dst ~ H * src` to all pairs.
///
/// Exactly four pairs use the direct 8x8 solve, more use the normalized DLT
/// (smallest right singular vector of the 2N x 9 system).
pub fn fit_homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }

    if src.len() == 4 {
        let s: &[Point2<f64>; 4] = src.try_into().ok()?;
        let d: &[Point2<f64>; 4] = dst.try_into().ok()?;
        return homography_from_4pt(s, d);
    }

    let (s, ts) = normalize_points(src)?;
    let (d, td) = normalize_points(dst)?;

    let n = src.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);

    for k in 0..n {
        let x = s[k].x;
        let y = s[k].y;
        let u = d[k].x;
        let v = d[k].y;

        // [ -x -y -1   0  0  0   u*x u*y u ]
        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        // [ 0  0  0  -x -y -1   v*x v*y v ]
        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    // The SVD of a 2N x 9 matrix with N > 4 yields a full 9 x 9 V^T
    let svd = a.svd(false, true);
    let vt = svd.v_t?;
    let (smallest, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |best, (i, &v)| if v < best.1 { (i, v) } else { best });
    let h = vt.row(smallest);

    let hn =
        Matrix3::<f64>::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

    let h_den = denormalize_homography(hn, ts, td)?;
    Homography::new(h_den)
}

/// Exact homography through four pairs, with h33 fixed to 1.
pub fn homography_from_4pt(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Option<Homography> {
    let (src_n, t_src) = normalize_points(src)?;
    let (dst_n, t_dst) = normalize_points(dst)?;

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let x = src_n[k].x;
        let y = src_n[k].y;
        let u = dst_n[k].x;
        let v = dst_n[k].y;

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b)?;

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    let h_den = denormalize_homography(hn, t_src, t_dst)?;
    Homography::new(h_den)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &Homography, b: &Homography, tol: f64) {
        for r in 0..3 {
            for c in 0..3 {
                let d = (a.h[(r, c)] - b.h[(r, c)]).abs();
                assert!(d < tol, "h[{r},{c}] differs by {d}");
            }
        }
    }

    fn sample_h() -> Homography {
        Homography::from_array([[1.02, 0.05, 12.0], [-0.03, 0.98, -7.0], [1e-5, -2e-5, 1.0]])
            .unwrap()
    }

    fn grid_points() -> Vec<Point2<f64>> {
        let mut pts = Vec::new();
        for y in 0..5 {
            for x in 0..6 {
                pts.push(Point2::new(x as f64 * 90.0 + 13.0, y as f64 * 70.0 + 7.0));
            }
        }
        pts
    }

    #[test]
    fn inverse_round_trips_points() {
        let h = sample_h();
        let inv = h.inverse().unwrap();
        for p in grid_points() {
            let q = inv.apply_point(&h.apply_point(&p).unwrap()).unwrap();
            assert!((p - q).norm() < 1e-9);
        }
    }

    #[test]
    fn four_point_specialization_recovers_h() {
        let h = sample_h();
        let src = [
            Point2::new(0.0, 0.0),
            Point2::new(400.0, 0.0),
            Point2::new(400.0, 300.0),
            Point2::new(0.0, 300.0),
        ];
        let dst = src.map(|p| h.apply_point(&p).unwrap());
        let est = homography_from_4pt(&src, &dst).unwrap();
        assert_close(&est, &h, 1e-8);
    }

    #[test]
    fn dlt_handles_overdetermined_case() {
        let h = sample_h();
        let src = grid_points();
        let dst: Vec<_> = src.iter().map(|p| h.apply_point(p).unwrap()).collect();
        let est = fit_homography(&src, &dst).unwrap();
        assert_close(&est, &h, 1e-7);
    }

    #[test]
    fn condition_of_translation_is_one_after_normalization() {
        let h = Homography::translation(150.0, -80.0);
        let src = grid_points();
        let dst: Vec<_> = src.iter().map(|p| h.apply_point(p).unwrap()).collect();
        let c = h.normalized_condition_number(&src, &dst);
        assert!((c - 1.0).abs() < 1e-9, "condition={c}");
        assert!(h.condition_number() > 100.0);
    }
}
