//! Closed-form starting points for the non-linear refinement.

use nalgebra::{DMatrix, Matrix3, Rotation3, SVector, Vector3};
use stereo_recon_core::{ImageSize, Intrinsics, Pose};

fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = h.column(i);
    let hj = h.column(j);
    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Zhang's closed-form intrinsics from three or more plane homographies.
/// The estimated skew is discarded.
pub(crate) fn zhang_intrinsics(homographies: &[Matrix3<f64>]) -> Option<Intrinsics> {
    if homographies.len() < 3 {
        return None;
    }
    // Bring pixel-sized and unit-sized entries to a common scale.
    let scale = homographies
        .iter()
        .filter(|h| h[(2, 2)].abs() > f64::EPSILON)
        .map(|h| (h[(0, 2)].abs() + h[(1, 2)].abs()) / h[(2, 2)].abs())
        .fold(0.0f64, f64::max);
    let scale = if scale.is_finite() && scale > 1.0 { scale } else { 1.0 };
    let cond = Matrix3::new(1.0 / scale, 0.0, 0.0, 0.0, 1.0 / scale, 0.0, 0.0, 0.0, 1.0);

    let m = homographies.len();
    let mut v = DMatrix::<f64>::zeros(2 * m, 6);
    for (k, h) in homographies.iter().enumerate() {
        let h = cond * h;
        let h = h / h.norm();
        v.row_mut(2 * k).copy_from(&v_ij(&h, 0, 1).transpose());
        v.row_mut(2 * k + 1)
            .copy_from(&(v_ij(&h, 0, 0) - v_ij(&h, 1, 1)).transpose());
    }

    let svd = v.svd(false, true);
    let v_t = svd.v_t?;
    let b = v_t.row(svd.singular_values.imin()).transpose();
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm <= 1e-6 {
        return None;
    }
    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    let fx2 = lambda / b11;
    let fy2 = lambda * b11 / denom;
    if fx2 <= 0.0 || fy2 <= 0.0 {
        return None;
    }
    let fx = fx2.sqrt();
    let fy = fy2.sqrt();
    let gamma = -b12 * fx * fx * fy / lambda;
    let u0 = gamma * v0 / fy - b13 * fx * fx / lambda;

    let k = Intrinsics::new(fx * scale, fy * scale, u0 * scale, v0 * scale);
    [k.fx, k.fy, k.cx, k.cy]
        .iter()
        .all(|v| v.is_finite())
        .then_some(k)
}

/// Focal lengths from the orthogonality constraints with the principal point
/// fixed at the image center. Works with a single view.
pub(crate) fn centered_intrinsics(homographies: &[Matrix3<f64>], size: ImageSize) -> Option<Intrinsics> {
    let cx = (size.width as f64 - 1.0) * 0.5;
    let cy = (size.height as f64 - 1.0) * 0.5;
    let shift = Matrix3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);

    // Unknowns u = 1/fx^2, v = 1/fy^2.
    let mut rows: Vec<([f64; 2], f64)> = Vec::with_capacity(2 * homographies.len());
    for h in homographies {
        let h = shift * h;
        let h = h / h.norm();
        let (h1, h2) = (h.column(0), h.column(1));
        rows.push(([h1[0] * h2[0], h1[1] * h2[1]], -h1[2] * h2[2]));
        rows.push((
            [h1[0] * h1[0] - h2[0] * h2[0], h1[1] * h1[1] - h2[1] * h2[1]],
            -(h1[2] * h1[2] - h2[2] * h2[2]),
        ));
    }

    let a = DMatrix::from_fn(rows.len(), 2, |r, c| rows[r].0[c]);
    let rhs = DMatrix::from_fn(rows.len(), 1, |r, _| rows[r].1);
    let ata = a.transpose() * &a;
    let atb = a.transpose() * &rhs;
    let solved = ata
        .try_inverse()
        .map(|inv| inv * &atb)
        .filter(|x| x[0] > 0.0 && x[1] > 0.0);

    let (u, v) = match solved {
        Some(x) => (x[0], x[1]),
        None => {
            // Shared focal length: u = v.
            let num: f64 = rows.iter().map(|(c, r)| (c[0] + c[1]) * r).sum();
            let den: f64 = rows.iter().map(|(c, _)| (c[0] + c[1]).powi(2)).sum();
            if den <= 0.0 || num / den <= 0.0 {
                return None;
            }
            (num / den, num / den)
        }
    };
    let k = Intrinsics::new(1.0 / u.sqrt(), 1.0 / v.sqrt(), cx, cy);
    (k.fx.is_finite() && k.fy.is_finite()).then_some(k)
}

/// Pose of a `Z = 0` plane from its homography `H ~ K [r1 r2 t]`.
///
/// The rotation is projected onto SO(3) and the plane is kept in front of
/// the camera.
pub(crate) fn pose_from_homography(k: &Intrinsics, h: &Matrix3<f64>) -> Option<Pose> {
    let k_inv = k.matrix().try_inverse()?;
    let a1 = k_inv * h.column(0);
    let a2 = k_inv * h.column(1);
    let a3 = k_inv * h.column(2);

    let n1 = a1.norm();
    let n2 = a2.norm();
    if n1 <= 1e-12 || n2 <= 1e-12 {
        return None;
    }
    let mut lambda = 2.0 / (n1 + n2);
    if a3.z * lambda < 0.0 {
        lambda = -lambda;
    }
    let r1 = a1 * lambda;
    let r2 = a2 * lambda;
    let t: Vector3<f64> = a3 * lambda;
    let r3 = r1.cross(&r2);
    if r3.norm() <= 1e-12 {
        return None;
    }

    let approx = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = approx.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u = u;
        u.column_mut(2).neg_mut();
        r = u * v_t;
    }
    Some(Pose::new(Rotation3::from_matrix_unchecked(r), t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn homography(k: &Intrinsics, pose: &Pose) -> Matrix3<f64> {
        let r = pose.rotation.matrix();
        k.matrix() * Matrix3::from_columns(&[r.column(0).into_owned(), r.column(1).into_owned(), pose.translation])
    }

    fn poses() -> Vec<Pose> {
        vec![
            Pose::from_rvec_tvec(Vector3::new(0.2, -0.1, 0.05), Vector3::new(-0.1, -0.08, 0.9)),
            Pose::from_rvec_tvec(Vector3::new(-0.25, 0.15, -0.1), Vector3::new(-0.05, -0.1, 1.1)),
            Pose::from_rvec_tvec(Vector3::new(0.05, 0.3, 0.2), Vector3::new(-0.12, -0.02, 1.0)),
            Pose::from_rvec_tvec(Vector3::new(0.3, 0.25, -0.15), Vector3::new(-0.08, -0.06, 1.2)),
        ]
    }

    #[test]
    fn zhang_recovers_exact_intrinsics() {
        let k = Intrinsics::new(820.0, 810.0, 330.0, 235.0);
        let hs: Vec<_> = poses().iter().map(|p| homography(&k, p) * 3.7).collect();
        let est = zhang_intrinsics(&hs).expect("intrinsics");
        assert_relative_eq!(est.fx, k.fx, max_relative = 1e-6);
        assert_relative_eq!(est.fy, k.fy, max_relative = 1e-6);
        assert_relative_eq!(est.cx, k.cx, epsilon = 1e-3);
        assert_relative_eq!(est.cy, k.cy, epsilon = 1e-3);
        assert!(zhang_intrinsics(&hs[..2]).is_none());
    }

    #[test]
    fn centered_init_recovers_focal_from_one_view() {
        let size = ImageSize::new(641, 481);
        let k = Intrinsics::new(800.0, 800.0, 320.0, 240.0);
        let h = homography(&k, &poses()[3]);
        let est = centered_intrinsics(&[h], size).expect("intrinsics");
        assert_relative_eq!(est.fx, 800.0, max_relative = 1e-6);
        assert_relative_eq!(est.fy, 800.0, max_relative = 1e-6);
    }

    #[test]
    fn pose_from_homography_is_exact_for_noise_free_data() {
        let k = Intrinsics::new(700.0, 700.0, 320.0, 240.0);
        for pose in poses() {
            let h = -2.0 * homography(&k, &pose);
            let est = pose_from_homography(&k, &h).expect("pose");
            assert_relative_eq!(est.rotation.matrix(), pose.rotation.matrix(), epsilon = 1e-9);
            assert_relative_eq!(est.translation, pose.translation, epsilon = 1e-9);
        }
    }
}
