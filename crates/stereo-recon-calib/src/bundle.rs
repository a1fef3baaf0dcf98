//! Reprojection residuals shared by the mono and stereo refinements.
//!
//! Parameters are laid out as `[globals | pose_0 | pose_1 | ...]`, where each
//! per-view pose only touches the residual rows of its own view. The
//! Jacobian exploits that block structure and evaluates columns in parallel.

use levenberg_marquardt::LeastSquaresProblem;
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn, Point2, Point3};
use rayon::prelude::*;
use std::ops::Range;
use stereo_recon_core::{CameraModel, Distortion, DistortionModel, Intrinsics, Pose};

/// Residual assigned to points that project on or behind the image plane.
const BEHIND_CAMERA: f64 = 1e3;

pub(crate) const POSE_PARAMS: usize = 6;

pub(crate) fn camera_param_count(model: DistortionModel) -> usize {
    4 + model.num_coeffs()
}

/// `[fx, fy, cx, cy, k1, k2, p1, p2, k3, (k4, k5, k6)]`
pub(crate) fn push_camera_params(camera: &CameraModel, model: DistortionModel, out: &mut Vec<f64>) {
    let k = &camera.intrinsics;
    out.extend_from_slice(&[k.fx, k.fy, k.cx, k.cy]);
    out.extend_from_slice(camera.distortion.with_model(model).coeffs());
}

pub(crate) fn camera_from_params(p: &[f64], model: DistortionModel) -> CameraModel {
    CameraModel::new(
        Intrinsics::new(p[0], p[1], p[2], p[3]),
        Distortion::from_slice(model, &p[4..]),
    )
}

/// Write `2 * n` residuals `projected - observed` into `out`.
pub(crate) fn reprojection_residuals(
    camera: &CameraModel,
    pose: &Pose,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    out: &mut [f64],
) {
    for ((pw, obs), r) in object.iter().zip(image).zip(out.chunks_exact_mut(2)) {
        match camera.project(pose, pw) {
            Some(p) => {
                r[0] = p.x - obs.x;
                r[1] = p.y - obs.y;
            }
            None => {
                r[0] = BEHIND_CAMERA;
                r[1] = BEHIND_CAMERA;
            }
        }
    }
}

/// RMS of point reprojection distances for interleaved `(dx, dy)` residuals.
pub(crate) fn rms(residuals: &[f64]) -> f64 {
    let points = residuals.len() / 2;
    if points == 0 {
        return 0.0;
    }
    (residuals.iter().map(|r| r * r).sum::<f64>() / points as f64).sqrt()
}

/// Residual blocks over a shared parameter prefix and one pose per view.
pub(crate) trait ViewBlocks: Sync {
    fn num_globals(&self) -> usize;
    fn num_views(&self) -> usize;
    fn view_rows(&self, view: usize) -> Range<usize>;
    fn eval_view(&self, x: &DVector<f64>, view: usize, out: &mut [f64]);

    fn num_rows(&self) -> usize {
        match self.num_views() {
            0 => 0,
            n => self.view_rows(n - 1).end,
        }
    }

    fn pose(&self, x: &DVector<f64>, view: usize) -> Pose {
        let start = self.num_globals() + POSE_PARAMS * view;
        Pose::from_params(&x.as_slice()[start..start + POSE_PARAMS])
    }
}

/// Stacked residuals of every view at `x`.
pub(crate) fn block_residuals<B: ViewBlocks>(blocks: &B, x: &DVector<f64>) -> DVector<f64> {
    let mut r = DVector::zeros(blocks.num_rows());
    for v in 0..blocks.num_views() {
        let rows = blocks.view_rows(v);
        blocks.eval_view(x, v, &mut r.as_mut_slice()[rows]);
    }
    r
}

/// Central-difference Jacobian; a pose column only touches its own view.
pub(crate) fn block_jacobian<B: ViewBlocks>(blocks: &B, x: &DVector<f64>) -> DMatrix<f64> {
    let globals = blocks.num_globals();
    let n = x.len();

    let columns: Vec<Vec<(usize, f64)>> = (0..n)
        .into_par_iter()
        .map(|k| {
            let views = if k < globals {
                0..blocks.num_views()
            } else {
                let v = (k - globals) / POSE_PARAMS;
                v..v + 1
            };
            let h = 1e-6 * x[k].abs().max(1e-2);
            let mut shifted = x.clone();
            let mut col = Vec::new();
            for v in views {
                let rows = blocks.view_rows(v);
                let mut plus = vec![0.0; rows.len()];
                let mut minus = vec![0.0; rows.len()];
                shifted[k] = x[k] + h;
                blocks.eval_view(&shifted, v, &mut plus);
                shifted[k] = x[k] - h;
                blocks.eval_view(&shifted, v, &mut minus);
                shifted[k] = x[k];
                col.extend(
                    rows.zip(plus.iter().zip(&minus))
                        .map(|(row, (p, m))| (row, (p - m) / (2.0 * h))),
                );
            }
            col
        })
        .collect();

    let mut jac = DMatrix::zeros(blocks.num_rows(), n);
    for (k, col) in columns.into_iter().enumerate() {
        for (row, value) in col {
            jac[(row, k)] = value;
        }
    }
    jac
}

/// [`ViewBlocks`] bound to a parameter vector, as the LM solver expects.
pub(crate) struct BlockProblem<'a, B: ViewBlocks> {
    blocks: &'a B,
    params: DVector<f64>,
}

impl<'a, B: ViewBlocks> BlockProblem<'a, B> {
    pub(crate) fn new(blocks: &'a B, params: DVector<f64>) -> Self {
        Self { blocks, params }
    }

    pub(crate) fn num_params(&self) -> usize {
        self.blocks.num_globals() + POSE_PARAMS * self.blocks.num_views()
    }

    pub(crate) fn current(&self) -> &DVector<f64> {
        &self.params
    }

    pub(crate) fn into_params(self) -> DVector<f64> {
        self.params
    }
}

impl<B: ViewBlocks> LeastSquaresProblem<f64, Dyn, Dyn> for BlockProblem<'_, B> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.copy_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(block_residuals(self.blocks, &self.params))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        Some(block_jacobian(self.blocks, &self.params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn camera_params_roundtrip_through_layout() {
        let camera = CameraModel::new(
            Intrinsics::new(800.0, 790.0, 320.0, 240.0),
            Distortion::new(vec![-0.1, 0.02, 0.001, 0.002, 0.003]).expect("coeffs"),
        );
        let mut p = Vec::new();
        push_camera_params(&camera, DistortionModel::Rational, &mut p);
        assert_eq!(p.len(), camera_param_count(DistortionModel::Rational));
        let back = camera_from_params(&p, DistortionModel::Rational);
        assert_eq!(back.intrinsics, camera.intrinsics);
        assert_eq!(&back.distortion.coeffs()[..5], camera.distortion.coeffs());
        assert_eq!(back.distortion.model(), DistortionModel::Rational);
    }

    /// One global scale and one translation per view: `r = s * p + t - obs`.
    struct ScaledViews;

    impl ViewBlocks for ScaledViews {
        fn num_globals(&self) -> usize {
            1
        }

        fn num_views(&self) -> usize {
            2
        }

        fn view_rows(&self, view: usize) -> Range<usize> {
            view * 3..view * 3 + 3
        }

        fn eval_view(&self, x: &DVector<f64>, view: usize, out: &mut [f64]) {
            let t = x[1 + POSE_PARAMS * view];
            for (i, r) in out.iter_mut().enumerate() {
                *r = x[0] * x[0] * (i + 1) as f64 + t * t - 1.0;
            }
        }
    }

    #[test]
    fn block_problem_exposes_sparse_jacobian() {
        let mut x = DVector::zeros(1 + 2 * POSE_PARAMS);
        x[0] = 2.0;
        x[1] = 0.5;
        x[1 + POSE_PARAMS] = -1.5;
        let problem = BlockProblem::new(&ScaledViews, x.clone());
        assert_eq!(problem.num_params(), x.len());

        let jac = problem.jacobian().expect("jacobian");
        assert_eq!(jac.shape(), (6, x.len()));
        for row in 0..6 {
            assert_relative_eq!(jac[(row, 0)], 4.0 * (row % 3 + 1) as f64, epsilon = 1e-6);
        }
        // Each pose column only touches the rows of its own view.
        for row in 0..3 {
            assert_relative_eq!(jac[(row, 1)], 1.0, epsilon = 1e-6);
            assert_eq!(jac[(row, 1 + POSE_PARAMS)], 0.0);
            assert_eq!(jac[(row + 3, 1)], 0.0);
            assert_relative_eq!(jac[(row + 3, 1 + POSE_PARAMS)], -3.0, epsilon = 1e-6);
        }

        let r = problem.residuals().expect("residuals");
        assert_relative_eq!(r[0], 4.0 + 0.25 - 1.0);
        assert_relative_eq!(r[5], 12.0 + 2.25 - 1.0);
    }

    #[test]
    fn rms_is_per_point_not_per_coordinate() {
        assert_relative_eq!(rms(&[3.0, 4.0, 0.0, 0.0]), (25.0f64 / 2.0).sqrt());
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn points_behind_camera_get_a_large_residual() {
        let camera = CameraModel::pinhole(Intrinsics::new(500.0, 500.0, 0.0, 0.0));
        let pose = Pose::from_rvec_tvec(Vector3::zeros(), Vector3::new(0.0, 0.0, -1.0));
        let mut out = [0.0; 2];
        reprojection_residuals(&camera, &pose, &[Point3::origin()], &[Point2::origin()], &mut out);
        assert_eq!(out, [BEHIND_CAMERA, BEHIND_CAMERA]);
    }
}
