use crate::params::SubPixParams;
use nalgebra::Point2;
use stereo_recon_core::{sample_bilinear, GrayImageView};

/// Refine a saddle-point corner to sub-pixel accuracy.
///
/// At the true corner `q`, every gradient `g(p)` in the neighborhood is
/// orthogonal to `p - q` (flat areas have no gradient, edges point across).
/// Solving `sum(w * g g^T) q = sum(w * g g^T p)` over a Gaussian-weighted
/// `(2h+1)^2` window and iterating converges to the saddle. Iteration stops
/// after `max_iters` steps or once a step is shorter than `epsilon` pixels.
/// A result further than the half window from the start is discarded and
/// the start returned instead.
pub fn corner_subpix(img: &GrayImageView<'_>, start: Point2<f64>, params: &SubPixParams) -> Point2<f64> {
    let h = params.half_window.max(1) as i32;
    let side = (2 * h + 1) as usize;

    let weights: Vec<f64> = {
        let mut w = Vec::with_capacity(side * side);
        for i in -h..=h {
            let vy = (-((i as f64) / h as f64).powi(2)).exp();
            for j in -h..=h {
                let vx = (-((j as f64) / h as f64).powi(2)).exp();
                w.push(vx * vy);
            }
        }
        w
    };

    // (side + 2)^2 samples so central differences cover the whole window.
    let padded = side + 2;
    let mut patch = vec![0.0f64; padded * padded];
    let eps2 = params.epsilon * params.epsilon;
    let mut current = start;

    for _ in 0..params.max_iters.max(1) {
        for r in 0..padded {
            let y = current.y + (r as i32 - h - 1) as f64;
            for c in 0..padded {
                let x = current.x + (c as i32 - h - 1) as f64;
                patch[r * padded + c] = sample_bilinear(img, x as f32, y as f32) as f64;
            }
        }

        let (mut a, mut b, mut c, mut bb1, mut bb2) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for i in 0..side {
            let py = i as f64 - h as f64;
            for j in 0..side {
                let m = weights[i * side + j];
                let gx = patch[(i + 1) * padded + j + 2] - patch[(i + 1) * padded + j];
                let gy = patch[(i + 2) * padded + j + 1] - patch[i * padded + j + 1];
                let gxx = gx * gx * m;
                let gxy = gx * gy * m;
                let gyy = gy * gy * m;
                let px = j as f64 - h as f64;

                a += gxx;
                b += gxy;
                c += gyy;
                bb1 += gxx * px + gxy * py;
                bb2 += gxy * px + gyy * py;
            }
        }

        let det = a * c - b * b;
        if det.abs() <= f64::EPSILON * f64::EPSILON {
            break;
        }
        let scale = 1.0 / det;
        let next = Point2::new(
            current.x + c * scale * bb1 - b * scale * bb2,
            current.y - b * scale * bb1 + a * scale * bb2,
        );
        let step2 = (next - current).norm_squared();
        current = next;

        if current.x < 0.0
            || current.y < 0.0
            || current.x >= img.width as f64
            || current.y >= img.height as f64
        {
            break;
        }
        if step2 <= eps2 {
            break;
        }
    }

    if (current.x - start.x).abs() > h as f64 || (current.y - start.y).abs() > h as f64 {
        return start;
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_recon_core::GrayImage;

    /// Anti-aliased X-junction at (cx, cy), supersampled 8x8 per pixel.
    fn saddle(size: usize, cx: f64, cy: f64) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let mut acc: f64 = 0.0;
            for sy in 0..8 {
                for sx in 0..8 {
                    let u = x as f64 + (sx as f64 + 0.5) / 8.0 - 0.5 - cx;
                    let v = y as f64 + (sy as f64 + 0.5) / 8.0 - 0.5 - cy;
                    acc += if (u < 0.0) == (v < 0.0) { 40.0 } else { 210.0 };
                }
            }
            (acc / 64.0).round() as u8
        })
    }

    #[test]
    fn converges_to_true_saddle() {
        let img = saddle(40, 19.37, 20.71);
        let refined = corner_subpix(
            &img.view(),
            Point2::new(18.0, 22.0),
            &SubPixParams {
                epsilon: 0.001,
                ..Default::default()
            },
        );
        assert!((refined.x - 19.37).abs() < 0.1, "{:?}", refined);
        assert!((refined.y - 20.71).abs() < 0.1, "{:?}", refined);
    }

    #[test]
    fn flat_patch_leaves_start_unchanged() {
        let img = GrayImage::from_fn(30, 30, |_, _| 128);
        let start = Point2::new(15.2, 14.8);
        let refined = corner_subpix(&img.view(), start, &SubPixParams::default());
        assert_eq!(refined, start);
    }
}
