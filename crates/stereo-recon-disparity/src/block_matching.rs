use crate::postfilter::{left_right_check, select_row, UNAVAILABLE};
use crate::prefilter::xsobel_capped;
use crate::{BlockCost, DisparityError, DisparityParams, RawDisparity, StereoMatcher};
use log::debug;
use rayon::prelude::*;
use stereo_recon_core::GrayImage;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Local window matcher on x-Sobel prefiltered images.
///
/// Only pixels whose whole disparity range fits inside the right image are
/// matched; the others stay invalid.
#[derive(Debug, Clone)]
pub struct BlockMatcher {
    params: DisparityParams,
    cost: BlockCost,
}

impl BlockMatcher {
    pub fn new(params: DisparityParams, cost: BlockCost) -> Result<Self, DisparityError> {
        params.validate()?;
        Ok(Self { params, cost })
    }

    pub fn cost(&self) -> BlockCost {
        self.cost
    }

    /// Window costs of row `y` into `costs[x * n + k]`.
    fn row_costs(&self, left: &[u8], right: &[u8], width: usize, y: usize, costs: &mut [u32]) {
        let p = &self.params;
        let n = p.disparity_count();
        let half = p.block_size / 2;
        let cap = p.prefilter_cap;
        let rows = y - half..y + half + 1;
        costs.fill(UNAVAILABLE);

        // Pixels with the full search range and a complete window.
        let x_lo = half as i64 + p.max_disparity().max(0) as i64;
        let x_hi = width as i64 - 1 - half as i64 + p.min_disparity.min(0) as i64;
        if x_lo > x_hi {
            return;
        }
        let (x_lo, x_hi) = (x_lo as usize, x_hi as usize);

        let mut texture = vec![0u32; width];
        let mut col = vec![0u32; width];
        for yy in rows.clone() {
            let row = &left[yy * width..(yy + 1) * width];
            for (t, &v) in col.iter_mut().zip(row) {
                *t += (v as i32 - cap).unsigned_abs();
            }
        }
        box_sum(&col, half, &mut texture);

        let mut sums = vec![0u32; width];
        for k in 0..n {
            let d = p.min_disparity + k as i32;
            col.fill(0);
            for yy in rows.clone() {
                let lrow = &left[yy * width..(yy + 1) * width];
                let rrow = &right[yy * width..(yy + 1) * width];
                for x in x_lo - half..=x_hi + half {
                    let xr = (x as i64 - d as i64) as usize;
                    let diff = (lrow[x] as i32 - rrow[xr] as i32).unsigned_abs();
                    col[x] += match self.cost {
                        BlockCost::Sad => diff,
                        BlockCost::Ssd => diff * diff,
                    };
                }
            }
            box_sum(&col, half, &mut sums);
            for x in x_lo..=x_hi {
                if texture[x] >= p.texture_threshold {
                    costs[x * n + k] = sums[x];
                }
            }
        }
    }
}

/// Horizontal box sum of radius `half`; only centers with a complete window
/// are meaningful.
fn box_sum(col: &[u32], half: usize, out: &mut [u32]) {
    let w = col.len();
    out.fill(0);
    if w < 2 * half + 1 {
        return;
    }
    let mut acc: u32 = col[..2 * half + 1].iter().sum();
    out[half] = acc;
    for x in half + 1..w - half {
        acc = acc + col[x + half] - col[x - half - 1];
        out[x] = acc;
    }
}

impl StereoMatcher for BlockMatcher {
    fn name(&self) -> &'static str {
        "block_matching"
    }

    fn params(&self) -> &DisparityParams {
        &self.params
    }

    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(w = left.width, h = left.height)))]
    fn match_raw(&self, left: &GrayImage, right: &GrayImage) -> Result<RawDisparity, DisparityError> {
        crate::matcher::check_pair(left, right)?;
        let p = &self.params;
        let (w, h) = (left.width, left.height);
        let n = p.disparity_count();
        let half = p.block_size / 2;
        let (lf, rf) = rayon::join(
            || xsobel_capped(left, p.prefilter_cap),
            || xsobel_capped(right, p.prefilter_cap),
        );

        let mut out = RawDisparity::new(w, h);
        out.data.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            if y < half || y + half >= h {
                return;
            }
            let mut costs = vec![UNAVAILABLE; w * n];
            self.row_costs(&lf, &rf, w, y, &mut costs);
            let right_disp = select_row(&costs, n, p.min_disparity, p.uniqueness_ratio, row);
            left_right_check(row, &right_disp, p.min_disparity, p.disp12_max_diff);
        });
        debug!(
            "block matching {}x{}: {} of {} pixels matched",
            w,
            h,
            out.valid_count(),
            w * h
        );
        Ok(out)
    }
}
