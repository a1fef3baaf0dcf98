//! Semi-global matching.
//!
//! Pixel costs mix the capped x-Sobel difference with a quarter of the raw
//! intensity difference and are box-summed over the block window. They are
//! then aggregated along 8 paths:
//!
//! ```text
//! L_r(p, d) = C(p, d) + min(L_r(p - r, d),
//!                           L_r(p - r, d +- 1) + P1,
//!                           min_k L_r(p - r, k) + P2) - min_k L_r(p - r, k)
//! ```
//!
//! The two horizontal paths are independent per row. The six vertical and
//! diagonal paths run as one top-down and one bottom-up sweep, each row
//! processed in parallel over columns.

use crate::postfilter::{left_right_check, select_row};
use crate::prefilter::xsobel_capped;
use crate::{DisparityError, DisparityParams, RawDisparity, StereoMatcher};
use log::debug;
use rayon::prelude::*;
use stereo_recon_core::GrayImage;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct SemiGlobalMatcher {
    params: DisparityParams,
}

impl SemiGlobalMatcher {
    pub fn new(params: DisparityParams) -> Result<Self, DisparityError> {
        params.validate()?;
        Ok(Self { params })
    }
}

/// Block-summed matching costs, `C[(y * w + x) * n + k]`.
fn block_costs(left: &GrayImage, right: &GrayImage, params: &DisparityParams) -> Vec<u16> {
    let (w, h) = (left.width, left.height);
    let n = params.disparity_count();
    let half = params.block_size / 2;
    let (lf, rf) = rayon::join(
        || xsobel_capped(left, params.prefilter_cap),
        || xsobel_capped(right, params.prefilter_cap),
    );

    let mut costs = vec![0u16; w * h * n];
    costs.par_chunks_mut(w * n).enumerate().for_each(|(y, row)| {
        let rows = y.saturating_sub(half)..(y + half + 1).min(h);
        let mut col = vec![0u32; w];
        let mut prefix = vec![0u32; w + 1];
        for k in 0..n {
            let d = params.min_disparity as i64 + k as i64;
            col.fill(0);
            for yy in rows.clone() {
                let base = yy * w;
                for (x, c) in col.iter_mut().enumerate() {
                    let xr = (x as i64 - d).clamp(0, w as i64 - 1) as usize;
                    let grad = (lf[base + x] as i32 - rf[base + xr] as i32).unsigned_abs();
                    let raw = (left.data[base + x] as i32 - right.data[base + xr] as i32).unsigned_abs();
                    *c += grad + (raw >> 2);
                }
            }
            for x in 0..w {
                prefix[x + 1] = prefix[x] + col[x];
            }
            for x in 0..w {
                let sum = prefix[(x + half + 1).min(w)] - prefix[x.saturating_sub(half)];
                row[x * n + k] = sum.min(u16::MAX as u32) as u16;
            }
        }
    });
    costs
}

/// One path step; returns the minimum of `out`.
#[inline]
fn path_step(cost: &[u16], prev: Option<(&[u16], u32)>, p1: u32, p2: u32, out: &mut [u16]) -> u32 {
    let mut min = u32::MAX;
    match prev {
        None => {
            for (o, &c) in out.iter_mut().zip(cost) {
                *o = c;
                min = min.min(c as u32);
            }
        }
        Some((prev, prev_min)) => {
            let n = cost.len();
            let jump = prev_min.saturating_add(p2);
            for k in 0..n {
                let mut best = (prev[k] as u32).min(jump);
                if k > 0 {
                    best = best.min((prev[k - 1] as u32).saturating_add(p1));
                }
                if k + 1 < n {
                    best = best.min((prev[k + 1] as u32).saturating_add(p1));
                }
                let v = (cost[k] as u32 + best - prev_min).min(u16::MAX as u32);
                out[k] = v as u16;
                min = min.min(v);
            }
        }
    }
    min
}

/// Left-to-right and right-to-left paths of every row, written into `sum`.
fn horizontal_paths(costs: &[u16], sum: &mut [u32], w: usize, n: usize, p1: u32, p2: u32) {
    sum.par_chunks_mut(w * n)
        .zip(costs.par_chunks(w * n))
        .for_each(|(s_row, c_row)| {
            let mut prev = vec![0u16; n];
            let mut cur = vec![0u16; n];
            for order in [false, true] {
                let mut prev_min = None;
                for i in 0..w {
                    let x = if order { w - 1 - i } else { i };
                    let c = &c_row[x * n..(x + 1) * n];
                    let m = path_step(c, prev_min.map(|m| (prev.as_slice(), m)), p1, p2, &mut cur);
                    for (s, &l) in s_row[x * n..(x + 1) * n].iter_mut().zip(&cur) {
                        *s += l as u32;
                    }
                    std::mem::swap(&mut prev, &mut cur);
                    prev_min = Some(m);
                }
            }
        });
}

/// The three paths entering each row from the previous one, sweeping down
/// (or up). Layout of the path buffers: `[x][dir][k]` with `dx = dir - 1`.
fn vertical_paths(
    costs: &[u16],
    sum: &mut [u32],
    w: usize,
    h: usize,
    n: usize,
    (p1, p2): (u32, u32),
    down: bool,
) {
    let mut prev = vec![0u16; w * 3 * n];
    let mut prev_min = vec![0u32; w * 3];
    let mut cur = vec![0u16; w * 3 * n];
    let mut cur_min = vec![0u32; w * 3];

    for step in 0..h {
        let y = if down { step } else { h - 1 - step };
        let c_row = &costs[y * w * n..(y + 1) * w * n];
        let s_row = &mut sum[y * w * n..(y + 1) * w * n];
        let (prev_l, prev_m) = (&prev, &prev_min);
        s_row
            .par_chunks_mut(n)
            .zip(cur.par_chunks_mut(3 * n))
            .zip(cur_min.par_chunks_mut(3))
            .enumerate()
            .for_each(|(x, ((s, l), mins))| {
                let c = &c_row[x * n..(x + 1) * n];
                for dir in 0..3 {
                    let px = x as i64 - (dir as i64 - 1);
                    let from = (step > 0 && (0..w as i64).contains(&px)).then(|| {
                        let px = px as usize;
                        let start = (px * 3 + dir) * n;
                        (&prev_l[start..start + n], prev_m[px * 3 + dir])
                    });
                    let out = &mut l[dir * n..(dir + 1) * n];
                    mins[dir] = path_step(c, from, p1, p2, out);
                    for (sv, &lv) in s.iter_mut().zip(out.iter()) {
                        *sv += lv as u32;
                    }
                }
            });
        std::mem::swap(&mut prev, &mut cur);
        std::mem::swap(&mut prev_min, &mut cur_min);
    }
}

impl StereoMatcher for SemiGlobalMatcher {
    fn name(&self) -> &'static str {
        "semi_global"
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
        let (p1, p2) = p.penalties();

        let costs = block_costs(left, right, p);
        let mut sum = vec![0u32; w * h * n];
        horizontal_paths(&costs, &mut sum, w, n, p1, p2);
        vertical_paths(&costs, &mut sum, w, h, n, (p1, p2), true);
        vertical_paths(&costs, &mut sum, w, h, n, (p1, p2), false);
        drop(costs);

        // Columns where part of the search range falls outside the right
        // image, or the window reaches the replicated Sobel border column.
        let half = (p.block_size / 2) as i64;
        let x_lo = half + 1 + p.max_disparity().max(0) as i64;
        let x_hi = w as i64 - 2 - half + p.min_disparity.min(0) as i64;

        let mut out = RawDisparity::new(w, h);
        out.data
            .par_chunks_mut(w)
            .zip(sum.par_chunks(w * n))
            .for_each(|(row, s_row)| {
                let right_disp = select_row(s_row, n, p.min_disparity, p.uniqueness_ratio, row);
                left_right_check(row, &right_disp, p.min_disparity, p.disp12_max_diff);
                for (x, d) in row.iter_mut().enumerate() {
                    if (x as i64) < x_lo || (x as i64) > x_hi {
                        *d = RawDisparity::INVALID;
                    }
                }
            });
        debug!(
            "semi-global matching {}x{} (P1={}, P2={}): {} of {} pixels matched",
            w,
            h,
            p1,
            p2,
            out.valid_count(),
            w * h
        );
        Ok(out)
    }
}
