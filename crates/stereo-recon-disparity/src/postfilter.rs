//! Winner selection and the filters applied after matching.

use crate::map::{RawDisparity, DISP_SCALE, DISP_SHIFT};

/// Cost of a disparity that cannot be evaluated at a pixel.
pub(crate) const UNAVAILABLE: u32 = u32::MAX;

/// Winner-take-all over one row of costs laid out as `costs[x * n + k]`,
/// where `k` indexes disparity `min_disparity + k`.
///
/// Writes 16x fixed-point disparities into `disp`. A pixel is left invalid
/// when it has no available cost or when a disparity more than one step
/// away from the winner comes within `uniqueness_ratio` percent of it.
/// Returns the best integer disparity of every right-image column, used by
/// [`left_right_check`].
pub(crate) fn select_row(
    costs: &[u32],
    n: usize,
    min_disparity: i32,
    uniqueness_ratio: u32,
    disp: &mut [i16],
) -> Vec<i32> {
    let width = disp.len();
    let mut right_cost = vec![UNAVAILABLE; width];
    let mut right_disp = vec![i32::MIN; width];

    for (x, out) in disp.iter_mut().enumerate() {
        *out = RawDisparity::INVALID;
        let c = &costs[x * n..(x + 1) * n];

        let mut best = None;
        let mut best_cost = UNAVAILABLE;
        for (k, &cost) in c.iter().enumerate() {
            if cost < best_cost {
                best_cost = cost;
                best = Some(k);
            }
            let xr = x as i64 - (min_disparity as i64 + k as i64);
            if cost != UNAVAILABLE && (0..width as i64).contains(&xr) {
                let xr = xr as usize;
                if cost < right_cost[xr] {
                    right_cost[xr] = cost;
                    right_disp[xr] = min_disparity + k as i32;
                }
            }
        }
        let Some(best) = best else {
            continue;
        };

        if uniqueness_ratio > 0 {
            let bound = best_cost as u64 * (100 + uniqueness_ratio as u64);
            let ambiguous = c.iter().enumerate().any(|(k, &cost)| {
                k.abs_diff(best) > 1 && cost != UNAVAILABLE && (cost as u64) * 100 <= bound
            });
            if ambiguous {
                continue;
            }
        }

        let mut d16 = (min_disparity + best as i32) * DISP_SCALE;
        if best > 0 && best + 1 < n {
            let (prev, next) = (c[best - 1], c[best + 1]);
            if prev != UNAVAILABLE && next != UNAVAILABLE {
                let (prev, next, mid) = (prev as i64, next as i64, best_cost as i64);
                let denom2 = (prev + next - 2 * mid).max(1);
                let scale = DISP_SCALE as i64;
                d16 += (((prev - next) * scale + denom2) / (denom2 * 2)) as i32;
            }
        }
        *out = d16 as i16;
    }
    right_disp
}

/// Invalidate pixels whose right-view match points back elsewhere.
///
/// `right_disp` holds the best integer disparity of every right column.
/// Both neighbors of a fractional disparity are tried; the pixel survives
/// if either agrees within `max_diff`.
pub(crate) fn left_right_check(disp: &mut [i16], right_disp: &[i32], min_disparity: i32, max_diff: i32) {
    if max_diff < 0 {
        return;
    }
    let width = disp.len() as i64;
    for (x, d) in disp.iter_mut().enumerate() {
        if *d == RawDisparity::INVALID {
            continue;
        }
        let d16 = *d as i32;
        let lo = d16 >> DISP_SHIFT;
        let hi = (d16 + DISP_SCALE - 1) >> DISP_SHIFT;
        let disagrees = |dd: i32| {
            let xr = x as i64 - dd as i64;
            if !(0..width).contains(&xr) {
                return false;
            }
            let r = right_disp[xr as usize];
            r >= min_disparity && (r - dd).abs() > max_diff
        };
        if disagrees(lo) && disagrees(hi) {
            *d = RawDisparity::INVALID;
        }
    }
}

/// Invalidate 4-connected regions of similar disparity with at most
/// `max_size` pixels. Neighbors belong to one region when their raw values
/// differ by at most `max_diff`.
pub fn filter_speckles(disp: &mut RawDisparity, max_size: usize, max_diff: i32) -> usize {
    if max_size == 0 {
        return 0;
    }
    let (w, h) = (disp.width, disp.height);
    let mut label = vec![0u32; w * h];
    let mut stack = Vec::new();
    let mut region = Vec::new();
    let mut next_label = 0u32;
    let mut removed = 0;

    for start in 0..w * h {
        if label[start] != 0 || disp.data[start] == RawDisparity::INVALID {
            continue;
        }
        next_label += 1;
        label[start] = next_label;
        stack.push(start);
        region.clear();
        while let Some(i) = stack.pop() {
            region.push(i);
            let v = disp.data[i] as i32;
            let (x, y) = (i % w, i / w);
            let mut visit = |j: usize| {
                let dj = disp.data[j];
                if label[j] == 0 && dj != RawDisparity::INVALID && (dj as i32 - v).abs() <= max_diff {
                    label[j] = next_label;
                    stack.push(j);
                }
            };
            if x > 0 {
                visit(i - 1);
            }
            if x + 1 < w {
                visit(i + 1);
            }
            if y > 0 {
                visit(i - w);
            }
            if y + 1 < h {
                visit(i + w);
            }
        }
        if region.len() <= max_size {
            removed += region.len();
            for &i in &region {
                disp.data[i] = RawDisparity::INVALID;
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winner_is_interpolated_between_neighbors() {
        // Symmetric neighbors: exact integer.
        let mut disp = [0i16; 1];
        select_row(&[50, 10, 50, 90], 4, 0, 0, &mut disp);
        assert_eq!(disp[0], 16);
        // Cheaper left neighbor pulls the estimate down.
        select_row(&[20, 10, 50, 90], 4, 0, 0, &mut disp);
        assert!(disp[0] < 16 && disp[0] > 8, "{}", disp[0]);
    }

    #[test]
    fn ambiguous_minimum_is_rejected() {
        let mut disp = [0i16; 1];
        select_row(&[10, 40, 40, 10], 4, 0, 15, &mut disp);
        assert_eq!(disp[0], RawDisparity::INVALID);
        select_row(&[10, 40, 40, 30], 4, 0, 15, &mut disp);
        assert_eq!(disp[0], 0);
    }

    #[test]
    fn unavailable_costs_are_skipped() {
        let mut disp = [0i16; 1];
        select_row(&[UNAVAILABLE; 3], 3, 0, 10, &mut disp);
        assert_eq!(disp[0], RawDisparity::INVALID);
    }

    #[test]
    fn left_right_check_drops_inconsistent_pixels() {
        // Pixel 5 claims disparity 2 (right column 3), right column 3 says 2.
        // Pixel 6 claims disparity 1 (right column 5), right column 5 says 4.
        let mut disp = [RawDisparity::INVALID; 8];
        disp[5] = 32;
        disp[6] = 16;
        let mut right = vec![i32::MIN; 8];
        right[3] = 2;
        right[5] = 4;
        left_right_check(&mut disp, &right, 0, 1);
        assert_eq!(disp[5], 32);
        assert_eq!(disp[6], RawDisparity::INVALID);
    }

    #[test]
    fn small_regions_are_removed() {
        let mut disp = RawDisparity::new(10, 10);
        for (i, d) in disp.data.iter_mut().enumerate() {
            *d = if i % 10 < 7 { 160 } else { 320 };
        }
        // A 2x2 blob of a different disparity in the large region.
        for (x, y) in [(2, 2), (3, 2), (2, 3), (3, 3)] {
            disp.data[y * 10 + x] = 480;
        }
        let removed = filter_speckles(&mut disp, 5, 16);
        assert_eq!(removed, 4);
        assert_eq!(disp.get(2, 2), RawDisparity::INVALID);
        assert_eq!(disp.get(0, 0), 160);
        // 3-column strip has 30 pixels and survives.
        assert_eq!(disp.get(8, 5), 320);

        let removed = filter_speckles(&mut disp, 30, 16);
        assert_eq!(removed, 30);
        assert_eq!(disp.get(8, 5), RawDisparity::INVALID);
    }
}
