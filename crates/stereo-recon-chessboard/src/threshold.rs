//! Contrast normalization, global/adaptive binarization and the cheap
//! checks that reject images and candidates before grid fitting.

use stereo_recon_core::GrayImage;

fn histogram(img: &GrayImage) -> [u32; 256] {
    let mut hist = [0u32; 256];
    for &v in &img.data {
        hist[v as usize] += 1;
    }
    hist
}

/// Spread intensities over the full 0..255 range via the cumulative histogram.
pub fn equalize_histogram(img: &GrayImage) -> GrayImage {
    let hist = histogram(img);
    let total = img.data.len() as u64;
    let Some(first) = hist.iter().position(|&h| h > 0) else {
        return img.clone();
    };
    let base = hist[first] as u64;
    if total == base {
        // Constant image: nothing to stretch.
        return img.clone();
    }

    let mut lut = [0u8; 256];
    let mut cum = 0u64;
    for (v, &h) in hist.iter().enumerate() {
        cum += h as u64;
        if v >= first {
            let num = (cum - base) * 255;
            lut[v] = ((num + (total - base) / 2) / (total - base)).min(255) as u8;
        }
    }

    GrayImage {
        width: img.width,
        height: img.height,
        data: img.data.iter().map(|&v| lut[v as usize]).collect(),
    }
}

/// Global Otsu threshold of the whole image.
pub fn otsu_threshold(img: &GrayImage) -> u8 {
    let hist = histogram(img);
    let Some(min_v) = hist.iter().position(|&h| h > 0) else {
        return 127;
    };
    let max_v = hist.iter().rposition(|&h| h > 0).unwrap_or(min_v);
    if min_v == max_v {
        return min_v as u8;
    }

    let total = img.data.len() as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }
        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;
        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            best_t = t as u8;
        }
    }
    best_t
}

/// Shares and means of the two classes split at `t` (dark is `<= t`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct PhaseSplit {
    pub dark_fraction: f32,
    pub dark_mean: f32,
    pub bright_mean: f32,
}

pub(crate) fn phase_split(img: &GrayImage, t: u8) -> PhaseSplit {
    let (mut n_dark, mut s_dark, mut s_bright) = (0u64, 0u64, 0u64);
    for &v in &img.data {
        if v <= t {
            n_dark += 1;
            s_dark += v as u64;
        } else {
            s_bright += v as u64;
        }
    }
    let n = img.data.len().max(1) as u64;
    let n_bright = n - n_dark.min(n);
    PhaseSplit {
        dark_fraction: n_dark as f32 / n as f32,
        dark_mean: if n_dark > 0 {
            s_dark as f32 / n_dark as f32
        } else {
            0.0
        },
        bright_mean: if n_bright > 0 {
            s_bright as f32 / n_bright as f32
        } else {
            0.0
        },
    }
}

/// Binarize against the local mean over a `block_size` square window:
/// a pixel becomes 255 when `v > mean - offset`, 0 otherwise.
///
/// The window is clipped at image borders. `block_size` must be odd.
pub fn adaptive_threshold(img: &GrayImage, block_size: usize, offset: i32) -> GrayImage {
    let (w, h) = (img.width, img.height);
    let r = block_size / 2;

    // Integral image with a zero first row/column.
    let stride = w + 1;
    let mut integral = vec![0u64; stride * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += img.data[y * w + x] as u64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        let y0 = y.saturating_sub(r);
        let y1 = (y + r + 1).min(h);
        for x in 0..w {
            let x0 = x.saturating_sub(r);
            let x1 = (x + r + 1).min(w);
            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let count = ((y1 - y0) * (x1 - x0)) as i64;
            let v = img.data[y * w + x] as i64;
            // v > sum / count - offset, kept in integers
            if v * count > sum as i64 - offset as i64 * count {
                out.data[y * w + x] = 255;
            }
        }
    }
    out
}

const RING_SAMPLES: usize = 16;

/// Count phase changes along a circle of `radius` around `(x, y)` in a binary
/// image. An X-junction yields 4; edges yield 2; flat areas 0. Returns `None`
/// when the ring leaves the image.
pub(crate) fn ring_transitions(binary: &GrayImage, x: f32, y: f32, radius: f32) -> Option<usize> {
    let mut samples = [false; RING_SAMPLES];
    for (k, s) in samples.iter_mut().enumerate() {
        let a = k as f32 * std::f32::consts::TAU / RING_SAMPLES as f32;
        let px = (x + radius * a.cos()).round();
        let py = (y + radius * a.sin()).round();
        if px < 0.0 || py < 0.0 || px >= binary.width as f32 || py >= binary.height as f32 {
            return None;
        }
        *s = binary.get(px as usize, py as usize) > 0;
    }
    let changes = (0..RING_SAMPLES)
        .filter(|&k| samples[k] != samples[(k + 1) % RING_SAMPLES])
        .count();
    Some(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadrants(size: usize) -> GrayImage {
        let c = size / 2;
        GrayImage::from_fn(size, size, |x, y| {
            if (x < c) == (y < c) {
                30
            } else {
                220
            }
        })
    }

    #[test]
    fn otsu_splits_bimodal_image() {
        let img = GrayImage::from_fn(20, 10, |x, _| if x < 10 { 40 } else { 200 });
        let t = otsu_threshold(&img);
        assert!((40..200).contains(&t), "threshold {}", t);
        let split = phase_split(&img, t);
        assert!((split.dark_fraction - 0.5).abs() < 1e-6);
        assert_eq!(split.dark_mean, 40.0);
        assert_eq!(split.bright_mean, 200.0);
    }

    #[test]
    fn equalization_stretches_narrow_range() {
        let img = GrayImage::from_fn(16, 16, |x, _| 100 + (x as u8 % 4));
        let eq = equalize_histogram(&img);
        assert_eq!(*eq.data.iter().min().expect("pixels"), 0);
        assert_eq!(*eq.data.iter().max().expect("pixels"), 255);

        let flat = GrayImage::from_fn(4, 4, |_, _| 9);
        assert_eq!(equalize_histogram(&flat), flat);
    }

    #[test]
    fn adaptive_threshold_separates_quadrants_near_center() {
        let img = quadrants(40);
        let bin = adaptive_threshold(&img, 15, 2);
        assert_eq!(bin.get(17, 17), 0);
        assert_eq!(bin.get(22, 17), 255);
        assert_eq!(bin.get(17, 22), 255);
        assert_eq!(bin.get(22, 22), 0);
    }

    #[test]
    fn ring_counts_four_transitions_at_x_junction() {
        let img = quadrants(40);
        let bin = adaptive_threshold(&img, 15, 2);
        assert_eq!(ring_transitions(&bin, 19.5, 19.5, 4.0), Some(4));
        // On a straight edge away from the junction.
        assert_eq!(ring_transitions(&bin, 19.5, 8.0, 4.0), Some(2));
        assert_eq!(ring_transitions(&bin, 1.0, 1.0, 4.0), None);
    }
}
