//! Horizontal-gradient prefilter shared by both matchers.

use rayon::prelude::*;
use stereo_recon_core::GrayImage;

/// 3x3 x-Sobel response clamped to `[-cap, cap]` and shifted to `[0, 2 * cap]`.
///
/// Borders replicate the nearest pixel.
pub fn xsobel_capped(img: &GrayImage, cap: i32) -> Vec<u8> {
    let (w, h) = (img.width, img.height);
    let mut out = vec![0u8; w * h];
    if w == 0 || h == 0 {
        return out;
    }
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let up = img.row(y.saturating_sub(1));
        let mid = img.row(y);
        let down = img.row((y + 1).min(h - 1));
        for (x, px) in row.iter_mut().enumerate() {
            let (l, r) = (x.saturating_sub(1), (x + 1).min(w - 1));
            let g = (up[r] as i32 - up[l] as i32)
                + 2 * (mid[r] as i32 - mid[l] as i32)
                + (down[r] as i32 - down[l] as i32);
            *px = (g.clamp(-cap, cap) + cap) as u8;
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_image_maps_to_cap() {
        let img = GrayImage::from_fn(8, 4, |_, _| 90);
        assert!(xsobel_capped(&img, 31).iter().all(|&v| v == 31));
    }

    #[test]
    fn steps_saturate_at_the_cap() {
        let img = GrayImage::from_fn(8, 3, |x, _| if x < 4 { 0 } else { 200 });
        let out = xsobel_capped(&img, 63);
        assert_eq!(out[8 + 3], 126);
        assert_eq!(out[8 + 4], 126);
        assert_eq!(out[8 + 1], 63);

        let falling = GrayImage::from_fn(8, 3, |x, _| if x < 4 { 10 } else { 8 });
        // 4 * (8 - 10) = -8
        assert_eq!(xsobel_capped(&falling, 63)[8 + 3], 55);
    }
}
