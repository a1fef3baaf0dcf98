use crate::{ReconstructError, ResizeSpec};
use log::debug;
use stereo_recon_core::{resize_bilinear, sample_bilinear_rgb, Image, RgbImage};

fn resize_rgb(src: &RgbImage, width: usize, height: usize) -> RgbImage {
    let sx = src.width as f32 / width as f32;
    let sy = src.height as f32 / height as f32;
    let max_x = src.width.saturating_sub(1) as f32;
    let max_y = src.height.saturating_sub(1) as f32;
    let mut out = RgbImage::new(width, height);
    for y in 0..height {
        let v = ((y as f32 + 0.5) * sy - 0.5).clamp(0.0, max_y);
        for x in 0..width {
            let u = ((x as f32 + 0.5) * sx - 0.5).clamp(0.0, max_x);
            let px = sample_bilinear_rgb(src, u, v).map(|c| c.round().clamp(0.0, 255.0) as u8);
            out.put_pixel(x, y, px);
        }
    }
    out
}

/// Apply `spec` to `image`; `None` or an unchanged size returns a copy.
pub fn resize_image(image: &Image, spec: Option<&ResizeSpec>) -> Result<Image, ReconstructError> {
    let Some(spec) = spec else {
        return Ok(image.clone());
    };
    let target = spec.target(image.size())?;
    if target == image.size() {
        return Ok(image.clone());
    }
    debug!(
        "resizing {}x{} -> {}x{}",
        image.width(),
        image.height(),
        target.width,
        target.height
    );
    Ok(match image {
        Image::Gray(g) => Image::Gray(resize_bilinear(g, target.width, target.height)),
        Image::Rgb(c) => Image::Rgb(resize_rgb(c, target.width, target.height)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stereo_recon_core::{GrayImage, ImageSize};

    #[test]
    fn halves_gray_and_color_alike() {
        let gray = GrayImage::from_fn(8, 6, |x, _| (x * 30) as u8);
        let color = Image::Rgb(RgbImage::from_gray(&gray));
        let spec = ResizeSpec::Scale(0.5);
        let small_gray = resize_image(&Image::Gray(gray), Some(&spec)).expect("gray");
        let small_color = resize_image(&color, Some(&spec)).expect("color");
        assert_eq!(small_gray.size(), ImageSize::new(4, 3));
        assert_eq!(small_color.size(), ImageSize::new(4, 3));
        assert_eq!(small_color.to_gray().into_owned(), small_gray.to_gray().into_owned());
    }

    #[test]
    fn no_spec_is_identity() {
        let img = Image::Gray(GrayImage::from_fn(5, 5, |x, y| (x + y) as u8));
        assert_eq!(resize_image(&img, None).expect("copy"), img);
    }
}
