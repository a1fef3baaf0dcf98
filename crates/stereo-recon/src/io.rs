//! `image`-crate adapters: decoding inputs, encoding rasters and writing
//! the reconstruction artifacts.

use crate::{ReconstructError, ReconstructOutputs, Reconstruction};
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use log::{info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use stereo_recon_chessboard::{draw_corners, BatchDetection};
use stereo_recon_cloud::WriteOptions;
use stereo_recon_core::{write_atomic, GrayImage, Image, RgbImage};

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Convert a decoded image; anything without color becomes [`Image::Gray`].
pub fn from_dynamic(img: DynamicImage) -> Result<Image, ReconstructError> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    Ok(if img.color().has_color() {
        Image::Rgb(RgbImage::from_raw(w, h, img.into_rgb8().into_raw())?)
    } else {
        Image::Gray(GrayImage::from_raw(w, h, img.into_luma8().into_raw())?)
    })
}

pub fn load_image(path: impl AsRef<Path>) -> Result<Image, ReconstructError> {
    from_dynamic(image::open(path)?)
}

/// Image files directly inside `dir`, sorted by file name.
pub fn list_images(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, ReconstructError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Decode every path, index-aligned with `paths`. Unreadable files are
/// logged and come back as `None`.
pub fn load_images(paths: &[PathBuf]) -> Vec<Option<Image>> {
    paths
        .iter()
        .map(|path| match load_image(path) {
            Ok(img) => Some(img),
            Err(e) => {
                warn!("cannot read image {}: {e}", path.display());
                None
            }
        })
        .collect()
}

fn encode_png(
    data: &[u8],
    width: usize,
    height: usize,
    color: ExtendedColorType,
    path: &Path,
) -> Result<(), ReconstructError> {
    write_atomic(path, |out| {
        PngEncoder::new(out)
            .write_image(data, width as u32, height as u32, color)
            .map_err(io::Error::other)
    })?;
    Ok(())
}

/// Encode as PNG through a temporary sibling file.
pub fn save_png(image: &Image, path: impl AsRef<Path>) -> Result<(), ReconstructError> {
    match image {
        Image::Gray(g) => encode_png(&g.data, g.width, g.height, ExtendedColorType::L8, path.as_ref()),
        Image::Rgb(c) => save_rgb_png(c, path),
    }
}

pub fn save_rgb_png(image: &RgbImage, path: impl AsRef<Path>) -> Result<(), ReconstructError> {
    encode_png(
        &image.data,
        image.width,
        image.height,
        ExtendedColorType::Rgb8,
        path.as_ref(),
    )
}

/// Write the selected artifacts into `dir`, creating it if needed, and
/// return the written paths.
pub fn write_outputs(
    reconstruction: &Reconstruction,
    dir: impl AsRef<Path>,
    outputs: &ReconstructOutputs,
    cloud: &WriteOptions,
) -> Result<Vec<PathBuf>, ReconstructError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    if outputs.rectified {
        for (name, img) in [
            ("rectified_left.png", &reconstruction.rectified_left),
            ("rectified_right.png", &reconstruction.rectified_right),
        ] {
            let path = dir.join(name);
            save_png(img, &path)?;
            written.push(path);
        }
    }
    if outputs.depth_map {
        let path = dir.join("depth_map.png");
        save_rgb_png(&reconstruction.depth_visualization, &path)?;
        written.push(path);
    }
    if outputs.residual_map {
        let path = dir.join("residual_map.png");
        save_rgb_png(&reconstruction.residual_visualization, &path)?;
        written.push(path);
    }
    if outputs.point_cloud {
        let path = dir.join(format!("point_cloud.{}", cloud.format.extension()));
        reconstruction.cloud.write(&path, cloud)?;
        written.push(path);
    }
    info!("wrote {} files to {}", written.len(), dir.display());
    Ok(written)
}

/// Draw each detected pattern over its image and save it as
/// `<stem>_corners.png` in `dir`. Returns the number of overlays written.
pub fn write_overlays(
    images: &[Image],
    names: &[PathBuf],
    detections: &BatchDetection,
    dir: impl AsRef<Path>,
) -> Result<usize, ReconstructError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let mut count = 0;
    for (i, (img, name)) in images.iter().zip(names).enumerate() {
        let Some(corners) = detections.get(i) else {
            continue;
        };
        let stem = name
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("image_{}", i + 1));
        let overlay = draw_corners(&img.to_rgb(), corners);
        save_rgb_png(&overlay, dir.join(format!("{stem}_corners.png")))?;
        count += 1;
    }
    Ok(count)
}
