//! Corner dumps for offline inspection: CSV tables and overlay images.

use crate::{ChessboardError, StereoBatchDetection};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::Path;
use stereo_recon_core::{write_atomic, CornerSet, RgbImage};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraSide {
    Left,
    Right,
}

impl CameraSide {
    pub fn as_str(self) -> &'static str {
        match self {
            CameraSide::Left => "left",
            CameraSide::Right => "right",
        }
    }
}

impl fmt::Display for CameraSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the corner table. Indices are 0-based here and written 1-based.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CornerRecord {
    pub image_index: usize,
    pub camera: CameraSide,
    pub point_index: usize,
    pub x: f64,
    pub y: f64,
}

impl CornerRecord {
    /// Rows for every detected corner set, left camera first.
    pub fn from_stereo(batch: &StereoBatchDetection) -> Vec<CornerRecord> {
        let mut out = Vec::new();
        for (side, detections) in [
            (CameraSide::Left, &batch.left),
            (CameraSide::Right, &batch.right),
        ] {
            for (image_index, corners) in detections.results.iter().enumerate() {
                if let Some(corners) = corners {
                    out.extend(Self::from_corners(image_index, side, corners));
                }
            }
        }
        out
    }

    pub fn from_corners(
        image_index: usize,
        camera: CameraSide,
        corners: &CornerSet,
    ) -> impl Iterator<Item = CornerRecord> + '_ {
        corners
            .points()
            .iter()
            .enumerate()
            .map(move |(point_index, p)| CornerRecord {
                image_index,
                camera,
                point_index,
                x: p.x,
                y: p.y,
            })
    }
}

const CSV_HEADER: &str = "Image_Index, Camera, Point_Index, X, Y";

/// Write the corner table, replacing `path` atomically.
pub fn write_corner_csv(path: impl AsRef<Path>, records: &[CornerRecord]) -> Result<(), ChessboardError> {
    write_atomic(path.as_ref(), |w: &mut dyn Write| {
        writeln!(w, "{}", CSV_HEADER)?;
        for r in records {
            writeln!(
                w,
                "{}, {}, {}, {:.4}, {:.4}",
                r.image_index + 1,
                r.camera,
                r.point_index + 1,
                r.x,
                r.y
            )?;
        }
        Ok(())
    })?;
    Ok(())
}

const FIRST_CORNER: [u8; 3] = [0, 0, 255];

/// Hue-cycled color for pattern row `row`.
fn row_color(row: usize) -> [u8; 3] {
    const PALETTE: [[u8; 3]; 6] = [
        [255, 0, 0],
        [255, 128, 0],
        [200, 200, 0],
        [0, 255, 0],
        [0, 200, 255],
        [255, 0, 255],
    ];
    PALETTE[row % PALETTE.len()]
}

fn put(img: &mut RgbImage, x: i64, y: i64, rgb: [u8; 3]) {
    if x >= 0 && y >= 0 && (x as usize) < img.width && (y as usize) < img.height {
        img.put_pixel(x as usize, y as usize, rgb);
    }
}

fn draw_cross(img: &mut RgbImage, cx: i64, cy: i64, half: i64, rgb: [u8; 3]) {
    for d in -half..=half {
        for t in 0..2 {
            put(img, cx + d, cy + t, rgb);
            put(img, cx + t, cy + d, rgb);
        }
    }
}

fn draw_circle(img: &mut RgbImage, cx: f64, cy: f64, radius: f64, thickness: f64, rgb: [u8; 3]) {
    let reach = (radius + thickness).ceil() as i64;
    let (x0, y0) = (cx.round() as i64, cy.round() as i64);
    for y in y0 - reach..=y0 + reach {
        for x in x0 - reach..=x0 + reach {
            let d = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt();
            if (d - radius).abs() <= thickness * 0.5 {
                put(img, x, y, rgb);
            }
        }
    }
}

/// Overlay detected corners on a copy of `image`.
///
/// Each corner gets a cross colored by its pattern row, consecutive corners
/// are joined along rows, and the first corner is circled so the ordering
/// can be checked by eye.
pub fn draw_corners(image: &RgbImage, corners: &CornerSet) -> RgbImage {
    let mut out = image.clone();
    for r in 0..corners.rows() {
        let color = row_color(r);
        for c in 0..corners.cols() {
            let Some(p) = corners.get(r, c) else {
                continue;
            };
            if c + 1 < corners.cols() {
                if let Some(q) = corners.get(r, c + 1) {
                    let steps = ((q - p).norm().ceil() as usize).max(1);
                    for s in 0..=steps {
                        let t = s as f64 / steps as f64;
                        let v = p + (q - p) * t;
                        put(&mut out, v.x.round() as i64, v.y.round() as i64, color);
                    }
                }
            }
            draw_cross(&mut out, p.x.round() as i64, p.y.round() as i64, 6, color);
        }
    }
    if let Some(first) = corners.points().first() {
        draw_circle(&mut out, first.x, first.y, 16.0, 3.0, FIRST_CORNER);
    }
    out
}
