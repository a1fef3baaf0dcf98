use crate::gridgraph::{assign_grid_coordinates, connected_components, GridGraph};
use crate::params::ChessboardParams;
use crate::subpix::corner_subpix;
use crate::threshold::{
    adaptive_threshold, equalize_histogram, otsu_threshold, phase_split, ring_transitions,
};
use crate::ChessboardError;
use chess_corners::{find_chess_corners_image, ChessConfig};
use log::debug;
use nalgebra::{Point2, Vector2};
use std::collections::HashMap;
use stereo_recon_core::{resize_bilinear, CornerSet, GrayImage, Image};

#[cfg(feature = "tracing")]
use tracing::instrument;

const MIN_IMAGE_SIDE: usize = 16;

/// Checkerboard detector: ChESS candidates -> grid graph -> ordered,
/// sub-pixel refined [`CornerSet`].
#[derive(Debug, Clone)]
pub struct ChessboardDetector {
    params: ChessboardParams,
}

impl ChessboardDetector {
    pub fn new(params: ChessboardParams) -> Result<Self, ChessboardError> {
        params.pattern.validate()?;
        let block = params.threshold.block_size;
        if block < 3 || block % 2 == 0 {
            return Err(ChessboardError::InvalidBlockSize(block));
        }
        let scale = params.coarse_scale;
        if !(scale > 0.0 && scale <= 1.0) {
            return Err(ChessboardError::InvalidScale(scale));
        }
        Ok(Self { params })
    }

    fn chess_config(&self) -> ChessConfig {
        let mut cfg = ChessConfig::single_scale();
        cfg.params.threshold_rel = self.params.chess_threshold_rel as _;
        cfg.params.nms_radius = self.params.chess_nms_radius as _;
        cfg
    }

    pub fn params(&self) -> &ChessboardParams {
        &self.params
    }

    /// Detect on any image; color input is converted to luminance first.
    pub fn detect_image(&self, image: &Image) -> Result<Option<CornerSet>, ChessboardError> {
        let gray = image.to_gray();
        self.detect(&gray)
    }

    /// Locate every interior corner of the pattern.
    ///
    /// `Ok(None)` means the pattern was not found; `Err` is reserved for
    /// unusable input.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, gray), fields(width = gray.width, height = gray.height))
    )]
    pub fn detect(&self, gray: &GrayImage) -> Result<Option<CornerSet>, ChessboardError> {
        let pattern = self.params.pattern;
        if gray.width < MIN_IMAGE_SIDE || gray.height < MIN_IMAGE_SIDE {
            return Err(ChessboardError::ImageTooSmall {
                width: gray.width,
                height: gray.height,
                rows: pattern.rows,
                cols: pattern.cols,
            });
        }

        let scale = self.params.coarse_scale;
        let coarse = if scale < 1.0 {
            let w = ((gray.width as f32 * scale).round() as usize).max(MIN_IMAGE_SIDE);
            let h = ((gray.height as f32 * scale).round() as usize).max(MIN_IMAGE_SIDE);
            resize_bilinear(gray, w, h)
        } else {
            gray.clone()
        };

        // Fast rejection: a checkerboard needs two well separated phases.
        let thr = &self.params.threshold;
        let split = phase_split(&coarse, otsu_threshold(&coarse));
        if split.dark_fraction < thr.min_phase_fraction
            || split.dark_fraction > 1.0 - thr.min_phase_fraction
            || split.bright_mean - split.dark_mean < thr.min_contrast
        {
            debug!(
                "fast check rejected image (dark fraction {:.3}, contrast {:.1})",
                split.dark_fraction,
                split.bright_mean - split.dark_mean
            );
            return Ok(None);
        }

        let normalized = equalize_histogram(&coarse);
        let binary = adaptive_threshold(&normalized, thr.block_size, thr.offset);

        let candidates = self.candidates(&normalized, &binary)?;
        let needed = pattern.corner_count();
        debug!("{} X-junction candidates for {} corners", candidates.len(), needed);
        if candidates.len() < needed {
            return Ok(None);
        }

        let Some(graph) = GridGraph::new(&candidates, &self.params.graph) else {
            debug!("failed to estimate grid spacing/axes");
            return Ok(None);
        };
        let mut components = connected_components(&graph);
        components.sort_by_key(|c| std::cmp::Reverse(c.len()));

        let ordered = components
            .iter()
            .take_while(|c| c.len() >= needed)
            .find_map(|component| {
                let coords = assign_grid_coordinates(&graph, component)?;
                order_lattice(&coords, &candidates, pattern.rows, pattern.cols)
            });
        let Some(ordered) = ordered else {
            debug!(
                "no component matches a {}x{} lattice (largest has {} nodes)",
                pattern.rows,
                pattern.cols,
                components.first().map_or(0, |c| c.len())
            );
            return Ok(None);
        };

        let view = gray.view();
        let inv = 1.0 / scale as f64;
        let points: Vec<Point2<f64>> = ordered
            .iter()
            .map(|&idx| {
                let p = candidates[idx];
                let full = Point2::new(
                    (p.x as f64 + 0.5) * inv - 0.5,
                    (p.y as f64 + 0.5) * inv - 0.5,
                );
                corner_subpix(&view, full, &self.params.subpix)
            })
            .collect();

        Ok(Some(CornerSet::new(pattern.rows, pattern.cols, points)?))
    }

    /// ChESS responses that also look like X-junctions in the binary image.
    fn candidates(
        &self,
        normalized: &GrayImage,
        binary: &GrayImage,
    ) -> Result<Vec<Point2<f32>>, ChessboardError> {
        let raw = normalized.data.clone();
        let Some(img) =
            image::GrayImage::from_raw(normalized.width as u32, normalized.height as u32, raw)
        else {
            return Err(stereo_recon_core::CoreError::InvalidImageBuffer {
                expected: normalized.width * normalized.height,
                got: normalized.data.len(),
            }
            .into());
        };
        let radius = self.params.threshold.ring_radius;
        Ok(find_chess_corners_image(&img, &self.chess_config())
            .iter()
            .map(|c| Point2::new(c.x as f32, c.y as f32))
            .filter(|p| ring_transitions(binary, p.x, p.y, radius) == Some(4))
            .collect())
    }
}

/// Map a BFS lattice onto the pattern's row-major order.
///
/// The pattern's `cols` axis is matched to the lattice extent (for square
/// patterns, to the more horizontal image axis). That axis is oriented to
/// point right (or down when vertical), and the row axis follows so that
/// the frame is right-handed in image coordinates. Returns candidate indices
/// in output order, or `None` when the lattice has holes or the wrong size.
fn order_lattice(
    coords: &[(usize, i32, i32)],
    positions: &[Point2<f32>],
    rows: usize,
    cols: usize,
) -> Option<Vec<usize>> {
    let min_i = coords.iter().map(|c| c.1).min()?;
    let max_i = coords.iter().map(|c| c.1).max()?;
    let min_j = coords.iter().map(|c| c.2).min()?;
    let max_j = coords.iter().map(|c| c.2).max()?;
    let w = (max_i - min_i + 1) as usize;
    let h = (max_j - min_j + 1) as usize;
    if w * h != coords.len() || coords.len() != rows * cols {
        return None;
    }

    let cells: HashMap<(usize, usize), usize> = coords
        .iter()
        .map(|&(node, i, j)| (((i - min_i) as usize, (j - min_j) as usize), node))
        .collect();

    let mean_step = |di: usize, dj: usize| -> Vector2<f32> {
        let mut sum = Vector2::zeros();
        let mut n = 0.0f32;
        for (&(i, j), &node) in &cells {
            if let Some(&next) = cells.get(&(i + di, j + dj)) {
                sum += positions[next] - positions[node];
                n += 1.0;
            }
        }
        if n > 0.0 {
            sum / n
        } else {
            sum
        }
    };
    let step_i = mean_step(1, 0);
    let step_j = mean_step(0, 1);

    let transpose = if (w, h) == (cols, rows) && (w, h) == (rows, cols) {
        step_i.y.abs() > step_i.x.abs()
    } else if (w, h) == (cols, rows) {
        false
    } else if (w, h) == (rows, cols) {
        true
    } else {
        return None;
    };
    let (mut a_i, a_j) = if transpose {
        (step_j, step_i)
    } else {
        (step_i, step_j)
    };

    let flip_i = if a_i.x.abs() >= a_i.y.abs() {
        a_i.x < 0.0
    } else {
        a_i.y < 0.0
    };
    if flip_i {
        a_i = -a_i;
    }
    let cross = a_i.x * a_j.y - a_i.y * a_j.x;
    let flip_j = cross < 0.0;

    let mut out = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            let ii = if flip_i { cols - 1 - c } else { c };
            let jj = if flip_j { rows - 1 - r } else { r };
            let key = if transpose { (jj, ii) } else { (ii, jj) };
            out.push(*cells.get(&key)?);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lattice `(node, i, j)` whose node `k` sits at `positions[k]`.
    fn lattice(
        w: i32,
        h: i32,
        pos: impl Fn(i32, i32) -> (f32, f32),
    ) -> (Vec<(usize, i32, i32)>, Vec<Point2<f32>>) {
        let mut coords = Vec::new();
        let mut positions = Vec::new();
        for j in 0..h {
            for i in 0..w {
                let (x, y) = pos(i, j);
                coords.push((positions.len(), i, j));
                positions.push(Point2::new(x, y));
            }
        }
        (coords, positions)
    }

    fn ordered_positions(order: &[usize], positions: &[Point2<f32>]) -> Vec<(f32, f32)> {
        order.iter().map(|&k| (positions[k].x, positions[k].y)).collect()
    }

    #[test]
    fn upright_lattice_is_row_major() {
        let (coords, pos) = lattice(3, 2, |i, j| (i as f32 * 10.0, j as f32 * 10.0));
        let order = order_lattice(&coords, &pos, 2, 3).expect("order");
        assert_eq!(
            ordered_positions(&order, &pos),
            vec![
                (0.0, 0.0),
                (10.0, 0.0),
                (20.0, 0.0),
                (0.0, 10.0),
                (10.0, 10.0),
                (20.0, 10.0)
            ]
        );
    }

    #[test]
    fn mirrored_walk_is_canonicalized() {
        // BFS happened to walk +i leftwards and +j upwards.
        let (coords, pos) = lattice(3, 2, |i, j| (20.0 - i as f32 * 10.0, 10.0 - j as f32 * 10.0));
        let order = order_lattice(&coords, &pos, 2, 3).expect("order");
        let pts = ordered_positions(&order, &pos);
        assert_eq!(pts[0], (0.0, 0.0));
        assert_eq!(pts[2], (20.0, 0.0));
        assert_eq!(pts[5], (20.0, 10.0));
    }

    #[test]
    fn transposed_lattice_matches_pattern_columns() {
        // Lattice walked with i vertical: 2 wide, 3 tall for a 2x3 pattern
        // (rows=2, cols=3) means the long axis is vertical in the image.
        let (coords, pos) = lattice(2, 3, |i, j| (i as f32 * 10.0, j as f32 * 10.0));
        let order = order_lattice(&coords, &pos, 2, 3).expect("order");
        let pts = ordered_positions(&order, &pos);
        // cols axis runs down the image, rows axis must then run leftwards
        // to stay right-handed.
        assert_eq!(pts[0], (10.0, 0.0));
        assert_eq!(pts[1], (10.0, 10.0));
        assert_eq!(pts[2], (10.0, 20.0));
        assert_eq!(pts[3], (0.0, 0.0));
    }

    #[test]
    fn holes_or_wrong_size_are_rejected() {
        let (mut coords, pos) = lattice(3, 3, |i, j| (i as f32, j as f32));
        assert!(order_lattice(&coords, &pos, 2, 3).is_none());
        coords.pop();
        coords.push((8, 5, 5));
        assert!(order_lattice(&coords, &pos, 3, 3).is_none());
    }

    #[test]
    fn rejects_invalid_params() {
        let pattern = stereo_recon_core::PatternSpec::new(6, 9, 1.0).expect("pattern");
        let mut params = ChessboardParams::for_pattern(pattern);
        params.threshold.block_size = 10;
        assert!(matches!(
            ChessboardDetector::new(params.clone()),
            Err(ChessboardError::InvalidBlockSize(10))
        ));
        params.threshold.block_size = 15;
        params.coarse_scale = 0.0;
        assert!(ChessboardDetector::new(params).is_err());
    }

    #[test]
    fn blank_image_is_a_miss_not_an_error() {
        let pattern = stereo_recon_core::PatternSpec::new(4, 5, 1.0).expect("pattern");
        let detector = ChessboardDetector::new(ChessboardParams::for_pattern(pattern)).expect("detector");
        let blank = GrayImage::from_fn(64, 48, |_, _| 200);
        assert!(detector.detect(&blank).expect("valid input").is_none());
        let tiny = GrayImage::new(8, 8);
        assert!(detector.detect(&tiny).is_err());
    }
}
