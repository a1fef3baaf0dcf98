//! Checkerboard corner detector for stereo calibration.
//!
//! Pipeline:
//! 1. Convert to luminance, equalize the histogram and reject images without
//!    two well separated intensity phases (Otsu split).
//! 2. Collect ChESS X-junction candidates and keep only those whose ring in
//!    the adaptive-threshold image alternates four times.
//! 3. Estimate the two grid axes from nearest-neighbor edge directions and
//!    link each candidate to at most one neighbor along ±u / ±v.
//! 4. BFS the mutual-neighbor graph into integer lattice coordinates and
//!    accept the component only if it fills the expected rows × cols grid.
//! 5. Canonicalize the lattice (row-major, right-handed) and refine every
//!    corner to sub-pixel accuracy.
//!
//! A miss is not an error: [`ChessboardDetector::detect`] returns `None`, and
//! [`detect_batch`] counts misses separately from hits.

mod batch;
mod detector;
mod error;
mod export;
mod gridgraph;
mod params;
mod subpix;
mod threshold;

pub use batch::{detect_batch, detect_stereo_batch, BatchDetection, StereoBatchDetection};
pub use detector::ChessboardDetector;
pub use error::ChessboardError;
pub use export::{draw_corners, write_corner_csv, CameraSide, CornerRecord};
pub use gridgraph::{GridGraph, NeighborDirection};
pub use params::{ChessboardParams, GridGraphParams, SubPixParams, ThresholdParams};
pub use subpix::corner_subpix;
pub use threshold::{adaptive_threshold, equalize_histogram, otsu_threshold};
