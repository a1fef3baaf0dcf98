//! From disparity to 3D: reprojection through the rectified `Q` matrix,
//! colored point clouds with PLY/OBJ export, and JET visualizations.
//!
//! ```no_run
//! use stereo_recon_cloud::{reproject_to_3d, WriteOptions};
//! # fn demo(
//! #     disparity: &stereo_recon_disparity::DisparityMap,
//! #     q: &nalgebra::Matrix4<f64>,
//! #     left: &stereo_recon_core::Image,
//! # ) -> Result<(), stereo_recon_cloud::CloudError> {
//! let cloud = reproject_to_3d(disparity, q).with_colors(left)?;
//! let written = cloud.write("point_cloud.ply", &WriteOptions::default())?;
//! println!("{written} points");
//! # Ok(())
//! # }
//! ```

mod cloud;
mod error;
mod visualize;
mod writer;

pub use cloud::{reproject_to_3d, PointCloud};
pub use error::CloudError;
pub use visualize::{depth_visualization, jet, residual_visualization};
pub use writer::{PointCloudFormat, WriteOptions};
