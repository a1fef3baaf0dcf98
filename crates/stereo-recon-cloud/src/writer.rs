//! Point cloud serialization.

use crate::cloud::PointCloud;
use crate::CloudError;
use log::info;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::Path;
use stereo_recon_core::write_atomic;

/// On-disk point cloud format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointCloudFormat {
    /// ASCII PLY with optional `uchar` colors.
    #[default]
    Ply,
    /// Wavefront OBJ vertex list; colors as `0..1` floats after the position.
    Obj,
}

impl PointCloudFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            PointCloudFormat::Ply => "ply",
            PointCloudFormat::Obj => "obj",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WriteOptions {
    pub format: PointCloudFormat,
    /// Keep only points with `min <= z <= max`.
    pub depth_range: Option<(f32, f32)>,
    /// Drop colors even when the cloud carries them.
    pub skip_colors: bool,
}

impl WriteOptions {
    fn validate(&self) -> Result<(), CloudError> {
        if let Some((min, max)) = self.depth_range {
            if !(min.is_finite() && max.is_finite()) || min > max {
                return Err(CloudError::InvalidDepthRange { min, max });
            }
        }
        Ok(())
    }

    fn keeps(&self, p: &[f32; 3]) -> bool {
        self.depth_range
            .is_none_or(|(min, max)| (min..=max).contains(&p[2]))
    }
}

impl PointCloud {
    /// Serialize the finite points passing `opts` into `out`.
    /// Returns the number of points written, which is also the count
    /// declared in the header.
    pub fn write_to(&self, out: &mut dyn Write, opts: &WriteOptions) -> Result<usize, CloudError> {
        opts.validate()?;
        Ok(self.serialize(out, opts)?)
    }

    /// Write to `path` through a temporary sibling file; on failure the
    /// target is left untouched.
    pub fn write(&self, path: impl AsRef<Path>, opts: &WriteOptions) -> Result<usize, CloudError> {
        let path = path.as_ref();
        opts.validate()?;
        let mut written = 0;
        write_atomic(path, |w| {
            written = self.serialize(w, opts)?;
            Ok(())
        })?;
        info!("wrote {} points to {}", written, path.display());
        Ok(written)
    }

    fn serialize(&self, out: &mut dyn Write, opts: &WriteOptions) -> io::Result<usize> {
        let selected: Vec<_> = self.iter_finite().filter(|(p, _)| opts.keeps(p)).collect();
        let with_colors = self.colors.is_some() && !opts.skip_colors;
        match opts.format {
            PointCloudFormat::Ply => write_ply(out, &selected, with_colors)?,
            PointCloudFormat::Obj => write_obj(out, &selected, with_colors)?,
        }
        Ok(selected.len())
    }
}

type Selected = [([f32; 3], Option<[u8; 3]>)];

fn write_ply(out: &mut dyn Write, points: &Selected, with_colors: bool) -> io::Result<()> {
    writeln!(out, "ply")?;
    writeln!(out, "format ascii 1.0")?;
    writeln!(out, "element vertex {}", points.len())?;
    for axis in ["x", "y", "z"] {
        writeln!(out, "property float {axis}")?;
    }
    if with_colors {
        for channel in ["red", "green", "blue"] {
            writeln!(out, "property uchar {channel}")?;
        }
    }
    writeln!(out, "end_header")?;
    for (p, c) in points {
        write!(out, "{} {} {}", p[0], p[1], p[2])?;
        if let (true, Some([r, g, b])) = (with_colors, c) {
            write!(out, " {r} {g} {b}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn write_obj(out: &mut dyn Write, points: &Selected, with_colors: bool) -> io::Result<()> {
    writeln!(out, "# stereo point cloud")?;
    writeln!(out, "# vertices: {}", points.len())?;
    for (p, c) in points {
        write!(out, "v {} {} {}", p[0], p[1], p[2])?;
        if let (true, Some(rgb)) = (with_colors, c) {
            let [r, g, b] = rgb.map(|v| v as f32 / 255.0);
            write!(out, " {r} {g} {b}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PointCloud {
        PointCloud {
            width: 2,
            height: 2,
            points: vec![
                [0.0, 0.0, 1.0],
                [f32::NAN; 3],
                [0.5, -0.25, 3.0],
                [1.0, f32::INFINITY, 2.0],
            ],
            colors: Some(vec![[255, 0, 0], [0, 0, 0], [0, 128, 255], [1, 2, 3]]),
        }
    }

    fn render(cloud: &PointCloud, opts: &WriteOptions) -> (usize, String) {
        let mut buf = Vec::new();
        let n = cloud.write_to(&mut buf, opts).expect("write");
        (n, String::from_utf8(buf).expect("utf8"))
    }

    #[test]
    fn ply_declares_exactly_the_written_points() {
        let (n, text) = render(&sample(), &WriteOptions::default());
        assert_eq!(n, 2);
        let expected = "ply\nformat ascii 1.0\nelement vertex 2\n\
             property float x\nproperty float y\nproperty float z\n\
             property uchar red\nproperty uchar green\nproperty uchar blue\n\
             end_header\n0 0 1 255 0 0\n0.5 -0.25 3 0 128 255\n";
        assert_eq!(text, expected);
    }

    #[test]
    fn depth_range_filters_before_counting() {
        let opts = WriteOptions {
            depth_range: Some((2.0, 5.0)),
            skip_colors: true,
            ..WriteOptions::default()
        };
        let (n, text) = render(&sample(), &opts);
        assert_eq!(n, 1);
        assert!(text.contains("element vertex 1\n"));
        assert!(!text.contains("uchar"));
        assert!(text.ends_with("end_header\n0.5 -0.25 3\n"));
    }

    #[test]
    fn obj_scales_colors() {
        let opts = WriteOptions {
            format: PointCloudFormat::Obj,
            ..WriteOptions::default()
        };
        let (n, text) = render(&sample(), &opts);
        assert_eq!(n, 2);
        assert!(text.contains("# vertices: 2\n"));
        assert!(text.contains("v 0 0 1 1 0 0\n"));
    }

    #[test]
    fn inverted_depth_range_is_rejected_without_touching_the_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cloud.ply");
        let opts = WriteOptions {
            depth_range: Some((5.0, 1.0)),
            ..WriteOptions::default()
        };
        let err = sample().write(&path, &opts).unwrap_err();
        assert!(matches!(err, CloudError::InvalidDepthRange { .. }));
        assert!(!path.exists());
    }
}
