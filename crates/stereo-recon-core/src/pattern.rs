use crate::CoreError;
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

/// 3D pattern-frame coordinates (z = 0) of every interior corner, row-major.
pub type ObjectPoints = Vec<Point3<f64>>;

/// Checkerboard geometry: interior corner counts and square edge length.
///
/// `cols` counts corners along a pattern row, `rows` counts pattern rows.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub rows: usize,
    pub cols: usize,
    /// Physical square size; sets the unit of every solved translation.
    pub square_size: f64,
}

impl PatternSpec {
    pub fn new(rows: usize, cols: usize, square_size: f64) -> Result<Self, CoreError> {
        let spec = Self {
            rows,
            cols,
            square_size,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.rows < 2 || self.cols < 2 || self.square_size.is_nan() || self.square_size <= 0.0 {
            return Err(CoreError::InvalidPattern {
                rows: self.rows,
                cols: self.cols,
                square_size: self.square_size,
            });
        }
        Ok(())
    }

    pub fn corner_count(&self) -> usize {
        self.rows * self.cols
    }

    pub fn object_points(&self) -> ObjectPoints {
        let mut pts = Vec::with_capacity(self.corner_count());
        for r in 0..self.rows {
            for c in 0..self.cols {
                pts.push(Point3::new(
                    c as f64 * self.square_size,
                    r as f64 * self.square_size,
                    0.0,
                ));
            }
        }
        pts
    }
}

/// Sub-pixel corner locations of one detected pattern, row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CornerSet {
    rows: usize,
    cols: usize,
    points: Vec<Point2<f64>>,
}

impl CornerSet {
    /// Rejects sets whose length differs from `rows * cols`.
    pub fn new(rows: usize, cols: usize, points: Vec<Point2<f64>>) -> Result<Self, CoreError> {
        let expected = rows * cols;
        if points.len() != expected {
            return Err(CoreError::CornerCountMismatch {
                expected,
                got: points.len(),
            });
        }
        Ok(Self { rows, cols, points })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Point2<f64>> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.points.get(row * self.cols + col)
    }

    /// True when the set was detected for this pattern layout.
    pub fn matches(&self, pattern: &PatternSpec) -> bool {
        self.rows == pattern.rows && self.cols == pattern.cols
    }

    pub fn into_points(self) -> Vec<Point2<f64>> {
        self.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_points_are_row_major_on_plane() {
        let spec = PatternSpec::new(2, 3, 0.5).expect("valid");
        let pts = spec.object_points();
        assert_eq!(pts.len(), 6);
        assert_eq!(pts[1], Point3::new(0.5, 0.0, 0.0));
        assert_eq!(pts[3], Point3::new(0.0, 0.5, 0.0));
        assert!(pts.iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        assert!(PatternSpec::new(1, 5, 1.0).is_err());
        assert!(PatternSpec::new(4, 5, 0.0).is_err());
        assert!(PatternSpec::new(4, 5, f64::NAN).is_err());
    }

    #[test]
    fn corner_set_enforces_count() {
        let err = CornerSet::new(2, 2, vec![Point2::origin(); 3]).unwrap_err();
        assert_eq!(
            err,
            CoreError::CornerCountMismatch {
                expected: 4,
                got: 3
            }
        );
        let set = CornerSet::new(2, 2, (0..4).map(|i| Point2::new(i as f64, 0.0)).collect())
            .expect("valid");
        assert_eq!(set.get(1, 0), Some(&Point2::new(2.0, 0.0)));
        assert_eq!(set.get(2, 0), None);
    }
}
