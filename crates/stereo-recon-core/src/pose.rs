use nalgebra::{Matrix3, Point3, Rotation3, Vector3};

/// Rigid transform mapping points from a source frame into a target frame:
/// `p_target = R * p_source + t`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl Pose {
    pub fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Rotation3::identity(), Vector3::zeros())
    }

    /// Build from a Rodrigues rotation vector and a translation.
    pub fn from_rvec_tvec(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self::new(Rotation3::from_scaled_axis(rvec), tvec)
    }

    /// Rodrigues rotation vector (axis * angle).
    pub fn rvec(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }

    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation * p + self.translation
    }

    /// `self ∘ other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &Pose) -> Pose {
        Pose::new(
            self.rotation * other.rotation,
            self.rotation * other.translation + self.translation,
        )
    }

    pub fn inverse(&self) -> Pose {
        let r_inv = self.rotation.inverse();
        Pose::new(r_inv, -(r_inv * self.translation))
    }

    /// Six parameters `[rx, ry, rz, tx, ty, tz]`.
    pub fn to_params(&self) -> [f64; 6] {
        let r = self.rvec();
        let t = self.translation;
        [r.x, r.y, r.z, t.x, t.y, t.z]
    }

    pub fn from_params(p: &[f64]) -> Pose {
        Pose::from_rvec_tvec(
            Vector3::new(p[0], p[1], p[2]),
            Vector3::new(p[3], p[4], p[5]),
        )
    }
}

/// Cross-product matrix `[v]x` so that `[v]x * w = v × w`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn params_roundtrip_preserves_pose() {
        let pose = Pose::from_rvec_tvec(Vector3::new(0.1, -0.2, 0.3), Vector3::new(1.0, 2.0, 3.0));
        let back = Pose::from_params(&pose.to_params());
        assert_relative_eq!(
            back.rotation.matrix(),
            pose.rotation.matrix(),
            epsilon = 1e-12
        );
        assert_relative_eq!(back.translation, pose.translation, epsilon = 1e-12);
    }

    #[test]
    fn compose_with_inverse_is_identity() {
        let pose = Pose::from_rvec_tvec(Vector3::new(0.4, 0.1, -0.2), Vector3::new(-1.0, 0.5, 2.0));
        let id = pose.compose(&pose.inverse());
        let p = Point3::new(0.3, -0.7, 1.9);
        assert_relative_eq!(id.transform_point(&p), p, epsilon = 1e-12);
    }

    #[test]
    fn skew_matches_cross_product() {
        let v = Vector3::new(1.0, -2.0, 0.5);
        let w = Vector3::new(0.3, 0.2, -1.0);
        assert_relative_eq!(skew(&v) * w, v.cross(&w), epsilon = 1e-12);
    }
}
