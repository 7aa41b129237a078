//! Additional math helpers layered on top of `glam` for planar dynamics.

use glam::{Mat2, Mat3, Vec2, Vec3};

/// Cross product of a vector and a scalar (rotates `v` clockwise and scales by `s`).
#[inline]
pub fn cross_vs(v: Vec2, s: f32) -> Vec2 {
    Vec2::new(s * v.y, -s * v.x)
}

/// Cross product of a scalar and a vector (rotates `v` counter-clockwise and scales by `s`).
#[inline]
pub fn cross_sv(s: f32, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// 2D cross product, i.e. the z component of the 3D cross product.
#[inline]
pub fn cross(a: Vec2, b: Vec2) -> f32 {
    a.perp_dot(b)
}

/// Returns true when both components are finite.
#[inline]
pub fn is_finite(v: Vec2) -> bool {
    v.x.is_finite() && v.y.is_finite()
}

/// Solves `k * x = b` for a 2x2 matrix. A singular matrix yields zero.
pub fn solve22(k: Mat2, b: Vec2) -> Vec2 {
    let (a11, a12, a21, a22) = (k.x_axis.x, k.y_axis.x, k.x_axis.y, k.y_axis.y);
    let mut det = a11 * a22 - a12 * a21;
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
}

/// Inverse of a 2x2 matrix. A singular matrix yields zero.
pub fn inverse22(k: Mat2) -> Mat2 {
    let (a, b, c, d) = (k.x_axis.x, k.y_axis.x, k.x_axis.y, k.y_axis.y);
    let mut det = a * d - b * c;
    if det != 0.0 {
        det = 1.0 / det;
    }
    Mat2::from_cols(Vec2::new(det * d, -det * c), Vec2::new(-det * b, det * a))
}

/// Multiplies the upper-left 2x2 block of a 3x3 matrix with a vector.
#[inline]
pub fn mul22_of33(k: &Mat3, v: Vec2) -> Vec2 {
    Vec2::new(
        k.x_axis.x * v.x + k.y_axis.x * v.y,
        k.x_axis.y * v.x + k.y_axis.y * v.y,
    )
}

/// Solves the upper-left 2x2 block of a 3x3 system.
pub fn solve22_of33(k: &Mat3, b: Vec2) -> Vec2 {
    let (a11, a12, a21, a22) = (k.x_axis.x, k.y_axis.x, k.x_axis.y, k.y_axis.y);
    let mut det = a11 * a22 - a12 * a21;
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec2::new(det * (a22 * b.x - a12 * b.y), det * (a11 * b.y - a21 * b.x))
}

/// Solves `k * x = b` for a 3x3 matrix. A singular matrix yields zero.
pub fn solve33(k: &Mat3, b: Vec3) -> Vec3 {
    let mut det = k.x_axis.dot(k.y_axis.cross(k.z_axis));
    if det != 0.0 {
        det = 1.0 / det;
    }
    Vec3::new(
        det * b.dot(k.y_axis.cross(k.z_axis)),
        det * k.x_axis.dot(b.cross(k.z_axis)),
        det * k.x_axis.dot(k.y_axis.cross(b)),
    )
}

/// Inverse of the upper-left 2x2 block, returned as a 3x3 with zeroed third row/column.
pub fn inverse22_of33(k: &Mat3) -> Mat3 {
    let (a, b, c, d) = (k.x_axis.x, k.y_axis.x, k.x_axis.y, k.y_axis.y);
    let mut det = a * d - b * c;
    if det != 0.0 {
        det = 1.0 / det;
    }
    Mat3::from_cols(
        Vec3::new(det * d, -det * c, 0.0),
        Vec3::new(-det * b, det * a, 0.0),
        Vec3::ZERO,
    )
}

/// Inverse of a symmetric 3x3 matrix. A singular matrix yields zero.
pub fn symmetric_inverse33(k: &Mat3) -> Mat3 {
    let mut det = k.x_axis.dot(k.y_axis.cross(k.z_axis));
    if det != 0.0 {
        det = 1.0 / det;
    }

    let (a11, a12, a13) = (k.x_axis.x, k.y_axis.x, k.z_axis.x);
    let (a22, a23) = (k.y_axis.y, k.z_axis.y);
    let a33 = k.z_axis.z;

    let m11 = det * (a22 * a33 - a23 * a23);
    let m12 = det * (a13 * a23 - a12 * a33);
    let m13 = det * (a12 * a23 - a13 * a22);
    let m22 = det * (a11 * a33 - a13 * a13);
    let m23 = det * (a13 * a12 - a11 * a23);
    let m33 = det * (a11 * a22 - a12 * a12);

    Mat3::from_cols(
        Vec3::new(m11, m12, m13),
        Vec3::new(m12, m22, m23),
        Vec3::new(m13, m23, m33),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn scalar_cross_products_rotate_quarter_turns() {
        let v = Vec2::new(1.0, 0.0);
        assert_eq!(cross_sv(1.0, v), Vec2::new(0.0, 1.0));
        assert_eq!(cross_vs(v, 1.0), Vec2::new(0.0, -1.0));
        assert_relative_eq!(cross(Vec2::X, Vec2::Y), 1.0);
    }

    #[test]
    fn solve22_inverts_regular_matrix() {
        let k = Mat2::from_cols(Vec2::new(2.0, 1.0), Vec2::new(1.0, 3.0));
        let x = solve22(k, Vec2::new(3.0, 5.0));
        let back = k * x;
        assert_relative_eq!(back.x, 3.0, epsilon = 1e-5);
        assert_relative_eq!(back.y, 5.0, epsilon = 1e-5);
    }

    #[test]
    fn solve33_and_symmetric_inverse_agree() {
        let k = Mat3::from_cols(
            Vec3::new(4.0, 1.0, 0.5),
            Vec3::new(1.0, 3.0, 0.25),
            Vec3::new(0.5, 0.25, 2.0),
        );
        let b = Vec3::new(1.0, -2.0, 0.5);
        let direct = solve33(&k, b);
        let via_inverse = symmetric_inverse33(&k) * b;
        assert_relative_eq!(direct.x, via_inverse.x, epsilon = 1e-5);
        assert_relative_eq!(direct.y, via_inverse.y, epsilon = 1e-5);
        assert_relative_eq!(direct.z, via_inverse.z, epsilon = 1e-5);
    }

    #[test]
    fn singular_system_yields_zero() {
        let k = Mat2::from_cols(Vec2::new(1.0, 2.0), Vec2::new(2.0, 4.0));
        assert_eq!(solve22(k, Vec2::ONE), Vec2::ZERO);
    }
}
