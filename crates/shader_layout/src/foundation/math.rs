//! Math utilities and types
//!
//! nalgebra aliases for host-side values plus the alignment arithmetic the
//! layout code is built on.

pub use nalgebra::{Matrix3, Matrix4, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Alignment of struct members, array strides and total binding sizes
pub const STRUCT_ALIGNMENT: usize = 16;

/// Size in bytes of one numeric slot (`f32`, `i32` or `u32`)
pub const SLOT_SIZE: usize = 4;

/// Round `value` up to the next multiple of `alignment`.
///
/// An alignment of zero or one leaves the value untouched.
pub const fn round_up(value: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

/// Whether `value` is a multiple of `alignment`
pub const fn is_aligned(value: usize, alignment: usize) -> bool {
    alignment <= 1 || value % alignment == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_up() {
        assert_eq!(round_up(0, 16), 0);
        assert_eq!(round_up(1, 16), 16);
        assert_eq!(round_up(16, 16), 16);
        assert_eq!(round_up(17, 16), 32);
        assert_eq!(round_up(5, 4), 8);
        assert_eq!(round_up(300, 256), 512);
        assert_eq!(round_up(7, 0), 7);
    }

    #[test]
    fn test_is_aligned() {
        assert!(is_aligned(256, 256));
        assert!(!is_aligned(260, 256));
        assert!(is_aligned(13, 1));
    }
}
