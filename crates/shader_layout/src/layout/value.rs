//! Host-side field values
//!
//! A [`FieldValue`] is a flat list of 32-bit numbers in slot order: vector
//! components, matrix columns (column-major), array items and struct members
//! are all flattened. The declared [`ShaderType`] gives the list its shape.

use crate::error::{LayoutError, LayoutResult};
use crate::foundation::math::{Mat3, Mat4, Vec2, Vec3, Vec4};
use crate::layout::types::{NumericKind, ShaderType};

/// Largest integer magnitude an `f32` represents exactly
const F32_EXACT_INT: i64 = 1 << 24;

/// A single 32-bit number tagged with its kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// 32-bit float
    F32(f32),
    /// 32-bit signed integer
    I32(i32),
    /// 32-bit unsigned integer
    U32(u32),
}

impl Number {
    /// Kind of this number
    pub const fn kind(self) -> NumericKind {
        match self {
            Self::F32(_) => NumericKind::F32,
            Self::I32(_) => NumericKind::I32,
            Self::U32(_) => NumericKind::U32,
        }
    }

    /// Value widened to `f64`
    pub fn as_f64(self) -> f64 {
        match self {
            Self::F32(v) => f64::from(v),
            Self::I32(v) => f64::from(v),
            Self::U32(v) => f64::from(v),
        }
    }

    /// Convert to `kind` without losing information.
    ///
    /// Integers convert between signednesses when in range and into floats
    /// when exactly representable; floats never convert to integers.
    pub fn coerce(self, kind: NumericKind) -> Option<Self> {
        if self.kind() == kind {
            return Some(self);
        }
        let int = match self {
            Self::F32(_) => return None,
            Self::I32(v) => i64::from(v),
            Self::U32(v) => i64::from(v),
        };
        match kind {
            NumericKind::F32 => (int.abs() <= F32_EXACT_INT).then_some(Self::F32(int as f32)),
            NumericKind::I32 => i32::try_from(int).ok().map(Self::I32),
            NumericKind::U32 => u32::try_from(int).ok().map(Self::U32),
        }
    }

    /// Build a number of `kind` from an `f64`, as read from a manifest
    pub fn from_f64(value: f64, kind: NumericKind) -> Option<Self> {
        match kind {
            NumericKind::F32 => Some(Self::F32(value as f32)),
            NumericKind::I32 => (value.fract() == 0.0
                && value >= f64::from(i32::MIN)
                && value <= f64::from(i32::MAX))
            .then_some(Self::I32(value as i32)),
            NumericKind::U32 => (value.fract() == 0.0 && value >= 0.0 && value <= f64::from(u32::MAX))
                .then_some(Self::U32(value as u32)),
        }
    }
}

/// Flat list of numbers making up one field's value
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldValue {
    numbers: Vec<Number>,
}

impl FieldValue {
    /// Wrap a list of numbers
    pub fn new(numbers: Vec<Number>) -> Self {
        Self { numbers }
    }

    /// Build a value from floats
    pub fn floats(values: &[f32]) -> Self {
        Self::new(values.iter().copied().map(Number::F32).collect())
    }

    /// Build a value from signed integers
    pub fn ints(values: &[i32]) -> Self {
        Self::new(values.iter().copied().map(Number::I32).collect())
    }

    /// Build a value from unsigned integers
    pub fn uints(values: &[u32]) -> Self {
        Self::new(values.iter().copied().map(Number::U32).collect())
    }

    /// Build a value for `shape` from manifest numbers, one per slot kind
    pub fn from_f64s(field: &str, values: &[f64], shape: &ShaderType) -> LayoutResult<Self> {
        let kinds = shape.slot_kinds();
        let per_item = kinds.len().max(1);
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let kind = kinds[i % per_item];
                Number::from_f64(*v, kind).ok_or_else(|| {
                    LayoutError::mismatch(field, format!("{} is not a valid {}", v, kind.wgsl_name()))
                })
            })
            .collect::<LayoutResult<Vec<_>>>()
            .map(Self::new)
    }

    /// Numbers in slot order
    pub fn numbers(&self) -> &[Number] {
        &self.numbers
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    /// Whether the value holds no numbers
    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    /// All slots widened to `f32`
    pub fn to_f32s(&self) -> Vec<f32> {
        self.numbers.iter().map(|n| n.as_f64() as f32).collect()
    }

    /// All slots as `u32`, `None` if any slot is a float or negative
    pub fn to_u32s(&self) -> Option<Vec<u32>> {
        self.numbers
            .iter()
            .map(|n| match n.coerce(NumericKind::U32)? {
                Number::U32(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    /// All slots as `i32`, `None` if any slot is a float or out of range
    pub fn to_i32s(&self) -> Option<Vec<i32>> {
        self.numbers
            .iter()
            .map(|n| match n.coerce(NumericKind::I32)? {
                Number::I32(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    /// The single float of a scalar value
    pub fn as_f32(&self) -> Option<f32> {
        match self.numbers.as_slice() {
            [Number::F32(v)] => Some(*v),
            _ => None,
        }
    }

    /// Sub-range of slots as a new value
    pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
        Self::new(self.numbers[range].to_vec())
    }

    /// Overwrite slots starting at `start` with `item`'s numbers
    pub fn replace_range(&mut self, start: usize, item: &Self) {
        self.numbers[start..start + item.len()].copy_from_slice(&item.numbers);
    }

    /// Coerce every slot to the kinds `shape` expects, checking the count.
    ///
    /// Runtime-sized arrays accept any whole number of items; everything else
    /// must match `numeric_slots` exactly.
    pub fn conform(&self, field: &str, shape: &ShaderType) -> LayoutResult<Self> {
        let kinds = shape.slot_kinds();
        let expected = kinds.len();

        if shape.is_runtime_sized() {
            if self.numbers.is_empty() || self.numbers.len() % expected != 0 {
                return Err(LayoutError::mismatch(
                    field,
                    format!(
                        "{} numbers is not a whole number of {}-slot items for {}",
                        self.numbers.len(),
                        expected,
                        shape
                    ),
                ));
            }
        } else if self.numbers.len() != expected {
            return Err(LayoutError::mismatch(
                field,
                format!("expected {} numbers for {}, got {}", expected, shape, self.numbers.len()),
            ));
        }

        self.numbers
            .iter()
            .enumerate()
            .map(|(i, number)| {
                let kind = kinds[i % expected];
                number.coerce(kind).ok_or_else(|| {
                    LayoutError::mismatch(
                        field,
                        format!("slot {} holds {:?}, expected {}", i, number, kind.wgsl_name()),
                    )
                })
            })
            .collect::<LayoutResult<Vec<_>>>()
            .map(Self::new)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        Self::new(vec![Number::F32(value)])
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::new(vec![Number::I32(value)])
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::new(vec![Number::U32(value)])
    }
}

impl<const N: usize> From<[f32; N]> for FieldValue {
    fn from(values: [f32; N]) -> Self {
        Self::floats(&values)
    }
}

impl<const N: usize> From<[i32; N]> for FieldValue {
    fn from(values: [i32; N]) -> Self {
        Self::ints(&values)
    }
}

impl<const N: usize> From<[u32; N]> for FieldValue {
    fn from(values: [u32; N]) -> Self {
        Self::uints(&values)
    }
}

impl From<Vec<f32>> for FieldValue {
    fn from(values: Vec<f32>) -> Self {
        Self::floats(&values)
    }
}

impl From<Vec<u32>> for FieldValue {
    fn from(values: Vec<u32>) -> Self {
        Self::uints(&values)
    }
}

impl From<Vec<Number>> for FieldValue {
    fn from(numbers: Vec<Number>) -> Self {
        Self::new(numbers)
    }
}

impl From<Vec2> for FieldValue {
    fn from(v: Vec2) -> Self {
        Self::floats(v.as_slice())
    }
}

impl From<Vec3> for FieldValue {
    fn from(v: Vec3) -> Self {
        Self::floats(v.as_slice())
    }
}

impl From<Vec4> for FieldValue {
    fn from(v: Vec4) -> Self {
        Self::floats(v.as_slice())
    }
}

// nalgebra stores matrices column-major, which is the slot order used here.
impl From<Mat3> for FieldValue {
    fn from(m: Mat3) -> Self {
        Self::floats(m.as_slice())
    }
}

impl From<Mat4> for FieldValue {
    fn from(m: Mat4) -> Self {
        Self::floats(m.as_slice())
    }
}
