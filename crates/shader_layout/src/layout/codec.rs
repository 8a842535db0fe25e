//! Primitive writers and the recursive value⇄bytes codec
//!
//! Slots are 32-bit and written in native byte order with `bytemuck`, the
//! same representation a `#[repr(C)]` Pod struct uploaded with
//! `bytemuck::cast_slice` would have. Every access is bounds-checked and
//! reports [`LayoutError::Range`] instead of panicking.

use crate::error::{LayoutError, LayoutResult};
use crate::foundation::math::{round_up, SLOT_SIZE, STRUCT_ALIGNMENT};
use crate::layout::types::{NumericKind, ShaderType};
use crate::layout::value::Number;

fn slot_range_error(offset: usize, limit: usize) -> LayoutError {
    LayoutError::Range {
        offset,
        len: SLOT_SIZE,
        limit,
    }
}

/// Write one number at `offset`
pub fn write_number(buffer: &mut [u8], offset: usize, number: Number) -> LayoutResult<()> {
    let limit = buffer.len();
    let slot = buffer
        .get_mut(offset..offset + SLOT_SIZE)
        .ok_or_else(|| slot_range_error(offset, limit))?;
    match number {
        Number::F32(v) => slot.copy_from_slice(bytemuck::bytes_of(&v)),
        Number::I32(v) => slot.copy_from_slice(bytemuck::bytes_of(&v)),
        Number::U32(v) => slot.copy_from_slice(bytemuck::bytes_of(&v)),
    }
    Ok(())
}

/// Read one number of `kind` at `offset`
pub fn read_number(buffer: &[u8], offset: usize, kind: NumericKind) -> LayoutResult<Number> {
    let slot = buffer
        .get(offset..offset + SLOT_SIZE)
        .ok_or_else(|| slot_range_error(offset, buffer.len()))?;
    Ok(match kind {
        NumericKind::F32 => Number::F32(bytemuck::pod_read_unaligned(slot)),
        NumericKind::I32 => Number::I32(bytemuck::pod_read_unaligned(slot)),
        NumericKind::U32 => Number::U32(bytemuck::pod_read_unaligned(slot)),
    })
}

fn take(numbers: &[Number], index: usize, shape: &ShaderType) -> LayoutResult<Number> {
    numbers.get(index).copied().ok_or_else(|| {
        LayoutError::mismatch(
            shape.wgsl_name(),
            format!("ran out of numbers at slot {}", index),
        )
    })
}

fn unresolved(shape: &ShaderType) -> LayoutError {
    LayoutError::Layout(format!("'{}' has no resolved length", shape))
}

/// Serialize `numbers` as a value of `shape` starting at `base`.
///
/// Returns the number of slots consumed.
pub fn encode(shape: &ShaderType, buffer: &mut [u8], base: usize, numbers: &[Number]) -> LayoutResult<usize> {
    match shape {
        ShaderType::Scalar(_) => {
            write_number(buffer, base, take(numbers, 0, shape)?)?;
            Ok(1)
        }
        ShaderType::Vector(_, n) => {
            let n = usize::from(*n);
            for i in 0..n {
                write_number(buffer, base + i * SLOT_SIZE, take(numbers, i, shape)?)?;
            }
            Ok(n)
        }
        ShaderType::Matrix { columns, rows } => {
            let rows = usize::from(*rows);
            let column_stride = round_up(rows * SLOT_SIZE, STRUCT_ALIGNMENT);
            let mut used = 0;
            for column in 0..usize::from(*columns) {
                for row in 0..rows {
                    let offset = base + column * column_stride + row * SLOT_SIZE;
                    write_number(buffer, offset, take(numbers, used, shape)?)?;
                    used += 1;
                }
            }
            Ok(used)
        }
        ShaderType::Array { item, length } => {
            let length = length.ok_or_else(|| unresolved(shape))?;
            let stride = item.stride();
            let mut used = 0;
            for i in 0..length {
                used += encode(item, buffer, base + i * stride, numbers.get(used..).unwrap_or(&[]))?;
            }
            Ok(used)
        }
        ShaderType::Struct(def) => {
            let mut used = 0;
            for member in &def.members {
                used += encode(&member.ty, buffer, base + member.offset, numbers.get(used..).unwrap_or(&[]))?;
            }
            Ok(used)
        }
    }
}

/// Deserialize a value of `shape` starting at `base`, appending to `out`
pub fn decode(shape: &ShaderType, buffer: &[u8], base: usize, out: &mut Vec<Number>) -> LayoutResult<()> {
    match shape {
        ShaderType::Scalar(kind) => out.push(read_number(buffer, base, *kind)?),
        ShaderType::Vector(kind, n) => {
            for i in 0..usize::from(*n) {
                out.push(read_number(buffer, base + i * SLOT_SIZE, *kind)?);
            }
        }
        ShaderType::Matrix { columns, rows } => {
            let rows = usize::from(*rows);
            let column_stride = round_up(rows * SLOT_SIZE, STRUCT_ALIGNMENT);
            for column in 0..usize::from(*columns) {
                for row in 0..rows {
                    let offset = base + column * column_stride + row * SLOT_SIZE;
                    out.push(read_number(buffer, offset, NumericKind::F32)?);
                }
            }
        }
        ShaderType::Array { item, length } => {
            let length = length.ok_or_else(|| unresolved(shape))?;
            let stride = item.stride();
            for i in 0..length {
                decode(item, buffer, base + i * stride, out)?;
            }
        }
        ShaderType::Struct(def) => {
            for member in &def.members {
                decode(&member.ty, buffer, base + member.offset, out)?;
            }
        }
    }
    Ok(())
}
