//! Strided array elements
//!
//! Each item is padded to a 16-byte stride on its own, so an `array<f32, 5>`
//! occupies 80 bytes rather than 20.

use crate::error::{LayoutError, LayoutResult};
use crate::layout::codec;
use crate::layout::element::Element;
use crate::layout::types::ShaderType;
use crate::layout::value::FieldValue;

/// `array<T, N>` or runtime-sized `array<T>` field
#[derive(Debug, Clone)]
pub struct ArrayElement {
    name: String,
    declared: ShaderType,
    resolved: ShaderType,
    item: ShaderType,
    count: usize,
    stride: usize,
    start: usize,
}

impl ArrayElement {
    /// Build an array element. `initial` fixes the item count of runtime-sized arrays.
    pub fn new(name: impl Into<String>, declared: ShaderType, initial: &FieldValue) -> LayoutResult<Self> {
        let name = name.into();
        let ShaderType::Array { item, length } = &declared else {
            return Err(LayoutError::mismatch(name, format!("{} is not an array type", declared)));
        };

        let item = (**item).clone();
        let item_slots = item.numeric_slots();
        let count = match length {
            Some(n) => *n,
            None => {
                if initial.is_empty() || initial.len() % item_slots != 0 {
                    return Err(LayoutError::mismatch(
                        name,
                        format!(
                            "runtime-sized {} needs a whole number of {}-slot items, got {} numbers",
                            declared,
                            item_slots,
                            initial.len()
                        ),
                    ));
                }
                initial.len() / item_slots
            }
        };

        let resolved = ShaderType::Array {
            item: Box::new(item.clone()),
            length: Some(count),
        };

        Ok(Self {
            name,
            stride: item.stride(),
            declared,
            resolved,
            item,
            count,
            start: 0,
        })
    }

    /// Distance between consecutive items
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Declared length, `None` for runtime-sized arrays
    pub fn declared_length(&self) -> Option<usize> {
        match &self.declared {
            ShaderType::Array { length, .. } => *length,
            _ => None,
        }
    }

    /// Item shape
    pub const fn item(&self) -> &ShaderType {
        &self.item
    }

    fn item_offset(&self, index: usize) -> LayoutResult<usize> {
        if index >= self.count {
            return Err(LayoutError::mismatch(
                &self.name,
                format!("item {} out of bounds for length {}", index, self.count),
            ));
        }
        Ok(self.start + index * self.stride)
    }

    /// Reflow a flat list into the strided layout, one item at a time
    pub fn set_value_from_list(&self, buffer: &mut [u8], values: &FieldValue) -> LayoutResult<()> {
        let item_slots = self.item.numeric_slots();
        if values.len() != item_slots * self.count {
            return Err(LayoutError::mismatch(
                &self.name,
                format!("expected {} numbers, got {}", item_slots * self.count, values.len()),
            ));
        }
        for (index, chunk) in values.numbers().chunks(item_slots).enumerate() {
            codec::encode(&self.item, buffer, self.start + index * self.stride, chunk)?;
        }
        Ok(())
    }
}

impl Element for ArrayElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn shader_type(&self) -> &ShaderType {
        &self.declared
    }

    fn value_shape(&self) -> &ShaderType {
        &self.resolved
    }

    fn alignment(&self) -> usize {
        self.resolved.alignment()
    }

    fn size(&self) -> usize {
        self.stride * self.count
    }

    fn start_offset(&self) -> usize {
        self.start
    }

    fn place(&mut self, block_start: usize) {
        self.start = block_start;
    }

    fn write(&self, buffer: &mut [u8], value: &FieldValue) -> LayoutResult<()> {
        self.set_value_from_list(buffer, value)
    }

    fn read(&self, buffer: &[u8]) -> LayoutResult<FieldValue> {
        let mut out = Vec::with_capacity(self.item.numeric_slots() * self.count);
        codec::decode(&self.resolved, buffer, self.start, &mut out)?;
        Ok(FieldValue::new(out))
    }

    fn item_count(&self) -> Option<usize> {
        Some(self.count)
    }

    fn item_slots(&self) -> usize {
        self.item.numeric_slots()
    }

    fn write_item(&self, buffer: &mut [u8], index: usize, value: &FieldValue) -> LayoutResult<()> {
        let offset = self.item_offset(index)?;
        codec::encode(&self.item, buffer, offset, value.numbers()).map(|_| ())
    }

    fn read_item(&self, buffer: &[u8], index: usize) -> LayoutResult<FieldValue> {
        let offset = self.item_offset(index)?;
        let mut out = Vec::with_capacity(self.item.numeric_slots());
        codec::decode(&self.item, buffer, offset, &mut out)?;
        Ok(FieldValue::new(out))
    }

    fn clone_box(&self) -> Box<dyn Element> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::types::TypeRegistry;
    use approx::assert_relative_eq;

    fn array(type_name: &str, initial: &FieldValue) -> ArrayElement {
        let shape = TypeRegistry::new().parse(type_name).unwrap();
        ArrayElement::new("items", shape, initial).unwrap()
    }

    #[test]
    fn test_scalar_array_stride() {
        let values = FieldValue::floats(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let mut element = array("array<f32, 5>", &values);
        element.set_alignment(0);

        assert_eq!(element.stride(), 16);
        assert_eq!(element.size(), 80);

        let mut buffer = vec![0u8; 80];
        element.write(&mut buffer, &values).unwrap();
        for i in 0..5 {
            let item = element.read_item(&buffer, i).unwrap();
            assert_relative_eq!(item.as_f32().unwrap(), i as f32);
        }
    }

    #[test]
    fn test_vec2_items_pad_independently() {
        let values = FieldValue::floats(&[1.0, 2.0, 3.0, 4.0]);
        let mut element = array("array<vec2f, 2>", &values);
        element.set_alignment(4);
        assert_eq!(element.start_offset(), 16);

        let mut buffer = vec![0u8; 48];
        element.write(&mut buffer, &values).unwrap();

        let second: f32 = bytemuck::pod_read_unaligned(&buffer[32..36]);
        assert_relative_eq!(second, 3.0);
        let gap: f32 = bytemuck::pod_read_unaligned(&buffer[24..28]);
        assert_relative_eq!(gap, 0.0);
    }

    #[test]
    fn test_runtime_sized_length_from_value() {
        let values = FieldValue::floats(&[0.0; 12]);
        let element = array("array<vec4f>", &values);
        assert_eq!(element.item_count(), Some(3));
        assert_eq!(element.declared_length(), None);
        assert_eq!(element.size(), 48);
        assert_eq!(element.shader_type().wgsl_name(), "array<vec4<f32>>");
    }

    #[test]
    fn test_runtime_sized_rejects_partial_items() {
        let shape = TypeRegistry::new().parse("array<vec4f>").unwrap();
        let err = ArrayElement::new("items", shape, &FieldValue::floats(&[0.0; 6])).unwrap_err();
        assert!(err.is_type_mismatch());
    }

    #[test]
    fn test_write_single_item_only_touches_its_stride() {
        let values = FieldValue::floats(&[1.0, 2.0, 3.0]);
        let mut element = array("array<f32, 3>", &values);
        element.set_alignment(0);

        let mut buffer = vec![0xAAu8; 48];
        element.write_item(&mut buffer, 1, &FieldValue::from(9.0_f32)).unwrap();

        assert!(buffer[..16].iter().all(|b| *b == 0xAA));
        assert!(buffer[20..].iter().all(|b| *b == 0xAA));
        assert!(element.write_item(&mut buffer, 3, &FieldValue::from(1.0_f32)).is_err());
    }

    #[test]
    fn test_list_length_checked() {
        let values = FieldValue::floats(&[1.0, 2.0]);
        let element = array("array<f32, 2>", &values);
        let mut buffer = vec![0u8; 32];
        assert!(element.set_value_from_list(&mut buffer, &FieldValue::floats(&[1.0])).is_err());
    }
}
