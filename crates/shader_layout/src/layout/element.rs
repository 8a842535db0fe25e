//! Field placement and serialization strategies
//!
//! Every declared field becomes one [`Element`]. The binding never cares which
//! strategy it holds: plain values, strided arrays and interleaved array
//! members all answer the same placement and read/write questions.

use std::fmt;
use std::ops::Range;

use crate::error::{LayoutError, LayoutResult};
use crate::foundation::math::round_up;
use crate::layout::codec;
use crate::layout::types::ShaderType;
use crate::layout::value::FieldValue;

/// One field's placement plus its value⇄bytes conversion
pub trait Element: fmt::Debug {
    /// Field name
    fn name(&self) -> &str;

    /// Declared shape, as written in the shader
    fn shader_type(&self) -> &ShaderType;

    /// Shape values must conform to. Differs from [`Element::shader_type`]
    /// only for runtime-sized arrays, whose length is fixed at construction.
    fn value_shape(&self) -> &ShaderType {
        self.shader_type()
    }

    /// Base alignment of [`Element::start_offset`]
    fn alignment(&self) -> usize;

    /// Alignment used when placing this element's block on the cursor
    fn placement_alignment(&self) -> usize {
        self.alignment()
    }

    /// Bytes the element's block advances the cursor by
    fn size(&self) -> usize;

    /// Byte offset of the first value slot
    fn start_offset(&self) -> usize;

    /// Record the block start chosen by the allocator
    fn place(&mut self, block_start: usize);

    /// Round `cursor` up to this element's alignment, record the start and
    /// return the cursor after the element
    fn set_alignment(&mut self, cursor: usize) -> usize {
        let start = round_up(cursor, self.placement_alignment());
        self.place(start);
        start + self.size()
    }

    /// Bytes this element may touch
    fn byte_range(&self) -> Range<usize> {
        self.start_offset()..self.start_offset() + self.size()
    }

    /// Serialize a conformed value into `buffer`
    fn write(&self, buffer: &mut [u8], value: &FieldValue) -> LayoutResult<()>;

    /// Decode the element's current bytes
    fn read(&self, buffer: &[u8]) -> LayoutResult<FieldValue>;

    /// Number of items for arrays, `None` otherwise
    fn item_count(&self) -> Option<usize> {
        None
    }

    /// Numeric slots in one item
    fn item_slots(&self) -> usize {
        self.value_shape().numeric_slots()
    }

    /// Serialize one item of an array
    fn write_item(&self, _buffer: &mut [u8], _index: usize, _value: &FieldValue) -> LayoutResult<()> {
        Err(LayoutError::mismatch(self.name(), "not an array"))
    }

    /// Decode one item of an array
    fn read_item(&self, _buffer: &[u8], _index: usize) -> LayoutResult<FieldValue> {
        Err(LayoutError::mismatch(self.name(), "not an array"))
    }

    /// Interleave group this element belongs to
    fn interleave_group(&self) -> Option<&str> {
        None
    }

    /// Clone behind the trait object
    fn clone_box(&self) -> Box<dyn Element>;
}

impl Clone for Box<dyn Element> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Scalar, vector, matrix or struct value stored contiguously
#[derive(Debug, Clone)]
pub struct PlainElement {
    name: String,
    shape: ShaderType,
    start: usize,
}

impl PlainElement {
    /// Create an unplaced element
    pub fn new(name: impl Into<String>, shape: ShaderType) -> Self {
        Self {
            name: name.into(),
            shape,
            start: 0,
        }
    }
}

impl Element for PlainElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn shader_type(&self) -> &ShaderType {
        &self.shape
    }

    fn alignment(&self) -> usize {
        self.shape.alignment()
    }

    fn size(&self) -> usize {
        self.shape.size()
    }

    fn start_offset(&self) -> usize {
        self.start
    }

    fn place(&mut self, block_start: usize) {
        self.start = block_start;
    }

    fn write(&self, buffer: &mut [u8], value: &FieldValue) -> LayoutResult<()> {
        codec::encode(&self.shape, buffer, self.start, value.numbers()).map(|_| ())
    }

    fn read(&self, buffer: &[u8]) -> LayoutResult<FieldValue> {
        let mut out = Vec::with_capacity(self.shape.numeric_slots());
        codec::decode(&self.shape, buffer, self.start, &mut out)?;
        Ok(FieldValue::new(out))
    }

    fn clone_box(&self) -> Box<dyn Element> {
        Box::new(self.clone())
    }
}
