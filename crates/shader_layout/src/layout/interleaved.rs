//! Interleaved array elements
//!
//! Sibling arrays such as `position` and `normal` can be packed per record:
//! record `i` holds every member's item `i` contiguously, and the next record
//! starts one shared stride later. Members are placed inside the record with
//! a running cursor aligned to each member, and the record is rounded to 16.

use std::rc::Rc;

use crate::error::{LayoutError, LayoutResult};
use crate::foundation::math::{round_up, STRUCT_ALIGNMENT};
use crate::layout::codec;
use crate::layout::element::Element;
use crate::layout::types::{ShaderType, StructMember, StructType};
use crate::layout::value::FieldValue;

/// One member's placement inside a record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordMember {
    /// Field name of the member
    pub name: String,
    /// Shape of one item
    pub item: ShaderType,
    /// Byte offset inside the record
    pub offset: usize,
}

/// Shared record geometry of an interleave group
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLayout {
    group: String,
    members: Vec<RecordMember>,
    stride: usize,
    alignment: usize,
    count: usize,
    runtime_sized: bool,
}

impl RecordLayout {
    /// Compute the record layout for `members`, each given as
    /// `(field name, declared array type, value)`.
    ///
    /// Every member must be an array, and all members must agree on the
    /// item count (declared length, or value length for `array<T>`).
    pub fn new(group: impl Into<String>, members: &[(&str, &ShaderType, &FieldValue)]) -> LayoutResult<Self> {
        let group = group.into();
        if members.is_empty() {
            return Err(LayoutError::Layout(format!("interleave group '{}' has no members", group)));
        }

        let mut cursor = 0;
        let mut alignment = 0;
        let mut count = None;
        let mut runtime_sized = false;
        let mut laid_out = Vec::with_capacity(members.len());

        for (name, declared, value) in members {
            let ShaderType::Array { item, length } = declared else {
                return Err(LayoutError::mismatch(
                    *name,
                    format!("interleaved member of '{}' must be an array, got {}", group, declared),
                ));
            };

            let member_count = match length {
                Some(n) => *n,
                None => {
                    runtime_sized = true;
                    let slots = item.numeric_slots();
                    if value.is_empty() || value.len() % slots != 0 {
                        return Err(LayoutError::mismatch(
                            *name,
                            format!("{} numbers is not a whole number of {} items", value.len(), item),
                        ));
                    }
                    value.len() / slots
                }
            };

            match count {
                None => count = Some(member_count),
                Some(c) if c != member_count => {
                    return Err(LayoutError::mismatch(
                        *name,
                        format!(
                            "interleave group '{}' has {} records but this member has {}",
                            group, c, member_count
                        ),
                    ));
                }
                Some(_) => {}
            }

            let offset = round_up(cursor, item.alignment());
            cursor = offset + item.size();
            alignment = alignment.max(item.alignment());
            laid_out.push(RecordMember {
                name: (*name).to_string(),
                item: (**item).clone(),
                offset,
            });
        }

        Ok(Self {
            group,
            members: laid_out,
            stride: round_up(cursor, STRUCT_ALIGNMENT),
            alignment,
            count: count.unwrap_or(0),
            runtime_sized,
        })
    }

    /// Group name
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Shared record stride
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Start alignment of the group, the largest member alignment
    pub const fn alignment(&self) -> usize {
        self.alignment
    }

    /// Number of records
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Members in record order
    pub fn members(&self) -> &[RecordMember] {
        &self.members
    }

    /// Bytes occupied by all records
    pub const fn span(&self) -> usize {
        self.stride * self.count
    }

    /// Name of the emitted record struct: the group name in PascalCase
    pub fn record_struct_name(&self) -> String {
        self.group
            .split(|c: char| c == '_' || c == '-')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_uppercase().chain(chars).collect()
                })
            })
            .collect()
    }

    /// The record as a struct type, for declaration text
    pub fn record_struct(&self) -> StructType {
        StructType {
            name: self.record_struct_name(),
            members: self
                .members
                .iter()
                .map(|m| StructMember {
                    name: m.name.clone(),
                    ty: m.item.clone(),
                    offset: m.offset,
                })
                .collect(),
            alignment: self.alignment.max(STRUCT_ALIGNMENT),
            size: self.stride,
        }
    }

    /// The whole group as an array shape, `array<Record, N>` or `array<Record>`
    pub fn array_shape(&self) -> ShaderType {
        ShaderType::Array {
            item: Box::new(ShaderType::Struct(Rc::new(self.record_struct()))),
            length: (!self.runtime_sized).then_some(self.count),
        }
    }
}

/// One member field of an interleave group
#[derive(Debug, Clone)]
pub struct InterleavedArrayElement {
    record: Rc<RecordLayout>,
    member: usize,
    declared: ShaderType,
    resolved: ShaderType,
    group_start: usize,
}

impl InterleavedArrayElement {
    /// Create the element for member `name` of `record`
    pub fn new(record: Rc<RecordLayout>, name: &str, declared: ShaderType) -> LayoutResult<Self> {
        let member = record
            .members
            .iter()
            .position(|m| m.name == name)
            .ok_or_else(|| LayoutError::UnknownField(name.to_string()))?;
        let resolved = ShaderType::Array {
            item: Box::new(record.members[member].item.clone()),
            length: Some(record.count),
        };
        Ok(Self {
            record,
            member,
            declared,
            resolved,
            group_start: 0,
        })
    }

    /// Shared record geometry
    pub fn record(&self) -> &Rc<RecordLayout> {
        &self.record
    }

    /// Offset of this member inside each record
    pub fn member_offset(&self) -> usize {
        self.record.members[self.member].offset
    }

    /// Start of the whole group
    pub const fn group_start(&self) -> usize {
        self.group_start
    }

    fn member_item(&self) -> &ShaderType {
        &self.record.members[self.member].item
    }

    fn record_offset(&self, index: usize) -> LayoutResult<usize> {
        if index >= self.record.count {
            return Err(LayoutError::mismatch(
                self.name(),
                format!("record {} out of bounds for {} records", index, self.record.count),
            ));
        }
        Ok(self.group_start + index * self.record.stride + self.member_offset())
    }
}

impl Element for InterleavedArrayElement {
    fn name(&self) -> &str {
        &self.record.members[self.member].name
    }

    fn shader_type(&self) -> &ShaderType {
        &self.declared
    }

    fn value_shape(&self) -> &ShaderType {
        &self.resolved
    }

    fn alignment(&self) -> usize {
        self.member_item().alignment()
    }

    fn placement_alignment(&self) -> usize {
        self.record.alignment
    }

    fn size(&self) -> usize {
        self.record.span()
    }

    fn start_offset(&self) -> usize {
        self.group_start + self.member_offset()
    }

    fn place(&mut self, block_start: usize) {
        self.group_start = block_start;
    }

    fn byte_range(&self) -> std::ops::Range<usize> {
        self.group_start..self.group_start + self.record.span()
    }

    fn write(&self, buffer: &mut [u8], value: &FieldValue) -> LayoutResult<()> {
        let item_slots = self.member_item().numeric_slots();
        if value.len() != item_slots * self.record.count {
            return Err(LayoutError::mismatch(
                self.name(),
                format!("expected {} numbers, got {}", item_slots * self.record.count, value.len()),
            ));
        }
        for (index, chunk) in value.numbers().chunks(item_slots).enumerate() {
            codec::encode(self.member_item(), buffer, self.record_offset(index)?, chunk)?;
        }
        Ok(())
    }

    fn read(&self, buffer: &[u8]) -> LayoutResult<FieldValue> {
        let mut out = Vec::with_capacity(self.member_item().numeric_slots() * self.record.count);
        for index in 0..self.record.count {
            codec::decode(self.member_item(), buffer, self.record_offset(index)?, &mut out)?;
        }
        Ok(FieldValue::new(out))
    }

    fn item_count(&self) -> Option<usize> {
        Some(self.record.count)
    }

    fn item_slots(&self) -> usize {
        self.member_item().numeric_slots()
    }

    fn write_item(&self, buffer: &mut [u8], index: usize, value: &FieldValue) -> LayoutResult<()> {
        codec::encode(self.member_item(), buffer, self.record_offset(index)?, value.numbers()).map(|_| ())
    }

    fn read_item(&self, buffer: &[u8], index: usize) -> LayoutResult<FieldValue> {
        let mut out = Vec::with_capacity(self.member_item().numeric_slots());
        codec::decode(self.member_item(), buffer, self.record_offset(index)?, &mut out)?;
        Ok(FieldValue::new(out))
    }

    fn interleave_group(&self) -> Option<&str> {
        Some(self.record.group())
    }

    fn clone_box(&self) -> Box<dyn Element> {
        Box::new(self.clone())
    }
}
