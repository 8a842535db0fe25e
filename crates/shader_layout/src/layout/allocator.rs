//! Sequential layout allocation
//!
//! Walks elements in declaration order over a running cursor. Members of an
//! interleave group share one block: the first member places it, later
//! members join it without advancing the cursor.

use std::collections::HashMap;

use crate::error::{LayoutError, LayoutResult};
use crate::foundation::math::{is_aligned, round_up, STRUCT_ALIGNMENT};
use crate::layout::element::Element;

/// Placement of one field, as reported to collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    /// Field name
    pub name: String,
    /// Byte offset of the first slot
    pub offset: usize,
    /// Bytes occupied by the field's block
    pub size: usize,
    /// Base alignment of the offset
    pub alignment: usize,
}

impl FieldLayout {
    /// Layout row for a placed element
    pub fn of(element: &dyn Element) -> Self {
        Self {
            name: element.name().to_string(),
            offset: element.start_offset(),
            size: element.size(),
            alignment: element.alignment(),
        }
    }
}

/// Running-cursor allocator
#[derive(Debug, Default)]
pub struct LayoutAllocator {
    cursor: usize,
    max_alignment: usize,
    group_starts: HashMap<String, usize>,
}

impl LayoutAllocator {
    /// Start an allocation at offset zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Place one element and advance the cursor. Returns the element's block start.
    pub fn place(&mut self, element: &mut dyn Element) -> LayoutResult<usize> {
        let block_start = round_up(self.cursor, element.placement_alignment());

        match element.interleave_group().map(str::to_owned) {
            Some(group) => match self.group_starts.get(&group) {
                Some(&start) => {
                    element.place(start);
                    self.check(element)?;
                    return Ok(start);
                }
                None => {
                    self.group_starts.insert(group, block_start);
                    self.cursor = element.set_alignment(self.cursor);
                }
            },
            None => self.cursor = element.set_alignment(self.cursor),
        }

        self.max_alignment = self.max_alignment.max(element.placement_alignment());
        self.check(element)?;
        Ok(block_start)
    }

    fn check(&self, element: &dyn Element) -> LayoutResult<()> {
        if !is_aligned(element.start_offset(), element.alignment()) {
            return Err(LayoutError::Layout(format!(
                "field '{}' at offset {} violates its {}-byte alignment",
                element.name(),
                element.start_offset(),
                element.alignment()
            )));
        }
        Ok(())
    }

    /// Cursor position after everything placed so far
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Largest block alignment seen, at least 16
    pub fn max_alignment(&self) -> usize {
        self.max_alignment.max(STRUCT_ALIGNMENT)
    }

    /// Total size: the cursor rounded up to 16
    pub const fn total_size(&self) -> usize {
        round_up(self.cursor, STRUCT_ALIGNMENT)
    }

    /// Place every element in order and return the total size
    pub fn allocate(elements: &mut [Box<dyn Element>]) -> LayoutResult<usize> {
        let mut allocator = Self::new();
        for element in elements.iter_mut() {
            allocator.place(element.as_mut())?;
        }
        Ok(allocator.total_size())
    }
}

/// Layout rows for a placed element list, in declaration order
pub fn describe(elements: &[Box<dyn Element>]) -> Vec<FieldLayout> {
    elements
        .iter()
        .map(|element| FieldLayout::of(element.as_ref()))
        .collect()
}
