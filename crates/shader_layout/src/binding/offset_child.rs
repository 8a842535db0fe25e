//! Bindings sub-allocated inside another binding's buffer

use std::ops::{Deref, DerefMut};

use crate::binding::binding::Binding;
use crate::binding::declaration::{BindingDescriptor, FieldDecl};
use crate::binding::storage::Storage;
use crate::config::LayoutConfig;
use crate::error::LayoutResult;
use crate::layout::types::TypeRegistry;

/// Where an offset child lands in its parent's buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Next free granularity boundary after the parent's fields and earlier children
    Bindable,
    /// Explicit offset, a multiple of the sub-allocation granularity
    At(usize),
}

/// A binding whose bytes live in a range of an owning parent's buffer.
///
/// The child is independently bindable at its offset. All writes go through
/// the parent's buffer and stay inside `[offset, offset + total_size)`. The
/// reserved range returns to the parent when the child is dropped.
#[derive(Debug)]
pub struct OffsetChild {
    binding: Binding,
}

impl OffsetChild {
    /// Lay out `fields` and reserve a range for them inside `parent`.
    ///
    /// Fails with a layout error when the parent does not own its buffer, an
    /// explicit offset is misaligned or overlaps, or the range does not fit
    /// and the parent may not grow.
    pub fn attach(
        parent: &mut Binding,
        descriptor: BindingDescriptor,
        fields: Vec<FieldDecl>,
        registry: &TypeRegistry,
        config: &LayoutConfig,
        placement: Placement,
    ) -> LayoutResult<Self> {
        config.validate()?;
        let mut binding = Binding::lay_out(descriptor, fields, registry, config)?;
        let at = match placement {
            Placement::Bindable => None,
            Placement::At(offset) => Some(offset),
        };
        let (handle, reservation) = parent.reserve(binding.total_size(), at, config)?;
        binding.attach(Storage::delegated(
            &handle,
            reservation.offset,
            reservation.len,
            Some(reservation.id),
        ))?;

        log::debug!(
            "Attached '{}' to '{}' at offset {} ({} bytes)",
            binding.name(),
            parent.name(),
            reservation.offset,
            reservation.len
        );
        Ok(Self { binding })
    }

    /// Attach at the next free boundary
    pub fn bindable(
        parent: &mut Binding,
        descriptor: BindingDescriptor,
        fields: Vec<FieldDecl>,
        registry: &TypeRegistry,
        config: &LayoutConfig,
    ) -> LayoutResult<Self> {
        Self::attach(parent, descriptor, fields, registry, config, Placement::Bindable)
    }

    /// Attach at an explicit offset
    pub fn at_offset(
        parent: &mut Binding,
        offset: usize,
        descriptor: BindingDescriptor,
        fields: Vec<FieldDecl>,
        registry: &TypeRegistry,
        config: &LayoutConfig,
    ) -> LayoutResult<Self> {
        Self::attach(parent, descriptor, fields, registry, config, Placement::At(offset))
    }

    /// The child's binding
    pub const fn binding(&self) -> &Binding {
        &self.binding
    }

    /// Unwrap into the binding. The reservation lives as long as it does.
    pub fn into_binding(self) -> Binding {
        self.binding
    }
}

impl Deref for OffsetChild {
    type Target = Binding;

    fn deref(&self) -> &Binding {
        &self.binding
    }
}

impl DerefMut for OffsetChild {
    fn deref_mut(&mut self) -> &mut Binding {
        &mut self.binding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LayoutError;
    use approx::assert_relative_eq;

    fn parent(capacity: usize) -> Binding {
        Binding::construct(
            BindingDescriptor::uniform("frame", "Frame").with_capacity(capacity),
            vec![FieldDecl::new("time", "f32", 0.0_f32)],
            &TypeRegistry::new(),
            &LayoutConfig::default(),
        )
        .unwrap()
    }

    fn decls() -> Vec<FieldDecl> {
        vec![FieldDecl::new("scale", "f32", 0.0_f32)]
    }

    #[test]
    fn test_bindable_child_rounds_to_granularity() {
        let mut frame = parent(1024);
        let registry = TypeRegistry::new();
        let config = LayoutConfig::default();

        let first = OffsetChild::bindable(&mut frame, BindingDescriptor::uniform("a", "A"), decls(), &registry, &config)
            .unwrap();
        let second =
            OffsetChild::bindable(&mut frame, BindingDescriptor::uniform("b", "B"), decls(), &registry, &config)
                .unwrap();

        assert_eq!(first.offset(), 256);
        assert_eq!(second.offset(), 512);
        assert!(!first.is_owner());
        assert_eq!(frame.buffer_size(), 1024);
    }

    #[test]
    fn test_child_writes_route_through_parent() {
        let mut frame = parent(1024);
        let mut child = OffsetChild::at_offset(
            &mut frame,
            256,
            BindingDescriptor::uniform("light", "Light"),
            decls(),
            &TypeRegistry::new(),
            &LayoutConfig::default(),
        )
        .unwrap();

        child.set("scale", 7.5_f32).unwrap();
        child.update().unwrap();

        let bytes = frame.buffer_bytes().unwrap();
        assert_relative_eq!(bytemuck::pod_read_unaligned::<f32>(&bytes[256..260]), 7.5);
        assert_relative_eq!(child.read_field("scale").unwrap().as_f32().unwrap(), 7.5);
    }

    #[test]
    fn test_write_outside_reserved_range() {
        let mut frame = parent(1024);
        let mut child =
            OffsetChild::bindable(&mut frame, BindingDescriptor::uniform("c", "C"), decls(), &TypeRegistry::new(), &LayoutConfig::default())
                .unwrap();

        assert!(child.write_raw(12, &[0; 4]).is_ok());
        let err = child.write_raw(16, &[0; 4]).unwrap_err();
        assert!(matches!(err, LayoutError::Range { .. }));
    }

    #[test]
    fn test_explicit_offset_rules() {
        let mut frame = parent(1024);
        let registry = TypeRegistry::new();
        let config = LayoutConfig::default();

        let misaligned =
            OffsetChild::at_offset(&mut frame, 100, BindingDescriptor::uniform("c", "C"), decls(), &registry, &config);
        assert!(matches!(misaligned, Err(LayoutError::Layout(_))));

        let overlapping =
            OffsetChild::at_offset(&mut frame, 0, BindingDescriptor::uniform("c", "C"), decls(), &registry, &config);
        assert!(matches!(overlapping, Err(LayoutError::Layout(_))));
    }

    #[test]
    fn test_parent_growth() {
        let registry = TypeRegistry::new();

        let mut fixed = parent(256);
        let config = LayoutConfig::default().with_parent_growth(false);
        let err = OffsetChild::bindable(&mut fixed, BindingDescriptor::uniform("c", "C"), decls(), &registry, &config)
            .unwrap_err();
        assert!(matches!(err, LayoutError::Layout(_)));

        let mut growing = parent(256);
        let child = OffsetChild::bindable(
            &mut growing,
            BindingDescriptor::uniform("c", "C"),
            decls(),
            &registry,
            &LayoutConfig::default(),
        )
        .unwrap();
        assert_eq!(child.offset(), 256);
        assert_eq!(growing.buffer_size(), 272);
        assert!(growing.needs_upload());
    }

    #[test]
    fn test_child_cannot_host_children() {
        let mut frame = parent(1024);
        let registry = TypeRegistry::new();
        let config = LayoutConfig::default();
        let mut child =
            OffsetChild::bindable(&mut frame, BindingDescriptor::uniform("c", "C"), decls(), &registry, &config)
                .unwrap();

        let err = OffsetChild::bindable(&mut child, BindingDescriptor::uniform("d", "D"), decls(), &registry, &config)
            .unwrap_err();
        assert!(matches!(err, LayoutError::Layout(_)));
    }

    #[test]
    fn test_dropping_child_releases_range() {
        let mut frame = parent(1024);
        let registry = TypeRegistry::new();
        let config = LayoutConfig::default();

        let child = OffsetChild::at_offset(&mut frame, 256, BindingDescriptor::uniform("c", "C"), decls(), &registry, &config)
            .unwrap();
        drop(child);

        assert!(
            OffsetChild::at_offset(&mut frame, 256, BindingDescriptor::uniform("c", "C"), decls(), &registry, &config)
                .is_ok()
        );
    }
}
