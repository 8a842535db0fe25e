//! Bindings: declared fields laid out over one byte image
//!
//! A binding owns its host-side field values, the element strategy for every
//! field and the storage the values are serialized into. Mutations only mark
//! fields dirty; [`Binding::update`] re-serializes exactly the dirty ones.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use crate::binding::declaration::{BindingDescriptor, BindingKind, FieldDecl, PreWriteHook, ShaderStages};
use crate::binding::emit::{self, Declaration};
use crate::binding::storage::{BufferHandle, Reservation, Storage, UploadTarget};
use crate::config::LayoutConfig;
use crate::error::{LayoutError, LayoutResult};
use crate::layout::allocator::{FieldLayout, LayoutAllocator};
use crate::layout::array::ArrayElement;
use crate::layout::element::{Element, PlainElement};
use crate::layout::interleaved::{InterleavedArrayElement, RecordLayout};
use crate::layout::types::{ShaderType, StructMember, StructType, TypeRegistry};
use crate::layout::value::FieldValue;

/// Lifecycle of a binding's byte image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    /// Constructed; initial values not yet serialized
    LaidOut,
    /// Byte image matches every host-side value
    Clean,
    /// At least one field changed since the last update
    Dirty,
}

#[derive(Debug, Clone)]
struct Field {
    element: Box<dyn Element>,
    value: FieldValue,
    dirty: bool,
    dirty_items: BTreeSet<usize>,
    visibility: ShaderStages,
    hook: Option<PreWriteHook>,
    child: Option<usize>,
}

impl Field {
    fn needs_write(&self) -> bool {
        self.dirty || !self.dirty_items.is_empty()
    }

    fn item_shape(&self) -> Option<ShaderType> {
        match self.element.value_shape() {
            ShaderType::Array { item, .. } => Some((**item).clone()),
            _ => None,
        }
    }
}

/// A uniform or storage binding
#[derive(Debug)]
pub struct Binding {
    descriptor: BindingDescriptor,
    fields: Vec<Field>,
    index: HashMap<String, usize>,
    children: Vec<Binding>,
    records: Vec<Rc<RecordLayout>>,
    total_size: usize,
    alignment: usize,
    storage: Storage,
    state: BindingState,
    dirty: bool,
    needs_upload: bool,
}

impl Binding {
    /// Lay out `fields` and allocate an owned buffer for them.
    ///
    /// The buffer is `total_size` bytes, or the descriptor's capacity when
    /// that is larger. Initial values are serialized by the first
    /// [`Binding::update`].
    pub fn construct(
        descriptor: BindingDescriptor,
        fields: Vec<FieldDecl>,
        registry: &TypeRegistry,
        config: &LayoutConfig,
    ) -> LayoutResult<Self> {
        config.validate()?;
        let mut binding = Self::lay_out(descriptor, fields, registry, config)?;
        let capacity = binding.descriptor.capacity.unwrap_or(0);
        let storage = Storage::owned(&binding.descriptor.name, binding.total_size, capacity);
        binding.attach(storage)?;
        Ok(binding)
    }

    /// Compute the layout without attaching storage
    pub(crate) fn lay_out(
        descriptor: BindingDescriptor,
        decls: Vec<FieldDecl>,
        registry: &TypeRegistry,
        config: &LayoutConfig,
    ) -> LayoutResult<Self> {
        let mut seen = HashSet::new();
        for decl in &decls {
            if !seen.insert(decl.name.as_str()) {
                return Err(LayoutError::Layout(format!(
                    "field '{}' is declared twice in '{}'",
                    decl.name, descriptor.name
                )));
            }
        }

        let records = Self::interleave_groups(&descriptor, &decls, registry)?;
        Self::check_group_names(&descriptor, &decls, &records)?;

        let mut fields = Vec::with_capacity(decls.len());
        let mut children = Vec::new();
        for decl in decls {
            let FieldDecl {
                name,
                ty,
                value,
                visibility,
                hook,
                interleave,
                nested,
            } = decl;

            if let Some(nested) = nested {
                let child_descriptor = BindingDescriptor {
                    name: name.clone(),
                    struct_name: nested.struct_name,
                    kind: descriptor.kind,
                    group: descriptor.group,
                    binding: None,
                    capacity: None,
                };
                let child = Self::lay_out(child_descriptor, nested.fields, registry, config)?;
                let shape = ShaderType::Struct(Rc::new(child.struct_type()?));
                children.push(child);
                fields.push(Field {
                    element: Box::new(PlainElement::new(name, shape)),
                    value: FieldValue::default(),
                    dirty: false,
                    dirty_items: BTreeSet::new(),
                    visibility,
                    hook: None,
                    child: Some(children.len() - 1),
                });
                continue;
            }

            let shape = Self::parse_field(&descriptor, &name, &ty, registry)?;
            let element: Box<dyn Element> = match &interleave {
                Some(group) => {
                    let record = records
                        .iter()
                        .find(|r| r.group() == group)
                        .ok_or_else(|| LayoutError::Layout(format!("unknown interleave group '{}'", group)))?;
                    Box::new(InterleavedArrayElement::new(Rc::clone(record), &name, shape)?)
                }
                None if matches!(shape, ShaderType::Array { .. }) => Box::new(ArrayElement::new(&name, shape, &value)?),
                None => Box::new(PlainElement::new(&name, shape)),
            };
            let value = value.conform(&name, element.value_shape())?;

            fields.push(Field {
                element,
                value,
                dirty: true,
                dirty_items: BTreeSet::new(),
                visibility,
                hook,
                child: None,
            });
        }

        let mut allocator = LayoutAllocator::new();
        for field in &mut fields {
            allocator.place(field.element.as_mut())?;
        }

        let index = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.element.name().to_string(), i))
            .collect();

        let binding = Self {
            descriptor,
            fields,
            index,
            children,
            records,
            total_size: allocator.total_size(),
            alignment: allocator.max_alignment(),
            storage: Storage::Detached,
            state: BindingState::LaidOut,
            dirty: true,
            needs_upload: false,
        };

        log::debug!(
            "Laid out binding '{}' ({}): {} fields, {} bytes",
            binding.descriptor.name,
            binding.descriptor.struct_name,
            binding.fields.len(),
            binding.total_size
        );
        if config.log_layouts {
            for row in binding.layout() {
                log::debug!(
                    "  {:<16} offset {:>5}  size {:>5}  align {:>2}",
                    row.name,
                    row.offset,
                    row.size,
                    row.alignment
                );
            }
        }

        emit::check(&binding)?;
        Ok(binding)
    }

    /// Group members and record structs must not collide with field or struct names
    fn check_group_names(
        descriptor: &BindingDescriptor,
        decls: &[FieldDecl],
        records: &[Rc<RecordLayout>],
    ) -> LayoutResult<()> {
        for record in records {
            if let Some(decl) = decls.iter().find(|d| d.name == record.group()) {
                return Err(LayoutError::Layout(format!(
                    "field '{}' of '{}' has the same name as an interleave group",
                    decl.name, descriptor.name
                )));
            }

            let record_struct = record.record_struct_name();
            let nested = decls
                .iter()
                .filter_map(|d| d.nested.as_ref())
                .any(|n| n.struct_name == record_struct);
            if record_struct == descriptor.struct_name || nested {
                return Err(LayoutError::Layout(format!(
                    "record struct '{}' of group '{}' clashes with a struct of the same name",
                    record_struct,
                    record.group()
                )));
            }
        }
        Ok(())
    }

    fn parse_field(
        descriptor: &BindingDescriptor,
        name: &str,
        ty: &str,
        registry: &TypeRegistry,
    ) -> LayoutResult<ShaderType> {
        let shape = registry.parse(ty)?;
        if shape.is_runtime_sized() && !descriptor.kind.allows_runtime_arrays() {
            return Err(LayoutError::Layout(format!(
                "field '{}' of uniform binding '{}' cannot be a runtime-sized array",
                name, descriptor.name
            )));
        }
        Ok(shape)
    }

    /// Build one record layout per interleave group, in order of first appearance
    fn interleave_groups(
        descriptor: &BindingDescriptor,
        decls: &[FieldDecl],
        registry: &TypeRegistry,
    ) -> LayoutResult<Vec<Rc<RecordLayout>>> {
        let mut groups: Vec<(&str, Vec<(&str, ShaderType, &FieldValue)>)> = Vec::new();
        for decl in decls {
            let Some(group) = decl.interleave.as_deref() else {
                continue;
            };
            let shape = Self::parse_field(descriptor, &decl.name, &decl.ty, registry)?;
            let member = (decl.name.as_str(), shape, &decl.value);
            match groups.iter_mut().find(|(name, _)| *name == group) {
                Some((_, members)) => members.push(member),
                None => groups.push((group, vec![member])),
            }
        }

        groups
            .into_iter()
            .map(|(group, members)| {
                let refs: Vec<(&str, &ShaderType, &FieldValue)> =
                    members.iter().map(|(name, shape, value)| (*name, shape, *value)).collect();
                RecordLayout::new(group, &refs).map(Rc::new)
            })
            .collect()
    }

    /// Attach storage and route every nested child into its range
    pub(crate) fn attach(&mut self, storage: Storage) -> LayoutResult<()> {
        let handle = storage.handle()?;
        let base = storage.offset();
        self.storage = storage;
        for field in &self.fields {
            if let Some(i) = field.child {
                let child = &mut self.children[i];
                let offset = base + field.element.start_offset();
                child.attach(Storage::delegated(&handle, offset, child.total_size, None))?;
            }
        }
        Ok(())
    }

    /// Reserve a range of this binding's buffer for an offset child
    pub(crate) fn reserve(
        &mut self,
        len: usize,
        at: Option<usize>,
        config: &LayoutConfig,
    ) -> LayoutResult<(BufferHandle, Reservation)> {
        if !self.storage.is_owner() {
            return Err(LayoutError::Layout(format!(
                "'{}' does not own its buffer and cannot host offset children",
                self.descriptor.name
            )));
        }
        let handle = self.storage.handle()?;
        let before = handle.borrow().capacity();
        let reservation = handle
            .borrow_mut()
            .reserve(len, config.min_sub_allocation, at, config.allow_parent_growth)?;
        if handle.borrow().capacity() != before {
            self.needs_upload = true;
        }
        Ok((handle, reservation))
    }

    /// Members of the declared struct, in byte order. Interleave groups appear
    /// once, as an array of their record struct.
    pub(crate) fn declared_members(&self) -> Vec<StructMember> {
        let mut members = Vec::with_capacity(self.fields.len());
        let mut groups = HashSet::new();
        for field in &self.fields {
            let element = &field.element;
            match element.interleave_group() {
                Some(group) => {
                    if groups.insert(group) {
                        if let Some(record) = self.record(group) {
                            members.push(StructMember {
                                name: group.to_string(),
                                ty: record.array_shape(),
                                offset: element.byte_range().start,
                            });
                        }
                    }
                }
                None => members.push(StructMember {
                    name: element.name().to_string(),
                    ty: element.shader_type().clone(),
                    offset: element.start_offset(),
                }),
            }
        }
        members
    }

    /// This binding as a struct type, for embedding in a parent
    pub(crate) fn struct_type(&self) -> LayoutResult<StructType> {
        if self.fields.is_empty() {
            return Err(LayoutError::Layout(format!(
                "nested struct '{}' has no members",
                self.descriptor.struct_name
            )));
        }
        let members = self.declared_members();
        if let Some(member) = members.iter().find(|m| m.ty.is_runtime_sized()) {
            return Err(LayoutError::Layout(format!(
                "nested struct '{}' cannot contain runtime-sized '{}'",
                self.descriptor.struct_name, member.name
            )));
        }
        Ok(StructType {
            name: self.descriptor.struct_name.clone(),
            members,
            alignment: self.alignment,
            size: self.total_size,
        })
    }

    pub(crate) fn record(&self, group: &str) -> Option<&Rc<RecordLayout>> {
        self.records.iter().find(|r| r.group() == group)
    }

    /// Nested children in field order
    pub(crate) fn nested_children(&self) -> impl Iterator<Item = &Binding> {
        self.fields.iter().filter_map(|f| f.child.map(|i| &self.children[i]))
    }

    /// Interleave groups in order of first appearance
    pub(crate) fn records(&self) -> &[Rc<RecordLayout>] {
        &self.records
    }

    fn field(&self, name: &str) -> LayoutResult<&Field> {
        self.index
            .get(name)
            .map(|&i| &self.fields[i])
            .ok_or_else(|| LayoutError::UnknownField(name.to_string()))
    }

    fn field_mut(&mut self, name: &str) -> LayoutResult<&mut Field> {
        match self.index.get(name) {
            Some(&i) => Ok(&mut self.fields[i]),
            None => Err(LayoutError::UnknownField(name.to_string())),
        }
    }

    fn writable_field(&mut self, name: &str) -> LayoutResult<&mut Field> {
        let field = self.field_mut(name)?;
        if field.child.is_some() {
            return Err(LayoutError::mismatch(
                name,
                "nested struct; set its members through child_mut",
            ));
        }
        Ok(field)
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.state = BindingState::Dirty;
    }

    /// Replace a field's value.
    ///
    /// The value is checked against the declared shape and coerced to its
    /// numeric kinds; the byte image changes on the next [`Binding::update`].
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> LayoutResult<()> {
        let field = self.writable_field(name)?;
        let value = value.into().conform(name, field.element.value_shape())?;
        field.value = value;
        field.dirty = true;
        field.dirty_items.clear();
        self.mark_dirty();
        Ok(())
    }

    /// Replace item `index` of an array field. Only that item is rewritten.
    pub fn set_item(&mut self, name: &str, index: usize, value: impl Into<FieldValue>) -> LayoutResult<()> {
        let field = self.writable_field(name)?;
        let (Some(count), Some(item)) = (field.element.item_count(), field.item_shape()) else {
            return Err(LayoutError::mismatch(name, "not an array"));
        };
        if index >= count {
            return Err(LayoutError::mismatch(
                name,
                format!("item {} out of bounds for length {}", index, count),
            ));
        }

        let value = value.into().conform(name, &item)?;
        let slots = field.element.item_slots();
        field.value.replace_range(index * slots, &value);
        if !field.dirty {
            field.dirty_items.insert(index);
        }
        self.mark_dirty();
        Ok(())
    }

    /// Replace member `name` of record `index` in an interleave group
    pub fn set_record(&mut self, name: &str, index: usize, value: impl Into<FieldValue>) -> LayoutResult<()> {
        if self.field(name)?.element.interleave_group().is_none() {
            return Err(LayoutError::mismatch(name, "not an interleaved array member"));
        }
        self.set_item(name, index, value)
    }

    /// Replace an array field from a flat list of numbers, item after item
    pub fn set_value_from_list(&mut self, name: &str, values: impl Into<FieldValue>) -> LayoutResult<()> {
        if self.field(name)?.element.item_count().is_none() {
            return Err(LayoutError::mismatch(name, "not an array"));
        }
        self.set(name, values)
    }

    /// Re-serialize every dirty field, then recurse into nested children.
    ///
    /// On error the failed field and the binding stay dirty, so the next call
    /// retries. Fields written before the failure are not rewritten again.
    pub fn update(&mut self) -> LayoutResult<()> {
        let mut wrote = false;

        if self.dirty {
            for field in &mut self.fields {
                if !field.needs_write() {
                    continue;
                }

                // Hooks transform a copy; the host value stays as the caller set it
                let hooked = match &field.hook {
                    Some(hook) => {
                        let mut value = field.value.clone();
                        hook.run(&mut value);
                        Some(value.conform(field.element.name(), field.element.value_shape())?)
                    }
                    None => None,
                };
                let full = field.dirty || hooked.is_some();

                let element = &field.element;
                let value = hooked.as_ref().unwrap_or(&field.value);
                let items = &field.dirty_items;
                self.storage.write(|bytes| {
                    if full {
                        return element.write(bytes, value);
                    }
                    let slots = element.item_slots();
                    for &index in items {
                        element.write_item(bytes, index, &value.slice(index * slots..(index + 1) * slots))?;
                    }
                    Ok(())
                })?;

                log::trace!(
                    "Wrote '{}' at offset {} ({})",
                    field.element.name(),
                    self.storage.offset() + field.element.start_offset(),
                    if full { "full" } else { "items" }
                );
                field.dirty = false;
                field.dirty_items.clear();
                wrote = true;
            }
        }

        for child in &mut self.children {
            if child.is_dirty() {
                child.update()?;
                wrote = true;
            }
        }

        self.dirty = false;
        self.state = BindingState::Clean;
        if wrote {
            self.needs_upload = true;
        }
        Ok(())
    }

    /// Decode a field's current bytes
    pub fn read_field(&self, name: &str) -> LayoutResult<FieldValue> {
        let field = self.field(name)?;
        self.storage.read(|bytes| field.element.read(bytes))
    }

    /// Decode one item of an array field
    pub fn read_item(&self, name: &str, index: usize) -> LayoutResult<FieldValue> {
        let field = self.field(name)?;
        self.storage.read(|bytes| field.element.read_item(bytes, index))
    }

    /// Decode every field, in declaration order
    pub fn read_all(&self) -> LayoutResult<Vec<(String, FieldValue)>> {
        self.storage.read(|bytes| {
            self.fields
                .iter()
                .map(|f| -> LayoutResult<(String, FieldValue)> {
                    Ok((f.element.name().to_string(), f.element.read(bytes)?))
                })
                .collect()
        })
    }

    /// Copy bytes read back from the device into the image.
    ///
    /// Only `read_write` storage bindings accept read-back. Host values of
    /// clean fields are refreshed from the new bytes; pending writes win.
    /// Fields with a pre-write hook keep their host value, since their bytes
    /// hold the hook's output.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> LayoutResult<()> {
        if !self.descriptor.kind.is_writable() {
            return Err(LayoutError::Layout(format!(
                "'{}' is not read_write storage and cannot take read-back",
                self.descriptor.name
            )));
        }
        self.storage.write_raw(0, bytes)?;
        self.refresh_values()
    }

    fn refresh_values(&mut self) -> LayoutResult<()> {
        for field in &mut self.fields {
            if field.child.is_none() && field.hook.is_none() && !field.needs_write() {
                let element = &field.element;
                field.value = self.storage.read(|bytes| element.read(bytes))?;
            }
        }
        for child in &mut self.children {
            child.refresh_values()?;
        }
        Ok(())
    }

    /// Send the image to `target` if an update changed it since the last upload.
    /// Returns whether anything was sent.
    pub fn upload(&mut self, target: &mut dyn UploadTarget) -> LayoutResult<bool> {
        if !self.needs_upload() {
            return Ok(false);
        }
        self.storage.upload(target)?;
        self.mark_uploaded();
        Ok(true)
    }

    /// Clear the upload flag after the image was handed to the device
    pub fn mark_uploaded(&mut self) {
        self.needs_upload = false;
        for child in &mut self.children {
            child.mark_uploaded();
        }
    }

    /// Whether the image changed since the last upload, including writes a
    /// nested child made into this binding's range
    pub fn needs_upload(&self) -> bool {
        self.needs_upload || self.children.iter().any(Self::needs_upload)
    }

    /// Whether any field, here or in a nested child, awaits an update
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.children.iter().any(Self::is_dirty)
    }

    /// Whether one field awaits an update
    pub fn is_field_dirty(&self, name: &str) -> LayoutResult<bool> {
        let field = self.field(name)?;
        Ok(match field.child {
            Some(i) => self.children[i].is_dirty(),
            None => field.needs_write(),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> BindingState {
        match self.state {
            BindingState::Clean if self.is_dirty() => BindingState::Dirty,
            state => state,
        }
    }

    /// Structurally identical binding with independent owned storage.
    ///
    /// The layout is reused as is. `values` replace the current host values
    /// of the named fields; every field is serialized on the first update.
    pub fn clone_with_fresh_storage<I, S>(&self, values: I) -> LayoutResult<Self>
    where
        I: IntoIterator<Item = (S, FieldValue)>,
        S: AsRef<str>,
    {
        self.twin(None, values)
    }

    /// Fresh-storage copy, optionally under a new variable name
    pub(crate) fn twin<I, S>(&self, name: Option<&str>, values: I) -> LayoutResult<Self>
    where
        I: IntoIterator<Item = (S, FieldValue)>,
        S: AsRef<str>,
    {
        let mut twin = self.detached_copy();
        if let Some(name) = name {
            twin.descriptor.name = name.to_string();
            twin.descriptor.binding = None;
        }
        let capacity = if self.storage.is_owner() { self.buffer_size() } else { 0 };
        let storage = Storage::owned(&twin.descriptor.name, twin.total_size, capacity);
        twin.attach(storage)?;
        for (name, value) in values {
            twin.set(name.as_ref(), value)?;
        }
        Ok(twin)
    }

    fn detached_copy(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            fields: self
                .fields
                .iter()
                .map(|f| Field {
                    dirty: f.child.is_none(),
                    dirty_items: BTreeSet::new(),
                    ..f.clone()
                })
                .collect(),
            index: self.index.clone(),
            children: self.children.iter().map(Self::detached_copy).collect(),
            records: self.records.clone(),
            total_size: self.total_size,
            alignment: self.alignment,
            storage: Storage::Detached,
            state: BindingState::LaidOut,
            dirty: true,
            needs_upload: false,
        }
    }

    /// Struct and variable declaration text
    pub fn emit_declaration(&self) -> LayoutResult<Declaration> {
        emit::declaration(self)
    }

    /// Placement of every field, in declaration order
    pub fn layout(&self) -> Vec<FieldLayout> {
        self.fields.iter().map(|f| FieldLayout::of(f.element.as_ref())).collect()
    }

    /// Placement of one field
    pub fn field_layout(&self, name: &str) -> LayoutResult<FieldLayout> {
        self.field(name).map(|f| FieldLayout::of(f.element.as_ref()))
    }

    /// Host-side value of a field, as last set
    pub fn value(&self, name: &str) -> LayoutResult<&FieldValue> {
        self.field(name).map(|f| &f.value)
    }

    /// Field names in declaration order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.element.name())
    }

    /// Nested child binding behind a struct field
    pub fn child(&self, name: &str) -> Option<&Self> {
        let field = self.field(name).ok()?;
        field.child.map(|i| &self.children[i])
    }

    /// Mutable nested child binding behind a struct field
    pub fn child_mut(&mut self, name: &str) -> Option<&mut Self> {
        let i = self.field(name).ok()?.child?;
        self.children.get_mut(i)
    }

    /// Stages the field is visible to
    pub fn field_visibility(&self, name: &str) -> LayoutResult<ShaderStages> {
        self.field(name).map(|f| f.visibility)
    }

    /// Union of every field's visibility, nested children included
    pub fn visibility(&self) -> ShaderStages {
        let own = self.fields.iter().fold(ShaderStages::empty(), |acc, f| acc | f.visibility);
        self.children.iter().fold(own, |acc, c| acc | c.visibility())
    }

    /// Copy of this binding's bytes
    pub fn bytes(&self) -> LayoutResult<Vec<u8>> {
        self.storage.read(|bytes| Ok(bytes.to_vec()))
    }

    /// Copy of the whole physical buffer this binding writes into
    pub fn buffer_bytes(&self) -> LayoutResult<Vec<u8>> {
        let handle = self.storage.handle()?;
        let bytes = handle.borrow().bytes().to_vec();
        Ok(bytes)
    }

    /// Write raw bytes at `offset` inside this binding's range
    pub fn write_raw(&mut self, offset: usize, bytes: &[u8]) -> LayoutResult<()> {
        self.storage.write_raw(offset, bytes)?;
        self.needs_upload = true;
        Ok(())
    }

    /// Variable name
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Struct type name
    pub fn struct_name(&self) -> &str {
        &self.descriptor.struct_name
    }

    /// Declaration descriptor
    pub const fn descriptor(&self) -> &BindingDescriptor {
        &self.descriptor
    }

    pub(crate) fn descriptor_mut(&mut self) -> &mut BindingDescriptor {
        &mut self.descriptor
    }

    /// Address space
    pub const fn kind(&self) -> BindingKind {
        self.descriptor.kind
    }

    /// Bytes occupied by the fields, a multiple of 16
    pub const fn total_size(&self) -> usize {
        self.total_size
    }

    /// Struct alignment
    pub const fn alignment(&self) -> usize {
        self.alignment
    }

    /// Offset inside the physical buffer, zero for owners
    pub const fn offset(&self) -> usize {
        self.storage.offset()
    }

    /// Whether this binding owns its physical buffer
    pub const fn is_owner(&self) -> bool {
        self.storage.is_owner()
    }

    /// Size of the physical buffer
    pub fn buffer_size(&self) -> usize {
        self.storage
            .handle()
            .map_or(self.total_size, |handle| handle.borrow().capacity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::cell::Cell;

    fn build(kind: BindingKind, fields: Vec<FieldDecl>) -> LayoutResult<Binding> {
        Binding::construct(
            BindingDescriptor::new("data", "Data", kind),
            fields,
            &TypeRegistry::new(),
            &LayoutConfig::default(),
        )
    }

    #[test]
    fn test_construct_places_fields() {
        let binding = build(
            BindingKind::Uniform,
            vec![FieldDecl::new("a", "f32", 1.0_f32), FieldDecl::new("b", "vec3f", [1.0_f32, 2.0, 3.0])],
        )
        .unwrap();

        let rows = binding.layout();
        assert_eq!((rows[0].offset, rows[0].size), (0, 4));
        assert_eq!((rows[1].offset, rows[1].size), (16, 16));
        assert_eq!(binding.total_size(), 32);
        assert_eq!(binding.state(), BindingState::LaidOut);
    }

    #[test]
    fn test_update_serializes_initial_values() {
        let mut binding = build(
            BindingKind::Uniform,
            vec![FieldDecl::new("a", "f32", 1.0_f32), FieldDecl::new("b", "vec3f", [1.0_f32, 2.0, 3.0])],
        )
        .unwrap();
        binding.update().unwrap();

        let bytes = binding.bytes().unwrap();
        assert_relative_eq!(bytemuck::pod_read_unaligned::<f32>(&bytes[0..4]), 1.0);
        assert_relative_eq!(bytemuck::pod_read_unaligned::<f32>(&bytes[24..28]), 3.0);
        assert_eq!(binding.state(), BindingState::Clean);
        assert!(binding.needs_upload());
    }

    #[test]
    fn test_set_rejects_wrong_shape() {
        let mut binding = build(BindingKind::Uniform, vec![FieldDecl::new("b", "vec3f", [0.0_f32; 3])]).unwrap();
        assert!(binding.set("b", [1.0_f32, 2.0]).unwrap_err().is_type_mismatch());
        assert!(binding.set("b", [1_i32, 2, 3]).is_ok());
        assert!(matches!(binding.set("nope", 1.0_f32), Err(LayoutError::UnknownField(_))));
    }

    #[test]
    fn test_duplicate_field_names() {
        let err = build(
            BindingKind::Uniform,
            vec![FieldDecl::new("a", "f32", 0.0_f32), FieldDecl::new("a", "u32", 0_u32)],
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::Layout(_)));
    }

    #[test]
    fn test_uniform_rejects_runtime_array() {
        let err = build(BindingKind::Uniform, vec![FieldDecl::new("xs", "array<f32>", vec![1.0_f32])]).unwrap_err();
        assert!(matches!(err, LayoutError::Layout(_)));

        let binding = build(BindingKind::Storage, vec![FieldDecl::new("xs", "array<f32>", vec![1.0_f32, 2.0, 3.0])])
            .unwrap();
        assert_eq!(binding.total_size(), 48);
    }

    #[test]
    fn test_update_on_clean_binding_writes_nothing() {
        let mut binding = build(BindingKind::Uniform, vec![FieldDecl::new("a", "f32", 1.0_f32)]).unwrap();
        binding.update().unwrap();
        binding.mark_uploaded();

        binding.update().unwrap();
        assert!(!binding.needs_upload());
    }

    #[test]
    fn test_hook_runs_before_write() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mut binding = build(
            BindingKind::Uniform,
            vec![FieldDecl::new("t", "f32", 1.0_f32).with_hook(move |value| {
                counter.set(counter.get() + 1);
                let doubled = value.as_f32().unwrap_or(0.0) * 2.0;
                *value = FieldValue::from(doubled);
            })],
        )
        .unwrap();

        binding.update().unwrap();
        assert_relative_eq!(binding.read_field("t").unwrap().as_f32().unwrap(), 2.0);
        binding.update().unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_failed_update_retries_only_dirty_fields() {
        let broken = Rc::new(Cell::new(true));
        let flag = Rc::clone(&broken);
        let mut binding = build(
            BindingKind::Uniform,
            vec![
                FieldDecl::new("ok", "f32", 1.0_f32),
                FieldDecl::new("bad", "vec2f", [3.0_f32, 4.0]).with_hook(move |value| {
                    if flag.get() {
                        *value = FieldValue::floats(&[1.0]);
                    }
                }),
            ],
        )
        .unwrap();

        assert!(binding.update().unwrap_err().is_type_mismatch());
        assert!(binding.is_dirty());
        assert!(binding.is_field_dirty("bad").unwrap());
        assert!(!binding.is_field_dirty("ok").unwrap());
        assert!(binding.update().is_err());

        // A retry must leave the already written field alone
        binding.write_raw(0, &9.0_f32.to_ne_bytes()).unwrap();
        broken.set(false);
        binding.update().unwrap();

        assert!(!binding.is_dirty());
        assert_eq!(binding.state(), BindingState::Clean);
        assert_relative_eq!(binding.read_field("ok").unwrap().as_f32().unwrap(), 9.0);
        assert_eq!(binding.read_field("bad").unwrap().to_f32s(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_hook_sees_host_value_on_every_write() {
        let mut binding = build(
            BindingKind::Uniform,
            vec![FieldDecl::new("w", "array<f32, 2>", vec![1.0_f32, 2.0]).with_hook(|value| {
                *value = FieldValue::floats(&value.to_f32s().iter().map(|v| v * 2.0).collect::<Vec<_>>());
            })],
        )
        .unwrap();
        binding.update().unwrap();
        assert_eq!(binding.read_field("w").unwrap().to_f32s(), vec![2.0, 4.0]);

        binding.set_item("w", 0, 5.0_f32).unwrap();
        binding.update().unwrap();
        assert_eq!(binding.read_field("w").unwrap().to_f32s(), vec![10.0, 4.0]);
        assert_eq!(binding.value("w").unwrap().to_f32s(), vec![5.0, 2.0]);
    }

    #[test]
    fn test_group_name_clashes_with_field() {
        let err = build(
            BindingKind::Storage,
            vec![
                FieldDecl::new("vertices", "u32", 2_u32),
                FieldDecl::new("position", "array<vec3f, 2>", vec![0.0_f32; 6]).interleaved("vertices"),
                FieldDecl::new("normal", "array<vec4f, 2>", vec![0.0_f32; 8]).interleaved("vertices"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, LayoutError::Layout(_)));
    }

    #[test]
    fn test_record_struct_clashes_with_binding_struct() {
        let result = Binding::construct(
            BindingDescriptor::storage("mesh", "Vertices", false),
            vec![
                FieldDecl::new("position", "array<vec3f, 2>", vec![0.0_f32; 6]).interleaved("vertices"),
                FieldDecl::new("normal", "array<vec4f, 2>", vec![0.0_f32; 8]).interleaved("vertices"),
            ],
            &TypeRegistry::new(),
            &LayoutConfig::default(),
        );
        assert!(matches!(result, Err(LayoutError::Layout(_))));

        let result = build(
            BindingKind::Storage,
            vec![
                FieldDecl::new("position", "array<vec3f, 2>", vec![0.0_f32; 6]).interleaved("vertices"),
                FieldDecl::nested("extra", "Vertices", vec![FieldDecl::new("n", "u32", 0_u32)]),
            ],
        );
        assert!(matches!(result, Err(LayoutError::Layout(_))));
    }

    #[test]
    fn test_set_item_rewrites_only_that_item() {
        let mut binding = build(
            BindingKind::Uniform,
            vec![FieldDecl::new("w", "array<f32, 4>", vec![0.0_f32, 1.0, 2.0, 3.0])],
        )
        .unwrap();
        binding.update().unwrap();
        let before = binding.bytes().unwrap();

        binding.set_item("w", 2, 9.0_f32).unwrap();
        binding.update().unwrap();
        let after = binding.bytes().unwrap();

        let changed: Vec<usize> = (0..after.len()).filter(|i| after[*i] != before[*i]).collect();
        assert!(!changed.is_empty());
        assert!(changed.iter().all(|i| (32..36).contains(i)));
        assert_eq!(binding.value("w").unwrap().to_f32s(), vec![0.0, 1.0, 9.0, 3.0]);
        assert!(binding.set_item("w", 4, 1.0_f32).unwrap_err().is_type_mismatch());
    }

    #[test]
    fn test_nested_child_writes_inside_parent() {
        let mut parent = build(
            BindingKind::Uniform,
            vec![
                FieldDecl::new("time", "f32", 0.0_f32),
                FieldDecl::nested(
                    "light",
                    "Light",
                    vec![
                        FieldDecl::new("intensity", "f32", 0.5_f32),
                        FieldDecl::new("color", "vec3f", [1.0_f32, 1.0, 1.0]),
                    ],
                ),
            ],
        )
        .unwrap();

        assert_eq!(parent.field_layout("light").unwrap().offset, 16);
        assert_eq!(parent.total_size(), 48);

        parent.update().unwrap();
        parent.child_mut("light").unwrap().set("intensity", 4.0_f32).unwrap();
        assert!(parent.is_dirty());
        assert_eq!(parent.state(), BindingState::Dirty);
        parent.update().unwrap();

        let bytes = parent.bytes().unwrap();
        assert_relative_eq!(bytemuck::pod_read_unaligned::<f32>(&bytes[16..20]), 4.0);
        let light = parent.read_field("light").unwrap().to_f32s();
        assert_eq!(light, vec![4.0, 1.0, 1.0, 1.0]);
        assert!(parent.set("light", 1.0_f32).unwrap_err().is_type_mismatch());
    }

    #[test]
    fn test_child_update_flags_parent_for_upload() {
        #[derive(Default)]
        struct Sink(Vec<(usize, Vec<u8>)>);

        impl UploadTarget for Sink {
            fn write_buffer(&mut self, _label: &str, offset: usize, bytes: &[u8]) {
                self.0.push((offset, bytes.to_vec()));
            }
        }

        let mut parent = build(
            BindingKind::Uniform,
            vec![
                FieldDecl::new("time", "f32", 0.0_f32),
                FieldDecl::nested("light", "Light", vec![FieldDecl::new("intensity", "f32", 1.0_f32)]),
            ],
        )
        .unwrap();
        parent.update().unwrap();
        let mut sink = Sink::default();
        assert!(parent.upload(&mut sink).unwrap());
        assert!(!parent.needs_upload());

        let light = parent.child_mut("light").unwrap();
        light.set("intensity", 4.0_f32).unwrap();
        light.update().unwrap();

        assert!(parent.needs_upload());
        assert!(parent.upload(&mut sink).unwrap());
        let (offset, bytes) = sink.0.last().unwrap();
        assert_eq!(*offset, 0);
        assert_relative_eq!(bytemuck::pod_read_unaligned::<f32>(&bytes[16..20]), 4.0);
        assert!(!parent.needs_upload());
        assert!(!parent.upload(&mut sink).unwrap());
    }

    #[test]
    fn test_load_bytes_requires_writable_storage() {
        let mut uniform = build(BindingKind::Uniform, vec![FieldDecl::new("a", "f32", 0.0_f32)]).unwrap();
        assert!(matches!(uniform.load_bytes(&[0; 16]), Err(LayoutError::Layout(_))));

        let mut output = build(BindingKind::StorageReadWrite, vec![FieldDecl::new("sum", "u32", 0_u32)]).unwrap();
        output.update().unwrap();
        let mut image = vec![0u8; 16];
        image[0..4].copy_from_slice(&42_u32.to_ne_bytes());
        output.load_bytes(&image).unwrap();

        assert_eq!(output.read_field("sum").unwrap().to_u32s(), Some(vec![42]));
        assert_eq!(output.value("sum").unwrap().to_u32s(), Some(vec![42]));
        assert!(matches!(output.load_bytes(&[0; 32]), Err(LayoutError::Range { .. })));
    }

    #[test]
    fn test_clone_with_fresh_storage_is_independent() {
        let mut binding = build(BindingKind::Uniform, vec![FieldDecl::new("a", "f32", 1.0_f32)]).unwrap();
        binding.update().unwrap();

        let mut twin = binding.clone_with_fresh_storage([("a", FieldValue::from(5.0_f32))]).unwrap();
        twin.update().unwrap();

        assert_relative_eq!(binding.read_field("a").unwrap().as_f32().unwrap(), 1.0);
        assert_relative_eq!(twin.read_field("a").unwrap().as_f32().unwrap(), 5.0);
        assert_eq!(twin.layout(), binding.layout());
    }

    #[test]
    fn test_visibility_union() {
        let binding = build(
            BindingKind::Uniform,
            vec![
                FieldDecl::new("a", "f32", 0.0_f32).with_visibility(ShaderStages::VERTEX),
                FieldDecl::new("b", "f32", 0.0_f32).with_visibility(ShaderStages::FRAGMENT),
            ],
        )
        .unwrap();
        assert_eq!(binding.visibility(), ShaderStages::VERTEX | ShaderStages::FRAGMENT);
        assert_eq!(binding.field_visibility("a").unwrap(), ShaderStages::VERTEX);
    }
}
