//! Declaration input: fields, visibility, hooks and binding descriptors

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::layout::value::FieldValue;

bitflags::bitflags! {
    /// Shader stages a field or binding is visible to.
    ///
    /// Combine with bitwise OR: `ShaderStages::VERTEX | ShaderStages::FRAGMENT`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStages: u8 {
        /// Vertex stage
        const VERTEX = 1 << 0;
        /// Fragment stage
        const FRAGMENT = 1 << 1;
        /// Compute stage
        const COMPUTE = 1 << 2;
    }
}

/// Callback run on a field's value right before it is serialized
#[derive(Clone)]
pub struct PreWriteHook(Rc<dyn Fn(&mut FieldValue)>);

impl PreWriteHook {
    /// Wrap a closure
    pub fn new(hook: impl Fn(&mut FieldValue) + 'static) -> Self {
        Self(Rc::new(hook))
    }

    /// Run the hook on `value`
    pub fn run(&self, value: &mut FieldValue) {
        (self.0)(value);
    }
}

impl fmt::Debug for PreWriteHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PreWriteHook")
    }
}

/// Nested struct member backed by its own child binding
#[derive(Debug, Clone)]
pub(crate) struct NestedDecl {
    pub(crate) struct_name: String,
    pub(crate) fields: Vec<FieldDecl>,
}

/// One declared field
#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub(crate) name: String,
    pub(crate) ty: String,
    pub(crate) value: FieldValue,
    pub(crate) visibility: ShaderStages,
    pub(crate) hook: Option<PreWriteHook>,
    pub(crate) interleave: Option<String>,
    pub(crate) nested: Option<NestedDecl>,
}

impl FieldDecl {
    /// Declare a field of symbolic type `ty` with its initial value
    pub fn new(name: impl Into<String>, ty: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            value: value.into(),
            visibility: ShaderStages::all(),
            hook: None,
            interleave: None,
            nested: None,
        }
    }

    /// Declare a struct member whose members are managed by a child binding
    pub fn nested(name: impl Into<String>, struct_name: impl Into<String>, fields: Vec<FieldDecl>) -> Self {
        let struct_name = struct_name.into();
        Self {
            name: name.into(),
            ty: struct_name.clone(),
            value: FieldValue::default(),
            visibility: ShaderStages::all(),
            hook: None,
            interleave: None,
            nested: Some(NestedDecl { struct_name, fields }),
        }
    }

    /// Restrict the stages the field is visible to
    pub fn with_visibility(mut self, stages: ShaderStages) -> Self {
        self.visibility = stages;
        self
    }

    /// Run `hook` on the value before every write-back
    pub fn with_hook(mut self, hook: impl Fn(&mut FieldValue) + 'static) -> Self {
        self.hook = Some(PreWriteHook::new(hook));
        self
    }

    /// Pack this array per record together with the other members of `group`
    pub fn interleaved(mut self, group: impl Into<String>) -> Self {
        self.interleave = Some(group.into());
        self
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Symbolic type name
    pub fn type_name(&self) -> &str {
        &self.ty
    }

    /// Initial value
    pub const fn value(&self) -> &FieldValue {
        &self.value
    }

    /// Visibility tag
    pub const fn visibility(&self) -> ShaderStages {
        self.visibility
    }
}

/// Address space of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BindingKind {
    /// `var<uniform>`
    #[default]
    Uniform,
    /// `var<storage, read>`
    Storage,
    /// `var<storage, read_write>`, the only kind that accepts device read-back
    StorageReadWrite,
}

impl BindingKind {
    /// WGSL address space text inside `var<...>`
    pub const fn address_space(self) -> &'static str {
        match self {
            Self::Uniform => "uniform",
            Self::Storage => "storage, read",
            Self::StorageReadWrite => "storage, read_write",
        }
    }

    /// Whether runtime-sized arrays are allowed
    pub const fn allows_runtime_arrays(self) -> bool {
        !matches!(self, Self::Uniform)
    }

    /// Whether the device may write results back into this binding
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::StorageReadWrite)
    }
}

/// How a binding appears in the shader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingDescriptor {
    /// Variable name
    pub name: String,
    /// Struct type name
    pub struct_name: String,
    /// Address space
    pub kind: BindingKind,
    /// `@group` index
    pub group: u32,
    /// `@binding` index, assigned by a [`crate::binding::BindingSet`] when `None`
    pub binding: Option<u32>,
    /// Minimum physical buffer size, leaving room for offset children
    pub capacity: Option<usize>,
}

impl BindingDescriptor {
    /// Describe a binding of `kind`
    pub fn new(name: impl Into<String>, struct_name: impl Into<String>, kind: BindingKind) -> Self {
        Self {
            name: name.into(),
            struct_name: struct_name.into(),
            kind,
            group: 0,
            binding: None,
            capacity: None,
        }
    }

    /// Describe a uniform binding
    pub fn uniform(name: impl Into<String>, struct_name: impl Into<String>) -> Self {
        Self::new(name, struct_name, BindingKind::Uniform)
    }

    /// Describe a storage binding
    pub fn storage(name: impl Into<String>, struct_name: impl Into<String>, read_write: bool) -> Self {
        let kind = if read_write {
            BindingKind::StorageReadWrite
        } else {
            BindingKind::Storage
        };
        Self::new(name, struct_name, kind)
    }

    /// Set the `@group` index
    pub fn with_group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }

    /// Set the `@binding` index
    pub fn with_binding(mut self, binding: u32) -> Self {
        self.binding = Some(binding);
        self
    }

    /// Reserve at least `bytes` of physical buffer
    pub fn with_capacity(mut self, bytes: usize) -> Self {
        self.capacity = Some(bytes);
        self
    }
}
