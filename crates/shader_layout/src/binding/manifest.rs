//! Binding declarations loaded from TOML or RON manifests
//!
//! A manifest carries everything a [`FieldDecl`] does except pre-write hooks.
//!
//! ```toml
//! name = "params"
//! struct_name = "Params"
//! kind = "uniform"
//!
//! [[fields]]
//! name = "time"
//! type = "f32"
//! value = [0.0]
//! visibility = ["vertex", "fragment"]
//! ```

use serde::{Deserialize, Serialize};

use crate::binding::binding::Binding;
use crate::binding::declaration::{BindingDescriptor, BindingKind, FieldDecl, ShaderStages};
use crate::config::{Config, LayoutConfig};
use crate::error::LayoutResult;
use crate::layout::types::TypeRegistry;
use crate::layout::value::FieldValue;

/// Shader stage names accepted in manifests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Vertex stage
    Vertex,
    /// Fragment stage
    Fragment,
    /// Compute stage
    Compute,
}

impl From<Stage> for ShaderStages {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Vertex => Self::VERTEX,
            Stage::Fragment => Self::FRAGMENT,
            Stage::Compute => Self::COMPUTE,
        }
    }
}

/// One field entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FieldManifest {
    /// Field name
    pub name: String,
    /// Symbolic type name; the struct name for nested members
    #[serde(rename = "type")]
    pub ty: String,
    /// Initial value as a flat list. Empty means all zeros.
    pub value: Vec<f64>,
    /// Stages the field is visible to. Empty means all stages.
    pub visibility: Vec<Stage>,
    /// Interleave group
    pub interleave: Option<String>,
    /// Members of a nested struct; `type` names the struct
    pub fields: Vec<FieldManifest>,
}

impl FieldManifest {
    fn visibility(&self) -> ShaderStages {
        if self.visibility.is_empty() {
            return ShaderStages::all();
        }
        self.visibility
            .iter()
            .fold(ShaderStages::empty(), |acc, stage| acc | ShaderStages::from(*stage))
    }

    /// Convert into a declaration, coercing numbers to the declared kinds
    pub fn to_decl(&self, registry: &TypeRegistry) -> LayoutResult<FieldDecl> {
        if !self.fields.is_empty() {
            let members = self
                .fields
                .iter()
                .map(|f| f.to_decl(registry))
                .collect::<LayoutResult<Vec<_>>>()?;
            return Ok(FieldDecl::nested(&self.name, &self.ty, members).with_visibility(self.visibility()));
        }

        let shape = registry.parse(&self.ty)?;
        let value = if self.value.is_empty() {
            FieldValue::from_f64s(&self.name, &vec![0.0; shape.numeric_slots()], &shape)?
        } else {
            FieldValue::from_f64s(&self.name, &self.value, &shape)?
        };

        let mut decl = FieldDecl::new(&self.name, &self.ty, value).with_visibility(self.visibility());
        if let Some(group) = &self.interleave {
            decl = decl.interleaved(group);
        }
        Ok(decl)
    }
}

/// A binding declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BindingManifest {
    /// Variable name
    pub name: String,
    /// Struct type name
    pub struct_name: String,
    /// Address space
    pub kind: BindingKind,
    /// `@group` index
    pub group: u32,
    /// `@binding` index; assigned by a binding set when absent
    pub binding: Option<u32>,
    /// Minimum physical buffer size
    pub capacity: Option<usize>,
    /// Fields in declaration order
    pub fields: Vec<FieldManifest>,
}

impl Config for BindingManifest {}

impl BindingManifest {
    /// Descriptor for the declared binding
    pub fn descriptor(&self) -> BindingDescriptor {
        BindingDescriptor {
            name: self.name.clone(),
            struct_name: self.struct_name.clone(),
            kind: self.kind,
            group: self.group,
            binding: self.binding,
            capacity: self.capacity,
        }
    }

    /// Field declarations in order
    pub fn field_decls(&self, registry: &TypeRegistry) -> LayoutResult<Vec<FieldDecl>> {
        self.fields.iter().map(|f| f.to_decl(registry)).collect()
    }

    /// Construct the binding this manifest declares
    pub fn build(&self, registry: &TypeRegistry, config: &LayoutConfig) -> LayoutResult<Binding> {
        Binding::construct(self.descriptor(), self.field_decls(registry)?, registry, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::types::NumericKind;
    use approx::assert_relative_eq;
    use std::io::Write;

    const PARAMS: &str = r#"
name = "params"
struct_name = "Params"
kind = "uniform"
group = 1

[[fields]]
name = "time"
type = "f32"
value = [0.5]
visibility = ["fragment"]

[[fields]]
name = "frame"
type = "u32"
value = [7]

[[fields]]
name = "tint"
type = "vec3f"

[[fields]]
name = "light"
type = "Light"

[[fields.fields]]
name = "intensity"
type = "f32"
value = [2.0]
"#;

    #[test]
    fn test_parse_toml_manifest() {
        let manifest: BindingManifest = toml::from_str(PARAMS).unwrap();
        assert_eq!(manifest.kind, BindingKind::Uniform);
        assert_eq!(manifest.fields.len(), 4);
        assert_eq!(manifest.fields[3].fields.len(), 1);

        let registry = TypeRegistry::new();
        let decls = manifest.field_decls(&registry).unwrap();
        assert_eq!(decls[0].visibility(), ShaderStages::FRAGMENT);
        assert_eq!(decls[1].value().numbers()[0].kind(), NumericKind::U32);
        assert_eq!(decls[2].value().len(), 3);
    }

    #[test]
    fn test_build_from_manifest() {
        let manifest: BindingManifest = toml::from_str(PARAMS).unwrap();
        let mut binding = manifest.build(&TypeRegistry::new(), &LayoutConfig::default()).unwrap();
        binding.update().unwrap();

        assert_eq!(binding.descriptor().group, 1);
        assert_relative_eq!(binding.read_field("time").unwrap().as_f32().unwrap(), 0.5);
        assert_eq!(binding.read_field("frame").unwrap().to_u32s(), Some(vec![7]));
        assert!(binding.emit_declaration().unwrap().structs.contains("struct Light {"));
    }

    #[test]
    fn test_fractional_value_for_integer_field() {
        let manifest = BindingManifest {
            name: "p".to_string(),
            struct_name: "P".to_string(),
            fields: vec![FieldManifest {
                name: "count".to_string(),
                ty: "u32".to_string(),
                value: vec![1.5],
                ..FieldManifest::default()
            }],
            ..BindingManifest::default()
        };
        let err = manifest.build(&TypeRegistry::new(), &LayoutConfig::default()).unwrap_err();
        assert!(err.is_type_mismatch());
    }

    #[test]
    fn test_load_ron_manifest_from_file() {
        let mut file = tempfile::Builder::new().suffix(".ron").tempfile().unwrap();
        write!(
            file,
            r#"(
    name: "out",
    struct_name: "Output",
    kind: storage_read_write,
    fields: [
        (name: "values", type: "array<f32>", value: [1.0, 2.0, 3.0]),
    ],
)"#
        )
        .unwrap();

        let manifest = BindingManifest::load_from_file(file.path().to_str().unwrap()).unwrap();
        let binding = manifest.build(&TypeRegistry::new(), &LayoutConfig::default()).unwrap();
        assert_eq!(binding.kind(), BindingKind::StorageReadWrite);
        assert_eq!(binding.total_size(), 48);
    }
}
