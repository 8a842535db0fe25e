//! # Shader Layout
//!
//! Buffer layout and shader-struct synthesis for GPU uniform and storage buffers.
//!
//! A binding is declared once as an ordered list of named, typed fields. The
//! layout allocator assigns every field a byte offset under 16-byte buffer
//! alignment rules, the binding serializes field values into a byte image
//! ready for upload, and the same layout produces the matching WGSL struct and
//! variable declaration text.
//!
//! ## Features
//!
//! - **Byte-exact layout**: scalars, vectors, matrices, strided arrays and nested structs
//! - **Dirty tracking**: only mutated fields are re-serialized on `update()`
//! - **Interleaved arrays**: sibling arrays packed per record instead of per field
//! - **Offset children**: several logical bindings sharing one physical buffer
//! - **Read-back**: decode bytes written by a compute pass into field values
//!
//! ## Quick Start
//!
//! ```rust
//! use shader_layout::prelude::*;
//!
//! fn main() -> Result<(), LayoutError> {
//!     let registry = TypeRegistry::new();
//!     let mut params = Binding::construct(
//!         BindingDescriptor::uniform("params", "Params"),
//!         vec![
//!             FieldDecl::new("time", "f32", 0.0_f32),
//!             FieldDecl::new("tint", "vec3f", [1.0_f32, 0.5, 0.25]),
//!         ],
//!         &registry,
//!         &LayoutConfig::default(),
//!     )?;
//!
//!     params.set("time", 0.016_f32)?;
//!     params.update()?;
//!     assert_eq!(params.total_size(), 32);
//!
//!     let declaration = params.emit_declaration()?;
//!     assert!(declaration.structs.contains("tint: vec3<f32>"));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod binding;
pub mod config;
pub mod error;
pub mod foundation;
pub mod layout;

pub use error::{LayoutError, LayoutResult};

/// Common imports for crate users
pub mod prelude {
    pub use crate::{
        binding::{
            Binding, BindingDescriptor, BindingKind, BindingManifest, BindingSet, BindingState,
            Declaration, FieldDecl, OffsetChild, Placement, PreWriteHook, ShaderStages,
            UploadTarget,
        },
        config::{Config, ConfigError, LayoutConfig},
        error::{LayoutError, LayoutResult},
        layout::{FieldValue, NumericKind, ShaderType, TypeInfo, TypeRegistry},
    };
}
