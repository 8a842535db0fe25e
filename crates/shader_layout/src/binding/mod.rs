//! Bindings
//!
//! Turns field declarations into laid-out bindings, keeps their byte images
//! in sync with host values and emits the matching shader declarations.

#[allow(clippy::module_inception)]
pub mod binding;
pub mod declaration;
pub mod emit;
pub mod manifest;
pub mod offset_child;
pub mod set;
pub mod storage;

pub use binding::{Binding, BindingState};
pub use declaration::{BindingDescriptor, BindingKind, FieldDecl, PreWriteHook, ShaderStages};
pub use emit::Declaration;
pub use manifest::{BindingManifest, FieldManifest, Stage};
pub use offset_child::{OffsetChild, Placement};
pub use set::{BindingKey, BindingSet};
pub use storage::{BufferHandle, Reservation, SharedBuffer, UploadTarget};
