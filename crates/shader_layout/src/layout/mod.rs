//! Layout computation
//!
//! Leaves of the engine: symbolic types, values, the byte codec, element
//! strategies and the allocator that places them.

pub mod allocator;
pub mod array;
pub mod codec;
pub mod element;
pub mod interleaved;
pub mod types;
pub mod value;

pub use allocator::{FieldLayout, LayoutAllocator};
pub use array::ArrayElement;
pub use element::{Element, PlainElement};
pub use interleaved::{InterleavedArrayElement, RecordLayout, RecordMember};
pub use types::{NumericKind, ShaderType, StructMember, StructType, TypeInfo, TypeRegistry};
pub use value::{FieldValue, Number};
