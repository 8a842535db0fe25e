//! Symbolic shader types and the registry that resolves them
//!
//! Every field is declared with a symbolic WGSL-style type name. The registry
//! parses that name into a closed [`ShaderType`] shape and answers the
//! alignment and size questions the allocator asks.
//!
//! Layout rules:
//! - scalars are 4 bytes aligned to 4
//! - 2-vectors are 8 bytes aligned to 8
//! - 3- and 4-vectors are 16 bytes aligned to 16 (3-vectors carry 4 bytes of tail padding)
//! - `matCxR` is C columns, each padded to 16 bytes
//! - `array<T, N>` strides by `round_up(size(T), 16)` and aligns to `max(16, align(T))`
//! - structs align to `max(16, largest member)` and round their size to 16

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{LayoutError, LayoutResult};
use crate::foundation::math::{round_up, SLOT_SIZE, STRUCT_ALIGNMENT};

/// Primitive 32-bit numeric kind of a value slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericKind {
    /// 32-bit float
    F32,
    /// 32-bit signed integer
    I32,
    /// 32-bit unsigned integer
    U32,
}

impl NumericKind {
    /// WGSL spelling of the kind
    pub const fn wgsl_name(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::I32 => "i32",
            Self::U32 => "u32",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "f32" => Some(Self::F32),
            "i32" => Some(Self::I32),
            "u32" => Some(Self::U32),
            _ => None,
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "" | "f" => Some(Self::F32),
            "i" => Some(Self::I32),
            "u" => Some(Self::U32),
            _ => None,
        }
    }
}

/// Closed description of a value's shape
#[derive(Debug, Clone, PartialEq)]
pub enum ShaderType {
    /// Single 32-bit value
    Scalar(NumericKind),
    /// 2-, 3- or 4-component vector
    Vector(NumericKind, u8),
    /// Float matrix with `columns` column vectors of `rows` components
    Matrix {
        /// Number of column vectors
        columns: u8,
        /// Components per column
        rows: u8,
    },
    /// Fixed (`Some`) or runtime-sized (`None`) array
    Array {
        /// Item shape
        item: Box<ShaderType>,
        /// Declared length, `None` for `array<T>`
        length: Option<usize>,
    },
    /// Named struct with laid-out members
    Struct(Rc<StructType>),
}

impl ShaderType {
    /// Minimum byte boundary for the start of a value of this type
    pub fn alignment(&self) -> usize {
        match self {
            Self::Scalar(_) => SLOT_SIZE,
            Self::Vector(_, 2) => 2 * SLOT_SIZE,
            Self::Vector(..) | Self::Matrix { .. } => STRUCT_ALIGNMENT,
            Self::Array { item, .. } => item.alignment().max(STRUCT_ALIGNMENT),
            Self::Struct(def) => def.alignment,
        }
    }

    /// Occupied bytes. Runtime-sized arrays report a single item's stride.
    pub fn size(&self) -> usize {
        match self {
            Self::Scalar(_) => SLOT_SIZE,
            Self::Vector(_, 2) => 2 * SLOT_SIZE,
            Self::Vector(..) => STRUCT_ALIGNMENT,
            Self::Matrix { columns, rows } => {
                usize::from(*columns) * round_up(usize::from(*rows) * SLOT_SIZE, STRUCT_ALIGNMENT)
            }
            Self::Array { item, length } => item.stride() * length.unwrap_or(1),
            Self::Struct(def) => def.size,
        }
    }

    /// Distance between consecutive items when this type is repeated in an array
    pub fn stride(&self) -> usize {
        round_up(self.size(), STRUCT_ALIGNMENT)
    }

    /// Number of numeric slots in one value. Runtime-sized arrays count one item.
    pub fn numeric_slots(&self) -> usize {
        match self {
            Self::Scalar(_) => 1,
            Self::Vector(_, n) => usize::from(*n),
            Self::Matrix { columns, rows } => usize::from(*columns) * usize::from(*rows),
            Self::Array { item, length } => item.numeric_slots() * length.unwrap_or(1),
            Self::Struct(def) => def.members.iter().map(|m| m.ty.numeric_slots()).sum(),
        }
    }

    /// Numeric kind shared by every slot, `None` for structs mixing kinds
    pub fn numeric_kind(&self) -> Option<NumericKind> {
        match self {
            Self::Scalar(kind) | Self::Vector(kind, _) => Some(*kind),
            Self::Matrix { .. } => Some(NumericKind::F32),
            Self::Array { item, .. } => item.numeric_kind(),
            Self::Struct(def) => {
                let mut kinds = def.members.iter().map(|m| m.ty.numeric_kind());
                let first = kinds.next().flatten()?;
                kinds.all(|k| k == Some(first)).then_some(first)
            }
        }
    }

    /// Kind of every slot, in value order
    pub fn slot_kinds(&self) -> Vec<NumericKind> {
        let mut kinds = Vec::with_capacity(self.numeric_slots());
        self.collect_slot_kinds(&mut kinds);
        kinds
    }

    fn collect_slot_kinds(&self, out: &mut Vec<NumericKind>) {
        match self {
            Self::Scalar(kind) => out.push(*kind),
            Self::Vector(kind, n) => out.extend(std::iter::repeat(*kind).take(usize::from(*n))),
            Self::Matrix { columns, rows } => out.extend(
                std::iter::repeat(NumericKind::F32).take(usize::from(*columns) * usize::from(*rows)),
            ),
            Self::Array { item, length } => {
                for _ in 0..length.unwrap_or(1) {
                    item.collect_slot_kinds(out);
                }
            }
            Self::Struct(def) => {
                for member in &def.members {
                    member.ty.collect_slot_kinds(out);
                }
            }
        }
    }

    /// Whether this is a matrix
    pub const fn is_matrix(&self) -> bool {
        matches!(self, Self::Matrix { .. })
    }

    /// Whether this is an array whose length comes from its value
    pub const fn is_runtime_sized(&self) -> bool {
        matches!(self, Self::Array { length: None, .. })
    }

    /// Components per column for matrices and vectors; arrays report their item's
    pub fn row_count(&self) -> usize {
        match self {
            Self::Scalar(_) | Self::Struct(_) => 1,
            Self::Vector(_, n) => usize::from(*n),
            Self::Matrix { rows, .. } => usize::from(*rows),
            Self::Array { item, .. } => item.row_count(),
        }
    }

    /// Canonical WGSL spelling, used in emitted declarations
    pub fn wgsl_name(&self) -> String {
        match self {
            Self::Scalar(kind) => kind.wgsl_name().to_string(),
            Self::Vector(kind, n) => format!("vec{}<{}>", n, kind.wgsl_name()),
            Self::Matrix { columns, rows } => format!("mat{}x{}<f32>", columns, rows),
            Self::Array { item, length: Some(n) } => format!("array<{}, {}>", item.wgsl_name(), n),
            Self::Array { item, length: None } => format!("array<{}>", item.wgsl_name()),
            Self::Struct(def) => def.name.clone(),
        }
    }
}

impl fmt::Display for ShaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wgsl_name())
    }
}

/// One laid-out struct member
#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    /// Member name
    pub name: String,
    /// Member shape
    pub ty: ShaderType,
    /// Byte offset from the start of the struct
    pub offset: usize,
}

/// A named struct with member offsets already assigned
#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    /// Struct name as emitted in WGSL
    pub name: String,
    /// Members in byte order
    pub members: Vec<StructMember>,
    /// Start alignment of the struct
    pub alignment: usize,
    /// Total size, a multiple of 16
    pub size: usize,
}

impl StructType {
    /// Lay out `members` in order and build the struct.
    ///
    /// Runtime-sized arrays cannot be struct members here because the struct
    /// must have a fixed size to be repeated or nested.
    pub fn from_members(
        name: impl Into<String>,
        members: Vec<(String, ShaderType)>,
    ) -> LayoutResult<Self> {
        let name = name.into();
        if members.is_empty() {
            return Err(LayoutError::Layout(format!("struct '{}' has no members", name)));
        }
        let mut cursor = 0;
        let mut alignment = STRUCT_ALIGNMENT;
        let mut laid_out = Vec::with_capacity(members.len());

        for (member_name, ty) in members {
            if ty.is_runtime_sized() {
                return Err(LayoutError::Layout(format!(
                    "struct '{}' member '{}' cannot be a runtime-sized array",
                    name, member_name
                )));
            }
            let offset = round_up(cursor, ty.alignment());
            cursor = offset + ty.size();
            alignment = alignment.max(ty.alignment());
            laid_out.push(StructMember { name: member_name, ty, offset });
        }

        Ok(Self {
            name,
            members: laid_out,
            alignment,
            size: round_up(cursor, alignment),
        })
    }

    /// WGSL struct definition text
    pub fn wgsl_definition(&self) -> String {
        format!("struct {} {{\n{}}}\n", self.name, wgsl_members(&self.members, Some(self.size)))
    }
}

/// Member lines of a struct body, one per member.
///
/// When `size` reaches past the end of the last member, that member carries
/// `@size` so the WGSL struct spans the same bytes as the layout.
pub fn wgsl_members(members: &[StructMember], size: Option<usize>) -> String {
    let last = members.len().saturating_sub(1);
    members
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let span = size.filter(|_| i == last && !m.ty.is_runtime_sized()).map(|size| size.saturating_sub(m.offset));
            match span {
                Some(span) if span > m.ty.size() => format!("    @size({}) {}: {},\n", span, m.name, m.ty.wgsl_name()),
                _ => format!("    {}: {},\n", m.name, m.ty.wgsl_name()),
            }
        })
        .collect()
}

/// Alignment, size and shape facts for a resolved type
#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfo {
    /// Start alignment in bytes
    pub alignment: usize,
    /// Occupied bytes
    pub size: usize,
    /// Numeric slots in one value
    pub numeric_slots: usize,
    /// Whether the type is a matrix
    pub is_matrix: bool,
    /// Components per column
    pub row_count: usize,
    /// Kind shared by every slot, if uniform
    pub kind: Option<NumericKind>,
    /// Parsed shape
    pub shape: ShaderType,
}

impl From<ShaderType> for TypeInfo {
    fn from(shape: ShaderType) -> Self {
        Self {
            alignment: shape.alignment(),
            size: shape.size(),
            numeric_slots: shape.numeric_slots(),
            is_matrix: shape.is_matrix(),
            row_count: shape.row_count(),
            kind: shape.numeric_kind(),
            shape,
        }
    }
}

/// Resolves symbolic type names to shapes.
///
/// Built-in scalar, vector, matrix and array names are parsed on demand;
/// struct names must be registered first.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    structs: HashMap<String, Rc<StructType>>,
}

impl TypeRegistry {
    /// Create a registry that knows only the built-in types
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a symbolic type name to its layout facts
    pub fn resolve(&self, name: &str) -> LayoutResult<TypeInfo> {
        self.parse(name).map(TypeInfo::from)
    }

    /// Parse a symbolic type name into its shape
    pub fn parse(&self, name: &str) -> LayoutResult<ShaderType> {
        let name = name.trim();
        if let Some(inner) = name.strip_prefix("array<").and_then(|s| s.strip_suffix('>')) {
            return self.parse_array(name, inner);
        }
        if let Some(kind) = NumericKind::from_name(name) {
            return Ok(ShaderType::Scalar(kind));
        }
        if let Some(shape) = parse_vector(name).or_else(|| parse_matrix(name)) {
            return Ok(shape);
        }
        self.structs
            .get(name)
            .map(|def| ShaderType::Struct(Rc::clone(def)))
            .ok_or_else(|| LayoutError::UnknownType(name.to_string()))
    }

    fn parse_array(&self, full: &str, inner: &str) -> LayoutResult<ShaderType> {
        // Split on the last top-level comma so nested `array<array<f32, 2>, 4>` works.
        let mut depth = 0usize;
        let mut split = None;
        for (i, c) in inner.char_indices() {
            match c {
                '<' => depth += 1,
                '>' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => split = Some(i),
                _ => {}
            }
        }

        let (item_name, length) = match split {
            Some(i) => {
                let length = inner[i + 1..]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| LayoutError::UnknownType(full.to_string()))?;
                (&inner[..i], Some(length))
            }
            None => (inner, None),
        };

        if length == Some(0) {
            return Err(LayoutError::Layout(format!("'{}' has zero length", full)));
        }

        let item = self.parse(item_name)?;
        if item.is_runtime_sized() {
            return Err(LayoutError::Layout(format!(
                "'{}' nests a runtime-sized array",
                full
            )));
        }
        Ok(ShaderType::Array { item: Box::new(item), length })
    }

    /// Register a struct type from `(member name, member type name)` pairs
    pub fn register_struct(
        &mut self,
        name: &str,
        members: &[(&str, &str)],
    ) -> LayoutResult<Rc<StructType>> {
        let shapes = members
            .iter()
            .map(|(member, ty)| Ok(((*member).to_string(), self.parse(ty)?)))
            .collect::<LayoutResult<Vec<_>>>()?;
        self.insert_struct(StructType::from_members(name, shapes)?)
    }

    /// Register an already laid-out struct type
    pub fn insert_struct(&mut self, def: StructType) -> LayoutResult<Rc<StructType>> {
        if parse_vector(&def.name).is_some()
            || parse_matrix(&def.name).is_some()
            || NumericKind::from_name(&def.name).is_some()
        {
            return Err(LayoutError::Layout(format!(
                "struct name '{}' shadows a built-in type",
                def.name
            )));
        }
        let def = Rc::new(def);
        if self.structs.insert(def.name.clone(), Rc::clone(&def)).is_some() {
            log::warn!("Struct type '{}' re-registered; previous definition replaced", def.name);
        }
        Ok(def)
    }

    /// Look up a registered struct
    pub fn struct_type(&self, name: &str) -> Option<Rc<StructType>> {
        self.structs.get(name).cloned()
    }
}

/// `vec3<f32>`, `vec3f`, `vec3i`, `vec3u` or the `vec3` float alias
fn parse_vector(name: &str) -> Option<ShaderType> {
    let rest = name.strip_prefix("vec")?;
    let mut chars = rest.chars();
    let n = chars.next()?.to_digit(10)? as u8;
    if !(2..=4).contains(&n) {
        return None;
    }
    let tail = chars.as_str();
    let kind = match tail.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
        Some(inner) => NumericKind::from_name(inner.trim())?,
        None => NumericKind::from_suffix(tail)?,
    };
    Some(ShaderType::Vector(kind, n))
}

/// `mat4x4<f32>`, `mat4x4f` or the square `mat4` alias
fn parse_matrix(name: &str) -> Option<ShaderType> {
    let rest = name.strip_prefix("mat")?;
    let bytes = rest.as_bytes();
    let dim = |b: u8| -> Option<u8> {
        let d = (b as char).to_digit(10)? as u8;
        (2..=4).contains(&d).then_some(d)
    };

    let (columns, rows, tail) = match bytes {
        [c, b'x', r, ..] => (dim(*c)?, dim(*r)?, &rest[3..]),
        [c, ..] => {
            let d = dim(*c)?;
            (d, d, &rest[1..])
        }
        [] => return None,
    };
    let valid_tail = matches!(tail, "" | "f" | "<f32>");
    valid_tail.then_some(ShaderType::Matrix { columns, rows })
}
