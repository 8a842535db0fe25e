//! WGSL declaration synthesis
//!
//! Struct members are emitted in byte order, so the text always agrees with
//! the layout the binding serializes into.

use std::collections::HashMap;
use std::fmt;

use crate::binding::binding::Binding;
use crate::error::{LayoutError, LayoutResult};
use crate::layout::types::wgsl_members;

/// Declaration text for one binding
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Declaration {
    /// Member lines of the binding's own struct
    pub body: String,
    /// Helper structs followed by the binding's own struct
    pub structs: String,
    /// `@group(G) @binding(B) var<...> name: Struct;`
    pub variable: String,
}

impl Declaration {
    /// Structs and variable line as one block
    pub fn text(&self) -> String {
        format!("{}\n{}\n", self.structs, self.variable)
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Struct definitions in emission order, keyed by name
#[derive(Debug, Default)]
struct StructTable {
    by_name: HashMap<String, String>,
    text: String,
}

impl StructTable {
    /// Add a definition. A repeat of an identical definition is skipped; a
    /// different definition under a known name is an error.
    fn push(&mut self, name: &str, definition: String) -> LayoutResult<()> {
        match self.by_name.get(name) {
            Some(existing) if *existing == definition => Ok(()),
            Some(_) => Err(LayoutError::Layout(format!(
                "struct '{}' is declared twice with different members",
                name
            ))),
            None => {
                self.text.push_str(&definition);
                self.text.push('\n');
                self.by_name.insert(name.to_string(), definition);
                Ok(())
            }
        }
    }
}

fn struct_text(name: &str, body: &str) -> String {
    format!("struct {} {{\n{}}}\n", name, body)
}

/// Append helper structs of `binding` and then its own struct.
///
/// Nested structs are padded to the size their parent reserves for them.
fn push_structs(binding: &Binding, nested: bool, table: &mut StructTable) -> LayoutResult<()> {
    for child in binding.nested_children() {
        push_structs(child, true, table)?;
    }
    for record in binding.records() {
        let def = record.record_struct();
        table.push(&def.name, def.wgsl_definition())?;
    }
    let size = nested.then(|| binding.total_size());
    let body = wgsl_members(&binding.declared_members(), size);
    table.push(binding.struct_name(), struct_text(binding.struct_name(), &body))
}

/// Build the declaration text for `binding`
pub(crate) fn declaration(binding: &Binding) -> LayoutResult<Declaration> {
    let mut table = StructTable::default();
    push_structs(binding, false, &mut table)?;
    let mut structs = table.text;
    if structs.ends_with("\n\n") {
        structs.pop();
    }

    Ok(Declaration {
        body: wgsl_members(&binding.declared_members(), None),
        structs,
        variable: declaration_line(binding),
    })
}

/// Check that every struct reachable from `binding` has one definition per name
pub(crate) fn check(binding: &Binding) -> LayoutResult<()> {
    push_structs(binding, false, &mut StructTable::default())
}

/// Declaration text for several bindings sharing one shader. Identical
/// structs are emitted once; conflicting ones are an error.
pub(crate) fn combined<'a>(bindings: impl Iterator<Item = &'a Binding>) -> LayoutResult<String> {
    let mut table = StructTable::default();
    let mut variables = String::new();
    for binding in bindings {
        push_structs(binding, false, &mut table)?;
        variables.push_str(&declaration_line(binding));
        variables.push('\n');
    }
    Ok(table.text + &variables)
}

fn declaration_line(binding: &Binding) -> String {
    let descriptor = binding.descriptor();
    format!(
        "@group({}) @binding({}) var<{}> {}: {};",
        descriptor.group,
        descriptor.binding.unwrap_or(0),
        descriptor.kind.address_space(),
        descriptor.name,
        descriptor.struct_name
    )
}
