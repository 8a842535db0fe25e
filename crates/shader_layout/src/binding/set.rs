//! Binding sets
//!
//! Collects the bindings one shader reads, assigns their `@binding` indices
//! and assembles the combined declaration text.

use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};

use crate::binding::binding::Binding;
use crate::binding::emit;
use crate::binding::storage::UploadTarget;
use crate::error::{LayoutError, LayoutResult};
use crate::layout::value::FieldValue;

new_key_type! {
    /// Handle to a binding inside a [`BindingSet`]
    pub struct BindingKey;
}

/// The bindings of one shader
#[derive(Debug, Default)]
pub struct BindingSet {
    bindings: SlotMap<BindingKey, Binding>,
    order: Vec<BindingKey>,
    next_index: HashMap<u32, u32>,
    ping_pongs: Vec<(BindingKey, BindingKey)>,
    declarations: Option<String>,
}

impl BindingSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding. Bindings without an explicit `@binding` index get the
    /// next free one in their group.
    pub fn insert(&mut self, mut binding: Binding) -> BindingKey {
        let group = binding.descriptor().group;
        let next = self.next_index.entry(group).or_insert(0);
        match binding.descriptor().binding {
            Some(index) => *next = (*next).max(index + 1),
            None => {
                binding.descriptor_mut().binding = Some(*next);
                *next += 1;
            }
        }

        log::info!(
            "Binding '{}' assigned @group({}) @binding({})",
            binding.name(),
            group,
            binding.descriptor().binding.unwrap_or(0)
        );
        let key = self.bindings.insert(binding);
        self.order.push(key);
        self.declarations = None;
        key
    }

    /// Remove a binding, dropping any ping-pong pairing it was part of
    pub fn remove(&mut self, key: BindingKey) -> Option<Binding> {
        let binding = self.bindings.remove(key)?;
        self.order.retain(|k| *k != key);
        self.ping_pongs.retain(|(a, b)| *a != key && *b != key);
        self.declarations = None;
        Some(binding)
    }

    /// Look up a binding
    pub fn get(&self, key: BindingKey) -> Option<&Binding> {
        self.bindings.get(key)
    }

    /// Look up a binding mutably
    pub fn get_mut(&mut self, key: BindingKey) -> Option<&mut Binding> {
        self.bindings.get_mut(key)
    }

    /// Find a binding by variable name
    pub fn find(&self, name: &str) -> Option<BindingKey> {
        self.order.iter().copied().find(|k| self.bindings[*k].name() == name)
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (BindingKey, &Binding)> {
        self.order.iter().map(|k| (*k, &self.bindings[*k]))
    }

    /// Update every binding, stopping at the first failure
    pub fn update_all(&mut self) -> LayoutResult<()> {
        for key in &self.order {
            if let Some(binding) = self.bindings.get_mut(*key) {
                binding.update()?;
            }
        }
        Ok(())
    }

    /// Send every image that changed since its last upload to `target`.
    /// Returns the number of bindings uploaded.
    pub fn upload_dirty(&mut self, target: &mut dyn UploadTarget) -> LayoutResult<usize> {
        let mut uploaded = 0;
        for key in &self.order {
            if let Some(binding) = self.bindings.get_mut(*key) {
                if binding.upload(target)? {
                    uploaded += 1;
                }
            }
        }
        Ok(uploaded)
    }

    /// Combined declaration text: every struct once, then one variable line
    /// per binding in insertion order.
    ///
    /// Built on first use and cached until the set changes. Fails with
    /// [`LayoutError::Layout`] when two bindings define different structs
    /// under one name.
    pub fn shader_declarations(&mut self) -> LayoutResult<&str> {
        if self.declarations.is_none() {
            log::debug!("Assembling declarations for {} bindings", self.order.len());
            let text = emit::combined(self.order.iter().map(|k| &self.bindings[*k]))?;
            self.declarations = Some(text);
        }
        Ok(self.declarations.as_deref().unwrap_or_default())
    }

    /// Insert `binding` and a twin with independent storage named `twin_name`.
    ///
    /// The pair gets consecutive binding indices; [`BindingSet::swap_ping_pong`]
    /// exchanges them between frames.
    pub fn insert_ping_pong<I, S>(
        &mut self,
        binding: Binding,
        twin_name: &str,
        twin_values: I,
    ) -> LayoutResult<(BindingKey, BindingKey)>
    where
        I: IntoIterator<Item = (S, FieldValue)>,
        S: AsRef<str>,
    {
        let twin = binding.twin(Some(twin_name), twin_values)?;

        let front = self.insert(binding);
        let back = self.insert(twin);
        self.ping_pongs.push((front, back));
        Ok((front, back))
    }

    /// Exchange the binding indices of a ping-pong pair
    pub fn swap_ping_pong(&mut self, front: BindingKey, back: BindingKey) -> LayoutResult<()> {
        if !self
            .ping_pongs
            .iter()
            .any(|&(a, b)| (a, b) == (front, back) || (b, a) == (front, back))
        {
            return Err(LayoutError::Layout("keys are not a ping-pong pair".to_string()));
        }

        let (Some(a), Some(b)) = (self.bindings.get(front), self.bindings.get(back)) else {
            return Err(LayoutError::Layout("ping-pong binding was removed".to_string()));
        };
        let (a, b) = (a.descriptor().binding, b.descriptor().binding);
        if let Some(binding) = self.bindings.get_mut(front) {
            binding.descriptor_mut().binding = b;
        }
        if let Some(binding) = self.bindings.get_mut(back) {
            binding.descriptor_mut().binding = a;
        }
        self.declarations = None;
        Ok(())
    }
}
