//! Name → node lookup table, plus scalar named values for cross-pass
//! parameter passing. Cleared at the end of every `execute`.

use crate::{error::DuplicateName, graph::Handle};
use fxhash::FxHashMap;

/// A scalar value shared between pass setup and execution callbacks.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    Float(f64),
    Int(i64),
    UInt(u64),
    Bool(bool),
}

#[derive(Default)]
pub struct Blackboard {
    textures: FxHashMap<String, Handle>,
    buffers: FxHashMap<String, Handle>,
    passes: FxHashMap<String, Handle>,
    values: FxHashMap<String, Value>,
}

fn add(map: &mut FxHashMap<String, Handle>, name: &str, handle: Handle) -> Result<(), DuplicateName> {
    if map.contains_key(name) {
        return Err(DuplicateName(name.to_string()));
    }
    map.insert(name.to_string(), handle);
    Ok(())
}

impl Blackboard {
    pub(crate) fn add_texture(&mut self, name: &str, handle: Handle) -> Result<(), DuplicateName> {
        add(&mut self.textures, name, handle)
    }

    pub(crate) fn add_buffer(&mut self, name: &str, handle: Handle) -> Result<(), DuplicateName> {
        add(&mut self.buffers, name, handle)
    }

    pub(crate) fn add_pass(&mut self, name: &str, handle: Handle) -> Result<(), DuplicateName> {
        add(&mut self.passes, name, handle)
    }

    pub fn override_texture(&mut self, name: &str, handle: Handle) {
        self.textures.insert(name.to_string(), handle);
    }

    pub fn override_buffer(&mut self, name: &str, handle: Handle) {
        self.buffers.insert(name.to_string(), handle);
    }

    pub fn override_pass(&mut self, name: &str, handle: Handle) {
        self.passes.insert(name.to_string(), handle);
    }

    pub(crate) fn texture(&self, name: &str) -> Option<Handle> {
        self.textures.get(name).copied()
    }

    pub(crate) fn buffer(&self, name: &str) -> Option<Handle> {
        self.buffers.get(name).copied()
    }

    pub(crate) fn pass(&self, name: &str) -> Option<Handle> {
        self.passes.get(name).copied()
    }

    pub fn add_value(&mut self, name: &str, value: Value) -> Result<(), DuplicateName> {
        if self.values.contains_key(name) {
            return Err(DuplicateName(name.to_string()));
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub fn override_value(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn value(&self, name: &str) -> Option<Value> {
        self.values.get(name).copied()
    }

    pub(crate) fn clear(&mut self) {
        self.textures.clear();
        self.buffers.clear();
        self.passes.clear();
        self.values.clear();
    }
}
