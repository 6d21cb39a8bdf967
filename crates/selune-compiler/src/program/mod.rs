//! Compiled program model
//!
//! A `Program` is an ordered list of `Prototype`s; the prototype at index 0
//! is the entry point (`$main`). Each prototype carries its instruction
//! stream, constant pool, local-variable descriptor table, and upvalue
//! descriptor table.

mod dump;
mod serialize;
pub mod validator;

pub use serialize::FormatError;
pub use validator::{validate, ValidationError, ValidationErrorKind};

use crate::opcode::Opcode;
use ordered_float::OrderedFloat;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// A constant-pool entry. Strings are always interned as raw bytes so the
/// pool round-trips bit-exactly; integers and floats stay distinct kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Constant {
    Int(i64),
    Float(OrderedFloat<f64>),
    Bytes(Vec<u8>),
}

impl Constant {
    /// Intern a text string as UTF-8 bytes
    pub fn from_str(text: &str) -> Self {
        Constant::Bytes(text.as_bytes().to_vec())
    }

    pub fn from_f64(value: f64) -> Self {
        Constant::Float(OrderedFloat(value))
    }

    /// The `type` column of the dump
    pub fn kind_str(&self) -> &'static str {
        match self {
            Constant::Int(_) => "int",
            Constant::Float(_) => "float",
            Constant::Bytes(_) => "string",
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{}", v),
            Constant::Float(v) => write!(f, "{:?}", v.0),
            Constant::Bytes(bytes) => {
                write!(f, "\"{}\"", String::from_utf8_lossy(bytes).escape_debug())
            }
        }
    }
}

/// A local-variable descriptor: slot index, optional name (temporaries are
/// unnamed), and the `[start_pc, end_pc)` range it is live over
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalVariable {
    pub index: u16,
    pub name: Option<String>,
    pub start_pc: usize,
    pub end_pc: Option<usize>,
    pub is_const: bool,
}

impl LocalVariable {
    pub fn new(index: u16, name: Option<String>, start_pc: usize) -> Self {
        Self {
            index,
            name,
            start_pc,
            end_pc: None,
            is_const: false,
        }
    }

    /// Display name; temporaries render as `(temp)`
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(temp)")
    }
}

/// Local descriptors with by-slot and by-name lookup. Same-name bindings
/// stack; lookup by name returns the innermost (most recent) one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocalVariableStore {
    locals: Vec<LocalVariable>,
    #[serde(skip)]
    by_name: HashMap<String, Vec<usize>>,
}

impl LocalVariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, local: LocalVariable) {
        if let Some(name) = &local.name {
            self.by_name
                .entry(name.clone())
                .or_default()
                .push(self.locals.len());
        }
        self.locals.push(local);
    }

    /// The innermost binding of `name`, if any
    pub fn by_name(&self, name: &str) -> Option<&LocalVariable> {
        self.by_name
            .get(name)
            .and_then(|entries| entries.last())
            .map(|&i| &self.locals[i])
    }

    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut LocalVariable> {
        let index = *self.by_name.get(name)?.last()?;
        Some(&mut self.locals[index])
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.by_name
            .get(name)
            .map(|entries| !entries.is_empty())
            .unwrap_or(false)
    }

    /// The most recently added descriptor for `slot`, if any. Slots are
    /// reused across disjoint lifetimes, so the latest one wins.
    pub fn by_index(&self, slot: u16) -> Option<&LocalVariable> {
        self.locals.iter().rev().find(|l| l.index == slot)
    }

    pub fn len(&self) -> usize {
        self.locals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocalVariable> {
        self.locals.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LocalVariable> {
        self.locals.iter_mut()
    }

    /// Move every descriptor of `other` into this store
    pub fn merge(&mut self, other: LocalVariableStore) {
        for local in other.locals {
            self.add(local);
        }
    }
}

/// An upvalue descriptor. `index` is the position in the owning
/// prototype's upvalue list. `is_on_stack = true` means the capture refers
/// to a local slot of the immediately enclosing frame; `false` means it
/// forwards to the same-named upvalue of the enclosing prototype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Upvalue {
    pub index: u16,
    pub name: String,
    pub is_on_stack: bool,
}

/// Compiled form of a single function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prototype {
    /// Function name for diagnostics (`$main`, `a.b.c`, `<lambda#0>`)
    pub name: String,
    /// Number of fixed (named) parameters
    pub fixed_params: u16,
    /// Whether the function declares `...`
    pub is_variadic: bool,
    pub opcodes: Vec<Opcode>,
    pub constants: Vec<Constant>,
    pub locals: LocalVariableStore,
    pub upvalues: Vec<Upvalue>,
    /// High-water mark of simultaneously live local slots
    pub num_locals: u16,
}

impl Prototype {
    /// The upvalue named `name`, if this prototype captures it
    pub fn upvalue_by_name(&self, name: &str) -> Option<&Upvalue> {
        self.upvalues.iter().find(|u| u.name == name)
    }

    /// Parameter list rendering used by dump headers and closure comments
    pub fn param_str(&self) -> String {
        if self.is_variadic {
            format!("{}, ...", self.fixed_params)
        } else {
            self.fixed_params.to_string()
        }
    }
}

/// A compiled program: prototypes in creation order, entry point first
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Program {
    pub prototypes: Vec<Prototype>,
}

impl Program {
    /// The entry-point prototype (`$main`)
    pub fn entry(&self) -> &Prototype {
        &self.prototypes[0]
    }
}
