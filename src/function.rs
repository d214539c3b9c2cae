//! Compiler-facing descriptors: functions, methods, classes.
//!
//! These are produced by the external collaborator named in spec §1/§6 (the
//! AST-to-bytecode compiler) and only *consumed* here. The VM never builds
//! one from source text — that stays firmly out of scope.

use crate::instruction::Instruction;
use crate::value::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Declared type of a parameter or return value: `?T`, `T|U`, or untyped.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeHint {
    Any,
    Named(String),
    Nullable(Box<TypeHint>),
    Union(Vec<TypeHint>),
}

impl TypeHint {
    /// Whether `value`'s runtime tag satisfies this hint. Class/interface
    /// hints are checked by the caller (needs the class table for
    /// `instanceof`); this only judges scalar/array/`null` shapes and
    /// recurses through `Nullable`/`Union`.
    pub fn accepts_scalar_shape(&self, value: &Value) -> bool {
        match self {
            TypeHint::Any => true,
            TypeHint::Nullable(inner) => matches!(value, Value::Null) || inner.accepts_scalar_shape(value),
            TypeHint::Union(types) => types.iter().any(|t| t.accepts_scalar_shape(value)),
            TypeHint::Named(name) => match name.as_str() {
                "mixed" => true,
                "int" => matches!(value, Value::Int(_)),
                "float" => matches!(value, Value::Float(_) | Value::Int(_)),
                "string" => matches!(value, Value::Str(_)),
                "bool" => matches!(value, Value::Bool(_)),
                "array" => matches!(value, Value::Array(_)),
                "null" => matches!(value, Value::Null),
                "callable" => matches!(value, Value::Closure(_) | Value::Str(_)),
                "object" => matches!(value, Value::Object(_)),
                // Class/interface names are validated against the class
                // table by the caller (§4.5 "validates ... against its
                // declared type").
                _ => matches!(value, Value::Object(_)),
            },
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct ParamDescriptor {
    pub name: String,
    pub by_ref: bool,
    pub variadic: bool,
    pub type_hint: TypeHint,
    pub default: Option<Value>,
}

/// A function or method body: bytecode plus the constant pool it indexes
/// into (spec §3 "Call frame").
#[derive(Debug, Clone)]
pub struct FunctionDescriptor {
    pub name: String,
    pub params: Vec<ParamDescriptor>,
    pub instructions: Arc<Vec<Instruction>>,
    pub constants: Arc<Vec<Value>>,
    pub is_generator: bool,
    /// Compile-time slot count (locals + temporaries share the slot space
    /// per spec §4.2).
    pub slot_count: usize,
    /// Names bound for each local slot, used to populate
    /// `slot-names`/`name-slots` (spec §3 frame invariant).
    pub slot_names: Vec<Option<String>>,
}

impl FunctionDescriptor {
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }
}

/// Visibility of a declared property (not enforced at the VM boundary —
/// compile-time concern — but retained for `ArrayAccess`/reflection-style
/// builtins to consult through the bridge).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone)]
pub struct PropertyDecl {
    pub visibility: Visibility,
    pub is_static: bool,
    pub is_readonly: bool,
    pub default_value: Value,
}

/// Compile-time class metadata: methods, declared properties, constants,
/// interfaces/traits used (spec §3 "Class runtime" descriptor).
#[derive(Debug, Clone, Default)]
pub struct ClassDescriptor {
    pub name: String,
    pub parent_name: Option<String>,
    pub is_abstract: bool,
    pub methods: std::collections::HashMap<String, Arc<FunctionDescriptor>>,
    pub properties: std::collections::HashMap<String, PropertyDecl>,
    pub constants: std::collections::HashMap<String, Value>,
    pub interfaces: HashSet<String>,
    pub traits_used: HashSet<String>,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn method(&self, name: &str) -> Option<&Arc<FunctionDescriptor>> {
        // Case-insensitive lookup mirrors PHP method-name resolution.
        let lower = name.to_ascii_lowercase();
        self.methods
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase() == lower)
            .map(|(_, v)| v)
    }
}
