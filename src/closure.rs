//! Closures and first-class callables (spec §4.5 "Closures").

use crate::function::FunctionDescriptor;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// What a closure actually invokes when called.
#[derive(Debug, Clone)]
pub enum CallTarget {
    /// An ordinary user function or a `function(){...}` literal.
    Function(Arc<FunctionDescriptor>),
    /// A bound-method callable (`$obj->method(...)` as a first-class
    /// callable, or `Closure::fromCallable([$obj, "method"])`).
    BoundMethod {
        receiver: Value,
        class_name: String,
        method: String,
    },
    /// A static-method callable (`Class::method(...)`).
    StaticMethod { class_name: String, method: String },
}

/// A closure value: a call target plus variables captured by `BIND_USE_VAR`
/// (spec §4.5: "`BIND_USE_VAR` captures variables by value into the
/// closure").
#[derive(Debug, Clone)]
pub struct ClosureValue {
    pub target: CallTarget,
    pub bound_vars: HashMap<String, Value>,
    /// `$this` bound into the closure body, if any (non-static closures
    /// created inside a method keep the enclosing `$this`).
    pub bound_this: Option<Value>,
}

impl ClosureValue {
    pub fn new(target: CallTarget) -> Self {
        Self {
            target,
            bound_vars: HashMap::new(),
            bound_this: None,
        }
    }
}
