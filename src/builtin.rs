//! The built-in call interface (spec §6 "Built-in call interface", C6).
//!
//! A built-in handler is an ordinary Rust closure taking a
//! [`BuiltinContext`] and the call's resolved arguments. It returns a
//! [`Value`] or a [`VmError`] — including the "exception thrown" sentinel
//! ([`VmError::Thrown`]) after installing the frame's pending exception,
//! which the dispatch loop treats exactly like an inline `THROW` (spec
//! §4.6).

use crate::context::Context;
use crate::error::VmResult;
use crate::function::FunctionDescriptor;
use crate::output::BufferStatus;
use crate::value::Value;
use std::sync::Arc;

/// The context object exposed to a builtin handler (spec §6).
pub struct BuiltinContext<'a> {
    pub context: &'a mut Context,
    /// Set by the engine before invoking a builtin so `GetGlobal`/
    /// `SetGlobal` calls made from nested user invocations have somewhere
    /// to land a pending exception, if the builtin throws one.
    pub pending_exception: Option<Value>,
}

impl<'a> BuiltinContext<'a> {
    pub fn write_output(&mut self, value: &Value) {
        let chunk = value.to_php_string();
        self.context.output.write(&chunk, &self.context.http);
    }

    pub fn get_global(&self, name: &str) -> Value {
        self.context.get_global(name)
    }

    pub fn set_global(&self, name: &str, value: Value) {
        self.context.set_global(name.to_string(), value);
    }

    pub fn lookup_user_function(&self, name: &str) -> Option<Arc<FunctionDescriptor>> {
        self.context.functions.lookup(name)
    }

    pub fn lookup_user_class(&self, name: &str) -> bool {
        self.context.classes.has_descriptor(name)
    }

    pub fn halt(&mut self, exit_code: i32) {
        self.context.halt(exit_code);
    }

    pub fn output_status(&self) -> Option<BufferStatus> {
        self.context.output.status()
    }

    /// Raises a language-visible exception from within a builtin: installs
    /// the pending exception and returns the sentinel error the dispatch
    /// loop recognizes (spec §4.6 "Builtins signal a thrown exception by
    /// returning a dedicated ... sentinel error").
    pub fn throw(&mut self, exception: Value) -> crate::error::VmError {
        self.pending_exception = Some(exception.clone());
        crate::error::VmError::Thrown(exception)
    }
}

/// A registered builtin function. `CallUserFunction` (nested user
/// invocation in an isolated snapshot) is implemented by the engine, which
/// owns the call stack this bridge doesn't have access to.
pub type BuiltinHandler = Arc<dyn Fn(&mut BuiltinContext, &[Value]) -> VmResult<Value> + Send + Sync>;

#[derive(Clone, Default)]
pub struct BuiltinRegistry {
    handlers: std::collections::HashMap<String, BuiltinHandler>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: BuiltinHandler) {
        self.handlers.insert(name.into().to_ascii_lowercase(), handler);
    }

    pub fn get(&self, name: &str) -> Option<BuiltinHandler> {
        self.handlers.get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(&name.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassTable;
    use crate::context::FunctionRegistry;

    #[test]
    fn registered_builtin_is_invoked_with_its_arguments() {
        let mut registry = BuiltinRegistry::new();
        registry.register(
            "strlen",
            Arc::new(|_ctx, args| Ok(Value::Int(args[0].to_php_string().len() as i64))),
        );
        let handler = registry.get("strlen").unwrap();
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut builtin_ctx = BuiltinContext {
            context: &mut context,
            pending_exception: None,
        };
        let result = handler(&mut builtin_ctx, &[Value::str("hello")]).unwrap();
        assert_eq!(result, Value::Int(5));
    }

    #[test]
    fn throw_installs_pending_exception_sentinel() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut builtin_ctx = BuiltinContext {
            context: &mut context,
            pending_exception: None,
        };
        let err = builtin_ctx.throw(Value::str("boom"));
        assert!(matches!(err, crate::error::VmError::Thrown(_)));
        assert!(builtin_ctx.pending_exception.is_some());
    }
}
