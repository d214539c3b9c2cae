//! The process-wide execution context (spec §3, §5 "Concurrency &
//! Resource Model", §6 "Persisted/in-process state").
//!
//! One [`Context`] is created per script execution; it is seeded from the
//! process-global [`ClassTable`] and function registry, then owns its own
//! globals, included-files set, output stack, and timeout handle.

use crate::builtin::BuiltinRegistry;
use crate::class::ClassTable;
use crate::error::VmResult;
use crate::function::FunctionDescriptor;
use crate::http::HttpHeaderContext;
use crate::output::OutputBufferStack;
use crate::timeout::TimeoutHandle;
use crate::value::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// The host-installed compiler callback (spec §6 "Compiler callback"):
/// reads, parses, and runs `path`, returning whatever the included script
/// produced. Source parsing itself is out of scope for this crate — the
/// callback is where a host wires up its own AST-to-bytecode pipeline.
/// `Ok(None)` models "nil error, no explicit value", which `INCLUDE`/
/// `REQUIRE` turn into the PHP-conventional integer `1`.
pub type CompilerCallback = Arc<dyn Fn(&mut Context, &str) -> VmResult<Option<Value>> + Send + Sync>;

/// Process-wide, read-mostly registry of user + builtin functions,
/// populated once at VM construction (spec §6 "Persisted/in-process
/// state") and shared (read-only after setup) across contexts.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: Arc<RwLock<HashMap<String, Arc<FunctionDescriptor>>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&self, descriptor: FunctionDescriptor) {
        let name = descriptor.name.to_ascii_lowercase();
        self.functions
            .write()
            .expect("function registry poisoned")
            .insert(name, Arc::new(descriptor));
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<FunctionDescriptor>> {
        self.functions
            .read()
            .expect("function registry poisoned")
            .get(&name.to_ascii_lowercase())
            .cloned()
    }

    /// A deep copy for the goroutine executor (spec §4.9: "a new context
    /// seeded by deep-copying the caller context's class table and global
    /// variables"). Since the registry is append-mostly and cheap to
    /// clone by value, this copies the map rather than sharing the lock.
    pub fn snapshot(&self) -> Self {
        let copy = self
            .functions
            .read()
            .expect("function registry poisoned")
            .clone();
        Self {
            functions: Arc::new(RwLock::new(copy)),
        }
    }
}

/// Per-script execution state: globals, included files, output, timeout,
/// exit bookkeeping. The class table and function registry are shared
/// (cloned handles) with the process-wide singletons unless this context
/// was created by the goroutine executor, in which case they are deep
/// copies (spec §4.9).
pub struct Context {
    pub classes: ClassTable,
    pub functions: FunctionRegistry,
    /// Native built-ins (spec §6 C6), shared (cloned handle) across every
    /// context the way `classes`/`functions` are.
    pub builtins: BuiltinRegistry,
    pub globals: Arc<RwLock<HashMap<String, Value>>>,
    /// Global scalar constants (`define()`/`const FOO = ...`), distinct
    /// from the per-class constant maps in [`ClassTable`]. Consulted by
    /// `FETCH_CONSTANT` (spec §4.3 "Fetch" family).
    pub constants: Arc<RwLock<HashMap<String, Value>>>,
    pub included_files: Arc<RwLock<HashSet<String>>>,
    pub output: OutputBufferStack,
    pub http: HttpHeaderContext,
    pub timeout: TimeoutHandle,
    pub halted: bool,
    pub exit_code: i32,
    /// Saved error-reporting levels pushed by `BEGIN_SILENCE` and popped
    /// by `END_SILENCE` (spec §7).
    pub silence_stack: Vec<u32>,
    pub error_reporting_level: u32,
    /// `static $x = ...;` storage, keyed by `"{function}#{slot}"`. Holds
    /// reference cells so `BIND_STATIC` can rebind the same cell into the
    /// local slot on every call — later writes flow through it exactly
    /// like any other `Value::Reference` (spec §3 "persists across calls").
    pub statics: Arc<RwLock<HashMap<String, Value>>>,
    /// Installed by the host before execution; `None` until then, in which
    /// case `INCLUDE`/`REQUIRE` behave as if every path is missing.
    pub compiler: Option<CompilerCallback>,
}

impl Context {
    pub fn new(classes: ClassTable, functions: FunctionRegistry) -> Self {
        Self {
            classes,
            functions,
            builtins: BuiltinRegistry::new(),
            globals: Arc::new(RwLock::new(HashMap::new())),
            constants: Arc::new(RwLock::new(HashMap::new())),
            included_files: Arc::new(RwLock::new(HashSet::new())),
            output: OutputBufferStack::new(),
            http: HttpHeaderContext::new(),
            timeout: TimeoutHandle::new(),
            halted: false,
            exit_code: 0,
            silence_stack: Vec::new(),
            error_reporting_level: u32::MAX,
            statics: Arc::new(RwLock::new(HashMap::new())),
            compiler: None,
        }
    }

    /// Builds an isolated context for the goroutine executor: a fresh
    /// deep copy of globals and classes, independent output/timeout state
    /// (spec §4.9).
    pub fn forked(&self) -> Self {
        let globals = self
            .globals
            .read()
            .expect("globals poisoned")
            .clone();
        let constants = self
            .constants
            .read()
            .expect("constants poisoned")
            .clone();
        let statics = self.statics.read().expect("statics poisoned").clone();
        Self {
            classes: self.classes.clone(),
            functions: self.functions.snapshot(),
            builtins: self.builtins.clone(),
            globals: Arc::new(RwLock::new(globals)),
            constants: Arc::new(RwLock::new(constants)),
            included_files: Arc::new(RwLock::new(HashSet::new())),
            output: OutputBufferStack::new(),
            http: HttpHeaderContext::new(),
            timeout: TimeoutHandle::new(),
            halted: false,
            exit_code: 0,
            silence_stack: Vec::new(),
            error_reporting_level: self.error_reporting_level,
            statics: Arc::new(RwLock::new(statics)),
            compiler: self.compiler.clone(),
        }
    }

    pub fn get_global(&self, name: &str) -> Value {
        self.globals
            .read()
            .expect("globals poisoned")
            .get(name)
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn set_global(&self, name: impl Into<String>, value: Value) {
        self.globals
            .write()
            .expect("globals poisoned")
            .insert(name.into(), value);
    }

    pub fn define_constant(&self, name: impl Into<String>, value: Value) {
        self.constants
            .write()
            .expect("constants poisoned")
            .insert(name.into(), value);
    }

    pub fn get_constant(&self, name: &str) -> Option<Value> {
        self.constants
            .read()
            .expect("constants poisoned")
            .get(name)
            .cloned()
    }

    /// `INCLUDE_ONCE`/`REQUIRE_ONCE` bookkeeping (spec §6, §8 scenario 8):
    /// returns `true` the first time `path` is seen.
    pub fn mark_included(&self, path: &str) -> bool {
        self.included_files
            .write()
            .expect("included files poisoned")
            .insert(path.to_string())
    }

    pub fn is_silenced(&self) -> bool {
        !self.silence_stack.is_empty()
    }

    pub fn begin_silence(&mut self) {
        self.silence_stack.push(self.error_reporting_level);
        self.error_reporting_level = 0;
    }

    pub fn end_silence(&mut self) {
        if let Some(level) = self.silence_stack.pop() {
            self.error_reporting_level = level;
        }
    }

    pub fn halt(&mut self, exit_code: i32) {
        self.halted = true;
        self.exit_code = exit_code;
    }

    /// `BIND_STATIC` support: returns the persistent reference cell for
    /// `key`, creating it from `default` on the first call that reaches
    /// this declaration site.
    pub fn static_cell(&self, key: &str, default: Value) -> Value {
        if let Some(existing) = self.statics.read().expect("statics poisoned").get(key) {
            return existing.clone();
        }
        let cell = default.into_reference();
        self.statics
            .write()
            .expect("statics poisoned")
            .insert(key.to_string(), cell.clone());
        cell
    }
}
