//! Error types for the VM crate.
//!
//! Implementation faults (bad bytecode, out-of-range operands) and
//! language-visible throws both travel as `VmError`, but the dispatch loop
//! (see `engine.rs`) only ever treats [`VmError::Thrown`] as something a
//! `CATCH`/`FINALLY` handler can intercept; every other variant aborts the
//! script (spec §7).

use crate::value::Value;
use thiserror::Error;

/// VM execution errors, grouped per the taxonomy in spec §7.
#[derive(Error, Debug, Clone)]
pub enum VmError {
    // --- Language-visible ---
    /// A script-level exception that escaped every handler (or one being
    /// propagated up through the unwind protocol before a handler is found).
    #[error("thrown value escaped: {0:?}")]
    Thrown(Value),

    // --- Operand ---
    #[error("constant pool index {index} out of range (pool has {len} entries)")]
    ConstantOutOfRange { index: usize, len: usize },
    #[error("invalid operand type: expected {expected}, got {actual}")]
    InvalidOperandType { expected: String, actual: String },
    #[error("operand is not writable: {reason}")]
    OperandNotWritable { reason: String },
    #[error("unsupported operand type for {op}: {ty}")]
    UnsupportedOperandType { op: String, ty: String },

    // --- Instruction ---
    #[error("opcode not implemented: {opcode}")]
    OpcodeNotImplemented { opcode: String },
    #[error("invalid instruction at ip {ip}: {reason}")]
    InvalidInstruction { ip: usize, reason: String },
    #[error("instruction execution failed: {reason}")]
    InstructionFailed { reason: String },

    // --- Arithmetic ---
    #[error("division by zero")]
    DivisionByZero,
    #[error("modulo by zero")]
    ModuloByZero,
    #[error("invalid arithmetic operation: {reason}")]
    InvalidArithmeticOperation { reason: String },

    // --- Variable ---
    #[error("variable not found: ${name}")]
    VariableNotFound { name: String },
    #[error("global not found: ${name}")]
    GlobalNotFound { name: String },
    #[error("invalid variable name: {name}")]
    InvalidVariableName { name: String },

    // --- Class ---
    #[error("class not found: {name}")]
    ClassNotFound { name: String },
    #[error("method not found: {class}::{method}")]
    MethodNotFound { class: String, method: String },
    #[error("property not found: {class}::${property}")]
    PropertyNotFound { class: String, property: String },
    #[error("cannot instantiate abstract class {name}")]
    AbstractClassInstantiation { name: String },
    #[error("invalid class context: {reason}")]
    InvalidClassContext { reason: String },
    #[error("cannot modify readonly property {class}::${property}")]
    ReadonlyViolation { class: String, property: String },

    // --- Function ---
    #[error("function not found: {name}")]
    FunctionNotFound { name: String },
    #[error("missing required argument: ${name}")]
    MissingRequiredArgument { name: String },
    #[error("unknown named argument: ${name}")]
    UnknownNamedArgument { name: String },
    #[error("argument type mismatch for ${name}: expected {expected}, got {actual}")]
    ArgumentTypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("call stack is empty")]
    CallStackEmpty,

    // --- Exception protocol ---
    #[error("no pending exception to operate on")]
    NoPendingException,
    #[error("uncaught exception: {message}")]
    UncaughtException { message: String },
    #[error("exception type mismatch: expected instance of {expected}")]
    ExceptionTypeMismatch { expected: String },

    // --- Context ---
    #[error("nil execution context")]
    NilContext,
    #[error("execution halted: {reason}")]
    Halted { reason: String },
    #[error("invalid execution state: {reason}")]
    InvalidExecutionState { reason: String },

    // --- Resource limits ---
    #[error("execution timed out after {timeout_ms}ms")]
    ExecutionTimeout { timeout_ms: u64 },
    #[error("call depth limit exceeded: depth {depth}, limit {limit}")]
    CallDepthExceeded { depth: usize, limit: usize },
    #[error("instruction limit exceeded: executed {executed}, limit {limit}")]
    InstructionLimitExceeded { executed: u64, limit: u64 },

    // --- I/O / include ---
    #[error("I/O error: {message}")]
    Io { message: String },
    #[error("required file not found: {path}")]
    RequiredFileNotFound { path: String },
}

impl VmError {
    pub fn invalid_operand_type<S: Into<String>>(expected: S, actual: S) -> Self {
        Self::InvalidOperandType {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn opcode_not_implemented<S: Into<String>>(opcode: S) -> Self {
        Self::OpcodeNotImplemented {
            opcode: opcode.into(),
        }
    }

    pub fn invalid_instruction<S: Into<String>>(ip: usize, reason: S) -> Self {
        Self::InvalidInstruction {
            ip,
            reason: reason.into(),
        }
    }

    pub fn variable_not_found<S: Into<String>>(name: S) -> Self {
        Self::VariableNotFound { name: name.into() }
    }

    pub fn class_not_found<S: Into<String>>(name: S) -> Self {
        Self::ClassNotFound { name: name.into() }
    }

    pub fn method_not_found<S: Into<String>>(class: S, method: S) -> Self {
        Self::MethodNotFound {
            class: class.into(),
            method: method.into(),
        }
    }

    pub fn function_not_found<S: Into<String>>(name: S) -> Self {
        Self::FunctionNotFound { name: name.into() }
    }

    /// Whether this error is a language-visible throw that the unwind
    /// protocol (§4.6) should treat like an inline `THROW`.
    pub fn is_thrown(&self) -> bool {
        matches!(self, VmError::Thrown(_))
    }

    /// Whether an implementation error of this kind should abort the script
    /// outright rather than be catchable from script code.
    pub fn is_fatal(&self) -> bool {
        !self.is_thrown()
    }

    /// Coarse category, handy for logging/metrics (mirrors the teacher's
    /// `VmError::category()`).
    pub fn category(&self) -> &'static str {
        match self {
            VmError::Thrown(_) => "exception",
            VmError::ConstantOutOfRange { .. }
            | VmError::InvalidOperandType { .. }
            | VmError::OperandNotWritable { .. }
            | VmError::UnsupportedOperandType { .. } => "operand",
            VmError::OpcodeNotImplemented { .. }
            | VmError::InvalidInstruction { .. }
            | VmError::InstructionFailed { .. } => "instruction",
            VmError::DivisionByZero
            | VmError::ModuloByZero
            | VmError::InvalidArithmeticOperation { .. } => "arithmetic",
            VmError::VariableNotFound { .. }
            | VmError::GlobalNotFound { .. }
            | VmError::InvalidVariableName { .. } => "variable",
            VmError::ClassNotFound { .. }
            | VmError::MethodNotFound { .. }
            | VmError::PropertyNotFound { .. }
            | VmError::AbstractClassInstantiation { .. }
            | VmError::InvalidClassContext { .. }
            | VmError::ReadonlyViolation { .. } => "class",
            VmError::FunctionNotFound { .. }
            | VmError::MissingRequiredArgument { .. }
            | VmError::UnknownNamedArgument { .. }
            | VmError::ArgumentTypeMismatch { .. }
            | VmError::CallStackEmpty => "function",
            VmError::NoPendingException
            | VmError::UncaughtException { .. }
            | VmError::ExceptionTypeMismatch { .. } => "exception-protocol",
            VmError::NilContext
            | VmError::Halted { .. }
            | VmError::InvalidExecutionState { .. } => "context",
            VmError::ExecutionTimeout { .. }
            | VmError::CallDepthExceeded { .. }
            | VmError::InstructionLimitExceeded { .. } => "resource",
            VmError::Io { .. } | VmError::RequiredFileNotFound { .. } => "io",
        }
    }
}

impl From<std::io::Error> for VmError {
    fn from(err: std::io::Error) -> Self {
        VmError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for VM operations.
pub type VmResult<T> = std::result::Result<T, VmError>;
