//! # dynavm
//!
//! A bytecode virtual machine for a dynamically-typed, PHP-style scripting
//! language.
//!
//! The VM is organized into eight cooperating components, leaves first:
//!
//! - **Value model** ([`value`]): tagged union of scalar/array/object/
//!   reference/resource/closure values with coercion, comparison, and
//!   arithmetic.
//! - **Operand codec** ([`operand`]): `(addressing-mode, index)` pairs
//!   decoded by [`frame`].
//! - **Call frame** ([`frame`]): per-invocation locals, temporaries,
//!   exception handlers, iterator table, pending-call stack.
//! - **Execution context** ([`context`]): process-wide globals, class and
//!   function tables, output buffer stack, timeout handle.
//! - **Dispatch loop** ([`engine`], [`jump_table`]): fetches, profiles,
//!   dispatches, and advances/jumps the instruction pointer; drives
//!   return-unwind and exception-unwind.
//! - **Class system** ([`class`], [`object`], [`function`]): lazy-linked
//!   inheritance, method resolution, object storage.
//! - **Built-in call interface** ([`builtin`]): native functions bridged
//!   into script execution.
//! - **Generator coroutines and parallel goroutines** ([`generator`],
//!   [`goroutine`]): cooperative suspension and isolated-context
//!   parallelism.
//!
//! ## Example
//!
//! ```rust,no_run
//! use dynavm::{ClassTable, Context, Engine, Frame, FunctionRegistry, Instruction, OpCode, Operand, Value};
//! use std::sync::Arc;
//!
//! let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
//! let mut engine = Engine::new(&mut context);
//! let instructions = vec![
//!     Instruction::new(OpCode::Add, Operand::constant(0), Operand::constant(1), Operand::tmp(0)),
//!     Instruction::new(OpCode::Return, Operand::tmp(0), Operand::UNUSED, Operand::UNUSED),
//! ];
//! let frame = Frame::new("main", Arc::new(instructions), Arc::new(vec![Value::Int(1), Value::Int(2)]), 0);
//! engine.push_frame(frame);
//! let result = engine.run().unwrap();
//! assert_eq!(result, Value::Int(3));
//! ```

/// The built-in call interface (spec §6 C6).
pub mod builtin;
/// Class, interface, and trait resolution (spec §3/§5 C-class system).
pub mod class;
/// Closures and first-class callables.
pub mod closure;
/// Process-wide script execution state (spec §3/§6 C4).
pub mod context;
/// Breakpoints and step execution.
pub mod debugger;
/// VM error types and result handling.
pub mod error;
/// Per-invocation call frame state (spec §3 C3).
pub mod frame;
/// Compiler-facing function/class descriptors.
pub mod function;
/// Generator coroutine model (spec §4.8 C7).
pub mod generator;
/// The parallel goroutine executor (spec §4.9 C8).
pub mod goroutine;
/// HTTP header context for output buffering.
pub mod http;
/// Bytecode instruction representation (spec §4.2 C2).
pub mod instruction;
/// Foreach iteration protocol support.
pub mod iterator;
/// OpCode dispatch table, split by instruction family (spec §4.3 C5).
pub mod jump_table;
/// Execution metrics collection.
pub mod metrics;
/// The object data model (spec §3).
pub mod object;
/// VM opcode definitions.
pub mod opcode;
/// The operand codec (spec §4.2 C2).
pub mod operand;
/// The output buffer stack (spec §6).
pub mod output;
/// PHP-style ordered array implementation.
pub mod php_array;
/// Utility for constructing VM bytecode programmatically.
pub mod script_builder;
/// Cancellable wall-clock timeout handle.
pub mod timeout;
/// The tagged-union value model (spec §4.1 C1).
pub mod value;

/// The dispatch loop (spec §4.3 C5).
pub mod engine;

pub use builtin::{BuiltinContext, BuiltinHandler, BuiltinRegistry};
pub use class::ClassTable;
pub use closure::{CallTarget, ClosureValue};
pub use context::{CompilerCallback, Context, FunctionRegistry};
pub use debugger::{Breakpoint, Debugger};
pub use engine::{Engine, InstructionHandler, VMState};
pub use error::{VmError, VmResult};
pub use frame::{ExceptionHandler, Frame, PendingCall};
pub use function::{ClassDescriptor, FunctionDescriptor, ParamDescriptor, TypeHint};
pub use generator::{CoroutineState, Delegate, GeneratorCoroutine, GeneratorHandle};
pub use http::HttpHeaderContext;
pub use instruction::Instruction;
pub use iterator::{Iterator as FrameIterator, IteratorSource};
pub use jump_table::JumpTable;
pub use object::PhpObject;
pub use opcode::OpCode;
pub use operand::{AddressingMode, Operand};
pub use output::{BufferStatus, OutputBufferStack};
pub use php_array::{ArrayKey, PhpArray};
pub use script_builder::ScriptBuilder;
pub use timeout::TimeoutHandle;
pub use value::{Number, Value};
