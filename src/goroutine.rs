//! The parallel goroutine executor (spec §4.9 "Goroutine Executor", C8).
//!
//! Runs a closure in complete isolation: a fresh context deep-copied from
//! the caller (globals + a cloned handle to the read-mostly class table),
//! a fresh frame with the closure's captured variables bound into locals
//! by name, run to completion. The only state genuinely shared across
//! workers is the class/function registry, which is read-mostly after
//! setup and protected by the `RwLock`s inside [`ClassTable`] and
//! [`FunctionRegistry`].

use crate::closure::{CallTarget, ClosureValue};
use crate::context::Context;
use crate::engine::Engine;
use crate::error::{VmError, VmResult};
use crate::frame::Frame;
use crate::value::Value;

/// Spawns `closure` against an isolated deep copy of `caller_context` and
/// runs it to completion, returning the final stack-top value (spec
/// §4.9). This call blocks the calling thread; true OS-thread parallelism
/// is the embedder's responsibility (e.g. spawning this function on a
/// thread pool) — the contract here is only isolation, not concurrency
/// itself.
pub fn run_isolated(caller_context: &Context, closure: &ClosureValue) -> VmResult<Value> {
    let function = match &closure.target {
        CallTarget::Function(descriptor) => descriptor.clone(),
        CallTarget::BoundMethod { .. } | CallTarget::StaticMethod { .. } => {
            return Err(VmError::InvalidExecutionState {
                reason: "goroutine executor only accepts plain function closures".to_string(),
            });
        }
    };

    let mut forked_context = caller_context.forked();
    let mut frame = Frame::new(
        function.name.clone(),
        function.instructions.clone(),
        function.constants.clone(),
        function.slot_count,
    );
    for (idx, slot_name) in function.slot_names.iter().enumerate() {
        if let Some(name) = slot_name {
            frame.bind_slot_name(idx as u32, name.clone());
            if let Some(value) = closure.bound_vars.get(name) {
                frame.locals[idx] = value.clone();
            }
        }
    }
    if let Some(this) = &closure.bound_this {
        frame.this = Some(this.clone());
    }

    let mut engine = Engine::new(&mut forked_context);
    engine.push_frame(frame);
    engine.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassTable;
    use crate::context::FunctionRegistry;
    use crate::function::FunctionDescriptor;
    use crate::instruction::Instruction;
    use crate::opcode::OpCode;
    use crate::operand::Operand;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[test]
    fn isolated_run_does_not_mutate_caller_globals() {
        let caller = Context::new(ClassTable::new(), FunctionRegistry::new());
        caller.set_global("shared", Value::Int(1));

        // A trivial function: `ADD const[0], const[1] -> tmp[0]; RETURN tmp[0]`.
        let instructions = vec![
            Instruction::new(OpCode::Add, Operand::constant(0), Operand::constant(1), Operand::tmp(0)),
            Instruction::new(OpCode::Return, Operand::tmp(0), Operand::UNUSED, Operand::UNUSED),
        ];
        let descriptor = Arc::new(FunctionDescriptor {
            name: "f".to_string(),
            params: Vec::new(),
            instructions: Arc::new(instructions),
            constants: Arc::new(vec![Value::Int(2), Value::Int(3)]),
            is_generator: false,
            slot_count: 0,
            slot_names: Vec::new(),
        });
        let closure = ClosureValue {
            target: CallTarget::Function(descriptor),
            bound_vars: HashMap::new(),
            bound_this: None,
        };

        let result = run_isolated(&caller, &closure).unwrap();
        assert_eq!(result, Value::Int(5));
        assert_eq!(caller.get_global("shared"), Value::Int(1));
    }
}

