//! The dispatch loop (spec §4.3 "Dispatch Loop", C5).
//!
//! Mirrors the teacher's `ExecutionEngine`/`JumpTable` split: a fixed-size
//! array of handler function pointers indexed by opcode byte, and a loop
//! that fetches the current frame's instruction, profiles it, checks
//! breakpoints, dispatches, and advances (or not) the instruction
//! pointer based on the handler's verdict.

use crate::context::Context;
use crate::debugger::Debugger;
use crate::error::{VmError, VmResult};
use crate::frame::Frame;
use crate::instruction::Instruction;
use crate::jump_table::JumpTable;
use crate::metrics::Metrics;
use crate::operand::Operand;
use crate::value::Value;

/// Overall VM run state (spec SPEC_FULL §B, grounded on the teacher's
/// `VMState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VMState {
    None,
    Running,
    Break,
    Halt,
    Fault,
}

/// One opcode handler. Returns whether the dispatch loop should advance
/// the frame's IP by one (`true`) or leave it where the handler put it
/// (`false` — jumps, calls, returns; spec §4.3).
pub type InstructionHandler = fn(&mut Engine<'_>, &Instruction) -> VmResult<bool>;

pub struct Engine<'ctx> {
    pub context: &'ctx mut Context,
    pub frames: Vec<Frame>,
    jump_table: JumpTable,
    pub metrics: Metrics,
    pub debugger: Debugger,
    pub state: VMState,
    pub uncaught_exception: Option<Value>,
    pub call_depth_limit: usize,
    pub instruction_limit: Option<u64>,
    executed: u64,
    last_return_value: Value,
    /// The class descriptor under construction between `INIT_CLASS_TABLE`/
    /// `SET_CURRENT_CLASS` and the matching `DECLARE_CLASS` (spec §4.3
    /// "Class declaration" family).
    pub current_class: Option<crate::function::ClassDescriptor>,
    /// Set by `YIELD` before returning `advance_ip = false`, so a
    /// generator-driving loop can tell "suspended" apart from every other
    /// handler that also leaves the IP where it is (spec §4.8 "Suspend").
    pub pending_yield: Option<(Option<Value>, Value)>,
    /// Set by `YIELD_FROM` the same way, carrying the delegation source
    /// instead of a `(key, value)` pair.
    pub pending_delegate: Option<Value>,
}

impl<'ctx> Engine<'ctx> {
    pub fn new(context: &'ctx mut Context) -> Self {
        Self {
            context,
            frames: Vec::new(),
            jump_table: JumpTable::new(),
            metrics: Metrics::new(),
            debugger: Debugger::new(),
            state: VMState::None,
            uncaught_exception: None,
            call_depth_limit: 2048,
            instruction_limit: None,
            executed: 0,
            last_return_value: Value::Null,
            current_class: None,
            pending_yield: None,
            pending_delegate: None,
        }
    }

    /// Takes the value a completed sub-execution returned, leaving `Null`
    /// behind. Used by drivers that temporarily swap `self.frames` for an
    /// isolated stack (generators, synchronous `Iterator` method calls)
    /// and need the result once that stack empties.
    pub fn take_last_return_value(&mut self) -> Value {
        std::mem::replace(&mut self.last_return_value, Value::Null)
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn frame(&self) -> &Frame {
        self.frames.last().expect("no active frame")
    }

    pub fn frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("no active frame")
    }

    pub fn read(&self, operand: Operand) -> VmResult<Value> {
        self.frame().read_operand(operand)
    }

    /// Writes `value` through `operand` in the current frame, mirroring
    /// into the context global table and every other frame's matching
    /// global slot, per spec §4.2.
    pub fn write(&mut self, operand: Operand, value: Value) -> VmResult<()> {
        let mirror = self.frame_mut().write_operand(operand, value)?;
        if let Some((name, mirrored_value)) = mirror {
            self.context.set_global(name.clone(), mirrored_value.clone());
            let depth = self.frames.len();
            for frame in &mut self.frames[..depth.saturating_sub(1)] {
                if let Some(slot) = frame
                    .global_slots
                    .iter()
                    .find(|(_, n)| **n == name)
                    .map(|(slot, _)| *slot)
                {
                    if let Some(local) = frame.locals.get_mut(slot as usize) {
                        *local = mirrored_value.clone();
                    }
                }
            }
        }
        Ok(())
    }

    /// `UNSET_VAR`: clears a slot without following a reference through to
    /// its referent (spec §3 "unset breaks the local's binding").
    pub fn unset(&mut self, operand: Operand) {
        self.frame_mut().unset_operand(operand);
    }

    /// Runs until the frame stack empties, the context halts, or a fault
    /// occurs. Returns the last value produced by a top-level `RETURN`
    /// (or an implicit null return).
    pub fn run(&mut self) -> VmResult<Value> {
        self.state = VMState::Running;
        while self.state == VMState::Running && !self.frames.is_empty() {
            if self.context.timeout.expired() {
                self.state = VMState::Fault;
                return Err(VmError::ExecutionTimeout { timeout_ms: 0 });
            }
            if self.context.halted {
                self.state = VMState::Halt;
                break;
            }
            self.execute_next()?;
        }
        Ok(self.last_return_value.clone())
    }

    /// Executes a single instruction (spec §4.3). Returns `Ok(())` even
    /// when a language-visible exception was thrown and handled by the
    /// unwind protocol; only implementation-fault errors propagate as
    /// `Err`.
    pub fn execute_next(&mut self) -> VmResult<()> {
        let function_name = self.frame().function_name.clone();
        let ip = self.frame().ip;

        if self.frame().current_instruction().is_none() {
            // IP walked off the instruction stream: implicit null return
            // (spec §4.3 / §4.5).
            self.do_return(Value::Null)?;
            return Ok(());
        }

        if self.debugger.has_breakpoint(&function_name, ip) {
            self.state = VMState::Break;
            return Ok(());
        }

        let instruction = *self.frame().current_instruction().unwrap();
        self.metrics.record_instruction(instruction.opcode);
        if let Some(limit) = self.instruction_limit {
            if self.executed >= limit {
                self.state = VMState::Fault;
                return Err(VmError::InstructionLimitExceeded {
                    executed: self.executed,
                    limit,
                });
            }
        }
        self.executed += 1;

        let handler = self.jump_table.get(instruction.opcode);
        let result = match handler {
            Some(handler) => handler(self, &instruction),
            None => Err(VmError::OpcodeNotImplemented {
                opcode: format!("{:?}", instruction.opcode),
            }),
        };

        match result {
            Ok(advance_ip) => {
                if advance_ip {
                    self.frame_mut().ip += 1;
                }
                Ok(())
            }
            Err(VmError::Thrown(exception)) => {
                self.metrics.record_exception_thrown();
                self.unwind(exception)
            }
            Err(other) => {
                self.state = VMState::Fault;
                Err(decorate(other, &function_name, ip))
            }
        }
    }

    /// `THROW`/builtin-sentinel unwind (spec §4.6). Pops exception
    /// handlers one at a time until a `catch-ip`/`finally-ip` is found or
    /// the call stack empties.
    pub fn unwind(&mut self, exception: Value) -> VmResult<()> {
        loop {
            let Some(frame) = self.frames.last_mut() else {
                self.uncaught_exception = Some(exception.clone());
                self.state = VMState::Fault;
                return Err(VmError::UncaughtException {
                    message: exception.to_php_string(),
                });
            };

            match frame.pop_handler() {
                Some(handler) if handler.has_catch() => {
                    frame.pending_exception = Some(exception);
                    frame.ip = handler.catch_ip as usize;
                    return Ok(());
                }
                Some(handler) if handler.has_finally() => {
                    frame.pending_exception = Some(exception.clone());
                    frame.ip = handler.finally_ip as usize;
                    return Ok(());
                }
                Some(_) | None => {
                    if self.frames.len() == 1 {
                        self.uncaught_exception = Some(exception.clone());
                        self.state = VMState::Fault;
                        return Err(VmError::UncaughtException {
                            message: exception.to_php_string(),
                        });
                    }
                    self.frames.pop();
                }
            }
        }
    }

    /// `RETURN` / implicit-null-return (spec §4.5): pops the completed
    /// frame, writes its value into the caller's return target, advances
    /// the caller past the call site.
    pub fn do_return(&mut self, value: Value) -> VmResult<()> {
        let finished = self.frames.pop().expect("return with no active frame");
        self.metrics.record_call_returned();
        match self.frames.last_mut() {
            Some(caller) => {
                caller.ip += 1;
                drop(caller);
                self.write(finished.return_target, value)
            }
            None => {
                self.last_return_value = value;
                Ok(())
            }
        }
    }
}

fn decorate(error: VmError, function_name: &str, ip: usize) -> VmError {
    match error {
        VmError::InvalidInstruction { reason, .. } => VmError::InvalidInstruction {
            ip,
            reason: format!("{reason} (in {function_name})"),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassTable;
    use crate::context::FunctionRegistry;
    use crate::opcode::OpCode;
    use std::sync::Arc;

    fn new_engine(context: &mut Context) -> Engine<'_> {
        Engine::new(context)
    }

    #[test]
    fn add_two_constants_into_a_temp_slot() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = new_engine(&mut context);
        let instructions = vec![Instruction::new(
            OpCode::Add,
            Operand::constant(0),
            Operand::constant(1),
            Operand::tmp(0),
        )];
        let frame = Frame::new(
            "main",
            Arc::new(instructions),
            Arc::new(vec![Value::Int(10), Value::Int(20)]),
            0,
        );
        engine.push_frame(frame);
        engine.execute_next().unwrap();
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::Int(30)));
    }

    #[test]
    fn division_by_zero_does_not_mutate_result_slot() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = new_engine(&mut context);
        let instructions = vec![Instruction::new(
            OpCode::Div,
            Operand::constant(0),
            Operand::constant(1),
            Operand::tmp(0),
        )];
        let frame = Frame::new(
            "main",
            Arc::new(instructions),
            Arc::new(vec![Value::Int(10), Value::Int(0)]),
            0,
        );
        engine.push_frame(frame);
        let err = engine.execute_next().unwrap_err();
        assert!(matches!(err, VmError::DivisionByZero));
        assert!(engine.frame().temporaries.get(&0).is_none());
    }

    #[test]
    fn uncaught_throw_reports_thrown_value_string_form() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = new_engine(&mut context);
        let instructions = vec![Instruction::new(
            OpCode::Throw,
            Operand::constant(0),
            Operand::UNUSED,
            Operand::UNUSED,
        )];
        let frame = Frame::new(
            "main",
            Arc::new(instructions),
            Arc::new(vec![Value::str("boom")]),
            0,
        );
        engine.push_frame(frame);
        let err = engine.execute_next().unwrap_err();
        match err {
            VmError::UncaughtException { message } => assert_eq!(message, "boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
