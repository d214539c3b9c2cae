//! `THROW, CATCH, FINALLY, ASSIGN_EXCEPTION, EXCEPTION_MATCH,
//! CLEAR_EXCEPTION, RETHROW` (spec §4.6 "Exception Unwind Protocol").
//!
//! The actual handler-stack walk lives in [`Engine::unwind`]; these
//! handlers only push/pop handler frames and manage
//! `frame.pending_exception`.

use super::JumpTable;
use crate::engine::Engine;
use crate::error::{VmError, VmResult};
use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::value::Value;

pub fn register(table: &mut JumpTable) {
    table.set(OpCode::Throw, throw);
    table.set(OpCode::Catch, catch);
    table.set(OpCode::Finally, finally);
    table.set(OpCode::AssignException, assign_exception);
    table.set(OpCode::ExceptionMatch, exception_match);
    table.set(OpCode::ClearException, clear_exception);
    table.set(OpCode::Rethrow, rethrow);
}

/// `THROW op1`: signals the dispatch loop's unwind protocol by returning
/// the `Thrown` sentinel error rather than walking handlers itself — the
/// loop in `engine.rs` is the single place that pops frames, matching
/// how builtins raise exceptions through `BuiltinContext::throw`.
fn throw(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let exception = engine.read(instr.op1)?;
    Err(VmError::Thrown(exception))
}

/// `CATCH catch_ip, finally_ip`: registers a handler pair for the region
/// that follows (spec §4.6: "a `try` block pushes a handler").
fn catch(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let catch_ip = instr.op1.index as i64;
    let finally_ip = if instr.op2.is_unused() {
        -1
    } else {
        instr.op2.index as i64
    };
    engine.frame_mut().push_handler(catch_ip, finally_ip);
    Ok(true)
}

/// `FINALLY finally_ip`: registers a finally-only handler (no catch) for
/// a `try`/`finally` without a `catch` clause.
fn finally(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let finally_ip = instr.op1.index as i64;
    engine.frame_mut().push_handler(-1, finally_ip);
    Ok(true)
}

/// `ASSIGN_EXCEPTION -> result`: binds the frame's pending exception into
/// the `catch ($e)` variable (spec §4.6 "on entering a catch block, the
/// pending exception is assigned to the catch variable").
fn assign_exception(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let exception = engine
        .frame()
        .pending_exception
        .clone()
        .ok_or(VmError::NoPendingException)?;
    engine.write(instr.op3, exception)?;
    Ok(true)
}

/// `EXCEPTION_MATCH class_name -> bool`: whether the pending exception is
/// an instance of `class_name`, without clearing it (a `catch` clause may
/// need to test several types before committing to one).
fn exception_match(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let class_name = engine.read(instr.op1)?.to_php_string();
    let exception = engine
        .frame()
        .pending_exception
        .clone()
        .ok_or(VmError::NoPendingException)?;
    let matches = match exception {
        Value::Object(obj) => {
            let actual = obj.borrow().class_name.clone();
            engine.context.classes.is_instance_of(&actual, &class_name)
        }
        _ => false,
    };
    engine.write(instr.op3, Value::Bool(matches))?;
    Ok(true)
}

fn clear_exception(engine: &mut Engine<'_>, _instr: &Instruction) -> VmResult<bool> {
    engine.frame_mut().pending_exception = None;
    Ok(true)
}

/// `RETHROW`: re-signals the frame's pending exception through the
/// unwind protocol, used at the end of a `finally` block that ran after
/// an exception it doesn't itself catch.
fn rethrow(engine: &mut Engine<'_>, _instr: &Instruction) -> VmResult<bool> {
    let exception = engine
        .frame_mut()
        .pending_exception
        .take()
        .ok_or(VmError::NoPendingException)?;
    Err(VmError::Thrown(exception))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassTable;
    use crate::context::{Context, FunctionRegistry};
    use crate::frame::Frame;
    use crate::operand::Operand;
    use std::sync::Arc;

    #[test]
    fn throw_returns_thrown_sentinel() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(vec![Value::str("boom")]), 0);
        engine.push_frame(frame);
        let instr = Instruction::new(OpCode::Throw, Operand::constant(0), Operand::UNUSED, Operand::UNUSED);
        let err = throw(&mut engine, &instr).unwrap_err();
        assert!(matches!(err, VmError::Thrown(_)));
    }

    #[test]
    fn assign_exception_requires_a_pending_one() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(Vec::new()), 0);
        engine.push_frame(frame);
        let instr = Instruction::new(OpCode::AssignException, Operand::UNUSED, Operand::UNUSED, Operand::tmp(0));
        let err = assign_exception(&mut engine, &instr).unwrap_err();
        assert!(matches!(err, VmError::NoPendingException));
    }

    #[test]
    fn rethrow_clears_pending_exception_before_escaping() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(Vec::new()), 0);
        engine.push_frame(frame);
        engine.frame_mut().pending_exception = Some(Value::str("boom"));
        let err = rethrow(&mut engine, &Instruction::bare(OpCode::Rethrow)).unwrap_err();
        assert!(matches!(err, VmError::Thrown(_)));
        assert!(engine.frame().pending_exception.is_none());
    }
}
