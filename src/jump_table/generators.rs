//! `YIELD, YIELD_FROM` (spec §4.8 "Generator Coroutine", C7).
//!
//! The opcodes themselves only ever run inside a coroutine's own frame,
//! reached through [`advance`] — the dispatch loop never executes them
//! through the ordinary `run()` path, since a generator's frame is never
//! pushed onto the caller's stack directly (`calls.rs`'s `DO_FCALL` wraps
//! it in a [`GeneratorHandle`](crate::generator::GeneratorHandle) instead).

use super::JumpTable;
use crate::engine::Engine;
use crate::error::{VmError, VmResult};
use crate::generator::{CoroutineState, Delegate, GeneratorHandle};
use crate::instruction::Instruction;
use crate::iterator::Iterator as FrameIterator;
use crate::opcode::OpCode;
use crate::value::Value;

pub fn register(table: &mut JumpTable) {
    table.set(OpCode::Yield, yield_value);
    table.set(OpCode::YieldFrom, yield_from);
}

/// `YIELD key, value`: suspends the coroutine currently being driven.
/// `op3`, if bound, receives whatever `->send()` passes on resume — left
/// untouched here; [`advance`] writes it once it knows the resumed
/// value, then moves the IP past this instruction.
fn yield_value(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let key = if instr.op1.is_unused() {
        None
    } else {
        Some(engine.read(instr.op1)?)
    };
    let value = engine.read(instr.op2)?;
    engine.pending_yield = Some((key, value));
    Ok(false)
}

/// `YIELD_FROM source`: records the delegation source; [`advance`]
/// resolves it into a [`Delegate`] on the next drive.
fn yield_from(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let source = engine.read(instr.op1)?;
    engine.pending_delegate = Some(source);
    Ok(false)
}

fn placeholder_frame() -> crate::frame::Frame {
    crate::frame::Frame::new("", std::sync::Arc::new(Vec::new()), std::sync::Arc::new(Vec::new()), 0)
}

fn build_delegate(source: Value) -> VmResult<Delegate> {
    match source {
        Value::Generator(handle) => Ok(Delegate::Generator(handle)),
        Value::Array(array) => Ok(Delegate::Iterable(FrameIterator::snapshot(&array.borrow()))),
        other => Err(VmError::invalid_operand_type("generator or array", other.type_name())),
    }
}

/// Runs `handle`'s coroutine forward: resumes it with `sent` (the value
/// a `->send($sent)` call hands back at the suspended `YIELD`, ignored
/// the first time a coroutine is driven) until it yields again or its
/// frame completes (spec §4.8 "Advance"/"Resume").
pub fn advance(engine: &mut Engine<'_>, handle: &GeneratorHandle, sent: Value) -> VmResult<()> {
    if handle.borrow().is_completed() {
        return Ok(());
    }

    if let Some(delegate) = handle.borrow_mut().delegate.take() {
        return advance_delegate(engine, handle, delegate, sent);
    }

    let was_started = handle.borrow().state != CoroutineState::NotStarted;
    let mut frame = std::mem::replace(&mut handle.borrow_mut().frame, placeholder_frame());
    if was_started {
        if let Some(instr) = frame.current_instruction().copied() {
            frame.write_operand(instr.op3, sent)?;
        }
        frame.ip += 1;
    }

    let saved = std::mem::replace(&mut engine.frames, vec![frame]);
    engine.pending_yield = None;
    engine.pending_delegate = None;
    let run_result: VmResult<()> = (|| {
        while !engine.frames.is_empty() && engine.pending_yield.is_none() && engine.pending_delegate.is_none() {
            engine.execute_next()?;
        }
        Ok(())
    })();

    let pending_delegate = engine.pending_delegate.take();
    let pending_yield = engine.pending_yield.take();
    let mut entered_delegation = false;

    let outcome = run_result.and_then(|()| -> VmResult<()> {
        if let Some(source) = pending_delegate {
            let frame = engine.frames.pop().expect("coroutine frame missing at delegation point");
            let delegate = build_delegate(source)?;
            let mut coroutine = handle.borrow_mut();
            coroutine.frame = frame;
            coroutine.delegate = Some(delegate);
            entered_delegation = true;
            return Ok(());
        }
        if let Some((key, value)) = pending_yield {
            let frame = engine.frames.pop().expect("coroutine frame missing at yield point");
            let mut coroutine = handle.borrow_mut();
            coroutine.frame = frame;
            coroutine.suspend_with(key, value);
            return Ok(());
        }
        let return_value = engine.take_last_return_value();
        handle.borrow_mut().mark_completed(return_value);
        Ok(())
    });

    engine.frames = saved;
    outcome?;
    if entered_delegation {
        return advance(engine, handle, Value::Null);
    }
    Ok(())
}

/// Drives a `YIELD_FROM` delegate one step. A generator delegate is
/// driven recursively (so nested `yield from` chains flatten); an array
/// delegate just walks its snapshot.
fn advance_delegate(engine: &mut Engine<'_>, handle: &GeneratorHandle, delegate: Delegate, sent: Value) -> VmResult<()> {
    match delegate {
        Delegate::Generator(inner) => {
            advance(engine, &inner, sent)?;
            if inner.borrow().is_completed() {
                let return_value = inner.borrow().return_value.clone();
                return advance(engine, handle, return_value);
            }
            let key = inner.borrow().current_key.clone();
            let value = inner.borrow().current_value.clone();
            let mut coroutine = handle.borrow_mut();
            coroutine.delegate = Some(Delegate::Generator(inner));
            coroutine.current_key = key;
            coroutine.current_value = value;
            coroutine.state = CoroutineState::Suspended;
            Ok(())
        }
        Delegate::Iterable(mut iterator) => match iterator.fetch_array() {
            Some((key, value)) => {
                let mut coroutine = handle.borrow_mut();
                coroutine.delegate = Some(Delegate::Iterable(iterator));
                coroutine.current_key = Some(key);
                coroutine.current_value = Some(value);
                coroutine.state = CoroutineState::Suspended;
                Ok(())
            }
            None => advance(engine, handle, Value::Null),
        },
    }
}
