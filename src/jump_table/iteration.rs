//! `FE_RESET, FE_FETCH, FE_FREE` (spec §4.7 "Iteration Protocol").
//!
//! The iterator slot id is carried raw in an operand's `.index`, the
//! same "jump operands hold a raw integer regardless of addressing
//! mode" convention `control.rs` uses for jump targets — there's no
//! value to dereference, just a key into `frame.iterators`.

use super::calls::call_method_sync;
use super::generators;
use super::JumpTable;
use crate::engine::Engine;
use crate::error::{VmError, VmResult};
use crate::generator::CoroutineState;
use crate::instruction::Instruction;
use crate::iterator::{Iterator as FrameIterator, IteratorSource};
use crate::opcode::OpCode;
use crate::value::Value;

pub fn register(table: &mut JumpTable) {
    table.set(OpCode::FeReset, fe_reset);
    table.set(OpCode::FeFetch, fe_fetch);
    table.set(OpCode::FeFree, fe_free);
}

/// `FE_RESET source[, by_ref] -> iterator_slot`: `op2` just has to be
/// non-`UNUSED` to request by-reference iteration; the slot id lives in
/// `op3.index`.
fn fe_reset(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let source = engine.read(instr.op1)?;
    let by_ref = !instr.op2.is_unused();
    let slot = instr.op3.index;

    let iterator = match source {
        Value::Array(array) => {
            if by_ref {
                FrameIterator::by_reference(std::rc::Rc::clone(&array))
            } else {
                FrameIterator::snapshot(&array.borrow())
            }
        }
        Value::Generator(handle) => {
            if handle.borrow().state == CoroutineState::NotStarted {
                generators::advance(engine, &handle, Value::Null)?;
            }
            FrameIterator::generator(handle)
        }
        Value::Object(_) => FrameIterator::object_protocol(source),
        other => return Err(VmError::invalid_operand_type("array, generator, or object", other.type_name())),
    };
    engine.frame_mut().iterators.insert(slot, iterator);
    Ok(true)
}

fn iterator_slot(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<u32> {
    let slot = instr.op1.index;
    if !engine.frame().iterators.contains_key(&slot) {
        return Err(VmError::InvalidClassContext {
            reason: format!("FE_FETCH/FE_FREE on unknown iterator slot {slot}"),
        });
    }
    Ok(slot)
}

enum IterKind {
    Array,
    Generator(crate::generator::GeneratorHandle),
    Object(Value),
}

fn iterator_kind(engine: &Engine<'_>, slot: u32) -> IterKind {
    match &engine.frame().iterators.get(&slot).unwrap().source {
        IteratorSource::Snapshot { .. } | IteratorSource::ByRef { .. } => IterKind::Array,
        IteratorSource::Generator(handle) => IterKind::Generator(handle.clone()),
        IteratorSource::ObjectProtocol { object } => IterKind::Object(object.clone()),
    }
}

/// `FE_FETCH slot -> value, key`: `op2` receives the value, `op3` (if
/// bound) the key. Exhaustion writes `Value::Null` to both, which the
/// compiler is expected to test with a follow-up `JMPZ` (spec §4.7:
/// "produces the next (key, value) or (null, null) on exhaustion").
fn fe_fetch(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let slot = iterator_slot(engine, instr)?;
    let pair = match iterator_kind(engine, slot) {
        IterKind::Array => engine.frame_mut().iterators.get_mut(&slot).unwrap().fetch_array(),
        IterKind::Generator(handle) => fetch_generator(engine, &slot, &handle)?,
        IterKind::Object(object) => fetch_object_protocol(engine, &slot, object)?,
    };
    let (key, value) = pair.unwrap_or((Value::Null, Value::Null));
    engine.write(instr.op2, value)?;
    if !instr.op3.is_unused() {
        engine.write(instr.op3, key)?;
    }
    Ok(true)
}

fn fe_free(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let slot = instr.op1.index;
    engine.frame_mut().iterators.remove(&slot);
    Ok(true)
}

/// Pulls the coroutine's current `(key, value)`, advancing it first
/// unless this is the very first fetch after `FE_RESET` already primed it.
fn fetch_generator(
    engine: &mut Engine<'_>,
    slot: &u32,
    handle: &crate::generator::GeneratorHandle,
) -> VmResult<Option<(Value, Value)>> {
    let is_first = engine.frame().iterators.get(slot).unwrap().is_first;
    if !is_first {
        generators::advance(engine, handle, Value::Null)?;
    }
    engine.frame_mut().iterators.get_mut(slot).unwrap().is_first = false;
    if handle.borrow().is_completed() {
        return Ok(None);
    }
    let coroutine = handle.borrow();
    Ok(coroutine.current_key.clone().zip(coroutine.current_value.clone()))
}

/// Drives `rewind`/`valid`/`current`/`key`/`next` on an object implementing
/// the Iterator protocol (spec §4.7: "FE_FETCH dispatches `rewind` on
/// first iteration and `next` thereafter, then consults `valid`/
/// `current`/`key`").
fn fetch_object_protocol(engine: &mut Engine<'_>, slot: &u32, object: Value) -> VmResult<Option<(Value, Value)>> {
    let is_first = engine.frame().iterators.get(slot).unwrap().is_first;
    if is_first {
        call_method_sync(engine, object.clone(), "rewind", Vec::new())?;
    } else {
        call_method_sync(engine, object.clone(), "next", Vec::new())?;
    }
    engine.frame_mut().iterators.get_mut(slot).unwrap().is_first = false;

    let valid = call_method_sync(engine, object.clone(), "valid", Vec::new())?;
    if !valid.to_bool() {
        return Ok(None);
    }
    let value = call_method_sync(engine, object.clone(), "current", Vec::new())?;
    let key = call_method_sync(engine, object, "key", Vec::new())?;
    Ok(Some((key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassTable;
    use crate::context::{Context, FunctionRegistry};
    use crate::frame::Frame;
    use crate::operand::Operand;
    use crate::php_array::{ArrayKey, PhpArray};
    use std::sync::Arc;

    fn push_frame(engine: &mut Engine<'_>, constants: Vec<Value>) {
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(constants), 1);
        engine.push_frame(frame);
    }

    #[test]
    fn resets_and_fetches_an_array_snapshot_in_iteration_order() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        let mut array = PhpArray::new();
        array.insert(ArrayKey::Int(10), Value::str("a"));
        array.insert(ArrayKey::Int(1), Value::str("b"));
        push_frame(&mut engine, vec![Value::array(array)]);

        fe_reset(
            &mut engine,
            &Instruction::new(OpCode::FeReset, Operand::constant(0), Operand::UNUSED, Operand::var(0)),
        )
        .unwrap();

        let fetch = Instruction::new(OpCode::FeFetch, Operand::var(0), Operand::tmp(0), Operand::tmp(1));
        fe_fetch(&mut engine, &fetch).unwrap();
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::str("b")));
        assert_eq!(engine.frame().temporaries.get(&1), Some(&Value::Int(1)));

        fe_fetch(&mut engine, &fetch).unwrap();
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::str("a")));

        fe_fetch(&mut engine, &fetch).unwrap();
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::Null));
        assert_eq!(engine.frame().temporaries.get(&1), Some(&Value::Null));
    }

    #[test]
    fn fe_free_removes_the_iterator() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        push_frame(&mut engine, vec![Value::array(PhpArray::new())]);
        fe_reset(
            &mut engine,
            &Instruction::new(OpCode::FeReset, Operand::constant(0), Operand::UNUSED, Operand::var(0)),
        )
        .unwrap();
        assert!(engine.frame().iterators.contains_key(&0));
        fe_free(&mut engine, &Instruction::new(OpCode::FeFree, Operand::var(0), Operand::UNUSED, Operand::UNUSED)).unwrap();
        assert!(!engine.frame().iterators.contains_key(&0));
    }

    #[test]
    fn fetching_an_unknown_slot_is_rejected() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        push_frame(&mut engine, Vec::new());
        let fetch = Instruction::new(OpCode::FeFetch, Operand::var(7), Operand::tmp(0), Operand::UNUSED);
        let err = fe_fetch(&mut engine, &fetch).unwrap_err();
        assert!(matches!(err, VmError::InvalidClassContext { .. }));
    }
}
