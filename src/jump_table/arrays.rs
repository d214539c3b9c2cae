//! `INIT_ARRAY, ADD_ARRAY_ELEMENT, ADD_ARRAY_UNPACK` (spec §4.3 "Array"
//! family): array literal construction. `op3` always carries the array
//! under construction so each opcode can thread it through without a
//! dedicated "current array" register.

use super::JumpTable;
use crate::engine::Engine;
use crate::error::VmResult;
use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::php_array::{ArrayKey, PhpArray};
use crate::value::Value;

pub fn register(table: &mut JumpTable) {
    table.set(OpCode::InitArray, init_array);
    table.set(OpCode::AddArrayElement, add_array_element);
    table.set(OpCode::AddArrayUnpack, add_array_unpack);
}

/// `INIT_ARRAY`: starts a new literal, optionally seeded with the first
/// `key => value` pair (`op1` key, `op2` value; both `UNUSED` for `[]`).
fn init_array(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let mut array = PhpArray::new();
    if !instr.op2.is_unused() {
        let value = engine.read(instr.op2)?;
        if instr.op1.is_unused() {
            array.push(value);
        } else {
            let key = ArrayKey::normalize(&engine.read(instr.op1)?);
            array.insert(key, value);
        }
    }
    engine.write(instr.op3, Value::array(array))?;
    Ok(true)
}

/// `ADD_ARRAY_ELEMENT`: appends `op2` under `op1` (or under the next index
/// when `op1` is `UNUSED`) to the array already in `op3`.
fn add_array_element(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let container = engine.read(instr.op3)?;
    let Value::Array(array) = container else {
        return Err(crate::error::VmError::invalid_operand_type("array", "non-array"));
    };
    let value = engine.read(instr.op2)?;
    let mut array = array.borrow_mut();
    if instr.op1.is_unused() {
        array.push(value);
    } else {
        let key = ArrayKey::normalize(&engine.read(instr.op1)?);
        array.insert(key, value);
    }
    Ok(true)
}

/// `ADD_ARRAY_UNPACK` (`...$spread`): merges every entry of `op2`'s array
/// into `op3`'s, string keys overwriting, int keys re-indexed by append
/// (PHP's spread-in-array-literal semantics).
fn add_array_unpack(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let container = engine.read(instr.op3)?;
    let Value::Array(target) = container else {
        return Err(crate::error::VmError::invalid_operand_type("array", "non-array"));
    };
    let source = engine.read(instr.op2)?;
    let Value::Array(source) = source else {
        return Err(crate::error::VmError::invalid_operand_type("array", "non-array"));
    };
    let source = source.borrow();
    let mut target = target.borrow_mut();
    for (key, value) in source.iter() {
        match key {
            ArrayKey::Int(_) => {
                target.push(value.clone());
            }
            ArrayKey::Str(s) => {
                target.insert(ArrayKey::Str(s.clone()), value.clone());
            }
        }
    }
    Ok(true)
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
    fn init_array_then_add_element_builds_expected_array() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(vec![Value::Int(7)]), 0);
        engine.push_frame(frame);

        let init = Instruction::new(OpCode::InitArray, Operand::UNUSED, Operand::UNUSED, Operand::tmp(0));
        init_array(&mut engine, &init).unwrap();

        let add = Instruction::new(OpCode::AddArrayElement, Operand::UNUSED, Operand::constant(0), Operand::tmp(0));
        add_array_element(&mut engine, &add).unwrap();

        let Value::Array(arr) = engine.frame().temporaries.get(&0).unwrap().clone() else {
            panic!("expected array");
        };
        assert_eq!(arr.borrow().get(&ArrayKey::Int(0)), Some(&Value::Int(7)));
    }

    #[test]
    fn unpack_re_indexes_int_keys_and_keeps_string_keys() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(Vec::new()), 2);
        engine.push_frame(frame);

        let mut target = PhpArray::new();
        target.push(Value::Int(1));
        engine.frame_mut().locals[0] = Value::array(target);

        let mut source = PhpArray::new();
        source.push(Value::Int(2));
        source.insert(ArrayKey::Str("k".into()), Value::Int(3));
        engine.frame_mut().locals[1] = Value::array(source);

        let instr = Instruction::new(OpCode::AddArrayUnpack, Operand::UNUSED, Operand::var(1), Operand::var(0));
        add_array_unpack(&mut engine, &instr).unwrap();

        let Value::Array(arr) = engine.frame().locals[0].clone() else {
            panic!("expected array");
        };
        let arr = arr.borrow();
        assert_eq!(arr.get(&ArrayKey::Int(0)), Some(&Value::Int(1)));
        assert_eq!(arr.get(&ArrayKey::Int(1)), Some(&Value::Int(2)));
        assert_eq!(arr.get(&ArrayKey::Str("k".into())), Some(&Value::Int(3)));
    }
}
