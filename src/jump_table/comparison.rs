//! `IS_EQUAL, IS_IDENTICAL, IS_SMALLER, SPACESHIP, …` (spec §4.3
//! "Comparison" family): boolean or int result.

use super::JumpTable;
use crate::engine::Engine;
use crate::error::VmResult;
use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::value::Value;
use std::cmp::Ordering;

pub fn register(table: &mut JumpTable) {
    table.set(OpCode::IsEqual, is_equal);
    table.set(OpCode::IsNotEqual, is_not_equal);
    table.set(OpCode::IsIdentical, is_identical);
    table.set(OpCode::IsNotIdentical, is_not_identical);
    table.set(OpCode::IsSmaller, is_smaller);
    table.set(OpCode::IsSmallerOrEqual, is_smaller_or_equal);
    table.set(OpCode::Spaceship, spaceship);
    table.set(OpCode::BoolNot, bool_not);
    table.set(OpCode::BoolAnd, bool_and);
    table.set(OpCode::BoolOr, bool_or);
}

fn is_equal(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?;
    let b = engine.read(instr.op2)?;
    engine.write(instr.op3, Value::Bool(a.loose_eq(&b)))?;
    Ok(true)
}

fn is_not_equal(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?;
    let b = engine.read(instr.op2)?;
    engine.write(instr.op3, Value::Bool(!a.loose_eq(&b)))?;
    Ok(true)
}

fn is_identical(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?;
    let b = engine.read(instr.op2)?;
    engine.write(instr.op3, Value::Bool(a.identical(&b)))?;
    Ok(true)
}

fn is_not_identical(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?;
    let b = engine.read(instr.op2)?;
    engine.write(instr.op3, Value::Bool(!a.identical(&b)))?;
    Ok(true)
}

fn is_smaller(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?;
    let b = engine.read(instr.op2)?;
    let result = a.compare(&b) == Some(Ordering::Less);
    engine.write(instr.op3, Value::Bool(result))?;
    Ok(true)
}

fn is_smaller_or_equal(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?;
    let b = engine.read(instr.op2)?;
    let result = matches!(a.compare(&b), Some(Ordering::Less | Ordering::Equal));
    engine.write(instr.op3, Value::Bool(result))?;
    Ok(true)
}

fn spaceship(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?;
    let b = engine.read(instr.op2)?;
    engine.write(instr.op3, Value::Int(a.spaceship(&b)))?;
    Ok(true)
}

fn bool_not(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?;
    engine.write(instr.op3, Value::Bool(!a.to_bool()))?;
    Ok(true)
}

fn bool_and(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?;
    let b = engine.read(instr.op2)?;
    engine.write(instr.op3, Value::Bool(a.to_bool() && b.to_bool()))?;
    Ok(true)
}

fn bool_or(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?;
    let b = engine.read(instr.op2)?;
    engine.write(instr.op3, Value::Bool(a.to_bool() || b.to_bool()))?;
    Ok(true)
}
