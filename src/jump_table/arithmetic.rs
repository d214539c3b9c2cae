//! `ADD, SUB, MUL, DIV, MOD, POW, BW_*, SL, SR, BW_NOT, CONCAT` (spec §4.3
//! "Arithmetic" family): two reads, one write; div/mod by zero error out
//! without touching the result slot.

use super::JumpTable;
use crate::engine::Engine;
use crate::error::VmResult;
use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::php_array::PhpArray;
use crate::value::{self, Value};

pub fn register(table: &mut JumpTable) {
    table.set(OpCode::Add, add);
    table.set(OpCode::Sub, sub);
    table.set(OpCode::Mul, mul);
    table.set(OpCode::Div, div);
    table.set(OpCode::Mod, modulo);
    table.set(OpCode::Pow, pow);
    table.set(OpCode::BwAnd, bw_and);
    table.set(OpCode::BwOr, bw_or);
    table.set(OpCode::BwXor, bw_xor);
    table.set(OpCode::BwNot, bw_not);
    table.set(OpCode::Sl, shift_left);
    table.set(OpCode::Sr, shift_right);
    table.set(OpCode::Concat, concat);
}

fn add(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?;
    let b = engine.read(instr.op2)?;
    let result = match (&a, &b) {
        (Value::Array(left), Value::Array(right)) => {
            let merged: PhpArray = left.borrow().union(&right.borrow());
            Value::array(merged)
        }
        _ => value::arithmetic_add(&a, &b),
    };
    engine.write(instr.op3, result)?;
    Ok(true)
}

fn sub(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?;
    let b = engine.read(instr.op2)?;
    engine.write(instr.op3, value::arithmetic_sub(&a, &b))?;
    Ok(true)
}

fn mul(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?;
    let b = engine.read(instr.op2)?;
    engine.write(instr.op3, value::arithmetic_mul(&a, &b))?;
    Ok(true)
}

fn div(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?;
    let b = engine.read(instr.op2)?;
    let result = value::arithmetic_div(&a, &b)?;
    engine.write(instr.op3, result)?;
    Ok(true)
}

fn modulo(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?;
    let b = engine.read(instr.op2)?;
    let result = value::arithmetic_mod(&a, &b)?;
    engine.write(instr.op3, result)?;
    Ok(true)
}

fn pow(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?;
    let b = engine.read(instr.op2)?;
    engine.write(instr.op3, value::arithmetic_pow(&a, &b))?;
    Ok(true)
}

fn bw_and(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?.to_int();
    let b = engine.read(instr.op2)?.to_int();
    engine.write(instr.op3, Value::Int(a & b))?;
    Ok(true)
}

fn bw_or(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?.to_int();
    let b = engine.read(instr.op2)?.to_int();
    engine.write(instr.op3, Value::Int(a | b))?;
    Ok(true)
}

fn bw_xor(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?.to_int();
    let b = engine.read(instr.op2)?.to_int();
    engine.write(instr.op3, Value::Int(a ^ b))?;
    Ok(true)
}

fn bw_not(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?.to_int();
    engine.write(instr.op3, Value::Int(!a))?;
    Ok(true)
}

fn shift_left(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?.to_int();
    let b = engine.read(instr.op2)?.to_int();
    engine.write(instr.op3, Value::Int(a.wrapping_shl(b as u32)))?;
    Ok(true)
}

fn shift_right(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?.to_int();
    let b = engine.read(instr.op2)?.to_int();
    engine.write(instr.op3, Value::Int(a.wrapping_shr(b as u32)))?;
    Ok(true)
}

fn concat(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let a = engine.read(instr.op1)?;
    let b = engine.read(instr.op2)?;
    engine.write(instr.op3, value::concat(&a, &b))?;
    Ok(true)
}
