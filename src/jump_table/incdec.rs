//! `PRE_INC, POST_INC, PRE_DEC, POST_DEC` (spec §4.3 "Inc/Dec" family):
//! pre returns the new value, post returns the old one.

use super::JumpTable;
use crate::engine::Engine;
use crate::error::VmResult;
use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::value::{self, Value};

pub fn register(table: &mut JumpTable) {
    table.set(OpCode::PreInc, pre_inc);
    table.set(OpCode::PostInc, post_inc);
    table.set(OpCode::PreDec, pre_dec);
    table.set(OpCode::PostDec, post_dec);
}

fn pre_inc(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let current = engine.read(instr.op1)?;
    let updated = value::arithmetic_add(&current, &Value::Int(1));
    engine.write(instr.op1, updated.clone())?;
    engine.write(instr.op3, updated)?;
    Ok(true)
}

fn post_inc(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let current = engine.read(instr.op1)?;
    let updated = value::arithmetic_add(&current, &Value::Int(1));
    engine.write(instr.op1, updated)?;
    engine.write(instr.op3, current)?;
    Ok(true)
}

fn pre_dec(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let current = engine.read(instr.op1)?;
    let updated = value::arithmetic_sub(&current, &Value::Int(1));
    engine.write(instr.op1, updated.clone())?;
    engine.write(instr.op3, updated)?;
    Ok(true)
}

fn post_dec(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let current = engine.read(instr.op1)?;
    let updated = value::arithmetic_sub(&current, &Value::Int(1));
    engine.write(instr.op1, updated)?;
    engine.write(instr.op3, current)?;
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
    fn post_inc_returns_old_value_but_updates_slot() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        let mut frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(Vec::new()), 1);
        frame.locals[0] = Value::Int(5);
        engine.push_frame(frame);
        let instr = Instruction::new(OpCode::PostInc, Operand::var(0), Operand::UNUSED, Operand::tmp(0));
        post_inc(&mut engine, &instr).unwrap();
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::Int(5)));
        assert_eq!(engine.frame().locals[0], Value::Int(6));
    }

    #[test]
    fn pre_dec_returns_new_value() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        let mut frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(Vec::new()), 1);
        frame.locals[0] = Value::Int(5);
        engine.push_frame(frame);
        let instr = Instruction::new(OpCode::PreDec, Operand::var(0), Operand::UNUSED, Operand::tmp(0));
        pre_dec(&mut engine, &instr).unwrap();
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::Int(4)));
        assert_eq!(engine.frame().locals[0], Value::Int(4));
    }
}
