//! `JMP, JMPZ, JMPNZ` (spec §4.3 "Control" family): set IP directly;
//! `JMPZ` inverts truthiness. These handlers always return
//! `advance_ip = false` since they set the IP themselves.

use super::JumpTable;
use crate::engine::Engine;
use crate::error::VmResult;
use crate::instruction::Instruction;
use crate::opcode::OpCode;

pub fn register(table: &mut JumpTable) {
    table.set(OpCode::Jmp, jmp);
    table.set(OpCode::Jmpz, jmpz);
    table.set(OpCode::Jmpnz, jmpnz);
}

/// The jump target is carried in `op1`'s slot index regardless of
/// addressing mode — codegen always emits it as a `CONST`-style literal
/// offset, mirroring the teacher's "jump operands hold raw IPs" convention.
fn jump_target(instr: &Instruction) -> usize {
    instr.op1.index as usize
}

fn jmp(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    engine.frame_mut().ip = jump_target(instr);
    Ok(false)
}

fn jmpz(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let cond = engine.read(instr.op2)?;
    if !cond.to_bool() {
        engine.frame_mut().ip = jump_target(instr);
        Ok(false)
    } else {
        Ok(true)
    }
}

fn jmpnz(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let cond = engine.read(instr.op2)?;
    if cond.to_bool() {
        engine.frame_mut().ip = jump_target(instr);
        Ok(false)
    } else {
        Ok(true)
    }
}
