//! Helps construct instruction streams programmatically (spec SPEC_FULL §A
//! test tooling, grounded on the teacher's own `ScriptBuilder`). Since this
//! VM's unit is a typed `Instruction` rather than a raw opcode byte stream,
//! the builder emits `Instruction`s directly instead of serialized bytes.

use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::operand::Operand;
use crate::value::Value;

/// Fluent builder for an instruction stream plus its constant pool, used
/// by tests to assemble small programs without hand-indexing operands.
#[derive(Default)]
pub struct ScriptBuilder {
    instructions: Vec<Instruction>,
    constants: Vec<Value>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `value` into the constant pool and returns a `CONST`
    /// operand addressing it.
    pub fn constant(&mut self, value: Value) -> Operand {
        let index = self.constants.len() as u32;
        self.constants.push(value);
        Operand::constant(index)
    }

    pub fn emit(&mut self, opcode: OpCode, op1: Operand, op2: Operand, op3: Operand) -> &mut Self {
        self.instructions.push(Instruction::new(opcode, op1, op2, op3));
        self
    }

    pub fn emit_bare(&mut self, opcode: OpCode) -> &mut Self {
        self.instructions.push(Instruction::bare(opcode));
        self
    }

    /// Current length of the instruction stream — useful for computing
    /// forward-jump targets before the jump site is known.
    pub fn here(&self) -> usize {
        self.instructions.len()
    }

    pub fn build(self) -> (Vec<Instruction>, Vec<Value>) {
        (self.instructions, self.constants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_two_instruction_add_and_return() {
        let mut builder = ScriptBuilder::new();
        let ten = builder.constant(Value::Int(10));
        let twenty = builder.constant(Value::Int(20));
        builder.emit(OpCode::Add, ten, twenty, Operand::tmp(0));
        builder.emit(OpCode::Return, Operand::tmp(0), Operand::UNUSED, Operand::UNUSED);
        let (instructions, constants) = builder.build();
        assert_eq!(instructions.len(), 2);
        assert_eq!(constants, vec![Value::Int(10), Value::Int(20)]);
    }
}
