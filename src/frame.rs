//! The call frame: per-invocation state for one function call (spec §3
//! "Call frame", §4.2 operand codec, §4.6 exception protocol).

use crate::error::{VmError, VmResult};
use crate::function::FunctionDescriptor;
use crate::instruction::Instruction;
use crate::iterator::Iterator as FrameIterator;
use crate::operand::{AddressingMode, Operand};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// `(catch-ip, finally-ip)`; a negative value means "absent" (mirrors the
/// teacher's `ExceptionHandlingContext` pointer convention).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub catch_ip: i64,
    pub finally_ip: i64,
}

impl ExceptionHandler {
    pub fn has_catch(&self) -> bool {
        self.catch_ip >= 0
    }

    pub fn has_finally(&self) -> bool {
        self.finally_ip >= 0
    }
}

/// Accumulator for arguments between `INIT_FCALL`/`INIT_METHOD_CALL`/
/// `INIT_STATIC_METHOD_CALL` and the matching `DO_FCALL` (spec §3
/// "Pending call").
#[derive(Debug, Clone, Default)]
pub struct PendingCall {
    pub callee_name: Option<String>,
    pub function: Option<Arc<FunctionDescriptor>>,
    pub closure_name: Option<String>,
    pub args: Vec<Value>,
    pub arg_names: Vec<Option<String>>,
    pub is_method: bool,
    pub is_static: bool,
    pub this: Option<Value>,
    pub class_name: Option<String>,
    pub calling_class: Option<String>,
    pub method_name: Option<String>,
    pub is_magic: bool,
    pub is_null_method: bool,
    pub result_target: Operand,
}

/// Per-invocation state for one function call (spec §3 "Call frame").
pub struct Frame {
    pub function_descriptor: Option<Arc<FunctionDescriptor>>,
    pub function_name: String,
    pub class_name: Option<String>,
    /// Late-static-binding class — the dynamic class the call entered
    /// through, independent of where the method is defined.
    pub calling_class: Option<String>,
    pub instructions: Arc<Vec<Instruction>>,
    pub constants: Arc<Vec<Value>>,
    pub ip: usize,
    pub locals: Vec<Value>,
    pub temporaries: HashMap<u32, Value>,
    pub slot_names: HashMap<u32, String>,
    pub name_slots: HashMap<String, u32>,
    pub global_slots: HashMap<u32, String>,
    pub iterators: HashMap<u32, FrameIterator>,
    pub exception_handlers: Vec<ExceptionHandler>,
    pub pending_calls: Vec<PendingCall>,
    pub pending_exception: Option<Value>,
    pub return_target: Operand,
    pub this: Option<Value>,
}

impl Frame {
    pub fn new(
        function_name: impl Into<String>,
        instructions: Arc<Vec<Instruction>>,
        constants: Arc<Vec<Value>>,
        slot_count: usize,
    ) -> Self {
        Self {
            function_descriptor: None,
            function_name: function_name.into(),
            class_name: None,
            calling_class: None,
            instructions,
            constants,
            ip: 0,
            locals: vec![Value::Null; slot_count],
            temporaries: HashMap::new(),
            slot_names: HashMap::new(),
            name_slots: HashMap::new(),
            global_slots: HashMap::new(),
            iterators: HashMap::new(),
            exception_handlers: Vec::new(),
            pending_calls: Vec::new(),
            pending_exception: None,
            return_target: Operand::UNUSED,
            this: None,
        }
    }

    /// Binds a compile-time slot name, keeping `slot_names`/`name_slots`
    /// as mutual inverses (spec §8 frame invariant).
    pub fn bind_slot_name(&mut self, slot: u32, name: impl Into<String>) {
        let name = name.into();
        if let Some(old) = self.slot_names.insert(slot, name.clone()) {
            self.name_slots.remove(&old);
        }
        self.name_slots.insert(name, slot);
    }

    pub fn mark_global_slot(&mut self, slot: u32, global_name: impl Into<String>) {
        self.global_slots.insert(slot, global_name.into());
    }

    pub fn current_instruction(&self) -> Option<&Instruction> {
        self.instructions.get(self.ip)
    }

    fn local_mut(&mut self, index: u32) -> VmResult<&mut Value> {
        let idx = index as usize;
        if idx >= self.locals.len() {
            self.locals.resize(idx + 1, Value::Null);
        }
        Ok(&mut self.locals[idx])
    }

    /// Reads an operand (spec §4.2): `UNUSED` → null, `CONST` indexes the
    /// constant pool, `TMP_VAR` the temporaries table, `VAR`/`CV` the
    /// locals table. References are transparently dereferenced.
    pub fn read_operand(&self, operand: Operand) -> VmResult<Value> {
        let raw = match operand.mode {
            AddressingMode::Unused => return Ok(Value::Null),
            AddressingMode::Const => self
                .constants
                .get(operand.index as usize)
                .cloned()
                .ok_or(VmError::ConstantOutOfRange {
                    index: operand.index as usize,
                    len: self.constants.len(),
                })?,
            AddressingMode::TmpVar => self
                .temporaries
                .get(&operand.index)
                .cloned()
                .unwrap_or(Value::Null),
            AddressingMode::Var | AddressingMode::Cv => self
                .locals
                .get(operand.index as usize)
                .cloned()
                .unwrap_or(Value::Null),
        };
        Ok(raw.deref_clone())
    }

    /// Writes to an operand. Only `TMP_VAR`/`VAR`/`CV` are writable;
    /// `UNUSED`/`CONST` writes are a no-op (spec §4.2). Returns the
    /// context-global mirror that the caller (the engine, which owns the
    /// shared [`crate::context::Context`]) must apply when the slot is
    /// marked global.
    pub fn write_operand(&mut self, operand: Operand, value: Value) -> VmResult<Option<(String, Value)>> {
        match operand.mode {
            AddressingMode::Unused | AddressingMode::Const => Ok(None),
            AddressingMode::TmpVar => {
                let existing = self.temporaries.get(&operand.index).cloned();
                let to_store = match existing {
                    Some(existing) => Value::assign_through(&existing, value),
                    None => value,
                };
                self.temporaries.insert(operand.index, to_store);
                Ok(None)
            }
            AddressingMode::Var | AddressingMode::Cv => {
                let existing = self
                    .locals
                    .get(operand.index as usize)
                    .cloned()
                    .unwrap_or(Value::Null);
                let to_store = Value::assign_through(&existing, value);
                *self.local_mut(operand.index)? = to_store.clone();
                Ok(self
                    .global_slots
                    .get(&operand.index)
                    .cloned()
                    .map(|name| (name, to_store)))
            }
        }
    }

    /// `UNSET_VAR`: clears the slot directly rather than through
    /// [`Frame::write_operand`] — unsetting a variable bound to a
    /// reference breaks the binding, it does not null out the referent.
    pub fn unset_operand(&mut self, operand: Operand) {
        match operand.mode {
            AddressingMode::Unused | AddressingMode::Const => {}
            AddressingMode::TmpVar => {
                self.temporaries.remove(&operand.index);
            }
            AddressingMode::Var | AddressingMode::Cv => {
                if let Some(slot) = self.locals.get_mut(operand.index as usize) {
                    *slot = Value::Null;
                }
            }
        }
    }

    /// Pushes a fresh exception handler (spec §4.6).
    pub fn push_handler(&mut self, catch_ip: i64, finally_ip: i64) {
        self.exception_handlers.push(ExceptionHandler {
            catch_ip,
            finally_ip,
        });
    }

    pub fn pop_handler(&mut self) -> Option<ExceptionHandler> {
        self.exception_handlers.pop()
    }
}
