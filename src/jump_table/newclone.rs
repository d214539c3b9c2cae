//! `NEW, CLONE, INSTANCEOF` (spec §4.3 "New/Clone" family, §3 "Object").
//!
//! `NEW` only allocates the instance and seeds its declared defaults —
//! constructor invocation runs through the ordinary call protocol
//! (`INIT_METHOD_CALL __construct` / `DO_FCALL`), mirroring how
//! `assignment.rs`/`fetch.rs` defer `ArrayAccess` dispatch to the call
//! protocol rather than inlining it here.

use super::JumpTable;
use crate::engine::Engine;
use crate::error::{VmError, VmResult};
use crate::instruction::Instruction;
use crate::object::PhpObject;
use crate::opcode::OpCode;
use crate::value::Value;

pub fn register(table: &mut JumpTable) {
    table.set(OpCode::New, new_object);
    table.set(OpCode::Clone, clone_object);
    table.set(OpCode::Instanceof, instanceof);
}

/// `NEW class_name -> result`: fails for abstract classes; otherwise
/// allocates with the linked runtime's declared instance defaults.
fn new_object(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let class_name = engine.read(instr.op1)?.to_php_string();
    let runtime = engine
        .context
        .classes
        .resolve(&class_name)
        .ok_or_else(|| VmError::class_not_found(class_name.clone()))?;
    let runtime = runtime.read().expect("class runtime poisoned");
    if runtime.descriptor.is_abstract {
        return Err(VmError::AbstractClassInstantiation { name: class_name });
    }
    let mut object = PhpObject::new(runtime.name.clone());
    for (name, value) in runtime.instance_defaults() {
        object.set(name, value);
    }
    engine.write(instr.op3, Value::object(object))?;
    Ok(true)
}

/// `CLONE target -> result`: a shallow copy of the property map (PHP's
/// default `clone` semantics — `__clone` hooks, if declared, run through
/// the call protocol after this opcode, like a constructor after `NEW`).
fn clone_object(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let target = engine.read(instr.op1)?;
    let Value::Object(object) = target else {
        return Err(VmError::invalid_operand_type("object", target.type_name()));
    };
    let source = object.borrow();
    let mut copy = PhpObject::new(source.class_name.clone());
    for (name, value) in source.properties.iter() {
        copy.set(name.clone(), value.clone());
    }
    drop(source);
    engine.write(instr.op3, Value::object(copy))?;
    Ok(true)
}

/// `INSTANCEOF target, class_name -> bool`.
fn instanceof(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let target = engine.read(instr.op1)?;
    let class_name = engine.read(instr.op2)?.to_php_string();
    let result = match target {
        Value::Object(object) => {
            let actual = object.borrow().class_name.clone();
            engine.context.classes.is_instance_of(&actual, &class_name)
        }
        _ => false,
    };
    engine.write(instr.op3, Value::Bool(result))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassTable;
    use crate::context::{Context, FunctionRegistry};
    use crate::frame::Frame;
    use crate::function::{ClassDescriptor, PropertyDecl, Visibility};
    use crate::operand::Operand;
    use std::sync::Arc;

    fn widget_table() -> ClassTable {
        let table = ClassTable::new();
        let mut descriptor = ClassDescriptor::new("Widget");
        descriptor.properties.insert(
            "count".into(),
            PropertyDecl {
                visibility: Visibility::Public,
                is_static: false,
                is_readonly: false,
                default_value: Value::Int(0),
            },
        );
        table.declare(descriptor);
        table
    }

    #[test]
    fn new_seeds_declared_defaults() {
        let mut context = Context::new(widget_table(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(vec![Value::str("Widget")]), 0);
        engine.push_frame(frame);
        let instr = Instruction::new(OpCode::New, Operand::constant(0), Operand::UNUSED, Operand::tmp(0));
        new_object(&mut engine, &instr).unwrap();
        let Value::Object(obj) = engine.frame().temporaries.get(&0).unwrap().clone() else {
            panic!("expected object");
        };
        assert_eq!(obj.borrow().get("count"), Some(&Value::Int(0)));
    }

    #[test]
    fn abstract_class_instantiation_is_rejected() {
        let table = ClassTable::new();
        let mut descriptor = ClassDescriptor::new("Shape");
        descriptor.is_abstract = true;
        table.declare(descriptor);
        let mut context = Context::new(table, FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(vec![Value::str("Shape")]), 0);
        engine.push_frame(frame);
        let instr = Instruction::new(OpCode::New, Operand::constant(0), Operand::UNUSED, Operand::tmp(0));
        let err = new_object(&mut engine, &instr).unwrap_err();
        assert!(matches!(err, VmError::AbstractClassInstantiation { .. }));
    }

    #[test]
    fn clone_copies_properties_independently() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        let mut original = PhpObject::new("Widget");
        original.set("count", Value::Int(5));
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(Vec::new()), 1);
        engine.push_frame(frame);
        engine.frame_mut().locals[0] = Value::object(original);
        let instr = Instruction::new(OpCode::Clone, Operand::var(0), Operand::UNUSED, Operand::tmp(0));
        clone_object(&mut engine, &instr).unwrap();
        let Value::Object(clone) = engine.frame().temporaries.get(&0).unwrap().clone() else {
            panic!("expected object");
        };
        clone.borrow_mut().set("count", Value::Int(9));
        let Value::Object(original) = engine.frame().locals[0].clone() else {
            panic!("expected object");
        };
        assert_eq!(original.borrow().get("count"), Some(&Value::Int(5)));
    }
}
