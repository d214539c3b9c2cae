//! `FETCH_R, FETCH_R_DYNAMIC, FETCH_DIM_*, FETCH_OBJ_*,
//! FETCH_STATIC_PROP_*, FETCH_CONSTANT, FETCH_CLASS_CONSTANT,
//! FETCH_LATE_STATIC_CONSTANT` (spec §4.3 "Fetch" family, §4.4 "Property,
//! Dimension, and Constant Dispatch").

use super::calls::call_method_sync;
use super::JumpTable;
use crate::engine::Engine;
use crate::error::{VmError, VmResult};
use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::php_array::ArrayKey;
use crate::value::Value;

pub fn register(table: &mut JumpTable) {
    table.set(OpCode::FetchR, fetch_r);
    table.set(OpCode::FetchRDynamic, fetch_r_dynamic);
    table.set(OpCode::FetchDimR, fetch_dim_r);
    table.set(OpCode::FetchDimIs, fetch_dim_is);
    table.set(OpCode::FetchDimW, fetch_dim_w);
    table.set(OpCode::FetchDimRw, fetch_dim_w);
    table.set(OpCode::FetchDimUnset, fetch_dim_unset);
    table.set(OpCode::FetchObjR, fetch_obj_r);
    table.set(OpCode::FetchObjIs, fetch_obj_is);
    table.set(OpCode::FetchObjRw, fetch_obj_rw);
    table.set(OpCode::FetchStaticPropR, fetch_static_prop_r);
    table.set(OpCode::FetchStaticPropW, fetch_static_prop_w);
    table.set(OpCode::FetchConstant, fetch_constant);
    table.set(OpCode::FetchClassConstant, fetch_class_constant);
    table.set(OpCode::FetchLateStaticConstant, fetch_late_static_constant);
}

/// A plain variable fetch (`op1` already names the slot via its own
/// addressing mode — the handler only needs to move it to the result).
fn fetch_r(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let value = engine.read(instr.op1)?;
    engine.write(instr.op3, value)?;
    Ok(true)
}

/// A fetch whose variable name is itself computed at runtime (`$$name`):
/// `op1` holds the name, resolved against the frame's `name_slots` map.
fn fetch_r_dynamic(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let name = engine.read(instr.op1)?.to_php_string();
    let value = match engine.frame().name_slots.get(&name) {
        Some(&slot) => engine
            .frame()
            .locals
            .get(slot as usize)
            .cloned()
            .unwrap_or(Value::Null)
            .deref_clone(),
        None => engine.context.get_global(&name),
    };
    engine.write(instr.op3, value)?;
    Ok(true)
}

fn resolve_dim_container(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<Value> {
    engine.read(instr.op1)
}

/// True when `class_name` declares `method` (directly or inherited) —
/// used to tell an `ArrayAccess` object from a plain one without
/// needing a separate interface table (spec §4.4 dispatches by method
/// presence, not by a declared `implements` list).
pub(super) fn has_array_access_method(engine: &Engine<'_>, class_name: &str, method: &str) -> bool {
    engine.context.classes.find_method(class_name, method).is_some()
}

fn fetch_dim_r(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let container = resolve_dim_container(engine, instr)?;
    let result = match container {
        Value::Array(array) => {
            let key = ArrayKey::normalize(&engine.read(instr.op2)?);
            array.borrow().get(&key).cloned().unwrap_or(Value::Null)
        }
        Value::Object(ref obj) => {
            let class_name = obj.borrow().class_name.clone();
            if has_array_access_method(engine, &class_name, "offsetGet") {
                let key = engine.read(instr.op2)?;
                call_method_sync(engine, container.clone(), "offsetGet", vec![key])?
            } else {
                return Err(VmError::UnsupportedOperandType {
                    op: "FETCH_DIM_R".to_string(),
                    ty: "object".to_string(),
                });
            }
        }
        Value::Null => Value::Null,
        other => return Err(VmError::invalid_operand_type("array", other.type_name())),
    };
    engine.write(instr.op3, result)?;
    Ok(true)
}

/// `FETCH_DIM_IS` (`isset($arr[$key])`): dispatches `offsetExists` for
/// `ArrayAccess` objects; any other non-array, non-dispatching
/// container is simply "not set", never an error (spec §2: isset never
/// raises on valid input).
fn fetch_dim_is(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let container = resolve_dim_container(engine, instr)?;
    let exists = match container {
        Value::Array(array) => {
            let key = ArrayKey::normalize(&engine.read(instr.op2)?);
            array.borrow().contains_key(&key)
        }
        Value::Object(ref obj) => {
            let class_name = obj.borrow().class_name.clone();
            if has_array_access_method(engine, &class_name, "offsetExists") {
                let key = engine.read(instr.op2)?;
                call_method_sync(engine, container.clone(), "offsetExists", vec![key])?.to_bool()
            } else {
                false
            }
        }
        _ => false,
    };
    engine.write(instr.op3, Value::Bool(exists))?;
    Ok(true)
}

/// `FETCH_DIM_W`/`FETCH_DIM_RW`: materialises a missing element as a
/// fresh reference cell holding null and returns it for write chaining
/// (spec §4.4).
fn fetch_dim_w(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let existing = engine.read(instr.op1)?;
    let container = if matches!(existing, Value::Null) {
        let fresh = Value::array(crate::php_array::PhpArray::new());
        engine.write(instr.op1, fresh.clone())?;
        fresh
    } else {
        existing
    };
    let Value::Array(array) = container else {
        return Err(VmError::invalid_operand_type("array", "non-array"));
    };
    let key = ArrayKey::normalize(&engine.read(instr.op2)?);
    let mut array_mut = array.borrow_mut();
    let slot = array_mut
        .get(&key)
        .cloned()
        .unwrap_or(Value::Null)
        .into_reference();
    array_mut.insert(key, slot.clone());
    drop(array_mut);
    engine.write(instr.op3, slot)?;
    Ok(true)
}

fn fetch_dim_unset(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let container = resolve_dim_container(engine, instr)?;
    if let Value::Array(array) = container {
        let key = ArrayKey::normalize(&engine.read(instr.op2)?);
        array.borrow_mut().remove(&key);
    }
    Ok(true)
}

fn resolve_obj_target(engine: &Engine<'_>, container: Value) -> VmResult<std::rc::Rc<std::cell::RefCell<crate::object::PhpObject>>> {
    match container {
        Value::Object(obj) => Ok(obj),
        Value::Null => match &engine.frame().this {
            Some(Value::Object(obj)) => Ok(obj.clone()),
            _ => Err(VmError::InvalidClassContext {
                reason: "object fetch outside object context".to_string(),
            }),
        },
        other => Err(VmError::invalid_operand_type("object", other.type_name())),
    }
}

fn fetch_obj_r(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let container = engine.read(instr.op1)?;
    let object = resolve_obj_target(engine, container)?;
    let prop_name = engine.read(instr.op2)?.to_php_string();
    let value = {
        let obj = object.borrow();
        match obj.get(&prop_name) {
            Some(v) => v.clone(),
            None => engine
                .context
                .classes
                .resolve(&obj.class_name)
                .and_then(|runtime| {
                    runtime
                        .read()
                        .expect("class runtime poisoned")
                        .find_property_decl(&prop_name)
                        .map(|decl| decl.default_value.clone())
                })
                .unwrap_or(Value::Null),
        }
    };
    engine.write(instr.op3, value)?;
    Ok(true)
}

fn fetch_obj_is(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let container = engine.read(instr.op1)?;
    let exists = match resolve_obj_target(engine, container) {
        Ok(object) => {
            let prop_name = engine.read(instr.op2)?.to_php_string();
            let obj = object.borrow();
            obj.get(&prop_name).is_some()
        }
        Err(_) => false,
    };
    engine.write(instr.op3, Value::Bool(exists))?;
    Ok(true)
}

fn fetch_obj_rw(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let container = engine.read(instr.op1)?;
    let object = resolve_obj_target(engine, container)?;
    let prop_name = engine.read(instr.op2)?.to_php_string();
    let mut obj = object.borrow_mut();
    let slot = obj
        .get(&prop_name)
        .cloned()
        .unwrap_or(Value::Null)
        .into_reference();
    obj.set(prop_name, slot.clone());
    drop(obj);
    engine.write(instr.op3, slot)?;
    Ok(true)
}

/// Resolves "self"/"parent"/"static"/a literal class name against the
/// active frame, honoring late static binding for "static" (spec §4.4).
/// Shared with `calls.rs`'s static-method-call resolution.
pub(super) fn resolve_class_name(engine: &Engine<'_>, raw: &str) -> VmResult<String> {
    let frame = engine.frame();
    match raw {
        "self" => frame
            .class_name
            .clone()
            .ok_or_else(|| VmError::InvalidClassContext {
                reason: "'self' used outside a class context".to_string(),
            }),
        "static" => frame
            .calling_class
            .clone()
            .or_else(|| frame.class_name.clone())
            .ok_or_else(|| VmError::InvalidClassContext {
                reason: "'static' used outside a class context".to_string(),
            }),
        "parent" => {
            let class_name = frame.class_name.clone().ok_or_else(|| VmError::InvalidClassContext {
                reason: "'parent' used outside a class context".to_string(),
            })?;
            let runtime = engine
                .context
                .classes
                .resolve(&class_name)
                .ok_or_else(|| VmError::class_not_found(class_name.clone()))?;
            let runtime = runtime.read().expect("class runtime poisoned");
            runtime
                .parent_name
                .clone()
                .ok_or_else(|| VmError::InvalidClassContext {
                    reason: format!("{class_name} has no parent"),
                })
        }
        other => Ok(other.to_string()),
    }
}

fn fetch_static_prop_r(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let class_name = resolve_class_name(engine, &engine.read(instr.op1)?.to_php_string())?;
    let prop_name = engine.read(instr.op2)?.to_php_string();
    let runtime = engine
        .context
        .classes
        .resolve(&class_name)
        .ok_or_else(|| VmError::class_not_found(class_name.clone()))?;
    let value = runtime
        .read()
        .expect("class runtime poisoned")
        .static_props
        .get(&prop_name)
        .cloned()
        .unwrap_or(Value::Null);
    engine.write(instr.op3, value)?;
    Ok(true)
}

fn fetch_static_prop_w(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let class_name = resolve_class_name(engine, &engine.read(instr.op1)?.to_php_string())?;
    let prop_name = engine.read(instr.op2)?.to_php_string();
    let runtime = engine
        .context
        .classes
        .resolve(&class_name)
        .ok_or_else(|| VmError::class_not_found(class_name.clone()))?;
    let slot = {
        let mut runtime = runtime.write().expect("class runtime poisoned");
        let slot = runtime
            .static_props
            .get(&prop_name)
            .cloned()
            .unwrap_or(Value::Null)
            .into_reference();
        runtime.static_props.insert(prop_name, slot.clone());
        slot
    };
    engine.write(instr.op3, slot)?;
    Ok(true)
}

fn fetch_constant(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let name = engine.read(instr.op1)?.to_php_string();
    let value = engine
        .context
        .get_constant(&name)
        .unwrap_or_else(|| Value::str(name.clone()));
    engine.write(instr.op3, value)?;
    Ok(true)
}

fn fetch_class_constant(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let raw_class = engine.read(instr.op1)?.to_php_string();
    let class_name = resolve_class_name(engine, &raw_class)?;
    let const_name = engine.read(instr.op2)?.to_php_string();
    let runtime = engine
        .context
        .classes
        .resolve(&class_name)
        .ok_or_else(|| VmError::class_not_found(class_name.clone()))?;
    let value = runtime
        .read()
        .expect("class runtime poisoned")
        .find_constant(&const_name)
        .cloned()
        .ok_or_else(|| VmError::PropertyNotFound {
            class: class_name.clone(),
            property: const_name.clone(),
        })?;
    engine.write(instr.op3, value)?;
    Ok(true)
}

/// Always resolves against `calling_class` (late static binding),
/// ignoring any literal "self"/"parent" the compiler might have emitted
/// (spec §4.4: "for 'static' references ... the class used is the
/// `CallingClass` of the active frame").
fn fetch_late_static_constant(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let const_name = engine.read(instr.op1)?.to_php_string();
    let class_name = engine
        .frame()
        .calling_class
        .clone()
        .or_else(|| engine.frame().class_name.clone())
        .ok_or_else(|| VmError::InvalidClassContext {
            reason: "late static constant fetch outside a class context".to_string(),
        })?;
    let runtime = engine
        .context
        .classes
        .resolve(&class_name)
        .ok_or_else(|| VmError::class_not_found(class_name.clone()))?;
    let value = runtime
        .read()
        .expect("class runtime poisoned")
        .find_constant(&const_name)
        .cloned()
        .ok_or_else(|| VmError::PropertyNotFound {
            class: class_name.clone(),
            property: const_name.clone(),
        })?;
    engine.write(instr.op3, value)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassTable;
    use crate::context::{Context, FunctionRegistry};
    use crate::frame::Frame;
    use crate::function::{ClassDescriptor, FunctionDescriptor, ParamDescriptor, TypeHint};
    use crate::object::PhpObject;
    use crate::operand::Operand;
    use crate::php_array::PhpArray;
    use std::sync::Arc;

    fn array_access_class(method_name: &str, returns: Value) -> ClassDescriptor {
        let method = FunctionDescriptor {
            name: method_name.to_string(),
            params: vec![ParamDescriptor {
                name: "key".into(),
                by_ref: false,
                variadic: false,
                type_hint: TypeHint::Any,
                default: None,
            }],
            instructions: Arc::new(vec![Instruction::new(
                OpCode::Return,
                Operand::constant(0),
                Operand::UNUSED,
                Operand::UNUSED,
            )]),
            constants: Arc::new(vec![returns]),
            is_generator: false,
            slot_count: 1,
            slot_names: vec![Some("key".into())],
        };
        let mut descriptor = ClassDescriptor::new("Box");
        descriptor.methods.insert(method_name.to_string(), Arc::new(method));
        descriptor
    }

    #[test]
    fn fetch_dim_r_dispatches_offset_get_for_array_access_objects() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        context.classes.declare(array_access_class("offsetGet", Value::str("hit")));
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(Vec::new()), 1);
        engine.push_frame(frame);
        engine.frame_mut().locals[0] = Value::object(PhpObject::new("Box"));

        let instr = Instruction::new(OpCode::FetchDimR, Operand::var(0), Operand::UNUSED, Operand::tmp(0));
        fetch_dim_r(&mut engine, &instr).unwrap();
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::str("hit")));
    }

    #[test]
    fn fetch_dim_r_on_plain_object_without_offset_get_errors() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(Vec::new()), 1);
        engine.push_frame(frame);
        engine.frame_mut().locals[0] = Value::object(PhpObject::new("Plain"));

        let instr = Instruction::new(OpCode::FetchDimR, Operand::var(0), Operand::UNUSED, Operand::tmp(0));
        let err = fetch_dim_r(&mut engine, &instr).unwrap_err();
        assert!(matches!(err, VmError::UnsupportedOperandType { .. }));
    }

    #[test]
    fn fetch_dim_is_dispatches_offset_exists_for_array_access_objects() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        context.classes.declare(array_access_class("offsetExists", Value::Bool(true)));
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(Vec::new()), 1);
        engine.push_frame(frame);
        engine.frame_mut().locals[0] = Value::object(PhpObject::new("Box"));

        let instr = Instruction::new(OpCode::FetchDimIs, Operand::var(0), Operand::UNUSED, Operand::tmp(0));
        fetch_dim_is(&mut engine, &instr).unwrap();
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::Bool(true)));
    }

    #[test]
    fn fetch_dim_is_on_plain_object_without_offset_exists_is_false_not_an_error() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(Vec::new()), 1);
        engine.push_frame(frame);
        engine.frame_mut().locals[0] = Value::object(PhpObject::new("Plain"));

        let instr = Instruction::new(OpCode::FetchDimIs, Operand::var(0), Operand::UNUSED, Operand::tmp(0));
        fetch_dim_is(&mut engine, &instr).unwrap();
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::Bool(false)));
    }

    #[test]
    fn fetch_dim_r_on_missing_key_is_null() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        let mut frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(Vec::new()), 1);
        frame.locals[0] = Value::array(PhpArray::new());
        engine.push_frame(frame);
        let instr = Instruction::new(OpCode::FetchDimR, Operand::var(0), Operand::constant(0), Operand::tmp(0));
        engine.frame_mut().constants = Arc::new(vec![Value::str("missing")]);
        fetch_dim_r(&mut engine, &instr).unwrap();
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::Null));
    }

    #[test]
    fn fetch_dim_w_materialises_missing_key_as_reference() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        let mut frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(vec![Value::str("x")]), 1);
        frame.locals[0] = Value::array(PhpArray::new());
        engine.push_frame(frame);
        let instr = Instruction::new(OpCode::FetchDimW, Operand::var(0), Operand::constant(0), Operand::tmp(0));
        fetch_dim_w(&mut engine, &instr).unwrap();
        assert!(engine.frame().temporaries.get(&0).unwrap().is_reference());
    }

    #[test]
    fn undefined_global_constant_returns_its_own_name() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(vec![Value::str("FOO")]), 0);
        engine.push_frame(frame);
        let instr = Instruction::new(OpCode::FetchConstant, Operand::constant(0), Operand::UNUSED, Operand::tmp(0));
        fetch_constant(&mut engine, &instr).unwrap();
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::str("FOO")));
    }
}
