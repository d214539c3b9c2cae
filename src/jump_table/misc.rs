//! `ECHO, PRINT, EXIT, NOP, ISSET_ISEMPTY_VAR, UNSET_VAR,
//! CAST_{BOOL,LONG,DOUBLE,STRING,ARRAY,OBJECT}, INCLUDE/REQUIRE[_ONCE],
//! BEGIN_SILENCE/END_SILENCE, BIND_STATIC, FETCH_LIST_R` (spec §4.3
//! "Output/Misc" family).

use super::JumpTable;
use crate::engine::Engine;
use crate::error::{VmError, VmResult};
use crate::instruction::Instruction;
use crate::object::PhpObject;
use crate::opcode::OpCode;
use crate::php_array::{ArrayKey, PhpArray};
use crate::value::Value;

pub fn register(table: &mut JumpTable) {
    table.set(OpCode::Echo, echo);
    table.set(OpCode::Print, print);
    table.set(OpCode::Exit, exit);
    table.set(OpCode::Nop, nop);
    table.set(OpCode::IssetIsemptyVar, isset_isempty_var);
    table.set(OpCode::UnsetVar, unset_var);
    table.set(OpCode::CastBool, cast_bool);
    table.set(OpCode::CastLong, cast_long);
    table.set(OpCode::CastDouble, cast_double);
    table.set(OpCode::CastString, cast_string);
    table.set(OpCode::CastArray, cast_array);
    table.set(OpCode::CastObject, cast_object);
    table.set(OpCode::Include, include);
    table.set(OpCode::Require, require);
    table.set(OpCode::IncludeOnce, include_once);
    table.set(OpCode::RequireOnce, require_once);
    table.set(OpCode::BeginSilence, begin_silence);
    table.set(OpCode::EndSilence, end_silence);
    table.set(OpCode::BindStatic, bind_static);
    table.set(OpCode::FetchListR, fetch_list_r);
}

fn echo(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let text = engine.read(instr.op1)?.to_php_string();
    engine.context.output.write(&text, &engine.context.http);
    Ok(true)
}

/// `PRINT` is an expression, not a statement: it always evaluates to `1`.
fn print(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let text = engine.read(instr.op1)?.to_php_string();
    engine.context.output.write(&text, &engine.context.http);
    engine.write(instr.op3, Value::Int(1))?;
    Ok(true)
}

/// `EXIT`/`die`: a bare `op1` echoes a message and halts with code 0; an
/// integer `op1` halts with that code as the exit status.
fn exit(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    if instr.op1.is_unused() {
        engine.context.halt(0);
        return Ok(false);
    }
    let value = engine.read(instr.op1)?;
    match value {
        Value::Int(code) => engine.context.halt(code as i32),
        other => {
            let text = other.to_php_string();
            engine.context.output.write(&text, &engine.context.http);
            engine.context.halt(0);
        }
    }
    Ok(false)
}

fn nop(_engine: &mut Engine<'_>, _instr: &Instruction) -> VmResult<bool> {
    Ok(true)
}

/// `ISSET_ISEMPTY_VAR var[, is_empty] -> bool`: `op2` just has to be
/// non-`UNUSED` to select `empty()` semantics instead of `isset()`,
/// mirroring the boolean-flag-via-addressing-mode convention `FE_RESET`
/// uses for by-ref iteration.
fn isset_isempty_var(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let value = engine.read(instr.op1)?;
    let result = if instr.op2.is_unused() {
        !matches!(value, Value::Null)
    } else {
        !value.to_bool()
    };
    engine.write(instr.op3, Value::Bool(result))?;
    Ok(true)
}

/// `UNSET_VAR var`: breaks the slot's binding rather than writing through
/// a reference it might hold (spec §3).
fn unset_var(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    engine.unset(instr.op1);
    Ok(true)
}

fn cast_bool(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let value = engine.read(instr.op1)?;
    engine.write(instr.op3, Value::Bool(value.to_bool()))?;
    Ok(true)
}

fn cast_long(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let value = engine.read(instr.op1)?;
    engine.write(instr.op3, Value::Int(value.to_int()))?;
    Ok(true)
}

fn cast_double(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let value = engine.read(instr.op1)?;
    engine.write(instr.op3, Value::Float(value.to_float()))?;
    Ok(true)
}

fn cast_string(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let value = engine.read(instr.op1)?;
    engine.write(instr.op3, Value::str(value.to_php_string()))?;
    Ok(true)
}

/// `(array)`: `null` becomes `[]`, an object's properties become entries
/// keyed by property name, and any other scalar becomes `[0 => value]`
/// (PHP's cast-to-array rules). Arrays pass through their existing handle.
fn cast_array(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let value = engine.read(instr.op1)?;
    let result = match value {
        Value::Array(_) => value,
        Value::Null => Value::array(PhpArray::new()),
        Value::Object(object) => {
            let mut array = PhpArray::new();
            for (name, property) in &object.borrow().properties {
                array.insert(ArrayKey::Str(name.clone()), property.clone());
            }
            Value::array(array)
        }
        scalar => {
            let mut array = PhpArray::new();
            array.push(scalar);
            Value::array(array)
        }
    };
    engine.write(instr.op3, result)?;
    Ok(true)
}

/// `(object)`: an array's entries become `stdClass` properties (int keys
/// stringified, per PHP); any other scalar becomes a `stdClass` with a
/// single `scalar` property, except `null`, which casts to an empty one.
fn cast_object(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let value = engine.read(instr.op1)?;
    let result = match value {
        Value::Object(_) => value,
        Value::Array(array) => {
            let mut object = PhpObject::new("stdClass");
            for (key, property) in array.borrow().iter() {
                object.set(key.to_string(), property.clone());
            }
            Value::object(object)
        }
        Value::Null => Value::object(PhpObject::new("stdClass")),
        scalar => {
            let mut object = PhpObject::new("stdClass");
            object.set("scalar", scalar);
            Value::object(object)
        }
    };
    engine.write(instr.op3, result)?;
    Ok(true)
}

fn include_path(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<String> {
    Ok(engine.read(instr.op1)?.to_php_string())
}

/// Shared driver for the four include/require variants: `once` consults
/// and updates the included-files set first (spec §6 "`_ONCE` variants
/// consult and update the included-files set"); `required` decides
/// whether a missing compiler callback or a missing file is fatal.
fn run_include(engine: &mut Engine<'_>, instr: &Instruction, once: bool, required: bool) -> VmResult<bool> {
    let path = include_path(engine, instr)?;

    if once && !engine.context.mark_included(&path) {
        engine.write(instr.op3, Value::Bool(true))?;
        return Ok(true);
    }

    let Some(compiler) = engine.context.compiler.clone() else {
        return if required {
            Err(VmError::RequiredFileNotFound { path })
        } else {
            engine.write(instr.op3, Value::Bool(false))?;
            Ok(true)
        };
    };

    match compiler(engine.context, &path) {
        Ok(Some(value)) => {
            engine.write(instr.op3, value)?;
            Ok(true)
        }
        Ok(None) => {
            engine.write(instr.op3, Value::Int(1))?;
            Ok(true)
        }
        Err(VmError::RequiredFileNotFound { .. }) if !required => {
            engine.write(instr.op3, Value::Bool(false))?;
            Ok(true)
        }
        Err(other) => Err(other),
    }
}

fn include(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    run_include(engine, instr, false, false)
}

fn require(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    run_include(engine, instr, false, true)
}

fn include_once(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    run_include(engine, instr, true, false)
}

fn require_once(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    run_include(engine, instr, true, true)
}

/// `BEGIN_SILENCE -> old_level`: the old error-reporting level is also
/// handed back through `op3` for parity with the teacher's operand
/// shape, though this crate's `Context::silence_stack` tracks it directly
/// and `END_SILENCE` doesn't need the operand to restore it correctly.
fn begin_silence(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let old_level = engine.context.error_reporting_level;
    engine.context.begin_silence();
    engine.write(instr.op3, Value::Int(old_level as i64))?;
    Ok(true)
}

fn end_silence(engine: &mut Engine<'_>, _instr: &Instruction) -> VmResult<bool> {
    engine.context.end_silence();
    Ok(true)
}

/// `BIND_STATIC var, default`: rebinds `var` to the function-persistent
/// reference cell for this declaration site every time it runs, creating
/// the cell from `default` on the first call (spec §3 "static variable").
fn bind_static(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let default = engine.read(instr.op2)?;
    let key = format!("{}#{}", engine.frame().function_name, instr.op1.index);
    let cell = engine.context.static_cell(&key, default);
    engine.write(instr.op1, cell)?;
    Ok(true)
}

/// `FETCH_LIST_R array, key -> value`: used by `list()`/`[$a, $b] = ...`
/// destructuring. Unlike `FETCH_DIM_R`, a missing key is not an error —
/// it yields `null` (PHP emits a warning but still assigns `null`).
fn fetch_list_r(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let source = engine.read(instr.op1)?;
    let source_type = source.type_name();
    let Value::Array(array) = source else {
        return Err(VmError::invalid_operand_type("array", source_type));
    };
    let key = ArrayKey::normalize(&engine.read(instr.op2)?);
    let value = array.borrow().get(&key).cloned().unwrap_or(Value::Null);
    engine.write(instr.op3, value)?;
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

    fn push_frame(engine: &mut Engine<'_>, constants: Vec<Value>, slots: usize) {
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(constants), slots);
        engine.push_frame(frame);
    }

    #[test]
    fn echo_writes_through_to_base_output() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        push_frame(&mut engine, vec![Value::str("hi")], 0);
        echo(&mut engine, &Instruction::new(OpCode::Echo, Operand::constant(0), Operand::UNUSED, Operand::UNUSED)).unwrap();
        assert_eq!(engine.context.output.base_contents(), "hi");
    }

    #[test]
    fn isset_is_false_for_null_and_true_otherwise() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        push_frame(&mut engine, Vec::new(), 1);
        engine.frame_mut().locals[0] = Value::Int(0);
        isset_isempty_var(
            &mut engine,
            &Instruction::new(OpCode::IssetIsemptyVar, Operand::var(0), Operand::UNUSED, Operand::tmp(0)),
        )
        .unwrap();
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::Bool(true)));
    }

    #[test]
    fn empty_is_true_for_zero_even_though_isset_is_true() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        push_frame(&mut engine, Vec::new(), 1);
        engine.frame_mut().locals[0] = Value::Int(0);
        isset_isempty_var(
            &mut engine,
            &Instruction::new(OpCode::IssetIsemptyVar, Operand::var(0), Operand::constant(0), Operand::tmp(0)),
        )
        .unwrap();
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::Bool(true)));
    }

    #[test]
    fn unset_var_breaks_a_reference_binding_without_nulling_the_referent() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        push_frame(&mut engine, Vec::new(), 1);
        let cell = Value::Int(5).into_reference();
        engine.frame_mut().locals[0] = cell.clone();
        unset_var(&mut engine, &Instruction::new(OpCode::UnsetVar, Operand::var(0), Operand::UNUSED, Operand::UNUSED)).unwrap();
        assert_eq!(engine.frame().locals[0], Value::Null);
        assert_eq!(cell.deref_clone(), Value::Int(5));
    }

    #[test]
    fn cast_array_on_scalar_wraps_under_index_zero() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        push_frame(&mut engine, vec![Value::Int(42)], 0);
        cast_array(&mut engine, &Instruction::new(OpCode::CastArray, Operand::constant(0), Operand::UNUSED, Operand::tmp(0))).unwrap();
        let Value::Array(array) = engine.frame().temporaries.get(&0).unwrap().clone() else {
            panic!("expected array");
        };
        assert_eq!(array.borrow().get(&ArrayKey::Int(0)), Some(&Value::Int(42)));
    }

    #[test]
    fn cast_object_on_array_copies_entries_as_properties() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        let mut array = PhpArray::new();
        array.insert(ArrayKey::Str("name".into()), Value::str("ok"));
        push_frame(&mut engine, vec![Value::array(array)], 0);
        cast_object(&mut engine, &Instruction::new(OpCode::CastObject, Operand::constant(0), Operand::UNUSED, Operand::tmp(0))).unwrap();
        let Value::Object(object) = engine.frame().temporaries.get(&0).unwrap().clone() else {
            panic!("expected object");
        };
        assert_eq!(object.borrow().get("name"), Some(&Value::str("ok")));
    }

    #[test]
    fn include_without_a_compiler_callback_yields_false() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        push_frame(&mut engine, vec![Value::str("missing.php")], 0);
        include(&mut engine, &Instruction::new(OpCode::Include, Operand::constant(0), Operand::UNUSED, Operand::tmp(0))).unwrap();
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::Bool(false)));
    }

    #[test]
    fn require_without_a_compiler_callback_is_fatal() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        push_frame(&mut engine, vec![Value::str("missing.php")], 0);
        let err = require(&mut engine, &Instruction::new(OpCode::Require, Operand::constant(0), Operand::UNUSED, Operand::tmp(0))).unwrap_err();
        assert!(matches!(err, VmError::RequiredFileNotFound { .. }));
    }

    #[test]
    fn include_once_short_circuits_the_second_time() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        context.compiler = Some(Arc::new(|_ctx, _path| Ok(Some(Value::Int(1)))));
        let mut engine = Engine::new(&mut context);
        push_frame(&mut engine, vec![Value::str("a.php")], 0);
        let instr = Instruction::new(OpCode::IncludeOnce, Operand::constant(0), Operand::UNUSED, Operand::tmp(0));
        include_once(&mut engine, &instr).unwrap();
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::Int(1)));
        include_once(&mut engine, &instr).unwrap();
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::Bool(true)));
    }

    #[test]
    fn bind_static_persists_across_rebinds() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        push_frame(&mut engine, vec![Value::Int(0)], 1);
        let instr = Instruction::new(OpCode::BindStatic, Operand::var(0), Operand::constant(0), Operand::UNUSED);
        bind_static(&mut engine, &instr).unwrap();
        engine.write(Operand::var(0), Value::Int(7)).unwrap();
        // Re-running BIND_STATIC (as happens on a second call into the same
        // function) should rebind to the same cell, observing the mutation.
        push_frame(&mut engine, vec![Value::Int(0)], 1);
        bind_static(&mut engine, &instr).unwrap();
        assert_eq!(engine.frame().locals[0].deref_clone(), Value::Int(7));
    }

    #[test]
    fn fetch_list_r_yields_null_for_a_missing_key_instead_of_erroring() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        let mut engine = Engine::new(&mut context);
        push_frame(&mut engine, vec![Value::array(PhpArray::new()), Value::Int(3)], 0);
        let instr = Instruction::new(OpCode::FetchListR, Operand::constant(0), Operand::constant(1), Operand::tmp(0));
        fetch_list_r(&mut engine, &instr).unwrap();
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::Null));
    }
}
