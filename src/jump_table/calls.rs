//! `INIT_FCALL, INIT_METHOD_CALL, INIT_STATIC_METHOD_CALL, SEND_VAL,
//! SEND_VAR, SEND_REF, SEND_VAL_NAMED, DO_FCALL, RETURN, RETURN_BY_REF,
//! CREATE_CLOSURE, BIND_USE_VAR, CREATE_FUNC_CALLABLE,
//! CREATE_METHOD_CALLABLE, CREATE_STATIC_CALLABLE` (spec §4.5 "Call
//! Protocol").
//!
//! The protocol is three phases spread across several instructions: an
//! `INIT_*` opens a [`PendingCall`] on the active frame, `SEND_*`
//! appends arguments to it, `DO_FCALL` resolves the callee and either
//! answers immediately (builtins) or pushes a fresh [`Frame`] for the
//! dispatch loop to run next (user functions/methods/generators).

use super::fetch::resolve_class_name;
use super::JumpTable;
use crate::builtin::BuiltinContext;
use crate::class::ClassTable;
use crate::closure::{CallTarget, ClosureValue};
use crate::engine::Engine;
use crate::error::{VmError, VmResult};
use crate::frame::{Frame, PendingCall};
use crate::function::{FunctionDescriptor, ParamDescriptor, TypeHint};
use crate::generator;
use crate::instruction::Instruction;
use crate::operand::Operand;
use crate::opcode::OpCode;
use crate::php_array::PhpArray;
use crate::value::Value;
use std::rc::Rc;
use std::sync::Arc;

pub fn register(table: &mut JumpTable) {
    table.set(OpCode::InitFcall, init_fcall);
    table.set(OpCode::InitMethodCall, init_method_call);
    table.set(OpCode::InitStaticMethodCall, init_static_method_call);
    table.set(OpCode::SendVal, send_val);
    table.set(OpCode::SendVar, send_var);
    table.set(OpCode::SendRef, send_ref);
    table.set(OpCode::SendValNamed, send_val_named);
    table.set(OpCode::DoFcall, do_fcall);
    table.set(OpCode::Return, do_return);
    table.set(OpCode::ReturnByRef, do_return);
    table.set(OpCode::CreateClosure, create_closure);
    table.set(OpCode::BindUseVar, bind_use_var);
    table.set(OpCode::CreateFuncCallable, create_func_callable);
    table.set(OpCode::CreateMethodCallable, create_method_callable);
    table.set(OpCode::CreateStaticCallable, create_static_callable);
}

/// `INIT_FCALL callee`: `callee` is either a plain function name or an
/// already-resolved `Value::Closure` (a call through a variable/
/// first-class callable). `op3` carries the eventual result target,
/// stashed on the pending call so `DO_FCALL` doesn't need it repeated.
fn init_fcall(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let callee = engine.read(instr.op1)?;
    let mut call = PendingCall {
        result_target: instr.op3,
        ..Default::default()
    };
    match callee {
        Value::Str(name) => call.callee_name = Some(name.to_string()),
        Value::Closure(closure) => apply_closure_target(&mut call, &closure),
        other => {
            return Err(VmError::invalid_operand_type(
                "string or callable",
                other.type_name(),
            ))
        }
    }
    engine.frame_mut().pending_calls.push(call);
    Ok(true)
}

fn apply_closure_target(call: &mut PendingCall, closure: &ClosureValue) {
    match &closure.target {
        CallTarget::Function(function) => call.function = Some(Arc::clone(function)),
        CallTarget::BoundMethod {
            receiver,
            class_name,
            method,
        } => {
            call.is_method = true;
            call.this = Some(receiver.clone());
            call.class_name = Some(class_name.clone());
            call.method_name = Some(method.clone());
        }
        CallTarget::StaticMethod { class_name, method } => {
            call.is_static = true;
            call.class_name = Some(class_name.clone());
            call.method_name = Some(method.clone());
        }
    }
    if let Some(this) = &closure.bound_this {
        call.this = Some(this.clone());
    }
}

/// `INIT_METHOD_CALL target, method_name`: dynamic dispatch — the
/// object's *actual* class is resolved later, at `DO_FCALL`.
fn init_method_call(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let target = engine.read(instr.op1)?;
    let method_name = engine.read(instr.op2)?.to_php_string();
    let Value::Object(object) = &target else {
        return Err(VmError::invalid_operand_type("object", target.type_name()));
    };
    let class_name = object.borrow().class_name.clone();
    let call = PendingCall {
        is_method: true,
        this: Some(target),
        class_name: Some(class_name),
        method_name: Some(method_name),
        result_target: instr.op3,
        ..Default::default()
    };
    engine.frame_mut().pending_calls.push(call);
    Ok(true)
}

/// `INIT_STATIC_METHOD_CALL class_name, method_name`: `class_name` may be
/// "self"/"parent"/"static", resolved against the active frame (spec
/// §4.4 late static binding).
fn init_static_method_call(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let raw_class = engine.read(instr.op1)?.to_php_string();
    let class_name = resolve_class_name(engine, &raw_class)?;
    let method_name = engine.read(instr.op2)?.to_php_string();
    // "static::" inside a static call keeps forwarding the *caller's*
    // late-static-binding class rather than resetting it to `class_name`.
    let calling_class = if raw_class == "static" || raw_class == "parent" || raw_class == "self" {
        engine
            .frame()
            .calling_class
            .clone()
            .or_else(|| engine.frame().class_name.clone())
    } else {
        Some(class_name.clone())
    };
    let call = PendingCall {
        is_static: true,
        class_name: Some(class_name),
        calling_class,
        method_name: Some(method_name),
        this: engine.frame().this.clone(),
        result_target: instr.op3,
        ..Default::default()
    };
    engine.frame_mut().pending_calls.push(call);
    Ok(true)
}

fn current_call_mut<'a>(engine: &'a mut Engine<'_>) -> VmResult<&'a mut PendingCall> {
    engine
        .frame_mut()
        .pending_calls
        .last_mut()
        .ok_or(VmError::CallStackEmpty)
}

/// `SEND_VAL value`: appends a by-value argument. `SEND_VAR` shares this
/// for any parameter that isn't declared by-reference (see `send_var`).
fn send_val(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let value = engine.read(instr.op1)?;
    let call = current_call_mut(engine)?;
    call.args.push(value);
    call.arg_names.push(None);
    Ok(true)
}

/// Looks up the pending call's resolved callee (plain function, bound
/// method, or static method — never a builtin, which has no declared
/// parameter list) and reports whether the parameter at `arg_index` is
/// declared by-reference. Resolution failures (unknown callee, a
/// builtin, a variadic tail past the declared parameters) just answer
/// `false` — `SEND_VAL`'s by-value behavior is always a safe fallback.
fn target_param_is_by_ref(engine: &Engine<'_>, arg_index: usize) -> bool {
    let Some(call) = engine.frame().pending_calls.last() else {
        return false;
    };
    let function = if call.is_method || call.is_static {
        match (&call.class_name, &call.method_name) {
            (Some(class_name), Some(method_name)) => engine
                .context
                .classes
                .find_method(class_name, method_name)
                .map(|(_, function)| function),
            _ => None,
        }
    } else if let Some(function) = &call.function {
        Some(Arc::clone(function))
    } else if let Some(name) = &call.callee_name {
        engine.context.functions.lookup(name)
    } else {
        None
    };
    function
        .and_then(|function| function.params.get(arg_index).map(|param| param.by_ref))
        .unwrap_or(false)
}

/// `SEND_VAR value`: like `SEND_VAL`, but first inspects the resolved
/// callee's corresponding parameter; when it's declared by-reference,
/// rewires the source slot to share a bidirectional reference cell with
/// the argument exactly as `SEND_REF` does for an explicit `&$x` call
/// site (spec §4.5 step 2).
fn send_var(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let arg_index = engine
        .frame()
        .pending_calls
        .last()
        .map(|call| call.args.len())
        .unwrap_or(0);
    if target_param_is_by_ref(engine, arg_index) {
        return send_ref(engine, instr);
    }
    send_val(engine, instr)
}

/// `SEND_REF var`: the callee's by-ref parameter shares the caller's
/// reference cell (spec §4.5).
fn send_ref(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let reference = engine.frame().read_operand(instr.op1)?.into_reference();
    engine.write(instr.op1, reference.clone())?;
    let call = current_call_mut(engine)?;
    call.args.push(reference);
    call.arg_names.push(None);
    Ok(true)
}

/// `SEND_VAL_NAMED value, name`: a named argument (`f(count: 3)`).
fn send_val_named(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let value = engine.read(instr.op1)?;
    let name = engine.read(instr.op2)?.to_php_string();
    let call = current_call_mut(engine)?;
    call.args.push(value);
    call.arg_names.push(Some(name));
    Ok(true)
}

/// Resolves positional + named arguments against a function's declared
/// parameters (spec §4.5 "argument binding"): named arguments slot into
/// their matching parameter, remaining positionals fill left-to-right,
/// a trailing variadic parameter collects whatever's left, and a missing
/// non-variadic, non-defaulted parameter is a hard error.
fn bind_arguments(classes: &ClassTable, function: &FunctionDescriptor, call: &PendingCall) -> VmResult<Vec<Value>> {
    let mut bound: Vec<Option<Value>> = vec![None; function.params.len()];
    let mut overflow: Vec<Value> = Vec::new();
    let mut next_positional = 0usize;

    for (value, name) in call.args.iter().zip(call.arg_names.iter()) {
        match name {
            Some(name) => {
                let index = function
                    .param_index(name)
                    .ok_or_else(|| VmError::UnknownNamedArgument { name: name.clone() })?;
                bound[index] = Some(value.clone());
            }
            None => {
                if next_positional < function.params.len() && !function.params[next_positional].variadic {
                    bound[next_positional] = Some(value.clone());
                    next_positional += 1;
                } else {
                    overflow.push(value.clone());
                }
            }
        }
    }

    let mut resolved = Vec::with_capacity(function.params.len());
    for (index, param) in function.params.iter().enumerate() {
        if param.variadic {
            let mut packed = PhpArray::new();
            if let Some(value) = bound[index].take() {
                packed.push(value);
            }
            for value in overflow.drain(..) {
                packed.push(value);
            }
            resolved.push(Value::array(packed));
            continue;
        }
        let value = match bound[index].take() {
            Some(value) => value,
            None => match &param.default {
                Some(default) => default.clone(),
                None => {
                    return Err(VmError::MissingRequiredArgument {
                        name: param.name.clone(),
                    })
                }
            },
        };
        check_param_type(classes, param, &value)?;
        resolved.push(value);
    }
    Ok(resolved)
}

fn check_param_type(classes: &ClassTable, param: &ParamDescriptor, value: &Value) -> VmResult<()> {
    if param.type_hint.accepts_scalar_shape(value) {
        return Ok(());
    }
    if let (TypeHint::Named(name), Value::Object(object)) = (&param.type_hint, value) {
        if classes.is_instance_of(&object.borrow().class_name, name) {
            return Ok(());
        }
    }
    Err(VmError::ArgumentTypeMismatch {
        name: param.name.clone(),
        expected: format!("{:?}", param.type_hint),
        actual: value.type_name().to_string(),
    })
}

/// Builds the callee's frame: binds resolved arguments into the leading
/// local slots (named per the function's `slot_names`), and carries
/// `this`/`class_name`/`calling_class` for method dispatch.
fn build_callee_frame(
    function: &Arc<FunctionDescriptor>,
    args: Vec<Value>,
    this: Option<Value>,
    class_name: Option<String>,
    calling_class: Option<String>,
    return_target: Operand,
) -> Frame {
    let mut frame = Frame::new(
        function.name.clone(),
        Arc::clone(&function.instructions),
        Arc::clone(&function.constants),
        function.slot_count,
    );
    frame.function_descriptor = Some(Arc::clone(function));
    for (slot, value) in args.into_iter().enumerate() {
        if slot < frame.locals.len() {
            frame.locals[slot] = value;
        }
    }
    for (slot, name) in function.slot_names.iter().enumerate() {
        if let Some(name) = name {
            frame.bind_slot_name(slot as u32, name.clone());
        }
    }
    frame.this = this;
    frame.class_name = class_name;
    frame.calling_class = calling_class;
    frame.return_target = return_target;
    frame
}

/// Packs the unresolved call into the arguments array `__call`/
/// `__callStatic` expect: `(string $name, array $args)`.
fn magic_call_args(call: &PendingCall) -> Vec<Value> {
    let mut packed = PhpArray::new();
    for value in &call.args {
        packed.push(value.clone());
    }
    vec![
        Value::str(call.method_name.clone().unwrap_or_default()),
        Value::array(packed),
    ]
}

enum Resolved {
    User {
        function: Arc<FunctionDescriptor>,
        this: Option<Value>,
        class_name: Option<String>,
        calling_class: Option<String>,
    },
    Builtin {
        name: String,
        args: Vec<Value>,
    },
}

fn resolve_callee(engine: &Engine<'_>, call: &PendingCall) -> VmResult<Resolved> {
    if call.is_method {
        let class_name = call.class_name.clone().expect("method call without class_name");
        let method_name = call.method_name.clone().expect("method call without method_name");
        if let Some((declaring_class, function)) = engine.context.classes.find_method(&class_name, &method_name) {
            return Ok(Resolved::User {
                function,
                this: call.this.clone(),
                class_name: Some(declaring_class.clone()),
                calling_class: Some(class_name),
            });
        }
        if let Some((declaring_class, function)) = engine.context.classes.find_method(&class_name, "__call") {
            return Ok(Resolved::User {
                function,
                this: call.this.clone(),
                class_name: Some(declaring_class),
                calling_class: Some(class_name),
            });
        }
        return Err(VmError::MethodNotFound {
            class: class_name,
            method: method_name,
        });
    }

    if call.is_static {
        let class_name = call.class_name.clone().expect("static call without class_name");
        let method_name = call.method_name.clone().expect("static call without method_name");
        let calling_class = call.calling_class.clone().or_else(|| Some(class_name.clone()));
        if let Some((declaring_class, function)) = engine.context.classes.find_method(&class_name, &method_name) {
            return Ok(Resolved::User {
                function,
                this: call.this.clone(),
                class_name: Some(declaring_class),
                calling_class,
            });
        }
        if let Some((declaring_class, function)) = engine.context.classes.find_method(&class_name, "__callStatic") {
            return Ok(Resolved::User {
                function,
                this: None,
                class_name: Some(declaring_class),
                calling_class,
            });
        }
        return Err(VmError::MethodNotFound {
            class: class_name,
            method: method_name,
        });
    }

    if let Some(function) = &call.function {
        return Ok(Resolved::User {
            function: Arc::clone(function),
            this: call.this.clone(),
            class_name: None,
            calling_class: None,
        });
    }

    let name = call.callee_name.clone().expect("plain call without callee_name");
    if let Some(function) = engine.context.functions.lookup(&name) {
        return Ok(Resolved::User {
            function,
            this: None,
            class_name: None,
            calling_class: None,
        });
    }
    if engine.context.builtins.contains(&name) {
        return Ok(Resolved::Builtin {
            name,
            args: call.args.clone(),
        });
    }
    Err(VmError::function_not_found(name))
}

/// `DO_FCALL`: resolves the pending call, then either answers it inline
/// (a builtin) or pushes a fresh frame (a user function/method) for the
/// dispatch loop to run next. A generator-flagged function doesn't run
/// at all here — it's wrapped in a suspended [`GeneratorHandle`] (spec
/// §4.8: "calling a generator function doesn't execute its body; it
/// returns a generator object").
fn do_fcall(engine: &mut Engine<'_>, _instr: &Instruction) -> VmResult<bool> {
    let call = engine.frame_mut().pending_calls.pop().ok_or(VmError::CallStackEmpty)?;
    let resolved = resolve_callee(engine, &call)?;
    match resolved {
        Resolved::Builtin { name, args } => {
            let handler = engine
                .context
                .builtins
                .get(&name)
                .expect("builtin presence already checked by resolve_callee");
            let mut bctx = BuiltinContext {
                context: engine.context,
                pending_exception: None,
            };
            let result = handler(&mut bctx, &args)?;
            engine.write(call.result_target, result)?;
            Ok(true)
        }
        Resolved::User {
            function,
            this,
            class_name,
            calling_class,
        } => {
            if engine.frames.len() >= engine.call_depth_limit {
                return Err(VmError::CallDepthExceeded {
                    depth: engine.frames.len(),
                    limit: engine.call_depth_limit,
                });
            }
            let is_magic_fallback = (call.is_method || call.is_static)
                && !function.name.eq_ignore_ascii_case(call.method_name.as_deref().unwrap_or_default());
            let args = if is_magic_fallback {
                magic_call_args(&call)
            } else {
                bind_arguments(&engine.context.classes, &function, &call)?
            };
            if function.is_generator {
                let frame = build_callee_frame(&function, args, this, class_name, calling_class, Operand::UNUSED);
                let handle = generator::new_handle(frame);
                engine.write(call.result_target, Value::Generator(handle))?;
                Ok(true)
            } else {
                let frame = build_callee_frame(&function, args, this, class_name, calling_class, call.result_target);
                engine.push_frame(frame);
                Ok(false)
            }
        }
    }
}

/// Invokes `this`'s `method_name` and runs it to completion before
/// returning its value, for callers that aren't bytecode (the iteration
/// protocol's `ObjectProtocol` source dispatches `rewind`/`valid`/
/// `current`/`key`/`next` this way — there's no `INIT_METHOD_CALL` call
/// site for them to piggyback on). Swaps the engine's frame stack for an
/// isolated one the same way generator driving does.
pub(super) fn call_method_sync(
    engine: &mut Engine<'_>,
    this: Value,
    method_name: &str,
    args: Vec<Value>,
) -> VmResult<Value> {
    let class_name = match &this {
        Value::Object(object) => object.borrow().class_name.clone(),
        other => return Err(VmError::invalid_operand_type("object", other.type_name())),
    };
    let (declaring_class, function) = engine
        .context
        .classes
        .find_method(&class_name, method_name)
        .ok_or_else(|| VmError::method_not_found(class_name.clone(), method_name.to_string()))?;
    let call = PendingCall {
        arg_names: vec![None; args.len()],
        args,
        ..Default::default()
    };
    let bound = bind_arguments(&engine.context.classes, &function, &call)?;
    let frame = build_callee_frame(
        &function,
        bound,
        Some(this),
        Some(declaring_class),
        Some(class_name),
        Operand::UNUSED,
    );
    let saved = std::mem::replace(&mut engine.frames, vec![frame]);
    let result = run_isolated_stack(engine);
    engine.frames = saved;
    result
}

/// Drives `engine.frames` (assumed to already hold only the isolated
/// stack a caller swapped in) until it empties, then hands back whatever
/// its bottom frame returned.
pub(super) fn run_isolated_stack(engine: &mut Engine<'_>) -> VmResult<Value> {
    while !engine.frames.is_empty() {
        engine.execute_next()?;
    }
    Ok(engine.take_last_return_value())
}

fn do_return(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let value = engine.read(instr.op1)?;
    engine.do_return(value)?;
    Ok(false)
}

/// `CREATE_CLOSURE name`: `name` names a compiler-registered anonymous
/// function descriptor. The enclosing `$this`, if any, rides along (PHP
/// closures created inside a method keep access to the instance unless
/// declared `static`).
fn create_closure(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let name = engine.read(instr.op1)?.to_php_string();
    let function = engine
        .context
        .functions
        .lookup(&name)
        .ok_or_else(|| VmError::function_not_found(name))?;
    let mut closure = ClosureValue::new(CallTarget::Function(function));
    closure.bound_this = engine.frame().this.clone();
    engine.write(instr.op3, Value::Closure(Rc::new(closure)))?;
    Ok(true)
}

/// `BIND_USE_VAR closure, name, value`: closures are immutable handles
/// (`Rc<ClosureValue>`), so binding a captured variable rebuilds the
/// value and writes it back, the same "rebuild, don't mutate in place"
/// pattern `assignment.rs` uses for reference writes.
fn bind_use_var(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let target = engine.read(instr.op1)?;
    let Value::Closure(closure) = target else {
        return Err(VmError::invalid_operand_type("closure", target.type_name()));
    };
    let name = engine.read(instr.op2)?.to_php_string();
    let value = engine.read(instr.op3)?;
    let mut rebuilt = (*closure).clone();
    rebuilt.bound_vars.insert(name, value);
    engine.write(instr.op1, Value::Closure(Rc::new(rebuilt)))?;
    Ok(true)
}

fn create_func_callable(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let name = engine.read(instr.op1)?.to_php_string();
    let function = engine
        .context
        .functions
        .lookup(&name)
        .ok_or_else(|| VmError::function_not_found(name))?;
    let closure = ClosureValue::new(CallTarget::Function(function));
    engine.write(instr.op3, Value::Closure(Rc::new(closure)))?;
    Ok(true)
}

fn create_method_callable(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let target = engine.read(instr.op1)?;
    let method = engine.read(instr.op2)?.to_php_string();
    let Value::Object(object) = &target else {
        return Err(VmError::invalid_operand_type("object", target.type_name()));
    };
    let class_name = object.borrow().class_name.clone();
    let closure = ClosureValue::new(CallTarget::BoundMethod {
        receiver: target.clone(),
        class_name,
        method,
    });
    engine.write(instr.op3, Value::Closure(Rc::new(closure)))?;
    Ok(true)
}

fn create_static_callable(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let class_name = engine.read(instr.op1)?.to_php_string();
    let method = engine.read(instr.op2)?.to_php_string();
    let closure = ClosureValue::new(CallTarget::StaticMethod { class_name, method });
    engine.write(instr.op3, Value::Closure(Rc::new(closure)))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassTable;
    use crate::context::{Context, FunctionRegistry};
    use crate::function::ParamDescriptor;

    fn double_function() -> FunctionDescriptor {
        FunctionDescriptor {
            name: "double".into(),
            params: vec![ParamDescriptor {
                name: "n".into(),
                by_ref: false,
                variadic: false,
                type_hint: TypeHint::Any,
                default: None,
            }],
            instructions: Arc::new(vec![Instruction::new(
                OpCode::Return,
                Operand::tmp(0),
                Operand::UNUSED,
                Operand::UNUSED,
            )]),
            constants: Arc::new(Vec::new()),
            is_generator: false,
            slot_count: 1,
            slot_names: vec![Some("n".into())],
        }
    }

    /// `function mutate(&$n) { $n = 99; }` — used to prove `SEND_VAR`
    /// rewires the caller's slot when the declared parameter is by-ref.
    fn mutate_function() -> FunctionDescriptor {
        FunctionDescriptor {
            name: "mutate".into(),
            params: vec![ParamDescriptor {
                name: "n".into(),
                by_ref: true,
                variadic: false,
                type_hint: TypeHint::Any,
                default: None,
            }],
            instructions: Arc::new(vec![
                Instruction::new(OpCode::Assign, Operand::constant(0), Operand::var(0), Operand::UNUSED),
                Instruction::new(OpCode::Return, Operand::UNUSED, Operand::UNUSED, Operand::UNUSED),
            ]),
            constants: Arc::new(vec![Value::Int(99)]),
            is_generator: false,
            slot_count: 1,
            slot_names: vec![Some("n".into())],
        }
    }

    #[test]
    fn send_var_rewires_source_slot_for_by_ref_parameters() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        context.functions.declare(mutate_function());
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(vec![Value::str("mutate")]), 1);
        engine.push_frame(frame);
        engine.frame_mut().locals[0] = Value::Int(1);

        init_fcall(
            &mut engine,
            &Instruction::new(OpCode::InitFcall, Operand::constant(0), Operand::UNUSED, Operand::UNUSED),
        )
        .unwrap();
        send_var(
            &mut engine,
            &Instruction::new(OpCode::SendVar, Operand::var(0), Operand::UNUSED, Operand::UNUSED),
        )
        .unwrap();
        assert!(engine.frame().locals[0].is_reference());

        let advance = do_fcall(&mut engine, &Instruction::bare(OpCode::DoFcall)).unwrap();
        assert!(!advance);
        assert_eq!(engine.frames.len(), 2);
        while engine.frames.len() > 1 {
            engine.execute_next().unwrap();
        }
        assert_eq!(engine.frame().locals[0].deref_clone(), Value::Int(99));
    }

    #[test]
    fn send_var_falls_back_to_by_value_for_non_ref_parameters() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        context.functions.declare(double_function());
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(vec![Value::str("double")]), 1);
        engine.push_frame(frame);
        engine.frame_mut().locals[0] = Value::Int(21);

        init_fcall(
            &mut engine,
            &Instruction::new(OpCode::InitFcall, Operand::constant(0), Operand::UNUSED, Operand::UNUSED),
        )
        .unwrap();
        send_var(
            &mut engine,
            &Instruction::new(OpCode::SendVar, Operand::var(0), Operand::UNUSED, Operand::UNUSED),
        )
        .unwrap();
        assert!(!engine.frame().locals[0].is_reference());
    }

    #[test]
    fn calling_a_user_function_pushes_a_bound_frame() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        context.functions.declare(double_function());
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(vec![Value::str("double"), Value::Int(21)]), 0);
        engine.push_frame(frame);

        init_fcall(&mut engine, &Instruction::new(OpCode::InitFcall, Operand::constant(0), Operand::UNUSED, Operand::tmp(0))).unwrap();
        send_val(&mut engine, &Instruction::new(OpCode::SendVal, Operand::constant(1), Operand::UNUSED, Operand::UNUSED)).unwrap();
        let advance = do_fcall(&mut engine, &Instruction::bare(OpCode::DoFcall)).unwrap();

        assert!(!advance);
        assert_eq!(engine.frames.len(), 2);
        assert_eq!(engine.frame().locals[0], Value::Int(21));
    }

    #[test]
    fn missing_required_argument_is_rejected() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        context.functions.declare(double_function());
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(vec![Value::str("double")]), 0);
        engine.push_frame(frame);

        init_fcall(&mut engine, &Instruction::new(OpCode::InitFcall, Operand::constant(0), Operand::UNUSED, Operand::tmp(0))).unwrap();
        let err = do_fcall(&mut engine, &Instruction::bare(OpCode::DoFcall)).unwrap_err();
        assert!(matches!(err, VmError::MissingRequiredArgument { .. }));
    }

    #[test]
    fn calling_a_builtin_answers_immediately_without_pushing_a_frame() {
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        context.builtins.register(
            "strlen",
            Arc::new(|_ctx, args| Ok(Value::Int(args[0].to_php_string().len() as i64))),
        );
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(vec![Value::str("strlen"), Value::str("hello")]), 0);
        engine.push_frame(frame);

        init_fcall(&mut engine, &Instruction::new(OpCode::InitFcall, Operand::constant(0), Operand::UNUSED, Operand::tmp(0))).unwrap();
        send_val(&mut engine, &Instruction::new(OpCode::SendVal, Operand::constant(1), Operand::UNUSED, Operand::UNUSED)).unwrap();
        let advance = do_fcall(&mut engine, &Instruction::bare(OpCode::DoFcall)).unwrap();

        assert!(advance);
        assert_eq!(engine.frames.len(), 1);
        assert_eq!(engine.frame().temporaries.get(&0), Some(&Value::Int(5)));
    }

    #[test]
    fn generator_function_call_yields_a_generator_value_without_running() {
        let mut function = double_function();
        function.is_generator = true;
        function.name = "gen".into();
        let mut context = Context::new(ClassTable::new(), FunctionRegistry::new());
        context.functions.declare(function);
        let mut engine = Engine::new(&mut context);
        let frame = Frame::new("main", Arc::new(Vec::new()), Arc::new(vec![Value::str("gen"), Value::Int(1)]), 0);
        engine.push_frame(frame);

        init_fcall(&mut engine, &Instruction::new(OpCode::InitFcall, Operand::constant(0), Operand::UNUSED, Operand::tmp(0))).unwrap();
        send_val(&mut engine, &Instruction::new(OpCode::SendVal, Operand::constant(1), Operand::UNUSED, Operand::UNUSED)).unwrap();
        let advance = do_fcall(&mut engine, &Instruction::bare(OpCode::DoFcall)).unwrap();

        assert!(advance);
        assert_eq!(engine.frames.len(), 1);
        assert!(matches!(engine.frame().temporaries.get(&0), Some(Value::Generator(_))));
    }
}
