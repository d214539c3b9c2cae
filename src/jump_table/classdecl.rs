//! `INIT_CLASS_TABLE, SET_CURRENT_CLASS, SET_CLASS_PARENT,
//! DECLARE_PROPERTY, DECLARE_CONSTANT, DECLARE_CLASS, DECLARE_INTERFACE,
//! ADD_INTERFACE, DECLARE_TRAIT, USE_TRAIT, CLEAR_CURRENT_CLASS` (spec
//! §4.3 "Class declaration" family, §3 "Class runtime" descriptor).
//!
//! These opcodes build a [`ClassDescriptor`] incrementally in
//! [`Engine::current_class`] and hand it to [`ClassTable::declare`] on
//! `DECLARE_CLASS`, which defers inheritance linking to first `resolve()`
//! (spec §5).

use super::JumpTable;
use crate::engine::Engine;
use crate::error::{VmError, VmResult};
use crate::function::{ClassDescriptor, PropertyDecl, Visibility};
use crate::instruction::Instruction;
use crate::opcode::OpCode;
use crate::value::Value;

pub fn register(table: &mut JumpTable) {
    table.set(OpCode::InitClassTable, init_class_table);
    table.set(OpCode::SetCurrentClass, set_current_class);
    table.set(OpCode::SetClassParent, set_class_parent);
    table.set(OpCode::DeclareProperty, declare_property);
    table.set(OpCode::DeclareConstant, declare_constant);
    table.set(OpCode::DeclareClass, declare_class);
    table.set(OpCode::DeclareInterface, declare_interface);
    table.set(OpCode::AddInterface, add_interface);
    table.set(OpCode::DeclareTrait, declare_trait);
    table.set(OpCode::UseTrait, use_trait);
    table.set(OpCode::ClearCurrentClass, clear_current_class);
}

fn seed_descriptor(engine: &Engine<'_>, name: &str) -> ClassDescriptor {
    engine
        .context
        .classes
        .descriptor(name)
        .map(|d| (*d).clone())
        .unwrap_or_else(|| ClassDescriptor::new(name))
}

/// `INIT_CLASS_TABLE name[, is_abstract]`: starts a fresh builder, seeded
/// from any descriptor the embedder already registered under this name
/// (so pre-compiled methods survive a script re-declaring its own
/// properties/constants on top).
fn init_class_table(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let name = engine.read(instr.op1)?.to_php_string();
    let mut descriptor = seed_descriptor(engine, &name);
    if !instr.op2.is_unused() {
        descriptor.is_abstract = engine.read(instr.op2)?.to_bool();
    }
    engine.current_class = Some(descriptor);
    Ok(true)
}

/// `SET_CURRENT_CLASS name`: re-targets the builder at `name` without
/// resetting `is_abstract`, used to resume declaring a class across
/// non-contiguous bytecode regions (e.g. after a nested trait use).
fn set_current_class(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let name = engine.read(instr.op1)?.to_php_string();
    if engine.current_class.as_ref().map(|d| d.name.as_str()) != Some(name.as_str()) {
        engine.current_class = Some(seed_descriptor(engine, &name));
    }
    Ok(true)
}

fn current_class_mut<'a>(engine: &'a mut Engine<'_>, op: &'static str) -> VmResult<&'a mut ClassDescriptor> {
    engine.current_class.as_mut().ok_or_else(|| VmError::InvalidClassContext {
        reason: format!("{op} with no class table initialized"),
    })
}

fn set_class_parent(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let parent = engine.read(instr.op1)?.to_php_string();
    current_class_mut(engine, "SET_CLASS_PARENT")?.parent_name = Some(parent);
    Ok(true)
}

/// `DECLARE_PROPERTY name, default`: registers a public, non-static,
/// non-readonly instance property. Visibility/static/readonly modifiers
/// are compile-time metadata this crate doesn't thread through a single
/// three-operand instruction; embedder-supplied descriptors (seeded in
/// `INIT_CLASS_TABLE`) carry the richer `PropertyDecl` when those
/// modifiers matter.
fn declare_property(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let name = engine.read(instr.op1)?.to_php_string();
    let default = engine.read(instr.op2)?;
    current_class_mut(engine, "DECLARE_PROPERTY")?.properties.insert(
        name,
        PropertyDecl {
            visibility: Visibility::Public,
            is_static: false,
            is_readonly: false,
            default_value: default,
        },
    );
    Ok(true)
}

fn declare_constant(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let name = engine.read(instr.op1)?.to_php_string();
    let value = engine.read(instr.op2)?;
    current_class_mut(engine, "DECLARE_CONSTANT")?
        .constants
        .insert(name, value);
    Ok(true)
}

/// `DECLARE_CLASS`: finalizes the builder and registers it (spec §5: the
/// descriptor is linked lazily on first `resolve()`, not here).
fn declare_class(engine: &mut Engine<'_>, _instr: &Instruction) -> VmResult<bool> {
    let descriptor = engine.current_class.take().ok_or(VmError::InvalidClassContext {
        reason: "DECLARE_CLASS with no class table initialized".to_string(),
    })?;
    engine.context.classes.declare(descriptor);
    Ok(true)
}

/// `DECLARE_INTERFACE name`: a standalone declaration, independent of the
/// builder (an interface has no own properties/constants in this model —
/// just a marker descriptor other classes' `interfaces` sets name).
fn declare_interface(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let name = engine.read(instr.op1)?.to_php_string();
    if !engine.context.classes.has_descriptor(&name) {
        let mut descriptor = ClassDescriptor::new(name);
        descriptor.is_abstract = true;
        engine.context.classes.declare(descriptor);
    }
    Ok(true)
}

fn add_interface(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let name = engine.read(instr.op1)?.to_php_string();
    current_class_mut(engine, "ADD_INTERFACE")?.interfaces.insert(name);
    Ok(true)
}

fn declare_trait(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let name = engine.read(instr.op1)?.to_php_string();
    if engine.context.classes.trait_descriptor(&name).is_none() {
        engine.context.classes.declare_trait(ClassDescriptor::new(name));
    }
    Ok(true)
}

/// `USE_TRAIT name`: merges the trait's methods/properties/constants into
/// the class under construction; existing entries on the class win
/// (spec §3: the same "child wins" rule applied to inheritance merges).
fn use_trait(engine: &mut Engine<'_>, instr: &Instruction) -> VmResult<bool> {
    let name = engine.read(instr.op1)?.to_php_string();
    let trait_descriptor = engine.context.classes.trait_descriptor(&name).ok_or_else(|| {
        VmError::ClassNotFound {
            name: format!("trait {name}"),
        }
    })?;
    let current = current_class_mut(engine, "USE_TRAIT")?;
    for (method_name, method) in &trait_descriptor.methods {
        current.methods.entry(method_name.clone()).or_insert_with(|| method.clone());
    }
    for (prop_name, prop) in &trait_descriptor.properties {
        current.properties.entry(prop_name.clone()).or_insert_with(|| prop.clone());
    }
    for (const_name, value) in &trait_descriptor.constants {
        current.constants.entry(const_name.clone()).or_insert_with(|| value.clone());
    }
    Ok(true)
}

fn clear_current_class(engine: &mut Engine<'_>, _instr: &Instruction) -> VmResult<bool> {
    engine.current_class = None;
    Ok(true)
}
