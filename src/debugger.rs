//! Breakpoint tracking for the dispatch loop (spec SPEC_FULL §B,
//! grounded on the teacher's own `Debugger`/`Breakpoint` pair — rescoped
//! here from script-hash-keyed breakpoints to function-name-keyed ones,
//! since this VM's unit of compilation is a function, not a script hash).

use std::collections::HashMap;

/// A breakpoint at a given instruction pointer within a named function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    function_name: String,
    instruction_pointer: usize,
}

impl Breakpoint {
    pub fn new(function_name: impl Into<String>, instruction_pointer: usize) -> Self {
        Self {
            function_name: function_name.into(),
            instruction_pointer,
        }
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn instruction_pointer(&self) -> usize {
        self.instruction_pointer
    }
}

/// The set of active breakpoints, consulted once per instruction by the
/// dispatch loop (spec §4.3: "checks for breakpoints").
#[derive(Default)]
pub struct Debugger {
    breakpoints: HashMap<String, Vec<usize>>,
}

impl Debugger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_breakpoint(&mut self, breakpoint: Breakpoint) {
        self.breakpoints
            .entry(breakpoint.function_name)
            .or_default()
            .push(breakpoint.instruction_pointer);
    }

    pub fn remove_breakpoint(&mut self, breakpoint: &Breakpoint) {
        if let Some(ips) = self.breakpoints.get_mut(&breakpoint.function_name) {
            ips.retain(|&ip| ip != breakpoint.instruction_pointer);
        }
    }

    pub fn has_breakpoint(&self, function_name: &str, ip: usize) -> bool {
        self.breakpoints
            .get(function_name)
            .is_some_and(|ips| ips.contains(&ip))
    }
}
