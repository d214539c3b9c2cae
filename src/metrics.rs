//! Instruction and call-stack metrics (spec SPEC_FULL §B "profiles the
//! instruction" in the dispatch loop). Counters are cheap atomics so a
//! running script can be observed from another thread without locking the
//! hot loop.

use crate::opcode::OpCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Per-VM instruction and call-depth counters.
#[derive(Clone)]
pub struct Metrics {
    pub instructions_executed: Arc<AtomicU64>,
    pub calls_entered: Arc<AtomicU64>,
    pub exceptions_thrown: Arc<AtomicU64>,
    pub peak_call_depth: Arc<AtomicUsize>,
    pub current_call_depth: Arc<AtomicUsize>,
    started_at: Instant,
    per_opcode: Arc<RwLock<HashMap<&'static str, u64>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            instructions_executed: Arc::new(AtomicU64::new(0)),
            calls_entered: Arc::new(AtomicU64::new(0)),
            exceptions_thrown: Arc::new(AtomicU64::new(0)),
            peak_call_depth: Arc::new(AtomicUsize::new(0)),
            current_call_depth: Arc::new(AtomicUsize::new(0)),
            started_at: Instant::now(),
            per_opcode: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn record_instruction(&self, opcode: OpCode) {
        self.instructions_executed.fetch_add(1, Ordering::Relaxed);
        let mut table = self.per_opcode.write().expect("metrics poisoned");
        *table.entry(opcode_label(opcode)).or_insert(0) += 1;
    }

    pub fn record_call_entered(&self) {
        self.calls_entered.fetch_add(1, Ordering::Relaxed);
        let depth = self.current_call_depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_call_depth.fetch_max(depth, Ordering::Relaxed);
    }

    pub fn record_call_returned(&self) {
        self.current_call_depth.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_exception_thrown(&self) {
        self.exceptions_thrown.fetch_add(1, Ordering::Relaxed);
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn opcode_counts(&self) -> HashMap<&'static str, u64> {
        self.per_opcode.read().expect("metrics poisoned").clone()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn opcode_label(opcode: OpCode) -> &'static str {
    // `Debug` would allocate a String per call on the hot path; a direct
    // match keeps this zero-allocation.
    match opcode {
        OpCode::Add => "ADD",
        OpCode::Sub => "SUB",
        OpCode::Mul => "MUL",
        OpCode::Div => "DIV",
        OpCode::Mod => "MOD",
        OpCode::Pow => "POW",
        OpCode::DoFcall => "DO_FCALL",
        OpCode::Return => "RETURN",
        OpCode::Throw => "THROW",
        OpCode::Yield => "YIELD",
        OpCode::YieldFrom => "YIELD_FROM",
        _ => "OTHER",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_instructions_and_tracks_call_depth() {
        let metrics = Metrics::new();
        metrics.record_instruction(OpCode::Add);
        metrics.record_instruction(OpCode::Add);
        metrics.record_call_entered();
        metrics.record_call_entered();
        metrics.record_call_returned();
        assert_eq!(metrics.instructions_executed.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.peak_call_depth.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.current_call_depth.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.opcode_counts().get("ADD"), Some(&2));
    }
}
