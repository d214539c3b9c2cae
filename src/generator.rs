//! The generator coroutine model (spec §4.8 "Generator Coroutine", C7).
//!
//! A generator is a Value of object type whose hidden slot holds a
//! suspendable coroutine: its own [`Frame`], driven by the engine's
//! dispatch loop re-entering it rather than by a fresh OS thread or a
//! stackful coroutine primitive (Rust has neither without `unsafe`). The
//! coroutine shares the enclosing [`Context`](crate::context::Context) —
//! unlike the goroutine executor (C8), which deep-copies one.

use crate::frame::Frame;
use crate::iterator::Iterator as FrameIterator;
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineState {
    NotStarted,
    Suspended,
    Completed,
}

/// What a `YIELD_FROM` is pulling values from (spec §4.8: "while
/// delegation is active, Advance pulls from the delegate until exhausted,
/// then continues the host coroutine"). PHP also allows delegating to a
/// plain array/`Traversable`, not just another generator.
pub enum Delegate {
    Generator(GeneratorHandle),
    Iterable(FrameIterator),
}

pub struct GeneratorCoroutine {
    pub frame: Frame,
    pub state: CoroutineState,
    pub current_key: Option<Value>,
    pub current_value: Option<Value>,
    /// Auto-incrementing key used when a `YIELD` supplies no explicit key.
    pub next_auto_key: i64,
    /// Active `YIELD_FROM` delegation target, if any.
    pub delegate: Option<Delegate>,
    pub return_value: Value,
}

impl GeneratorCoroutine {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            state: CoroutineState::NotStarted,
            current_key: None,
            current_value: None,
            next_auto_key: 0,
            delegate: None,
            return_value: Value::Null,
        }
    }

    /// Stores a yielded `(key, value)` pair, auto-assigning the key when
    /// the `YIELD` didn't supply one (spec §4.8 "Suspend").
    pub fn suspend_with(&mut self, key: Option<Value>, value: Value) {
        let key = key.unwrap_or_else(|| {
            let k = self.next_auto_key;
            self.next_auto_key += 1;
            Value::Int(k)
        });
        if let Value::Int(i) = &key {
            if *i >= self.next_auto_key {
                self.next_auto_key = i + 1;
            }
        }
        self.current_key = Some(key);
        self.current_value = Some(value);
        self.state = CoroutineState::Suspended;
    }

    pub fn mark_completed(&mut self, return_value: Value) {
        self.current_key = None;
        self.current_value = None;
        self.state = CoroutineState::Completed;
        self.return_value = return_value;
    }

    pub fn is_completed(&self) -> bool {
        self.state == CoroutineState::Completed
    }
}

/// A shared handle to a coroutine. Shared because a generator Value may be
/// copied (by handle, like any object) while still driving the same
/// underlying coroutine.
pub type GeneratorHandle = Rc<RefCell<GeneratorCoroutine>>;

pub fn new_handle(frame: Frame) -> GeneratorHandle {
    Rc::new(RefCell::new(GeneratorCoroutine::new(frame)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn empty_frame() -> Frame {
        Frame::new("g", Arc::new(Vec::new()), Arc::new(Vec::new()), 0)
    }

    #[test]
    fn auto_key_increments_when_unspecified() {
        let mut coroutine = GeneratorCoroutine::new(empty_frame());
        coroutine.suspend_with(None, Value::Int(10));
        coroutine.suspend_with(None, Value::Int(20));
        assert_eq!(coroutine.current_key, Some(Value::Int(1)));
    }

    #[test]
    fn explicit_int_key_advances_auto_counter() {
        let mut coroutine = GeneratorCoroutine::new(empty_frame());
        coroutine.suspend_with(Some(Value::Int(5)), Value::Int(1));
        coroutine.suspend_with(None, Value::Int(2));
        assert_eq!(coroutine.current_key, Some(Value::Int(6)));
    }

    #[test]
    fn completed_coroutine_clears_current_pair() {
        let mut coroutine = GeneratorCoroutine::new(empty_frame());
        coroutine.suspend_with(None, Value::Int(1));
        coroutine.mark_completed(Value::Null);
        assert!(coroutine.is_completed());
        assert!(coroutine.current_value.is_none());
    }
}
