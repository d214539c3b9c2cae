//! The output buffer stack (spec §6 "Output buffer stack").
//!
//! Scripts write through a writer that stacks in-memory buffers. When no
//! buffer is active, writes go straight to the base writer and mark HTTP
//! headers as sent on the first byte.

use crate::http::HttpHeaderContext;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStatus {
    pub level: usize,
    pub length: usize,
}

struct Buffer {
    contents: String,
    implicit_flush: bool,
}

/// A stack of in-memory output buffers over a single base sink.
pub struct OutputBufferStack {
    base: Arc<Mutex<String>>,
    stack: Vec<Buffer>,
}

impl OutputBufferStack {
    pub fn new() -> Self {
        Self {
            base: Arc::new(Mutex::new(String::new())),
            stack: Vec::new(),
        }
    }

    /// `start`: pushes a new buffer level.
    pub fn start(&mut self) {
        self.stack.push(Buffer {
            contents: String::new(),
            implicit_flush: false,
        });
    }

    /// Writes a chunk through the current buffer (or the base sink if
    /// none is active). Marks headers sent on the first write to the base
    /// sink, per spec §6.
    pub fn write(&mut self, chunk: &str, http: &HttpHeaderContext) {
        match self.stack.last_mut() {
            Some(top) => {
                top.contents.push_str(chunk);
                if top.implicit_flush {
                    self.flush_to_parent_or_base(http);
                }
            }
            None => {
                http.mark_headers_sent();
                self.base.lock().expect("output sink poisoned").push_str(chunk);
            }
        }
    }

    pub fn get_contents(&self) -> Option<String> {
        self.stack.last().map(|b| b.contents.clone())
    }

    pub fn get_length(&self) -> Option<usize> {
        self.stack.last().map(|b| b.contents.len())
    }

    pub fn get_level(&self) -> usize {
        self.stack.len()
    }

    /// `clean`: discards the current buffer's contents without popping it.
    pub fn clean(&mut self) {
        if let Some(top) = self.stack.last_mut() {
            top.contents.clear();
        }
    }

    /// `end_clean`: discards and pops the current buffer.
    pub fn end_clean(&mut self) -> bool {
        self.stack.pop().is_some()
    }

    /// `flush`: pushes the current buffer's contents down to the parent
    /// buffer (or the base writer) and clears it without popping.
    pub fn flush(&mut self, http: &HttpHeaderContext) {
        self.flush_to_parent_or_base(http);
    }

    fn flush_to_parent_or_base(&mut self, http: &HttpHeaderContext) {
        let Some(mut top) = self.stack.pop() else {
            return;
        };
        let chunk = std::mem::take(&mut top.contents);
        self.write(&chunk, http);
        self.stack.push(top);
    }

    /// `end_flush`: flushes then pops.
    pub fn end_flush(&mut self, http: &HttpHeaderContext) -> bool {
        let Some(mut top) = self.stack.pop() else {
            return false;
        };
        let chunk = std::mem::take(&mut top.contents);
        self.write(&chunk, http);
        true
    }

    /// `get_clean`: returns contents and pops.
    pub fn get_clean(&mut self) -> Option<String> {
        self.stack.pop().map(|b| b.contents)
    }

    /// `get_flush`: returns contents, flushes, and pops.
    pub fn get_flush(&mut self, http: &HttpHeaderContext) -> Option<String> {
        let contents = self.get_contents();
        self.end_flush(http);
        contents
    }

    pub fn status(&self) -> Option<BufferStatus> {
        self.stack.last().map(|b| BufferStatus {
            level: self.stack.len(),
            length: b.contents.len(),
        })
    }

    pub fn status_full(&self) -> Vec<BufferStatus> {
        (1..=self.stack.len())
            .map(|level| BufferStatus {
                level,
                length: self.stack[level - 1].contents.len(),
            })
            .collect()
    }

    /// `list_handlers`: PHP supports named output handler callbacks; this
    /// crate only models the buffering levels, so every level reports the
    /// sentinel "default output handler".
    pub fn list_handlers(&self) -> Vec<&'static str> {
        self.stack.iter().map(|_| "default output handler").collect()
    }

    pub fn set_implicit_flush(&mut self, enabled: bool) {
        if let Some(top) = self.stack.last_mut() {
            top.implicit_flush = enabled;
        }
    }

    pub fn base_contents(&self) -> String {
        self.base.lock().expect("output sink poisoned").clone()
    }
}

impl Default for OutputBufferStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_without_a_buffer_go_to_base_and_mark_headers_sent() {
        let http = HttpHeaderContext::new();
        let mut stack = OutputBufferStack::new();
        stack.write("hello", &http);
        assert_eq!(stack.base_contents(), "hello");
        assert!(http.headers_sent());
    }

    #[test]
    fn nested_buffer_captures_writes_until_flushed() {
        let http = HttpHeaderContext::new();
        let mut stack = OutputBufferStack::new();
        stack.start();
        stack.write("buffered", &http);
        assert_eq!(stack.get_contents().as_deref(), Some("buffered"));
        assert!(!http.headers_sent());
        stack.end_flush(&http);
        assert_eq!(stack.base_contents(), "buffered");
    }

    #[test]
    fn end_clean_discards_without_flushing() {
        let http = HttpHeaderContext::new();
        let mut stack = OutputBufferStack::new();
        stack.start();
        stack.write("discard me", &http);
        assert!(stack.end_clean());
        assert_eq!(stack.base_contents(), "");
    }
}
