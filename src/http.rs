//! The HTTP header context (spec §6 "HTTP header context"): a thread-safe
//! store of response code, ordered headers, request headers, and a
//! headers-sent flag.

use crate::error::VmError;
use std::sync::{Arc, Mutex, MutexGuard};

struct Inner {
    response_code: u16,
    headers: Vec<(String, String)>,
    request_headers: Vec<(String, String)>,
    headers_sent: bool,
}

#[derive(Clone)]
pub struct HttpHeaderContext {
    inner: Arc<Mutex<Inner>>,
}

impl HttpHeaderContext {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                response_code: 200,
                headers: Vec::new(),
                request_headers: Vec::new(),
                headers_sent: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("http header context poisoned")
    }

    pub fn headers_sent(&self) -> bool {
        self.lock().headers_sent
    }

    pub fn mark_headers_sent(&self) {
        self.lock().headers_sent = true;
    }

    /// Adds a response header. Fails once headers have already been sent
    /// (spec §6).
    pub fn add_header(&self, name: impl Into<String>, value: impl Into<String>) -> Result<(), VmError> {
        let mut inner = self.lock();
        if inner.headers_sent {
            return Err(VmError::InvalidExecutionState {
                reason: "cannot add header: headers already sent".to_string(),
            });
        }
        inner.headers.push((name.into(), value.into()));
        Ok(())
    }

    pub fn set_response_code(&self, code: u16) -> Result<(), VmError> {
        let mut inner = self.lock();
        if inner.headers_sent {
            return Err(VmError::InvalidExecutionState {
                reason: "cannot change response code: headers already sent".to_string(),
            });
        }
        inner.response_code = code;
        Ok(())
    }

    pub fn response_code(&self) -> u16 {
        self.lock().response_code
    }

    pub fn headers(&self) -> Vec<(String, String)> {
        self.lock().headers.clone()
    }

    pub fn set_request_headers(&self, headers: Vec<(String, String)>) {
        self.lock().request_headers = headers;
    }

    pub fn request_headers(&self) -> Vec<(String, String)> {
        self.lock().request_headers.clone()
    }
}

impl Default for HttpHeaderContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_writes_fail_after_headers_sent() {
        let ctx = HttpHeaderContext::new();
        ctx.add_header("X-Test", "1").unwrap();
        ctx.mark_headers_sent();
        assert!(ctx.add_header("X-Late", "1").is_err());
        assert!(ctx.set_response_code(404).is_err());
    }
}
