//! Thread-local error stack and API-context bookkeeping.
//!
//! Public operations enter an [`ApiContext`]; the outermost entry clears
//! the stack. Failures are recorded with [`push`]. Calls into connector or
//! user code are bracketed by a [`CallbackGuard`], which restores the stack
//! and the context depth when it is dropped, including during unwinding.

use std::cell::RefCell;

use crate::error::{Category, Error, ErrorKind};

/// One entry on the error stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub category: Category,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Default)]
struct State {
    records: Vec<ErrorRecord>,
    api_depth: usize,
    paused: usize,
}

thread_local! {
    static STATE: RefCell<State> = RefCell::new(State::default());
}

/// Record a failure, unless recording is paused.
pub fn push(err: &Error) {
    STATE.with(|s| {
        let mut s = s.borrow_mut();
        if s.paused == 0 {
            s.records.push(ErrorRecord {
                category: err.category,
                kind: err.kind,
                message: err.message.clone(),
            });
        }
    });
}

/// Snapshot of this thread's error stack, oldest first.
pub fn error_stack() -> Vec<ErrorRecord> {
    STATE.with(|s| s.borrow().records.clone())
}

pub fn clear_error_stack() {
    STATE.with(|s| s.borrow_mut().records.clear());
}

/// Current API nesting depth on this thread.
pub fn api_depth() -> usize {
    STATE.with(|s| s.borrow().api_depth)
}

/// Marks entry into a public operation.
#[must_use]
pub struct ApiContext {
    _private: (),
}

impl ApiContext {
    pub fn enter() -> Self {
        STATE.with(|s| {
            let mut s = s.borrow_mut();
            if s.api_depth == 0 {
                s.records.clear();
            }
            s.api_depth += 1;
        });
        Self { _private: () }
    }
}

impl Drop for ApiContext {
    fn drop(&mut self) {
        STATE.with(|s| {
            let mut s = s.borrow_mut();
            s.api_depth = s.api_depth.saturating_sub(1);
        });
    }
}

/// Saves the error stack and API depth; restores both on drop.
#[must_use]
pub struct CallbackGuard {
    saved: Vec<ErrorRecord>,
    api_depth: usize,
}

impl CallbackGuard {
    pub fn new() -> Self {
        STATE.with(|s| {
            let mut s = s.borrow_mut();
            Self {
                saved: std::mem::take(&mut s.records),
                api_depth: s.api_depth,
            }
        })
    }
}

impl Default for CallbackGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        let saved = std::mem::take(&mut self.saved);
        let depth = self.api_depth;
        STATE.with(|s| {
            let mut s = s.borrow_mut();
            s.records = saved;
            s.api_depth = depth;
        });
    }
}

/// Suppresses recording while alive, for failures that are expected and
/// handled (trying candidate plugins or prefixes).
#[must_use]
pub struct PauseGuard {
    _private: (),
}

impl PauseGuard {
    pub fn new() -> Self {
        STATE.with(|s| s.borrow_mut().paused += 1);
        Self { _private: () }
    }
}

impl Default for PauseGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        STATE.with(|s| {
            let mut s = s.borrow_mut();
            s.paused = s.paused.saturating_sub(1);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(msg: &str) -> Error {
        Error::args(Category::File, msg)
    }

    #[test]
    fn outermost_entry_clears() {
        {
            let _cx = ApiContext::enter();
            push(&err("first"));
        }
        assert_eq!(error_stack().len(), 1);
        let _cx = ApiContext::enter();
        assert!(error_stack().is_empty());
        let _inner = ApiContext::enter();
        push(&err("second"));
        assert_eq!(api_depth(), 2);
    }

    #[test]
    fn callback_guard_restores_on_panic() {
        clear_error_stack();
        let _cx = ApiContext::enter();
        push(&err("before"));
        let result = std::panic::catch_unwind(|| {
            let _g = CallbackGuard::new();
            let _nested = ApiContext::enter();
            let _nested2 = ApiContext::enter();
            std::mem::forget(_nested2);
            push(&err("inside"));
            panic!("user callback failed");
        });
        assert!(result.is_err());
        let stack = error_stack();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack[0].message, "before");
        assert_eq!(api_depth(), 1);
    }

    #[test]
    fn pause_suppresses() {
        clear_error_stack();
        {
            let _p = PauseGuard::new();
            push(&err("hidden"));
        }
        assert!(error_stack().is_empty());
    }
}
