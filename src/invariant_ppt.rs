//! Runtime invariant checks with contract-test support.
//!
//! Production code states the invariants it relies on with
//! [`assert_invariant!`]; every check is recorded per thread so tests can
//! assert that a code path actually verified the invariants it claims to.
//!
//! A violated invariant panics in debug builds. Release builds log it at
//! `error` and keep running, since the session state it describes is owned
//! by the platform backend.
//!
//! ```rust,ignore
//! use snapcam::invariant_ppt::*;
//!
//! assert_invariant!(
//!     inputs.len() == 1,
//!     "running session holds exactly one input",
//!     "session::switch_cameras"
//! );
//!
//! #[test]
//! fn contract_switch() {
//!     contract_test("switch", &["running session holds exactly one input"]);
//! }
//! ```

use std::cell::RefCell;
use std::collections::HashMap;
use std::thread_local;

thread_local! {
    static INVARIANT_LOG: RefCell<HashMap<String, InvariantRecord>> = RefCell::new(HashMap::new());
}

/// How often an invariant was checked on this thread, and how often it failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvariantRecord {
    pub checks: u64,
    pub violations: u64,
}

/// Check an invariant and record the check for contract testing.
#[macro_export]
macro_rules! assert_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariant_ppt::__check_invariant_impl($condition, $message, None)
    };
    ($condition:expr, $message:expr, $context:expr) => {
        $crate::invariant_ppt::__check_invariant_impl($condition, $message, Some($context))
    };
}

#[doc(hidden)]
pub fn __check_invariant_impl(condition: bool, message: &str, context: Option<&str>) -> bool {
    INVARIANT_LOG.with(|log| {
        let mut log = log.borrow_mut();
        let record = log.entry(message.to_string()).or_default();
        record.checks += 1;
        if !condition {
            record.violations += 1;
        }
    });

    if !condition {
        let ctx = context.unwrap_or("unknown");
        if cfg!(debug_assertions) {
            panic!("INVARIANT VIOLATION [{}]: {}", ctx, message);
        }
        log::error!("INVARIANT VIOLATION [{}]: {}", ctx, message);
    }
    condition
}

/// Record for one invariant on the current thread, if it was ever checked.
pub fn invariant_record(message: &str) -> Option<InvariantRecord> {
    INVARIANT_LOG.with(|log| log.borrow().get(message).copied())
}

/// Panics unless every listed invariant was checked on this thread without
/// a violation.
pub fn contract_test(test_name: &str, required_invariants: &[&str]) {
    let log = INVARIANT_LOG.with(|log| log.borrow().clone());

    let mut missing: Vec<&str> = Vec::new();
    let mut violated: Vec<&str> = Vec::new();
    for invariant in required_invariants {
        match log.get(*invariant) {
            None => missing.push(invariant),
            Some(record) if record.violations > 0 => violated.push(invariant),
            Some(_) => {}
        }
    }

    if !missing.is_empty() || !violated.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]:\n  not checked:\n  - {}\n  violated:\n  - {}",
            test_name,
            missing.join("\n  - "),
            violated.join("\n  - ")
        );
    }
}

/// Clear the invariant log for the current thread.
pub fn clear_invariant_log() {
    INVARIANT_LOG.with(|log| log.borrow_mut().clear());
}
