//! Real-Time Thread Priority
//!
//! Platform-specific priority elevation for the audio callback thread.
//! Called from inside the first callback; only the first call per process
//! does any work.
//!
//! - **macOS**: pthread QoS class USER_INTERACTIVE
//! - **Linux**: SCHED_FIFO (requires CAP_SYS_NICE or rtkit)
//! - elsewhere: no-op

use std::sync::atomic::{AtomicBool, Ordering};

/// Track if priority has been set (avoid repeated calls)
static PRIORITY_SET: AtomicBool = AtomicBool::new(false);

/// Result of priority elevation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityResult {
    Success,
    AlreadySet,
    Failed,
    Unsupported,
}

/// Set real-time priority for the current thread. Safe to call from the
/// audio callback: no allocation, no logging after the first attempt.
pub fn set_realtime_priority() -> PriorityResult {
    if PRIORITY_SET.swap(true, Ordering::SeqCst) {
        return PriorityResult::AlreadySet;
    }

    let result = platform_set_priority();
    if result == PriorityResult::Failed {
        // Allow a retry on the next stream start.
        PRIORITY_SET.store(false, Ordering::SeqCst);
    }
    result
}

#[cfg(target_os = "linux")]
fn platform_set_priority() -> PriorityResult {
    unsafe {
        let param = libc::sched_param { sched_priority: 70 };
        let rc = libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param);
        if rc == 0 {
            PriorityResult::Success
        } else {
            PriorityResult::Failed
        }
    }
}

#[cfg(target_os = "macos")]
fn platform_set_priority() -> PriorityResult {
    unsafe {
        let rc = libc::pthread_set_qos_class_self_np(libc::qos_class_t::QOS_CLASS_USER_INTERACTIVE, 0);
        if rc == 0 {
            PriorityResult::Success
        } else {
            PriorityResult::Failed
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn platform_set_priority() -> PriorityResult {
    PriorityResult::Unsupported
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_call_is_a_no_op() {
        // Whatever the first call returns, a successful first call makes
        // the second report AlreadySet.
        let first = set_realtime_priority();
        if first == PriorityResult::Success || first == PriorityResult::Unsupported {
            // Unsupported also latches (nothing to retry).
            let second = set_realtime_priority();
            assert!(matches!(
                second,
                PriorityResult::AlreadySet | PriorityResult::Failed
            ));
        }
    }
}
