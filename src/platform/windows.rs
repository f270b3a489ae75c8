//! Windows platform implementation
//!
//! Uses the official `windows` crate for type-safe Windows API bindings.

use crate::endpoint::ThreadPriority;
use std::io;
use windows::Win32::System::Threading::{
    GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_ABOVE_NORMAL, THREAD_PRIORITY_HIGHEST,
};

// =============================================================================
// Performance: Thread priority
// =============================================================================

/// Raise the current thread's priority
pub fn set_thread_priority(priority: ThreadPriority) -> io::Result<()> {
    let level = match priority {
        ThreadPriority::Normal => return Ok(()),
        ThreadPriority::High => THREAD_PRIORITY_ABOVE_NORMAL,
        ThreadPriority::Highest => THREAD_PRIORITY_HIGHEST,
    };
    unsafe {
        let thread = GetCurrentThread();
        SetThreadPriority(thread, level).map_err(|e| io::Error::other(e.to_string()))
    }
}
