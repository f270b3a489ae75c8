//! Platform abstraction layer
//!
//! Centralizes all platform-specific code (Windows, Linux, macOS).
//! Unsupported platforms get no-op implementations.
//!
//! # Usage
//!
//! ```ignore
//! use crate::platform;
//!
//! // Best-effort: the loop keeps running if the OS refuses
//! if let Err(e) = platform::set_thread_priority(ThreadPriority::Highest) { ... }
//! ```

#[cfg(windows)]
mod windows;

use crate::endpoint::ThreadPriority;
use std::io;

/// Apply a priority hint to the current thread
///
/// - Windows: THREAD_PRIORITY_ABOVE_NORMAL / THREAD_PRIORITY_HIGHEST
/// - Linux: per-thread nice value (-10 / -19); lowering nice usually
///   needs CAP_SYS_NICE, so expect `PermissionDenied` for normal users
/// - Other platforms: No-op
pub fn set_thread_priority(priority: ThreadPriority) -> io::Result<()> {
    #[cfg(windows)]
    {
        windows::set_thread_priority(priority)
    }
    #[cfg(target_os = "linux")]
    {
        set_thread_nice(nice_value(priority))
    }
    #[cfg(not(any(windows, target_os = "linux")))]
    {
        let _ = priority;
        Ok(())
    }
}

/// Nice value for a priority hint (Linux scale, -20 highest .. 19 lowest)
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn nice_value(priority: ThreadPriority) -> i32 {
    match priority {
        ThreadPriority::Normal => 0,
        ThreadPriority::High => -10,
        ThreadPriority::Highest => -19,
    }
}

#[cfg(target_os = "linux")]
fn set_thread_nice(nice: i32) -> io::Result<()> {
    if nice == 0 {
        return Ok(());
    }
    // On Linux, PRIO_PROCESS with a thread id targets that thread only
    let ret = unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        libc::setpriority(libc::PRIO_PROCESS, tid, nice)
    };
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
