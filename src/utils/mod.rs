//! Shared utilities
//!
//! Logging setup, timing, process spawning and panic handling helpers.

pub mod logger;
pub mod process;
pub mod timer;

use std::any::Any;

pub use logger::{init_logger, LogLevel};
pub use process::{log_call, log_call_capture, CommandSpec};
pub use timer::Timer;

/// Extract a readable message from a caught panic payload
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let caught = std::panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(caught), "boom 1");

        let caught = std::panic::catch_unwind(|| std::panic::panic_any(7u32)).unwrap_err();
        assert_eq!(panic_message(caught), "panicked with a non-string payload");
    }
}
