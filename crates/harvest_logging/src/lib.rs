#![deny(missing_docs)]
//! Shared logging utilities for the harvest workspace.
//!
//! This crate provides the `harvest_*` logging macros used across the codebase,
//! a per-thread index context that prefixes every message with the index being
//! harvested, and a minimal test initializer for the global logger.

use std::cell::RefCell;

thread_local! {
    /// Thread-local storage for the index currently being harvested.
    static CURRENT_INDEX: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Sets the index context for the current thread. `None` clears it.
pub fn set_current_index(index: Option<&str>) {
    CURRENT_INDEX.with(|v| *v.borrow_mut() = index.map(str::to_owned));
}

/// Retrieves the index context for the current thread, if any.
pub fn current_index() -> Option<String> {
    CURRENT_INDEX.with(|v| v.borrow().clone())
}

/// Message prefix for the current index context: `"[slug] "` or `""`.
pub fn context_prefix() -> String {
    CURRENT_INDEX.with(|v| match v.borrow().as_deref() {
        Some(index) => format!("[{index}] "),
        None => String::new(),
    })
}

/// Guard that sets the index context on creation and restores the previous
/// context when dropped.
#[must_use = "the index context is cleared as soon as the scope is dropped"]
pub struct IndexScope {
    previous: Option<String>,
}

/// Enters the logging context of `index` until the returned guard is dropped.
pub fn index_scope(index: &str) -> IndexScope {
    let previous = current_index();
    set_current_index(Some(index));
    IndexScope { previous }
}

impl Drop for IndexScope {
    fn drop(&mut self) {
        set_current_index(self.previous.as_deref());
    }
}

/// Logs a trace-level message, prefixed with the current index context.
#[macro_export]
macro_rules! harvest_trace {
    ($($arg:tt)*) => {{
        log::trace!("{}{}", $crate::context_prefix(), format_args!($($arg)*));
    }};
}

/// Logs an info-level message, prefixed with the current index context.
#[macro_export]
macro_rules! harvest_info {
    ($($arg:tt)*) => {{
        log::info!("{}{}", $crate::context_prefix(), format_args!($($arg)*));
    }};
}

/// Logs a debug-level message, prefixed with the current index context.
#[macro_export]
macro_rules! harvest_debug {
    ($($arg:tt)*) => {{
        log::debug!("{}{}", $crate::context_prefix(), format_args!($($arg)*));
    }};
}

/// Logs a warn-level message, prefixed with the current index context.
#[macro_export]
macro_rules! harvest_warn {
    ($($arg:tt)*) => {{
        log::warn!("{}{}", $crate::context_prefix(), format_args!($($arg)*));
    }};
}

/// Logs an error-level message, prefixed with the current index context.
#[macro_export]
macro_rules! harvest_error {
    ($($arg:tt)*) => {{
        log::error!("{}{}", $crate::context_prefix(), format_args!($($arg)*));
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
