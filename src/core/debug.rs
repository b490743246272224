// src/core/debug.rs
//! Env-gated debug logging. Set ARQON_DEBUG=1 to enable trace output
//! from the evaluator and the assembly bridge.

use std::sync::OnceLock;

static DEBUG_ENABLED: OnceLock<bool> = OnceLock::new();

pub fn debug_enabled() -> bool {
    *DEBUG_ENABLED.get_or_init(|| {
        std::env::var("ARQON_DEBUG").map(|v| v == "1").unwrap_or(false)
    })
}

#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        if $crate::core::debug::debug_enabled() {
            eprintln!("[arqon] {}", format!($($arg)*));
        }
    };
}
