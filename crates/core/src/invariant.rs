//! Fatal invariant checks
//!
//! Some failures mean the in-memory view and the engine's durable state may
//! have diverged. There is no safe way to continue from those, so they never
//! surface as [`crate::KeelError`]. They are logged under the
//! `keel::invariant` target and the thread panics. Release builds are
//! compiled with `panic = "abort"`, which turns that into process termination.

use std::fmt;

/// Log and panic with an invariant-failure message
#[cold]
#[track_caller]
pub fn fatal(message: fmt::Arguments<'_>) -> ! {
    let location = std::panic::Location::caller();
    tracing::error!(
        target: "keel::invariant",
        file = location.file(),
        line = location.line(),
        "Invariant failure: {}",
        message
    );
    panic!("Invariant failure: {}", message);
}

/// Abort unless `cond` holds
///
/// ```should_panic
/// keel_core::invariant!(1 + 1 == 3, "arithmetic is broken");
/// ```
#[macro_export]
macro_rules! invariant {
    ($cond:expr $(,)?) => {
        if !$cond {
            $crate::invariant::fatal(format_args!("{}", stringify!($cond)));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::invariant::fatal(format_args!($($arg)+));
        }
    };
}

/// Abort unless an engine call returned `Ok`
///
/// Evaluates to the `Ok` value.
#[macro_export]
macro_rules! invariant_engine_ok {
    ($call:expr, $($arg:tt)+) => {
        match $call {
            Ok(value) => value,
            Err(e) => $crate::invariant::fatal(format_args!(
                "{}: {} ({})",
                format_args!($($arg)+),
                e,
                e.code_name()
            )),
        }
    };
}
