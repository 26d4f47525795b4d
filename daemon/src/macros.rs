//! Small helpers for the daemon's non-fatal error paths

/// Report an error as a status line and carry on
///
/// # Example
/// ```ignore
/// report_and_continue!(state.status, applier::apply(desktop, &path, &state.status), "apply wallpaper");
/// ```
macro_rules! report_and_continue {
    ($status:expr, $expr:expr, $context:expr) => {
        if let Err(e) = $expr {
            $status.emit(format!("Failed to {}: {}", $context, e));
        }
    };
}

/// Take the value of an `Option`, or log at debug level and return early
macro_rules! some_or_return {
    ($expr:expr, $($arg:tt)+) => {
        match $expr {
            Some(value) => value,
            None => {
                log::debug!($($arg)+);
                return;
            }
        }
    };
}
