// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Console output for the CLI.
//!
//! User-facing messages go through the colored macros below. Library
//! diagnostics are `tracing` events, routed to stderr by [`init_tracing`].

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

/// Global verbosity flag.
static VERBOSE: AtomicBool = AtomicBool::new(true);

/// Set the global verbosity flag.
pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

/// Check if verbose output is enabled.
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Filter used when `RUST_LOG` is not set.
#[must_use]
pub const fn default_filter(verbose: bool) -> &'static str {
    if verbose { "dlc_inference=info" } else { "dlc_inference=warn" }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the verbosity flag. Returns `false` when a
/// global subscriber was already installed; that one stays in charge.
pub fn init_tracing(verbose: bool) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    match tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
    {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "keeping existing tracing subscriber");
            false
        }
    }
}

/// Macro for standard info messages.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        println!("{}", format!($($arg)*));
    }
}

/// Macro for warning messages.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        use colored::Colorize;
        eprintln!("{} {}", "WARNING ⚠️".yellow().bold(), format!($($arg)*));
    }
}

/// Macro for error messages.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        use colored::Colorize;
        eprintln!("{} {}", "Error:".red().bold(), format!($($arg)*));
    }
}

/// Macro for verbose messages.
#[macro_export]
macro_rules! verbose {
    ($($arg:tt)*) => {
        if $crate::cli::logging::is_verbose() {
            println!("{}", format!($($arg)*));
        }
    }
}

/// Macro for section headers.
#[macro_export]
macro_rules! section {
    ($($arg:tt)*) => {
        use colored::Colorize;
        if $crate::cli::logging::is_verbose() {
            println!();
            println!("{}", format!($($arg)*).cyan().bold());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_toggle() {
        set_verbose(true);
        assert!(is_verbose());

        set_verbose(false);
        assert!(!is_verbose());

        set_verbose(true);
        assert!(is_verbose());
    }

    #[test]
    fn test_init_tracing_keeps_first_subscriber() {
        init_tracing(true);
        assert!(!init_tracing(false));
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(true), "dlc_inference=info");
        assert_eq!(default_filter(false), "dlc_inference=warn");
    }
}
