//! Minimal logging for the platform layer.
//!
//! Adapters report lifecycle events (worker startup, connection teardown)
//! through [`log`], which writes to stderr. With the `logwise` feature
//! enabled, adapters additionally emit structured records at the same points;
//! see the feature-gated call sites in the native adapter.
//!
//! Operation failures are never logged here. They travel through rejected
//! futures and `Result` values only, so callers decide what is worth
//! reporting.

/// Logs a message to stderr.
///
/// Kept deliberately plain: the platform layer must not require a logging
/// framework in order to be embedded.
pub(crate) fn log(str: &str) {
    eprintln!("{}", str);
}
