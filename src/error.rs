//! Error types shared across the platform facade.
//!
//! There are two classes of failure in this crate, and they travel along
//! different paths:
//!
//! - **Programmer misuse** (e.g. asking a registry for a scheduler before any
//!   platform was registered). The panicking accessors treat this as fatal;
//!   the `try_` accessors surface it as [`Error::NotRegistered`] for callers
//!   that prefer a recoverable path.
//! - **Operation failure** (a socket could not connect, a handshake was
//!   refused). These are carried inside a rejected
//!   [`CompletionFuture`](crate::completion::CompletionFuture) or returned
//!   directly from adapter calls. Nothing is logged or rethrown implicitly:
//!   propagation is entirely handler- and `Result`-mediated.

/// Error type for platform and socket operations.
///
/// Adapters construct the variant that best describes what went wrong;
/// application code usually only matches on it inside a completion handler.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No platform factory has been registered with the registry.
    ///
    /// Returned by the `try_` accessors. The plain accessors panic instead,
    /// since calling them before registration is a startup-ordering bug.
    #[error("no platform registered; register one at startup, e.g. NativePlatform::register()")]
    NotRegistered,

    /// An I/O error from the underlying transport.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer refused or botched the connection handshake.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The connection was closed before or during the operation.
    #[error("connection closed")]
    ConnectionClosed,

    /// The adapter does not support the requested capability.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A failure described only by a message, for causes that have no richer
    /// representation (e.g. errors injected by test doubles).
    #[error("{0}")]
    Message(String),
}

impl Error {
    /// Creates a message-only error.
    ///
    /// Useful for rejecting a future with an ad-hoc cause.
    pub fn msg(message: impl Into<String>) -> Self {
        Error::Message(message.into())
    }
}
