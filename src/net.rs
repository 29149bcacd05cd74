//! The networking contracts platforms expose to application code.
//!
//! [`Net`] is the capability to construct a bidirectional streaming socket
//! from a target address and a configuration set. [`Socket`] is the
//! collaborator contract the returned object satisfies: its exact transport
//! semantics belong to the concrete adapter, not to this module.
//!
//! # Option maps
//!
//! [`SocketOptions`] is a configuration object with implementation-defined
//! recognized keys. Adapters read the keys they understand and ignore the
//! rest, so one option set can be handed to any platform. Typed accessors
//! exist for the keys the in-tree adapters recognize.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::Error;

/// Capability to construct sockets on the host runtime.
pub trait Net: Send + Sync {
    /// Creates a socket targeting `addr`.
    ///
    /// The address scheme is adapter-defined (the native adapter takes
    /// `ws://host:port[/path]`). Creation does not connect; register an event
    /// handler first, then call [`Socket::open`] so no lifecycle event is
    /// missed.
    fn create_socket(&self, addr: &str, options: &SocketOptions)
    -> Result<Box<dyn Socket>, Error>;
}

/// A lifecycle or data event delivered to a socket's event handler.
#[derive(Debug)]
pub enum SocketEvent {
    /// The connection is established and the socket is ready to send.
    Open,
    /// A complete inbound message.
    Message(Vec<u8>),
    /// The connection closed; no further events follow.
    Closed,
    /// The connection failed; a `Closed` event follows.
    Error(Error),
}

/// The receive/lifecycle callback registered on a socket.
///
/// Adapters may invoke it from an internal thread; marshaling back onto an
/// application thread is the caller's job (typically via
/// [`Scheduler::schedule`](crate::scheduler::Scheduler::schedule)).
pub type SocketEventHandler = Box<dyn FnMut(SocketEvent) + Send + 'static>;

/// A bidirectional streaming socket produced by a [`Net`] implementation.
///
/// The expected call sequence is `on_event`, then `open`, then any number of
/// `send`s, then `close`. Adapters define what happens outside that sequence
/// (most reject it with [`Error::ConnectionClosed`] or similar).
pub trait Socket: Send {
    /// Registers the single event handler slot, replacing any previous one.
    fn on_event(&mut self, handler: SocketEventHandler);

    /// Starts the connection. Emits [`SocketEvent::Open`] once established.
    fn open(&mut self) -> Result<(), Error>;

    /// Sends one message.
    fn send(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Closes the connection. Emits [`SocketEvent::Closed`].
    fn close(&mut self) -> Result<(), Error>;
}

/// Socket configuration: a map of implementation-defined keys.
///
/// Unrecognized keys are ignored by adapters. Serializable, so option sets
/// can live in application config files.
///
/// # Examples
///
/// ```
/// use underlay::net::SocketOptions;
///
/// let options = SocketOptions::new()
///     .set(SocketOptions::CONNECT_TIMEOUT_MS, 1500)
///     .set("my_adapter_specific_knob", "on");
/// assert_eq!(options.connect_timeout(), Some(std::time::Duration::from_millis(1500)));
/// ```
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SocketOptions {
    entries: HashMap<String, serde_json::Value>,
}

impl SocketOptions {
    /// Connection timeout in milliseconds (integer).
    pub const CONNECT_TIMEOUT_MS: &'static str = "connect_timeout_ms";
    /// Whether to use TLS (boolean).
    pub const TLS: &'static str = "tls";

    /// Creates an empty option set.
    pub fn new() -> Self {
        SocketOptions::default()
    }

    /// Sets a key, returning the options for chaining.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Raw access to a key, recognized or not.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.entries.get(key)
    }

    /// The connection timeout, if [`Self::CONNECT_TIMEOUT_MS`] is set to an
    /// integer.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.get(Self::CONNECT_TIMEOUT_MS)?
            .as_u64()
            .map(Duration::from_millis)
    }

    /// Whether [`Self::TLS`] is set to `true`.
    pub fn tls(&self) -> bool {
        self.get(Self::TLS).and_then(|v| v.as_bool()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_accessors_read_recognized_keys() {
        let options = SocketOptions::new()
            .set(SocketOptions::CONNECT_TIMEOUT_MS, 250)
            .set(SocketOptions::TLS, true);
        assert_eq!(options.connect_timeout(), Some(Duration::from_millis(250)));
        assert!(options.tls());
    }

    #[test]
    fn missing_and_mistyped_keys_read_as_absent() {
        let options = SocketOptions::new().set(SocketOptions::CONNECT_TIMEOUT_MS, "soon");
        assert_eq!(options.connect_timeout(), None);
        assert!(!options.tls());
    }

    #[test]
    fn unrecognized_keys_are_preserved_but_inert() {
        let options = SocketOptions::new().set("x_vendor_flag", 3);
        assert_eq!(options.get("x_vendor_flag").and_then(|v| v.as_u64()), Some(3));
        assert_eq!(options.connect_timeout(), None);
    }

    #[test]
    fn options_round_trip_through_json() {
        let options = SocketOptions::new()
            .set(SocketOptions::TLS, false)
            .set("path", "/v1");
        let json = serde_json::to_string(&options).unwrap();
        let back: SocketOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("path").and_then(|v| v.as_str()), Some("/v1"));
        assert!(!back.tls());
    }
}
