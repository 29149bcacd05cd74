//! The native platform: OS threads and `std::net`.
//!
//! This adapter targets ordinary desktop and server processes. Scheduling is
//! a dedicated worker thread fed over a channel; sockets are WebSocket
//! clients implemented directly on [`std::net::TcpStream`], threads-style,
//! with no async runtime underneath.
//!
//! Call [`NativePlatform::register`] once at startup:
//!
//! ```no_run
//! use underlay::native::NativePlatform;
//! use underlay::platform;
//!
//! NativePlatform::register();
//! assert_eq!(platform::kind(), platform::RuntimeKind::Native);
//! ```

mod frame;
mod scheduler;
mod socket;

pub use scheduler::NativeScheduler;
pub use socket::NativeSocket;

use std::sync::Arc;

use crate::error::Error;
use crate::net::{Net, Socket, SocketOptions};
use crate::platform::{PlatformFactory, RuntimeKind};
use crate::scheduler::Scheduler;

/// Platform factory for the native runtime.
pub struct NativePlatform {
    net: Arc<NativeNet>,
    scheduler: Arc<NativeScheduler>,
}

impl NativePlatform {
    /// Creates the factory without registering it. The scheduler's worker
    /// thread starts here.
    pub fn new() -> Self {
        NativePlatform {
            net: Arc::new(NativeNet),
            scheduler: Arc::new(NativeScheduler::new()),
        }
    }

    /// Registers a native platform process-wide and returns it.
    pub fn register() -> Arc<NativePlatform> {
        let platform = Arc::new(NativePlatform::new());
        crate::platform::register(platform.clone());
        #[cfg(feature = "logwise")]
        logwise::info_sync!("underlay: native platform registered");
        platform
    }
}

impl Default for NativePlatform {
    fn default() -> Self {
        NativePlatform::new()
    }
}

impl PlatformFactory for NativePlatform {
    fn net(&self) -> Arc<dyn Net> {
        self.net.clone()
    }

    fn scheduler(&self) -> Arc<dyn Scheduler> {
        self.scheduler.clone()
    }

    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Native
    }
}

/// Socket construction on the native runtime. Addresses take the form
/// `ws://host:port[/path]`.
pub struct NativeNet;

impl Net for NativeNet {
    fn create_socket(
        &self,
        addr: &str,
        options: &SocketOptions,
    ) -> Result<Box<dyn Socket>, Error> {
        Ok(Box::new(NativeSocket::new(addr, options.clone())?))
    }
}
