//! Platform registration and dispatch.
//!
//! A [`PlatformFactory`] bundles one host runtime's implementations of the
//! networking and scheduling capabilities. A [`Registry`] holds the active
//! factory and hands out its capabilities; this module also owns one
//! process-wide registry behind free functions, which is the common usage:
//! register a platform once at startup, then reach scheduling and socket
//! creation from anywhere.
//!
//! ```no_run
//! use underlay::platform;
//! use underlay::stub::StubPlatform;
//! use std::sync::Arc;
//!
//! // Once, at startup. Do not call this from library code unless you are
//! // implementing a new platform's `register()` entry point.
//! platform::register(Arc::new(StubPlatform::new()));
//!
//! // Anywhere afterwards.
//! platform::scheduler().schedule(Box::new(|| {
//!     println!("running on the platform scheduler");
//! }));
//! ```
//!
//! The accessors fail fast when nothing is registered — that is a
//! startup-ordering bug, not a runtime condition. Code that would rather
//! degrade than abort (plugins, optional integrations) can use the `try_`
//! variants, which return [`Error::NotRegistered`] instead.
//!
//! For dependency injection, construct a [`Registry`] directly and pass it
//! around; the process-wide instance is a convenience, not a requirement.

use std::fmt;
use std::sync::{Arc, LazyLock, RwLock};

use crate::error::Error;
use crate::net::Net;
use crate::scheduler::Scheduler;

/// Identifies which host environment a platform factory targets.
///
/// A closed set: adapters for runtimes not listed here do not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    /// Desktop/server processes with OS threads and `std::net`.
    Native,
    /// Web browsers (adapter lives out of tree; only the tag is defined here).
    Browser,
    /// Android embeddings.
    Android,
    /// iOS embeddings.
    Ios,
    /// The in-tree deterministic test double.
    Stub,
}

/// Capability bundle for one host runtime.
///
/// Concrete adapters implement this and hand an instance to
/// [`Registry::register`] (usually via their own `register()` startup entry
/// point). Multiple factories may exist in a binary; only the registered one
/// is active.
pub trait PlatformFactory: Send + Sync {
    /// The runtime's socket-creation capability.
    fn net(&self) -> Arc<dyn Net>;

    /// The runtime's task-scheduling capability.
    fn scheduler(&self) -> Arc<dyn Scheduler>;

    /// Which host environment this factory targets.
    fn kind(&self) -> RuntimeKind;
}

const REGISTER_FIRST: &str =
    "you must register a platform first, e.g. NativePlatform::register() at startup";

/// Holder of the active platform factory.
///
/// Two states: unregistered and registered. The transition is one-way;
/// re-registering swaps the factory but never returns to unregistered.
/// Registration is a last-writer-wins replace — the intended call pattern is
/// once, at startup, before concurrent readers exist.
pub struct Registry {
    factory: RwLock<Option<Arc<dyn PlatformFactory>>>,
}

impl Registry {
    /// Creates a registry with no platform registered.
    pub fn new() -> Self {
        Registry {
            factory: RwLock::new(None),
        }
    }

    /// Makes `factory` the active platform, replacing any previous one.
    pub fn register(&self, factory: Arc<dyn PlatformFactory>) {
        *self.factory.write().unwrap() = Some(factory);
    }

    /// Whether a platform has been registered.
    pub fn is_registered(&self) -> bool {
        self.factory.read().unwrap().is_some()
    }

    /// The active platform's networking capability.
    ///
    /// # Panics
    ///
    /// Panics if no platform is registered.
    pub fn net(&self) -> Arc<dyn Net> {
        self.try_net().expect(REGISTER_FIRST)
    }

    /// The active platform's scheduling capability.
    ///
    /// # Panics
    ///
    /// Panics if no platform is registered.
    pub fn scheduler(&self) -> Arc<dyn Scheduler> {
        self.try_scheduler().expect(REGISTER_FIRST)
    }

    /// The active platform's runtime kind.
    ///
    /// # Panics
    ///
    /// Panics if no platform is registered.
    pub fn kind(&self) -> RuntimeKind {
        self.try_kind().expect(REGISTER_FIRST)
    }

    /// Like [`net`](Self::net), but returns [`Error::NotRegistered`] instead
    /// of panicking.
    pub fn try_net(&self) -> Result<Arc<dyn Net>, Error> {
        Ok(self.active()?.net())
    }

    /// Like [`scheduler`](Self::scheduler), but returns
    /// [`Error::NotRegistered`] instead of panicking.
    pub fn try_scheduler(&self) -> Result<Arc<dyn Scheduler>, Error> {
        Ok(self.active()?.scheduler())
    }

    /// Like [`kind`](Self::kind), but returns [`Error::NotRegistered`]
    /// instead of panicking.
    pub fn try_kind(&self) -> Result<RuntimeKind, Error> {
        Ok(self.active()?.kind())
    }

    fn active(&self) -> Result<Arc<dyn PlatformFactory>, Error> {
        self.factory
            .read()
            .unwrap()
            .clone()
            .ok_or(Error::NotRegistered)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Registry::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.try_kind().ok();
        f.debug_struct("Registry").field("kind", &kind).finish()
    }
}

/// The process-wide registry behind the module-level free functions.
static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Registers `factory` as the process-wide platform.
///
/// Call once at startup. Do not call this directly unless you are
/// implementing a new platform; concrete adapters wrap it in their own
/// `register()` entry point.
pub fn register(factory: Arc<dyn PlatformFactory>) {
    REGISTRY.register(factory);
}

/// The process-wide platform's networking capability.
///
/// # Panics
///
/// Panics if no platform is registered.
pub fn net() -> Arc<dyn Net> {
    REGISTRY.net()
}

/// The process-wide platform's scheduling capability.
///
/// # Panics
///
/// Panics if no platform is registered.
pub fn scheduler() -> Arc<dyn Scheduler> {
    REGISTRY.scheduler()
}

/// The process-wide platform's runtime kind.
///
/// # Panics
///
/// Panics if no platform is registered.
pub fn kind() -> RuntimeKind {
    REGISTRY.kind()
}

/// Non-panicking form of [`net`].
pub fn try_net() -> Result<Arc<dyn Net>, Error> {
    REGISTRY.try_net()
}

/// Non-panicking form of [`scheduler`].
pub fn try_scheduler() -> Result<Arc<dyn Scheduler>, Error> {
    REGISTRY.try_scheduler()
}

/// Non-panicking form of [`kind`].
pub fn try_kind() -> Result<RuntimeKind, Error> {
    REGISTRY.try_kind()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Socket, SocketOptions};
    use crate::scheduler::Task;
    use std::time::Duration;

    struct NullNet;

    impl Net for NullNet {
        fn create_socket(
            &self,
            _addr: &str,
            _options: &SocketOptions,
        ) -> Result<Box<dyn Socket>, Error> {
            Err(Error::Unsupported("null net".to_string()))
        }
    }

    struct InlineScheduler;

    impl Scheduler for InlineScheduler {
        fn schedule(&self, task: Task) {
            task();
        }

        fn schedule_after(&self, _delay: Duration, task: Task) {
            task();
        }
    }

    struct TestFactory {
        kind: RuntimeKind,
        net: Arc<NullNet>,
        scheduler: Arc<InlineScheduler>,
    }

    impl TestFactory {
        fn new(kind: RuntimeKind) -> Self {
            TestFactory {
                kind,
                net: Arc::new(NullNet),
                scheduler: Arc::new(InlineScheduler),
            }
        }
    }

    impl PlatformFactory for TestFactory {
        fn net(&self) -> Arc<dyn Net> {
            self.net.clone()
        }

        fn scheduler(&self) -> Arc<dyn Scheduler> {
            self.scheduler.clone()
        }

        fn kind(&self) -> RuntimeKind {
            self.kind
        }
    }

    #[test]
    #[should_panic(expected = "you must register a platform first")]
    fn net_accessor_fails_fast_when_unregistered() {
        let registry = Registry::new();
        let _ = registry.net();
    }

    #[test]
    #[should_panic(expected = "you must register a platform first")]
    fn scheduler_accessor_fails_fast_when_unregistered() {
        let registry = Registry::new();
        let _ = registry.scheduler();
    }

    #[test]
    #[should_panic(expected = "you must register a platform first")]
    fn kind_accessor_fails_fast_when_unregistered() {
        let registry = Registry::new();
        let _ = registry.kind();
    }

    #[test]
    fn try_accessors_return_not_registered() {
        let registry = Registry::new();
        assert!(matches!(registry.try_net(), Err(Error::NotRegistered)));
        assert!(matches!(registry.try_scheduler(), Err(Error::NotRegistered)));
        assert!(matches!(registry.try_kind(), Err(Error::NotRegistered)));
        assert!(!registry.is_registered());
    }

    #[test]
    fn registration_exposes_the_factory_capabilities() {
        let registry = Registry::new();
        registry.register(Arc::new(TestFactory::new(RuntimeKind::Native)));
        assert!(registry.is_registered());
        assert_eq!(registry.kind(), RuntimeKind::Native);
        assert!(registry.net().create_socket("x", &SocketOptions::new()).is_err());
    }

    #[test]
    fn re_registration_replaces_the_factory() {
        let registry = Registry::new();
        registry.register(Arc::new(TestFactory::new(RuntimeKind::Android)));
        assert_eq!(registry.kind(), RuntimeKind::Android);

        let replacement = Arc::new(TestFactory::new(RuntimeKind::Ios));
        let scheduler = replacement.scheduler();
        registry.register(replacement);
        assert_eq!(registry.kind(), RuntimeKind::Ios);
        // accessors now reflect the replacement's capabilities, not A's
        assert!(Arc::ptr_eq(&registry.scheduler(), &scheduler));
    }

    #[test]
    fn scheduler_capability_runs_tasks() {
        let registry = Registry::new();
        registry.register(Arc::new(TestFactory::new(RuntimeKind::Stub)));
        let (sender, receiver) = std::sync::mpsc::channel();
        registry.scheduler().schedule(Box::new(move || {
            sender.send(7u32).unwrap();
        }));
        assert_eq!(receiver.recv().unwrap(), 7);
    }
}
