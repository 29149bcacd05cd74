//! A deterministic in-process platform for tests and embedding.
//!
//! [`StubPlatform`] satisfies the [`PlatformFactory`] contract without
//! touching the host runtime: its scheduler queues tasks until the caller
//! drains them, and its sockets record what was sent and let the caller
//! inject inbound events. Everything runs on the calling thread, so tests
//! can assert on ordering without sleeps or synchronization.
//!
//! # Examples
//!
//! ```
//! use underlay::scheduler::Scheduler;
//! use underlay::stub::StubPlatform;
//!
//! let platform = StubPlatform::new();
//! let scheduler = platform.scheduler_handle();
//!
//! scheduler.schedule(Box::new(|| println!("first")));
//! scheduler.schedule(Box::new(|| println!("second")));
//! assert_eq!(scheduler.run_until_idle(), 2);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::Error;
use crate::net::{Net, Socket, SocketEvent, SocketEventHandler, SocketOptions};
use crate::platform::{PlatformFactory, RuntimeKind};
use crate::scheduler::{Scheduler, Task};

/// Platform factory for the stub runtime.
pub struct StubPlatform {
    net: Arc<StubNet>,
    scheduler: Arc<StubScheduler>,
}

impl StubPlatform {
    pub fn new() -> Self {
        StubPlatform {
            net: Arc::new(StubNet::new()),
            scheduler: Arc::new(StubScheduler::new()),
        }
    }

    /// Registers a stub platform process-wide and returns it, so the caller
    /// keeps the control side.
    pub fn register() -> Arc<StubPlatform> {
        let platform = Arc::new(StubPlatform::new());
        crate::platform::register(platform.clone());
        platform
    }

    /// The concrete scheduler, for draining queued tasks.
    pub fn scheduler_handle(&self) -> Arc<StubScheduler> {
        self.scheduler.clone()
    }

    /// The concrete net, for inspecting created sockets.
    pub fn net_handle(&self) -> Arc<StubNet> {
        self.net.clone()
    }
}

impl Default for StubPlatform {
    fn default() -> Self {
        StubPlatform::new()
    }
}

impl PlatformFactory for StubPlatform {
    fn net(&self) -> Arc<dyn Net> {
        self.net.clone()
    }

    fn scheduler(&self) -> Arc<dyn Scheduler> {
        self.scheduler.clone()
    }

    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Stub
    }
}

/// A scheduler that queues tasks until the caller drains them.
///
/// `schedule_after` collapses the delay and enqueues like `schedule`; the
/// stub trades timer fidelity for determinism.
pub struct StubScheduler {
    queue: Mutex<VecDeque<Task>>,
}

impl StubScheduler {
    pub fn new() -> Self {
        StubScheduler {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Runs queued tasks on the calling thread until the queue is empty,
    /// including tasks scheduled by the tasks being run. Returns how many
    /// tasks ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            // pop before running so a task can schedule more work
            let task = self.queue.lock().unwrap().pop_front();
            match task {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

impl Default for StubScheduler {
    fn default() -> Self {
        StubScheduler::new()
    }
}

impl Scheduler for StubScheduler {
    fn schedule(&self, task: Task) {
        self.queue.lock().unwrap().push_back(task);
    }

    fn schedule_after(&self, _delay: Duration, task: Task) {
        self.queue.lock().unwrap().push_back(task);
    }
}

/// A net whose sockets are inert recorders.
pub struct StubNet {
    created: Mutex<Vec<StubSocketControl>>,
}

impl StubNet {
    pub fn new() -> Self {
        StubNet {
            created: Mutex::new(Vec::new()),
        }
    }

    /// Control handles for every socket created so far, in creation order.
    pub fn created(&self) -> Vec<StubSocketControl> {
        self.created.lock().unwrap().clone()
    }

    /// Control handle for the most recently created socket.
    pub fn last_created(&self) -> Option<StubSocketControl> {
        self.created.lock().unwrap().last().cloned()
    }
}

impl Default for StubNet {
    fn default() -> Self {
        StubNet::new()
    }
}

impl Net for StubNet {
    fn create_socket(
        &self,
        addr: &str,
        options: &SocketOptions,
    ) -> Result<Box<dyn Socket>, Error> {
        let state = Arc::new(Mutex::new(StubSocketState {
            addr: addr.to_string(),
            options: options.clone(),
            open: false,
            closed: false,
            sent: Vec::new(),
            handler: None,
            pending: VecDeque::new(),
            dispatching: false,
        }));
        self.created
            .lock()
            .unwrap()
            .push(StubSocketControl {
                state: state.clone(),
            });
        Ok(Box::new(StubSocket { state }))
    }
}

struct StubSocketState {
    addr: String,
    options: SocketOptions,
    open: bool,
    closed: bool,
    sent: Vec<Vec<u8>>,
    handler: Option<SocketEventHandler>,
    /// Events waiting for the dispatching thread to drain them.
    pending: VecDeque<SocketEvent>,
    dispatching: bool,
}

/// Delivers `event` to the handler, in order, without holding the lock while
/// the handler runs.
///
/// Events are queued; the first emitter becomes the dispatching thread and
/// drains the queue, while emits arriving mid-dispatch (from another thread,
/// or reentrantly from the handler itself) just enqueue and return. No event
/// is ever lost, and a handler may call back into the socket or its control
/// handle. Events emitted while no handler is registered are dropped.
fn emit(state: &Arc<Mutex<StubSocketState>>, event: SocketEvent) {
    {
        let mut guard = state.lock().unwrap();
        guard.pending.push_back(event);
        if guard.dispatching {
            return;
        }
        guard.dispatching = true;
    }
    loop {
        let next = {
            let mut guard = state.lock().unwrap();
            match guard.pending.pop_front() {
                Some(event) => guard.handler.take().map(|handler| (handler, event)),
                None => {
                    guard.dispatching = false;
                    return;
                }
            }
        };
        if let Some((mut handler, event)) = next {
            handler(event);
            let mut guard = state.lock().unwrap();
            if guard.handler.is_none() {
                guard.handler = Some(handler);
            }
        }
    }
}

/// The application-facing side of a stub socket.
struct StubSocket {
    state: Arc<Mutex<StubSocketState>>,
}

impl Socket for StubSocket {
    fn on_event(&mut self, handler: SocketEventHandler) {
        self.state.lock().unwrap().handler = Some(handler);
    }

    fn open(&mut self) -> Result<(), Error> {
        {
            let mut guard = self.state.lock().unwrap();
            if guard.closed {
                return Err(Error::ConnectionClosed);
            }
            guard.open = true;
        }
        emit(&self.state, SocketEvent::Open);
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        let mut guard = self.state.lock().unwrap();
        if !guard.open || guard.closed {
            return Err(Error::ConnectionClosed);
        }
        guard.sent.push(data.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        {
            let mut guard = self.state.lock().unwrap();
            if guard.closed {
                return Ok(());
            }
            guard.closed = true;
            guard.open = false;
        }
        emit(&self.state, SocketEvent::Closed);
        Ok(())
    }
}

/// The test-facing side of a stub socket: inspect what the application did,
/// inject what the "network" does.
#[derive(Clone)]
pub struct StubSocketControl {
    state: Arc<Mutex<StubSocketState>>,
}

impl StubSocketControl {
    /// The address the socket was created with.
    pub fn addr(&self) -> String {
        self.state.lock().unwrap().addr.clone()
    }

    /// The options the socket was created with.
    pub fn options(&self) -> SocketOptions {
        self.state.lock().unwrap().options.clone()
    }

    /// Every payload the application has sent, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn is_open(&self) -> bool {
        let guard = self.state.lock().unwrap();
        guard.open && !guard.closed
    }

    /// Delivers an inbound message to the registered event handler.
    pub fn inject_message(&self, data: &[u8]) {
        emit(&self.state, SocketEvent::Message(data.to_vec()));
    }

    /// Simulates a transport failure: emits `Error`, then `Closed`, and marks
    /// the socket closed.
    pub fn inject_error(&self, error: Error) {
        {
            let mut guard = self.state.lock().unwrap();
            guard.closed = true;
            guard.open = false;
        }
        emit(&self.state, SocketEvent::Error(error));
        emit(&self.state, SocketEvent::Closed);
    }
}
