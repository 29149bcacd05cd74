/*!
A uniform platform facade over host runtimes: sockets, scheduling, and
completion futures.

underlay lets the same application core run on desktops, mobile embeddings,
and test harnesses by pushing every runtime-specific capability behind a
small set of contracts. Code written against the facade never names a
concrete runtime; it asks the registered platform for a scheduler or a
socket and carries on.

# Overview

Three pieces fit together:

- A [`platform::PlatformFactory`] bundles one host runtime's capabilities:
  a [`net::Net`] for creating sockets and a [`scheduler::Scheduler`] for
  running tasks. Exactly one factory is registered per process (or per
  [`platform::Registry`], for dependency injection), once, at startup.
- A [`completion::CompletionFuture`] carries the eventual outcome of one
  asynchronous operation to a single completion handler, with synchronous
  inline dispatch and no runtime underneath.
- Concrete adapters: [`native::NativePlatform`] for ordinary processes and
  [`stub::StubPlatform`] for deterministic tests.

# Key Features

- **No async runtime required**: The native adapter uses threads, not tokio,
  so the facade embeds in any program, including ones you are debugging
- **Compiler-enforced confinement**: `CompletionFuture` is `!Send`; results
  cross threads through schedulers and channels, never by accident
- **Fail-fast registration**: Forgetting to register a platform is a
  startup-ordering bug and the accessors say so immediately
- **Deterministic testing**: The stub platform queues tasks until you drain
  them and lets tests play the network's side of every socket

# Quick Start

## Completing a future

```
use underlay::completion::CompletionFuture;

fn fetch_config() -> CompletionFuture<String> {
    let future = CompletionFuture::new();
    let completion = future.clone();
    // kick off work that eventually calls:
    completion.resolve("ready".to_string());
    future
}

fetch_config().on_complete(|outcome| match outcome {
    Ok(config) => println!("loaded: {config}"),
    Err(error) => eprintln!("failed: {error}"),
});
```

## Going through the platform

```
use underlay::net::{SocketEvent, SocketOptions};
use underlay::platform;
use underlay::stub::StubPlatform;

// Once, at startup. Real programs call NativePlatform::register();
// tests keep the stub's control side.
let platform = StubPlatform::register();

// Anywhere afterwards: reach the network through the facade.
let mut socket = platform::net()
    .create_socket("ws://example.com:1984/feed", &SocketOptions::new())
    .unwrap();
let (sender, receiver) = std::sync::mpsc::channel();
socket.on_event(Box::new(move |event| {
    if let SocketEvent::Message(data) = event {
        sender.send(data).unwrap();
    }
}));
socket.open().unwrap();
socket.send(b"subscribe").unwrap();

// The test double lets the test play the network's side.
let control = platform.net_handle().last_created().unwrap();
assert_eq!(control.sent(), vec![b"subscribe".to_vec()]);
control.inject_message(b"tick");
assert_eq!(receiver.try_recv().unwrap(), b"tick");
```

# Architecture

## Why not just use tokio?

Because the programs this facade targets do not get to pick their runtime.
A library embedded in a mobile app, a plugin, or a program under a debugger
inherits whatever environment its host provides; an async executor is a big
thing to smuggle in. Threads and channels are everywhere already. Threads
for everyone.

## Why a registry instead of generics?

The point is that application code compiles once and runs on any platform.
Generics would push a platform type parameter through every signature in the
application; a registered `Arc<dyn PlatformFactory>` keeps the seam in one
place and makes "swap the platform in tests" a one-line change.

## What about the browser, Android, iOS?

[`platform::RuntimeKind`] reserves their tags. Their adapters are separate
embeddings built against the same contracts; this crate ships the native and
stub adapters.

# Feature Flags

- `logwise` - Routes the crate's diagnostics through the logwise logging
  framework instead of stderr

# Module Organization

- [`completion`] - Single-assignment completion futures
- [`platform`] - Factory contract, registry, and process-wide registration
- [`scheduler`] - The task-scheduling contract
- [`net`] - The socket contracts and option maps
- [`native`] - Thread-backed adapter for desktop/server processes
- [`stub`] - Deterministic in-process adapter for tests

*/
pub mod completion;
pub mod error;
mod logging;
pub mod native;
pub mod net;
pub mod platform;
pub mod scheduler;
pub mod stub;

pub use error::Error;
