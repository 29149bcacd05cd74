//! Single-assignment completion futures.
//!
//! A [`CompletionFuture`] is a write-once container for the eventual outcome
//! of one asynchronous operation: either a success value or a failure cause,
//! paired with a dispatch point for a single completion handler. The producer
//! side calls [`resolve`](CompletionFuture::resolve) or
//! [`reject`](CompletionFuture::reject) exactly once; the consumer side
//! attaches a handler with [`on_complete`](CompletionFuture::on_complete),
//! before or after completion.
//!
//! # Dispatch model
//!
//! Handler dispatch is synchronous and inline. There is no task queue and no
//! thread hop: whichever call completes the pairing (`resolve`/`reject` with a
//! handler already attached, or `on_complete` on an already-complete future)
//! invokes the handler on its own call stack, before returning. Callers may
//! rely on this ordering. Any cross-thread marshaling is the
//! [`Scheduler`](crate::scheduler::Scheduler)'s job, not this primitive's.
//!
//! # Threading
//!
//! A future is shared by cloning the handle; clones refer to the same
//! underlying slot. The handle is deliberately `!Send`: a future belongs to
//! one thread (typically the thread driving an event loop or an adapter
//! callback), and the compiler enforces that confinement. Hand results across
//! threads with a channel, then complete the future on its own thread.
//!
//! # Completion policy
//!
//! The first transition wins. Calling `resolve` or `reject` on an
//! already-complete future is silently ignored; the stored value or cause
//! never changes. Attaching a second handler while pending replaces the first
//! (which is dropped without being called); attaching after completion fires
//! the new handler immediately. A handler fires at most once.
//!
//! # Examples
//!
//! ```
//! use underlay::completion::CompletionFuture;
//!
//! let future = CompletionFuture::new();
//!
//! // Consumer attaches a handler while the operation is in flight.
//! future.on_complete(|outcome| {
//!     assert_eq!(*outcome.unwrap(), 42);
//! });
//!
//! // Producer completes it; the handler runs inside this call.
//! future.resolve(42);
//! assert!(future.is_complete());
//! assert_eq!(*future.value().unwrap(), 42);
//! ```

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::Error;

/// A completion handler.
///
/// Receives a borrowed view of the outcome: `Ok(&T)` on success, `Err(&Error)`
/// on failure. The future retains ownership of the value, so accessors like
/// [`CompletionFuture::value`] keep working after dispatch.
type Handler<T> = Box<dyn FnOnce(Result<&T, &Error>)>;

enum State<T> {
    Pending,
    Resolved(T),
    Rejected(Error),
}

struct Shared<T> {
    state: State<T>,
    handler: Option<Handler<T>>,
}

/// A write-once future with at-most-once resolution and synchronous inline
/// handler dispatch.
///
/// Cloning produces another handle to the same slot; producer and consumer
/// each hold one. See the [module documentation](self) for the dispatch and
/// completion policies.
pub struct CompletionFuture<T> {
    shared: Rc<RefCell<Shared<T>>>,
}

impl<T> Clone for CompletionFuture<T> {
    fn clone(&self) -> Self {
        CompletionFuture {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T> CompletionFuture<T> {
    /// Creates a future that has not completed yet.
    pub fn new() -> Self {
        CompletionFuture {
            shared: Rc::new(RefCell::new(Shared {
                state: State::Pending,
                handler: None,
            })),
        }
    }

    /// Creates a future that has already succeeded with `value`.
    ///
    /// A handler attached later fires immediately inside `on_complete`.
    pub fn resolved(value: T) -> Self {
        let future = CompletionFuture::new();
        future.resolve(value);
        future
    }

    /// Creates a future that has already failed with `error`.
    pub fn rejected(error: Error) -> Self {
        let future = CompletionFuture::new();
        future.reject(error);
        future
    }

    /// Transitions to the resolved state and stores `value`.
    ///
    /// If a handler is attached it is invoked synchronously, on this call
    /// stack, with a success view of the outcome. Returns `self` for
    /// chaining.
    ///
    /// If the future is already complete this call is silently ignored: the
    /// first transition wins.
    pub fn resolve(&self, value: T) -> &Self {
        {
            let mut shared = self.shared.borrow_mut();
            if !matches!(shared.state, State::Pending) {
                return self;
            }
            shared.state = State::Resolved(value);
        }
        self.dispatch();
        self
    }

    /// Transitions to the rejected state and stores `error`.
    ///
    /// Symmetric to [`resolve`](Self::resolve): fires an attached handler
    /// synchronously with a failure view, ignores the call if the future is
    /// already complete, and returns `self` for chaining.
    pub fn reject(&self, error: Error) -> &Self {
        {
            let mut shared = self.shared.borrow_mut();
            if !matches!(shared.state, State::Pending) {
                return self;
            }
            shared.state = State::Rejected(error);
        }
        self.dispatch();
        self
    }

    /// Attaches the completion handler.
    ///
    /// If the future is already complete, `handler` is invoked immediately
    /// and synchronously, before this call returns — a handler never goes
    /// undispatched for arriving "too late". Otherwise it is stored and fires
    /// inside the eventual `resolve`/`reject` call.
    ///
    /// There is one handler slot. Attaching while a handler is already stored
    /// replaces it; the replaced handler is dropped without being called.
    ///
    /// The handler must not call back into this same future to attach another
    /// handler or complete it; that is a programmer error and panics.
    pub fn on_complete<F>(&self, handler: F) -> &Self
    where
        F: FnOnce(Result<&T, &Error>) + 'static,
    {
        let pending = matches!(self.shared.borrow().state, State::Pending);
        if pending {
            self.shared.borrow_mut().handler = Some(Box::new(handler));
        } else {
            let shared = self.shared.borrow();
            match &shared.state {
                State::Resolved(value) => handler(Ok(value)),
                State::Rejected(error) => handler(Err(error)),
                State::Pending => unreachable!(),
            }
        }
        self
    }

    /// Whether the future has completed, successfully or not.
    pub fn is_complete(&self) -> bool {
        !matches!(self.shared.borrow().state, State::Pending)
    }

    /// Whether the future completed with a failure.
    pub fn is_failed(&self) -> bool {
        matches!(self.shared.borrow().state, State::Rejected(_))
    }

    /// The success value. `None` unless the future resolved.
    pub fn value(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.shared.borrow(), |shared| match &shared.state {
            State::Resolved(value) => Some(value),
            _ => None,
        })
        .ok()
    }

    /// The failure cause. `None` unless the future rejected.
    pub fn error(&self) -> Option<Ref<'_, Error>> {
        Ref::filter_map(self.shared.borrow(), |shared| match &shared.state {
            State::Rejected(error) => Some(error),
            _ => None,
        })
        .ok()
    }

    /// Fires the stored handler, if any, against the completed state.
    ///
    /// The handler slot is consumed: a handler fires at most once.
    fn dispatch(&self) {
        let handler = self.shared.borrow_mut().handler.take();
        if let Some(handler) = handler {
            let shared = self.shared.borrow();
            match &shared.state {
                State::Resolved(value) => handler(Ok(value)),
                State::Rejected(error) => handler(Err(error)),
                // dispatch only runs after a transition
                State::Pending => unreachable!(),
            }
        }
    }
}

impl<T> Default for CompletionFuture<T> {
    fn default() -> Self {
        CompletionFuture::new()
    }
}

/// Builds a pre-completed future from an outcome slot: `Ok` pre-resolves,
/// `Err` pre-rejects.
impl<T> From<Result<T, Error>> for CompletionFuture<T> {
    fn from(outcome: Result<T, Error>) -> Self {
        match outcome {
            Ok(value) => CompletionFuture::resolved(value),
            Err(error) => CompletionFuture::rejected(error),
        }
    }
}

impl<T> fmt::Debug for CompletionFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.borrow();
        let state = match &shared.state {
            State::Pending => "pending",
            State::Resolved(_) => "resolved",
            State::Rejected(_) => "rejected",
        };
        f.debug_struct("CompletionFuture")
            .field("state", &state)
            .field("handler_attached", &shared.handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn early_handler_fires_inside_resolve() {
        let future = CompletionFuture::new();
        let fired = Rc::new(Cell::new(0u32));
        let observed = fired.clone();
        future.on_complete(move |outcome| {
            assert_eq!(*outcome.unwrap(), 7);
            observed.set(observed.get() + 1);
        });
        assert_eq!(fired.get(), 0);
        future.resolve(7);
        // dispatched synchronously, before resolve returned
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn late_handler_fires_inside_on_complete() {
        let future = CompletionFuture::resolved("hello");
        let fired = Rc::new(Cell::new(0u32));
        let observed = fired.clone();
        future.on_complete(move |outcome| {
            assert_eq!(*outcome.unwrap(), "hello");
            observed.set(observed.get() + 1);
        });
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn second_resolve_is_ignored() {
        let future = CompletionFuture::new();
        future.resolve(1);
        future.resolve(2);
        assert_eq!(*future.value().unwrap(), 1);
        assert!(!future.is_failed());
    }

    #[test]
    fn reject_after_resolve_is_ignored() {
        let future = CompletionFuture::new();
        future.resolve(1);
        future.reject(Error::msg("too late"));
        assert!(future.is_complete());
        assert!(!future.is_failed());
        assert_eq!(*future.value().unwrap(), 1);
        assert!(future.error().is_none());
    }

    #[test]
    fn resolve_after_reject_is_ignored() {
        let future = CompletionFuture::new();
        future.reject(Error::msg("first"));
        future.resolve(9);
        assert!(future.is_failed());
        assert!(future.value().is_none());
        assert_eq!(future.error().unwrap().to_string(), "first");
    }

    #[test]
    fn handler_fires_at_most_once() {
        let future = CompletionFuture::new();
        let fired = Rc::new(Cell::new(0u32));
        let observed = fired.clone();
        future.on_complete(move |_| observed.set(observed.get() + 1));
        future.resolve(1);
        future.resolve(2);
        future.reject(Error::msg("ignored"));
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn failure_path_carries_cause_and_leaves_value_unset() {
        let future: CompletionFuture<u32> = CompletionFuture::new();
        let fired = Rc::new(Cell::new(false));
        let observed = fired.clone();
        future.on_complete(move |outcome| {
            let error = outcome.unwrap_err();
            assert_eq!(error.to_string(), "connect refused");
            observed.set(true);
        });
        future.reject(Error::msg("connect refused"));
        assert!(fired.get());
        assert!(future.is_failed());
        assert!(future.value().is_none());
    }

    #[test]
    fn second_handler_replaces_first_while_pending() {
        let future = CompletionFuture::new();
        let first = Rc::new(Cell::new(false));
        let second = Rc::new(Cell::new(false));
        let observed = first.clone();
        future.on_complete(move |_| observed.set(true));
        let observed = second.clone();
        future.on_complete(move |_| observed.set(true));
        future.resolve(5);
        assert!(!first.get());
        assert!(second.get());
    }

    #[test]
    fn handler_attached_after_dispatch_fires_again_immediately() {
        let future = CompletionFuture::new();
        future.on_complete(|_| {});
        future.resolve(3);
        let fired = Rc::new(Cell::new(false));
        let observed = fired.clone();
        future.on_complete(move |outcome| {
            assert_eq!(*outcome.unwrap(), 3);
            observed.set(true);
        });
        assert!(fired.get());
    }

    #[test]
    fn clones_share_the_same_slot() {
        let producer = CompletionFuture::new();
        let consumer = producer.clone();
        let fired = Rc::new(Cell::new(false));
        let observed = fired.clone();
        consumer.on_complete(move |outcome| {
            assert_eq!(*outcome.unwrap(), 11);
            observed.set(true);
        });
        producer.resolve(11);
        assert!(fired.get());
        assert!(consumer.is_complete());
    }

    #[test]
    fn pre_completed_constructors() {
        let ok = CompletionFuture::resolved(1);
        assert!(ok.is_complete());
        assert!(!ok.is_failed());

        let err: CompletionFuture<u32> = CompletionFuture::rejected(Error::ConnectionClosed);
        assert!(err.is_complete());
        assert!(err.is_failed());
    }

    #[test]
    fn from_outcome_slot() {
        let ok: CompletionFuture<u32> = Ok(4).into();
        assert_eq!(*ok.value().unwrap(), 4);

        let err: CompletionFuture<u32> = Err(Error::msg("boom")).into();
        assert!(err.is_failed());
        assert_eq!(err.error().unwrap().to_string(), "boom");
    }

    #[test]
    fn resolve_returns_self_for_chaining() {
        let future = CompletionFuture::new();
        let fired = Rc::new(Cell::new(false));
        let observed = fired.clone();
        future
            .resolve(2)
            .on_complete(move |outcome| {
                assert_eq!(*outcome.unwrap(), 2);
                observed.set(true);
            });
        assert!(fired.get());
    }
}
