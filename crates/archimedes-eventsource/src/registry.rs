//! Handler registry.
//!
//! Handlers are stored per event name in registration order. A [`Handler`] is
//! identified by the allocation it points to, so clones of one handler are
//! the same handler for [`HandlerRegistry::unregister`], while two handlers
//! built from identical closures are not.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::TransportError;
use crate::message::SseMessage;
use crate::state::EventState;

/// A shared callback with pointer identity.
pub struct Handler<F: ?Sized>(Arc<F>);

/// Handler for named events.
pub type MessageHandler = Handler<dyn Fn(&SseMessage) + Send + Sync>;

/// Handler for open notifications.
pub type StateHandler = Handler<dyn Fn(EventState) + Send + Sync>;

/// Handler for transport errors.
pub type ErrorHandler = Handler<dyn Fn(&TransportError) + Send + Sync>;

impl<F: ?Sized> Handler<F> {
    /// Check whether two handlers are the same registration target.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<F: ?Sized> Clone for Handler<F> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<F: ?Sized> fmt::Debug for Handler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

impl Handler<dyn Fn(&SseMessage) + Send + Sync> {
    /// Wrap a message callback.
    pub fn new(f: impl Fn(&SseMessage) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    fn call(&self, message: &SseMessage) {
        (self.0)(message);
    }
}

impl Handler<dyn Fn(EventState) + Send + Sync> {
    /// Wrap a state callback.
    pub fn new(f: impl Fn(EventState) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    fn call(&self, state: EventState) {
        (self.0)(state);
    }
}

impl Handler<dyn Fn(&TransportError) + Send + Sync> {
    /// Wrap an error callback.
    pub fn new(f: impl Fn(&TransportError) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    fn call(&self, error: &TransportError) {
        (self.0)(error);
    }
}

/// Ordered list of handlers for one channel.
pub struct HandlerList<F: ?Sized> {
    handlers: Vec<Handler<F>>,
}

impl<F: ?Sized> HandlerList<F> {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Append a handler.
    pub fn push(&mut self, handler: Handler<F>) {
        self.handlers.push(handler);
    }

    /// Remove the first occurrence of `handler`. Returns whether one was found.
    pub fn remove(&mut self, handler: &Handler<F>) -> bool {
        match self.handlers.iter().position(|h| h.ptr_eq(handler)) {
            Some(index) => {
                self.handlers.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Iterate in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Handler<F>> {
        self.handlers.iter()
    }

    /// Run `call` on each handler in order, checking `stop` after each one.
    fn call_until(
        &self,
        mut call: impl FnMut(&Handler<F>),
        mut stop: impl FnMut() -> bool,
    ) -> usize {
        let mut ran = 0;
        for handler in &self.handlers {
            call(handler);
            ran += 1;
            if stop() {
                break;
            }
        }
        ran
    }
}

impl<F: ?Sized> Default for HandlerList<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> fmt::Debug for HandlerList<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerList")
            .field("len", &self.handlers.len())
            .finish()
    }
}

/// Registry of named-event, open, and error handlers.
///
/// Dispatch runs handlers synchronously in registration order and does not
/// catch panics. The registry is only read during dispatch, so a panicking
/// handler leaves it intact. The `*_until` variants stop early once their
/// predicate reports true after a handler returns.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    named: HashMap<String, HandlerList<dyn Fn(&SseMessage) + Send + Sync>>,
    open: HandlerList<dyn Fn(EventState) + Send + Sync>,
    error: HandlerList<dyn Fn(&TransportError) + Send + Sync>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the list for `event_name`.
    pub fn register(&mut self, event_name: impl Into<String>, handler: MessageHandler) {
        self.named.entry(event_name.into()).or_default().push(handler);
    }

    /// Remove the first occurrence of `handler` for `event_name`.
    pub fn unregister(&mut self, event_name: &str, handler: &MessageHandler) -> bool {
        let Some(list) = self.named.get_mut(event_name) else {
            return false;
        };
        let removed = list.remove(handler);
        if list.is_empty() {
            self.named.remove(event_name);
        }
        removed
    }

    /// Invoke every handler for `event_name`. Returns how many ran.
    pub fn dispatch(&self, event_name: &str, message: &SseMessage) -> usize {
        self.dispatch_until(event_name, message, || false)
    }

    /// Invoke handlers for `event_name` until `stop` returns true.
    pub fn dispatch_until(
        &self,
        event_name: &str,
        message: &SseMessage,
        stop: impl FnMut() -> bool,
    ) -> usize {
        self.named
            .get(event_name)
            .map_or(0, |list| list.call_until(|h| h.call(message), stop))
    }

    /// Append an open handler.
    pub fn register_open(&mut self, handler: StateHandler) {
        self.open.push(handler);
    }

    /// Invoke every open handler with `state`.
    pub fn dispatch_open(&self, state: EventState) -> usize {
        self.dispatch_open_until(state, || false)
    }

    /// Invoke open handlers until `stop` returns true.
    pub fn dispatch_open_until(&self, state: EventState, stop: impl FnMut() -> bool) -> usize {
        self.open.call_until(|h| h.call(state), stop)
    }

    /// Append an error handler.
    pub fn register_error(&mut self, handler: ErrorHandler) {
        self.error.push(handler);
    }

    /// Invoke every error handler with `error`.
    pub fn dispatch_error(&self, error: &TransportError) -> usize {
        self.dispatch_error_until(error, || false)
    }

    /// Invoke error handlers until `stop` returns true.
    pub fn dispatch_error_until(
        &self,
        error: &TransportError,
        stop: impl FnMut() -> bool,
    ) -> usize {
        self.error.call_until(|h| h.call(error), stop)
    }

    /// Number of handlers registered for `event_name`.
    pub fn handler_count(&self, event_name: &str) -> usize {
        self.named.get(event_name).map_or(0, HandlerList::len)
    }

    /// Check if no handler of any kind is registered.
    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.open.is_empty() && self.error.is_empty()
    }
}
