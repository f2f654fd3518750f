//! Single-threaded change notification.
//!
//! A [`Signal`] holds a list of handlers. [`Signal::connect`] returns a
//! [`Connection`] that removes the handler again when dropped, so a widget
//! that stores its connection is unsubscribed as soon as it goes away.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Handler<T> = Rc<dyn Fn(&T)>;

struct Slots<T> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
}

/// A list of listeners notified with a `&T` on every [`emit`](Signal::emit).
pub struct Signal<T> {
    slots: Rc<RefCell<Slots<T>>>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self {
            slots: Rc::new(RefCell::new(Slots {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }
}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

impl<T: 'static> Signal<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler`. It stays registered until the returned
    /// [`Connection`] is dropped.
    #[must_use = "dropping the connection disconnects the handler"]
    pub fn connect<F>(&self, handler: F) -> Connection
    where
        F: Fn(&T) + 'static,
    {
        let id = {
            let mut slots = self.slots.borrow_mut();
            let id = slots.next_id;
            slots.next_id += 1;
            slots.handlers.push((id, Rc::new(handler)));
            id
        };

        let slots: Weak<RefCell<Slots<T>>> = Rc::downgrade(&self.slots);
        Connection {
            disconnect: Some(Box::new(move || {
                if let Some(slots) = slots.upgrade() {
                    slots.borrow_mut().handlers.retain(|(slot, _)| *slot != id);
                }
            })),
        }
    }

    /// Notify every handler registered at the time of the call.
    pub fn emit(&self, value: &T) {
        // Snapshot first: handlers may connect or disconnect while running.
        let handlers: Vec<Handler<T>> = self
            .slots
            .borrow()
            .handlers
            .iter()
            .map(|(_, handler)| Rc::clone(handler))
            .collect();

        for handler in handlers {
            handler(value);
        }
    }
}

impl<T> Signal<T> {
    pub fn handler_count(&self) -> usize {
        self.slots.borrow().handlers.len()
    }
}

/// Subscription token returned by [`Signal::connect`].
pub struct Connection {
    disconnect: Option<Box<dyn FnOnce()>>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(disconnect) = self.disconnect.take() {
            disconnect();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.disconnect.is_some())
            .finish()
    }
}
