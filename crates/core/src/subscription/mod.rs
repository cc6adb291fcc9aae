//! Ordered subscriber registry shared by the [`Ticker`](crate::Ticker) and the
//! [`ControlBus`](crate::ControlBus).
//!
//! Subscribers are invoked in registration order. Each invocation is isolated:
//! an `Err` or a panic from one callback is logged and counted, and the
//! remaining callbacks still run.

use std::{
    any::Any,
    cell::Cell,
    fmt,
    panic::{self, AssertUnwindSafe},
    rc::Rc,
};

use crate::{HyperviewError, Result};

pub(crate) type Callback<A> = Box<dyn FnMut(&A) -> Result<()>>;

/// Identifies one registration. Dropping the handle does not unsubscribe.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: u64,
    active: Rc<Cell<bool>>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Marks the subscription for removal. A dispatch already in progress
    /// still reaches it; later dispatches do not.
    pub fn cancel(&self) {
        self.active.set(false);
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

/// Outcome of delivering one notification to every subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Subscribers that returned `Ok`.
    pub delivered: usize,
    /// Subscribers that returned an error or panicked.
    pub faulted: usize,
}

impl DispatchReport {
    pub fn invoked(&self) -> usize {
        self.delivered + self.faulted
    }
}

struct Entry<A> {
    id: u64,
    active: Rc<Cell<bool>>,
    callback: Callback<A>,
}

pub(crate) struct Subscriptions<A> {
    next_id: u64,
    entries: Vec<Entry<A>>,
}

impl<A> Default for Subscriptions<A> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

impl<A> Subscriptions<A> {
    pub(crate) fn insert(&mut self, callback: Callback<A>) -> SubscriptionHandle {
        let id = self.next_id;
        self.next_id += 1;
        let active = Rc::new(Cell::new(true));
        self.entries.push(Entry {
            id,
            active: Rc::clone(&active),
            callback,
        });
        SubscriptionHandle { id, active }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.active.get()).count()
    }

    /// Invokes every subscriber that was active when the dispatch began.
    pub(crate) fn dispatch(&mut self, channel: &str, arg: &A) -> DispatchReport {
        self.prune();
        let mut report = DispatchReport::default();

        for entry in &mut self.entries {
            let label = format!("{channel}#{}", entry.id);
            match isolate(&label, || (entry.callback)(arg)) {
                Ok(()) => report.delivered += 1,
                Err(fault) => {
                    report.faulted += 1;
                    tracing::warn!(channel, subscriber = entry.id, error = %fault, "subscriber faulted");
                }
            }
        }

        self.prune();
        report
    }

    fn prune(&mut self) {
        self.entries.retain(|entry| entry.active.get());
    }
}

impl<A> fmt::Debug for Subscriptions<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriptions")
            .field("next_id", &self.next_id)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Runs `f`, turning a panic into [`HyperviewError::SubscriberFault`].
pub(crate) fn isolate<T>(label: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(HyperviewError::SubscriberFault {
            subscriber: label.to_string(),
            reason: panic_message(payload.as_ref()),
        })
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
