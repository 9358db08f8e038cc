use murmur_types::{EventKind, SyncEvent};
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use crate::logging::LogConfig;

type Handler = Rc<dyn Fn(&SyncEvent) -> anyhow::Result<()>>;

struct Entry {
    id: u64,
    kind: EventKind,
    active: Rc<Cell<bool>>,
    handler: Handler,
}

struct BusInner {
    next_id: Cell<u64>,
    subscribers: RefCell<Vec<Entry>>,
    log: LogConfig,
}

/// In-process publish/subscribe channel for confirmed entity changes.
///
/// Dispatch is synchronous and follows registration order. A handler that
/// returns an error or panics is logged and skipped; the remaining
/// subscribers still receive the event.
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<BusInner>,
}

/// Outcome of one [`EventBus::publish`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

impl EventBus {
    pub fn new(log: LogConfig) -> Self {
        Self {
            inner: Rc::new(BusInner {
                next_id: Cell::new(0),
                subscribers: RefCell::new(Vec::new()),
                log,
            }),
        }
    }

    /// Register `handler` for events of `kind`.
    ///
    /// The handler stays registered until the returned [`Subscription`] is
    /// dropped or explicitly unsubscribed.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&SyncEvent) -> anyhow::Result<()> + 'static,
    {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        let active = Rc::new(Cell::new(true));

        self.inner.subscribers.borrow_mut().push(Entry {
            id,
            kind,
            active: Rc::clone(&active),
            handler: Rc::new(handler),
        });
        log_event!(self.inner.log, "subscribe #{} to {}", id, kind);

        Subscription {
            id,
            kind,
            active,
            bus: Rc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to every current subscriber of its kind
    pub fn publish(&self, event: &SyncEvent) -> DispatchReport {
        let kind = event.kind();
        // Snapshot so handlers may (un)subscribe while we dispatch
        let targets: Vec<(u64, Rc<Cell<bool>>, Handler)> = self
            .inner
            .subscribers
            .borrow()
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| (entry.id, Rc::clone(&entry.active), Rc::clone(&entry.handler)))
            .collect();

        log_event!(
            self.inner.log,
            "publish {} for {} to {} subscriber(s)",
            kind,
            event.entity_id(),
            targets.len()
        );

        let mut report = DispatchReport::default();
        for (id, active, handler) in targets {
            if !active.get() {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    log::error!("subscriber #{} failed handling {}: {:#}", id, kind, err);
                    report.failed += 1;
                }
                Err(_) => {
                    log::error!("subscriber #{} panicked handling {}", id, kind);
                    report.failed += 1;
                }
            }
        }
        report
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .subscribers
            .borrow()
            .iter()
            .filter(|entry| entry.kind == kind)
            .count()
    }
}

/// Handle returned by [`EventBus::subscribe`]; unsubscribes on drop
pub struct Subscription {
    id: u64,
    kind: EventKind,
    active: Rc<Cell<bool>>,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.active.set(false);
        if let Some(inner) = self.bus.upgrade() {
            inner
                .subscribers
                .borrow_mut()
                .retain(|entry| entry.id != self.id);
            log_event!(inner.log, "unsubscribe #{} from {}", self.id, self.kind);
        }
    }
}
