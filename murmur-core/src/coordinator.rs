use chrono::{DateTime, Utc};
use murmur_types::{EntityId, EntitySnapshot, MutationKind, SyncEvent};
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::rc::{Rc, Weak};

use crate::api::ApiResult;
use crate::bus::EventBus;
use crate::error::MutationError;
use crate::logging::LogConfig;

/// Where the displayed snapshot of an entity lives.
///
/// Reads return `None` once the owning view is gone, which is how late
/// settlements become invisible to unmounted views.
pub trait SnapshotSlot {
    fn entity_id(&self) -> EntityId;
    fn read(&self) -> Option<EntitySnapshot>;
    /// Replace the displayed snapshot; a no-op if the view is gone
    fn write(&self, snapshot: EntitySnapshot);
}

/// Slot backed by a standalone view's snapshot cell
#[derive(Debug, Clone)]
pub struct EntitySlot {
    id: EntityId,
    cell: Weak<RefCell<EntitySnapshot>>,
}

impl EntitySlot {
    pub fn new(cell: &Rc<RefCell<EntitySnapshot>>) -> Self {
        Self {
            id: cell.borrow().id,
            cell: Rc::downgrade(cell),
        }
    }
}

impl SnapshotSlot for EntitySlot {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn read(&self) -> Option<EntitySnapshot> {
        self.cell.upgrade().map(|cell| cell.borrow().clone())
    }

    fn write(&self, snapshot: EntitySnapshot) {
        if let Some(cell) = self.cell.upgrade() {
            *cell.borrow_mut() = snapshot;
        }
    }
}

/// Record of a speculative change awaiting settlement
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    pub entity_id: EntityId,
    pub kind: MutationKind,
    pub previous_snapshot: EntitySnapshot,
    pub started_at: DateTime<Utc>,
}

type PendingMap = HashMap<(EntityId, MutationKind), PendingMutation>;

/// Apply / confirm / rollback protocol shared by every mutating action.
///
/// At most one mutation per `(entity, kind)` is in flight; a second attempt
/// is rejected before anything is applied or sent.
#[derive(Clone)]
pub struct MutationCoordinator {
    pending: Rc<RefCell<PendingMap>>,
    bus: EventBus,
    log: LogConfig,
}

impl MutationCoordinator {
    pub fn new(bus: EventBus, log: LogConfig) -> Self {
        Self {
            pending: Rc::new(RefCell::new(HashMap::new())),
            bus,
            log,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn pending(&self, entity_id: EntityId, kind: MutationKind) -> Option<PendingMutation> {
        self.pending.borrow().get(&(entity_id, kind)).cloned()
    }

    pub fn is_in_flight(&self, entity_id: EntityId, kind: MutationKind) -> bool {
        self.pending.borrow().contains_key(&(entity_id, kind))
    }

    pub fn in_flight_count(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Guard, then apply `speculate` to the slot's current snapshot.
    ///
    /// If `speculate` fails nothing is written and no mutation is recorded.
    pub fn begin<S, F>(
        &self,
        slot: S,
        kind: MutationKind,
        speculate: F,
    ) -> Result<InFlight<S>, MutationError>
    where
        S: SnapshotSlot,
        F: FnOnce(&mut EntitySnapshot) -> Result<(), MutationError>,
    {
        let entity_id = slot.entity_id();
        if self.is_in_flight(entity_id, kind) {
            log_mutation!(self.log, "reject {} on {}: already in flight", kind, entity_id);
            return Err(MutationError::InFlight { entity_id, kind });
        }

        let current = slot.read().ok_or(MutationError::Detached(entity_id))?;
        let mut speculative = current.clone();
        speculate(&mut speculative)?;
        slot.write(speculative);

        self.pending.borrow_mut().insert(
            (entity_id, kind),
            PendingMutation {
                entity_id,
                kind,
                previous_snapshot: current.clone(),
                started_at: Utc::now(),
            },
        );
        log_mutation!(self.log, "apply {} on {}", kind, entity_id);

        Ok(InFlight {
            entity_id,
            kind,
            slot,
            previous: current,
            pending: Rc::clone(&self.pending),
            bus: self.bus.clone(),
            log: self.log.clone(),
            settled: false,
        })
    }

    /// Full protocol: apply, await `remote`, then confirm or roll back.
    ///
    /// `remote` is not polled unless the mutation was admitted, so a
    /// rejected attempt never reaches the network.
    pub async fn perform<S, F, T, Fut, A>(
        &self,
        slot: S,
        kind: MutationKind,
        speculate: F,
        remote: Fut,
        authoritative: A,
    ) -> Result<EntitySnapshot, MutationError>
    where
        S: SnapshotSlot,
        F: FnOnce(&mut EntitySnapshot) -> Result<(), MutationError>,
        Fut: Future<Output = ApiResult<T>>,
        A: FnOnce(EntityId, T) -> SyncEvent,
    {
        let in_flight = self.begin(slot, kind, speculate)?;
        match remote.await {
            Ok(response) => {
                let event = authoritative(in_flight.entity_id(), response);
                Ok(in_flight.confirm(event))
            }
            Err(err) => Err(in_flight.rollback(err.into())),
        }
    }
}

/// A mutation between speculative apply and settlement.
///
/// Dropping it unsettled (e.g. the awaiting future was dropped) rolls the
/// slot back and clears the pending entry.
pub struct InFlight<S: SnapshotSlot> {
    entity_id: EntityId,
    kind: MutationKind,
    slot: S,
    previous: EntitySnapshot,
    pending: Rc<RefCell<PendingMap>>,
    bus: EventBus,
    log: LogConfig,
    settled: bool,
}

impl<S: SnapshotSlot> InFlight<S> {
    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn previous(&self) -> &EntitySnapshot {
        &self.previous
    }

    /// Replace speculative values with the authoritative ones and broadcast
    pub fn confirm(mut self, event: SyncEvent) -> EntitySnapshot {
        self.settled = true;
        let confirmed = match self.slot.read() {
            Some(mut current) => {
                current.apply(&event);
                self.slot.write(current.clone());
                current
            }
            None => {
                let mut detached = self.previous.clone();
                detached.apply(&event);
                detached
            }
        };
        self.release();
        log_mutation!(self.log, "confirm {} on {}", self.kind, self.entity_id);
        self.bus.publish(&event);
        confirmed
    }

    /// Restore the pre-mutation values in the originating view only
    pub fn rollback(mut self, err: MutationError) -> MutationError {
        self.settled = true;
        self.restore();
        self.release();
        log::warn!(
            "rolled back {} on {}: {}",
            self.kind,
            self.entity_id,
            err
        );
        err
    }

    fn restore(&self) {
        if let Some(mut current) = self.slot.read() {
            current.restore_from(&self.previous, self.kind);
            self.slot.write(current);
        }
    }

    fn release(&self) {
        self.pending
            .borrow_mut()
            .remove(&(self.entity_id, self.kind));
    }
}

impl<S: SnapshotSlot> Drop for InFlight<S> {
    fn drop(&mut self) {
        if !self.settled {
            self.restore();
            log::warn!(
                "{} on {} abandoned before settlement",
                self.kind,
                self.entity_id
            );
        }
        self.release();
    }
}
