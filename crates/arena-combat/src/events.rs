//! Combat event stream.
//!
//! Controllers publish into a bounded crossbeam channel; the simulation loop
//! drains it once per tick and fans events out to typed subscribers.

use arena_common::{ActorId, BuffId, SpecialId};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, warn};

use crate::damage::{HitImpact, HitPayload};
use crate::error::HandlerError;
use crate::state::{AttackOrigin, ControllerState};

/// Event types emitted by the combat core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CombatEvent {
    /// Controller state changed
    StateChange {
        /// Actor ID
        actor: ActorId,
        /// New state
        state: ControllerState,
        /// Previous state
        previous: ControllerState,
    },
    /// Attack started
    AttackStart {
        /// Actor ID
        actor: ActorId,
        /// What started the attack
        kind: AttackOrigin,
        /// Total duration (seconds)
        duration: f32,
    },
    /// Attack finished or was cut short
    AttackEnd {
        /// Actor ID
        actor: ActorId,
        /// What started the attack
        kind: AttackOrigin,
        /// Whether it ended early
        interrupted: bool,
    },
    /// Attack connected with a target
    Hit {
        /// Attacking actor
        attacker: ActorId,
        /// Target actor
        target: ActorId,
        /// Damage payload sent to the target
        payload: HitPayload,
    },
    /// Hit was resolved by the defender
    HitResolved {
        /// Attacking actor
        attacker: ActorId,
        /// Target actor
        target: ActorId,
        /// Outcome
        impact: HitImpact,
    },
    /// Block raised
    BlockStart {
        /// Actor ID
        actor: ActorId,
    },
    /// Block absorbed a hit
    BlockImpact {
        /// Actor ID
        actor: ActorId,
        /// Whether it was a parry
        parry: bool,
    },
    /// Guard gauge broke
    GuardBreak {
        /// Actor ID
        actor: ActorId,
        /// Attacker that broke the guard
        attacker: ActorId,
    },
    /// Dodge started
    DodgeStart {
        /// Actor ID
        actor: ActorId,
    },
    /// Special move started
    SpecialStart {
        /// Actor ID
        actor: ActorId,
        /// Special ID
        id: SpecialId,
    },
    /// Special buff applied
    SpecialBuffStart {
        /// Actor ID
        actor: ActorId,
        /// Special that granted the buff
        id: SpecialId,
        /// Buff ID
        buff: BuffId,
        /// Buff lifetime (seconds)
        duration: f32,
    },
    /// Special buff expired
    SpecialBuffEnd {
        /// Actor ID
        actor: ActorId,
        /// Buff ID
        buff: BuffId,
    },
    /// Special came off cooldown
    SpecialReady {
        /// Actor ID
        actor: ActorId,
        /// Special ID
        id: SpecialId,
    },
    /// Stun began
    StunStart {
        /// Actor ID
        actor: ActorId,
        /// Stun duration (seconds)
        duration: f32,
    },
    /// Stun ended
    StunEnd {
        /// Actor ID
        actor: ActorId,
    },
    /// Actor died
    Death {
        /// Actor ID
        actor: ActorId,
    },
}

/// Discriminant of a [`CombatEvent`], used for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CombatEventKind {
    /// See [`CombatEvent::StateChange`].
    StateChange,
    /// See [`CombatEvent::AttackStart`].
    AttackStart,
    /// See [`CombatEvent::AttackEnd`].
    AttackEnd,
    /// See [`CombatEvent::Hit`].
    Hit,
    /// See [`CombatEvent::HitResolved`].
    HitResolved,
    /// See [`CombatEvent::BlockStart`].
    BlockStart,
    /// See [`CombatEvent::BlockImpact`].
    BlockImpact,
    /// See [`CombatEvent::GuardBreak`].
    GuardBreak,
    /// See [`CombatEvent::DodgeStart`].
    DodgeStart,
    /// See [`CombatEvent::SpecialStart`].
    SpecialStart,
    /// See [`CombatEvent::SpecialBuffStart`].
    SpecialBuffStart,
    /// See [`CombatEvent::SpecialBuffEnd`].
    SpecialBuffEnd,
    /// See [`CombatEvent::SpecialReady`].
    SpecialReady,
    /// See [`CombatEvent::StunStart`].
    StunStart,
    /// See [`CombatEvent::StunEnd`].
    StunEnd,
    /// See [`CombatEvent::Death`].
    Death,
}

impl CombatEvent {
    /// Returns the event's kind.
    #[must_use]
    pub fn kind(&self) -> CombatEventKind {
        match self {
            Self::StateChange { .. } => CombatEventKind::StateChange,
            Self::AttackStart { .. } => CombatEventKind::AttackStart,
            Self::AttackEnd { .. } => CombatEventKind::AttackEnd,
            Self::Hit { .. } => CombatEventKind::Hit,
            Self::HitResolved { .. } => CombatEventKind::HitResolved,
            Self::BlockStart { .. } => CombatEventKind::BlockStart,
            Self::BlockImpact { .. } => CombatEventKind::BlockImpact,
            Self::GuardBreak { .. } => CombatEventKind::GuardBreak,
            Self::DodgeStart { .. } => CombatEventKind::DodgeStart,
            Self::SpecialStart { .. } => CombatEventKind::SpecialStart,
            Self::SpecialBuffStart { .. } => CombatEventKind::SpecialBuffStart,
            Self::SpecialBuffEnd { .. } => CombatEventKind::SpecialBuffEnd,
            Self::SpecialReady { .. } => CombatEventKind::SpecialReady,
            Self::StunStart { .. } => CombatEventKind::StunStart,
            Self::StunEnd { .. } => CombatEventKind::StunEnd,
            Self::Death { .. } => CombatEventKind::Death,
        }
    }

    /// The actor that emitted the event.
    #[must_use]
    pub fn actor(&self) -> ActorId {
        match self {
            Self::Hit { attacker, .. } | Self::HitResolved { attacker, .. } => *attacker,
            Self::StateChange { actor, .. }
            | Self::AttackStart { actor, .. }
            | Self::AttackEnd { actor, .. }
            | Self::BlockStart { actor }
            | Self::BlockImpact { actor, .. }
            | Self::GuardBreak { actor, .. }
            | Self::DodgeStart { actor }
            | Self::SpecialStart { actor, .. }
            | Self::SpecialBuffStart { actor, .. }
            | Self::SpecialBuffEnd { actor, .. }
            | Self::SpecialReady { actor, .. }
            | Self::StunStart { actor, .. }
            | Self::StunEnd { actor }
            | Self::Death { actor } => *actor,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Bounded channel collecting combat events until they are dispatched.
#[derive(Debug)]
pub struct EventBus {
    /// Sender for publishing events
    sender: Sender<CombatEvent>,
    /// Receiver for collecting events
    receiver: Receiver<CombatEvent>,
    /// Channel capacity
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    /// Creates a new event bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Publishes an event. Dropped if the bus is full.
    pub fn publish(&self, event: CombatEvent) {
        if self.sender.try_send(event).is_err() {
            debug!("Combat event bus full, dropping event");
        }
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<CombatEvent> {
        self.receiver.try_iter().collect()
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns the channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a publishing handle for a controller.
    #[must_use]
    pub fn sink(&self) -> EventSink {
        EventSink {
            sender: Some(self.sender.clone()),
        }
    }
}

/// Publishing handle held by controllers.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<Sender<CombatEvent>>,
}

impl EventSink {
    /// A sink that discards every event.
    #[must_use]
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Publishes an event. Dropped if the bus is full or missing.
    pub fn emit(&self, event: CombatEvent) {
        if let Some(sender) = &self.sender {
            if sender.try_send(event).is_err() {
                debug!("Combat event bus full, dropping event");
            }
        }
    }
}

// ============================================================================
// Subscribers
// ============================================================================

/// Typed event handler trait.
pub trait EventHandler: Send + Sync {
    /// Handles an event.
    fn handle(&self, event: &CombatEvent) -> Result<(), HandlerError>;
}

impl<F> EventHandler for F
where
    F: Fn(&CombatEvent) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, event: &CombatEvent) -> Result<(), HandlerError> {
        self(event)
    }
}

/// Fans events out to subscribers, isolating failures.
#[derive(Default)]
pub struct EventDispatcher {
    by_kind: HashMap<CombatEventKind, Vec<Box<dyn EventHandler>>>,
    all: Vec<Box<dyn EventHandler>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("kinds", &self.by_kind.len())
            .field("all", &self.all.len())
            .finish()
    }
}

impl EventDispatcher {
    /// Creates a dispatcher with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a handler to one event kind.
    pub fn subscribe(&mut self, kind: CombatEventKind, handler: impl EventHandler + 'static) {
        self.by_kind.entry(kind).or_default().push(Box::new(handler));
    }

    /// Subscribes a handler to every event.
    pub fn subscribe_all(&mut self, handler: impl EventHandler + 'static) {
        self.all.push(Box::new(handler));
    }

    /// Number of handlers that would receive `kind`.
    #[must_use]
    pub fn subscriber_count(&self, kind: CombatEventKind) -> usize {
        self.by_kind.get(&kind).map_or(0, Vec::len) + self.all.len()
    }

    /// Delivers one event. Returns how many handlers failed.
    pub fn dispatch(&self, event: &CombatEvent) -> usize {
        let specific = self.by_kind.get(&event.kind()).into_iter().flatten();
        specific
            .chain(self.all.iter())
            .filter(|handler| !Self::invoke(handler.as_ref(), event))
            .count()
    }

    /// Delivers events in order. Returns how many handler calls failed.
    pub fn dispatch_all<'a>(&self, events: impl IntoIterator<Item = &'a CombatEvent>) -> usize {
        events.into_iter().map(|event| self.dispatch(event)).sum()
    }

    fn invoke(handler: &dyn EventHandler, event: &CombatEvent) -> bool {
        match catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Combat event handler failed on {:?}: {e}", event.kind());
                false
            },
            Err(_) => {
                error!("Combat event handler panicked on {:?}", event.kind());
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn death(raw: u32) -> CombatEvent {
        CombatEvent::Death {
            actor: ActorId::from_raw(raw),
        }
    }

    #[test]
    fn test_bus_publish_drain() {
        let bus = EventBus::new(4);
        bus.publish(death(1));
        bus.sink().emit(death(2));
        assert_eq!(bus.pending_count(), 2);

        let events = bus.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].actor().raw(), 2);
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_bus_drops_when_full() {
        let bus = EventBus::new(1);
        bus.publish(death(1));
        bus.publish(death(2));
        assert_eq!(bus.drain().len(), 1);
    }

    #[test]
    fn test_disconnected_sink() {
        EventSink::disconnected().emit(death(1));
    }

    #[test]
    fn test_dispatch_by_kind() {
        let deaths = Arc::new(AtomicUsize::new(0));
        let all = Arc::new(AtomicUsize::new(0));

        let mut dispatcher = EventDispatcher::new();
        let counter = Arc::clone(&deaths);
        dispatcher.subscribe(CombatEventKind::Death, move |_: &CombatEvent| -> Result<(), HandlerError> {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });
        let counter = Arc::clone(&all);
        dispatcher.subscribe_all(move |_: &CombatEvent| -> Result<(), HandlerError> {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });

        let events = [
            death(1),
            CombatEvent::StunEnd {
                actor: ActorId::from_raw(1),
            },
        ];
        assert_eq!(dispatcher.dispatch_all(&events), 0);
        assert_eq!(deaths.load(Ordering::Relaxed), 1);
        assert_eq!(all.load(Ordering::Relaxed), 2);
        assert_eq!(dispatcher.subscriber_count(CombatEventKind::Death), 2);
    }

    #[test]
    fn test_failing_handlers_are_isolated() {
        let delivered = Arc::new(AtomicUsize::new(0));

        let mut dispatcher = EventDispatcher::new();
        dispatcher.subscribe(CombatEventKind::Death, |_: &CombatEvent| -> Result<(), HandlerError> {
            Err(HandlerError::Failed("boom".to_string()))
        });
        dispatcher.subscribe(CombatEventKind::Death, |_: &CombatEvent| -> Result<(), HandlerError> {
            panic!("subscriber bug")
        });
        let counter = Arc::clone(&delivered);
        dispatcher.subscribe(CombatEventKind::Death, move |_: &CombatEvent| -> Result<(), HandlerError> {
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        });

        assert_eq!(dispatcher.dispatch(&death(1)), 2);
        assert_eq!(delivered.load(Ordering::Relaxed), 1);
    }
}
