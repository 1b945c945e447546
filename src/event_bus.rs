//! Pooled, type-erased publish/subscribe
//!
//! Events are constructed directly inside a [`bumpalo::Bump`] arena and queued
//! in publish order. [`EventBus::drain`] walks the live queue, re-reading its
//! length after every dispatch, so events published by handlers during the
//! drain are delivered before it returns. Once the queue is exhausted every
//! event is dropped in place and the arena is reset wholesale.
//!
//! Handlers receive an [`EventContext`] so they can publish, subscribe and
//! unsubscribe while a drain is running. The context never exposes the bus
//! itself, so a handler cannot drain, replace or drop it while the event it is
//! looking at still lives in the arena. Unsubscribing from an event type that
//! is currently being dispatched only marks the subscription; it is removed
//! once the dispatch pass over that type's subscriber list completes.

use ahash::AHashMap;
use bumpalo::Bump;
use slotmap::{new_key_type, SlotMap};
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::ptr::NonNull;
use std::rc::Rc;

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::error::Result;

/// Default arena size in bytes.
pub const DEFAULT_ARENA_BYTES: usize = 64 * 1024;

/// Anything `'static` can be published.
pub trait Event: Any {
    /// Downcast to concrete type
    fn as_any_event(&self) -> &dyn Any;

    /// Event name for debugging
    fn event_name(&self) -> &'static str;
}

impl<T: Any> Event for T {
    fn as_any_event(&self) -> &dyn Any {
        self
    }

    fn event_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

new_key_type! {
    /// Token returned by `subscribe`, used to unsubscribe.
    pub struct SubscriptionId;
}

type Handler = Box<dyn FnMut(&dyn Event, &mut EventContext<'_>) -> Result<()>>;

struct Subscription {
    event_type: TypeId,
    event_name: &'static str,
    // `None` while the handler is executing.
    handler: Option<Handler>,
    pending_removal: bool,
}

#[derive(Default)]
struct SubscriberList {
    ids: Vec<SubscriptionId>,
    dispatching: bool,
    pending_removals: Vec<SubscriptionId>,
}

struct QueuedEvent {
    type_id: TypeId,
    // Points into `EventBus::arena`. `None` once discarded.
    event: Option<NonNull<dyn Event>>,
}

/// Central event bus for pub/sub communication
pub struct EventBus {
    arena: Bump,
    queue: Vec<QueuedEvent>,
    subscriptions: SlotMap<SubscriptionId, Subscription>,
    lists: AHashMap<TypeId, SubscriberList>,
    draining: bool,
    cursor: usize,
    processed_count: u64,
    failed_count: u64,
}

impl EventBus {
    /// Create new event bus
    pub fn new() -> Self {
        Self::with_arena_capacity(DEFAULT_ARENA_BYTES)
    }

    /// Pre-size the event arena (in bytes).
    pub fn with_arena_capacity(bytes: usize) -> Self {
        Self {
            arena: Bump::with_capacity(bytes),
            queue: Vec::new(),
            subscriptions: SlotMap::with_key(),
            lists: AHashMap::new(),
            draining: false,
            cursor: 0,
            processed_count: 0,
            failed_count: 0,
        }
    }

    /// Subscribe a closure to events of type `E`.
    pub fn subscribe<E, F>(&mut self, mut handler: F) -> SubscriptionId
    where
        E: Event,
        F: FnMut(&E, &mut EventContext<'_>) -> Result<()> + 'static,
    {
        let erased: Handler = Box::new(move |event: &dyn Event, ctx: &mut EventContext<'_>| {
            match event.as_any_event().downcast_ref::<E>() {
                Some(event) => handler(event, ctx),
                None => Ok(()),
            }
        });

        let type_id = TypeId::of::<E>();
        let id = self.subscriptions.insert(Subscription {
            event_type: type_id,
            event_name: std::any::type_name::<E>(),
            handler: Some(erased),
            pending_removal: false,
        });
        self.lists.entry(type_id).or_default().ids.push(id);
        id
    }

    /// Subscribe a method of a shared instance.
    ///
    /// If the instance is already mutably borrowed when the event arrives, the
    /// delivery is skipped and logged.
    pub fn subscribe_method<C, E>(
        &mut self,
        instance: Rc<RefCell<C>>,
        method: fn(&mut C, &E, &mut EventContext<'_>) -> Result<()>,
    ) -> SubscriptionId
    where
        C: 'static,
        E: Event,
    {
        self.subscribe::<E, _>(move |event, ctx| match instance.try_borrow_mut() {
            Ok(mut target) => method(&mut target, event, ctx),
            Err(_) => {
                tracing::warn!(
                    target_type = std::any::type_name::<C>(),
                    event = std::any::type_name::<E>(),
                    "subscriber instance already borrowed, delivery skipped"
                );
                Ok(())
            }
        })
    }

    /// Remove a subscription.
    ///
    /// Returns `false` for unknown tokens or removals already pending.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(subscription) = self.subscriptions.get_mut(id) else {
            return false;
        };
        if subscription.pending_removal {
            return false;
        }
        let event_type = subscription.event_type;

        let dispatching = self
            .lists
            .get(&event_type)
            .is_some_and(|list| list.dispatching);

        if dispatching {
            subscription.pending_removal = true;
            if let Some(list) = self.lists.get_mut(&event_type) {
                list.pending_removals.push(id);
            }
        } else {
            if let Some(list) = self.lists.get_mut(&event_type) {
                list.ids.retain(|other| *other != id);
            }
            self.subscriptions.remove(id);
        }
        true
    }

    /// Publish concrete event
    pub fn publish<E: Event>(&mut self, event: E) {
        self.publish_with(move || event);
    }

    /// Construct an event in place inside the arena and enqueue it.
    pub fn publish_with<E, F>(&mut self, construct: F)
    where
        E: Event,
        F: FnOnce() -> E,
    {
        let slot: NonNull<E> = NonNull::from(self.arena.alloc_with(construct));
        let event: NonNull<dyn Event> = slot;
        self.queue.push(QueuedEvent {
            type_id: TypeId::of::<E>(),
            event: Some(event),
        });
    }

    /// Deliver every queued event, in publish order, to its subscribers.
    ///
    /// Events published by handlers are appended to the same queue and are
    /// delivered by this call. Returns the number of events processed.
    pub fn drain(&mut self) -> usize {
        debug_assert!(!self.draining, "drain re-entered");

        #[cfg(feature = "profiling")]
        let _span = info_span!("event_bus.drain", queued = self.queue.len()).entered();

        self.draining = true;
        self.cursor = 0;
        let mut deliveries = 0usize;

        while self.cursor < self.queue.len() {
            let position = self.cursor;
            self.cursor += 1;

            let QueuedEvent { type_id, event } = &self.queue[position];
            let type_id = *type_id;
            let Some(ptr) = *event else {
                tracing::debug!(position, "skipping discarded queue entry");
                continue;
            };

            // SAFETY: `ptr` was allocated in `self.arena` by `publish_with` and
            // is only dropped by `release_events` or `clear_queue`. The former
            // runs after this loop; the latter never touches entries before
            // `self.cursor`, which includes this one. Arena chunks never move,
            // so allocations made by handlers leave the pointee in place.
            // Handlers only get an `EventContext`, which cannot drain, reset,
            // replace or drop the bus that owns the arena.
            let event: &dyn Event = unsafe { ptr.as_ref() };

            if event.as_any_event().type_id() != type_id {
                tracing::warn!(position, event = event.event_name(), "queued event type tag mismatch, skipped");
                continue;
            }

            deliveries += self.dispatch(type_id, event);
        }

        let processed = self.cursor;
        self.release_events();
        self.cursor = 0;
        self.draining = false;
        self.processed_count += processed as u64;

        tracing::trace!(processed, deliveries, "event queue drained");
        processed
    }

    fn dispatch(&mut self, type_id: TypeId, event: &dyn Event) -> usize {
        let count = match self.lists.get_mut(&type_id) {
            Some(list) if !list.ids.is_empty() => {
                list.dispatching = true;
                list.ids.len()
            }
            // No subscribers: nothing to do.
            _ => return 0,
        };

        let mut delivered = 0;
        for i in 0..count {
            let Some(id) = self.lists.get(&type_id).and_then(|list| list.ids.get(i).copied()) else {
                break;
            };
            let Some(subscription) = self.subscriptions.get_mut(id) else {
                continue;
            };
            if subscription.pending_removal {
                continue;
            }
            let Some(mut handler) = subscription.handler.take() else {
                continue;
            };

            if let Err(err) = handler(event, &mut EventContext { bus: self }) {
                self.failed_count += 1;
                tracing::warn!(
                    subscription = ?id,
                    event = event.event_name(),
                    error = %err,
                    "event handler failed"
                );
            }
            delivered += 1;

            if let Some(subscription) = self.subscriptions.get_mut(id) {
                subscription.handler = Some(handler);
            }
        }

        let pending = match self.lists.get_mut(&type_id) {
            Some(list) => {
                list.dispatching = false;
                let pending = std::mem::take(&mut list.pending_removals);
                if !pending.is_empty() {
                    list.ids.retain(|id| !pending.contains(id));
                }
                pending
            }
            None => Vec::new(),
        };
        for id in pending {
            self.subscriptions.remove(id);
        }

        delivered
    }

    /// Drop every queued event and reset the arena.
    fn release_events(&mut self) {
        for entry in self.queue.drain(..) {
            if let Some(ptr) = entry.event {
                // SAFETY: each live entry owns its arena value exactly once.
                unsafe { std::ptr::drop_in_place(ptr.as_ptr()) };
            }
        }
        self.arena.reset();
    }

    /// Discard queued events without delivering them.
    ///
    /// During a drain only the not-yet-dispatched entries are discarded; their
    /// memory is reclaimed when the drain finishes.
    pub fn clear_queue(&mut self) {
        if !self.draining {
            self.release_events();
            return;
        }
        for entry in &mut self.queue[self.cursor..] {
            if let Some(ptr) = entry.event.take() {
                // SAFETY: entries past the cursor are not referenced by the
                // running dispatch.
                unsafe { std::ptr::drop_in_place(ptr.as_ptr()) };
            }
        }
    }

    /// Events waiting for delivery.
    pub fn queue_size(&self) -> usize {
        self.queue.len() - self.cursor.min(self.queue.len())
    }

    /// Get total processed events
    pub fn processed_count(&self) -> u64 {
        self.processed_count
    }

    /// Handler invocations that returned an error.
    pub fn failed_count(&self) -> u64 {
        self.failed_count
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Bytes currently held by the event arena.
    pub fn arena_bytes(&self) -> usize {
        self.arena.allocated_bytes()
    }

    /// Live subscriptions for `E`, excluding pending removals.
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.lists.get(&TypeId::of::<E>()).map_or(0, |list| {
            list.ids
                .iter()
                .filter(|id| {
                    self.subscriptions
                        .get(**id)
                        .is_some_and(|s| !s.pending_removal)
                })
                .count()
        })
    }

    /// `true` if at least one subscription for `E` exists.
    pub fn has_subscribers<E: Event>(&self) -> bool {
        self.lists
            .get(&TypeId::of::<E>())
            .is_some_and(|list| !list.ids.is_empty())
    }

    /// Get total subscriber count
    pub fn total_subscribers(&self) -> usize {
        self.subscriptions
            .values()
            .filter(|s| !s.pending_removal)
            .count()
    }

    /// Event type name a subscription listens to.
    pub fn subscription_event(&self, id: SubscriptionId) -> Option<&'static str> {
        self.subscriptions.get(id).map(|s| s.event_name)
    }

    /// Remove all subscribers
    pub fn clear_subscribers(&mut self) {
        let ids: Vec<SubscriptionId> = self.subscriptions.keys().collect();
        for id in ids {
            self.unsubscribe(id);
        }
    }
}

/// What a handler may do to the bus that is delivering to it.
///
/// Handed out by [`EventBus::drain`] for the duration of one handler call.
/// Events published here join the running drain. The bus itself stays out of
/// reach:
///
/// ```compile_fail
/// use simcore::{EventBus, EventContext};
///
/// let mut bus = EventBus::new();
/// bus.subscribe(|_: &u32, ctx: &mut EventContext<'_>| {
///     *ctx.bus = EventBus::new();
///     Ok(())
/// });
/// ```
pub struct EventContext<'a> {
    bus: &'a mut EventBus,
}

impl EventContext<'_> {
    pub fn publish<E: Event>(&mut self, event: E) {
        self.bus.publish(event);
    }

    pub fn publish_with<E, F>(&mut self, construct: F)
    where
        E: Event,
        F: FnOnce() -> E,
    {
        self.bus.publish_with(construct);
    }

    /// Subscribe a closure; it receives events published after this call.
    pub fn subscribe<E, F>(&mut self, handler: F) -> SubscriptionId
    where
        E: Event,
        F: FnMut(&E, &mut EventContext<'_>) -> Result<()> + 'static,
    {
        self.bus.subscribe(handler)
    }

    /// Remove a subscription; deferred if its event type is being dispatched.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Discard every event not yet dispatched by the running drain.
    pub fn clear_queue(&mut self) {
        self.bus.clear_queue();
    }

    pub fn queue_size(&self) -> usize {
        self.bus.queue_size()
    }

    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.bus.subscriber_count::<E>()
    }

    pub fn total_subscribers(&self) -> usize {
        self.bus.total_subscribers()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.release_events();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EcsError;
    use std::cell::Cell;

    #[derive(Debug)]
    struct Ping(u32);

    struct Pong;

    type Log = Rc<RefCell<Vec<u32>>>;

    #[test]
    fn test_publish_and_drain() {
        let mut bus = EventBus::new();
        let log: Log = Rc::default();
        let sink = log.clone();
        bus.subscribe::<Ping, _>(move |ping, _| {
            sink.borrow_mut().push(ping.0);
            Ok(())
        });

        bus.publish(Ping(1));
        bus.publish(Ping(2));
        assert_eq!(bus.queue_size(), 2);

        assert_eq!(bus.drain(), 2);
        assert_eq!(*log.borrow(), vec![1, 2]);
        assert_eq!(bus.queue_size(), 0);
        assert_eq!(bus.processed_count(), 2);
    }

    #[test]
    fn test_no_subscribers_is_noop() {
        let mut bus = EventBus::new();
        bus.publish(Pong);
        assert_eq!(bus.drain(), 1);
        assert_eq!(bus.failed_count(), 0);
    }

    #[test]
    fn test_handler_cascade_settles_in_one_drain() {
        let mut bus = EventBus::new();
        let log: Log = Rc::default();
        let sink = log.clone();
        bus.subscribe::<Ping, _>(move |ping, ctx| {
            sink.borrow_mut().push(ping.0);
            if ping.0 == 1 {
                ctx.publish(Ping(3));
            }
            Ok(())
        });

        bus.publish(Ping(1));
        bus.publish(Ping(2));
        assert_eq!(bus.drain(), 3);
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn test_unsubscribe_during_dispatch_is_deferred() {
        let mut bus = EventBus::new();
        let calls = Rc::new(Cell::new(0));
        let victim_calls = Rc::new(Cell::new(0));

        let victim_counter = victim_calls.clone();
        let victim = Rc::new(Cell::new(None));
        let victim_slot = victim.clone();

        let counter = calls.clone();
        bus.subscribe::<Ping, _>(move |_, ctx| {
            counter.set(counter.get() + 1);
            if let Some(id) = victim_slot.take() {
                assert!(ctx.unsubscribe(id));
                // Pending removals are no longer counted.
                assert_eq!(ctx.subscriber_count::<Ping>(), 1);
            }
            Ok(())
        });
        let id = bus.subscribe::<Ping, _>(move |_, _| {
            victim_counter.set(victim_counter.get() + 1);
            Ok(())
        });
        victim.set(Some(id));

        bus.publish(Ping(1));
        bus.publish(Ping(2));
        bus.drain();

        assert_eq!(calls.get(), 2);
        assert_eq!(victim_calls.get(), 0);
        assert_eq!(bus.subscriber_count::<Ping>(), 1);
        assert!(bus.subscription_event(id).is_none());
    }

    #[test]
    fn test_self_unsubscribe() {
        let mut bus = EventBus::new();
        let calls = Rc::new(Cell::new(0));
        let own_id: Rc<Cell<Option<SubscriptionId>>> = Rc::default();

        let counter = calls.clone();
        let slot = own_id.clone();
        let id = bus.subscribe::<Ping, _>(move |_, ctx| {
            counter.set(counter.get() + 1);
            if let Some(id) = slot.get() {
                ctx.unsubscribe(id);
            }
            Ok(())
        });
        own_id.set(Some(id));

        bus.publish(Ping(1));
        bus.publish(Ping(2));
        bus.drain();
        assert_eq!(calls.get(), 1);
        assert_eq!(bus.total_subscribers(), 0);
    }

    #[test]
    fn test_subscribe_during_dispatch_gets_later_events_only() {
        let mut bus = EventBus::new();
        let log: Log = Rc::default();
        let sink = log.clone();
        let added = Rc::new(Cell::new(false));

        bus.subscribe::<Ping, _>(move |_, ctx| {
            if !added.replace(true) {
                let late = sink.clone();
                ctx.subscribe::<Ping, _>(move |ping, _| {
                    late.borrow_mut().push(ping.0);
                    Ok(())
                });
            }
            Ok(())
        });

        bus.publish(Ping(1));
        bus.publish(Ping(2));
        bus.drain();
        assert_eq!(*log.borrow(), vec![2]);
    }

    #[test]
    fn test_failing_handler_does_not_stop_drain() {
        let mut bus = EventBus::new();
        let log: Log = Rc::default();
        let sink = log.clone();
        bus.subscribe::<Ping, _>(|_, _| Err(EcsError::ComponentNotFound));
        bus.subscribe::<Ping, _>(move |ping, _| {
            sink.borrow_mut().push(ping.0);
            Ok(())
        });

        bus.publish(Ping(7));
        bus.drain();
        assert_eq!(bus.failed_count(), 1);
        assert_eq!(*log.borrow(), vec![7]);
    }

    #[test]
    fn test_context_publishes_into_running_drain() {
        let mut bus = EventBus::new();
        let queued = Rc::new(Cell::new(usize::MAX));
        let seen = queued.clone();
        bus.subscribe::<Pong, _>(move |_, ctx| {
            ctx.publish(Ping(1));
            ctx.publish_with(|| Ping(2));
            seen.set(ctx.queue_size());
            Ok(())
        });

        bus.publish(Pong);
        assert_eq!(bus.drain(), 3);
        assert_eq!(queued.get(), 2);
        assert!(!bus.is_draining());
    }

    #[test]
    fn test_has_subscribers() {
        let mut bus = EventBus::new();
        assert!(!bus.has_subscribers::<Ping>());
        let id = bus.subscribe::<Ping, _>(|_, _| Ok(()));
        assert!(bus.has_subscribers::<Ping>());
        assert!(!bus.has_subscribers::<Pong>());
        bus.unsubscribe(id);
        assert!(!bus.has_subscribers::<Ping>());
    }

    #[test]
    fn test_events_are_dropped_after_drain_and_on_clear() {
        struct Tracked(Rc<Cell<u32>>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let drops = Rc::new(Cell::new(0));
        let mut bus = EventBus::new();
        bus.publish(Tracked(drops.clone()));
        bus.publish(Tracked(drops.clone()));
        bus.drain();
        assert_eq!(drops.get(), 2);

        bus.publish(Tracked(drops.clone()));
        bus.clear_queue();
        assert_eq!(drops.get(), 3);
        assert_eq!(bus.queue_size(), 0);

        bus.publish(Tracked(drops.clone()));
        drop(bus);
        assert_eq!(drops.get(), 4);
    }

    #[test]
    fn test_clear_queue_during_drain_discards_rest() {
        let mut bus = EventBus::new();
        let log: Log = Rc::default();
        let sink = log.clone();
        bus.subscribe::<Ping, _>(move |ping, ctx| {
            sink.borrow_mut().push(ping.0);
            if ping.0 == 1 {
                ctx.clear_queue();
            }
            Ok(())
        });

        bus.publish(Ping(1));
        bus.publish(Ping(2));
        bus.publish(Ping(3));
        bus.drain();
        assert_eq!(*log.borrow(), vec![1]);
    }

    #[test]
    fn test_publish_with_constructs_in_arena() {
        let mut bus = EventBus::with_arena_capacity(1024);
        let seen = Rc::new(Cell::new(0));
        let sink = seen.clone();
        bus.subscribe::<Ping, _>(move |ping, _| {
            sink.set(ping.0);
            Ok(())
        });
        bus.publish_with(|| Ping(41 + 1));
        assert!(bus.arena_bytes() > 0);
        bus.drain();
        assert_eq!(seen.get(), 42);
    }

    #[test]
    fn test_subscribe_method() {
        #[derive(Default)]
        struct Counter {
            total: u32,
        }
        impl Counter {
            fn on_ping(&mut self, ping: &Ping, _ctx: &mut EventContext<'_>) -> Result<()> {
                self.total += ping.0;
                Ok(())
            }
        }

        let counter = Rc::new(RefCell::new(Counter::default()));
        let mut bus = EventBus::new();
        let id = bus.subscribe_method(counter.clone(), Counter::on_ping);
        bus.publish(Ping(2));
        bus.publish(Ping(3));
        bus.drain();
        assert_eq!(counter.borrow().total, 5);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(Ping(10));
        bus.drain();
        assert_eq!(counter.borrow().total, 5);
    }
}
