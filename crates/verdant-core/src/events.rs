//! Notifications and the synchronous subscriber bus.
//!
//! Every notification is published at the point of change, after the state
//! mutation, exactly once per transition. There is no queue: subscribers run
//! inline on the caller's stack.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::warn;
use serde::{Deserialize, Serialize};
use verdant_logic::ids::{SensorId, SystemId};
use verdant_logic::sensing::{Alert, SensorReading};

/// An actuation channel, named by what it physically does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Heating,
    Cooling,
    Humidify,
    Dehumidify,
    Exhaust,
    Enrichment,
    Watering,
    Dosing,
    Lamps,
}

/// Consumable supplies a subsystem can run out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resource {
    Water,
    Nutrients,
}

/// Why a watering run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEnd {
    Completed,
    Stopped,
    Exhausted,
    /// Schedule window closed or moisture back in band.
    Satisfied,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    Started,
    Stopped,
    AutomationChanged { automated: bool },
    ChannelToggled { channel: Channel, on: bool },
    ScheduleEntered { parameter: f32 },
    ScheduleLeft,
    RunStarted { duration_secs: Option<f32> },
    RunFinished { delivered_litres: f32, end: RunEnd },
    Refilled { resource: Resource },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    StateChanged {
        system: SystemId,
        change: StateChange,
    },
    ReadingChanged {
        sensor: SensorId,
        reading: SensorReading,
    },
    AlertRaised(Alert),
    AlertCleared(Alert),
    ConnectivityChanged {
        sensor: SensorId,
        online: bool,
    },
    ResourceExhausted {
        system: SystemId,
        resource: Resource,
    },
    ResourceLow {
        system: SystemId,
        resource: Resource,
        /// Remaining fraction of capacity.
        level: f32,
    },
    /// Pulses completed in one tick; `pulse` numbers the last of them.
    IrrigationPulse {
        system: SystemId,
        pulse: u32,
        count: u32,
        litres: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&Notification)>;

#[derive(Default)]
struct BusShared {
    next_id: Cell<u64>,
    subscribers: RefCell<Vec<(SubscriptionId, Subscriber)>>,
    // Edits made while a publish is in progress land here.
    pending_add: RefCell<Vec<(SubscriptionId, Subscriber)>>,
    pending_remove: RefCell<Vec<SubscriptionId>>,
}

/// Cloneable single-threaded handle over one subscriber list.
#[derive(Clone, Default)]
pub struct NotificationBus {
    shared: Rc<BusShared>,
}

impl std::fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, f: impl FnMut(&Notification) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.shared.next_id.get());
        self.shared.next_id.set(id.0 + 1);
        match self.shared.subscribers.try_borrow_mut() {
            Ok(mut subs) => subs.push((id, Box::new(f))),
            Err(_) => self.shared.pending_add.borrow_mut().push((id, Box::new(f))),
        }
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        match self.shared.subscribers.try_borrow_mut() {
            Ok(mut subs) => subs.retain(|(sid, _)| *sid != id),
            Err(_) => self.shared.pending_remove.borrow_mut().push(id),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        let live = self
            .shared
            .subscribers
            .try_borrow()
            .map(|s| s.len())
            .unwrap_or(0);
        live + self.shared.pending_add.borrow().len()
    }

    /// Deliver to every subscriber in subscription order. A publish issued
    /// from inside a subscriber is dropped.
    pub fn publish(&self, notification: Notification) {
        let Ok(mut subs) = self.shared.subscribers.try_borrow_mut() else {
            warn!("reentrant notification dropped: {:?}", notification);
            return;
        };
        for (_, subscriber) in subs.iter_mut() {
            subscriber(&notification);
        }
        drop(subs);
        self.apply_pending();
    }

    fn apply_pending(&self) {
        let added: Vec<_> = self.shared.pending_add.borrow_mut().drain(..).collect();
        let removed: Vec<_> = self.shared.pending_remove.borrow_mut().drain(..).collect();
        let mut subs = self.shared.subscribers.borrow_mut();
        subs.extend(added);
        if !removed.is_empty() {
            subs.retain(|(id, _)| !removed.contains(id));
        }
    }

    /// Subscribe a collector that keeps every notification.
    pub fn recorder(&self) -> Recorder {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let id = self.subscribe(move |n| sink.borrow_mut().push(n.clone()));
        Recorder { id, log }
    }
}

/// Collected notifications, for hosts and tests that poll instead of react.
#[derive(Debug, Clone)]
pub struct Recorder {
    pub id: SubscriptionId,
    log: Rc<RefCell<Vec<Notification>>>,
}

impl Recorder {
    pub fn len(&self) -> usize {
        self.log.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.borrow().is_empty()
    }

    pub fn count(&self, pred: impl Fn(&Notification) -> bool) -> usize {
        self.log.borrow().iter().filter(|n| pred(n)).count()
    }

    pub fn snapshot(&self) -> Vec<Notification> {
        self.log.borrow().clone()
    }

    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.log.borrow_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(id: u32) -> Notification {
        Notification::StateChanged {
            system: SystemId(id),
            change: StateChange::Started,
        }
    }

    #[test]
    fn test_publish_reaches_all_subscribers_in_order() {
        let bus = NotificationBus::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in 0..3 {
            let order = Rc::clone(&order);
            bus.subscribe(move |_| order.borrow_mut().push(tag));
        }
        bus.publish(started(1));
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = NotificationBus::new();
        let rec = bus.recorder();
        bus.publish(started(1));
        bus.unsubscribe(rec.id);
        bus.publish(started(2));
        assert_eq!(rec.len(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_clones_share_subscribers() {
        let bus = NotificationBus::new();
        let rec = bus.recorder();
        let other = bus.clone();
        other.publish(started(4));
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn test_reentrant_publish_dropped() {
        let bus = NotificationBus::new();
        let rec = bus.recorder();
        let inner = bus.clone();
        bus.subscribe(move |n| {
            if matches!(n, Notification::StateChanged { system, .. } if system.0 == 1) {
                inner.publish(started(99));
            }
        });
        bus.publish(started(1));
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn test_subscribe_during_publish_applies_afterwards() {
        let bus = NotificationBus::new();
        let late = Rc::new(RefCell::new(0));
        let handle = bus.clone();
        let late_in = Rc::clone(&late);
        let once = Cell::new(false);
        bus.subscribe(move |_| {
            if !once.replace(true) {
                let late = Rc::clone(&late_in);
                handle.subscribe(move |_| *late.borrow_mut() += 1);
            }
        });
        bus.publish(started(1));
        assert_eq!(*late.borrow(), 0);
        bus.publish(started(2));
        assert_eq!(*late.borrow(), 1);
    }
}
