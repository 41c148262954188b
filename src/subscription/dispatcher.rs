/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/
use crate::message::CanonicalMessage;
use crate::subscription::Subscriber;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

/// Handle returned by `Dispatcher::register`, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct Registration {
    id: SubscriberId,
    subscriber: Weak<dyn Subscriber>,
}

/// Outcome of one `dispatch` call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// Subscribers whose handler returned `Ok`.
    pub delivered: usize,
    /// Subscribers whose handler returned an error or panicked.
    pub failed: usize,
    /// Registrations dropped because their subscriber no longer exists.
    pub pruned: usize,
}

/// Ordered registry of subscribers and synchronous fan-out.
///
/// Subscribers are held weakly: the dispatcher never keeps a subscriber alive, and
/// registrations whose subscriber has been dropped are removed on the next dispatch.
/// Registering the same subscriber twice yields two registrations and therefore two
/// notifications per message.
#[derive(Default)]
pub struct Dispatcher {
    next_id: u64,
    registrations: Vec<Registration>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registrations", &self.registrations.len())
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a subscriber; registration order is notification order.
    pub fn register<S: Subscriber + 'static>(&mut self, subscriber: &Arc<S>) -> SubscriberId {
        let subscriber: Weak<S> = Arc::downgrade(subscriber);
        let subscriber: Weak<dyn Subscriber> = subscriber;
        self.register_weak(subscriber)
    }

    /// Appends an already downgraded subscriber.
    pub fn register_weak(&mut self, subscriber: Weak<dyn Subscriber>) -> SubscriberId {
        self.next_id += 1;
        let id = SubscriberId(self.next_id);
        self.registrations.push(Registration { id, subscriber });
        debug!("Registered subscriber {:?}", id);
        id
    }

    /// Removes a registration. Returns `false` if it was not present.
    pub fn unregister(&mut self, id: SubscriberId) -> bool {
        let before = self.registrations.len();
        self.registrations.retain(|registration| registration.id != id);
        let removed = self.registrations.len() != before;
        if removed {
            debug!("Unregistered subscriber {:?}", id);
        }
        removed
    }

    /// Number of registrations, including ones whose subscriber may already be gone.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Delivers `message` to every live subscriber in registration order.
    ///
    /// Failures are logged and counted; they never stop delivery to later subscribers.
    pub fn dispatch(&mut self, message: &CanonicalMessage) -> DispatchReport {
        let mut report = DispatchReport::default();

        self.registrations.retain(|registration| {
            let Some(subscriber) = registration.subscriber.upgrade() else {
                debug!("Pruning dropped subscriber {:?}", registration.id);
                report.pruned += 1;
                return false;
            };

            match catch_unwind(AssertUnwindSafe(|| subscriber.on_message(message))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    error!(
                        "Subscriber '{}' failed on {} message: {}",
                        subscriber.name(),
                        message.kind(),
                        e
                    );
                    report.failed += 1;
                }
                Err(_) => {
                    error!(
                        "Subscriber '{}' panicked on {} message",
                        subscriber.name(),
                        message.kind()
                    );
                    report.failed += 1;
                }
            }
            true
        });

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageKind;
    use crate::utils::SubscriberError;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    impl Recorder {
        fn new(label: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                label,
                log: log.clone(),
                fail: false,
            })
        }

        fn failing(label: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                label,
                log: log.clone(),
                fail: true,
            })
        }
    }

    impl Subscriber for Recorder {
        fn on_message(&self, message: &CanonicalMessage) -> Result<(), SubscriberError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.label, message.kind()));
            if self.fail {
                Err(SubscriberError::new("boom"))
            } else {
                Ok(())
            }
        }
    }

    struct Panicker;

    impl Subscriber for Panicker {
        fn on_message(&self, _message: &CanonicalMessage) -> Result<(), SubscriberError> {
            panic!("subscriber bug");
        }
    }

    fn message(kind: MessageKind) -> CanonicalMessage {
        CanonicalMessage::new(kind, BTreeMap::new())
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let s1 = Recorder::new("s1", &log);
        let s2 = Recorder::new("s2", &log);
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(&s1);
        dispatcher.register(&s2);

        let report = dispatcher.dispatch(&message(MessageKind::Step));

        assert_eq!(*log.lock().unwrap(), vec!["s1:step", "s2:step"]);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 0);
    }

    #[test]
    fn test_failing_subscriber_is_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let s1 = Recorder::failing("s1", &log);
        let s2 = Recorder::new("s2", &log);
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(&s1);
        dispatcher.register(&s2);

        let report = dispatcher.dispatch(&message(MessageKind::Deployment));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["s1:deployment", "s2:deployment"]
        );
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_panicking_subscriber_is_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let s1 = Arc::new(Panicker);
        let s2 = Recorder::new("s2", &log);
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(&s1);
        dispatcher.register(&s2);

        let report = dispatcher.dispatch(&message(MessageKind::Service));

        assert_eq!(*log.lock().unwrap(), vec!["s2:service"]);
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        // A panicking subscriber stays registered.
        assert_eq!(dispatcher.len(), 2);
    }

    #[test]
    fn test_duplicate_registration_notifies_twice() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let s1 = Recorder::new("s1", &log);
        let mut dispatcher = Dispatcher::new();
        let first = dispatcher.register(&s1);
        let second = dispatcher.register(&s1);
        assert_ne!(first, second);

        dispatcher.dispatch(&message(MessageKind::Step));

        assert_eq!(*log.lock().unwrap(), vec!["s1:step", "s1:step"]);
    }

    #[test]
    fn test_unregister() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let s1 = Recorder::new("s1", &log);
        let s2 = Recorder::new("s2", &log);
        let mut dispatcher = Dispatcher::new();
        let id1 = dispatcher.register(&s1);
        dispatcher.register(&s2);

        assert!(dispatcher.unregister(id1));
        assert!(!dispatcher.unregister(id1));
        dispatcher.dispatch(&message(MessageKind::Step));

        assert_eq!(*log.lock().unwrap(), vec!["s2:step"]);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let s1 = Recorder::new("s1", &log);
        let s2 = Recorder::new("s2", &log);
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(&s1);
        dispatcher.register(&s2);
        drop(s1);

        let report = dispatcher.dispatch(&message(MessageKind::Step));

        assert_eq!(report.pruned, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(dispatcher.len(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["s2:step"]);
    }

    #[test]
    fn test_tombstone_is_delivered_intact() {
        let (channel, mut receiver) = crate::subscription::ChannelSubscriber::create_channel();
        let channel = Arc::new(channel);
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(&channel);

        let mut fields = BTreeMap::new();
        fields.insert("deleted".to_string(), serde_json::Value::Bool(true).into());
        let tombstone = CanonicalMessage::new(MessageKind::Deployment, fields);
        dispatcher.dispatch(&tombstone);

        assert_eq!(receiver.try_recv().unwrap(), tombstone);
    }
}
