/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 14/10/26
******************************************************************************/
use crate::message::{CanonicalMessage, MessageKind};
use crate::utils::SubscriberError;
use tokio::sync::mpsc;

/// Interface to be implemented to receive the messages pushed by the server.
///
/// Every registered subscriber receives every normalized entity message, in the order
/// the frames arrived, and is expected to pick the kinds it cares about. A tombstone
/// (`deleted: true`) is delivered like any other message; removing the entity is the
/// subscriber's job.
///
/// Notifications are delivered from the client's session task. A subscriber that
/// returns an error or panics does not prevent delivery to the others.
pub trait Subscriber: Send + Sync {
    /// Event handler called once per inbound entity message.
    ///
    /// # Parameters
    ///
    /// - `message`: the normalized message, with camelCase keys and dates already converted.
    fn on_message(&self, message: &CanonicalMessage) -> Result<(), SubscriberError>;

    /// Name used in log lines about this subscriber.
    fn name(&self) -> &str {
        "subscriber"
    }
}

/// A subscriber that forwards messages into an unbounded channel.
///
/// Optionally restricted to a set of message kinds.
#[derive(Debug)]
pub struct ChannelSubscriber {
    sender: mpsc::UnboundedSender<CanonicalMessage>,
    kinds: Option<Vec<MessageKind>>,
}

impl ChannelSubscriber {
    pub fn new(sender: mpsc::UnboundedSender<CanonicalMessage>) -> Self {
        Self {
            sender,
            kinds: None,
        }
    }

    pub fn create_channel() -> (Self, mpsc::UnboundedReceiver<CanonicalMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Only forward messages of the given kinds.
    #[must_use]
    pub fn with_kinds(mut self, kinds: impl Into<Vec<MessageKind>>) -> Self {
        self.kinds = Some(kinds.into());
        self
    }

    fn accepts(&self, kind: MessageKind) -> bool {
        self.kinds
            .as_ref()
            .is_none_or(|kinds| kinds.contains(&kind))
    }
}

impl Subscriber for ChannelSubscriber {
    fn on_message(&self, message: &CanonicalMessage) -> Result<(), SubscriberError> {
        if !self.accepts(message.kind()) {
            return Ok(());
        }
        self.sender
            .send(message.clone())
            .map_err(|_| SubscriberError::new("channel receiver dropped"))
    }

    fn name(&self) -> &str {
        "channel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn message(kind: MessageKind) -> CanonicalMessage {
        CanonicalMessage::new(kind, BTreeMap::new())
    }

    #[test]
    fn test_channel_subscriber_forwards() {
        let (subscriber, mut receiver) = ChannelSubscriber::create_channel();

        subscriber.on_message(&message(MessageKind::Step)).unwrap();
        subscriber.on_message(&message(MessageKind::Service)).unwrap();

        assert_eq!(receiver.try_recv().unwrap().kind(), MessageKind::Step);
        assert_eq!(receiver.try_recv().unwrap().kind(), MessageKind::Service);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_channel_subscriber_kind_filter() {
        let (subscriber, mut receiver) = ChannelSubscriber::create_channel();
        let subscriber = subscriber.with_kinds([MessageKind::Deployment]);

        subscriber.on_message(&message(MessageKind::Step)).unwrap();
        subscriber
            .on_message(&message(MessageKind::Deployment))
            .unwrap();

        assert_eq!(receiver.try_recv().unwrap().kind(), MessageKind::Deployment);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_channel_subscriber_dropped_receiver() {
        let (subscriber, receiver) = ChannelSubscriber::create_channel();
        drop(receiver);

        let result = subscriber.on_message(&message(MessageKind::Step));
        assert!(result.is_err());
    }

    #[test]
    fn test_default_name() {
        struct Quiet;
        impl Subscriber for Quiet {
            fn on_message(&self, _message: &CanonicalMessage) -> Result<(), SubscriberError> {
                Ok(())
            }
        }

        assert_eq!(Quiet.name(), "subscriber");
        let (channel, _rx) = ChannelSubscriber::create_channel();
        assert_eq!(channel.name(), "channel");
    }
}
