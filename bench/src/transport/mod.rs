pub mod loopback;
pub mod mqtt;

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use derive_more::derive::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum QualityOfService {
    #[display("0")]
    AtMostOnce,
    #[display("1")]
    AtLeastOnce,
    #[display("2")]
    ExactlyOnce,
}

impl QualityOfService {
    pub fn as_u8(&self) -> u8 {
        match self {
            QualityOfService::AtMostOnce => 0,
            QualityOfService::AtLeastOnce => 1,
            QualityOfService::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for QualityOfService {
    type Error = TransportError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QualityOfService::AtMostOnce),
            1 => Ok(QualityOfService::AtLeastOnce),
            2 => Ok(QualityOfService::ExactlyOnce),
            other => Err(TransportError::InvalidQos(other)),
        }
    }
}

/// Creates one private connection per worker.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create_transport(
        &self,
        client_id: &str,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Box<dyn Transport>, TransportError>;

    /// Broker address used for logging and the report header.
    fn server_address(&self) -> &str;
}

/// A protocol client owned by exactly one worker.
#[async_trait]
pub trait Transport: Send {
    /// Resolves once the broker has acknowledged the connection.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Resolves once the broker has acknowledged the subscription.
    async fn subscribe(&mut self, topic: &str, qos: QualityOfService)
        -> Result<(), TransportError>;

    /// Hands the payload over for delivery. The returned token resolves when
    /// the broker acknowledges it, possibly on another thread.
    async fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: QualityOfService,
        retain: bool,
    ) -> Result<DeliveryToken, TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Releases every resource, pending deliveries are abandoned.
    async fn close(&mut self);
}

/// Callbacks invoked from the transport's own event task.
pub trait TransportListener: Send + Sync {
    fn message_arrived(&self, topic: &str, payload: &[u8]);

    fn connection_lost(&self, cause: &TransportError);
}

/// MQTT style filter matching with `+` for one level and `#` for the rest.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Acknowledgement of a publish, echoing the exact payload that was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAck {
    pub packet_id: Option<u16>,
    pub payload: Bytes,
}

/// Future side of a single publish acknowledgement.
#[derive(Debug)]
pub struct DeliveryToken {
    receiver: oneshot::Receiver<Result<DeliveryAck, TransportError>>,
}

/// Completing side, held by the transport until the acknowledgement arrives.
#[derive(Debug)]
pub struct DeliveryCompleter {
    sender: oneshot::Sender<Result<DeliveryAck, TransportError>>,
}

impl DeliveryToken {
    pub fn pair() -> (DeliveryCompleter, DeliveryToken) {
        let (sender, receiver) = oneshot::channel();
        (DeliveryCompleter { sender }, DeliveryToken { receiver })
    }

    pub fn completed(ack: DeliveryAck) -> Self {
        let (completer, token) = Self::pair();
        completer.complete(ack);
        token
    }
}

impl DeliveryCompleter {
    pub fn complete(self, ack: DeliveryAck) {
        // The worker may have stopped waiting for this token.
        let _ = self.sender.send(Ok(ack));
    }

    pub fn fail(self, error: TransportError) {
        let _ = self.sender.send(Err(error));
    }
}

impl Future for DeliveryToken {
    type Output = Result<DeliveryAck, TransportError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(TransportError::DeliveryAbandoned)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qos_levels_map_to_protocol_values() {
        for level in 0..=2u8 {
            assert_eq!(QualityOfService::try_from(level).unwrap().as_u8(), level);
        }
        assert_eq!(
            QualityOfService::try_from(3),
            Err(TransportError::InvalidQos(3))
        );
    }

    #[test]
    fn filters_follow_mqtt_wildcard_rules() {
        assert!(topic_matches("/a/b", "/a/b"));
        assert!(!topic_matches("/a/b", "/a/c"));
        assert!(topic_matches("/a/+", "/a/b"));
        assert!(!topic_matches("/a/+", "/a/b/c"));
        assert!(topic_matches("/a/#", "/a/b/c"));
        assert!(topic_matches("/a/#", "/a"));
        assert!(topic_matches("#", "/anything"));
        assert!(!topic_matches("/a", "/a/b"));
    }

    #[tokio::test]
    async fn token_resolves_with_the_completed_ack() {
        let (completer, token) = DeliveryToken::pair();
        let ack = DeliveryAck {
            packet_id: Some(7),
            payload: Bytes::from_static(b"payload"),
        };
        tokio::spawn({
            let ack = ack.clone();
            async move { completer.complete(ack) }
        });
        assert_eq!(token.await, Ok(ack));
    }

    #[tokio::test]
    async fn token_of_a_dropped_completer_is_abandoned() {
        let (completer, token) = DeliveryToken::pair();
        drop(completer);
        assert_eq!(token.await, Err(TransportError::DeliveryAbandoned));
    }
}
