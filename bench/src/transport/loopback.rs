use super::{
    topic_matches, DeliveryAck, DeliveryToken, QualityOfService, Transport, TransportFactory,
    TransportListener,
};
use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::debug;

pub const LOOPBACK_ADDRESS: &str = "loopback";

/// In-process broker, delivers synchronously to every matching subscription
/// and acknowledges every publish immediately.
#[derive(Default)]
pub struct LoopbackBroker {
    sessions: RwLock<HashMap<u64, Session>>,
    next_session_id: AtomicU64,
    refuse_connections: AtomicBool,
}

struct Session {
    client_id: String,
    listener: Arc<dyn TransportListener>,
    filters: Vec<String>,
}

impl LoopbackBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn open_session(
        &self,
        client_id: &str,
        listener: Arc<dyn TransportListener>,
    ) -> Result<u64, TransportError> {
        if self.refuse_connections.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionRefused(format!(
                "loopback broker refuses client {client_id}"
            )));
        }
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        self.write_sessions(|sessions| {
            sessions.insert(
                id,
                Session {
                    client_id: client_id.to_owned(),
                    listener,
                    filters: Vec::new(),
                },
            );
        });
        Ok(id)
    }

    fn add_filter(&self, session_id: u64, filter: &str) -> Result<(), TransportError> {
        let mut added = false;
        self.write_sessions(|sessions| {
            if let Some(session) = sessions.get_mut(&session_id) {
                session.filters.push(filter.to_owned());
                added = true;
            }
        });
        if added {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    fn close_session(&self, session_id: u64) {
        self.write_sessions(|sessions| {
            if let Some(session) = sessions.remove(&session_id) {
                debug!("Closed loopback session of client {}", session.client_id);
            }
        });
    }

    fn is_open(&self, session_id: u64) -> bool {
        self.read_sessions().contains_key(&session_id)
    }

    fn route(&self, topic: &str, payload: &[u8]) {
        let listeners: Vec<Arc<dyn TransportListener>> = self
            .read_sessions()
            .values()
            .filter(|session| session.filters.iter().any(|f| topic_matches(f, topic)))
            .map(|session| session.listener.clone())
            .collect();
        for listener in listeners {
            listener.message_arrived(topic, payload);
        }
    }

    fn read_sessions(&self) -> std::sync::RwLockReadGuard<'_, HashMap<u64, Session>> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_sessions(&self, f: impl FnOnce(&mut HashMap<u64, Session>)) {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut sessions);
    }
}

#[cfg(test)]
impl LoopbackBroker {
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.refuse_connections.store(refuse, Ordering::Release);
    }

    pub fn connected_clients(&self) -> usize {
        self.read_sessions().len()
    }

    /// Drops every live session and notifies its owner about the lost connection.
    pub fn sever_connections(&self, cause: &str) {
        let mut severed = Vec::new();
        self.write_sessions(|sessions| severed.extend(sessions.drain().map(|(_, s)| s)));
        let error = TransportError::ConnectionLost(cause.to_owned());
        for session in severed {
            debug!("Severing loopback session of client {}", session.client_id);
            session.listener.connection_lost(&error);
        }
    }
}

pub struct LoopbackTransportFactory {
    broker: Arc<LoopbackBroker>,
}

impl LoopbackTransportFactory {
    pub fn new(broker: Arc<LoopbackBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl TransportFactory for LoopbackTransportFactory {
    async fn create_transport(
        &self,
        client_id: &str,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(LoopbackTransport {
            broker: self.broker.clone(),
            client_id: client_id.to_owned(),
            listener,
            session_id: None,
            next_packet_id: 0,
        }))
    }

    fn server_address(&self) -> &str {
        LOOPBACK_ADDRESS
    }
}

pub struct LoopbackTransport {
    broker: Arc<LoopbackBroker>,
    client_id: String,
    listener: Arc<dyn TransportListener>,
    session_id: Option<u64>,
    next_packet_id: u16,
}

impl LoopbackTransport {
    fn open_session_id(&self) -> Result<u64, TransportError> {
        let session_id = self.session_id.ok_or(TransportError::NotConnected)?;
        if !self.broker.is_open(session_id) {
            return Err(TransportError::ConnectionLost(
                "loopback session was severed".to_owned(),
            ));
        }
        Ok(session_id)
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let session_id = self
            .broker
            .open_session(&self.client_id, self.listener.clone())?;
        self.session_id = Some(session_id);
        Ok(())
    }

    async fn subscribe(
        &mut self,
        topic: &str,
        _qos: QualityOfService,
    ) -> Result<(), TransportError> {
        let session_id = self.open_session_id()?;
        self.broker.add_filter(session_id, topic)
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: QualityOfService,
        _retain: bool,
    ) -> Result<DeliveryToken, TransportError> {
        self.open_session_id()?;
        self.broker.route(topic, &payload);
        let packet_id = match qos {
            QualityOfService::AtMostOnce => None,
            _ => {
                self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
                Some(self.next_packet_id)
            }
        };
        Ok(DeliveryToken::completed(DeliveryAck { packet_id, payload }))
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let session_id = self.session_id.take().ok_or(TransportError::NotConnected)?;
        self.broker.close_session(session_id);
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(session_id) = self.session_id.take() {
            self.broker.close_session(session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingListener {
        messages: Mutex<Vec<(String, Vec<u8>)>>,
        lost: AtomicBool,
    }

    impl TransportListener for RecordingListener {
        fn message_arrived(&self, topic: &str, payload: &[u8]) {
            self.messages
                .lock()
                .unwrap()
                .push((topic.to_owned(), payload.to_vec()));
        }

        fn connection_lost(&self, _cause: &TransportError) {
            self.lost.store(true, Ordering::SeqCst);
        }
    }

    async fn connected(
        factory: &LoopbackTransportFactory,
        client_id: &str,
    ) -> (Box<dyn Transport>, Arc<RecordingListener>) {
        let listener = Arc::new(RecordingListener::default());
        let mut transport = factory
            .create_transport(client_id, listener.clone())
            .await
            .unwrap();
        transport.connect().await.unwrap();
        (transport, listener)
    }

    #[tokio::test]
    async fn publish_fans_out_to_matching_subscribers_and_echoes_payload() {
        let factory = LoopbackTransportFactory::new(LoopbackBroker::new());
        let (mut first, first_listener) = connected(&factory, "sub-1").await;
        let (mut second, second_listener) = connected(&factory, "sub-2").await;
        let (mut publisher, _) = connected(&factory, "pub-1").await;
        first
            .subscribe("/bench/t", QualityOfService::AtMostOnce)
            .await
            .unwrap();
        second
            .subscribe("/bench/other", QualityOfService::AtMostOnce)
            .await
            .unwrap();

        let token = publisher
            .publish(
                "/bench/t",
                Bytes::from_static(b"abc"),
                QualityOfService::AtLeastOnce,
                false,
            )
            .await
            .unwrap();
        let ack = token.await.unwrap();

        assert_eq!(ack.payload, Bytes::from_static(b"abc"));
        assert_eq!(ack.packet_id, Some(1));
        assert_eq!(
            *first_listener.messages.lock().unwrap(),
            vec![("/bench/t".to_owned(), b"abc".to_vec())]
        );
        assert!(second_listener.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn refused_connections_fail_connect() {
        let broker = LoopbackBroker::new();
        broker.set_refuse_connections(true);
        let factory = LoopbackTransportFactory::new(broker.clone());
        let mut transport = factory
            .create_transport("client", Arc::new(RecordingListener::default()))
            .await
            .unwrap();

        assert!(matches!(
            transport.connect().await,
            Err(TransportError::ConnectionRefused(_))
        ));
        assert_eq!(broker.connected_clients(), 0);
    }

    #[tokio::test]
    async fn severed_sessions_notify_and_reject_publishes() {
        let broker = LoopbackBroker::new();
        let factory = LoopbackTransportFactory::new(broker.clone());
        let (mut transport, listener) = connected(&factory, "client").await;

        broker.sever_connections("test");

        assert!(listener.lost.load(Ordering::SeqCst));
        assert!(matches!(
            transport
                .publish("/t", Bytes::new(), QualityOfService::AtMostOnce, false)
                .await,
            Err(TransportError::ConnectionLost(_))
        ));
    }

    #[tokio::test]
    async fn disconnect_removes_the_session() {
        let broker = LoopbackBroker::new();
        let factory = LoopbackTransportFactory::new(broker.clone());
        let (mut transport, _) = connected(&factory, "client").await;
        assert_eq!(broker.connected_clients(), 1);

        transport.disconnect().await.unwrap();

        assert_eq!(broker.connected_clients(), 0);
        assert_eq!(
            transport.disconnect().await,
            Err(TransportError::NotConnected)
        );
    }
}
