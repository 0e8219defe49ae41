use super::{
    DeliveryAck, DeliveryCompleter, DeliveryToken, QualityOfService, Transport, TransportFactory,
    TransportListener,
};
use crate::error::{BenchError, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    SubscribeReasonCode,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

pub const DEFAULT_MQTT_PORT: u16 = 1883;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_CHANNEL_HEADROOM: usize = 10;

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub max_inflight: u16,
    pub automatic_reconnect: bool,
}

pub struct MqttTransportFactory {
    server_address: String,
    host: String,
    port: u16,
    settings: MqttSettings,
}

impl MqttTransportFactory {
    pub fn new(server_address: &str, settings: MqttSettings) -> Result<Self, BenchError> {
        let (host, port) = parse_server_address(server_address)?;
        Ok(Self {
            server_address: server_address.to_owned(),
            host,
            port,
            settings,
        })
    }
}

/// Accepts `tcp://host:port`, `mqtt://host:port`, `host:port` or a bare host.
pub fn parse_server_address(address: &str) -> Result<(String, u16), BenchError> {
    let invalid = || BenchError::InvalidServerAddress(address.to_owned());
    let authority = address
        .strip_prefix("tcp://")
        .or_else(|| address.strip_prefix("mqtt://"))
        .unwrap_or(address)
        .trim_end_matches('/');
    if authority.is_empty() || authority.contains("://") {
        return Err(invalid());
    }

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
        None => (authority, DEFAULT_MQTT_PORT),
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid());
    }
    Ok((host.to_owned(), port))
}

#[async_trait]
impl TransportFactory for MqttTransportFactory {
    async fn create_transport(
        &self,
        client_id: &str,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let mut options = MqttOptions::new(client_id, self.host.as_str(), self.port);
        options
            .set_keep_alive(self.settings.keep_alive)
            .set_clean_session(true)
            .set_inflight(self.settings.max_inflight.max(1));
        let capacity = self.settings.max_inflight as usize + REQUEST_CHANNEL_HEADROOM;
        let (client, event_loop) = AsyncClient::new(options, capacity);
        Ok(Box::new(MqttTransport {
            server_address: self.server_address.clone(),
            client,
            event_loop: Some(event_loop),
            event_task: None,
            listener,
            shared: Arc::new(SharedState::default()),
            settings: self.settings.clone(),
        }))
    }

    fn server_address(&self) -> &str {
        &self.server_address
    }
}

pub struct MqttTransport {
    server_address: String,
    client: AsyncClient,
    event_loop: Option<EventLoop>,
    event_task: Option<JoinHandle<()>>,
    listener: Arc<dyn TransportListener>,
    shared: Arc<SharedState>,
    settings: MqttSettings,
}

impl MqttTransport {
    fn ensure_connected(&self) -> Result<(), TransportError> {
        match &self.event_task {
            Some(task) if !task.is_finished() => Ok(()),
            Some(_) => Err(TransportError::ConnectionLost(
                "event loop has stopped".to_owned(),
            )),
            None => Err(TransportError::NotConnected),
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let event_loop = self.event_loop.take().ok_or_else(|| {
            TransportError::Request("connect can only be called once".to_owned())
        })?;
        let (connected_tx, connected_rx) = oneshot::channel();
        let context = EventContext {
            server_address: self.server_address.clone(),
            listener: self.listener.clone(),
            shared: self.shared.clone(),
            automatic_reconnect: self.settings.automatic_reconnect,
        };
        self.event_task = Some(tokio::spawn(drive_event_loop(
            event_loop,
            context,
            connected_tx,
        )));

        match timeout(self.settings.connect_timeout, connected_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Connect {
                address: self.server_address.clone(),
                reason: "event loop stopped before the connection was acknowledged".to_owned(),
            }),
            Err(_) => {
                if let Some(task) = self.event_task.take() {
                    task.abort();
                }
                Err(TransportError::ConnectTimeout(self.settings.connect_timeout))
            }
        }
    }

    async fn subscribe(
        &mut self,
        topic: &str,
        qos: QualityOfService,
    ) -> Result<(), TransportError> {
        self.ensure_connected()?;
        let (acked_tx, acked_rx) = oneshot::channel();
        self.shared.lock().unsent_subscriptions.push_back(PendingSubscription {
            topic: topic.to_owned(),
            completer: acked_tx,
        });
        if let Err(error) = self.client.subscribe(topic, to_mqtt_qos(qos)).await {
            self.shared.lock().unsent_subscriptions.pop_back();
            return Err(TransportError::Request(error.to_string()));
        }
        acked_rx.await.unwrap_or_else(|_| {
            Err(TransportError::ConnectionLost(
                "connection closed before the subscription was acknowledged".to_owned(),
            ))
        })
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: QualityOfService,
        retain: bool,
    ) -> Result<DeliveryToken, TransportError> {
        self.ensure_connected()?;
        let (completer, token) = DeliveryToken::pair();
        self.shared.lock().unsent_publishes.push_back(PendingPublish {
            payload: payload.clone(),
            completer,
        });
        if let Err(error) = self
            .client
            .publish_bytes(topic, to_mqtt_qos(qos), retain, payload)
            .await
        {
            self.shared.lock().unsent_publishes.pop_back();
            return Err(TransportError::Request(error.to_string()));
        }
        Ok(token)
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.shared.disconnecting.store(true, Ordering::Release);
        self.client
            .disconnect()
            .await
            .map_err(|error| TransportError::Request(error.to_string()))?;
        if let Some(mut task) = self.event_task.take() {
            if timeout(DISCONNECT_TIMEOUT, &mut task).await.is_err() {
                warn!(
                    "Event loop of {} did not stop within {:?}, aborting it",
                    self.server_address, DISCONNECT_TIMEOUT
                );
                task.abort();
            }
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.shared.disconnecting.store(true, Ordering::Release);
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
        self.event_loop = None;
        self.shared.fail_pending(TransportError::DeliveryAbandoned);
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
    }
}

fn to_mqtt_qos(qos: QualityOfService) -> QoS {
    match qos {
        QualityOfService::AtMostOnce => QoS::AtMostOnce,
        QualityOfService::AtLeastOnce => QoS::AtLeastOnce,
        QualityOfService::ExactlyOnce => QoS::ExactlyOnce,
    }
}

struct EventContext {
    server_address: String,
    listener: Arc<dyn TransportListener>,
    shared: Arc<SharedState>,
    automatic_reconnect: bool,
}

async fn drive_event_loop(
    mut event_loop: EventLoop,
    context: EventContext,
    connected: oneshot::Sender<Result<(), TransportError>>,
) {
    let mut connected = Some(connected);
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => match connected.take() {
                Some(connected) => {
                    let _ = connected.send(Ok(()));
                }
                None => info!("Reconnected to {}", context.server_address),
            },
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                context
                    .listener
                    .message_arrived(&publish.topic, &publish.payload);
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                context.shared.publish_acknowledged(ack.pkid)
            }
            Ok(Event::Incoming(Packet::PubComp(comp))) => {
                context.shared.publish_acknowledged(comp.pkid)
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                let accepted = ack
                    .return_codes
                    .iter()
                    .all(|code| !matches!(code, SubscribeReasonCode::Failure));
                context.shared.subscription_acknowledged(ack.pkid, accepted);
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => context.shared.publish_sent(pkid),
            Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => {
                context.shared.subscription_sent(pkid)
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("Disconnect sent to {}", context.server_address);
                break;
            }
            Ok(_) => {}
            Err(error) => {
                if context.shared.disconnecting.load(Ordering::Acquire) {
                    break;
                }
                if let Some(connected) = connected.take() {
                    let _ = connected.send(Err(connect_error(&context.server_address, &error)));
                    break;
                }
                if context.automatic_reconnect {
                    warn!(
                        "Connection to {} lost: {error}, reconnecting in {:?}...",
                        context.server_address, RECONNECT_BACKOFF
                    );
                    sleep(RECONNECT_BACKOFF).await;
                    continue;
                }
                let cause = TransportError::ConnectionLost(error.to_string());
                context.shared.fail_pending(cause.clone());
                context.listener.connection_lost(&cause);
                break;
            }
        }
    }
}

fn connect_error(server_address: &str, error: &ConnectionError) -> TransportError {
    match error {
        ConnectionError::ConnectionRefused(code) => {
            TransportError::ConnectionRefused(format!("{code:?}"))
        }
        other => TransportError::Connect {
            address: server_address.to_owned(),
            reason: other.to_string(),
        },
    }
}

struct PendingPublish {
    payload: Bytes,
    completer: DeliveryCompleter,
}

struct PendingSubscription {
    topic: String,
    completer: oneshot::Sender<Result<(), TransportError>>,
}

/// Correlation between requests handed to the client and the packet ids the
/// event loop reports for them. Requests leave the client in submission order.
#[derive(Default)]
struct Correlation {
    unsent_publishes: VecDeque<PendingPublish>,
    unacked_publishes: HashMap<u16, PendingPublish>,
    unsent_subscriptions: VecDeque<PendingSubscription>,
    unacked_subscriptions: HashMap<u16, PendingSubscription>,
}

#[derive(Default)]
struct SharedState {
    correlation: Mutex<Correlation>,
    disconnecting: AtomicBool,
}

impl SharedState {
    fn lock(&self) -> MutexGuard<'_, Correlation> {
        self.correlation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish_sent(&self, pkid: u16) {
        let mut correlation = self.lock();
        // A known packet id is a retransmission after reconnect.
        if pkid != 0 && correlation.unacked_publishes.contains_key(&pkid) {
            return;
        }
        let Some(pending) = correlation.unsent_publishes.pop_front() else {
            return;
        };
        if pkid == 0 {
            drop(correlation);
            pending.completer.complete(DeliveryAck {
                packet_id: None,
                payload: pending.payload,
            });
        } else {
            correlation.unacked_publishes.insert(pkid, pending);
        }
    }

    fn publish_acknowledged(&self, pkid: u16) {
        let pending = self.lock().unacked_publishes.remove(&pkid);
        match pending {
            Some(pending) => pending.completer.complete(DeliveryAck {
                packet_id: Some(pkid),
                payload: pending.payload,
            }),
            None => debug!("Acknowledgement for unknown packet id {pkid}"),
        }
    }

    fn subscription_sent(&self, pkid: u16) {
        let mut correlation = self.lock();
        if let Some(pending) = correlation.unsent_subscriptions.pop_front() {
            correlation.unacked_subscriptions.insert(pkid, pending);
        }
    }

    fn subscription_acknowledged(&self, pkid: u16, accepted: bool) {
        let pending = self.lock().unacked_subscriptions.remove(&pkid);
        if let Some(pending) = pending {
            let result = if accepted {
                Ok(())
            } else {
                Err(TransportError::SubscriptionRejected {
                    topic: pending.topic,
                })
            };
            let _ = pending.completer.send(result);
        }
    }

    fn fail_pending(&self, error: TransportError) {
        let correlation = std::mem::take(&mut *self.lock());
        let publishes = correlation
            .unsent_publishes
            .into_iter()
            .chain(correlation.unacked_publishes.into_values());
        for pending in publishes {
            pending.completer.fail(error.clone());
        }
        let subscriptions = correlation
            .unsent_subscriptions
            .into_iter()
            .chain(correlation.unacked_subscriptions.into_values());
        for pending in subscriptions {
            let _ = pending.completer.send(Err(error.clone()));
        }
    }
}
