//! `rumqttc`-backed [`Connection`] with acknowledgement tracking.
//!
//! [`MqttSession`] owns an [`AsyncClient`] and spawns a driver task that
//! owns the matching [`EventLoop`]. The driver idles until a connect is
//! requested, then polls the event loop and resolves pending [`Ack`]s as
//! CONNACK, SUBACK, and PUBACK packets arrive.
//!
//! Packet ids are assigned by the event loop when a request leaves the
//! client queue. Requests are queued in call order, so pending acks are kept
//! in FIFO order and bound to their packet id on the matching
//! `Outgoing` event.
//!
//! When the connection drops, every pending ack fails and the driver goes
//! back to idling. A later [`connect`](Connection::connect) starts a fresh
//! connection with the same client. Dropping the session stops the driver.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, Outgoing, Packet, QoS, SubscribeReasonCode,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::ack::{Ack, AckSender};
use crate::connection::{Connection, Connector, MessageHandler};
use crate::error::Error;
use crate::transport::{ConnectionParameters, build_options};

// ── Client request queue capacity ────────────────────────────────────

const REQUEST_CHANNEL_CAPACITY: usize = 16;

// ── MqttConnector ────────────────────────────────────────────────────

/// Production [`Connector`]: opens [`MqttSession`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MqttConnector;

impl Connector for MqttConnector {
    type Connection = MqttSession;

    fn open(&self, params: &ConnectionParameters) -> Result<MqttSession, Error> {
        MqttSession::new(params)
    }
}

// ── MqttSession ──────────────────────────────────────────────────────

/// One MQTT client plus its background driver task.
pub struct MqttSession {
    client: AsyncClient,
    shared: Arc<Shared>,
    connect_requested: Arc<Notify>,
    cancel: CancellationToken,
}

impl MqttSession {
    /// Build the client and spawn the driver. Does not connect.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(params: &ConnectionParameters) -> Result<Self, Error> {
        let options = build_options(params)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Client(format!("no async runtime available: {e}")))?;

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let shared = Arc::new(Shared::default());
        let connect_requested = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        tracing::debug!(
            endpoint = %params.endpoint,
            port = params.effective_port(),
            client_id = %params.client_id,
            proxied = params.proxy.is_some(),
            "MQTT session created"
        );

        runtime.spawn(drive(
            eventloop,
            Arc::clone(&shared),
            Arc::clone(&connect_requested),
            cancel.clone(),
        ));

        Ok(Self {
            client,
            shared,
            connect_requested,
            cancel,
        })
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Connection for MqttSession {
    fn connect(&self) -> Ack<bool> {
        let mut state = self.shared.lock();
        if state.connected {
            tracing::debug!("connect requested on an open session");
            return Ack::ready(Ok(false));
        }
        let (tx, ack) = Ack::pending();
        if let Some(previous) = state.connect_waiter.replace(tx) {
            previous.resolve(Err(Error::Connection("superseded by a new connect".into())));
        }
        drop(state);
        self.connect_requested.notify_one();
        ack
    }

    fn disconnect(&self) -> Ack<()> {
        let mut state = self.shared.lock();
        if !state.connected {
            return Ack::ready(Ok(()));
        }
        if let Err(e) = self.client.try_disconnect() {
            return Ack::failed(e.into());
        }
        let (tx, ack) = Ack::pending();
        state.disconnect_waiter = Some(tx);
        ack
    }

    fn subscribe(&self, topic: &str, qos: QoS, on_message: MessageHandler) -> Ack<u16> {
        let mut state = self.shared.lock();
        state.handlers.insert(topic.to_owned(), on_message);
        if let Err(e) = self.client.try_subscribe(topic, qos) {
            state.handlers.remove(topic);
            return Ack::failed(e.into());
        }
        let (tx, ack) = Ack::pending();
        state.queued_subscribes.push_back((topic.to_owned(), tx));
        ack
    }

    fn publish(&self, topic: &str, qos: QoS, payload: Vec<u8>) -> Ack<u16> {
        let mut state = self.shared.lock();
        if let Err(e) = self.client.try_publish(topic, qos, false, payload) {
            return Ack::failed(e.into());
        }
        let (tx, ack) = Ack::pending();
        state.queued_publishes.push_back((qos, tx));
        ack
    }
}

// ── Shared driver state ──────────────────────────────────────────────

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    connected: bool,
    connect_waiter: Option<AckSender<bool>>,
    disconnect_waiter: Option<AckSender<()>>,
    /// Sent to the client queue, packet id not yet known.
    queued_subscribes: VecDeque<(String, AckSender<u16>)>,
    queued_publishes: VecDeque<(QoS, AckSender<u16>)>,
    /// On the wire, waiting for the broker.
    awaiting_suback: HashMap<u16, (String, AckSender<u16>)>,
    awaiting_puback: HashMap<u16, AckSender<u16>>,
    handlers: HashMap<String, MessageHandler>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_event(&self, event: Event) {
        match event {
            Event::Incoming(packet) => self.handle_incoming(packet),
            Event::Outgoing(outgoing) => self.handle_outgoing(outgoing),
        }
    }

    fn handle_incoming(&self, packet: Packet) {
        match packet {
            Packet::ConnAck(connack) => {
                let mut state = self.lock();
                let result = if connack.code == ConnectReturnCode::Success {
                    state.connected = true;
                    tracing::info!(session_present = connack.session_present, "MQTT connected");
                    Ok(connack.session_present)
                } else {
                    Err(Error::ConnectionRefused(format!("{:?}", connack.code)))
                };
                if let Some(waiter) = state.connect_waiter.take() {
                    waiter.resolve(result);
                }
            }
            Packet::SubAck(suback) => {
                let Some((topic, waiter)) = self.lock().awaiting_suback.remove(&suback.pkid) else {
                    tracing::debug!(pkid = suback.pkid, "SUBACK with no waiter");
                    return;
                };
                let rejected = suback
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure));
                let result = if rejected {
                    tracing::warn!(%topic, "subscription rejected by broker");
                    Err(Error::SubscribeRejected { topic })
                } else {
                    tracing::debug!(%topic, pkid = suback.pkid, "subscribed");
                    Ok(suback.pkid)
                };
                waiter.resolve(result);
            }
            Packet::PubAck(puback) => {
                if let Some(waiter) = self.lock().awaiting_puback.remove(&puback.pkid) {
                    waiter.resolve(Ok(puback.pkid));
                }
            }
            Packet::Publish(publish) => {
                let handler = self.lock().handlers.get(&publish.topic).cloned();
                match handler {
                    Some(handler) => handler(&publish.payload),
                    None => tracing::debug!(topic = %publish.topic, "message on unrouted topic"),
                }
            }
            _ => {}
        }
    }

    fn handle_outgoing(&self, outgoing: Outgoing) {
        let mut state = self.lock();
        match outgoing {
            Outgoing::Subscribe(pkid) => {
                if let Some(pending) = state.queued_subscribes.pop_front() {
                    state.awaiting_suback.insert(pkid, pending);
                }
            }
            Outgoing::Publish(pkid) => {
                let Some((qos, waiter)) = state.queued_publishes.pop_front() else {
                    return;
                };
                if qos == QoS::AtMostOnce {
                    waiter.resolve(Ok(pkid));
                } else {
                    state.awaiting_puback.insert(pkid, waiter);
                }
            }
            Outgoing::Disconnect => {
                state.connected = false;
                if let Some(waiter) = state.disconnect_waiter.take() {
                    waiter.resolve(Ok(()));
                }
                tracing::info!("MQTT disconnected");
            }
            _ => {}
        }
    }

    /// The event loop reported an error: fail everything in flight.
    fn connection_lost(&self, err: Error) {
        let mut state = self.lock();
        let was_connected = std::mem::take(&mut state.connected);
        let timed_out = err.is_timeout();
        let reason = err.to_string();
        let lost = || {
            if timed_out {
                Error::Timeout(reason.clone())
            } else {
                Error::Connection(reason.clone())
            }
        };

        if let Some(waiter) = state.disconnect_waiter.take() {
            waiter.resolve(Ok(()));
        } else if was_connected {
            tracing::warn!(error = %reason, "connection interrupted");
        }

        for (_, waiter) in state.queued_subscribes.drain(..) {
            waiter.resolve(Err(lost()));
        }
        for (_, (_, waiter)) in state.awaiting_suback.drain() {
            waiter.resolve(Err(lost()));
        }
        for (_, waiter) in state.queued_publishes.drain(..) {
            waiter.resolve(Err(lost()));
        }
        for (_, waiter) in state.awaiting_puback.drain() {
            waiter.resolve(Err(lost()));
        }
        if let Some(waiter) = state.connect_waiter.take() {
            tracing::debug!(error = %reason, "connect attempt failed");
            waiter.resolve(Err(err));
        }
    }
}

// ── Driver task ──────────────────────────────────────────────────────

/// Idle until a connect is requested, then poll until the connection ends.
async fn drive(
    mut eventloop: EventLoop,
    shared: Arc<Shared>,
    connect_requested: Arc<Notify>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = connect_requested.notified() => {}
        }

        loop {
            let polled = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                polled = eventloop.poll() => polled,
            };
            match polled {
                Ok(event) => shared.handle_event(event),
                Err(e) => {
                    shared.connection_lost(e.into());
                    break;
                }
            }
        }
    }
    tracing::debug!("MQTT driver stopped");
}
