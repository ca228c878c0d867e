// Scripted in-memory `Connection` for exercising the provisioning flows
// without a broker.
#![allow(clippy::unwrap_used, dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use fleetprov_mqtt::{
    Ack, AckSender, Connection, ConnectionParameters, Connector, Error, MessageHandler, QoS,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

// ── Script ──────────────────────────────────────────────────────────

/// Outcome of one connect attempt.
#[derive(Debug, Clone, Copy)]
pub enum ConnectStep {
    Accept,
    /// Transport-level timeout (retryable).
    TimeOut,
    /// Broker refused the claim certificate (fatal).
    Refuse,
    /// Never acknowledged.
    Hang,
}

/// What the "broker" does after a request is published.
#[derive(Debug, Clone)]
pub enum Reply {
    Accepted(Value),
    Rejected(Value),
    /// Rejection delivered first, then an acceptance.
    RejectedThenAccepted(Value, Value),
    /// Raw bytes on the accepted topic.
    AcceptedRaw(Vec<u8>),
    /// No reply at all.
    Silent,
    /// Cancel the run instead of replying.
    Cancel,
}

/// Every call made on the connection, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect,
    Subscribe(String),
    Publish(String, Value),
    Disconnect,
}

#[derive(Default)]
struct Inner {
    calls: Vec<Call>,
    connect_steps: VecDeque<ConnectStep>,
    replies: HashMap<String, Reply>,
    hanging_subscriptions: Vec<String>,
    handlers: HashMap<String, MessageHandler>,
    fail_disconnect: bool,
    opened: Vec<ConnectionParameters>,
    /// Senders for acks that must never resolve.
    parked_bool: Vec<AckSender<bool>>,
    parked_u16: Vec<AckSender<u16>>,
    cancel: Option<CancellationToken>,
    next_pkid: u16,
}

// ── MockBroker ──────────────────────────────────────────────────────

/// Shared script and call log. Clone freely; all clones see the same state.
#[derive(Clone, Default)]
pub struct MockBroker {
    inner: Arc<Mutex<Inner>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_steps(&self, steps: impl IntoIterator<Item = ConnectStep>) -> &Self {
        self.inner.lock().unwrap().connect_steps.extend(steps);
        self
    }

    pub fn reply(&self, request_topic: &str, reply: Reply) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .replies
            .insert(request_topic.to_owned(), reply);
        self
    }

    pub fn hang_subscription(&self, topic: &str) -> &Self {
        self.inner
            .lock()
            .unwrap()
            .hanging_subscriptions
            .push(topic.to_owned());
        self
    }

    pub fn fail_disconnect(&self) -> &Self {
        self.inner.lock().unwrap().fail_disconnect = true;
        self
    }

    pub fn cancel_with(&self, cancel: CancellationToken) -> &Self {
        self.inner.lock().unwrap().cancel = Some(cancel);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn opened(&self) -> Vec<ConnectionParameters> {
        self.inner.lock().unwrap().opened.clone()
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector {
            broker: self.clone(),
        }
    }

    pub fn connection(&self) -> MockConnection {
        MockConnection {
            broker: self.clone(),
        }
    }

    fn deliver(&self, topic: &str, payload: &[u8]) {
        let handler = self.inner.lock().unwrap().handlers.get(topic).cloned();
        if let Some(handler) = handler {
            handler(payload);
        }
    }
}

// ── Connector / Connection ──────────────────────────────────────────

pub struct MockConnector {
    broker: MockBroker,
}

impl Connector for MockConnector {
    type Connection = MockConnection;

    fn open(&self, params: &ConnectionParameters) -> Result<MockConnection, Error> {
        self.broker
            .inner
            .lock()
            .unwrap()
            .opened
            .push(params.clone());
        Ok(self.broker.connection())
    }
}

pub struct MockConnection {
    broker: MockBroker,
}

impl Connection for MockConnection {
    fn connect(&self) -> Ack<bool> {
        let mut inner = self.broker.inner.lock().unwrap();
        inner.calls.push(Call::Connect);
        let step = inner.connect_steps.pop_front();
        match step.unwrap_or(ConnectStep::Accept) {
            ConnectStep::Accept => Ack::ready(Ok(false)),
            ConnectStep::TimeOut => Ack::failed(Error::Timeout("connect".into())),
            ConnectStep::Refuse => Ack::failed(Error::ConnectionRefused("NotAuthorized".into())),
            ConnectStep::Hang => {
                let (tx, ack) = Ack::pending();
                inner.parked_bool.push(tx);
                ack
            }
        }
    }

    fn disconnect(&self) -> Ack<()> {
        let mut inner = self.broker.inner.lock().unwrap();
        inner.calls.push(Call::Disconnect);
        if inner.fail_disconnect {
            Ack::failed(Error::ConnectionClosed)
        } else {
            Ack::ready(Ok(()))
        }
    }

    fn subscribe(&self, topic: &str, _qos: QoS, on_message: MessageHandler) -> Ack<u16> {
        let mut inner = self.broker.inner.lock().unwrap();
        inner.calls.push(Call::Subscribe(topic.to_owned()));
        inner.handlers.insert(topic.to_owned(), on_message);
        if inner.hanging_subscriptions.iter().any(|t| t == topic) {
            let (tx, ack) = Ack::pending();
            inner.parked_u16.push(tx);
            return ack;
        }
        inner.next_pkid += 1;
        Ack::ready(Ok(inner.next_pkid))
    }

    fn publish(&self, topic: &str, _qos: QoS, payload: Vec<u8>) -> Ack<u16> {
        let reply = {
            let mut inner = self.broker.inner.lock().unwrap();
            let body = serde_json::from_slice(&payload).unwrap();
            inner.calls.push(Call::Publish(topic.to_owned(), body));
            inner.replies.get(topic).cloned()
        };

        let broker = &self.broker;
        let accepted = format!("{topic}/accepted");
        let rejected = format!("{topic}/rejected");
        match reply {
            Some(Reply::Accepted(body)) => broker.deliver(&accepted, &json_bytes(&body)),
            Some(Reply::Rejected(body)) => broker.deliver(&rejected, &json_bytes(&body)),
            Some(Reply::RejectedThenAccepted(rejection, acceptance)) => {
                broker.deliver(&rejected, &json_bytes(&rejection));
                broker.deliver(&accepted, &json_bytes(&acceptance));
            }
            Some(Reply::AcceptedRaw(bytes)) => broker.deliver(&accepted, &bytes),
            Some(Reply::Cancel) => {
                if let Some(cancel) = &broker.inner.lock().unwrap().cancel {
                    cancel.cancel();
                }
            }
            Some(Reply::Silent) | None => {}
        }

        let mut inner = self.broker.inner.lock().unwrap();
        inner.next_pkid += 1;
        Ack::ready(Ok(inner.next_pkid))
    }
}

fn json_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap()
}
