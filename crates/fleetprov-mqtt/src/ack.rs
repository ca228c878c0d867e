//! Delivery acknowledgement handles.
//!
//! Every network operation on a [`Connection`](crate::Connection) returns an
//! [`Ack`] immediately. The session driver resolves it once the broker
//! acknowledges the operation (CONNACK, SUBACK, PUBACK) or the connection
//! fails. An acknowledgement only confirms delivery; semantic replies arrive
//! later as inbound messages.
//!
//! Dropping an [`Ack`] stops the wait but leaves the operation in flight.
//! A late acknowledgement is then discarded by the driver.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::Error;

/// Pending acknowledgement of one network operation.
#[derive(Debug)]
#[must_use = "an Ack does nothing unless awaited"]
pub struct Ack<T> {
    rx: oneshot::Receiver<Result<T, Error>>,
}

/// Resolving half of an [`Ack`]. Consumed on resolution.
#[derive(Debug)]
pub struct AckSender<T> {
    tx: oneshot::Sender<Result<T, Error>>,
}

impl<T> Ack<T> {
    /// Create a linked sender/ack pair.
    pub fn pending() -> (AckSender<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (AckSender { tx }, Self { rx })
    }

    /// An ack that is already resolved.
    pub fn ready(result: Result<T, Error>) -> Self {
        let (tx, ack) = Self::pending();
        tx.resolve(result);
        ack
    }

    /// An ack that already failed.
    pub fn failed(err: Error) -> Self {
        Self::ready(Err(err))
    }
}

impl<T> AckSender<T> {
    /// Resolve the ack. Returns `false` if nobody is waiting anymore.
    pub fn resolve(self, result: Result<T, Error>) -> bool {
        self.tx.send(result).is_ok()
    }
}

impl<T> Future for Ack<T> {
    type Output = Result<T, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::ConnectionClosed)))
    }
}
