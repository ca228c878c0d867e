//! Single-assignment reply slot shared by competing callbacks.
//!
//! Each identity exchange subscribes to an accepted and a rejected topic;
//! both handlers hold the same [`ReplySlot`]. Whichever reply arrives first
//! resolves the paired [`PendingReply`]. Later attempts are ignored.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::CoreError;

/// Writing half. Cheap to clone; all clones share one slot.
#[derive(Debug)]
pub struct ReplySlot<T> {
    tx: Arc<Mutex<Option<oneshot::Sender<Result<T, CoreError>>>>>,
}

impl<T> Clone for ReplySlot<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

/// Reading half. Resolves with the first value written to the slot.
#[derive(Debug)]
#[must_use = "a PendingReply does nothing unless awaited"]
pub struct PendingReply<T> {
    rx: oneshot::Receiver<Result<T, CoreError>>,
}

impl<T> ReplySlot<T> {
    pub fn new() -> (Self, PendingReply<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            PendingReply { rx },
        )
    }

    /// Resolve the slot. Returns `false` if it was already resolved.
    pub fn complete(&self, result: Result<T, CoreError>) -> bool {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(tx) => {
                // The reader may have given up; the slot is still spent.
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl<T> Future for PendingReply<T> {
    type Output = Result<T, CoreError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(CoreError::Internal("reply slot dropped without a value".into()))
            })
        })
    }
}
