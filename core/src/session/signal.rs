//! One-shot close notifications
//!
//! The AMQP client reports dying connections and channels through error
//! callbacks. A [`CloseNotifier`] is handed to that callback; every
//! [`CloseSignal`] cloned from it resolves once the first reason arrives.

use crate::errors::SessionError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub(crate) struct CloseNotifier {
    tx: Arc<watch::Sender<Option<Arc<str>>>>,
}

impl CloseNotifier {
    pub(crate) fn new() -> (Self, CloseSignal) {
        let (tx, rx) = watch::channel(None);
        (Self { tx: Arc::new(tx) }, CloseSignal { rx })
    }

    /// Record the close reason; only the first one sticks
    pub(crate) fn notify(&self, reason: impl Into<Arc<str>>) {
        let reason = reason.into();
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(reason);
            true
        });
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CloseSignal {
    rx: watch::Receiver<Option<Arc<str>>>,
}

impl CloseSignal {
    pub(crate) fn is_closed(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Resolve with the close reason
    pub(crate) async fn closed(&mut self) -> Arc<str> {
        loop {
            let current = self.rx.borrow_and_update().clone();
            if let Some(reason) = current {
                return reason;
            }
            if self.rx.changed().await.is_err() {
                return Arc::from("notifier dropped");
            }
        }
    }
}

/// Run `fut` unless the resource behind `signal` closes first
pub(crate) async fn race<Fut, T>(
    fut: Fut,
    mut signal: CloseSignal,
    on_close: fn(String) -> SessionError,
) -> Result<T, SessionError>
where
    Fut: Future<Output = Result<T, lapin::Error>>,
{
    if let Some(reason) = signal.rx.borrow().clone() {
        return Err(on_close(reason.to_string()));
    }
    tokio::select! {
        result = fut => result.map_err(SessionError::from),
        reason = signal.closed() => Err(on_close(reason.to_string())),
    }
}
