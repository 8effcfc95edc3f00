//! Session supervisor
//!
//! One task per session drives the connection and channel through the
//! lifecycle machine below. It never surfaces transient failures: a lost
//! connection goes back to connecting, a lost channel back to initializing,
//! until the session is closed.

use super::SessionInner;
use state_machines::state_machine;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::Level;

/// Shared with the session: set once `close()` has been called
#[derive(Debug, Clone, Default)]
pub struct LifecycleContext {
    pub closed: Arc<AtomicBool>,
}

state_machine! {
    name: Lifecycle,
    context: LifecycleContext,
    dynamic: true,

    initial: Connecting,
    states: [
        Connecting,
        BackoffReconnect,
        Init,
        BackoffReInit,
        Ready,
        Done,
    ],
    events {
        connected {
            guards: [running],
            transition: { from: Connecting, to: Init }
        }
        connect_failed {
            guards: [running],
            transition: { from: Connecting, to: BackoffReconnect }
        }
        retry_connect {
            guards: [running],
            transition: { from: BackoffReconnect, to: Connecting }
        }
        initialized {
            guards: [running],
            transition: { from: Init, to: Ready }
        }
        init_failed {
            guards: [running],
            transition: { from: Init, to: BackoffReInit }
        }
        retry_init {
            guards: [running],
            transition: { from: BackoffReInit, to: Init }
        }
        channel_lost {
            guards: [running],
            transition: { from: Ready, to: Init }
        }
        connection_lost {
            guards: [running],
            transition: { from: [Ready, BackoffReInit], to: Connecting }
        }
        shutdown {
            guards: [closing],
            transition: { from: [Connecting, BackoffReconnect, Init, BackoffReInit, Ready], to: Done }
        }
    }
}

// Guards for dynamic mode - implemented on typestate machines
macro_rules! lifecycle_guards {
    ($($state:ident),+ $(,)?) => {
        $(
            impl Lifecycle<$state> {
                fn running(&self, ctx: &LifecycleContext) -> bool {
                    !ctx.closed.load(Ordering::Acquire)
                }

                fn closing(&self, ctx: &LifecycleContext) -> bool {
                    ctx.closed.load(Ordering::Acquire)
                }
            }
        )+
    };
}

lifecycle_guards!(Connecting, BackoffReconnect, Init, BackoffReInit, Ready);

/// Dynamic machine plus the session's published state name
struct Tracker {
    machine: DynamicLifecycle,
    inner: Arc<SessionInner>,
}

impl Tracker {
    fn new(inner: Arc<SessionInner>) -> Self {
        let machine = DynamicLifecycle::new(LifecycleContext {
            closed: inner.closed.clone(),
        });
        inner.set_state(machine.current_state());
        Self { machine, inner }
    }

    fn fire(&mut self, event: LifecycleEvent) {
        let from = self.machine.current_state();
        if self.machine.handle(event).is_err() {
            tracing::debug!(session_id = %self.inner.id, from, "lifecycle event refused");
            return;
        }
        let to = self.machine.current_state();
        tracing::debug!(session_id = %self.inner.id, from, to, "lifecycle transition");
        self.inner.set_state(to);
    }
}

/// Resolve once the session is done
pub(crate) async fn until_done(done: &mut watch::Receiver<bool>) {
    let _ = done.wait_for(|done| *done).await;
}

/// Sleep for `delay` unless the session finishes first; false if it did
async fn pause(done: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = until_done(done) => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

pub(crate) async fn supervise(inner: Arc<SessionInner>) {
    let mut done = inner.done.subscribe();
    let mut lifecycle = Tracker::new(inner.clone());

    'connect: loop {
        if inner.is_closed() {
            break;
        }

        inner.log(Level::INFO, "start connect", None);
        let mut connection_closed = match inner.connect().await {
            Ok(signal) => {
                inner.log(Level::INFO, "connect ok", None);
                lifecycle.fire(LifecycleEvent::Connected);
                signal
            }
            Err(err) => {
                inner.log(Level::WARN, "connect failure", Some(&err));
                lifecycle.fire(LifecycleEvent::ConnectFailed);
                if !pause(&mut done, inner.config.reconnect_delay()).await {
                    break;
                }
                lifecycle.fire(LifecycleEvent::RetryConnect);
                continue;
            }
        };

        loop {
            inner.log(Level::INFO, "start init", None);
            match inner.init_channel().await {
                Ok(mut channel_closed) => {
                    inner.log(Level::INFO, "init ok", None);
                    lifecycle.fire(LifecycleEvent::Initialized);

                    tokio::select! {
                        _ = until_done(&mut done) => break 'connect,
                        reason = connection_closed.closed() => {
                            inner.lose_connection();
                            inner.log(Level::WARN, "connection closed", Some(&reason));
                            lifecycle.fire(LifecycleEvent::ConnectionLost);
                            continue 'connect;
                        }
                        reason = channel_closed.closed() => {
                            inner.lose_channel();
                            inner.log(Level::WARN, "channel closed", Some(&reason));
                            lifecycle.fire(LifecycleEvent::ChannelLost);
                        }
                    }
                }
                Err(err) => {
                    inner.lose_channel();
                    inner.log(Level::WARN, "init failure", Some(&err));
                    lifecycle.fire(LifecycleEvent::InitFailed);

                    if connection_closed.is_closed() {
                        inner.lose_connection();
                        lifecycle.fire(LifecycleEvent::ConnectionLost);
                        continue 'connect;
                    }

                    tokio::select! {
                        _ = until_done(&mut done) => break 'connect,
                        reason = connection_closed.closed() => {
                            inner.lose_connection();
                            inner.log(Level::WARN, "connection closed", Some(&reason));
                            lifecycle.fire(LifecycleEvent::ConnectionLost);
                            continue 'connect;
                        }
                        _ = tokio::time::sleep(inner.config.re_init_delay()) => {
                            lifecycle.fire(LifecycleEvent::RetryInit);
                        }
                    }
                }
            }
        }
    }

    lifecycle.fire(LifecycleEvent::Shutdown);
    if let Err(err) = inner.teardown().await {
        tracing::debug!(session_id = %inner.id, error = %err, "teardown failed");
    }
    tracing::debug!(session_id = %inner.id, "supervisor stopped");
}
