use super::lifecycle::until_done;
use super::{Session, StreamOptions};
use crate::config::SessionConfig;
use crate::errors::SessionError;
use crate::hook::BODY_PREVIEW_LEN;
use async_trait::async_trait;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicCancelOptions, BasicConsumeOptions, BasicQosOptions, QueueBindOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Consumer};
use std::fmt;
use std::future::Future;
use tokio::sync::watch;
use tracing::Level;

/// Prepares a fresh channel for consuming and starts the consumer
///
/// Runs again on every channel the session rebuilds.
#[async_trait]
pub trait StreamInit: Send + Sync {
    async fn init(
        &self,
        channel: &Channel,
        config: &SessionConfig,
        options: &StreamOptions,
    ) -> Result<Consumer, SessionError>;
}

/// Bind, set QoS and consume with broker-side acks
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleConsume;

/// Like [`SingleConsume`] but the handler acks each delivery
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAutoAck;

/// Consume straight away; no bind, no QoS
#[derive(Debug, Clone, Copy, Default)]
pub struct RawStream;

async fn bind_and_qos(
    channel: &Channel,
    config: &SessionConfig,
    options: &StreamOptions,
) -> Result<(), SessionError> {
    if !config.exchange_name.is_empty() {
        channel
            .queue_bind(
                &config.queue_name,
                &config.exchange_name,
                &config.routing_key,
                QueueBindOptions { nowait: config.no_wait },
                FieldTable::default(),
            )
            .await?;
    }

    if options.prefetch_size > 0 {
        tracing::debug!(
            queue = %config.queue_name,
            prefetch_size = options.prefetch_size,
            "prefetch size is not supported by the client, ignoring"
        );
    }
    channel
        .basic_qos(
            options.effective_prefetch_count(),
            BasicQosOptions { global: options.global },
        )
        .await?;
    Ok(())
}

async fn consume(
    channel: &Channel,
    config: &SessionConfig,
    options: &StreamOptions,
    no_ack: bool,
) -> Result<Consumer, SessionError> {
    let consume_options = BasicConsumeOptions {
        no_local: options.no_local,
        no_ack,
        exclusive: options.exclusive,
        nowait: false,
    };
    Ok(channel
        .basic_consume(
            &config.queue_name,
            options.consumer_tag(),
            consume_options,
            options.arguments(),
        )
        .await?)
}

fn require_manual_ack(options: &StreamOptions) -> Result<(), SessionError> {
    if options.auto_ack {
        return Err(SessionError::Config(
            "auto ack must be disabled for manual acknowledgement".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl StreamInit for SingleConsume {
    async fn init(
        &self,
        channel: &Channel,
        config: &SessionConfig,
        options: &StreamOptions,
    ) -> Result<Consumer, SessionError> {
        bind_and_qos(channel, config, options).await?;
        consume(channel, config, options, true).await
    }
}

#[async_trait]
impl StreamInit for NoAutoAck {
    async fn init(
        &self,
        channel: &Channel,
        config: &SessionConfig,
        options: &StreamOptions,
    ) -> Result<Consumer, SessionError> {
        require_manual_ack(options)?;
        bind_and_qos(channel, config, options).await?;
        consume(channel, config, options, false).await
    }
}

#[async_trait]
impl StreamInit for RawStream {
    async fn init(
        &self,
        channel: &Channel,
        config: &SessionConfig,
        options: &StreamOptions,
    ) -> Result<Consumer, SessionError> {
        consume(channel, config, options, options.auto_ack).await
    }
}

/// Next usable channel from the init signal
///
/// With `fresh` set, the currently published channel is skipped: it is the
/// one whose consumer just ended.
async fn next_channel(init: &mut watch::Receiver<Option<Channel>>, fresh: bool) -> Option<Channel> {
    if fresh && init.changed().await.is_err() {
        return None;
    }
    loop {
        let current = init.borrow_and_update().clone();
        if let Some(channel) = current.filter(|channel| channel.status().connected()) {
            return Some(channel);
        }
        if init.changed().await.is_err() {
            return None;
        }
    }
}

/// Why the inner delivery loop stopped
enum Interrupt {
    Done,
    Cancel,
    ChannelGone,
}

impl Session {
    /// Consume the session's queue until the session closes or the stream
    /// is cancelled
    ///
    /// `init` runs on every channel the session (re)builds; its errors end
    /// the stream. Handler errors are logged and consumption continues.
    pub async fn stream<I, F, Fut, E>(
        &self,
        init: &I,
        mut on_msg: F,
        options: StreamOptions,
    ) -> Result<(), SessionError>
    where
        I: StreamInit + ?Sized,
        F: FnMut(Delivery, Channel) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: fmt::Display,
    {
        let inner = &self.inner;
        let tag = match &options.consumer_tag {
            Some(tag) if !tag.is_empty() => tag.clone(),
            _ => inner.next_consumer_tag(),
        };
        let options = options.with_consumer_tag(tag);
        let tag = options.consumer_tag();
        let qos = options.qos_summary();

        let mut cancel = inner.register_stream();
        let mut init_signal = inner.init_signal.subscribe();
        let mut done = inner.done.subscribe();
        let mut fresh = false;

        loop {
            let channel = tokio::select! {
                _ = until_done(&mut done) => return Ok(()),
                _ = &mut cancel => return Ok(()),
                channel = next_channel(&mut init_signal, fresh) => match channel {
                    Some(channel) => channel,
                    None => return Ok(()),
                },
            };
            fresh = true;

            let mut consumer = init.init(&channel, &inner.config, &options).await?;
            inner.emit(Level::INFO, inner.event("stream start").consumer(tag).extra(&qos));

            let interrupt = loop {
                tokio::select! {
                    _ = until_done(&mut done) => break Interrupt::Done,
                    _ = &mut cancel => break Interrupt::Cancel,
                    delivery = consumer.next() => match delivery {
                        Some(Ok(delivery)) => {
                            let content_type = delivery
                                .properties
                                .content_type()
                                .as_ref()
                                .map(|ct| ct.as_str().to_string())
                                .unwrap_or_default();
                            let preview_len = delivery.data.len().min(BODY_PREVIEW_LEN);
                            let preview = delivery.data[..preview_len].to_vec();

                            if let Err(err) = on_msg(delivery, channel.clone()).await {
                                inner.emit(
                                    Level::ERROR,
                                    inner
                                        .event("consume error")
                                        .consumer(tag)
                                        .payload(&content_type, &preview)
                                        .error(&err),
                                );
                            }
                        }
                        Some(Err(err)) => {
                            inner.emit(
                                Level::WARN,
                                inner.event("consume error").consumer(tag).error(&err),
                            );
                            break Interrupt::ChannelGone;
                        }
                        None => break Interrupt::ChannelGone,
                    },
                }
            };

            match interrupt {
                Interrupt::Done => return Ok(()),
                Interrupt::Cancel => {
                    if channel.status().connected()
                        && let Err(err) = channel
                            .basic_cancel(tag, BasicCancelOptions::default())
                            .await
                    {
                        tracing::debug!(session_id = %inner.id, consumer = tag, error = %err, "basic cancel failed");
                    }
                    inner.emit(Level::INFO, inner.event("stream close").consumer(tag));
                    return Ok(());
                }
                Interrupt::ChannelGone => {
                    tracing::debug!(session_id = %inner.id, consumer = tag, "consumer ended, waiting for a new channel");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::testing::RecordingHook;
    use std::sync::Arc;
    use std::time::Duration;

    fn detached() -> Session {
        Session::detached(SessionConfig::new("jobs"), Arc::new(RecordingHook::default()))
    }

    async fn ignore(_: Delivery, _: Channel) -> Result<(), String> {
        Ok(())
    }

    #[test]
    fn test_manual_ack_requires_auto_ack_off() {
        assert!(require_manual_ack(&StreamOptions::default()).is_ok());

        let err = require_manual_ack(&StreamOptions::default().with_auto_ack(true)).unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
    }

    #[tokio::test]
    async fn test_stream_returns_on_close() {
        let session = detached();
        let stream = {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .stream(&SingleConsume, ignore, StreamOptions::default())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        session.close().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), stream)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_stream_returns_on_notify() {
        let session = detached();
        let stream = {
            let session = session.clone();
            tokio::spawn(async move {
                session
                    .stream(&RawStream, ignore, StreamOptions::default().with_consumer_tag("audit"))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        session.notify_stream_close();

        let result = tokio::time::timeout(Duration::from_secs(1), stream)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(!session.inner.is_closed());
    }

    #[tokio::test]
    async fn test_next_channel_ends_with_session() {
        let (tx, mut rx) = watch::channel(None);

        let waiter = tokio::spawn(async move { next_channel(&mut rx, false).await.is_none() });
        tx.send_replace(None);
        drop(tx);

        assert!(waiter.await.unwrap());
    }
}
