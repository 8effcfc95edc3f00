use super::{Message, PublishOptions, Session, SessionInner};
use crate::errors::SessionError;
use lapin::options::BasicPublishOptions;
use lapin::publisher_confirm::{Confirmation, PublisherConfirm};
use tracing::Level;

impl Session {
    /// Publish and wait for the broker's confirm
    ///
    /// A nack publishes the message again; this loop has no upper bound and
    /// is not cancelled by closing the session. Publish errors are returned
    /// as-is without a resend.
    pub async fn push(&self, message: &Message, options: &PublishOptions) -> Result<(), SessionError> {
        if self.inner.config.disable_confirm {
            return Err(SessionError::Config("confirm mode is disable".to_string()));
        }
        self.inner
            .guarded(|| self.inner.publish_confirmed(message, options))
            .await
    }

    /// Publish without confirms; requires `disable_confirm`
    pub async fn unsafe_push(&self, message: &Message, options: &PublishOptions) -> Result<(), SessionError> {
        if !self.inner.config.disable_confirm {
            return Err(SessionError::Config("confirm mode is enable".to_string()));
        }
        self.inner
            .guarded(|| async {
                if !self.inner.is_ready() {
                    return Err(SessionError::NotConnected);
                }
                let result = self.inner.publish_once(message, options).await.map(|_| ());
                self.inner.log_push(message, result.as_ref().err(), 0);
                result
            })
            .await
    }
}

impl SessionInner {
    /// Exchange and routing key for a publish; the default exchange routes
    /// by queue name
    fn route(&self) -> (&str, &str) {
        let config = &self.config;
        if config.exchange_name.is_empty() && config.routing_key.is_empty() {
            ("", config.queue_name.as_str())
        } else {
            (config.exchange_name.as_str(), config.routing_key.as_str())
        }
    }

    async fn guarded<F, Fut>(&self, publish: F) -> Result<(), SessionError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(), SessionError>>,
    {
        let Some(breaker) = self.breaker() else {
            return publish().await;
        };
        if !breaker.ready() {
            return Err(SessionError::BreakerOpen {
                breaker: breaker.name().to_string(),
            });
        }

        let result = publish().await;
        match &result {
            Ok(()) => breaker.success(),
            Err(_) => breaker.fail(),
        }
        result
    }

    async fn publish_once(
        &self,
        message: &Message,
        options: &PublishOptions,
    ) -> Result<PublisherConfirm, SessionError> {
        let (exchange, routing_key) = self.route();
        let publish_options = BasicPublishOptions {
            mandatory: options.mandatory,
            immediate: false,
        };
        let properties = message.properties(options);

        self.channel_do(|channel| async move {
            channel
                .basic_publish(exchange, routing_key, publish_options, &message.body, properties)
                .await
        })
        .await
    }

    async fn publish_confirmed(&self, message: &Message, options: &PublishOptions) -> Result<(), SessionError> {
        let mut nacks = 0;
        let result = loop {
            if !self.is_ready() {
                break Err(SessionError::NotConnected);
            }
            let confirm = match self.publish_once(message, options).await {
                Ok(confirm) => confirm,
                Err(err) => break Err(err),
            };
            match confirm.await {
                Ok(Confirmation::Nack(_)) => {
                    nacks += 1;
                    tracing::debug!(session_id = %self.id, queue = %self.config.queue_name, nacks, "publish nacked, resending");
                }
                Ok(_) => break Ok(()),
                Err(_) => break Err(SessionError::ConfirmChannelClosed),
            }
        };

        self.log_push(message, result.as_ref().err(), nacks);
        result
    }

    /// Report a publish outcome; `nacks` counts resends before it
    fn log_push(&self, message: &Message, error: Option<&SessionError>, nacks: u32) {
        let (exchange, routing_key) = self.route();
        let title = if error.is_some() { "push failure" } else { "push success" };
        let resends = if nacks > 0 { format!("nacks={nacks}") } else { String::new() };
        let event = self
            .event(title)
            .queue(&self.config.queue_name, exchange, routing_key)
            .payload(&message.content_type, &message.body)
            .extra(&resends);
        match error {
            Some(err) => self.emit(Level::WARN, event.error(err)),
            None => self.emit(Level::DEBUG, event),
        }
    }
}
