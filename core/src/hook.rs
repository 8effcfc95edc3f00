//! Structured session events and the hook that receives them
//!
//! Sessions describe every lifecycle step, publish and consume outcome as a
//! [`LogEvent`] and hand it to a [`LogHook`]. The default [`TracingHook`]
//! turns them into `tracing` events; applications can plug in their own hook
//! to forward events elsewhere.

use std::fmt;
use tracing::Level;
use uuid::Uuid;

/// Bodies are cut to this many bytes in log output
pub const BODY_PREVIEW_LEN: usize = 256;

/// One session event
#[derive(Clone, Copy)]
pub struct LogEvent<'a> {
    pub title: &'static str,
    pub session_id: Uuid,
    pub queue_name: &'a str,
    pub exchange_name: &'a str,
    pub routing_key: &'a str,
    pub consumer_name: &'a str,
    pub content_type: &'a str,
    pub body: &'a [u8],
    pub extra: &'a str,
    pub error: Option<&'a dyn fmt::Display>,
}

impl<'a> LogEvent<'a> {
    pub fn new(title: &'static str, session_id: Uuid) -> Self {
        Self {
            title,
            session_id,
            queue_name: "",
            exchange_name: "",
            routing_key: "",
            consumer_name: "",
            content_type: "",
            body: &[],
            extra: "",
            error: None,
        }
    }

    pub fn queue(mut self, queue_name: &'a str, exchange_name: &'a str, routing_key: &'a str) -> Self {
        self.queue_name = queue_name;
        self.exchange_name = exchange_name;
        self.routing_key = routing_key;
        self
    }

    pub fn consumer(mut self, consumer_name: &'a str) -> Self {
        self.consumer_name = consumer_name;
        self
    }

    pub fn payload(mut self, content_type: &'a str, body: &'a [u8]) -> Self {
        self.content_type = content_type;
        self.body = body;
        self
    }

    pub fn extra(mut self, extra: &'a str) -> Self {
        self.extra = extra;
        self
    }

    pub fn error(mut self, error: &'a dyn fmt::Display) -> Self {
        self.error = Some(error);
        self
    }

    /// Body cut to [`BODY_PREVIEW_LEN`] bytes, lossily decoded
    pub fn body_preview(&self) -> String {
        let end = self.body.len().min(BODY_PREVIEW_LEN);
        String::from_utf8_lossy(&self.body[..end]).into_owned()
    }
}

impl fmt::Debug for LogEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEvent")
            .field("title", &self.title)
            .field("session_id", &self.session_id)
            .field("queue_name", &self.queue_name)
            .field("consumer_name", &self.consumer_name)
            .field("body_len", &self.body.len())
            .field("error", &self.error.map(|e| e.to_string()))
            .finish()
    }
}

/// Receiver of session events. Must not block.
pub trait LogHook: Send + Sync + fmt::Debug {
    fn emit(&self, level: Level, event: &LogEvent<'_>);
}

/// Emits events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHook;

macro_rules! emit_at {
    ($level:expr, $event:expr) => {{
        let event = $event;
        let error = event.error.map(|e| e.to_string()).unwrap_or_default();
        let body = event.body_preview();
        match $level {
            Level::ERROR => tracing::error!(
                session_id = %event.session_id, queue = event.queue_name,
                exchange = event.exchange_name, routing_key = event.routing_key,
                consumer = event.consumer_name, content_type = event.content_type,
                body = %body, extra = event.extra, error = %error, "{}", event.title
            ),
            Level::WARN => tracing::warn!(
                session_id = %event.session_id, queue = event.queue_name,
                exchange = event.exchange_name, routing_key = event.routing_key,
                consumer = event.consumer_name, content_type = event.content_type,
                body = %body, extra = event.extra, error = %error, "{}", event.title
            ),
            Level::INFO => tracing::info!(
                session_id = %event.session_id, queue = event.queue_name,
                exchange = event.exchange_name, routing_key = event.routing_key,
                consumer = event.consumer_name, content_type = event.content_type,
                body = %body, extra = event.extra, error = %error, "{}", event.title
            ),
            Level::DEBUG => tracing::debug!(
                session_id = %event.session_id, queue = event.queue_name,
                exchange = event.exchange_name, routing_key = event.routing_key,
                consumer = event.consumer_name, content_type = event.content_type,
                body = %body, extra = event.extra, error = %error, "{}", event.title
            ),
            _ => tracing::trace!(
                session_id = %event.session_id, queue = event.queue_name,
                exchange = event.exchange_name, routing_key = event.routing_key,
                consumer = event.consumer_name, content_type = event.content_type,
                body = %body, extra = event.extra, error = %error, "{}", event.title
            ),
        }
    }};
}

impl LogHook for TracingHook {
    fn emit(&self, level: Level, event: &LogEvent<'_>) {
        emit_at!(level, event);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Records what each event carried, for assertions
    #[derive(Debug, Clone, PartialEq)]
    pub struct Recorded {
        pub level: Level,
        pub title: String,
        pub consumer: String,
        pub extra: String,
        pub error: Option<String>,
    }

    #[derive(Debug, Default)]
    pub struct RecordingHook {
        pub events: Mutex<Vec<Recorded>>,
    }

    impl RecordingHook {
        pub fn titles(&self) -> Vec<String> {
            self.events.lock().iter().map(|e| e.title.clone()).collect()
        }

        /// First event with `title`
        pub fn find(&self, title: &str) -> Option<Recorded> {
            self.events.lock().iter().find(|e| e.title == title).cloned()
        }
    }

    impl LogHook for RecordingHook {
        fn emit(&self, level: Level, event: &LogEvent<'_>) {
            self.events.lock().push(Recorded {
                level,
                title: event.title.to_string(),
                consumer: event.consumer_name.to_string(),
                extra: event.extra.to_string(),
                error: event.error.map(|e| e.to_string()),
            });
        }
    }
}
