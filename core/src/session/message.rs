use crate::config::{FieldValue, field_table};
use lapin::BasicProperties;
use lapin::types::{FieldTable, ShortString};
use std::collections::BTreeMap;

const PERSISTENT: u8 = 2;

/// Outgoing message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub body: Vec<u8>,
    pub content_type: String,
    pub headers: BTreeMap<String, FieldValue>,
}

impl Message {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub(crate) fn properties(&self, options: &PublishOptions) -> BasicProperties {
        let mut properties = BasicProperties::default();
        if !self.content_type.is_empty() {
            properties = properties.with_content_type(ShortString::from(self.content_type.as_str()));
        }
        if !self.headers.is_empty() {
            properties = properties.with_headers(field_table(&self.headers));
        }
        if options.persistent {
            properties = properties.with_delivery_mode(PERSISTENT);
        }
        properties
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Ask the broker to return unroutable messages
    pub mandatory: bool,
    /// Delivery mode 2
    pub persistent: bool,
}

impl PublishOptions {
    pub fn persistent() -> Self {
        Self {
            persistent: true,
            ..Default::default()
        }
    }
}

/// Consumer settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamOptions {
    /// Generated when unset
    pub consumer_tag: Option<String>,
    pub auto_ack: bool,
    pub exclusive: bool,
    pub no_local: bool,
    /// 0 means 1
    pub prefetch_count: u16,
    /// Carried for logging; the AMQP client has no prefetch-size knob
    pub prefetch_size: u32,
    pub global: bool,
    pub args: BTreeMap<String, FieldValue>,
}

impl StreamOptions {
    pub fn with_consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = Some(tag.into());
        self
    }

    pub fn with_auto_ack(mut self, auto_ack: bool) -> Self {
        self.auto_ack = auto_ack;
        self
    }

    pub fn with_prefetch_count(mut self, count: u16) -> Self {
        self.prefetch_count = count;
        self
    }

    pub fn effective_prefetch_count(&self) -> u16 {
        self.prefetch_count.max(1)
    }

    /// QoS settings as reported on stream events
    pub fn qos_summary(&self) -> String {
        format!(
            "prefetch_count={} prefetch_size={} global={}",
            self.effective_prefetch_count(),
            self.prefetch_size,
            self.global
        )
    }

    pub fn consumer_tag(&self) -> &str {
        self.consumer_tag.as_deref().unwrap_or_default()
    }

    pub fn arguments(&self) -> FieldTable {
        field_table(&self.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapin::types::AMQPValue;

    #[test]
    fn test_properties() {
        let message = Message::new("hello")
            .with_content_type("text/plain")
            .with_header("attempt", 3i64);

        let properties = message.properties(&PublishOptions::persistent());

        assert_eq!(
            properties.content_type().as_ref().map(|c| c.as_str()),
            Some("text/plain")
        );
        assert_eq!(*properties.delivery_mode(), Some(2));
        let headers = properties.headers().as_ref().unwrap();
        assert_eq!(
            headers.inner().get(&ShortString::from("attempt")),
            Some(&AMQPValue::LongLongInt(3))
        );
    }

    #[test]
    fn test_transient_by_default() {
        let properties = Message::new("x").properties(&PublishOptions::default());

        assert_eq!(*properties.delivery_mode(), None);
        assert!(properties.content_type().is_none());
    }

    #[test]
    fn test_prefetch_floor() {
        assert_eq!(StreamOptions::default().effective_prefetch_count(), 1);
        assert_eq!(
            StreamOptions::default()
                .with_prefetch_count(16)
                .effective_prefetch_count(),
            16
        );
    }

    #[test]
    fn test_qos_summary_reports_effective_values() {
        let options = StreamOptions {
            prefetch_size: 4096,
            ..Default::default()
        };
        assert_eq!(options.qos_summary(), "prefetch_count=1 prefetch_size=4096 global=false");
    }
}
