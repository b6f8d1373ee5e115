//! Translates between this crate's [`OutboundEnvelope`]/[`InboundMessage`]
//! and lapin's `AMQPProperties`/`BasicProperties`.

use crate::codec::CONTENT_TYPE;
use crate::envelope::{InboundMessage, MessageType, OutboundEnvelope};
use lapin::message::Delivery;
use lapin::protocol::basic::AMQPProperties;
use lapin::types::{AMQPValue, FieldTable, ShortString};

const HEADER_SUCCESS: &str = "success";

pub(crate) fn build_properties(envelope: &OutboundEnvelope) -> AMQPProperties {
    let mut properties = AMQPProperties::default()
        .with_content_type(ShortString::from(CONTENT_TYPE))
        .with_type(ShortString::from(envelope.message_type.as_str()));

    if let Some(correlation_id) = &envelope.correlation_id {
        properties = properties.with_correlation_id(ShortString::from(correlation_id.as_str()));
    }

    if let Some(reply_to) = &envelope.reply_to {
        properties = properties.with_reply_to(ShortString::from(reply_to.as_str()));
    }

    if let Some(success) = envelope.success {
        let mut headers = FieldTable::default();
        headers.insert(HEADER_SUCCESS.into(), AMQPValue::Boolean(success));
        properties = properties.with_headers(headers);
    }

    properties
}

pub(crate) fn parse_delivery(delivery: &Delivery) -> InboundMessage {
    let properties = &delivery.properties;

    let message_type = properties
        .kind()
        .as_ref()
        .and_then(|kind| MessageType::parse(kind.as_str()));

    let correlation_id = properties
        .correlation_id()
        .as_ref()
        .map(|id| id.as_str().to_string());

    let reply_to = properties
        .reply_to()
        .as_ref()
        .map(|reply_to| reply_to.as_str().to_string());

    let success = properties.headers().as_ref().and_then(|headers| {
        headers.inner().get(HEADER_SUCCESS).and_then(|value| match value {
            AMQPValue::Boolean(value) => Some(*value),
            _ => None,
        })
    });

    InboundMessage {
        routing_key: delivery.routing_key.as_str().to_string(),
        body: delivery.data.clone(),
        message_type,
        correlation_id,
        reply_to,
        success,
    }
}
