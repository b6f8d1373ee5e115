//! The wire envelope shared by inbound deliveries and outbound publishes.

/// Discriminates the three kinds of message this crate ever puts on the
/// wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Event,
    CommandRequest,
    CommandReply,
}

impl MessageType {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            MessageType::Event => "event",
            MessageType::CommandRequest => "command-request",
            MessageType::CommandReply => "command-reply",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value {
            "event" => Some(MessageType::Event),
            "command-request" => Some(MessageType::CommandRequest),
            "command-reply" => Some(MessageType::CommandReply),
            _ => None,
        }
    }
}

/// A message ready to be handed to a [`crate::broker::BrokerAdapter`] for
/// publication.
#[derive(Debug, Clone)]
pub struct OutboundEnvelope {
    pub routing_key: String,
    pub body: Vec<u8>,
    pub message_type: MessageType,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub success: Option<bool>,
}

impl OutboundEnvelope {
    pub fn event(routing_key: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            routing_key: routing_key.into(),
            body,
            message_type: MessageType::Event,
            correlation_id: None,
            reply_to: None,
            success: None,
        }
    }

    pub fn command_request(
        routing_key: impl Into<String>,
        body: Vec<u8>,
        correlation_id: impl Into<String>,
        reply_to: impl Into<String>,
    ) -> Self {
        Self {
            routing_key: routing_key.into(),
            body,
            message_type: MessageType::CommandRequest,
            correlation_id: Some(correlation_id.into()),
            reply_to: Some(reply_to.into()),
            success: None,
        }
    }

    pub fn command_reply(
        reply_to: impl Into<String>,
        body: Vec<u8>,
        correlation_id: impl Into<String>,
        success: bool,
    ) -> Self {
        Self {
            routing_key: reply_to.into(),
            body,
            message_type: MessageType::CommandReply,
            correlation_id: Some(correlation_id.into()),
            reply_to: None,
            success: Some(success),
        }
    }
}

/// A message handed up from a [`crate::broker::BrokerAdapter`] to a
/// dispatcher.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub routing_key: String,
    pub body: Vec<u8>,
    pub message_type: Option<MessageType>,
    pub correlation_id: Option<String>,
    pub reply_to: Option<String>,
    pub success: Option<bool>,
}
