use thiserror::Error;

/// Errors raised synchronously by public operations when a caller-supplied
/// argument violates a documented constraint.
#[derive(Debug, Error)]
pub enum InvalidArgument {
    #[error("queue name must be non-empty and non-whitespace, got {0:?}")]
    QueueName(String),

    #[error("routing key must be non-empty, got {0:?}")]
    RoutingKey(String),

    #[error("topic pattern must be non-empty, got {0:?}")]
    Pattern(String),

    #[error("publish payload must not be empty")]
    EmptyPayload,
}

/// Errors raised while assembling configuration.
#[derive(Debug, Error)]
pub enum InvalidConfiguration {
    #[error("missing required configuration field `{0}`")]
    Missing(&'static str),

    #[error("configuration field `{field}` is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Source(#[from] config::ConfigError),
}

/// A failure to reach, or to keep talking to, the broker.
#[derive(Debug, Error)]
pub enum BrokerUnavailable {
    #[error("broker connection failed: {0}")]
    Connection(#[from] lapin::Error),

    #[error("broker channel was closed before the operation completed")]
    ChannelClosed,
}

/// Raised when the [`crate::registry::HandlerRegistry`] rejects a registration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerRegistrationError {
    #[error("queue `{queue}` already hosts {existing} handlers and cannot also host {attempted} handlers")]
    MixedKinds {
        queue: String,
        existing: &'static str,
        attempted: &'static str,
    },

    #[error("queue `{queue}` already has a command handler bound to routing key `{routing_key}`")]
    DuplicateCommandRoute { queue: String, routing_key: String },
}

/// Raised when an inbound or outbound payload cannot be encoded or decoded.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to decode payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),
}

/// The structured description that crosses the wire when a command handler
/// fails. Only `kind` and `message` are ever transmitted; the original error's
/// full detail stays local and is only logged.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorDescription {
    pub kind: String,
    pub message: String,
}

impl ErrorDescription {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub(crate) fn internal_error(detail: impl std::fmt::Display) -> Self {
        Self::new("InternalError", detail.to_string())
    }

    pub(crate) fn unknown_command(routing_key: &str) -> Self {
        Self::new("UnknownCommand", format!("no handler bound to `{routing_key}`"))
    }

    pub(crate) fn bad_payload(detail: impl std::fmt::Display) -> Self {
        Self::new("BadPayload", detail.to_string())
    }

    pub(crate) fn malformed_command(detail: impl std::fmt::Display) -> Self {
        Self::new("MalformedCommand", detail.to_string())
    }
}

/// Raised by [`crate::bus::MessageBusBuilder`] registration methods, which
/// can fail either on a malformed argument or on a registry conflict.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Argument(#[from] InvalidArgument),

    #[error(transparent)]
    Registry(#[from] HandlerRegistrationError),
}

/// Errors surfaced by [`crate::bus::MessageBus::publish_event`].
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("invalid argument: {0}")]
    Argument(#[from] InvalidArgument),

    #[error("failed to encode payload: {0}")]
    Codec(#[from] CodecError),

    #[error("broker unavailable while publishing: {0}")]
    Broker(#[from] BrokerUnavailable),
}

/// Errors surfaced to an [`crate::rpc::RpcClient`] caller.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("remote command failed: {0:?}")]
    Remote(ErrorDescription),

    #[error("no reply received within the configured timeout")]
    Timeout,

    #[error("failed to encode or decode RPC payload: {0}")]
    Codec(#[from] CodecError),

    #[error("broker unavailable while issuing RPC call: {0}")]
    Broker(#[from] BrokerUnavailable),

    #[error("invalid argument: {0}")]
    Argument(#[from] InvalidArgument),
}
