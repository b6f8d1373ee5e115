//! Events and commands over a topic exchange.
//!
//! This crate layers two messaging patterns over an AMQP-style topic
//! exchange: one-way **events**, dispatched to every handler whose pattern
//! matches a routing key, and correlated **commands**, dispatched to exactly
//! one handler and replied to over a private reply queue.
//!
//! Handlers are declared through [`MessageBusBuilder`]:
//!
//! ```no_run
//! # use switchboard::{MessageBusBuilder, BusConfig};
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BusConfig::load(None)?;
//!
//! let bus = MessageBusBuilder::new()
//!     .register_event("notifications", "orders.#", |_: serde_json::Value| async {})?
//!     .register_command("accounts", "accounts.create", |_: serde_json::Value| async {
//!         Ok::<_, String>(serde_json::json!({ "id": 1 }))
//!     })?
//!     .build_with_config(&config);
//!
//! bus.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod bus;
pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod rpc;
pub mod shutdown;
pub mod topic;

mod dispatch;

pub use broker::BrokerAdapter;
pub use bus::{MessageBus, MessageBusBuilder};
pub use config::BusConfig;
pub use envelope::{InboundMessage, MessageType, OutboundEnvelope};
pub use error::{
    BrokerUnavailable, CodecError, ErrorDescription, HandlerRegistrationError, InvalidArgument,
    InvalidConfiguration, PublishError, RegistrationError, RpcError,
};
pub use registry::HandlerRegistry;
pub use rpc::RpcClient;
pub use topic::Pattern;
