//! The public facade: [`MessageBusBuilder`] collects handler registrations,
//! [`MessageBus`] wires them to a [`BrokerAdapter`] and owns the
//! [`RpcClient`].

use crate::broker::lapin_adapter::LapinBroker;
use crate::broker::{BrokerAdapter, validate_queue_name};
use crate::codec;
use crate::config::BusConfig;
use crate::dispatch;
use crate::error::{BrokerUnavailable, PublishError, RegistrationError};
use crate::registry::{self, HandlerRegistry, QueueHandlers};
use crate::rpc::RpcClient;
use crate::topic::{Pattern, validate_routing_key};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Collects handler registrations before any broker call is made. Every
/// registration is validated synchronously.
#[derive(Default)]
pub struct MessageBusBuilder {
    registry: HandlerRegistry,
}

impl MessageBusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an event handler on `queue`, matching `pattern`. `queue` may
    /// host any number of event handlers, including several bound to the
    /// same or overlapping patterns.
    pub fn register_event<T, F, Fut>(
        mut self,
        queue: impl Into<String>,
        pattern: impl Into<String>,
        handler: F,
    ) -> Result<Self, RegistrationError>
    where
        T: DeserializeOwned + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let queue = queue.into();
        validate_queue_name(&queue)?;
        let pattern = Pattern::compile(pattern.into())?;

        let invoker = registry::erase_event_handler(handler);
        self.registry.register_event(queue, pattern, invoker)?;

        Ok(self)
    }

    /// Registers a command handler on `queue` for the literal `routing_key`.
    /// `queue` must not already host an event handler, and no other command
    /// handler on `queue` may already own `routing_key`.
    pub fn register_command<T, R, E, F, Fut>(
        mut self,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
        handler: F,
    ) -> Result<Self, RegistrationError>
    where
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: std::fmt::Display + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let queue = queue.into();
        validate_queue_name(&queue)?;
        let routing_key = routing_key.into();
        validate_routing_key(&routing_key)?;

        let invoker = registry::erase_command_handler(handler);
        self.registry.register_command(queue, routing_key, invoker)?;

        Ok(self)
    }

    /// Finalizes registration and wires the handlers to `broker`. Does not
    /// yet declare any queue or start consuming; call
    /// [`MessageBus::start`] for that.
    pub fn build(self, broker: Arc<dyn BrokerAdapter>, rpc_timeout: std::time::Duration) -> MessageBus {
        let registry = Arc::new(self.registry);
        let rpc = Arc::new(RpcClient::new(broker.clone(), rpc_timeout));

        MessageBus { broker, registry, rpc }
    }

    /// Finalizes registration and connects to the broker described by
    /// `config` using the production `lapin`-backed adapter.
    pub fn build_with_config(self, config: &BusConfig) -> MessageBus {
        let broker: Arc<dyn BrokerAdapter> = Arc::new(LapinBroker::new(config));
        self.build(broker, config.rpc_timeout)
    }
}

/// The running bus: declares queues, starts one consumer task per declared
/// queue, and exposes an [`RpcClient`] and an event-publishing API.
pub struct MessageBus {
    broker: Arc<dyn BrokerAdapter>,
    registry: Arc<HandlerRegistry>,
    rpc: Arc<RpcClient>,
}

impl MessageBus {
    /// Declares every registered queue, binds its patterns/routing keys, and
    /// starts a consumer task for it. Idempotent calls are not supported;
    /// call this once after registration.
    pub async fn start(&self) -> Result<(), BrokerUnavailable> {
        for (queue, handlers) in &self.registry.queues {
            self.broker.declare_queue(queue).await?;

            match handlers {
                QueueHandlers::Events(descriptors) => {
                    for descriptor in descriptors {
                        self.broker.bind(queue, descriptor.pattern.as_str()).await?;
                    }
                }
                QueueHandlers::Commands(descriptors) => {
                    for descriptor in descriptors {
                        self.broker.bind(queue, &descriptor.routing_key).await?;
                    }
                }
            }

            let registry = self.registry.clone();
            let broker = self.broker.clone();
            let queue_name = queue.clone();

            self.broker
                .consume(
                    queue,
                    Arc::new(move |message| -> futures::future::BoxFuture<'static, Result<(), ()>> {
                        let registry = registry.clone();
                        let broker = broker.clone();
                        let queue_name = queue_name.clone();
                        Box::pin(async move {
                            match registry.queues.get(&queue_name) {
                                Some(QueueHandlers::Events(descriptors)) => {
                                    dispatch::event::dispatch(&queue_name, descriptors, message).await
                                }
                                Some(QueueHandlers::Commands(descriptors)) => {
                                    dispatch::command::dispatch(&queue_name, descriptors, &broker, message).await
                                }
                                None => Ok(()),
                            }
                        })
                    }),
                )
                .await?;

            info!(queue = %queue, "started consumer");
        }

        Ok(())
    }

    /// Publishes `payload` as an event to `routing_key`.
    pub async fn publish_event<T: Serialize>(&self, routing_key: &str, payload: &T) -> Result<(), PublishError> {
        validate_routing_key(routing_key)?;
        let body = codec::encode(payload)?;
        self.broker
            .publish(crate::envelope::OutboundEnvelope::event(routing_key, body))
            .await?;
        Ok(())
    }

    /// The RPC client for issuing commands against this bus.
    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }
}
