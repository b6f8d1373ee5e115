//! The production [`BrokerAdapter`](crate::broker::BrokerAdapter)
//! implementation, backed by `lapin` and a single topic exchange.

mod connector;
mod properties;

pub use connector::Gateway;

use crate::broker::{BrokerAdapter, DeliveryHandler};
use crate::config::BusConfig;
use crate::envelope::{MessageType, OutboundEnvelope};
use crate::error::BrokerUnavailable;
use crate::shutdown;
use async_trait::async_trait;
use connector::Connector;
use futures::StreamExt;
use lapin::ExchangeKind;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicRejectOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use tracing::{error, warn};

/// A [`BrokerAdapter`] backed by a single reconnecting `lapin` connection and
/// one topic exchange.
pub struct LapinBroker {
    gateway: Gateway,
    exchange_name: String,
}

impl LapinBroker {
    pub fn new(config: &BusConfig) -> Self {
        let gateway = Connector::spawn(config.clone());
        Self {
            gateway,
            exchange_name: config.exchange_name.clone(),
        }
    }

    async fn ensure_exchange(&self, channel: &lapin::Channel) -> Result<(), BrokerUnavailable> {
        channel
            .exchange_declare(
                &self.exchange_name,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BrokerAdapter for LapinBroker {
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerUnavailable> {
        let channel = self.gateway.channel().await?;
        self.ensure_exchange(&channel).await?;

        channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        Ok(())
    }

    async fn declare_exclusive_queue(&self) -> Result<String, BrokerUnavailable> {
        let channel = self.gateway.channel().await?;

        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        Ok(queue.name().as_str().to_string())
    }

    async fn bind(&self, queue: &str, pattern: &str) -> Result<(), BrokerUnavailable> {
        let channel = self.gateway.channel().await?;
        self.ensure_exchange(&channel).await?;

        channel
            .queue_bind(
                queue,
                &self.exchange_name,
                pattern,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(())
    }

    async fn consume(&self, queue: &str, handler: DeliveryHandler) -> Result<(), BrokerUnavailable> {
        let channel = self.gateway.channel().await?;

        let mut consumer = channel
            .basic_consume(
                queue,
                &format!("switchboard-{queue}"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let queue = queue.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown::terminated() => break,
                    delivery = consumer.next() => {
                        let Some(delivery) = delivery else { break };

                        let delivery = match delivery {
                            Ok(delivery) => delivery,
                            Err(err) => {
                                warn!(%queue, error = %err, "failed to read delivery");
                                continue;
                            }
                        };

                        let message = properties::parse_delivery(&delivery);
                        let acker = delivery.acker.clone();
                        let outcome = handler(message).await;

                        let ack_result = match outcome {
                            Ok(()) => acker.ack(BasicAckOptions::default()).await,
                            Err(()) => {
                                acker
                                    .reject(BasicRejectOptions { requeue: false })
                                    .await
                            }
                        };

                        if let Err(err) = ack_result {
                            error!(%queue, error = %err, "failed to finalize delivery");
                        }
                    }
                }
            }
        });

        Ok(())
    }

    async fn publish(&self, envelope: OutboundEnvelope) -> Result<(), BrokerUnavailable> {
        let channel = self.gateway.channel().await?;

        let exchange: &str = if matches!(envelope.message_type, MessageType::CommandReply) {
            // Replies are addressed directly to their owning queue via the
            // default exchange, matching its implicit per-queue routing.
            ""
        } else {
            self.ensure_exchange(&channel).await?;
            &self.exchange_name
        };

        let routing_key = envelope.routing_key.clone();
        let properties = properties::build_properties(&envelope);

        channel
            .basic_publish(
                exchange,
                &routing_key,
                BasicPublishOptions::default(),
                &envelope.body,
                properties,
            )
            .await?;

        Ok(())
    }
}
