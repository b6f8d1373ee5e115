//! An in-memory [`BrokerAdapter`], used only by this crate's own test suite.
//! Reproduces topic-exchange routing and the direct-to-queue delivery used
//! for command replies, without any network I/O.

use super::{BrokerAdapter, DeliveryHandler, validate_queue_name};
use crate::envelope::{InboundMessage, MessageType, OutboundEnvelope};
use crate::error::BrokerUnavailable;
use crate::topic::Pattern;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Inner {
    bindings: HashMap<String, Vec<Pattern>>,
    handlers: HashMap<String, DeliveryHandler>,
}

/// An in-memory stand-in for a topic-exchange broker.
#[derive(Default, Clone)]
pub struct MemoryBroker {
    inner: Arc<Mutex<Inner>>,
    exclusive_counter: Arc<AtomicU64>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BrokerAdapter for MemoryBroker {
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerUnavailable> {
        self.inner.lock().bindings.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn declare_exclusive_queue(&self) -> Result<String, BrokerUnavailable> {
        let id = self.exclusive_counter.fetch_add(1, Ordering::Relaxed);
        let name = format!("amq.gen-{id}");
        self.inner.lock().bindings.entry(name.clone()).or_default();
        Ok(name)
    }

    async fn bind(&self, queue: &str, pattern: &str) -> Result<(), BrokerUnavailable> {
        let compiled =
            Pattern::compile(pattern).map_err(|_| BrokerUnavailable::ChannelClosed)?;
        self.inner
            .lock()
            .bindings
            .entry(queue.to_string())
            .or_default()
            .push(compiled);
        Ok(())
    }

    async fn consume(&self, queue: &str, handler: DeliveryHandler) -> Result<(), BrokerUnavailable> {
        validate_queue_name(queue).map_err(|_| BrokerUnavailable::ChannelClosed)?;
        self.inner.lock().handlers.insert(queue.to_string(), handler);
        Ok(())
    }

    async fn publish(&self, envelope: OutboundEnvelope) -> Result<(), BrokerUnavailable> {
        let message = InboundMessage {
            routing_key: envelope.routing_key.clone(),
            body: envelope.body,
            message_type: Some(envelope.message_type),
            correlation_id: envelope.correlation_id,
            reply_to: envelope.reply_to,
            success: envelope.success,
        };

        let targets: Vec<DeliveryHandler> = {
            let inner = self.inner.lock();

            if matches!(message.message_type, Some(MessageType::CommandReply)) {
                // Replies are addressed directly to their owning queue, like
                // the default exchange's implicit per-queue routing.
                inner.handlers.get(&envelope.routing_key).cloned().into_iter().collect()
            } else {
                inner
                    .bindings
                    .iter()
                    .filter(|(_, patterns)| patterns.iter().any(|p| p.matches(&message.routing_key)))
                    .filter_map(|(queue, _)| inner.handlers.get(queue).cloned())
                    .collect()
            }
        };

        for handler in targets {
            let message = message.clone();
            tokio::spawn(async move {
                let _ = handler(message).await;
            });
        }

        Ok(())
    }
}
