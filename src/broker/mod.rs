//! The broker boundary. [`BrokerAdapter`] is the trait every transport must
//! satisfy; [`lapin_adapter`] is the sole production implementation and
//! [`memory`] is an in-memory implementation used only by this crate's own
//! test suite.

pub mod lapin_adapter;
pub mod memory;

use crate::envelope::{InboundMessage, OutboundEnvelope};
use crate::error::{BrokerUnavailable, InvalidArgument};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Invoked once per delivery on a consumed queue. Implementations hand the
/// decoded [`InboundMessage`] to a dispatcher and return whether it should be
/// acknowledged; a `Ok(())` acks, an `Err` nacks without requeue.
pub type DeliveryHandler = Arc<dyn Fn(InboundMessage) -> BoxFuture<'static, Result<(), ()>> + Send + Sync>;

/// The transport contract the dispatch and RPC engine is built against.
///
/// Every operation validates its own arguments and returns
/// [`InvalidArgument`] synchronously on misuse, before any broker call is
/// attempted.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Declares a durable queue if it does not already exist. Idempotent.
    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerUnavailable>;

    /// Declares an exclusive, auto-delete queue with a broker-generated name
    /// and returns that name. Used by the RPC client for its reply queue.
    async fn declare_exclusive_queue(&self) -> Result<String, BrokerUnavailable>;

    /// Binds `queue` to the configured topic exchange under `pattern`.
    /// Multiple binds to the same queue accumulate.
    async fn bind(&self, queue: &str, pattern: &str) -> Result<(), BrokerUnavailable>;

    /// Begins consuming `queue`, invoking `handler` for each delivery. Runs
    /// until the crate-global shutdown signal fires.
    async fn consume(&self, queue: &str, handler: DeliveryHandler) -> Result<(), BrokerUnavailable>;

    /// Publishes `envelope` to the configured topic exchange. Does not wait
    /// for a broker confirm.
    async fn publish(&self, envelope: OutboundEnvelope) -> Result<(), BrokerUnavailable>;
}

pub(crate) fn validate_queue_name(queue: &str) -> Result<(), InvalidArgument> {
    if queue.trim().is_empty() {
        return Err(InvalidArgument::QueueName(queue.to_string()));
    }
    Ok(())
}
