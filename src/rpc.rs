//! The RPC client: issues commands and correlates their replies through a
//! private reply queue it owns and lazily declares.

use crate::broker::BrokerAdapter;
use crate::codec;
use crate::error::{ErrorDescription, RpcError};
use crate::envelope::OutboundEnvelope;
use crate::topic::validate_routing_key;
use parking_lot::Mutex;
use rand::RngCore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, OnceCell};
use tracing::warn;

enum Resolution {
    Reply(Vec<u8>),
    Remote(ErrorDescription),
}

type PendingTable = Arc<Mutex<HashMap<String, oneshot::Sender<Resolution>>>>;

/// Issues commands over the bus and awaits their correlated replies.
pub struct RpcClient {
    broker: Arc<dyn BrokerAdapter>,
    default_timeout: Duration,
    pending: PendingTable,
    reply_queue: OnceCell<String>,
}

impl RpcClient {
    pub(crate) fn new(broker: Arc<dyn BrokerAdapter>, default_timeout: Duration) -> Self {
        Self {
            broker,
            default_timeout,
            pending: Arc::new(Mutex::new(HashMap::new())),
            reply_queue: OnceCell::new(),
        }
    }

    /// Sends `request` to `routing_key` as a command and awaits its reply,
    /// using this client's configured default timeout.
    pub async fn call<Req, Rep>(&self, routing_key: &str, request: &Req) -> Result<Rep, RpcError>
    where
        Req: Serialize,
        Rep: DeserializeOwned,
    {
        self.call_with_timeout(routing_key, request, self.default_timeout).await
    }

    /// Like [`RpcClient::call`], but with an explicit timeout.
    pub async fn call_with_timeout<Req, Rep>(
        &self,
        routing_key: &str,
        request: &Req,
        timeout: Duration,
    ) -> Result<Rep, RpcError>
    where
        Req: Serialize,
        Rep: DeserializeOwned,
    {
        validate_routing_key(routing_key).map_err(RpcError::Argument)?;

        let reply_queue = self.ensure_reply_queue().await?;
        let correlation_id = generate_correlation_id();

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(correlation_id.clone(), tx);

        let body = codec::encode(request).map_err(RpcError::Codec)?;
        let envelope = OutboundEnvelope::command_request(routing_key, body, correlation_id.clone(), reply_queue);

        if let Err(err) = self.broker.publish(envelope).await {
            self.pending.lock().remove(&correlation_id);
            return Err(RpcError::Broker(err));
        }

        let outcome = tokio::time::timeout(timeout, rx).await;
        self.pending.lock().remove(&correlation_id);

        match outcome {
            Ok(Ok(Resolution::Reply(body))) => codec::decode(&body).map_err(RpcError::Codec),
            Ok(Ok(Resolution::Remote(description))) => Err(RpcError::Remote(description)),
            Ok(Err(_)) => Err(RpcError::Timeout), // sender dropped without resolving
            Err(_) => Err(RpcError::Timeout),
        }
    }

    async fn ensure_reply_queue(&self) -> Result<String, RpcError> {
        let queue = self
            .reply_queue
            .get_or_try_init(|| async {
                let queue = self.broker.declare_exclusive_queue().await?;
                let pending = self.pending.clone();

                self.broker
                    .consume(
                        &queue,
                        Arc::new(move |message| -> futures::future::BoxFuture<'static, Result<(), ()>> {
                            let pending = pending.clone();
                            Box::pin(async move {
                                handle_reply(&pending, message);
                                Ok(())
                            })
                        }),
                    )
                    .await?;

                Ok::<String, crate::error::BrokerUnavailable>(queue)
            })
            .await
            .map_err(RpcError::Broker)?;

        Ok(queue.clone())
    }
}

fn handle_reply(pending: &PendingTable, message: crate::envelope::InboundMessage) {
    let Some(correlation_id) = &message.correlation_id else {
        warn!("reply message missing a correlation id, discarding");
        return;
    };

    let Some(sender) = pending.lock().remove(correlation_id) else {
        // Already resolved (or timed out); a late reply is a no-op.
        return;
    };

    let resolution = match message.success {
        Some(false) => match codec::decode::<ErrorDescription>(&message.body) {
            Ok(description) => Resolution::Remote(description),
            Err(err) => Resolution::Remote(ErrorDescription::internal_error(err)),
        },
        _ => Resolution::Reply(message.body),
    };

    let _ = sender.send(resolution);
}

fn generate_correlation_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
