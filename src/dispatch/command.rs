//! Command-queue dispatch: routes a request to its unique handler, awaits
//! the result, and always publishes a correlated reply before acking.

use crate::broker::BrokerAdapter;
use crate::codec;
use crate::envelope::{InboundMessage, MessageType, OutboundEnvelope};
use crate::error::ErrorDescription;
use crate::registry::CommandDescriptor;
use std::sync::Arc;
use tracing::{error, warn};

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

pub(crate) async fn dispatch(
    queue: &str,
    descriptors: &[CommandDescriptor],
    broker: &Arc<dyn BrokerAdapter>,
    message: InboundMessage,
) -> Result<(), ()> {
    let is_well_formed = matches!(message.message_type, Some(MessageType::CommandRequest))
        && non_empty(&message.correlation_id).is_some()
        && non_empty(&message.reply_to).is_some();

    if !is_well_formed {
        let Some(reply_to) = non_empty(&message.reply_to).map(str::to_string) else {
            warn!(%queue, "dropping malformed command request without a usable reply-to queue");
            return Ok(());
        };

        warn!(
            %queue,
            routing_key = %message.routing_key,
            message_type = ?message.message_type,
            "dropping malformed command request"
        );

        let description = ErrorDescription::malformed_command(format!(
            "expected a command-request with a non-empty correlation id and reply-to, got routing key `{}`",
            message.routing_key
        ));
        let body = codec::encode(&description)
            .unwrap_or_else(|_| br#"{"kind":"MalformedCommand","message":"failed to encode error"}"#.to_vec());

        let correlation_id = message.correlation_id.clone().unwrap_or_default();
        let reply = OutboundEnvelope::command_reply(reply_to, body, correlation_id, false);

        if let Err(err) = broker.publish(reply).await {
            error!(%queue, error = %err, "failed to publish malformed command reply");
        }

        return Ok(());
    }

    let correlation_id = message.correlation_id.clone().expect("checked well-formed above");
    let reply_to = message.reply_to.clone().expect("checked well-formed above");

    let outcome = match descriptors.iter().find(|d| d.routing_key == message.routing_key) {
        None => {
            warn!(%queue, routing_key = %message.routing_key, "no command handler bound to this routing key");
            Err(ErrorDescription::unknown_command(&message.routing_key))
        }
        Some(descriptor) => (descriptor.invoke)(message.body).await,
    };

    let (body, success) = match outcome {
        Ok(body) => (body, true),
        Err(description) => {
            error!(
                %queue,
                routing_key = %message.routing_key,
                %correlation_id,
                kind = %description.kind,
                detail = %description.message,
                alert = true,
                "command handler returned an error"
            );
            match codec::encode(&description) {
                Ok(body) => (body, false),
                Err(_) => (br#"{"kind":"InternalError","message":"failed to encode error"}"#.to_vec(), false),
            }
        }
    };

    let reply = OutboundEnvelope::command_reply(reply_to, body, correlation_id, success);

    if let Err(err) = broker.publish(reply).await {
        error!(%queue, error = %err, "failed to publish command reply");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::registry::erase_command_handler;

    #[tokio::test]
    async fn unmatched_routing_key_replies_with_unknown_command() {
        let broker: Arc<dyn BrokerAdapter> = Arc::new(MemoryBroker::new());
        let descriptors = vec![CommandDescriptor {
            routing_key: "billing.charge".into(),
            invoke: erase_command_handler(|_: ()| async { Ok::<(), String>(()) }),
        }];

        let reply_queue = broker.declare_exclusive_queue().await.unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        broker
            .consume(
                &reply_queue,
                std::sync::Arc::new(move |message: InboundMessage| -> futures::future::BoxFuture<'static, Result<(), ()>> {
                    let tx = tx.clone();
                    Box::pin(async move {
                        tx.send(message).unwrap();
                        Ok(())
                    })
                }),
            )
            .await
            .unwrap();

        let message = InboundMessage {
            routing_key: "billing.refund".into(),
            body: b"null".to_vec(),
            message_type: Some(crate::envelope::MessageType::CommandRequest),
            correlation_id: Some("corr-1".into()),
            reply_to: Some(reply_queue),
            success: None,
        };

        dispatch("billing", &descriptors, &broker, message).await.unwrap();

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.success, Some(false));
        let description: crate::error::ErrorDescription = crate::codec::decode(&reply.body).unwrap();
        assert_eq!(description.kind, "UnknownCommand");
    }

    #[tokio::test]
    async fn missing_correlation_id_replies_with_malformed_command() {
        let broker: Arc<dyn BrokerAdapter> = Arc::new(MemoryBroker::new());
        let descriptors = vec![CommandDescriptor {
            routing_key: "billing.charge".into(),
            invoke: erase_command_handler(|_: ()| async { Ok::<(), String>(()) }),
        }];

        let reply_queue = broker.declare_exclusive_queue().await.unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        broker
            .consume(
                &reply_queue,
                std::sync::Arc::new(move |message: InboundMessage| -> futures::future::BoxFuture<'static, Result<(), ()>> {
                    let tx = tx.clone();
                    Box::pin(async move {
                        tx.send(message).unwrap();
                        Ok(())
                    })
                }),
            )
            .await
            .unwrap();

        let message = InboundMessage {
            routing_key: "billing.charge".into(),
            body: b"null".to_vec(),
            message_type: Some(crate::envelope::MessageType::CommandRequest),
            correlation_id: None,
            reply_to: Some(reply_queue),
            success: None,
        };

        dispatch("billing", &descriptors, &broker, message).await.unwrap();

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.success, Some(false));
        let description: crate::error::ErrorDescription = crate::codec::decode(&reply.body).unwrap();
        assert_eq!(description.kind, "MalformedCommand");
    }

    #[tokio::test]
    async fn wrong_message_type_replies_with_malformed_command() {
        let broker: Arc<dyn BrokerAdapter> = Arc::new(MemoryBroker::new());
        let descriptors = vec![CommandDescriptor {
            routing_key: "billing.charge".into(),
            invoke: erase_command_handler(|_: ()| async { Ok::<(), String>(()) }),
        }];

        let reply_queue = broker.declare_exclusive_queue().await.unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        broker
            .consume(
                &reply_queue,
                std::sync::Arc::new(move |message: InboundMessage| -> futures::future::BoxFuture<'static, Result<(), ()>> {
                    let tx = tx.clone();
                    Box::pin(async move {
                        tx.send(message).unwrap();
                        Ok(())
                    })
                }),
            )
            .await
            .unwrap();

        let message = InboundMessage {
            routing_key: "billing.charge".into(),
            body: b"null".to_vec(),
            message_type: Some(crate::envelope::MessageType::Event),
            correlation_id: Some("corr-1".into()),
            reply_to: Some(reply_queue),
            success: None,
        };

        dispatch("billing", &descriptors, &broker, message).await.unwrap();

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.success, Some(false));
        let description: crate::error::ErrorDescription = crate::codec::decode(&reply.body).unwrap();
        assert_eq!(description.kind, "MalformedCommand");
    }
}
