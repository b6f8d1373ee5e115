//! Event-queue dispatch: every matching handler on a queue fires for each
//! delivery, concurrently with each other; a decode or handler failure in
//! one handler never prevents the others from running.

use crate::envelope::InboundMessage;
use crate::registry::EventDescriptor;
use futures::future::join_all;
use tracing::{error, warn};

pub(crate) async fn dispatch(queue: &str, descriptors: &[EventDescriptor], message: InboundMessage) -> Result<(), ()> {
    let matched: Vec<_> = descriptors
        .iter()
        .filter(|descriptor| descriptor.pattern.matches(&message.routing_key))
        .collect();

    if matched.is_empty() {
        warn!(%queue, routing_key = %message.routing_key, "no event handler matched this routing key");
        return Ok(());
    }

    let invocations = matched
        .iter()
        .map(|descriptor| (descriptor.invoke)(message.body.clone()));

    let outcomes = join_all(invocations).await;

    for outcome in outcomes {
        if let Err(err) = outcome {
            error!(
                %queue,
                routing_key = %message.routing_key,
                error = %err,
                alert = true,
                "event handler invocation failed"
            );
        }
    }

    Ok(())
}
