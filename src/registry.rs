//! The handler registry: descriptors produced by the builder API on
//! [`crate::bus::MessageBusBuilder`], validated for homogeneity and
//! uniqueness, and looked up by queue at dispatch time.

use crate::codec;
use crate::error::{CodecError, ErrorDescription, HandlerRegistrationError};
use crate::topic::Pattern;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// The way an event handler invocation can fail: either its payload could
/// not be decoded, or the handler itself panicked.
#[derive(Debug, thiserror::Error)]
pub(crate) enum EventInvokeError {
    #[error(transparent)]
    Decode(#[from] CodecError),

    #[error("event handler panicked: {0}")]
    Panic(String),
}

/// A type-erased event handler: decodes its own parameter from bytes, then
/// invokes the application closure it was built from.
pub(crate) type EventInvoker =
    Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, Result<(), EventInvokeError>> + Send + Sync>;

/// A type-erased command handler: decodes its parameter, invokes the
/// application closure, and encodes either the success value or a structured
/// error description.
pub(crate) type CommandInvoker =
    Arc<dyn Fn(Vec<u8>) -> BoxFuture<'static, Result<Vec<u8>, ErrorDescription>> + Send + Sync>;

pub(crate) struct EventDescriptor {
    pub pattern: Pattern,
    pub invoke: EventInvoker,
}

pub(crate) struct CommandDescriptor {
    pub routing_key: String,
    pub invoke: CommandInvoker,
}

pub(crate) enum QueueHandlers {
    Events(Vec<EventDescriptor>),
    Commands(Vec<CommandDescriptor>),
}

impl QueueHandlers {
    fn kind_name(&self) -> &'static str {
        match self {
            QueueHandlers::Events(_) => "event",
            QueueHandlers::Commands(_) => "command",
        }
    }
}

/// Holds every handler descriptor declared through the builder API, keyed by
/// queue name. Immutable once [`crate::bus::MessageBus::start`] has
/// consumed it.
#[derive(Default)]
pub struct HandlerRegistry {
    pub(crate) queues: HashMap<String, QueueHandlers>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register_event(
        &mut self,
        queue: String,
        pattern: Pattern,
        invoke: EventInvoker,
    ) -> Result<(), HandlerRegistrationError> {
        match self.queues.entry(queue.clone()).or_insert_with(|| QueueHandlers::Events(Vec::new())) {
            QueueHandlers::Events(descriptors) => {
                descriptors.push(EventDescriptor { pattern, invoke });
                Ok(())
            }
            other => Err(HandlerRegistrationError::MixedKinds {
                queue,
                existing: other.kind_name(),
                attempted: "event",
            }),
        }
    }

    pub(crate) fn register_command(
        &mut self,
        queue: String,
        routing_key: String,
        invoke: CommandInvoker,
    ) -> Result<(), HandlerRegistrationError> {
        let entry = self.queues.entry(queue.clone()).or_insert_with(|| QueueHandlers::Commands(Vec::new()));

        match entry {
            QueueHandlers::Commands(descriptors) => {
                if descriptors.iter().any(|d| d.routing_key == routing_key) {
                    return Err(HandlerRegistrationError::DuplicateCommandRoute { queue, routing_key });
                }
                descriptors.push(CommandDescriptor { routing_key, invoke });
                Ok(())
            }
            other => Err(HandlerRegistrationError::MixedKinds {
                queue,
                existing: other.kind_name(),
                attempted: "command",
            }),
        }
    }

    pub(crate) fn queue_names(&self) -> impl Iterator<Item = &str> {
        self.queues.keys().map(String::as_str)
    }
}

/// Wraps a typed async event handler into an [`EventInvoker`].
pub(crate) fn erase_event_handler<T, F, Fut>(handler: F) -> EventInvoker
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |bytes: Vec<u8>| -> BoxFuture<'static, Result<(), EventInvokeError>> {
        let param: T = match codec::decode(&bytes) {
            Ok(param) => param,
            Err(err) => return Box::pin(async move { Err(EventInvokeError::from(err)) }),
        };
        let fut = handler(param);

        Box::pin(async move {
            match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                Ok(()) => Ok(()),
                Err(panic) => Err(EventInvokeError::Panic(panic_message(&panic))),
            }
        })
    })
}

/// Wraps a typed async command handler into a [`CommandInvoker`]. Catches
/// panics inside `handler` and reports them as `InternalError`, matching the
/// command dispatcher's contract that only a structured description ever
/// leaves the process.
pub(crate) fn erase_command_handler<T, R, E, F, Fut>(handler: F) -> CommandInvoker
where
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    E: std::fmt::Display + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    Arc::new(move |bytes: Vec<u8>| -> BoxFuture<'static, Result<Vec<u8>, ErrorDescription>> {
        let param: T = match codec::decode(&bytes) {
            Ok(param) => param,
            Err(err) => return Box::pin(async move { Err(ErrorDescription::bad_payload(err)) }),
        };

        let fut = handler(param);

        Box::pin(async move {
            let outcome = std::panic::AssertUnwindSafe(fut).catch_unwind().await;

            match outcome {
                Ok(Ok(value)) => codec::encode(&value).map_err(ErrorDescription::internal_error),
                Ok(Err(error)) => Err(ErrorDescription::new("HandlerError", error.to_string())),
                Err(panic) => Err(ErrorDescription::internal_error(panic_message(&panic))),
            }
        })
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::Pattern;

    #[tokio::test]
    async fn registering_event_then_command_on_one_queue_is_rejected() {
        let mut registry = HandlerRegistry::new();
        let invoke = erase_event_handler(|_: ()| async {});
        registry
            .register_event("q".into(), Pattern::compile("a.#").unwrap(), invoke)
            .unwrap();

        let command_invoke = erase_command_handler(|_: ()| async { Ok::<(), String>(()) });
        let err = registry.register_command("q".into(), "a.b".into(), command_invoke).unwrap_err();
        assert_eq!(
            err,
            HandlerRegistrationError::MixedKinds {
                queue: "q".into(),
                existing: "event",
                attempted: "command",
            }
        );
    }

    #[tokio::test]
    async fn duplicate_command_routes_are_rejected() {
        let mut registry = HandlerRegistry::new();
        let invoke = erase_command_handler(|_: ()| async { Ok::<(), String>(()) });
        registry.register_command("q".into(), "a.b".into(), invoke.clone()).unwrap();

        let err = registry.register_command("q".into(), "a.b".into(), invoke).unwrap_err();
        assert_eq!(
            err,
            HandlerRegistrationError::DuplicateCommandRoute {
                queue: "q".into(),
                routing_key: "a.b".into(),
            }
        );
    }

    #[tokio::test]
    async fn command_handler_panic_is_caught() {
        let invoke = erase_command_handler(|_: ()| async {
            panic!("boom");
            #[allow(unreachable_code)]
            Ok::<(), String>(())
        });

        let result = invoke(b"null".to_vec()).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, "InternalError");
    }
}
