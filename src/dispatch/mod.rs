//! Turns an [`InboundMessage`](crate::envelope::InboundMessage) into handler
//! invocations, for both event queues and command queues.

pub(crate) mod command;
pub(crate) mod event;
