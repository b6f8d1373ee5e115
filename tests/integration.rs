//! End-to-end coverage of the dispatch and RPC engine against the in-memory
//! broker adapter. No live broker is required for any test in this crate.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use switchboard::broker::memory::MemoryBroker;
use switchboard::{HandlerRegistrationError, MessageBusBuilder, RegistrationError, RpcError};
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Debug, Serialize, Deserialize)]
struct Order {
    id: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Receipt {
    order_id: u32,
    total_cents: u64,
}

const SHORT: Duration = Duration::from_millis(500);

async fn recv_n<T>(rx: &mut mpsc::UnboundedReceiver<T>, n: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(timeout(SHORT, rx.recv()).await.expect("timed out waiting for handler invocation").unwrap());
    }
    out
}

#[tokio::test]
async fn event_fan_out_invokes_every_matching_handler() {
    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let (tx2, mut rx2) = mpsc::unbounded_channel();

    let bus = MessageBusBuilder::new()
        .register_event("orders-watch", "orders.#", move |order: Order| {
            let tx1 = tx1.clone();
            async move {
                tx1.send(order.id).unwrap();
            }
        })
        .unwrap()
        .register_event("orders-watch", "orders.created", move |order: Order| {
            let tx2 = tx2.clone();
            async move {
                tx2.send(order.id).unwrap();
            }
        })
        .unwrap()
        .build(Arc::new(MemoryBroker::new()), Duration::from_secs(1));

    bus.start().await.unwrap();
    bus.publish_event("orders.created", &Order { id: 42 }).await.unwrap();

    assert_eq!(recv_n(&mut rx1, 1).await, vec![42]);
    assert_eq!(recv_n(&mut rx2, 1).await, vec![42]);
}

#[tokio::test]
async fn event_handler_for_nonmatching_pattern_is_not_invoked() {
    let (tx, mut rx) = mpsc::unbounded_channel::<u32>();

    let bus = MessageBusBuilder::new()
        .register_event("orders-watch", "orders.shipped", move |order: Order| {
            let tx = tx.clone();
            async move {
                tx.send(order.id).unwrap();
            }
        })
        .unwrap()
        .build(Arc::new(MemoryBroker::new()), Duration::from_secs(1));

    bus.start().await.unwrap();
    bus.publish_event("orders.created", &Order { id: 7 }).await.unwrap();

    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
}

#[tokio::test]
async fn command_round_trip_returns_the_handler_result() {
    let bus = MessageBusBuilder::new()
        .register_command("billing", "billing.charge", |order: Order| async move {
            Ok::<_, String>(Receipt {
                order_id: order.id,
                total_cents: 1_999,
            })
        })
        .unwrap()
        .build(Arc::new(MemoryBroker::new()), Duration::from_secs(1));

    bus.start().await.unwrap();

    let receipt: Receipt = bus.rpc().call("billing.charge", &Order { id: 9 }).await.unwrap();

    assert_eq!(receipt.order_id, 9);
    assert_eq!(receipt.total_cents, 1_999);
}

#[tokio::test]
async fn command_handler_error_surfaces_as_remote_error() {
    let bus = MessageBusBuilder::new()
        .register_command("billing", "billing.charge", |_: Order| async move {
            Err::<Receipt, _>("card declined".to_string())
        })
        .unwrap()
        .build(Arc::new(MemoryBroker::new()), Duration::from_secs(1));

    bus.start().await.unwrap();

    let err = bus
        .rpc()
        .call::<_, Receipt>("billing.charge", &Order { id: 9 })
        .await
        .unwrap_err();

    match err {
        RpcError::Remote(description) => {
            assert_eq!(description.kind, "HandlerError");
            assert_eq!(description.message, "card declined");
        }
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn command_handler_panic_is_reported_as_internal_error() {
    let bus = MessageBusBuilder::new()
        .register_command("billing", "billing.charge", |_: Order| async move {
            #[allow(unreachable_code)]
            if true {
                panic!("unexpected");
            }
            Ok::<Receipt, String>(Receipt { order_id: 0, total_cents: 0 })
        })
        .unwrap()
        .build(Arc::new(MemoryBroker::new()), Duration::from_secs(1));

    bus.start().await.unwrap();

    let err = bus
        .rpc()
        .call::<_, Receipt>("billing.charge", &Order { id: 9 })
        .await
        .unwrap_err();

    match err {
        RpcError::Remote(description) => assert_eq!(description.kind, "InternalError"),
        other => panic!("expected a remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn rpc_call_times_out_when_the_request_is_unroutable() {
    // No command queue at all is registered, so the request is simply never
    // routed anywhere and the caller must observe a timeout rather than hang.
    let bus = MessageBusBuilder::new().build(Arc::new(MemoryBroker::new()), Duration::from_millis(50));

    bus.start().await.unwrap();

    let err = bus
        .rpc()
        .call::<_, Receipt>("billing.charge", &Order { id: 9 })
        .await
        .unwrap_err();

    assert!(matches!(err, RpcError::Timeout));
}

#[tokio::test]
async fn mixing_event_and_command_handlers_on_one_queue_is_rejected() {
    let result = MessageBusBuilder::new()
        .register_event("shared", "orders.#", |_: Order| async {})
        .unwrap()
        .register_command("shared", "orders.create", |order: Order| async move {
            Ok::<_, String>(Receipt { order_id: order.id, total_cents: 0 })
        });

    match result {
        Err(RegistrationError::Registry(HandlerRegistrationError::MixedKinds { queue, .. })) => {
            assert_eq!(queue, "shared");
        }
        other => panic!("expected a mixed-kinds registration error, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_command_routes_on_one_queue_are_rejected() {
    let result = MessageBusBuilder::new()
        .register_command("billing", "billing.charge", |order: Order| async move {
            Ok::<_, String>(Receipt { order_id: order.id, total_cents: 0 })
        })
        .unwrap()
        .register_command("billing", "billing.charge", |order: Order| async move {
            Ok::<_, String>(Receipt { order_id: order.id, total_cents: 0 })
        });

    assert!(matches!(
        result,
        Err(RegistrationError::Registry(HandlerRegistrationError::DuplicateCommandRoute { .. }))
    ));
}
