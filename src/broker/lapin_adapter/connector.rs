//! Maintains a single reconnecting AMQP connection in the background and
//! hands out fresh channels to consumers and publishers through a cheaply
//! clonable [`Gateway`].

use crate::config::BusConfig;
use crate::error::BrokerUnavailable;
use crate::shutdown;
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use lapin::{Channel, Connection, ConnectionProperties};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

type ChannelRequest = oneshot::Sender<Result<Channel, BrokerUnavailable>>;

/// A handle used by consumers and publishers to request a fresh channel on
/// the connection the [`Connector`] maintains.
#[derive(Clone)]
pub struct Gateway {
    requests: mpsc::UnboundedSender<ChannelRequest>,
}

impl Gateway {
    /// Requests a channel on the current connection. Blocks behind the
    /// connector's reconnection loop if the connection is currently down.
    pub async fn channel(&self) -> Result<Channel, BrokerUnavailable> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(tx)
            .map_err(|_| BrokerUnavailable::ChannelClosed)?;
        rx.await.map_err(|_| BrokerUnavailable::ChannelClosed)?
    }
}

/// Owns the background reconnection loop. Dropping the last [`Gateway`]
/// derived from this connector does not stop it; it stops when the
/// crate-global [`shutdown`] signal fires.
pub struct Connector;

impl Connector {
    /// Spawns the background connection loop and returns a [`Gateway`] to it.
    pub fn spawn(config: BusConfig) -> Gateway {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(serve(config, rx));

        Gateway { requests: tx }
    }
}

async fn serve(config: BusConfig, mut requests: mpsc::UnboundedReceiver<ChannelRequest>) {
    let mut connection: Option<Connection> = None;

    loop {
        tokio::select! {
            _ = shutdown::terminated() => {
                if let Some(connection) = connection.take() {
                    let _ = connection.close(0, "shutting down").await;
                }
                break;
            }
            request = requests.recv() => {
                let Some(reply) = request else { break };

                let channel = loop {
                    if connection.is_none() {
                        connection = Some(reconnect(&config).await);
                    }

                    let current = connection.as_ref().expect("just set");

                    match current.create_channel().await {
                        Ok(channel) => break channel,
                        Err(err) => {
                            warn!(error = %err, "channel creation failed, discarding connection");
                            connection = None;
                        }
                    }
                };

                let _ = reply.send(Ok(channel));
            }
        }
    }
}

/// Connects with exponential backoff. `max_elapsed_time` is unbounded, so
/// this only returns once a connection succeeds.
async fn reconnect(config: &BusConfig) -> Connection {
    let mut backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(200),
        max_interval: Duration::from_secs(30),
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    };

    loop {
        let uri = config.amqp_uri();

        let properties = ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio);

        match Connection::connect(&uri, properties).await {
            Ok(connection) => {
                info!(host = %config.host, port = config.port, "connected to broker");
                return connection;
            }
            Err(err) => {
                let delay = backoff.next_backoff().unwrap_or(Duration::from_secs(30));
                warn!(error = %err, ?delay, "broker connection attempt failed");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
