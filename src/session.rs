//! Broker session — queue setup, binding, and the consume loop
//!
//! One connection, one channel, one ephemeral exclusive queue. Setup is
//! strictly ordered: declare completes before bind, bind completes before the
//! subscription starts; each step awaits the broker's acknowledgment. Any
//! setup failure is fatal, with no retry: this is a point-in-time diagnostic
//! tap, not a durable consumer.

use futures_util::StreamExt;
use lapin::options::{BasicConsumeOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties};
use rand::Rng;
use serde_json::Value;

use crate::config::BrokerEndpoint;
use crate::error::{Result, SnoopError};
use crate::filter::{FilterChain, Verdict};
use crate::output::Formatter;

/// What to bind the ephemeral queue to, fixed at startup.
#[derive(Debug, Clone)]
pub struct BindingSpec {
    pub exchange: String,
    pub routing_key: String,
}

/// An established session with a declared, bound queue, ready to consume.
pub struct BrokerSession {
    // The connection must outlive the channel; dropping it closes the
    // exclusive queue on the broker side.
    _connection: Connection,
    channel: Channel,
    queue_name: String,
}

impl BrokerSession {
    /// Connect and set up the ephemeral queue: declare, then bind.
    pub async fn connect(endpoint: &BrokerEndpoint, binding: &BindingSpec) -> Result<Self> {
        let connection =
            Connection::connect(&endpoint.amqp_uri(), ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        let queue_name = ephemeral_queue_name();
        channel
            .queue_declare(
                &queue_name,
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        tracing::debug!(queue = %queue_name, "declared exclusive queue");

        channel
            .queue_bind(
                &queue_name,
                &binding.exchange,
                &binding.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        tracing::info!(
            exchange = %binding.exchange,
            routekey = %binding.routing_key,
            queue = %queue_name,
            "bound, snooping"
        );

        Ok(Self {
            _connection: connection,
            channel,
            queue_name,
        })
    }

    /// Subscribe and process deliveries one at a time, in delivery order,
    /// until the stream ends, the transport fails, or Ctrl+C.
    pub async fn run(&self, chain: &FilterChain, formatter: &Formatter) -> Result<()> {
        let mut consumer = self
            .channel
            .basic_consume(
                &self.queue_name,
                "amqpsnoop",
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        loop {
            tokio::select! {
                delivery = consumer.next() => {
                    match delivery {
                        Some(Ok(delivery)) => handle_delivery(&delivery.data, chain, formatter)?,
                        Some(Err(e)) => return Err(e.into()),
                        // Only a broker-side cancel or a dead channel ends
                        // the stream; that is a connection-layer failure,
                        // not a shutdown
                        None => return Err(SnoopError::ConsumerEnded),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("interrupted, shutting down");
                    return Ok(());
                }
            }
        }
    }
}

/// Run one delivery through the chain and print it if every predicate
/// passes. Runs to completion before the next delivery is examined. A
/// failed output write is fatal; everything else about a bad delivery is
/// contained.
fn handle_delivery(payload: &[u8], chain: &FilterChain, formatter: &Formatter) -> Result<()> {
    let Some(msg) = decode_payload(payload) else {
        return Ok(());
    };
    if chain.evaluate(&msg) == Verdict::Deliver {
        formatter.print(&msg)?;
    }
    Ok(())
}

/// Decode a delivery payload as JSON. Undecodable payloads are dropped with
/// a diagnostic; the tap only speaks JSON.
fn decode_payload(payload: &[u8]) -> Option<Value> {
    match serde_json::from_slice(payload) {
        Ok(msg) => Some(msg),
        Err(e) => {
            tracing::warn!(error = %e, bytes = payload.len(), "dropping non-JSON payload");
            None
        }
    }
}

/// Randomized queue name, so concurrent snoop sessions against the same
/// broker never collide.
fn ephemeral_queue_name() -> String {
    let mut rng = rand::rng();
    format!("amqpsnoop.{}", rng.random_range(0..10_000_000u32))
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
