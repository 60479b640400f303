//! NATS JetStream implementation of the event bus.
//!
//! Publishing attaches a `Nats-Msg-Id` so JetStream dedupes repeated
//! publishes of the same logical event. Subscriptions are durable pull
//! consumers named after the queue group: consumers sharing a group share
//! work, missed messages replay after downtime, and acks are explicit.

use std::time::Duration;

use async_nats::jetstream::{self, consumer, stream, AckKind};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use crate::error::{AppError, Result};
use crate::events::{EventBus, MessageHandler, HANDLER_TIMEOUT, MAX_IN_FLIGHT};

/// Delay between reconnect attempts.
const RECONNECT_WAIT: Duration = Duration::from_secs(3);

fn map_bus_err<E: std::fmt::Display>(context: &str, e: E) -> AppError {
    AppError::Bus(format!("{}: {}", context, e))
}

/// JetStream-backed event bus.
pub struct NatsBus {
    client: async_nats::Client,
    jetstream: jetstream::Context,
}

impl NatsBus {
    /// Connect to NATS. Reconnects are unlimited with a bounded backoff so a
    /// bus outage never permanently detaches a running service.
    pub async fn connect(addr: &str, client_name: &str) -> Result<Self> {
        let client = async_nats::ConnectOptions::new()
            .name(client_name)
            .max_reconnects(None)
            .retry_on_initial_connect()
            .reconnect_delay_callback(|_attempts| RECONNECT_WAIT)
            .event_callback(|event| async move {
                match event {
                    async_nats::Event::Disconnected => {
                        tracing::warn!("NATS disconnected, buffering messages");
                    }
                    async_nats::Event::Connected => {
                        tracing::info!("NATS reconnected");
                    }
                    async_nats::Event::ClientError(err) => {
                        // Permanently dead connection: let the supervisor
                        // restart us with fresh config and state.
                        tracing::error!(error = %err, "NATS connection closed permanently, exiting");
                        std::process::exit(1);
                    }
                    other => {
                        tracing::debug!(event = ?other, "NATS connection event");
                    }
                }
            })
            .connect(addr)
            .await
            .map_err(|e| map_bus_err("Failed to connect to NATS", e))?;

        let jetstream = jetstream::new(client.clone());

        Ok(Self { client, jetstream })
    }

    /// Stream name for a subject. JetStream stream names cannot contain the
    /// token separators that subjects use.
    fn stream_name(subject: &str) -> String {
        subject.replace(['.', '*', '>'], "-").to_uppercase()
    }

    /// Get or create the durable stream backing a subject.
    async fn ensure_stream(&self, subject: &str) -> Result<stream::Stream> {
        self.jetstream
            .get_or_create_stream(stream::Config {
                name: Self::stream_name(subject),
                subjects: vec![subject.to_string()],
                ..Default::default()
            })
            .await
            .map_err(|e| map_bus_err("Failed to ensure stream", e))
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, subject: &str, payload: Bytes, msg_id: &str) -> Result<()> {
        tracing::debug!(subject = %subject, msg_id = %msg_id, size = payload.len(), "Publishing event");

        let publish = jetstream::context::Publish::build()
            .payload(payload)
            .message_id(msg_id);

        let ack = self
            .jetstream
            .send_publish(subject.to_string(), publish)
            .await
            .map_err(|e| map_bus_err("Failed to publish", e))?;

        ack.await
            .map_err(|e| map_bus_err("Publish not acknowledged", e))?;
        Ok(())
    }

    async fn subscribe(&self, subject: &str, group: &str, handler: MessageHandler) -> Result<()> {
        tracing::info!(subject = %subject, group = %group, "Subscribing to subject");

        let stream = self.ensure_stream(subject).await?;

        let consumer = stream
            .get_or_create_consumer(
                group,
                consumer::pull::Config {
                    durable_name: Some(group.to_string()),
                    filter_subject: subject.to_string(),
                    ack_policy: consumer::AckPolicy::Explicit,
                    // Replay everything missed while we were down.
                    deliver_policy: consumer::DeliverPolicy::All,
                    // Flow control: bounded unacked deliveries per subscription.
                    max_ack_pending: MAX_IN_FLIGHT as i64,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| map_bus_err("Failed to create consumer", e))?;

        let mut messages = consumer
            .messages()
            .await
            .map_err(|e| map_bus_err("Failed to open message stream", e))?;

        let subject = subject.to_string();
        tokio::spawn(async move {
            while let Some(delivery) = messages.next().await {
                let message = match delivery {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::error!(subject = %subject, error = %e, "Message stream error");
                        continue;
                    }
                };

                // Each invocation gets a fresh deadline so one stuck handler
                // cannot wedge the subscription.
                let outcome =
                    tokio::time::timeout(HANDLER_TIMEOUT, handler(message.payload.clone())).await;

                match outcome {
                    Ok(Ok(())) => {
                        if let Err(e) = message.ack().await {
                            tracing::error!(subject = %subject, error = %e, "Failed to ack message");
                        }
                    }
                    Ok(Err(e)) => {
                        tracing::error!(subject = %subject, error = %e, "Handler failed, nacking message");
                        if let Err(e) = message.ack_with(AckKind::Nak(None)).await {
                            tracing::error!(subject = %subject, error = %e, "Failed to nack message");
                        }
                    }
                    Err(_) => {
                        tracing::error!(subject = %subject, "Handler timed out, nacking message");
                        if let Err(e) = message.ack_with(AckKind::Nak(None)).await {
                            tracing::error!(subject = %subject, error = %e, "Failed to nack message");
                        }
                    }
                }
            }
            tracing::warn!(subject = %subject, "Message stream closed");
        });

        Ok(())
    }

    async fn drain(&self) -> Result<()> {
        tracing::info!("Draining NATS connection");
        self.client
            .drain()
            .await
            .map_err(|e| map_bus_err("Failed to drain connection", e))
    }
}
