// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AMQP topology and persistent publishing via lapin.

use async_trait::async_trait;
use lapin::options::{
    BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use teltubby_config::model::AmqpConfig;
use teltubby_core::traits::JobPublisher;
use teltubby_core::types::JobPayload;
use teltubby_core::ArchiveError;
use tracing::info;

/// Message type header on every job message.
const MESSAGE_TYPE: &str = "teltubby.large_file.job";

/// Maximum per-message priority configured on the main queue.
const MAX_PRIORITY: u8 = 9;

/// Declare the durable exchanges and queues on `channel`.
///
/// Both the publisher and the worker declare the identical topology so
/// either side can start first. The main queue dead-letters
/// reject-without-requeue messages to the failed-jobs queue.
pub async fn declare_topology(channel: &Channel, config: &AmqpConfig) -> Result<(), ArchiveError> {
    let durable = ExchangeDeclareOptions {
        durable: true,
        ..Default::default()
    };
    channel
        .exchange_declare(
            &config.dlx_exchange,
            ExchangeKind::Direct,
            durable,
            FieldTable::default(),
        )
        .await
        .map_err(|e| ArchiveError::queue("failed to declare dead-letter exchange", e))?;
    channel
        .exchange_declare(
            &config.exchange,
            ExchangeKind::Direct,
            durable,
            FieldTable::default(),
        )
        .await
        .map_err(|e| ArchiveError::queue("failed to declare job exchange", e))?;

    let durable_queue = QueueDeclareOptions {
        durable: true,
        ..Default::default()
    };
    channel
        .queue_declare(
            &config.dead_letter_queue,
            durable_queue,
            FieldTable::default(),
        )
        .await
        .map_err(|e| ArchiveError::queue("failed to declare dead-letter queue", e))?;
    channel
        .queue_bind(
            &config.dead_letter_queue,
            &config.dlx_exchange,
            &config.dead_letter_queue,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| ArchiveError::queue("failed to bind dead-letter queue", e))?;

    let mut args = FieldTable::default();
    args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(config.dlx_exchange.clone().into()),
    );
    args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(config.dead_letter_queue.clone().into()),
    );
    args.insert("x-max-priority".into(), AMQPValue::ShortShortUInt(MAX_PRIORITY));
    channel
        .queue_declare(&config.queue, durable_queue, args)
        .await
        .map_err(|e| ArchiveError::queue("failed to declare job queue", e))?;
    channel
        .queue_bind(
            &config.queue,
            &config.exchange,
            &config.queue,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| ArchiveError::queue("failed to bind job queue", e))?;

    info!(
        exchange = %config.exchange,
        queue = %config.queue,
        dlx = %config.dlx_exchange,
        dlq = %config.dead_letter_queue,
        "AMQP topology declared"
    );
    Ok(())
}

/// Publisher half of the durable job queue.
pub struct AmqpJobQueue {
    // Dropping the connection closes every channel; keep it alive.
    _connection: Connection,
    channel: Channel,
    config: AmqpConfig,
}

impl AmqpJobQueue {
    /// Connect, open a channel, and declare the topology.
    pub async fn connect(config: &AmqpConfig) -> Result<Self, ArchiveError> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| ArchiveError::queue("AMQP connect failed", e))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| ArchiveError::queue("AMQP channel open failed", e))?;
        declare_topology(&channel, config).await?;

        Ok(Self {
            _connection: connection,
            channel,
            config: config.clone(),
        })
    }

    /// Close the channel and the connection.
    pub async fn close(&self) -> Result<(), ArchiveError> {
        self.channel
            .close(200, "shutting down")
            .await
            .map_err(|e| ArchiveError::queue("AMQP channel close failed", e))?;
        Ok(())
    }
}

#[async_trait]
impl JobPublisher for AmqpJobQueue {
    async fn publish(&self, payload: &JobPayload) -> Result<(), ArchiveError> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| ArchiveError::Internal(format!("job payload serialization failed: {e}")))?;

        let properties = BasicProperties::default()
            .with_delivery_mode(2) // persistent
            .with_priority(payload.job_metadata.priority.min(MAX_PRIORITY))
            .with_content_type("application/json".into())
            .with_kind(MESSAGE_TYPE.into());

        let confirm = self
            .channel
            .basic_publish(
                &self.config.exchange,
                &self.config.queue,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
            .map_err(|e| ArchiveError::queue("job publish failed", e))?;
        confirm
            .await
            .map_err(|e| ArchiveError::queue("job publish not confirmed", e))?;

        info!(job_id = %payload.job_id, priority = payload.job_metadata.priority, "job published");
        Ok(())
    }

    async fn queue_depth(&self) -> Result<u32, ArchiveError> {
        let state = self
            .channel
            .queue_declare(
                &self.config.queue,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| ArchiveError::queue("passive queue declare failed", e))?;
        Ok(state.message_count())
    }
}
