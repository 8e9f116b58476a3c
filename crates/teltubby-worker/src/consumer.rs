// SPDX-FileCopyrightText: 2026 Teltubby Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AMQP consumer loop: manual acks, bounded prefetch, graceful shutdown.

use std::sync::Arc;

use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, BasicRejectOptions,
};
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties};
use teltubby_config::model::AmqpConfig;
use teltubby_core::ArchiveError;
use teltubby_queue::amqp::declare_topology;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::processor::{process_delivery, DeliveryOutcome, WorkerContext};

/// AMQP prefetch per worker. Fixed at one: a worker holds a single
/// unacked delivery at a time, and throughput scales by running more
/// worker processes.
const PREFETCH: u16 = 1;

/// Long-running queue consumer. One instance per worker process.
pub struct QueueWorker {
    ctx: Arc<WorkerContext>,
    amqp: AmqpConfig,
}

impl QueueWorker {
    pub fn new(ctx: Arc<WorkerContext>, amqp: AmqpConfig) -> Self {
        Self { ctx, amqp }
    }

    /// Consume until shutdown. Unacked messages are left for redelivery.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ArchiveError> {
        let connection = Connection::connect(&self.amqp.url, ConnectionProperties::default())
            .await
            .map_err(|e| ArchiveError::queue("AMQP connect failed", e))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| ArchiveError::queue("AMQP channel open failed", e))?;
        declare_topology(&channel, &self.amqp).await?;

        channel
            .basic_qos(PREFETCH, BasicQosOptions::default())
            .await
            .map_err(|e| ArchiveError::queue("failed to set prefetch", e))?;

        let mut consumer = channel
            .basic_consume(
                &self.amqp.queue,
                "teltubby-worker",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| ArchiveError::queue("failed to start consumer", e))?;

        info!(queue = %self.amqp.queue, prefetch = PREFETCH, "worker consuming");

        loop {
            let delivery = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("worker shutting down; unacked messages will be redelivered");
                    break;
                }
                delivery = consumer.next() => delivery,
            };
            let Some(delivery) = delivery else {
                warn!("consumer stream ended");
                break;
            };
            let delivery = delivery.map_err(|e| ArchiveError::queue("delivery failed", e))?;

            match process_delivery(&self.ctx, &delivery.data).await {
                DeliveryOutcome::Ack => {
                    delivery
                        .ack(BasicAckOptions::default())
                        .await
                        .map_err(|e| ArchiveError::queue("ack failed", e))?;
                }
                DeliveryOutcome::Reject => {
                    // reject-without-requeue routes through the DLX.
                    delivery
                        .reject(BasicRejectOptions { requeue: false })
                        .await
                        .map_err(|e| ArchiveError::queue("reject failed", e))?;
                }
                DeliveryOutcome::Requeue { delay } => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.cancelled() => {}
                    }
                    delivery
                        .nack(BasicNackOptions {
                            requeue: true,
                            ..Default::default()
                        })
                        .await
                        .map_err(|e| ArchiveError::queue("nack failed", e))?;
                }
            }
        }

        if let Err(err) = channel.close(200, "worker shutdown").await {
            warn!(error = %err, "channel close failed");
        }
        Ok(())
    }
}
