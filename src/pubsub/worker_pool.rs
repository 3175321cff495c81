// SPDX-License-Identifier: Apache-2.0
use tokio::sync::mpsc::Sender;
use tracing::log;
use crate::models::commands::RegistryCommand;
use crate::pubsub::command::ChannelId;
use crate::pubsub::subscriber::CommandSubscriber;
use crate::pubsub::worker::Worker;

/// The workers of one topic.
/// A command goes to the shard picked by its queue id, so commands sharing
/// a digest always meet the same worker.
pub struct WorkerPool {
    shards: Vec<Sender<RegistryCommand>>,
}

impl WorkerPool {

    /// Spawn `workers` workers running `handler`
    pub fn start(handler: CommandSubscriber, workers: usize, buffer_size: usize) -> WorkerPool {
        let shards = (0..workers.max(1))
            .map(|id| Worker::new(id, buffer_size, handler.clone()).start())
            .collect();

        WorkerPool { shards }
    }

    fn shard(&self, cmd: &RegistryCommand) -> usize {
        (cmd.queue_id() % self.shards.len() as u64) as usize
    }

    /// Hand the command to its worker, waiting when the worker queue is full
    pub async fn dispatch(&self, cmd: RegistryCommand) {
        let shard = self.shard(&cmd);
        log::debug!("Queued command {} on shard {}", cmd.topic_id(), shard);

        if let Err(e) = self.shards[shard].send(cmd).await {
            log::error!("Worker {} is gone, command dropped: {}", shard, e);
        }
    }

    /// Stop every worker once it has processed what it already received
    pub async fn shutdown(&self) {
        for (shard, sender) in self.shards.iter().enumerate() {
            tracing::info!("Shutting down worker: {}", shard);
            if sender.send(RegistryCommand::Shutdown).await.is_ok() {
                sender.closed().await;
            }
        }
    }
}
