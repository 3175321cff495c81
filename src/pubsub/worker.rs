// SPDX-License-Identifier: Apache-2.0
use tokio::sync::mpsc;
use tokio::sync::mpsc::Sender;
use crate::models::commands::RegistryCommand;
use crate::pubsub::command::ChannelId;
use crate::pubsub::subscriber::CommandSubscriber;

/// Executes the commands of one queue of a worker pool
pub struct Worker {
    /// The queue this worker drains
    id: usize,

    /// The size of the channel buffer
    buffer_size: usize,

    handler: CommandSubscriber,
}

impl Worker {

    pub fn new(id: usize, buffer_size: usize, handler: CommandSubscriber) -> Self {
        Worker {
            id,
            buffer_size,
            handler
        }
    }

    /// Spawn the processing loop and return the sender feeding it.
    /// The loop ends on `Shutdown`, after the commands queued before it.
    pub fn start(&self) -> Sender<RegistryCommand> {
        let (sender, mut receiver) = mpsc::channel(self.buffer_size);

        let id = self.id;
        let handler = self.handler.clone();

        tokio::spawn(async move {
            while let Some(cmd) = receiver.recv().await {

                if let RegistryCommand::Shutdown = cmd {
                    tracing::debug!("Worker {} stopped", id);
                    receiver.close();
                    return;
                }

                tracing::debug!("Worker {} runs {} {}", id, cmd.topic_id(), cmd.id());

                if handler.supports_concurrency() {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        handler.run(cmd).await;
                    });
                } else if let Some(event) = handler.run(cmd).await {
                    // the next command of this queue waits for this one
                    tracing::debug!("Worker {} processed: {:?}", id, event);
                }
            }
        });

        sender
    }
}
