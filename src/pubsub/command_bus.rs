// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::RwLock;
use tracing::log;
use crate::models::commands::RegistryCommand;
use crate::pubsub::subscriber::CommandSubscriber;
use crate::pubsub::worker_pool::WorkerPool;

/// Routes every published command to the worker pool of its topic
pub struct CommandBus {
    queue: Sender<RegistryCommand>,

    /// One pool per topic
    pools: RwLock<HashMap<String, Arc<WorkerPool>>>,

    /// Workers per pool
    workers: usize,

    buffer_size: usize,

    closed: AtomicBool,
}

impl CommandBus {

    /// New instance with a worker per CPU
    pub fn new(queue: Sender<RegistryCommand>, buffer_size: usize) -> Arc<CommandBus> {
        CommandBus::with_workers(queue, buffer_size, num_cpus::get())
    }

    pub fn with_workers(queue: Sender<RegistryCommand>, buffer_size: usize, workers: usize) -> Arc<CommandBus> {
        Arc::new(CommandBus {
            queue,
            pools: RwLock::new(HashMap::new()),
            workers,
            buffer_size,
            closed: AtomicBool::new(false),
        })
    }

    /// Create the bus and route its queue in the background
    pub fn spawn(buffer_size: usize) -> Arc<CommandBus> {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let bus = CommandBus::new(sender, buffer_size);

        let routed = bus.clone();
        tokio::spawn(async move { routed.start(receiver).await });

        bus
    }

    /// Drain the queue into the topic pools
    pub async fn start(&self, mut receiver: Receiver<RegistryCommand>) {
        while let Some(cmd) = receiver.recv().await {
            let topic = cmd.topic();
            let pool = self.pools.read().await.get(&topic).cloned();

            match pool {
                Some(pool) => pool.dispatch(cmd).await,
                None => log::warn!("No subscriber for topic {}, command {} dropped", topic, cmd.id()),
            }
        }
    }

    /// Queue a command. Commands published after `shutdown` are dropped.
    pub async fn publish(&self, cmd: RegistryCommand) {
        if self.closed.load(Ordering::Relaxed) {
            log::warn!("Command bus is shutting down, {} not delivered", cmd.id());
            return;
        }

        if let Err(e) = self.queue.send(cmd).await {
            log::error!("failed to queue command: {}", e);
        }
    }

    /// Run `handler` for every command of `topic`. The first subscriber of a topic wins.
    pub async fn subscribe(&self, topic: &str, handler: CommandSubscriber) {
        let mut pools = self.pools.write().await;
        if pools.contains_key(topic) {
            log::warn!("Topic {} already has a subscriber", topic);
            return;
        }

        pools.insert(topic.to_string(), Arc::new(WorkerPool::start(handler, self.workers, self.buffer_size)));
    }

    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::Relaxed);

        let pools: Vec<(String, Arc<WorkerPool>)> = self.pools.read().await
            .iter()
            .map(|(topic, pool)| (topic.clone(), pool.clone()))
            .collect();

        for (topic, pool) in pools {
            tracing::info!("Shutting down worker pool for topic: {}", topic);
            pool.shutdown().await;
        }
    }
}
