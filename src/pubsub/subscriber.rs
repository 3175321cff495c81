// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use async_trait::async_trait;
use crate::models::commands::RegistryCommand;
use crate::models::events::RegistryEvent;

/// Receives the commands of the topics it subscribed to
#[async_trait]
pub trait CommandSubscriberTrait {
    /// Execute a command, the event tells what was done, if anything
    async fn run(&self, cmd: RegistryCommand) -> Option<RegistryEvent>;

    /// Whether a worker may run several commands of its queue at the same time.
    /// When false the commands of a queue are executed one after the other.
    fn supports_concurrency(&self) -> bool;
}

pub type CommandSubscriber = Arc<dyn CommandSubscriberTrait + Sync + Send>;
