// SPDX-License-Identifier: Apache-2.0

/// Routing of a message through the bus
pub trait ChannelId {
    /// Messages with the same queue id are processed by the same worker, in order
    fn queue_id(&self) -> u64;
    fn topic_id(&self) -> String;
}
