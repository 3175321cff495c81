// SPDX-License-Identifier: Apache-2.0
pub mod command;
pub mod command_bus;
pub mod subscriber;
pub mod worker;
pub mod worker_pool;
