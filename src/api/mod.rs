// SPDX-License-Identifier: Apache-2.0
pub mod metrics;
pub mod registry;
pub mod routes;
pub mod server;
pub mod state;
