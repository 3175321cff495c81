// SPDX-License-Identifier: Apache-2.0
pub mod auth_client;
pub mod challenge;
pub mod registry;
pub mod upstream;
