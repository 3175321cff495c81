// SPDX-License-Identifier: Apache-2.0
pub mod db_health;
pub mod db_manifests;
pub mod pool;
