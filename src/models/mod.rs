// SPDX-License-Identifier: Apache-2.0
pub mod commands;
pub mod events;
pub mod records;
