// SPDX-License-Identifier: Apache-2.0
pub mod digest;
pub mod manifest;
pub mod reference;
pub mod repository;
