// SPDX-License-Identifier: Apache-2.0
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct DBConfig {
    pub max_connections: u32,
    pub uri: String
}

impl Default for DBConfig {
    fn default() -> Self {
        DBConfig {
            max_connections: 1,
            uri: "sqlite::memory:".to_string()
        }
    }
}
