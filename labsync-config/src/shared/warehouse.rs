use serde::Deserialize;

use crate::shared::{PgConnectionConfig, ValidationError};

/// Warehouse receiving request and sample rows.
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    pub connection: PgConnectionConfig,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    4
}

impl WarehouseConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.connection.host.trim().is_empty() {
            return Err(ValidationError::Empty("warehouse.connection.host"));
        }
        if self.max_connections == 0 {
            return Err(ValidationError::Zero("warehouse.max_connections"));
        }
        if self.connection.tls.enabled && self.connection.tls.trusted_root_certs.is_empty() {
            return Err(ValidationError::Empty("warehouse.connection.tls.trusted_root_certs"));
        }

        Ok(())
    }
}
