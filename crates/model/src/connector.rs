use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectorKind {
    Source,
    Destination,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceVariant {
    SqlServer,
    PostgreSql,
    MySql,
    Oracle,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DestinationVariant {
    Snowflake,
    S3ObjectStore,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectorVariant {
    Source(SourceVariant),
    Destination(DestinationVariant),
}

impl ConnectorVariant {
    pub fn kind(&self) -> ConnectorKind {
        match self {
            ConnectorVariant::Source(_) => ConnectorKind::Source,
            ConnectorVariant::Destination(_) => ConnectorKind::Destination,
        }
    }
}

/// Opaque connection/config payload for a connector. The core never
/// interprets these fields beyond what the matching adapter needs; the
/// CRUD surface that originates them is out of scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConnectorConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bucket: Option<String>,
    pub path_template: Option<String>,
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connector {
    pub name: String,
    pub variant: ConnectorVariant,
    pub config: ConnectorConfig,
    pub last_tested_at: Option<DateTime<Utc>>,
}

impl Connector {
    pub fn kind(&self) -> ConnectorKind {
        self.variant.kind()
    }
}
