pub mod backoff;
pub mod destination;
pub mod dialect;
pub mod error;
pub mod source;
pub mod type_map;

pub use destination::DestinationAdapter;
pub use error::AdapterError;
pub use source::SourceAdapter;

use model::connector::{ConnectorVariant, DestinationVariant, SourceVariant};

/// Builds the concrete adapter for a source variant.
pub fn source_adapter_for(variant: SourceVariant) -> Box<dyn SourceAdapter> {
    match variant {
        SourceVariant::SqlServer => Box::new(source::SqlServerSource::default()),
        SourceVariant::PostgreSql => Box::new(source::PostgresSource::default()),
        SourceVariant::MySql => Box::new(source::MySqlSource::default()),
        SourceVariant::Oracle => Box::new(source::OracleSource::default()),
    }
}

/// Builds the concrete adapter for a destination variant.
pub fn destination_adapter_for(variant: DestinationVariant) -> Box<dyn DestinationAdapter> {
    match variant {
        DestinationVariant::Snowflake => Box::new(destination::SnowflakeDestination::default()),
        DestinationVariant::S3ObjectStore => Box::new(destination::S3Destination::default()),
    }
}

/// Returns `true` when a source variant and a connector variant agree,
/// used by the config validation layer to reject mismatched wiring.
pub fn variant_matches_kind(connector: &ConnectorVariant, expect_source: bool) -> bool {
    matches!(
        (connector, expect_source),
        (ConnectorVariant::Source(_), true) | (ConnectorVariant::Destination(_), false)
    )
}
