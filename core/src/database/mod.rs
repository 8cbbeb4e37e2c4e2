#[cfg(feature = "bigquery")]
pub mod bigquery;
pub mod datastore;
pub mod dialect;
pub mod error;
pub mod escape;
pub mod executor;
pub mod generate;
pub mod postgres;
pub mod setup;
pub mod snowflake;
pub mod stage;
