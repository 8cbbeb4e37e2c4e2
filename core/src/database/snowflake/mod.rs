pub mod client;
pub mod datastore;

pub use client::{SnowflakeClient, SnowflakeConnectionConfig, SnowflakeError};
pub use datastore::SnowflakeDatastore;
