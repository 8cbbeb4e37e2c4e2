pub mod client;
pub mod datastore;
pub mod sql_type_wrapper;

pub use client::{PostgresClient, PostgresConnectionError};
pub use datastore::PostgresDatastore;
