use async_trait::async_trait;

use crate::database::error::ExecutionError;
use crate::types::Value;

/// One open connection with DB-API style transactions: statements run inside
/// an implicit transaction until `commit` or `rollback` is called.
#[async_trait]
pub trait Executor: Send {
    /// Runs a statement and returns the number of rows it affected, when known.
    async fn execute(&mut self, sql: &str) -> Result<u64, ExecutionError>;

    async fn commit(&mut self) -> Result<(), ExecutionError>;

    async fn rollback(&mut self) -> Result<(), ExecutionError>;

    async fn close(&mut self) -> Result<(), ExecutionError> {
        Ok(())
    }
}

/// Connections whose driver can bind parameters, so values never have to be
/// rendered into the statement text.
#[async_trait]
pub trait BatchExecutor: Executor {
    /// Runs a statement with `$n` placeholders bound to `params` in order.
    async fn execute_with_params(
        &mut self,
        sql: &str,
        params: &[&Value],
    ) -> Result<u64, ExecutionError>;
}
