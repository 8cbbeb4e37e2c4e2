//! In-memory stand-ins for a database connection and an alert channel.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::alert::{AlertError, AlertSink, UpsertAlert};
use crate::database::error::ExecutionError;
use crate::database::executor::{BatchExecutor, Executor};
use crate::types::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorEvent {
    Execute(String),
    ExecuteWithParams { sql: String, params: Vec<Value> },
    Commit,
    Rollback,
    Close,
}

#[derive(Debug, Clone)]
struct FailureRule {
    pattern: String,
    allowed_matches: usize,
}

/// Records every statement and transaction call. Statements containing a
/// `fail_on` pattern are recorded and then rejected.
#[derive(Debug, Clone, Default)]
pub struct MemoryExecutor {
    events: Arc<Mutex<Vec<ExecutorEvent>>>,
    rules: Arc<Mutex<Vec<FailureRule>>>,
}

impl MemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(self, pattern: &str) -> Self {
        self.fail_after(pattern, 0)
    }

    /// Lets the first `allowed_matches` statements containing `pattern`
    /// through and rejects the rest.
    pub fn fail_after(self, pattern: &str, allowed_matches: usize) -> Self {
        self.rules
            .lock()
            .unwrap()
            .push(FailureRule { pattern: pattern.to_string(), allowed_matches });
        self
    }

    pub fn events(&self) -> Vec<ExecutorEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ExecutorEvent::Execute(sql) | ExecutorEvent::ExecuteWithParams { sql, .. } => {
                    Some(sql)
                }
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: ExecutorEvent, sql: &str) -> Result<(), ExecutionError> {
        self.events.lock().unwrap().push(event);

        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut().filter(|rule| sql.contains(&rule.pattern)) {
            if rule.allowed_matches == 0 {
                return Err(ExecutionError::Database(format!("statement rejected: {}", sql)));
            }
            rule.allowed_matches -= 1;
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for MemoryExecutor {
    async fn execute(&mut self, sql: &str) -> Result<u64, ExecutionError> {
        self.record(ExecutorEvent::Execute(sql.to_string()), sql)?;
        Ok(0)
    }

    async fn commit(&mut self) -> Result<(), ExecutionError> {
        self.record(ExecutorEvent::Commit, "COMMIT")
    }

    async fn rollback(&mut self) -> Result<(), ExecutionError> {
        self.record(ExecutorEvent::Rollback, "ROLLBACK")
    }

    async fn close(&mut self) -> Result<(), ExecutionError> {
        self.record(ExecutorEvent::Close, "CLOSE")
    }
}

#[async_trait]
impl BatchExecutor for MemoryExecutor {
    async fn execute_with_params(
        &mut self,
        sql: &str,
        params: &[&Value],
    ) -> Result<u64, ExecutionError> {
        let params: Vec<Value> = params.iter().map(|value| (*value).clone()).collect();
        let affected = params.len() as u64;
        self.record(ExecutorEvent::ExecuteWithParams { sql: sql.to_string(), params }, sql)?;
        Ok(affected)
    }
}

#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<UpsertAlert>>,
}

impl RecordingAlertSink {
    pub fn alerts(&self) -> Vec<UpsertAlert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn notify(&self, alert: &UpsertAlert) -> Result<(), AlertError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}
