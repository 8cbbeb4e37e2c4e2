use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use crate::database::error::{DatastoreError, ExecutionError};
use crate::database::executor::Executor;
use crate::manifest::credentials::{Credentials, SNOWFLAKE_REQUIRED_KEYS};

const CLIENT_APP_ID: &str = "datastore";

/// Codes returned while a statement is still running past the synchronous window.
const QUERY_IN_PROGRESS_CODES: &[&str] = &["333333", "333334"];

const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(thiserror::Error, Debug)]
pub enum SnowflakeError {
    #[error("HTTP request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("Snowflake returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Could not parse Snowflake response: {0}")]
    CouldNotParseResponse(String),

    #[error("Snowflake login failed ({code}): {message}")]
    LoginFailed { code: String, message: String },

    #[error("{code}: {message}")]
    StatementFailed { code: String, message: String },

    #[error("Snowflake session is closed")]
    SessionClosed,
}

#[derive(Deserialize, Debug)]
struct SnowflakeResponse<T> {
    data: Option<T>,
    #[serde(default)]
    success: bool,
    message: Option<String>,
    code: Option<String>,
}

impl<T> SnowflakeResponse<T> {
    fn in_progress(&self) -> bool {
        self.code.as_deref().is_some_and(|code| QUERY_IN_PROGRESS_CODES.contains(&code))
    }

    fn failure(&self) -> (String, String) {
        (
            self.code.clone().unwrap_or_else(|| "unknown".to_string()),
            self.message.clone().unwrap_or_else(|| "no message returned".to_string()),
        )
    }
}

#[derive(Deserialize, Debug, Default)]
struct LoginData {
    token: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    stats: Option<QueryStats>,
    get_result_url: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct QueryStats {
    #[serde(default)]
    num_rows_inserted: u64,
    #[serde(default)]
    num_rows_updated: u64,
    #[serde(default)]
    num_rows_deleted: u64,
}

/// Where and as whom to open a Snowflake session.
#[derive(Debug, Clone)]
pub struct SnowflakeConnectionConfig {
    pub base_url: String,
    pub account: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub warehouse: String,
    pub schema: Option<String>,
    pub role: Option<String>,
}

impl SnowflakeConnectionConfig {
    pub fn from_credentials(credentials: &Credentials) -> Result<Self, DatastoreError> {
        credentials.require("snowflake", SNOWFLAKE_REQUIRED_KEYS)?;

        let account = credentials.required("account")?.to_string();
        let base_url = match credentials.get("host") {
            Some(host) => host.trim_end_matches('/').to_string(),
            None => format!("https://{}.snowflakecomputing.com", account),
        };

        Ok(Self {
            base_url,
            account,
            user: credentials.required("user")?.to_string(),
            password: credentials.required("password")?.to_string(),
            database: credentials.required("database")?.to_string(),
            warehouse: credentials.required("warehouse")?.to_string(),
            schema: credentials.get("schema").map(str::to_string),
            role: credentials.get("role").map(str::to_string),
        })
    }
}

/// A Snowflake session over the REST session API. The session runs with
/// `AUTOCOMMIT` off, so work is only kept after `commit`.
pub struct SnowflakeClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    sequence_id: u64,
}

impl SnowflakeClient {
    pub async fn connect(config: &SnowflakeConnectionConfig) -> Result<Self, SnowflakeError> {
        let client = Client::new();

        let mut query = vec![
            ("databaseName", config.database.as_str()),
            ("warehouse", config.warehouse.as_str()),
        ];
        if let Some(schema) = &config.schema {
            query.push(("schemaName", schema.as_str()));
        }
        if let Some(role) = &config.role {
            query.push(("roleName", role.as_str()));
        }

        let body = json!({
            "data": {
                "CLIENT_APP_ID": CLIENT_APP_ID,
                "CLIENT_APP_VERSION": env!("CARGO_PKG_VERSION"),
                "ACCOUNT_NAME": config.account,
                "LOGIN_NAME": config.user,
                "PASSWORD": config.password,
                "SESSION_PARAMETERS": { "AUTOCOMMIT": false }
            }
        });

        let response = client
            .post(format!("{}/session/v1/login-request", config.base_url))
            .headers(Self::headers(None))
            .query(&query)
            .json(&body)
            .send()
            .await?;

        let login: SnowflakeResponse<LoginData> = Self::parse(response).await?;
        match login.data.as_ref().and_then(|data| data.token.clone()) {
            Some(token) if login.success => {
                debug!("Opened Snowflake session for {} on {}", config.user, config.account);
                Ok(Self { client, base_url: config.base_url.clone(), token: Some(token), sequence_id: 0 })
            }
            _ => {
                let (code, message) = login.failure();
                error!("Snowflake login failed for {}: {}", config.user, message);
                Err(SnowflakeError::LoginFailed { code, message })
            }
        }
    }

    fn headers(token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(4);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/snowflake"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!(env!("CARGO_PKG_NAME"), '/', env!("CARGO_PKG_VERSION"))),
        );
        if let Some(token) = token {
            if let Ok(value) = HeaderValue::from_str(&format!("Snowflake Token=\"{}\"", token)) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }

    async fn parse<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<SnowflakeResponse<T>, SnowflakeError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SnowflakeError::HttpStatus { status: status.as_u16(), body });
        }
        serde_json::from_str(&body).map_err(|e| SnowflakeError::CouldNotParseResponse(e.to_string()))
    }

    /// Runs one statement and returns the rows it inserted, updated or deleted.
    pub async fn query(&mut self, sql: &str) -> Result<u64, SnowflakeError> {
        let token = self.token.clone().ok_or(SnowflakeError::SessionClosed)?;
        self.sequence_id += 1;

        let response = self
            .client
            .post(format!("{}/queries/v1/query-request", self.base_url))
            .headers(Self::headers(Some(&token)))
            .query(&[("requestId", uuid::Uuid::new_v4().to_string())])
            .json(&json!({
                "sqlText": sql,
                "asyncExec": false,
                "sequenceId": self.sequence_id
            }))
            .send()
            .await?;

        let mut result: SnowflakeResponse<QueryData> = Self::parse(response).await?;
        while result.in_progress() {
            let result_url = result
                .data
                .as_ref()
                .and_then(|data| data.get_result_url.clone())
                .ok_or_else(|| {
                    SnowflakeError::CouldNotParseResponse(
                        "statement still running but no getResultUrl returned".to_string(),
                    )
                })?;

            debug!("Statement still running, polling {}", result_url);
            tokio::time::sleep(RESULT_POLL_INTERVAL).await;

            let response = self
                .client
                .get(format!("{}{}", self.base_url, result_url))
                .headers(Self::headers(Some(&token)))
                .send()
                .await?;
            result = Self::parse(response).await?;
        }

        if !result.success {
            let (code, message) = result.failure();
            return Err(SnowflakeError::StatementFailed { code, message });
        }

        Ok(result
            .data
            .and_then(|data| data.stats)
            .map(|stats| stats.num_rows_inserted + stats.num_rows_updated + stats.num_rows_deleted)
            .unwrap_or(0))
    }

    pub async fn close_session(&mut self) -> Result<(), SnowflakeError> {
        let Some(token) = self.token.take() else {
            return Ok(());
        };

        let response = self
            .client
            .post(format!("{}/session", self.base_url))
            .headers(Self::headers(Some(&token)))
            .query(&[("delete", "true")])
            .send()
            .await?;

        let _: SnowflakeResponse<serde_json::Value> = Self::parse(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Executor for SnowflakeClient {
    async fn execute(&mut self, sql: &str) -> Result<u64, ExecutionError> {
        Ok(self.query(sql).await?)
    }

    async fn commit(&mut self) -> Result<(), ExecutionError> {
        self.query("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), ExecutionError> {
        self.query("ROLLBACK").await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ExecutionError> {
        Ok(self.close_session().await?)
    }
}
