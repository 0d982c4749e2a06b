use crate::config::toml_config::TabularConfig;
use crate::core::query::SqlQuery;
use crate::domain::model::{BackendFailure, RawBackendResult, Row};
use crate::core::ports::{ExecuteOptions, TabularBackend};
use crate::utils::error::{AnalyticsError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const BACKEND: &str = "cartodb";

#[derive(Debug, Deserialize)]
struct SqlApiResponse {
    rows: Vec<Row>,
}

/// CartoDB SQL API client.
pub struct CartoDbClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl CartoDbClient {
    pub fn new(config: &TabularConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// 執行查詢並解析 rows
    async fn fetch_rows(&self, statement: &str, options: ExecuteOptions) -> Result<Vec<Row>> {
        let mut request = self.client.get(&self.endpoint).query(&[("q", statement)]);

        if options.with_api_key {
            match &self.api_key {
                Some(key) => request = request.query(&[("api_key", key.as_str())]),
                None => tracing::warn!("⚠️ API key requested but none is configured"),
            }
        }

        tracing::info!("📡 CartoDB query: {}", statement);
        let response = request
            .send()
            .await
            .map_err(|e| AnalyticsError::BackendUnavailable {
                backend: BACKEND.to_string(),
                reason: if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        tracing::debug!("CartoDB response status: {}", status);
        if status != reqwest::StatusCode::OK {
            return Err(AnalyticsError::BackendUnavailable {
                backend: BACKEND.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| AnalyticsError::BackendUnavailable {
                backend: BACKEND.to_string(),
                reason: e.to_string(),
            })?;
        let parsed: SqlApiResponse =
            serde_json::from_str(&body).map_err(|e| AnalyticsError::MalformedBackendResponse {
                backend: BACKEND.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!("CartoDB returned {} row(s)", parsed.rows.len());
        Ok(parsed.rows)
    }
}

#[async_trait]
impl TabularBackend for CartoDbClient {
    async fn execute(&self, query: &SqlQuery, options: ExecuteOptions) -> RawBackendResult {
        let statement = match query.render() {
            Ok(statement) => statement,
            Err(e) => {
                tracing::error!("❌ Could not render {:?}: {}", query.template(), e);
                return RawBackendResult::BackendFailure(BackendFailure::from_error(&e));
            }
        };

        match self.fetch_rows(&statement, options).await {
            Ok(rows) => RawBackendResult::TabularRows(rows),
            Err(e @ AnalyticsError::MalformedBackendResponse { .. }) => {
                tracing::warn!("⚠️ {} for query: {}", e, statement);
                RawBackendResult::BackendFailure(BackendFailure::from_error(&e))
            }
            Err(e) => {
                tracing::error!("❌ CartoDB SQL API error: {} {}", e, statement);
                RawBackendResult::BackendFailure(BackendFailure::from_error(&e))
            }
        }
    }
}
