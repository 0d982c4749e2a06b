use crate::config::toml_config::RasterConfig;
use crate::core::reduction::ReduceRegionRequest;
use crate::domain::model::BandValues;
use crate::core::ports::RasterBackend;
use crate::utils::error::{AnalyticsError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

const BACKEND: &str = "earth engine";

/// Raster engine client: one `reduceRegion` POST per pass.
pub struct EarthEngineClient {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl EarthEngineClient {
    pub fn new(config: &RasterConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()?;
        if config.token.is_none() {
            tracing::warn!("⚠️ No raster engine token configured, requests are unauthenticated");
        }
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn reduce_url(&self) -> String {
        format!("{}/reduceRegion", self.endpoint)
    }

    fn unavailable(reason: impl Into<String>) -> AnalyticsError {
        AnalyticsError::BackendUnavailable {
            backend: BACKEND.to_string(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RasterBackend for EarthEngineClient {
    async fn reduce_region(&self, request: &ReduceRegionRequest) -> Result<BandValues> {
        let mut builder = self.client.post(self.reduce_url()).json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        tracing::debug!("Raster request: {}", serde_json::to_string(request)?);
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Self::unavailable("request timed out")
            } else {
                Self::unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Self::unavailable(format!("HTTP {} {}", status, detail.trim())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Self::unavailable(e.to_string()))?;
        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(bands)) => Ok(bands),
            Ok(other) => Err(AnalyticsError::MalformedBackendResponse {
                backend: BACKEND.to_string(),
                reason: format!("expected a band mapping, got {}", other),
            }),
            Err(e) => Err(AnalyticsError::MalformedBackendResponse {
                backend: BACKEND.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reduction::{area_request, ReduceArgs};
    use crate::domain::model::ReductionParams;
    use httpmock::prelude::*;
    use serde_json::json;

    fn request() -> ReduceRegionRequest {
        let geometry = json!({"type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]});
        let args = ReduceArgs::from_geometry(&geometry, &ReductionParams::default()).unwrap();
        area_request("HANSEN/all", &args)
    }

    fn client_for(server: &MockServer, token: Option<&str>) -> EarthEngineClient {
        EarthEngineClient::new(&RasterConfig {
            endpoint: server.url("/v1/"),
            timeout_seconds: 5,
            token: token.map(str::to_string),
            assets: Default::default(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_reduce_region_posts_expression_with_token() {
        let server = MockServer::start();
        let expected_body = serde_json::to_value(request()).unwrap();

        let api_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/reduceRegion")
                .header("Authorization", "Bearer ee-token")
                .json_body(expected_body);
            then.status(200)
                .json_body(json!({"loss": 1.25, "gain": 0.5}));
        });

        let client = client_for(&server, Some("ee-token"));
        let bands = client.reduce_region(&request()).await.unwrap();

        api_mock.assert();
        assert_eq!(bands.get("loss"), Some(&json!(1.25)));
        assert_eq!(bands.len(), 2);
    }

    #[test]
    fn test_wire_format_of_area_pass() {
        let wire = serde_json::to_value(request()).unwrap();
        assert_eq!(wire["reducer"], "sum");
        assert_eq!(wire["scale"], 90);
        assert_eq!(wire["bestEffort"], true);
        assert_eq!(wire["image"]["op"], "multiply");
        assert_eq!(wire["image"]["right"]["op"], "pixelArea");
        assert_eq!(wire["image"]["left"]["op"], "divide");
        assert_eq!(wire["image"]["left"]["left"], json!({"op": "asset", "id": "HANSEN/all"}));
    }

    #[tokio::test]
    async fn test_error_status_is_unavailable() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST).path("/v1/reduceRegion");
            then.status(503).body("quota exceeded");
        });

        let client = client_for(&server, None);
        let err = client.reduce_region(&request()).await.unwrap_err();

        api_mock.assert();
        assert!(matches!(err, AnalyticsError::BackendUnavailable { .. }));
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_non_object_body_is_malformed() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/reduceRegion");
            then.status(200).json_body(json!([1, 2, 3]));
        });

        let client = client_for(&server, None);
        let err = client.reduce_region(&request()).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::MalformedBackendResponse { .. }));
    }
}
