//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all legato-server endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::json;
use std::time::Duration;

/// HTTP test client
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Service Endpoints
    // ========================================================================

    /// GET /
    pub async fn home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("Home request failed")
    }

    /// GET /health
    pub async fn health(&self) -> Response {
        self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .expect("Health request failed")
    }

    // ========================================================================
    // Synthesis Endpoints
    // ========================================================================

    /// POST /synthesize
    ///
    /// The format field is omitted when `format` is None.
    pub async fn synthesize(&self, abc: &str, format: Option<&str>) -> Response {
        let body = match format {
            Some(format) => json!({ "abc": abc, "format": format }),
            None => json!({ "abc": abc }),
        };
        self.synthesize_raw(body).await
    }

    /// POST /synthesize with an arbitrary JSON body
    pub async fn synthesize_raw(&self, body: serde_json::Value) -> Response {
        self.client
            .post(format!("{}/synthesize", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Synthesize request failed")
    }

    /// CORS preflight for POST /synthesize from the given origin
    pub async fn preflight_synthesize(&self, origin: &str) -> Response {
        self.client
            .request(
                reqwest::Method::OPTIONS,
                format!("{}/synthesize", self.base_url),
            )
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .send()
            .await
            .expect("Preflight request failed")
    }
}
