//! Thin client for the host's REST API.
//!
//! One method per endpoint, no logic beyond URL templating and uniform
//! response folding: the host answers `true`/`false` text, JSON, or plain
//! text, which all collapse into [`RestValue`]. A failed call is a failed
//! one-shot - the rack logs it and moves on, it never retries a structural
//! mutation on its own.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// A host response, whatever shape it took.
#[derive(Debug, Clone, PartialEq)]
pub enum RestValue {
    Bool(bool),
    Json(serde_json::Value),
    Text(String),
    Null,
}

impl RestValue {
    /// Whether this response means "yes".
    pub fn is_true(&self) -> bool {
        matches!(self, RestValue::Bool(true))
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            RestValue::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// REST call failures. All recoverable; none are fatal to the rack.
#[derive(Debug, Error)]
pub enum RestError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("host returned HTTP {status} for {path}")]
    Status { status: u16, path: String },
}

/// The surface of the host API the orchestrator needs.
///
/// Methods return `false`/`None` on failure rather than errors: per the
/// error model, one-shot request failures are reported to the caller as a
/// failed boolean and logged, nothing more. The production implementation
/// is [`RestClient`]; tests substitute a recording double.
#[async_trait]
pub trait EffectApi: Send + Sync {
    /// Fetch port and parameter metadata for an effect by URI.
    async fn effect_get(&self, uri: &str) -> Option<serde_json::Value>;

    /// Ask the host to load an effect instance at a canvas position.
    async fn effect_add(&self, label: &str, uri: &str, x: f64, y: f64)
        -> Option<serde_json::Value>;

    /// Ask the host to remove an effect instance.
    async fn effect_remove(&self, label: &str) -> bool;

    /// Connect two ports, addressed by bare graph path.
    async fn connect_ports(&self, output: &str, input: &str) -> bool;

    /// Disconnect two ports.
    async fn disconnect_ports(&self, output: &str, input: &str) -> bool;

    /// Set an instance's canvas position.
    async fn set_position(&self, label: &str, x: f64, y: f64) -> bool;

    /// Set a parameter out-of-band.
    async fn param_set(&self, label: &str, symbol: &str, value: f64) -> bool;

    /// Remove everything on the host.
    async fn reset(&self) -> bool;
}

/// Production [`EffectApi`] over HTTP.
pub struct RestClient {
    base_url: String,
    http: reqwest::Client,
    // The catalogue is static for the host's lifetime; fetch it once.
    effect_list: tokio::sync::Mutex<Option<Vec<serde_json::Value>>>,
}

impl RestClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RestError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            effect_list: tokio::sync::Mutex::new(None),
        })
    }

    /// Catalogue of effects available on the host, fetched once and
    /// cached.
    pub async fn effect_list(&self) -> Option<Vec<serde_json::Value>> {
        let mut cached = self.effect_list.lock().await;
        if let Some(list) = cached.as_ref() {
            return Some(list.clone());
        }
        match self.get("/effect/list", &[]).await {
            Ok(RestValue::Json(serde_json::Value::Array(list))) => {
                *cached = Some(list.clone());
                Some(list)
            }
            Ok(other) => {
                tracing::warn!(response = ?other, "unexpected effect list response");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "effect list failed");
                None
            }
        }
    }

    /// Host liveness probe.
    pub async fn ping(&self) -> bool {
        self.get("/ping", &[]).await.is_ok()
    }

    /// Toggle an instance's bypass out-of-band. On the wire this is the
    /// `:bypass` pseudo-parameter.
    pub async fn effect_bypass(&self, label: &str, bypassed: bool) -> bool {
        let value = if bypassed { 1.0 } else { 0.0 };
        EffectApi::param_set(self, label, ":bypass", value).await
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<RestValue, RestError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "GET");

        let response = self.http.get(&url).query(query).send().await?;
        Self::fold_response(path, response).await
    }

    async fn post_text(&self, path: &str, payload: String) -> Result<RestValue, RestError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, payload = %payload, "POST");

        let response = self
            .http
            .post(&url)
            .header("Content-Type", "text/plain")
            .body(payload)
            .send()
            .await?;
        Self::fold_response(path, response).await
    }

    /// Collapse a response into [`RestValue`]: bare `true`/`false` text,
    /// then JSON, then plain text, then nothing.
    async fn fold_response(
        path: &str,
        response: reqwest::Response,
    ) -> Result<RestValue, RestError> {
        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(RestError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            });
        }

        let text = response.text().await?;
        let trimmed = text.trim();

        if trimmed.eq_ignore_ascii_case("true") {
            return Ok(RestValue::Bool(true));
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Ok(RestValue::Bool(false));
        }
        if let Ok(json) = serde_json::from_str(trimmed) {
            return Ok(RestValue::Json(json));
        }
        if trimmed.is_empty() {
            return Ok(RestValue::Null);
        }
        Ok(RestValue::Text(trimmed.to_string()))
    }

    /// Log-and-degrade wrapper for boolean endpoints.
    async fn get_bool(&self, path: &str) -> bool {
        match self.get(path, &[]).await {
            Ok(value) => value.is_true(),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "host call failed");
                false
            }
        }
    }
}

#[async_trait]
impl EffectApi for RestClient {
    async fn effect_get(&self, uri: &str) -> Option<serde_json::Value> {
        match self.get("/effect/get", &[("uri", uri.to_string())]).await {
            Ok(RestValue::Json(value)) => Some(value),
            Ok(other) => {
                tracing::warn!(uri = %uri, response = ?other, "unexpected effect metadata");
                None
            }
            Err(e) => {
                tracing::warn!(uri = %uri, error = %e, "effect metadata fetch failed");
                None
            }
        }
    }

    async fn effect_add(
        &self,
        label: &str,
        uri: &str,
        x: f64,
        y: f64,
    ) -> Option<serde_json::Value> {
        let path = format!("/effect/add//graph/{label}");
        let query = [
            ("uri", uri.to_string()),
            ("x", x.to_string()),
            ("y", y.to_string()),
        ];
        match self.get(&path, &query).await {
            Ok(RestValue::Json(value)) => Some(value),
            Ok(other) => {
                tracing::warn!(label = %label, response = ?other, "unexpected add response");
                None
            }
            Err(e) => {
                tracing::warn!(label = %label, error = %e, "effect add failed");
                None
            }
        }
    }

    async fn effect_remove(&self, label: &str) -> bool {
        self.get_bool(&format!("/effect/remove//graph/{label}")).await
    }

    async fn connect_ports(&self, output: &str, input: &str) -> bool {
        self.get_bool(&format!("/effect/connect//graph/{output},/graph/{input}"))
            .await
    }

    async fn disconnect_ports(&self, output: &str, input: &str) -> bool {
        self.get_bool(&format!(
            "/effect/disconnect//graph/{output},/graph/{input}"
        ))
        .await
    }

    async fn set_position(&self, label: &str, x: f64, y: f64) -> bool {
        self.get_bool(&format!("/effect/position//graph/{label}/{x}/{y}"))
            .await
    }

    async fn param_set(&self, label: &str, symbol: &str, value: f64) -> bool {
        match self
            .post_text(
                "/effect/parameter/set/",
                format!("/graph/{label}/{symbol}/{value}"),
            )
            .await
        {
            Ok(value) => value.is_true(),
            Err(e) => {
                tracing::warn!(label = %label, symbol = %symbol, error = %e, "param set failed");
                false
            }
        }
    }

    async fn reset(&self) -> bool {
        self.get_bool("/reset").await
    }
}
