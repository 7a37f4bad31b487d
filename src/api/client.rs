//! Resource Client
//!
//! Uniform access to any resource type of the management API. Every call is
//! addressed by a [`ResourcePath`] and, for single objects, an [`ObjectId`].
//! Failures never escape as errors: reads return `None`, writes return
//! [`Outcome::Failure`], and every call is logged either way.

use super::auth::Credentials;
use super::http::{sanitize_for_log, ApiResponse, HttpClient};
use super::types::{ObjectId, Outcome, ResourcePath};
use anyhow::{Context, Result};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use url::Url;

/// Client for the generic resource API
#[derive(Clone)]
pub struct ResourceClient {
    pub credentials: Credentials,
    pub http: HttpClient,
    base_url: String,
}

impl ResourceClient {
    /// Create a client rooted at `endpoint` (e.g. `https://intersight.com/api/v1`)
    pub fn new(endpoint: &str, credentials: Credentials, http: HttpClient) -> Result<Self> {
        let parsed = Url::parse(endpoint)
            .with_context(|| format!("Invalid API endpoint '{}'", endpoint))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("API endpoint must be http or https, got '{}'", parsed.scheme());
        }

        Ok(Self {
            credentials,
            http,
            base_url: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, relative: &str) -> String {
        format!("{}{}", self.base_url, relative)
    }

    /// Perform one authenticated exchange. Transport and credential errors
    /// are returned; HTTP statuses are not.
    ///
    /// A 401 drops the cached token and the request is sent once more with a
    /// freshly fetched one.
    pub async fn exchange(
        &self,
        method: Method,
        relative: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let url = self.url(relative);
        let token = self.credentials.get_token().await?;
        let response = self.http.send(method.clone(), &url, &token, body).await?;

        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::info!("Token rejected for '{}', refreshing and retrying once", relative);
        let token = self.credentials.refresh_token().await?;
        self.http.send(method, &url, &token, body).await
    }

    async fn read(&self, relative: String) -> Option<Value> {
        let response = match self.exchange(Method::GET, &relative, None).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Unable to access the resource path '{}': {:#}", relative, e);
                return None;
            }
        };

        if !response.is_success() {
            tracing::warn!(
                "Unable to access the resource path '{}': status {}",
                relative,
                response.status
            );
            return None;
        }

        // An empty body on a read carries no data; treat it as unknown
        if response.text.trim().is_empty() {
            tracing::warn!(
                "Unable to read the resource path '{}': empty response body",
                relative
            );
            return None;
        }

        match response.json() {
            Ok(value) => {
                tracing::info!("The resource path '{}' has been accessed successfully", relative);
                Some(value)
            }
            Err(e) => {
                tracing::warn!("Unable to read the resource path '{}': {:#}", relative, e);
                None
            }
        }
    }

    async fn write(
        &self,
        verb: &'static str,
        method: Method,
        relative: String,
        body: Option<&Value>,
    ) -> Outcome {
        let response = match self.exchange(method, &relative, body).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("The {} of '{}' failed: {:#}", verb, relative, e);
                return Outcome::Failure;
            }
        };

        let outcome = Outcome::from_status(response.status.as_u16());
        match outcome {
            Outcome::Success => {
                // A 2xx is a success even when the body reports a problem;
                // surface it in the log so the operator can spot it.
                if let Ok(value) = response.json() {
                    if looks_like_error(&value) {
                        tracing::warn!(
                            "The {} of '{}' returned {} with an error payload: {}",
                            verb,
                            relative,
                            response.status,
                            sanitize_for_log(&response.text)
                        );
                    }
                }
                tracing::info!("The {} of '{}' has been completed", verb, relative);
            }
            Outcome::Failure => {
                tracing::warn!(
                    "The {} of '{}' failed with status {}",
                    verb,
                    relative,
                    response.status
                );
            }
        }
        outcome
    }

    /// Read every object under `path`. `None` means unknown, not empty.
    pub async fn get_collection(&self, path: &ResourcePath) -> Option<Value> {
        self.read(path.collection()).await
    }

    /// Read one object
    pub async fn get_by_id(&self, path: &ResourcePath, id: &ObjectId) -> Option<Value> {
        self.read(path.object(id)).await
    }

    /// Submit `body` as a new object under `path`
    pub async fn create(&self, path: &ResourcePath, body: &Value) -> Outcome {
        self.write("creation", Method::POST, path.collection(), Some(body))
            .await
    }

    /// Full update of one object. The API updates objects with POST on the
    /// object URL.
    pub async fn replace(&self, path: &ResourcePath, id: &ObjectId, body: &Value) -> Outcome {
        self.write("update", Method::POST, path.object(id), Some(body))
            .await
    }

    /// Partial update of one object
    pub async fn merge_patch(&self, path: &ResourcePath, id: &ObjectId, body: &Value) -> Outcome {
        self.write("patch", Method::PATCH, path.object(id), Some(body))
            .await
    }

    /// Remove one object. A missing object is a failure.
    pub async fn delete(&self, path: &ResourcePath, id: &ObjectId) -> Outcome {
        self.write("deletion", Method::DELETE, path.object(id), None)
            .await
    }
}

/// Whether a 2xx body carries an API error envelope
pub fn looks_like_error(value: &Value) -> bool {
    let Some(map) = value.as_object() else {
        return false;
    };
    if map.get("errors").is_some_and(|v| !v.is_null()) {
        return true;
    }
    map.contains_key("code") && map.contains_key("message") && !map.contains_key("Moid")
}
