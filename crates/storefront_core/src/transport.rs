use std::{fmt, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use shared::{
    domain::{CartLineId, UserId},
    protocol::{AddCartLineRequest, UpdateCartLineRequest},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{config::StorefrontConfig, error::TransportError};

/// Catalog endpoint path plus its query parameters, in send order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRequest {
    pub path: &'static str,
    pub query: Vec<(&'static str, String)>,
}

impl CatalogRequest {
    pub fn new(path: &'static str) -> Self {
        Self {
            path,
            query: Vec::new(),
        }
    }

    pub fn param(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.query.push((key, value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Path with the url-encoded query string, as it goes over the wire.
    pub fn describe(&self) -> String {
        if self.query.is_empty() {
            return self.path.to_string();
        }
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter().map(|(k, v)| (*k, v.as_str())))
            .finish();
        format!("{}?{encoded}", self.path)
    }
}

impl fmt::Display for CatalogRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Network boundary of the storefront core. Responses are returned raw and
/// shaped by [`crate::normalize`].
#[async_trait]
pub trait CommerceTransport: Send + Sync {
    /// Must stop work and return [`TransportError::Cancelled`] once `cancel`
    /// fires.
    async fn fetch_catalog(
        &self,
        request: &CatalogRequest,
        cancel: CancellationToken,
    ) -> Result<Value, TransportError>;
    async fn fetch_cart(&self, user_id: &UserId) -> Result<Value, TransportError>;
    async fn add_cart_line(&self, request: &AddCartLineRequest) -> Result<Value, TransportError>;
    async fn update_cart_line(
        &self,
        line_id: &CartLineId,
        request: &UpdateCartLineRequest,
    ) -> Result<Value, TransportError>;
    async fn remove_cart_line(&self, line_id: &CartLineId) -> Result<Value, TransportError>;
}

pub struct MissingTransport;

fn unavailable() -> TransportError {
    TransportError::Connect("commerce transport is unavailable".to_string())
}

#[async_trait]
impl CommerceTransport for MissingTransport {
    async fn fetch_catalog(
        &self,
        _request: &CatalogRequest,
        _cancel: CancellationToken,
    ) -> Result<Value, TransportError> {
        Err(unavailable())
    }

    async fn fetch_cart(&self, _user_id: &UserId) -> Result<Value, TransportError> {
        Err(unavailable())
    }

    async fn add_cart_line(&self, _request: &AddCartLineRequest) -> Result<Value, TransportError> {
        Err(unavailable())
    }

    async fn update_cart_line(
        &self,
        _line_id: &CartLineId,
        _request: &UpdateCartLineRequest,
    ) -> Result<Value, TransportError> {
        Err(unavailable())
    }

    async fn remove_cart_line(&self, _line_id: &CartLineId) -> Result<Value, TransportError> {
        Err(unavailable())
    }
}

pub struct HttpTransport {
    http: Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token: None,
        }
    }

    pub fn from_config(config: &StorefrontConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("failed to build storefront http client")?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `/api/cart/{line_id}` with the id encoded as a single path segment.
    fn line_url(&self, line_id: &CartLineId) -> Result<url::Url, TransportError> {
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|err| TransportError::Connect(format!("invalid base url: {err}")))?;
        url.path_segments_mut()
            .map_err(|()| TransportError::Connect(format!("invalid base url: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "cart", line_id.as_str()]);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, TransportError> {
        let request = match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|err| TransportError::Decode(err.to_string()))
    }
}

#[async_trait]
impl CommerceTransport for HttpTransport {
    async fn fetch_catalog(
        &self,
        request: &CatalogRequest,
        cancel: CancellationToken,
    ) -> Result<Value, TransportError> {
        debug!(request = %request, "http: catalog request");
        let builder = self.http.get(self.url(request.path)).query(&request.query);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            response = self.send(builder) => response,
        }
    }

    async fn fetch_cart(&self, user_id: &UserId) -> Result<Value, TransportError> {
        let builder = self
            .http
            .get(self.url("/api/cart"))
            .query(&[("userId", user_id.as_str())]);
        self.send(builder).await
    }

    async fn add_cart_line(&self, request: &AddCartLineRequest) -> Result<Value, TransportError> {
        self.send(self.http.post(self.url("/api/cart/add")).json(request))
            .await
    }

    async fn update_cart_line(
        &self,
        line_id: &CartLineId,
        request: &UpdateCartLineRequest,
    ) -> Result<Value, TransportError> {
        let url = self.line_url(line_id)?;
        self.send(self.http.put(url).json(request)).await
    }

    async fn remove_cart_line(&self, line_id: &CartLineId) -> Result<Value, TransportError> {
        let url = self.line_url(line_id)?;
        self.send(self.http.delete(url)).await
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
