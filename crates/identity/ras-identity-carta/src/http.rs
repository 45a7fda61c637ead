//! Outbound HTTP seam used for token exchange and profile requests.

use crate::error::{CartaError, CartaResult};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// An outgoing API request. Headers and form fields keep insertion order;
/// setting an existing name replaces its value.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: HttpMethod,
    url: String,
    headers: Vec<(String, String)>,
    fields: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            fields: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    /// Set a header. Header names are case-insensitive.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Set a form body field.
    pub fn field(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.fields.push((name, value)),
        }
        self
    }

    pub fn clear_field(&mut self, name: &str) -> &mut Self {
        self.fields.retain(|(existing, _)| existing != name);
        self
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

/// Status and raw body of a completed request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client collaborator. Implementations report network failures as
/// [`CartaError::Transport`] and return every completed response, whatever
/// its status.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> CartaResult<HttpResponse>;
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(http_timeout_seconds: u64) -> CartaResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(http_timeout_seconds))
            .build()
            .map_err(|e| CartaError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> CartaResult<HttpResponse> {
        let mut builder = match request.method() {
            HttpMethod::Get => self.client.get(request.url()),
            HttpMethod::Post => self.client.post(request.url()),
        };

        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if !request.fields().is_empty() {
            builder = builder.form(request.fields());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpResponse { status, body })
    }
}
