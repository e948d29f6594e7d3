//! Generation backend client

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;

use super::request::ExpandRequest;
use super::stream::{ByteStream, StreamError};

/// Source of streamed explanations.
///
/// Implementations return as soon as the response headers are in; the body
/// is consumed through the returned stream.
#[async_trait]
pub trait ExpansionBackend: Send + Sync + 'static {
    async fn open_stream(&self, request: &ExpandRequest) -> Result<ByteStream, StreamError>;
}

/// Backend reached over HTTP, streaming a plain-text body
pub struct HttpBackend {
    client: Client,
    endpoint: String,
}

impl HttpBackend {
    pub fn new(
        base_url: &str,
        expand_path: &str,
        connect_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        // No overall timeout: explanations stream for as long as the model writes
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        Ok(Self {
            client,
            endpoint: join_url(base_url, expand_path),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ExpansionBackend for HttpBackend {
    async fn open_stream(&self, request: &ExpandRequest) -> Result<ByteStream, StreamError> {
        log::debug!(
            "POST {} for slide {}",
            self.endpoint,
            request.slide_number
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .json(request)
            .send()
            .await
            .map_err(|e| StreamError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
            return Err(StreamError::status(status.as_u16(), body));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| StreamError::transport(e.to_string())));
        Ok(Box::pin(body))
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_base_and_path() {
        assert_eq!(
            join_url("http://127.0.0.1:8000/", "/api/v1/expand"),
            "http://127.0.0.1:8000/api/v1/expand"
        );
        assert_eq!(
            join_url("http://host", "api/v1/expand"),
            "http://host/api/v1/expand"
        );
    }

    #[test]
    fn endpoint_is_precomputed() {
        let backend =
            HttpBackend::new("http://localhost:9000", "/api/v1/expand", Duration::from_secs(1))
                .unwrap();
        assert_eq!(backend.endpoint(), "http://localhost:9000/api/v1/expand");
    }
}
