//! HTTP exchange backed by `reqwest`.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::trace;

use crate::error::Result;
use crate::protocol::AjaxRequest;

use super::{Exchange, RawResponse, StageReporter};

// ============================================================================
// HttpExchange
// ============================================================================

/// POSTs the form-encoded request and reads the body chunk by chunk.
#[derive(Debug, Clone)]
pub struct HttpExchange {
    client: Client,
}

impl HttpExchange {
    /// Creates an exchange with a default client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`](crate::Error::Http) if the client cannot be
    /// initialized.
    pub fn new() -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    /// Creates an exchange over an existing client.
    #[inline]
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Exchange for HttpExchange {
    async fn exchange(
        &self,
        request: &AjaxRequest,
        reporter: &mut StageReporter,
    ) -> Result<RawResponse> {
        let mut builder = self.client.post(request.url.clone());
        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }

        let mut response = builder.body(request.form_body()).send().await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        reporter.headers_received(status);

        let total = response.content_length();
        let mut body: Vec<u8> = Vec::with_capacity(total.unwrap_or(0).min(1 << 20) as usize);

        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            reporter.loading(percent(body.len() as u64, total));
        }

        trace!(request_id = %request.id, status, bytes = body.len(), "Response read");

        Ok(RawResponse {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
            content_type,
        })
    }
}

fn percent(read: u64, total: Option<u64>) -> Option<u8> {
    match total {
        Some(0) | None => None,
        Some(total) => Some((read.saturating_mul(100) / total).min(100) as u8),
    }
}

// ============================================================================
// Tests
// ============================================================================
