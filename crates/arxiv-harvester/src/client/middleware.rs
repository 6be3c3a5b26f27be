//! Middleware for the HTTP client.
//!
//! Every outbound request is traced with its method, URL, status and latency,
//! independent of how the harvest loop interprets the response.

use std::time::Instant;

use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};

/// Emits one `tracing` event per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestTracing;

#[async_trait::async_trait]
impl Middleware for RequestTracing {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let method = req.method().clone();
        let url = req.url().clone();
        let started = Instant::now();

        let result = next.run(req, extensions).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => tracing::debug!(
                %method,
                %url,
                status = response.status().as_u16(),
                elapsed_ms,
                "HTTP request"
            ),
            Err(e) => tracing::debug!(%method, %url, error = %e, elapsed_ms, "HTTP request failed"),
        }

        result
    }
}
