use std::{
    future::{poll_fn, Future},
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, StatusCode};
use tower::Service;
use url::Url;

use super::{retry::RetryService, RpcRequest, RpcTransport, TransportError};

/// Idle connections kept open to the node between calls.
const MAX_IDLE_CONNECTIONS: usize = 10;

/// Posts one encoded request body to the node and yields the response body.
#[derive(Debug, Clone)]
pub struct HttpPost {
    client: reqwest::Client,
    url: Url,
}

impl HttpPost {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS)
            .pool_idle_timeout(None)
            .timeout(timeout)
            .build()?;
        Ok(Self { client, url })
    }
}

impl Service<Bytes> for HttpPost {
    type Response = Bytes;
    type Error = TransportError;
    type Future = Pin<Box<dyn Future<Output = Result<Bytes, TransportError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, body: Bytes) -> Self::Future {
        let request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        Box::pin(async move {
            let response = request.send().await?;

            // Envelope errors come back with any status; only gateway-level
            // failures are reported by status alone.
            let status = response.status();
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                return Err(TransportError::Status(status.as_u16()));
            }
            Ok(response.bytes().await?)
        })
    }
}

/// JSON-RPC transport to a single node over a pooled HTTP client, with
/// transient failures retried by the wrapped service.
#[derive(Debug, Clone)]
pub struct HttpTransport<S = RetryService<HttpPost>> {
    service: S,
}

impl<S> HttpTransport<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

impl<S> RpcTransport for HttpTransport<S>
where
    S: Service<Bytes, Response = Bytes, Error = TransportError> + Clone + Send + Sync,
    S::Future: Send,
{
    async fn send(&self, request: &RpcRequest) -> Result<Bytes, TransportError> {
        let body = Bytes::from(serde_json::to_vec(request).map_err(TransportError::Encode)?);

        let mut service = self.service.clone();
        poll_fn(|cx| service.poll_ready(cx)).await?;
        service.call(body).await
    }
}
