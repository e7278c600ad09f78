use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use bytes::Bytes;
use tower::{retry::Policy, Layer, Service};
use tracing::debug;
use url::Url;

use super::{
    http::{HttpPost, HttpTransport},
    TransportError,
};

/// Resends a request body after a fixed backoff while the node stays
/// unreachable. Envelope-level failures reach the caller untouched; only
/// [`TransportError::is_transient`] failures are retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    backoff: Duration,
    retries: u32,
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(backoff: Duration, max_retries: u32) -> Self {
        Self {
            backoff,
            retries: 0,
            max_retries,
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn backoff(&self) -> tokio::time::Sleep {
        tokio::time::sleep(self.backoff)
    }
}

impl Policy<Bytes, Bytes, TransportError> for RetryPolicy {
    type Future = Pin<Box<dyn Future<Output = Self> + Send + 'static>>;

    fn retry(
        &self,
        _req: &Bytes,
        result: Result<&Bytes, &TransportError>,
    ) -> Option<Self::Future> {
        match result {
            Err(e) if e.is_transient() && self.retries < self.max_retries => {
                let mut policy = self.clone();
                Some(Box::pin(async move {
                    policy.backoff().await;
                    policy.retries += 1;
                    policy
                }))
            }
            _ => None,
        }
    }

    fn clone_request(&self, req: &Bytes) -> Option<Bytes> {
        Some(req.clone())
    }
}

/// Wraps a request service in a [`RetryService`] driven by `policy`.
pub struct RetryLayer {
    policy: RetryPolicy,
}

impl RetryLayer {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

/// Sends a request body through `inner`, sending it again for as long as the
/// policy allows.
#[derive(Debug, Clone)]
pub struct RetryService<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Service<Bytes> for RetryService<S>
where
    S: Service<Bytes, Response = Bytes, Error = TransportError> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Bytes;
    type Error = TransportError;
    type Future = Pin<Box<dyn Future<Output = Result<Bytes, TransportError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, body: Bytes) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let mut policy = self.policy.clone();

        Box::pin(async move {
            let mut result = inner.call(body.clone()).await;
            while let Some(next) = policy.retry(&body, result.as_ref()) {
                policy = next.await;
                debug!(attempt = policy.retries(), "retrying node request");
                std::future::poll_fn(|cx| inner.poll_ready(cx)).await?;
                result = inner.call(body.clone()).await;
            }
            result
        })
    }
}

pub fn build_http_retry_transport(
    rpc_url: Url,
    timeout: Duration,
    backoff: u64,
    max_retries: u32,
) -> Result<HttpTransport, TransportError> {
    let retry_layer = RetryLayer::new(RetryPolicy::new(
        Duration::from_millis(backoff),
        max_retries,
    ));
    let post = HttpPost::new(rpc_url, timeout)?;
    Ok(HttpTransport::new(retry_layer.layer(post)))
}
