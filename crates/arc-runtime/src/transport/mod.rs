//! Raw request primitive: one request, one completion.

pub mod directory;
pub mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use arc_core::FormData;

use crate::types::{RuntimeError, RuntimeResult};

pub use directory::DirectoryTransport;
pub use http::HttpTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get { url: String },
    /// Form-urlencoded POST.
    Post { url: String, body: String },
    Multipart { url: String, form: FormData },
}

impl Request {
    pub fn url(&self) -> &str {
        match self {
            Request::Get { url } | Request::Post { url, .. } | Request::Multipart { url, .. } => url,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Request::Get { .. } => "GET",
            Request::Post { .. } => "POST",
            Request::Multipart { .. } => "MULTIPART",
        }
    }
}

/// Issues a single request and resolves with the body of a 2xx response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request) -> RuntimeResult<String>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: Request) -> RuntimeResult<String> {
        (**self).send(request).await
    }
}

/// Send with an optional deadline. `None` waits as long as the transport does.
pub async fn send_with_timeout(
    transport: &dyn Transport,
    request: Request,
    timeout: Option<Duration>,
) -> RuntimeResult<String> {
    match timeout {
        None => transport.send(request).await,
        Some(limit) => tokio::time::timeout(limit, transport.send(request))
            .await
            .map_err(|_| RuntimeError::Timeout(limit.as_millis() as u64))?,
    }
}

/// Picks the transport a base URL needs: `file://` bases are served from
/// disk, everything else over HTTP.
pub fn for_base(
    base: &url::Url,
    timeout: Option<Duration>,
) -> RuntimeResult<Arc<dyn Transport>> {
    if base.scheme() == "file" {
        let root = base
            .to_file_path()
            .map_err(|_| RuntimeError::Config(format!("Not a local path: {base}")))?;
        Ok(Arc::new(DirectoryTransport::new(root)))
    } else {
        Ok(Arc::new(HttpTransport::new(timeout)?))
    }
}
