use std::rc::Rc;

use serde_json::Value;
use thiserror::Error;

use crate::client::error::SyncError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

/// One backend call, independent of the HTTP client used to make it
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    /// Bearer token, if the route is authenticated
    pub token: Option<String>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            token: None,
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            token: None,
            body: Some(body),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Raw reply: HTTP status plus the decoded JSON body (`Null` when empty)
#[derive(Clone, Debug, PartialEq)]
pub struct ApiReply {
    pub status: u16,
    pub body: Value,
}

/// The request never produced a usable reply
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("malformed response body: {0}")]
    Decode(String),
}

impl From<TransportError> for SyncError {
    fn from(error: TransportError) -> Self {
        SyncError::Transient(error.to_string())
    }
}

/// Seam between the sync service and the network.
///
/// Futures are awaited on the session's single thread, so they need not be
/// `Send`.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn send(&self, request: ApiRequest) -> Result<ApiReply, TransportError>;
}

impl<T: Transport> Transport for Rc<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiReply, TransportError> {
        (**self).send(request).await
    }
}
