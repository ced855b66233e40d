use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

use serde_json::{json, Value};

use crate::client::backend::transport::{ApiReply, ApiRequest, Method, Transport, TransportError};

type Scripted = Result<ApiReply, TransportError>;

/// Scripted in-process backend.
///
/// Replies are queued per route and consumed in order; the last reply of a
/// route is repeated once the queue runs down to it. Unscripted routes answer
/// 404. Every request is recorded.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    routes: RefCell<HashMap<(Method, String), VecDeque<Scripted>>>,
    sent: RefCell<Vec<ApiRequest>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.script(method, path, Ok(ApiReply { status, body }))
    }

    pub fn fail(&self, method: Method, path: &str, error: TransportError) -> &Self {
        self.script(method, path, Err(error))
    }

    fn script(&self, method: Method, path: &str, reply: Scripted) -> &Self {
        self.routes
            .borrow_mut()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    /// Every request received so far, oldest first
    pub fn sent(&self) -> Vec<ApiRequest> {
        self.sent.borrow().clone()
    }

    pub fn sent_to(&self, path: &str) -> usize {
        self.sent.borrow().iter().filter(|r| r.path == path).count()
    }
}

impl Transport for MemoryTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiReply, TransportError> {
        let key = (request.method, request.path.clone());
        self.sent.borrow_mut().push(request);

        // Behave like a real suspension point
        tokio::task::yield_now().await;

        let mut routes = self.routes.borrow_mut();
        let reply = match routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        reply.unwrap_or_else(|| {
            Ok(ApiReply {
                status: 404,
                body: json!({ "success": false, "message": format!("no route {}", key.1) }),
            })
        })
    }
}
