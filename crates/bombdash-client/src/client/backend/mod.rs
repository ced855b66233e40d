pub use self::http::HttpTransport;
#[cfg(any(test, feature = "test-util"))]
pub use self::memory::MemoryTransport;
pub use self::sync_service::BackendSyncService;
pub use self::transport::{ApiReply, ApiRequest, Method, Transport, TransportError};

pub mod api;
mod http;
#[cfg(any(test, feature = "test-util"))]
mod memory;
mod sync_service;
pub mod transport;
