pub mod account_config;
pub mod backend_config;
pub mod dash_config;
pub mod paths;

pub use account_config::AccountConfig;
pub use backend_config::{BackendConfig, RetryConfig};
pub use dash_config::{ConfigLoadError, DashConfig, GateConfig, LoggingConfig};
pub use paths::ProjectPaths;
