pub mod client;
pub mod config;
pub mod storage;

pub use self::client::{
    BackendSyncService, Bcoin, Credentials, Hero, Scene, SceneKey, SceneStateMachine, Session,
    SessionRegistry, SyncError, WagerTier,
};
pub use self::storage::{TokenStore, TokenStoreError};
