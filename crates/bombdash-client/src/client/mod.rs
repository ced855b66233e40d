// Re-export main types
pub use self::backend::{BackendSyncService, HttpTransport, Transport};
pub use self::bcoin::{Bcoin, BcoinParseError};
pub use self::economy::HeroEligibility;
pub use self::error::{GateFailure, RegistryError, SceneError, SyncError, ValidationError};
pub use self::registry::{RegistryEntry, RegistryKey, SessionRegistry, SessionView};
pub use self::scene::{
    Layer, Scene, SceneContext, SceneDescriptor, SceneGate, SceneKey, ScenePayload,
};
pub use self::scene_machine::SceneStateMachine;
pub use self::session::{Credentials, Session};
pub use self::ticket::{GenerationTracker, SceneTicket};
pub use self::transition_queue::{SceneRequest, TransitionQueue};
pub use self::types::{Hero, HeroId, HeroKind, HeroStats, LifecycleStatus, RankingEntry, TierId, UserId, WagerTier};

// Re-export event types so scenes need only this crate
pub use bombdash_events::{BalanceUpdate, ClientEvent, EventBus, EventKind, SubscriptionId};

pub mod backend;
mod bcoin;
pub mod constants;
pub mod economy;
mod error;
mod registry;
mod scene;
mod scene_machine;
mod session;
mod ticket;
mod transition_queue;
pub mod types;
