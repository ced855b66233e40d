use thiserror::Error;

use crate::client::bcoin::Bcoin;
use crate::client::scene::SceneKey;
use crate::client::types::HeroId;

/// Client-side rejection. Raised before any backend call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("insufficient BCOIN: need {required}, have {available}")]
    InsufficientCoins { required: Bcoin, available: Bcoin },
    #[error("insufficient hero XP: need {required}, have {available}")]
    InsufficientXp { required: u64, available: u64 },
    #[error("hero {0} must be staked before it can play")]
    NotStaked(HeroId),
    #[error("hero {0} is not in the roster")]
    UnknownHero(HeroId),
    #[error("wager tier {0} is not offered")]
    UnknownTier(u64),
    #[error("no hero selected")]
    NoHeroSelected,
    #[error("no active session")]
    NoSession,
}

/// Every way a backend sync can fail, normalized for the initiating scene
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Network failure or timeout. Retryable, nothing was mutated.
    #[error("network error: {0}")]
    Transient(String),
    /// Token rejected; the session must be cleared
    #[error("authentication expired")]
    AuthExpired,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Response arrived after its scene was torn down; discarded
    #[error("stale response for {scene}")]
    StaleResponse { scene: SceneKey },
    /// Backend answered `success: false`
    #[error("request rejected: {0}")]
    Rejected(String),
    /// Session data is missing or corrupt; only a return to boot recovers
    #[error("unrecoverable session state: {0}")]
    Fatal(String),
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient(_))
    }
}

/// Why a gate refused entry into a scene
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateFailure {
    #[error("requires an authenticated session")]
    NoSession,
    #[error("requires account level {required} (current {actual})")]
    AccountLevel { required: u32, actual: u32 },
    #[error("requires a selected hero")]
    NoHeroSelected,
    #[error("hero {0} cannot enter play until staked")]
    HeroNotPlayable(HeroId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    #[error("scene {0} is not active")]
    NotActive(SceneKey),
    #[error("scene {scene} refused: {reason}")]
    GateRefused { scene: SceneKey, reason: GateFailure },
    #[error("overlay {overlay} needs {host} to be the active scene")]
    HostInactive { overlay: SceneKey, host: SceneKey },
    #[error("primary scene {0} can only be replaced, not stopped")]
    PrimaryRequired(SceneKey),
    #[error("transition queue did not settle after {0} rounds")]
    TransitionLoop(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no active session")]
    NoSession,
    #[error("hero {0} is not in the roster")]
    UnknownHero(HeroId),
}

impl From<RegistryError> for SyncError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::NoSession => SyncError::Fatal("session disappeared".to_string()),
            RegistryError::UnknownHero(id) => {
                SyncError::Validation(ValidationError::UnknownHero(id))
            }
        }
    }
}
