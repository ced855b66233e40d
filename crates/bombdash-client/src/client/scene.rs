use std::fmt;

use bombdash_events::EventBus;

use crate::client::bcoin::Bcoin;
use crate::client::economy;
use crate::client::error::GateFailure;
use crate::client::registry::{SessionRegistry, SessionView};
use crate::client::transition_queue::TransitionQueue;
use crate::client::types::{HeroId, TierId};

/// Every scene the client knows about
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SceneKey {
    Boot,
    Loading,
    Terms,
    AuthChoice,
    MainMenu,
    CharacterSelection,
    GameSession,
    Hud,
    Pause,
    Notification,
    Profile,
    Altar,
    Pvp,
    Forge,
    Config,
    Ranking,
    GameOver,
}

impl SceneKey {
    pub const ALL: [SceneKey; 17] = [
        SceneKey::Boot,
        SceneKey::Loading,
        SceneKey::Terms,
        SceneKey::AuthChoice,
        SceneKey::MainMenu,
        SceneKey::CharacterSelection,
        SceneKey::GameSession,
        SceneKey::Hud,
        SceneKey::Pause,
        SceneKey::Notification,
        SceneKey::Profile,
        SceneKey::Altar,
        SceneKey::Pvp,
        SceneKey::Forge,
        SceneKey::Config,
        SceneKey::Ranking,
        SceneKey::GameOver,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SceneKey::Boot => "boot",
            SceneKey::Loading => "loading",
            SceneKey::Terms => "terms-acceptance",
            SceneKey::AuthChoice => "auth-choice",
            SceneKey::MainMenu => "main-menu",
            SceneKey::CharacterSelection => "character-selection",
            SceneKey::GameSession => "game-session",
            SceneKey::Hud => "hud",
            SceneKey::Pause => "pause",
            SceneKey::Notification => "notification",
            SceneKey::Profile => "profile",
            SceneKey::Altar => "altar",
            SceneKey::Pvp => "pvp",
            SceneKey::Forge => "forge",
            SceneKey::Config => "config",
            SceneKey::Ranking => "ranking",
            SceneKey::GameOver => "game-over",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|key| key.name() == name)
    }
}

impl fmt::Display for SceneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layer {
    /// Exclusive: exactly one primary scene is active at a time
    Primary,
    /// Layered on top of the primary scene
    Overlay,
}

/// Entry condition evaluated against the session before a scene starts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneGate {
    Authenticated,
    /// Account level at least this high
    AccountLevel(u32),
    /// A hero is selected and allowed to play (tokenized heroes must be staked)
    PlayableHero,
}

impl SceneGate {
    pub fn check(&self, registry: &SessionRegistry) -> Result<(), GateFailure> {
        let session = registry.session().ok_or(GateFailure::NoSession)?;
        match *self {
            SceneGate::Authenticated => Ok(()),
            SceneGate::AccountLevel(required) if session.account_level < required => {
                Err(GateFailure::AccountLevel {
                    required,
                    actual: session.account_level,
                })
            }
            SceneGate::AccountLevel(_) => Ok(()),
            SceneGate::PlayableHero => {
                let hero = registry.selected_hero().ok_or(GateFailure::NoHeroSelected)?;
                if economy::can_enter_play(&hero) {
                    Ok(())
                } else {
                    Err(GateFailure::HeroNotPlayable(hero.hero_id))
                }
            }
        }
    }
}

/// Static description of a scene: where it layers and what it needs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SceneDescriptor {
    pub key: SceneKey,
    pub layer: Layer,
    /// Torn down first when the session ends
    pub depends_on_session: bool,
    pub gate: Option<SceneGate>,
    /// For overlays: the primary scene they must sit on, if any
    pub host: Option<SceneKey>,
}

impl SceneDescriptor {
    const fn primary(key: SceneKey) -> Self {
        Self {
            key,
            layer: Layer::Primary,
            depends_on_session: false,
            gate: None,
            host: None,
        }
    }

    const fn session_primary(key: SceneKey, gate: SceneGate) -> Self {
        Self {
            key,
            layer: Layer::Primary,
            depends_on_session: true,
            gate: Some(gate),
            host: None,
        }
    }

    const fn overlay(key: SceneKey, host: Option<SceneKey>, depends_on_session: bool) -> Self {
        Self {
            key,
            layer: Layer::Overlay,
            depends_on_session,
            gate: None,
            host,
        }
    }

    pub fn is_overlay(&self) -> bool {
        self.layer == Layer::Overlay
    }

    /// Descriptor of `key` in the default catalog
    pub fn of(key: SceneKey, forge_min_account_level: u32) -> Self {
        use SceneGate::*;
        match key {
            SceneKey::Boot
            | SceneKey::Loading
            | SceneKey::Terms
            | SceneKey::AuthChoice
            | SceneKey::Config
            | SceneKey::Ranking => Self::primary(key),
            SceneKey::MainMenu
            | SceneKey::CharacterSelection
            | SceneKey::Profile
            | SceneKey::Altar
            | SceneKey::Pvp
            | SceneKey::GameOver => Self::session_primary(key, Authenticated),
            SceneKey::GameSession => Self::session_primary(key, PlayableHero),
            SceneKey::Forge => {
                Self::session_primary(key, AccountLevel(forge_min_account_level))
            }
            SceneKey::Hud | SceneKey::Pause => {
                Self::overlay(key, Some(SceneKey::GameSession), true)
            }
            SceneKey::Notification => Self::overlay(key, None, false),
        }
    }
}

/// The full scene catalog with the given forge gate
pub fn default_catalog(forge_min_account_level: u32) -> Vec<SceneDescriptor> {
    SceneKey::ALL
        .iter()
        .map(|key| SceneDescriptor::of(*key, forge_min_account_level))
        .collect()
}

/// Data handed to a scene when it starts
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ScenePayload {
    #[default]
    None,
    Hero(HeroId),
    Wager { tier_id: TierId, hero_id: HeroId },
    Results { wave: u32, reward: Bcoin },
    Message(String),
}

/// Handles a scene gets while it starts or stops
#[derive(Clone)]
pub struct SceneContext {
    pub key: SceneKey,
    /// Incarnation of the scene this context belongs to
    pub generation: u64,
    /// Read-only; scenes never write session facts
    pub session: SessionView,
    pub bus: EventBus,
    pub transitions: TransitionQueue,
}

/// Behaviour attached to a scene key.
///
/// Hooks run synchronously inside `start`/`stop`. A scene that wants another
/// scene started queues the request on `ctx.transitions` instead of calling
/// the machine directly.
pub trait Scene {
    fn on_start(&mut self, _ctx: &SceneContext, _payload: &ScenePayload) {}

    /// Must unregister every bus subscription taken in `on_start`
    fn on_stop(&mut self, _ctx: &SceneContext) {}
}
