use bombdash_client::client::{Bcoin, HeroId, SceneKey, TierId};

/// Something the player asked for.
///
/// Intents are applied one at a time; any backend work they start completes
/// later and is folded back in by the runner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    /// Decide where a fresh client starts: terms, silent restore or auth-choice
    Boot,
    AcceptTerms,
    Login { username: String, pin: String },
    /// Create an account and log into it
    Register { username: String, pin: String },
    Logout,
    /// Open a menu scene (loads the data it shows)
    Open(SceneKey),
    /// Close the top overlay, or return to the main menu
    Back,
    SelectHero(HeroId),
    StartGame,
    Pause,
    Resume,
    GameOver { wave: u32, reward: Bcoin },
    RefreshBalance,
    LevelUp { hero_id: HeroId, tx_hash: String },
    EnterWager { tier_id: TierId, hero_id: HeroId },
    Shutdown,
}
