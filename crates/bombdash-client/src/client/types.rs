use std::fmt;

use crate::client::bcoin::Bcoin;

pub type UserId = u64;
pub type HeroId = u64;
pub type TierId = u64;

/// Whether a hero is always playable or backed by an on-chain token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeroKind {
    Standard,
    /// Right-to-play gated by the staking status
    Tokenized,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleStatus {
    InWallet,
    Staked,
    Deployed,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStatus::InWallet => "in_wallet",
            LifecycleStatus::Staked => "staked",
            LifecycleStatus::Deployed => "deployed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_wallet" => Some(LifecycleStatus::InWallet),
            "staked" => Some(LifecycleStatus::Staked),
            "deployed" => Some(LifecycleStatus::Deployed),
            _ => None,
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeroStats {
    pub power: u32,
    pub speed: u32,
    pub hp: u32,
}

/// A hero as last reported by the backend. The client never edits level or xp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hero {
    pub hero_id: HeroId,
    pub owner_user_id: UserId,
    pub kind: HeroKind,
    pub level: u32,
    pub xp: u64,
    pub max_hp: u32,
    pub base_stats: HeroStats,
    pub status: LifecycleStatus,
    pub sprite_name: Option<String>,
    pub rarity: Option<String>,
    /// Token id for tokenized heroes
    pub nft_id: Option<u64>,
}

impl Hero {
    pub fn is_tokenized(&self) -> bool {
        self.kind == HeroKind::Tokenized
    }

    pub fn display_name(&self) -> String {
        match &self.sprite_name {
            Some(name) => format!("{} #{}", name, self.hero_id),
            None => format!("Hero #{}", self.hero_id),
        }
    }
}

/// One row of the leaderboard, best wave first
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankingEntry {
    pub rank: u32,
    /// Display name, or the wallet address when the player has none
    pub player: String,
    pub wave: u32,
}

/// Priced stake level for wager matches. Fetched once per session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WagerTier {
    pub tier_id: TierId,
    pub display_name: String,
    pub bcoin_cost: Bcoin,
    pub xp_cost: u64,
}
