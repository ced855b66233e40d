//! Wire payloads of the backend API and their conversion into client types.
//!
//! Every response uses the envelope `{ success, message?, ...data }`. Numbers
//! may arrive as JSON numbers or as strings (big integers are serialized as
//! strings), so numeric fields accept both.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::client::backend::transport::{ApiReply, Method};
use crate::client::bcoin::Bcoin;
use crate::client::error::SyncError;
use crate::client::session::Session;
use crate::client::types::{Hero, HeroKind, HeroStats, LifecycleStatus, RankingEntry, WagerTier};

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Map a raw reply onto `T`, or onto the error the status and envelope imply.
///
/// 401 always means the token is gone. The backend also answers 403 for a
/// rejected token, but uses it for business refusals on writes too, so 403
/// only expires the session on reads.
pub fn decode<T>(method: Method, reply: ApiReply) -> Result<T, SyncError>
where
    T: for<'de> Deserialize<'de>,
{
    let envelope = Envelope::deserialize(&reply.body).unwrap_or_default();
    let message = || {
        envelope
            .message
            .clone()
            .unwrap_or_else(|| format!("HTTP {}", reply.status))
    };

    match reply.status {
        401 => return Err(SyncError::AuthExpired),
        403 if method == Method::Get => return Err(SyncError::AuthExpired),
        500..=599 => return Err(SyncError::Transient(message())),
        200..=299 if envelope.success => {}
        _ => return Err(SyncError::Rejected(message())),
    }

    T::deserialize(&reply.body)
        .map_err(|e| SyncError::Fatal(format!("unexpected response shape: {}", e)))
}

// ============================================================================
// Flexible scalars
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(u64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn as_u64(&self) -> Option<u64> {
        match self {
            Scalar::Int(n) => Some(*n),
            Scalar::Float(f) if *f >= 0.0 && f.fract() == 0.0 => Some(*f as u64),
            Scalar::Float(_) => None,
            Scalar::Text(s) => s.trim().parse().ok(),
        }
    }

    fn as_bcoin(&self) -> Option<Bcoin> {
        match self {
            Scalar::Int(n) => Some(Bcoin::from_whole(*n)),
            Scalar::Float(f) => f.to_string().parse().ok(),
            Scalar::Text(s) => s.parse().ok(),
        }
    }
}

fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Scalar::deserialize(deserializer)?
        .as_u64()
        .ok_or_else(|| serde::de::Error::custom("expected a non-negative integer"))
}

fn optional_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(None),
        Some(scalar) => scalar
            .as_u64()
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("expected a non-negative integer")),
    }
}

fn bcoin<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bcoin, D::Error> {
    Scalar::deserialize(deserializer)?
        .as_bcoin()
        .ok_or_else(|| serde::de::Error::custom("expected a BCOIN amount"))
}

fn narrow(value: u64, field: &str) -> Result<u32, SyncError> {
    u32::try_from(value).map_err(|_| SyncError::Fatal(format!("{} out of range: {}", field, value)))
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct HeroPayload {
    #[serde(deserialize_with = "number")]
    pub id: u64,
    #[serde(default, deserialize_with = "optional_number")]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub hero_type: Option<String>,
    #[serde(deserialize_with = "number")]
    pub level: u64,
    #[serde(deserialize_with = "number")]
    pub xp: u64,
    #[serde(default, deserialize_with = "optional_number")]
    pub hp: Option<u64>,
    #[serde(rename = "maxHp", default, deserialize_with = "optional_number")]
    pub max_hp: Option<u64>,
    #[serde(default, deserialize_with = "optional_number")]
    pub damage: Option<u64>,
    #[serde(default, deserialize_with = "optional_number")]
    pub speed: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub sprite_name: Option<String>,
    #[serde(default)]
    pub rarity: Option<String>,
    #[serde(default, deserialize_with = "optional_number")]
    pub nft_id: Option<u64>,
}

impl HeroPayload {
    /// `owner` fills in `user_id` when the backend leaves it out
    pub fn into_hero(self, owner: u64) -> Result<Hero, SyncError> {
        let status = match self.status.as_deref() {
            None => LifecycleStatus::InWallet,
            Some(raw) => LifecycleStatus::parse(raw).ok_or_else(|| {
                SyncError::Fatal(format!("hero {} has unknown status '{}'", self.id, raw))
            })?,
        };
        let kind = match self.hero_type.as_deref() {
            Some("nft") => HeroKind::Tokenized,
            _ => HeroKind::Standard,
        };
        let max_hp = narrow(self.max_hp.or(self.hp).unwrap_or_default(), "maxHp")?;

        Ok(Hero {
            hero_id: self.id,
            owner_user_id: self.user_id.unwrap_or(owner),
            kind,
            level: narrow(self.level, "level")?,
            xp: self.xp,
            max_hp,
            base_stats: HeroStats {
                power: narrow(self.damage.unwrap_or_default(), "damage")?,
                speed: narrow(self.speed.unwrap_or_default(), "speed")?,
                hp: narrow(self.hp.unwrap_or_default(), "hp")?,
            },
            status,
            sprite_name: self.sprite_name,
            rarity: self.rarity,
            nft_id: self.nft_id,
        })
    }
}

pub fn into_heroes(payloads: Vec<HeroPayload>, owner: u64) -> Result<Vec<Hero>, SyncError> {
    payloads.into_iter().map(|p| p.into_hero(owner)).collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    #[serde(deserialize_with = "number")]
    pub id: u64,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "optional_number")]
    pub account_level: Option<u64>,
    #[serde(default, deserialize_with = "optional_number")]
    pub account_xp: Option<u64>,
    #[serde(deserialize_with = "bcoin")]
    pub coins: Bcoin,
    #[serde(default, deserialize_with = "optional_number")]
    pub highest_wave_reached: Option<u64>,
    #[serde(default)]
    pub heroes: Vec<HeroPayload>,
}

impl UserPayload {
    /// Session facts plus the roster that came with them
    pub fn into_session(self, auth_token: String) -> Result<(Session, Vec<Hero>), SyncError> {
        let session = Session {
            user_id: self.id,
            wallet_address: self.address,
            account_level: narrow(self.account_level.unwrap_or(1), "account_level")?,
            account_xp: self.account_xp.unwrap_or_default(),
            coin_balance: self.coins,
            highest_wave_reached: narrow(
                self.highest_wave_reached.unwrap_or_default(),
                "highest_wave_reached",
            )?,
            auth_token,
        };
        let heroes = into_heroes(self.heroes, self.id)?;
        Ok((session, heroes))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WagerTierPayload {
    #[serde(deserialize_with = "number")]
    pub id: u64,
    pub name: String,
    #[serde(deserialize_with = "bcoin")]
    pub bcoin_cost: Bcoin,
    #[serde(deserialize_with = "number")]
    pub xp_cost: u64,
}

impl From<WagerTierPayload> for WagerTier {
    fn from(payload: WagerTierPayload) -> Self {
        WagerTier {
            tier_id: payload.id,
            display_name: payload.name,
            bcoin_cost: payload.bcoin_cost,
            xp_cost: payload.xp_cost,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankingEntryPayload {
    #[serde(default, deserialize_with = "optional_number")]
    pub rank: Option<u64>,
    #[serde(default, alias = "username", alias = "address", alias = "walletAddress")]
    pub name: Option<String>,
    #[serde(alias = "score", deserialize_with = "number")]
    pub wave: u64,
}

/// Rows keep the backend order; a missing rank is the row position.
pub fn into_ranking(payloads: Vec<RankingEntryPayload>) -> Result<Vec<RankingEntry>, SyncError> {
    payloads
        .into_iter()
        .enumerate()
        .map(|(index, payload)| {
            let rank = payload.rank.unwrap_or(index as u64 + 1);
            Ok(RankingEntry {
                rank: narrow(rank, "rank")?,
                player: payload.name.unwrap_or_else(|| "Unknown".to_string()),
                wave: narrow(payload.wave, "wave")?,
            })
        })
        .collect()
}

// ===== Response bodies =====

#[derive(Debug, Deserialize)]
pub struct MeResponse {
    pub user: UserPayload,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub user: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct HeroesResponse {
    #[serde(default)]
    pub heroes: Vec<HeroPayload>,
}

#[derive(Debug, Deserialize)]
pub struct TiersResponse {
    #[serde(default)]
    pub tiers: Vec<WagerTierPayload>,
}

#[derive(Debug, Deserialize)]
pub struct HeroResponse {
    pub hero: HeroPayload,
}

#[derive(Debug, Deserialize)]
pub struct RankingResponse {
    #[serde(default)]
    pub ranking: Vec<RankingEntryPayload>,
}
