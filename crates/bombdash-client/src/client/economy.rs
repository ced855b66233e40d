//! Pure economy rules: XP tables, leveling eligibility, wager affordability.
//!
//! Nothing here performs I/O. Leveling itself is server-authoritative; these
//! functions only decide what the client may *ask* for and what it displays.

use crate::client::bcoin::Bcoin;
use crate::client::error::ValidationError;
use crate::client::types::{Hero, LifecycleStatus, WagerTier};

/// Account level at which end-game features (the forge) unlock
pub const END_GAME_ACCOUNT_LEVEL: u32 = 8;

/// Highest level `level_for_xp` will search; far beyond any reachable xp
const MAX_SEARCH_LEVEL: u32 = 3_000_000;

/// Total XP a hero needs to have reached `level`.
///
/// `floor(50/3 * (L^3 - 6L^2 + 17L - 12))`, zero for level 1 and below.
/// Strictly increasing from level 1 on: 0, 100, 200, 400, 800, 1400, ...
pub fn xp_threshold_for_level(level: u32) -> u64 {
    if level <= 1 {
        return 0;
    }
    let l = u128::from(level);
    // L^3 - 6L^2 + 17L - 12 == (L - 1)(L^2 - 5L + 12), positive for L >= 2
    let cubic = (l - 1) * (l * l + 12 - 5 * l);
    u64::try_from(cubic * 50 / 3).unwrap_or(u64::MAX)
}

/// Level implied by a total XP amount (inverse of the threshold table)
pub fn level_for_xp(xp: u64) -> u32 {
    let (mut low, mut high) = (1u32, MAX_SEARCH_LEVEL);
    while low < high {
        let mid = low + (high - low + 1) / 2;
        if xp_threshold_for_level(mid) <= xp {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    low
}

/// XP still missing before `hero` may request a level-up
pub fn xp_to_next_level(hero: &Hero) -> u64 {
    xp_threshold_for_level(hero.level.saturating_add(1)).saturating_sub(hero.xp)
}

pub fn can_level_up(hero: &Hero) -> bool {
    xp_to_next_level(hero) == 0
}

pub fn check_level_up(hero: &Hero) -> Result<(), ValidationError> {
    let required = xp_threshold_for_level(hero.level.saturating_add(1));
    if hero.xp < required {
        return Err(ValidationError::InsufficientXp {
            required,
            available: hero.xp,
        });
    }
    Ok(())
}

/// Account XP needed for the next account level: `floor(1000 * 1.5^level)`
pub fn account_xp_for_next_level(account_level: u32) -> u64 {
    let exponent = i32::try_from(account_level).unwrap_or(i32::MAX);
    let xp = (1000.0 * 1.5f64.powi(exponent)).floor();
    if xp >= u64::MAX as f64 {
        u64::MAX
    } else {
        xp as u64
    }
}

pub fn is_end_game(account_level: u32) -> bool {
    account_level >= END_GAME_ACCOUNT_LEVEL
}

/// Tokenized heroes must be staked to enter play; standard heroes always can
pub fn can_enter_play(hero: &Hero) -> bool {
    !hero.is_tokenized() || hero.status == LifecycleStatus::Staked
}

/// Both the balance and the hero's XP must cover the tier's costs
pub fn can_afford_wager(tier: &WagerTier, hero: &Hero, balance: Bcoin) -> bool {
    balance >= tier.bcoin_cost && hero.xp >= tier.xp_cost
}

/// Full wager check, reporting the first reason a hero cannot enter `tier`
pub fn check_wager(tier: &WagerTier, hero: &Hero, balance: Bcoin) -> Result<(), ValidationError> {
    if hero.xp < tier.xp_cost {
        return Err(ValidationError::InsufficientXp {
            required: tier.xp_cost,
            available: hero.xp,
        });
    }
    if balance < tier.bcoin_cost {
        return Err(ValidationError::InsufficientCoins {
            required: tier.bcoin_cost,
            available: balance,
        });
    }
    if !can_enter_play(hero) {
        return Err(ValidationError::NotStaked(hero.hero_id));
    }
    Ok(())
}

/// A hero listed for a wager tier, with the reason it is disabled (if it is)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeroEligibility<'a> {
    pub hero: &'a Hero,
    pub ineligible: Option<ValidationError>,
}

impl HeroEligibility<'_> {
    pub fn is_eligible(&self) -> bool {
        self.ineligible.is_none()
    }
}

/// Every hero in `heroes`, in order, each marked eligible or not.
///
/// Ineligible heroes stay in the list so the picker can render them disabled.
pub fn eligible_heroes_for_tier<'a>(
    tier: &WagerTier,
    heroes: &'a [Hero],
    balance: Bcoin,
) -> Vec<HeroEligibility<'a>> {
    heroes
        .iter()
        .map(|hero| HeroEligibility {
            hero,
            ineligible: check_wager(tier, hero, balance).err(),
        })
        .collect()
}
