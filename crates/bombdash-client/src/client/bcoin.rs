use std::fmt;
use std::ops::Add;
use std::str::FromStr;

use thiserror::Error;

/// Cents per whole BCOIN
const CENTS_PER_COIN: u64 = 100;

/// BCOIN amount, fixed point with two decimal places.
///
/// Balances arrive from the backend as numbers or decimal strings and are shown
/// as `"100.00"`. Comparisons never go through floating point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bcoin(u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BcoinParseError {
    #[error("empty amount")]
    Empty,
    #[error("negative amount: {0}")]
    Negative(String),
    #[error("invalid amount: {0}")]
    Invalid(String),
    #[error("amount out of range: {0}")]
    Overflow(String),
}

impl Bcoin {
    pub const ZERO: Bcoin = Bcoin(0);

    pub const fn from_whole(coins: u64) -> Self {
        Bcoin(coins.saturating_mul(CENTS_PER_COIN))
    }

    pub const fn from_cents(cents: u64) -> Self {
        Bcoin(cents)
    }

    pub const fn cents(&self) -> u64 {
        self.0
    }

    pub fn checked_sub(self, other: Bcoin) -> Option<Bcoin> {
        self.0.checked_sub(other.0).map(Bcoin)
    }

    pub fn saturating_sub(self, other: Bcoin) -> Bcoin {
        Bcoin(self.0.saturating_sub(other.0))
    }
}

impl Add for Bcoin {
    type Output = Bcoin;

    fn add(self, other: Bcoin) -> Bcoin {
        Bcoin(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Bcoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:02}",
            self.0 / CENTS_PER_COIN,
            self.0 % CENTS_PER_COIN
        )
    }
}

impl FromStr for Bcoin {
    type Err = BcoinParseError;

    /// Accepts `"100"`, `"99.5"`, `"99.50"`; extra fractional digits are truncated
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(BcoinParseError::Empty);
        }
        if s.starts_with('-') {
            return Err(BcoinParseError::Negative(s.to_string()));
        }

        let (whole, fraction) = match s.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (s, ""),
        };

        let digits_only = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !digits_only(whole) || !digits_only(fraction)
        {
            return Err(BcoinParseError::Invalid(s.to_string()));
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| BcoinParseError::Overflow(s.to_string()))?
        };

        let mut cents = 0;
        for (index, digit) in fraction.chars().take(2).enumerate() {
            let value = u64::from(digit as u8 - b'0');
            cents += if index == 0 { value * 10 } else { value };
        }

        whole
            .checked_mul(CENTS_PER_COIN)
            .and_then(|c| c.checked_add(cents))
            .map(Bcoin)
            .ok_or_else(|| BcoinParseError::Overflow(s.to_string()))
    }
}
