use std::fmt;

use crate::client::bcoin::Bcoin;
use crate::client::types::UserId;

/// Authenticated session facts, owned by the session registry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub wallet_address: Option<String>,
    pub account_level: u32,
    pub account_xp: u64,
    pub coin_balance: Bcoin,
    pub highest_wave_reached: u32,
    pub auth_token: String,
}

/// How a session is established
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Silent restore from a persisted token
    Token(String),
    /// Username + PIN login
    Pin { username: String, pin: String },
}

// Keep secrets out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token(_) => f.write_str("Credentials::Token(<redacted>)"),
            Credentials::Pin { username, .. } => f
                .debug_struct("Credentials::Pin")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_redacts_secrets() {
        let token = format!("{:?}", Credentials::Token("secret-token".into()));
        assert!(!token.contains("secret-token"));

        let pin = format!(
            "{:?}",
            Credentials::Pin {
                username: "alice".into(),
                pin: "4321".into()
            }
        );
        assert!(pin.contains("alice"));
        assert!(!pin.contains("4321"));
    }
}
