use std::fmt;

use serde::{Deserialize, Serialize};

/// Stored username/PIN pair for non-interactive logins
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountConfig {
    pub username: String,
    pub pin: String,
}

impl fmt::Display for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.username)
    }
}

impl fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountConfig")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
