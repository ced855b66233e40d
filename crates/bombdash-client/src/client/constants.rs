// Client-wide constants

/// Backend used when no config overrides it
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Per-request timeout for backend calls
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Upper bound on requests drained by one `process_transitions` call.
/// Hooks that keep queueing each other would otherwise spin forever.
pub const MAX_TRANSITIONS_PER_DRAIN: usize = 64;

// Backend routes
pub const ROUTE_REGISTER: &str = "/api/register";
pub const ROUTE_LOGIN: &str = "/api/login";
pub const ROUTE_AUTH_ME: &str = "/api/auth/me";
pub const ROUTE_HEROES: &str = "/api/heroes";
pub const ROUTE_WAGER_TIERS: &str = "/api/pvp/wager/tiers";
pub const ROUTE_WAGER_ENTER: &str = "/api/pvp/wager/enter";
pub const ROUTE_SCORES: &str = "/api/scores";
pub const ROUTE_RANKING: &str = "/api/ranking";

pub fn route_level_up(hero_id: u64) -> String {
    format!("/api/heroes/{}/level-up", hero_id)
}
