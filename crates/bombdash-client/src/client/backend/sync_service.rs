use bombdash_events::{BalanceUpdate, ClientEvent};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::client::backend::api::{
    decode, into_heroes, into_ranking, HeroResponse, HeroesResponse, LoginResponse, MeResponse,
    RankingResponse, TiersResponse,
};
use crate::client::backend::transport::{ApiRequest, Method, Transport};
use crate::client::bcoin::Bcoin;
use crate::client::constants::{
    route_level_up, ROUTE_AUTH_ME, ROUTE_HEROES, ROUTE_LOGIN, ROUTE_RANKING, ROUTE_REGISTER,
    ROUTE_SCORES, ROUTE_WAGER_ENTER, ROUTE_WAGER_TIERS,
};
use crate::client::economy;
use crate::client::error::{SyncError, ValidationError};
use crate::client::registry::SessionRegistry;
use crate::client::session::{Credentials, Session};
use crate::client::ticket::SceneTicket;
use crate::client::types::{Hero, HeroId, RankingEntry, TierId, UserId, WagerTier};
use crate::storage::TokenStore;

/// The only writer of session facts that come from the backend.
///
/// Calls that feed a scene take that scene's ticket; if the scene stopped
/// while the call was in flight the result is dropped as stale and nothing
/// is written. Confirmed level-ups are the exception: they are account facts
/// and are written regardless.
pub struct BackendSyncService<T: Transport> {
    transport: T,
    registry: SessionRegistry,
    tokens: TokenStore,
}

impl<T: Transport> BackendSyncService<T> {
    pub fn new(transport: T, registry: SessionRegistry, tokens: TokenStore) -> Self {
        Self {
            transport,
            registry,
            tokens,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    async fn call<R>(&self, request: ApiRequest) -> Result<R, SyncError>
    where
        R: for<'de> serde::Deserialize<'de>,
    {
        let method = request.method;
        let reply = self.transport.send(request).await?;
        decode(method, reply)
    }

    fn session_token(&self) -> Result<String, SyncError> {
        self.registry
            .auth_token()
            .ok_or(SyncError::Validation(ValidationError::NoSession))
    }

    fn session_user(&self, user_id: UserId) -> Result<String, SyncError> {
        match self.registry.user_id() {
            Some(current) if current == user_id => self.session_token(),
            _ => Err(SyncError::Validation(ValidationError::NoSession)),
        }
    }

    // ===== Session =====

    /// Establish a session from a stored token or a username/PIN pair.
    ///
    /// On success the token is persisted, and the session and its roster
    /// are installed in the registry.
    pub async fn login(
        &self,
        credentials: Credentials,
        ticket: &SceneTicket,
    ) -> Result<Session, SyncError> {
        debug!("Logging in with {:?}", credentials);
        let restoring = matches!(credentials, Credentials::Token(_));
        let token = match credentials {
            Credentials::Token(token) => token,
            Credentials::Pin { username, pin } => {
                let request =
                    ApiRequest::post(ROUTE_LOGIN, json!({ "username": username, "pin": pin }));
                let response: LoginResponse = self.call(request).await?;
                response.token
            }
        };

        let me = self
            .call::<MeResponse>(ApiRequest::get(ROUTE_AUTH_ME).with_token(token.clone()))
            .await;
        let me = match me {
            Err(SyncError::AuthExpired) if restoring => {
                info!("Stored token was rejected, discarding it");
                if let Err(e) = self.tokens.clear_token() {
                    warn!("Failed to clear stored token: {}", e);
                }
                return Err(SyncError::AuthExpired);
            }
            other => other?,
        };
        let (session, heroes) = me.user.into_session(token)?;
        ticket.ensure_live()?;

        if let Err(e) = self.tokens.save_token(&session.auth_token) {
            warn!("Failed to persist auth token: {}", e);
        }
        self.registry.begin_session(session.clone());
        self.registry.set_heroes(heroes)?;
        info!(
            "Logged in as user {} (account level {})",
            session.user_id, session.account_level
        );
        Ok(session)
    }

    /// Create an account, then log into it.
    pub async fn register(
        &self,
        username: String,
        pin: String,
        ticket: &SceneTicket,
    ) -> Result<Session, SyncError> {
        info!("Registering account {}", username);
        let request =
            ApiRequest::post(ROUTE_REGISTER, json!({ "username": username, "pin": pin }));
        self.call::<serde_json::Value>(request).await?;
        self.login(Credentials::Pin { username, pin }, ticket).await
    }

    /// Drop the persisted token and the session.
    ///
    /// Returns whether a session was active.
    pub fn logout(&self) -> bool {
        if let Err(e) = self.tokens.clear_token() {
            warn!("Failed to clear stored token: {}", e);
        }
        self.registry.clear()
    }

    // ===== Reference data =====

    pub async fn fetch_heroes(
        &self,
        user_id: UserId,
        ticket: &SceneTicket,
    ) -> Result<Vec<Hero>, SyncError> {
        let token = self.session_user(user_id)?;
        let response: HeroesResponse = self
            .call(ApiRequest::get(ROUTE_HEROES).with_token(token))
            .await?;
        let heroes = into_heroes(response.heroes, user_id)?;
        ticket.ensure_live()?;

        self.registry.set_heroes(heroes.clone())?;
        debug!("Fetched {} heroes for user {}", heroes.len(), user_id);
        Ok(heroes)
    }

    /// Wager tiers, fetched once per session and cached in the registry
    pub async fn fetch_wager_tiers(
        &self,
        ticket: &SceneTicket,
    ) -> Result<Vec<WagerTier>, SyncError> {
        if let Some(tiers) = self.registry.wager_tiers() {
            return Ok(tiers);
        }
        let token = self.session_token()?;
        let response: TiersResponse = self
            .call(ApiRequest::get(ROUTE_WAGER_TIERS).with_token(token))
            .await?;
        let tiers: Vec<WagerTier> = response.tiers.into_iter().map(WagerTier::from).collect();
        ticket.ensure_live()?;

        self.registry.set_wager_tiers(tiers.clone())?;
        debug!("Fetched {} wager tiers", tiers.len());
        Ok(tiers)
    }

    // ===== Economy =====

    /// Refresh the coin balance of `user_id`.
    ///
    /// Emits exactly one `bcoin-balance-update`, success or not. On failure
    /// the event carries the error and the last known balance, which stays
    /// in the registry untouched.
    pub async fn update_balance(&self, user_id: UserId) -> Result<Bcoin, SyncError> {
        let last_known = self.registry.coin_balance().map(|b| b.to_string());
        let fetched = self.fetch_coins(user_id).await;

        // The session may have ended or changed hands while the call was out
        let result = fetched.and_then(|coins| match self.registry.user_id() {
            Some(current) if current == user_id => Ok(coins),
            _ => Err(SyncError::Validation(ValidationError::NoSession)),
        });

        match result {
            Ok(coins) => {
                self.registry.set_coin_balance(coins)?;
                debug!("Balance for user {} is {}", user_id, coins);
                Ok(coins)
            }
            Err(error) => {
                warn!("Balance refresh failed: {}", error);
                self.registry
                    .bus()
                    .emit(ClientEvent::BalanceUpdate(BalanceUpdate::failed(
                        error.to_string(),
                        last_known,
                    )));
                Err(error)
            }
        }
    }

    async fn fetch_coins(&self, user_id: UserId) -> Result<Bcoin, SyncError> {
        let token = self.session_user(user_id)?;
        let me: MeResponse = self
            .call(ApiRequest::get(ROUTE_AUTH_ME).with_token(token))
            .await?;
        if me.user.id != user_id {
            return Err(SyncError::Fatal(format!(
                "balance for user {} answered for user {}",
                user_id, me.user.id
            )));
        }
        Ok(me.user.coins)
    }

    /// Ask the backend to level `hero_id` up, paid by transaction `tx_hash`.
    ///
    /// The hero must already hold enough XP; otherwise nothing is sent. The
    /// returned hero replaces the local copy verbatim, unless it would lower
    /// the level the client shows, which is treated as a protocol violation.
    ///
    /// A confirmed level-up is a fact about the account, not about the scene
    /// that asked for it: it lands in the registry even when that scene has
    /// stopped, and only then is the caller told its response is stale.
    pub async fn level_up_hero(
        &self,
        hero_id: HeroId,
        tx_hash: &str,
        ticket: &SceneTicket,
    ) -> Result<Hero, SyncError> {
        let current = self
            .registry
            .hero(hero_id)
            .ok_or(ValidationError::UnknownHero(hero_id))?;
        economy::check_level_up(&current)?;
        let token = self.session_token()?;

        let bus = self.registry.bus();
        bus.emit(ClientEvent::TransactionPending {
            tx_hash: tx_hash.to_string(),
        });

        match self.request_level_up(&current, tx_hash, token).await {
            Ok(hero) => {
                bus.emit(ClientEvent::TransactionSucceeded {
                    message: format!("Hero {} reached level {}", hero.hero_id, hero.level),
                });
                bus.emit(ClientEvent::BalanceChanged);
                ticket.ensure_live()?;
                Ok(hero)
            }
            Err(SyncError::Validation(ValidationError::NoSession)) => {
                // Logged out mid-flight; the logout already reset the scenes
                ticket.ensure_live()?;
                Err(SyncError::Validation(ValidationError::NoSession))
            }
            Err(error) => {
                bus.emit(ClientEvent::TransactionFailed {
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }

    async fn request_level_up(
        &self,
        current: &Hero,
        tx_hash: &str,
        token: String,
    ) -> Result<Hero, SyncError> {
        let request = ApiRequest::post(route_level_up(current.hero_id), json!({ "txHash": tx_hash }))
            .with_token(token);
        let response: HeroResponse = self.call(request).await?;
        let hero = response.hero.into_hero(current.owner_user_id)?;

        if self.registry.user_id() != Some(current.owner_user_id) {
            return Err(SyncError::Validation(ValidationError::NoSession));
        }
        if hero.hero_id != current.hero_id {
            return Err(SyncError::Rejected(format!(
                "level-up of hero {} answered with hero {}",
                current.hero_id, hero.hero_id
            )));
        }
        // Compare against what is shown now, not only what was shown before
        // the call: another update may have landed meanwhile
        let shown = self
            .registry
            .hero(current.hero_id)
            .map_or(current.level, |h| h.level.max(current.level));
        if hero.level < shown {
            warn!(
                "Rejecting level-up response: hero {} level {} -> {}",
                hero.hero_id, shown, hero.level
            );
            return Err(SyncError::Rejected(format!(
                "hero {} level went backwards ({} -> {})",
                hero.hero_id, shown, hero.level
            )));
        }

        self.registry.replace_hero(hero.clone())?;
        info!("Hero {} is now level {}", hero.hero_id, hero.level);
        Ok(hero)
    }

    /// Join the wager queue for `tier_id` with `hero_id`.
    ///
    /// Affordability (coins and hero XP) and staking are checked locally
    /// first; a hero that fails them never reaches the backend.
    pub async fn enter_wager(
        &self,
        tier_id: TierId,
        hero_id: HeroId,
        ticket: &SceneTicket,
    ) -> Result<(), SyncError> {
        let tiers = self.fetch_wager_tiers(ticket).await?;
        let tier = tiers
            .iter()
            .find(|tier| tier.tier_id == tier_id)
            .ok_or(ValidationError::UnknownTier(tier_id))?;
        let hero = self
            .registry
            .hero(hero_id)
            .ok_or(ValidationError::UnknownHero(hero_id))?;
        let balance = self
            .registry
            .coin_balance()
            .ok_or(ValidationError::NoSession)?;
        economy::check_wager(tier, &hero, balance)?;

        let token = self.session_token()?;
        let request = ApiRequest::post(
            ROUTE_WAGER_ENTER,
            json!({ "heroId": hero_id, "tierId": tier_id }),
        )
        .with_token(token);
        let reply = self.transport.send(request).await?;
        decode::<serde_json::Value>(Method::Post, reply)?;
        ticket.ensure_live()?;

        info!("Hero {} entered wager tier {}", hero_id, tier.display_name);
        self.registry.bus().emit(ClientEvent::BalanceChanged);
        Ok(())
    }

    // ===== Scores =====

    /// Report the wave a run reached. Returns whether it beat the session's
    /// best wave, which is raised to match.
    pub async fn submit_score(&self, wave: u32) -> Result<bool, SyncError> {
        let user_id = self.registry.user_id().ok_or(ValidationError::NoSession)?;
        let token = self.session_user(user_id)?;
        let request = ApiRequest::post(ROUTE_SCORES, json!({ "score": wave })).with_token(token);
        self.call::<serde_json::Value>(request).await?;

        if self.registry.user_id() != Some(user_id) {
            return Err(SyncError::Validation(ValidationError::NoSession));
        }
        let best = self.registry.record_wave(wave)?;
        info!("Submitted wave {} for user {} (new best: {})", wave, user_id, best);
        Ok(best)
    }

    /// The public leaderboard. Needs no session.
    pub async fn fetch_ranking(&self, ticket: &SceneTicket) -> Result<Vec<RankingEntry>, SyncError> {
        let response: RankingResponse = self.call(ApiRequest::get(ROUTE_RANKING)).await?;
        let ranking = into_ranking(response.ranking)?;
        ticket.ensure_live()?;

        debug!("Fetched {} ranking rows", ranking.len());
        Ok(ranking)
    }
}
