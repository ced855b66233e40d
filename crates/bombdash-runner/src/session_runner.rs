use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use bombdash_client::client::backend::TransportError;
use bombdash_client::client::{
    BackendSyncService, Bcoin, ClientEvent, Credentials, EventBus, EventKind, Hero, HeroId,
    HttpTransport, RankingEntry, SceneError, SceneKey, ScenePayload, SceneRequest,
    SceneStateMachine, SceneTicket, Session, SessionRegistry, SubscriptionId, SyncError, TierId,
    Transport, WagerTier,
};
use bombdash_client::config::{DashConfig, RetryConfig};
use bombdash_client::TokenStore;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::intent::Intent;
use crate::scenes::{GameSessionScene, HudScene, HudView, NotificationScene, Notices};

/// Backend work finishing, delivered back to the runner
#[derive(Debug)]
enum Completion {
    Restored {
        attempt: u32,
        result: Result<Session, SyncError>,
    },
    LoggedIn(Result<Session, SyncError>),
    Heroes(Result<Vec<Hero>, SyncError>),
    Tiers(Result<Vec<WagerTier>, SyncError>),
    Ranking(Result<Vec<RankingEntry>, SyncError>),
    Balance(Result<Bcoin, SyncError>),
    ScoreSubmitted {
        wave: u32,
        result: Result<bool, SyncError>,
    },
    LeveledUp(Result<Hero, SyncError>),
    WagerEntered {
        tier_id: TierId,
        hero_id: HeroId,
        result: Result<(), SyncError>,
    },
}

/// What came of an intent, for whoever drives the runner
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    SessionStarted(Session),
    Heroes(Vec<Hero>),
    Tiers(Vec<WagerTier>),
    Ranking(Vec<RankingEntry>),
    Balance(Bcoin),
    /// `best` when the wave beat the account's previous best
    ScoreSubmitted { wave: u32, best: bool },
    LeveledUp(Hero),
    WagerEntered { tier_id: TierId, hero_id: HeroId },
    LoggedOut,
    Failed(SyncError),
    Refused(SceneError),
}

/// Drives one client session.
///
/// Intents are applied synchronously against the scene machine. Backend calls
/// run as local tasks (so this must live inside a `tokio::task::LocalSet`) and
/// their results come back through a channel, one at a time, so the registry
/// and the bus are never touched concurrently.
pub struct SessionRunner<T: Transport + 'static> {
    machine: SceneStateMachine,
    registry: SessionRegistry,
    bus: EventBus,
    service: Rc<BackendSyncService<T>>,
    retry: RetryConfig,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    pending: usize,
    /// Intents raised by bus handlers, applied after the current one
    follow_ups: Rc<RefCell<VecDeque<Intent>>>,
    subscriptions: Vec<(EventKind, SubscriptionId)>,
    hud: HudView,
    notices: Notices,
    outcomes: Vec<Outcome>,
    shutdown: bool,
}

impl SessionRunner<HttpTransport> {
    /// Runner talking to the backend named in `config`
    pub fn from_config(config: &DashConfig, tokens: TokenStore) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(&config.backend)?;
        Ok(Self::new(transport, tokens, config))
    }
}

impl<T: Transport + 'static> SessionRunner<T> {
    pub fn new(transport: T, tokens: TokenStore, config: &DashConfig) -> Self {
        let bus = EventBus::new();
        let registry = SessionRegistry::new(bus.clone());
        let mut machine =
            SceneStateMachine::with_forge_level(registry.clone(), config.gates.forge_min_account_level);
        let service = Rc::new(BackendSyncService::new(transport, registry.clone(), tokens));

        let hud = HudView::default();
        let notices = Notices::default();
        machine.register_scene(SceneKey::Hud, HudScene::new(hud.clone()));
        machine.register_scene(SceneKey::GameSession, GameSessionScene);
        machine.register_scene(
            SceneKey::Notification,
            NotificationScene::new(notices.clone()),
        );

        // Spending or earning currency asks for a fresh balance
        let follow_ups = Rc::new(RefCell::new(VecDeque::new()));
        let queue = follow_ups.clone();
        let balance_changed = bus.on(EventKind::BalanceChanged, move |_| {
            queue.borrow_mut().push_back(Intent::RefreshBalance);
            Ok(())
        });

        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        machine.enter_initial();

        Self {
            machine,
            registry,
            bus,
            service,
            retry: config.backend.retry.clone(),
            completion_tx,
            completion_rx,
            pending: 0,
            follow_ups,
            subscriptions: vec![(EventKind::BalanceChanged, balance_changed)],
            hud,
            notices,
            outcomes: Vec::new(),
            shutdown: false,
        }
    }

    // ===== Accessors =====

    pub fn machine(&self) -> &SceneStateMachine {
        &self.machine
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn tokens(&self) -> &TokenStore {
        self.service.tokens()
    }

    pub fn hud(&self) -> &HudView {
        &self.hud
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    /// Backend calls still in flight
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown
    }

    /// Outcomes recorded since the last call
    pub fn take_outcomes(&mut self) -> Vec<Outcome> {
        std::mem::take(&mut self.outcomes)
    }

    // ===== Driving =====

    /// Apply `intent` and everything it triggers synchronously.
    ///
    /// Backend work it starts keeps running; see [`settle`](Self::settle).
    pub fn dispatch(&mut self, intent: Intent) {
        self.apply(intent);
        self.drain();
    }

    /// Wait until no backend call is in flight, applying results as they land
    pub async fn settle(&mut self) {
        self.drain();
        while self.pending > 0 {
            let Some(completion) = self.completion_rx.recv().await else {
                break;
            };
            self.pending -= 1;
            self.complete(completion);
            self.drain();
        }
    }

    /// Apply intents from `intents` until `Shutdown` or until the channel
    /// closes and nothing is left in flight
    pub async fn run(&mut self, mut intents: mpsc::UnboundedReceiver<Intent>) {
        info!("Session runner started");
        let mut open = true;
        while !self.shutdown && (open || self.pending > 0) {
            tokio::select! {
                intent = intents.recv(), if open => match intent {
                    Some(intent) => self.dispatch(intent),
                    None => open = false,
                },
                Some(completion) = self.completion_rx.recv(), if self.pending > 0 => {
                    self.pending -= 1;
                    self.complete(completion);
                    self.drain();
                }
            }
        }
        info!("Session runner stopped");
    }

    /// Follow-up intents and queued scene requests
    fn drain(&mut self) {
        loop {
            self.process_transitions();
            let next = self.follow_ups.borrow_mut().pop_front();
            match next {
                Some(intent) => self.apply(intent),
                None => break,
            }
        }
    }

    fn process_transitions(&mut self) {
        for refused in self.machine.process_transitions() {
            self.outcomes.push(Outcome::Refused(refused));
        }
    }

    // ===== Intents =====

    fn apply(&mut self, intent: Intent) {
        match &intent {
            Intent::Login { username, .. } => debug!("Applying login for {}", username),
            Intent::Register { username, .. } => debug!("Applying register for {}", username),
            other => debug!("Applying {:?}", other),
        }
        match intent {
            Intent::Boot => self.boot(),
            Intent::AcceptTerms => {
                if let Err(e) = self.tokens().set_terms_accepted(true) {
                    warn!("Failed to persist terms acceptance: {}", e);
                }
                self.boot();
            }
            Intent::Login { username, pin } => {
                self.end_current_session();
                if let Some(ticket) = self.show(SceneKey::AuthChoice, ScenePayload::None) {
                    self.spawn_login(Credentials::Pin { username, pin }, ticket);
                }
            }
            Intent::Register { username, pin } => {
                self.end_current_session();
                if let Some(ticket) = self.show(SceneKey::AuthChoice, ScenePayload::None) {
                    let service = self.service.clone();
                    self.spawn(async move {
                        Completion::LoggedIn(service.register(username, pin, &ticket).await)
                    });
                }
            }
            Intent::Logout => self.logout(),
            Intent::Open(key) => self.open(key),
            Intent::Back => self.back(),
            Intent::SelectHero(hero_id) => {
                if let Err(e) = self.registry.select_hero(Some(hero_id)) {
                    self.fail(SyncError::from(e));
                }
            }
            Intent::StartGame => {
                let payload = self
                    .registry
                    .selected_hero_id()
                    .map_or(ScenePayload::None, ScenePayload::Hero);
                self.show(SceneKey::GameSession, payload);
            }
            Intent::Pause => {
                self.show(SceneKey::Pause, ScenePayload::None);
            }
            Intent::Resume => {
                if let Err(e) = self.machine.stop(SceneKey::Pause) {
                    self.outcomes.push(Outcome::Refused(e));
                }
            }
            Intent::GameOver { wave, reward } => {
                let payload = ScenePayload::Results { wave, reward };
                match self
                    .machine
                    .transition(SceneKey::GameSession, SceneKey::GameOver, payload)
                {
                    Ok(_) => {
                        info!("Run ended at wave {} with reward {}", wave, reward);
                        let service = self.service.clone();
                        self.spawn(async move {
                            let result = service.submit_score(wave).await;
                            Completion::ScoreSubmitted { wave, result }
                        });
                        self.bus.emit(ClientEvent::BalanceChanged);
                    }
                    Err(e) => self.outcomes.push(Outcome::Refused(e)),
                }
            }
            Intent::RefreshBalance => self.spawn_balance(),
            Intent::LevelUp { hero_id, tx_hash } => {
                if let Some(ticket) = self.show(SceneKey::Altar, ScenePayload::Hero(hero_id)) {
                    let service = self.service.clone();
                    self.spawn(async move {
                        Completion::LeveledUp(service.level_up_hero(hero_id, &tx_hash, &ticket).await)
                    });
                }
            }
            Intent::EnterWager { tier_id, hero_id } => {
                let payload = ScenePayload::Wager { tier_id, hero_id };
                if let Some(ticket) = self.show(SceneKey::Pvp, payload) {
                    let service = self.service.clone();
                    self.spawn(async move {
                        let result = service.enter_wager(tier_id, hero_id, &ticket).await;
                        Completion::WagerEntered {
                            tier_id,
                            hero_id,
                            result,
                        }
                    });
                }
            }
            Intent::Shutdown => {
                info!("Shutdown requested");
                self.shutdown = true;
            }
        }
    }

    fn boot(&mut self) {
        if !self.tokens().terms_accepted() {
            self.show(SceneKey::Terms, ScenePayload::None);
            return;
        }
        match self.tokens().token() {
            Some(token) => {
                if let Some(ticket) = self.show(SceneKey::Loading, ScenePayload::None) {
                    info!("Restoring stored session");
                    self.spawn_restore(token, ticket, 0);
                }
            }
            None => {
                self.show(SceneKey::AuthChoice, ScenePayload::None);
            }
        }
    }

    /// Log out of a live session before another one is established, so its
    /// teardown cannot land on top of the new one
    fn end_current_session(&mut self) {
        if !self.registry.is_logged_in() {
            return;
        }
        info!("Ending the current session first");
        if self.service.logout() {
            self.outcomes.push(Outcome::LoggedOut);
        }
        self.process_transitions();
    }

    fn logout(&mut self) {
        if self.service.logout() {
            self.outcomes.push(Outcome::LoggedOut);
        }
        // Session teardown is queued first; boot runs on top of it
        self.machine.transitions().push(SceneRequest::ResetToBoot);
        self.follow_ups.borrow_mut().push_back(Intent::Boot);
    }

    /// Menu scene plus the data it shows
    fn open(&mut self, key: SceneKey) {
        let Some(ticket) = self.show(key, ScenePayload::None) else {
            return;
        };
        let service = self.service.clone();
        match key {
            SceneKey::CharacterSelection | SceneKey::Altar => {
                if let Some(user_id) = self.registry.user_id() {
                    self.spawn(async move {
                        Completion::Heroes(service.fetch_heroes(user_id, &ticket).await)
                    });
                }
            }
            SceneKey::Pvp => {
                self.spawn(async move { Completion::Tiers(service.fetch_wager_tiers(&ticket).await) });
            }
            SceneKey::Ranking => {
                self.spawn(async move { Completion::Ranking(service.fetch_ranking(&ticket).await) });
            }
            SceneKey::MainMenu | SceneKey::Profile => self.spawn_balance(),
            _ => {}
        }
    }

    fn back(&mut self) {
        if let Some(top) = self.machine.overlays().last().copied() {
            if let Err(e) = self.machine.stop(top) {
                self.outcomes.push(Outcome::Refused(e));
            }
            return;
        }
        let target = if self.registry.is_logged_in() {
            SceneKey::MainMenu
        } else {
            SceneKey::AuthChoice
        };
        self.show(target, ScenePayload::None);
    }

    /// Start `key`, recording a refusal instead of failing
    fn show(&mut self, key: SceneKey, payload: ScenePayload) -> Option<SceneTicket> {
        match self.machine.start(key, payload) {
            Ok(ticket) => Some(ticket),
            Err(e) => {
                warn!("Could not show {}: {}", key, e);
                self.outcomes.push(Outcome::Refused(e));
                None
            }
        }
    }

    /// Put `message` on the notification overlay, replacing what it showed
    fn notify(&mut self, message: String) {
        if self.machine.is_active(SceneKey::Notification) {
            match self.machine.stop(SceneKey::Notification) {
                Ok(()) => {}
                Err(SceneError::NotActive(_)) => debug!("Notification already gone"),
                Err(e) => warn!("Could not replace notification: {}", e),
            }
        }
        self.show(SceneKey::Notification, ScenePayload::Message(message));
    }

    // ===== Backend work =====

    fn spawn<F>(&mut self, work: F)
    where
        F: std::future::Future<Output = Completion> + 'static,
    {
        self.pending += 1;
        let tx = self.completion_tx.clone();
        tokio::task::spawn_local(async move {
            let completion = work.await;
            // The receiver only goes away with the runner
            let _ = tx.send(completion);
        });
    }

    fn spawn_restore(&mut self, token: String, ticket: SceneTicket, attempt: u32) {
        let service = self.service.clone();
        let delay = if attempt == 0 {
            None
        } else {
            Some(self.retry.delay_for_attempt(attempt - 1))
        };
        self.spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let result = service.login(Credentials::Token(token), &ticket).await;
            Completion::Restored { attempt, result }
        });
    }

    fn spawn_login(&mut self, credentials: Credentials, ticket: SceneTicket) {
        let service = self.service.clone();
        self.spawn(async move { Completion::LoggedIn(service.login(credentials, &ticket).await) });
    }

    fn spawn_balance(&mut self) {
        let Some(user_id) = self.registry.user_id() else {
            debug!("No session, skipping balance refresh");
            return;
        };
        let service = self.service.clone();
        self.spawn(async move { Completion::Balance(service.update_balance(user_id).await) });
    }

    // ===== Completions =====

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Restored { attempt, result } => self.restored(attempt, result),
            Completion::LoggedIn(result) => match result {
                Ok(session) => self.session_ready(session),
                Err(e) => self.fail(e),
            },
            Completion::Heroes(result) => match result {
                Ok(heroes) => self.outcomes.push(Outcome::Heroes(heroes)),
                Err(e) => self.fail(e),
            },
            Completion::Tiers(result) => match result {
                Ok(tiers) => self.outcomes.push(Outcome::Tiers(tiers)),
                Err(e) => self.fail(e),
            },
            Completion::Ranking(result) => match result {
                Ok(ranking) => self.outcomes.push(Outcome::Ranking(ranking)),
                Err(e) => self.fail(e),
            },
            Completion::ScoreSubmitted { wave, result } => match result {
                Ok(best) => self.outcomes.push(Outcome::ScoreSubmitted { wave, best }),
                Err(e) => self.fail(e),
            },
            Completion::Balance(result) => match result {
                Ok(balance) => self.outcomes.push(Outcome::Balance(balance)),
                Err(e) => self.fail(e),
            },
            Completion::LeveledUp(result) => match result {
                Ok(hero) => self.outcomes.push(Outcome::LeveledUp(hero)),
                Err(e) => self.fail(e),
            },
            Completion::WagerEntered {
                tier_id,
                hero_id,
                result,
            } => match result {
                Ok(()) => self.outcomes.push(Outcome::WagerEntered { tier_id, hero_id }),
                Err(e) => self.fail(e),
            },
        }
    }

    fn restored(&mut self, attempt: u32, result: Result<Session, SyncError>) {
        match result {
            Ok(session) => self.session_ready(session),
            Err(e) if e.is_retryable() && self.retry.should_attempt(attempt + 1) => {
                warn!("Session restore attempt {} failed: {}", attempt + 1, e);
                let token = self.tokens().token();
                let ticket = self
                    .machine
                    .ticket(SceneKey::Loading)
                    .filter(SceneTicket::is_live);
                let (Some(token), Some(ticket)) = (token, ticket) else {
                    debug!("Loading scene gone, abandoning restore");
                    return;
                };
                self.spawn_restore(token, ticket, attempt + 1);
            }
            Err(SyncError::StaleResponse { .. }) => debug!("Dropped stale session restore"),
            Err(e) => {
                warn!("Session restore failed: {}", e);
                // Fatal goes back to boot; auth-choice would only flash
                if !matches!(e, SyncError::Fatal(_)) {
                    self.show(SceneKey::AuthChoice, ScenePayload::None);
                }
                self.fail(e);
            }
        }
    }

    fn session_ready(&mut self, session: Session) {
        self.show(SceneKey::MainMenu, ScenePayload::None);
        // Announce the balance the session arrived with
        if let Err(e) = self.registry.set_coin_balance(session.coin_balance) {
            self.fail(SyncError::from(e));
            return;
        }
        self.outcomes.push(Outcome::SessionStarted(session));
    }

    /// Turn a sync error into its scene-level consequence
    fn fail(&mut self, error: SyncError) {
        match &error {
            SyncError::StaleResponse { scene } => {
                debug!("Discarded stale response for {}", scene);
                return;
            }
            SyncError::AuthExpired => {
                info!("Authentication expired");
                if let Err(e) = self.tokens().clear_token() {
                    warn!("Failed to clear stored token: {}", e);
                }
                // A live session ends through session-ended; otherwise go
                // straight to auth-choice
                if !self.registry.clear() {
                    self.show(SceneKey::AuthChoice, ScenePayload::None);
                }
            }
            SyncError::Fatal(reason) => {
                error!("Fatal session error: {}", reason);
                // Requests queued so far, session teardown included, would
                // run after the reset and leave boot again
                self.registry.clear();
                self.machine.transitions().clear();
                self.machine.reset_to_boot();
            }
            SyncError::Transient(_) | SyncError::Validation(_) | SyncError::Rejected(_) => {
                self.notify(error.to_string());
            }
        }
        self.outcomes.push(Outcome::Failed(error));
    }
}

impl<T: Transport + 'static> Drop for SessionRunner<T> {
    fn drop(&mut self) {
        for (kind, id) in self.subscriptions.drain(..) {
            self.bus.off(kind, id);
        }
    }
}
