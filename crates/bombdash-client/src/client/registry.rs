use std::cell::RefCell;
use std::rc::Rc;

use bombdash_events::{BalanceUpdate, ClientEvent, EventBus};
use tracing::{debug, info};

use crate::client::bcoin::Bcoin;
use crate::client::error::RegistryError;
use crate::client::session::Session;
use crate::client::types::{Hero, HeroId, UserId, WagerTier};

/// Names of the facts the registry holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RegistryKey {
    Session,
    LoggedIn,
    SelectedHero,
    Heroes,
    WagerTiers,
    CoinBalance,
}

/// A typed registry value, tagged with its key
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryEntry {
    Session(Session),
    LoggedIn(bool),
    SelectedHero(Option<HeroId>),
    Heroes(Vec<Hero>),
    WagerTiers(Vec<WagerTier>),
    CoinBalance(Bcoin),
}

impl RegistryEntry {
    pub fn key(&self) -> RegistryKey {
        match self {
            RegistryEntry::Session(_) => RegistryKey::Session,
            RegistryEntry::LoggedIn(_) => RegistryKey::LoggedIn,
            RegistryEntry::SelectedHero(_) => RegistryKey::SelectedHero,
            RegistryEntry::Heroes(_) => RegistryKey::Heroes,
            RegistryEntry::WagerTiers(_) => RegistryKey::WagerTiers,
            RegistryEntry::CoinBalance(_) => RegistryKey::CoinBalance,
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    session: Option<Session>,
    selected_hero: Option<HeroId>,
    heroes: Vec<Hero>,
    /// Fetched once per session
    wager_tiers: Option<Vec<WagerTier>>,
}

/// Session facts shared by every scene.
///
/// Clones are handles onto the same state. Writes that other scenes care
/// about emit on the bus after the state borrow is released, so handlers may
/// read the registry freely.
#[derive(Clone)]
pub struct SessionRegistry {
    state: Rc<RefCell<RegistryState>>,
    bus: EventBus,
}

impl SessionRegistry {
    pub fn new(bus: EventBus) -> Self {
        Self {
            state: Rc::new(RefCell::new(RegistryState::default())),
            bus,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Read-only handle for scenes
    pub fn view(&self) -> SessionView {
        SessionView(self.clone())
    }

    // ===== Generic access =====

    pub fn get(&self, key: RegistryKey) -> Option<RegistryEntry> {
        let state = self.state.borrow();
        match key {
            RegistryKey::Session => state.session.clone().map(RegistryEntry::Session),
            RegistryKey::LoggedIn => Some(RegistryEntry::LoggedIn(state.session.is_some())),
            RegistryKey::SelectedHero => Some(RegistryEntry::SelectedHero(state.selected_hero)),
            RegistryKey::Heroes => state
                .session
                .as_ref()
                .map(|_| RegistryEntry::Heroes(state.heroes.clone())),
            RegistryKey::WagerTiers => state.wager_tiers.clone().map(RegistryEntry::WagerTiers),
            RegistryKey::CoinBalance => state
                .session
                .as_ref()
                .map(|session| RegistryEntry::CoinBalance(session.coin_balance)),
        }
    }

    /// Last writer wins. `LoggedIn(false)` tears the whole session down.
    pub fn set(&self, entry: RegistryEntry) -> Result<(), RegistryError> {
        match entry {
            RegistryEntry::Session(session) => {
                self.begin_session(session);
                Ok(())
            }
            RegistryEntry::LoggedIn(false) => {
                self.clear();
                Ok(())
            }
            RegistryEntry::LoggedIn(true) => {
                if self.is_logged_in() {
                    Ok(())
                } else {
                    Err(RegistryError::NoSession)
                }
            }
            RegistryEntry::SelectedHero(hero_id) => self.select_hero(hero_id),
            RegistryEntry::Heroes(heroes) => self.set_heroes(heroes),
            RegistryEntry::WagerTiers(tiers) => self.set_wager_tiers(tiers),
            RegistryEntry::CoinBalance(balance) => self.set_coin_balance(balance),
        }
    }

    // ===== Typed getters =====

    pub fn session(&self) -> Option<Session> {
        self.state.borrow().session.clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.borrow().session.is_some()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.state.borrow().session.as_ref().map(|s| s.user_id)
    }

    pub fn auth_token(&self) -> Option<String> {
        self.state
            .borrow()
            .session
            .as_ref()
            .map(|s| s.auth_token.clone())
    }

    pub fn coin_balance(&self) -> Option<Bcoin> {
        self.state.borrow().session.as_ref().map(|s| s.coin_balance)
    }

    pub fn selected_hero_id(&self) -> Option<HeroId> {
        self.state.borrow().selected_hero
    }

    pub fn selected_hero(&self) -> Option<Hero> {
        let state = self.state.borrow();
        let id = state.selected_hero?;
        state.heroes.iter().find(|h| h.hero_id == id).cloned()
    }

    pub fn heroes(&self) -> Vec<Hero> {
        self.state.borrow().heroes.clone()
    }

    pub fn hero(&self, hero_id: HeroId) -> Option<Hero> {
        self.state
            .borrow()
            .heroes
            .iter()
            .find(|h| h.hero_id == hero_id)
            .cloned()
    }

    pub fn wager_tiers(&self) -> Option<Vec<WagerTier>> {
        self.state.borrow().wager_tiers.clone()
    }

    // ===== Typed setters =====

    /// Install a freshly established session, replacing any previous one.
    ///
    /// Per-session caches (roster, tiers, selection) start empty. Replacing
    /// another user's session ends that session first.
    pub fn begin_session(&self, session: Session) {
        let user_id = session.user_id;
        let replaced = {
            let mut state = self.state.borrow_mut();
            let previous = std::mem::replace(
                &mut *state,
                RegistryState {
                    session: Some(session),
                    ..RegistryState::default()
                },
            );
            previous.session.map(|s| s.user_id)
        };
        if let Some(previous) = replaced.filter(|previous| *previous != user_id) {
            info!("Session of user {} replaced by user {}", previous, user_id);
            self.bus.emit(ClientEvent::SessionEnded);
        }
        info!("Session started for user {}", user_id);
        self.bus.emit(ClientEvent::SessionStarted { user_id });
    }

    /// Raise the best wave of the session to `wave`. Returns whether it rose.
    pub fn record_wave(&self, wave: u32) -> Result<bool, RegistryError> {
        let mut state = self.state.borrow_mut();
        let session = state.session.as_mut().ok_or(RegistryError::NoSession)?;
        if wave <= session.highest_wave_reached {
            return Ok(false);
        }
        debug!("Best wave {} -> {}", session.highest_wave_reached, wave);
        session.highest_wave_reached = wave;
        Ok(true)
    }

    pub fn select_hero(&self, hero_id: Option<HeroId>) -> Result<(), RegistryError> {
        let mut state = self.state.borrow_mut();
        if state.session.is_none() {
            return Err(RegistryError::NoSession);
        }
        if let Some(id) = hero_id {
            if !state.heroes.iter().any(|h| h.hero_id == id) {
                return Err(RegistryError::UnknownHero(id));
            }
        }
        debug!("Selected hero {:?}", hero_id);
        state.selected_hero = hero_id;
        Ok(())
    }

    /// Replace the roster. A selection that is no longer owned is dropped.
    pub fn set_heroes(&self, heroes: Vec<Hero>) -> Result<(), RegistryError> {
        let mut state = self.state.borrow_mut();
        if state.session.is_none() {
            return Err(RegistryError::NoSession);
        }
        if let Some(id) = state.selected_hero {
            if !heroes.iter().any(|h| h.hero_id == id) {
                debug!("Selected hero {} left the roster", id);
                state.selected_hero = None;
            }
        }
        debug!("Roster updated ({} heroes)", heroes.len());
        state.heroes = heroes;
        Ok(())
    }

    /// Swap in a server-provided hero verbatim and announce it
    pub fn replace_hero(&self, hero: Hero) -> Result<(), RegistryError> {
        let event = {
            let mut state = self.state.borrow_mut();
            if state.session.is_none() {
                return Err(RegistryError::NoSession);
            }
            let slot = state
                .heroes
                .iter_mut()
                .find(|h| h.hero_id == hero.hero_id)
                .ok_or(RegistryError::UnknownHero(hero.hero_id))?;
            let event = ClientEvent::HeroUpdated {
                hero_id: hero.hero_id,
                level: hero.level,
                xp: hero.xp,
            };
            *slot = hero;
            event
        };
        self.bus.emit(event);
        Ok(())
    }

    pub fn set_wager_tiers(&self, tiers: Vec<WagerTier>) -> Result<(), RegistryError> {
        let mut state = self.state.borrow_mut();
        if state.session.is_none() {
            return Err(RegistryError::NoSession);
        }
        state.wager_tiers = Some(tiers);
        Ok(())
    }

    /// Record a confirmed balance and emit `bcoin-balance-update` for it
    pub fn set_coin_balance(&self, balance: Bcoin) -> Result<(), RegistryError> {
        {
            let mut state = self.state.borrow_mut();
            let session = state.session.as_mut().ok_or(RegistryError::NoSession)?;
            session.coin_balance = balance;
        }
        self.bus
            .emit(ClientEvent::BalanceUpdate(BalanceUpdate::ok(balance.to_string())));
        Ok(())
    }

    /// Drop every session fact.
    ///
    /// Emits `session-ended` only if a session existed, so repeated calls
    /// end a session once. Returns whether a session was torn down.
    pub fn clear(&self) -> bool {
        let previous = std::mem::take(&mut *self.state.borrow_mut());
        let Some(session) = previous.session else {
            return false;
        };
        info!("Session ended for user {}", session.user_id);
        self.bus.emit(ClientEvent::SessionEnded);
        true
    }
}

/// What a scene may know about the session: reads only.
///
/// Writes go through the sync service, which owns the registry.
#[derive(Clone)]
pub struct SessionView(SessionRegistry);

impl SessionView {
    pub fn session(&self) -> Option<Session> {
        self.0.session()
    }

    pub fn is_logged_in(&self) -> bool {
        self.0.is_logged_in()
    }

    pub fn coin_balance(&self) -> Option<Bcoin> {
        self.0.coin_balance()
    }

    pub fn selected_hero(&self) -> Option<Hero> {
        self.0.selected_hero()
    }

    pub fn hero(&self, hero_id: HeroId) -> Option<Hero> {
        self.0.hero(hero_id)
    }

    pub fn heroes(&self) -> Vec<Hero> {
        self.0.heroes()
    }

    pub fn wager_tiers(&self) -> Option<Vec<WagerTier>> {
        self.0.wager_tiers()
    }
}
