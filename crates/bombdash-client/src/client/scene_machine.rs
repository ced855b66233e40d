use std::collections::HashMap;

use bombdash_events::{ClientEvent, EventBus, EventKind, SubscriptionId};
use tracing::{debug, error, info, warn};

use crate::client::constants::MAX_TRANSITIONS_PER_DRAIN;
use crate::client::economy::END_GAME_ACCOUNT_LEVEL;
use crate::client::error::SceneError;
use crate::client::registry::SessionRegistry;
use crate::client::scene::{
    default_catalog, Layer, Scene, SceneContext, SceneDescriptor, SceneKey,
    ScenePayload,
};
use crate::client::ticket::{GenerationTracker, SceneTicket};
use crate::client::transition_queue::{SceneRequest, TransitionQueue};

/// Owns the set of active scenes and sequences every change to it.
///
/// Exactly one primary scene is active at any instant, starting at `boot`.
/// Overlays layer on top of it. Every change is validated in full before the
/// first hook runs, so a refused request leaves no partial state behind.
pub struct SceneStateMachine {
    catalog: HashMap<SceneKey, SceneDescriptor>,
    scenes: HashMap<SceneKey, Box<dyn Scene>>,
    primary: SceneKey,
    /// Active overlays in start order
    overlays: Vec<SceneKey>,
    generations: GenerationTracker,
    registry: SessionRegistry,
    bus: EventBus,
    transitions: TransitionQueue,
    session_ended: SubscriptionId,
}

impl SceneStateMachine {
    pub fn new(registry: SessionRegistry) -> Self {
        Self::with_forge_level(registry, END_GAME_ACCOUNT_LEVEL)
    }

    /// Machine whose forge gate opens at `forge_min_account_level`
    pub fn with_forge_level(registry: SessionRegistry, forge_min_account_level: u32) -> Self {
        let bus = registry.bus().clone();
        let transitions = TransitionQueue::new();

        // Session teardown is applied on the next drain, after the registry
        // has finished clearing
        let queue = transitions.clone();
        let session_ended = bus.on(EventKind::SessionEnded, move |_| {
            queue.push(SceneRequest::EndSession);
            Ok(())
        });

        let generations = GenerationTracker::new();
        generations.begin(SceneKey::Boot);

        Self {
            catalog: default_catalog(forge_min_account_level)
                .into_iter()
                .map(|descriptor| (descriptor.key, descriptor))
                .collect(),
            scenes: HashMap::new(),
            primary: SceneKey::Boot,
            overlays: Vec::new(),
            generations,
            registry,
            bus,
            transitions,
            session_ended,
        }
    }

    // ===== Setup =====

    /// Attach behaviour to `key`. Replaces any previous behaviour.
    pub fn register_scene<T>(&mut self, key: SceneKey, scene: T)
    where
        T: Scene + 'static,
    {
        if self.scenes.insert(key, Box::new(scene)).is_some() {
            warn!("Scene {} was already registered and has been replaced", key);
        }
    }

    /// Run the entry hook of the initial `boot` scene
    pub fn enter_initial(&mut self) {
        debug!("Entering initial scene {}", self.primary);
        let key = self.primary;
        self.run_start_hook(key, &ScenePayload::None);
        self.announce(key, true);
    }

    // ===== Queries =====

    pub fn is_active(&self, key: SceneKey) -> bool {
        self.primary == key || self.overlays.contains(&key)
    }

    pub fn primary(&self) -> SceneKey {
        self.primary
    }

    pub fn overlays(&self) -> &[SceneKey] {
        &self.overlays
    }

    /// Primary first, then overlays in start order
    pub fn active_scenes(&self) -> Vec<SceneKey> {
        std::iter::once(self.primary)
            .chain(self.overlays.iter().copied())
            .collect()
    }

    pub fn descriptor(&self, key: SceneKey) -> SceneDescriptor {
        self.catalog
            .get(&key)
            .copied()
            .unwrap_or_else(|| SceneDescriptor::of(key, END_GAME_ACCOUNT_LEVEL))
    }

    /// Ticket of the running incarnation of `key`
    pub fn ticket(&self, key: SceneKey) -> Option<SceneTicket> {
        self.generations.ticket(key)
    }

    pub fn transitions(&self) -> &TransitionQueue {
        &self.transitions
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    // ===== Operations =====

    /// Start `key`.
    ///
    /// Starting an active scene does nothing. Starting a primary scene stops
    /// the current primary and the overlays hosted on it.
    pub fn start(&mut self, key: SceneKey, payload: ScenePayload) -> Result<SceneTicket, SceneError> {
        if let Some(ticket) = self.live_ticket(key) {
            debug!("Scene {} already active", key);
            return Ok(ticket);
        }
        let descriptor = self.validate_start(key, self.primary)?;
        match descriptor.layer {
            Layer::Overlay => Ok(self.activate_overlay(key, &payload)),
            Layer::Primary => Ok(self.switch_primary(key, &payload)),
        }
    }

    /// Stop an overlay. The primary scene cannot be stopped, only replaced.
    pub fn stop(&mut self, key: SceneKey) -> Result<(), SceneError> {
        if !self.is_active(key) {
            return Err(SceneError::NotActive(key));
        }
        if key == self.primary {
            return Err(SceneError::PrimaryRequired(key));
        }
        self.deactivate_overlay(key);
        Ok(())
    }

    /// Replace active scene `from` with `to`
    pub fn transition(
        &mut self,
        from: SceneKey,
        to: SceneKey,
        payload: ScenePayload,
    ) -> Result<SceneTicket, SceneError> {
        if !self.is_active(from) {
            return Err(SceneError::NotActive(from));
        }
        if from == to {
            return self.live_ticket(to).ok_or(SceneError::NotActive(to));
        }

        let from_overlay = from != self.primary;
        let to_overlay = self.descriptor(to).is_overlay();

        if !from_overlay && to_overlay {
            return Err(SceneError::PrimaryRequired(from));
        }
        if !from_overlay {
            return self.start(to, payload);
        }

        // Overlay to anything: the primary is unchanged while `from` stops
        if let Some(ticket) = self.live_ticket(to) {
            self.deactivate_overlay(from);
            return Ok(ticket);
        }
        let descriptor = self.validate_start(to, self.primary)?;
        self.deactivate_overlay(from);
        Ok(match descriptor.layer {
            Layer::Overlay => self.activate_overlay(to, &payload),
            Layer::Primary => self.switch_primary(to, &payload),
        })
    }

    /// Tear down every session scene and land on auth-choice.
    ///
    /// Session-dependent overlays stop first, then the primary is replaced.
    pub fn end_session(&mut self) {
        info!("Ending session scenes (primary {})", self.primary);
        let dependent: Vec<SceneKey> = self
            .overlays
            .iter()
            .rev()
            .copied()
            .filter(|key| self.descriptor(*key).depends_on_session)
            .collect();
        for key in dependent {
            self.deactivate_overlay(key);
        }
        if self.primary != SceneKey::AuthChoice {
            self.switch_primary(SceneKey::AuthChoice, &ScenePayload::None);
        }
    }

    /// Stop everything and start a fresh `boot` incarnation
    pub fn reset_to_boot(&mut self) {
        error!("Resetting client to {}", SceneKey::Boot);
        let overlays: Vec<SceneKey> = self.overlays.iter().rev().copied().collect();
        for key in overlays {
            self.deactivate_overlay(key);
        }
        self.switch_primary(SceneKey::Boot, &ScenePayload::None);
    }

    /// Apply queued requests in FIFO order until the queue is empty.
    ///
    /// Returns the errors of refused requests. Requests queued while draining
    /// are applied in the same call, up to a fixed bound.
    pub fn process_transitions(&mut self) -> Vec<SceneError> {
        let mut errors = Vec::new();
        let mut applied = 0;
        while let Some(request) = self.transitions.pop() {
            if applied == MAX_TRANSITIONS_PER_DRAIN {
                let dropped = self.transitions.len() + 1;
                self.transitions.clear();
                error!("Dropped {} scene requests, queue did not settle", dropped);
                errors.push(SceneError::TransitionLoop(MAX_TRANSITIONS_PER_DRAIN));
                break;
            }
            applied += 1;
            debug!("Processing scene request {:?}", request);
            let result = match request {
                SceneRequest::Start { key, payload } => self.start(key, payload).map(|_| ()),
                SceneRequest::Stop(key) => self.stop(key),
                SceneRequest::Transition { from, to, payload } => {
                    self.transition(from, to, payload).map(|_| ())
                }
                SceneRequest::EndSession => {
                    self.end_session();
                    Ok(())
                }
                SceneRequest::ResetToBoot => {
                    self.reset_to_boot();
                    Ok(())
                }
            };
            if let Err(e) = result {
                warn!("Scene request refused: {}", e);
                errors.push(e);
            }
        }
        errors
    }

    // ===== Internals =====

    fn live_ticket(&self, key: SceneKey) -> Option<SceneTicket> {
        if self.is_active(key) {
            self.generations.ticket(key)
        } else {
            None
        }
    }

    /// Everything that can refuse a start, checked with `primary` as the
    /// primary scene the new one would sit on
    fn validate_start(&self, key: SceneKey, primary: SceneKey) -> Result<SceneDescriptor, SceneError> {
        let descriptor = self.descriptor(key);
        if let Some(gate) = descriptor.gate {
            gate.check(&self.registry)
                .map_err(|reason| SceneError::GateRefused { scene: key, reason })?;
        }
        if let (Layer::Overlay, Some(host)) = (descriptor.layer, descriptor.host) {
            if host != primary {
                return Err(SceneError::HostInactive { overlay: key, host });
            }
        }
        Ok(descriptor)
    }

    fn switch_primary(&mut self, key: SceneKey, payload: &ScenePayload) -> SceneTicket {
        let previous = self.primary;
        let hosted: Vec<SceneKey> = self
            .overlays
            .iter()
            .rev()
            .copied()
            .filter(|overlay| self.descriptor(*overlay).host == Some(previous))
            .collect();
        for overlay in hosted {
            self.deactivate_overlay(overlay);
        }

        self.run_stop_hook(previous);
        self.generations.retire(previous);
        self.announce(previous, false);

        self.primary = key;
        let ticket = self.activate(key);
        info!("Primary scene {} -> {}", previous, key);
        self.run_start_hook(key, payload);
        self.announce(key, true);
        ticket
    }

    fn activate_overlay(&mut self, key: SceneKey, payload: &ScenePayload) -> SceneTicket {
        self.overlays.push(key);
        let ticket = self.activate(key);
        debug!("Overlay {} started over {}", key, self.primary);
        self.run_start_hook(key, payload);
        self.announce(key, true);
        ticket
    }

    fn deactivate_overlay(&mut self, key: SceneKey) {
        self.run_stop_hook(key);
        self.overlays.retain(|overlay| *overlay != key);
        self.generations.retire(key);
        debug!("Overlay {} stopped", key);
        self.announce(key, false);
    }

    fn activate(&mut self, key: SceneKey) -> SceneTicket {
        let generation = self.generations.begin(key);
        SceneTicket::from_tracker(&self.generations, key, generation)
    }

    fn context(&self, key: SceneKey) -> SceneContext {
        SceneContext {
            key,
            generation: self.generations.current(key).unwrap_or_default(),
            session: self.registry.view(),
            bus: self.bus.clone(),
            transitions: self.transitions.clone(),
        }
    }

    fn run_start_hook(&mut self, key: SceneKey, payload: &ScenePayload) {
        let ctx = self.context(key);
        if let Some(scene) = self.scenes.get_mut(&key) {
            scene.on_start(&ctx, payload);
        }
    }

    fn run_stop_hook(&mut self, key: SceneKey) {
        let ctx = self.context(key);
        if let Some(scene) = self.scenes.get_mut(&key) {
            scene.on_stop(&ctx);
        }
    }

    fn announce(&self, key: SceneKey, active: bool) {
        let report = self.bus.emit(ClientEvent::SceneChanged {
            scene: key.name().to_string(),
            active,
        });
        if !report.is_clean() {
            warn!(
                "{} scene-changed handlers failed for {}",
                report.failures.len(),
                key
            );
        }
    }
}

impl Drop for SceneStateMachine {
    fn drop(&mut self) {
        self.bus.off(EventKind::SessionEnded, self.session_ended);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::client::bcoin::Bcoin;
    use crate::client::error::GateFailure;
    use crate::client::session::Session;
    use crate::client::types::{Hero, HeroKind, HeroStats, LifecycleStatus};

    /// Records hook calls as "start:<scene>" / "stop:<scene>"
    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Scene for Recorder {
        fn on_start(&mut self, ctx: &SceneContext, _payload: &ScenePayload) {
            self.log.borrow_mut().push(format!("start:{}", ctx.key));
        }

        fn on_stop(&mut self, ctx: &SceneContext) {
            self.log.borrow_mut().push(format!("stop:{}", ctx.key));
        }
    }

    fn session(account_level: u32) -> Session {
        Session {
            user_id: 1,
            wallet_address: None,
            account_level,
            account_xp: 0,
            coin_balance: Bcoin::from_whole(100),
            highest_wave_reached: 0,
            auth_token: "token".into(),
        }
    }

    fn hero(id: u64, kind: HeroKind, status: LifecycleStatus) -> Hero {
        Hero {
            hero_id: id,
            owner_user_id: 1,
            kind,
            level: 1,
            xp: 0,
            max_hp: 100,
            base_stats: HeroStats::default(),
            status,
            sprite_name: None,
            rarity: None,
            nft_id: None,
        }
    }

    fn machine() -> (SceneStateMachine, SessionRegistry, Rc<RefCell<Vec<String>>>) {
        let registry = SessionRegistry::new(EventBus::new());
        let mut machine = SceneStateMachine::new(registry.clone());
        let log = Rc::new(RefCell::new(Vec::new()));
        for key in SceneKey::ALL {
            machine.register_scene(key, Recorder { log: log.clone() });
        }
        (machine, registry, log)
    }

    fn logged_in_with_hero(registry: &SessionRegistry) {
        registry.begin_session(session(1));
        registry
            .set_heroes(vec![hero(1, HeroKind::Standard, LifecycleStatus::InWallet)])
            .unwrap();
        registry.select_hero(Some(1)).unwrap();
    }

    #[test]
    fn test_starts_on_boot() {
        let (machine, _, _) = machine();
        assert_eq!(machine.primary(), SceneKey::Boot);
        assert!(machine.is_active(SceneKey::Boot));
        assert_eq!(machine.active_scenes(), vec![SceneKey::Boot]);
    }

    #[test]
    fn test_primary_start_replaces_previous_primary() {
        let (mut machine, registry, log) = machine();
        registry.begin_session(session(1));

        machine.start(SceneKey::MainMenu, ScenePayload::None).unwrap();
        machine.start(SceneKey::Profile, ScenePayload::None).unwrap();

        assert_eq!(machine.primary(), SceneKey::Profile);
        assert!(!machine.is_active(SceneKey::MainMenu));
        assert_eq!(
            *log.borrow(),
            vec![
                "stop:boot",
                "start:main-menu",
                "stop:main-menu",
                "start:profile"
            ]
        );
    }

    #[test]
    fn test_restart_of_active_scene_is_noop() {
        let (mut machine, registry, log) = machine();
        registry.begin_session(session(1));
        let first = machine.start(SceneKey::MainMenu, ScenePayload::None).unwrap();
        let again = machine.start(SceneKey::MainMenu, ScenePayload::None).unwrap();

        assert_eq!(first, again);
        assert_eq!(
            log.borrow().iter().filter(|l| *l == "start:main-menu").count(),
            1
        );
    }

    #[test]
    fn test_gate_refusal_leaves_no_partial_state() {
        let (mut machine, registry, log) = machine();
        registry.begin_session(session(3));
        machine.start(SceneKey::MainMenu, ScenePayload::None).unwrap();
        log.borrow_mut().clear();

        let refused = machine.start(SceneKey::Forge, ScenePayload::None);
        assert_eq!(
            refused,
            Err(SceneError::GateRefused {
                scene: SceneKey::Forge,
                reason: GateFailure::AccountLevel {
                    required: 8,
                    actual: 3
                }
            })
        );
        assert_eq!(machine.primary(), SceneKey::MainMenu);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_forge_opens_at_end_game_level() {
        let (mut machine, registry, _) = machine();
        registry.begin_session(session(8));
        machine.start(SceneKey::Forge, ScenePayload::None).unwrap();
        assert_eq!(machine.primary(), SceneKey::Forge);
    }

    #[test]
    fn test_unstaked_tokenized_hero_cannot_enter_play() {
        let (mut machine, registry, _) = machine();
        registry.begin_session(session(1));
        registry
            .set_heroes(vec![hero(4, HeroKind::Tokenized, LifecycleStatus::InWallet)])
            .unwrap();

        assert!(matches!(
            machine.start(SceneKey::GameSession, ScenePayload::None),
            Err(SceneError::GateRefused {
                reason: GateFailure::NoHeroSelected,
                ..
            })
        ));

        registry.select_hero(Some(4)).unwrap();
        assert_eq!(
            machine.start(SceneKey::GameSession, ScenePayload::Hero(4)),
            Err(SceneError::GateRefused {
                scene: SceneKey::GameSession,
                reason: GateFailure::HeroNotPlayable(4)
            })
        );
        assert_eq!(machine.primary(), SceneKey::Boot);
    }

    #[test]
    fn test_overlay_requires_its_host() {
        let (mut machine, registry, _) = machine();
        logged_in_with_hero(&registry);
        machine.start(SceneKey::MainMenu, ScenePayload::None).unwrap();

        assert_eq!(
            machine.start(SceneKey::Pause, ScenePayload::None),
            Err(SceneError::HostInactive {
                overlay: SceneKey::Pause,
                host: SceneKey::GameSession
            })
        );

        machine.start(SceneKey::GameSession, ScenePayload::Hero(1)).unwrap();
        machine.start(SceneKey::Hud, ScenePayload::None).unwrap();
        machine.start(SceneKey::Pause, ScenePayload::None).unwrap();
        assert_eq!(
            machine.active_scenes(),
            vec![SceneKey::GameSession, SceneKey::Hud, SceneKey::Pause]
        );
    }

    #[test]
    fn test_leaving_host_stops_hosted_overlays_only() {
        let (mut machine, registry, _) = machine();
        logged_in_with_hero(&registry);
        machine.start(SceneKey::GameSession, ScenePayload::Hero(1)).unwrap();
        machine.start(SceneKey::Hud, ScenePayload::None).unwrap();
        machine
            .start(SceneKey::Notification, ScenePayload::Message("hi".into()))
            .unwrap();

        machine
            .transition(
                SceneKey::GameSession,
                SceneKey::GameOver,
                ScenePayload::Results {
                    wave: 3,
                    reward: Bcoin::from_whole(5),
                },
            )
            .unwrap();

        assert_eq!(
            machine.active_scenes(),
            vec![SceneKey::GameOver, SceneKey::Notification]
        );
    }

    #[test]
    fn test_stop_rules() {
        let (mut machine, registry, _) = machine();
        logged_in_with_hero(&registry);
        machine.start(SceneKey::GameSession, ScenePayload::Hero(1)).unwrap();
        machine.start(SceneKey::Pause, ScenePayload::None).unwrap();

        assert_eq!(
            machine.stop(SceneKey::GameSession),
            Err(SceneError::PrimaryRequired(SceneKey::GameSession))
        );
        assert_eq!(
            machine.stop(SceneKey::Hud),
            Err(SceneError::NotActive(SceneKey::Hud))
        );
        machine.stop(SceneKey::Pause).unwrap();
        assert_eq!(machine.active_scenes(), vec![SceneKey::GameSession]);
    }

    #[test]
    fn test_transition_rules() {
        let (mut machine, registry, _) = machine();
        logged_in_with_hero(&registry);
        machine.start(SceneKey::GameSession, ScenePayload::Hero(1)).unwrap();

        assert_eq!(
            machine.transition(SceneKey::MainMenu, SceneKey::Profile, ScenePayload::None),
            Err(SceneError::NotActive(SceneKey::MainMenu))
        );
        assert_eq!(
            machine.transition(SceneKey::GameSession, SceneKey::Pause, ScenePayload::None),
            Err(SceneError::PrimaryRequired(SceneKey::GameSession))
        );

        // pause -> main-menu: overlay out, primary replaced
        machine.start(SceneKey::Pause, ScenePayload::None).unwrap();
        machine
            .transition(SceneKey::Pause, SceneKey::MainMenu, ScenePayload::None)
            .unwrap();
        assert_eq!(machine.active_scenes(), vec![SceneKey::MainMenu]);
    }

    #[test]
    fn test_session_end_tears_down_through_queue() {
        let (mut machine, registry, log) = machine();
        logged_in_with_hero(&registry);
        machine.start(SceneKey::GameSession, ScenePayload::Hero(1)).unwrap();
        machine.start(SceneKey::Hud, ScenePayload::None).unwrap();
        machine.start(SceneKey::Pause, ScenePayload::None).unwrap();
        log.borrow_mut().clear();

        registry.clear();
        assert_eq!(machine.transitions().len(), 1);
        assert!(machine.process_transitions().is_empty());

        assert_eq!(machine.active_scenes(), vec![SceneKey::AuthChoice]);
        assert_eq!(
            *log.borrow(),
            vec![
                "stop:pause",
                "stop:hud",
                "stop:game-session",
                "start:auth-choice"
            ]
        );
    }

    #[test]
    fn test_tickets_go_stale_when_scene_stops() {
        let (mut machine, registry, _) = machine();
        registry.begin_session(session(1));
        let ticket = machine.start(SceneKey::Profile, ScenePayload::None).unwrap();
        assert!(ticket.is_live());

        machine.start(SceneKey::MainMenu, ScenePayload::None).unwrap();
        assert!(!ticket.is_live());

        let again = machine.start(SceneKey::Profile, ScenePayload::None).unwrap();
        assert!(again.is_live());
        assert!(!ticket.is_live());
    }

    #[test]
    fn test_reset_to_boot_restarts_boot() {
        let (mut machine, registry, _) = machine();
        logged_in_with_hero(&registry);
        let boot = machine.ticket(SceneKey::Boot).unwrap();
        machine.start(SceneKey::GameSession, ScenePayload::Hero(1)).unwrap();
        machine.start(SceneKey::Hud, ScenePayload::None).unwrap();

        machine.transitions().push(SceneRequest::ResetToBoot);
        machine.process_transitions();

        assert_eq!(machine.active_scenes(), vec![SceneKey::Boot]);
        assert!(!boot.is_live());
    }

    struct Bouncer {
        to: SceneKey,
    }

    impl Scene for Bouncer {
        fn on_start(&mut self, ctx: &SceneContext, _payload: &ScenePayload) {
            ctx.transitions.start(self.to, ScenePayload::None);
        }
    }

    #[test]
    fn test_transition_loop_is_bounded() {
        let registry = SessionRegistry::new(EventBus::new());
        let mut machine = SceneStateMachine::new(registry);
        machine.register_scene(SceneKey::Config, Bouncer { to: SceneKey::Ranking });
        machine.register_scene(SceneKey::Ranking, Bouncer { to: SceneKey::Config });

        machine.transitions().start(SceneKey::Config, ScenePayload::None);
        let errors = machine.process_transitions();

        assert_eq!(
            errors,
            vec![SceneError::TransitionLoop(MAX_TRANSITIONS_PER_DRAIN)]
        );
        assert!(machine.transitions().is_empty());
    }

    struct SessionReader {
        seen: Rc<RefCell<Option<(Option<u64>, Option<u64>)>>>,
    }

    impl Scene for SessionReader {
        fn on_start(&mut self, ctx: &SceneContext, _payload: &ScenePayload) {
            let user = ctx.session.session().map(|s| s.user_id);
            let hero = ctx.session.selected_hero().map(|h| h.hero_id);
            *self.seen.borrow_mut() = Some((user, hero));
        }
    }

    #[test]
    fn test_scenes_read_session_through_view() {
        let registry = SessionRegistry::new(EventBus::new());
        let mut machine = SceneStateMachine::new(registry.clone());
        let seen = Rc::new(RefCell::new(None));
        machine.register_scene(SceneKey::GameSession, SessionReader { seen: seen.clone() });
        logged_in_with_hero(&registry);

        machine.start(SceneKey::GameSession, ScenePayload::Hero(1)).unwrap();

        assert_eq!(*seen.borrow(), Some((Some(1), Some(1))));
    }
}
