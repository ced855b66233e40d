// Scene behaviours the runner installs by default

use std::cell::RefCell;
use std::rc::Rc;

use bombdash_client::client::{
    EventKind, Scene, SceneContext, SceneKey, ScenePayload, SubscriptionId,
};
use tracing::debug;

/// What the HUD currently shows
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HudState {
    pub balance: Option<String>,
    /// Error of the last failed refresh, cleared by the next good one
    pub error: Option<String>,
    /// Balance updates received while mounted
    pub updates: usize,
}

/// Shared read handle onto the HUD
#[derive(Clone, Debug, Default)]
pub struct HudView(Rc<RefCell<HudState>>);

impl HudView {
    pub fn snapshot(&self) -> HudState {
        self.0.borrow().clone()
    }
}

/// Balance overlay of a play session.
///
/// Reads the balance from the session view when mounted, then follows
/// `bcoin-balance-update` until stopped.
pub struct HudScene {
    view: HudView,
    subscription: Option<SubscriptionId>,
}

impl HudScene {
    pub fn new(view: HudView) -> Self {
        Self {
            view,
            subscription: None,
        }
    }
}

impl Scene for HudScene {
    fn on_start(&mut self, ctx: &SceneContext, _payload: &ScenePayload) {
        *self.view.0.borrow_mut() = HudState {
            balance: ctx.session.coin_balance().map(|b| b.to_string()),
            ..HudState::default()
        };

        let view = self.view.clone();
        self.subscription = Some(ctx.bus.on(EventKind::BalanceUpdate, move |event| {
            if let Some(update) = event.as_balance_update() {
                let mut state = view.0.borrow_mut();
                if update.balance.is_some() {
                    state.balance = update.balance.clone();
                }
                state.error = update.error.clone();
                state.updates += 1;
            }
            Ok(())
        }));
    }

    fn on_stop(&mut self, ctx: &SceneContext) {
        if let Some(id) = self.subscription.take() {
            ctx.bus.off(EventKind::BalanceUpdate, id);
        }
    }
}

/// The play session itself; brings its HUD up with it
pub struct GameSessionScene;

impl Scene for GameSessionScene {
    fn on_start(&mut self, ctx: &SceneContext, payload: &ScenePayload) {
        debug!("Game session {} started with {:?}", ctx.generation, payload);
        ctx.transitions.start(SceneKey::Hud, ScenePayload::None);
    }
}

/// Messages shown by the notification overlay, oldest first
#[derive(Clone, Debug, Default)]
pub struct Notices(Rc<RefCell<Vec<String>>>);

impl Notices {
    pub fn all(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn last(&self) -> Option<String> {
        self.0.borrow().last().cloned()
    }
}

pub struct NotificationScene {
    notices: Notices,
}

impl NotificationScene {
    pub fn new(notices: Notices) -> Self {
        Self { notices }
    }
}

impl Scene for NotificationScene {
    fn on_start(&mut self, _ctx: &SceneContext, payload: &ScenePayload) {
        if let ScenePayload::Message(message) = payload {
            self.notices.0.borrow_mut().push(message.clone());
        }
    }
}
