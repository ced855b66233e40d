/// Event types shared by every scene of a bombdash client session.
///
/// Events are a closed set: each variant carries its typed payload and maps to
/// exactly one [`EventKind`], which is what subscribers register against.
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod bus;

pub use bus::{DeliveryReport, EventBus, HandlerError, HandlerFailure, SubscriptionId};

// ============================================================================
// Event Kinds
// ============================================================================

/// Discriminant of a [`ClientEvent`], used as the key of the subscription table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// `bcoin-balance-update`
    BalanceUpdate,
    /// `bcoin-balance-changed`
    BalanceChanged,
    /// `session-started`
    SessionStarted,
    /// `session-ended`
    SessionEnded,
    /// `hero-updated`
    HeroUpdated,
    /// `scene-changed`
    SceneChanged,
    /// `transaction:pending`
    TransactionPending,
    /// `transaction:success`
    TransactionSucceeded,
    /// `transaction:failed`
    TransactionFailed,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::BalanceUpdate,
        EventKind::BalanceChanged,
        EventKind::SessionStarted,
        EventKind::SessionEnded,
        EventKind::HeroUpdated,
        EventKind::SceneChanged,
        EventKind::TransactionPending,
        EventKind::TransactionSucceeded,
        EventKind::TransactionFailed,
    ];

    /// Wire name other modules (and the browser build) know this event by
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::BalanceUpdate => "bcoin-balance-update",
            EventKind::BalanceChanged => "bcoin-balance-changed",
            EventKind::SessionStarted => "session-started",
            EventKind::SessionEnded => "session-ended",
            EventKind::HeroUpdated => "hero-updated",
            EventKind::SceneChanged => "scene-changed",
            EventKind::TransactionPending => "transaction:pending",
            EventKind::TransactionSucceeded => "transaction:success",
            EventKind::TransactionFailed => "transaction:failed",
        }
    }

    /// Look up a kind by its wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Payload of `bcoin-balance-update`.
///
/// `balance` is a decimal string (`"100.00"`). On a failed refresh `error` is
/// set and `balance` carries the last known value, or nothing if none is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BalanceUpdate {
    pub fn ok(balance: impl Into<String>) -> Self {
        Self {
            balance: Some(balance.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>, last_known: Option<String>) -> Self {
        Self {
            balance: last_known,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

// ============================================================================
// Client Events
// ============================================================================

/// Every notification that crosses a scene boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Result of a balance refresh, successful or not
    BalanceUpdate(BalanceUpdate),
    /// Something spent or earned currency; listeners should request a refresh
    BalanceChanged,
    /// A session was established (login or silent restore)
    SessionStarted { user_id: u64 },
    /// The session was torn down; emitted once per teardown
    SessionEnded,
    /// A hero in the roster was replaced by a server-provided copy
    HeroUpdated { hero_id: u64, level: u32, xp: u64 },
    /// A scene started (`active = true`) or stopped
    SceneChanged { scene: String, active: bool },
    TransactionPending { tx_hash: String },
    TransactionSucceeded { message: String },
    TransactionFailed { message: String },
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::BalanceUpdate(_) => EventKind::BalanceUpdate,
            ClientEvent::BalanceChanged => EventKind::BalanceChanged,
            ClientEvent::SessionStarted { .. } => EventKind::SessionStarted,
            ClientEvent::SessionEnded => EventKind::SessionEnded,
            ClientEvent::HeroUpdated { .. } => EventKind::HeroUpdated,
            ClientEvent::SceneChanged { .. } => EventKind::SceneChanged,
            ClientEvent::TransactionPending { .. } => EventKind::TransactionPending,
            ClientEvent::TransactionSucceeded { .. } => EventKind::TransactionSucceeded,
            ClientEvent::TransactionFailed { .. } => EventKind::TransactionFailed,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Balance payload, if this is a `bcoin-balance-update`
    pub fn as_balance_update(&self) -> Option<&BalanceUpdate> {
        match self {
            ClientEvent::BalanceUpdate(update) => Some(update),
            _ => None,
        }
    }
}
