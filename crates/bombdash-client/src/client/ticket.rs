use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::client::error::SyncError;
use crate::client::scene::SceneKey;

#[derive(Debug, Default, Clone, Copy)]
struct Incarnation {
    /// Bumped on every start, never reset
    generation: u64,
    live: bool,
}

/// Tracks which incarnation of each scene is currently running.
///
/// Shared between the scene machine (which advances it) and the tickets it
/// hands out (which only read it).
#[derive(Clone, Debug, Default)]
pub struct GenerationTracker {
    scenes: Rc<RefCell<HashMap<SceneKey, Incarnation>>>,
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` started and return its new generation
    pub fn begin(&self, key: SceneKey) -> u64 {
        let mut scenes = self.scenes.borrow_mut();
        let entry = scenes.entry(key).or_default();
        entry.generation += 1;
        entry.live = true;
        entry.generation
    }

    pub fn retire(&self, key: SceneKey) {
        if let Some(entry) = self.scenes.borrow_mut().get_mut(&key) {
            entry.live = false;
        }
    }

    /// Generation of the running incarnation of `key`, if it is running
    pub fn current(&self, key: SceneKey) -> Option<u64> {
        self.scenes
            .borrow()
            .get(&key)
            .filter(|entry| entry.live)
            .map(|entry| entry.generation)
    }

    pub fn ticket(&self, key: SceneKey) -> Option<SceneTicket> {
        self.current(key)
            .map(|generation| SceneTicket::from_tracker(self, key, generation))
    }
}

/// Identifies the scene incarnation that issued a backend call.
///
/// A response is only applied while its ticket is live; once the scene was
/// stopped (or restarted) the response is stale and gets discarded.
#[derive(Clone, Debug)]
pub struct SceneTicket {
    key: SceneKey,
    generation: u64,
    tracker: GenerationTracker,
}

impl SceneTicket {
    pub(crate) fn from_tracker(tracker: &GenerationTracker, key: SceneKey, generation: u64) -> Self {
        Self {
            key,
            generation,
            tracker: tracker.clone(),
        }
    }

    pub fn key(&self) -> SceneKey {
        self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_live(&self) -> bool {
        self.tracker.current(self.key) == Some(self.generation)
    }

    pub fn ensure_live(&self) -> Result<(), SyncError> {
        if self.is_live() {
            Ok(())
        } else {
            Err(SyncError::StaleResponse { scene: self.key })
        }
    }
}

impl PartialEq for SceneTicket {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.generation == other.generation
    }
}

impl Eq for SceneTicket {}
