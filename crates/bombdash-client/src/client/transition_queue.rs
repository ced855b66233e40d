use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::client::scene::{SceneKey, ScenePayload};

/// A scene change requested from inside a hook or an event handler
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SceneRequest {
    Start { key: SceneKey, payload: ScenePayload },
    Stop(SceneKey),
    Transition {
        from: SceneKey,
        to: SceneKey,
        payload: ScenePayload,
    },
    /// Session was torn down: stop session scenes, return to auth-choice
    EndSession,
    /// Unrecoverable state: stop everything, restart at boot
    ResetToBoot,
}

/// FIFO of pending scene requests.
///
/// Scenes and bus handlers run while the machine is mid-operation, so they
/// queue here and the machine drains the queue in `process_transitions`.
/// Clones share the same queue.
#[derive(Clone, Debug, Default)]
pub struct TransitionQueue {
    queue: Rc<RefCell<VecDeque<SceneRequest>>>,
}

impl TransitionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, request: SceneRequest) {
        self.queue.borrow_mut().push_back(request);
    }

    pub fn start(&self, key: SceneKey, payload: ScenePayload) {
        self.push(SceneRequest::Start { key, payload });
    }

    pub fn pop(&self) -> Option<SceneRequest> {
        self.queue.borrow_mut().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn clear(&self) {
        self.queue.borrow_mut().clear()
    }
}
