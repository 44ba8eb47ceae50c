use std::{
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::command::{DecodedAction, DirectiveId};

/// Callback receiving raw planner text before decoding.
pub type TextObserver = dyn Fn(DirectiveId, &str) + Send + Sync;
/// Callback receiving each successfully decoded action.
pub type PlanObserver = dyn Fn(DirectiveId, &DecodedAction) + Send + Sync;

/// Handle returned by a subscription, used to remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ObserverId(u64);

/// Subscriber lists for planner diagnostics.
///
/// Observers run synchronously on the thread completing the directive, in
/// subscription order. They may subscribe or unsubscribe from inside a
/// callback; the change applies to the next notification.
#[derive(Default)]
pub struct PlannerObservers {
    next_id: AtomicU64,
    text: Mutex<Vec<(ObserverId, Arc<TextObserver>)>>,
    plan: Mutex<Vec<(ObserverId, Arc<PlanObserver>)>>,
}

impl fmt::Debug for PlannerObservers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlannerObservers")
            .field("text", &self.text.lock().len())
            .field("plan", &self.plan.lock().len())
            .finish()
    }
}

impl PlannerObservers {
    /// Creates empty lists.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to raw planner text.
    pub fn on_planner_text<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(DirectiveId, &str) + Send + Sync + 'static,
    {
        let id = self.allocate();
        self.text.lock().push((id, Arc::new(observer)));
        id
    }

    /// Subscribes to decoded actions.
    pub fn on_plan<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(DirectiveId, &DecodedAction) + Send + Sync + 'static,
    {
        let id = self.allocate();
        self.plan.lock().push((id, Arc::new(observer)));
        id
    }

    /// Removes a subscription of either kind. Returns whether it existed.
    pub fn remove(&self, id: ObserverId) -> bool {
        let mut removed = false;
        self.text.lock().retain(|(existing, _)| {
            let keep = *existing != id;
            removed |= !keep;
            keep
        });
        self.plan.lock().retain(|(existing, _)| {
            let keep = *existing != id;
            removed |= !keep;
            keep
        });
        removed
    }

    /// Number of live subscriptions of both kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.lock().len() + self.plan.lock().len()
    }

    /// Whether nobody is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivers raw planner text.
    pub fn notify_text(&self, directive: DirectiveId, text: &str) {
        let observers: Vec<_> = self.text.lock().iter().map(|(_, o)| Arc::clone(o)).collect();
        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| observer(directive, text))).is_err() {
                warn!(%directive, "planner text observer panicked");
            }
        }
    }

    /// Delivers a decoded action.
    pub fn notify_plan(&self, directive: DirectiveId, action: &DecodedAction) {
        let observers: Vec<_> = self.plan.lock().iter().map(|(_, o)| Arc::clone(o)).collect();
        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| observer(directive, action))).is_err() {
                warn!(%directive, "plan observer panicked");
            }
        }
    }

    fn allocate(&self) -> ObserverId {
        ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}
