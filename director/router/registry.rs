use std::{
    any::Any,
    collections::HashMap,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::{ActorRef, Command, CommandList};

/// Failure reported by, or on behalf of, a handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The handler declined the command.
    #[error("handler rejected command: {0}")]
    Rejected(String),
    /// A required parameter was missing or unusable.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParam {
        /// Parameter name.
        name: String,
        /// What was wrong with it.
        reason: String,
    },
    /// The handler panicked; the panic was contained.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Rejected`].
    #[must_use]
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }
}

/// Callback bound to one intent.
pub type ActionHandler = dyn Fn(&Command, &ActorRef) -> Result<(), HandlerError> + Send + Sync;

/// Intent that failed during dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedCommand {
    /// Intent as written in the plan.
    pub intent: String,
    /// Rendered error.
    pub error: String,
}

/// What happened to each command of a dispatched plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Intents whose handler returned `Ok`.
    pub executed: Vec<String>,
    /// Intents with no registered handler.
    pub skipped: Vec<String>,
    /// Intents whose handler failed or panicked.
    pub failed: Vec<FailedCommand>,
}

impl DispatchReport {
    /// Whether every command ran successfully.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }
}

/// Case-insensitive table of intent handlers. Registering an existing intent
/// replaces its handler.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: Mutex<HashMap<String, Arc<ActionHandler>>>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("intents", &self.intents())
            .finish()
    }
}

impl ActionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `handler` to `intent`. Returns `true` when an existing handler
    /// was replaced. Blank intents are ignored.
    pub fn register<F>(&self, intent: &str, handler: F) -> bool
    where
        F: Fn(&Command, &ActorRef) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let key = normalize(intent);
        if key.is_empty() {
            warn!("ignoring handler registration with a blank intent");
            return false;
        }
        let replaced = self.handlers.lock().insert(key, Arc::new(handler)).is_some();
        debug!(intent, replaced, "action handler registered");
        replaced
    }

    /// Removes the handler for `intent`. Returns whether one existed.
    pub fn unregister(&self, intent: &str) -> bool {
        self.handlers.lock().remove(&normalize(intent)).is_some()
    }

    /// Whether `intent` has a handler.
    #[must_use]
    pub fn contains(&self, intent: &str) -> bool {
        self.handlers.lock().contains_key(&normalize(intent))
    }

    /// Number of registered intents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered intent keys, sorted.
    #[must_use]
    pub fn intents(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.handlers.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Runs `plan` in order against a fresh snapshot of the table.
    ///
    /// Unknown intents are skipped. A handler error or panic is recorded and
    /// the remaining commands still run. No lock is held while handlers run,
    /// so handlers may register or unregister actions; such changes apply to
    /// the next dispatch.
    pub fn dispatch(&self, plan: &CommandList, instigator: &ActorRef) -> DispatchReport {
        let table = self.handlers.lock().clone();
        let mut report = DispatchReport::default();
        for command in &plan.commands {
            let Some(handler) = table.get(&normalize(&command.intent)) else {
                info!(intent = %command.intent, "no handler registered, skipping command");
                report.skipped.push(command.intent.clone());
                continue;
            };
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(command, instigator)))
                .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(&*panic))));
            match outcome {
                Ok(()) => report.executed.push(command.intent.clone()),
                Err(err) => {
                    warn!(intent = %command.intent, error = %err, "action handler failed");
                    report.failed.push(FailedCommand {
                        intent: command.intent.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        report
    }
}

fn normalize(intent: &str) -> String {
    intent.trim().to_lowercase()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|msg| (*msg).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn plan(intents: &[&str]) -> CommandList {
        CommandList {
            commands: intents.iter().map(|i| Command::new(*i)).collect(),
        }
    }

    #[test]
    fn case_insensitive_upsert_keeps_one_entry() {
        let registry = ActionRegistry::new();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&calls);
        assert!(!registry.register("MoveTo", move |_, _| {
            first.lock().push("first");
            Ok(())
        }));
        let second = Arc::clone(&calls);
        assert!(registry.register("moveto", move |_, _| {
            second.lock().push("second");
            Ok(())
        }));
        assert_eq!(registry.len(), 1);

        let report = registry.dispatch(&plan(&["MOVETO"]), &ActorRef::new("npc"));
        assert_eq!(report.executed, ["MOVETO"]);
        assert_eq!(*calls.lock(), ["second"]);
    }

    #[test]
    fn unknown_intents_are_skipped_without_stopping_the_plan() {
        let registry = ActionRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        registry.register("Say", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let report = registry.dispatch(&plan(&["Fly", "Say"]), &ActorRef::new("npc"));
        assert_eq!(report.skipped, ["Fly"]);
        assert_eq!(report.executed, ["Say"]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn errors_and_panics_are_isolated_per_command() {
        let registry = ActionRegistry::new();
        registry.register("Fail", |_, _| Err(HandlerError::rejected("blocked")));
        registry.register("Boom", |_, _| panic!("handler exploded"));
        registry.register("Say", |_, _| Ok(()));
        let report = registry.dispatch(&plan(&["Fail", "Boom", "Say"]), &ActorRef::new("npc"));
        assert_eq!(report.executed, ["Say"]);
        assert_eq!(report.failed.len(), 2);
        assert!(report.failed[0].error.contains("blocked"));
        assert!(report.failed[1].error.contains("handler exploded"));
        assert!(!report.is_clean());
    }

    #[test]
    fn handlers_receive_command_and_instigator() {
        let registry = ActionRegistry::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        registry.register("MoveTo", move |command, instigator| {
            *sink.lock() = Some((command.target.clone(), instigator.clone()));
            Ok(())
        });
        let plan = CommandList {
            commands: vec![Command::new("MoveTo").with_target("NPC_Scout")],
        };
        registry.dispatch(&plan, &ActorRef::new("player-1"));
        assert_eq!(
            *seen.lock(),
            Some((Some("NPC_Scout".to_owned()), ActorRef::new("player-1")))
        );
    }

    #[test]
    fn unregister_and_blank_keys() {
        let registry = ActionRegistry::new();
        assert!(!registry.register("  ", |_, _| Ok(())));
        assert!(registry.is_empty());
        registry.register("Patrol", |_, _| Ok(()));
        assert!(registry.contains("PATROL"));
        assert!(registry.unregister("patrol"));
        assert!(!registry.unregister("patrol"));
        assert!(registry.is_empty());
    }

    #[test]
    fn handler_may_mutate_registry_during_dispatch() {
        let registry = Arc::new(ActionRegistry::new());
        let inner = Arc::clone(&registry);
        registry.register("Learn", move |_, _| {
            inner.register("Dance", |_, _| Ok(()));
            Ok(())
        });
        let report = registry.dispatch(&plan(&["Learn", "Dance"]), &ActorRef::new("npc"));
        assert_eq!(report.executed, ["Learn"]);
        assert_eq!(report.skipped, ["Dance"]);
        assert!(registry.contains("dance"));
    }
}
