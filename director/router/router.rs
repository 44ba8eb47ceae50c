use std::{
    fmt,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use director_catalog::{
    Candidate, ConsoleCatalog, ConsoleCommandEntry, Retriever, ScoringProfile, WorldActionEntry,
    WorldCatalog,
};
use director_grammar::{build_grammar, GrammarArtifact, GrammarScratch};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_logging::LogLevel;
use thiserror::Error;
use tokio::{
    runtime::Handle,
    sync::{mpsc, Mutex as AsyncMutex},
};
use tracing::{debug, warn};

use crate::{
    codec::{build_prompt_payload, decode_response},
    command::{ActorRef, Command, DecodedAction, DirectiveId},
    console::ConsoleExecutor,
    inference::{error_object, InferenceBackend, InferenceRequest},
    observers::PlannerObservers,
    registry::{ActionRegistry, DispatchReport, HandlerError},
    telemetry::DirectorTelemetry,
};

/// Pipeline position of a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveStage {
    /// Nothing in flight.
    Idle,
    /// Ranking catalog entries.
    Retrieving,
    /// Grammar written and payload built.
    PromptBuilt,
    /// Waiting for the inference backend.
    AwaitingInference,
    /// Decoding the planner response.
    Decoding,
    /// Running the decoded action.
    Executing,
}

impl DirectiveStage {
    /// Stable lowercase label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Retrieving => "retrieving",
            Self::PromptBuilt => "prompt_built",
            Self::AwaitingInference => "awaiting_inference",
            Self::Decoding => "decoding",
            Self::Executing => "executing",
        }
    }
}

/// Per-catalog retrieval limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    /// World candidates retrieved per directive.
    pub world_top_k: usize,
    /// Console candidates retrieved per directive.
    pub console_top_k: usize,
    /// World candidates scoring below this are dropped.
    pub world_min_score: f32,
    /// Console candidates scoring below this are dropped.
    pub console_min_score: f32,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            world_top_k: 5,
            console_top_k: 3,
            world_min_score: 0.05,
            console_min_score: 0.1,
        }
    }
}

/// Reasons a directive cannot be submitted.
#[derive(Debug, Error)]
pub enum RouteError {
    /// No inference backend is configured.
    #[error("no inference backend configured")]
    InferenceUnavailable,
    /// `route_from_text` was called outside a tokio runtime.
    #[error("no tokio runtime available to run inference")]
    NoRuntime,
    /// The grammar could not be written.
    #[error("writing grammar scratch file: {0}")]
    Scratch(#[from] std::io::Error),
}

/// A directive after retrieval, grammar synthesis and payload construction.
#[derive(Debug, Clone)]
pub struct PreparedDirective {
    /// Assigned id.
    pub id: DirectiveId,
    /// Original text.
    pub text: String,
    /// Surviving console candidates, best first.
    pub console: Vec<Candidate<ConsoleCommandEntry>>,
    /// Surviving world candidates, best first.
    pub world: Vec<Candidate<WorldActionEntry>>,
    /// Grammar restricted to the surviving candidates.
    pub grammar: GrammarArtifact,
    /// Prompt payload for the backend.
    pub payload: Value,
}

impl PreparedDirective {
    /// Request handed to the inference backend.
    #[must_use]
    pub fn request(&self) -> InferenceRequest {
        InferenceRequest {
            directive: self.id,
            payload: self.payload.clone(),
            grammar_path: self.grammar.path.clone(),
        }
    }
}

/// Result of handling one completed directive.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DirectiveOutcome {
    /// The response could not be decoded; nothing ran.
    DecodeFailed {
        /// Rendered decode error.
        reason: String,
    },
    /// A console command was chosen.
    Console {
        /// Composed command line.
        line: String,
        /// Whether a console executor received it.
        executed: bool,
    },
    /// A command list was dispatched.
    Dispatched(DispatchReport),
}

/// Completion record for one directive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectiveReport {
    /// Directive id.
    pub directive: DirectiveId,
    /// Instigator the directive was issued by.
    pub instigator: ActorRef,
    /// What happened.
    pub outcome: DirectiveOutcome,
}

struct Completion {
    directive: DirectiveId,
    instigator: ActorRef,
    response: String,
}

/// Builder for [`CommandRouter`].
pub struct CommandRouterBuilder {
    world: Arc<WorldCatalog>,
    console: Arc<ConsoleCatalog>,
    settings: RoutingSettings,
    world_profile: ScoringProfile,
    console_profile: ScoringProfile,
    scratch: Option<GrammarScratch>,
    inference: Option<Arc<dyn InferenceBackend>>,
    console_executor: Option<Arc<dyn ConsoleExecutor>>,
    telemetry: Option<DirectorTelemetry>,
}

impl Default for CommandRouterBuilder {
    fn default() -> Self {
        Self {
            world: Arc::new(WorldCatalog::new()),
            console: Arc::new(ConsoleCatalog::new()),
            settings: RoutingSettings::default(),
            world_profile: ScoringProfile::world_actions(),
            console_profile: ScoringProfile::console_commands(),
            scratch: None,
            inference: None,
            console_executor: None,
            telemetry: None,
        }
    }
}

impl CommandRouterBuilder {
    /// Uses a shared world catalog.
    #[must_use]
    pub fn world_catalog(mut self, catalog: Arc<WorldCatalog>) -> Self {
        self.world = catalog;
        self
    }

    /// Uses a shared console catalog.
    #[must_use]
    pub fn console_catalog(mut self, catalog: Arc<ConsoleCatalog>) -> Self {
        self.console = catalog;
        self
    }

    /// Overrides retrieval limits.
    #[must_use]
    pub fn settings(mut self, settings: RoutingSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Overrides the world scoring constants.
    #[must_use]
    pub fn world_profile(mut self, profile: ScoringProfile) -> Self {
        self.world_profile = profile;
        self
    }

    /// Overrides the console scoring constants.
    #[must_use]
    pub fn console_profile(mut self, profile: ScoringProfile) -> Self {
        self.console_profile = profile;
        self
    }

    /// Directory and naming for grammar files.
    #[must_use]
    pub fn scratch(mut self, scratch: GrammarScratch) -> Self {
        self.scratch = Some(scratch);
        self
    }

    /// Backend turning payload and grammar into planner text.
    #[must_use]
    pub fn inference(mut self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.inference = Some(backend);
        self
    }

    /// Console receiving `console.execute` command lines.
    #[must_use]
    pub fn console_executor(mut self, executor: Arc<dyn ConsoleExecutor>) -> Self {
        self.console_executor = Some(executor);
        self
    }

    /// Attaches telemetry sinks.
    #[must_use]
    pub fn telemetry(mut self, telemetry: DirectorTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Finalizes the builder returning a [`CommandRouter`]. Without an
    /// explicit scratch, grammars go to `<tmp>/director`. A scoring profile
    /// with a negative or non-finite constant is replaced by its catalog's
    /// defaults.
    #[must_use]
    pub fn build(self) -> CommandRouter {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        CommandRouter {
            world: self.world,
            console: self.console,
            settings: self.settings,
            world_retriever: Retriever::new(checked_profile(
                "world",
                self.world_profile,
                ScoringProfile::world_actions(),
            )),
            console_retriever: Retriever::new(checked_profile(
                "console",
                self.console_profile,
                ScoringProfile::console_commands(),
            )),
            scratch: self
                .scratch
                .unwrap_or_else(|| GrammarScratch::new(default_scratch_dir())),
            inference: self.inference,
            console_executor: self.console_executor,
            registry: ActionRegistry::new(),
            observers: PlannerObservers::new(),
            telemetry: self.telemetry,
            next_directive: AtomicU64::new(1),
            completions_tx,
            completions_rx: AsyncMutex::new(completions_rx),
        }
    }
}

/// Routes free-text directives to registered handlers or the console.
///
/// `route_from_text` never blocks: inference runs on the ambient tokio
/// runtime and its result is queued. The owning control loop drains the
/// queue with [`CommandRouter::pump`] or awaits
/// [`CommandRouter::next_completion`], so decoding and handler execution
/// always happen on the caller's side. The instigator of each directive
/// travels with its own completion.
pub struct CommandRouter {
    world: Arc<WorldCatalog>,
    console: Arc<ConsoleCatalog>,
    settings: RoutingSettings,
    world_retriever: Retriever,
    console_retriever: Retriever,
    scratch: GrammarScratch,
    inference: Option<Arc<dyn InferenceBackend>>,
    console_executor: Option<Arc<dyn ConsoleExecutor>>,
    registry: ActionRegistry,
    observers: PlannerObservers,
    telemetry: Option<DirectorTelemetry>,
    next_directive: AtomicU64,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: AsyncMutex<mpsc::UnboundedReceiver<Completion>>,
}

impl fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRouter")
            .field("world_entries", &self.world.len())
            .field("console_entries", &self.console.len())
            .field("settings", &self.settings)
            .field("scratch", &self.scratch.dir())
            .field("inference", &self.inference.as_ref().map(|b| b.name().to_owned()))
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl CommandRouter {
    /// Creates a builder with empty catalogs and default limits.
    #[must_use]
    pub fn builder() -> CommandRouterBuilder {
        CommandRouterBuilder::default()
    }

    /// World catalog in use.
    #[must_use]
    pub fn world_catalog(&self) -> &Arc<WorldCatalog> {
        &self.world
    }

    /// Console catalog in use.
    #[must_use]
    pub fn console_catalog(&self) -> &Arc<ConsoleCatalog> {
        &self.console
    }

    /// Retrieval limits in use.
    #[must_use]
    pub const fn settings(&self) -> &RoutingSettings {
        &self.settings
    }

    /// Handler table.
    #[must_use]
    pub const fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Planner text and plan observers.
    #[must_use]
    pub const fn observers(&self) -> &PlannerObservers {
        &self.observers
    }

    /// Binds a handler to an intent, replacing any existing one regardless of
    /// case. Takes effect on the next dispatch.
    pub fn register_action<F>(&self, intent: &str, handler: F) -> bool
    where
        F: Fn(&Command, &ActorRef) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.registry.register(intent, handler)
    }

    /// Removes the handler for an intent.
    pub fn unregister_action(&self, intent: &str) -> bool {
        self.registry.unregister(intent)
    }

    /// Ranks both catalogs against `text`, applying each catalog's `k` and
    /// minimum score.
    #[must_use]
    pub fn retrieve(
        &self,
        text: &str,
    ) -> (
        Vec<Candidate<ConsoleCommandEntry>>,
        Vec<Candidate<WorldActionEntry>>,
    ) {
        let mut console =
            self.console_retriever
                .retrieve_top_k(text, self.settings.console_top_k, &self.console);
        console.retain(|c| c.score >= self.settings.console_min_score);
        let mut world =
            self.world_retriever
                .retrieve_top_k(text, self.settings.world_top_k, &self.world);
        world.retain(|c| c.score >= self.settings.world_min_score);
        (console, world)
    }

    /// Runs retrieval, writes the grammar and builds the prompt payload.
    pub fn prepare(&self, text: &str) -> Result<PreparedDirective, RouteError> {
        let id = DirectiveId::new(self.next_directive.fetch_add(1, Ordering::Relaxed));
        self.log(
            id,
            LogLevel::Info,
            "router.directive.accepted",
            json!({ "text": text }),
        );

        self.stage(id, DirectiveStage::Retrieving);
        let (console, world) = self.retrieve(text);
        self.log(
            id,
            LogLevel::Debug,
            "router.retrieval.completed",
            json!({
                "console": console.iter().map(|c| json!({"name": c.name(), "score": c.score})).collect::<Vec<_>>(),
                "world": world.iter().map(|c| json!({"intent": c.name(), "score": c.score})).collect::<Vec<_>>(),
            }),
        );

        let intents: Vec<&str> = world.iter().map(Candidate::name).collect();
        let commands: Vec<&str> = console.iter().map(Candidate::name).collect();
        let grammar = self.scratch.write(build_grammar(&intents, &commands))?;
        let payload = build_prompt_payload(text, &console, &world);
        self.stage(id, DirectiveStage::PromptBuilt);
        self.log(
            id,
            LogLevel::Debug,
            "router.grammar.written",
            json!({ "path": grammar.path, "bytes": grammar.text.len() }),
        );

        Ok(PreparedDirective {
            id,
            text: text.to_owned(),
            console,
            world,
            grammar,
            payload,
        })
    }

    /// Starts routing a directive without blocking.
    ///
    /// Returns the directive id once inference has been submitted, or `None`
    /// when no backend or runtime is available or the grammar could not be
    /// written. The result arrives through [`CommandRouter::pump`] or
    /// [`CommandRouter::next_completion`].
    pub fn route_from_text(&self, text: &str, instigator: ActorRef) -> Option<DirectiveId> {
        let backend = self.backend_or_warn(text)?;
        let Ok(handle) = Handle::try_current() else {
            self.abort(text, &RouteError::NoRuntime);
            return None;
        };
        let prepared = match self.prepare(text) {
            Ok(prepared) => prepared,
            Err(err) => {
                self.abort(text, &err);
                return None;
            }
        };

        let directive = prepared.id;
        let request = prepared.request();
        self.stage(directive, DirectiveStage::AwaitingInference);
        let tx = self.completions_tx.clone();
        handle.spawn(async move {
            let response = run_inference(backend.as_ref(), &request).await;
            let completion = Completion {
                directive,
                instigator,
                response,
            };
            if tx.send(completion).is_err() {
                debug!(%directive, "router dropped before inference completed");
            }
        });
        Some(directive)
    }

    /// Handles every completion that is already available, in arrival order.
    /// Never waits; returns nothing while another caller is parked in
    /// [`CommandRouter::next_completion`].
    pub fn pump(&self) -> Vec<DirectiveReport> {
        let ready: Vec<Completion> = {
            let Ok(mut rx) = self.completions_rx.try_lock() else {
                return Vec::new();
            };
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };
        ready
            .into_iter()
            .map(|c| self.handle_response(c.directive, &c.instigator, &c.response))
            .collect()
    }

    /// Waits for the next completion and handles it.
    pub async fn next_completion(&self) -> Option<DirectiveReport> {
        let completion = {
            let mut rx = self.completions_rx.lock().await;
            rx.recv().await?
        };
        Some(self.handle_response(
            completion.directive,
            &completion.instigator,
            &completion.response,
        ))
    }

    /// Runs the whole pipeline for one directive and waits for its outcome.
    pub async fn route_and_wait(&self, text: &str, instigator: ActorRef) -> Option<DirectiveReport> {
        let backend = self.backend_or_warn(text)?;
        let prepared = match self.prepare(text) {
            Ok(prepared) => prepared,
            Err(err) => {
                self.abort(text, &err);
                return None;
            }
        };
        self.stage(prepared.id, DirectiveStage::AwaitingInference);
        let response = run_inference(backend.as_ref(), &prepared.request()).await;
        Some(self.handle_response(prepared.id, &instigator, &response))
    }

    /// Decodes a planner response and executes it for `instigator`.
    ///
    /// Observers see the raw text first. A response that does not decode is
    /// logged and nothing runs.
    pub fn handle_response(
        &self,
        directive: DirectiveId,
        instigator: &ActorRef,
        response: &str,
    ) -> DirectiveReport {
        self.stage(directive, DirectiveStage::Decoding);
        self.observers.notify_text(directive, response);
        self.event(directive, "router.planner.text", json!({ "text": response }));

        let outcome = match decode_response(response) {
            Err(err) => {
                warn!(%directive, error = %err, "planner response rejected");
                self.log(
                    directive,
                    LogLevel::Warn,
                    "router.decode.failed",
                    json!({ "error": err.to_string(), "response": response }),
                );
                DirectiveOutcome::DecodeFailed {
                    reason: err.to_string(),
                }
            }
            Ok(action) => {
                self.observers.notify_plan(directive, &action);
                self.event(
                    directive,
                    "router.plan.decoded",
                    serde_json::to_value(&action).unwrap_or(Value::Null),
                );
                self.stage(directive, DirectiveStage::Executing);
                self.execute(directive, action, instigator)
            }
        };

        self.event(
            directive,
            "router.dispatch.completed",
            serde_json::to_value(&outcome).unwrap_or(Value::Null),
        );
        self.stage(directive, DirectiveStage::Idle);
        DirectiveReport {
            directive,
            instigator: instigator.clone(),
            outcome,
        }
    }

    fn execute(
        &self,
        directive: DirectiveId,
        action: DecodedAction,
        instigator: &ActorRef,
    ) -> DirectiveOutcome {
        match action {
            DecodedAction::Console(invocation) => {
                let line = invocation.line();
                let executed = if let Some(console) = &self.console_executor {
                    console.execute(&line);
                    true
                } else {
                    warn!(%directive, line = %line, "no console executor configured");
                    false
                };
                self.log(
                    directive,
                    if executed { LogLevel::Info } else { LogLevel::Warn },
                    "router.console.executed",
                    json!({ "line": line, "executed": executed }),
                );
                DirectiveOutcome::Console { line, executed }
            }
            DecodedAction::Plan(plan) => {
                let report = self.registry.dispatch(&plan, instigator);
                for intent in &report.skipped {
                    self.log(
                        directive,
                        LogLevel::Info,
                        "router.dispatch.skipped",
                        json!({ "intent": intent, "reason": "no handler registered" }),
                    );
                }
                for failed in &report.failed {
                    self.log(
                        directive,
                        LogLevel::Warn,
                        "router.dispatch.failed",
                        json!({ "intent": failed.intent, "error": failed.error }),
                    );
                }
                self.log(
                    directive,
                    LogLevel::Info,
                    "router.dispatch.completed",
                    json!({
                        "instigator": instigator.as_str(),
                        "executed": report.executed.len(),
                        "skipped": report.skipped.len(),
                        "failed": report.failed.len(),
                    }),
                );
                DirectiveOutcome::Dispatched(report)
            }
        }
    }

    fn backend_or_warn(&self, text: &str) -> Option<Arc<dyn InferenceBackend>> {
        let backend = self.inference.clone();
        if backend.is_none() {
            self.abort(text, &RouteError::InferenceUnavailable);
        }
        backend
    }

    fn abort(&self, text: &str, err: &RouteError) {
        warn!(error = %err, "directive aborted");
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(
                LogLevel::Warn,
                "router.directive.aborted",
                json!({ "text": text, "error": err.to_string() }),
            );
        }
    }

    fn stage(&self, directive: DirectiveId, stage: DirectiveStage) {
        debug!(%directive, stage = stage.label(), "directive stage");
        self.log(
            directive,
            LogLevel::Debug,
            "router.directive.stage",
            json!({ "stage": stage.label() }),
        );
    }

    fn log(&self, directive: DirectiveId, level: LogLevel, message: &str, metadata: Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log_for(directive, level, message, metadata);
        }
    }

    fn event(&self, directive: DirectiveId, event_type: &str, payload: Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.event_for(directive, event_type, payload);
        }
    }
}

async fn run_inference(backend: &dyn InferenceBackend, request: &InferenceRequest) -> String {
    match backend.infer(request).await {
        Ok(response) => response,
        Err(err) => {
            warn!(directive = %request.directive, backend = backend.name(), error = %err, "inference backend failed");
            error_object("backend_failed", format!("{err:#}"))
        }
    }
}

fn checked_profile(kind: &str, profile: ScoringProfile, fallback: ScoringProfile) -> ScoringProfile {
    if profile.is_valid() {
        profile
    } else {
        warn!(kind, ?profile, "invalid scoring profile, using defaults");
        fallback
    }
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join("director")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::StaticInference;
    use director_catalog::CatalogEntry;
    use tempfile::tempdir;

    fn catalogs() -> (Arc<WorldCatalog>, Arc<ConsoleCatalog>) {
        let world = Arc::new(WorldCatalog::new());
        assert!(world.load_json(
            r#"[
                {"intent": "MoveTo", "aliases": ["go to", "walk"], "doc": "Move to a location", "tags": ["movement"]},
                {"intent": "Say", "aliases": ["speak"], "doc": "Say a line", "tags": ["dialogue"]}
            ]"#
        ));
        let console = Arc::new(ConsoleCatalog::new());
        assert!(console.load_json(
            r#"[{"name": "stat fps", "doc": "Show frame rate", "tags": ["debug"]}]"#
        ));
        (world, console)
    }

    #[test]
    fn prepare_filters_by_min_score_and_writes_grammar() {
        let dir = tempdir().unwrap();
        let (world, console) = catalogs();
        let router = CommandRouter::builder()
            .world_catalog(world)
            .console_catalog(console)
            .scratch(GrammarScratch::new(dir.path()))
            .build();

        let prepared = router.prepare("moveto the scout").unwrap();
        assert!(prepared.console.is_empty());
        assert_eq!(prepared.world[0].entry.key(), "MoveTo");
        assert!(prepared.grammar.text.starts_with("root ::= act_root\n"));
        assert!(prepared.grammar.path.exists());
        assert_eq!(prepared.payload["user"], "moveto the scout");

        let next = router.prepare("stat fps").unwrap();
        assert!(next.id > prepared.id);
        assert_ne!(next.grammar.path, prepared.grammar.path);
        assert_eq!(next.console[0].name(), "stat fps");
    }

    #[test]
    fn strict_min_score_drops_everything_and_falls_back() {
        let dir = tempdir().unwrap();
        let (world, console) = catalogs();
        let router = CommandRouter::builder()
            .world_catalog(world)
            .console_catalog(console)
            .settings(RoutingSettings {
                world_min_score: 10.0,
                console_min_score: 10.0,
                ..RoutingSettings::default()
            })
            .scratch(GrammarScratch::new(dir.path()))
            .build();
        let prepared = router.prepare("moveto").unwrap();
        assert!(prepared.world.is_empty() && prepared.console.is_empty());
        assert!(prepared.grammar.text.contains("\"\\\"Say\\\"\""));
    }

    #[test]
    fn invalid_profiles_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        let (world, console) = catalogs();
        let broken = ScoringProfile {
            cosine_weight: f32::NAN,
            bonus_ceiling: -1.0,
            ..ScoringProfile::world_actions()
        };
        let router = CommandRouter::builder()
            .world_catalog(Arc::clone(&world))
            .console_catalog(Arc::clone(&console))
            .world_profile(broken)
            .console_profile(broken)
            .scratch(GrammarScratch::new(dir.path()))
            .build();
        let reference = CommandRouter::builder()
            .world_catalog(world)
            .console_catalog(console)
            .scratch(GrammarScratch::new(dir.path()))
            .build();

        let (console_hits, world_hits) = router.retrieve("moveto stat fps");
        let (console_expected, world_expected) = reference.retrieve("moveto stat fps");
        assert!(world_hits.iter().all(|c| c.score.is_finite()));
        assert_eq!(world_hits[0].name(), "MoveTo");
        let scores = |hits: &[Candidate<WorldActionEntry>]| hits.iter().map(|c| c.score).collect::<Vec<_>>();
        assert_eq!(scores(&world_hits), scores(&world_expected));
        assert_eq!(console_hits[0].score, console_expected[0].score);
    }

    #[test]
    fn route_without_backend_or_runtime_is_a_no_op() {
        let dir = tempdir().unwrap();
        let router = CommandRouter::builder()
            .scratch(GrammarScratch::new(dir.path()))
            .build();
        assert_eq!(router.route_from_text("say hi", ActorRef::new("npc")), None);

        let router = CommandRouter::builder()
            .scratch(GrammarScratch::new(dir.path()))
            .inference(Arc::new(StaticInference::new("{}")))
            .build();
        assert_eq!(router.route_from_text("say hi", ActorRef::new("npc")), None);
        assert!(router.pump().is_empty());
    }

    #[test]
    fn console_without_executor_is_reported() {
        let router = CommandRouter::builder().build();
        let report = router.handle_response(
            DirectiveId::new(9),
            &ActorRef::new("npc"),
            r#"{"tool":"console.execute","console":{"command":"stat fps","args":"1"}}"#,
        );
        assert_eq!(
            report.outcome,
            DirectiveOutcome::Console {
                line: "stat fps 1".into(),
                executed: false
            }
        );
    }

    #[test]
    fn stage_labels_are_distinct() {
        let stages = [
            DirectiveStage::Idle,
            DirectiveStage::Retrieving,
            DirectiveStage::PromptBuilt,
            DirectiveStage::AwaitingInference,
            DirectiveStage::Decoding,
            DirectiveStage::Executing,
        ];
        let labels: std::collections::HashSet<_> = stages.iter().map(|s| s.label()).collect();
        assert_eq!(labels.len(), stages.len());
    }
}
