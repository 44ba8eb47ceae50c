use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use director_catalog::{ConsoleCatalog, WorldCatalog};
use director_grammar::GrammarScratch;
use director_router::{
    ActorRef, CommandRouter, DecodedAction, DirectiveOutcome, DirectorTelemetry, HandlerError,
    InferenceBackend, InferenceRequest, RecordingConsole, StaticInference,
};
use parking_lot::Mutex;
use serde_json::json;
use shared_event_bus::MemoryEventBus;
use shared_logging::MemoryLogSink;
use tempfile::{tempdir, TempDir};

const WORLD: &str = r#"[
    {"intent": "MoveTo", "aliases": ["go to", "walk"], "doc": "Move to a location", "tags": ["movement"],
     "argsSchema": {"location": "string"}},
    {"intent": "Say", "aliases": ["speak", "talk"], "doc": "Say a line of dialogue", "tags": ["dialogue"]},
    {"intent": "Interact", "aliases": ["use", "toggle"], "doc": "Interact with an object", "tags": ["object"]}
]"#;

const CONSOLE: &str = r#"[
    {"name": "stat fps", "doc": "Show frame rate", "tags": ["debug"]},
    {"name": "stat unit", "doc": "Show frame timing", "tags": ["debug"]}
]"#;

const MOVE_PLAN: &str = r#"{"tool":"world.act","act":{"commands":[{"intent":"MoveTo","target":"NPC_Scout","params":{"location":"0 0 0"}}]}}"#;

type Calls = Arc<Mutex<Vec<(String, Option<String>, String)>>>;

struct Fixture {
    _dir: TempDir,
    router: CommandRouter,
    calls: Calls,
    console: Arc<RecordingConsole>,
}

fn fixture(backend: Arc<dyn InferenceBackend>) -> Fixture {
    let dir = tempdir().unwrap();
    let world = Arc::new(WorldCatalog::new());
    assert!(world.load_json(WORLD));
    let console_catalog = Arc::new(ConsoleCatalog::new());
    assert!(console_catalog.load_json(CONSOLE));
    let console = Arc::new(RecordingConsole::new());
    let router = CommandRouter::builder()
        .world_catalog(world)
        .console_catalog(console_catalog)
        .scratch(GrammarScratch::new(dir.path()))
        .inference(backend)
        .console_executor(console.clone())
        .build();
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    for intent in ["MoveTo", "Say"] {
        let calls = Arc::clone(&calls);
        router.register_action(intent, move |command, instigator| {
            calls.lock().push((
                command.intent.clone(),
                command.target.clone(),
                instigator.as_str().to_owned(),
            ));
            Ok(())
        });
    }
    Fixture {
        _dir: dir,
        router,
        calls,
        console,
    }
}

/// Answers with a move toward the directive text, slower for "slow" ones.
struct EchoTargetInference;

#[async_trait]
impl InferenceBackend for EchoTargetInference {
    fn name(&self) -> &str {
        "echo"
    }

    async fn infer(&self, request: &InferenceRequest) -> Result<String> {
        let user = request.payload["user"].as_str().unwrap_or_default().to_owned();
        let delay = if user.contains("slow") { 200 } else { 10 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(json!({
            "tool": "world.act",
            "act": {"commands": [{"intent": "MoveTo", "target": user}]}
        })
        .to_string())
    }
}

struct FailingInference;

#[async_trait]
impl InferenceBackend for FailingInference {
    fn name(&self) -> &str {
        "failing"
    }

    async fn infer(&self, _request: &InferenceRequest) -> Result<String> {
        Err(anyhow!("accelerator unavailable"))
    }
}

#[tokio::test]
async fn console_response_runs_console_without_handlers() {
    let fx = fixture(Arc::new(StaticInference::new(
        r#"{"tool":"console.execute","console":{"command":"stat fps"}}"#,
    )));
    let report = fx
        .router
        .route_and_wait("show stat fps", ActorRef::new("player"))
        .await
        .unwrap();
    assert_eq!(
        report.outcome,
        DirectiveOutcome::Console {
            line: "stat fps".into(),
            executed: true
        }
    );
    assert_eq!(fx.console.lines(), ["stat fps"]);
    assert!(fx.calls.lock().is_empty());
}

#[tokio::test]
async fn world_plan_reaches_case_insensitive_handler_with_instigator() {
    let fx = fixture(Arc::new(StaticInference::new(MOVE_PLAN)));
    let report = fx
        .router
        .route_and_wait("move the scout to the origin", ActorRef::new("NPC_Commander"))
        .await
        .unwrap();
    let DirectiveOutcome::Dispatched(dispatch) = report.outcome else {
        panic!("expected dispatch, got {:?}", report.outcome);
    };
    assert_eq!(dispatch.executed, ["MoveTo"]);
    assert_eq!(
        *fx.calls.lock(),
        [(
            "MoveTo".to_owned(),
            Some("NPC_Scout".to_owned()),
            "NPC_Commander".to_owned()
        )]
    );
    assert!(fx.console.lines().is_empty());
}

#[tokio::test]
async fn undecodable_responses_never_reach_handlers() {
    for response in [r#"{"commands":[]}"#, "not json at all", r#"{"tool":"world.act","act":[]}"#] {
        let fx = fixture(Arc::new(StaticInference::new(response)));
        let report = fx
            .router
            .route_and_wait("move", ActorRef::new("player"))
            .await
            .unwrap();
        assert!(
            matches!(report.outcome, DirectiveOutcome::DecodeFailed { .. }),
            "{response}"
        );
        assert!(fx.calls.lock().is_empty());
        assert!(fx.console.lines().is_empty());
    }
}

#[tokio::test]
async fn backend_failure_becomes_decode_failure() {
    let fx = fixture(Arc::new(FailingInference));
    let report = fx
        .router
        .route_and_wait("move", ActorRef::new("player"))
        .await
        .unwrap();
    let DirectiveOutcome::DecodeFailed { reason } = report.outcome else {
        panic!("expected decode failure");
    };
    assert!(reason.contains("backend_failed"));
    assert!(fx.calls.lock().is_empty());
}

#[tokio::test]
async fn unknown_and_failing_intents_do_not_stop_the_plan() {
    let fx = fixture(Arc::new(StaticInference::new(
        r#"{"commands":[{"intent":"Fly"},{"intent":"Explode"},{"intent":"say","params":{"text":"hi"}}]}"#,
    )));
    fx.router
        .register_action("Explode", |_, _| Err(HandlerError::rejected("not today")));
    let report = fx
        .router
        .route_and_wait("say hi", ActorRef::new("player"))
        .await
        .unwrap();
    let DirectiveOutcome::Dispatched(dispatch) = report.outcome else {
        panic!("expected dispatch");
    };
    assert_eq!(dispatch.skipped, ["Fly"]);
    assert_eq!(dispatch.failed.len(), 1);
    assert_eq!(dispatch.executed, ["say"]);
    assert_eq!(fx.calls.lock().len(), 1);
}

#[tokio::test]
async fn re_registration_replaces_handler_for_next_dispatch() {
    let fx = fixture(Arc::new(StaticInference::new(MOVE_PLAN)));
    let hits = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&hits);
    assert!(fx.router.register_action("moveto", move |_, _| {
        sink.lock().push("replacement");
        Ok(())
    }));
    assert_eq!(fx.router.registry().intents(), ["moveto", "say"]);

    fx.router
        .route_and_wait("move", ActorRef::new("player"))
        .await
        .unwrap();
    assert_eq!(*hits.lock(), ["replacement"]);
    assert!(fx.calls.lock().is_empty());

    assert!(fx.router.unregister_action("MOVETO"));
    let report = fx
        .router
        .route_and_wait("move", ActorRef::new("player"))
        .await
        .unwrap();
    assert!(matches!(
        report.outcome,
        DirectiveOutcome::Dispatched(ref d) if d.skipped == ["MoveTo"]
    ));
}

#[tokio::test]
async fn concurrent_directives_keep_their_own_instigator() {
    let fx = fixture(Arc::new(EchoTargetInference));
    let slow = fx
        .router
        .route_from_text("slow walk north", ActorRef::new("alice"))
        .unwrap();
    let fast = fx
        .router
        .route_from_text("walk south", ActorRef::new("bob"))
        .unwrap();
    assert_ne!(slow, fast);

    let first = fx.router.next_completion().await.unwrap();
    let second = fx.router.next_completion().await.unwrap();
    assert_eq!(first.directive, fast);
    assert_eq!(first.instigator, ActorRef::new("bob"));
    assert_eq!(second.directive, slow);
    assert_eq!(second.instigator, ActorRef::new("alice"));

    let calls = fx.calls.lock().clone();
    assert_eq!(
        calls,
        [
            (
                "MoveTo".to_owned(),
                Some("walk south".to_owned()),
                "bob".to_owned()
            ),
            (
                "MoveTo".to_owned(),
                Some("slow walk north".to_owned()),
                "alice".to_owned()
            ),
        ]
    );
}

#[tokio::test]
async fn pump_drains_only_finished_directives() {
    let fx = fixture(Arc::new(StaticInference::new(MOVE_PLAN)));
    assert!(fx.router.pump().is_empty());
    let id = fx
        .router
        .route_from_text("move the scout", ActorRef::new("player"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let reports = fx.router.pump();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].directive, id);
    assert!(fx.router.pump().is_empty());
    assert_eq!(fx.calls.lock().len(), 1);
}

#[tokio::test]
async fn missing_backend_aborts_quietly() {
    let dir = tempdir().unwrap();
    let router = CommandRouter::builder()
        .scratch(GrammarScratch::new(dir.path()))
        .build();
    assert!(router
        .route_from_text("move", ActorRef::new("player"))
        .is_none());
    assert!(router
        .route_and_wait("move", ActorRef::new("player"))
        .await
        .is_none());
    assert_eq!(std::fs::read_dir(dir.path()).map_or(0, Iterator::count), 0);
}

#[tokio::test]
async fn observers_and_telemetry_follow_the_pipeline() {
    let sink = Arc::new(MemoryLogSink::new(256));
    let bus = Arc::new(MemoryEventBus::new(64));
    let telemetry = DirectorTelemetry::builder("router")
        .log_sink(sink.clone())
        .event_publisher(bus.clone())
        .build()
        .unwrap();
    let dir = tempdir().unwrap();
    let world = Arc::new(WorldCatalog::new());
    assert!(world.load_json(WORLD));
    let router = CommandRouter::builder()
        .world_catalog(world)
        .scratch(GrammarScratch::new(dir.path()))
        .inference(Arc::new(StaticInference::new(MOVE_PLAN)))
        .telemetry(telemetry)
        .build();
    router.register_action("MoveTo", |_, _| Ok(()));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let text_sink = Arc::clone(&seen);
    let text_id = router.observers().on_planner_text(move |_, text| {
        text_sink.lock().push(format!("text:{}", text.len()));
    });
    let plan_sink = Arc::clone(&seen);
    router.observers().on_plan(move |_, action| {
        if let DecodedAction::Plan(plan) = action {
            plan_sink.lock().push(format!("plan:{}", plan.len()));
        }
    });

    let report = router
        .route_and_wait("move the scout", ActorRef::new("player"))
        .await
        .unwrap();
    assert_eq!(
        *seen.lock(),
        [format!("text:{}", MOVE_PLAN.len()), "plan:1".to_owned()]
    );

    assert!(router.observers().remove(text_id));
    router.handle_response(report.directive, &ActorRef::new("player"), "garbage");
    assert_eq!(seen.lock().len(), 2);

    tokio::task::yield_now().await;
    for event in ["router.planner.text", "router.plan.decoded", "router.dispatch.completed"] {
        assert!(!bus.events_of(event).is_empty(), "missing event {event}");
    }
    for message in [
        "router.directive.accepted",
        "router.directive.stage",
        "router.grammar.written",
        "router.dispatch.completed",
        "router.decode.failed",
    ] {
        assert!(sink.contains(message), "missing log {message}");
    }
    assert!(sink
        .snapshot()
        .iter()
        .all(|record| record.directive == Some(report.directive.get())));
}

#[tokio::test]
async fn each_directive_gets_its_own_grammar() {
    let fx = fixture(Arc::new(StaticInference::new(MOVE_PLAN)));
    let a = fx.router.prepare("moveto").unwrap();
    let b = fx.router.prepare("moveto").unwrap();
    assert_ne!(a.grammar.path, b.grammar.path);
    assert_eq!(a.grammar.text, b.grammar.text);
    assert_eq!(
        std::fs::read_to_string(&b.grammar.path).unwrap(),
        b.grammar.text
    );
}
