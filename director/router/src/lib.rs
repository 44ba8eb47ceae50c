#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Directive routing.
//!
//! Free text is ranked against the world and console catalogs, a grammar
//! restricted to the surviving candidates is written for the inference
//! backend, and the backend's JSON answer is decoded and dispatched to
//! registered handlers.

/// Plan and invocation types produced by decoding.
#[path = "../command.rs"]
pub mod command;

/// Prompt payload construction and response decoding.
#[path = "../codec.rs"]
pub mod codec;

/// Intent handler table and plan dispatch.
#[path = "../registry.rs"]
pub mod registry;

/// Inference backend seam and bundled backends.
#[path = "../inference.rs"]
pub mod inference;

/// Console execution seam.
#[path = "../console.rs"]
pub mod console;

/// Planner text and plan observers.
#[path = "../observers.rs"]
pub mod observers;

/// Directive pipeline orchestration.
#[path = "../router.rs"]
pub mod router;

/// TOML configuration.
#[path = "../config.rs"]
pub mod config;

/// Structured logs and lifecycle events.
#[path = "../telemetry.rs"]
pub mod telemetry;

pub use codec::{build_prompt_payload, decode_response, DecodeError};
pub use command::{
    ActorRef, Command, CommandList, ConsoleInvocation, DecodedAction, DirectiveId,
};
pub use config::DirectorConfig;
pub use console::{ConsoleExecutor, RecordingConsole, TracingConsole};
pub use inference::{InferenceBackend, InferenceRequest, ProcessInference, StaticInference};
pub use observers::{ObserverId, PlannerObservers};
pub use registry::{ActionRegistry, DispatchReport, HandlerError};
pub use router::{
    CommandRouter, CommandRouterBuilder, DirectiveOutcome, DirectiveReport, DirectiveStage,
    PreparedDirective, RouteError, RoutingSettings,
};
pub use telemetry::{DirectorTelemetry, DirectorTelemetryBuilder};
