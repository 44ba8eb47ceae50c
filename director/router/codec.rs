use director_catalog::{Candidate, ConsoleCommandEntry, WorldActionEntry};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::command::{param_string, CommandList, ConsoleInvocation, DecodedAction};

/// Tool name selecting console execution.
pub const CONSOLE_TOOL: &str = "console.execute";
/// Tool name selecting a world-action batch.
pub const WORLD_TOOL: &str = "world.act";

const MARKERS: [(&str, &str); 2] = [("<JSON>", "</JSON>"), ("{JSON}", "{/JSON}")];

/// Reasons a planner response cannot be turned into an action.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not valid JSON, or JSON of the wrong shape.
    #[error("response is not a valid action document: {0}")]
    Json(#[from] serde_json::Error),
    /// The backend answered with an error object instead of a plan.
    #[error("inference backend reported `{error}`")]
    Backend {
        /// Error code reported by the backend.
        error: String,
        /// Additional detail, if any.
        detail: Option<String>,
    },
    /// A required field is absent or has the wrong type.
    #[error("missing or invalid field `{0}`")]
    MissingField(&'static str),
    /// The `act` payload of a `world.act` document could not be read.
    #[error("malformed act payload: {0}")]
    MalformedAct(String),
    /// The plan committed to no action.
    #[error("plan contains no commands")]
    EmptyPlan,
}

/// Builds the JSON context handed to the inference backend alongside the
/// grammar.
#[must_use]
pub fn build_prompt_payload(
    user_text: &str,
    console: &[Candidate<ConsoleCommandEntry>],
    world: &[Candidate<WorldActionEntry>],
) -> Value {
    let console_candidates: Vec<Value> = console
        .iter()
        .map(|candidate| {
            json!({
                "name": candidate.entry.name,
                "doc": candidate.entry.doc,
                "argNames": candidate.entry.arg_names,
                "score": candidate.score,
            })
        })
        .collect();
    let world_candidates: Vec<Value> = world
        .iter()
        .map(|candidate| {
            json!({
                "intent": candidate.entry.intent,
                "doc": candidate.entry.doc,
                "score": candidate.score,
                "argsSchema": candidate.entry.args_schema,
                "examples": candidate.entry.examples_json,
            })
        })
        .collect();
    json!({
        "user": user_text,
        "console_candidates": console_candidates,
        "world_candidates": world_candidates,
    })
}

/// Decodes a planner response.
///
/// The trimmed text is read as JSON first. Only text that does not parse is
/// searched for a complete `<JSON>…</JSON>` or `{JSON}…{/JSON}` wrapper.
/// Documents without a recognised `tool` are read as a bare
/// `{"commands": [...]}` plan. A plan with zero commands is an error.
pub fn decode_response(text: &str) -> Result<DecodedAction, DecodeError> {
    let text = text.trim();
    let root: Value = match serde_json::from_str(text) {
        Ok(root) => root,
        Err(err) => match extract_json_block(text) {
            Some(body) => serde_json::from_str(body)?,
            None => return Err(err.into()),
        },
    };
    let Value::Object(document) = root else {
        return Err(DecodeError::MissingField("commands"));
    };

    match document.get("tool").and_then(Value::as_str) {
        Some(CONSOLE_TOOL) => decode_console(&document).map(DecodedAction::Console),
        Some(WORLD_TOOL) => decode_act(document).map(DecodedAction::Plan),
        _ => {
            if let Some(error) = backend_error(&document) {
                return Err(error);
            }
            if !document.contains_key("commands") {
                return Err(DecodeError::MissingField("commands"));
            }
            let plan: CommandList = serde_json::from_value(Value::Object(document))?;
            non_empty(plan).map(DecodedAction::Plan)
        }
    }
}

/// Returns the trimmed slice enclosed by the first marker pair whose opening
/// and closing markers are both present.
#[must_use]
pub fn extract_json_block(text: &str) -> Option<&str> {
    MARKERS.iter().find_map(|&(open, close)| {
        let start = text.find(open)? + open.len();
        let end = text[start..].find(close)?;
        Some(text[start..start + end].trim())
    })
}

fn decode_console(document: &Map<String, Value>) -> Result<ConsoleInvocation, DecodeError> {
    let console = document
        .get("console")
        .and_then(Value::as_object)
        .ok_or(DecodeError::MissingField("console"))?;
    let command = console
        .get("command")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|command| !command.is_empty())
        .ok_or(DecodeError::MissingField("console.command"))?;
    let args = console
        .get("args")
        .filter(|args| !args.is_null())
        .map(param_string);
    Ok(ConsoleInvocation {
        command: command.to_owned(),
        args,
    })
}

fn decode_act(mut document: Map<String, Value>) -> Result<CommandList, DecodeError> {
    let act = match document.remove("act") {
        Some(act @ Value::Object(_)) => act,
        Some(_) => return Err(DecodeError::MalformedAct("`act` must be an object".into())),
        None => return Err(DecodeError::MissingField("act")),
    };
    let plan: CommandList =
        serde_json::from_value(act).map_err(|err| DecodeError::MalformedAct(err.to_string()))?;
    non_empty(plan)
}

fn backend_error(document: &Map<String, Value>) -> Option<DecodeError> {
    let error = document.get("error")?;
    let detail = document
        .get("detail")
        .or_else(|| document.get("raw"))
        .filter(|detail| !detail.is_null())
        .map(param_string);
    Some(DecodeError::Backend {
        error: param_string(error),
        detail,
    })
}

fn non_empty(plan: CommandList) -> Result<CommandList, DecodeError> {
    if plan.is_empty() {
        Err(DecodeError::EmptyPlan)
    } else {
        Ok(plan)
    }
}
