use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Identifier assigned to each routed directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectiveId(u64);

impl DirectiveId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DirectiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "directive-{}", self.0)
    }
}

/// Opaque reference to the entity that issued a directive. Handlers receive
/// it unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorRef(String);

impl ActorRef {
    /// Creates a reference from any id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Underlying id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One planned action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Intent name; matched case-insensitively against registered handlers.
    pub intent: String,
    /// Optional subject of the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Parameters in document order. Non-string values are stringified.
    #[serde(default, deserialize_with = "stringified_params")]
    pub params: IndexMap<String, String>,
    /// Relative urgency.
    #[serde(default = "default_priority", deserialize_with = "priority_or_default")]
    pub priority: f32,
}

impl Command {
    /// Command with no target or parameters and the default priority.
    #[must_use]
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            target: None,
            params: IndexMap::new(),
            priority: default_priority(),
        }
    }

    /// Sets the target.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Parameter value by name.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Ordered plan decoded from one inference response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandList {
    /// Commands in execution order.
    pub commands: Vec<Command>,
}

impl CommandList {
    /// Number of commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the plan has no commands.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Console command chosen by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleInvocation {
    /// Command name.
    pub command: String,
    /// Argument string, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
}

impl ConsoleInvocation {
    /// Command line forwarded to the console: the command, followed by a
    /// space and the arguments when they are not blank.
    #[must_use]
    pub fn line(&self) -> String {
        match self.args.as_deref().map(str::trim) {
            Some(args) if !args.is_empty() => format!("{} {args}", self.command),
            _ => self.command.clone(),
        }
    }
}

/// Successfully decoded planner output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tool", content = "action")]
pub enum DecodedAction {
    /// `console.execute`.
    #[serde(rename = "console.execute")]
    Console(ConsoleInvocation),
    /// `world.act`, or a bare command list.
    #[serde(rename = "world.act")]
    Plan(CommandList),
}

const fn default_priority() -> f32 {
    0.5
}

/// Renders a JSON value as a parameter string. Strings are kept verbatim,
/// null becomes empty and compound values become compact JSON.
#[must_use]
pub fn param_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

fn stringified_params<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<IndexMap<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let value = param_string(&value);
            (key, value)
        })
        .collect())
}

fn priority_or_default<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<f32> = Option::deserialize(deserializer)?;
    Ok(raw.unwrap_or_else(default_priority))
}
