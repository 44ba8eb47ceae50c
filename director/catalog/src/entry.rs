use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::retrieval::ScoringProfile;

/// Behaviour shared by both catalog shapes.
pub trait CatalogEntry: Clone + DeserializeOwned + Send + Sync + 'static {
    /// Short label used in logs (`world`, `console`).
    const KIND: &'static str;

    /// Primary key (intent or command name). Entries with an empty key are
    /// dropped at load time.
    fn key(&self) -> &str;

    /// Alternative phrasings.
    fn aliases(&self) -> &[String];

    /// Free-form tags.
    fn tags(&self) -> &[String];

    /// Space-joined text the retriever tokenizes for the cosine signal.
    fn document_line(&self) -> String;

    /// Scoring constants used when nothing else is configured.
    fn default_profile() -> ScoringProfile;

    /// Fills derived fields after deserialization.
    fn normalize(&mut self) {}
}

/// One in-world action an agent can be asked to perform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldActionEntry {
    /// Canonical intent name, e.g. `MoveTo`.
    #[serde(default, deserialize_with = "lenient_string")]
    pub intent: String,
    /// Alternative phrasings.
    #[serde(default, deserialize_with = "lenient_strings")]
    pub aliases: Vec<String>,
    /// Description shown to the model.
    #[serde(default, deserialize_with = "lenient_string")]
    pub doc: String,
    /// Free-form tags.
    #[serde(default, deserialize_with = "lenient_strings")]
    pub tags: Vec<String>,
    /// Argument schema, passed through to the prompt untouched.
    #[serde(default, alias = "args")]
    pub args_schema: Value,
    /// Flattened argument description.
    #[serde(default, alias = "argHints", deserialize_with = "lenient_string")]
    pub args_summary: String,
    /// Raw constraints block, if the source carries one.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub constraints: Value,
    /// Flattened constraints.
    #[serde(default, deserialize_with = "lenient_string")]
    pub constraints_summary: String,
    /// Flattened examples.
    #[serde(default, deserialize_with = "lenient_string")]
    pub examples_summary: String,
    /// Example invocations, passed through to the prompt untouched.
    #[serde(default, alias = "examples")]
    pub examples_json: Value,
}

impl CatalogEntry for WorldActionEntry {
    const KIND: &'static str = "world";

    fn key(&self) -> &str {
        &self.intent
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn document_line(&self) -> String {
        let parts: [&str; 7] = [
            &self.intent,
            &self.aliases.join(" "),
            &self.doc,
            &self.tags.join(" "),
            &self.args_summary,
            &self.constraints_summary,
            &self.examples_summary,
        ];
        parts.join(" ")
    }

    fn default_profile() -> ScoringProfile {
        ScoringProfile::world_actions()
    }

    fn normalize(&mut self) {
        self.intent = self.intent.trim().to_owned();
        if self.args_summary.is_empty() {
            self.args_summary = summarize_schema(&self.args_schema);
        }
        if self.constraints_summary.is_empty() {
            self.constraints_summary = summarize_constraints(&self.constraints);
        }
        if self.examples_summary.is_empty() && !self.examples_json.is_null() {
            self.examples_summary = compact(&self.examples_json);
        }
    }
}

/// One console command the host can execute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleCommandEntry {
    /// Command as typed at the console, e.g. `stat fps`.
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    /// Alternative phrasings.
    #[serde(default, deserialize_with = "lenient_strings")]
    pub aliases: Vec<String>,
    /// Description shown to the model.
    #[serde(default, deserialize_with = "lenient_string")]
    pub doc: String,
    /// Free-form tags.
    #[serde(default, deserialize_with = "lenient_strings")]
    pub tags: Vec<String>,
    /// Argument name hints.
    #[serde(default, deserialize_with = "lenient_string")]
    pub arg_names: String,
}

impl CatalogEntry for ConsoleCommandEntry {
    const KIND: &'static str = "console";

    fn key(&self) -> &str {
        &self.name
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    fn document_line(&self) -> String {
        let parts: [&str; 5] = [
            &self.name,
            &self.aliases.join(" "),
            &self.doc,
            &self.tags.join(" "),
            &self.arg_names,
        ];
        parts.join(" ")
    }

    fn default_profile() -> ScoringProfile {
        ScoringProfile::console_commands()
    }

    fn normalize(&mut self) {
        self.name = self.name.trim().to_owned();
    }
}

/// String field that reads as empty when the source holds another type.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        _ => String::new(),
    })
}

/// String list keeping only string elements. Anything but an array reads
/// as empty.
fn lenient_strings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// `name:type` pairs for an argument schema. Accepts either a plain
/// `{"arg": "type"}` map or a JSON-schema object with `properties`.
fn summarize_schema(schema: &Value) -> String {
    let Some(object) = schema.as_object() else {
        return match schema {
            Value::Null => String::new(),
            Value::String(text) => text.clone(),
            other => compact(other),
        };
    };
    let fields = object
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(object);
    fields
        .iter()
        .map(|(name, field)| {
            let kind = match field {
                Value::String(kind) => kind.clone(),
                Value::Object(inner) => inner
                    .get("type")
                    .and_then(Value::as_str)
                    .map_or_else(|| compact(field), str::to_owned),
                other => compact(other),
            };
            format!("{name}:{kind}")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn summarize_constraints(constraints: &Value) -> String {
    match constraints {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("; "),
        other => compact(other),
    }
}

fn compact(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}
