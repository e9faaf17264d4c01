//! Tool schema shapes: how each vendor wants tool definitions laid out.
//!
//! The three supported vendors agree on JSON Schema for the parameters but
//! disagree on the envelope around it. The envelope is described once per
//! vendor in [`SCHEMA_SHAPES`]; rendering never needs per-tool code.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

// ─────────────────────────────────────────────
// Provider kinds
// ─────────────────────────────────────────────

/// Wire protocol family of an LLM backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
    Ollama,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Ollama => "ollama",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "ollama" => Ok(ProviderKind::Ollama),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

// ─────────────────────────────────────────────
// Tool specs
// ─────────────────────────────────────────────

/// Vendor-neutral description of a tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema object for the arguments.
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: normalize_parameters(parameters),
        }
    }
}

/// Fill in the keys every vendor expects on an object schema.
///
/// OpenAI rejects object schemas without `properties`, so an empty map is
/// inserted when missing.
pub fn normalize_parameters(parameters: Value) -> Value {
    let mut map = match parameters {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.entry("type").or_insert_with(|| json!("object"));
    map.entry("properties").or_insert_with(|| json!({}));
    Value::Object(map)
}

// ─────────────────────────────────────────────
// Shape table
// ─────────────────────────────────────────────

/// Envelope description for one vendor.
#[derive(Debug)]
pub struct SchemaShape {
    pub kind: ProviderKind,
    /// Outer `"type"` tag, for vendors that wrap definitions.
    pub type_tag: Option<&'static str>,
    /// Key holding the nested function object; `None` for flat envelopes.
    pub nest_key: Option<&'static str>,
    /// Key under which the parameter schema is placed.
    pub params_key: &'static str,
}

pub static SCHEMA_SHAPES: &[SchemaShape] = &[
    SchemaShape {
        kind: ProviderKind::OpenAi,
        type_tag: Some("function"),
        nest_key: Some("function"),
        params_key: "parameters",
    },
    SchemaShape {
        kind: ProviderKind::Anthropic,
        type_tag: None,
        nest_key: None,
        params_key: "input_schema",
    },
    SchemaShape {
        kind: ProviderKind::Ollama,
        type_tag: Some("function"),
        nest_key: Some("function"),
        params_key: "parameters",
    },
];

/// Look up the envelope for a provider kind.
pub fn shape_for(kind: ProviderKind) -> &'static SchemaShape {
    // The table covers every variant.
    SCHEMA_SHAPES
        .iter()
        .find(|s| s.kind == kind)
        .unwrap_or(&SCHEMA_SHAPES[0])
}

impl SchemaShape {
    /// Render a tool spec into this vendor's envelope.
    pub fn render(&self, spec: &ToolSpec) -> Value {
        let mut inner = Map::new();
        inner.insert("name".into(), json!(spec.name));
        inner.insert("description".into(), json!(spec.description));
        inner.insert(self.params_key.into(), spec.parameters.clone());

        let mut outer = match self.nest_key {
            Some(key) => {
                let mut outer = Map::new();
                outer.insert(key.into(), Value::Object(inner));
                outer
            }
            None => inner,
        };
        if let Some(tag) = self.type_tag {
            outer.insert("type".into(), json!(tag));
        }
        Value::Object(outer)
    }

    /// Recover the tool spec from a payload rendered by [`SchemaShape::render`].
    pub fn extract(&self, payload: &Value) -> Option<ToolSpec> {
        let inner = match self.nest_key {
            Some(key) => payload.get(key)?,
            None => payload,
        };
        Some(ToolSpec {
            name: inner.get("name")?.as_str()?.to_string(),
            description: inner
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            parameters: inner.get(self.params_key)?.clone(),
        })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
