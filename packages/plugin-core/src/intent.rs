use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A chat intent a plugin variant declares for the AI intent parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentSpec {
    /// Unique action identifier, conventionally `plugin_<slug>_<verb>`.
    pub action: String,
    pub description: String,
    /// Entity name mapped to its expected type hint (e.g. "number|null").
    #[serde(default)]
    pub entities: BTreeMap<String, String>,
    /// Example utterances that should resolve to this intent.
    #[serde(default)]
    pub examples: Vec<String>,
}

impl IntentSpec {
    pub fn new(action: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            description: description.into(),
            entities: BTreeMap::new(),
            examples: Vec::new(),
        }
    }

    pub fn entity(mut self, name: impl Into<String>, type_hint: impl Into<String>) -> Self {
        self.entities.insert(name.into(), type_hint.into());
        self
    }

    pub fn example(mut self, utterance: impl Into<String>) -> Self {
        self.examples.push(utterance.into());
        self
    }
}

/// Result of handling a chat intent, rendered back into the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl IntentOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}
