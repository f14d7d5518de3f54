use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::message::Message;
use super::tool::{ToolChoice, ToolDefinition};

/// Per-call options
///
/// Cross-vendor settings are typed fields; anything else lands in `extra`.
/// Adapters keep only the keys they understand (see [`CompletionOptions::retain`]),
/// so passing an unrecognized option never breaks a call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Stream frames instead of returning one response
    #[serde(default)]
    pub stream: bool,
    /// Stop sequences (a single string is accepted too)
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Tool definitions available to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// How the model should select tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Presence penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Frequency penalty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    /// Random seed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// End-user identifier for vendors that track users
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Opaque vendor-side conversation handle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Vendor-specific extensions
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompletionOptions {
    /// Build options from an open key/value bag
    ///
    /// # Errors
    ///
    /// Returns an error if a recognized key carries a value of the wrong type
    pub fn from_map(map: Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(map))
    }

    /// Streaming variant of these options
    #[must_use]
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Copy keeping only the allowed keys
    ///
    /// `stream` always survives since it selects the call shape rather than
    /// being sent as a vendor parameter.
    #[must_use]
    pub fn retain(&self, allowed: &[&str]) -> Self {
        fn keep<T: Clone>(allowed: &[&str], key: &str, value: Option<&T>) -> Option<T> {
            value.filter(|_| allowed.contains(&key)).cloned()
        }

        Self {
            temperature: keep(allowed, "temperature", self.temperature.as_ref()),
            max_tokens: keep(allowed, "max_tokens", self.max_tokens.as_ref()),
            top_p: keep(allowed, "top_p", self.top_p.as_ref()),
            stream: self.stream,
            stop: keep(allowed, "stop", self.stop.as_ref()),
            tools: keep(allowed, "tools", self.tools.as_ref()),
            tool_choice: keep(allowed, "tool_choice", self.tool_choice.as_ref()),
            presence_penalty: keep(allowed, "presence_penalty", self.presence_penalty.as_ref()),
            frequency_penalty: keep(allowed, "frequency_penalty", self.frequency_penalty.as_ref()),
            seed: keep(allowed, "seed", self.seed.as_ref()),
            user_id: keep(allowed, "user_id", self.user_id.as_ref()),
            conversation_id: keep(allowed, "conversation_id", self.conversation_id.as_ref()),
            extra: self
                .extra
                .iter()
                .filter(|(key, _)| allowed.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }

    /// String-valued extension option
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// Integer-valued extension option
    pub fn extra_u64(&self, key: &str) -> Option<u64> {
        self.extra.get(key).and_then(Value::as_u64)
    }
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<String>>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(Option::<OneOrMany>::deserialize(deserializer)?.map(|v| match v {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    }))
}

/// Validated request handed to an adapter
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// Conversation messages, already passed through the prompt check
    pub messages: Vec<Message>,
    /// Options filtered to the adapter's allowlist
    pub options: CompletionOptions,
}

impl CompletionRequest {
    /// Text of the last user message
    pub fn last_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == super::Role::User)
            .map(|m| m.content.as_text())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn bag(value: Value) -> CompletionOptions {
        let Value::Object(map) = value else { unreachable!() };
        CompletionOptions::from_map(map).unwrap()
    }

    #[test]
    fn unknown_keys_land_in_extra() {
        let options = bag(json!({"temperature": 0.3, "top_k": 5, "frobnicate": true}));
        assert_eq!(options.temperature, Some(0.3));
        assert_eq!(options.extra_u64("top_k"), Some(5));
        assert!(options.extra.contains_key("frobnicate"));
    }

    #[test]
    fn stop_accepts_single_string() {
        assert_eq!(bag(json!({"stop": "END"})).stop, Some(vec!["END".to_owned()]));
        assert_eq!(bag(json!({"stop": ["a", "b"]})).stop.map(|s| s.len()), Some(2));
    }

    #[test]
    fn retain_drops_disallowed_typed_and_extra_keys() {
        let options = bag(json!({
            "temperature": 0.5,
            "top_p": 0.9,
            "stream": true,
            "top_k": 3,
            "frobnicate": 1
        }));

        let kept = options.retain(&["temperature", "top_k"]);
        assert_eq!(kept.temperature, Some(0.5));
        assert_eq!(kept.top_p, None);
        assert!(kept.stream);
        assert_eq!(kept.extra_u64("top_k"), Some(3));
        assert!(!kept.extra.contains_key("frobnicate"));
    }

    #[test]
    fn retained_options_serialize_without_dropped_keys() {
        let kept = bag(json!({"temperature": 0.1, "frobnicate": 1})).retain(&["temperature"]);
        let value = serde_json::to_value(&kept).unwrap();
        assert!(value.get("frobnicate").is_none());
        assert_eq!(value["temperature"], json!(0.1));
    }

    #[test]
    fn wrong_type_for_known_key_is_an_error() {
        let Value::Object(map) = json!({"max_tokens": "many"}) else { unreachable!() };
        assert!(CompletionOptions::from_map(map).is_err());
    }
}
