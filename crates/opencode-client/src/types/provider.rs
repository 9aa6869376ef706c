use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::lenient;

/// Response of `GET /provider`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersResponse {
    #[serde(deserialize_with = "lenient::list")]
    pub all: Vec<ProviderInfo>,

    /// Server defaults, e.g. `providerID` / `modelID`
    #[serde(deserialize_with = "lenient::string_map")]
    pub default: BTreeMap<String, String>,

    #[serde(deserialize_with = "lenient::string_list")]
    pub connected: Vec<String>,
}

/// The provider/model pair a prompt is sent with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub provider_id: String,
    pub model_id: String,
}

impl ModelSelection {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
        }
    }
}

impl ProvidersResponse {
    pub fn provider(&self, id: &str) -> Option<&ProviderInfo> {
        self.all.iter().find(|p| p.id == id)
    }

    pub fn is_connected(&self, provider_id: &str) -> bool {
        self.connected.iter().any(|c| c == provider_id)
    }

    /// Pick the provider and model to use
    ///
    /// Order of preference: the last selection, the server defaults, then the
    /// first entry. A preferred id that no longer exists falls back to the
    /// first provider (or the provider's first model).
    pub fn resolve_selection(
        &self,
        last_provider_id: Option<&str>,
        last_model_id: Option<&str>,
    ) -> Option<ModelSelection> {
        let non_blank = |s: Option<&str>| s.filter(|s| !s.trim().is_empty()).map(str::to_string);

        let preferred_provider = non_blank(last_provider_id)
            .or_else(|| self.default.get("providerID").cloned())
            .or_else(|| self.default.get("provider").cloned());

        let provider = preferred_provider
            .as_deref()
            .and_then(|id| self.provider(id))
            .or_else(|| self.all.first())?;

        let preferred_model = non_blank(last_model_id)
            .or_else(|| self.default.get("modelID").cloned())
            .or_else(|| self.default.get("model").cloned());

        let model = preferred_model
            .as_deref()
            .and_then(|id| provider.models.get(id))
            .or_else(|| provider.models.values().next())?;

        Some(ModelSelection::new(provider.id.clone(), model.id.clone()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderInfo {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,

    #[serde(deserialize_with = "lenient::string")]
    pub name: String,

    #[serde(deserialize_with = "lenient::string")]
    pub source: String,

    #[serde(deserialize_with = "lenient::string_list")]
    pub env: Vec<String>,

    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(deserialize_with = "lenient::object")]
    pub options: Map<String, Value>,

    /// Keyed by model id, in the order the server listed them
    #[serde(deserialize_with = "deserialize_models")]
    pub models: IndexMap<String, Model>,
}

impl ProviderInfo {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Models keyed by id; a model without its own `id` takes the map key
fn deserialize_models<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<IndexMap<String, Model>, D::Error> {
    let Value::Object(entries) = Value::deserialize(d)? else {
        return Ok(IndexMap::new());
    };

    Ok(entries
        .into_iter()
        .filter(|(_, value)| value.is_object())
        .map(|(key, value)| {
            let mut model: Model = serde_json::from_value(value).unwrap_or_default();
            if model.id.is_empty() {
                model.id = key.clone();
            }
            (key, model)
        })
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Model {
    #[serde(deserialize_with = "lenient::string")]
    pub id: String,

    #[serde(
        rename = "providerID",
        deserialize_with = "lenient::opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub provider_id: Option<String>,

    #[serde(deserialize_with = "lenient::opt_struct", skip_serializing_if = "Option::is_none")]
    pub api: Option<ModelApi>,

    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    #[serde(deserialize_with = "lenient::opt_struct", skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,

    #[serde(deserialize_with = "lenient::opt_struct", skip_serializing_if = "Option::is_none")]
    pub cost: Option<Cost>,

    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,

    #[serde(deserialize_with = "lenient::flag")]
    pub attachment: bool,

    #[serde(deserialize_with = "lenient::flag")]
    pub reasoning: bool,

    #[serde(deserialize_with = "lenient::flag")]
    pub temperature: bool,

    #[serde(deserialize_with = "lenient::flag")]
    pub tool_call: bool,

    #[serde(deserialize_with = "lenient::opt_struct", skip_serializing_if = "Option::is_none")]
    pub limit: Option<Limit>,

    #[serde(deserialize_with = "lenient::opt_struct", skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Modalities>,

    #[serde(deserialize_with = "lenient::flag")]
    pub experimental: bool,

    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(deserialize_with = "lenient::object")]
    pub options: Map<String, Value>,

    #[serde(deserialize_with = "lenient::string_map")]
    pub headers: BTreeMap<String, String>,

    #[serde(deserialize_with = "lenient::object")]
    pub variants: Map<String, Value>,
}

impl Model {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.id)
    }

    // Capability flags live either at the top level or under `capabilities`

    pub fn supports_reasoning(&self) -> bool {
        self.reasoning || self.capabilities.as_ref().is_some_and(|c| c.reasoning)
    }

    pub fn supports_tool_calls(&self) -> bool {
        self.tool_call || self.capabilities.as_ref().is_some_and(|c| c.toolcall)
    }

    pub fn supports_attachments(&self) -> bool {
        self.attachment || self.capabilities.as_ref().is_some_and(|c| c.attachment)
    }

    pub fn supports_temperature(&self) -> bool {
        self.temperature || self.capabilities.as_ref().is_some_and(|c| c.temperature)
    }

    pub fn context_window(&self) -> Option<u32> {
        self.limit.as_ref().and_then(|l| l.context)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelApi {
    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(deserialize_with = "lenient::opt_string", skip_serializing_if = "Option::is_none")]
    pub npm: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    #[serde(deserialize_with = "lenient::flag")]
    pub temperature: bool,

    #[serde(deserialize_with = "lenient::flag")]
    pub reasoning: bool,

    #[serde(deserialize_with = "lenient::flag")]
    pub attachment: bool,

    #[serde(deserialize_with = "lenient::flag")]
    pub toolcall: bool,

    #[serde(deserialize_with = "lenient::opt_struct", skip_serializing_if = "Option::is_none")]
    pub input: Option<MediaSupport>,

    #[serde(deserialize_with = "lenient::opt_struct", skip_serializing_if = "Option::is_none")]
    pub output: Option<MediaSupport>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub interleaved: Option<Value>,
}

/// Media kinds a model accepts or produces
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSupport {
    #[serde(deserialize_with = "lenient::flag")]
    pub text: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub audio: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub image: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub video: bool,
    #[serde(deserialize_with = "lenient::flag")]
    pub pdf: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cost {
    #[serde(deserialize_with = "lenient::opt_float", skip_serializing_if = "Option::is_none")]
    pub input: Option<f64>,

    #[serde(deserialize_with = "lenient::opt_float", skip_serializing_if = "Option::is_none")]
    pub output: Option<f64>,

    #[serde(deserialize_with = "lenient::opt_struct", skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheCost>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheCost {
    #[serde(deserialize_with = "lenient::opt_float", skip_serializing_if = "Option::is_none")]
    pub read: Option<f64>,

    #[serde(deserialize_with = "lenient::opt_float", skip_serializing_if = "Option::is_none")]
    pub write: Option<f64>,
}

/// Token limits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limit {
    #[serde(deserialize_with = "lenient::opt_count", skip_serializing_if = "Option::is_none")]
    pub context: Option<u32>,

    #[serde(deserialize_with = "lenient::opt_count", skip_serializing_if = "Option::is_none")]
    pub input: Option<u32>,

    #[serde(deserialize_with = "lenient::opt_count", skip_serializing_if = "Option::is_none")]
    pub output: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Modalities {
    #[serde(deserialize_with = "lenient::opt_string_list", skip_serializing_if = "Option::is_none")]
    pub input: Option<Vec<String>>,

    #[serde(deserialize_with = "lenient::opt_string_list", skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<String>>,
}
