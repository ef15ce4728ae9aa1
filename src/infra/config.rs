// src/infra/config.rs - Configuration loading (TOML)
//
// The `[ai]` table uses the same camelCase keys as the chat surface's
// `config` payload, so a config received over the bridge can be written
// back to disk verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::chat::prompts::PromptKind;
use crate::infra::errors::NovelerError;
use crate::infra::fs::write_private;
use crate::infra::paths;

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a professional writing assistant who helps users understand and improve their text.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub request: RequestConfig,
}

/// Providers, selection and prompt templates. Mirrors the UI `config` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_model_id: Option<String>,
    #[serde(default)]
    pub api_providers: Vec<ApiProvider>,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// Partial update sent by `saveConfig`. Absent fields leave the current value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfigUpdate {
    #[serde(default)]
    pub api_providers: Option<Vec<ApiProvider>>,
    #[serde(default)]
    pub selected_provider_id: Option<String>,
    #[serde(default)]
    pub selected_model_id: Option<String>,
    #[serde(default)]
    pub prompts: Option<PromptsConfig>,
}

impl AiConfig {
    pub fn apply(&mut self, update: AiConfigUpdate) {
        if let Some(providers) = update.api_providers {
            self.api_providers = providers;
        }
        if let Some(id) = update.selected_provider_id {
            self.selected_provider_id = Some(id).filter(|s| !s.is_empty());
        }
        if let Some(id) = update.selected_model_id {
            self.selected_model_id = Some(id).filter(|s| !s.is_empty());
        }
        if let Some(prompts) = update.prompts {
            self.prompts = prompts;
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProvider {
    pub id: String,
    pub name: String,
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub models: Vec<Model>,
}

impl fmt::Debug for ApiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiProvider")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("models", &self.models)
            .field("is_active", &self.is_active)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
}

/// One template per selection state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplate {
    #[serde(default)]
    pub with_selection: String,
    #[serde(default)]
    pub without_selection: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_name: Option<PromptTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_replace: Option<PromptTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_writing: Option<PromptTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_design: Option<PromptTemplate>,
}

impl PromptsConfig {
    pub fn get(&self, kind: PromptKind) -> Option<&PromptTemplate> {
        match kind {
            PromptKind::RandomName => self.random_name.as_ref(),
            PromptKind::WordReplace => self.word_replace.as_ref(),
            PromptKind::ContinueWriting => self.continue_writing.as_ref(),
            PromptKind::CharacterDesign => self.character_design.as_ref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Retention cap per stored session.
    pub max_messages_per_session: usize,
    /// Non-system messages sent upstream per request.
    pub max_context_messages: usize,
    /// Injected when a session carries no system message.
    pub system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_messages_per_session: 100,
            max_context_messages: 20,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    pub connect_timeout_secs: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1000,
            connect_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load config from file, falling back to defaults.
    pub fn load() -> Result<Self, NovelerError> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, NovelerError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Written owner-only: provider entries carry API keys.
    pub async fn save_to(&self, path: &Path) -> Result<(), NovelerError> {
        let content = toml::to_string_pretty(self)?;
        write_private(path, content.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reasonable() {
        let c = Config::default();
        assert_eq!(c.chat.max_messages_per_session, 100);
        assert_eq!(c.chat.max_context_messages, 20);
        assert!((c.request.temperature - 0.7).abs() < 0.001);
        assert_eq!(c.request.max_tokens, 1000);
        assert!(c.ai.api_providers.is_empty());
        assert!(c.ai.selected_provider_id.is_none());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.chat.max_context_messages, 20);
        assert_eq!(config.chat.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[ai]
selectedProviderId = "p1"
selectedModelId = "m2"

[[ai.apiProviders]]
id = "p1"
name = "OpenAI"
apiUrl = "https://api.example.com/v1/chat/completions"
apiKey = "sk-x"
isActive = true

[[ai.apiProviders.models]]
id = "m1"
name = "gpt-4"
isActive = true

[[ai.apiProviders.models]]
id = "m2"
name = "gpt-4o"

[ai.prompts.continueWriting]
withSelection = "Continue after: ${selectedText}"
withoutSelection = "Continue: ${paragraphText}"

[chat]
max_messages_per_session = 50
max_context_messages = 10
system_prompt = "Be brief."

[request]
temperature = 0.2
max_tokens = 256
connect_timeout_secs = 3
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.ai.api_providers.len(), 1);
        let p = &config.ai.api_providers[0];
        assert_eq!(p.api_key, "sk-x");
        assert_eq!(p.models.len(), 2);
        assert!(!p.models[1].is_active);
        assert_eq!(config.ai.selected_model_id.as_deref(), Some("m2"));
        let tpl = config.ai.prompts.get(PromptKind::ContinueWriting).unwrap();
        assert_eq!(tpl.with_selection, "Continue after: ${selectedText}");
        assert!(config.ai.prompts.get(PromptKind::RandomName).is_none());
        assert_eq!(config.chat.max_messages_per_session, 50);
        assert_eq!(config.request.max_tokens, 256);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let p = ApiProvider {
            id: "p".into(),
            name: "P".into(),
            api_url: "https://x".into(),
            api_key: "sk-secret".into(),
            models: vec![],
            is_active: true,
        };
        let dbg = format!("{:?}", p);
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn test_apply_update_partial() {
        let mut ai = AiConfig {
            selected_provider_id: Some("p1".into()),
            selected_model_id: Some("m1".into()),
            ..Default::default()
        };
        ai.apply(AiConfigUpdate {
            selected_model_id: Some("m2".into()),
            ..Default::default()
        });
        assert_eq!(ai.selected_provider_id.as_deref(), Some("p1"));
        assert_eq!(ai.selected_model_id.as_deref(), Some("m2"));

        // Empty string clears the selection
        ai.apply(AiConfigUpdate {
            selected_provider_id: Some(String::new()),
            ..Default::default()
        });
        assert!(ai.selected_provider_id.is_none());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.ai.selected_provider_id = Some("p9".into());
        config.chat.max_context_messages = 7;
        config.save_to(&path).await.unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.ai.selected_provider_id.as_deref(), Some("p9"));
        assert_eq!(loaded.chat.max_context_messages, 7);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_saved_api_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.ai = serde_json::from_value(serde_json::json!({
            "apiProviders": [{"id": "p1", "name": "P", "apiUrl": "https://x", "apiKey": "sk-secret"}]
        }))
        .unwrap();
        config.save_to(&path).await.unwrap();

        assert!(std::fs::read_to_string(&path).unwrap().contains("sk-secret"));
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0, "group/other can read {mode:o}");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
    }
}
