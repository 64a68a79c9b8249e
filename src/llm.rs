use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::settings::{ProviderKind, Settings};

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// The one capability the pipeline needs from any backend: send turns, get
/// text back. Tests stub this to record calls.
pub trait ChatClient {
    fn chat(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Backend selection, resolved once from settings.
#[derive(Debug, Clone)]
enum Backend {
    OpenRouter { api_key: String, model: String },
    Ollama { endpoint: String, model: String },
    Google { api_key: String, model: String },
}

#[derive(Debug)]
pub struct LlmClient {
    backend: Backend,
    http: reqwest::blocking::Client,
}

impl LlmClient {
    /// Client for the main analysis model.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::build(settings, settings.llm_provider, None)
    }

    /// Client for the scoring model override when one is configured,
    /// otherwise the main model. Scoring typically routes to a cheaper model.
    pub fn scoring_client(settings: &Settings) -> Result<Self> {
        let provider = settings.scoring_provider.unwrap_or(settings.llm_provider);
        Self::build(settings, provider, settings.scoring_model.as_deref())
    }

    fn build(settings: &Settings, provider: ProviderKind, model_override: Option<&str>) -> Result<Self> {
        let backend = match provider {
            ProviderKind::OpenRouter => {
                if settings.openrouter_api_key.is_empty() {
                    return Err(anyhow!(
                        "OpenRouter API key not configured. Set openrouter_api_key in settings."
                    ));
                }
                Backend::OpenRouter {
                    api_key: settings.openrouter_api_key.clone(),
                    model: model_override.unwrap_or(&settings.openrouter_model).to_string(),
                }
            }
            ProviderKind::Ollama => Backend::Ollama {
                endpoint: settings.ollama_endpoint.trim_end_matches('/').to_string(),
                model: model_override.unwrap_or(&settings.ollama_model).to_string(),
            },
            ProviderKind::Google => {
                if settings.google_api_key.is_empty() {
                    return Err(anyhow!(
                        "Google API key not configured. Set google_api_key in settings."
                    ));
                }
                Backend::Google {
                    api_key: settings.google_api_key.clone(),
                    model: model_override.unwrap_or(&settings.google_model).to_string(),
                }
            }
        };

        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { backend, http })
    }

    pub fn model_name(&self) -> &str {
        match &self.backend {
            Backend::OpenRouter { model, .. } => model,
            Backend::Ollama { model, .. } => model,
            Backend::Google { model, .. } => model,
        }
    }

    fn chat_openrouter(&self, api_key: &str, model: &str, messages: &[ChatMessage]) -> Result<String> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: &'a [ChatMessage],
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct ResponseMessage {
            content: String,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ResponseMessage,
        }
        #[derive(Deserialize)]
        struct Response {
            choices: Vec<Choice>,
        }

        let response = self
            .http
            .post(OPENROUTER_API_URL)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&Request {
                model,
                messages,
                temperature: 0.0,
            })
            .send()
            .context("Failed to send request to OpenRouter")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("OpenRouter request failed with status {}: {}", status, body));
        }

        let parsed: Response = response.json().context("Failed to parse OpenRouter response")?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("No choices in OpenRouter response"))
    }

    fn chat_ollama(&self, endpoint: &str, model: &str, messages: &[ChatMessage]) -> Result<String> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: &'a [ChatMessage],
            stream: bool,
        }
        #[derive(Deserialize)]
        struct ResponseMessage {
            content: String,
        }
        #[derive(Deserialize)]
        struct Response {
            message: ResponseMessage,
        }

        let response = self
            .http
            .post(format!("{}/api/chat", endpoint))
            .json(&Request {
                model,
                messages,
                stream: false,
            })
            .send()
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("Ollama request failed with status {}: {}", status, body));
        }

        let parsed: Response = response.json().context("Failed to parse Ollama response")?;
        Ok(parsed.message.content)
    }

    fn chat_google(&self, api_key: &str, model: &str, messages: &[ChatMessage]) -> Result<String> {
        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct Content<'a> {
            role: &'a str,
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        struct Request<'a> {
            contents: Vec<Content<'a>>,
        }
        #[derive(Deserialize)]
        struct RespPart {
            text: String,
        }
        #[derive(Deserialize)]
        struct RespContent {
            parts: Vec<RespPart>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: RespContent,
        }
        #[derive(Deserialize)]
        struct Response {
            candidates: Vec<Candidate>,
        }

        // Gemini uses "model" instead of "assistant" for its own turns
        let contents: Vec<Content> = messages
            .iter()
            .map(|m| Content {
                role: if m.role == "assistant" { "model" } else { "user" },
                parts: vec![Part { text: &m.content }],
            })
            .collect();

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            model, api_key
        );

        let response = self
            .http
            .post(url)
            .json(&Request { contents })
            .send()
            .context("Failed to send request to Google")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(anyhow!("Google request failed with status {}: {}", status, body));
        }

        let parsed: Response = response.json().context("Failed to parse Google response")?;
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| anyhow!("No candidates in Google response"))
    }
}

impl ChatClient for LlmClient {
    fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        match &self.backend {
            Backend::OpenRouter { api_key, model } => self.chat_openrouter(api_key, model, messages),
            Backend::Ollama { endpoint, model } => self.chat_ollama(endpoint, model, messages),
            Backend::Google { api_key, model } => self.chat_google(api_key, model, messages),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openrouter_requires_api_key() {
        let settings = Settings::default();
        let result = LlmClient::from_settings(&settings);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("OpenRouter API key"));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let settings = Settings {
            llm_provider: ProviderKind::Ollama,
            ..Default::default()
        };
        let client = LlmClient::from_settings(&settings).unwrap();
        assert_eq!(client.model_name(), "qwen2.5-coder:32b");
    }

    #[test]
    fn test_google_requires_api_key() {
        let settings = Settings {
            llm_provider: ProviderKind::Google,
            ..Default::default()
        };
        let result = LlmClient::from_settings(&settings);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Google API key"));
    }

    #[test]
    fn test_scoring_client_uses_override() {
        let settings = Settings {
            llm_provider: ProviderKind::Google,
            google_api_key: "unused".to_string(),
            scoring_provider: Some(ProviderKind::Ollama),
            scoring_model: Some("llama3.2:3b".to_string()),
            ..Default::default()
        };
        let client = LlmClient::scoring_client(&settings).unwrap();
        assert_eq!(client.model_name(), "llama3.2:3b");
    }

    #[test]
    fn test_scoring_client_falls_back_to_main_model() {
        let settings = Settings {
            llm_provider: ProviderKind::Ollama,
            ..Default::default()
        };
        let client = LlmClient::scoring_client(&settings).unwrap();
        assert_eq!(client.model_name(), "qwen2.5-coder:32b");
    }
}
