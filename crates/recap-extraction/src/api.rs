//! API-backed extractor using OpenAI- or Anthropic-shaped endpoints.

use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

use async_trait::async_trait;
use recap_types::Candidate;

use super::{ExtractionError, ExtractionTemplate, Extractor};

/// Configuration for the API-backed extractor.
///
/// Model, temperature, and token cap live on the per-call
/// [`ExtractionTemplate`]; this config carries the transport-level pieces.
#[derive(Debug, Clone)]
pub struct ApiExtractorConfig {
    /// API base URL (e.g. "https://api.openai.com/v1")
    pub base_url: String,

    /// API key
    pub api_key: SecretString,

    /// Request timeout
    pub timeout: Duration,

    /// Maximum retries on failure
    pub max_retries: u32,
}

impl ApiExtractorConfig {
    /// Create config for the OpenAI API.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: SecretString::from(api_key.into()),
            timeout: Duration::from_secs(60),
            max_retries: 3,
        }
    }

    /// Create config for the Anthropic API.
    pub fn anthropic(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.anthropic.com/v1".to_string(),
            api_key: SecretString::from(api_key.into()),
            timeout: Duration::from_secs(60),
            max_retries: 3,
        }
    }

    /// Override the base URL (custom or self-hosted endpoints).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// API-backed extractor implementation.
pub struct ApiExtractor {
    client: Client,
    config: ApiExtractorConfig,
}

impl ApiExtractor {
    /// Create a new API extractor.
    pub fn new(config: ApiExtractorConfig) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExtractionError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Build the prompt for one message pair.
    fn build_prompt(
        &self,
        user_text: &str,
        assistant_text: &str,
        template: &ExtractionTemplate,
    ) -> String {
        format!(
            "{}\n\nUSER TURN:\n{}\n\nASSISTANT TURN:\n{}",
            template.instructions, user_text, assistant_text
        )
    }

    /// Call the API with retry logic.
    async fn call_api(
        &self,
        prompt: &str,
        template: &ExtractionTemplate,
    ) -> Result<String, ExtractionError> {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        };

        let mut attempts = 0;

        loop {
            attempts += 1;
            debug!(attempt = attempts, model = %template.model, "Calling extraction API");

            match self.make_request(prompt, template).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if attempts >= self.config.max_retries {
                        error!(error = %e, "Max retries exceeded");
                        return Err(e);
                    }

                    match backoff.next_backoff() {
                        Some(duration) => {
                            warn!(
                                error = %e,
                                retry_in_ms = duration.as_millis(),
                                "Extraction API call failed, retrying"
                            );
                            tokio::time::sleep(duration).await;
                        }
                        None => {
                            error!(error = %e, "Backoff exhausted");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Make a single API request.
    async fn make_request(
        &self,
        prompt: &str,
        template: &ExtractionTemplate,
    ) -> Result<String, ExtractionError> {
        let is_anthropic = self.config.base_url.contains("anthropic");

        if is_anthropic {
            self.make_anthropic_request(prompt, template).await
        } else {
            self.make_openai_request(prompt, template).await
        }
    }

    /// Make an OpenAI-compatible API request.
    async fn make_openai_request(
        &self,
        prompt: &str,
        template: &ExtractionTemplate,
    ) -> Result<String, ExtractionError> {
        #[derive(Serialize)]
        struct OpenAiRequest {
            model: String,
            temperature: f32,
            max_tokens: u32,
            messages: Vec<OpenAiMessage>,
            response_format: OpenAiResponseFormat,
        }

        #[derive(Serialize)]
        struct OpenAiMessage {
            role: String,
            content: String,
        }

        #[derive(Serialize)]
        struct OpenAiResponseFormat {
            #[serde(rename = "type")]
            format_type: String,
        }

        #[derive(Deserialize)]
        struct OpenAiResponse {
            choices: Vec<OpenAiChoice>,
        }

        #[derive(Deserialize)]
        struct OpenAiChoice {
            message: OpenAiMessageResponse,
        }

        #[derive(Deserialize)]
        struct OpenAiMessageResponse {
            content: String,
        }

        let request = OpenAiRequest {
            model: template.model.clone(),
            temperature: template.temperature,
            max_tokens: template.max_output_tokens,
            messages: vec![OpenAiMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            response_format: OpenAiResponseFormat {
                format_type: "json_object".to_string(),
            },
        };

        let url = format!("{}/chat/completions", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_key.expose_secret()),
            )
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if response.status() == 429 {
            return Err(ExtractionError::RateLimited);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api(format!("HTTP {}: {}", status, body)));
        }

        let response_body: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(e.to_string()))?;

        response_body
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| ExtractionError::Parse("No choices in response".to_string()))
    }

    /// Make an Anthropic API request.
    async fn make_anthropic_request(
        &self,
        prompt: &str,
        template: &ExtractionTemplate,
    ) -> Result<String, ExtractionError> {
        #[derive(Serialize)]
        struct AnthropicRequest {
            model: String,
            temperature: f32,
            max_tokens: u32,
            messages: Vec<AnthropicMessage>,
        }

        #[derive(Serialize)]
        struct AnthropicMessage {
            role: String,
            content: String,
        }

        #[derive(Deserialize)]
        struct AnthropicResponse {
            content: Vec<AnthropicContent>,
        }

        #[derive(Deserialize)]
        struct AnthropicContent {
            text: String,
        }

        let request = AnthropicRequest {
            model: template.model.clone(),
            temperature: template.temperature,
            max_tokens: template.max_output_tokens,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let url = format!("{}/messages", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.config.api_key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if response.status() == 429 {
            return Err(ExtractionError::RateLimited);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Api(format!("HTTP {}: {}", status, body)));
        }

        let response_body: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(e.to_string()))?;

        response_body
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| ExtractionError::Parse("No content in response".to_string()))
    }

    /// Parse the model's text output into a Candidate.
    fn parse_candidate(&self, response: &str) -> Result<Candidate, ExtractionError> {
        let json_str = extract_json(response);

        serde_json::from_str(&json_str)
            .map_err(|e| ExtractionError::Parse(format!("Failed to parse candidate JSON: {}", e)))
    }
}

fn classify_transport_error(err: reqwest::Error) -> ExtractionError {
    if err.is_timeout() {
        ExtractionError::Timeout
    } else {
        ExtractionError::Api(err.to_string())
    }
}

/// Extract a JSON object from text (handles markdown code fences).
fn extract_json(text: &str) -> String {
    if let Some(start) = text.find("```json") {
        if let Some(end) = text[start + 7..].find("```") {
            return text[start + 7..start + 7 + end].trim().to_string();
        }
    }

    if let Some(start) = text.find("```") {
        if let Some(end) = text[start + 3..].find("```") {
            return text[start + 3..start + 3 + end].trim().to_string();
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        return text[start..=end].to_string();
    }

    text.to_string()
}

#[async_trait]
impl Extractor for ApiExtractor {
    async fn extract(
        &self,
        user_text: &str,
        assistant_text: &str,
        template: &ExtractionTemplate,
    ) -> Result<Candidate, ExtractionError> {
        let prompt = self.build_prompt(user_text, assistant_text, template);
        let response = self.call_api(&prompt, template).await?;
        self.parse_candidate(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_template() -> ExtractionTemplate {
        ExtractionTemplate::new("extract structured facts as JSON", "gpt-4o-mini")
    }

    fn test_extractor(base_url: &str, max_retries: u32) -> ApiExtractor {
        ApiExtractor::new(ApiExtractorConfig {
            base_url: base_url.to_string(),
            api_key: SecretString::from("test-key".to_string()),
            timeout: Duration::from_secs(5),
            max_retries,
        })
        .unwrap()
    }

    fn openai_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "content": content } }]
        })
    }

    #[test]
    fn test_extract_json_plain() {
        let text = r#"{"goals": ["ship v1"]}"#;
        assert_eq!(extract_json(text), text);
    }

    #[test]
    fn test_extract_json_code_block() {
        let text = "Here you go:\n```json\n{\"goals\": [\"ship v1\"]}\n```";
        assert_eq!(extract_json(text), r#"{"goals": ["ship v1"]}"#);
    }

    #[test]
    fn test_extract_json_with_prefix() {
        let text = r#"Sure! {"goals": ["ship v1"]} hope that helps"#;
        let json = extract_json(text);
        assert!(json.starts_with('{'));
        assert!(json.ends_with('}'));
    }

    #[test]
    fn test_openai_config() {
        let config = ApiExtractorConfig::openai("test-key");
        assert!(config.base_url.contains("openai"));
    }

    #[test]
    fn test_anthropic_config() {
        let config = ApiExtractorConfig::anthropic("test-key");
        assert!(config.base_url.contains("anthropic"));
    }

    #[tokio::test]
    async fn test_extract_parses_candidate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_body(
                r#"{"goals": ["ship v1"], "facts": {"budget": "$500"}}"#,
            )))
            .mount(&server)
            .await;

        let extractor = test_extractor(&server.uri(), 1);
        let candidate = extractor
            .extract("what's the budget?", "the budget is $500", &test_template())
            .await
            .unwrap();

        assert_eq!(candidate.goals, vec!["ship v1".to_string()]);
        assert!(candidate.facts.contains_key("budget"));
    }

    #[tokio::test]
    async fn test_extract_malformed_output_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(openai_body(r#"{"decisions": "not a list"}"#)),
            )
            .mount(&server)
            .await;

        let extractor = test_extractor(&server.uri(), 1);
        let result = extractor
            .extract("user", "assistant", &test_template())
            .await;

        assert!(matches!(result, Err(ExtractionError::Parse(_))));
    }

    #[tokio::test]
    async fn test_extract_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let extractor = test_extractor(&server.uri(), 1);
        let result = extractor
            .extract("user", "assistant", &test_template())
            .await;

        assert!(matches!(result, Err(ExtractionError::RateLimited)));
    }

    #[tokio::test]
    async fn test_extract_server_error_surfaces_as_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let extractor = test_extractor(&server.uri(), 1);
        let result = extractor
            .extract("user", "assistant", &test_template())
            .await;

        assert!(matches!(result, Err(ExtractionError::Api(_))));
    }
}
