//! Google Generative Language REST adapters: batch embeddings and
//! structured answer generation.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::embeddings::Embedder;
use crate::error::{EmbeddingError, GenerationError};
use crate::models::AnswerSet;
use crate::prompt::render_prompt;
use crate::traits::AnswerGenerator;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EMBEDDING_MODEL: &str = "embedding-001";
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-2.5-flash";

/// Output size of `embedding-001`.
pub const DEFAULT_GEMINI_DIMENSIONS: usize = 768;

const PROVIDER: &str = "gemini";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub generation_model: String,
    pub dimensions: usize,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            dimensions: DEFAULT_GEMINI_DIMENSIONS,
        }
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.base_url.trim_end_matches('/'),
            model,
            method
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: Content<'a>,
    task_type: &'static str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

fn error_detail(body: String) -> String {
    serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body)
}

/// Embeds through `batchEmbedContents`; chunks use the document task type
/// and questions the query task type.
#[derive(Debug, Clone)]
pub struct GeminiEmbedder {
    client: Client,
    config: GeminiConfig,
}

impl GeminiEmbedder {
    pub fn new(client: Client, config: GeminiConfig) -> Result<Self, EmbeddingError> {
        if config.api_key.trim().is_empty() {
            return Err(EmbeddingError::Provider {
                provider: PROVIDER.to_string(),
                message: "API key must not be empty".to_string(),
            });
        }
        Ok(Self { client, config })
    }

    async fn embed_with_task(
        &self,
        texts: &[&str],
        task_type: &'static str,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.config.embedding_model,
            task_type,
            "embedding batch"
        );

        let model = format!("models/{}", self.config.embedding_model);
        let body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|&text| EmbedContentRequest {
                    model: model.clone(),
                    content: Content {
                        parts: vec![Part { text }],
                    },
                    task_type,
                })
                .collect(),
        };

        let response = self
            .client
            .post(
                self.config
                    .model_url(&self.config.embedding_model, "batchEmbedContents"),
            )
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response.text().await.unwrap_or_default());
            error!(provider = PROVIDER, %status, "embedding API error");
            return Err(EmbeddingError::Provider {
                provider: PROVIDER.to_string(),
                message: format!("API returned {status}: {detail}"),
            });
        }

        let parsed: BatchEmbedResponse = response.json().await?;
        if parsed.embeddings.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: parsed.embeddings.len(),
            });
        }

        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.embed_with_task(texts, "RETRIEVAL_DOCUMENT").await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_with_task(&[text], "RETRIEVAL_QUERY").await?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }
}

/// Calls `generateContent` with a JSON response schema of `{answers: [string]}`.
#[derive(Debug, Clone)]
pub struct GeminiAnswerGenerator {
    client: Client,
    config: GeminiConfig,
}

impl GeminiAnswerGenerator {
    pub fn new(client: Client, config: GeminiConfig) -> Result<Self, GenerationError> {
        if config.api_key.trim().is_empty() {
            return Err(GenerationError::Config(
                "API key must not be empty".to_string(),
            ));
        }
        Ok(Self { client, config })
    }

    fn request_body(prompt: &str) -> Value {
        json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 0.0,
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "answers": { "type": "ARRAY", "items": { "type": "STRING" } }
                    },
                    "required": ["answers"]
                }
            }
        })
    }
}

/// Pulls the structured answers out of a `generateContent` response body.
fn parse_answer_set(response: GenerateResponse) -> Result<AnswerSet, GenerationError> {
    let text = response
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .filter_map(|part| part.text)
        .collect::<String>();

    if text.trim().is_empty() {
        return Err(GenerationError::BackendResponse {
            backend: PROVIDER.to_string(),
            details: "response carried no candidate text".to_string(),
        });
    }

    Ok(serde_json::from_str(&text)?)
}

#[async_trait]
impl AnswerGenerator for GeminiAnswerGenerator {
    async fn generate(
        &self,
        contexts: &[String],
        questions: &[String],
    ) -> Result<AnswerSet, GenerationError> {
        let prompt = render_prompt(contexts, questions);
        debug!(
            provider = PROVIDER,
            model = %self.config.generation_model,
            prompt_chars = prompt.len(),
            "requesting answers"
        );

        let response = self
            .client
            .post(
                self.config
                    .model_url(&self.config.generation_model, "generateContent"),
            )
            .header("x-goog-api-key", &self.config.api_key)
            .json(&Self::request_body(&prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = error_detail(response.text().await.unwrap_or_default());
            error!(provider = PROVIDER, %status, "generation API error");
            return Err(GenerationError::BackendResponse {
                backend: PROVIDER.to_string(),
                details: format!("{status}: {detail}"),
            });
        }

        let answers = parse_answer_set(response.json().await?)?;
        if answers.answers.len() != questions.len() {
            return Err(GenerationError::Misaligned {
                expected: questions.len(),
                actual: answers.answers.len(),
            });
        }
        Ok(answers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_url_joins_base_and_method() {
        let mut config = GeminiConfig::new("key");
        config.base_url = "http://localhost:8080/v1beta/".to_string();
        assert_eq!(
            config.model_url("embedding-001", "batchEmbedContents"),
            "http://localhost:8080/v1beta/models/embedding-001:batchEmbedContents"
        );
    }

    #[test]
    fn empty_api_key_is_rejected_at_construction() {
        let config = GeminiConfig::new("  ");
        assert!(GeminiEmbedder::new(Client::new(), config.clone()).is_err());
        assert!(GeminiAnswerGenerator::new(Client::new(), config).is_err());
    }

    #[test]
    fn batch_request_serializes_task_type_in_camel_case() -> Result<(), serde_json::Error> {
        let body = BatchEmbedRequest {
            requests: vec![EmbedContentRequest {
                model: "models/embedding-001".to_string(),
                content: Content {
                    parts: vec![Part { text: "room rent" }],
                },
                task_type: "RETRIEVAL_QUERY",
            }],
        };
        let value = serde_json::to_value(&body)?;
        assert_eq!(value["requests"][0]["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(value["requests"][0]["content"]["parts"][0]["text"], "room rent");
        Ok(())
    }

    #[test]
    fn answers_are_parsed_from_candidate_text() -> Result<(), Box<dyn std::error::Error>> {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "{\"answers\": [\"30 days\", " },
                        { "text": "\"2 years\"]}" }
                    ]
                }
            }]
        }))?;
        let answers = parse_answer_set(response)?;
        assert_eq!(answers.answers, vec!["30 days", "2 years"]);
        Ok(())
    }

    #[test]
    fn empty_candidates_are_a_backend_error() -> Result<(), serde_json::Error> {
        let response: GenerateResponse = serde_json::from_value(json!({ "candidates": [] }))?;
        assert!(matches!(
            parse_answer_set(response),
            Err(GenerationError::BackendResponse { .. })
        ));
        Ok(())
    }
}
