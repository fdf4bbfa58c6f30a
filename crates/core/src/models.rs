use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ConfigError, RequestError};

/// One page of source text as produced by a document loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    pub source_id: String,
    pub page: u32,
    pub text: String,
}

impl TextUnit {
    pub fn new(source_id: impl Into<String>, page: u32, text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            page,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub source_id: String,
    pub page: u32,
    /// Position in the request-wide chunk sequence.
    pub position: u64,
    /// Character offset of the chunk inside its page.
    pub char_start: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared euclidean distance.
    #[default]
    L2,
    /// `1 - cosine_similarity`.
    Cosine,
}

/// A ranked chunk returned by a similarity query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub distance: f32,
}

pub const NO_CONTEXT_PLACEHOLDER: &str = "No relevant context found.";
pub const RETRIEVAL_ERROR_PLACEHOLDER: &str = "Error retrieving context.";
pub const NOT_MENTIONED_SENTINEL: &str = "Not mentioned in the provided context.";

/// The resolved context for one question.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievedContext {
    Found(String),
    Empty,
    Failed(String),
}

impl RetrievedContext {
    pub fn from_hits(hits: &[SearchHit]) -> Self {
        if hits.is_empty() {
            return RetrievedContext::Empty;
        }

        let joined = hits
            .iter()
            .map(|hit| hit.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        RetrievedContext::Found(joined)
    }

    pub fn as_text(&self) -> &str {
        match self {
            RetrievedContext::Found(text) => text,
            RetrievedContext::Empty => NO_CONTEXT_PLACEHOLDER,
            RetrievedContext::Failed(_) => RETRIEVAL_ERROR_PLACEHOLDER,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            RetrievedContext::Found(text) => text,
            other => other.as_text().to_string(),
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, RetrievedContext::Found(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    Chunk,
    Index,
    Retrieve,
    Generate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Chunk => "chunk",
            Stage::Index => "index",
            Stage::Retrieve => "retrieve",
            Stage::Generate => "generate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QaRequest {
    pub documents: String,
    pub questions: Vec<String>,
}

impl QaRequest {
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.documents.trim().is_empty() {
            return Err(RequestError::MissingDocument);
        }
        if self.questions.is_empty() {
            return Err(RequestError::NoQuestions);
        }
        if let Some(index) = self.questions.iter().position(|q| q.trim().is_empty()) {
            return Err(RequestError::BlankQuestion(index));
        }
        Ok(())
    }
}

/// Structured output of the answer generator, aligned with the questions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerSet {
    pub answers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub retrieval_concurrency: usize,
    pub distance: DistanceMetric,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 3,
            retrieval_concurrency: 4,
            distance: DistanceMetric::L2,
        }
    }
}

impl PipelineOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if self.retrieval_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "retrieval_concurrency must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str, position: u64, distance: f32) -> SearchHit {
        SearchHit {
            chunk: Chunk {
                chunk_id: format!("c{position}"),
                source_id: "policy.pdf".to_string(),
                page: 1,
                position,
                char_start: 0,
                text: text.to_string(),
            },
            distance,
        }
    }

    #[test]
    fn context_joins_hits_with_single_space_in_rank_order() {
        let hits = vec![hit("grace period", 3, 0.1), hit("thirty days", 0, 0.2)];
        let context = RetrievedContext::from_hits(&hits);
        assert_eq!(context.as_text(), "grace period thirty days");
        assert!(context.is_found());
    }

    #[test]
    fn placeholders_are_literal() {
        assert_eq!(RetrievedContext::from_hits(&[]).into_text(), "No relevant context found.");
        assert_eq!(
            RetrievedContext::Failed("boom".to_string()).into_text(),
            "Error retrieving context."
        );
    }

    #[test]
    fn request_validation_rejects_blank_question() {
        let request = QaRequest {
            documents: "https://example.com/policy.pdf".to_string(),
            questions: vec!["What is covered?".to_string(), "  ".to_string()],
        };
        assert_eq!(request.validate(), Err(RequestError::BlankQuestion(1)));
    }

    #[test]
    fn options_reject_overlap_not_below_size() {
        let options = PipelineOptions {
            chunk_size: 50,
            chunk_overlap: 50,
            ..PipelineOptions::default()
        };
        assert!(options.validate().is_err());
        assert!(PipelineOptions::default().validate().is_ok());
    }
}
