use async_trait::async_trait;
use docqa_core::{
    AnswerGenerator, AnswerSet, CharacterNgramEmbedder, Embedder, EmbeddingError,
    GeminiAnswerGenerator, GeminiEmbedder, GenerationError,
};

/// Embedding backend picked on the command line.
pub enum AppEmbedder {
    Ngram(CharacterNgramEmbedder),
    Gemini(GeminiEmbedder),
}

#[async_trait]
impl Embedder for AppEmbedder {
    fn dimensions(&self) -> usize {
        match self {
            AppEmbedder::Ngram(inner) => Embedder::dimensions(inner),
            AppEmbedder::Gemini(inner) => inner.dimensions(),
        }
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        match self {
            AppEmbedder::Ngram(inner) => inner.embed_documents(texts).await,
            AppEmbedder::Gemini(inner) => inner.embed_documents(texts).await,
        }
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        match self {
            AppEmbedder::Ngram(inner) => inner.embed_query(text).await,
            AppEmbedder::Gemini(inner) => inner.embed_query(text).await,
        }
    }
}

/// Answer backend picked on the command line. `Echo` returns each retrieved
/// context as the answer, for offline runs.
pub enum AppGenerator {
    Gemini(GeminiAnswerGenerator),
    Echo,
}

#[async_trait]
impl AnswerGenerator for AppGenerator {
    async fn generate(
        &self,
        contexts: &[String],
        questions: &[String],
    ) -> Result<AnswerSet, GenerationError> {
        match self {
            AppGenerator::Gemini(inner) => inner.generate(contexts, questions).await,
            AppGenerator::Echo => Ok(AnswerSet {
                answers: contexts.to_vec(),
            }),
        }
    }
}
