use crate::{AnswerSet, GenerationError, LoadError, TextUnit};
use async_trait::async_trait;

#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Resolves a locator into page-level text units in document order.
    async fn load(&self, locator: &str) -> Result<Vec<TextUnit>, LoadError>;
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// `contexts[i]` is the only evidence for `questions[i]`. The returned
    /// answers must be aligned with `questions`.
    async fn generate(
        &self,
        contexts: &[String],
        questions: &[String],
    ) -> Result<AnswerSet, GenerationError>;
}
