use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::embeddings::Embedder;
use crate::index::SimilarityIndex;
use crate::models::RetrievedContext;

pub const DEFAULT_TOP_K: usize = 3;

/// Resolves each question to a context string against one request's index.
///
/// Per-question failures never escape: the affected slot gets the error
/// placeholder and the remaining questions are still answered. Output order
/// always matches input order, whatever order the queries complete in.
#[derive(Debug, Clone, Copy)]
pub struct ContextRetriever {
    top_k: usize,
    concurrency: usize,
}

impl Default for ContextRetriever {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            concurrency: 1,
        }
    }
}

impl ContextRetriever {
    /// `top_k` and `concurrency` are clamped to at least 1.
    pub fn new(top_k: usize, concurrency: usize) -> Self {
        Self {
            top_k: top_k.max(1),
            concurrency: concurrency.max(1),
        }
    }

    pub async fn retrieve<E>(
        &self,
        questions: &[String],
        index: &SimilarityIndex,
        embedder: &E,
    ) -> Vec<RetrievedContext>
    where
        E: Embedder + ?Sized,
    {
        // owned questions keep the stream future Send for every borrow lifetime
        let contexts: Vec<RetrievedContext> =
            stream::iter(questions.iter().cloned().enumerate())
                .map(|(question_index, question)| async move {
                    self.retrieve_one(question_index, &question, index, embedder)
                        .await
                })
                .buffered(self.concurrency)
                .collect()
                .await;

        debug!(
            questions = questions.len(),
            found = contexts.iter().filter(|c| c.is_found()).count(),
            "retrieval finished"
        );
        contexts
    }

    async fn retrieve_one<E>(
        &self,
        question_index: usize,
        question: &str,
        index: &SimilarityIndex,
        embedder: &E,
    ) -> RetrievedContext
    where
        E: Embedder + ?Sized,
    {
        match index.query(question, embedder, self.top_k).await {
            Ok(hits) => {
                if hits.is_empty() {
                    debug!(question_index, "no chunks matched");
                }
                RetrievedContext::from_hits(&hits)
            }
            Err(error) => {
                warn!(question_index, question, error = %error, "error retrieving context");
                RetrievedContext::Failed(error.to_string())
            }
        }
    }
}
