use crate::chunking::{ChunkingConfig, TextSplitter};
use crate::embeddings::Embedder;
use crate::error::{ConfigError, GenerationError, LoadError, PipelineError};
use crate::index::SimilarityIndex;
use crate::models::{
    AnswerSet, Chunk, DistanceMetric, PipelineOptions, QaRequest, RetrievedContext, Stage,
    TextUnit,
};
use crate::retriever::ContextRetriever;
use crate::traits::{AnswerGenerator, DocumentLoader};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Runs one request through load, chunk, index, retrieve and generate.
///
/// Nothing is cached between calls: every run builds its own chunk list and
/// index, so concurrent runs share no mutable state.
pub struct QaPipeline<L, E, G>
where
    L: DocumentLoader,
    E: Embedder,
    G: AnswerGenerator,
{
    loader: L,
    embedder: E,
    generator: G,
    splitter: TextSplitter,
    retriever: ContextRetriever,
    distance: DistanceMetric,
}

impl<L, E, G> QaPipeline<L, E, G>
where
    L: DocumentLoader,
    E: Embedder,
    G: AnswerGenerator,
{
    pub fn new(
        loader: L,
        embedder: E,
        generator: G,
        options: PipelineOptions,
    ) -> Result<Self, ConfigError> {
        options.validate()?;
        let config = ChunkingConfig::try_from(&options)?;

        Ok(Self {
            loader,
            embedder,
            generator,
            splitter: TextSplitter::new(config),
            retriever: ContextRetriever::new(options.top_k, options.retrieval_concurrency),
            distance: options.distance,
        })
    }

    pub async fn run(&self, request: &QaRequest) -> Result<AnswerSet, PipelineError> {
        request.validate()?;
        let span = info_span!(
            "qa_request",
            request_id = %Uuid::new_v4(),
            questions = request.questions.len()
        );

        async {
            let contexts = self.resolve_contexts(request).await?;
            let contexts: Vec<String> =
                contexts.into_iter().map(RetrievedContext::into_text).collect();
            let answers = self.generate(&contexts, &request.questions).await?;
            info!(answers = answers.answers.len(), "request answered");
            Ok::<_, PipelineError>(answers)
        }
        .instrument(span)
        .await
        .map_err(|failure: PipelineError| {
            error!(stage = ?failure.stage(), error = %failure, "request failed");
            failure
        })
    }

    /// Runs every stage up to retrieval and returns the per-question contexts.
    pub async fn contexts(
        &self,
        request: &QaRequest,
    ) -> Result<Vec<RetrievedContext>, PipelineError> {
        request.validate()?;
        self.resolve_contexts(request).await
    }

    async fn resolve_contexts(
        &self,
        request: &QaRequest,
    ) -> Result<Vec<RetrievedContext>, PipelineError> {
        let units = self.load(&request.documents).await?;
        let chunks = self.chunk(&units)?;
        let index = self.index(chunks).await?;
        Ok(self.retrieve(&request.questions, &index).await)
    }

    async fn load(&self, locator: &str) -> Result<Vec<TextUnit>, PipelineError> {
        let units = self.loader.load(locator).await?;
        if units.is_empty() {
            return Err(LoadError::EmptyDocument(locator.to_string()).into());
        }
        info!(stage = %Stage::Load, units = units.len(), "document loaded");
        Ok(units)
    }

    fn chunk(&self, units: &[TextUnit]) -> Result<Vec<Chunk>, PipelineError> {
        let chunks = self.splitter.split_units(units);
        if chunks.is_empty() {
            return Err(PipelineError::Segmentation);
        }
        info!(stage = %Stage::Chunk, chunk_count = chunks.len(), "document split");
        Ok(chunks)
    }

    async fn index(&self, chunks: Vec<Chunk>) -> Result<SimilarityIndex, PipelineError> {
        let index = SimilarityIndex::build(chunks, &self.embedder, self.distance).await?;
        info!(stage = %Stage::Index, entries = index.len(), "index ready");
        Ok(index)
    }

    async fn retrieve(
        &self,
        questions: &[String],
        index: &SimilarityIndex,
    ) -> Vec<RetrievedContext> {
        let contexts = self.retriever.retrieve(questions, index, &self.embedder).await;
        let failed = contexts
            .iter()
            .filter(|context| matches!(context, RetrievedContext::Failed(_)))
            .count();
        info!(stage = %Stage::Retrieve, questions = questions.len(), failed, "contexts resolved");
        contexts
    }

    async fn generate(
        &self,
        contexts: &[String],
        questions: &[String],
    ) -> Result<AnswerSet, PipelineError> {
        let answers = self.generator.generate(contexts, questions).await?;
        if answers.answers.len() != questions.len() {
            return Err(GenerationError::Misaligned {
                expected: questions.len(),
                actual: answers.answers.len(),
            }
            .into());
        }
        info!(stage = %Stage::Generate, "answers generated");
        Ok(answers)
    }
}
