pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod loader;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod retriever;
pub mod traits;

pub use chunking::{ChunkingConfig, Span, TextSplitter};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{
    ConfigError, EmbeddingError, GenerationError, IndexError, LoadError, PipelineError,
    RequestError, SearchError,
};
pub use extractor::{decode_pdf, OcrEndpointConfig};
pub use index::SimilarityIndex;
pub use loader::{DocumentSource, PdfUrlLoader};
pub use models::{
    AnswerSet, Chunk, DistanceMetric, PipelineOptions, QaRequest, RetrievedContext, SearchHit,
    Stage, TextUnit, NOT_MENTIONED_SENTINEL, NO_CONTEXT_PLACEHOLDER, RETRIEVAL_ERROR_PLACEHOLDER,
};
pub use orchestrator::QaPipeline;
pub use providers::{GeminiAnswerGenerator, GeminiConfig, GeminiEmbedder};
pub use retriever::{ContextRetriever, DEFAULT_TOP_K};
pub use traits::{AnswerGenerator, DocumentLoader};
