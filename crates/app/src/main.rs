mod backends;
mod server;

use std::time::Duration;

use anyhow::Context;
use backends::{AppEmbedder, AppGenerator};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use docqa_core::providers::gemini::{
    DEFAULT_BASE_URL, DEFAULT_EMBEDDING_MODEL, DEFAULT_GEMINI_DIMENSIONS, DEFAULT_GENERATION_MODEL,
};
use docqa_core::{
    CharacterNgramEmbedder, DistanceMetric, GeminiAnswerGenerator, GeminiConfig, GeminiEmbedder,
    OcrEndpointConfig, PdfUrlLoader, PipelineOptions, QaPipeline, QaRequest, RetrievedContext,
};
use server::{run_server, AppState};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type Pipeline = QaPipeline<PdfUrlLoader, AppEmbedder, AppGenerator>;

#[derive(Parser)]
#[command(name = "docqa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Google Generative Language API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    google_api_key: Option<String>,

    /// Gemini API base URL
    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    gemini_base_url: String,

    /// Embedding model name
    #[arg(long, default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Output size of the embedding model
    #[arg(long, default_value_t = DEFAULT_GEMINI_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Answer generation model name
    #[arg(long, default_value = DEFAULT_GENERATION_MODEL)]
    generation_model: String,

    /// Where chunk and question vectors come from.
    #[arg(long, value_enum, default_value_t = EmbedderKind::Gemini)]
    embedder: EmbedderKind,

    /// Where answers come from.
    #[arg(long, value_enum, default_value_t = GeneratorKind::Gemini)]
    generator: GeneratorKind,

    /// Maximum chunk length in characters.
    #[arg(long, env = "DOCQA_CHUNK_SIZE", default_value_t = 500)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks.
    #[arg(long, env = "DOCQA_CHUNK_OVERLAP", default_value_t = 50)]
    chunk_overlap: usize,

    /// Chunks retrieved per question.
    #[arg(long, env = "DOCQA_TOP_K", default_value_t = 3)]
    top_k: usize,

    /// Questions retrieved concurrently.
    #[arg(long, default_value_t = 4)]
    retrieval_concurrency: usize,

    /// Distance used to rank chunks.
    #[arg(long, value_enum, default_value_t = DistanceArg::L2)]
    distance: DistanceArg,
}

#[derive(Subcommand)]
enum Command {
    /// Answer questions about one PDF and print the answers as JSON.
    Ask {
        /// PDF URL or local path.
        #[arg(long)]
        document: String,
        /// Question to answer, repeat for several.
        #[arg(long = "question", required = true)]
        questions: Vec<String>,
        /// Print the retrieved context per question instead of answers.
        #[arg(long, default_value_t = false)]
        contexts_only: bool,
    },
    /// Serve the question answering endpoint over HTTP.
    Serve {
        /// Socket address to listen on.
        #[arg(long, env = "DOCQA_BIND", default_value = "0.0.0.0:8000")]
        bind: String,
        /// Token expected in `Authorization: Bearer <token>`.
        #[arg(long, env = "DOCQA_BEARER_TOKEN", hide_env_values = true)]
        bearer_token: String,
        /// Upper bound for one request, 0 disables it.
        #[arg(long, env = "DOCQA_REQUEST_TIMEOUT_SECS", default_value_t = 120)]
        request_timeout_secs: u64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EmbedderKind {
    Gemini,
    Ngram,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GeneratorKind {
    Gemini,
    Echo,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DistanceArg {
    L2,
    Cosine,
}

impl From<DistanceArg> for DistanceMetric {
    fn from(value: DistanceArg) -> Self {
        match value {
            DistanceArg::L2 => DistanceMetric::L2,
            DistanceArg::Cosine => DistanceMetric::Cosine,
        }
    }
}

impl Cli {
    fn gemini_config(&self) -> anyhow::Result<GeminiConfig> {
        let api_key = self
            .google_api_key
            .clone()
            .context("GOOGLE_API_KEY is required for the gemini backends")?;
        let mut config = GeminiConfig::new(api_key);
        config.base_url = self.gemini_base_url.clone();
        config.embedding_model = self.embedding_model.clone();
        config.generation_model = self.generation_model.clone();
        config.dimensions = self.embedding_dimensions;
        Ok(config)
    }

    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            top_k: self.top_k,
            retrieval_concurrency: self.retrieval_concurrency,
            distance: self.distance.into(),
        }
    }

    fn build_pipeline(&self, generator: GeneratorKind) -> anyhow::Result<Pipeline> {
        let client = reqwest::Client::new();

        let ocr = OcrEndpointConfig::from_env();
        if ocr.is_none() {
            warn!("LLM_OCR_ENDPOINT not set, scanned PDFs will fail to load");
        }
        let loader = PdfUrlLoader::new(client.clone()).with_ocr(ocr);

        let embedder = match self.embedder {
            EmbedderKind::Ngram => AppEmbedder::Ngram(CharacterNgramEmbedder::default()),
            EmbedderKind::Gemini => {
                AppEmbedder::Gemini(GeminiEmbedder::new(client.clone(), self.gemini_config()?)?)
            }
        };

        let generator = match generator {
            GeneratorKind::Echo => AppGenerator::Echo,
            GeneratorKind::Gemini => {
                AppGenerator::Gemini(GeminiAnswerGenerator::new(client, self.gemini_config()?)?)
            }
        };

        Ok(QaPipeline::new(loader, embedder, generator, self.options())?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "docqa boot"
    );

    match &cli.command {
        Command::Ask {
            document,
            questions,
            contexts_only,
        } => {
            let request = QaRequest {
                documents: document.clone(),
                questions: questions.clone(),
            };

            if *contexts_only {
                let pipeline = cli.build_pipeline(GeneratorKind::Echo)?;
                let contexts = pipeline.contexts(&request).await?;
                let contexts: Vec<String> =
                    contexts.into_iter().map(RetrievedContext::into_text).collect();
                println!("{}", serde_json::to_string_pretty(&json!({ "contexts": contexts }))?);
            } else {
                let pipeline = cli.build_pipeline(cli.generator)?;
                let answers = pipeline.run(&request).await?;
                println!("{}", serde_json::to_string_pretty(&answers)?);
            }
        }
        Command::Serve {
            bind,
            bearer_token,
            request_timeout_secs,
        } => {
            let pipeline = cli.build_pipeline(cli.generator)?;
            let request_timeout =
                (*request_timeout_secs > 0).then(|| Duration::from_secs(*request_timeout_secs));
            let state = AppState::new(pipeline, bearer_token, request_timeout)?;
            run_server(bind, state).await?;
        }
    }

    Ok(())
}
