pub mod gemini;

pub use gemini::{GeminiAnswerGenerator, GeminiConfig, GeminiEmbedder};
