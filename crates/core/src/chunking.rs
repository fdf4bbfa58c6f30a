use crate::error::ConfigError;
use crate::models::{Chunk, PipelineOptions, TextUnit};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Break points tried in priority order. A window is cut after the last
/// separator of the highest level that still leaves room for the overlap;
/// when no level matches, the window is cut at a character boundary.
const SEPARATOR_LEVELS: &[&[&str]] = &[
    &["\n\n"],
    &["\n"],
    &[". ", "? ", "! ", ".\t", "?\t", "!\t"],
    &[" ", "\t"],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

impl TryFrom<&PipelineOptions> for ChunkingConfig {
    type Error = ConfigError;

    fn try_from(value: &PipelineOptions) -> Result<Self, Self::Error> {
        Self::new(value.chunk_size, value.chunk_overlap)
    }
}

/// A piece of a single text, with its character offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub char_start: usize,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: ChunkingConfig,
}

impl TextSplitter {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Splits one text into windows of at most `chunk_size` characters.
    ///
    /// Consecutive windows share exactly `chunk_overlap` characters. The end
    /// of every window except the last falls right after a separator when one
    /// exists far enough into the window.
    pub fn split_text(&self, text: &str) -> Vec<Span> {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let ChunkingConfig {
            chunk_size,
            chunk_overlap,
        } = self.config;

        let mut spans = Vec::new();
        let mut start = 0usize;

        loop {
            if chars.len() - start <= chunk_size {
                spans.push(span(&chars, start, chars.len()));
                break;
            }

            let window = &chars[start..start + chunk_size];
            // the cut has to land past the overlap or the next window would not advance
            let min_cut = chunk_overlap + 1;
            let cut = find_break(window, min_cut, SEPARATOR_LEVELS).unwrap_or(chunk_size);
            let end = start + cut;

            spans.push(span(&chars, start, end));
            start = end - chunk_overlap;
        }

        spans
    }

    /// Splits every unit in document order. Blank units contribute nothing and
    /// overlap never crosses a unit boundary.
    pub fn split_units(&self, units: &[TextUnit]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut position = 0u64;

        for unit in units {
            if unit.text.trim().is_empty() {
                debug!(source = %unit.source_id, page = unit.page, "skipping blank unit");
                continue;
            }

            for piece in self.split_text(&unit.text) {
                chunks.push(Chunk {
                    chunk_id: make_chunk_id(&unit.source_id, unit.page, position, &piece.text),
                    source_id: unit.source_id.clone(),
                    page: unit.page,
                    position,
                    char_start: piece.char_start,
                    text: piece.text,
                });
                position = position.saturating_add(1);
            }
        }

        chunks
    }
}

fn span(chars: &[char], start: usize, end: usize) -> Span {
    Span {
        char_start: start,
        text: chars[start..end].iter().collect(),
    }
}

fn find_break(window: &[char], min_cut: usize, levels: &[&[&str]]) -> Option<usize> {
    let (level, rest) = levels.split_first()?;
    last_separator_end(window, min_cut, level).or_else(|| find_break(window, min_cut, rest))
}

/// Largest `cut` in `min_cut..=window.len()` such that `window[..cut]` ends
/// with one of `separators`.
fn last_separator_end(window: &[char], min_cut: usize, separators: &[&str]) -> Option<usize> {
    (min_cut..=window.len())
        .rev()
        .find(|&cut| separators.iter().any(|sep| ends_with(&window[..cut], sep)))
}

fn ends_with(chars: &[char], separator: &str) -> bool {
    let sep_len = separator.chars().count();
    if chars.len() < sep_len {
        return false;
    }
    chars[chars.len() - sep_len..]
        .iter()
        .copied()
        .eq(separator.chars())
}

fn make_chunk_id(source_id: &str, page: u32, position: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(position.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
