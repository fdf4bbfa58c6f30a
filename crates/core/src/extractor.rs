use crate::error::LoadError;
use crate::models::TextUnit;
use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
struct LlmOcrRequest {
    pdf_base64: String,
    source_path: String,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrResponse {
    pages: Option<Vec<LlmOcrPage>>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrPage {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl OcrEndpointConfig {
    /// Reads `LLM_OCR_ENDPOINT` and `LLM_OCR_API_KEY`; `None` when no
    /// endpoint is configured.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("LLM_OCR_ENDPOINT").ok()?;
        let endpoint = endpoint.trim().to_string();
        if endpoint.is_empty() {
            return None;
        }

        let api_key = std::env::var("LLM_OCR_API_KEY").ok().and_then(|value| {
            let key = value.trim().to_string();
            if key.is_empty() {
                None
            } else {
                Some(key)
            }
        });

        Some(Self { endpoint, api_key })
    }
}

/// Decodes PDF bytes into one unit per page that carries text.
pub fn decode_pdf(bytes: &[u8], source_id: &str) -> Result<Vec<TextUnit>, LoadError> {
    let document =
        Document::load_mem(bytes).map_err(|error| LoadError::PdfParse(error.to_string()))?;

    let mut units = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| LoadError::PdfParse(error.to_string()))?;
        let text = tidy_page_text(&text)?;

        if !text.trim().is_empty() {
            units.push(TextUnit::new(source_id, page_no, text));
        }
    }

    if units.is_empty() {
        return Err(LoadError::PdfParse(format!(
            "pdf had no readable page text: {source_id}"
        )));
    }

    Ok(units)
}

/// Decodes with the text layer first and falls back to the OCR endpoint
/// when the PDF has none.
pub async fn extract_units(
    client: &Client,
    bytes: &[u8],
    source_id: &str,
    ocr: Option<&OcrEndpointConfig>,
) -> Result<Vec<TextUnit>, LoadError> {
    match decode_pdf(bytes, source_id) {
        Ok(units) => Ok(units),
        Err(LoadError::PdfParse(parse_error)) => {
            let Some(config) = ocr else {
                return Err(LoadError::PdfParse(parse_error));
            };
            warn!(source = source_id, error = %parse_error, "text layer unusable, trying OCR");
            match extract_with_llm_ocr(client, config, bytes, source_id).await {
                Ok(units) => Ok(units),
                Err(ocr_error) => Err(LoadError::OcrFailed(format!(
                    "{ocr_error} (text layer: {parse_error})"
                ))),
            }
        }
        Err(error) => Err(error),
    }
}

/// Collapses runs of horizontal whitespace and caps blank lines at one, so
/// paragraph breaks survive as `\n\n` for the splitter.
fn tidy_page_text(text: &str) -> Result<String, LoadError> {
    let horizontal = Regex::new(r"[ \t\u{a0}]+")?;
    let trailing = Regex::new(r" *\n *")?;
    let blank_lines = Regex::new(r"\n{3,}")?;

    let text = horizontal.replace_all(text, " ");
    let text = trailing.replace_all(&text, "\n");
    let text = blank_lines.replace_all(&text, "\n\n");
    Ok(text.trim().to_string())
}

async fn extract_with_llm_ocr(
    client: &Client,
    config: &OcrEndpointConfig,
    bytes: &[u8],
    source_id: &str,
) -> Result<Vec<TextUnit>, LoadError> {
    let payload = LlmOcrRequest {
        pdf_base64: STANDARD.encode(bytes),
        source_path: source_id.to_string(),
    };

    let mut request = client
        .post(&config.endpoint)
        .header("content-type", "application/json")
        .json(&payload);

    if let Some(api_key) = &config.api_key {
        request = request.bearer_auth(api_key);
    }

    let response = request.send().await?;

    if !response.status().is_success() {
        return Err(LoadError::OcrFailed(format!(
            "multimodal OCR request to {} returned {}",
            config.endpoint,
            response.status()
        )));
    }

    let payload: LlmOcrResponse = response.json().await?;
    let units = payload_to_units(&payload, source_id)?;
    info!(source = source_id, pages = units.len(), "OCR fallback produced text");
    Ok(units)
}

fn payload_to_units(payload: &LlmOcrResponse, source_id: &str) -> Result<Vec<TextUnit>, LoadError> {
    if let Some(listed) = &payload.pages {
        let listed = listed
            .iter()
            .filter_map(|page| {
                let text = page.text.as_ref().map(|value| value.trim().to_string());
                text.and_then(|normalized| {
                    if normalized.is_empty() {
                        None
                    } else {
                        Some(TextUnit::new(source_id, page.page.unwrap_or(1), normalized))
                    }
                })
            })
            .collect::<Vec<_>>();

        if !listed.is_empty() {
            return Ok(listed);
        }
    }

    if let Some(raw_text) = &payload.text {
        let units = raw_text
            .split('\u{000c}')
            .enumerate()
            .filter_map(|(index, page)| {
                let normalized = page.trim().to_string();
                if normalized.is_empty() {
                    None
                } else {
                    Some(TextUnit::new(source_id, (index + 1) as u32, normalized))
                }
            })
            .collect::<Vec<_>>();

        if !units.is_empty() {
            return Ok(units);
        }
    }

    Err(LoadError::OcrFailed(format!(
        "multimodal OCR response was empty for {source_id}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ocr_payload_with_pages_converts_only_nonempty_text() {
        let response = LlmOcrResponse {
            pages: Some(vec![
                LlmOcrPage {
                    page: Some(2),
                    text: Some("  ".to_string()),
                },
                LlmOcrPage {
                    page: Some(3),
                    text: Some("Page 3".to_string()),
                },
            ]),
            text: None,
        };

        let units =
            payload_to_units(&response, "x.pdf").expect("multimodal response should be parsed");

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].page, 3);
        assert_eq!(units[0].text, "Page 3");
        assert_eq!(units[0].source_id, "x.pdf");
    }

    #[test]
    fn ocr_payload_fallback_text_split_by_form_feed() {
        let response = LlmOcrResponse {
            pages: None,
            text: Some("First\u{000C}Second\n".to_string()),
        };

        let units =
            payload_to_units(&response, "x.pdf").expect("multimodal response should be parsed");

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].page, 1);
        assert_eq!(units[0].text, "First");
        assert_eq!(units[1].page, 2);
        assert_eq!(units[1].text, "Second");
    }

    #[test]
    fn page_text_keeps_paragraph_breaks() {
        let raw = "Section  1\t Definitions \n\n\n\nHospital  means\n any institution";
        let tidy = tidy_page_text(raw).expect("regexes compile");
        assert_eq!(tidy, "Section 1 Definitions\n\nHospital means\nany institution");
    }

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        let result = decode_pdf(b"%PDF-1.4\n%broken", "broken.pdf");
        assert!(matches!(result, Err(LoadError::PdfParse(_))));
    }

    #[tokio::test]
    async fn parse_error_without_ocr_is_returned_unchanged() {
        let client = Client::new();
        let result = extract_units(&client, b"not a pdf", "x.pdf", None).await;
        assert!(matches!(result, Err(LoadError::PdfParse(_))));
    }
}
