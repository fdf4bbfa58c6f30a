use crate::error::LoadError;
use crate::extractor::{extract_units, OcrEndpointConfig};
use crate::models::TextUnit;
use crate::traits::DocumentLoader;
use async_trait::async_trait;
use reqwest::Client;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Where a locator points once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    Remote(Url),
    Local(PathBuf),
}

impl DocumentSource {
    pub fn parse(locator: &str) -> Result<Self, LoadError> {
        let locator = locator.trim();
        if locator.is_empty() {
            return Err(LoadError::UnsupportedLocator("empty locator".to_string()));
        }

        match Url::parse(locator) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(DocumentSource::Remote(url)),
                "file" => url
                    .to_file_path()
                    .map(DocumentSource::Local)
                    .map_err(|_| LoadError::UnsupportedLocator(locator.to_string())),
                other => Err(LoadError::UnsupportedLocator(format!(
                    "scheme {other} in {locator}"
                ))),
            },
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Ok(DocumentSource::Local(PathBuf::from(locator)))
            }
            Err(error) => Err(LoadError::Url(error)),
        }
    }

    /// File name of the document with any query string dropped.
    pub fn source_id(&self) -> String {
        let name = match self {
            DocumentSource::Remote(url) => url
                .path_segments()
                .and_then(|segments| segments.last())
                .filter(|segment| !segment.is_empty())
                .map(str::to_string),
            DocumentSource::Local(path) => file_name(path),
        };
        name.unwrap_or_else(|| "document.pdf".to_string())
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}

/// Fetches a PDF over HTTP(S) or from disk and decodes it page by page.
#[derive(Debug, Clone, Default)]
pub struct PdfUrlLoader {
    client: Client,
    ocr: Option<OcrEndpointConfig>,
}

impl PdfUrlLoader {
    pub fn new(client: Client) -> Self {
        Self { client, ocr: None }
    }

    pub fn with_ocr(mut self, ocr: Option<OcrEndpointConfig>) -> Self {
        self.ocr = ocr;
        self
    }

    async fn fetch(&self, source: &DocumentSource) -> Result<Vec<u8>, LoadError> {
        match source {
            DocumentSource::Remote(url) => {
                let response = self.client.get(url.clone()).send().await?;
                if !response.status().is_success() {
                    return Err(LoadError::Download {
                        locator: url.to_string(),
                        status: response.status().to_string(),
                    });
                }
                Ok(response.bytes().await?.to_vec())
            }
            DocumentSource::Local(path) => Ok(tokio::fs::read(path).await?),
        }
    }
}

#[async_trait]
impl DocumentLoader for PdfUrlLoader {
    async fn load(&self, locator: &str) -> Result<Vec<TextUnit>, LoadError> {
        let source = DocumentSource::parse(locator)?;
        let source_id = source.source_id();

        let bytes = self.fetch(&source).await?;
        debug!(source = %source_id, bytes = bytes.len(), "document fetched");

        let units = extract_units(&self.client, &bytes, &source_id, self.ocr.as_ref()).await?;
        if units.is_empty() {
            return Err(LoadError::EmptyDocument(source_id));
        }

        info!(source = %source_id, pages = units.len(), "document loaded");
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn remote_source_id_ignores_query_string() -> Result<(), Box<dyn std::error::Error>> {
        let source = DocumentSource::parse(
            "https://hackrx.blob.core.windows.net/assets/policy.pdf?sv=2023-01-03&sig=abc%3D",
        )?;
        assert!(matches!(source, DocumentSource::Remote(_)));
        assert_eq!(source.source_id(), "policy.pdf");
        Ok(())
    }

    #[test]
    fn bare_paths_are_local() -> Result<(), Box<dyn std::error::Error>> {
        let source = DocumentSource::parse("docs/policy.pdf")?;
        assert_eq!(source, DocumentSource::Local(PathBuf::from("docs/policy.pdf")));
        assert_eq!(source.source_id(), "policy.pdf");
        Ok(())
    }

    #[test]
    fn unsupported_schemes_are_rejected() {
        assert!(matches!(
            DocumentSource::parse("ftp://example.com/policy.pdf"),
            Err(LoadError::UnsupportedLocator(_))
        ));
        assert!(matches!(
            DocumentSource::parse("   "),
            Err(LoadError::UnsupportedLocator(_))
        ));
    }

    #[tokio::test]
    async fn missing_local_file_is_io_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("absent.pdf");
        let result = PdfUrlLoader::default()
            .load(&path.to_string_lossy())
            .await;
        assert!(matches!(result, Err(LoadError::Io(_))));
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_local_pdf_is_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("unreadable.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = PdfUrlLoader::default()
            .load(&path.to_string_lossy())
            .await;
        assert!(matches!(result, Err(LoadError::PdfParse(_))));
        Ok(())
    }
}
