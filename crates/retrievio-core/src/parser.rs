//! Document parsing boundary.
//!
//! The pipeline consumes parsed text through [`DocumentParser`] and never
//! decodes formats itself. [`TextParser`] covers plain text and markdown;
//! richer formats plug in behind the same trait.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::types::RawText;

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unsupported format: {0}")]
    Unsupported(String),

    #[error("corrupt document: {0}")]
    Corrupt(String),

    #[error("unreadable: {0}")]
    Unreadable(#[from] std::io::Error),

    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),
}

pub trait DocumentParser: Send + Sync {
    fn parse(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn Future<Output = Result<RawText, ParseError>> + Send + '_>>;

    fn supported_extensions(&self) -> &[&str];

    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.supported_extensions()
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(ext))
            })
    }
}

/// Plain text and markdown parser.
pub struct TextParser {
    pub max_file_size: u64,
}

impl Default for TextParser {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentParser for TextParser {
    fn parse(
        &self,
        path: &Path,
    ) -> Pin<Box<dyn Future<Output = Result<RawText, ParseError>> + Send + '_>> {
        let path = path.to_path_buf();
        let max_size = self.max_file_size;
        Box::pin(async move {
            let meta = tokio::fs::metadata(&path).await?;
            if meta.len() > max_size {
                return Err(ParseError::FileTooLarge(meta.len()));
            }

            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            let content_type = match ext {
                "md" | "markdown" => "text/markdown",
                "txt" | "text" => "text/plain",
                other => return Err(ParseError::Unsupported(other.to_string())),
            };

            let bytes = tokio::fs::read(&path).await?;
            let text = String::from_utf8(bytes)
                .map_err(|e| ParseError::Corrupt(format!("invalid UTF-8: {e}")))?;

            Ok(RawText {
                text,
                content_type: content_type.to_owned(),
            })
        })
    }

    fn supported_extensions(&self) -> &[&str] {
        &["txt", "text", "md", "markdown"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parse_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("note.txt");
        std::fs::write(&file, "hello world").unwrap();

        let raw = TextParser::default().parse(&file).await.unwrap();
        assert_eq!(raw.text, "hello world");
        assert_eq!(raw.content_type, "text/plain");
    }

    #[tokio::test]
    async fn parse_markdown_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("readme.md");
        std::fs::write(&file, "# Title").unwrap();

        let raw = TextParser::default().parse(&file).await.unwrap();
        assert_eq!(raw.content_type, "text/markdown");
    }

    #[tokio::test]
    async fn parse_nonexistent_file_unreadable() {
        let result = TextParser::default()
            .parse(Path::new("/nonexistent/file.txt"))
            .await;
        assert!(matches!(result, Err(ParseError::Unreadable(_))));
    }

    #[tokio::test]
    async fn parse_unknown_extension_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("image.png");
        std::fs::write(&file, [0u8, 1, 2]).unwrap();

        let result = TextParser::default().parse(&file).await;
        assert!(matches!(result, Err(ParseError::Unsupported(_))));
    }

    #[tokio::test]
    async fn parse_invalid_utf8_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.txt");
        std::fs::write(&file, [0xff, 0xfe, 0xfd]).unwrap();

        let result = TextParser::default().parse(&file).await;
        assert!(matches!(result, Err(ParseError::Corrupt(_))));
    }

    #[tokio::test]
    async fn file_too_large_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.txt");
        std::fs::write(&file, "x").unwrap();

        let parser = TextParser { max_file_size: 0 };
        let result = parser.parse(&file).await;
        assert!(matches!(result, Err(ParseError::FileTooLarge(_))));
    }

    #[tokio::test]
    async fn parse_empty_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("empty.txt");
        std::fs::write(&file, "").unwrap();

        let raw = TextParser::default().parse(&file).await.unwrap();
        assert!(raw.text.is_empty());
    }

    #[test]
    fn supports_by_extension() {
        let parser = TextParser::default();
        assert!(parser.supports(Path::new("a.txt")));
        assert!(parser.supports(Path::new("a.MD")));
        assert!(!parser.supports(Path::new("a.pdf")));
        assert!(!parser.supports(Path::new("no_extension")));
    }
}
