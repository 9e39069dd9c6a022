use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Read a catalog document from disk.
///
/// Any file name is accepted (`.html`, `.xhtml`, no extension); the content
/// must be UTF-8 text containing markup.
pub async fn read_catalog(path: &Path) -> Result<String> {
    let bytes = fs::read(path)
        .await
        .context(format!("Failed to read catalog: {:?}", path))?;
    let content = String::from_utf8(bytes)
        .context(format!("Catalog is not UTF-8 text: {:?}", path))?;

    if !has_markup(&content) {
        anyhow::bail!("Catalog does not look like HTML: {:?}", path);
    }

    debug!(path = ?path, bytes = content.len(), "Read catalog");
    Ok(content)
}

fn has_markup(content: &str) -> bool {
    content
        .find('<')
        .is_some_and(|open| content[open..].contains('>'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body><div class="courseblock"></div></body></html>"#;

    #[tokio::test]
    async fn test_reads_html_regardless_of_extension() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["cs_courses.html", "cs_courses.xhtml", "cs_courses"] {
            let path = dir.path().join(name);
            std::fs::write(&path, PAGE).unwrap();

            assert_eq!(read_catalog(&path).await.unwrap(), PAGE);
        }
    }

    #[tokio::test]
    async fn test_rejects_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cs_courses.html");
        std::fs::write(&path, "CS 101. Intro to Computing. 3 hours.").unwrap();

        let err = read_catalog(&path).await.unwrap_err();
        assert!(err.to_string().contains("does not look like HTML"));
    }

    #[tokio::test]
    async fn test_rejects_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.pdf");
        std::fs::write(&path, [0x25, 0x50, 0x44, 0x46, 0xff, 0xfe]).unwrap();

        assert!(read_catalog(&path).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let result = read_catalog(Path::new("/nonexistent/cs_courses.html")).await;
        assert!(result.is_err());
    }
}
