//! Markdown and plain-text pass-through.

use tracing::debug;

use crate::extraction::{CanonicalText, ExtractError, PDF_MAGIC, ZIP_MAGIC};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

pub fn extract(bytes: &[u8]) -> Result<CanonicalText, ExtractError> {
    if bytes.starts_with(PDF_MAGIC) || bytes.starts_with(ZIP_MAGIC) {
        return Err(ExtractError::CorruptInput(
            "declared as text but the content is a binary document container".to_string(),
        ));
    }

    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let decoded = match std::str::from_utf8(body) {
        Ok(s) => s.to_string(),
        Err(_) => {
            debug!("Input is not valid UTF-8, decoding as Latin-1");
            body.iter().map(|&b| b as char).collect()
        }
    };

    if decoded.contains('\0') {
        return Err(ExtractError::CorruptInput(
            "text input contains NUL bytes".to_string(),
        ));
    }

    Ok(CanonicalText::new(normalize_newlines(&decoded), Vec::new()))
}

/// Converts `\r\n` and lone `\r` line endings to `\n`.
pub(crate) fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_bom_and_normalizes_newlines() {
        let canonical = extract(b"\xEF\xBB\xBFJane Smith\r\nEngineer\rRemote\n").unwrap();
        assert_eq!(canonical.text(), "Jane Smith\nEngineer\nRemote\n");
        assert!(canonical.links().is_empty());
    }

    #[test]
    fn test_markdown_is_not_parsed() {
        let canonical = extract(b"# Jane\n- [site](https://example.com)").unwrap();
        assert_eq!(canonical.text(), "# Jane\n- [site](https://example.com)");
    }

    #[test]
    fn test_latin1_fallback() {
        // "Jos\xe9" is Latin-1 for "José" and invalid as UTF-8.
        let canonical = extract(b"Jos\xe9 Garc\xeda").unwrap();
        assert_eq!(canonical.text(), "José García");
    }

    #[test]
    fn test_rejects_binary_container_declared_as_text() {
        assert!(matches!(
            extract(b"PK\x03\x04rest-of-zip"),
            Err(ExtractError::CorruptInput(_))
        ));
        assert!(matches!(
            extract(b"%PDF-1.7\n..."),
            Err(ExtractError::CorruptInput(_))
        ));
    }

    #[test]
    fn test_rejects_nul_bytes() {
        assert!(matches!(
            extract(b"abc\0def"),
            Err(ExtractError::CorruptInput(_))
        ));
    }
}
