//! Text extraction from uploaded documents.
//!
//! Paginated formats (PDF) yield one unit per non-empty page; everything
//! else yields a single unit with index 0.

use crate::types::TextUnit;
use arag_core::{AppError, AppResult};
use regex::Regex;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

/// Supported document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Text,
    Html,
}

impl DocumentKind {
    /// Classify by lowercased extension. Unknown extensions are rejected.
    pub fn from_path(path: &Path) -> AppResult<Self> {
        let ext = file_extension(path);
        match ext.as_str() {
            ".pdf" => Ok(Self::Pdf),
            ".docx" => Ok(Self::Docx),
            ".txt" | ".md" => Ok(Self::Text),
            ".html" | ".htm" => Ok(Self::Html),
            _ => Err(AppError::UnsupportedFileType(ext)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Text => "text",
            Self::Html => "html",
        }
    }
}

/// Lowercased extension including the leading dot, or `""` when absent.
pub fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Extract ordered text units from a file on disk.
pub fn extract_text_units(path: &Path) -> AppResult<Vec<TextUnit>> {
    let kind = DocumentKind::from_path(path)?;
    let bytes = fs::read(path)
        .map_err(|e| AppError::Knowledge(format!("Failed to read {:?}: {}", path, e)))?;

    tracing::debug!("Extracting {} from {:?} ({} bytes)", kind.as_str(), path, bytes.len());

    match kind {
        DocumentKind::Pdf => extract_pdf(&bytes),
        DocumentKind::Docx => Ok(single_unit(extract_docx(&bytes)?)),
        DocumentKind::Text => Ok(single_unit(
            String::from_utf8_lossy(&bytes).trim().to_string(),
        )),
        DocumentKind::Html => Ok(single_unit(clean_html(&String::from_utf8_lossy(&bytes)))),
    }
}

fn single_unit(text: String) -> Vec<TextUnit> {
    vec![TextUnit::new(0, text)]
}

fn extract_pdf(bytes: &[u8]) -> AppResult<Vec<TextUnit>> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| AppError::Knowledge(format!("Failed to load PDF: {}", e)))?;

    let mut units = Vec::new();
    for (i, page_num) in doc.get_pages().keys().enumerate() {
        let text = match doc.extract_text(&[*page_num]) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to extract text from page {}: {}", page_num, e);
                continue;
            }
        };

        let text = text.trim();
        if !text.is_empty() {
            units.push(TextUnit::new(i, text));
        }
    }

    Ok(units)
}

fn extract_docx(bytes: &[u8]) -> AppResult<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| AppError::Knowledge(format!("Failed to open DOCX archive: {}", e)))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| AppError::Knowledge(format!("DOCX has no document body: {}", e)))?
        .read_to_string(&mut xml)?;

    let paragraphs: Vec<String> = paragraph_regex()
        .find_iter(&xml)
        .map(|m| docx_paragraph_text(m.as_str()))
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();

    Ok(paragraphs.join("\n"))
}

fn paragraph_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<w:p[ >].*?</w:p>|<w:p/>").expect("valid regex"))
}

fn run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:tab\s*/>|<w:br\s*/>").expect("valid regex")
    })
}

/// Concatenate the text runs of one `<w:p>` element.
fn docx_paragraph_text(paragraph: &str) -> String {
    let mut text = String::new();
    for caps in run_regex().captures_iter(paragraph) {
        match caps.get(1) {
            Some(run) => text.push_str(&decode_entities(run.as_str())),
            None if caps[0].starts_with("<w:tab") => text.push('\t'),
            None => text.push('\n'),
        }
    }
    text
}

fn entity_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid regex"))
}

/// Decode the XML/HTML character references that show up in practice.
/// Unknown named entities are left as-is.
fn decode_entities(text: &str) -> String {
    entity_regex()
        .replace_all(text, |caps: &regex::Captures| {
            let name = &caps[1];
            let decoded = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match name {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    _ => None,
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

const SKIPPED_HTML_ELEMENTS: [&str; 3] = ["script", "style", "noscript"];

/// Strip markup, dropping script/style/noscript bodies. Every tag boundary
/// becomes a line break; lines are trimmed and blank lines removed.
fn clean_html(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    let mut text = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(offset) = lower[pos..].find('<') {
        let start = pos + offset;
        text.push_str(&html[pos..start]);

        let opens_tag = lower[start + 1..]
            .chars()
            .next()
            .is_some_and(|c| c == '!' || c == '/' || c.is_ascii_alphabetic());
        if !opens_tag {
            text.push('<');
            pos = start + 1;
            continue;
        }

        if lower[start..].starts_with("<!--") {
            pos = match lower[start..].find("-->") {
                Some(end) => start + end + 3,
                None => html.len(),
            };
            text.push('\n');
            continue;
        }

        let Some(end) = lower[start..].find('>') else {
            // Unterminated tag: keep the remainder as text
            pos = start;
            break;
        };
        let tag = &lower[start + 1..start + end];
        pos = start + end + 1;
        text.push('\n');

        let name = tag
            .split(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or_default();
        if !tag.starts_with('/') && !tag.ends_with('/') && SKIPPED_HTML_ELEMENTS.contains(&name) {
            let closing = format!("</{}", name);
            pos = match lower[pos..].find(&closing) {
                Some(close) => pos + close,
                None => html.len(),
            };
        }
    }
    text.push_str(&html[pos..]);

    decode_entities(&text)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    fn docx_bytes(body: &str) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            zip.start_file("word/document.xml", options).unwrap();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document><w:body>{}</w:body></w:document>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn test_kind_from_extension_is_case_insensitive() {
        assert_eq!(DocumentKind::from_path(Path::new("a.PDF")).unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_path(Path::new("a.Md")).unwrap(), DocumentKind::Text);
        assert_eq!(DocumentKind::from_path(Path::new("a.htm")).unwrap(), DocumentKind::Html);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = DocumentKind::from_path(Path::new("sheet.xlsx")).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported file type: .xlsx");
    }

    #[test]
    fn test_text_file_is_trimmed_single_unit() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "notes.txt", b"\n  hello world  \n\n");
        let units = extract_text_units(&path).unwrap();
        assert_eq!(units, vec![TextUnit::new(0, "hello world")]);
    }

    #[test]
    fn test_text_file_invalid_utf8_is_lossy() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "notes.md", b"ok \xff bytes");
        let units = extract_text_units(&path).unwrap();
        assert!(units[0].text.starts_with("ok "));
        assert!(units[0].text.ends_with(" bytes"));
    }

    #[test]
    fn test_clean_html_drops_scripts_and_blank_lines() {
        let html = "<html><head><title>T</title><style>p{}</style></head>\
                    <body><script type=\"x\">var a = 1;</script>\
                    <p>First &amp; foremost</p>\n\n<noscript>nope</noscript><div>  Second  </div>\
                    <!-- hidden --></body></html>";
        assert_eq!(clean_html(html), "T\nFirst & foremost\nSecond");
    }

    #[test]
    fn test_clean_html_uppercase_tags() {
        assert_eq!(clean_html("<SCRIPT>x</SCRIPT><P>Hi</P>"), "Hi");
    }

    #[test]
    fn test_clean_html_keeps_bare_angle_brackets() {
        assert_eq!(
            clean_html("<p>a < b and c > d</p><p>x <3 y</p>"),
            "a < b and c > d\nx <3 y"
        );
    }

    #[test]
    fn test_docx_paragraphs_joined_by_newline() {
        let dir = TempDir::new().unwrap();
        let body = "<w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space=\"preserve\"> world</w:t></w:r></w:p>\
                    <w:p><w:r><w:t>   </w:t></w:r></w:p>\
                    <w:p/>\
                    <w:p w:rsidR=\"1\"><w:r><w:t>A &lt; B</w:t></w:r></w:p>";
        let path = write(&dir, "report.docx", &docx_bytes(body));
        let units = extract_text_units(&path).unwrap();
        assert_eq!(units, vec![TextUnit::new(0, "Hello world\nA < B")]);
    }

    #[test]
    fn test_corrupt_pdf_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "broken.pdf", b"not a pdf");
        assert!(extract_text_units(&path).is_err());
    }

    #[test]
    fn test_decode_numeric_entities() {
        assert_eq!(decode_entities("&#65;&#x42;&unknown;"), "AB&unknown;");
    }
}
