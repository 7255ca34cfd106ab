//! Multi-format document loading (plain text, PDF, DOCX).
//!
//! Callers supply raw bytes plus the original filename; the extension
//! selects the decoder and the result is plain UTF-8 text ready for
//! clause segmentation.

use std::io::Read;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb
/// protection for DOCX archives).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unsupported file format: .{0}")]
    UnsupportedFormat(String),
    #[error("failed to decode {0}: {1}")]
    Decode(&'static str, String),
}

/// Decode a document into plain text based on its filename extension.
pub fn load(bytes: &[u8], filename: &str) -> Result<String, LoadError> {
    let extension = filename
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_lowercase();

    match extension.as_str() {
        "txt" => Ok(load_txt(bytes)),
        "pdf" => load_pdf(bytes),
        "docx" => load_docx(bytes),
        _ => Err(LoadError::UnsupportedFormat(extension)),
    }
}

/// UTF-8 with a Latin-1 fallback for legacy exports.
fn load_txt(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn load_pdf(bytes: &[u8]) -> Result<String, LoadError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| LoadError::Decode("pdf", e.to_string()))
}

/// DOCX is a ZIP archive; the body lives in `word/document.xml`. Each
/// `w:p` paragraph becomes one output line so numbered clause headings
/// stay on their own lines for the segmenter.
fn load_docx(bytes: &[u8]) -> Result<String, LoadError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive =
        zip::ZipArchive::new(cursor).map_err(|e| LoadError::Decode("docx", e.to_string()))?;

    let xml = {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|e| LoadError::Decode("docx", e.to_string()))?;
        let mut out = Vec::new();
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut out)
            .map_err(|e| LoadError::Decode("docx", e.to_string()))?;
        if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
            return Err(LoadError::Decode(
                "docx",
                format!("document.xml exceeds size limit ({} bytes)", MAX_XML_ENTRY_BYTES),
            ));
        }
        out
    };

    extract_docx_text(&xml)
}

fn extract_docx_text(xml: &[u8]) -> Result<String, LoadError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut out = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| LoadError::Decode("docx", e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"p" => {
                out.push('\n');
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(LoadError::Decode("docx", e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}
