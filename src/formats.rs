//! Requestable artifact formats and parsing of comma-separated format lists.

use thiserror::Error;

/// One ebook format the remote cache can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatRequest {
    Epub,
    Mobi,
    Pdf,
    /// HTML bundle, delivered by the API as a ready-made zip.
    HtmlZip,
}

/// Error for an unrecognized format name in `--format`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid format: '{0}'. Use epub, mobi, pdf, or html.")]
pub struct InvalidFormat(pub String);

impl FormatRequest {
    /// File extension for the saved artifact, including the dot.
    pub fn extension(self) -> &'static str {
        match self {
            FormatRequest::Epub => ".epub",
            FormatRequest::Mobi => ".mobi",
            FormatRequest::Pdf => ".pdf",
            FormatRequest::HtmlZip => ".zip",
        }
    }

    /// Field name carrying this format's cache URL in the metadata response.
    pub fn url_field(self) -> &'static str {
        match self {
            FormatRequest::Epub => "epub_url",
            FormatRequest::Mobi => "mobi_url",
            FormatRequest::Pdf => "pdf_url",
            FormatRequest::HtmlZip => "html_url",
        }
    }

    /// Key for this format in the response's `hashes` block.
    pub fn hash_key(self) -> &'static str {
        match self {
            FormatRequest::Epub => "epub",
            FormatRequest::Mobi => "mobi",
            FormatRequest::Pdf => "pdf",
            FormatRequest::HtmlZip => "html",
        }
    }
}

/// Parse a single format name (case-insensitive).
pub fn parse_format(s: &str) -> Result<FormatRequest, InvalidFormat> {
    match s.trim().to_lowercase().as_str() {
        "epub" => Ok(FormatRequest::Epub),
        "mobi" => Ok(FormatRequest::Mobi),
        "pdf" => Ok(FormatRequest::Pdf),
        "html" | "zip" => Ok(FormatRequest::HtmlZip),
        other => Err(InvalidFormat(other.to_string())),
    }
}

/// Parse a comma-separated list, e.g. "epub,mobi". Duplicates are dropped,
/// first occurrence wins. An empty list falls back to epub.
pub fn parse_format_list(s: &str) -> Result<Vec<FormatRequest>, InvalidFormat> {
    let mut formats = Vec::new();
    for part in s.split(',') {
        if part.trim().is_empty() {
            continue;
        }
        let format = parse_format(part)?;
        if !formats.contains(&format) {
            formats.push(format);
        }
    }
    if formats.is_empty() {
        formats.push(FormatRequest::Epub);
    }
    Ok(formats)
}
