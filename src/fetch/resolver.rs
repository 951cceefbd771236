//! Metadata resolution: one API call per URL, mapped into per-format
//! [ResolvedArtifact]s.
//!
//! The response is a format-keyed payload; the mapping fails closed with
//! [FetchError::UnsupportedUrl] on any missing key for a requested format.
//! That outcome is routine (many inputs are not resolvable) and never aborts
//! the batch.

use crate::fetch::client::{ApiClient, Transport};
use crate::fetch::error::FetchError;
use crate::formats::FormatRequest;
use crate::model::{ResolvedArtifact, StoryMeta};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Path of the metadata endpoint, relative to the API base URL.
const METADATA_PATH: &str = "/api/v0/epub";

/// Version 0 metadata payload: per-format cache URLs, an optional per-format
/// hash block, and the story metadata block. Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct ResponseV0 {
    pub epub_url: Option<String>,
    pub mobi_url: Option<String>,
    pub pdf_url: Option<String>,
    pub html_url: Option<String>,
    #[serde(default)]
    pub hashes: Option<HashMap<String, String>>,
    pub meta: Option<StoryMeta>,
}

impl ResponseV0 {
    fn url_for(&self, format: FormatRequest) -> Option<&str> {
        match format {
            FormatRequest::Epub => self.epub_url.as_deref(),
            FormatRequest::Mobi => self.mobi_url.as_deref(),
            FormatRequest::Pdf => self.pdf_url.as_deref(),
            FormatRequest::HtmlZip => self.html_url.as_deref(),
        }
    }
}

/// Result of resolving one URL: the artifacts to persist plus the metadata
/// block for verbose output and filename templating.
#[derive(Debug)]
pub struct Resolution {
    pub artifacts: Vec<ResolvedArtifact>,
    pub meta: Option<StoryMeta>,
}

/// Turns a source URL into download URLs, hashes, and file names.
#[derive(Debug)]
pub struct Resolver {
    base_url: String,
    automated: bool,
    filename_template: Option<String>,
}

impl Resolver {
    pub fn new(base_url: impl Into<String>, automated: bool, filename_template: Option<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            automated,
            filename_template,
        }
    }

    /// One metadata call covering every requested format. The `automated`
    /// flag is forwarded so the server can serve deterministic fixtures.
    pub fn resolve<T: Transport>(
        &self,
        client: &mut ApiClient<T>,
        url: &str,
        formats: &[FormatRequest],
    ) -> Result<Resolution, FetchError> {
        let endpoint = format!("{}{}", self.base_url, METADATA_PATH);
        let mut query: Vec<(&str, &str)> = vec![("q", url)];
        if self.automated {
            query.push(("automated", "true"));
        }
        let response = client.get_with_retry(&endpoint, &query)?;
        debug!(status = response.status, url, "metadata response");

        let payload: ResponseV0 = match serde_json::from_slice(&response.body) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(url, error = %e, "metadata payload did not parse");
                return Err(FetchError::UnsupportedUrl {
                    url: url.to_string(),
                });
            }
        };
        self.map_payload(url, formats, payload)
    }

    /// Convert the raw payload into artifacts. The epub URL is required even
    /// when not requested: it carries the canonical base name.
    fn map_payload(
        &self,
        url: &str,
        formats: &[FormatRequest],
        payload: ResponseV0,
    ) -> Result<Resolution, FetchError> {
        let unsupported = || FetchError::UnsupportedUrl {
            url: url.to_string(),
        };

        let epub_url = payload.epub_url.as_deref().ok_or_else(unsupported)?;
        let derived_base = base_name_from_epub_url(epub_url).ok_or_else(unsupported)?;

        let templated_base = self.filename_template.as_deref().and_then(|template| {
            let fields = payload
                .meta
                .as_ref()
                .map(StoryMeta::template_fields)
                .unwrap_or_default();
            let name = sanitize_file_name(&apply_template(template, &fields));
            if name.is_empty() {
                None
            } else {
                Some(name)
            }
        });
        let base = templated_base.unwrap_or(derived_base);

        let mut artifacts = Vec::with_capacity(formats.len());
        for &format in formats {
            let cache_url = payload.url_for(format).ok_or_else(unsupported)?;
            let hash = payload
                .hashes
                .as_ref()
                .and_then(|hashes| hashes.get(format.hash_key()).cloned())
                .or_else(|| extract_hash(cache_url))
                .or_else(|| extract_hash(epub_url))
                .ok_or_else(unsupported)?;
            artifacts.push(ResolvedArtifact {
                source_url: url.to_string(),
                format,
                file_name: format!("{}{}", base, format.extension()),
                download_url: self.absolute_url(cache_url),
                hash,
            });
        }
        Ok(Resolution {
            artifacts,
            meta: payload.meta,
        })
    }

    /// Cache URLs come back relative to the API host; absolute ones pass
    /// through untouched.
    fn absolute_url(&self, cache_url: &str) -> String {
        if cache_url.starts_with("http://") || cache_url.starts_with("https://") {
            cache_url.to_string()
        } else if cache_url.starts_with('/') {
            format!("{}{}", self.base_url, cache_url)
        } else {
            format!("{}/{}", self.base_url, cache_url)
        }
    }
}

/// Content hash carried in the `?h=` query of a cache URL.
fn extract_hash(url: &str) -> Option<String> {
    let (_, after) = url.split_once("?h=")?;
    let hash = after.split('&').next().unwrap_or(after);
    if hash.is_empty() {
        None
    } else {
        Some(hash.to_string())
    }
}

/// Canonical base name: final path segment of the epub URL, query stripped,
/// `.epub` suffix removed, path-hostile characters dropped.
fn base_name_from_epub_url(epub_url: &str) -> Option<String> {
    let path = epub_url.split('?').next().unwrap_or(epub_url);
    let segment = path.rsplit('/').next().unwrap_or(path);
    let base = segment.strip_suffix(".epub").unwrap_or(segment);
    let base = sanitize_file_name(base);
    if base.is_empty() {
        None
    } else {
        Some(base)
    }
}

/// Strip characters that are unsafe in file names on common filesystems.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Literal `{token}` substitution against the metadata fields. Unresolved
/// tokens become empty strings, never an error; no other processing happens.
pub fn apply_template(template: &str, fields: &HashMap<String, String>) -> String {
    // The pattern is a literal, so compilation cannot fail.
    let token = Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("valid token pattern");
    token
        .replace_all(template, |caps: &regex::Captures<'_>| {
            fields.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned()
}
