//! Context files attached by the user and the filter that decides which of
//! them are embedded into the requirements prompt.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Appended to a context file whose content was cut at the per-file ceiling.
pub const TRUNCATION_MARKER: &str = "\n[... truncated ...]";

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "svg", "ico", "tif", "tiff", "heic", "heif",
    "avif",
];

/// A user-supplied auxiliary document. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFile {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub content: String,
    /// Size in bytes as reported at upload time.
    pub size: usize,
}

impl ContextFile {
    /// Create a context file with an id derived from its name, content and
    /// an upload sequence number, so re-uploading the same file gets a new id.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<String>,
        sequence: u64,
    ) -> Self {
        let name = name.into();
        let content = content.into();

        let mut hasher = blake3::Hasher::new();
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
        hasher.update(content.as_bytes());
        hasher.update(&sequence.to_le_bytes());
        let id = hasher.finalize().to_hex()[..16].to_string();

        Self {
            id,
            size: content.len(),
            name,
            mime_type: mime_type.into(),
            content,
        }
    }
}

/// Whether a file is an image, judged by MIME type, extension or content.
#[must_use]
pub fn is_image(file: &ContextFile) -> bool {
    if file.mime_type.trim().to_ascii_lowercase().starts_with("image/") {
        return true;
    }

    let extension = file
        .name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    if extension.is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str())) {
        return true;
    }

    file.content
        .trim_start()
        .get(..11)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("data:image/"))
}

/// Per-file and aggregate ceilings, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLimits {
    pub max_file_bytes: usize,
    pub max_total_bytes: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 2 * 1024,
            max_total_bytes: 5 * 1024,
        }
    }
}

/// Why a context file was left out of the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    Image,
    FileTooLarge { size: usize, limit: usize },
    AggregateExceeded { running_total: usize, limit: usize },
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "image files are never embedded"),
            Self::FileTooLarge { size, limit } => {
                write!(f, "{size} bytes exceeds the per-file limit of {limit}")
            }
            Self::AggregateExceeded {
                running_total,
                limit,
            } => write!(
                f,
                "would raise the total from {running_total} past the limit of {limit} bytes"
            ),
        }
    }
}

/// A context file accepted for embedding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedContextFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub content: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludedContextFile {
    pub id: String,
    pub name: String,
    pub reason: ExclusionReason,
}

/// Result of filtering, in the original file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredContext {
    pub included: Vec<EmbeddedContextFile>,
    pub excluded: Vec<ExcludedContextFile>,
    pub total_bytes: usize,
}

impl FilteredContext {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.included.is_empty()
    }

    /// Render the accepted files as a prompt section. Empty when nothing was accepted.
    #[must_use]
    pub fn render(&self) -> String {
        if self.included.is_empty() {
            return String::new();
        }

        let mut out = String::from("## Context Files\n");
        for file in &self.included {
            out.push_str(&format!("\n### {} ({})\n```\n", file.name, file.mime_type));
            out.push_str(&file.content);
            if !file.content.ends_with('\n') {
                out.push('\n');
            }
            out.push_str("```\n");
        }
        out
    }
}

/// Selects and truncates context files before they are folded into a prompt.
///
/// Rules, per file in order:
/// 1. images are excluded;
/// 2. files whose reported size exceeds the per-file ceiling are excluded;
/// 3. files whose reported size would push the running total past the
///    aggregate ceiling are excluded, and evaluation continues with the next
///    file (first-fit);
/// 4. accepted content longer than the per-file ceiling is cut at a char
///    boundary and [`TRUNCATION_MARKER`] appended.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextFileFilter {
    limits: ContextLimits,
}

impl ContextFileFilter {
    #[must_use]
    pub const fn new(limits: ContextLimits) -> Self {
        Self { limits }
    }

    #[must_use]
    pub fn filter(&self, files: &[ContextFile]) -> FilteredContext {
        let mut result = FilteredContext::default();

        for file in files {
            let reason = if is_image(file) {
                Some(ExclusionReason::Image)
            } else if file.size > self.limits.max_file_bytes {
                Some(ExclusionReason::FileTooLarge {
                    size: file.size,
                    limit: self.limits.max_file_bytes,
                })
            } else if result.total_bytes + file.size > self.limits.max_total_bytes {
                Some(ExclusionReason::AggregateExceeded {
                    running_total: result.total_bytes,
                    limit: self.limits.max_total_bytes,
                })
            } else {
                None
            };

            if let Some(reason) = reason {
                debug!(file = %file.name, %reason, "Excluding context file");
                result.excluded.push(ExcludedContextFile {
                    id: file.id.clone(),
                    name: file.name.clone(),
                    reason,
                });
                continue;
            }

            result.total_bytes += file.size;
            let (content, truncated) = self.truncate_content(&file.content);
            result.included.push(EmbeddedContextFile {
                id: file.id.clone(),
                name: file.name.clone(),
                mime_type: file.mime_type.clone(),
                content,
                truncated,
            });
        }

        result
    }

    fn truncate_content(&self, content: &str) -> (String, bool) {
        if content.len() <= self.limits.max_file_bytes {
            return (content.to_string(), false);
        }
        let mut end = self.limits.max_file_bytes;
        while !content.is_char_boundary(end) {
            end -= 1;
        }
        (format!("{}{TRUNCATION_MARKER}", &content[..end]), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_file(name: &str, size: usize) -> ContextFile {
        ContextFile::new(name, "text/plain", "x".repeat(size), 0)
    }

    #[test]
    fn test_images_are_detected_three_ways() {
        let by_mime = ContextFile::new("diagram", "image/png", "binary", 0);
        let by_ext = ContextFile::new("photo.JPG", "application/octet-stream", "bytes", 0);
        let by_content = ContextFile::new("notes.txt", "text/plain", "  data:image/gif;base64,R0lG", 0);
        let plain = ContextFile::new("notes.md", "text/markdown", "# Notes", 0);

        assert!(is_image(&by_mime));
        assert!(is_image(&by_ext));
        assert!(is_image(&by_content));
        assert!(!is_image(&plain));
    }

    #[test]
    fn test_filter_applies_rules_in_order() {
        let files = vec![
            ContextFile::new("logo.png", "image/png", "PNG", 0),
            text_file("big.txt", 3000),
            text_file("a.txt", 2000),
            text_file("b.txt", 2000),
            text_file("c.txt", 2000),
            text_file("d.txt", 500),
        ];

        let filtered = ContextFileFilter::default().filter(&files);

        let included: Vec<_> = filtered.included.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(included, ["a.txt", "b.txt", "d.txt"]);
        assert_eq!(filtered.total_bytes, 4500);

        let reasons: Vec<_> = filtered.excluded.iter().map(|f| f.reason).collect();
        assert_eq!(reasons[0], ExclusionReason::Image);
        assert!(matches!(reasons[1], ExclusionReason::FileTooLarge { size: 3000, .. }));
        assert!(matches!(
            reasons[2],
            ExclusionReason::AggregateExceeded {
                running_total: 4000,
                ..
            }
        ));
    }

    #[test]
    fn test_content_longer_than_reported_size_is_truncated() {
        let mut file = text_file("under-reported.txt", 10);
        file.content = "é".repeat(2000);

        let filtered = ContextFileFilter::default().filter(&[file]);
        let embedded = &filtered.included[0];

        assert!(embedded.truncated);
        assert!(embedded.content.ends_with(TRUNCATION_MARKER));
        assert!(embedded.content.len() <= 2048 + TRUNCATION_MARKER.len());
    }

    #[test]
    fn test_render_never_contains_image_bytes() {
        let files = vec![
            ContextFile::new("screen.png", "image/png", "iVBORw0KGgoSECRETPIXELS", 0),
            ContextFile::new("api.md", "text/markdown", "GET /login", 1),
        ];
        let rendered = ContextFileFilter::default().filter(&files).render();

        assert!(rendered.contains("### api.md (text/markdown)"));
        assert!(rendered.contains("GET /login"));
        assert!(!rendered.contains("SECRETPIXELS"));
        assert!(!rendered.contains("screen.png"));
    }

    #[test]
    fn test_ids_differ_by_sequence() {
        let a = ContextFile::new("a.txt", "text/plain", "same", 1);
        let b = ContextFile::new("a.txt", "text/plain", "same", 2);
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 16);
    }

    #[test]
    fn test_context_file_serializes_mime_as_type() {
        let file = ContextFile::new("a.txt", "text/plain", "hi", 0);
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["type"], "text/plain");
        assert_eq!(json["size"], 2);
    }
}
