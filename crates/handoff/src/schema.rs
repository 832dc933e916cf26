use serde::{Deserialize, Serialize};

/// Element type tag. Matched case-insensitively; tags outside the known
/// vocabulary are carried through as lowercase `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ElementKind {
    Text,
    Image,
    Other(String),
}

impl ElementKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for ElementKind {
    fn from(raw: String) -> Self {
        let tag = raw.trim().to_ascii_lowercase();
        match tag.as_str() {
            "text" => Self::Text,
            "image" => Self::Image,
            _ => Self::Other(tag),
        }
    }
}

impl From<ElementKind> for String {
    fn from(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

/// A single block on a page: a run of text, or an image given as a data URI or remote URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Element {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Text,
            content: content.into(),
            description: None,
        }
    }

    pub fn image(content: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: ElementKind::Image,
            content: content.into(),
            description: Some(description.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based page number
    pub page: u32,
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl Page {
    pub fn new(page: u32, elements: Vec<Element>) -> Self {
        Self { page, elements }
    }
}

/// Parse service output. On the wire this is a bare array of pages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParseResult {
    pub pages: Vec<Page>,
}

impl ParseResult {
    pub fn new(pages: Vec<Page>) -> Self {
        Self { pages }
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn element_count(&self) -> usize {
        self.pages.iter().map(|p| p.elements.len()).sum()
    }
}
