//! Generation request and event types

use std::fmt;

use serde::Serialize;

use super::stream::StreamError;
use crate::deck::{Element, SlideCache, SlideNumber};

/// Unique identifier for generation requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a request feeds the visible display or fills the cache silently
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestKind {
    Active,
    Prefetch,
}

/// Optional provider preferences forwarded to the backend
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationPreferences {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl fmt::Debug for GenerationPreferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationPreferences")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Body of a generation request.
///
/// Field names on the wire follow the backend's expand endpoint.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExpandRequest {
    #[serde(rename = "slide_content")]
    pub slide_text: String,
    pub slide_number: SlideNumber,
    #[serde(rename = "prev_context")]
    pub previous_slide_text: String,
    #[serde(rename = "next_context")]
    pub next_slide_text: String,
    #[serde(rename = "course_topic")]
    pub topic_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elements: Option<Vec<Element>>,
    #[serde(flatten)]
    pub preferences: GenerationPreferences,
}

impl ExpandRequest {
    /// Build the request for the slide at `index`.
    ///
    /// Neighbour context is the neighbours' source text, never their
    /// generated content. Missing neighbours are sent as empty strings.
    #[must_use]
    pub fn for_index(
        cache: &SlideCache,
        index: usize,
        topic: &str,
        preferences: &GenerationPreferences,
    ) -> Option<Self> {
        let slide = &cache.get_at(index)?.slide;
        let neighbour = |i: Option<usize>| {
            i.and_then(|i| cache.get_at(i))
                .map(|r| r.slide.source_content.clone())
                .unwrap_or_default()
        };

        Some(Self {
            slide_text: slide.source_content.clone(),
            slide_number: slide.number,
            previous_slide_text: neighbour(index.checked_sub(1)),
            next_slide_text: neighbour(index.checked_add(1)),
            topic_label: topic.to_string(),
            image: slide.image.clone(),
            elements: (!slide.elements.is_empty()).then(|| slide.elements.clone()),
            preferences: preferences.clone(),
        })
    }
}

/// Progress reported by a generation task back to its owner
#[derive(Debug)]
pub enum GenerationEvent {
    /// Decoded text, only emitted for active requests
    Fragment { id: RequestId, text: String },

    /// Stream closed normally with the full text
    Completed { id: RequestId, text: String },

    Failed { id: RequestId, error: StreamError },

    Cancelled(RequestId),
}

impl GenerationEvent {
    #[must_use]
    pub fn id(&self) -> RequestId {
        match self {
            Self::Fragment { id, .. } | Self::Completed { id, .. } | Self::Failed { id, .. } => *id,
            Self::Cancelled(id) => *id,
        }
    }
}
