//! Slide data model

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// 1-based slide number, unique within a deck
pub type SlideNumber = u32;

/// Upper bound of the normalized coordinate space used by bounding boxes
pub const COORDINATE_SPACE_MAX: f64 = 1000.0;

/// Region on a slide in normalized 0..=1000 coordinates.
///
/// Serialized as a `[top, left, bottom, right]` array, which is what the
/// ingestion service emits under `box_2d`.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(top: f64, left: f64, bottom: f64, right: f64) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    /// True when every coordinate lies inside the normalized space
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        [self.top, self.left, self.bottom, self.right]
            .iter()
            .all(|v| v.is_finite() && (0.0..=COORDINATE_SPACE_MAX).contains(v))
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from([top, left, bottom, right]: [f64; 4]) -> Self {
        Self::new(top, left, bottom, right)
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.top, b.left, b.bottom, b.right]
    }
}

/// Positioned text element extracted from a slide
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Stable 0-based id, contiguous within a slide
    pub id: u32,
    pub text: String,
    #[serde(rename = "box_2d", alias = "bounding_box")]
    pub bounding_box: BoundingBox,
}

/// Display annotation derived from an [`Element`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: u32,
    pub label: String,
    #[serde(rename = "box_2d")]
    pub bounding_box: BoundingBox,
}

/// Immutable slide identity, fixed once the deck is loaded
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    #[serde(rename = "slide_number")]
    pub number: SlideNumber,
    #[serde(rename = "content")]
    pub source_content: String,
    #[serde(default)]
    pub elements: Vec<Element>,
    /// Pre-rendered raster of the slide (base64 or data URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Slide {
    #[must_use]
    pub fn new(number: SlideNumber, source_content: impl Into<String>) -> Self {
        Self {
            number,
            source_content: source_content.into(),
            elements: Vec::new(),
            image: None,
        }
    }

    #[must_use]
    pub fn with_elements(mut self, elements: Vec<Element>) -> Self {
        self.elements = elements;
        self
    }

    #[must_use]
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// Cache entry: the immutable slide plus the lazily generated fields.
///
/// `expanded_content` is either absent or complete. Partial streaming
/// output never lands here.
#[derive(Clone, Debug, PartialEq)]
pub struct SlideRecord {
    pub slide: Arc<Slide>,
    pub expanded_content: Option<String>,
    pub annotations: Option<Vec<Annotation>>,
}

impl SlideRecord {
    #[must_use]
    pub fn new(slide: Slide) -> Self {
        Self {
            slide: Arc::new(slide),
            expanded_content: None,
            annotations: None,
        }
    }

    #[must_use]
    pub fn number(&self) -> SlideNumber {
        self.slide.number
    }

    #[must_use]
    pub fn is_expanded(&self) -> bool {
        self.expanded_content.is_some()
    }

    /// Annotations are missing or empty even though the slide has elements
    #[must_use]
    pub fn needs_annotation_backfill(&self) -> bool {
        !self.slide.elements.is_empty()
            && self.annotations.as_ref().is_none_or(|a| a.is_empty())
    }
}

/// Errors raised while validating a deck
#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    #[error("slide numbers must be positive")]
    ZeroSlideNumber,

    #[error("duplicate slide number {0}")]
    DuplicateSlide(SlideNumber),

    #[error("slide {slide}: element ids must be contiguous from 0, found {found} at position {position}")]
    NonContiguousElements {
        slide: SlideNumber,
        position: usize,
        found: u32,
    },

    #[error("slide {slide}: element {element} has a bounding box outside 0..=1000")]
    BoxOutOfRange { slide: SlideNumber, element: u32 },

    #[error("deck declares {declared} slides but contains {actual}")]
    SlideCountMismatch { declared: usize, actual: usize },

    #[error("malformed deck: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Ordered, validated sequence of slides. Insertion order is navigation order.
#[derive(Clone, Debug, Default)]
pub struct Deck {
    slides: Vec<Slide>,
}

impl Deck {
    pub fn new(slides: Vec<Slide>) -> Result<Self, DeckError> {
        let mut seen = HashSet::with_capacity(slides.len());
        for slide in &slides {
            if slide.number == 0 {
                return Err(DeckError::ZeroSlideNumber);
            }
            if !seen.insert(slide.number) {
                return Err(DeckError::DuplicateSlide(slide.number));
            }
            for (position, element) in slide.elements.iter().enumerate() {
                if element.id as usize != position {
                    return Err(DeckError::NonContiguousElements {
                        slide: slide.number,
                        position,
                        found: element.id,
                    });
                }
                if !element.bounding_box.is_normalized() {
                    return Err(DeckError::BoxOutOfRange {
                        slide: slide.number,
                        element: element.id,
                    });
                }
            }
        }
        Ok(Self { slides })
    }

    #[must_use]
    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slides.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    pub(crate) fn into_slides(self) -> Vec<Slide> {
        self.slides
    }
}
