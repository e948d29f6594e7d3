//! Slide deck model and the session cache built on it

mod annotations;
mod cache;
mod ingest;
mod slide;

pub use annotations::{LABEL_MAX_CHARS, derive_annotations, label_for};
pub use cache::{FieldUpdate, SlideCache};
pub use ingest::{load_deck, parse_deck};
pub use slide::{
    Annotation, BoundingBox, COORDINATE_SPACE_MAX, Deck, DeckError, Element, Slide, SlideNumber,
    SlideRecord,
};
