//! Loading decks produced by the ingestion service

use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use super::slide::{Deck, DeckError, Slide};

/// Response body of the ingestion endpoint
#[derive(Debug, Deserialize)]
struct IngestedDeck {
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    total_slides: Option<usize>,
    slides: Vec<Slide>,
}

/// Parse and validate an ingestion response
pub fn parse_deck(json: &str) -> Result<Deck, DeckError> {
    let ingested: IngestedDeck = serde_json::from_str(json)?;
    if let Some(declared) = ingested.total_slides {
        if declared != ingested.slides.len() {
            return Err(DeckError::SlideCountMismatch {
                declared,
                actual: ingested.slides.len(),
            });
        }
    }
    if let Some(name) = &ingested.filename {
        log::debug!("Parsed deck {name:?} with {} slides", ingested.slides.len());
    }
    Deck::new(ingested.slides)
}

pub fn load_deck(path: &Path) -> anyhow::Result<Deck> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading deck {}", path.display()))?;
    let deck = parse_deck(&content).with_context(|| format!("loading deck {}", path.display()))?;
    log::info!("Loaded {} slides from {path:?}", deck.len());
    Ok(deck)
}
