// Export modules for use in tests
pub mod commands;
pub mod deck;
pub mod expand;
pub mod panic_handler;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use deck::{Deck, Slide, SlideCache, SlideNumber};
pub use expand::{ExpansionBackend, ExpansionConfig, ExpansionService, HttpBackend, Update};
