use std::collections::HashMap;
use tracing::debug;

use crate::errors::{FlashcardError, Result};
use crate::models::Deck;

/// Resolve one deck name against a listing.
///
/// Only decks that are neither trashed nor archived are candidates. A
/// case-insensitive name match wins; otherwise the first active deck in
/// listing order is used.
pub fn resolve_deck_id(decks: &[Deck], desired: &str) -> Result<String> {
    DeckIndex::build(decks).map(|index| index.resolve(desired).to_string())
}

/// Name → id lookup computed once per export batch.
#[derive(Debug, Clone)]
pub struct DeckIndex {
    by_name: HashMap<String, String>,
    default_id: String,
}

impl DeckIndex {
    pub fn build(decks: &[Deck]) -> Result<Self> {
        if decks.is_empty() {
            return Err(FlashcardError::NoDeck);
        }

        let mut active = decks.iter().filter(|deck| deck.is_active()).peekable();
        let default_id = match active.peek() {
            Some(deck) => deck.id.clone(),
            None => return Err(FlashcardError::NoActiveDeck),
        };

        let mut by_name = HashMap::new();
        for deck in active {
            // First deck in listing order keeps the name when several collide.
            by_name
                .entry(deck.name.to_lowercase())
                .or_insert_with(|| deck.id.clone());
        }

        debug!(
            deck_count = decks.len(),
            active_count = by_name.len(),
            default_deck_id = %default_id,
            "Built deck index"
        );

        Ok(Self { by_name, default_id })
    }

    pub fn resolve(&self, desired: &str) -> &str {
        self.by_name
            .get(&desired.to_lowercase())
            .unwrap_or(&self.default_id)
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }
}
