use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::errors::{FlashcardError, Result};
use crate::models::{Card, RawCard, SelectedText};
use crate::normalizer::{normalize, normalize_all};
use crate::{log_service_success, log_service_warn};

/// Durable backing for the generated-card list and the last selection
#[async_trait]
pub trait CardPersistence: Send + Sync {
    async fn load_cards(&self) -> Result<Vec<Card>>;
    async fn save_cards(&self, cards: &[Card]) -> Result<()>;
    async fn clear_cards(&self) -> Result<()>;
    async fn load_selection(&self) -> Result<Option<SelectedText>>;
    async fn save_selection(&self, selection: &SelectedText) -> Result<()>;
}

/// Cards waiting for review or export.
///
/// Writes go to persistence first and only then to memory, so a failed save
/// leaves the in-memory list unchanged.
#[derive(Clone)]
pub struct CardStore {
    cards: Arc<RwLock<Vec<Card>>>,
    persistence: Arc<dyn CardPersistence>,
}

impl CardStore {
    pub fn new(persistence: Arc<dyn CardPersistence>) -> Self {
        Self {
            cards: Arc::new(RwLock::new(Vec::new())),
            persistence,
        }
    }

    /// Current list, restored from persistence when memory is empty.
    pub async fn cards(&self) -> Result<Vec<Card>> {
        {
            let cards = self.cards.read().await;
            if !cards.is_empty() {
                return Ok(cards.clone());
            }
        }

        let mut cards = self.cards.write().await;
        if cards.is_empty() {
            let restored = self.persistence.load_cards().await?;
            if !restored.is_empty() {
                log_service_success!("card_store", "restore", format!("{} cards", restored.len()));
            }
            *cards = restored;
        }
        Ok(cards.clone())
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.cards().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Replace the whole list with client-edited cards.
    pub async fn set_cards(&self, raw: &[RawCard]) -> Result<Vec<Card>> {
        let cards = normalize_all(raw).map_err(|position| {
            FlashcardError::Validation(format!(
                "Card at position {position} needs a non-empty front and back"
            ))
        })?;
        self.replace_all(cards.clone()).await?;
        Ok(cards)
    }

    /// Put freshly generated cards ahead of the existing ones.
    pub async fn prepend_cards(&self, generated: Vec<Card>) -> Result<Vec<Card>> {
        let existing = self.cards().await?;
        let mut combined = generated;
        combined.extend(existing);
        self.replace_all(combined.clone()).await?;
        Ok(combined)
    }

    pub async fn replace_card(&self, index: usize, raw: &RawCard) -> Result<Card> {
        let card = normalize(raw).ok_or_else(|| {
            FlashcardError::Validation("Card needs a non-empty front and back".to_string())
        })?;

        let mut cards = self.cards().await?;
        let slot = cards
            .get_mut(index)
            .ok_or(FlashcardError::CardNotFound(index))?;
        *slot = card.clone();
        self.replace_all(cards).await?;
        Ok(card)
    }

    pub async fn remove_card(&self, index: usize) -> Result<Card> {
        let mut cards = self.cards().await?;
        if index >= cards.len() {
            log_service_warn!("card_store", "remove_card", format!("no card at {index}"));
            return Err(FlashcardError::CardNotFound(index));
        }
        let removed = cards.remove(index);
        self.replace_all(cards).await?;
        Ok(removed)
    }

    /// Drop cards that made it to the vendor, keeping everything else in order.
    ///
    /// Each exported card removes the first stored card equal to it.
    pub async fn remove_exported(&self, exported: &[Card]) -> Result<usize> {
        if exported.is_empty() {
            return Ok(0);
        }

        let mut cards = self.cards().await?;
        let before = cards.len();
        for card in exported {
            if let Some(position) = cards.iter().position(|stored| stored == card) {
                cards.remove(position);
            }
        }

        let removed = before - cards.len();
        if removed > 0 {
            self.replace_all(cards).await?;
        }
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<()> {
        self.persistence.clear_cards().await?;
        self.cards.write().await.clear();
        Ok(())
    }

    pub async fn record_selection(&self, selection: &SelectedText) -> Result<()> {
        self.persistence.save_selection(selection).await
    }

    pub async fn selection(&self) -> Result<Option<SelectedText>> {
        self.persistence.load_selection().await
    }

    async fn replace_all(&self, cards: Vec<Card>) -> Result<()> {
        let mut guard = self.cards.write().await;
        self.persistence.save_cards(&cards).await?;
        *guard = cards;
        Ok(())
    }
}
