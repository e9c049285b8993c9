use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::deck_resolver::DeckIndex;
use crate::errors::{FlashcardError, Result};
use crate::mochi_client::CardExportApi;
use crate::models::{Card, CreateRecordRequest, Deck, ExportResult, ExportSummary};
use crate::{log_export_card, log_service_error, log_service_start, log_service_success};

/// Line the vendor uses to split a record into its two sides.
pub const RECORD_SEPARATOR: &str = "\n---\n";

pub fn record_content(card: &Card) -> String {
    format!("{}{}{}", card.front, RECORD_SEPARATOR, card.back)
}

/// Tag derived from a non-default deck name: lowercase, whitespace runs become `-`.
pub fn deck_tag(deck: &str) -> Option<String> {
    let deck = deck.trim();
    if deck.is_empty() || deck == crate::models::DEFAULT_DECK {
        return None;
    }
    let tag = deck
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase();
    Some(tag)
}

pub fn build_record(card: &Card, decks: &DeckIndex) -> CreateRecordRequest {
    CreateRecordRequest {
        content: record_content(card),
        deck_id: decks.resolve(&card.deck).to_string(),
        manual_tags: deck_tag(&card.deck).map(|tag| vec![tag]),
    }
}

/// Pushes local cards to the export vendor, one record per card
#[derive(Clone)]
pub struct ExportService {
    api: Arc<dyn CardExportApi>,
    max_concurrency: usize,
}

impl ExportService {
    pub fn new(api: Arc<dyn CardExportApi>) -> Self {
        Self {
            api,
            max_concurrency: 1,
        }
    }

    /// Allow up to `limit` create calls in flight. Results keep input order.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub async fn list_active_decks(&self) -> Result<Vec<Deck>> {
        let decks = self.api.list_decks().await?;
        Ok(decks.into_iter().filter(Deck::is_active).collect())
    }

    /// Export a batch. Deck listing or resolution failures abort the batch;
    /// individual create failures are recorded and the batch carries on.
    pub async fn export(&self, cards: &[Card]) -> Result<ExportSummary> {
        if cards.is_empty() {
            return Ok(ExportSummary::from_results(Vec::new()));
        }

        let start = Instant::now();
        log_service_start!("export_service", "export", card_count = cards.len());

        let decks = self.api.list_decks().await.inspect_err(|e| {
            log_service_error!("export_service", "list_decks", error = e);
        })?;
        let index = DeckIndex::build(&decks).inspect_err(|e| {
            log_service_error!("export_service", "resolve_decks", error = e);
        })?;
        debug!(default_deck_id = %index.default_id(), "Resolved deck listing for export");

        let records: Vec<CreateRecordRequest> =
            cards.iter().map(|card| build_record(card, &index)).collect();

        let pending: Vec<_> = records
            .iter()
            .enumerate()
            .map(|(position, record)| self.export_one(position, record))
            .collect();
        let results: Vec<ExportResult> = stream::iter(pending)
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let summary = ExportSummary::from_results(results);
        log_service_success!(
            "export_service",
            "export",
            card_count = summary.total_success,
            duration_ms = start.elapsed().as_millis() as u64
        );
        Ok(summary)
    }

    async fn export_one(&self, position: usize, record: &CreateRecordRequest) -> ExportResult {
        match self.api.create_card(record).await {
            Ok(id) => {
                log_export_card!(success, card_index = position, deck_id = record.deck_id, id = id);
                ExportResult::exported(id)
            }
            Err(FlashcardError::RemoteApi { status, body }) => {
                log_export_card!(failure, card_index = position, deck_id = record.deck_id, error = body);
                ExportResult::failed(format!("API error: {status}"), Some(status), Some(body))
            }
            Err(FlashcardError::Json(e)) => {
                log_export_card!(failure, card_index = position, deck_id = record.deck_id, error = e);
                ExportResult::failed("Failed to parse response", None, None)
            }
            Err(e) => {
                log_export_card!(failure, card_index = position, deck_id = record.deck_id, error = e);
                ExportResult::failed(e.to_string(), None, None)
            }
        }
    }
}
