use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::FromRow;

pub const DEFAULT_DECK: &str = "General";

/// A validated flashcard. Only the normalizer builds these from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Card {
    pub front: String,
    pub back: String,
    pub deck: String,
}

impl Card {
    pub fn new(front: impl Into<String>, back: impl Into<String>, deck: impl Into<String>) -> Self {
        Self {
            front: front.into(),
            back: back.into(),
            deck: deck.into(),
        }
    }
}

/// Card as it arrives from a model response or a client edit, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCard {
    #[serde(default)]
    pub front: Option<String>,
    #[serde(default)]
    pub back: Option<String>,
    #[serde(default, deserialize_with = "deserialize_deck_name")]
    pub deck: Option<String>,
}

impl From<Card> for RawCard {
    fn from(card: Card) -> Self {
        Self {
            front: Some(card.front),
            back: Some(card.back),
            deck: Some(card.deck),
        }
    }
}

/// A deck owned by the export vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "trashed?", alias = "trashed", default, deserialize_with = "deserialize_flag")]
    pub trashed: bool,
    #[serde(rename = "archived?", alias = "archived", default, deserialize_with = "deserialize_flag")]
    pub archived: bool,
}

impl Deck {
    pub fn is_active(&self) -> bool {
        !self.trashed && !self.archived
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeckListing {
    #[serde(default)]
    pub docs: Vec<Deck>,
}

/// Deck ids are strings on the wire, but numeric ids are accepted as well.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "deck id must be a string or number, got {other}"
        ))),
    }
}

/// The vendor reports `trashed?`/`archived?` as timestamps, booleans or null.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    })
}

/// A deck that is not a string is treated as absent so the card still gets the default.
fn deserialize_deck_name<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(name)) => Some(name),
        _ => None,
    })
}

/// Body of a single record-create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRecordRequest {
    pub content: String,
    #[serde(rename = "deck-id")]
    pub deck_id: String,
    #[serde(rename = "manual-tags", skip_serializing_if = "Option::is_none", default)]
    pub manual_tags: Option<Vec<String>>,
}

/// Outcome of exporting one card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub details: Option<String>,
}

impl ExportResult {
    pub fn exported(id: impl Into<String>) -> Self {
        Self {
            success: true,
            id: Some(id.into()),
            error: None,
            status: None,
            details: None,
        }
    }

    pub fn failed(error: impl Into<String>, status: Option<u16>, details: Option<String>) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(error.into()),
            status,
            details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub success: bool,
    pub total_cards: usize,
    pub total_success: usize,
    pub results: Vec<ExportResult>,
}

impl ExportSummary {
    /// Aggregates per-card results; the batch counts as a success when at least one card made it.
    pub fn from_results(results: Vec<ExportResult>) -> Self {
        let total_success = results.iter().filter(|r| r.success).count();
        Self {
            success: total_success > 0,
            total_cards: results.len(),
            total_success,
            results,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.total_cards > 0 && self.total_success == self.total_cards
    }
}

/// Text the user highlighted, with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedText {
    pub text: String,
    pub url: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub auto_generate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateCardsRequest {
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportCardsRequest {
    #[serde(default)]
    pub cards: Option<Vec<RawCard>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCardsRequest {
    pub cards: Vec<RawCard>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deck_accepts_numeric_ids_and_vendor_flags() {
        let listing: DeckListing = serde_json::from_value(json!({
            "docs": [
                {"id": 1, "name": "Bio", "trashed?": null, "archived?": false},
                {"id": "abc", "name": "Old", "trashed?": "2024-01-01T00:00:00Z"},
                {"id": "xyz", "name": "Stored", "archived": true}
            ]
        }))
        .unwrap();

        assert_eq!(listing.docs[0].id, "1");
        assert!(listing.docs[0].is_active());
        assert!(listing.docs[1].trashed);
        assert!(listing.docs[2].archived);
        assert!(!listing.docs[2].is_active());
    }

    #[test]
    fn test_raw_card_ignores_non_string_deck() {
        let raw: RawCard =
            serde_json::from_value(json!({"front": "Q", "back": "A", "deck": 3})).unwrap();
        assert_eq!(raw.deck, None);

        let raw: RawCard =
            serde_json::from_value(json!({"front": "Q", "back": "A", "deck": ["Bio"]})).unwrap();
        assert_eq!(raw.deck, None);

        let raw: RawCard =
            serde_json::from_value(json!({"front": "Q", "back": "A", "deck": "Bio"})).unwrap();
        assert_eq!(raw.deck.as_deref(), Some("Bio"));

        let raw: RawCard = serde_json::from_value(json!({"front": "Q", "back": "A"})).unwrap();
        assert_eq!(raw.deck, None);
    }

    #[test]
    fn test_create_record_request_wire_names() {
        let body = CreateRecordRequest {
            content: "Q\n---\nA".to_string(),
            deck_id: "d1".to_string(),
            manual_tags: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value, json!({"content": "Q\n---\nA", "deck-id": "d1"}));
    }

    #[test]
    fn test_summary_counts_partial_success() {
        let summary = ExportSummary::from_results(vec![
            ExportResult::exported("a"),
            ExportResult::failed("API error: 400", Some(400), None),
        ]);
        assert!(summary.success);
        assert!(!summary.all_succeeded());
        assert_eq!(summary.total_cards, 2);
        assert_eq!(summary.total_success, 1);

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["totalCards"], 2);
        assert_eq!(value["totalSuccess"], 1);
    }
}
