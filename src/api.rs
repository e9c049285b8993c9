use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    card_store::CardStore,
    completion_service::CompletionService,
    errors::{ApiError, ErrorContext, FlashcardError},
    exporter::ExportService,
    models::*,
};

// Import logging macros
use crate::{log_api_error, log_api_start, log_api_success, log_api_warn};

pub const HEALTH_MESSAGE: &str = "Flashcard proxy server is running";

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

#[derive(Clone)]
pub struct AppState {
    pub card_store: CardStore,
    pub completion_service: CompletionService,
    pub export_service: Option<ExportService>,
}

impl AppState {
    fn exporter(&self) -> Result<&ExportService, FlashcardError> {
        self.export_service.as_ref().ok_or_else(|| {
            FlashcardError::MissingCredential(
                "No Mochi API key configured. Set MOCHI_API_KEY to enable export.".to_string(),
            )
        })
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

fn failure(err: FlashcardError, context: ErrorContext) -> (StatusCode, Json<ApiResponse<()>>) {
    ApiError::from(err).to_response_with_context(context)
}

pub async fn health() -> &'static str {
    HEALTH_MESSAGE
}

// Generation

pub async fn generate_cards(
    State(state): State<AppState>,
    Json(request): Json<GenerateCardsRequest>,
) -> ApiResult<Vec<Card>> {
    log_api_start!("generate_cards");

    let generated = state
        .completion_service
        .generate_cards(&request.text)
        .await
        .map_err(|e| failure(e, ErrorContext::new("generate_cards", "completion")))?;

    state
        .card_store
        .prepend_cards(generated.clone())
        .await
        .map_err(|e| failure(e, ErrorContext::new("generate_cards", "card_store")))?;

    log_api_success!("generate_cards", count = generated.len(), "cards generated");
    Ok(Json(ApiResponse::success(generated)))
}

// Export

pub async fn list_decks(State(state): State<AppState>) -> ApiResult<Vec<Deck>> {
    log_api_start!("list_decks");
    let context = || ErrorContext::new("list_decks", "deck");

    let exporter = state.exporter().map_err(|e| failure(e, context()))?;
    let decks = exporter
        .list_active_decks()
        .await
        .map_err(|e| failure(e, context()))?;

    log_api_success!("list_decks", count = decks.len(), "decks listed");
    Ok(Json(ApiResponse::success(decks)))
}

pub async fn export_cards(
    State(state): State<AppState>,
    Json(request): Json<ExportCardsRequest>,
) -> ApiResult<ExportSummary> {
    let context = || ErrorContext::new("export_cards", "card");
    let exporter = state.exporter().map_err(|e| failure(e, context()))?;

    let from_store = request.cards.is_none();
    let cards = match request.cards {
        Some(raw) => crate::normalizer::normalize_all(&raw).map_err(|position| {
            failure(
                FlashcardError::Validation(format!(
                    "Card at position {position} needs a non-empty front and back"
                )),
                context(),
            )
        })?,
        None => state
            .card_store
            .cards()
            .await
            .map_err(|e| failure(e, context()))?,
    };

    if cards.is_empty() {
        return Err(failure(
            FlashcardError::Validation("No cards to export".to_string()),
            context(),
        ));
    }

    log_api_start!("export_cards", count = cards.len());
    let summary = exporter
        .export(&cards)
        .await
        .map_err(|e| failure(e, context()))?;

    if summary.success {
        // Only cards taken from the store leave it, and only once exported.
        if from_store {
            let exported: Vec<Card> = cards
                .iter()
                .zip(&summary.results)
                .filter(|(_, result)| result.success)
                .map(|(card, _)| card.clone())
                .collect();
            state
                .card_store
                .remove_exported(&exported)
                .await
                .map_err(|e| failure(e, ErrorContext::new("export_cards", "card_store")))?;
        }
        log_api_success!(
            "export_cards",
            count = summary.total_success,
            format!("{} of {} cards exported", summary.total_success, summary.total_cards)
        );
    } else {
        log_api_warn!("export_cards", "no card was exported");
    }

    Ok(Json(ApiResponse::success(summary)))
}

// Stored cards

pub async fn get_cards(State(state): State<AppState>) -> ApiResult<Vec<Card>> {
    let cards = state
        .card_store
        .cards()
        .await
        .map_err(|e| failure(e, ErrorContext::new("get_cards", "card")))?;
    Ok(Json(ApiResponse::success(cards)))
}

pub async fn set_cards(
    State(state): State<AppState>,
    Json(request): Json<SetCardsRequest>,
) -> ApiResult<Vec<Card>> {
    log_api_start!("set_cards", count = request.cards.len());
    let cards = state
        .card_store
        .set_cards(&request.cards)
        .await
        .map_err(|e| failure(e, ErrorContext::new("set_cards", "card")))?;
    log_api_success!("set_cards", count = cards.len(), "cards replaced");
    Ok(Json(ApiResponse::success(cards)))
}

pub async fn clear_cards(State(state): State<AppState>) -> ApiResult<()> {
    state
        .card_store
        .clear()
        .await
        .map_err(|e| failure(e, ErrorContext::new("clear_cards", "card")))?;
    log_api_success!("clear_cards", "cards cleared");
    Ok(Json(ApiResponse::success(())))
}

pub async fn replace_card(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(raw): Json<RawCard>,
) -> ApiResult<Card> {
    log_api_start!("replace_card", card_index = index);
    let card = state.card_store.replace_card(index, &raw).await.map_err(|e| {
        failure(
            e,
            ErrorContext::new("replace_card", "card").with_id(&index.to_string()),
        )
    })?;
    log_api_success!("replace_card", card_index = index, "card replaced");
    Ok(Json(ApiResponse::success(card)))
}

pub async fn remove_card(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> ApiResult<Card> {
    log_api_start!("remove_card", card_index = index);
    let card = state.card_store.remove_card(index).await.map_err(|e| {
        failure(
            e,
            ErrorContext::new("remove_card", "card").with_id(&index.to_string()),
        )
    })?;
    log_api_success!("remove_card", card_index = index, "card removed");
    Ok(Json(ApiResponse::success(card)))
}

// Extension messages

/// Requests the browser extension sends, tagged by `action`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ExtensionMessage {
    ProcessSelectedText {
        text: String,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default, rename = "createCards")]
        create_cards: bool,
    },
    GetGeneratedCards,
    SetGeneratedCards {
        cards: Vec<RawCard>,
    },
    ClearGeneratedCards,
}

impl ExtensionMessage {
    pub fn action(&self) -> &'static str {
        match self {
            ExtensionMessage::ProcessSelectedText { .. } => "processSelectedText",
            ExtensionMessage::GetGeneratedCards => "getGeneratedCards",
            ExtensionMessage::SetGeneratedCards { .. } => "setGeneratedCards",
            ExtensionMessage::ClearGeneratedCards => "clearGeneratedCards",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtensionReply {
    Generated {
        success: bool,
        #[serde(rename = "generatedCards")]
        generated_cards: Vec<Card>,
    },
    Cards {
        #[serde(rename = "generatedCards")]
        generated_cards: Vec<Card>,
    },
    Acknowledged {
        success: bool,
    },
}

pub async fn handle_message(
    State(state): State<AppState>,
    Json(message): Json<ExtensionMessage>,
) -> Result<Json<ExtensionReply>, (StatusCode, Json<ApiResponse<()>>)> {
    let action = message.action();
    log_api_start!(action);

    let reply = dispatch(&state, message).await.map_err(|e| {
        log_api_error!(action, error = e, "message handling failed");
        failure(e, ErrorContext::new(action, "message"))
    })?;
    Ok(Json(reply))
}

async fn dispatch(
    state: &AppState,
    message: ExtensionMessage,
) -> Result<ExtensionReply, FlashcardError> {
    match message {
        ExtensionMessage::ProcessSelectedText {
            text,
            url,
            title,
            create_cards,
        } => {
            let selection = SelectedText {
                text,
                url: url.unwrap_or_else(|| "unknown".to_string()),
                title: title.unwrap_or_else(|| "Unknown page".to_string()),
                timestamp: Utc::now(),
                auto_generate: create_cards,
            };
            info!(
                url = %selection.url,
                text_length = selection.text.len(),
                create_cards,
                "Processing selected text"
            );
            state.card_store.record_selection(&selection).await?;

            if !create_cards {
                return Ok(ExtensionReply::Acknowledged { success: true });
            }

            let generated = state
                .completion_service
                .generate_cards(&selection.text)
                .await?;
            state.card_store.prepend_cards(generated.clone()).await?;
            Ok(ExtensionReply::Generated {
                success: true,
                generated_cards: generated,
            })
        }
        ExtensionMessage::GetGeneratedCards => Ok(ExtensionReply::Cards {
            generated_cards: state.card_store.cards().await?,
        }),
        ExtensionMessage::SetGeneratedCards { cards } => {
            state.card_store.set_cards(&cards).await?;
            Ok(ExtensionReply::Acknowledged { success: true })
        }
        ExtensionMessage::ClearGeneratedCards => {
            state.card_store.clear().await?;
            Ok(ExtensionReply::Acknowledged { success: true })
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        // Generation and export
        .route("/api/generate", post(generate_cards))
        .route("/api/decks", get(list_decks))
        .route("/api/export", post(export_cards))
        // Stored cards
        .route("/api/cards", get(get_cards).put(set_cards).delete(clear_cards))
        .route("/api/cards/:index", put(replace_card).delete(remove_card))
        // Extension messages
        .route("/api/messages", post(handle_message))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_actions_deserialize() {
        let message: ExtensionMessage = serde_json::from_value(json!({
            "action": "processSelectedText",
            "text": "Some selected text",
            "createCards": true
        }))
        .unwrap();
        match message {
            ExtensionMessage::ProcessSelectedText {
                create_cards, url, ..
            } => {
                assert!(create_cards);
                assert_eq!(url, None);
            }
            other => panic!("unexpected message: {other:?}"),
        }

        let message: ExtensionMessage =
            serde_json::from_value(json!({"action": "getGeneratedCards"})).unwrap();
        assert_eq!(message.action(), "getGeneratedCards");

        let message: ExtensionMessage = serde_json::from_value(json!({
            "action": "setGeneratedCards",
            "cards": [{"front": "Q", "back": "A"}]
        }))
        .unwrap();
        assert_eq!(message.action(), "setGeneratedCards");

        assert!(serde_json::from_value::<ExtensionMessage>(json!({"action": "openPopup"})).is_err());
    }

    #[test]
    fn test_reply_shapes() {
        let reply = ExtensionReply::Cards {
            generated_cards: vec![Card::new("Q", "A", "General")],
        };
        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            json!({"generatedCards": [{"front": "Q", "back": "A", "deck": "General"}]})
        );

        let reply = ExtensionReply::Acknowledged { success: true };
        assert_eq!(serde_json::to_value(&reply).unwrap(), json!({"success": true}));
    }

    #[test]
    fn test_api_response_envelope() {
        let ok = ApiResponse::success(3);
        assert!(ok.success);
        assert_eq!(ok.data, Some(3));

        let err: ApiResponse<()> = ApiResponse::error("nope".to_string());
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("nope"));
    }
}
