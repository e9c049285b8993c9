use crate::api::ApiResponse;
use axum::{http::StatusCode, response::Json};
use tracing::{error, info, warn};

/// Errors raised by the extraction and export pipeline
#[derive(Debug, thiserror::Error)]
pub enum FlashcardError {
    #[error("No flashcards could be extracted from the model response")]
    Extraction,

    #[error("No decks found in Mochi account. Please create at least one deck.")]
    NoDeck,

    #[error("No active decks found in Mochi account. Every deck is trashed or archived.")]
    NoActiveDeck,

    #[error("Remote API error: {status} - {body}")]
    RemoteApi { status: u16, body: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Card at position {0} not found")]
    CardNotFound(usize),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, FlashcardError>;

/// Centralized error types for consistent API error handling
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Extraction error: {0}")]
    ExtractionError(String),

    #[error("Deck resolution error: {0}")]
    DeckError(String),

    #[error("Upstream API error: {0}")]
    UpstreamError(String),

    #[error("Service not configured: {0}")]
    NotConfigured(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<FlashcardError> for ApiError {
    fn from(err: FlashcardError) -> Self {
        match err {
            FlashcardError::Extraction => ApiError::ExtractionError(err.to_string()),
            FlashcardError::NoDeck | FlashcardError::NoActiveDeck => {
                ApiError::DeckError(err.to_string())
            }
            FlashcardError::Validation(message) => ApiError::ValidationError(message),
            FlashcardError::CardNotFound(_) => ApiError::NotFound(err.to_string()),
            FlashcardError::MissingCredential(message) => ApiError::NotConfigured(message),
            FlashcardError::RemoteApi { .. }
            | FlashcardError::Http(_)
            | FlashcardError::Json(_) => ApiError::UpstreamError(err.to_string()),
            FlashcardError::Storage(_) => ApiError::StorageError(err.to_string()),
        }
    }
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::ExtractionError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::DeckError(_) => StatusCode::CONFLICT,
            ApiError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            ApiError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert API error to HTTP response with consistent structure and logging
    pub fn to_response_with_context(
        self,
        context: ErrorContext,
    ) -> (StatusCode, Json<ApiResponse<()>>) {
        let status = self.status_code();
        match &self {
            ApiError::NotFound(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Resource not found"
                );
            }
            ApiError::ValidationError(_) | ApiError::ExtractionError(_) | ApiError::DeckError(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Request could not be completed"
                );
            }
            ApiError::UpstreamError(_) | ApiError::NotConfigured(_) | ApiError::StorageError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Request failed"
                );
            }
        }

        let message = match self {
            ApiError::StorageError(_) => "Storage operation failed. Please try again.".to_string(),
            ApiError::NotFound(message)
            | ApiError::ValidationError(message)
            | ApiError::ExtractionError(message)
            | ApiError::DeckError(message)
            | ApiError::UpstreamError(message)
            | ApiError::NotConfigured(message) => message,
        };

        (status, Json(ApiResponse::error(message)))
    }

    /// Simple conversion without context
    pub fn to_response(self) -> (StatusCode, Json<ApiResponse<()>>) {
        let context = ErrorContext::new("unknown", "resource");
        self.to_response_with_context(context)
    }
}
