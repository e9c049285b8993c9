use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::errors::{FlashcardError, Result};
use crate::models::{CreateRecordRequest, Deck, DeckListing};

pub const DEFAULT_MOCHI_BASE_URL: &str = "https://app.mochi.cards/api";

/// Remote operations the export pipeline depends on
#[async_trait]
pub trait CardExportApi: Send + Sync {
    /// Fetch the full deck listing, including trashed and archived decks.
    async fn list_decks(&self) -> Result<Vec<Deck>>;

    /// Create one record and return the id the vendor assigned to it.
    async fn create_card(&self, request: &CreateRecordRequest) -> Result<String>;
}

/// HTTP Basic credential with the secret as user name and an empty password.
pub fn basic_auth_header(secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{secret}:")))
}

/// Re-serialise JSON error bodies compactly; anything else is kept verbatim.
pub fn decode_error_body(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => value.to_string(),
        Err(_) => body.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct MochiClient {
    client: Client,
    auth_header: String,
    base_url: String,
}

impl MochiClient {
    pub fn new(api_key: &str, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            auth_header: basic_auth_header(api_key),
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_MOCHI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check_status(response: Response, operation: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let body = decode_error_body(&body);
        error!(
            component = "mochi_client",
            operation = operation,
            status = status.as_u16(),
            error = %body,
            "Mochi API request failed"
        );
        Err(FlashcardError::RemoteApi {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl CardExportApi for MochiClient {
    async fn list_decks(&self) -> Result<Vec<Deck>> {
        debug!(component = "mochi_client", base_url = %self.base_url, "Fetching deck listing");

        let response = self
            .client
            .get(format!("{}/decks/", self.base_url))
            .header("Authorization", &self.auth_header)
            .send()
            .await?;
        let response = Self::check_status(response, "list_decks").await?;

        let listing: DeckListing = response.json().await?;
        info!(component = "mochi_client", deck_count = listing.docs.len(), "Fetched deck listing");
        Ok(listing.docs)
    }

    async fn create_card(&self, request: &CreateRecordRequest) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/cards/", self.base_url))
            .header("Authorization", &self.auth_header)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;
        let response = Self::check_status(response, "create_card").await?;

        let body = response.text().await?;
        let value: Value = serde_json::from_str(&body)?;
        let id = match value.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => "unknown".to_string(),
        };
        debug!(component = "mochi_client", card_id = %id, deck_id = %request.deck_id, "Created card");
        Ok(id)
    }
}
