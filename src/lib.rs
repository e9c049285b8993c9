pub mod api;
pub mod card_store;
pub mod completion_service;
pub mod config;
pub mod database;
pub mod deck_resolver;
pub mod errors;
pub mod exporter;
pub mod extractor;
pub mod llm_providers;
pub mod logging;
pub mod mochi_client;
pub mod models;
pub mod normalizer;

pub use card_store::{CardPersistence, CardStore};
pub use completion_service::CompletionService;
pub use database::Database;
pub use deck_resolver::{resolve_deck_id, DeckIndex};
pub use errors::*;
pub use exporter::ExportService;
pub use extractor::{ExtractionMode, ResponseExtractor};
pub use llm_providers::{LLMProvider, LLMProviderFactory, LLMProviderType};
pub use mochi_client::{CardExportApi, MochiClient};
pub use models::*;
pub use normalizer::{normalize, normalize_all};
