mod common;

use axum::http::StatusCode;

use common::{spawn_completion, MockCompletion};
use flashcard_generator::completion_service::FLASHCARD_SYSTEM_PROMPT;
use flashcard_generator::{
    Card, CompletionService, ExtractionMode, FlashcardError, LLMProviderType,
};

const SOURCE_TEXT: &str = "Mitochondria are organelles that produce most of the cell's ATP.";

fn anthropic(base_url: String, mode: ExtractionMode) -> CompletionService {
    CompletionService::with_provider(
        LLMProviderType::Anthropic,
        "sk-test".to_string(),
        Some(base_url),
        mode,
    )
}

#[tokio::test]
async fn test_anthropic_request_and_fenced_reply() {
    let reply = "Here you go:\n```json\n[{\"front\": \"What do mitochondria produce?\", \"back\": \"ATP.\"}]\n```";
    let (base_url, mock) = spawn_completion(MockCompletion::replying(reply)).await;

    let cards = anthropic(base_url, ExtractionMode::Strict)
        .generate_cards(SOURCE_TEXT)
        .await
        .unwrap();
    assert_eq!(cards, vec![Card::new("What do mitochondria produce?", "ATP.", "General")]);

    let requests = mock.requests.lock().unwrap();
    let (headers, body) = &requests[0];
    assert_eq!(headers["x-api-key"], "sk-test");
    assert_eq!(headers["anthropic-version"], "2023-06-01");
    assert_eq!(body["model"], "claude-3-7-sonnet-20250219");
    assert_eq!(body["max_tokens"], 4000);
    assert_eq!(body["system"], FLASHCARD_SYSTEM_PROMPT);
    assert_eq!(body["messages"][0]["role"], "user");
    assert!(body["messages"][0]["content"]
        .as_str()
        .unwrap()
        .ends_with(SOURCE_TEXT));
}

#[tokio::test]
async fn test_strict_mode_rejects_unparseable_reply() {
    let (base_url, _mock) =
        spawn_completion(MockCompletion::replying("I could not make any cards.")).await;

    let err = anthropic(base_url, ExtractionMode::Strict)
        .generate_cards(SOURCE_TEXT)
        .await
        .unwrap_err();
    assert!(matches!(err, FlashcardError::Extraction));
}

#[tokio::test]
async fn test_lenient_mode_returns_one_fallback_card() {
    let (base_url, _mock) =
        spawn_completion(MockCompletion::replying("I could not make any cards.")).await;

    let cards = anthropic(base_url, ExtractionMode::Lenient)
        .generate_cards(SOURCE_TEXT)
        .await
        .unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].deck, "General");
    assert!(cards[0].back.starts_with("I could not make any cards."));
}

#[tokio::test]
async fn test_upstream_error_carries_status() {
    let (base_url, _mock) =
        spawn_completion(MockCompletion::failing(StatusCode::SERVICE_UNAVAILABLE)).await;

    let err = anthropic(base_url, ExtractionMode::Lenient)
        .generate_cards(SOURCE_TEXT)
        .await
        .unwrap_err();
    assert!(matches!(err, FlashcardError::RemoteApi { status: 503, .. }));
}

#[tokio::test]
async fn test_openai_provider_uses_bearer_and_same_extraction() {
    let reply = r#"[{"front": "Q1", "back": "A1", "deck": "Bio"}, {"front": "Q2"}]"#;
    let (base_url, mock) = spawn_completion(MockCompletion::replying(reply)).await;

    let service = CompletionService::with_provider(
        LLMProviderType::OpenAI,
        "sk-openai".to_string(),
        Some(base_url),
        ExtractionMode::Strict,
    );
    let cards = service.generate_cards(SOURCE_TEXT).await.unwrap();
    assert_eq!(cards, vec![Card::new("Q1", "A1", "Bio")]);

    let requests = mock.requests.lock().unwrap();
    let (headers, body) = &requests[0];
    assert_eq!(headers["authorization"], "Bearer sk-openai");
    assert_eq!(body["messages"][0]["role"], "system");
}
