use std::time::Instant;

use crate::config::LLMConfig;
use crate::errors::{FlashcardError, Result};
use crate::extractor::{truncate_chars, ExtractionMode, ResponseExtractor};
use crate::llm_providers::{GenerationSettings, LLMProvider, LLMProviderFactory, LLMProviderType};
use crate::models::Card;
use crate::log_llm_operation;

pub const MIN_TEXT_CHARS: usize = 10;
pub const MAX_TEXT_CHARS: usize = 8000;
const TRUNCATION_MARKER: &str = "... [truncated]";

pub const FLASHCARD_SYSTEM_PROMPT: &str = r#"You are an expert at creating high-quality spaced repetition flashcards from highlighted text. Create 2-5 flashcards based on the provided text, following these guidelines:

• Be EXTREMELY concise - answers should be 1-2 sentences maximum (10-25 words)
• Focus on core concepts, relationships, and techniques rather than trivia or isolated facts
• Break complex ideas into smaller, atomic concepts - each card tests one specific idea
• Front of card should ask a specific question that prompts recall
• Back of card should provide the shortest possible complete answer
• When referencing authors or sources, use their specific names rather than phrases like 'the author' or 'this text'
• Try to cite the author or source when discussing non-established concepts, new theories or predictions
• Questions should be precise and unambiguously exclude alternative correct answers
• Avoid yes/no questions or any questions with binary answers
• Avoid unordered lists of items (especially if they contain many items)
• If quantities are involved, they should be relative, or the unit of measure should be in the question

Format your response as a JSON array of objects: [{"front": "Question?", "back": "Answer", "deck": "General"}]."#;

pub fn user_prompt(text: &str) -> String {
    format!("Please create Mochi flashcards from this text: \n\n{}", text)
}

/// Check the length floor and cut overly long selections.
pub fn prepare_source_text(text: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_TEXT_CHARS {
        return Err(FlashcardError::Validation(
            "Selected text is too short for generating flashcards".to_string(),
        ));
    }
    Ok(truncate_chars(trimmed, MAX_TEXT_CHARS, TRUNCATION_MARKER))
}

/// Issues the generation request and turns the answer into cards
#[derive(Debug, Clone)]
pub struct CompletionService {
    provider: Option<LLMProvider>,
    extractor: ResponseExtractor,
}

impl CompletionService {
    pub fn new(provider: Option<LLMProvider>, extraction_mode: ExtractionMode) -> Self {
        Self {
            provider,
            extractor: ResponseExtractor::new(extraction_mode),
        }
    }

    pub fn from_config(config: &LLMConfig) -> Self {
        let settings = GenerationSettings {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };
        let provider = config.api_key.clone().map(|api_key| {
            LLMProviderFactory::create_provider(
                config.provider,
                api_key,
                config.base_url.clone(),
                config.model.clone(),
                settings,
            )
        });
        Self::new(provider, config.extraction_mode)
    }

    /// Convenience constructor with default generation settings.
    pub fn with_provider(
        provider_type: LLMProviderType,
        api_key: String,
        base_url: Option<String>,
        extraction_mode: ExtractionMode,
    ) -> Self {
        let provider = LLMProviderFactory::create_provider(
            provider_type,
            api_key,
            base_url,
            None,
            GenerationSettings::default(),
        );
        Self::new(Some(provider), extraction_mode)
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn provider_name(&self) -> Option<&'static str> {
        self.provider.as_ref().map(LLMProvider::provider_name)
    }

    pub fn model_name(&self) -> Option<&str> {
        self.provider.as_ref().map(LLMProvider::model_name)
    }

    pub fn extraction_mode(&self) -> ExtractionMode {
        self.extractor.mode()
    }

    pub async fn generate_cards(&self, text: &str) -> Result<Vec<Card>> {
        let source = prepare_source_text(text)?;
        let provider = self.provider.as_ref().ok_or_else(|| {
            FlashcardError::MissingCredential(
                "No LLM API key configured. Set LLM_API_KEY to enable card generation.".to_string(),
            )
        })?;

        if text.trim().chars().count() > MAX_TEXT_CHARS {
            log_llm_operation!(warn, "generate_cards", "input truncated");
        }

        let start = Instant::now();
        log_llm_operation!(
            start,
            "generate_cards",
            provider = provider.provider_name(),
            text_length = source.len()
        );

        let payload = provider
            .make_request(FLASHCARD_SYSTEM_PROMPT, &user_prompt(&source))
            .await
            .inspect_err(|e| {
                log_llm_operation!(error, "generate_cards", provider = provider.provider_name(), error = e);
            })?;

        let cards = self.extractor.extract(&payload)?;
        log_llm_operation!(
            success,
            "generate_cards",
            provider = provider.provider_name(),
            duration_ms = start.elapsed().as_millis() as u64,
            card_count = cards.len()
        );
        Ok(cards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_rejected() {
        assert!(matches!(prepare_source_text("too short"), Err(FlashcardError::Validation(_))));
        assert!(matches!(prepare_source_text("   abc    "), Err(FlashcardError::Validation(_))));
        assert_eq!(prepare_source_text("  ten chars!  ").unwrap(), "ten chars!");
    }

    #[test]
    fn test_long_text_is_truncated_with_marker() {
        let long = "a".repeat(MAX_TEXT_CHARS + 50);
        let prepared = prepare_source_text(&long).unwrap();
        assert!(prepared.ends_with("... [truncated]"));
        assert_eq!(prepared.chars().count(), MAX_TEXT_CHARS + TRUNCATION_MARKER.len());
    }

    #[test]
    fn test_user_prompt_embeds_text() {
        assert_eq!(
            user_prompt("Mitochondria make ATP."),
            "Please create Mochi flashcards from this text: \n\nMitochondria make ATP."
        );
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let service = CompletionService::new(None, ExtractionMode::Strict);
        assert!(!service.is_configured());
        assert_eq!(service.provider_name(), None);
        assert_eq!(service.model_name(), None);

        let err = service
            .generate_cards("The mitochondria is the powerhouse of the cell.")
            .await
            .unwrap_err();
        assert!(matches!(err, FlashcardError::MissingCredential(_)));
    }

    #[tokio::test]
    async fn test_validation_happens_before_credential_check() {
        let service = CompletionService::new(None, ExtractionMode::Lenient);
        let err = service.generate_cards("short").await.unwrap_err();
        assert!(matches!(err, FlashcardError::Validation(_)));
    }

    #[test]
    fn test_with_provider() {
        let service = CompletionService::with_provider(
            LLMProviderType::OpenAI,
            "key".to_string(),
            None,
            ExtractionMode::Strict,
        );
        assert!(service.is_configured());
        assert_eq!(service.provider_name(), Some("OpenAI"));
        assert_eq!(service.model_name(), Some("gpt-4o-mini"));
        assert_eq!(service.extraction_mode(), ExtractionMode::Strict);
    }
}
