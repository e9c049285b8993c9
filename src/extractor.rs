use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::errors::{FlashcardError, Result};
use crate::models::{Card, RawCard, DEFAULT_DECK};
use crate::normalizer::normalize;

pub const FALLBACK_FRONT: &str = "What are the key concepts from this text?";
const FALLBACK_EXCERPT_CHARS: usize = 300;
const EMPTY_RESPONSE_BACK: &str = "The model returned an empty response.";

/// What to do when no strategy yields a valid card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Fail with [`FlashcardError::Extraction`].
    Strict,
    /// Return a single card summarising the raw response.
    #[default]
    Lenient,
}

impl FromStr for ExtractionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(ExtractionMode::Strict),
            "lenient" | "fallback" => Ok(ExtractionMode::Lenient),
            other => Err(format!("unknown extraction mode '{other}'")),
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMode::Strict => write!(f, "strict"),
            ExtractionMode::Lenient => write!(f, "lenient"),
        }
    }
}

/// Fenced code block, optionally labelled `json`, wrapping an array of objects.
#[allow(clippy::expect_used)]
static FENCED_ARRAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?i:json)?\s*(\[\s*\{.*?\}\s*\])\s*```")
        .expect("fenced block pattern is a valid regex")
});

type Strategy = fn(&str) -> Option<Vec<Value>>;

/// Tried in order; the first one producing at least one valid card wins.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("direct_json", parse_direct),
    ("embedded_array", parse_embedded_array),
    ("fenced_block", parse_fenced_block),
];

/// Turns a raw completion payload into validated cards
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseExtractor {
    mode: ExtractionMode,
}

impl ResponseExtractor {
    pub fn new(mode: ExtractionMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    pub fn extract(&self, payload: &Value) -> Result<Vec<Card>> {
        let text = response_text(payload);
        debug!(response_length = text.len(), mode = %self.mode, "Extracting cards from model response");

        if let Some(cards) = extract_from_text(&text) {
            return Ok(cards);
        }

        match self.mode {
            ExtractionMode::Strict => {
                warn!(response_length = text.len(), "No cards found in model response");
                Err(FlashcardError::Extraction)
            }
            ExtractionMode::Lenient => {
                warn!(response_length = text.len(), "No cards found in model response, using fallback card");
                Ok(vec![fallback_card(&text)])
            }
        }
    }
}

/// Concatenate the text blocks of a payload. Payloads without any text block
/// degrade to their own JSON serialisation.
pub fn response_text(payload: &Value) -> String {
    let blocks = payload.get("content").and_then(Value::as_array);

    let texts: Vec<&str> = blocks
        .into_iter()
        .flatten()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();

    if texts.is_empty() {
        warn!("Model response contained no text blocks");
        return payload.to_string();
    }

    texts.concat()
}

/// Run the strategy chain over already-concatenated response text.
pub fn extract_from_text(text: &str) -> Option<Vec<Card>> {
    for (name, strategy) in STRATEGIES {
        let Some(elements) = strategy(text) else {
            continue;
        };
        let cards = cards_from_elements(&elements);
        if cards.is_empty() {
            debug!(strategy = name, elements = elements.len(), "Strategy parsed JSON without valid cards");
            continue;
        }
        info!(strategy = name, card_count = cards.len(), "Extracted cards from model response");
        return Some(cards);
    }
    None
}

/// Keep object elements with a usable front and back; everything else is dropped.
fn cards_from_elements(elements: &[Value]) -> Vec<Card> {
    elements
        .iter()
        .filter(|element| element.is_object())
        .filter_map(|element| serde_json::from_value::<RawCard>(element.clone()).ok())
        .filter_map(|raw| normalize(&raw))
        .collect()
}

fn parse_direct(text: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(text.trim()).ok()? {
        Value::Array(elements) => Some(elements),
        _ => None,
    }
}

/// Look for `[ { ... } ]` anywhere in the text, matching brackets outward from
/// each candidate opening so the enclosing array is the smallest one.
fn parse_embedded_array(text: &str) -> Option<Vec<Value>> {
    for (start, _) in text.match_indices('[') {
        let after = text[start + 1..].trim_start();
        if !after.starts_with('{') {
            continue;
        }
        let Some(end) = matching_bracket(text, start) else {
            continue;
        };
        if let Ok(Value::Array(elements)) = serde_json::from_str::<Value>(&text[start..=end]) {
            if !cards_from_elements(&elements).is_empty() {
                return Some(elements);
            }
        }
    }
    None
}

/// Byte index of the `]` closing the `[` at `start`, skipping string contents.
fn matching_bracket(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return (ch == ']').then_some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_fenced_block(text: &str) -> Option<Vec<Value>> {
    FENCED_ARRAY.captures_iter(text).find_map(|captures| {
        match serde_json::from_str::<Value>(captures.get(1)?.as_str()).ok()? {
            Value::Array(elements) => Some(elements),
            _ => None,
        }
    })
}

fn fallback_card(text: &str) -> Card {
    let trimmed = text.trim();
    let back = if trimmed.is_empty() {
        EMPTY_RESPONSE_BACK.to_string()
    } else {
        truncate_chars(trimmed, FALLBACK_EXCERPT_CHARS, "...")
    };
    Card::new(FALLBACK_FRONT, back, DEFAULT_DECK)
}

/// Cut `text` to at most `max_chars` characters, appending `marker` when cut.
pub fn truncate_chars(text: &str, max_chars: usize, marker: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => format!("{}{}", &text[..byte_index], marker),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(text: &str) -> Value {
        json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text}]
        })
    }

    fn strict() -> ResponseExtractor {
        ResponseExtractor::new(ExtractionMode::Strict)
    }

    const CARDS_JSON: &str = r#"[{"front":"What is ownership?","back":"Rust's memory model.","deck":"Rust"},{"front":"What is a borrow?","back":"A reference."}]"#;

    #[test]
    fn test_direct_json_array() {
        let cards = strict().extract(&payload(CARDS_JSON)).unwrap();
        assert_eq!(
            cards,
            vec![
                Card::new("What is ownership?", "Rust's memory model.", "Rust"),
                Card::new("What is a borrow?", "A reference.", "General"),
            ]
        );
    }

    #[test]
    fn test_fenced_block_matches_unwrapped_result() {
        let fenced = format!("Here are your cards:\n```json\n{CARDS_JSON}\n```\nEnjoy!");
        let unwrapped = strict().extract(&payload(CARDS_JSON)).unwrap();
        let wrapped = strict().extract(&payload(&fenced)).unwrap();
        assert_eq!(wrapped, unwrapped);
    }

    #[test]
    fn test_fenced_block_strategy_on_its_own() {
        let fenced = format!("```JSON\n{CARDS_JSON}\n```");
        let elements = parse_fenced_block(&fenced).unwrap();
        assert_eq!(elements.len(), 2);
        assert!(parse_fenced_block("```\nnot json\n```").is_none());
    }

    #[test]
    fn test_fenced_pattern_is_shared_across_calls() {
        let fenced = format!("First:\n```json\n{CARDS_JSON}\n```");
        for _ in 0..3 {
            assert_eq!(parse_fenced_block(&fenced).map(|e| e.len()), Some(2));
        }
        assert!(FENCED_ARRAY.is_match("```[{\"front\":\"Q\"}]```"));
    }

    #[test]
    fn test_non_string_deck_keeps_the_card() {
        let text = r#"[{"front":"Q1","back":"A1","deck":3},{"front":"Q2","back":"A2","deck":null}]"#;
        let cards = strict().extract(&payload(text)).unwrap();
        assert_eq!(
            cards,
            vec![Card::new("Q1", "A1", "General"), Card::new("Q2", "A2", "General")]
        );
    }

    #[test]
    fn test_embedded_array_in_prose() {
        let text = format!("Sure! [note: see below]\n{CARDS_JSON}\nLet me know [if] you need more.");
        let cards = strict().extract(&payload(&text)).unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].deck, "Rust");
    }

    #[test]
    fn test_brackets_inside_strings_do_not_confuse_matching() {
        let text = r#"Cards: [{"front":"What does ] mean in [a, b]?","back":"It closes a slice."}] done"#;
        let cards = strict().extract(&payload(text)).unwrap();
        assert_eq!(cards, vec![Card::new("What does ] mean in [a, b]?", "It closes a slice.", "General")]);
    }

    #[test]
    fn test_invalid_elements_are_dropped() {
        let text = r#"[{"front":"Q1","back":"A1"},{"front":"Q2"},{"front":"Q3","back":"A3"}]"#;
        let cards = strict().extract(&payload(text)).unwrap();
        assert_eq!(
            cards,
            vec![Card::new("Q1", "A1", "General"), Card::new("Q3", "A3", "General")]
        );

        let mixed = r#"[1, "two", null, {"front": 5, "back": "x"}, {"front":"Q","back":"A","deck":""}]"#;
        let cards = strict().extract(&payload(mixed)).unwrap();
        assert_eq!(cards, vec![Card::new("Q", "A", "General")]);
    }

    #[test]
    fn test_text_blocks_are_concatenated() {
        let payload = json!({
            "content": [
                {"type": "text", "text": "[{\"front\":\"Q\","},
                {"type": "tool_use", "id": "t1", "name": "noop", "input": {}},
                {"type": "text", "text": "\"back\":\"A\"}]"}
            ]
        });
        assert_eq!(response_text(&payload), r#"[{"front":"Q","back":"A"}]"#);
        assert_eq!(strict().extract(&payload).unwrap().len(), 1);
    }

    #[test]
    fn test_payload_without_text_blocks_is_stringified() {
        let payload = json!({"error": {"type": "overloaded_error"}});
        assert_eq!(response_text(&payload), payload.to_string());
    }

    #[test]
    fn test_strict_mode_fails_without_cards() {
        let err = strict().extract(&payload("I cannot help with that.")).unwrap_err();
        assert!(matches!(err, FlashcardError::Extraction));

        let err = strict().extract(&payload("[]")).unwrap_err();
        assert!(matches!(err, FlashcardError::Extraction));
    }

    #[test]
    fn test_lenient_mode_returns_single_fallback_card() {
        let long_text = "x".repeat(500);
        let cards = ResponseExtractor::default().extract(&payload(&long_text)).unwrap();

        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].front, FALLBACK_FRONT);
        assert_eq!(cards[0].deck, "General");
        assert_eq!(cards[0].back.chars().count(), 303);
        assert!(cards[0].back.ends_with("..."));

        let cards = ResponseExtractor::default().extract(&payload("   ")).unwrap();
        assert_eq!(cards.len(), 1);
        assert!(!cards[0].back.is_empty());
    }

    #[test]
    fn test_extraction_mode_parsing() {
        assert_eq!("strict".parse::<ExtractionMode>(), Ok(ExtractionMode::Strict));
        assert_eq!(" Lenient ".parse::<ExtractionMode>(), Ok(ExtractionMode::Lenient));
        assert!("sometimes".parse::<ExtractionMode>().is_err());
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2, "…"), "hé…");
        assert_eq!(truncate_chars("short", 10, "..."), "short");
    }
}
