use crate::models::{Card, RawCard, DEFAULT_DECK};

/// Validate and tidy a raw card. Returns `None` when the front or back is blank.
///
/// Every path that puts cards into circulation (model extraction, user edits,
/// command-line imports) goes through this function so they share one schema.
pub fn normalize(raw: &RawCard) -> Option<Card> {
    let front = raw.front.as_deref().map(str::trim).unwrap_or_default();
    let back = raw.back.as_deref().map(str::trim).unwrap_or_default();
    if front.is_empty() || back.is_empty() {
        return None;
    }

    let deck = raw
        .deck
        .as_deref()
        .map(str::trim)
        .filter(|deck| !deck.is_empty())
        .unwrap_or(DEFAULT_DECK);

    Some(Card::new(front, back, deck))
}

/// Normalize a whole list, failing on the first invalid entry with its index.
pub fn normalize_all(raw_cards: &[RawCard]) -> Result<Vec<Card>, usize> {
    raw_cards
        .iter()
        .enumerate()
        .map(|(index, raw)| normalize(raw).ok_or(index))
        .collect()
}
