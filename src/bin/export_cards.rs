use anyhow::{anyhow, Context, Result};
use std::env;
use std::sync::Arc;

use flashcard_generator::config::Config;
use flashcard_generator::exporter::{deck_tag, record_content};
use flashcard_generator::{normalize, Card, ExportService, MochiClient, RawCard};

#[derive(Debug, Default)]
struct ImportStats {
    total_cards: usize,
    skipped: Vec<usize>,
}

impl ImportStats {
    fn print_summary(&self) {
        println!("\n=== Import Summary ===");
        println!("Cards read: {}", self.total_cards);
        println!("Cards accepted: {}", self.total_cards - self.skipped.len());
        if !self.skipped.is_empty() {
            println!("Cards skipped (blank front or back):");
            for position in &self.skipped {
                println!("  - position {}", position);
            }
        }
    }
}

fn load_cards(path: &str) -> Result<(Vec<Card>, ImportStats)> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Could not read {}", path))?;
    let raw: Vec<RawCard> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of cards", path))?;

    let mut stats = ImportStats {
        total_cards: raw.len(),
        ..Default::default()
    };
    let mut cards = Vec::with_capacity(raw.len());
    for (position, raw_card) in raw.iter().enumerate() {
        match normalize(raw_card) {
            Some(card) => cards.push(card),
            None => stats.skipped.push(position),
        }
    }
    Ok((cards, stats))
}

fn print_preview(position: usize, card: &Card) {
    println!("\nCard {} (deck \"{}\")", position, card.deck);
    if let Some(tag) = deck_tag(&card.deck) {
        println!("  Tag: {}", tag);
    }
    for line in record_content(card).lines() {
        println!("  | {}", line);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().skip(1).collect();
    let dry_run = args.iter().any(|arg| arg == "--dry-run");
    let path = args
        .iter()
        .find(|arg| !arg.starts_with("--"))
        .ok_or_else(|| anyhow!("Usage: export_cards <cards.json> [--dry-run]"))?;

    let (cards, stats) = load_cards(path)?;
    stats.print_summary();

    if cards.is_empty() {
        println!("\nNothing to export.");
        return Ok(());
    }

    if dry_run {
        for (position, card) in cards.iter().enumerate() {
            print_preview(position, card);
        }
        println!("\n** DRY RUN MODE - nothing was sent **");
        return Ok(());
    }

    let config = Config::from_env()?;
    let api_key = config
        .export
        .api_key
        .as_deref()
        .ok_or_else(|| anyhow!("MOCHI_API_KEY must be set to export cards"))?;
    let client = MochiClient::new(api_key, config.export.base_url.clone());
    let service =
        ExportService::new(Arc::new(client)).with_max_concurrency(config.export.max_concurrency);

    let summary = service.export(&cards).await?;

    println!("\n=== Export Summary ===");
    println!(
        "Exported {} of {} cards",
        summary.total_success, summary.total_cards
    );
    for (position, result) in summary.results.iter().enumerate() {
        if result.success {
            println!("  [{}] ok   {}", position, result.id.as_deref().unwrap_or("unknown"));
        } else {
            println!(
                "  [{}] fail {} {}",
                position,
                result.error.as_deref().unwrap_or("unknown error"),
                result.details.as_deref().unwrap_or("")
            );
        }
    }

    if !summary.success {
        return Err(anyhow!("No card was exported"));
    }
    Ok(())
}
