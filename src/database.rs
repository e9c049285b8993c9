use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::card_store::CardPersistence;
use crate::errors::Result;
use crate::log_db_operation;
use crate::models::*;

const SELECTION_KEY: &str = "selected_text";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS generated_cards (
                position INTEGER PRIMARY KEY,
                front TEXT NOT NULL,
                back TEXT NOT NULL,
                deck TEXT NOT NULL DEFAULT 'General'
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        log_db_operation!(info, "migration", "database initialized");
        Ok(())
    }
}

#[async_trait]
impl CardPersistence for Database {
    async fn load_cards(&self) -> Result<Vec<Card>> {
        let cards = sqlx::query_as::<_, Card>(
            "SELECT front, back, deck FROM generated_cards ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await?;

        log_db_operation!(debug, "load_cards", count = cards.len());
        Ok(cards)
    }

    async fn save_cards(&self, cards: &[Card]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM generated_cards")
            .execute(&mut *tx)
            .await?;

        for (position, card) in cards.iter().enumerate() {
            sqlx::query(
                "INSERT INTO generated_cards (position, front, back, deck) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(position as i64)
            .bind(&card.front)
            .bind(&card.back)
            .bind(&card.deck)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        log_db_operation!(debug, "save_cards", count = cards.len());
        Ok(())
    }

    async fn clear_cards(&self) -> Result<()> {
        sqlx::query("DELETE FROM generated_cards")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_selection(&self) -> Result<Option<SelectedText>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?1")
            .bind(SELECTION_KEY)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let value: String = row.try_get("value")?;
                Ok(Some(serde_json::from_str(&value)?))
            }
            None => Ok(None),
        }
    }

    async fn save_selection(&self, selection: &SelectedText) -> Result<()> {
        let value = serde_json::to_string(selection)?;
        sqlx::query(
            r#"
            INSERT INTO settings (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(SELECTION_KEY)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
