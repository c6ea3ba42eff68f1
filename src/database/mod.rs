use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, Sqlite, SqlitePool, migrate::MigrateDatabase};
use tracing::info;

use crate::models::Progress;

/// Per-owner delivery progress and the chat messages posted for it.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(db_url: &str) -> Result<Self> {
        // Create database file if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            if let Some(parent) = file_path(db_url).and_then(Path::parent) {
                tokio::fs::create_dir_all(parent).await?;
            }
            info!("Creating database file");
            Sqlite::create_database(db_url).await?;
        }

        // In-memory databases live per connection, so keep exactly one.
        let in_memory = db_url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .connect(db_url)
            .await?;

        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Database initialized successfully");
        Ok(Self { pool })
    }

    pub async fn get_progress(&self, user_id: i64) -> Result<Option<Progress>> {
        let row = sqlx::query(
            "SELECT current_index, total_tracks, json_file FROM user_progress WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Progress {
            current_index: row.get("current_index"),
            total_tracks: row.get("total_tracks"),
            json_file: row.get("json_file"),
        }))
    }

    pub async fn update_progress(&self, user_id: i64, progress: &Progress) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO user_progress (user_id, current_index, total_tracks, json_file)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                current_index = excluded.current_index,
                total_tracks = excluded.total_tracks,
                json_file = excluded.json_file
            ",
        )
        .bind(user_id)
        .bind(progress.current_index)
        .bind(progress.total_tracks)
        .bind(&progress.json_file)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Forget the owner's progress and posted messages.
    pub async fn reset_progress(&self, user_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM user_progress WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM user_messages WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    pub async fn save_message(&self, user_id: i64, message_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO user_messages (user_id, bot_message_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(message_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn messages(&self, user_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT bot_message_id FROM user_messages WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>("bot_message_id"))
            .collect())
    }

    pub async fn clear_messages(&self, user_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM user_messages WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

fn file_path(db_url: &str) -> Option<&Path> {
    let path = db_url.strip_prefix("sqlite:")?;
    let path = path.strip_prefix("//").unwrap_or(path);
    let path = path.split('?').next()?;
    (!path.is_empty() && !path.contains(":memory:")).then(|| Path::new(path))
}
