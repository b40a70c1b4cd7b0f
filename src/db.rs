use std::fs;
use std::path::Path;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection, Row};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use crate::models::{DetectionRecord, PhotoMessage, RawMessage};
use crate::schema::{image_detections, telegram_messages};

// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// SQL functions every pooled connection needs.
///
/// `unicode_lower(text)` lowercases with full Unicode rules; the built-in
/// `lower()` only folds ASCII.
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "unicode_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

/// Warehouse handle: a pool of connections to the SQLite database
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (creating if needed) the warehouse at `path` and run migrations
    pub fn new(path: &Path, max_connections: u32, connection_timeout: Duration) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| {
                conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
                register_functions(conn)
            });
        let pool = Pool::builder()
            .max_size(max_connections)
            .connection_timeout(connection_timeout)
            .build(manager)?;

        let conn = pool.get()?;
        Self::run_migrations(&conn)?;
        info!(path = %path.display(), "Warehouse database ready");

        Ok(Self { pool })
    }

    /// Open the warehouse described by the application configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            &config.database_path(),
            config.database.max_connections,
            Duration::from_secs(config.database.connection_timeout_secs),
        )
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(include_str!("../migrations/2024-06-01-000000_create_raw_tables/up.sql"))?;
        conn.execute_batch(include_str!("../migrations/2024-06-01-000001_create_marts/up.sql"))?;
        debug!("Migrations applied");
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Insert one file's worth of raw messages in a single transaction.
    ///
    /// Either every row is committed or none is.
    pub fn insert_raw_messages(&self, rows: &[RawMessage]) -> Result<usize> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                telegram_messages::TABLE,
                telegram_messages::MESSAGE_ID,
                telegram_messages::CHANNEL_NAME,
                telegram_messages::DATE,
                telegram_messages::TEXT,
                telegram_messages::HAS_MEDIA,
                telegram_messages::MEDIA_TYPE,
                telegram_messages::MEDIA_PATH,
                telegram_messages::RAW_DATA
            ))?;

            for row in rows {
                let record = &row.record;
                stmt.execute(params![
                    record.message_id,
                    record.channel_name,
                    record.timestamp,
                    record.text,
                    record.has_media,
                    record.media_type.map(|m| m.as_str()),
                    record.media_path,
                    row.raw_data
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Raw messages that reference a downloaded photo, in storage order
    pub fn photo_messages(&self) -> Result<Vec<PhotoMessage>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, {}, {} FROM {} WHERE {} = 1 AND {} = 'photo' AND {} IS NOT NULL ORDER BY rowid",
            telegram_messages::MESSAGE_ID,
            telegram_messages::CHANNEL_NAME,
            telegram_messages::MEDIA_PATH,
            telegram_messages::TABLE,
            telegram_messages::HAS_MEDIA,
            telegram_messages::MEDIA_TYPE,
            telegram_messages::MEDIA_PATH
        ))?;

        let rows = stmt.query_map([], |row| {
            Ok(PhotoMessage {
                message_id: row.get(0)?,
                channel_name: row.get(1)?,
                media_path: row.get(2)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Bulk insert detections in one transaction
    pub fn insert_detections(&self, detections: &[DetectionRecord]) -> Result<usize> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} ({}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?)",
                image_detections::TABLE,
                image_detections::MESSAGE_ID,
                image_detections::CHANNEL_NAME,
                image_detections::PRODUCT_LABEL,
                image_detections::CONFIDENCE,
                image_detections::BOUNDING_BOX
            ))?;

            for detection in detections {
                stmt.execute(params![
                    detection.message_id,
                    detection.channel_name,
                    detection.product_label,
                    detection.confidence,
                    serde_json::to_string(&detection.bounding_box)?
                ])?;
            }
        }
        tx.commit()?;
        Ok(detections.len())
    }

    /// All stored detections, in insertion order
    pub fn detections(&self) -> Result<Vec<DetectionRecord>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {}, {}, {}, {}, {} FROM {} ORDER BY rowid",
            image_detections::MESSAGE_ID,
            image_detections::CHANNEL_NAME,
            image_detections::PRODUCT_LABEL,
            image_detections::CONFIDENCE,
            image_detections::BOUNDING_BOX,
            image_detections::TABLE
        ))?;

        let rows = stmt.query_map([], Self::map_detection)?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Map a database row to a `DetectionRecord`
    fn map_detection(row: &Row) -> rusqlite::Result<DetectionRecord> {
        let bbox: String = row.get(4)?;
        let bounding_box = serde_json::from_str(&bbox).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;
        Ok(DetectionRecord {
            message_id: row.get(0)?,
            channel_name: row.get(1)?,
            product_label: row.get(2)?,
            confidence: row.get(3)?,
            bounding_box,
        })
    }

    /// Number of rows in the raw message table
    pub fn count_raw_messages(&self) -> Result<usize> {
        self.count_rows(telegram_messages::TABLE)
    }

    /// Number of rows in the detections table
    pub fn count_detections(&self) -> Result<usize> {
        self.count_rows(image_detections::TABLE)
    }

    fn count_rows(&self, table: &str) -> Result<usize> {
        let conn = self.get_connection()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        usize::try_from(count).map_err(|e| PipelineError::Other(e.to_string()))
    }
}
