//! Read-only queries over the marts and the detections table.

use chrono::NaiveDate;
use rusqlite::params;

use crate::db::Database;
use crate::error::{PipelineError, Result};
use crate::models::{ChannelActivity, MessageSearchHit, TopProduct};
use crate::validation::InputValidator;

/// Most rows a message search returns
pub const SEARCH_RESULT_LIMIT: i64 = 50;

/// Requested size of the top-products report, always within `1..=100`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopLimit(i64);

impl TopLimit {
    pub fn new(limit: i64) -> Result<Self> {
        InputValidator::validate_top_limit(limit).map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
        Ok(Self(limit))
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl Default for TopLimit {
    fn default() -> Self {
        Self(10)
    }
}

/// Escape `LIKE` wildcards so the query matches literally
fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Analytics queries; cheap to clone, one pooled connection per call
#[derive(Clone)]
pub struct Analytics {
    db: Database,
}

impl Analytics {
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// The most frequently detected labels, most frequent first
    pub fn top_products(&self, limit: TopLimit) -> Result<Vec<TopProduct>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT product_label, COUNT(*) AS mention_count
             FROM image_detections
             GROUP BY product_label
             ORDER BY mention_count DESC, product_label ASC
             LIMIT ?",
        )?;

        let rows = stmt.query_map(params![limit.get()], |row| {
            Ok(TopProduct {
                product_label: row.get(0)?,
                mention_count: row.get(1)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Messages whose text contains `query`, ignoring case
    pub fn search_messages(&self, query: &str) -> Result<Vec<MessageSearchHit>> {
        InputValidator::validate_search_query(query).map_err(|e| PipelineError::InvalidInput(e.to_string()))?;

        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT f.message_id, c.channel_name, f.message_text, f.has_media, f.media_type, f.media_path
             FROM fct_messages f
             JOIN dim_channels c ON c.channel_id = f.channel_id
             WHERE unicode_lower(f.message_text) LIKE '%' || ? || '%' ESCAPE '\\'
             ORDER BY f.rowid
             LIMIT ?",
        )?;

        let rows = stmt.query_map(params![escape_like(&query.to_lowercase()), SEARCH_RESULT_LIMIT], |row| {
            Ok(MessageSearchHit {
                message_id: row.get(0)?,
                channel_name: row.get(1)?,
                message_text: row.get(2)?,
                has_media: row.get(3)?,
                media_type: row.get(4)?,
                media_path: row.get(5)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Daily message counts for one channel, oldest day first.
    ///
    /// An unknown channel has no activity rather than being an error.
    pub fn channel_activity(&self, channel_name: &str) -> Result<Vec<ChannelActivity>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT d.date, COUNT(*)
             FROM fct_messages f
             JOIN dim_channels c ON c.channel_id = f.channel_id
             JOIN dim_dates d ON d.date_id = f.date_id
             WHERE c.channel_name = ?
             GROUP BY d.date
             ORDER BY d.date",
        )?;

        let rows = stmt.query_map(params![channel_name], |row| {
            Ok(ChannelActivity {
                date: row.get::<_, NaiveDate>(0)?,
                message_count: row.get(1)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Every channel in the channel dimension, by name
    pub fn list_channels(&self) -> Result<Vec<String>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare("SELECT channel_name FROM dim_channels ORDER BY channel_name")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_limit_bounds() {
        assert!(TopLimit::new(0).is_err());
        assert!(TopLimit::new(101).is_err());
        assert_eq!(TopLimit::new(100).unwrap().get(), 100);
        assert_eq!(TopLimit::default().get(), 10);
    }

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        assert_eq!(escape_like("plain"), "plain");
    }
}
