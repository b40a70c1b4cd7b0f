//! Warehouse mart refresh.
//!
//! The marts (`dim_channels`, `dim_dates`, `fct_messages`) are derived from
//! the raw message table. They are rebuilt either by the built-in SQL below or
//! by an external transformation command such as `dbt run`.

use std::path::PathBuf;

use tokio::process::Command;
use tracing::{info, warn};

use crate::config::TransformConfig;
use crate::db::Database;
use crate::error::{PipelineError, Result};

/// Rebuilds the marts from scratch in one transaction.
///
/// Duplicate raw rows (from re-loading the same files) collapse into a single
/// fact per `(channel, message_id)`; the first loaded copy wins.
const REFRESH_MARTS_SQL: &str = "
DELETE FROM fct_messages;
DELETE FROM dim_dates;
DELETE FROM dim_channels;

INSERT INTO dim_channels (channel_name)
SELECT DISTINCT channel_name FROM telegram_messages ORDER BY channel_name;

INSERT INTO dim_dates (date)
SELECT DISTINCT substr(date, 1, 10) FROM telegram_messages ORDER BY 1;

INSERT OR IGNORE INTO fct_messages
    (message_id, channel_id, date_id, message_text, has_media, media_type, media_path)
SELECT t.message_id, c.channel_id, d.date_id, t.text, t.has_media, t.media_type, t.media_path
FROM telegram_messages t
JOIN dim_channels c ON c.channel_name = t.channel_name
JOIN dim_dates d ON d.date = substr(t.date, 1, 10)
ORDER BY t.rowid;
";

/// Row counts of the marts after a refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MartCounts {
    pub channels: usize,
    pub dates: usize,
    pub facts: usize,
}

/// Rebuild the marts with the built-in SQL
pub fn refresh_marts(db: &Database) -> Result<MartCounts> {
    let mut conn = db.get_connection()?;
    let tx = conn.transaction()?;
    tx.execute_batch(REFRESH_MARTS_SQL)?;

    let count = |table: &str| -> Result<usize> {
        let n: i64 = tx.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        usize::try_from(n).map_err(|e| PipelineError::Other(e.to_string()))
    };
    let counts = MartCounts {
        channels: count("dim_channels")?,
        dates: count("dim_dates")?,
        facts: count("fct_messages")?,
    };
    tx.commit()?;

    info!(
        channels = counts.channels,
        dates = counts.dates,
        facts = counts.facts,
        "Marts refreshed"
    );
    Ok(counts)
}

/// How the transform step produces the marts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform {
    Builtin,
    /// External program, e.g. `dbt run` in the dbt project directory
    Command {
        program: String,
        args: Vec<String>,
        working_dir: Option<PathBuf>,
    },
}

impl Transform {
    pub fn from_config(config: &TransformConfig) -> Result<Self> {
        match config.mode.as_str() {
            "builtin" => Ok(Self::Builtin),
            "command" => {
                let program = config
                    .command
                    .clone()
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| PipelineError::InvalidConfig("transform.command is not set".into()))?;
                Ok(Self::Command {
                    program,
                    args: config.args.clone(),
                    working_dir: config.working_dir.as_ref().map(PathBuf::from),
                })
            }
            other => Err(PipelineError::InvalidConfig(format!("unknown transform mode '{other}'"))),
        }
    }

    pub async fn run(&self, db: &Database) -> Result<()> {
        match self {
            Self::Builtin => {
                let db = db.clone();
                tokio::task::spawn_blocking(move || refresh_marts(&db)).await??;
                Ok(())
            }
            Self::Command {
                program,
                args,
                working_dir,
            } => run_command(program, args, working_dir.as_ref()).await,
        }
    }
}

async fn run_command(program: &str, args: &[String], working_dir: Option<&PathBuf>) -> Result<()> {
    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = working_dir {
        command.current_dir(dir);
    }

    info!(program, ?args, "Running transformation command");
    let output = command
        .output()
        .await
        .map_err(|e| PipelineError::Other(format!("failed to run {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(program, status = %output.status, stderr = %stderr.trim(), "Transformation command failed");
        return Err(PipelineError::Other(format!("{program} exited with {}", output.status)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageRecord, RawMessage};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tempfile::tempdir;

    fn raw(id: i64, channel: &str, day: u32) -> RawMessage {
        let ts = Utc.with_ymd_and_hms(2024, 5, day, 9, 0, 0).unwrap();
        RawMessage {
            record: MessageRecord::new(id, channel, ts, Some(format!("message {id}")), false),
            raw_data: "{}".into(),
        }
    }

    #[test]
    fn refresh_builds_dimensions_and_facts() {
        let dir = tempdir().unwrap();
        let db = Database::new(&dir.path().join("w.db"), 2, Duration::from_secs(5)).unwrap();
        db.insert_raw_messages(&[raw(1, "demo", 1), raw(2, "demo", 2), raw(3, "other", 2)])
            .unwrap();

        let counts = refresh_marts(&db).unwrap();
        assert_eq!(
            counts,
            MartCounts {
                channels: 2,
                dates: 2,
                facts: 3
            }
        );
    }

    #[test]
    fn refresh_collapses_reloaded_rows() {
        let dir = tempdir().unwrap();
        let db = Database::new(&dir.path().join("w.db"), 2, Duration::from_secs(5)).unwrap();
        let rows = [raw(1, "demo", 1), raw(2, "demo", 1)];
        db.insert_raw_messages(&rows).unwrap();
        db.insert_raw_messages(&rows).unwrap();

        assert_eq!(refresh_marts(&db).unwrap().facts, 2);
        // Refreshing again starts from scratch
        assert_eq!(refresh_marts(&db).unwrap().facts, 2);
    }

    #[test]
    fn command_mode_requires_a_command() {
        let config = TransformConfig {
            mode: "command".into(),
            command: None,
            args: Vec::new(),
            working_dir: None,
        };
        assert!(matches!(
            Transform::from_config(&config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_is_an_error() {
        let dir = tempdir().unwrap();
        let db = Database::new(&dir.path().join("w.db"), 2, Duration::from_secs(5)).unwrap();
        let transform = Transform::Command {
            program: "sh".into(),
            args: vec!["-c".into(), "exit 1".into()],
            working_dir: Some(dir.path().to_path_buf()),
        };
        assert!(transform.run(&db).await.is_err());
    }
}
