use chrono::{DateTime, Local, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::error::{ExamError, Result};
use crate::question::{OptionId, QuestionId};
use crate::submission::{Receipt, SubmitReason, Submission, SubmissionSink};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS submissions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        exam_id TEXT NOT NULL,
        exam_title TEXT NOT NULL,
        question_count INTEGER NOT NULL,
        answered INTEGER NOT NULL,
        flagged INTEGER NOT NULL,
        remaining_secs INTEGER NOT NULL,
        elapsed_secs INTEGER NOT NULL,
        reason TEXT NOT NULL,
        score_correct INTEGER,
        answers TEXT NOT NULL,
        submitted_at TEXT NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_submissions_exam ON submissions(exam_id);
    CREATE INDEX IF NOT EXISTS idx_submissions_submitted_at ON submissions(submitted_at);
"#;

/// One stored submission
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub id: i64,
    pub exam_id: String,
    pub exam_title: String,
    pub question_count: usize,
    pub answered: usize,
    pub flagged: usize,
    pub remaining_secs: u64,
    pub elapsed_secs: u64,
    pub reason: SubmitReason,
    pub score_correct: Option<usize>,
    pub answers: BTreeMap<QuestionId, OptionId>,
    pub submitted_at: DateTime<Local>,
}

impl HistoryRecord {
    pub fn score_percent(&self) -> Option<f64> {
        self.score_correct.map(|correct| {
            if self.question_count == 0 {
                0.0
            } else {
                ((correct as f64 / self.question_count as f64) * 100.0).round()
            }
        })
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let reason_str: String = row.get(8)?;
        let reason = match reason_str.as_str() {
            "manual" => SubmitReason::Manual,
            "expired" => SubmitReason::Expired,
            other => {
                return Err(rusqlite::Error::FromSqlConversionFailure(
                    8,
                    rusqlite::types::Type::Text,
                    format!("unknown submit reason '{other}'").into(),
                ))
            }
        };
        let answers_json: String = row.get(10)?;
        let answers = serde_json::from_str(&answers_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let submitted_at_str: String = row.get(11)?;
        let submitted_at = DateTime::parse_from_rfc3339(&submitted_at_str)
            .map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    11,
                    "submitted_at".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?
            .with_timezone(&Local);

        Ok(Self {
            id: row.get(0)?,
            exam_id: row.get(1)?,
            exam_title: row.get(2)?,
            question_count: row.get(3)?,
            answered: row.get(4)?,
            flagged: row.get(5)?,
            remaining_secs: row.get(6)?,
            elapsed_secs: row.get(7)?,
            reason,
            score_correct: row.get(9)?,
            answers,
            submitted_at,
        })
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    submitted_at: String,
    exam_id: &'a str,
    exam_title: &'a str,
    answered: usize,
    question_count: usize,
    flagged: usize,
    elapsed_secs: u64,
    remaining_secs: u64,
    reason: String,
    score_percent: Option<f64>,
}

/// Local store of finished sessions
#[derive(Debug)]
pub struct HistoryDb {
    conn: Connection,
}

impl HistoryDb {
    /// Open the database at the default state location
    pub fn new() -> Result<Self> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("proctor_history.db"));
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path.as_ref())?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Store a submission and return its row id
    pub fn record(&self, submission: &Submission) -> Result<i64> {
        let answers = serde_json::to_string(&submission.answers)?;
        self.conn.execute(
            r#"
            INSERT INTO submissions
            (exam_id, exam_title, question_count, answered, flagged, remaining_secs,
             elapsed_secs, reason, score_correct, answers, submitted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                submission.exam_id,
                submission.exam_title,
                submission.question_count,
                submission.answers.len(),
                submission.flags.len(),
                submission.remaining_secs,
                submission.elapsed_secs,
                submission.reason.to_string(),
                submission.score.map(|s| s.correct),
                answers,
                submission
                    .submitted_at
                    .with_timezone(&Utc)
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent submissions first
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, exam_id, exam_title, question_count, answered, flagged, remaining_secs,
                   elapsed_secs, reason, score_correct, answers, submitted_at
            FROM submissions
            ORDER BY submitted_at DESC, id DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt.query_map([limit as i64], HistoryRecord::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn for_exam(&self, exam_id: &str) -> Result<Vec<HistoryRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, exam_id, exam_title, question_count, answered, flagged, remaining_secs,
                   elapsed_secs, reason, score_correct, answers, submitted_at
            FROM submissions
            WHERE exam_id = ?1
            ORDER BY submitted_at DESC, id DESC
            "#,
        )?;
        let rows = stmt.query_map([exam_id], HistoryRecord::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM submissions", [])?;
        Ok(())
    }

    /// Write every stored submission as CSV, oldest first. Returns the row count.
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let mut records = self.recent(i64::MAX as usize)?;
        records.reverse();

        let mut wtr = csv::Writer::from_writer(writer);
        for record in &records {
            wtr.serialize(CsvRow {
                submitted_at: record.submitted_at.to_rfc3339(),
                exam_id: &record.exam_id,
                exam_title: &record.exam_title,
                answered: record.answered,
                question_count: record.question_count,
                flagged: record.flagged,
                elapsed_secs: record.elapsed_secs,
                remaining_secs: record.remaining_secs,
                reason: record.reason.to_string(),
                score_percent: record.score_percent(),
            })?;
        }
        wtr.flush()?;
        Ok(records.len())
    }
}

/// Submission sink backed by the history database
#[derive(Debug)]
pub struct HistorySink {
    db: HistoryDb,
}

impl HistorySink {
    pub fn new(db: HistoryDb) -> Self {
        Self { db }
    }
}

impl SubmissionSink for HistorySink {
    fn submit(&mut self, submission: &Submission) -> Result<Receipt> {
        let id = self
            .db
            .record(submission)
            .map_err(|e| ExamError::SinkUnavailable(e.to_string()))?;
        Ok(Receipt {
            reference: format!("history:{id}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::Score;
    use assert_matches::assert_matches;
    use std::collections::BTreeSet;

    fn submission(exam_id: &str, minutes_ago: i64, reason: SubmitReason) -> Submission {
        Submission {
            exam_id: exam_id.into(),
            exam_title: format!("{exam_id} title"),
            answers: BTreeMap::from([(QuestionId(1), OptionId::B), (QuestionId(3), OptionId::A)]),
            flags: BTreeSet::from([QuestionId(2)]),
            question_count: 4,
            remaining_secs: 30,
            elapsed_secs: 90,
            reason,
            submitted_at: Local::now() - chrono::Duration::minutes(minutes_ago),
            score: Some(Score {
                correct: 2,
                total: 4,
            }),
        }
    }

    #[test]
    fn test_record_and_read_back() {
        let db = HistoryDb::open_in_memory().unwrap();
        let original = submission("sample", 0, SubmitReason::Expired);
        db.record(&original).unwrap();

        let records = db.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.exam_id, "sample");
        assert_eq!(r.answered, 2);
        assert_eq!(r.flagged, 1);
        assert_eq!(r.question_count, 4);
        assert_eq!(r.reason, SubmitReason::Expired);
        assert_eq!(r.score_correct, Some(2));
        assert_eq!(r.score_percent(), Some(50.0));
        assert_eq!(r.answers, original.answers);
        assert_eq!(r.submitted_at.timestamp(), original.submitted_at.timestamp());
    }

    #[test]
    fn test_recent_is_newest_first_and_limited() {
        let db = HistoryDb::open_in_memory().unwrap();
        db.record(&submission("a", 30, SubmitReason::Manual)).unwrap();
        db.record(&submission("b", 10, SubmitReason::Manual)).unwrap();
        db.record(&submission("c", 20, SubmitReason::Manual)).unwrap();

        let ids: Vec<String> = db.recent(2).unwrap().into_iter().map(|r| r.exam_id).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(db.count().unwrap(), 3);
    }

    #[test]
    fn test_for_exam_filters() {
        let db = HistoryDb::open_in_memory().unwrap();
        db.record(&submission("a", 3, SubmitReason::Manual)).unwrap();
        db.record(&submission("b", 2, SubmitReason::Manual)).unwrap();
        db.record(&submission("a", 1, SubmitReason::Manual)).unwrap();

        assert_eq!(db.for_exam("a").unwrap().len(), 2);
        assert!(db.for_exam("zzz").unwrap().is_empty());
    }

    #[test]
    fn test_timestamps_stored_as_utc() {
        let db = HistoryDb::open_in_memory().unwrap();
        db.record(&submission("a", 0, SubmitReason::Manual)).unwrap();

        let stored: String = db
            .conn
            .query_row("SELECT submitted_at FROM submissions", [], |row| row.get(0))
            .unwrap();
        assert!(stored.ends_with('Z'), "{stored}");
    }

    #[test]
    fn test_order_survives_offset_change() {
        let db = HistoryDb::open_in_memory().unwrap();
        // 01:30 at -04:00 is 05:30 UTC, 01:10 at -05:00 is 06:10 UTC: the
        // second is later although its local wall clock reads earlier
        let mut before = submission("before", 0, SubmitReason::Manual);
        before.submitted_at = DateTime::parse_from_rfc3339("2024-11-03T01:30:00-04:00")
            .unwrap()
            .with_timezone(&Local);
        let mut after = submission("after", 0, SubmitReason::Manual);
        after.submitted_at = DateTime::parse_from_rfc3339("2024-11-03T01:10:00-05:00")
            .unwrap()
            .with_timezone(&Local);
        db.record(&after).unwrap();
        db.record(&before).unwrap();

        let ids: Vec<String> = db.recent(10).unwrap().into_iter().map(|r| r.exam_id).collect();
        assert_eq!(ids, vec!["after", "before"]);
    }

    #[test]
    fn test_unknown_reason_fails_the_row() {
        let db = HistoryDb::open_in_memory().unwrap();
        db.record(&submission("a", 0, SubmitReason::Expired)).unwrap();
        db.conn
            .execute("UPDATE submissions SET reason = 'abandoned'", [])
            .unwrap();

        assert_matches!(
            db.recent(10),
            Err(ExamError::Database(rusqlite::Error::FromSqlConversionFailure(8, _, _)))
        );
    }

    #[test]
    fn test_clear_all() {
        let db = HistoryDb::open_in_memory().unwrap();
        db.record(&submission("a", 0, SubmitReason::Manual)).unwrap();
        db.clear_all().unwrap();
        assert_eq!(db.count().unwrap(), 0);
    }

    #[test]
    fn test_export_csv() {
        let db = HistoryDb::open_in_memory().unwrap();
        db.record(&submission("new", 1, SubmitReason::Manual)).unwrap();
        db.record(&submission("old", 5, SubmitReason::Expired)).unwrap();

        let mut out = Vec::new();
        assert_eq!(db.export_csv(&mut out).unwrap(), 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "submitted_at,exam_id,exam_title,answered,question_count,flagged,elapsed_secs,remaining_secs,reason,score_percent"
        );
        assert!(lines[1].contains(",old,"));
        assert!(lines[1].contains(",expired,"));
        assert!(lines[2].contains(",new,"));
    }

    #[test]
    fn test_history_sink_receipt() {
        let db = HistoryDb::open_in_memory().unwrap();
        let mut sink = HistorySink::new(db);
        let receipt = sink
            .submit(&submission("a", 0, SubmitReason::Manual))
            .unwrap();
        assert_eq!(receipt.reference, "history:1");
    }
}
