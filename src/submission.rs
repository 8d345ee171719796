use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use crate::error::{ExamError, Result};
use crate::question::{OptionId, QuestionId, QuestionSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum SubmitReason {
    #[strum(serialize = "manual")]
    Manual,
    #[strum(serialize = "expired")]
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub correct: usize,
    pub total: usize,
}

impl Score {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        ((self.correct as f64 / self.total as f64) * 100.0).round()
    }
}

/// Final snapshot of a session, handed to the sink exactly once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub exam_id: String,
    pub exam_title: String,
    pub answers: BTreeMap<QuestionId, OptionId>,
    pub flags: BTreeSet<QuestionId>,
    pub question_count: usize,
    pub remaining_secs: u64,
    pub elapsed_secs: u64,
    pub reason: SubmitReason,
    pub submitted_at: DateTime<Local>,
    pub score: Option<Score>,
}

impl Submission {
    pub fn unanswered(&self) -> usize {
        self.question_count - self.answers.len()
    }

    /// Same outcome, ignoring when it was submitted
    pub fn same_outcome(&self, other: &Submission) -> bool {
        self.exam_id == other.exam_id
            && self.answers == other.answers
            && self.flags == other.flags
            && self.question_count == other.question_count
            && self.remaining_secs == other.remaining_secs
            && self.reason == other.reason
            && self.score == other.score
    }
}

/// Scores `answers` against the answer keys, if every question has one
pub fn score(questions: &QuestionSet, answers: &BTreeMap<QuestionId, OptionId>) -> Option<Score> {
    if !questions.is_scorable() {
        return None;
    }
    let correct = questions
        .iter()
        .filter(|q| q.answer.is_some() && answers.get(&q.id) == q.answer.as_ref())
        .count();
    Some(Score {
        correct,
        total: questions.count(),
    })
}

/// Acknowledgement returned by a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub reference: String,
}

/// Where finished sessions go
pub trait SubmissionSink {
    fn submit(&mut self, submission: &Submission) -> Result<Receipt>;
}

/// Sink that only logs the submission
#[derive(Debug, Default)]
pub struct LogSink;

impl SubmissionSink for LogSink {
    fn submit(&mut self, submission: &Submission) -> Result<Receipt> {
        tracing::info!(
            exam = %submission.exam_id,
            answered = submission.answers.len(),
            total = submission.question_count,
            reason = %submission.reason,
            "submission logged"
        );
        Ok(Receipt {
            reference: format!("log:{}", submission.submitted_at.timestamp()),
        })
    }
}

/// In-memory sink; clones share the same storage
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    received: Arc<Mutex<Vec<Submission>>>,
    fail: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every submit call fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn received(&self) -> Vec<Submission> {
        self.received
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

impl SubmissionSink for MemorySink {
    fn submit(&mut self, submission: &Submission) -> Result<Receipt> {
        let mut received = self
            .received
            .lock()
            .map_err(|e| ExamError::SinkUnavailable(e.to_string()))?;
        received.push(submission.clone());
        if self.fail {
            return Err(ExamError::SinkUnavailable("memory sink set to fail".into()));
        }
        Ok(Receipt {
            reference: format!("memory:{}", received.len()),
        })
    }
}
