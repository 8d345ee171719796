use thiserror::Error;

use crate::question::QuestionId;

#[derive(Debug, Error)]
pub enum ExamError {
    #[error("exam has no questions")]
    EmptyQuestionSet,

    #[error("exam duration must be at least one second")]
    ZeroDuration,

    #[error("unknown exam '{0}'")]
    UnknownExam(String),

    #[error("question {0} appears more than once")]
    DuplicateQuestion(QuestionId),

    #[error("question {id} must offer exactly the options A-D in order: {reason}")]
    InvalidOptions { id: QuestionId, reason: String },

    #[error("submission sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, ExamError>;
