use include_dir::{include_dir, Dir};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{ExamError, Result};

static EXAM_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/exams");

/// Stable key of a question within one exam
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub u32);

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.0)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
)]
pub enum OptionId {
    A,
    B,
    C,
    D,
}

impl OptionId {
    pub const ALL: [OptionId; 4] = [OptionId::A, OptionId::B, OptionId::C, OptionId::D];

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(OptionId::A),
            'B' => Some(OptionId::B),
            'C' => Some(OptionId::C),
            'D' => Some(OptionId::D),
            _ => None,
        }
    }

    /// Zero-based position in the option list
    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: OptionId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub prompt: String,
    pub options: Vec<Choice>,
    /// Answer key, only consulted when scoring a finished submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<OptionId>,
}

impl Question {
    pub fn has_option(&self, option: OptionId) -> bool {
        self.options.iter().any(|c| c.id == option)
    }

    fn validate(&self) -> Result<()> {
        if self.options.len() != OptionId::ALL.len() {
            return Err(ExamError::InvalidOptions {
                id: self.id,
                reason: format!("found {} options", self.options.len()),
            });
        }
        for (choice, expected) in self.options.iter().zip(OptionId::ALL) {
            if choice.id != expected {
                return Err(ExamError::InvalidOptions {
                    id: self.id,
                    reason: format!("expected {} but found {}", expected, choice.id),
                });
            }
        }
        Ok(())
    }
}

/// On-disk shape of an exam file
#[derive(Debug, Deserialize)]
struct ExamFile {
    id: String,
    title: String,
    #[serde(default)]
    duration_secs: Option<u64>,
    questions: Vec<Question>,
}

/// Ordered, validated, immutable set of questions for one exam
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionSet {
    exam_id: String,
    title: String,
    duration_secs: Option<u64>,
    questions: Vec<Question>,
}

impl QuestionSet {
    pub fn new(
        exam_id: impl Into<String>,
        title: impl Into<String>,
        questions: Vec<Question>,
    ) -> Result<Self> {
        if questions.is_empty() {
            return Err(ExamError::EmptyQuestionSet);
        }

        let mut seen = HashSet::new();
        for q in &questions {
            if !seen.insert(q.id) {
                return Err(ExamError::DuplicateQuestion(q.id));
            }
            q.validate()?;
        }

        Ok(Self {
            exam_id: exam_id.into(),
            title: title.into(),
            duration_secs: None,
            questions,
        })
    }

    pub fn with_duration(mut self, secs: Option<u64>) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: ExamFile = serde_json::from_str(json)?;
        Ok(Self::new(file.id, file.title, file.questions)?.with_duration(file.duration_secs))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn exam_id(&self) -> &str {
        &self.exam_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Duration suggested by the exam file, if any
    pub fn duration_secs(&self) -> Option<u64> {
        self.duration_secs
    }

    pub fn count(&self) -> usize {
        self.questions.len()
    }

    /// Panics when `index` is out of range; callers bound-check first.
    pub fn get(&self, index: usize) -> &Question {
        assert!(
            index < self.questions.len(),
            "question index {index} out of range (count {})",
            self.questions.len()
        );
        &self.questions[index]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Question> {
        self.questions.iter()
    }

    pub fn contains(&self, id: QuestionId) -> bool {
        self.questions.iter().any(|q| q.id == id)
    }

    pub fn index_of(&self, id: QuestionId) -> Option<usize> {
        self.questions.iter().position(|q| q.id == id)
    }

    /// True when every question carries an answer key
    pub fn is_scorable(&self) -> bool {
        self.questions.iter().all(|q| q.answer.is_some())
    }

    pub fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let mut copy = self.clone();
        copy.questions.shuffle(rng);
        copy
    }
}

/// Load an exam bundled with the binary
pub fn load_questions(exam_id: &str) -> Result<QuestionSet> {
    let file = EXAM_DIR
        .get_file(format!("{exam_id}.json"))
        .ok_or_else(|| ExamError::UnknownExam(exam_id.to_string()))?;

    let contents = file
        .contents_utf8()
        .ok_or_else(|| ExamError::UnknownExam(exam_id.to_string()))?;

    QuestionSet::from_json(contents)
}

/// Ids of the exams bundled with the binary, sorted
pub fn available_exams() -> Vec<String> {
    let mut ids: Vec<String> = EXAM_DIR
        .files()
        .filter(|f| f.path().extension().is_some_and(|ext| ext == "json"))
        .filter_map(|f| f.path().file_stem())
        .map(|stem| stem.to_string_lossy().into_owned())
        .collect();
    ids.sort();
    ids
}

#[cfg(test)]
pub(crate) fn sample_question(id: u32, answer: Option<OptionId>) -> Question {
    Question {
        id: QuestionId(id),
        prompt: format!("Question {id}"),
        options: OptionId::ALL
            .iter()
            .map(|&o| Choice {
                id: o,
                text: format!("option {o}"),
            })
            .collect(),
        answer,
    }
}
