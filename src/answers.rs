use std::collections::{BTreeMap, BTreeSet};

use crate::question::{OptionId, QuestionId};

/// Selected option per question; unanswered questions have no entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerStore {
    answers: BTreeMap<QuestionId, OptionId>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `option` for `question`, returning the option it replaced
    pub fn set_answer(&mut self, question: QuestionId, option: OptionId) -> Option<OptionId> {
        self.answers.insert(question, option)
    }

    pub fn get_answer(&self, question: QuestionId) -> Option<OptionId> {
        self.answers.get(&question).copied()
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    pub fn snapshot(&self) -> BTreeMap<QuestionId, OptionId> {
        self.answers.clone()
    }
}

/// Questions marked for review
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagStore {
    flags: BTreeSet<QuestionId>,
}

impl FlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the flag and returns the new state
    pub fn toggle_flag(&mut self, question: QuestionId) -> bool {
        if self.flags.remove(&question) {
            false
        } else {
            self.flags.insert(question);
            true
        }
    }

    pub fn is_flagged(&self, question: QuestionId) -> bool {
        self.flags.contains(&question)
    }

    pub fn flagged_count(&self) -> usize {
        self.flags.len()
    }

    pub fn snapshot(&self) -> BTreeSet<QuestionId> {
        self.flags.clone()
    }
}
