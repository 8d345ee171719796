use chrono::Local;
use itertools::Itertools;
use std::fmt;

use crate::answers::{AnswerStore, FlagStore};
use crate::error::{ExamError, Result};
use crate::question::{OptionId, Question, QuestionId, QuestionSet};
use crate::runtime::TickSubscription;
use crate::submission::{self, Receipt, SubmitReason, Submission, SubmissionSink};
use crate::timer::{Countdown, TickOutcome, TimeBand, TimeBands, DEFAULT_DURATION_SECS};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub duration_secs: u64,
    pub bands: TimeBands,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            duration_secs: DEFAULT_DURATION_SECS,
            bands: TimeBands::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Phase {
    #[strum(serialize = "in progress")]
    InProgress,
    #[strum(serialize = "awaiting confirmation")]
    SubmitConfirmationPending,
    #[strum(serialize = "submitted")]
    Submitted,
}

/// Everything observable that a session does
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Navigated {
        index: usize,
    },
    AnswerRecorded {
        question: QuestionId,
        option: OptionId,
        previous: Option<OptionId>,
    },
    FlagToggled {
        question: QuestionId,
        flagged: bool,
    },
    Ticked {
        remaining: u64,
        band: TimeBand,
    },
    /// `unanswered` excludes flagged questions, which are counted in
    /// `flagged` instead
    SubmitRequested {
        unanswered: usize,
        flagged: usize,
    },
    SubmitCancelled,
    Submitted(Box<Submission>),
}

pub trait SessionObserver {
    fn on_event(&mut self, event: &SessionEvent);
}

impl<F: FnMut(&SessionEvent)> SessionObserver for F {
    fn on_event(&mut self, event: &SessionEvent) {
        self(event)
    }
}

/// One attempt at one exam: navigation, answers, flags, countdown and
/// submission.
///
/// All methods returning `Option<SessionEvent>` return `None` when the call
/// was a no-op, e.g. anything that would mutate answers after submission.
pub struct ExamSession {
    questions: QuestionSet,
    current: usize,
    answers: AnswerStore,
    flags: FlagStore,
    countdown: Countdown,
    phase: Phase,
    ticker: Option<Box<dyn TickSubscription>>,
    sink: Box<dyn SubmissionSink>,
    observers: Vec<Box<dyn SessionObserver>>,
    submission: Option<Submission>,
    receipt: Option<Receipt>,
    dispatch_error: Option<String>,
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("exam", &self.questions.exam_id())
            .field("current", &self.current)
            .field("answers", &self.answers)
            .field("flags", &self.flags)
            .field("countdown", &self.countdown)
            .field("phase", &self.phase)
            .field("ticker_attached", &self.ticker.is_some())
            .finish()
    }
}

impl ExamSession {
    /// Validates the preconditions; no timer can run before this succeeds
    pub fn new(
        questions: QuestionSet,
        settings: SessionSettings,
        sink: Box<dyn SubmissionSink>,
    ) -> Result<Self> {
        if questions.count() == 0 {
            return Err(ExamError::EmptyQuestionSet);
        }
        if settings.duration_secs == 0 {
            return Err(ExamError::ZeroDuration);
        }

        tracing::info!(
            exam = questions.exam_id(),
            questions = questions.count(),
            duration = settings.duration_secs,
            "session started"
        );

        Ok(Self {
            questions,
            current: 0,
            answers: AnswerStore::new(),
            flags: FlagStore::new(),
            countdown: Countdown::new(settings.duration_secs, settings.bands),
            phase: Phase::InProgress,
            ticker: None,
            sink,
            observers: Vec::new(),
            submission: None,
            receipt: None,
            dispatch_error: None,
        })
    }

    /// Hand the tick subscription to the session, which cancels it on every
    /// exit from the running phases.
    pub fn attach_timer(&mut self, mut ticker: Box<dyn TickSubscription>) {
        if self.phase == Phase::Submitted {
            ticker.cancel();
            return;
        }
        if let Some(mut old) = self.ticker.replace(ticker) {
            old.cancel();
        }
    }

    pub fn subscribe(&mut self, observer: Box<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    pub fn questions(&self) -> &QuestionSet {
        &self.questions
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_submitted(&self) -> bool {
        self.phase == Phase::Submitted
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> &Question {
        self.questions.get(self.current)
    }

    pub fn remaining_secs(&self) -> u64 {
        self.countdown.remaining()
    }

    /// The time limit the session started with
    pub fn duration_secs(&self) -> u64 {
        self.countdown.duration()
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.countdown.elapsed()
    }

    pub fn band(&self) -> TimeBand {
        self.countdown.band()
    }

    pub fn answer_for(&self, question: QuestionId) -> Option<OptionId> {
        self.answers.get_answer(question)
    }

    pub fn is_flagged(&self, question: QuestionId) -> bool {
        self.flags.is_flagged(question)
    }

    pub fn answered_count(&self) -> usize {
        self.answers.answered_count()
    }

    pub fn flagged_count(&self) -> usize {
        self.flags.flagged_count()
    }

    pub fn unanswered_count(&self) -> usize {
        self.questions.count() - self.answers.answered_count()
    }

    /// Unanswered questions not already flagged for review
    pub fn unanswered_unflagged_count(&self) -> usize {
        self.questions
            .iter()
            .filter(|q| self.answers.get_answer(q.id).is_none() && !self.flags.is_flagged(q.id))
            .count()
    }

    pub fn unanswered_indices(&self) -> Vec<usize> {
        self.questions
            .iter()
            .positions(|q| self.answers.get_answer(q.id).is_none())
            .collect()
    }

    pub fn flagged_indices(&self) -> Vec<usize> {
        self.questions
            .iter()
            .positions(|q| self.flags.is_flagged(q.id))
            .collect()
    }

    pub fn has_timer(&self) -> bool {
        self.ticker.as_ref().is_some_and(|t| t.is_active())
    }

    pub fn submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    pub fn receipt(&self) -> Option<&Receipt> {
        self.receipt.as_ref()
    }

    pub fn last_dispatch_error(&self) -> Option<&str> {
        self.dispatch_error.as_deref()
    }

    /// Out-of-range indices are ignored
    pub fn go_to_question(&mut self, index: usize) -> Option<SessionEvent> {
        if self.phase == Phase::Submitted || index >= self.questions.count() {
            return None;
        }
        self.current = index;
        self.emit(SessionEvent::Navigated { index })
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<SessionEvent> {
        self.go_to_question(self.current + 1)
    }

    pub fn previous(&mut self) -> Option<SessionEvent> {
        let index = self.current.checked_sub(1)?;
        self.go_to_question(index)
    }

    pub fn select_answer(&mut self, option: OptionId) -> Option<SessionEvent> {
        if self.phase != Phase::InProgress {
            tracing::debug!(phase = %self.phase, "answer ignored");
            return None;
        }

        let question = self.current_question();
        debug_assert!(
            question.has_option(option),
            "option {option} not offered by {}",
            question.id
        );
        if !question.has_option(option) {
            return None;
        }
        let id = question.id;

        let previous = self.answers.set_answer(id, option);
        self.emit(SessionEvent::AnswerRecorded {
            question: id,
            option,
            previous,
        })
    }

    pub fn toggle_current_flag(&mut self) -> Option<SessionEvent> {
        if self.phase != Phase::InProgress {
            tracing::debug!(phase = %self.phase, "flag toggle ignored");
            return None;
        }
        let id = self.current_question().id;
        let flagged = self.flags.toggle_flag(id);
        self.emit(SessionEvent::FlagToggled {
            question: id,
            flagged,
        })
    }

    pub fn request_submit(&mut self) -> Option<SessionEvent> {
        if self.phase != Phase::InProgress {
            return None;
        }
        self.phase = Phase::SubmitConfirmationPending;
        let unanswered = self.unanswered_unflagged_count();
        let flagged = self.flags.flagged_count();
        tracing::debug!(unanswered, flagged, "submit requested");
        self.emit(SessionEvent::SubmitRequested {
            unanswered,
            flagged,
        })
    }

    pub fn cancel_submit(&mut self) -> Option<SessionEvent> {
        if self.phase != Phase::SubmitConfirmationPending {
            return None;
        }
        self.phase = Phase::InProgress;
        self.emit(SessionEvent::SubmitCancelled)
    }

    pub fn confirm_submit(&mut self) -> Option<SessionEvent> {
        if self.phase == Phase::Submitted {
            return None;
        }
        self.countdown.stop();
        self.finish(SubmitReason::Manual)
    }

    /// Applies one second of the countdown; expiry submits directly
    pub fn on_tick(&mut self) -> Option<SessionEvent> {
        if self.phase == Phase::Submitted {
            return None;
        }

        match self.countdown.tick() {
            TickOutcome::Running(remaining) => {
                let band = self.countdown.band();
                self.emit(SessionEvent::Ticked { remaining, band })
            }
            TickOutcome::Expired => {
                tracing::info!(exam = self.questions.exam_id(), "time expired");
                self.emit(SessionEvent::Ticked {
                    remaining: 0,
                    band: self.countdown.band(),
                });
                self.finish(SubmitReason::Expired)
            }
            TickOutcome::Ignored => None,
        }
    }

    fn finish(&mut self, reason: SubmitReason) -> Option<SessionEvent> {
        self.cancel_timer();

        let answers = self.answers.snapshot();
        let score = submission::score(&self.questions, &answers);
        let snapshot = Submission {
            exam_id: self.questions.exam_id().to_string(),
            exam_title: self.questions.title().to_string(),
            answers,
            flags: self.flags.snapshot(),
            question_count: self.questions.count(),
            remaining_secs: self.countdown.remaining(),
            elapsed_secs: self.countdown.elapsed(),
            reason,
            submitted_at: Local::now(),
            score,
        };

        match self.sink.submit(&snapshot) {
            Ok(receipt) => {
                tracing::info!(reference = %receipt.reference, %reason, "submission dispatched");
                self.receipt = Some(receipt);
            }
            Err(e) => {
                tracing::warn!("submission sink failed: {e}");
                self.dispatch_error = Some(e.to_string());
            }
        }

        self.phase = Phase::Submitted;
        self.submission = Some(snapshot.clone());
        self.emit(SessionEvent::Submitted(Box::new(snapshot)))
    }

    fn cancel_timer(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }

    fn emit(&mut self, event: SessionEvent) -> Option<SessionEvent> {
        for observer in self.observers.iter_mut() {
            observer.on_event(&event);
        }
        Some(event)
    }
}

impl Drop for ExamSession {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}
