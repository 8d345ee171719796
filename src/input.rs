use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::question::OptionId;
use crate::session::{ExamSession, Phase, SessionEvent};

/// What a key press asks the exam screen to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Next,
    Previous,
    First,
    Last,
    NextUnanswered,
    Select(OptionId),
    ToggleFlag,
    RequestSubmit,
    ConfirmSubmit,
    CancelSubmit,
    ShowHistory,
    Quit,
}

pub fn command_for(key: KeyEvent, phase: Phase) -> Option<Command> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Command::Quit);
    }

    match phase {
        Phase::InProgress => match key.code {
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Char('n') => Some(Command::Next),
            KeyCode::Left | KeyCode::Char('h') | KeyCode::Char('p') => Some(Command::Previous),
            KeyCode::Home | KeyCode::Char('g') => Some(Command::First),
            KeyCode::End | KeyCode::Char('G') => Some(Command::Last),
            KeyCode::Tab | KeyCode::Char('u') => Some(Command::NextUnanswered),
            KeyCode::Char('f') => Some(Command::ToggleFlag),
            KeyCode::Char('s') | KeyCode::Enter => Some(Command::RequestSubmit),
            KeyCode::Esc => Some(Command::Quit),
            KeyCode::Char(c @ '1'..='4') => {
                let idx = c.to_digit(10).map(|d| d as usize - 1)?;
                Some(Command::Select(OptionId::ALL[idx]))
            }
            KeyCode::Char(c) => OptionId::from_char(c)
                .filter(|_| c.is_ascii_lowercase())
                .map(Command::Select),
            _ => None,
        },
        Phase::SubmitConfirmationPending => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                Some(Command::ConfirmSubmit)
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Some(Command::CancelSubmit),
            _ => None,
        },
        Phase::Submitted => match key.code {
            KeyCode::Char('h') => Some(Command::ShowHistory),
            KeyCode::Char('q') | KeyCode::Esc => Some(Command::Quit),
            _ => None,
        },
    }
}

/// Apply a session command. `ShowHistory` and `Quit` belong to the app and
/// are not handled here.
pub fn apply(session: &mut ExamSession, command: Command) -> Option<SessionEvent> {
    match command {
        Command::Next => session.next(),
        Command::Previous => session.previous(),
        Command::First => session.go_to_question(0),
        Command::Last => session.go_to_question(session.questions().count().saturating_sub(1)),
        Command::NextUnanswered => {
            let current = session.current_index();
            let unanswered = session.unanswered_indices();
            let target = unanswered
                .iter()
                .copied()
                .find(|&i| i > current)
                .or_else(|| unanswered.first().copied())?;
            session.go_to_question(target)
        }
        Command::Select(option) => session.select_answer(option),
        Command::ToggleFlag => session.toggle_current_flag(),
        Command::RequestSubmit => session.request_submit(),
        Command::ConfirmSubmit => session.confirm_submit(),
        Command::CancelSubmit => session.cancel_submit(),
        Command::ShowHistory | Command::Quit => None,
    }
}
