pub mod history;
pub mod screen;

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Gauge, Paragraph, Row, Table, Widget, Wrap},
    Frame,
};

use proctor::{
    question::OptionId,
    session::{ExamSession, Phase},
    submission::SubmitReason,
    timer::{format_clock, TimeBand},
};

use crate::{App, AppState};

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;
const POPUP_WIDTH: u16 = 44;
const POPUP_HEIGHT: u16 = 7;

pub fn draw(app: &mut App, f: &mut Frame) {
    let screen = screen::current_screen(&app.state);
    screen.render(app, f);
}

fn band_style(band: TimeBand) -> Style {
    let color = match band {
        TimeBand::Calm => Color::Green,
        TimeBand::Warning => Color::Yellow,
        TimeBand::Critical => Color::Red,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

/// Rect of at most `width` x `height` centered in `area`
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        match (self.state, self.session.as_ref()) {
            (AppState::Exam, Some(session)) => render_exam(session, area, buf),
            (AppState::Results, Some(session)) => render_results(session, area, buf),
            _ => render_load_error(self.load_error.as_deref(), area, buf),
        }
    }
}

fn render_exam(session: &ExamSession, area: Rect, buf: &mut Buffer) {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let dim_style = Style::default().add_modifier(Modifier::DIM);
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(1), // header
            Constraint::Length(1), // padding
            Constraint::Min(3),    // prompt
            Constraint::Length(5), // options
            Constraint::Length(4), // navigator
            Constraint::Length(1), // legend
        ])
        .split(area);

    let header = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(40),
            Constraint::Percentage(20),
            Constraint::Percentage(40),
        ])
        .split(chunks[0]);

    Paragraph::new(Span::styled(session.questions().title(), bold_style)).render(header[0], buf);

    Paragraph::new(Span::styled(
        format_clock(session.remaining_secs()),
        band_style(session.band()),
    ))
    .alignment(Alignment::Center)
    .render(header[1], buf);

    Paragraph::new(Span::styled(
        format!(
            "{}/{} answered  {} flagged",
            session.answered_count(),
            session.questions().count(),
            session.flagged_count()
        ),
        dim_style,
    ))
    .alignment(Alignment::Right)
    .render(header[2], buf);

    let question = session.current_question();
    let mut title = vec![Span::styled(
        format!(
            "Question {} of {}",
            session.current_index() + 1,
            session.questions().count()
        ),
        dim_style,
    )];
    if session.is_flagged(question.id) {
        title.push(Span::styled(
            "  [flagged]",
            Style::default().fg(Color::Yellow).patch(bold_style),
        ));
    }

    Paragraph::new(vec![
        Line::from(title),
        Line::default(),
        Line::from(Span::styled(question.prompt.as_str(), bold_style)),
    ])
    .wrap(Wrap { trim: true })
    .render(chunks[2], buf);

    let selected = session.answer_for(question.id);
    let options: Vec<Line> = question
        .options
        .iter()
        .map(|choice| {
            if Some(choice.id) == selected {
                Line::from(Span::styled(
                    format!("> ({}) {}", choice.id, choice.text),
                    Style::default().fg(Color::Green).patch(bold_style),
                ))
            } else {
                Line::from(format!("  ({}) {}", choice.id, choice.text))
            }
        })
        .collect();
    Paragraph::new(options).render(chunks[3], buf);

    render_navigator(session, chunks[4], buf);

    Paragraph::new(Span::styled(
        "(a-d) answer  (←/→) move  (tab) next unanswered  (f)lag  (s)ubmit  (esc)ape",
        italic_style,
    ))
    .render(chunks[5], buf);

    if session.phase() == Phase::SubmitConfirmationPending {
        render_confirmation(session, area, buf);
    }
}

fn render_navigator(session: &ExamSession, area: Rect, buf: &mut Buffer) {
    let spans: Vec<Span> = session
        .questions()
        .iter()
        .enumerate()
        .map(|(idx, q)| {
            let mut style = if session.is_flagged(q.id) {
                Style::default().fg(Color::Yellow)
            } else if session.answer_for(q.id).is_some() {
                Style::default().fg(Color::Green)
            } else {
                Style::default().add_modifier(Modifier::DIM)
            };
            if idx == session.current_index() {
                style = style.add_modifier(Modifier::REVERSED | Modifier::BOLD);
            }
            Span::styled(format!(" {:>2} ", idx + 1), style)
        })
        .collect();

    Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::TOP).title("Questions"))
        .wrap(Wrap { trim: false })
        .render(area, buf);
}

fn render_confirmation(session: &ExamSession, area: Rect, buf: &mut Buffer) {
    let popup = centered_rect(POPUP_WIDTH, POPUP_HEIGHT, area);
    let unanswered = session.unanswered_unflagged_count();

    let text = vec![
        Line::default(),
        Line::from(format!(
            "{unanswered} unanswered, {} flagged",
            session.flagged_count()
        )),
        Line::default(),
        Line::from(Span::styled(
            "Submit now? (y)es / (n)o",
            Style::default().add_modifier(Modifier::BOLD),
        )),
    ];

    Clear.render(popup, buf);
    Paragraph::new(text)
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Submit exam")
                .style(Style::default().fg(Color::Cyan)),
        )
        .render(popup, buf);
}

fn render_results(session: &ExamSession, area: Rect, buf: &mut Buffer) {
    let Some(submission) = session.submission() else {
        return;
    };
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let italic_style = Style::default().add_modifier(Modifier::ITALIC);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(1), // title
            Constraint::Length(3), // score
            Constraint::Length(1), // summary
            Constraint::Min(3),    // review table
            Constraint::Length(1), // receipt
            Constraint::Length(1), // legend
        ])
        .split(area);

    let heading = match submission.reason {
        SubmitReason::Manual => format!("{} submitted", submission.exam_title),
        SubmitReason::Expired => format!("{}: time is up, answers submitted", submission.exam_title),
    };
    Paragraph::new(Span::styled(heading, bold_style))
        .alignment(Alignment::Center)
        .render(chunks[0], buf);

    match submission.score {
        Some(score) => {
            Gauge::default()
                .block(Block::default().borders(Borders::ALL).title("Score"))
                .gauge_style(Style::default().fg(Color::Magenta))
                .percent(score.percent().round().clamp(0.0, 100.0) as u16)
                .label(format!(
                    "{}/{} correct ({:.0}%)",
                    score.correct,
                    score.total,
                    score.percent()
                ))
                .render(chunks[1], buf);
        }
        None => {
            Paragraph::new("No answer key for this exam")
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL).title("Score"))
                .render(chunks[1], buf);
        }
    }

    Paragraph::new(Span::styled(
        format!(
            "{} answered   {} unanswered   {} flagged   time used {} of {}",
            submission.answers.len(),
            submission.unanswered(),
            submission.flags.len(),
            format_clock(submission.elapsed_secs),
            format_clock(session.duration_secs())
        ),
        bold_style,
    ))
    .alignment(Alignment::Center)
    .render(chunks[2], buf);

    let rows: Vec<Row> = session
        .questions()
        .iter()
        .map(|q| {
            let given = submission.answers.get(&q.id).copied();
            let style = match (given, q.answer) {
                (None, _) => Style::default().add_modifier(Modifier::DIM),
                (Some(g), Some(a)) if g == a => Style::default().fg(Color::Green),
                (Some(_), Some(_)) => Style::default().fg(Color::Red),
                (Some(_), None) => Style::default(),
            };
            Row::new(vec![
                Cell::from(q.id.to_string()),
                Cell::from(given.map_or_else(|| "-".to_string(), |o: OptionId| o.to_string())),
                Cell::from(q.answer.map_or_else(|| "?".to_string(), |o| o.to_string())),
                Cell::from(if submission.flags.contains(&q.id) {
                    "flagged"
                } else {
                    ""
                }),
                Cell::from(q.prompt.clone()),
            ])
            .style(style)
        })
        .collect();

    let widths = [
        Constraint::Length(5),
        Constraint::Length(6),
        Constraint::Length(7),
        Constraint::Length(8),
        Constraint::Min(10),
    ];
    let header = Row::new(vec!["#", "Yours", "Answer", "", "Question"]).style(
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    );
    Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Review"))
        .column_spacing(1)
        .render(chunks[3], buf);

    let receipt = match (session.receipt(), session.last_dispatch_error()) {
        (Some(receipt), _) => Span::styled(
            format!("saved as {}", receipt.reference),
            Style::default().fg(Color::Cyan),
        ),
        (None, Some(err)) => Span::styled(
            format!("not saved: {err}"),
            Style::default().fg(Color::Red),
        ),
        (None, None) => Span::raw(""),
    };
    Paragraph::new(receipt)
        .alignment(Alignment::Center)
        .render(chunks[4], buf);

    Paragraph::new(Span::styled("(h)istory / (esc)ape", italic_style)).render(chunks[5], buf);
}

fn render_load_error(message: Option<&str>, area: Rect, buf: &mut Buffer) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints([
            Constraint::Percentage(45),
            Constraint::Length(2),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(area);

    Paragraph::new(Span::styled(
        format!(
            "Cannot start exam: {}",
            message.unwrap_or("nothing to load")
        ),
        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    ))
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true })
    .render(chunks[1], buf);

    Paragraph::new(Span::styled(
        "(esc)ape",
        Style::default().add_modifier(Modifier::ITALIC),
    ))
    .alignment(Alignment::Center)
    .render(chunks[2], buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use proctor::{
        config::Config,
        error::ExamError,
        question::load_questions,
        submission::MemorySink,
    };

    fn create_test_app(duration_secs: u64) -> App {
        let config = Config {
            duration_secs: Some(duration_secs),
            ..Config::default()
        };
        App::new(
            load_questions("sample"),
            config,
            Box::new(MemorySink::new()),
        )
    }

    fn press(app: &mut App, c: char) {
        app.handle_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE));
    }

    fn rendered(app: &App, width: u16, height: u16) -> (String, Buffer) {
        let area = Rect::new(0, 0, width, height);
        let mut buffer = Buffer::empty(area);
        app.render(area, &mut buffer);
        let text = buffer
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect::<String>();
        (text, buffer)
    }

    #[test]
    fn test_exam_shows_clock_and_question() {
        let app = create_test_app(3723);
        let (text, _) = rendered(&app, 100, 30);

        assert!(text.contains("01:02:03"));
        assert!(text.contains("Question 1 of 10"));
        assert!(text.contains("(A)"));
        assert!(text.contains("0/10 answered"));
    }

    #[test]
    fn test_clock_colour_follows_band() {
        let mut app = create_test_app(700);
        let clock_fg = |app: &App| {
            let (text, buffer) = rendered(app, 100, 30);
            let clock = format_clock(app.session.as_ref().unwrap().remaining_secs());
            let pos = text.find(&clock).expect("clock rendered");
            buffer.content()[pos].fg
        };

        // 700 is under the default warning threshold of 1800
        assert_eq!(clock_fg(&app), Color::Yellow);

        for _ in 0..101 {
            app.on_tick();
        }
        assert_eq!(clock_fg(&app), Color::Red);
    }

    #[test]
    fn test_selected_option_is_marked() {
        let mut app = create_test_app(600);
        press(&mut app, 'c');
        let (text, _) = rendered(&app, 100, 30);

        assert!(text.contains("> (C)"));
        assert!(text.contains("1/10 answered"));
    }

    #[test]
    fn test_flag_marker() {
        let mut app = create_test_app(600);
        press(&mut app, 'f');
        let (text, _) = rendered(&app, 100, 30);
        assert!(text.contains("[flagged]"));
        assert!(text.contains("1 flagged"));
    }

    #[test]
    fn test_confirmation_popup() {
        let mut app = create_test_app(600);
        press(&mut app, 'a');
        press(&mut app, 'n');
        press(&mut app, 'f');
        press(&mut app, 's');
        let (text, _) = rendered(&app, 100, 30);

        assert!(text.contains("8 unanswered, 1 flagged"));
        assert!(text.contains("(y)es / (n)o"));

        press(&mut app, 'n');
        let (text, _) = rendered(&app, 100, 30);
        assert!(!text.contains("(y)es / (n)o"));
    }

    #[test]
    fn test_results_screen() {
        let mut app = create_test_app(600);
        press(&mut app, 's');
        press(&mut app, 'y');
        assert_eq!(app.state, AppState::Results);

        let (text, _) = rendered(&app, 100, 30);
        assert!(text.contains("submitted"));
        assert!(text.contains("0/10 correct"));
        assert!(text.contains("Review"));
        assert!(text.contains("saved as memory:1"));
    }

    #[test]
    fn test_results_after_expiry() {
        let mut app = create_test_app(1);
        app.on_tick();
        let (text, _) = rendered(&app, 100, 30);
        assert!(text.contains("time is up"));
        assert!(text.contains("time used 00:00:01 of 00:00:01"));
    }

    #[test]
    fn test_failed_dispatch_is_shown() {
        let config = Config {
            duration_secs: Some(60),
            ..Config::default()
        };
        let mut app = App::new(
            load_questions("sample"),
            config,
            Box::new(MemorySink::failing()),
        );
        press(&mut app, 's');
        press(&mut app, 'y');

        let (text, _) = rendered(&app, 100, 30);
        assert!(text.contains("not saved"));
    }

    #[test]
    fn test_load_error_screen() {
        let app = App::new(
            Err(ExamError::UnknownExam("nope".into())),
            Config::default(),
            Box::new(MemorySink::new()),
        );
        let (text, _) = rendered(&app, 80, 24);
        assert!(text.contains("unknown exam 'nope'"));
    }

    #[test]
    fn test_small_areas_do_not_panic() {
        let mut app = create_test_app(600);
        for (w, h) in [(20, 5), (1, 1), (12, 40), (200, 3)] {
            rendered(&app, w, h);
        }
        press(&mut app, 's');
        for (w, h) in [(20, 5), (1, 1), (12, 40)] {
            rendered(&app, w, h);
        }
        press(&mut app, 'y');
        for (w, h) in [(20, 5), (1, 1), (12, 40)] {
            rendered(&app, w, h);
        }
    }

    #[test]
    fn test_centered_rect() {
        let area = Rect::new(0, 0, 100, 30);
        assert_eq!(centered_rect(40, 10, area), Rect::new(30, 10, 40, 10));

        let tiny = Rect::new(0, 0, 10, 4);
        assert_eq!(centered_rect(40, 10, tiny), tiny);
    }
}
