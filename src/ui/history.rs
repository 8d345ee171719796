use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap},
    Frame,
};

use proctor::{history::HistoryRecord, submission::SubmitReason, timer::format_clock};

use crate::App;

/// Pure presenter for a single history row
pub fn present_row(record: &HistoryRecord) -> Row<'static> {
    let score = record.score_percent();
    let score_display = score.map_or_else(|| "-".to_string(), |p| format!("{p:.0}%"));
    let score_color = match score {
        Some(p) if p >= 80.0 => Color::Green,
        Some(p) if p >= 50.0 => Color::Yellow,
        Some(_) => Color::Red,
        None => Color::Gray,
    };

    let reason_style = match record.reason {
        SubmitReason::Manual => Style::default(),
        SubmitReason::Expired => Style::default().fg(Color::Yellow),
    };

    Row::new(vec![
        Cell::from(record.submitted_at.format("%Y-%m-%d %H:%M").to_string()),
        Cell::from(record.exam_id.clone()).style(Style::default().add_modifier(Modifier::BOLD)),
        Cell::from(score_display).style(Style::default().fg(score_color)),
        Cell::from(format!("{}/{}", record.answered, record.question_count)),
        Cell::from(record.flagged.to_string()),
        Cell::from(format_clock(record.elapsed_secs)),
        Cell::from(record.reason.to_string()).style(reason_style),
    ])
}

/// Render the submission history screen
pub fn render_history(app: &mut App, f: &mut Frame) {
    let area = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Min(0),    // History table
            Constraint::Length(2), // Instructions
        ])
        .split(area);

    let title = Paragraph::new(format!("Submission History ({})", app.history.len()))
        .block(Block::default().borders(Borders::ALL).title("History"))
        .style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .alignment(Alignment::Center);
    f.render_widget(title, chunks[0]);

    if let Some(err) = &app.history_error {
        let error = Paragraph::new(format!("History unavailable: {err}"))
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Red))
            .wrap(Wrap { trim: true });
        f.render_widget(error, chunks[1]);
    } else if app.history.is_empty() {
        let no_data = Paragraph::new("No submissions yet. Finish an exam to start a history.")
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Gray));
        f.render_widget(no_data, chunks[1]);
    } else {
        let table_height = chunks[1].height.saturating_sub(3) as usize; // borders + header
        let max_scroll = app.history.len().saturating_sub(table_height);
        if app.history_state.scroll_offset > max_scroll {
            app.history_state.scroll_offset = max_scroll;
        }

        let header = Row::new(vec![
            "Submitted", "Exam", "Score", "Answered", "Flagged", "Time", "Reason",
        ])
        .style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

        let visible_rows: Vec<Row> = app
            .history
            .iter()
            .skip(app.history_state.scroll_offset)
            .take(table_height)
            .map(present_row)
            .collect();

        let widths = [
            Constraint::Length(17),
            Constraint::Min(10),
            Constraint::Length(6),
            Constraint::Length(9),
            Constraint::Length(8),
            Constraint::Length(9),
            Constraint::Length(8),
        ];

        let table = Table::new(visible_rows, widths)
            .header(header)
            .block(Block::default().borders(Borders::ALL).title("Submissions"))
            .column_spacing(2);

        f.render_widget(table, chunks[1]);
    }

    let back = if app.session.is_some() {
        "  (b/backspace) back"
    } else {
        ""
    };
    let instructions = Paragraph::new(format!(
        "(↑/↓) scroll  (PgUp/PgDn) page  (Home) top{back}  (esc)ape"
    ))
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true });
    f.render_widget(instructions, chunks[2]);
}
