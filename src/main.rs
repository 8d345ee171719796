pub mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    fs::File,
    io::{self, stdin},
    path::PathBuf,
    sync::mpsc::Sender,
    time::Duration,
};

use proctor::{
    app_dirs::AppDirs,
    config::{Config, ConfigStore, FileConfigStore},
    error::ExamError,
    history::{HistoryDb, HistoryRecord, HistorySink},
    input::{self, Command},
    logging,
    question::{available_exams, load_questions, QuestionSet},
    runtime::{spawn_ticker, CrosstermEventSource, ExamEvent, FixedTicker, Runner, Ticker},
    session::ExamSession,
    submission::{LogSink, SubmissionSink},
};

const POLL_INTERVAL_MS: u64 = 250;
const HISTORY_LIMIT: usize = 200;

/// timed multiple-choice exams in the terminal
#[derive(Parser, Debug, Clone, Default)]
#[clap(
    version,
    about,
    long_about = "Take a timed multiple-choice exam in the terminal: answer, flag questions for review, and submit before the clock runs out. Finished attempts are kept in a local history."
)]
pub struct Cli {
    /// bundled exam to take (see --list)
    #[clap(short = 'e', long)]
    exam: Option<String>,

    /// exam file (json) to take instead of a bundled exam
    #[clap(short = 'f', long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// time limit in seconds, overriding the exam's own
    #[clap(short = 's', long)]
    number_of_secs: Option<u64>,

    /// shuffle the question order
    #[clap(long)]
    shuffle: bool,

    /// list the bundled exams and exit
    #[clap(long)]
    list: bool,

    /// browse the submission history instead of taking an exam
    #[clap(long)]
    history: bool,

    /// write the submission history as csv to PATH and exit
    #[clap(long, value_name = "PATH")]
    export_csv: Option<PathBuf>,

    /// delete every stored submission and exit
    #[clap(long)]
    clear_history: bool,

    /// store the exam, time limit and shuffle flags as defaults and exit
    #[clap(long)]
    save_config: bool,
}

impl Cli {
    /// Command line flags take precedence over the stored config
    fn apply_to(&self, mut config: Config) -> Config {
        if let Some(exam) = &self.exam {
            config.exam_id = exam.clone();
        }
        if self.number_of_secs.is_some() {
            config.duration_secs = self.number_of_secs;
        }
        if self.shuffle {
            config.shuffle = true;
        }
        config
    }

    fn load_exam(&self, config: &Config) -> Result<QuestionSet, ExamError> {
        let questions = match &self.file {
            Some(path) => QuestionSet::from_path(path)?,
            None => load_questions(&config.exam_id)?,
        };
        if config.shuffle {
            Ok(questions.shuffled(&mut rand::thread_rng()))
        } else {
            Ok(questions)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Exam,
    Results,
    History,
    LoadError,
}

#[derive(Debug, Default)]
pub struct HistoryState {
    pub scroll_offset: usize,
}

#[derive(Debug)]
pub struct App {
    pub state: AppState,
    pub session: Option<ExamSession>,
    pub load_error: Option<String>,
    pub history: Vec<HistoryRecord>,
    pub history_error: Option<String>,
    pub history_state: HistoryState,
}

impl App {
    pub fn new(
        questions: Result<QuestionSet, ExamError>,
        config: Config,
        sink: Box<dyn SubmissionSink>,
    ) -> Self {
        let session = questions.and_then(|qs| {
            let settings = config.session_settings(qs.duration_secs());
            ExamSession::new(qs, settings, sink)
        });

        let (state, session, load_error) = match session {
            Ok(session) => (AppState::Exam, Some(session), None),
            Err(e) => {
                tracing::error!("cannot start exam: {e}");
                (AppState::LoadError, None, Some(e.to_string()))
            }
        };

        Self {
            state,
            session,
            load_error,
            history: Vec::new(),
            history_error: None,
            history_state: HistoryState::default(),
        }
    }

    pub fn history_only() -> Self {
        let mut app = Self {
            state: AppState::History,
            session: None,
            load_error: None,
            history: Vec::new(),
            history_error: None,
            history_state: HistoryState::default(),
        };
        app.load_history();
        app
    }

    /// Start the countdown ticks; only an exam in progress gets a ticker.
    /// Every tick takes one second off the clock.
    pub fn start_timer<T: Ticker>(&mut self, tx: Sender<ExamEvent>, ticker: T) {
        if self.state != AppState::Exam {
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.attach_timer(Box::new(spawn_ticker(tx, ticker)));
        }
    }

    pub fn on_tick(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.on_tick();
        }
        self.sync_state();
    }

    /// Returns true when the app should exit
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        let ctrl_c =
            key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c');

        match self.state {
            AppState::LoadError => {
                ctrl_c || matches!(key.code, KeyCode::Esc | KeyCode::Char('q'))
            }
            AppState::History => self.handle_history_key(key, ctrl_c),
            AppState::Exam | AppState::Results => {
                let Some(session) = self.session.as_mut() else {
                    return true;
                };
                match input::command_for(key, session.phase()) {
                    Some(Command::Quit) => {
                        if !session.is_submitted() {
                            tracing::info!(
                                exam = session.questions().exam_id(),
                                "exam abandoned without submitting"
                            );
                        }
                        return true;
                    }
                    Some(Command::ShowHistory) => {
                        self.load_history();
                        self.state = AppState::History;
                    }
                    Some(command) => {
                        input::apply(session, command);
                    }
                    None => {}
                }
                self.sync_state();
                false
            }
        }
    }

    fn handle_history_key(&mut self, key: KeyEvent, ctrl_c: bool) -> bool {
        match key.code {
            _ if ctrl_c => return true,
            KeyCode::Esc | KeyCode::Char('q') => return true,
            KeyCode::Char('b') | KeyCode::Backspace => {
                if self.session.is_some() {
                    self.state = AppState::Results;
                }
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.history_state.scroll_offset =
                    self.history_state.scroll_offset.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                // Clamped against the table height while rendering
                self.history_state.scroll_offset += 1;
            }
            KeyCode::PageUp => {
                self.history_state.scroll_offset =
                    self.history_state.scroll_offset.saturating_sub(10);
            }
            KeyCode::PageDown => {
                self.history_state.scroll_offset += 10;
            }
            KeyCode::Home => {
                self.history_state.scroll_offset = 0;
            }
            _ => {}
        }
        false
    }

    fn sync_state(&mut self) {
        if self.state == AppState::Exam && self.session.as_ref().is_some_and(|s| s.is_submitted())
        {
            self.state = AppState::Results;
        }
    }

    fn load_history(&mut self) {
        self.history_state = HistoryState::default();
        match HistoryDb::new().and_then(|db| db.recent(HISTORY_LIMIT)) {
            Ok(records) => {
                self.history = records;
                self.history_error = None;
            }
            Err(e) => {
                tracing::warn!("cannot read history: {e}");
                self.history.clear();
                self.history_error = Some(e.to_string());
            }
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let _log_guard = logging::init(AppDirs::log_dir().as_deref());

    let store = FileConfigStore::new();
    let config = cli.apply_to(store.load());

    if cli.save_config {
        store.save(&config)?;
        println!("saved settings to {}", store.path().display());
        return Ok(());
    }

    if cli.list {
        for id in available_exams() {
            let title = load_questions(&id)
                .map(|qs| format!("{} ({} questions)", qs.title(), qs.count()))
                .unwrap_or_else(|e| format!("unavailable: {e}"));
            println!("{id:<16} {title}");
        }
        return Ok(());
    }

    if let Some(path) = &cli.export_csv {
        let db = HistoryDb::new()?;
        let written = db.export_csv(File::create(path)?)?;
        println!("exported {written} submissions to {}", path.display());
        return Ok(());
    }

    if cli.clear_history {
        let db = HistoryDb::new()?;
        let removed = db.count()?;
        db.clear_all()?;
        tracing::info!(removed, "history cleared");
        println!("removed {removed} submissions");
        return Ok(());
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    let mut app = if cli.history {
        App::history_only()
    } else {
        let sink: Box<dyn SubmissionSink> = match HistoryDb::new() {
            Ok(db) => Box::new(HistorySink::new(db)),
            Err(e) => {
                tracing::warn!("history unavailable, submissions will only be logged: {e}");
                Box::new(LogSink)
            }
        };
        let questions = cli.load_exam(&config);
        App::new(questions, config, sink)
    };

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(&mut terminal, &mut app);
    // Dropping the session cancels any ticker still running
    drop(app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        CrosstermEventSource::new(),
        Duration::from_millis(POLL_INTERVAL_MS),
    );
    app.start_timer(runner.sender(), FixedTicker::every_second());

    loop {
        terminal.draw(|f| ui::draw(app, f))?;

        match runner.step() {
            Some(ExamEvent::Tick) => app.on_tick(),
            Some(ExamEvent::Resize) | None => {}
            Some(ExamEvent::Key(key)) => {
                if app.handle_key(key) {
                    break;
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor::question::OptionId;
    use proctor::session::Phase;
    use proctor::submission::{MemorySink, SubmitReason};
    use std::sync::mpsc;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn exam_app(duration_secs: u64) -> (App, MemorySink) {
        let sink = MemorySink::new();
        let config = Config {
            duration_secs: Some(duration_secs),
            ..Config::default()
        };
        let questions = load_questions("sample");
        (App::new(questions, config, Box::new(sink.clone())), sink)
    }

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::parse_from(["proctor"]);

        assert_eq!(cli.exam, None);
        assert_eq!(cli.file, None);
        assert_eq!(cli.number_of_secs, None);
        assert!(!cli.shuffle);
        assert!(!cli.list);
        assert!(!cli.history);
        assert_eq!(cli.export_csv, None);
        assert!(!cli.clear_history);
        assert!(!cli.save_config);
    }

    #[test]
    fn test_cli_maintenance_flags() {
        let cli = Cli::parse_from(["proctor", "--clear-history"]);
        assert!(cli.clear_history);

        let cli = Cli::parse_from(["proctor", "-e", "networking", "-s", "900", "--save-config"]);
        assert!(cli.save_config);
    }

    #[test]
    fn test_saved_config_keeps_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::with_path(dir.path().join("config.json"));

        let cli = Cli::parse_from(["proctor", "-e", "networking", "-s", "900", "--save-config"]);
        let config = cli.apply_to(store.load());
        store.save(&config).unwrap();

        let reloaded = Cli::parse_from(["proctor"]).apply_to(store.load());
        assert_eq!(reloaded.exam_id, "networking");
        assert_eq!(reloaded.duration_secs, Some(900));
    }

    #[test]
    fn test_timer_ignores_legacy_tick_setting() {
        let config: Config =
            serde_json::from_str(r#"{"duration_secs": 60, "tick_ms": 10}"#).unwrap();
        let mut app = App::new(
            load_questions("sample"),
            config,
            Box::new(MemorySink::new()),
        );

        let (tx, rx) = mpsc::channel();
        app.start_timer(tx, FixedTicker::every_second());
        assert!(app.session.as_ref().unwrap().has_timer());

        // One-second ticks: nothing arrives in the first few hundred millis
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        assert_eq!(app.session.as_ref().unwrap().remaining_secs(), 60);
    }

    #[test]
    fn test_injected_ticker_drives_expiry() {
        let (mut app, sink) = exam_app(2);
        let (tx, rx) = mpsc::channel();
        app.start_timer(tx, FixedTicker::new(Duration::from_millis(5)));

        while app.state == AppState::Exam {
            match rx.recv_timeout(Duration::from_secs(1)) {
                Ok(ExamEvent::Tick) => app.on_tick(),
                Ok(_) => {}
                Err(e) => panic!("ticker went quiet: {e}"),
            }
        }

        assert_eq!(app.state, AppState::Results);
        assert!(!app.session.as_ref().unwrap().has_timer());
        assert_eq!(sink.received().len(), 1);
    }

    #[test]
    fn test_no_timer_on_load_error() {
        let mut app = App::new(
            Err(ExamError::EmptyQuestionSet),
            Config::default(),
            Box::new(MemorySink::new()),
        );
        let (tx, rx) = mpsc::channel();
        app.start_timer(tx, FixedTicker::new(Duration::from_millis(5)));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn test_cli_exam_and_secs() {
        let cli = Cli::parse_from(["proctor", "-e", "networking", "-s", "90"]);
        assert_eq!(cli.exam.as_deref(), Some("networking"));
        assert_eq!(cli.number_of_secs, Some(90));

        let cli = Cli::parse_from(["proctor", "--exam", "sample", "--number-of-secs", "120"]);
        assert_eq!(cli.exam.as_deref(), Some("sample"));
        assert_eq!(cli.number_of_secs, Some(120));
    }

    #[test]
    fn test_cli_file_and_flags() {
        let cli = Cli::parse_from([
            "proctor",
            "--file",
            "exam.json",
            "--shuffle",
            "--export-csv",
            "out.csv",
        ]);
        assert_eq!(cli.file, Some(PathBuf::from("exam.json")));
        assert!(cli.shuffle);
        assert_eq!(cli.export_csv, Some(PathBuf::from("out.csv")));
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from(["proctor", "-e", "networking", "-s", "30", "--shuffle"]);
        let config = cli.apply_to(Config::default());
        assert_eq!(config.exam_id, "networking");
        assert_eq!(config.duration_secs, Some(30));
        assert!(config.shuffle);

        let untouched = Cli::parse_from(["proctor"]).apply_to(Config::default());
        assert_eq!(untouched, Config::default());
    }

    #[test]
    fn test_load_exam_unknown() {
        let cli = Cli::parse_from(["proctor", "-e", "nope"]);
        let config = cli.apply_to(Config::default());
        assert!(matches!(
            cli.load_exam(&config),
            Err(ExamError::UnknownExam(_))
        ));
    }

    #[test]
    fn test_app_new_starts_exam() {
        let (app, _) = exam_app(60);

        assert_eq!(app.state, AppState::Exam);
        let session = app.session.as_ref().unwrap();
        assert_eq!(session.phase(), Phase::InProgress);
        assert_eq!(session.remaining_secs(), 60);
    }

    #[test]
    fn test_app_uses_exam_duration_by_default() {
        let app = App::new(
            load_questions("sample"),
            Config::default(),
            Box::new(MemorySink::new()),
        );
        assert_eq!(app.session.as_ref().unwrap().remaining_secs(), 600);
    }

    #[test]
    fn test_app_load_error_has_no_session() {
        let app = App::new(
            Err(ExamError::EmptyQuestionSet),
            Config::default(),
            Box::new(MemorySink::new()),
        );

        assert_eq!(app.state, AppState::LoadError);
        assert!(app.session.is_none());
        assert_eq!(app.load_error.as_deref(), Some("exam has no questions"));
    }

    #[test]
    fn test_load_error_quits_on_esc() {
        let mut app = App::new(
            Err(ExamError::UnknownExam("x".into())),
            Config::default(),
            Box::new(MemorySink::new()),
        );
        assert!(!app.handle_key(key(KeyCode::Char('a'))));
        assert!(app.handle_key(key(KeyCode::Esc)));
    }

    #[test]
    fn test_keys_drive_session() {
        let (mut app, sink) = exam_app(60);

        assert!(!app.handle_key(key(KeyCode::Char('b'))));
        assert!(!app.handle_key(key(KeyCode::Right)));
        assert!(!app.handle_key(key(KeyCode::Char('f'))));
        assert!(!app.handle_key(key(KeyCode::Char('s'))));
        assert_eq!(
            app.session.as_ref().unwrap().phase(),
            Phase::SubmitConfirmationPending
        );

        assert!(!app.handle_key(key(KeyCode::Char('y'))));
        assert_eq!(app.state, AppState::Results);

        let received = sink.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].answers.len(), 1);
        assert_eq!(received[0].flags.len(), 1);
        assert_eq!(received[0].reason, SubmitReason::Manual);
    }

    #[test]
    fn test_ticks_expire_into_results() {
        let (mut app, sink) = exam_app(2);

        app.on_tick();
        assert_eq!(app.state, AppState::Exam);
        app.on_tick();
        assert_eq!(app.state, AppState::Results);
        app.on_tick();

        assert_eq!(sink.received().len(), 1);
        assert_eq!(sink.received()[0].reason, SubmitReason::Expired);
    }

    #[test]
    fn test_answer_keys_ignored_in_results() {
        let (mut app, sink) = exam_app(60);
        app.handle_key(key(KeyCode::Enter));
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.state, AppState::Results);

        app.handle_key(key(KeyCode::Char('a')));
        let session = app.session.as_ref().unwrap();
        assert_eq!(
            session.answer_for(session.current_question().id),
            None::<OptionId>
        );
        assert_eq!(sink.received().len(), 1);
    }

    #[test]
    fn test_quit_mid_exam() {
        let (mut app, sink) = exam_app(60);
        assert!(app.handle_key(key(KeyCode::Esc)));
        assert!(sink.received().is_empty());
    }

    #[test]
    fn test_history_scrolling() {
        let mut app = App {
            state: AppState::History,
            session: None,
            load_error: None,
            history: Vec::new(),
            history_error: None,
            history_state: HistoryState::default(),
        };

        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::PageDown));
        assert_eq!(app.history_state.scroll_offset, 11);
        app.handle_key(key(KeyCode::Up));
        assert_eq!(app.history_state.scroll_offset, 10);
        app.handle_key(key(KeyCode::Home));
        assert_eq!(app.history_state.scroll_offset, 0);

        // Nothing to go back to without a session
        app.handle_key(key(KeyCode::Char('b')));
        assert_eq!(app.state, AppState::History);
        assert!(app.handle_key(key(KeyCode::Char('q'))));
    }
}
