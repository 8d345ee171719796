use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent};

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum ExamEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

/// Source of terminal events (keyboard, resize, ticks)
pub trait ExamEventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    /// Returns Ok(event) if an event arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<ExamEvent, RecvTimeoutError>;

    /// Sender feeding this source, used to attach a ticker
    fn sender(&self) -> Sender<ExamEvent>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    tx: Sender<ExamEvent>,
    rx: Receiver<ExamEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let input_tx = tx.clone();

        thread::spawn(move || loop {
            match event::read() {
                Ok(CtEvent::Key(key)) => {
                    if input_tx.send(ExamEvent::Key(key)).is_err() {
                        break;
                    }
                }
                Ok(CtEvent::Resize(_, _)) => {
                    if input_tx.send(ExamEvent::Resize).is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!("terminal input thread stopped: {e}");
                    break;
                }
            }
        });

        Self { tx, rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ExamEventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ExamEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn sender(&self) -> Sender<ExamEvent> {
        self.tx.clone()
    }
}

/// Test event source for unit and headless tests
pub struct TestEventSource {
    tx: Sender<ExamEvent>,
    rx: Receiver<ExamEvent>,
}

impl TestEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }
}

impl Default for TestEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ExamEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ExamEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    fn sender(&self) -> Sender<ExamEvent> {
        self.tx.clone()
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn every_second() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// A live periodic tick delivery that can be cancelled.
///
/// `cancel` must be idempotent and take effect synchronously: once it
/// returns, no new tick is produced.
pub trait TickSubscription {
    fn cancel(&mut self);
    fn is_active(&self) -> bool;
}

/// Handle to a ticker thread; cancelling or dropping it stops the ticks
#[derive(Debug)]
pub struct TickerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl TickSubscription for TickerHandle {
    fn cancel(&mut self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            tracing::debug!("ticker cancelled");
        }
        // The thread exits at its next wake-up; joining here would block the UI
        self.thread.take();
    }

    fn is_active(&self) -> bool {
        !self.stop.load(Ordering::SeqCst)
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Spawn a thread sending `ExamEvent::Tick` into `tx` every ticker interval.
///
/// A tick that was already queued when the handle is cancelled may still be
/// received; consumers must check their own state before applying it.
pub fn spawn_ticker<T: Ticker>(tx: Sender<ExamEvent>, ticker: T) -> TickerHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);
    let interval = ticker.interval();

    let thread = thread::spawn(move || loop {
        thread::sleep(interval);
        if thread_stop.load(Ordering::SeqCst) {
            break;
        }
        if tx.send(ExamEvent::Tick).is_err() {
            break;
        }
    });

    TickerHandle {
        stop,
        thread: Some(thread),
    }
}

/// Subscription stand-in for tests: counts cancellations instead of ticking
#[derive(Debug, Clone, Default)]
pub struct TestSubscription {
    cancels: Arc<AtomicUsize>,
}

impl TestSubscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `cancel` reached this subscription
    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl TickSubscription for TestSubscription {
    fn cancel(&mut self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn is_active(&self) -> bool {
        self.cancel_count() == 0
    }
}

/// Runner that advances the application one event at a time
pub struct Runner<E: ExamEventSource> {
    event_source: E,
    poll_interval: Duration,
}

impl<E: ExamEventSource> Runner<E> {
    pub fn new(event_source: E, poll_interval: Duration) -> Self {
        Self {
            event_source,
            poll_interval,
        }
    }

    pub fn sender(&self) -> Sender<ExamEvent> {
        self.event_source.sender()
    }

    /// Blocks up to the poll interval; `None` when nothing arrived
    pub fn step(&self) -> Option<ExamEvent> {
        match self.event_source.recv_timeout(self.poll_interval) {
            Ok(ev) => Some(ev),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
