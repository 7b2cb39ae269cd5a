//! Everything one run needs, built once and handed to each task: the timer,
//! the terminal width, the render sink and the keyboard listener.

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tracing::{debug, error, info};

use crate::checkloop::{CheckLoop, DEFAULT_QUANTUM, RunOutcome};
use crate::clock::{Clock, SharedClock};
use crate::error::TimerError;
use crate::render::{DEFAULT_TERMINAL_WIDTH, LineDisplay, Render, RenderTicker, TerminalWidth};
use crate::timer::{CancelReason, CancelToken, TimeSpan, Timer};

pub const DEFAULT_REFRESH: Duration = Duration::from_millis(50);

const KEY_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    /// Longest single sleep of the check loop.
    pub quantum: Duration,
    /// Cadence of the periodic render.
    pub refresh: Duration,
    /// Listen for quit/pause keys on stdin.
    pub keyboard: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            quantum: DEFAULT_QUANTUM,
            refresh: DEFAULT_REFRESH,
            keyboard: false,
        }
    }
}

/// What happened during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub cancel_reason: Option<CancelReason>,
    pub elapsed: TimeSpan,
}

impl RunSummary {
    /// 0 on completion; a quit key gives 0 only with `quit_with_success`;
    /// interrupts always give 1.
    pub fn exit_code(&self, quit_with_success: bool) -> u8 {
        match (self.outcome, self.cancel_reason) {
            (RunOutcome::Completed, _) => 0,
            (RunOutcome::Cancelled, Some(CancelReason::User)) if quit_with_success => 0,
            (RunOutcome::Cancelled, _) => 1,
        }
    }
}

pub struct RunContext {
    timer: Arc<Timer>,
    width: TerminalWidth,
    settings: RunSettings,
}

impl RunContext {
    pub fn new(timer: Timer, width: TerminalWidth, settings: RunSettings) -> Self {
        Self {
            timer: Arc::new(timer),
            width,
            settings,
        }
    }

    pub fn timer(&self) -> &Arc<Timer> {
        &self.timer
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.timer.cancel_token()
    }

    /// Starts the check loop, the render ticker and (optionally) the
    /// keyboard listener, waits for the outcome and tears everything down.
    pub fn run<W: Write + Send + 'static>(self, writer: W) -> Result<RunSummary, TimerError> {
        let display: Arc<dyn Render> = Arc::new(LineDisplay::new(
            Arc::clone(&self.timer),
            self.width.clone(),
            writer,
        ));
        let check = CheckLoop::new(Arc::clone(&self.timer), self.settings.quantum)?;
        let ticker = RenderTicker::spawn(Arc::clone(&display), self.settings.refresh)?;

        let (tx, rx) = mpsc::channel();
        let check_handle = check.spawn(Some(ticker), display, tx)?;
        debug!("check loop started");

        let keyboard = if self.settings.keyboard {
            match KeyboardListener::spawn(
                self.timer.cancel_token(),
                Arc::clone(self.timer.clock()),
                self.width.clone(),
            ) {
                Ok(listener) => Some(listener),
                Err(err) => {
                    // the loop is already running; end it before reporting
                    self.timer.request_cancel(CancelReason::Interrupt);
                    if rx.recv().is_err() {
                        debug!("check loop ended without an outcome");
                    }
                    join_check_loop(check_handle);
                    return Err(err);
                }
            }
        } else {
            None
        };

        let outcome = rx.recv();
        join_check_loop(check_handle);
        if let Some(keyboard) = keyboard {
            keyboard.stop();
        }

        let outcome = outcome.map_err(|_| TimerError::LoopAborted)?;
        let summary = RunSummary {
            outcome,
            cancel_reason: self.timer.cancel_token().reason(),
            elapsed: self.timer.elapsed(),
        };
        info!(outcome = ?summary.outcome, elapsed = %summary.elapsed, "run finished");
        Ok(summary)
    }
}

/// Waits for the check loop thread; `false` if it panicked.
fn join_check_loop(handle: JoinHandle<()>) -> bool {
    let joined = handle.join().is_ok();
    if !joined {
        error!("check loop thread panicked");
    }
    joined
}

/// Column count of the controlling terminal, or a default when stdout is
/// not a terminal.
pub fn detect_terminal_width() -> u16 {
    if !io::stdout().is_terminal() {
        return DEFAULT_TERMINAL_WIDTH;
    }
    match terminal::size() {
        Ok((columns, _)) if columns > 0 => columns,
        Ok(_) => DEFAULT_TERMINAL_WIDTH,
        Err(err) => {
            debug!(%err, "could not query terminal size");
            DEFAULT_TERMINAL_WIDTH
        }
    }
}

/// Whether stdin is a terminal we can read keys from.
pub fn stdin_is_interactive() -> bool {
    io::stdin().is_terminal()
}

static RAW_MODE: AtomicBool = AtomicBool::new(false);

/// Whether a [`RawModeGuard`] currently holds the terminal in raw mode.
pub fn raw_mode_active() -> bool {
    RAW_MODE.load(Ordering::Relaxed)
}

/// Puts the terminal in raw mode so single keys arrive without Enter;
/// restores it on drop.
pub struct RawModeGuard(());

impl RawModeGuard {
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        RAW_MODE.store(true, Ordering::Relaxed);
        debug!("raw mode enabled");
        Ok(Self(()))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        RAW_MODE.store(false, Ordering::Relaxed);
        if let Err(err) = terminal::disable_raw_mode() {
            error!(%err, "failed to restore terminal mode");
        }
    }
}

/// Log writer that ends lines with `\r\n` while raw mode is on, so each
/// message starts at the left edge.
pub struct RawModeWriter<W> {
    inner: W,
    raw: bool,
}

impl<W: Write> RawModeWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            raw: raw_mode_active(),
        }
    }
}

impl<W: Write> Write for RawModeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.raw {
            return self.inner.write(buf);
        }
        let mut start = 0;
        for (index, &byte) in buf.iter().enumerate() {
            if byte == b'\n' && (index == 0 || buf[index - 1] != b'\r') {
                self.inner.write_all(&buf[start..index])?;
                self.inner.write_all(b"\r\n")?;
                start = index + 1;
            }
        }
        self.inner.write_all(&buf[start..])?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    Interrupt,
    TogglePause,
    Ignore,
}

pub fn key_action(key: &KeyEvent) -> KeyAction {
    if key.kind != KeyEventKind::Press {
        return KeyAction::Ignore;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Interrupt,
        KeyCode::Char('q') | KeyCode::Esc => KeyAction::Quit,
        KeyCode::Char('p') | KeyCode::Char(' ') => KeyAction::TogglePause,
        _ => KeyAction::Ignore,
    }
}

/// Reads keys and resize events until stopped or a quit key arrives.
struct KeyboardListener {
    done: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KeyboardListener {
    fn spawn(
        cancel: CancelToken,
        clock: SharedClock,
        width: TerminalWidth,
    ) -> Result<Self, TimerError> {
        let done = Arc::new(AtomicBool::new(false));
        let thread_done = Arc::clone(&done);
        let handle = thread::Builder::new()
            .name("keyboard".into())
            .spawn(move || listen(&thread_done, &cancel, &clock, &width))
            .map_err(|source| TimerError::ThreadStart { name: "keyboard", source })?;
        Ok(Self {
            done,
            handle: Some(handle),
        })
    }

    fn stop(mut self) {
        self.done.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("keyboard thread panicked");
        }
    }
}

fn listen(done: &AtomicBool, cancel: &CancelToken, clock: &SharedClock, width: &TerminalWidth) {
    while !done.load(Ordering::Acquire) && !cancel.is_cancelled() {
        match event::poll(KEY_POLL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(err) => {
                debug!(%err, "stopped listening for keys");
                return;
            }
        }
        match event::read() {
            Ok(Event::Key(key)) => match key_action(&key) {
                KeyAction::Quit => {
                    cancel.cancel(CancelReason::User);
                }
                KeyAction::Interrupt => {
                    cancel.cancel(CancelReason::Interrupt);
                }
                KeyAction::TogglePause => {
                    let paused = clock.toggle_pause();
                    info!(paused, "pause toggled");
                }
                KeyAction::Ignore => {}
            },
            Ok(Event::Resize(columns, _)) => {
                debug!(columns, "terminal resized");
                width.set(columns);
            }
            Ok(_) => {}
            Err(err) => {
                debug!(%err, "stopped listening for keys");
                return;
            }
        }
    }
}
