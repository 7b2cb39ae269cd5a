//! Progress rendering: time text, percentage and a `[===>   ]` bar fitted
//! into the terminal width, plus the periodic task that redraws the line.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::TimerError;
use crate::timer::{Precision, TimeSpan, Timer, TimerMode};

/// Above this many target seconds the percentage ignores milliseconds.
pub const PRECISE_PERCENT_LIMIT_SECS: u32 = u32::MAX / 1000;

/// Narrowest bar worth drawing, brackets included.
pub const MIN_BAR_WIDTH: usize = 3;

pub const DEFAULT_TERMINAL_WIDTH: u16 = 80;

/// Share of `target` covered by `elapsed`, in `0..=100`. A zero target is
/// complete from the start.
pub fn percent_of(elapsed: TimeSpan, target: TimeSpan) -> u8 {
    if target.is_zero() {
        return 100;
    }
    if target.seconds() > PRECISE_PERCENT_LIMIT_SECS {
        let coarse = 100 * u64::from(elapsed.seconds()) / u64::from(target.seconds());
        return coarse.min(100) as u8;
    }
    let ratio = 100.0 * elapsed.as_millis() as f64 / target.as_millis() as f64;
    ratio.round().clamp(0.0, 100.0) as u8
}

/// Progress of a timer or countdown; `None` for a stopwatch, which has no target.
pub fn percent(timer: &Timer) -> Option<u8> {
    percent_at(timer, timer.elapsed())
}

fn percent_at(timer: &Timer, elapsed: TimeSpan) -> Option<u8> {
    match timer.mode() {
        TimerMode::Stopwatch => None,
        TimerMode::Timer | TimerMode::Countdown => Some(percent_of(elapsed, timer.target())),
    }
}

/// Draws a bar exactly `width` characters wide.
///
/// With `grows_right` the bar fills from the left and ends in `>`;
/// otherwise it fills from the right and starts with `<`.
pub fn progress_bar(percent: u8, width: usize, grows_right: bool) -> String {
    match width {
        0 => return String::new(),
        1 => return "|".to_string(),
        _ => {}
    }
    let inner = width - 2;
    let filled = inner * usize::from(percent.min(100)) / 100;
    let empty = inner - filled;

    let mut bar = String::with_capacity(width);
    bar.push('[');
    if grows_right {
        if filled > 0 {
            bar.extend(std::iter::repeat_n('=', filled - 1));
            bar.push('>');
        }
        bar.extend(std::iter::repeat_n(' ', empty));
    } else {
        bar.extend(std::iter::repeat_n(' ', empty));
        if filled > 0 {
            bar.push('<');
            bar.extend(std::iter::repeat_n('=', filled - 1));
        }
    }
    bar.push(']');
    bar
}

/// Formats a span as `D days HH:MM:SS.mmm`, dropping trailing fields
/// below `precision`.
pub fn format_span(span: TimeSpan, precision: Precision) -> String {
    let total = span.seconds();
    let days = total / 86_400;
    let hours = total % 86_400 / 3_600;
    let minutes = total % 3_600 / 60;
    let seconds = total % 60;
    match precision {
        Precision::Millisecond => format!(
            "{days} days {hours:02}:{minutes:02}:{seconds:02}.{:03}",
            span.millis()
        ),
        Precision::Second => format!("{days} days {hours:02}:{minutes:02}:{seconds:02}"),
        Precision::Minute => format!("{days} days {hours:02}:{minutes:02}"),
        Precision::Hour => format!("{days} days {hours:02}"),
    }
}

/// Long form used in messages, e.g. `0 days 00:01:30.500 (90.500 seconds)`.
pub fn describe_span(span: TimeSpan) -> String {
    format!(
        "{} ({}.{:03} seconds)",
        format_span(span, Precision::Millisecond),
        span.seconds(),
        span.millis()
    )
}

/// Greedily packs the enabled pieces into `width` columns in the order
/// text, percent, bar. Text and percent are all-or-nothing; the bar takes
/// whatever is left if that is at least [`MIN_BAR_WIDTH`].
pub fn fit_line(
    text: Option<&str>,
    percent: Option<u8>,
    bar: Option<(u8, bool)>,
    width: usize,
) -> String {
    let mut line = String::new();

    if let Some(text) = text
        && text.len() <= width
    {
        line.push_str(text);
    }

    if let Some(percent) = percent {
        let piece = if line.is_empty() {
            format!("({percent}%)")
        } else {
            format!(" ({percent}%)")
        };
        if line.len() + piece.len() <= width {
            line.push_str(&piece);
        }
    }

    if let Some((fill, grows_right)) = bar {
        let separator = usize::from(!line.is_empty());
        let available = width.saturating_sub(line.len() + separator);
        if available >= MIN_BAR_WIDTH {
            if separator == 1 {
                line.push(' ');
            }
            line.push_str(&progress_bar(fill, available, grows_right));
        }
    }

    line
}

/// The status line for `timer` as of now, at most `width` columns wide.
pub fn render_line(timer: &Timer, width: usize) -> String {
    render_line_at(timer, timer.elapsed(), width)
}

/// The status line for `timer` as if `elapsed` had passed.
pub fn render_line_at(timer: &Timer, elapsed: TimeSpan, width: usize) -> String {
    let display = timer.display();
    let progress = percent_at(timer, elapsed);

    let (shown, shown_percent, grows_right) = match timer.mode() {
        TimerMode::Timer => (elapsed.min(timer.target()), progress, true),
        TimerMode::Countdown => (
            timer.target().remaining_after(elapsed),
            progress.map(|p| 100 - p),
            false,
        ),
        TimerMode::Stopwatch => (elapsed, None, true),
    };

    let text = display
        .show_text
        .then(|| format_span(shown, timer.precision()));
    let percent = shown_percent.filter(|_| display.show_percent);
    // stopwatch bars stay empty
    let bar = display
        .show_bar
        .then(|| (shown_percent.unwrap_or(0), grows_right));

    fit_line(text.as_deref(), percent, bar, width)
}

/// Terminal column count, updated asynchronously on resize.
#[derive(Debug, Clone)]
pub struct TerminalWidth(Arc<AtomicU16>);

impl TerminalWidth {
    pub fn new(columns: u16) -> Self {
        Self(Arc::new(AtomicU16::new(columns)))
    }

    pub fn get(&self) -> u16 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, columns: u16) {
        self.0.store(columns, Ordering::Relaxed);
    }
}

impl Default for TerminalWidth {
    fn default() -> Self {
        Self::new(DEFAULT_TERMINAL_WIDTH)
    }
}

/// Something that can draw the current state of a run.
pub trait Render: Send + Sync {
    /// Draws one frame; `last` marks the final frame of the run.
    fn render(&self, last: bool);
}

struct SinkState<W> {
    writer: W,
    last_len: usize,
    finished: bool,
}

/// Rewrites a single terminal line in place for every frame.
pub struct LineDisplay<W: Write + Send> {
    timer: Arc<Timer>,
    width: TerminalWidth,
    sink: Mutex<SinkState<W>>,
}

impl<W: Write + Send> LineDisplay<W> {
    pub fn new(timer: Arc<Timer>, width: TerminalWidth, writer: W) -> Self {
        Self {
            timer,
            width,
            sink: Mutex::new(SinkState {
                writer,
                last_len: 0,
                finished: false,
            }),
        }
    }

    /// Hands back the writer, e.g. to inspect captured output.
    pub fn into_writer(self) -> W {
        self.sink.into_inner().writer
    }
}

impl<W: Write + Send> Render for LineDisplay<W> {
    fn render(&self, last: bool) {
        // keep the last column free so the line never wraps
        let columns = usize::from(self.width.get()).saturating_sub(1);
        let line = render_line(&self.timer, columns);

        let mut sink = self.sink.lock();
        if sink.finished {
            return;
        }
        let padding = sink.last_len.saturating_sub(line.len());
        let mut frame = format!("\r{line}{:padding$}", "");
        if last {
            frame.push_str("\r\n");
            sink.finished = true;
        }
        sink.last_len = line.len();

        let result = sink
            .writer
            .write_all(frame.as_bytes())
            .and_then(|()| sink.writer.flush());
        if let Err(err) = result {
            debug!(%err, "failed to draw status line");
        }
    }
}

/// Periodic render task running on its own thread.
pub struct RenderTicker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RenderTicker {
    pub fn spawn(render: Arc<dyn Render>, period: Duration) -> Result<Self, TimerError> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("render".into())
            .spawn(move || {
                while !thread_stop.load(Ordering::Acquire) {
                    trace!("render tick");
                    render.render(false);
                    thread::park_timeout(period);
                }
            })
            .map_err(|source| TimerError::ThreadStart { name: "render", source })?;
        debug!(?period, "render ticker started");
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stops ticking and waits for the thread to finish its current frame.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                debug!("render thread panicked");
            }
        }
    }
}

impl Drop for RenderTicker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SharedClock};
    use crate::timer::DisplayOptions;
    use std::sync::atomic::AtomicUsize;

    fn timer(mode: TimerMode, target: TimeSpan, display: DisplayOptions) -> Timer {
        let clock: SharedClock = Arc::new(ManualClock::new());
        let built = match mode {
            TimerMode::Timer => Timer::new_timer(target, Some(clock), Precision::Second, display),
            TimerMode::Countdown => {
                Timer::new_countdown(target, Some(clock), Precision::Second, display)
            }
            TimerMode::Stopwatch => Timer::new_stopwatch(Some(clock), Precision::Second, display),
        };
        built.unwrap()
    }

    const ALL: DisplayOptions = DisplayOptions {
        show_text: true,
        show_percent: true,
        show_bar: true,
    };

    #[test]
    fn percent_of_zero_target_is_complete() {
        assert_eq!(percent_of(TimeSpan::ZERO, TimeSpan::ZERO), 100);
    }

    #[test]
    fn percent_of_uses_milliseconds() {
        let target = TimeSpan::new(1, 0);
        assert_eq!(percent_of(TimeSpan::ZERO, target), 0);
        assert_eq!(percent_of(TimeSpan::new(0, 500), target), 50);
        assert_eq!(percent_of(TimeSpan::new(0, 994), target), 99);
        assert_eq!(percent_of(TimeSpan::new(0, 995), target), 100);
        assert_eq!(percent_of(TimeSpan::new(0, 1), TimeSpan::new(0, 3)), 33);
    }

    #[test]
    fn percent_of_stays_in_bounds_when_late() {
        assert_eq!(percent_of(TimeSpan::new(9, 0), TimeSpan::new(1, 0)), 100);
        assert_eq!(percent_of(TimeSpan::MAX, TimeSpan::new(0, 1)), 100);
    }

    #[test]
    fn percent_of_huge_targets_ignores_milliseconds() {
        let target = TimeSpan::new(u32::MAX, 999);
        assert_eq!(percent_of(TimeSpan::new(u32::MAX / 2, 999), target), 49);
        assert_eq!(percent_of(TimeSpan::MAX, target), 100);
        assert_eq!(percent_of(TimeSpan::new(0, 999), target), 0);
    }

    #[test]
    fn stopwatch_has_no_percent() {
        let stopwatch = timer(TimerMode::Stopwatch, TimeSpan::ZERO, ALL);
        assert_eq!(percent(&stopwatch), None);
        let zero = timer(TimerMode::Timer, TimeSpan::ZERO, ALL);
        assert_eq!(percent(&zero), Some(100));
    }

    #[test]
    fn bar_grows_right() {
        assert_eq!(progress_bar(0, 12, true), "[          ]");
        assert_eq!(progress_bar(50, 12, true), "[====>     ]");
        assert_eq!(progress_bar(100, 12, true), "[=========>]");
    }

    #[test]
    fn bar_drains_from_the_right() {
        assert_eq!(progress_bar(0, 12, false), "[          ]");
        assert_eq!(progress_bar(30, 12, false), "[       <==]");
        assert_eq!(progress_bar(100, 12, false), "[<=========]");
    }

    #[test]
    fn degenerate_bars() {
        assert_eq!(progress_bar(50, 0, true), "");
        assert_eq!(progress_bar(50, 1, true), "|");
        assert_eq!(progress_bar(100, 2, false), "[]");
        assert_eq!(progress_bar(100, 3, true), "[>]");
    }

    #[test]
    fn bar_width_is_exact_for_every_u16_width() {
        for width in 0..=usize::from(u16::MAX) {
            let percent = (width % 101) as u8;
            assert_eq!(progress_bar(percent, width, width % 2 == 0).len(), width);
        }
    }

    #[test]
    fn bar_width_is_exact_for_every_percent() {
        for percent in 0..=100u8 {
            for width in [0, 1, 2, 3, 7, 80, 1_000, usize::from(u16::MAX)] {
                assert_eq!(progress_bar(percent, width, true).len(), width);
                assert_eq!(progress_bar(percent, width, false).len(), width);
            }
        }
    }

    #[test]
    fn span_formats_per_precision() {
        let span = TimeSpan::new(93_784, 5);
        assert_eq!(format_span(span, Precision::Millisecond), "1 days 02:03:04.005");
        assert_eq!(format_span(span, Precision::Second), "1 days 02:03:04");
        assert_eq!(format_span(span, Precision::Minute), "1 days 02:03");
        assert_eq!(format_span(span, Precision::Hour), "1 days 02");
        assert_eq!(describe_span(TimeSpan::new(90, 500)), "0 days 00:01:30.500 (90.500 seconds)");
    }

    #[test]
    fn fit_line_keeps_everything_when_wide() {
        let line = fit_line(Some("0 days 00:00:05"), Some(50), Some((50, true)), 40);
        assert_eq!(line, "0 days 00:00:05 (50%) [=======>        ]");
        assert_eq!(line.len(), 40);
    }

    #[test]
    fn fit_line_bar_takes_the_rest() {
        let line = fit_line(Some("abc"), None, Some((100, true)), 10);
        assert_eq!(line, "abc [===>]");
        // the separator counts, so width 10 gives a 6-wide bar
        assert_eq!(line.len(), 10);
    }

    #[test]
    fn fit_line_drops_pieces_that_do_not_fit() {
        // bar would only get two columns
        assert_eq!(fit_line(Some("abcdef"), None, Some((10, true)), 9), "abcdef");
        // percent does not fit after the text
        assert_eq!(fit_line(Some("abcdef"), Some(5), None, 9), "abcdef");
        // text too long, percent and bar still get room
        assert_eq!(fit_line(Some("a very long text"), Some(5), Some((0, true)), 10), "(5%) [   ]");
        assert_eq!(fit_line(Some("x"), Some(5), Some((0, true)), 0), "");
    }

    #[test]
    fn fit_line_never_exceeds_width() {
        for width in 0..120 {
            let line = fit_line(Some("0 days 00:00:05.000"), Some(100), Some((100, false)), width);
            assert!(line.len() <= width, "width {width}: {line:?}");
        }
    }

    #[test]
    fn timer_line_counts_up() {
        let t = timer(TimerMode::Timer, TimeSpan::from_secs(10), ALL);
        let line = render_line_at(&t, TimeSpan::from_secs(4), 40);
        assert_eq!(line, "0 days 00:00:04 (40%) [=====>          ]");
    }

    #[test]
    fn timer_line_never_shows_more_than_target() {
        let t = timer(TimerMode::Timer, TimeSpan::from_secs(10), DisplayOptions::default());
        assert_eq!(render_line_at(&t, TimeSpan::new(10, 40), 80), "0 days 00:00:10");
    }

    #[test]
    fn countdown_line_shows_remaining() {
        let t = timer(TimerMode::Countdown, TimeSpan::from_secs(10), ALL);
        let line = render_line_at(&t, TimeSpan::from_secs(4), 40);
        assert!(line.starts_with("0 days 00:00:06 (60%) ["));
        assert!(line.ends_with("=]"));
        assert!(line.contains('<'));
        assert_eq!(line.len(), 40);
    }

    #[test]
    fn stopwatch_line_omits_percent() {
        let t = timer(TimerMode::Stopwatch, TimeSpan::ZERO, ALL);
        let line = render_line_at(&t, TimeSpan::from_secs(75), 30);
        assert!(line.starts_with("0 days 00:01:15 ["));
        assert!(!line.contains('%'));
    }

    #[test]
    fn line_display_rewrites_in_place() {
        let clock = Arc::new(ManualClock::new());
        let shared: SharedClock = clock.clone();
        let target = TimeSpan::from_secs(3);
        let display = DisplayOptions::default();
        let t = Arc::new(
            Timer::new_countdown(target, Some(shared), Precision::Second, display).unwrap(),
        );
        let display = LineDisplay::new(t, TerminalWidth::new(80), Vec::new());
        display.render(false);
        clock.advance(Duration::from_secs(3));
        display.render(true);
        display.render(false);

        let out = String::from_utf8(display.into_writer()).unwrap();
        assert_eq!(out, "\r0 days 00:00:03\r0 days 00:00:00\r\n");
    }

    #[test]
    fn line_display_pads_over_longer_frames() {
        let clock: SharedClock = Arc::new(ManualClock::new());
        let target = TimeSpan::from_secs(3);
        let display = DisplayOptions::default();
        let t = Arc::new(
            Timer::new_timer(target, Some(clock), Precision::Second, display).unwrap(),
        );
        let width = TerminalWidth::new(80);
        let display = LineDisplay::new(t, width.clone(), Vec::new());
        display.render(false);
        width.set(6);
        display.render(false);
        let out = String::from_utf8(display.into_writer()).unwrap();
        assert_eq!(out, format!("\r0 days 00:00:00\r{}", " ".repeat(15)));
    }

    struct Counting(AtomicUsize);

    impl Render for Counting {
        fn render(&self, _last: bool) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn ticker_renders_until_stopped() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let ticker = RenderTicker::spawn(counter.clone(), Duration::from_millis(5)).unwrap();
        thread::sleep(Duration::from_millis(60));
        ticker.stop();
        let seen = counter.0.load(Ordering::SeqCst);
        assert!(seen >= 2, "only {seen} frames");
        thread::sleep(Duration::from_millis(30));
        assert_eq!(counter.0.load(Ordering::SeqCst), seen);
    }
}
