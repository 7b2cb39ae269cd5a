use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use utimer::clock::{MonotonicClock, SharedClock};
use utimer::config::Config;
use utimer::context::{self, RawModeGuard, RawModeWriter, RunContext, RunSettings};
use utimer::parse::parse_length;
use utimer::render::{TerminalWidth, describe_span};
use utimer::timer::{CancelReason, CancelToken, DisplayOptions, Precision, TimeSpan, Timer};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Command-line timer featuring a timer, a countdown and a stopwatch"
)]
#[command(
    long_about = "utimer always exits once the timer or countdown is done counting, which \
makes it handy in scripts. The stopwatch has no end and is stopped with 'q'. \
Press 'p' or space to pause."
)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["timer", "countdown", "stopwatch", "limits"])
))]
struct Cli {
    /// Count from 0 to TIMELENGTH and exit (e.g. 31m27s300ms)
    #[arg(short, long, value_name = "TIMELENGTH")]
    timer: Option<String>,
    /// Count from TIMELENGTH down to 0 and exit (e.g. 30d9h50s)
    #[arg(short, long, value_name = "TIMELENGTH")]
    countdown: Option<String>,
    /// Count up until stopped with 'q'
    #[arg(short, long)]
    stopwatch: bool,
    /// Show the limits of utimer (maximum time length, accuracy)
    #[arg(short = 'L', long)]
    limits: bool,

    /// Granularity of the displayed time
    #[arg(long, value_enum)]
    precision: Option<Precision>,
    /// Hide the time text
    #[arg(long)]
    no_text: bool,
    /// Show the percentage done
    #[arg(short, long)]
    percent: bool,
    /// Show a progress bar
    #[arg(short, long)]
    bar: bool,
    /// Milliseconds between redraws
    #[arg(long, value_name = "MS")]
    refresh_ms: Option<u64>,
    /// Longest single sleep of the check loop, in milliseconds (1-999)
    #[arg(long, value_name = "MS")]
    quantum_ms: Option<u64>,

    /// When hitting 'q' to end the program, exit with status 0
    #[arg(long)]
    quit_with_success: bool,
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
    /// Quiet output
    #[arg(short, long, conflicts_with_all = ["verbose", "debug"])]
    quiet: bool,
    /// Debug output
    #[arg(short, long)]
    debug: bool,
    /// Read defaults from this JSON file instead of ~/.config/utimer/config.json
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Config values with the command-line flags applied on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Resolved {
    precision: Precision,
    display: DisplayOptions,
    quit_with_success: bool,
    quantum: Duration,
    refresh: Duration,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli) {
        Ok(code) => {
            debug!(code, "exiting");
            ExitCode::from(code)
        }
        Err(err) => {
            eprintln!("{}", report(&err));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("utimer={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(|| RawModeWriter::new(io::stderr()))
        .with_target(false)
        .without_time()
        .init();
}

fn report(err: &anyhow::Error) -> String {
    format!("Error: {err:#}")
}

fn run(cli: Cli) -> Result<u8> {
    if cli.limits {
        write_limits(&mut io::stdout().lock()).context("could not print the limits")?;
        return Ok(0);
    }

    let config = load_config(&cli)?;
    let resolved = resolve(&cli, &config);
    let timer = build_timer(&cli, MonotonicClock::shared(), &resolved)?;
    let settings = RunSettings {
        quantum: resolved.quantum,
        refresh: resolved.refresh,
        keyboard: context::stdin_is_interactive(),
    };

    let width = TerminalWidth::new(context::detect_terminal_width());
    let run_context = RunContext::new(timer, width, settings);
    install_signal_handler(run_context.cancel_token())?;

    let raw_mode = if settings.keyboard {
        RawModeGuard::enable()
            .map_err(|err| warn!(%err, "could not switch the terminal to raw mode"))
            .ok()
    } else {
        None
    };
    let summary = run_context.run(io::stdout())?;
    drop(raw_mode);

    Ok(summary.exit_code(resolved.quit_with_success))
}

fn resolve(cli: &Cli, config: &Config) -> Resolved {
    let mut display = config.display;
    if cli.no_text {
        display.show_text = false;
    }
    display.show_percent |= cli.percent;
    display.show_bar |= cli.bar;

    Resolved {
        precision: cli.precision.unwrap_or(config.precision),
        display,
        quit_with_success: cli.quit_with_success || config.quit_with_success,
        quantum: cli.quantum_ms.map_or(config.quantum(), Duration::from_millis),
        refresh: cli
            .refresh_ms
            .map_or(config.refresh(), |ms| Duration::from_millis(ms.max(1))),
    }
}

fn build_timer(cli: &Cli, clock: SharedClock, resolved: &Resolved) -> Result<Timer> {
    let (precision, display) = (resolved.precision, resolved.display);
    let timer = if let Some(pattern) = &cli.timer {
        let length = parse(pattern)?;
        info!("Timer will exit after reaching: {}", describe_span(length));
        Timer::new_timer(length, Some(clock), precision, display)?
    } else if let Some(pattern) = &cli.countdown {
        let length = parse(pattern)?;
        info!("Countdown will exit after: {}", describe_span(length));
        Timer::new_countdown(length, Some(clock), precision, display)?
    } else {
        info!("Stopwatch started, press 'q' to stop");
        Timer::new_stopwatch(Some(clock), precision, display)?
    };
    Ok(timer)
}

fn parse(pattern: &str) -> Result<TimeSpan> {
    parse_length(pattern).with_context(|| format!("could not parse time length '{pattern}'"))
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load_from(path).context("could not load the requested config"),
        None => Ok(Config::load_or_default(&Config::default_path())),
    }
}

fn install_signal_handler(cancel: CancelToken) -> Result<()> {
    ctrlc::set_handler(move || {
        if cancel.cancel(CancelReason::Interrupt) {
            debug!("interrupted by signal");
        }
    })
    .context("failed to install the signal handler")
}

fn write_limits(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "This is a list of the possible limits of utimer for your machine.\n")?;
    writeln!(out, "* Timer's Limits:")?;
    writeln!(out, "\t- The maximum possible length is: {}.", describe_span(TimeSpan::MAX))?;
    writeln!(
        out,
        "\t  If you enter a value that is exceeding it, it will be replaced by the value above."
    )?;
    writeln!(out, "\t- Time is tracked with millisecond accuracy.")
}
